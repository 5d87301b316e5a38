//! Publisher ingestion: decode, stamp, dispatch.

pub mod pipeline;

pub use pipeline::{IngestError, IngestionPipeline};
