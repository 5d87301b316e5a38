//! Stateless repositories; every method takes a `&Connection`.

pub mod location;

pub use location::{LocationRepo, StoredLocation};
