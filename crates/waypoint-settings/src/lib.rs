//! # waypoint-settings
//!
//! Layered configuration for the Waypoint tracker.
//!
//! Settings come from three sources, lowest priority first:
//! 1. Compiled defaults ([`WaypointSettings::default()`])
//! 2. `~/.waypoint/settings.json` (or a path given on the command line)
//! 3. Environment variables (`WAYPOINT_*`, `DATABASE_URL`)
//!
//! Settings are loaded once by the binary and passed down explicitly.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, enforce_bounds, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::{
    BroadcastSettings, IngestSettings, LoggingSettings, ServerSettings, StorageSettings,
    WaypointSettings, waypoint_home,
};
