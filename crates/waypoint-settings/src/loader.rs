//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`WaypointSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! File values and env overrides share the same accepted ranges. An
//! out-of-range env value is ignored; an out-of-range file value is clamped
//! (or reset to its default where clamping has no meaning).

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{ServerSettings, WaypointSettings, waypoint_home};

/// Accepted bind ports.
pub const PORT_RANGE: (u64, u64) = (1, 65_535);
/// Accepted per-write subscriber deadline, in milliseconds.
pub const SEND_TIMEOUT_MS_RANGE: (u64, u64) = (10, 600_000);
/// Accepted per-subscriber queue length.
pub const QUEUE_CAPACITY_RANGE: (u64, u64) = (1, 65_536);
/// Accepted bound on outstanding dispatch.
pub const MAX_IN_FLIGHT_RANGE: (u64, u64) = (1, 1_000_000);

/// Resolve the default settings file (`~/.waypoint/settings.json`).
pub fn settings_path() -> PathBuf {
    waypoint_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<WaypointSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<WaypointSettings> {
    let defaults = serde_json::to_value(WaypointSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: WaypointSettings = serde_json::from_value(merged)?;
    enforce_bounds(&mut settings);
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Bring file-sourced values into the ranges env overrides accept.
pub fn enforce_bounds(settings: &mut WaypointSettings) {
    let port = u64::from(settings.server.port);
    if port < PORT_RANGE.0 {
        let default = ServerSettings::default().port;
        warn!(key = "server.port", value = port, default, "port out of range, using default");
        settings.server.port = default;
    }

    let b = &mut settings.broadcast;
    b.send_timeout_ms = clamp("broadcast.sendTimeoutMs", b.send_timeout_ms, SEND_TIMEOUT_MS_RANGE);
    b.queue_capacity =
        clamp("broadcast.queueCapacity", b.queue_capacity as u64, QUEUE_CAPACITY_RANGE) as usize;

    let i = &mut settings.ingest;
    i.max_in_flight =
        clamp("ingest.maxInFlight", i.max_in_flight as u64, MAX_IN_FLIGHT_RANGE) as usize;
}

fn clamp(key: &str, value: u64, (min, max): (u64, u64)) -> u64 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        warn!(key, value, clamped, "setting out of range, clamping");
    }
    clamped
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides.
pub fn apply_env_overrides(settings: &mut WaypointSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable source.
///
/// Empty values are ignored. Values that fail to parse or fall outside the
/// accepted range are logged and ignored (file/default value wins).
pub fn apply_overrides(settings: &mut WaypointSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read("WAYPOINT_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("WAYPOINT_PORT") {
        match parse_in(&v, PORT_RANGE) {
            Some(port) => settings.server.port = port as u16,
            None => invalid("WAYPOINT_PORT", &v),
        }
    }

    // ── Storage ─────────────────────────────────────────────────────
    if let Some(v) = read("DATABASE_URL") {
        settings.storage.database_url = v;
    }

    // ── Broadcast ───────────────────────────────────────────────────
    if let Some(v) = read("WAYPOINT_SEND_TIMEOUT_MS") {
        match parse_in(&v, SEND_TIMEOUT_MS_RANGE) {
            Some(ms) => settings.broadcast.send_timeout_ms = ms,
            None => invalid("WAYPOINT_SEND_TIMEOUT_MS", &v),
        }
    }
    if let Some(v) = read("WAYPOINT_QUEUE_CAPACITY") {
        match parse_in(&v, QUEUE_CAPACITY_RANGE) {
            Some(n) => settings.broadcast.queue_capacity = n as usize,
            None => invalid("WAYPOINT_QUEUE_CAPACITY", &v),
        }
    }

    // ── Ingest ──────────────────────────────────────────────────────
    if let Some(v) = read("WAYPOINT_MAX_IN_FLIGHT") {
        match parse_in(&v, MAX_IN_FLIGHT_RANGE) {
            Some(n) => settings.ingest.max_in_flight = n as usize,
            None => invalid("WAYPOINT_MAX_IN_FLIGHT", &v),
        }
    }
    if let Some(v) = read("WAYPOINT_PAYLOAD_SCHEMA") {
        match v.parse() {
            Ok(schema) => settings.ingest.payload_schema = schema,
            Err(_) => invalid("WAYPOINT_PAYLOAD_SCHEMA", &v),
        }
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read("WAYPOINT_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("WAYPOINT_LOG_JSON") {
        match parse_bool(&v) {
            Some(b) => settings.logging.json = b,
            None => invalid("WAYPOINT_LOG_JSON", &v),
        }
    }
}

fn parse_in(val: &str, (min, max): (u64, u64)) -> Option<u64> {
    parse_u64_range(val, min, max)
}

fn invalid(key: &str, value: &str) {
    warn!(key, value, "invalid env var, ignoring");
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;
    use waypoint_core::PayloadSchema;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8080, "host": "localhost"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_new_keys_added() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"b": 2}));
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn missing_file_yields_defaults() {
        let s = load_settings_from_path(Path::new("/nonexistent/waypoint.json")).unwrap();
        assert_eq!(s.broadcast.queue_capacity, 64);
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"broadcast": {"queueCapacity": 8}, "ingest": {"payloadSchema": "courier"}}"#,
        )
        .unwrap();

        let s = load_settings_from_path(&path).unwrap();
        assert_eq!(s.broadcast.queue_capacity, 8);
        assert_eq!(s.broadcast.send_timeout_ms, 5_000);
        assert_eq!(s.ingest.payload_schema, PayloadSchema::Courier);
    }

    #[test]
    fn invalid_json_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_settings_from_path(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    #[test]
    fn wrong_type_in_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": "eighty"}}"#).unwrap();
        assert!(load_settings_from_path(&path).is_err());
    }

    #[test]
    fn out_of_range_file_values_are_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "server": {"port": 0},
                "broadcast": {"sendTimeoutMs": 0, "queueCapacity": 1000000},
                "ingest": {"maxInFlight": 0}
            }"#,
        )
        .unwrap();

        let s = load_settings_from_path(&path).unwrap();
        assert_eq!(s.server.port, 8080);
        assert_eq!(s.broadcast.send_timeout_ms, 10);
        assert_eq!(s.broadcast.queue_capacity, 65_536);
        assert_eq!(s.ingest.max_in_flight, 1);
    }

    #[test]
    fn enforce_bounds_keeps_in_range_values() {
        let mut s = WaypointSettings::default();
        s.server.port = 1;
        s.broadcast.send_timeout_ms = 600_000;
        s.broadcast.queue_capacity = 1;
        s.ingest.max_in_flight = 1_000_000;
        enforce_bounds(&mut s);
        assert_eq!(s.server.port, 1);
        assert_eq!(s.broadcast.send_timeout_ms, 600_000);
        assert_eq!(s.broadcast.queue_capacity, 1);
        assert_eq!(s.ingest.max_in_flight, 1_000_000);
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply() {
        let mut s = WaypointSettings::default();
        apply_overrides(
            &mut s,
            env(&[
                ("WAYPOINT_HOST", "127.0.0.1"),
                ("WAYPOINT_PORT", "9000"),
                ("DATABASE_URL", "sqlite::memory:"),
                ("WAYPOINT_SEND_TIMEOUT_MS", "250"),
                ("WAYPOINT_QUEUE_CAPACITY", "4"),
                ("WAYPOINT_MAX_IN_FLIGHT", "16"),
                ("WAYPOINT_PAYLOAD_SCHEMA", "device"),
                ("WAYPOINT_LOG_LEVEL", "debug"),
                ("WAYPOINT_LOG_JSON", "yes"),
            ]),
        );
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.server.port, 9000);
        assert_eq!(s.storage.database_url, "sqlite::memory:");
        assert_eq!(s.broadcast.send_timeout_ms, 250);
        assert_eq!(s.broadcast.queue_capacity, 4);
        assert_eq!(s.ingest.max_in_flight, 16);
        assert_eq!(s.ingest.payload_schema, PayloadSchema::Device);
        assert_eq!(s.logging.level, "debug");
        assert!(s.logging.json);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut s = WaypointSettings::default();
        apply_overrides(
            &mut s,
            env(&[
                ("WAYPOINT_PORT", "0"),
                ("WAYPOINT_SEND_TIMEOUT_MS", "abc"),
                ("WAYPOINT_QUEUE_CAPACITY", "0"),
                ("WAYPOINT_PAYLOAD_SCHEMA", "xml"),
                ("WAYPOINT_LOG_JSON", "maybe"),
            ]),
        );
        assert_eq!(s.server.port, 8080);
        assert_eq!(s.broadcast.send_timeout_ms, 5_000);
        assert_eq!(s.broadcast.queue_capacity, 64);
        assert_eq!(s.ingest.payload_schema, PayloadSchema::Subject);
        assert!(!s.logging.json);
    }

    #[test]
    fn empty_overrides_are_ignored() {
        let mut s = WaypointSettings::default();
        apply_overrides(&mut s, env(&[("WAYPOINT_HOST", ""), ("DATABASE_URL", "")]));
        assert_eq!(s.server.host, "0.0.0.0");
        assert!(s.storage.database_url.starts_with("sqlite://"));
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "TRUE", "1", "yes", "on"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "No", "off"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn parse_u64_range_bounds() {
        assert_eq!(parse_u64_range("1", 1, 10), Some(1));
        assert_eq!(parse_u64_range("10", 1, 10), Some(10));
        assert_eq!(parse_u64_range(" 5 ", 1, 10), Some(5));
        assert_eq!(parse_u64_range("11", 1, 10), None);
        assert_eq!(parse_u64_range("-1", 1, 10), None);
    }

    #[test]
    fn settings_path_under_waypoint_home() {
        let p = settings_path();
        assert!(p.ends_with(".waypoint/settings.json"));
    }
}
