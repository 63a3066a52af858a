//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`EventsSettings::default()`]
//! 2. If `~/.unloq/events.json` exists, deep-merge its values over defaults
//! 3. Apply `UNLOQ_*` environment overrides (highest priority)
//!
//! The API key is not overridden here: a configured key wins, and
//! `UNLOQ_KEY` is only the fallback applied by [`EventsSettings::resolve`].
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{EventsSettings, GATEWAY_ENV, LOG_LEVEL_ENV};

/// Environment variable toggling transport-level reconnection.
pub const RECONNECTION_ENV: &str = "UNLOQ_RECONNECTION";
/// Environment variable bounding reconnection attempts.
pub const RECONNECTION_ATTEMPTS_ENV: &str = "UNLOQ_RECONNECTION_ATTEMPTS";

/// Resolve the path to the settings file (`~/.unloq/events.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".unloq").join("events.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<EventsSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<EventsSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Load a settings file merged over defaults, without env overrides.
pub fn read_settings_file(path: &Path) -> Result<EventsSettings> {
    if !path.exists() {
        debug!(?path, "settings file not found, using defaults");
        return Ok(EventsSettings::default());
    }
    debug!(?path, "loading settings from file");

    let defaults = serde_json::to_value(EventsSettings::default())?;
    let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let malformed = |source: serde_json::Error| SettingsError::Malformed {
        path: path.to_path_buf(),
        source,
    };
    let user: Value = serde_json::from_str(&content).map_err(malformed)?;
    serde_json::from_value(deep_merge(defaults, user)).map_err(malformed)
}

/// Recursive deep merge of two JSON values.
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

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut EventsSettings) {
    apply_env_overrides_with(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `env`.
///
/// Empty values are ignored; invalid numbers and booleans are logged and
/// ignored (falling back to file/default).
pub fn apply_env_overrides_with(
    settings: &mut EventsSettings,
    env: impl Fn(&str) -> Option<String>,
) {
    let read = |name: &str| env(name).filter(|v| !v.is_empty());

    if let Some(v) = read(GATEWAY_ENV) {
        settings.gateway = v;
    }
    if let Some(v) = read(LOG_LEVEL_ENV) {
        settings.logging.level = v;
    }
    if let Some(v) = read(RECONNECTION_ENV) {
        match parse_bool(&v) {
            Some(b) => settings.transport.reconnection = b,
            None => warn!(key = RECONNECTION_ENV, value = %v, "invalid boolean env var, ignoring"),
        }
    }
    if let Some(v) = read(RECONNECTION_ATTEMPTS_ENV) {
        match parse_u32_range(&v, 1, 1_000_000) {
            Some(n) => settings.transport.reconnection_attempts = Some(n),
            None => warn!(key = RECONNECTION_ATTEMPTS_ENV, value = %v, "invalid u32 env var, ignoring"),
        }
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

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

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
