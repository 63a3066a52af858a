//! # unloq-settings
//!
//! Configuration for the UNLOQ events client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`EventsSettings::default()`]
//! 2. **User file**: `~/.unloq/events.json` (deep-merged over defaults)
//! 3. **Environment variables**: `UNLOQ_*` overrides (highest priority)
//!
//! [`EventsSettings::resolve`] then turns them into the [`ResolvedSettings`]
//! a transport connects with: the API key is required, and the gateway's
//! fixed transport options and auth headers are applied on top.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_env_overrides_with, deep_merge, load_settings,
    load_settings_from_path, settings_path,
};
pub use types::*;
