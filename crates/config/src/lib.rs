//! Configuration loading, validation, and env substitution for roomsync.
//!
//! Config files: `roomsync.toml`, `roomsync.yaml`, or `roomsync.json`
//! Searched in `./` then `~/.config/roomsync/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{config_dir, discover_and_load, load_config},
    schema::{ReconnectPolicy, RelayConfig, RoomsyncConfig, SinkConfig, SyncedRoom},
    validate::{Diagnostic, Severity, ValidationResult},
};
