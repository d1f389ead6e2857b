use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::RoomsyncConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "roomsync.toml",
    "roomsync.yaml",
    "roomsync.yml",
    "roomsync.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<RoomsyncConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./roomsync.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/roomsync/roomsync.{toml,yaml,yml,json}` (user-global)
///
/// Returns `RoomsyncConfig::default()` (no sinks) if nothing is found or
/// the file cannot be parsed.
pub fn discover_and_load() -> RoomsyncConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    RoomsyncConfig::default()
}

/// Find the first config file in standard locations.
pub(crate) fn find_config_file() -> Option<PathBuf> {
    if let Some(p) = CONFIG_FILENAMES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
    {
        return Some(p);
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/roomsync/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "roomsync").map(|d| d.config_dir().to_path_buf())
}

/// Parse raw (already substituted) config text; the format follows the
/// file extension and defaults to TOML.
pub(crate) fn parse_config(raw: &str, path: &Path) -> anyhow::Result<RoomsyncConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
