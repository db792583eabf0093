//! Config file discovery, TOML merging, and environment variable overlay.

use crate::{ConfigError, EngineConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order).
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values.
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations, in load order.
///
/// Only returns files that exist. If `cli_path` is given and exists, it
/// replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/snapcore/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("snapcore/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("snapcore.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Parse a TOML document and merge any present fields onto `config`.
pub fn merge_toml(config: &mut EngineConfig, contents: &str, path: &Path) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if let Some(v) = table.get("default_bpm").and_then(|v| v.as_float()) {
        config.default_bpm = v;
    }
    if let Some(v) = table.get("beats_per_bar").and_then(|v| v.as_integer()) {
        config.beats_per_bar = v as u8;
    }
    if let Some(v) = table.get("banks").and_then(|v| v.as_integer()) {
        config.banks = v as u8;
    }
    if let Some(v) = table.get("slots_per_bank").and_then(|v| v.as_integer()) {
        config.slots_per_bank = v as u8;
    }
    if let Some(v) = table.get("tempo_cc_min_bpm").and_then(|v| v.as_float()) {
        config.tempo_cc_min_bpm = v;
    }
    if let Some(v) = table.get("tempo_cc_max_bpm").and_then(|v| v.as_float()) {
        config.tempo_cc_max_bpm = v;
    }
    if let Some(v) = table.get("max_fade_ms").and_then(|v| v.as_integer()) {
        config.max_fade_ms = v as u32;
    }

    Ok(())
}

/// Apply `SNAPCORE_*` environment variable overrides to `config`.
pub fn apply_env_overrides(config: &mut EngineConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("SNAPCORE_DEFAULT_BPM") {
        if let Ok(parsed) = v.parse() {
            config.default_bpm = parsed;
            sources.env_overrides.push("SNAPCORE_DEFAULT_BPM".to_string());
        }
    }
    if let Ok(v) = env::var("SNAPCORE_BEATS_PER_BAR") {
        if let Ok(parsed) = v.parse() {
            config.beats_per_bar = parsed;
            sources.env_overrides.push("SNAPCORE_BEATS_PER_BAR".to_string());
        }
    }
    if let Ok(v) = env::var("SNAPCORE_BANKS") {
        if let Ok(parsed) = v.parse() {
            config.banks = parsed;
            sources.env_overrides.push("SNAPCORE_BANKS".to_string());
        }
    }
    if let Ok(v) = env::var("SNAPCORE_SLOTS_PER_BANK") {
        if let Ok(parsed) = v.parse() {
            config.slots_per_bank = parsed;
            sources.env_overrides.push("SNAPCORE_SLOTS_PER_BANK".to_string());
        }
    }
    if let Ok(v) = env::var("SNAPCORE_MAX_FADE_MS") {
        if let Ok(parsed) = v.parse() {
            config.max_fade_ms = parsed;
            sources.env_overrides.push("SNAPCORE_MAX_FADE_MS".to_string());
        }
    }
}
