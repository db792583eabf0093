//! Minimal configuration loading for snapcore's engine tunables.
//!
//! This crate is deliberately kept dependency-light so any future host
//! (UI shell, persistence layer, whatever drives the engine) can depend on
//! it without pulling in snapcore's own dependency graph.
//!
//! # Configuration philosophy
//!
//! `EngineConfig` seeds implementation tunables rather than per-transition
//! settings: default tempo, grid dimensions, the tempo-CC mapping range,
//! and fade-time clamp bounds. It is not a place to persist snapshots —
//! that is out of scope for the engine itself.
//!
//! # Config file locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/snapcore/config.toml` (system)
//! 2. `~/.config/snapcore/config.toml` (user)
//! 3. `./snapcore.toml` (local override)
//! 4. Environment variables (`SNAPCORE_*`)
//!
//! # Example config
//!
//! ```toml
//! default_bpm = 120.0
//! beats_per_bar = 4
//! banks = 8
//! slots_per_bank = 16
//! tempo_cc_min_bpm = 40.0
//! tempo_cc_max_bpm = 240.0
//! max_fade_ms = 5000
//! ```

mod loader;

pub use loader::{apply_env_overrides, discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Tunables that seed a fresh `Clock` / `TransitionEngine` / `ParameterRegistry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Internal-clock tempo used before any caller calls `set_bpm`.
    pub default_bpm: f64,
    /// Beats per bar for the internal clock (default 4).
    pub beats_per_bar: u8,
    /// Number of snapshot banks (default 8).
    pub banks: u8,
    /// Slots per bank (default 16).
    pub slots_per_bank: u8,
    /// Lower bound of the tempo-CC mapping domain.
    pub tempo_cc_min_bpm: f64,
    /// Upper bound of the tempo-CC mapping domain.
    pub tempo_cc_max_bpm: f64,
    /// UI-facing clamp on Jump fade time, in ms (0-5000).
    pub max_fade_ms: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_bpm: 120.0,
            beats_per_bar: 4,
            banks: 8,
            slots_per_bank: 16,
            tempo_cc_min_bpm: 40.0,
            tempo_cc_max_bpm: 240.0,
            max_fade_ms: 5000,
        }
    }
}

impl EngineConfig {
    /// Load configuration from all sources (files, then env overrides).
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration, starting from a specific file path if given.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report which files/env vars contributed.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut config = Self::default();
        let mut sources = ConfigSources::default();

        for path in discover_config_files_with_override(config_path) {
            let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileRead {
                path: path.clone(),
                source: e,
            })?;
            loader::merge_toml(&mut config, &contents, &path)?;
            sources.files.push(path);
        }

        apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }
}
