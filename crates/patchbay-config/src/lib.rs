//! Engine settings that sit outside the patch text itself (§10.3): sample
//! rate, block size, audio device filters, the OSC listener's base port,
//! a MIDI input device filter, and where recorded takes are written.
//!
//! TOML via `serde`, matching the grounding codebase's `sonido-config`
//! crate — only the scope has narrowed, since patch state itself is
//! never persisted (§6: "Persisted state: none beyond recorded outputs").
//!
//! # Example
//!
//! ```rust,no_run
//! use patchbay_config::EngineConfig;
//!
//! let config = EngineConfig::load_or_default(&patchbay_config::paths::default_settings_path());
//! println!("sample rate: {}", config.sample_rate);
//! ```

mod error;

/// Platform-specific settings-file path.
pub mod paths;

pub use error::ConfigError;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_sample_rate() -> u32 {
    48_000
}

fn default_block_size() -> usize {
    256
}

fn default_osc_base_port() -> u16 {
    9000
}

fn default_recordings_dir() -> PathBuf {
    PathBuf::from("e_output_files/recordings")
}

/// Engine-level settings read once at startup, separate from the patch
/// text the engine then runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Audio sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Frames per audio callback.
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Substring filter for the input device name; `None` selects the
    /// host default.
    #[serde(default)]
    pub input_device: Option<String>,
    /// Substring filter for the output device name; `None` selects the
    /// host default.
    #[serde(default)]
    pub output_device: Option<String>,
    /// First UDP port the OSC listener tries (§6: "try a base port,
    /// increment until free").
    #[serde(default = "default_osc_base_port")]
    pub osc_base_port: u16,
    /// Substring filter for the MIDI input device name; `None` accepts
    /// the first available input.
    #[serde(default)]
    pub midi_device: Option<String>,
    /// Directory recorded takes are written under (§6's `e_output_files/
    /// recordings/` tree).
    #[serde(default = "default_recordings_dir")]
    pub recordings_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            block_size: default_block_size(),
            input_device: None,
            output_device: None,
            osc_base_port: default_osc_base_port(),
            midi_device: None,
            recordings_dir: default_recordings_dir(),
        }
    }
}

impl EngineConfig {
    /// Reads and parses a settings file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Ok(toml::from_str(&text)?)
    }

    /// Reads a settings file if present, falling back to defaults (and
    /// logging at `warn`) if it's missing or unparsable — startup never
    /// hard-fails on optional engine configuration.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                if path.exists() {
                    tracing::warn!(?path, %err, "failed to parse engine config, using defaults");
                } else {
                    tracing::info!(?path, "no engine config found, using defaults");
                }
                Self::default()
            }
        }
    }

    /// Serializes and writes this configuration to `path`, creating
    /// parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|e| ConfigError::write_file(path, e))
    }
}
