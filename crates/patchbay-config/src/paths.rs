//! Platform-specific path for the engine's settings file.

use std::path::PathBuf;

const APP_NAME: &str = "patchbay";
const SETTINGS_FILE: &str = "settings.toml";

/// Returns the user-specific configuration directory.
///
/// - Linux: `~/.config/patchbay/`
/// - macOS: `~/Library/Application Support/patchbay/`
/// - Windows: `%APPDATA%\patchbay\`
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default path [`crate::EngineConfig::load_or_default`] reads from when
/// the CLI isn't given an explicit settings path.
pub fn default_settings_path() -> PathBuf {
    user_config_dir().join(SETTINGS_FILE)
}

/// Ensure the user configuration directory exists.
pub fn ensure_user_config_dir() -> Result<PathBuf, crate::ConfigError> {
    let dir = user_config_dir();
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| crate::ConfigError::create_dir(&dir, e))?;
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_path_is_under_config_dir() {
        assert_eq!(default_settings_path(), user_config_dir().join(SETTINGS_FILE));
    }
}
