//! Application settings for metrotune-gui
//!
//! Settings are stored as JSON in the user's config directory.
//! Default location: ~/.config/metrotune/settings.json

use anyhow::{Context, Result};
use metrotune_core::{EngineConfig, SourceKind, Tempo};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Address the device listens on when it runs its own access point.
pub const DEFAULT_REMOTE_ADDRESS: &str = "192.168.4.1:3333";

/// Root settings structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Last tempo used, restored on startup
    pub tempo: Tempo,
    /// Source selected when the application closed
    pub source: SourceKind,
    /// host:port of the remote device
    pub remote_address: String,
    /// Scheduler and detector tunables
    pub engine: EngineConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tempo: Tempo::default(),
            source: SourceKind::Local,
            remote_address: DEFAULT_REMOTE_ADDRESS.to_string(),
            engine: EngineConfig::default(),
        }
    }
}

/// Get the default settings file path
///
/// Returns: ~/.config/metrotune/settings.json
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("metrotune")
        .join("settings.json")
}

/// Load settings from a JSON file
///
/// If the file doesn't exist, returns default settings.
/// If the file exists but is invalid, logs a warning and returns defaults.
pub fn load_settings(path: &Path) -> Settings {
    log::info!("load_settings: Loading from {:?}", path);

    if !path.exists() {
        log::info!("load_settings: Settings file doesn't exist, using defaults");
        return Settings::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<Settings>(&contents) {
            Ok(settings) => {
                log::info!(
                    "load_settings: Loaded settings - Tempo: {}, Source: {:?}",
                    settings.tempo,
                    settings.source
                );
                settings
            }
            Err(e) => {
                log::warn!("load_settings: Failed to parse settings: {}, using defaults", e);
                Settings::default()
            }
        },
        Err(e) => {
            log::warn!("load_settings: Failed to read settings file: {}, using defaults", e);
            Settings::default()
        }
    }
}

/// Save settings to a JSON file
///
/// Creates parent directories if they don't exist.
pub fn save_settings(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create settings directory: {:?}", parent))?;
    }

    let json = serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;

    std::fs::write(path, json)
        .with_context(|| format!("Failed to write settings file: {:?}", path))?;

    log::debug!("save_settings: Saved to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.tempo.bpm(), 120);
        assert_eq!(settings.source, SourceKind::Local);
        assert_eq!(settings.remote_address, DEFAULT_REMOTE_ADDRESS);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.tempo = Tempo::new(72).unwrap();
        settings.source = SourceKind::Remote;
        settings.remote_address = "10.0.0.7:4000".to_string();
        settings.engine.metronome.lookahead_ms = 120;

        save_settings(&settings, &path).unwrap();
        assert_eq!(load_settings(&path), settings);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_settings(&dir.path().join("absent.json")), Settings::default());
    }

    #[test]
    fn test_invalid_tempo_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "tempo": 500 }"#).unwrap();
        assert_eq!(load_settings(&path), Settings::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "tempo": 88, "source": "Remote" }"#).unwrap();
        let settings = load_settings(&path);
        assert_eq!(settings.tempo.bpm(), 88);
        assert_eq!(settings.source, SourceKind::Remote);
        assert_eq!(settings.engine, EngineConfig::default());
    }
}
