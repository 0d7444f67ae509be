use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{Result, VisualizerError};

const APP_DIR: &str = "audio-visualizer";

/// Top-level configuration structure for the application.
///
/// Passed explicitly to the preview pipeline and preset store instead of being
/// looked up from shared state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub preview: PreviewConfig,
    pub presets: PresetConfig,
}

impl AppConfig {
    /// Location of the settings file when none is given on the command line.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("settings.json")
    }

    /// Reads the configuration at `path`, falling back to defaults when the
    /// file does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "no settings file, using defaults");
            return Ok(Self::default());
        }

        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.preview.validate()
    }
}

/// Settings for the preview rendering worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub output_width: u32,
    pub output_height: u32,
    /// Image pasted onto the transparent base canvas before scaling.
    pub background: Option<PathBuf>,
    /// Maximum number of queued render requests (in-flight plus pending).
    pub queue_capacity: usize,
    pub poll_interval_ms: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            output_width: 1280,
            output_height: 720,
            background: None,
            queue_capacity: 2,
            poll_interval_ms: 40,
        }
    }
}

impl PreviewConfig {
    pub fn validate(&self) -> Result<()> {
        if self.output_width == 0 || self.output_height == 0 {
            return Err(VisualizerError::InvalidConfig(
                "output resolution must be non-zero",
            ));
        }
        if self.queue_capacity == 0 {
            return Err(VisualizerError::InvalidConfig(
                "preview queue needs room for at least one request",
            ));
        }
        Ok(())
    }
}

/// Settings for the preset store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetConfig {
    pub preset_dir: PathBuf,
    /// Directory of the most recently imported or exported preset file.
    pub last_transfer_dir: Option<PathBuf>,
}

impl Default for PresetConfig {
    fn default() -> Self {
        Self {
            preset_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("presets"),
            last_transfer_dir: None,
        }
    }
}

impl PresetConfig {
    /// Remembers the directory holding `file` for the next import or export.
    pub fn remember_transfer(&mut self, file: &Path) {
        self.last_transfer_dir = file.parent().map(Path::to_path_buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("settings.json")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "preview": { "output_width": 640 } }"#).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.preview.output_width, 640);
        assert_eq!(config.preview.output_height, 720);
        assert_eq!(config.preview.queue_capacity, 2);
    }

    #[test]
    fn saves_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut config = AppConfig::default();
        config.presets.preset_dir = dir.path().join("presets");
        config.presets.remember_transfer(&dir.path().join("exports/a.avl"));

        config.save(&path).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn rejects_zero_resolution() {
        let config = PreviewConfig {
            output_height: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(VisualizerError::InvalidConfig(_))
        ));
    }
}
