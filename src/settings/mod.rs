use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::circuit::CircuitModel;
use crate::params::{ControlSnapshot, DRIVE_RANGE, LEVEL_RANGE, TONE_RANGE};
use crate::pedal::Topology;

const SETTINGS_FILENAME: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PedalSettings {
    pub drive: f32,
    pub tone: f32,
    pub level: f32,
    pub model: CircuitModel,
    pub topology: Topology,
    /// Oversampling factor, `None` uses the topology's default.
    pub oversampling: Option<usize>,
}

impl Default for PedalSettings {
    fn default() -> Self {
        Self {
            drive: DRIVE_RANGE.default,
            tone: TONE_RANGE.default,
            level: LEVEL_RANGE.default,
            model: CircuitModel::default(),
            topology: Topology::default(),
            oversampling: None,
        }
    }
}

impl std::fmt::Display for PedalSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Drive: {}", self.drive)?;
        writeln!(f, "Tone: {}", self.tone)?;
        writeln!(f, "Level: {}", self.level)?;
        writeln!(f, "Model: {}", self.model)?;
        writeln!(f, "Topology: {}", self.topology)?;
        writeln!(f, "Oversampling Factor: {}", self.oversampling_factor())?;
        Ok(())
    }
}

impl PedalSettings {
    pub fn controls(&self) -> ControlSnapshot {
        ControlSnapshot {
            drive: self.drive,
            tone: self.tone,
            level: self.level,
            model: self.model,
            generation: 0,
        }
    }

    pub fn oversampling_factor(&self) -> usize {
        self.oversampling
            .unwrap_or_else(|| self.topology.default_oversampling())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub block_size: usize,
    pub output_dir: String,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            block_size: 256,
            output_dir: "./renders".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pedal: PedalSettings,
    pub render: RenderSettings,
}

impl std::fmt::Display for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "------------------------------")?;
        writeln!(f, "Pedal Settings:")?;
        writeln!(f, "{}", self.pedal)?;
        writeln!(f, "Render Settings:")?;
        writeln!(f, "Block Size: {}", self.render.block_size)?;
        writeln!(f, "Output Directory: {}", self.render.output_dir)?;
        Ok(())
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Reads settings from `path`, writing defaults there if it does not
    /// exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings file {}", path.display()))?;
            let settings: Settings =
                serde_json::from_str(&contents).context("Failed to parse settings")?;
            debug!("Loaded settings from {:?}", path);
            Ok(settings)
        } else {
            info!("No settings file at {:?}, using defaults", path);
            let settings = Settings::default();
            // Try to save defaults, but don't fail if we can't
            let _ = settings.save_to(path);
            Ok(settings)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, json).context("Failed to write settings file")?;

        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(config_dir)
                .join("screamer")
                .join(SETTINGS_FILENAME)
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("screamer")
                .join(SETTINGS_FILENAME)
        } else {
            PathBuf::from(".").join(SETTINGS_FILENAME)
        }
    }
}
