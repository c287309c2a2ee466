use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Page size, timings and geometry defaults shared by every grid instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    /// Rows added to the live query limit by each "load more"
    pub page_size: u32,
    /// Quiet period after the last filter keystroke before requerying
    pub debounce_ms: u64,
    /// How long a query may run before stale rows are shown with a spinner
    pub fallback_ms: u64,
    pub resize_frame_ms: u64,
    /// How long a bulk delete can still be undone
    pub undo_window_ms: u64,
    pub min_column_width: f32,
    pub default_column_width: f32,
    pub default_row_height: f32,
    pub max_filter_depth: usize,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            debounce_ms: 500,
            fallback_ms: 1000,
            resize_frame_ms: 16,
            undo_window_ms: 5000,
            min_column_width: 40.0,
            default_column_width: 200.0,
            default_row_height: 32.0,
            max_filter_depth: 8,
        }
    }
}

impl GridSettings {
    /// Loads settings from the default location, or defaults when no file exists
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::settings_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read grid settings from {:?}", path))?;
        let settings: Self =
            serde_json::from_str(&content).with_context(|| "Failed to parse grid settings JSON")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn settings_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not find config directory")?;
        Ok(config_dir.join("dgrid").join("grid.json"))
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.page_size > 0, "page_size must be positive");
        anyhow::ensure!(self.max_filter_depth > 0, "max_filter_depth must be positive");
        anyhow::ensure!(
            self.min_column_width > 0.0 && self.min_column_width <= self.default_column_width,
            "min_column_width must be positive and not exceed default_column_width"
        );
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn fallback(&self) -> Duration {
        Duration::from_millis(self.fallback_ms)
    }

    pub fn resize_frame(&self) -> Duration {
        Duration::from_millis(self.resize_frame_ms)
    }

    pub fn undo_window(&self) -> Duration {
        Duration::from_millis(self.undo_window_ms)
    }
}
