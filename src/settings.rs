//! Engine settings.
//!
//! Loaded from a YAML file with per-field defaults, so a partial or
//! missing file always yields a working configuration.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

pub const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Painted pages kept in the LRU cache
    #[serde(default = "default_paint_cache_size")]
    pub paint_cache_size: usize,

    /// Pages warmed beyond the visible window on each side
    #[serde(default = "default_prefetch_radius")]
    pub prefetch_radius: usize,

    /// Search input debounce window, milliseconds
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,

    /// Lead-in margin above a jump target, screen pixels
    #[serde(default = "default_scroll_lead_in_margin")]
    pub scroll_lead_in_margin: f32,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_paint_cache_size() -> usize {
    crate::render::DEFAULT_PAINT_CACHE_SIZE
}

fn default_prefetch_radius() -> usize {
    crate::render::DEFAULT_PREFETCH_RADIUS
}

fn default_search_debounce_ms() -> u64 {
    250
}

fn default_scroll_lead_in_margin() -> f32 {
    crate::render::DEFAULT_LEAD_IN_MARGIN
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            paint_cache_size: default_paint_cache_size(),
            prefetch_radius: default_prefetch_radius(),
            search_debounce_ms: default_search_debounce_ms(),
            scroll_lead_in_margin: default_scroll_lead_in_margin(),
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str::<Settings>(&content) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!("failed to parse settings at {}: {e}", path.display());
                    Settings::default()
                }
            },
            Err(_) => Settings::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("failed to serialize settings")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(path, yaml).with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn search_debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.search_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("does-not-exist.yaml"));
        assert_eq!(settings.version, CURRENT_VERSION);
        assert_eq!(settings.paint_cache_size, default_paint_cache_size());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        fs::write(&path, "paint_cache_size: 64\n").unwrap();

        let settings = Settings::load(&path);
        assert_eq!(settings.paint_cache_size, 64);
        assert_eq!(settings.prefetch_radius, default_prefetch_radius());
        assert_eq!(settings.search_debounce_ms, 250);
    }

    #[test]
    fn save_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/settings.yaml");

        let mut settings = Settings::default();
        settings.prefetch_radius = 4;
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path);
        assert_eq!(loaded.prefetch_radius, 4);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        fs::write(&path, ":: not yaml ::{{{").unwrap();

        let settings = Settings::load(&path);
        assert_eq!(settings.paint_cache_size, default_paint_cache_size());
    }
}
