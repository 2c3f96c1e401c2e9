use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::calibration::model::DEFAULT_ORDER;
use crate::calibration::profile::DEFAULT_PROFILES_DIR;
use crate::spectrum::{LocatorConfig, PeakParams};

/// Default location of the user configuration file.
pub const DEFAULT_PATH: &str = "config/user_config.json";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub recent_files: Vec<PathBuf>,
    pub max_recent_files: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            recent_files: Vec::new(),
            max_recent_files: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingSection {
    /// Cross-section width in pixels.
    pub thickness: usize,
    /// Savitzky–Golay window applied at extraction; `None` keeps raw values.
    pub smoothing_window: Option<usize>,
    /// Rows of the rendered color strip.
    pub strip_height: u32,
    /// Run the line locator as soon as an image is opened.
    pub auto_detect: bool,
}

impl Default for ProcessingSection {
    fn default() -> Self {
        Self {
            thickness: 5,
            smoothing_window: None,
            strip_height: 20,
            auto_detect: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSection {
    pub polynomial_order: usize,
    pub profiles_dir: PathBuf,
    pub recent_profiles: Vec<String>,
    pub max_recent_profiles: usize,
}

impl Default for CalibrationSection {
    fn default() -> Self {
        Self {
            polynomial_order: DEFAULT_ORDER,
            profiles_dir: PathBuf::from(DEFAULT_PROFILES_DIR),
            recent_profiles: Vec::new(),
            max_recent_profiles: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphScale {
    #[default]
    Linear,
    Log,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSection {
    /// Overlay a Savitzky–Golay smoothed trace on the raw profile.
    pub show_smoothed: bool,
    pub scale: GraphScale,
    pub savgol_window: usize,
    pub savgol_order: usize,
}

impl Default for GraphSection {
    fn default() -> Self {
        Self {
            show_smoothed: true,
            scale: GraphScale::Linear,
            savgol_window: 11,
            savgol_order: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

/// User settings, persisted as JSON.
///
/// Every section (and every field inside it) falls back to its default, so
/// a partial file only overrides what it names.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub processing: ProcessingSection,
    pub calibration: CalibrationSection,
    pub locator: LocatorConfig,
    pub peaks: PeakParams,
    pub graph: GraphSection,
}

impl AppConfig {
    /// Load from [`DEFAULT_PATH`], or defaults.
    pub fn load() -> Self {
        Self::load_from(Path::new(DEFAULT_PATH))
    }

    /// Load from `path`. A missing file gives defaults; an unreadable one
    /// gives defaults and a warning.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            log::info!("No config file at {}; using defaults", path.display());
            return Self::default();
        }
        match Self::read(path) {
            Ok(config) => {
                log::info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Failed to load config: {e:#}. Using defaults.");
                Self::default()
            }
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).context("parsing configuration JSON")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(self).context("serializing configuration")?;
        std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
        log::info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Move `file` to the front of the recent-files list.
    pub fn add_recent_file(&mut self, file: &Path) {
        push_recent(
            &mut self.app.recent_files,
            file.to_path_buf(),
            self.app.max_recent_files,
        );
    }

    /// Move `name` to the front of the recent-profiles list.
    pub fn add_recent_profile(&mut self, name: &str) {
        push_recent(
            &mut self.calibration.recent_profiles,
            name.to_string(),
            self.calibration.max_recent_profiles,
        );
    }
}

fn push_recent<T: PartialEq>(list: &mut Vec<T>, item: T, max: usize) {
    list.retain(|x| *x != item);
    list.insert(0, item);
    list.truncate(max);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.processing.thickness, 5);
        assert_eq!(cfg.calibration.polynomial_order, 2);
        assert_eq!(cfg.graph.savgol_window, 11);
        assert_eq!(cfg.graph.savgol_order, 3);
        assert_eq!(cfg.locator.canny_high, 150.0);
        assert_eq!(cfg.peaks.prominence_fraction, 0.1);
    }

    #[test]
    fn test_partial_file_merges_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_config.json");
        std::fs::write(
            &path,
            r#"{"processing": {"thickness": 9}, "graph": {"scale": "log"}}"#,
        )
        .unwrap();
        let cfg = AppConfig::load_from(&path);
        assert_eq!(cfg.processing.thickness, 9);
        assert_eq!(cfg.processing.strip_height, 20);
        assert_eq!(cfg.graph.scale, GraphScale::Log);
        assert!(cfg.graph.show_smoothed);
        assert_eq!(cfg.calibration, CalibrationSection::default());
    }

    #[test]
    fn test_broken_or_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_config.json");
        assert_eq!(AppConfig::load_from(&path), AppConfig::default());
        std::fs::write(&path, "{ nope").unwrap();
        assert_eq!(AppConfig::load_from(&path), AppConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cfg.json");
        let mut cfg = AppConfig::default();
        cfg.peaks.max_peaks = Some(4);
        cfg.save(&path).unwrap();
        assert_eq!(AppConfig::load_from(&path), cfg);
    }

    #[test]
    fn test_recent_lists_are_bounded_and_deduplicated() {
        let mut cfg = AppConfig::default();
        for i in 0..7 {
            cfg.add_recent_profile(&format!("p{i}"));
        }
        cfg.add_recent_profile("p3");
        assert_eq!(cfg.calibration.recent_profiles.len(), 5);
        assert_eq!(cfg.calibration.recent_profiles[0], "p3");
        assert_eq!(
            cfg.calibration.recent_profiles.iter().filter(|p| *p == "p3").count(),
            1
        );
    }
}
