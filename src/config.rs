//! Configuration parsing and validation.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::catalog::CatalogEntry;
use crate::error::{ConfigError, Result};

/// Top-level configuration, usually read from `tryon.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub surface: SurfaceConfig,
    pub camera: CameraConfig,
    pub tracker: TrackerConfig,
    pub overlay: OverlayConfig,
    pub catalog: CatalogConfig,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::ReadFile(format!("{}: {}", path.as_ref().display(), e))
        })?;

        Self::from_toml(&contents)
    }

    pub fn from_toml(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// Load from `path` if given, otherwise from the first default location
    /// that exists, otherwise fall back to built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                tracing::info!("Loading config from: {}", path.display());
                Self::from_file(path)?
            }
            None => {
                let candidates = [
                    PathBuf::from("tryon.toml"),
                    PathBuf::from("config/default.toml"),
                ];
                match candidates.iter().find(|p| p.exists()) {
                    Some(found) => {
                        tracing::info!("Loading config from: {}", found.display());
                        Self::from_file(found)?
                    }
                    None => {
                        tracing::info!("No config file found, using defaults");
                        Self::default()
                    }
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.surface.width == 0 || self.surface.height == 0 {
            return Err(ConfigError::invalid("surface", "width and height must be non-zero").into());
        }

        let factors = [
            ("overlay.position_smoothing", self.overlay.position_smoothing),
            ("overlay.scale_smoothing", self.overlay.scale_smoothing),
            ("overlay.angle_smoothing", self.overlay.angle_smoothing),
            ("overlay.shadow.opacity", self.overlay.shadow.opacity),
            ("tracker.min_detection_confidence", self.tracker.min_detection_confidence),
            ("tracker.min_tracking_confidence", self.tracker.min_tracking_confidence),
        ];
        for (field, value) in factors {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(field, "must be between 0.0 and 1.0").into());
            }
        }

        if !(self.overlay.width_factor > 0.0) {
            return Err(ConfigError::invalid("overlay.width_factor", "must be greater than 0").into());
        }

        if self.overlay.shadow.blur < 0.0 {
            return Err(ConfigError::invalid("overlay.shadow.blur", "must not be negative").into());
        }

        if self.catalog.styles.is_empty() {
            return Err(ConfigError::invalid("catalog.styles", "at least one style is required").into());
        }

        let mut ids = HashSet::new();
        if let Some(dup) = self.catalog.styles.iter().find(|s| !ids.insert(s.id)) {
            return Err(ConfigError::invalid(
                "catalog.styles",
                format!("style id {} is used more than once", dup.id),
            )
            .into());
        }

        if !self
            .catalog
            .styles
            .iter()
            .any(|s| s.id == self.catalog.default_style)
        {
            return Err(ConfigError::invalid(
                "catalog.default_style",
                format!("style {} is not in the catalog", self.catalog.default_style),
            )
            .into());
        }

        Ok(())
    }
}

/// Size of the drawing surface the compositor renders into.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

/// Face tracker model locations and thresholds. Only used with the `onnx`
/// feature; the tracker always follows a single face.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub detector_model: PathBuf,
    pub detector_anchors: PathBuf,
    pub landmark_model: PathBuf,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    pub intra_threads: i16,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            detector_model: PathBuf::from("models/face_detection_back_256x256_float32_opt.onnx"),
            detector_anchors: PathBuf::from("models/anchors.npy"),
            landmark_model: PathBuf::from("models/face_landmarks_detector.onnx"),
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            intra_threads: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Sprite width as a multiple of the outer eye-corner distance.
    pub width_factor: f32,
    /// Added to the nose-bridge y coordinate, in surface pixels.
    pub vertical_offset: f32,
    pub position_smoothing: f32,
    pub scale_smoothing: f32,
    pub angle_smoothing: f32,
    pub shadow: ShadowConfig,
    pub debug_landmarks: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            width_factor: 1.7,
            vertical_offset: 15.0,
            position_smoothing: 0.4,
            scale_smoothing: 0.3,
            angle_smoothing: 0.3,
            shadow: ShadowConfig::default(),
            debug_landmarks: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub opacity: f32,
    pub blur: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            opacity: 0.3,
            blur: 10.0,
            offset_x: 5.0,
            offset_y: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Directory the catalog image paths are relative to.
    pub asset_dir: PathBuf,
    pub default_style: u32,
    pub styles: Vec<CatalogEntry>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            asset_dir: PathBuf::from("public"),
            default_style: 1,
            styles: crate::catalog::default_styles(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.surface.width, 1280);
        assert_eq!(config.surface.height, 720);
        assert_eq!(config.overlay.width_factor, 1.7);
        assert_eq!(config.overlay.position_smoothing, 0.4);
        assert_eq!(config.overlay.scale_smoothing, 0.3);
        assert_eq!(config.catalog.styles.len(), 6);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [overlay]
            width_factor = 2.0
            debug_landmarks = true

            [catalog]
            asset_dir = "assets"
            "#,
        )
        .unwrap();

        assert_eq!(config.overlay.width_factor, 2.0);
        assert!(config.overlay.debug_landmarks);
        assert_eq!(config.overlay.angle_smoothing, 0.3);
        assert_eq!(config.catalog.asset_dir, PathBuf::from("assets"));
        assert_eq!(config.catalog.styles.len(), 6);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_smoothing() {
        let mut config = Config::default();
        config.overlay.scale_smoothing = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("overlay.scale_smoothing"));
    }

    #[test]
    fn rejects_unknown_default_style() {
        let mut config = Config::default();
        config.catalog.default_style = 42;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_style_ids() {
        let config = Config::from_toml(
            r#"
            [catalog]
            default_style = 1

            [[catalog.styles]]
            id = 1
            name = "Sun Glasses"
            image = "glasses/sun-glasses.png"

            [[catalog.styles]]
            id = 1
            name = "Heart"
            image = "glasses/heart-glasses.png"
            "#,
        )
        .unwrap();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("style id 1 is used more than once"));
    }

    #[test]
    fn example_file_matches_defaults() {
        let config = Config::from_toml(include_str!("../tryon.example.toml")).unwrap();
        let defaults = Config::default();
        config.validate().unwrap();
        assert_eq!(config.overlay.shadow, defaults.overlay.shadow);
        assert_eq!(config.tracker.detector_model, defaults.tracker.detector_model);
        assert_eq!(config.catalog.styles, defaults.catalog.styles);
    }

    #[test]
    fn parse_error_is_reported() {
        let err = Config::from_toml("[overlay\nwidth_factor = ").unwrap_err();
        assert!(err.to_string().starts_with("Configuration error"));
    }
}
