//! Configuration types for the inventory and change-detection stages.
//!
//! Every stage receives its configuration explicitly; nothing is read from
//! global state. All structs deserialize with per-field defaults, so a JSON
//! document only needs the keys it overrides.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{ensure_positive, ForestError};

/// Ground surface interpolation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMethod {
    #[default]
    Idw,
    Tin,
}

/// Crown segmentation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentationStrategy {
    /// Marker-controlled watershed, falling back to propagation on failure.
    #[default]
    Watershed,
    /// Iterative 4-neighbour label propagation only.
    Propagation,
}

/// Configuration for the ground surface (DEM) interpolation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceConfig {
    #[serde(default)]
    pub method: InterpolationMethod,

    /// IDW distance exponent
    #[serde(default = "default_idw_power")]
    pub idw_power: f64,

    /// IDW neighbourhood radius in map units; derived from the point spacing when unset
    #[serde(default)]
    pub search_radius: Option<f64>,
}

fn default_idw_power() -> f64 {
    2.0
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            method: InterpolationMethod::default(),
            idw_power: default_idw_power(),
            search_radius: None,
        }
    }
}

/// Configuration for canopy height model rasterization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanopyConfig {
    /// Denoising Gaussian sigma in cells (0 disables)
    #[serde(default = "default_canopy_sigma")]
    pub sigma: f64,
}

fn default_canopy_sigma() -> f64 {
    0.5
}

impl Default for CanopyConfig {
    fn default() -> Self {
        Self {
            sigma: default_canopy_sigma(),
        }
    }
}

/// Configuration for tree-top detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Minimum canopy height of a tree top (m)
    #[serde(default = "default_min_height")]
    pub min_height: f64,

    /// Minimum distance between two accepted tree tops (m)
    #[serde(default = "default_min_distance")]
    pub min_distance: f64,

    /// Gaussian sigma in cells applied before local maxima search
    #[serde(default = "default_smoothing_sigma")]
    pub smoothing_sigma: f64,
}

fn default_min_height() -> f64 {
    2.0
}

fn default_min_distance() -> f64 {
    3.0
}

fn default_smoothing_sigma() -> f64 {
    1.0
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_height: default_min_height(),
            min_distance: default_min_distance(),
            smoothing_sigma: default_smoothing_sigma(),
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), ForestError> {
        ensure_positive("min_height", self.min_height)?;
        ensure_positive("min_distance", self.min_distance)
    }
}

/// Configuration for crown segmentation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentationConfig {
    #[serde(default)]
    pub strategy: SegmentationStrategy,
}

/// Full single-epoch inventory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Raster cell size (m)
    #[serde(default = "default_resolution")]
    pub resolution: f64,

    #[serde(default)]
    pub surface: SurfaceConfig,

    #[serde(default)]
    pub canopy: CanopyConfig,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub segmentation: SegmentationConfig,
}

fn default_resolution() -> f64 {
    1.0
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            surface: SurfaceConfig::default(),
            canopy: CanopyConfig::default(),
            detection: DetectionConfig::default(),
            segmentation: SegmentationConfig::default(),
        }
    }
}

impl InventoryConfig {
    /// Reject non-positive resolution, `min_height` or `min_distance`.
    pub fn validate(&self) -> Result<(), ForestError> {
        ensure_positive("resolution", self.resolution)?;
        self.detection.validate()?;
        if let Some(radius) = self.surface.search_radius {
            ensure_positive("search_radius", radius)?;
        }
        Ok(())
    }

    /// Load configuration from a JSON file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: InventoryConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))?;
        Ok(())
    }
}

/// Height-change thresholds separating growth, stability and decline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeThresholds {
    /// Height gain above which a matched tree is growing (m)
    #[serde(default = "default_growth_threshold")]
    pub growth: f64,

    /// Height change below which a matched tree is declining (m, negative)
    #[serde(default = "default_decline_threshold")]
    pub decline: f64,
}

fn default_growth_threshold() -> f64 {
    0.5
}

fn default_decline_threshold() -> f64 {
    -1.0
}

impl Default for ChangeThresholds {
    fn default() -> Self {
        Self {
            growth: default_growth_threshold(),
            decline: default_decline_threshold(),
        }
    }
}

/// Configuration for cross-epoch tree matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Maximum planimetric distance between matched trees (m)
    #[serde(default = "default_match_distance_threshold")]
    pub match_distance_threshold: f64,

    /// Maximum relative height difference, in percent of the epoch-1 height
    #[serde(default = "default_height_tolerance_pct")]
    pub height_tolerance_pct: f64,

    #[serde(default)]
    pub thresholds: ChangeThresholds,
}

fn default_match_distance_threshold() -> f64 {
    3.0
}

fn default_height_tolerance_pct() -> f64 {
    50.0
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            match_distance_threshold: default_match_distance_threshold(),
            height_tolerance_pct: default_height_tolerance_pct(),
            thresholds: ChangeThresholds::default(),
        }
    }
}

impl MatchingConfig {
    pub fn validate(&self) -> Result<(), ForestError> {
        ensure_positive("match_distance_threshold", self.match_distance_threshold)?;
        ensure_positive("height_tolerance_pct", self.height_tolerance_pct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_inventory_config() {
        let config = InventoryConfig::default();
        assert_eq!(config.resolution, 1.0);
        assert_eq!(config.surface.method, InterpolationMethod::Idw);
        assert_eq!(config.surface.idw_power, 2.0);
        assert_eq!(config.canopy.sigma, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_matching_config() {
        let config = MatchingConfig::default();
        assert_eq!(config.match_distance_threshold, 3.0);
        assert_eq!(config.height_tolerance_pct, 50.0);
        assert_eq!(config.thresholds.growth, 0.5);
        assert_eq!(config.thresholds.decline, -1.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "resolution": 0.5, "surface": { "method": "tin" }, "detection": { "min_height": 5.0 } }"#;
        let config: InventoryConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.resolution, 0.5);
        assert_eq!(config.surface.method, InterpolationMethod::Tin);
        assert_eq!(config.surface.idw_power, 2.0);
        assert_eq!(config.detection.min_height, 5.0);
        assert_eq!(config.detection.min_distance, 3.0);
        assert_eq!(config.segmentation.strategy, SegmentationStrategy::Watershed);
    }

    #[test]
    fn test_validate_rejects_non_positive() {
        let mut config = InventoryConfig::default();
        config.detection.min_distance = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ForestError::InvalidConfig { field: "min_distance", .. })
        ));

        let mut config = InventoryConfig::default();
        config.resolution = -1.0;
        assert!(config.validate().is_err());

        let matching = MatchingConfig {
            match_distance_threshold: 0.0,
            ..MatchingConfig::default()
        };
        assert!(matching.validate().is_err());
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        let mut config = InventoryConfig::default();
        config.detection.min_height = 4.0;
        config.to_json(&path).unwrap();

        let loaded = InventoryConfig::from_json(&path).unwrap();
        assert_eq!(loaded.detection.min_height, 4.0);
    }

    #[test]
    fn test_from_json_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "resolution": 0.0 }"#).unwrap();
        assert!(InventoryConfig::from_json(&path).is_err());
    }
}
