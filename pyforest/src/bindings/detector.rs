use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use rsforest::config::{InterpolationMethod, InventoryConfig, SegmentationStrategy};
use rsforest::geometric::trees::NoAllometry;
use rsforest::inventory::TreeInventory;
use rsforest::point_cloud::PointCloud;

use crate::bindings::tree_record::PyTreeRecord;

/// Single-epoch tree detection Python binding
#[pyclass]
pub struct PyTreeDetector {
    config: InventoryConfig,
    last_diagnostics: Option<String>,
}

#[pymethods]
impl PyTreeDetector {
    #[new]
    #[pyo3(signature = (
        resolution = 1.0,
        min_height = 2.0,
        min_distance = 3.0,
        smoothing_sigma = 1.0,
        interpolation = "idw",
        idw_power = 2.0,
        search_radius = None,
        canopy_sigma = 0.5,
        segmentation = "watershed"
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        resolution: f64,
        min_height: f64,
        min_distance: f64,
        smoothing_sigma: f64,
        interpolation: &str,
        idw_power: f64,
        search_radius: Option<f64>,
        canopy_sigma: f64,
        segmentation: &str,
    ) -> PyResult<Self> {
        let mut config = InventoryConfig {
            resolution,
            ..InventoryConfig::default()
        };
        config.detection.min_height = min_height;
        config.detection.min_distance = min_distance;
        config.detection.smoothing_sigma = smoothing_sigma;
        config.surface.method = match interpolation {
            "idw" => InterpolationMethod::Idw,
            "tin" => InterpolationMethod::Tin,
            other => {
                return Err(PyValueError::new_err(format!(
                    "Unknown interpolation method '{}', expected 'idw' or 'tin'",
                    other
                )))
            }
        };
        config.surface.idw_power = idw_power;
        config.surface.search_radius = search_radius;
        config.canopy.sigma = canopy_sigma;
        config.segmentation.strategy = match segmentation {
            "watershed" => SegmentationStrategy::Watershed,
            "propagation" => SegmentationStrategy::Propagation,
            other => {
                return Err(PyValueError::new_err(format!(
                    "Unknown segmentation strategy '{}', expected 'watershed' or 'propagation'",
                    other
                )))
            }
        };
        config
            .validate()
            .map_err(|e| PyValueError::new_err(format!("Invalid configuration: {}", e)))?;

        Ok(PyTreeDetector {
            config,
            last_diagnostics: None,
        })
    }

    /// Load the configuration from a JSON file
    #[staticmethod]
    fn from_json(path: &str) -> PyResult<Self> {
        let config = InventoryConfig::from_json(path)
            .map_err(|e| PyValueError::new_err(format!("Failed to load config: {:#}", e)))?;
        Ok(PyTreeDetector {
            config,
            last_diagnostics: None,
        })
    }

    /// Detect trees in a classified point cloud given as flat coordinate lists
    fn run(
        &mut self,
        x: Vec<f64>,
        y: Vec<f64>,
        z: Vec<f64>,
        classification: Vec<u8>,
    ) -> PyResult<Vec<PyTreeRecord>> {
        let inventory = self.detect(x, y, z, classification)?;
        Ok(inventory
            .trees
            .into_iter()
            .map(|inner| PyTreeRecord { inner })
            .collect())
    }

    /// Detect trees and return them as a GeoJSON FeatureCollection string
    fn run_to_geojson(
        &mut self,
        x: Vec<f64>,
        y: Vec<f64>,
        z: Vec<f64>,
        classification: Vec<u8>,
    ) -> PyResult<String> {
        let inventory = self.detect(x, y, z, classification)?;
        Ok(inventory.to_geojson().to_string())
    }

    /// Diagnostics of the last run as a JSON string
    #[getter]
    fn diagnostics(&self) -> Option<String> {
        self.last_diagnostics.clone()
    }
}

impl PyTreeDetector {
    fn detect(
        &mut self,
        x: Vec<f64>,
        y: Vec<f64>,
        z: Vec<f64>,
        classification: Vec<u8>,
    ) -> PyResult<TreeInventory> {
        if x.len() != y.len() || x.len() != z.len() || x.len() != classification.len() {
            return Err(PyValueError::new_err(
                "x, y, z and classification must have the same length",
            ));
        }
        let points = PointCloud::from_columns(x, y, z, classification);
        let inventory = TreeInventory::run(&points, &self.config, &NoAllometry)
            .map_err(|e| PyValueError::new_err(format!("Failed to detect trees: {}", e)))?;
        self.last_diagnostics = serde_json::to_string(&inventory.diagnostics).ok();
        Ok(inventory)
    }
}
