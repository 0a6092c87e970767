use chrono::NaiveDate;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use rsforest::change::classify::ChangeClassifier;
use rsforest::change::matching::TreeMatcher;
use rsforest::change::series::{compare_epochs, Epoch};
use rsforest::config::MatchingConfig;
use rsforest::geometric::trees::NoAllometry;

use crate::bindings::tree_record::{to_records, PyTreeRecord};

/// Cross-epoch change analysis Python binding
#[pyclass]
pub struct PyChangeAnalyzer {
    config: MatchingConfig,
}

#[pymethods]
impl PyChangeAnalyzer {
    #[new]
    #[pyo3(signature = (
        match_distance_threshold = 3.0,
        height_tolerance_pct = 50.0,
        growth_threshold = 0.5,
        decline_threshold = -1.0
    ))]
    fn new(
        match_distance_threshold: f64,
        height_tolerance_pct: f64,
        growth_threshold: f64,
        decline_threshold: f64,
    ) -> PyResult<Self> {
        let mut config = MatchingConfig {
            match_distance_threshold,
            height_tolerance_pct,
            ..MatchingConfig::default()
        };
        config.thresholds.growth = growth_threshold;
        config.thresholds.decline = decline_threshold;
        config
            .validate()
            .map_err(|e| PyValueError::new_err(format!("Invalid configuration: {}", e)))?;
        Ok(PyChangeAnalyzer { config })
    }

    /// Match two tree lists `years` apart and return the matches, per-tree
    /// changes and statistics as a JSON string
    #[pyo3(signature = (trees_t1, trees_t2, years, area_ha = 1.0))]
    fn compare(
        &self,
        trees_t1: Vec<PyRef<'_, PyTreeRecord>>,
        trees_t2: Vec<PyRef<'_, PyTreeRecord>>,
        years: f64,
        area_ha: f64,
    ) -> PyResult<String> {
        let t1 = to_records(&trees_t1);
        let t2 = to_records(&trees_t2);
        let matches = TreeMatcher::new(&self.config)
            .match_epochs(&t1, &t2)
            .map_err(|e| PyValueError::new_err(format!("Failed to match trees: {}", e)))?;
        let classifier = ChangeClassifier::new(&NoAllometry);
        let records = classifier.records(&t1, &t2, &matches);
        let statistics = classifier.statistics(&records, years, area_ha);

        serde_json::to_string(&serde_json::json!({
            "matches": matches,
            "records": records,
            "statistics": statistics,
        }))
        .map_err(|e| PyValueError::new_err(format!("Failed to serialize result: {}", e)))
    }

    /// Same as `compare`, with the years derived from ISO acquisition dates
    #[pyo3(signature = (trees_t1, acquired_t1, trees_t2, acquired_t2, area_ha = 1.0))]
    fn compare_dated(
        &self,
        trees_t1: Vec<PyRef<'_, PyTreeRecord>>,
        acquired_t1: &str,
        trees_t2: Vec<PyRef<'_, PyTreeRecord>>,
        acquired_t2: &str,
        area_ha: f64,
    ) -> PyResult<String> {
        let earlier = Epoch::new(acquired_t1, parse_date(acquired_t1)?, to_records(&trees_t1));
        let later = Epoch::new(acquired_t2, parse_date(acquired_t2)?, to_records(&trees_t2));
        let change = compare_epochs(&earlier, &later, area_ha, &self.config, &NoAllometry)
            .map_err(|e| PyValueError::new_err(format!("Failed to compare epochs: {}", e)))?;
        serde_json::to_string(&change)
            .map_err(|e| PyValueError::new_err(format!("Failed to serialize result: {}", e)))
    }
}

fn parse_date(value: &str) -> PyResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| PyValueError::new_err(format!("Invalid date '{}': {}", value, e)))
}
