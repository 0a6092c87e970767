use pyo3::prelude::*;
use rsforest::geometric::trees::TreeRecord;

/// Detected tree Python binding
#[pyclass]
#[derive(Clone)]
pub struct PyTreeRecord {
    pub inner: TreeRecord,
}

#[pymethods]
impl PyTreeRecord {
    /// Tree known only by its position and height (e.g. from a field inventory)
    #[new]
    fn new(id: u32, x: f64, y: f64, height: f64) -> Self {
        PyTreeRecord {
            inner: TreeRecord::new(id, x, y, height),
        }
    }

    #[getter]
    fn id(&self) -> u32 {
        self.inner.id
    }

    #[getter]
    fn x(&self) -> f64 {
        self.inner.x
    }

    #[getter]
    fn y(&self) -> f64 {
        self.inner.y
    }

    #[getter]
    fn height(&self) -> f64 {
        self.inner.height
    }

    #[getter]
    fn crown_diameter(&self) -> Option<f64> {
        self.inner.crown_diameter
    }

    #[getter]
    fn crown_area(&self) -> Option<f64> {
        self.inner.crown_area
    }

    #[getter]
    fn crown_base_height(&self) -> Option<f64> {
        self.inner.crown_base_height
    }

    #[getter]
    fn point_count(&self) -> u32 {
        self.inner.point_count
    }

    #[getter]
    fn dbh(&self) -> Option<f64> {
        self.inner.dbh
    }

    fn __repr__(&self) -> String {
        format!(
            "TreeRecord(id={}, x={:.2}, y={:.2}, height={:.2})",
            self.inner.id, self.inner.x, self.inner.y, self.inner.height
        )
    }
}

/// Unwrap a list of Python tree records.
pub(crate) fn to_records(trees: &[PyRef<'_, PyTreeRecord>]) -> Vec<TreeRecord> {
    trees.iter().map(|t| t.inner.clone()).collect()
}
