use pyo3::prelude::*;

mod bindings;

use bindings::{PyChangeAnalyzer, PyTreeDetector, PyTreeRecord};

/// Python bindings for rsforest
/// Individual tree detection from classified LiDAR and cross-epoch change tracking

#[pymodule]
fn pyforest(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyTreeRecord>()?;
    m.add_class::<PyTreeDetector>()?;
    m.add_class::<PyChangeAnalyzer>()?;
    // Aliases for Pythonic API
    m.setattr("TreeRecord", m.getattr("PyTreeRecord")?)?;
    m.setattr("TreeDetector", m.getattr("PyTreeDetector")?)?;
    m.setattr("ChangeAnalyzer", m.getattr("PyChangeAnalyzer")?)?;

    m.add(
        "__doc__",
        "Python bindings for rsforest - tree inventories and change detection from LiDAR point clouds",
    )?;

    Ok(())
}
