//! Error types for the tree inventory pipeline.

use thiserror::Error;

/// Errors raised by the ground, canopy, detection and matching stages.
///
/// Geometric failures that have a documented fallback (degenerate
/// triangulation, watershed failure) are caught inside their stage and only
/// surface here when a caller asks for that strategy directly.
#[derive(Debug, Error)]
pub enum ForestError {
    #[error("at least 3 ground points are required, found {found}")]
    InsufficientGroundPoints { found: usize },

    #[error("invalid configuration: {field} must be positive, got {value}")]
    InvalidConfig { field: &'static str, value: f64 },

    #[error("raster shape mismatch: expected {expected_rows}x{expected_cols}, got {rows}x{cols}")]
    ShapeMismatch {
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },

    #[error("grid of {rows} x {cols} cells at resolution {resolution} exceeds the {max_cells} cell limit")]
    GridTooLarge {
        rows: f64,
        cols: f64,
        resolution: f64,
        max_cells: usize,
    },

    #[error("point columns differ in length: x {x}, y {y}, z {z}, classification {classification}")]
    ColumnLengthMismatch {
        x: usize,
        y: usize,
        z: usize,
        classification: usize,
    },

    #[error("degenerate triangulation: {0}")]
    DegenerateTriangulation(String),

    #[error("watershed segmentation failed: {0}")]
    WatershedFailed(String),
}

pub type Result<T> = std::result::Result<T, ForestError>;

/// Reject zero, negative and NaN values for a strictly positive parameter.
pub(crate) fn ensure_positive(field: &'static str, value: f64) -> Result<()> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ForestError::InvalidConfig { field, value })
    }
}
