//! Georeferenced 2D grid of `f64` used for the DEM and the CHM.

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::error::{ForestError, Result};
use crate::geo_core::GridSpec;

/// A row-major raster. Row 0 lies at `grid.y_min`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Raster {
    pub grid: GridSpec,
    pub data: Vec<f64>,
}

impl Raster {
    /// Create a new raster filled with a constant value.
    pub fn new(grid: GridSpec, fill: f64) -> Self {
        Self {
            grid,
            data: vec![fill; grid.len()],
        }
    }

    /// Create a raster from an existing row-major Vec.
    pub fn from_vec(grid: GridSpec, data: Vec<f64>) -> Result<Self> {
        if data.len() != grid.len() {
            return Err(ForestError::ShapeMismatch {
                expected_rows: grid.rows,
                expected_cols: grid.cols,
                rows: data.len() / grid.cols.max(1),
                cols: grid.cols,
            });
        }
        Ok(Self { grid, data })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.grid.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.grid.cols
    }

    /// Get value at (row, col), returns NaN if out of bounds.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        if row < self.rows() && col < self.cols() {
            self.data[row * self.cols() + col]
        } else {
            f64::NAN
        }
    }

    /// Get value at a signed position; `None` when out of bounds or NaN.
    #[inline]
    pub fn get_opt(&self, row: isize, col: isize) -> Option<f64> {
        if row >= 0 && col >= 0 && (row as usize) < self.rows() && (col as usize) < self.cols() {
            let v = self.data[row as usize * self.cols() + col as usize];
            if v.is_nan() {
                None
            } else {
                Some(v)
            }
        } else {
            None
        }
    }

    /// Set value at (row, col); out-of-bounds writes are ignored.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f64) {
        if row < self.rows() && col < self.cols() {
            let ncol = self.cols();
            self.data[row * ncol + col] = val;
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Apply a function to every cell.
    pub fn map<F: Fn(f64) -> f64>(&self, f: F) -> Raster {
        Raster {
            grid: self.grid,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    pub fn count_nan(&self) -> usize {
        self.data.iter().filter(|v| v.is_nan()).count()
    }

    /// Largest non-NaN value, `None` for an empty or all-NaN raster.
    pub fn max_value(&self) -> Option<f64> {
        self.data
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
    }

    /// Error unless `other` has the same rows and cols.
    pub fn ensure_same_shape(&self, other: &GridSpec) -> Result<()> {
        if self.rows() == other.rows && self.cols() == other.cols {
            Ok(())
        } else {
            Err(ForestError::ShapeMismatch {
                expected_rows: other.rows,
                expected_cols: other.cols,
                rows: self.rows(),
                cols: self.cols(),
            })
        }
    }
}

impl Index<(usize, usize)> for Raster {
    type Output = f64;
    fn index(&self, (r, c): (usize, usize)) -> &f64 {
        &self.data[r * self.grid.cols + c]
    }
}

impl IndexMut<(usize, usize)> for Raster {
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut f64 {
        &mut self.data[r * self.grid.cols + c]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: usize, cols: usize) -> GridSpec {
        GridSpec::new(0.0, 0.0, 1.0, rows, cols).unwrap()
    }

    #[test]
    fn test_get_set_and_index() {
        let mut r = Raster::new(grid(2, 3), 0.0);
        r.set(1, 2, 5.0);
        assert_eq!(r.get(1, 2), 5.0);
        assert_eq!(r[(1, 2)], 5.0);
        r[(0, 1)] = 2.0;
        assert_eq!(r.data, vec![0.0, 2.0, 0.0, 0.0, 0.0, 5.0]);
        assert!(r.get(2, 0).is_nan());
        r.set(9, 9, 1.0);
        assert_eq!(r.len(), 6);
    }

    #[test]
    fn test_get_opt() {
        let mut r = Raster::new(grid(2, 2), 1.0);
        r.set(0, 0, f64::NAN);
        assert_eq!(r.get_opt(0, 0), None);
        assert_eq!(r.get_opt(-1, 0), None);
        assert_eq!(r.get_opt(1, 1), Some(1.0));
    }

    #[test]
    fn test_from_vec_checks_length() {
        assert!(Raster::from_vec(grid(2, 2), vec![0.0; 4]).is_ok());
        assert!(matches!(
            Raster::from_vec(grid(2, 2), vec![0.0; 3]),
            Err(ForestError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_max_and_nan_count() {
        let r = Raster::from_vec(grid(1, 3), vec![1.0, f64::NAN, 4.0]).unwrap();
        assert_eq!(r.max_value(), Some(4.0));
        assert_eq!(r.count_nan(), 1);
        assert_eq!(Raster::new(grid(0, 0), 0.0).max_value(), None);
    }

    #[test]
    fn test_ensure_same_shape() {
        let r = Raster::new(grid(2, 3), 0.0);
        assert!(r.ensure_same_shape(&grid(2, 3)).is_ok());
        assert!(r.ensure_same_shape(&grid(3, 2)).is_err());
    }
}
