use serde::{Deserialize, Serialize};

use crate::commons::global_variables::MAX_GRID_CELLS;
use crate::error::{ensure_positive, ForestError, Result};

/// Bounding box structure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Smallest box enclosing all finite (x, y) pairs, `None` when there are none.
    pub fn from_coords(xs: &[f64], ys: &[f64]) -> Option<Self> {
        let mut bbox: Option<BoundingBox> = None;
        for (&x, &y) in xs.iter().zip(ys) {
            if !x.is_finite() || !y.is_finite() {
                continue;
            }
            bbox = Some(match bbox {
                None => BoundingBox::new(x, y, x, y),
                Some(b) => BoundingBox::new(b.min_x.min(x), b.min_y.min(y), b.max_x.max(x), b.max_y.max(y)),
            });
        }
        bbox
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Area in map units².
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// Georeferencing of a regular grid shared by the DEM, the CHM and the
/// segmentation labels.
///
/// Cell `(row, col)` sits at `(x_min + col * resolution, y_min + row * resolution)`;
/// rows grow with y.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub x_min: f64,
    pub y_min: f64,
    pub resolution: f64,
    pub rows: usize,
    pub cols: usize,
}

impl GridSpec {
    pub fn new(x_min: f64, y_min: f64, resolution: f64, rows: usize, cols: usize) -> Result<Self> {
        ensure_positive("resolution", resolution)?;
        check_cell_count(rows as f64, cols as f64, resolution)?;
        Ok(GridSpec {
            x_min,
            y_min,
            resolution,
            rows,
            cols,
        })
    }

    /// Grid whose cells cover every position of `bbox`, the max corner
    /// included.
    ///
    /// Fails with [`ForestError::GridTooLarge`] above [`MAX_GRID_CELLS`]
    /// cells, which is what a single far outlier return usually produces.
    pub fn covering(bbox: &BoundingBox, resolution: f64) -> Result<Self> {
        ensure_positive("resolution", resolution)?;
        // Counted in f64 so extreme extents cannot overflow
        let cols = (bbox.width() / resolution).floor() + 1.0;
        let rows = (bbox.height() / resolution).floor() + 1.0;
        check_cell_count(rows, cols, resolution)?;
        Ok(GridSpec {
            x_min: bbox.min_x,
            y_min: bbox.min_y,
            resolution,
            rows: rows as usize,
            cols: cols as usize,
        })
    }

    /// Zero-sized grid, used when there is nothing to rasterize.
    pub fn empty(resolution: f64) -> Self {
        GridSpec {
            x_min: 0.0,
            y_min: 0.0,
            resolution,
            rows: 0,
            cols: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.saturating_mul(self.cols)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Containing cell of a world position, clamped into the grid.
    #[inline]
    pub fn cell_of(&self, x: f64, y: f64) -> (usize, usize) {
        let col = clamp_index((x - self.x_min) / self.resolution, self.cols);
        let row = clamp_index((y - self.y_min) / self.resolution, self.rows);
        (row, col)
    }

    /// World position of a cell.
    #[inline]
    pub fn cell_position(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.x_min + col as f64 * self.resolution,
            self.y_min + row as f64 * self.resolution,
        )
    }

    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    pub fn cell_area(&self) -> f64 {
        self.resolution * self.resolution
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(
            self.x_min,
            self.y_min,
            self.x_min + self.cols as f64 * self.resolution,
            self.y_min + self.rows as f64 * self.resolution,
        )
    }
}

fn check_cell_count(rows: f64, cols: f64, resolution: f64) -> Result<()> {
    let cells = rows * cols;
    if cells.is_finite() && cells <= MAX_GRID_CELLS as f64 {
        Ok(())
    } else {
        Err(ForestError::GridTooLarge {
            rows,
            cols,
            resolution,
            max_cells: MAX_GRID_CELLS,
        })
    }
}

fn clamp_index(scaled: f64, dim: usize) -> usize {
    if dim == 0 || !(scaled > 0.0) {
        return 0;
    }
    (scaled.floor() as usize).min(dim - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box() {
        let bbox: BoundingBox = BoundingBox::new(0.0, 0.0, 1.0, 2.0);
        assert_eq!(bbox.min_x, 0.0);
        assert_eq!(bbox.max_x, 1.0);
        assert_eq!(bbox.area(), 2.0);
        assert!(bbox.contains(0.5, 1.5));
        assert!(!bbox.contains(1.5, 1.5));
    }

    #[test]
    fn test_bounding_box_skips_non_finite() {
        let xs = [1.0, f64::NAN, 5.0];
        let ys = [2.0, 100.0, -1.0];
        let bbox = BoundingBox::from_coords(&xs, &ys).unwrap();
        assert_eq!(bbox, BoundingBox::new(1.0, -1.0, 5.0, 2.0));
        assert!(BoundingBox::from_coords(&[], &[]).is_none());
    }

    #[test]
    fn test_grid_covering_includes_max_corner() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 4.5);
        let grid = GridSpec::covering(&bbox, 1.0).unwrap();
        assert_eq!(grid.cols, 11);
        assert_eq!(grid.rows, 5);
        assert_eq!(grid.cell_of(10.0, 4.5), (4, 10));
    }

    #[test]
    fn test_cell_of_clamps() {
        let grid = GridSpec::new(0.0, 0.0, 1.0, 5, 5).unwrap();
        assert_eq!(grid.cell_of(-3.0, 2.2), (2, 0));
        assert_eq!(grid.cell_of(100.0, 100.0), (4, 4));
        assert_eq!(grid.cell_of(f64::NAN, 3.9), (3, 0));
    }

    #[test]
    fn test_cell_position() {
        let grid = GridSpec::new(100.0, 200.0, 0.5, 4, 4).unwrap();
        assert_eq!(grid.cell_position(2, 3), (101.5, 201.0));
    }

    #[test]
    fn test_invalid_resolution() {
        assert!(GridSpec::new(0.0, 0.0, 0.0, 1, 1).is_err());
        assert!(GridSpec::covering(&BoundingBox::new(0.0, 0.0, 1.0, 1.0), -1.0).is_err());
    }

    #[test]
    fn test_oversized_grid_is_rejected() {
        // A 1 km tile stretched by one return at x = 1e7
        let outlier = BoundingBox::new(0.0, 0.0, 1.0e7, 1000.0);
        assert!(matches!(
            GridSpec::covering(&outlier, 0.5),
            Err(ForestError::GridTooLarge { .. })
        ));
        // Would overflow usize arithmetic
        let huge = BoundingBox::new(-1.0e300, 0.0, 1.0e300, 1.0);
        assert!(matches!(
            GridSpec::covering(&huge, 1.0),
            Err(ForestError::GridTooLarge { .. })
        ));
        assert!(GridSpec::new(0.0, 0.0, 1.0, usize::MAX, 2).is_err());

        let tile = GridSpec::covering(&BoundingBox::new(0.0, 0.0, 999.5, 999.5), 0.5).unwrap();
        assert_eq!((tile.rows, tile.cols), (2000, 2000));
    }
}
