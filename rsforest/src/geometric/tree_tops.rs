//! Tree-top detection: local maxima of the smoothed CHM followed by
//! priority-ordered non-maximum suppression.

use serde::{Deserialize, Serialize};

use crate::config::DetectionConfig;
use crate::error::Result;
use crate::geo_core::GridSpec;
use crate::geometric::filters::{gaussian_smooth, maximum_filter};
use crate::geometric::raster::Raster;

/// Candidate tree apex on the CHM grid. `height` is the unsmoothed CHM value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeTop {
    pub row: usize,
    pub col: usize,
    pub height: f64,
}

impl TreeTop {
    pub fn position(&self, grid: &GridSpec) -> (f64, f64) {
        grid.cell_position(self.row, self.col)
    }

    /// Euclidean distance in world units.
    pub fn distance(&self, other: &TreeTop, resolution: f64) -> f64 {
        let dr = self.row as f64 - other.row as f64;
        let dc = self.col as f64 - other.col as f64;
        (dr * dr + dc * dc).sqrt() * resolution
    }
}

pub struct TreeTopDetector<'a> {
    config: &'a DetectionConfig,
}

impl<'a> TreeTopDetector<'a> {
    pub fn new(config: &'a DetectionConfig) -> Self {
        TreeTopDetector { config }
    }

    /// Odd moving-window size, at least 3 cells.
    pub fn window_size(&self, resolution: f64) -> usize {
        let cells = (self.config.min_distance / resolution).ceil().max(3.0) as usize;
        if cells % 2 == 0 {
            cells + 1
        } else {
            cells
        }
    }

    /// Accepted tree tops of `chm`, tallest first.
    pub fn detect(&self, chm: &Raster) -> Result<Vec<TreeTop>> {
        self.config.validate()?;
        if chm.is_empty() {
            return Ok(Vec::new());
        }

        let smoothed = gaussian_smooth(chm, self.config.smoothing_sigma);
        let local_max = maximum_filter(&smoothed, self.window_size(chm.grid.resolution));

        let mut candidates = Vec::new();
        for row in 0..chm.rows() {
            for col in 0..chm.cols() {
                let raw = chm[(row, col)];
                if raw >= self.config.min_height && smoothed[(row, col)] == local_max[(row, col)] {
                    candidates.push(TreeTop {
                        row,
                        col,
                        height: raw,
                    });
                }
            }
        }

        let accepted = suppress(candidates, self.config.min_distance, chm.grid.resolution);
        log::debug!("{} tree tops accepted", accepted.len());
        Ok(accepted)
    }
}

/// Non-maximum suppression: visit candidates tallest first (stable on ties)
/// and keep one only if every kept top is at least `min_distance` away.
pub fn suppress(mut candidates: Vec<TreeTop>, min_distance: f64, resolution: f64) -> Vec<TreeTop> {
    candidates.sort_by(|a, b| b.height.total_cmp(&a.height));
    let total = candidates.len();
    let mut accepted: Vec<TreeTop> = Vec::with_capacity(total);
    for candidate in candidates {
        if accepted
            .iter()
            .all(|top| top.distance(&candidate, resolution) >= min_distance)
        {
            accepted.push(candidate);
        }
    }
    if accepted.len() < total {
        log::debug!("Suppressed {} of {} candidates", total - accepted.len(), total);
    }
    accepted
}
