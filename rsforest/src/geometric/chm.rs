//! Canopy height model: height-normalized points rasterized by per-cell maximum.

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::config::CanopyConfig;
use crate::error::Result;
use crate::geo_core::GridSpec;
use crate::geometric::filters::gaussian_smooth;
use crate::geometric::raster::Raster;
use crate::point_cloud::PointCloud;

/// CHM raster plus the number of points that fell in each cell.
#[derive(Debug, Clone)]
pub struct CanopyHeightModel {
    pub chm: Raster,
    /// Row-major, same shape as `chm`
    pub point_counts: Vec<u32>,
}

impl CanopyHeightModel {
    pub fn grid(&self) -> &GridSpec {
        &self.chm.grid
    }

    pub fn point_count(&self, row: usize, col: usize) -> u32 {
        if row < self.chm.rows() && col < self.chm.cols() {
            self.point_counts[self.chm.grid.index(row, col)]
        } else {
            0
        }
    }
}

pub struct CanopyHeightBuilder<'a> {
    config: &'a CanopyConfig,
}

impl<'a> CanopyHeightBuilder<'a> {
    pub fn new(config: &'a CanopyConfig) -> Self {
        CanopyHeightBuilder { config }
    }

    /// Rasterize `points` onto `grid`, normalizing each height by the DEM
    /// value of its cell.
    ///
    /// Points outside the grid are clamped into the border cells. Points
    /// with a non-finite coordinate are ignored. The result is smoothed with
    /// `sigma` and clipped to `>= 0`.
    pub fn build(&self, points: &PointCloud, dem: &Raster, grid: &GridSpec) -> Result<CanopyHeightModel> {
        points.validate()?;
        dem.ensure_same_shape(grid)?;
        let indices: Vec<usize> = points.finite_indices().collect();
        if indices.len() < points.len() {
            log::debug!(
                "Ignoring {} points with non-finite coordinates",
                points.len() - indices.len()
            );
        }

        let (heights, counts) = scatter_max(points, &indices, dem, grid);
        let raw = Raster {
            grid: *grid,
            data: heights,
        };
        let chm = gaussian_smooth(&raw, self.config.sigma).map(|v| v.max(0.0));
        log::debug!(
            "CHM {}x{} built from {} points, max height {:.2}",
            grid.rows,
            grid.cols,
            indices.len(),
            chm.max_value().unwrap_or(0.0)
        );
        Ok(CanopyHeightModel {
            chm,
            point_counts: counts,
        })
    }
}

fn scatter_into(
    points: &PointCloud,
    i: usize,
    dem: &Raster,
    grid: &GridSpec,
    heights: &mut [f64],
    counts: &mut [u32],
) {
    let (row, col) = grid.cell_of(points.x[i], points.y[i]);
    let idx = grid.index(row, col);
    let h = points.z[i] - dem.data[idx];
    if h > heights[idx] {
        heights[idx] = h;
    }
    counts[idx] += 1;
}

#[cfg(feature = "rayon")]
fn scatter_max(points: &PointCloud, indices: &[usize], dem: &Raster, grid: &GridSpec) -> (Vec<f64>, Vec<u32>) {
    let n = grid.len();
    if n == 0 {
        return (Vec::new(), Vec::new());
    }
    indices
        .par_chunks(4096)
        .fold(
            || (vec![0.0; n], vec![0u32; n]),
            |(mut heights, mut counts), chunk| {
                for &i in chunk {
                    scatter_into(points, i, dem, grid, &mut heights, &mut counts);
                }
                (heights, counts)
            },
        )
        .reduce(
            || (vec![0.0; n], vec![0u32; n]),
            |(mut h1, mut c1), (h2, c2)| {
                for (a, b) in h1.iter_mut().zip(h2) {
                    *a = a.max(b);
                }
                for (a, b) in c1.iter_mut().zip(c2) {
                    *a += b;
                }
                (h1, c1)
            },
        )
}

#[cfg(not(feature = "rayon"))]
fn scatter_max(points: &PointCloud, indices: &[usize], dem: &Raster, grid: &GridSpec) -> (Vec<f64>, Vec<u32>) {
    let n = grid.len();
    let mut heights = vec![0.0; n];
    let mut counts = vec![0u32; n];
    if n > 0 {
        for &i in indices {
            scatter_into(points, i, dem, grid, &mut heights, &mut counts);
        }
    }
    (heights, counts)
}
