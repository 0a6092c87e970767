//! Ground surface (DEM) interpolation from ground-classified returns.
//!
//! Two strategies are available: inverse distance weighting over an R*-tree
//! radius query, and linear interpolation on a Delaunay TIN. Both leave
//! uncovered cells unset and finish with a nearest-valid-cell fill, so the
//! returned DEM never contains NaN.

use rstar::primitives::GeomWithData;
use rstar::RTree;
use serde::{Deserialize, Serialize};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::commons::global_variables::{MIN_IDW_DISTANCE, SEARCH_RADIUS_SPACING_FACTOR};
use crate::config::{InterpolationMethod, SurfaceConfig};
use crate::error::{ensure_positive, ForestError, Result};
use crate::geo_core::{BoundingBox, GridSpec};
use crate::geometric::delaunay::triangulate;
use crate::geometric::raster::Raster;
use crate::point_cloud::PointCloud;

type ElevationPoint = GeomWithData<[f64; 2], f64>;

/// Strategy that actually produced a DEM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceMethod {
    Idw,
    Tin,
    /// TIN was requested but the triangulation was degenerate.
    IdwFallback,
}

/// Interpolated ground surface.
#[derive(Debug, Clone)]
pub struct GroundSurface {
    pub dem: Raster,
    pub method: SurfaceMethod,
    /// IDW search radius used, `None` for a TIN surface.
    pub search_radius: Option<f64>,
    /// Cells that received their value from the nearest-valid fill.
    pub filled_cells: usize,
}

/// Builds a dense DEM on a target grid from ground points.
pub struct GroundSurfaceInterpolator<'a> {
    config: &'a SurfaceConfig,
}

impl<'a> GroundSurfaceInterpolator<'a> {
    pub fn new(config: &'a SurfaceConfig) -> Self {
        GroundSurfaceInterpolator { config }
    }

    /// Interpolate `ground` (already filtered to ground returns) onto `grid`.
    ///
    /// Fails with [`ForestError::InsufficientGroundPoints`] when fewer than 3
    /// finite ground points are available. A degenerate TIN is not an error:
    /// the surface is rebuilt with IDW and reported as
    /// [`SurfaceMethod::IdwFallback`].
    pub fn interpolate(&self, ground: &PointCloud, grid: &GridSpec) -> Result<GroundSurface> {
        ensure_positive("idw_power", self.config.idw_power)?;
        ground.validate()?;
        let samples = finite_samples(ground);
        if samples.len() < 3 {
            return Err(ForestError::InsufficientGroundPoints {
                found: samples.len(),
            });
        }

        match self.config.method {
            InterpolationMethod::Idw => self.idw(&samples, grid, SurfaceMethod::Idw),
            InterpolationMethod::Tin => match tin(&samples, grid) {
                Ok(surface) => Ok(surface),
                Err(ForestError::DegenerateTriangulation(reason)) => {
                    log::warn!("TIN interpolation failed ({}), falling back to IDW", reason);
                    self.idw(&samples, grid, SurfaceMethod::IdwFallback)
                }
                Err(e) => Err(e),
            },
        }
    }

    fn idw(&self, samples: &[[f64; 3]], grid: &GridSpec, method: SurfaceMethod) -> Result<GroundSurface> {
        let radius = match self.config.search_radius {
            Some(r) => {
                ensure_positive("search_radius", r)?;
                r
            }
            None => auto_search_radius(samples, grid.resolution),
        };
        log::debug!(
            "IDW over {} ground points, radius {:.3}, power {}",
            samples.len(),
            radius,
            self.config.idw_power
        );

        let tree = elevation_tree(samples);
        let mut dem = Raster::new(*grid, f64::NAN);
        let power = self.config.idw_power;
        let r2 = radius * radius;

        if !grid.is_empty() {
            let fill_row = |row: usize, out: &mut [f64]| {
                for (col, cell) in out.iter_mut().enumerate() {
                    let (x, y) = grid.cell_position(row, col);
                    let mut sum = 0.0;
                    let mut wsum = 0.0;
                    for p in tree.locate_within_distance([x, y], r2) {
                        let [px, py] = *p.geom();
                        let d = ((px - x).powi(2) + (py - y).powi(2)).sqrt().max(MIN_IDW_DISTANCE);
                        let w = 1.0 / d.powf(power);
                        sum += w * p.data;
                        wsum += w;
                    }
                    if wsum > 0.0 {
                        *cell = sum / wsum;
                    }
                }
            };

            #[cfg(feature = "rayon")]
            dem.data
                .par_chunks_mut(grid.cols)
                .enumerate()
                .for_each(|(row, out)| fill_row(row, out));

            #[cfg(not(feature = "rayon"))]
            dem.data
                .chunks_mut(grid.cols)
                .enumerate()
                .for_each(|(row, out)| fill_row(row, out));
        }

        let filled_cells = fill_nearest(&mut dem, &tree);
        Ok(GroundSurface {
            dem,
            method,
            search_radius: Some(radius),
            filled_cells,
        })
    }
}

/// Finite `[x, y, z]` triples of a point cloud.
fn finite_samples(points: &PointCloud) -> Vec<[f64; 3]> {
    points
        .finite_indices()
        .map(|i| [points.x[i], points.y[i], points.z[i]])
        .collect()
}

fn elevation_tree(samples: &[[f64; 3]]) -> RTree<ElevationPoint> {
    RTree::bulk_load(
        samples
            .iter()
            .map(|s| ElevationPoint::new([s[0], s[1]], s[2]))
            .collect(),
    )
}

/// `3 × sqrt(bbox_area / n)`; falls back to the grid resolution when the
/// points have no area (all on one line).
pub fn auto_search_radius(samples: &[[f64; 3]], resolution: f64) -> f64 {
    let xs: Vec<f64> = samples.iter().map(|s| s[0]).collect();
    let ys: Vec<f64> = samples.iter().map(|s| s[1]).collect();
    let area = BoundingBox::from_coords(&xs, &ys).map_or(0.0, |b| b.area());
    let spacing = if area > 0.0 && !samples.is_empty() {
        (area / samples.len() as f64).sqrt()
    } else {
        resolution
    };
    SEARCH_RADIUS_SPACING_FACTOR * spacing
}

fn tin(samples: &[[f64; 3]], grid: &GridSpec) -> Result<GroundSurface> {
    let xs: Vec<f64> = samples.iter().map(|s| s[0]).collect();
    let ys: Vec<f64> = samples.iter().map(|s| s[1]).collect();
    let tin = triangulate(&xs, &ys)?;
    log::debug!(
        "TIN with {} vertices and {} triangles",
        tin.vertices.len(),
        tin.triangles.len()
    );

    let mut dem = Raster::new(*grid, f64::NAN);
    if !grid.is_empty() {
        let res = grid.resolution;
        for t in 0..tin.triangles.len() {
            let (min_x, min_y, max_x, max_y) = tin.triangle_bounds(t);
            let Some((c0, c1)) = index_span(min_x, max_x, grid.x_min, res, grid.cols) else {
                continue;
            };
            let Some((r0, r1)) = index_span(min_y, max_y, grid.y_min, res, grid.rows) else {
                continue;
            };
            let z = tin.triangles[t].map(|v| samples[tin.source_index[v]][2]);
            for row in r0..=r1 {
                for col in c0..=c1 {
                    if !dem.get(row, col).is_nan() {
                        continue;
                    }
                    let (x, y) = grid.cell_position(row, col);
                    if let Some([l1, l2, l3]) = tin.barycentric(t, x, y) {
                        dem.set(row, col, l1 * z[0] + l2 * z[1] + l3 * z[2]);
                    }
                }
            }
        }
    }

    let filled_cells = fill_nearest(&mut dem, &elevation_tree(samples));
    Ok(GroundSurface {
        dem,
        method: SurfaceMethod::Tin,
        search_radius: None,
        filled_cells,
    })
}

/// Inclusive range of cell indices whose positions fall in `[lo, hi]`.
fn index_span(lo: f64, hi: f64, origin: f64, res: f64, dim: usize) -> Option<(usize, usize)> {
    if dim == 0 {
        return None;
    }
    let first = ((lo - origin) / res).ceil().max(0.0);
    let last = ((hi - origin) / res).floor().min((dim - 1) as f64);
    if last < first {
        None
    } else {
        Some((first as usize, last as usize))
    }
}

/// Fill NaN cells with the value of the nearest valid cell (Euclidean, in
/// cell units). When no cell is valid, each cell takes the elevation of the
/// nearest ground point. Returns the number of cells filled.
pub(crate) fn fill_nearest(dem: &mut Raster, ground: &RTree<ElevationPoint>) -> usize {
    let cols = dem.cols();
    let mut valid: Vec<GeomWithData<[f64; 2], f64>> = Vec::new();
    let mut missing: Vec<usize> = Vec::new();
    for (idx, &v) in dem.data.iter().enumerate() {
        if v.is_nan() {
            missing.push(idx);
        } else {
            valid.push(GeomWithData::new([(idx / cols) as f64, (idx % cols) as f64], v));
        }
    }
    if missing.is_empty() {
        return 0;
    }

    if valid.is_empty() {
        log::warn!("No DEM cell was interpolated, using nearest ground point elevations");
        for &idx in &missing {
            let (x, y) = dem.grid.cell_position(idx / cols, idx % cols);
            if let Some(p) = ground.nearest_neighbor(&[x, y]) {
                dem.data[idx] = p.data;
            }
        }
        return missing.len();
    }

    let cells = RTree::bulk_load(valid);
    for &idx in &missing {
        let query = [(idx / cols) as f64, (idx % cols) as f64];
        if let Some(nearest) = cells.nearest_neighbor(&query) {
            dem.data[idx] = nearest.data;
        }
    }
    log::debug!("Filled {} DEM cells from nearest valid neighbours", missing.len());
    missing.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commons::global_variables::GROUND_CLASS;

    fn plane_ground(n: usize, spacing: f64) -> PointCloud {
        // z = 100 + 0.1 x + 0.2 y on a jittered lattice
        let mut cloud = PointCloud::new();
        for i in 0..n {
            for j in 0..n {
                let x = i as f64 * spacing + ((i * 7 + j * 3) % 5) as f64 * 0.05;
                let y = j as f64 * spacing + ((i * 3 + j * 11) % 7) as f64 * 0.05;
                cloud.push(x, y, 100.0 + 0.1 * x + 0.2 * y, GROUND_CLASS);
            }
        }
        cloud
    }

    fn grid(rows: usize, cols: usize, res: f64) -> GridSpec {
        GridSpec::new(0.0, 0.0, res, rows, cols).unwrap()
    }

    #[test]
    fn test_idw_dense_and_shaped() {
        let ground = plane_ground(10, 2.0);
        let config = SurfaceConfig::default();
        let surface = GroundSurfaceInterpolator::new(&config)
            .interpolate(&ground, &grid(25, 30, 1.0))
            .unwrap();
        assert_eq!(surface.method, SurfaceMethod::Idw);
        assert_eq!(surface.dem.rows(), 25);
        assert_eq!(surface.dem.cols(), 30);
        assert_eq!(surface.dem.count_nan(), 0);
        // Radius = 3 x average spacing, roughly 3 x 2 m here
        let radius = surface.search_radius.unwrap();
        assert!(radius > 5.0 && radius < 7.0);
    }

    #[test]
    fn test_idw_exact_at_sample() {
        let mut ground = PointCloud::new();
        ground.push(0.0, 0.0, 10.0, GROUND_CLASS);
        ground.push(4.0, 0.0, 20.0, GROUND_CLASS);
        ground.push(0.0, 4.0, 30.0, GROUND_CLASS);
        let config = SurfaceConfig {
            search_radius: Some(100.0),
            ..SurfaceConfig::default()
        };
        let surface = GroundSurfaceInterpolator::new(&config)
            .interpolate(&ground, &grid(5, 5, 1.0))
            .unwrap();
        // Distance floored at 1e-10: the sample dominates its own cell
        assert!((surface.dem.get(0, 0) - 10.0).abs() < 1e-6);
        assert!((surface.dem.get(0, 4) - 20.0).abs() < 1e-6);
        assert!((surface.dem.get(4, 0) - 30.0).abs() < 1e-6);
        let mid = surface.dem.get(2, 2);
        assert!(mid > 10.0 && mid < 30.0);
    }

    #[test]
    fn test_idw_small_radius_is_filled() {
        let mut ground = PointCloud::new();
        ground.push(0.0, 0.0, 1.0, GROUND_CLASS);
        ground.push(9.0, 0.0, 2.0, GROUND_CLASS);
        ground.push(0.0, 9.0, 3.0, GROUND_CLASS);
        let config = SurfaceConfig {
            search_radius: Some(0.5),
            ..SurfaceConfig::default()
        };
        let surface = GroundSurfaceInterpolator::new(&config)
            .interpolate(&ground, &grid(10, 10, 1.0))
            .unwrap();
        assert_eq!(surface.dem.count_nan(), 0);
        assert_eq!(surface.filled_cells, 97);
        // Nearest valid cell of (1, 1) is (0, 0)
        assert_eq!(surface.dem.get(1, 1), 1.0);
        assert_eq!(surface.dem.get(0, 8), 2.0);
        assert_eq!(surface.dem.get(8, 0), 3.0);
    }

    #[test]
    fn test_no_interpolated_cell_uses_nearest_ground_point() {
        let mut ground = PointCloud::new();
        ground.push(0.5, 0.5, 4.0, GROUND_CLASS);
        ground.push(3.5, 0.5, 6.0, GROUND_CLASS);
        ground.push(0.5, 3.5, 8.0, GROUND_CLASS);
        let config = SurfaceConfig {
            search_radius: Some(0.1),
            ..SurfaceConfig::default()
        };
        let surface = GroundSurfaceInterpolator::new(&config)
            .interpolate(&ground, &grid(4, 4, 1.0))
            .unwrap();
        assert_eq!(surface.dem.count_nan(), 0);
        assert_eq!(surface.filled_cells, 16);
        assert_eq!(surface.dem.get(0, 0), 4.0);
        assert_eq!(surface.dem.get(0, 3), 6.0);
        assert_eq!(surface.dem.get(3, 0), 8.0);
    }

    #[test]
    fn test_tin_reproduces_plane() {
        let ground = plane_ground(8, 3.0);
        let config = SurfaceConfig {
            method: InterpolationMethod::Tin,
            ..SurfaceConfig::default()
        };
        let surface = GroundSurfaceInterpolator::new(&config)
            .interpolate(&ground, &grid(22, 22, 1.0))
            .unwrap();
        assert_eq!(surface.method, SurfaceMethod::Tin);
        assert_eq!(surface.dem.count_nan(), 0);
        // Linear interpolation is exact on a plane inside the hull
        for row in 2..20 {
            for col in 2..20 {
                let (x, y) = surface.dem.grid.cell_position(row, col);
                let expected = 100.0 + 0.1 * x + 0.2 * y;
                assert!((surface.dem.get(row, col) - expected).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_tin_colinear_falls_back_to_idw() {
        let mut ground = PointCloud::new();
        for i in 0..5 {
            ground.push(i as f64, i as f64, 10.0 + i as f64, GROUND_CLASS);
        }
        let config = SurfaceConfig {
            method: InterpolationMethod::Tin,
            ..SurfaceConfig::default()
        };
        let surface = GroundSurfaceInterpolator::new(&config)
            .interpolate(&ground, &grid(6, 6, 1.0))
            .unwrap();
        assert_eq!(surface.method, SurfaceMethod::IdwFallback);
        assert_eq!(surface.dem.count_nan(), 0);
        assert!(surface.search_radius.is_some());
    }

    #[test]
    fn test_insufficient_ground_points() {
        let mut ground = PointCloud::new();
        ground.push(0.0, 0.0, 1.0, GROUND_CLASS);
        ground.push(1.0, 0.0, 1.0, GROUND_CLASS);
        ground.push(f64::NAN, 0.0, 1.0, GROUND_CLASS);
        let config = SurfaceConfig::default();
        let result = GroundSurfaceInterpolator::new(&config).interpolate(&ground, &grid(3, 3, 1.0));
        assert!(matches!(
            result,
            Err(ForestError::InsufficientGroundPoints { found: 2 })
        ));
    }

    #[test]
    fn test_index_span() {
        assert_eq!(index_span(0.5, 3.2, 0.0, 1.0, 10), Some((1, 3)));
        assert_eq!(index_span(-5.0, 20.0, 0.0, 1.0, 10), Some((0, 9)));
        assert_eq!(index_span(0.2, 0.8, 0.0, 1.0, 10), None);
    }

    #[test]
    fn test_auto_search_radius() {
        let samples = [[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [0.0, 10.0, 0.0], [10.0, 10.0, 0.0]];
        // sqrt(100 / 4) = 5, times 3
        assert!((auto_search_radius(&samples, 1.0) - 15.0).abs() < 1e-12);
        let line = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]];
        assert!((auto_search_radius(&line, 0.5) - 1.5).abs() < 1e-12);
    }
}
