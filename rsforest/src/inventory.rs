//! Single-epoch tree inventory: ground surface, canopy height model, tree
//! tops, crowns and tree records from one classified point cloud.

use std::path::Path;

use serde::Serialize;

use crate::config::InventoryConfig;
use crate::error::Result;
use crate::geo_core::GridSpec;
use crate::geometric::chm::{CanopyHeightBuilder, CanopyHeightModel};
use crate::geometric::crowns::{CrownSegmenter, Segmentation, SegmentationMethod};
use crate::geometric::ground::{GroundSurfaceInterpolator, SurfaceMethod};
use crate::geometric::raster::Raster;
use crate::geometric::tree_tops::TreeTopDetector;
use crate::geometric::trees::{self, Allometry, TreeRecord, TreeRecordExtractor};
use crate::point_cloud::PointCloud;

/// What happened during a run.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryDiagnostics {
    pub point_count: usize,
    pub ground_point_count: usize,
    pub grid: GridSpec,
    pub surface_method: Option<SurfaceMethod>,
    pub search_radius: Option<f64>,
    pub filled_dem_cells: usize,
    pub segmentation_method: Option<SegmentationMethod>,
    pub tree_count: usize,
}

/// Trees of one epoch together with the intermediate rasters.
#[derive(Debug, Clone)]
pub struct TreeInventory {
    pub trees: Vec<TreeRecord>,
    pub dem: Option<Raster>,
    pub canopy: Option<CanopyHeightModel>,
    pub segmentation: Option<Segmentation>,
    pub diagnostics: InventoryDiagnostics,
}

impl TreeInventory {
    /// Run the whole detection pipeline on `points`.
    ///
    /// An empty cloud (or one without a finite point) yields an empty
    /// inventory. Fewer than 3 ground points, columns of unequal length and
    /// an extent too large to rasterize are errors.
    pub fn run(points: &PointCloud, config: &InventoryConfig, allometry: &dyn Allometry) -> Result<Self> {
        config.validate()?;
        points.validate()?;

        let Some(bounds) = points.bounds() else {
            log::info!("Empty point cloud, no trees to detect");
            return Ok(Self::empty(points.len(), config.resolution));
        };

        let grid = GridSpec::covering(&bounds, config.resolution)?;
        let ground = points.ground_points();
        log::info!(
            "Detecting trees in {} points ({} ground) on a {}x{} grid",
            points.len(),
            ground.len(),
            grid.rows,
            grid.cols
        );

        let surface = GroundSurfaceInterpolator::new(&config.surface).interpolate(&ground, &grid)?;
        let canopy = CanopyHeightBuilder::new(&config.canopy).build(points, &surface.dem, &grid)?;
        let tops = TreeTopDetector::new(&config.detection).detect(&canopy.chm)?;
        let segmentation =
            CrownSegmenter::new(&config.segmentation, config.detection.min_height).segment(&canopy.chm, &tops);
        let trees = TreeRecordExtractor::new(allometry).extract(&tops, &segmentation, &canopy);
        log::info!("{} trees detected", trees.len());

        Ok(TreeInventory {
            diagnostics: InventoryDiagnostics {
                point_count: points.len(),
                ground_point_count: ground.len(),
                grid,
                surface_method: Some(surface.method),
                search_radius: surface.search_radius,
                filled_dem_cells: surface.filled_cells,
                segmentation_method: Some(segmentation.method),
                tree_count: trees.len(),
            },
            trees,
            dem: Some(surface.dem),
            canopy: Some(canopy),
            segmentation: Some(segmentation),
        })
    }

    fn empty(point_count: usize, resolution: f64) -> Self {
        TreeInventory {
            trees: Vec::new(),
            dem: None,
            canopy: None,
            segmentation: None,
            diagnostics: InventoryDiagnostics {
                point_count,
                ground_point_count: 0,
                grid: GridSpec::empty(resolution),
                surface_method: None,
                search_radius: None,
                filled_dem_cells: 0,
                segmentation_method: None,
                tree_count: 0,
            },
        }
    }

    pub fn to_geojson(&self) -> geojson::GeoJson {
        trees::to_geojson(&self.trees)
    }

    pub fn write_geojson<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        trees::write_geojson(&self.trees, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commons::global_variables::GROUND_CLASS;
    use crate::config::InterpolationMethod;
    use crate::error::ForestError;
    use crate::geometric::trees::NoAllometry;

    const VEGETATION_CLASS: u8 = 5;

    fn ground_z(x: f64) -> f64 {
        100.0 + 0.05 * x
    }

    /// 40 x 30 m sloping plot with two conical crowns.
    fn plot() -> PointCloud {
        let mut cloud = PointCloud::new();
        for i in 0..=40 {
            for j in 0..=30 {
                // Slight jitter keeps the lattice from being cocircular
                let x = i as f64 + ((i * 7 + j * 3) % 5) as f64 * 0.02;
                let y = j as f64 + ((i * 3 + j * 11) % 7) as f64 * 0.02;
                cloud.push(x, y, ground_z(x), GROUND_CLASS);
            }
        }
        for &(cx, cy, apex) in &[(10.0, 15.0, 18.0), (30.0, 15.0, 14.0)] {
            for i in -8..=8 {
                for j in -8..=8 {
                    let (dx, dy) = (i as f64 * 0.5, j as f64 * 0.5);
                    let d = (dx * dx + dy * dy).sqrt();
                    if d <= 4.0 {
                        let (x, y) = (cx + dx, cy + dy);
                        cloud.push(x, y, ground_z(x) + apex - 1.5 * d, VEGETATION_CLASS);
                    }
                }
            }
        }
        cloud
    }

    fn check_two_trees(inventory: &TreeInventory) {
        assert_eq!(inventory.trees.len(), 2);
        let (tall, short) = (&inventory.trees[0], &inventory.trees[1]);
        assert_eq!((tall.id, short.id), (1, 2));
        assert!((tall.x - 10.0).abs() <= 2.0 && (tall.y - 15.0).abs() <= 2.0);
        assert!((short.x - 30.0).abs() <= 2.0 && (short.y - 15.0).abs() <= 2.0);
        assert!(tall.height > 15.0 && tall.height < 18.5);
        assert!(short.height > 11.0 && short.height < 14.5);
        for tree in &inventory.trees {
            let area = tree.crown_area.unwrap();
            assert!(area > 20.0 && area < 120.0);
            assert!(tree.crown_base_height.unwrap() < tree.height);
            assert!(tree.point_count > 0);
        }
    }

    #[test]
    fn test_two_tree_plot() {
        let inventory = TreeInventory::run(&plot(), &InventoryConfig::default(), &NoAllometry).unwrap();
        check_two_trees(&inventory);
        let d = &inventory.diagnostics;
        assert_eq!(d.surface_method, Some(SurfaceMethod::Idw));
        assert_eq!(d.segmentation_method, Some(SegmentationMethod::Watershed));
        assert_eq!((d.grid.rows, d.grid.cols), (31, 41));
        assert_eq!(d.ground_point_count, 41 * 31);
        assert_eq!(inventory.dem.as_ref().unwrap().count_nan(), 0);
        let chm = &inventory.canopy.as_ref().unwrap().chm;
        assert!(chm.data.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_two_tree_plot_with_tin() {
        let mut config = InventoryConfig::default();
        config.surface.method = InterpolationMethod::Tin;
        let inventory = TreeInventory::run(&plot(), &config, &NoAllometry).unwrap();
        assert_eq!(inventory.diagnostics.surface_method, Some(SurfaceMethod::Tin));
        check_two_trees(&inventory);
    }

    #[test]
    fn test_empty_cloud_detects_nothing() {
        let inventory = TreeInventory::run(&PointCloud::new(), &InventoryConfig::default(), &NoAllometry).unwrap();
        assert!(inventory.trees.is_empty());
        assert!(inventory.dem.is_none());
        assert_eq!(inventory.diagnostics.tree_count, 0);
    }

    #[test]
    fn test_without_ground_is_an_error() {
        let mut cloud = PointCloud::new();
        for i in 0..10 {
            cloud.push(i as f64, 0.0, 110.0, VEGETATION_CLASS);
        }
        let result = TreeInventory::run(&cloud, &InventoryConfig::default(), &NoAllometry);
        assert!(matches!(result, Err(ForestError::InsufficientGroundPoints { found: 0 })));
    }

    #[test]
    fn test_malformed_clouds_are_rejected() {
        let mut cloud = plot();
        cloud.z.pop();
        let result = TreeInventory::run(&cloud, &InventoryConfig::default(), &NoAllometry);
        assert!(matches!(result, Err(ForestError::ColumnLengthMismatch { .. })));

        // One stray return 10 000 km away
        let mut cloud = plot();
        cloud.push(1.0e7, 15.0, 100.0, VEGETATION_CLASS);
        cloud.push(0.0, 1.0e7, 100.0, VEGETATION_CLASS);
        let result = TreeInventory::run(&cloud, &InventoryConfig::default(), &NoAllometry);
        assert!(matches!(result, Err(ForestError::GridTooLarge { .. })));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = InventoryConfig::default();
        config.detection.min_height = -2.0;
        let result = TreeInventory::run(&plot(), &config, &NoAllometry);
        assert!(matches!(result, Err(ForestError::InvalidConfig { .. })));
    }

    #[test]
    fn test_geojson_export_of_inventory() {
        let inventory = TreeInventory::run(&plot(), &InventoryConfig::default(), &NoAllometry).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.geojson");
        inventory.write_geojson(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("FeatureCollection"));
        assert!(text.contains("crown_area"));
    }
}
