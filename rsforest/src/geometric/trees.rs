//! Per-tree attribute records and their GeoJSON export.

use std::f64::consts::PI;
use std::path::Path;

use anyhow::Context;
use geo::Point;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};
use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::commons::basic_functions::percentile;
use crate::commons::global_variables::CROWN_BASE_PERCENTILE;
use crate::geometric::chm::CanopyHeightModel;
use crate::geometric::crowns::Segmentation;
use crate::geometric::tree_tops::TreeTop;

/// One detected tree of an epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeRecord {
    /// 1-based rank, tallest first; equals the crown label
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub height: f64,
    pub crown_diameter: Option<f64>,
    pub crown_area: Option<f64>,
    pub crown_base_height: Option<f64>,
    pub point_count: u32,
    pub dbh: Option<f64>,
}

impl TreeRecord {
    /// Record with a position and height only, as supplied by an external
    /// inventory.
    pub fn new(id: u32, x: f64, y: f64, height: f64) -> Self {
        TreeRecord {
            id,
            x,
            y,
            height,
            crown_diameter: None,
            crown_area: None,
            crown_base_height: None,
            point_count: 0,
            dbh: None,
        }
    }

    pub fn point(&self) -> Point<f64> {
        Point::new(self.x, self.y)
    }

    /// Position and height are all finite.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.height.is_finite()
    }
}

/// Allometric collaborator: species- and region-specific equations live
/// outside this crate.
pub trait Allometry: Send + Sync {
    /// Diameter at breast height (cm) from total height (m).
    fn estimate_dbh(&self, height: f64) -> Option<f64>;

    /// Stored carbon (kg) of a tree.
    fn estimate_carbon_kg(&self, tree: &TreeRecord) -> Option<f64>;
}

/// Allometry that knows nothing; DBH and carbon stay unset.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAllometry;

impl Allometry for NoAllometry {
    fn estimate_dbh(&self, _height: f64) -> Option<f64> {
        None
    }

    fn estimate_carbon_kg(&self, _tree: &TreeRecord) -> Option<f64> {
        None
    }
}

pub struct TreeRecordExtractor<'a> {
    allometry: &'a dyn Allometry,
}

impl<'a> TreeRecordExtractor<'a> {
    pub fn new(allometry: &'a dyn Allometry) -> Self {
        TreeRecordExtractor { allometry }
    }

    /// One record per tree top, in tree-top order. Crown attributes are
    /// `None` when the top's segment is empty.
    pub fn extract(
        &self,
        tops: &[TreeTop],
        segmentation: &Segmentation,
        model: &CanopyHeightModel,
    ) -> Vec<TreeRecord> {
        let grid = model.grid();
        let cells = segmentation.cells_by_segment();

        tops.iter()
            .enumerate()
            .map(|(rank, top)| {
                let segment = cells.get(rank).map(Vec::as_slice).unwrap_or(&[]);
                let (x, y) = top.position(grid);
                let (crown_area, crown_diameter, crown_base_height) = if segment.is_empty() {
                    (None, None, None)
                } else {
                    let area = segment.len() as f64 * grid.cell_area();
                    let heights: Vec<f64> = segment.iter().map(|&i| model.chm.data[i]).collect();
                    (
                        Some(area),
                        Some(2.0 * (area / PI).sqrt()),
                        percentile(&heights, CROWN_BASE_PERCENTILE),
                    )
                };
                let point_count = segment.iter().map(|&i| model.point_counts[i]).sum();

                TreeRecord {
                    id: rank as u32 + 1,
                    x,
                    y,
                    height: top.height,
                    crown_diameter,
                    crown_area,
                    crown_base_height,
                    point_count,
                    dbh: self.allometry.estimate_dbh(top.height),
                }
            })
            .collect()
    }
}

/// Tree records as a GeoJSON FeatureCollection of points.
pub fn to_geojson(trees: &[TreeRecord]) -> GeoJson {
    let features = trees
        .iter()
        .map(|tree| {
            let geometry = Geometry::new(Value::Point(vec![tree.x, tree.y]));
            let mut properties = Map::new();
            properties.insert("id".to_string(), tree.id.into());
            properties.insert("height".to_string(), tree.height.into());
            properties.insert("point_count".to_string(), tree.point_count.into());
            for (key, value) in [
                ("crown_diameter", tree.crown_diameter),
                ("crown_area", tree.crown_area),
                ("crown_base_height", tree.crown_base_height),
                ("dbh", tree.dbh),
            ] {
                if let Some(v) = value {
                    properties.insert(key.to_string(), v.into());
                }
            }

            let mut feature = Feature::from(geometry);
            feature.properties = Some(properties);
            feature
        })
        .collect();

    GeoJson::from(FeatureCollection {
        bbox: None,
        foreign_members: None,
        features,
    })
}

/// Write tree records to a `.geojson` file.
pub fn write_geojson<P: AsRef<Path>>(trees: &[TreeRecord], path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    std::fs::write(path, to_geojson(trees).to_string())
        .with_context(|| format!("Failed to write GeoJSON file: {:?}", path))?;
    log::info!("{} trees saved to: {:?}", trees.len(), path);
    Ok(())
}
