//! Individual tree detection from classified airborne LiDAR point clouds and
//! tree-level change tracking across repeat acquisitions.
//!
//! The single-epoch pipeline runs ground surface interpolation, canopy height
//! model rasterization, tree-top detection, crown segmentation and record
//! extraction ([`inventory::TreeInventory`]). Inventories of several dated
//! epochs are then matched and classified in [`change`].

pub mod change;
pub mod commons;
pub mod config;
pub mod error;
pub mod geo_core;
pub mod geometric;
pub mod inventory;
pub mod point_cloud;

pub use change::series::{Epoch, EpochChange, TimeSeries};
pub use config::{InventoryConfig, MatchingConfig};
pub use error::{ForestError, Result};
pub use geometric::trees::{Allometry, NoAllometry, TreeRecord};
pub use inventory::TreeInventory;
pub use point_cloud::PointCloud;
