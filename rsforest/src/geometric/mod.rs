pub mod chm;
pub mod crowns;
pub mod delaunay;
pub mod filters;
pub mod ground;
pub mod raster;
pub mod tree_tops;
pub mod trees;
