/// ASPRS classification code of ground returns.
pub const GROUND_CLASS: u8 = 2;

/// Floor applied to IDW distances so a point sitting on a cell never divides by zero.
pub const MIN_IDW_DISTANCE: f64 = 1e-10;

/// Multiple of the average ground point spacing used as automatic IDW search radius.
pub const SEARCH_RADIUS_SPACING_FACTOR: f64 = 3.0;

/// Percentile of in-crown CHM values reported as crown base height.
pub const CROWN_BASE_PERCENTILE: f64 = 10.0;

pub const DAYS_PER_YEAR: f64 = 365.25;

/// Largest raster, in cells, a single inventory run may allocate.
pub const MAX_GRID_CELLS: usize = 100_000_000;
