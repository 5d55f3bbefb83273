//! Rectangular grids for mapping gridded quantities around a city.
//!
//! Every numeric array attached to a grid (emissions, concentrations,
//! population) is index-aligned with the cell order produced here, so the
//! ordering is part of the contract: rows from south to north, cells from
//! west to east within a row.
//!
//! Cells snap to the lattice `k * dx` rather than to the buffered bounds.
//! Two regions that overlap therefore share cell edges, and the same input
//! always yields bit-identical coordinates.

use thiserror::Error;

use crate::geom::{Bounds, GeometryError, Point, Polygon};

/// Fraction of the region's mean side length added on every side.
pub const BUFFER_FRACTION: f64 = 0.1;

/// Cell size for sources allocated over a country/buffer-scale grid.
pub const EGUGRID_RESOLUTION: f64 = 0.1;

/// Cell size for the regions listed in [`COARSE_REGIONS`].
pub const COARSE_RESOLUTION: f64 = 0.005;

/// Default cell size.
pub const DEFAULT_RESOLUTION: f64 = 0.002;

/// Regions too large to map at the default resolution in reasonable time.
pub const COARSE_REGIONS: &[&str] = &["Guadalajara", "Tokyo", "Melbourne"];

/// Suffix marking source types allocated over the egugrid region.
pub const EGUGRID_SUFFIX: &str = "_egugrid";

/// Errors raised while building a grid.
#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("invalid cell size {0}")]
    InvalidCellSize(f64),

    #[error("cannot grid region: {0}")]
    Region(#[from] GeometryError),

    #[error("grid for region is empty")]
    Empty,
}

/// Whether a source type is allocated over the egugrid region instead of the
/// city itself.
pub fn is_egugrid(source_type: &str) -> bool {
    source_type.ends_with(EGUGRID_SUFFIX)
}

/// Cell size used when mapping `source_type` emissions in `city`.
pub fn map_resolution(source_type: &str, city: &str) -> f64 {
    if is_egugrid(source_type) {
        return EGUGRID_RESOLUTION;
    }
    if COARSE_REGIONS.contains(&city) {
        return COARSE_RESOLUTION;
    }
    DEFAULT_RESOLUTION
}

/// Builds the buffered grid covering `region`.
///
/// Fails when the region has zero extent or the cell size is not a positive
/// finite number; never returns an empty grid.
pub fn build_grid(region: &Polygon, dx: f64) -> Result<Vec<Polygon>, GridError> {
    let bounds = region.bounds()?;
    build_grid_for_bounds(bounds, dx)
}

/// Same as [`build_grid`], starting from an already computed bounding box.
pub fn build_grid_for_bounds(bounds: Bounds, dx: f64) -> Result<Vec<Polygon>, GridError> {
    if !(dx.is_finite() && dx > 0.0) {
        return Err(GridError::InvalidCellSize(dx));
    }
    bounds.require_extent()?;

    let buffer = (bounds.width() * bounds.height()).sqrt() * BUFFER_FRACTION;
    let b = bounds.expand(buffer);

    let x0 = (b.min.x / dx).floor() as i64;
    let y0 = (b.min.y / dx).floor() as i64;

    let mut cells = Vec::new();
    let mut j = y0;
    loop {
        let y = j as f64 * dx;
        if y >= b.max.y + dx {
            break;
        }
        let mut i = x0;
        loop {
            let x = i as f64 * dx;
            if x >= b.max.x + dx {
                break;
            }
            let x1 = (i + 1) as f64 * dx;
            let y1 = (j + 1) as f64 * dx;
            cells.push(Polygon::rect(Point::new(x, y), Point::new(x1, y1)));
            i += 1;
        }
        j += 1;
    }

    if cells.is_empty() {
        return Err(GridError::Empty);
    }
    Ok(cells)
}
