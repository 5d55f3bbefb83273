//! Slippy-map tile addressing and Web Mercator projection.

use std::f64::consts::PI;
use std::fmt;

use thiserror::Error;

use crate::geom::Point;

/// Web Mercator latitude limit.
pub const MAX_LAT: f64 = 85.05112878;
pub const MIN_LAT: f64 = -85.05112878;

/// Deepest zoom accepted from clients.
pub const MAX_ZOOM: u8 = 24;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    #[error("invalid zoom level {0}, must be at most {MAX_ZOOM}")]
    InvalidZoom(i64),

    #[error("tile ({x}, {y}) does not exist at zoom {zoom}")]
    OutOfRange { x: i64, y: i64, zoom: u8 },
}

/// A tile of the quad-tiling, addressed `(x, y, zoom)` with `y` growing
/// southward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub zoom: u8,
}

impl TileCoord {
    /// Validate a tile address. Accepts wide integers so that query
    /// parameters can be range-checked in one place.
    pub fn new(x: i64, y: i64, zoom: i64) -> Result<Self, CoordError> {
        let zoom = u8::try_from(zoom)
            .ok()
            .filter(|z| *z <= MAX_ZOOM)
            .ok_or(CoordError::InvalidZoom(zoom))?;
        let n = 1i64 << zoom;
        if !(0..n).contains(&x) || !(0..n).contains(&y) {
            return Err(CoordError::OutOfRange { x, y, zoom });
        }
        Ok(Self {
            x: x as u32,
            y: y as u32,
            zoom,
        })
    }

    fn tiles_per_side(&self) -> f64 {
        2.0_f64.powi(self.zoom as i32)
    }

    /// Project a lon/lat point into this tile's local coordinates, where
    /// `(0, 0)` is the north-west corner and `(extent, extent)` the
    /// south-east one. Coordinates are rounded to whole tile units; points
    /// outside the tile land outside `[0, extent]`.
    pub fn project(&self, p: Point, extent: u32) -> Point {
        let n = self.tiles_per_side();
        let extent = extent as f64;
        let lat = p.y.clamp(MIN_LAT, MAX_LAT).to_radians();

        let world_x = (p.x + 180.0) / 360.0 * n;
        let world_y = (1.0 - lat.tan().asinh() / PI) / 2.0 * n;

        Point::new(
            ((world_x - self.x as f64) * extent).round(),
            ((world_y - self.y as f64) * extent).round(),
        )
    }

    /// Longitude/latitude of the tile's north-west corner.
    pub fn north_west(&self) -> Point {
        let n = self.tiles_per_side();
        let lon = self.x as f64 / n * 360.0 - 180.0;
        let lat = (PI * (1.0 - 2.0 * self.y as f64 / n)).sinh().atan().to_degrees();
        Point::new(lon, lat)
    }

    /// The tile containing a lon/lat point.
    pub fn containing(p: Point, zoom: u8) -> Result<Self, CoordError> {
        if zoom > MAX_ZOOM {
            return Err(CoordError::InvalidZoom(zoom as i64));
        }
        let n = 2.0_f64.powi(zoom as i32);
        let max = (1u32 << zoom) - 1;
        let lat = p.y.clamp(MIN_LAT, MAX_LAT).to_radians();
        let x = ((p.x + 180.0) / 360.0 * n).floor().clamp(0.0, max as f64) as u32;
        let y = ((1.0 - lat.tan().asinh() / PI) / 2.0 * n)
            .floor()
            .clamp(0.0, max as f64) as u32;
        Ok(Self { x, y, zoom })
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}
