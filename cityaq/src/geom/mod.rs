//! Planar geometry primitives.
//!
//! Coordinates are longitude/latitude degrees for everything that comes out of
//! the city catalog, the grid builder and the simulation output. The tile
//! pipeline re-uses the same types after projecting into tile space.
//!
//! Rings are stored open: the closing vertex is implied and never repeated.

pub mod geojson;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by geometry operations.
#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    /// The geometry has no vertices at all.
    #[error("geometry is empty")]
    Empty,

    /// The geometry collapses to a line or a point.
    #[error("geometry has zero extent ({width} x {height})")]
    ZeroExtent { width: f64, height: f64 },
}

/// A 2D point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An open ring of vertices.
pub type Ring = Vec<Point>;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Grow the box by `amount` on every side.
    pub fn expand(&self, amount: f64) -> Self {
        Self {
            min: Point::new(self.min.x - amount, self.min.y - amount),
            max: Point::new(self.max.x + amount, self.max.y + amount),
        }
    }

    /// Fails when the box collapses in either axis.
    pub fn require_extent(&self) -> Result<(), GeometryError> {
        let (width, height) = (self.width(), self.height());
        if !(width > 0.0 && height > 0.0) {
            return Err(GeometryError::ZeroExtent { width, height });
        }
        Ok(())
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Whether the boxes share interior area. Touching edges do not count.
    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
    }
}

/// A polygon made of one or more rings.
///
/// Multi-part city boundaries are kept as a flat list of rings; containment
/// uses the even-odd rule so holes and islands both behave.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polygon {
    pub rings: Vec<Ring>,
}

impl Polygon {
    pub fn new(rings: Vec<Ring>) -> Self {
        Self { rings }
    }

    /// Axis-aligned rectangle with counter-clockwise vertex order.
    pub fn rect(min: Point, max: Point) -> Self {
        Self {
            rings: vec![vec![
                Point::new(min.x, min.y),
                Point::new(max.x, min.y),
                Point::new(max.x, max.y),
                Point::new(min.x, max.y),
            ]],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rings.iter().all(|r| r.is_empty())
    }

    pub fn points(&self) -> impl Iterator<Item = &Point> {
        self.rings.iter().flatten()
    }

    pub fn bounds(&self) -> Result<Bounds, GeometryError> {
        let mut points = self.points();
        let first = points.next().ok_or(GeometryError::Empty)?;
        let mut b = Bounds::new(*first, *first);
        for p in points {
            b.min.x = b.min.x.min(p.x);
            b.min.y = b.min.y.min(p.y);
            b.max.x = b.max.x.max(p.x);
            b.max.y = b.max.y.max(p.y);
        }
        Ok(b)
    }

    /// Even-odd area: the sum of absolute ring areas with every ring after
    /// the first subtracted when it lies inside another ring.
    pub fn area(&self) -> f64 {
        let mut total = 0.0;
        for (i, ring) in self.rings.iter().enumerate() {
            let a = signed_area(ring).abs();
            let nested = ring
                .first()
                .map(|p| {
                    self.rings
                        .iter()
                        .enumerate()
                        .filter(|(j, other)| *j != i && ring_contains(other, *p))
                        .count()
                })
                .unwrap_or(0);
            if nested % 2 == 0 {
                total += a;
            } else {
                total -= a;
            }
        }
        total.max(0.0)
    }

    /// Area-weighted centroid of the polygon.
    ///
    /// Falls back to the vertex average when the polygon has no area.
    pub fn centroid(&self) -> Result<Point, GeometryError> {
        if self.is_empty() {
            return Err(GeometryError::Empty);
        }
        let (mut cx, mut cy, mut a_sum) = (0.0, 0.0, 0.0);
        for ring in &self.rings {
            let n = ring.len();
            for i in 0..n {
                let p = ring[i];
                let q = ring[(i + 1) % n];
                let cross = p.x * q.y - q.x * p.y;
                cx += (p.x + q.x) * cross;
                cy += (p.y + q.y) * cross;
                a_sum += cross;
            }
        }
        if a_sum.abs() < f64::EPSILON {
            let n = self.points().count() as f64;
            let (sx, sy) = self.points().fold((0.0, 0.0), |(x, y), p| (x + p.x, y + p.y));
            return Ok(Point::new(sx / n, sy / n));
        }
        let a = a_sum / 2.0;
        Ok(Point::new(cx / (6.0 * a), cy / (6.0 * a)))
    }

    /// Even-odd point containment.
    pub fn contains(&self, p: Point) -> bool {
        self.rings.iter().filter(|r| ring_contains(r, p)).count() % 2 == 1
    }
}

/// Shoelace signed area of an open ring. Positive for counter-clockwise
/// rings in a y-up coordinate system.
pub fn signed_area(ring: &[Point]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let p = ring[i];
        let q = ring[(i + 1) % n];
        sum += p.x * q.y - q.x * p.y;
    }
    sum / 2.0
}

/// Ray-casting containment test for a single open ring.
pub fn ring_contains(ring: &[Point], p: Point) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let a = ring[i];
        let b = ring[j];
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Total length of a polyline.
pub fn line_length(line: &[Point]) -> f64 {
    line.windows(2)
        .map(|w| ((w[1].x - w[0].x).powi(2) + (w[1].y - w[0].y).powi(2)).sqrt())
        .sum()
}
