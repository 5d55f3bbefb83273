//! Tile-space geometry operations: clipping and simplification.
//!
//! Everything here works on already-projected coordinates. Rings are open
//! (the closing vertex is implicit), matching [`crate::geom::Ring`].

use crate::geom::{Bounds, Point, Ring};

#[derive(Debug, Clone, Copy)]
enum Edge {
    Left(f64),
    Right(f64),
    Bottom(f64),
    Top(f64),
}

impl Edge {
    fn inside(self, p: Point) -> bool {
        match self {
            Edge::Left(x) => p.x >= x,
            Edge::Right(x) => p.x <= x,
            Edge::Bottom(y) => p.y >= y,
            Edge::Top(y) => p.y <= y,
        }
    }

    fn intersect(self, a: Point, b: Point) -> Point {
        match self {
            Edge::Left(x) | Edge::Right(x) => {
                let t = (x - a.x) / (b.x - a.x);
                Point::new(x, a.y + t * (b.y - a.y))
            }
            Edge::Bottom(y) | Edge::Top(y) => {
                let t = (y - a.y) / (b.y - a.y);
                Point::new(a.x + t * (b.x - a.x), y)
            }
        }
    }
}

/// Clip a ring to `bounds` (Sutherland-Hodgman). The result may be empty.
pub fn clip_ring(ring: &[Point], bounds: &Bounds) -> Ring {
    let edges = [
        Edge::Left(bounds.min.x),
        Edge::Right(bounds.max.x),
        Edge::Bottom(bounds.min.y),
        Edge::Top(bounds.max.y),
    ];
    let mut out: Ring = ring.to_vec();
    for edge in edges {
        let Some(&last) = out.last() else {
            break;
        };
        let input = std::mem::take(&mut out);
        let mut prev = last;
        for &cur in &input {
            match (edge.inside(prev), edge.inside(cur)) {
                (true, true) => out.push(cur),
                (true, false) => out.push(edge.intersect(prev, cur)),
                (false, true) => {
                    out.push(edge.intersect(prev, cur));
                    out.push(cur);
                }
                (false, false) => {}
            }
            prev = cur;
        }
    }
    out
}

fn lerp(a: Point, b: Point, t: f64) -> Point {
    if t <= 0.0 {
        a
    } else if t >= 1.0 {
        b
    } else {
        Point::new(a.x + t * (b.x - a.x), a.y + t * (b.y - a.y))
    }
}

/// Liang-Barsky segment clip.
fn clip_segment(a: Point, b: Point, bounds: &Bounds) -> Option<(Point, Point)> {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
    let checks = [
        (-dx, a.x - bounds.min.x),
        (dx, bounds.max.x - a.x),
        (-dy, a.y - bounds.min.y),
        (dy, bounds.max.y - a.y),
    ];
    for (p, q) in checks {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    Some((lerp(a, b, t0), lerp(a, b, t1)))
}

/// Clip a polyline to `bounds`. A line that leaves and re-enters the box
/// comes back as several pieces.
pub fn clip_line(line: &[Point], bounds: &Bounds) -> Vec<Vec<Point>> {
    let mut pieces = Vec::new();
    let mut current: Vec<Point> = Vec::new();

    for seg in line.windows(2) {
        let Some((a, b)) = clip_segment(seg[0], seg[1], bounds) else {
            if current.len() >= 2 {
                pieces.push(std::mem::take(&mut current));
            }
            current.clear();
            continue;
        };
        if current.last() != Some(&a) {
            if current.len() >= 2 {
                pieces.push(std::mem::take(&mut current));
            }
            current.clear();
            current.push(a);
        }
        current.push(b);
        if b != seg[1] {
            pieces.push(std::mem::take(&mut current));
        }
    }
    if current.len() >= 2 {
        pieces.push(current);
    }
    pieces
}

fn segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    let t = if len2 == 0.0 {
        0.0
    } else {
        (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.x + t * dx, a.y + t * dy);
    ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt()
}

/// Douglas-Peucker simplification. Endpoints are always kept.
pub fn simplify_line(points: &[Point], tolerance: f64) -> Vec<Point> {
    let n = points.len();
    if n <= 2 {
        return points.to_vec();
    }
    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    let mut stack = vec![(0, n - 1)];
    while let Some((start, end)) = stack.pop() {
        let mut max_d = 0.0;
        let mut index = start;
        for i in start + 1..end {
            let d = segment_distance(points[i], points[start], points[end]);
            if d > max_d {
                max_d = d;
                index = i;
            }
        }
        if max_d > tolerance {
            keep[index] = true;
            stack.push((start, index));
            stack.push((index, end));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

/// Simplify a ring as the closed line through its vertices.
pub fn simplify_ring(ring: &[Point], tolerance: f64) -> Ring {
    let Some(&first) = ring.first() else {
        return Vec::new();
    };
    let mut closed = ring.to_vec();
    closed.push(first);
    let mut out = simplify_line(&closed, tolerance);
    out.pop();
    out
}
