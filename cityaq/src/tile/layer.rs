//! Named feature layers and the per-tile transformation stages.
//!
//! A [`LayerSet`] is built once per map specification in geographic
//! coordinates and cached. Each tile request projects a fresh copy with
//! [`LayerSet::project`], then clips, simplifies and prunes that copy in
//! place.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::coord::TileCoord;
use super::geometry::{clip_line, clip_ring, simplify_line, simplify_ring};
use crate::codec::{CacheCodec, CodecError};
use crate::geom::{line_length, Bounds, Point, Polygon};

/// Tile units per tile side.
pub const EXTENT: u32 = 4096;

/// Clip box used by Mapbox GL renderers: one tile of buffer on every side.
pub const DEFAULT_EXTENT_BOUND: Bounds = Bounds {
    min: Point::new(-(EXTENT as f64), -(EXTENT as f64)),
    max: Point::new(2.0 * EXTENT as f64, 2.0 * EXTENT as f64),
};

/// Douglas-Peucker tolerance, in tile units.
pub const SIMPLIFY_TOLERANCE: f64 = 1.0;

/// Polygons smaller than this (square tile units) are dropped.
pub const MIN_AREA: f64 = 1.0;

/// Lines shorter than this (tile units) are dropped.
pub const MIN_LENGTH: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    String(String),
    Double(f64),
    Int(i64),
    Bool(bool),
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Double(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Polygon(Polygon),
    MultiLineString(Vec<Vec<Point>>),
}

impl Shape {
    fn map_points(&self, f: impl Fn(Point) -> Point) -> Shape {
        match self {
            Shape::Polygon(p) => Shape::Polygon(Polygon::new(
                p.rings
                    .iter()
                    .map(|r| r.iter().map(|&pt| f(pt)).collect())
                    .collect(),
            )),
            Shape::MultiLineString(lines) => Shape::MultiLineString(
                lines
                    .iter()
                    .map(|l| l.iter().map(|&pt| f(pt)).collect())
                    .collect(),
            ),
        }
    }

    fn clip(&mut self, bounds: &Bounds) {
        match self {
            Shape::Polygon(p) => {
                p.rings = p
                    .rings
                    .iter()
                    .map(|r| clip_ring(r, bounds))
                    .filter(|r| r.len() >= 3)
                    .collect();
            }
            Shape::MultiLineString(lines) => {
                *lines = lines.iter().flat_map(|l| clip_line(l, bounds)).collect();
            }
        }
    }

    fn simplify(&mut self, tolerance: f64) {
        match self {
            Shape::Polygon(p) => {
                p.rings = p
                    .rings
                    .iter()
                    .map(|r| simplify_ring(r, tolerance))
                    .filter(|r| r.len() >= 3)
                    .collect();
            }
            Shape::MultiLineString(lines) => {
                *lines = lines
                    .iter()
                    .map(|l| simplify_line(l, tolerance))
                    .filter(|l| l.len() >= 2)
                    .collect();
            }
        }
    }

    /// Whether the shape falls below the size limits for its dimension.
    fn is_negligible(&self, min_area: f64, min_length: f64) -> bool {
        match self {
            Shape::Polygon(p) => p.area() < min_area,
            Shape::MultiLineString(lines) => {
                lines.iter().map(|l| line_length(l)).sum::<f64>() < min_length
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: Option<u64>,
    pub shape: Shape,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Feature {
    pub fn polygon(id: u64, polygon: Polygon) -> Self {
        Self {
            id: Some(id),
            shape: Shape::Polygon(polygon),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub extent: u32,
    pub features: Vec<Feature>,
}

impl Layer {
    pub fn new(name: impl Into<String>, features: Vec<Feature>) -> Self {
        Self {
            name: name.into(),
            extent: EXTENT,
            features,
        }
    }
}

/// Ordered layers making up one map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LayerSet {
    pub layers: Vec<Layer>,
}

impl LayerSet {
    pub fn new(layers: Vec<Layer>) -> Self {
        Self { layers }
    }

    pub fn feature_count(&self) -> usize {
        self.layers.iter().map(|l| l.features.len()).sum()
    }

    /// Project every geometry into `tile`'s local coordinates. Returns a new
    /// set; the receiver is left untouched.
    #[instrument(level = "debug", skip(self), fields(tile = %tile))]
    pub fn project(&self, tile: &TileCoord) -> LayerSet {
        LayerSet {
            layers: self
                .layers
                .iter()
                .map(|layer| Layer {
                    name: layer.name.clone(),
                    extent: layer.extent,
                    features: layer
                        .features
                        .iter()
                        .map(|f| Feature {
                            id: f.id,
                            shape: f.shape.map_points(|p| tile.project(p, layer.extent)),
                            properties: f.properties.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    pub fn clip(&mut self, bounds: &Bounds) {
        for f in self.layers.iter_mut().flat_map(|l| l.features.iter_mut()) {
            f.shape.clip(bounds);
        }
    }

    pub fn simplify(&mut self, tolerance: f64) {
        for f in self.layers.iter_mut().flat_map(|l| l.features.iter_mut()) {
            f.shape.simplify(tolerance);
        }
    }

    /// Drop features whose polygon area is below `min_area` or whose line
    /// length is below `min_length`.
    pub fn remove_empty(&mut self, min_area: f64, min_length: f64) {
        for layer in &mut self.layers {
            layer
                .features
                .retain(|f| !f.shape.is_negligible(min_area, min_length));
        }
    }

    /// The full per-tile pipeline with the standard limits.
    pub fn for_tile(&self, tile: &TileCoord) -> LayerSet {
        let mut out = self.project(tile);
        out.clip(&DEFAULT_EXTENT_BOUND);
        out.simplify(SIMPLIFY_TOLERANCE);
        out.remove_empty(MIN_AREA, MIN_LENGTH);
        out
    }
}

impl CacheCodec for LayerSet {
    const MAGIC: [u8; 4] = *b"CAQL";
    const VERSION: u16 = 1;

    fn validate(&self) -> Result<(), CodecError> {
        for layer in &self.layers {
            if layer.name.is_empty() {
                return Err(CodecError::Invalid("layer without a name".into()));
            }
            if layer.extent == 0 {
                return Err(CodecError::Invalid(format!(
                    "layer {} has zero extent",
                    layer.name
                )));
            }
        }
        Ok(())
    }
}
