//! Just enough GeoJSON for polygon feature collections.
//!
//! City boundaries, simulation inputs and simulation output all travel as
//! `FeatureCollection`s of `Polygon`/`MultiPolygon` features. Other geometry
//! types are accepted on input and ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Point, Polygon, Ring};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            kind: "FeatureCollection".into(),
            features,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: Option<Geometry>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub properties: Map<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Feature {
    pub fn polygon(polygon: &Polygon, properties: Map<String, Value>) -> Self {
        Self {
            kind: "Feature".into(),
            geometry: Some(Geometry::from_polygon(polygon)),
            properties,
        }
    }

    /// Numeric property, if present.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.properties.get(name).and_then(Value::as_f64)
    }
}

type Position = [f64; 2];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Polygon { coordinates: Vec<Vec<Position>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
    #[serde(other)]
    Unsupported,
}

impl Geometry {
    pub fn from_polygon(polygon: &Polygon) -> Self {
        Geometry::Polygon {
            coordinates: polygon.rings.iter().map(|r| close_ring(r)).collect(),
        }
    }

    /// Flatten into a single multi-ring polygon. `None` for unsupported
    /// geometry types.
    pub fn to_polygon(&self) -> Option<Polygon> {
        match self {
            Geometry::Polygon { coordinates } => {
                Some(Polygon::new(coordinates.iter().map(|r| open_ring(r)).collect()))
            }
            Geometry::MultiPolygon { coordinates } => Some(Polygon::new(
                coordinates.iter().flatten().map(|r| open_ring(r)).collect(),
            )),
            Geometry::Unsupported => None,
        }
    }
}

fn open_ring(positions: &[Position]) -> Ring {
    let mut ring: Ring = positions.iter().map(|p| Point::new(p[0], p[1])).collect();
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

fn close_ring(ring: &[Point]) -> Vec<Position> {
    let mut out: Vec<Position> = ring.iter().map(|p| [p.x, p.y]).collect();
    if let Some(first) = out.first().copied() {
        out.push(first);
    }
    out
}

/// Merge every polygonal feature of a collection into one polygon.
pub fn merge_polygons(collection: &FeatureCollection) -> Polygon {
    let rings = collection
        .features
        .iter()
        .filter_map(|f| f.geometry.as_ref()?.to_polygon())
        .flat_map(|p| p.rings)
        .collect();
    Polygon::new(rings)
}
