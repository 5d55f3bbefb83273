//! Mapbox Vector Tile (v2) encoding.
//!
//! Points are rounded to integer tile units before they reach the encoder;
//! consecutive duplicates left by rounding are dropped, and paths too short
//! to draw (rings under 3 points, lines under 2) are skipped.
//!
//! Exterior rings are written with positive area in tile coordinates
//! (clockwise on screen), holes with negative area.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use mvt::{GeomData, GeomEncoder, GeomType, Tile};

use super::layer::{Feature, Layer, LayerSet, PropertyValue, Shape, EXTENT};
use super::TileError;
use crate::geom::{ring_contains, signed_area, Point, Polygon, Ring};

/// Rings of `polygon` oriented for the wire: exterior rings (nested in an
/// even number of other rings) positive, holes negative.
fn oriented_rings(polygon: &Polygon) -> Vec<Ring> {
    polygon
        .rings
        .iter()
        .enumerate()
        .map(|(i, ring)| {
            let depth = ring
                .first()
                .map(|p| {
                    polygon
                        .rings
                        .iter()
                        .enumerate()
                        .filter(|(j, other)| *j != i && ring_contains(other, *p))
                        .count()
                })
                .unwrap_or(0);
            let exterior = depth % 2 == 0;
            let positive = signed_area(ring) > 0.0;
            let mut ring = ring.clone();
            if exterior != positive {
                ring.reverse();
            }
            ring
        })
        .collect()
}

/// Round to tile units and drop repeats.
fn tile_path(points: &[Point]) -> Vec<(f64, f64)> {
    let mut out: Vec<(f64, f64)> = Vec::with_capacity(points.len());
    for p in points {
        let q = (p.x.round(), p.y.round());
        if out.last() != Some(&q) {
            out.push(q);
        }
    }
    // A ring whose last point rounds onto its first is closed by ClosePath.
    if out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

/// Geometry for one feature, or `None` when nothing drawable is left.
fn encode_geometry(shape: &Shape) -> Result<Option<GeomData>, TileError> {
    let (kind, paths, min_points) = match shape {
        Shape::Polygon(p) => (
            GeomType::Polygon,
            oriented_rings(p).iter().map(|r| tile_path(r)).collect::<Vec<_>>(),
            3,
        ),
        Shape::MultiLineString(lines) => (
            GeomType::Linestring,
            lines.iter().map(|l| tile_path(l)).collect(),
            2,
        ),
    };

    let mut encoder = GeomEncoder::new(kind);
    let mut written = 0;
    for path in paths.iter().filter(|p| p.len() >= min_points) {
        for &(x, y) in path {
            encoder.add_point(x, y)?;
        }
        encoder.complete_geom()?;
        written += 1;
    }
    if written == 0 {
        return Ok(None);
    }
    Ok(Some(encoder.encode()?))
}

fn write_feature(layer: mvt::Layer, feature: &Feature) -> Result<mvt::Layer, TileError> {
    let Some(geometry) = encode_geometry(&feature.shape)? else {
        return Ok(layer);
    };
    let mut out = layer.into_feature(geometry);
    if let Some(id) = feature.id {
        out.set_id(id);
    }
    for (key, value) in &feature.properties {
        match value {
            PropertyValue::String(s) => out.add_tag_string(key, s),
            PropertyValue::Double(d) => out.add_tag_double(key, *d),
            PropertyValue::Int(i) => out.add_tag_sint(key, *i),
            PropertyValue::Bool(b) => out.add_tag_bool(key, *b),
        }
    }
    Ok(out.into_layer())
}

fn write_layer(tile: &mut Tile, layer: &Layer) -> Result<(), TileError> {
    let mut out = tile.create_layer(&layer.name);
    for feature in &layer.features {
        out = write_feature(out, feature)?;
    }
    tile.add_layer(out)?;
    Ok(())
}

/// Serialize layers as an MVT protobuf message.
pub fn encode(layers: &LayerSet) -> Result<Vec<u8>, TileError> {
    let mut tile = Tile::new(EXTENT);
    for layer in &layers.layers {
        write_layer(&mut tile, layer)?;
    }
    Ok(tile.to_bytes()?)
}

/// Serialize and gzip.
pub fn encode_gzipped(layers: &LayerSet) -> Result<Vec<u8>, TileError> {
    gzip(&encode(layers)?)
}

pub fn gzip(data: &[u8]) -> Result<Vec<u8>, TileError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub fn gunzip(data: &[u8]) -> Result<Vec<u8>, TileError> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geozero::mvt::{tile, Message, Tile as WireTile};
    use geozero::ToJson;

    fn square(x: f64, y: f64, size: f64) -> Polygon {
        Polygon::rect(Point::new(x, y), Point::new(x + size, y + size))
    }

    fn parse(set: &LayerSet) -> WireTile {
        WireTile::decode(encode(set).unwrap().as_slice()).unwrap()
    }

    fn value(layer: &tile::Layer, feature: &tile::Feature, key: &str) -> tile::Value {
        let k = layer.keys.iter().position(|k| k == key).unwrap() as u32;
        let pair = feature.tags.chunks(2).find(|p| p[0] == k).unwrap();
        layer.values[pair[1] as usize].clone()
    }

    #[test]
    fn test_hole_has_negative_area() {
        let mut polygon = square(0.0, 0.0, 100.0);
        polygon.rings.push(square(40.0, 40.0, 10.0).rings.remove(0));
        let rings = oriented_rings(&polygon);
        assert!(signed_area(&rings[0]) > 0.0);
        assert!(signed_area(&rings[1]) < 0.0);
    }

    #[test]
    fn test_tile_path_rounds_and_dedups() {
        let path = tile_path(&[
            Point::new(0.2, 0.1),
            Point::new(0.4, -0.3),
            Point::new(5.6, 0.0),
            Point::new(5.0, 5.0),
            Point::new(0.1, 0.4),
        ]);
        assert_eq!(path, vec![(0.0, 0.0), (6.0, 0.0), (5.0, 5.0)]);
    }

    #[test]
    fn test_encode_layers() {
        let set = LayerSet::new(vec![
            Layer::new(
                "accra_1_1_roadways_0",
                vec![
                    Feature::polygon(7, square(0.0, 0.0, 16.0)).with_property("v", 0.25),
                    Feature::polygon(9, square(16.0, 0.0, 16.0)).with_property("v", 0.5),
                ],
            ),
            Layer::new("Accra", Vec::new()),
        ]);
        let tile = parse(&set);

        assert_eq!(tile.layers.len(), 2);
        let data = &tile.layers[0];
        assert_eq!(data.name, "accra_1_1_roadways_0");
        assert_eq!(data.version, 2);
        assert_eq!(data.extent.unwrap_or(4096), 4096);
        assert_eq!(data.keys, vec!["v"]);
        assert_eq!(data.features.len(), 2);
        assert_eq!(data.features[1].id, Some(9));
        assert_eq!(data.features[0].r#type, Some(tile::GeomType::Polygon as i32));
        assert_eq!(value(data, &data.features[0], "v").double_value, Some(0.25));
        assert_eq!(value(data, &data.features[1], "v").double_value, Some(0.5));
        assert!(tile.layers[1].features.is_empty());
    }

    #[test]
    fn test_polygon_geometry() {
        let set = LayerSet::new(vec![Layer::new(
            "l",
            vec![Feature::polygon(0, square(2.0, 2.0, 8.0))],
        )]);
        let tile = parse(&set);
        let json: serde_json::Value =
            serde_json::from_str(&tile.layers[0].features[0].to_json().unwrap()).unwrap();

        assert_eq!(json["type"], "Polygon");
        let ring: Vec<(f64, f64)> = json["coordinates"][0]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| (c[0].as_f64().unwrap(), c[1].as_f64().unwrap()))
            .collect();
        for corner in [(2.0, 2.0), (10.0, 2.0), (10.0, 10.0), (2.0, 10.0)] {
            assert!(ring.contains(&corner), "missing {corner:?} in {ring:?}");
        }
    }

    #[test]
    fn test_typed_properties() {
        let feature = Feature::polygon(1, square(0.0, 0.0, 8.0))
            .with_property("name", "Accra")
            .with_property("n", PropertyValue::Int(-3))
            .with_property("ok", PropertyValue::Bool(true));
        let tile = parse(&LayerSet::new(vec![Layer::new("l", vec![feature])]));
        let layer = &tile.layers[0];
        let f = &layer.features[0];

        assert_eq!(value(layer, f, "name").string_value.as_deref(), Some("Accra"));
        assert_eq!(value(layer, f, "n").sint_value, Some(-3));
        assert_eq!(value(layer, f, "ok").bool_value, Some(true));
    }

    #[test]
    fn test_line_features() {
        let line = Feature {
            id: Some(4),
            shape: Shape::MultiLineString(vec![
                vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0)],
                vec![Point::new(50.0, 50.0)],
            ]),
            properties: Default::default(),
        };
        let tile = parse(&LayerSet::new(vec![Layer::new("l", vec![line])]));
        let f = &tile.layers[0].features[0];
        assert_eq!(f.r#type, Some(tile::GeomType::Linestring as i32));
        assert_eq!(f.id, Some(4));
    }

    #[test]
    fn test_collapsed_feature_skipped() {
        // Everything rounds onto one tile unit.
        let tiny = Feature::polygon(0, square(0.1, 0.1, 0.2));
        let tile = parse(&LayerSet::new(vec![Layer::new(
            "l",
            vec![tiny, Feature::polygon(1, square(0.0, 0.0, 8.0))],
        )]));
        assert_eq!(tile.layers[0].features.len(), 1);
        assert_eq!(tile.layers[0].features[0].id, Some(1));
    }

    #[test]
    fn test_empty_tile_is_well_formed() {
        let tile = parse(&LayerSet::new(vec![Layer::new("empty", Vec::new())]));
        assert_eq!(tile.layers[0].name, "empty");
        assert!(tile.layers[0].features.is_empty());
    }

    #[test]
    fn test_gzip() {
        let set = LayerSet::new(vec![Layer::new(
            "l",
            vec![Feature::polygon(0, square(0.0, 0.0, 4.0))],
        )]);
        let zipped = encode_gzipped(&set).unwrap();
        assert_eq!(&zipped[..2], &[0x1f, 0x8b]);
        assert_eq!(gunzip(&zipped).unwrap(), encode(&set).unwrap());
    }
}
