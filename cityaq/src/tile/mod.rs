//! Map tile rendering.
//!
//! Layers are composed once per [`MapSpecification`] and cached; every tile
//! request then transforms its own copy:
//!
//! 1. project to tile-local integer coordinates (extent 4096)
//! 2. clip to [`DEFAULT_EXTENT_BOUND`]
//! 3. Douglas-Peucker simplify with [`SIMPLIFY_TOLERANCE`]
//! 4. drop features smaller than [`MIN_AREA`] / [`MIN_LENGTH`]
//! 5. encode as Mapbox Vector Tile, gzipped on request

mod coord;
mod geometry;
mod layer;
mod map;
mod server;
pub mod wire;

use thiserror::Error;

use crate::cache::RequestError;

pub use coord::{CoordError, TileCoord, MAX_LAT, MAX_ZOOM, MIN_LAT};
pub use geometry::{clip_line, clip_ring, simplify_line, simplify_ring};
pub use layer::{
    Feature, Layer, LayerSet, PropertyValue, Shape, DEFAULT_EXTENT_BOUND, EXTENT, MIN_AREA,
    MIN_LENGTH, SIMPLIFY_TOLERANCE,
};
pub use map::{compose, data_layer, DataError, GriddedField, MapData, MapJob, MapSpecification};
pub use server::{
    parse_map_request, MapTileParams, MapTileServer, DEFAULT_LAYER_CACHE_ENTRIES,
};

#[derive(Debug, Error)]
pub enum TileError {
    #[error("map request missing {0}")]
    MissingParameter(&'static str),

    #[error("map request invalid value for {name}: {value}")]
    InvalidParameter { name: &'static str, value: String },

    #[error("invalid impact type {0}")]
    InvalidImpactType(i32),

    #[error(transparent)]
    Coord(#[from] CoordError),

    #[error("{cells} grid cells but {values} values")]
    Misaligned { cells: usize, values: usize },

    /// Failure fetching the data behind a layer, message passed through.
    #[error("{0}")]
    Data(#[source] DataError),

    #[error("{0}")]
    Cache(#[from] RequestError<TileError>),

    #[error("vector tile encoding failed: {0}")]
    Encode(#[from] mvt::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
