//! Vector tile HTTP endpoint.
//!
//! ```text
//! GET /maptile?x=&y=&z=&c=&it=&em=&st=&sit=
//!        │
//!        ▼
//!   parse ──(bad params)──► 404
//!        │
//!        ▼
//!   layers(spec) ◄── RequestCache<MapJob> (memory, dedup)
//!        │
//!        ▼
//!   project ─► clip ─► simplify ─► remove empty ─► MVT [─► gzip]
//! ```

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::coord::TileCoord;
use super::layer::LayerSet;
use super::map::{MapData, MapJob, MapSpecification};
use super::wire::{encode, encode_gzipped};
use super::TileError;
use crate::cache::{MemoryCacheProvider, RequestCache, RequestCacheStats};
use crate::types::{Emission, ImpactType, SimulationType};

/// Default number of composed layer sets kept in memory.
pub const DEFAULT_LAYER_CACHE_ENTRIES: u64 = 100;

/// Raw query parameters, all optional so that missing values produce a
/// descriptive error instead of a generic rejection.
#[derive(Debug, Default, Deserialize)]
pub struct MapTileParams {
    pub x: Option<String>,
    pub y: Option<String>,
    pub z: Option<String>,
    pub c: Option<String>,
    pub it: Option<String>,
    pub em: Option<String>,
    pub st: Option<String>,
    pub sit: Option<String>,
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, TileError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or(TileError::MissingParameter(name))
}

fn integer(value: &Option<String>, name: &'static str) -> Result<i64, TileError> {
    let raw = required(value, name)?;
    raw.trim()
        .parse()
        .map_err(|_| TileError::InvalidParameter {
            name,
            value: raw.to_string(),
        })
}

fn code(value: &Option<String>, name: &'static str) -> Result<i32, TileError> {
    let n = integer(value, name)?;
    i32::try_from(n).map_err(|_| TileError::InvalidParameter {
        name,
        value: n.to_string(),
    })
}

/// Parse `/maptile` query parameters into a map specification and tile.
pub fn parse_map_request(params: &MapTileParams) -> Result<(MapSpecification, TileCoord), TileError> {
    let x = integer(&params.x, "x")?;
    let y = integer(&params.y, "y")?;
    let z = integer(&params.z, "z")?;
    let tile = TileCoord::new(x, y, z)?;

    let city = required(&params.c, "c")?.to_string();

    // Unspecified codes name no map, so they are rejected with the rest.
    let it = code(&params.it, "it")?;
    let impact_type = match ImpactType::try_from(it) {
        Ok(ImpactType::Unspecified) | Err(_) => return Err(TileError::InvalidImpactType(it)),
        Ok(t) => t,
    };

    let em = code(&params.em, "em")?;
    let emission = match Emission::try_from(em) {
        Ok(Emission::Unspecified) | Err(_) => {
            return Err(TileError::InvalidParameter {
                name: "em",
                value: em.to_string(),
            })
        }
        Ok(e) => e,
    };

    let source_type = required(&params.st, "st")?.to_string();

    let sit = code(&params.sit, "sit")?;
    let simulation_type = SimulationType::try_from(sit).map_err(|_| TileError::InvalidParameter {
        name: "sit",
        value: sit.to_string(),
    })?;

    Ok((
        MapSpecification {
            city,
            impact_type,
            emission,
            source_type,
            simulation_type,
        },
        tile,
    ))
}

/// Serves map tiles, composing and caching layers per specification.
pub struct MapTileServer {
    data: Arc<dyn MapData>,
    cache: RequestCache<MapJob>,
}

impl MapTileServer {
    /// `cache_entries` bounds the number of layer sets held in memory.
    pub fn new(data: Arc<dyn MapData>, cache_entries: u64) -> Self {
        Self {
            data,
            cache: RequestCache::new(Arc::new(MemoryCacheProvider::new(cache_entries))),
        }
    }

    /// Composed layers for `spec`, shared with every other caller.
    pub async fn layers(
        &self,
        spec: &MapSpecification,
        cancel: &CancellationToken,
    ) -> Result<Arc<LayerSet>, TileError> {
        spec.validate()?;
        let job = MapJob::new(spec.clone(), Arc::clone(&self.data));
        Ok(self.cache.result(job, cancel).await?)
    }

    /// Render one tile. The cached layers are never modified.
    #[instrument(skip(self, cancel), fields(map = %spec, tile = %tile))]
    pub async fn tile(
        &self,
        spec: &MapSpecification,
        tile: TileCoord,
        gzip: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, TileError> {
        let layers = self.layers(spec, cancel).await?;
        let rendered = layers.for_tile(&tile);
        debug!(features = rendered.feature_count(), gzip, "Rendered tile");
        if gzip {
            encode_gzipped(&rendered)
        } else {
            encode(&rendered)
        }
    }

    pub fn stats(&self) -> RequestCacheStats {
        self.cache.stats()
    }

    /// Router exposing `GET /maptile`.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/maptile", get(map_tile))
            .with_state(self)
    }

    /// Serve tiles on `listener` until `shutdown` fires.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), TileError> {
        let addr = listener.local_addr()?;
        info!(%addr, "Serving map tiles");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        info!("Tile server stopped");
        Ok(())
    }
}

fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("gzip"))
}

async fn map_tile(
    State(server): State<Arc<MapTileServer>>,
    Query(params): Query<MapTileParams>,
    headers: HeaderMap,
) -> Response {
    let (spec, tile) = match parse_map_request(&params) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "Rejected map tile request");
            return (StatusCode::NOT_FOUND, e.to_string()).into_response();
        }
    };

    let gzip = accepts_gzip(&headers);
    match server.tile(&spec, tile, gzip, &CancellationToken::new()).await {
        Ok(body) if gzip => (
            [
                (header::CONTENT_TYPE, "application/x-gzip"),
                (header::CONTENT_ENCODING, "gzip"),
            ],
            body,
        )
            .into_response(),
        Ok(body) => ([(header::CONTENT_TYPE, "application/octet-stream")], body).into_response(),
        Err(e) => {
            error!(map = %spec, tile = %tile, error = %e, "Map tile failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
