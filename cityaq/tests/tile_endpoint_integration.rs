//! Integration tests for the `/maptile` HTTP endpoint.
//!
//! Run with: `cargo test --test tile_endpoint_integration`

mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use cityaq::cache::BoxFuture;
use cityaq::geom::Polygon;
use cityaq::tile::wire::gunzip;
use cityaq::tile::{DataError, GriddedField, MapData, MapSpecification, MapTileServer, TileCoord};

use common::{accra_boundary, decode_tile, harness, has_tag, tile_layer, CountingModel, ACCRA};

const ZOOM: u8 = 12;

/// A running tile server, stopped on drop.
struct Endpoint {
    addr: SocketAddr,
    shutdown: CancellationToken,
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn start(server: MapTileServer) -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    tokio::spawn(Arc::new(server).serve(listener, shutdown.clone()));
    Endpoint { addr, shutdown }
}

fn centre_tile() -> TileCoord {
    TileCoord::containing(accra_boundary().centroid().unwrap(), ZOOM).unwrap()
}

fn query(tile: TileCoord, impact_type: &str) -> Vec<(&'static str, String)> {
    vec![
        ("x", tile.x.to_string()),
        ("y", tile.y.to_string()),
        ("z", tile.zoom.to_string()),
        ("c", ACCRA.to_string()),
        ("it", impact_type.to_string()),
        ("em", "1".to_string()),
        ("st", "roadways".to_string()),
        ("sit", "0".to_string()),
    ]
}

async fn get(
    endpoint: &Endpoint,
    params: &[(&'static str, String)],
    gzip: bool,
) -> reqwest::Response {
    let mut request = reqwest::Client::new()
        .get(format!("http://{}/maptile", endpoint.addr))
        .query(params);
    if gzip {
        request = request.header(ACCEPT_ENCODING, "gzip");
    }
    request.send().await.unwrap()
}

// ============================================================================
// Successful tiles
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_gzipped_concentration_tile() {
    let h = harness(CountingModel::default()).await;
    let endpoint = start(h.service.tile_server()).await;

    let response = get(&endpoint, &query(centre_tile(), "2"), true).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/x-gzip");
    assert_eq!(response.headers()[CONTENT_ENCODING], "gzip");

    let body = response.bytes().await.unwrap();
    let tile = decode_tile(&gunzip(&body).unwrap());

    let data = tile_layer(&tile, &format!("{ACCRA}_2_1_roadways_0"));
    assert!(!data.features.is_empty());
    assert!(data.features.iter().all(|f| has_tag(data, f, "v")));
    assert_eq!(tile_layer(&tile, ACCRA).features.len(), 1);
    assert_eq!(h.model.runs(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_plain_emissions_tile() {
    let h = harness(CountingModel::default()).await;
    let endpoint = start(h.service.tile_server()).await;

    let response = get(&endpoint, &query(centre_tile(), "1"), false).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/octet-stream");
    assert!(response.headers().get(CONTENT_ENCODING).is_none());

    let tile = decode_tile(&response.bytes().await.unwrap());
    assert!(!tile_layer(&tile, &format!("{ACCRA}_1_1_roadways_0"))
        .features
        .is_empty());

    // Emissions maps never need a simulation.
    assert_eq!(h.model.runs(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_neighbouring_tiles_share_layers() {
    let h = harness(CountingModel::default()).await;
    let server = Arc::new(h.service.tile_server());
    let tile = centre_tile();
    let neighbour = TileCoord::new(tile.x as i64 + 1, tile.y as i64, tile.zoom as i64).unwrap();

    let (spec, _) = cityaq::tile::parse_map_request(&params_for(tile)).unwrap();
    let cancel = CancellationToken::new();
    server.tile(&spec, tile, false, &cancel).await.unwrap();
    server.tile(&spec, neighbour, true, &cancel).await.unwrap();

    let stats = server.stats();
    assert_eq!(stats.executions, 1);
    assert_eq!(stats.hits, 1);
}

fn params_for(tile: TileCoord) -> cityaq::tile::MapTileParams {
    cityaq::tile::MapTileParams {
        x: Some(tile.x.to_string()),
        y: Some(tile.y.to_string()),
        z: Some(tile.zoom.to_string()),
        c: Some(ACCRA.to_string()),
        it: Some("2".to_string()),
        em: Some("1".to_string()),
        st: Some("roadways".to_string()),
        sit: Some("0".to_string()),
    }
}

// ============================================================================
// Rejected requests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_parameter_is_not_found() {
    let h = harness(CountingModel::default()).await;
    let endpoint = start(h.service.tile_server()).await;

    let mut params = query(centre_tile(), "2");
    params.retain(|(name, _)| *name != "st");
    let response = get(&endpoint, &params, false).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.text().await.unwrap().contains("st"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unspecified_impact_type_is_not_found() {
    let h = harness(CountingModel::default()).await;
    let endpoint = start(h.service.tile_server()).await;

    let response = get(&endpoint, &query(centre_tile(), "0"), false).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response
        .text()
        .await
        .unwrap()
        .contains("invalid impact type 0"));
    assert_eq!(h.model.runs(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unspecified_emission_is_not_found() {
    let h = harness(CountingModel::default()).await;
    let endpoint = start(h.service.tile_server()).await;

    let mut params = query(centre_tile(), "2");
    params.retain(|(name, _)| *name != "em");
    params.push(("em", "0".to_string()));
    let response = get(&endpoint, &params, false).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.text().await.unwrap().contains("em"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_city_is_server_error() {
    let h = harness(CountingModel::default()).await;
    let endpoint = start(h.service.tile_server()).await;

    let mut params = query(centre_tile(), "1");
    params.retain(|(name, _)| *name != "c");
    params.push(("c", "Atlantis".to_string()));
    let response = get(&endpoint, &params, false).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// ============================================================================
// Empty data
// ============================================================================

/// Map data whose fields are zero everywhere.
struct ZeroData;

fn zero_field() -> GriddedField {
    GriddedField {
        grid: vec![accra_boundary()],
        values: vec![0.0],
    }
}

impl MapData for ZeroData {
    fn gridded_emissions<'a>(
        &'a self,
        _spec: &'a MapSpecification,
    ) -> BoxFuture<'a, Result<GriddedField, DataError>> {
        Box::pin(async { Ok(zero_field()) })
    }

    fn gridded_concentrations<'a>(
        &'a self,
        _spec: &'a MapSpecification,
    ) -> BoxFuture<'a, Result<GriddedField, DataError>> {
        Box::pin(async { Ok(zero_field()) })
    }

    fn city_geometry<'a>(&'a self, _city: &'a str) -> BoxFuture<'a, Result<Polygon, DataError>> {
        Box::pin(async { Ok(accra_boundary()) })
    }

    fn egugrid_region<'a>(&'a self, _city: &'a str) -> BoxFuture<'a, Result<Polygon, DataError>> {
        Box::pin(async { Ok(accra_boundary()) })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_zero_field_gives_empty_data_layer() {
    let endpoint = start(MapTileServer::new(Arc::new(ZeroData), 10)).await;

    let response = get(&endpoint, &query(centre_tile(), "2"), true).await;
    assert_eq!(response.status(), StatusCode::OK);

    let tile = decode_tile(&gunzip(&response.bytes().await.unwrap()).unwrap());
    let data = tile_layer(&tile, &format!("{ACCRA}_2_1_roadways_0"));
    assert!(data.features.is_empty());
    assert_eq!(tile_layer(&tile, ACCRA).features.len(), 1);
}
