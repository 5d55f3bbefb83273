//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use geozero::mvt::{tile, Message, Tile};
use tempfile::TempDir;

use cityaq::catalog::StaticCityCatalog;
use cityaq::geom::{Point, Polygon};
use cityaq::jobs::{
    FileSet, JobSpec, LocalExecutor, Model, PollConfig, ProportionalModel, SimulationTemplates,
    OUTPUT_FILE,
};
use cityaq::service::{Backends, CityAq, ResultStore, ServiceConfig};

pub const ACCRA: &str = "Accra Metropolitan";

/// Model scaling factor used by [`CountingModel`].
pub const FACTOR: f64 = 0.75;

const TEMPLATE: &str = r#"{
    "domain": {"xo": -180, "yo": -90, "dx": 4, "dy": 4,
               "xnests": [36, 2, 2], "ynests": [36, 2, 2]},
    "inventory": {"roadways": ["road.nc"], "residential": ["res.nc"]},
    "memory_gb": 8
}"#;

/// Parse an uncompressed vector tile.
pub fn decode_tile(bytes: &[u8]) -> Tile {
    Tile::decode(bytes).unwrap()
}

/// Layer of `tile` named `name`, panicking when absent.
pub fn tile_layer<'a>(tile: &'a Tile, name: &str) -> &'a tile::Layer {
    tile.layers
        .iter()
        .find(|l| l.name == name)
        .unwrap_or_else(|| panic!("no layer {name}"))
}

/// Whether `feature` carries a tag named `key`.
pub fn has_tag(layer: &tile::Layer, feature: &tile::Feature, key: &str) -> bool {
    let Some(k) = layer.keys.iter().position(|k| k == key) else {
        return false;
    };
    feature.tags.chunks(2).any(|pair| pair[0] as usize == k)
}

pub fn accra_boundary() -> Polygon {
    Polygon::rect(Point::new(-0.25, 5.52), Point::new(-0.19, 5.6))
}

/// [`ProportionalModel`] that counts its runs and can be told to fail or to
/// write an output without grid cells.
#[derive(Default)]
pub struct CountingModel {
    pub runs: AtomicUsize,
    pub fail: AtomicBool,
    pub empty: AtomicBool,
    /// Slows each run down so concurrent requests overlap.
    pub delay: Duration,
}

impl CountingModel {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl Model for CountingModel {
    fn run(&self, spec: &JobSpec) -> Result<FileSet, String> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        if self.fail.load(Ordering::SeqCst) {
            return Err("model diverged".to_string());
        }
        if self.empty.load(Ordering::SeqCst) {
            let body = br#"{"type":"FeatureCollection","features":[]}"#.to_vec();
            return Ok(FileSet::from([(OUTPUT_FILE.to_string(), body)]));
        }
        ProportionalModel {
            factor: FACTOR,
            population_per_cell: 100.0,
        }
        .run(spec)
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub model: Arc<CountingModel>,
    pub service: Arc<CityAq>,
}

/// Write the simulation templates into `dir`.
pub fn templates(dir: &TempDir) -> SimulationTemplates {
    let path = dir.path().join("template.json");
    std::fs::write(&path, TEMPLATE).unwrap();
    SimulationTemplates {
        city_marginal: path.clone(),
        city_total: path.clone(),
        total: path,
    }
}

/// Service over a catalog holding Accra under its full and short names.
pub async fn service_with(
    dir: &TempDir,
    model: Arc<CountingModel>,
    store: ResultStore,
) -> CityAq {
    let catalog = StaticCityCatalog::new()
        .with_city(ACCRA, accra_boundary())
        .with_city("Accra", accra_boundary());
    let executor = LocalExecutor::new(model);
    let config = ServiceConfig::new(templates(dir))
        .with_store(store)
        .with_poll(PollConfig::default().with_interval(Duration::from_millis(5)));
    CityAq::start(config, Backends::new(Arc::new(executor), Arc::new(catalog)))
        .await
        .unwrap()
}

pub async fn harness(model: CountingModel) -> Harness {
    let dir = TempDir::new().unwrap();
    let model = Arc::new(model);
    let service = service_with(&dir, Arc::clone(&model), ResultStore::default()).await;
    Harness {
        dir,
        model,
        service: Arc::new(service),
    }
}
