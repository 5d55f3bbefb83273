//! Map specifications and the layers they compose into.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::layer::{Feature, Layer, LayerSet};
use super::TileError;
use crate::cache::{BoxFuture, CacheKey};
use crate::geom::Polygon;
use crate::grid::is_egugrid;
use crate::jobs::Job;
use crate::types::{Emission, ImpactType, SimulationType};

/// Error type returned by [`MapData`] implementations.
pub type DataError = Box<dyn std::error::Error + Send + Sync>;

/// A grid and one value per cell.
#[derive(Debug, Clone, PartialEq)]
pub struct GriddedField {
    pub grid: Vec<Polygon>,
    pub values: Vec<f64>,
}

/// Source of the data drawn on maps.
pub trait MapData: Send + Sync {
    fn gridded_emissions<'a>(
        &'a self,
        spec: &'a MapSpecification,
    ) -> BoxFuture<'a, Result<GriddedField, DataError>>;

    fn gridded_concentrations<'a>(
        &'a self,
        spec: &'a MapSpecification,
    ) -> BoxFuture<'a, Result<GriddedField, DataError>>;

    fn city_geometry<'a>(&'a self, city: &'a str) -> BoxFuture<'a, Result<Polygon, DataError>>;

    fn egugrid_region<'a>(&'a self, city: &'a str) -> BoxFuture<'a, Result<Polygon, DataError>>;
}

/// What to draw: one impact of one pollutant from one source type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MapSpecification {
    pub city: String,
    pub impact_type: ImpactType,
    pub emission: Emission,
    pub source_type: String,
    pub simulation_type: SimulationType,
}

impl MapSpecification {
    /// Name of the data layer: `{city}_{impact}_{emission}_{source}_{simulation}`
    /// with enumerations written as their integer codes.
    pub fn layer_name(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}",
            self.city,
            self.impact_type.code(),
            self.emission.code(),
            self.source_type,
            self.simulation_type.code()
        )
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::normalize(&format!(
            "map_{}_it{}_em{}_st{}_sit{}",
            self.city,
            self.impact_type.code(),
            self.emission.code(),
            self.source_type,
            self.simulation_type.code()
        ))
    }

    /// Reject specifications that can never produce a data layer.
    pub fn validate(&self) -> Result<(), TileError> {
        match self.impact_type {
            ImpactType::Emissions | ImpactType::Concentrations => Ok(()),
            ImpactType::Unspecified => Err(TileError::InvalidImpactType(self.impact_type.code())),
        }
    }
}

impl fmt::Display for MapSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.layer_name())
    }
}

/// Data layer with one polygon per non-zero cell, `id` = cell index and
/// property `v` = the cell value.
pub fn data_layer(name: impl Into<String>, field: &GriddedField) -> Result<Layer, TileError> {
    if field.grid.len() != field.values.len() {
        return Err(TileError::Misaligned {
            cells: field.grid.len(),
            values: field.values.len(),
        });
    }
    let features = field
        .grid
        .iter()
        .zip(&field.values)
        .enumerate()
        .filter(|(_, (_, &v))| v != 0.0)
        .map(|(i, (cell, &v))| Feature::polygon(i as u64, cell.clone()).with_property("v", v))
        .collect();
    Ok(Layer::new(name, features))
}

fn outline_layer(name: impl Into<String>, outline: Polygon) -> Layer {
    Layer::new(name, vec![Feature::polygon(0, outline)])
}

/// Compose the layers for `spec`: the data layer, the city outline and, for
/// egugrid source types, the egugrid region outline.
#[instrument(skip(data), fields(map = %spec))]
pub async fn compose(spec: &MapSpecification, data: &dyn MapData) -> Result<LayerSet, TileError> {
    let field = match spec.impact_type {
        ImpactType::Emissions => data.gridded_emissions(spec).await,
        ImpactType::Concentrations => data.gridded_concentrations(spec).await,
        ImpactType::Unspecified => return Err(TileError::InvalidImpactType(spec.impact_type.code())),
    }
    .map_err(TileError::Data)?;

    let mut layers = vec![data_layer(spec.layer_name(), &field)?];

    let city = data.city_geometry(&spec.city).await.map_err(TileError::Data)?;
    layers.push(outline_layer(spec.city.clone(), city));

    if is_egugrid(&spec.source_type) {
        let region = data
            .egugrid_region(&spec.city)
            .await
            .map_err(TileError::Data)?;
        layers.push(outline_layer(format!("{}_egugrid", spec.city), region));
    }

    debug!(
        layers = layers.len(),
        features = layers[0].features.len(),
        "Composed map layers"
    );
    Ok(LayerSet::new(layers))
}

/// Cacheable layer composition for one specification.
pub struct MapJob {
    pub spec: MapSpecification,
    data: Arc<dyn MapData>,
}

impl MapJob {
    pub fn new(spec: MapSpecification, data: Arc<dyn MapData>) -> Self {
        Self { spec, data }
    }
}

impl Job for MapJob {
    type Output = LayerSet;
    type Error = TileError;

    fn key(&self) -> CacheKey {
        self.spec.key()
    }

    fn run(&self, _cancel: CancellationToken) -> BoxFuture<'_, Result<LayerSet, TileError>> {
        Box::pin(compose(&self.spec, self.data.as_ref()))
    }
}
