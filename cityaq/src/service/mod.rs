//! Query surface of the CityAQ service.
//!
//! [`CityAq`] ties the catalog, the emissions allocator and the simulation
//! cache together:
//!
//! ```text
//!  cities / city_geometry ─────────────► CityCatalog
//!  emissions_grid / gridded_emissions ─► GridBuilder + EmissionsAllocator
//!  emissions_map ──────────────────────► gridded_emissions + Colormap
//!  gridded_concentrations ─┐
//!  gridded_population ─────┼──► RequestCache<SimulationJob> ──► RemoteExecutor
//!  impact_summary ─────────┘
//! ```
//!
//! It also implements [`MapData`], which is how the tile server reaches the
//! same cached simulations.
//!
//! # Example
//!
//! ```ignore
//! let service = Arc::new(CityAq::start(config, Backends::new(executor, catalog)).await?);
//! let summary = service.impact_summary(&request, &CancellationToken::new()).await?;
//! let tiles = Arc::new(service.tile_server());
//! ```

mod config;
mod error;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

pub use config::{ResultStore, ServiceConfig, DEFAULT_RESULT_ENTRIES};
pub use error::ServiceError;

use crate::cache::{
    BoxFuture, Cache, DiskCacheProvider, MemoryCacheProvider, RequestCache, RequestCacheStats,
};
use crate::catalog::CityCatalog;
use crate::colormap::{Colormap, LegendEntry};
use crate::emissions::{
    emissions_region, unit_emission_rate, unit_emissions, EmissionsAllocator, GriddedEmissions,
    UniformAllocator,
};
use crate::geom::Polygon;
use crate::grid::{build_grid, map_resolution};
use crate::jobs::{RemoteExecutor, SimulationContext, SimulationJob, SimulationResult};
use crate::tile::{DataError, GriddedField, MapData, MapSpecification, MapTileServer};
use crate::types::{Emission, SimulationType};

/// Air breathed per person per day, m³.
pub const BREATHING_RATE: f64 = 14.5;

const KG_PER_UG: f64 = 1.0e-9;
const SECONDS_PER_DAY: f64 = 86_400.0;

// =============================================================================
// Requests and responses
// =============================================================================

/// One pollutant from one source type in one city.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImpactRequest {
    pub city: String,
    pub emission: Emission,
    pub source_type: String,
    pub simulation_type: SimulationType,
}

impl From<&MapSpecification> for ImpactRequest {
    fn from(spec: &MapSpecification) -> Self {
        Self {
            city: spec.city.clone(),
            emission: spec.emission,
            source_type: spec.source_type.clone(),
            simulation_type: spec.simulation_type,
        }
    }
}

/// Population on the grid of one simulation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PopulationRequest {
    pub city: String,
    pub source_type: String,
    pub simulation_type: SimulationType,
}

/// Colour of every grid cell plus the legend explaining them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionsMap {
    pub rgb: Vec<[u8; 3]>,
    pub legend: Vec<LegendEntry>,
}

/// Population, exposure and intake fraction of a marginal simulation, for
/// the city alone and for the whole domain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpactSummary {
    pub city_population: f64,
    pub population: f64,
    /// Σ population × concentration, person·μg/m³.
    pub city_exposure: f64,
    pub total_exposure: f64,
    pub city_intake_fraction: f64,
    pub total_intake_fraction: f64,
}

/// Fraction of emitted mass inhaled, given exposure in person·μg/m³ and an
/// emission rate in kg/s.
pub fn intake_fraction(exposure: f64, emission_rate: f64) -> f64 {
    exposure * BREATHING_RATE * KG_PER_UG / (emission_rate * SECONDS_PER_DAY)
}

fn require(value: &str, what: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::InvalidRequest(format!("{what} is required")));
    }
    Ok(())
}

fn require_emission(emission: Emission) -> Result<(), ServiceError> {
    if emission == Emission::Unspecified {
        return Err(ServiceError::InvalidRequest(format!(
            "invalid emission type {emission}"
        )));
    }
    Ok(())
}

// =============================================================================
// Service
// =============================================================================

/// External systems the service talks to.
pub struct Backends {
    pub executor: Arc<dyn RemoteExecutor>,
    pub catalog: Arc<dyn CityCatalog>,
    pub allocator: Arc<dyn EmissionsAllocator>,
}

impl Backends {
    /// Uses [`UniformAllocator`] for emissions.
    pub fn new(executor: Arc<dyn RemoteExecutor>, catalog: Arc<dyn CityCatalog>) -> Self {
        Self {
            executor,
            catalog,
            allocator: Arc::new(UniformAllocator),
        }
    }

    pub fn with_allocator(mut self, allocator: Arc<dyn EmissionsAllocator>) -> Self {
        self.allocator = allocator;
        self
    }
}

pub struct CityAq {
    catalog: Arc<dyn CityCatalog>,
    allocator: Arc<dyn EmissionsAllocator>,
    simulation: Arc<SimulationContext>,
    simulations: RequestCache<SimulationJob>,
    config: ServiceConfig,
}

impl CityAq {
    /// Open the result store and assemble the service.
    pub async fn start(config: ServiceConfig, backends: Backends) -> Result<Self, ServiceError> {
        let store: Arc<dyn Cache> = match &config.store {
            ResultStore::Memory { max_entries } => Arc::new(MemoryCacheProvider::new(*max_entries)),
            ResultStore::Disk { directory } => Arc::new(DiskCacheProvider::open(directory).await?),
        };
        info!(store = ?config.store, "Starting CityAQ service");

        // Clears partial writes left by an earlier run.
        let gc = store.gc().await?;
        if gc.entries_removed > 0 {
            info!(%gc, "Cleaned result store");
        }
        debug!(entries = store.entry_count(), "Result store ready");

        let simulation = SimulationContext::new(
            backends.executor,
            Arc::clone(&backends.catalog),
            config.templates.clone(),
        )
        .with_allocator(Arc::clone(&backends.allocator))
        .with_poll(config.poll);

        Ok(Self {
            catalog: backends.catalog,
            allocator: backends.allocator,
            simulation: Arc::new(simulation),
            simulations: RequestCache::new(store),
            config,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Every city in the catalog, sorted.
    pub async fn cities(&self) -> Result<Vec<String>, ServiceError> {
        let mut names = self.catalog.names().await?;
        names.sort();
        Ok(names)
    }

    pub async fn city_geometry(&self, name: &str) -> Result<Polygon, ServiceError> {
        require(name, "city name")?;
        Ok(self.catalog.geometry(name).await?)
    }

    /// Mapping grid for `source_type` emissions in `name`.
    pub async fn emissions_grid(
        &self,
        name: &str,
        source_type: &str,
    ) -> Result<Vec<Polygon>, ServiceError> {
        require(name, "city name")?;
        require(source_type, "source type")?;
        let region = emissions_region(self.catalog.as_ref(), name, source_type).await?;
        Ok(build_grid(&region, map_resolution(source_type, name))?)
    }

    /// A unit emission allocated over the city, or its egugrid region.
    #[instrument(skip(self), fields(city = %req.city, source = %req.source_type))]
    pub async fn gridded_emissions(
        &self,
        req: &ImpactRequest,
    ) -> Result<GriddedEmissions, ServiceError> {
        require(&req.city, "city name")?;
        require(&req.source_type, "source type")?;
        require_emission(req.emission)?;

        let gridded = unit_emissions(
            self.catalog.as_ref(),
            self.allocator.as_ref(),
            &req.city,
            &req.source_type,
        )
        .await?;
        if gridded.emissions.iter().all(|&v| v == 0.0) {
            return Err(ServiceError::NoEmissions {
                city: req.city.clone(),
                source_type: req.source_type.clone(),
            });
        }
        Ok(gridded)
    }

    /// Gridded emissions rendered through a [`Colormap`].
    pub async fn emissions_map(&self, req: &ImpactRequest) -> Result<EmissionsMap, ServiceError> {
        let gridded = self.gridded_emissions(req).await?;
        let colormap = Colormap::new(&gridded.emissions);
        let rgb = gridded
            .emissions
            .iter()
            .map(|&v| colormap.at(v).map(|c| c.to_array()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(EmissionsMap {
            rgb,
            legend: colormap.legend(),
        })
    }

    /// Cached (or freshly run) simulation for one source type.
    pub async fn simulation(
        &self,
        city: &str,
        source_type: &str,
        simulation_type: SimulationType,
        cancel: &CancellationToken,
    ) -> Result<Arc<SimulationResult>, ServiceError> {
        require(city, "city name")?;
        require(source_type, "source type")?;
        let job = SimulationJob::new(
            Arc::clone(&self.simulation),
            city,
            source_type,
            simulation_type,
        );
        let result = self.simulations.result(job, cancel).await?;
        debug!(city, source_type, %simulation_type, cells = result.len(), "Simulation ready");
        Ok(result)
    }

    /// Concentrations of the species formed from `req.emission`.
    pub async fn gridded_concentrations(
        &self,
        req: &ImpactRequest,
        cancel: &CancellationToken,
    ) -> Result<GriddedField, ServiceError> {
        require_emission(req.emission)?;
        let result = self
            .simulation(&req.city, &req.source_type, req.simulation_type, cancel)
            .await?;
        let values = result.concentrations(req.emission).ok_or_else(|| {
            ServiceError::InvalidRequest(format!("invalid emission type {}", req.emission))
        })?;
        Ok(GriddedField {
            grid: result.grid.clone(),
            values: values.to_vec(),
        })
    }

    pub async fn gridded_population(
        &self,
        req: &PopulationRequest,
        cancel: &CancellationToken,
    ) -> Result<GriddedField, ServiceError> {
        let result = self
            .simulation(&req.city, &req.source_type, req.simulation_type, cancel)
            .await?;
        Ok(GriddedField {
            grid: result.grid.clone(),
            values: result.population.clone(),
        })
    }

    /// Population, exposure and intake fraction of a marginal simulation.
    ///
    /// City figures count the cells whose centroid lies inside the city.
    #[instrument(skip(self, cancel), fields(city = %req.city, source = %req.source_type))]
    pub async fn impact_summary(
        &self,
        req: &ImpactRequest,
        cancel: &CancellationToken,
    ) -> Result<ImpactSummary, ServiceError> {
        if req.simulation_type != SimulationType::CityMarginal {
            return Err(ServiceError::InvalidRequest(format!(
                "impact summaries need a {} simulation, not {}",
                SimulationType::CityMarginal,
                req.simulation_type
            )));
        }
        require_emission(req.emission)?;
        let result = self
            .simulation(&req.city, &req.source_type, req.simulation_type, cancel)
            .await?;
        let concentrations = result.concentrations(req.emission).ok_or_else(|| {
            ServiceError::InvalidRequest(format!("invalid emission type {}", req.emission))
        })?;
        let city = self.catalog.geometry(&req.city).await?;
        let city_bounds = city.bounds()?;

        let mut summary = ImpactSummary {
            city_population: 0.0,
            population: 0.0,
            city_exposure: 0.0,
            total_exposure: 0.0,
            city_intake_fraction: 0.0,
            total_intake_fraction: 0.0,
        };
        for ((cell, &pop), &conc) in result
            .grid
            .iter()
            .zip(&result.population)
            .zip(concentrations)
        {
            let exposure = pop * conc;
            summary.population += pop;
            summary.total_exposure += exposure;
            let c = cell.centroid()?;
            if city_bounds.contains(c) && city.contains(c) {
                summary.city_population += pop;
                summary.city_exposure += exposure;
            }
        }

        let rate = unit_emission_rate();
        summary.city_intake_fraction = intake_fraction(summary.city_exposure, rate);
        summary.total_intake_fraction = intake_fraction(summary.total_exposure, rate);
        Ok(summary)
    }

    /// Sectors of the emissions inventory, sorted.
    pub async fn emissions_inventory_sectors(&self) -> Result<Vec<String>, ServiceError> {
        let template = self.config.templates.load(SimulationType::Total).await?;
        Ok(template.inventory.into_keys().collect())
    }

    pub fn simulation_stats(&self) -> RequestCacheStats {
        self.simulations.stats()
    }

    /// Tile server drawing maps from this service.
    pub fn tile_server(self: &Arc<Self>) -> MapTileServer {
        let data: Arc<dyn MapData> = Arc::clone(self) as Arc<dyn MapData>;
        MapTileServer::new(data, self.config.tile_cache_entries)
    }

    /// Stop running simulations.
    pub fn shutdown(&self) {
        info!(stats = %self.simulations.stats(), "Shutting down CityAQ service");
        self.simulations.shutdown();
    }
}

fn data_error(e: ServiceError) -> DataError {
    Box::new(e)
}

impl MapData for CityAq {
    fn gridded_emissions<'a>(
        &'a self,
        spec: &'a MapSpecification,
    ) -> BoxFuture<'a, Result<GriddedField, DataError>> {
        Box::pin(async move {
            let gridded = CityAq::gridded_emissions(self, &ImpactRequest::from(spec))
                .await
                .map_err(data_error)?;
            Ok(GriddedField {
                grid: gridded.grid,
                values: gridded.emissions,
            })
        })
    }

    fn gridded_concentrations<'a>(
        &'a self,
        spec: &'a MapSpecification,
    ) -> BoxFuture<'a, Result<GriddedField, DataError>> {
        Box::pin(async move {
            CityAq::gridded_concentrations(
                self,
                &ImpactRequest::from(spec),
                &CancellationToken::new(),
            )
            .await
            .map_err(data_error)
        })
    }

    fn city_geometry<'a>(&'a self, city: &'a str) -> BoxFuture<'a, Result<Polygon, DataError>> {
        Box::pin(async move { self.city_geometry(city).await.map_err(data_error) })
    }

    fn egugrid_region<'a>(&'a self, city: &'a str) -> BoxFuture<'a, Result<Polygon, DataError>> {
        Box::pin(async move {
            self.catalog
                .egugrid_region(city)
                .await
                .map_err(|e| data_error(e.into()))
        })
    }
}
