//! Spatial allocation of emissions onto a grid.
//!
//! Marginal simulations spread a unit emission of one pollutant over the
//! city (or its egugrid region). How the mass is distributed is up to an
//! [`EmissionsAllocator`]; [`UniformAllocator`] spreads it evenly.

use chrono::{TimeZone, Utc};
use thiserror::Error;
use tracing::debug;

use crate::catalog::{CatalogError, CityCatalog};
use crate::geom::{GeometryError, Polygon};
use crate::grid::{build_grid, is_egugrid, map_resolution, GridError};

/// Unit emission: one kilotonne.
pub const UNIT_EMISSION_KG: f64 = 1.0e6;

/// Mass emitted per simulated year, as a rate in kg/s.
///
/// The simulated period is calendar year 2016 (a leap year), so the divisor
/// is 366 days.
pub fn unit_emission_rate() -> f64 {
    let begin = Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0);
    let end = Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0);
    match (begin.single(), end.single()) {
        (Some(begin), Some(end)) => UNIT_EMISSION_KG / (end - begin).num_seconds() as f64,
        _ => UNIT_EMISSION_KG / (366.0 * 86_400.0),
    }
}

#[derive(Debug, Error)]
pub enum EmissionsError {
    #[error("no grid cells fall inside the {source_type} region")]
    NoCells { source_type: String },

    #[error("invalid emission rate {0}")]
    InvalidRate(f64),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Distributes a total emission rate over grid cells.
pub trait EmissionsAllocator: Send + Sync {
    /// Per-cell emission rates, index-aligned with `grid`, summing to
    /// `total_rate`.
    fn allocate(
        &self,
        region: &Polygon,
        source_type: &str,
        grid: &[Polygon],
        total_rate: f64,
    ) -> Result<Vec<f64>, EmissionsError>;
}

/// Equal share to every cell whose centroid lies inside the region.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformAllocator;

impl EmissionsAllocator for UniformAllocator {
    fn allocate(
        &self,
        region: &Polygon,
        source_type: &str,
        grid: &[Polygon],
        total_rate: f64,
    ) -> Result<Vec<f64>, EmissionsError> {
        if !total_rate.is_finite() || total_rate < 0.0 {
            return Err(EmissionsError::InvalidRate(total_rate));
        }
        let bounds = region.bounds()?;

        let mut inside = Vec::with_capacity(grid.len());
        for cell in grid {
            let c = cell.centroid()?;
            inside.push(bounds.contains(c) && region.contains(c));
        }

        let count = inside.iter().filter(|&&i| i).count();
        if count == 0 {
            return Err(EmissionsError::NoCells {
                source_type: source_type.to_string(),
            });
        }
        let share = total_rate / count as f64;
        Ok(inside
            .into_iter()
            .map(|i| if i { share } else { 0.0 })
            .collect())
    }
}

/// A grid and the emission rate (kg/s) of each cell.
#[derive(Debug, Clone, PartialEq)]
pub struct GriddedEmissions {
    pub grid: Vec<Polygon>,
    pub emissions: Vec<f64>,
}

/// Region over which `source_type` emissions of `city` are spread: the city
/// itself, or its egugrid region for egugrid source types.
pub async fn emissions_region(
    catalog: &dyn CityCatalog,
    city: &str,
    source_type: &str,
) -> Result<Polygon, CatalogError> {
    if is_egugrid(source_type) {
        catalog.egugrid_region(city).await
    } else {
        catalog.geometry(city).await
    }
}

/// Grid a unit emission of `source_type` in `city` at the mapping
/// resolution.
pub async fn unit_emissions(
    catalog: &dyn CityCatalog,
    allocator: &dyn EmissionsAllocator,
    city: &str,
    source_type: &str,
) -> Result<GriddedEmissions, EmissionsError> {
    let region = emissions_region(catalog, city, source_type).await?;
    let dx = map_resolution(source_type, city);
    let grid = build_grid(&region, dx)?;
    let emissions = allocator.allocate(&region, source_type, &grid, unit_emission_rate())?;
    debug!(
        city,
        source_type,
        cells = grid.len(),
        resolution = dx,
        "Gridded unit emissions"
    );
    Ok(GriddedEmissions { grid, emissions })
}
