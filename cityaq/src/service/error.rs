//! Service error types.

use thiserror::Error;

use crate::cache::{RequestError, ServiceCacheError};
use crate::catalog::CatalogError;
use crate::colormap::ColormapError;
use crate::emissions::EmissionsError;
use crate::geom::GeometryError;
use crate::grid::GridError;
use crate::jobs::JobError;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request can never succeed as stated. Never reaches a job.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no emissions allocated for {source_type} in {city}")]
    NoEmissions { city: String, source_type: String },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Emissions(#[from] EmissionsError),

    #[error(transparent)]
    Colormap(#[from] ColormapError),

    /// A simulation failed, or its cached result could not be read.
    #[error("{0}")]
    Simulation(#[from] RequestError<JobError>),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("opening result store: {0}")]
    Store(#[from] ServiceCacheError),
}

impl ServiceError {
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, ServiceError::InvalidRequest(_))
    }
}
