//! Units of expensive work and the remote execution plumbing behind them.
//!
//! A [`Job`] knows its own cache key and how to produce its output. The
//! [`RequestCache`](crate::cache::RequestCache) decides whether it runs.
//!
//! # Jobs
//!
//! - [`SimulationJob`] - drives one air-quality simulation on a
//!   [`RemoteExecutor`] and returns a [`SimulationResult`]
//! - [`MapJob`](crate::tile::MapJob) - composes the tile layers of one map
//!
//! # Executors
//!
//! - [`LocalExecutor`] - runs a [`Model`] in-process
//! - [`HttpExecutor`] - JSON over HTTP to a job server

mod executor;
mod http;
mod local;
mod result;
mod simulation;

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::cache::{BoxFuture, CacheKey};
use crate::catalog::CatalogError;
use crate::codec::CacheCodec;
use crate::emissions::EmissionsError;
use crate::geom::GeometryError;
use crate::grid::GridError;

pub use executor::{FileSet, JobHandle, JobSpec, JobState, RemoteExecutor, RemoteStatus};
pub use http::HttpExecutor;
pub use local::{LocalExecutor, Model, ProportionalModel};
pub use result::{SimulationResult, OUTPUT_FILE};
pub use simulation::{
    Domain, PollConfig, SimulationConfig, SimulationContext, SimulationJob, SimulationTemplate,
    SimulationTemplates, StackParameters, CONFIG_FILE, EGU_STACK, EMISSIONS_FILE, MASK_FILE,
};

/// A unit of work whose output is cached under [`Job::key`].
pub trait Job: Send + Sync + 'static {
    type Output: CacheCodec + Send + Sync + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fingerprint of the request. Equal logical requests must return equal
    /// keys.
    fn key(&self) -> CacheKey;

    /// Produce the output. `cancel` fires when the owning cache shuts down.
    fn run(&self, cancel: CancellationToken) -> BoxFuture<'_, Result<Self::Output, Self::Error>>;
}

/// Errors raised while configuring or running a simulation.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid simulation configuration: {0}")]
    Config(String),

    /// Failure reported by the remote executor, message passed through as is.
    #[error("{0}")]
    Remote(String),

    #[error("simulation did not finish within {0:?}")]
    Timeout(Duration),

    #[error("simulation cancelled")]
    Cancelled,

    #[error("malformed simulation output: {0}")]
    Output(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Emissions(#[from] EmissionsError),
}
