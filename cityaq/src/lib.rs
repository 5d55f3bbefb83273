//! CityAQ - air-quality impacts of urban activities
//!
//! This library answers map and analysis queries about simulated air-quality
//! impacts of city emissions. Expensive simulations are deduplicated and
//! cached by request fingerprint, driven to completion on a remote job
//! executor, and turned into Mapbox Vector Tiles on demand.
//!
//! # Modules
//!
//! - [`cache`] - single-flight request cache over memory or disk stores
//! - [`jobs`] - simulation jobs and the executors that run them
//! - [`tile`] - layer composition, tile geometry pipeline and HTTP endpoint
//! - [`service`] - the query surface tying it all together
//! - [`colormap`] - colours and legends for scalar fields
//! - [`config`] / [`logging`] - configuration file and tracing setup

pub mod cache;
pub mod catalog;
pub mod codec;
pub mod colormap;
pub mod config;
pub mod emissions;
pub mod geom;
pub mod grid;
pub mod jobs;
pub mod logging;
pub mod service;
pub mod tile;
pub mod types;

/// Crate version, as reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
