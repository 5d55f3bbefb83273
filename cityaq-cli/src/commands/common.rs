//! Common types and utilities shared across CLI commands.

use std::sync::Arc;

use clap::ValueEnum;
use cityaq::catalog::GeoJsonCityDirectory;
use cityaq::config::ConfigFile;
use cityaq::jobs::{HttpExecutor, LocalExecutor, ProportionalModel, RemoteExecutor};
use cityaq::service::{Backends, CityAq, ServiceConfig, ServiceError};
use cityaq::types::{Emission, SimulationType};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::CliError;

/// Pollutant selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum EmissionArg {
    /// Primary fine particulate matter
    #[value(name = "pm2.5", alias = "pm25")]
    Pm25,
    /// Ammonia
    Nh3,
    /// Nitrogen oxides
    Nox,
    /// Sulfur oxides
    Sox,
    /// Volatile organic compounds
    Voc,
}

impl From<EmissionArg> for Emission {
    fn from(arg: EmissionArg) -> Self {
        match arg {
            EmissionArg::Pm25 => Emission::PM2_5,
            EmissionArg::Nh3 => Emission::NH3,
            EmissionArg::Nox => Emission::NOx,
            EmissionArg::Sox => Emission::SOx,
            EmissionArg::Voc => Emission::VOC,
        }
    }
}

/// Simulation type selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Default)]
pub enum SimulationArg {
    /// Unit emission spread over the city
    #[default]
    CityMarginal,
    /// Inventory emissions inside the city boundary
    CityTotal,
    /// All inventory emissions of one sector
    Total,
}

impl From<SimulationArg> for SimulationType {
    fn from(arg: SimulationArg) -> Self {
        match arg {
            SimulationArg::CityMarginal => SimulationType::CityMarginal,
            SimulationArg::CityTotal => SimulationType::CityTotal,
            SimulationArg::Total => SimulationType::Total,
        }
    }
}

/// Remote job server when `executor.url` is set, otherwise an in-process
/// screening model.
pub fn executor_for(config: &ConfigFile) -> Result<Arc<dyn RemoteExecutor>, CliError> {
    match &config.executor.url {
        Some(url) => {
            let executor = HttpExecutor::new(url)
                .map_err(|e| CliError::Config(format!("executor.url {}: {}", url, e)))?;
            Ok(Arc::new(executor))
        }
        None => Ok(Arc::new(LocalExecutor::new(Arc::new(
            ProportionalModel::default(),
        )))),
    }
}

/// Owns the runtime and the service for one command invocation.
pub struct ServiceRunner {
    runtime: Runtime,
    service: Arc<CityAq>,
    cancel: CancellationToken,
}

impl ServiceRunner {
    /// Build the service described by `config` and route Ctrl+C to
    /// [`cancellation`](Self::cancellation).
    pub fn new(config: &ConfigFile) -> Result<Self, CliError> {
        let runtime = Runtime::new().map_err(CliError::Runtime)?;

        let catalog = Arc::new(GeoJsonCityDirectory::new(config.cities.directory.clone()));
        let backends = Backends::new(executor_for(config)?, catalog);
        let service_config = ServiceConfig::from_config_file(config);
        let service = runtime.block_on(CityAq::start(service_config, backends))?;
        info!(
            cities = %config.cities.directory.display(),
            executor = config.executor.url.as_deref().unwrap_or("local"),
            "Service ready"
        );

        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        ctrlc::set_handler(move || {
            eprintln!();
            eprintln!("Received shutdown signal, stopping...");
            on_signal.cancel();
        })
        .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

        Ok(Self {
            runtime,
            service: Arc::new(service),
            cancel,
        })
    }

    pub fn service(&self) -> &Arc<CityAq> {
        &self.service
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one query to completion, mapping a Ctrl+C to
    /// [`CliError::Interrupted`].
    pub fn block_on<T, F>(&self, query: F) -> Result<T, CliError>
    where
        F: std::future::Future<Output = Result<T, ServiceError>>,
    {
        let result = self.runtime.block_on(query);
        if self.cancel.is_cancelled() {
            return Err(CliError::Interrupted);
        }
        Ok(result?)
    }
}

impl Drop for ServiceRunner {
    fn drop(&mut self) {
        self.service.shutdown();
    }
}
