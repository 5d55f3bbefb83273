//! Air-quality simulation jobs.
//!
//! ```text
//! Configuring ──► Submitted ──► Running ──┬──► Complete ──► output, delete
//!                                         ├──► Failed   ──► delete, JobError::Remote
//!                                         └──► Missing  ──► delete, JobError::Remote
//! ```
//!
//! A job that ends in error is still deleted on a best-effort basis; only a
//! failed delete after a successful run is reported.
//!
//! Configuration starts from a per-simulation-type JSON template and is
//! specialised in one `match` on [`SimulationType`]. The resulting
//! [`SimulationConfig`] travels to the executor as `config.json` next to any
//! generated input files.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::executor::{FileSet, JobHandle, JobSpec, JobState, RemoteExecutor};
use super::result::{SimulationResult, OUTPUT_FILE};
use super::{Job, JobError};
use crate::cache::{BoxFuture, CacheKey};
use crate::catalog::{CityCatalog, MAX_LATITUDE, MAX_LONGITUDE};
use crate::emissions::{unit_emissions, EmissionsAllocator, GriddedEmissions, UniformAllocator};
use crate::geom::geojson::{Feature, FeatureCollection, Geometry};
use crate::geom::Point;
use crate::grid::is_egugrid;
use crate::types::SimulationType;

/// Model sub-commands for a steady-state run.
pub const COMMANDS: [&str; 2] = ["run", "steady"];

/// Generated emissions input for marginal simulations.
pub const EMISSIONS_FILE: &str = "emissions.geojson";

/// City boundary restricting inventory emissions in city-total simulations.
pub const MASK_FILE: &str = "emis_mask.json";

/// Serialized [`SimulationConfig`].
pub const CONFIG_FILE: &str = "config.json";

/// Default time between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Default upper bound on the time spent waiting for a job.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(72 * 60 * 60);

const DEFAULT_MEMORY_GB: u32 = 20;

/// Release parameters of an elevated point source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StackParameters {
    /// Metres.
    pub height: f64,
    /// Metres.
    pub diameter: f64,
    /// Kelvin.
    pub temperature: f64,
    /// Metres per second.
    pub velocity: f64,
}

/// Average power-plant stack, applied to egugrid sources.
pub const EGU_STACK: StackParameters = StackParameters {
    height: 63.5,
    diameter: 4.1,
    temperature: 519.2,
    velocity: 24.7,
};

const GROUND_LEVEL: StackParameters = StackParameters {
    height: 0.0,
    diameter: 0.0,
    temperature: 0.0,
    velocity: 0.0,
};

// =============================================================================
// Configuration
// =============================================================================

/// Variable-resolution model grid. Only the outermost nest is repositioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub xo: f64,
    pub yo: f64,
    pub dx: f64,
    pub dy: f64,
    pub xnests: Vec<u32>,
    pub ynests: Vec<u32>,
}

fn round_unit(x: f64, unit: f64) -> f64 {
    (x / unit).round() * unit
}

impl Domain {
    fn validate(&self) -> Result<(), JobError> {
        if !(self.dx > 0.0 && self.dy > 0.0) {
            return Err(JobError::Config(format!(
                "domain cell size must be positive, got {} x {}",
                self.dx, self.dy
            )));
        }
        if self.xnests.is_empty() || self.ynests.is_empty() {
            return Err(JobError::Config("domain has no nests".into()));
        }
        Ok(())
    }

    /// Move the lower-left corner so `center` sits in the middle of the
    /// outer nest, without leaving the template's extent on the low side and
    /// shrinking the nest where it would cross 178°E or 89.5°N.
    pub fn centered_on(&self, center: Point) -> Result<Domain, JobError> {
        self.validate()?;
        let mut out = self.clone();
        let nx = out.xnests[0] as f64;
        let ny = out.ynests[0] as f64;

        out.xo = out.xo.max(round_unit(center.x - nx * out.dx / 2.0, out.dx));
        out.yo = out.yo.max(round_unit(center.y - ny * out.dy / 2.0, out.dy));

        if out.xo + out.dx * nx > MAX_LONGITUDE {
            out.xnests[0] = ((MAX_LONGITUDE - out.xo) / out.dx).floor().max(0.0) as u32;
        }
        if out.yo + out.dy * ny > MAX_LATITUDE {
            out.ynests[0] = ((MAX_LATITUDE - out.yo) / out.dy).floor().max(0.0) as u32;
        }
        Ok(out)
    }
}

fn default_memory_gb() -> u32 {
    DEFAULT_MEMORY_GB
}

/// Starting point for one simulation type, loaded from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationTemplate {
    pub domain: Domain,
    /// Inventory sector name to data files.
    #[serde(default)]
    pub inventory: BTreeMap<String, Vec<String>>,
    #[serde(default = "default_memory_gb")]
    pub memory_gb: u32,
    /// Model settings passed through untouched.
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

/// Paths of the per-simulation-type templates.
#[derive(Debug, Clone, Default)]
pub struct SimulationTemplates {
    pub city_marginal: PathBuf,
    pub city_total: PathBuf,
    pub total: PathBuf,
}

impl SimulationTemplates {
    pub fn path(&self, simulation_type: SimulationType) -> &PathBuf {
        match simulation_type {
            SimulationType::CityMarginal => &self.city_marginal,
            SimulationType::CityTotal => &self.city_total,
            SimulationType::Total => &self.total,
        }
    }

    /// Read and parse the template for `simulation_type`.
    pub async fn load(&self, simulation_type: SimulationType) -> Result<SimulationTemplate, JobError> {
        let path = self.path(simulation_type);
        let data = tokio::fs::read(path).await.map_err(|e| {
            JobError::Config(format!("reading {simulation_type} template {}: {e}", path.display()))
        })?;
        serde_json::from_slice(&data).map_err(|e| {
            JobError::Config(format!("parsing {simulation_type} template {}: {e}", path.display()))
        })
    }
}

/// Fully specialised model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub job_name: String,
    pub commands: Vec<String>,
    pub domain: Domain,
    /// Input files holding explicit emissions.
    pub emissions_files: Vec<String>,
    /// Inventory sectors to include.
    pub inventory: BTreeMap<String, Vec<String>>,
    /// Input file restricting inventory emissions to a region.
    pub emission_mask: Option<String>,
    pub memory_gb: u32,
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

/// Status polling behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

impl PollConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }
}

// =============================================================================
// Job
// =============================================================================

/// Collaborators shared by every simulation job.
pub struct SimulationContext {
    pub executor: Arc<dyn RemoteExecutor>,
    pub catalog: Arc<dyn CityCatalog>,
    pub allocator: Arc<dyn EmissionsAllocator>,
    pub templates: SimulationTemplates,
    pub poll: PollConfig,
}

impl SimulationContext {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        catalog: Arc<dyn CityCatalog>,
        templates: SimulationTemplates,
    ) -> Self {
        Self {
            executor,
            catalog,
            allocator: Arc::new(UniformAllocator),
            templates,
            poll: PollConfig::default(),
        }
    }

    pub fn with_allocator(mut self, allocator: Arc<dyn EmissionsAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }
}

/// One simulation of one source type.
pub struct SimulationJob {
    ctx: Arc<SimulationContext>,
    pub city: String,
    pub source_type: String,
    pub simulation_type: SimulationType,
}

impl SimulationJob {
    pub fn new(
        ctx: Arc<SimulationContext>,
        city: impl Into<String>,
        source_type: impl Into<String>,
        simulation_type: SimulationType,
    ) -> Self {
        Self {
            ctx,
            city: city.into(),
            source_type: source_type.into(),
            simulation_type,
        }
    }

    /// Build the model configuration and input files.
    pub async fn configure(&self) -> Result<(SimulationConfig, FileSet), JobError> {
        let template = self.ctx.templates.load(self.simulation_type).await?;
        template.domain.validate()?;

        let mut files = FileSet::new();
        let mut config = SimulationConfig {
            job_name: self.key().to_string(),
            commands: COMMANDS.iter().map(|c| c.to_string()).collect(),
            domain: template.domain,
            emissions_files: Vec::new(),
            inventory: template.inventory,
            emission_mask: None,
            memory_gb: template.memory_gb,
            settings: template.settings,
        };

        match self.simulation_type {
            SimulationType::CityMarginal => {
                let emissions = unit_emissions(
                    self.ctx.catalog.as_ref(),
                    self.ctx.allocator.as_ref(),
                    &self.city,
                    &self.source_type,
                )
                .await?;
                files.insert(EMISSIONS_FILE.into(), self.emissions_input(&emissions)?);
                config.emissions_files = vec![EMISSIONS_FILE.into()];
                config.inventory.clear();
                config.domain = self.city_domain(&config.domain).await?;
            }
            SimulationType::CityTotal => {
                config.domain = self.city_domain(&config.domain).await?;
                config.inventory = self.select_sector(config.inventory)?;
                let city = self.ctx.catalog.geometry(&self.city).await?;
                files.insert(MASK_FILE.into(), serde_json::to_vec(&Geometry::from_polygon(&city))?);
                config.emission_mask = Some(MASK_FILE.into());
            }
            SimulationType::Total => {
                config.inventory = self.select_sector(config.inventory)?;
            }
        }

        files.insert(CONFIG_FILE.into(), serde_json::to_vec_pretty(&config)?);
        Ok((config, files))
    }

    async fn city_domain(&self, domain: &Domain) -> Result<Domain, JobError> {
        let city = self.ctx.catalog.geometry(&self.city).await?;
        domain.centered_on(city.centroid()?)
    }

    fn select_sector(
        &self,
        mut inventory: BTreeMap<String, Vec<String>>,
    ) -> Result<BTreeMap<String, Vec<String>>, JobError> {
        match inventory.remove_entry(&self.source_type) {
            Some((sector, files)) => Ok(BTreeMap::from([(sector, files)])),
            None => Err(JobError::Config(format!(
                "inventory has no sector {:?}",
                self.source_type
            ))),
        }
    }

    /// Every species carries the same unit emission; the model output for
    /// each precursor is then read from its own concentration column.
    fn emissions_input(&self, emissions: &GriddedEmissions) -> Result<Vec<u8>, JobError> {
        let stack = if is_egugrid(&self.source_type) {
            EGU_STACK
        } else {
            GROUND_LEVEL
        };
        let features = emissions
            .grid
            .iter()
            .zip(&emissions.emissions)
            .map(|(cell, &v)| {
                let mut props = Map::new();
                for species in ["PM2_5", "VOC", "NH3", "NOx", "SOx"] {
                    props.insert(species.into(), Value::from(v));
                }
                props.insert("Height".into(), Value::from(stack.height));
                props.insert("Diam".into(), Value::from(stack.diameter));
                props.insert("Temp".into(), Value::from(stack.temperature));
                props.insert("Velocity".into(), Value::from(stack.velocity));
                Feature::polygon(cell, props)
            })
            .collect();
        Ok(serde_json::to_vec(&FeatureCollection::new(features))?)
    }

    /// Poll until the job reaches a terminal state.
    async fn wait(&self, handle: &JobHandle, cancel: &CancellationToken) -> Result<(), JobError> {
        let poll = self.ctx.poll;
        let started = Instant::now();
        let mut last = None;
        loop {
            let status = self.ctx.executor.status(handle).await?;
            if last != Some(status.state) {
                info!(job = %handle.name, state = %status.state, "Simulation state changed");
                last = Some(status.state);
            }
            match status.state {
                JobState::Complete => return Ok(()),
                JobState::Failed | JobState::Missing => {
                    let message = if status.message.is_empty() {
                        format!("job {} {}", handle.name, status.state)
                    } else {
                        status.message
                    };
                    return Err(JobError::Remote(message));
                }
                JobState::Waiting | JobState::Running => {}
            }

            let elapsed = started.elapsed();
            if elapsed >= poll.max_wait {
                return Err(JobError::Timeout(poll.max_wait));
            }
            let pause = poll.interval.min(poll.max_wait - elapsed);
            debug!(job = %handle.name, ?pause, "Waiting for simulation");
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = cancel.cancelled() => return Err(JobError::Cancelled),
            }
        }
    }

    #[instrument(skip_all, fields(job = %self.key()))]
    async fn execute(&self, cancel: CancellationToken) -> Result<SimulationResult, JobError> {
        info!(
            city = %self.city,
            source_type = %self.source_type,
            simulation = %self.simulation_type,
            "Configuring simulation"
        );
        let (config, files) = self.configure().await?;
        let spec = JobSpec {
            name: config.job_name,
            commands: config.commands,
            files,
            memory_gb: config.memory_gb,
        };

        let handle = self.ctx.executor.submit(spec).await?;
        info!(job = %handle.name, "Simulation submitted");

        match self.collect(&handle, &cancel).await {
            Ok(result) => {
                self.ctx.executor.delete(&handle).await?;
                info!(job = %handle.name, cells = result.len(), "Simulation finished");
                Ok(result)
            }
            Err(e) => {
                // The original failure is what the caller sees.
                if let Err(delete_err) = self.ctx.executor.delete(&handle).await {
                    warn!(job = %handle.name, error = %delete_err, "Could not delete simulation job");
                }
                Err(e)
            }
        }
    }

    /// Wait for a submitted job and decode its output.
    async fn collect(
        &self,
        handle: &JobHandle,
        cancel: &CancellationToken,
    ) -> Result<SimulationResult, JobError> {
        self.wait(handle, cancel).await?;
        let output = self.ctx.executor.output(handle).await?;
        let data = output
            .get(OUTPUT_FILE)
            .ok_or_else(|| JobError::Output(format!("job output has no {OUTPUT_FILE}")))?;
        SimulationResult::from_geojson(data)
    }
}

impl Job for SimulationJob {
    type Output = SimulationResult;
    type Error = JobError;

    fn key(&self) -> CacheKey {
        let raw = match self.simulation_type {
            SimulationType::CityMarginal => {
                format!("concentration_{}_{}", self.city, self.source_type)
            }
            SimulationType::CityTotal => format!(
                "concentration_{}_{}_{}",
                self.simulation_type, self.city, self.source_type
            ),
            SimulationType::Total => {
                format!("concentration_{}_{}", self.simulation_type, self.source_type)
            }
        };
        CacheKey::normalize(&raw)
    }

    fn run(&self, cancel: CancellationToken) -> BoxFuture<'_, Result<SimulationResult, JobError>> {
        Box::pin(self.execute(cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCityCatalog;
    use crate::geom::Polygon;
    use crate::jobs::RemoteStatus;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    const TEMPLATE: &str = r#"{
        "domain": {"xo": -180, "yo": -90, "dx": 4, "dy": 4,
                   "xnests": [36, 2, 2], "ynests": [36, 2, 2]},
        "inventory": {"roadways": ["road.nc"], "residential": ["res.nc"]},
        "memory_gb": 24,
        "output_variables": {"PrimPM25": "PrimaryPM25"}
    }"#;

    const OUTPUT: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","properties":{"pop":3,"PrimPM25":0.5,"SOA":0,"pNH4":0,"pNO3":0,"pSO4":0},
         "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}}]}"#;

    #[derive(Default)]
    struct ScriptedExecutor {
        statuses: Mutex<VecDeque<RemoteStatus>>,
        submitted: Mutex<Vec<JobSpec>>,
        deleted: Mutex<Vec<String>>,
        fail_delete: bool,
    }

    impl ScriptedExecutor {
        fn with_statuses(states: &[(JobState, &str)]) -> Self {
            Self {
                statuses: Mutex::new(
                    states
                        .iter()
                        .map(|(s, m)| RemoteStatus::new(*s, *m))
                        .collect(),
                ),
                ..Default::default()
            }
        }
    }

    impl RemoteExecutor for ScriptedExecutor {
        fn submit(&self, spec: JobSpec) -> BoxFuture<'_, Result<JobHandle, JobError>> {
            Box::pin(async move {
                let handle = JobHandle::new(spec.name.clone());
                self.submitted.lock().push(spec);
                Ok(handle)
            })
        }

        fn status<'a>(&'a self, _h: &'a JobHandle) -> BoxFuture<'a, Result<RemoteStatus, JobError>> {
            Box::pin(async move {
                Ok(self
                    .statuses
                    .lock()
                    .pop_front()
                    .unwrap_or_else(|| RemoteStatus::new(JobState::Running, "")))
            })
        }

        fn output<'a>(&'a self, _h: &'a JobHandle) -> BoxFuture<'a, Result<FileSet, JobError>> {
            Box::pin(async move {
                Ok(FileSet::from([(OUTPUT_FILE.to_string(), OUTPUT.as_bytes().to_vec())]))
            })
        }

        fn delete<'a>(&'a self, h: &'a JobHandle) -> BoxFuture<'a, Result<(), JobError>> {
            Box::pin(async move {
                if self.fail_delete {
                    return Err(JobError::Remote("permission denied".into()));
                }
                self.deleted.lock().push(h.name.clone());
                Ok(())
            })
        }
    }

    struct Fixture {
        _dir: TempDir,
        executor: Arc<ScriptedExecutor>,
        ctx: Arc<SimulationContext>,
    }

    fn fixture(executor: ScriptedExecutor) -> Fixture {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("template.json");
        std::fs::write(&path, TEMPLATE).unwrap();
        let templates = SimulationTemplates {
            city_marginal: path.clone(),
            city_total: path.clone(),
            total: path,
        };
        let catalog = StaticCityCatalog::new().with_city(
            "Accra Metropolitan",
            Polygon::rect(Point::new(-0.3, 5.5), Point::new(-0.1, 5.7)),
        );
        let executor = Arc::new(executor);
        let ctx = SimulationContext::new(executor.clone(), Arc::new(catalog), templates).with_poll(
            PollConfig::default()
                .with_interval(Duration::from_millis(5))
                .with_max_wait(Duration::from_secs(5)),
        );
        Fixture {
            _dir: dir,
            executor,
            ctx: Arc::new(ctx),
        }
    }

    fn job(f: &Fixture, source: &str, t: SimulationType) -> SimulationJob {
        SimulationJob::new(Arc::clone(&f.ctx), "Accra Metropolitan", source, t)
    }

    #[test]
    fn test_keys() {
        let f = fixture(ScriptedExecutor::default());
        assert_eq!(
            job(&f, "roadways", SimulationType::CityMarginal).key().as_str(),
            "concentrationaccraroadways"
        );
        assert_eq!(
            job(&f, "roadways", SimulationType::CityTotal).key().as_str(),
            "concentrationcitytotalaccraroadways"
        );
        assert_eq!(
            job(&f, "roadways", SimulationType::Total).key().as_str(),
            "concentrationtotalroadways"
        );
    }

    #[test]
    fn test_domain_centered_on_city() {
        let domain = Domain {
            xo: -180.0,
            yo: -90.0,
            dx: 4.0,
            dy: 4.0,
            xnests: vec![36, 2],
            ynests: vec![36, 2],
        };
        let d = domain.centered_on(Point::new(-0.2, 5.6)).unwrap();
        assert_eq!((d.xo, d.yo), (-72.0, -68.0));
        assert_eq!((d.xnests[0], d.ynests[0]), (36, 36));

        let d = domain.centered_on(Point::new(170.0, 80.0)).unwrap();
        assert_eq!((d.xo, d.yo), (100.0, 8.0));
        assert_eq!((d.xnests[0], d.ynests[0]), (19, 20));
        assert_eq!(d.xnests[1], 2);
    }

    #[test]
    fn test_domain_validation() {
        let domain = Domain {
            xo: 0.0,
            yo: 0.0,
            dx: 0.0,
            dy: 1.0,
            xnests: vec![1],
            ynests: vec![1],
        };
        assert!(matches!(
            domain.centered_on(Point::new(0.0, 0.0)),
            Err(JobError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_configure_city_marginal() {
        let f = fixture(ScriptedExecutor::default());
        let (config, files) = job(&f, "roadways", SimulationType::CityMarginal)
            .configure()
            .await
            .unwrap();

        assert_eq!(config.job_name, "concentrationaccraroadways");
        assert_eq!(config.commands, vec!["run", "steady"]);
        assert_eq!(config.emissions_files, vec![EMISSIONS_FILE]);
        assert!(config.inventory.is_empty());
        assert!(config.emission_mask.is_none());
        assert_eq!(config.memory_gb, 24);
        assert_eq!(config.domain.xo, -72.0);
        assert!(config.settings.contains_key("output_variables"));

        let input: FeatureCollection = serde_json::from_slice(&files[EMISSIONS_FILE]).unwrap();
        let total: f64 = input.features.iter().filter_map(|f| f.number("NOx")).sum();
        assert!((total - crate::emissions::unit_emission_rate()).abs() < 1e-12);
        assert!(input.features.iter().all(|f| f.number("Height") == Some(0.0)));
        assert!(files.contains_key(CONFIG_FILE));
    }

    #[tokio::test]
    async fn test_configure_egugrid_sets_stack() {
        let f = fixture(ScriptedExecutor::default());
        let (_, files) = job(&f, "electric_gen_egugrid", SimulationType::CityMarginal)
            .configure()
            .await
            .unwrap();
        let input: FeatureCollection = serde_json::from_slice(&files[EMISSIONS_FILE]).unwrap();
        let first = &input.features[0];
        assert_eq!(first.number("Height"), Some(63.5));
        assert_eq!(first.number("Diam"), Some(4.1));
        assert_eq!(first.number("Temp"), Some(519.2));
        assert_eq!(first.number("Velocity"), Some(24.7));
    }

    #[tokio::test]
    async fn test_configure_city_total() {
        let f = fixture(ScriptedExecutor::default());
        let (config, files) = job(&f, "roadways", SimulationType::CityTotal)
            .configure()
            .await
            .unwrap();
        assert!(config.emissions_files.is_empty());
        assert_eq!(config.inventory.keys().collect::<Vec<_>>(), vec!["roadways"]);
        assert_eq!(config.emission_mask.as_deref(), Some(MASK_FILE));
        assert!(files.contains_key(MASK_FILE));
        assert!(!files.contains_key(EMISSIONS_FILE));
    }

    #[tokio::test]
    async fn test_configure_total_keeps_template_domain() {
        let f = fixture(ScriptedExecutor::default());
        let (config, files) = job(&f, "residential", SimulationType::Total)
            .configure()
            .await
            .unwrap();
        assert_eq!(config.domain.xo, -180.0);
        assert_eq!(config.inventory.keys().collect::<Vec<_>>(), vec!["residential"]);
        assert!(config.emission_mask.is_none());
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_sector_is_config_error() {
        let f = fixture(ScriptedExecutor::default());
        let err = job(&f, "shipping", SimulationType::Total)
            .configure()
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Config(_)));
    }

    #[tokio::test]
    async fn test_run_to_completion_deletes_job() {
        let f = fixture(ScriptedExecutor::with_statuses(&[
            (JobState::Waiting, ""),
            (JobState::Running, ""),
            (JobState::Complete, ""),
        ]));
        let j = job(&f, "roadways", SimulationType::CityMarginal);
        let result = j.run(CancellationToken::new()).await.unwrap();

        assert_eq!(result.population, vec![3.0]);
        assert_eq!(f.executor.submitted.lock().len(), 1);
        assert_eq!(*f.executor.deleted.lock(), vec!["concentrationaccraroadways"]);
    }

    #[tokio::test]
    async fn test_remote_failure_message_verbatim() {
        let f = fixture(ScriptedExecutor::with_statuses(&[(
            JobState::Failed,
            "OOMKilled: container exceeded 24Gi",
        )]));
        let err = job(&f, "roadways", SimulationType::Total)
            .run(CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "OOMKilled: container exceeded 24Gi");
        assert_eq!(*f.executor.deleted.lock(), vec!["concentrationtotalroadways"]);
    }

    #[tokio::test]
    async fn test_failure_survives_delete_error() {
        let f = fixture(ScriptedExecutor {
            fail_delete: true,
            ..ScriptedExecutor::with_statuses(&[(JobState::Failed, "segfault")])
        });
        let err = job(&f, "roadways", SimulationType::Total)
            .run(CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "segfault");
    }

    #[tokio::test]
    async fn test_missing_job() {
        let f = fixture(ScriptedExecutor::with_statuses(&[(JobState::Missing, "")]));
        let err = job(&f, "roadways", SimulationType::Total)
            .run(CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "job concentrationtotalroadways missing");
    }

    #[tokio::test]
    async fn test_delete_failure_is_fatal() {
        let f = fixture(ScriptedExecutor {
            fail_delete: true,
            ..ScriptedExecutor::with_statuses(&[(JobState::Complete, "")])
        });
        let err = job(&f, "roadways", SimulationType::Total)
            .run(CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "permission denied");
    }

    #[tokio::test]
    async fn test_poll_timeout() {
        let mut f = fixture(ScriptedExecutor::default());
        let ctx = Arc::get_mut(&mut f.ctx).unwrap();
        ctx.poll = PollConfig::default()
            .with_interval(Duration::from_millis(5))
            .with_max_wait(Duration::from_millis(30));
        let err = job(&f, "roadways", SimulationType::Total)
            .run(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Timeout(d) if d == Duration::from_millis(30)));
        assert_eq!(*f.executor.deleted.lock(), vec!["concentrationtotalroadways"]);
    }

    #[tokio::test]
    async fn test_cancellation_between_polls() {
        let f = fixture(ScriptedExecutor::default());
        let cancel = CancellationToken::new();
        let j = job(&f, "roadways", SimulationType::Total);
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let err = j.run(cancel).await.unwrap_err();
        assert!(matches!(err, JobError::Cancelled));
        assert_eq!(*f.executor.deleted.lock(), vec!["concentrationtotalroadways"]);
    }
}
