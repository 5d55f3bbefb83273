//! In-process executor.
//!
//! Runs a [`Model`] on the blocking thread pool and keeps job state in
//! memory. Useful for development and for deployments without a job
//! cluster; [`ProportionalModel`] is a screening model that maps each
//! emitted species straight onto its concentration column, or spreads
//! inventory sectors evenly over the outer nest.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::executor::{FileSet, JobHandle, JobSpec, JobState, RemoteExecutor, RemoteStatus};
use super::result::OUTPUT_FILE;
use super::simulation::{SimulationConfig, CONFIG_FILE, EMISSIONS_FILE, MASK_FILE};
use super::JobError;
use crate::cache::BoxFuture;
use crate::geom::geojson::{Feature, FeatureCollection, Geometry};
use crate::geom::{Bounds, Point, Polygon};

/// An air-quality model that turns input files into output files.
pub trait Model: Send + Sync + 'static {
    /// Run to completion. An `Err` becomes the job's failure message.
    fn run(&self, spec: &JobSpec) -> Result<FileSet, String>;
}

#[derive(Debug, Clone)]
struct LocalJob {
    state: JobState,
    message: String,
    output: FileSet,
}

/// Executor running jobs in this process.
pub struct LocalExecutor {
    model: Arc<dyn Model>,
    jobs: Arc<RwLock<HashMap<String, LocalJob>>>,
}

impl LocalExecutor {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self {
            model,
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of jobs currently known, finished or not.
    pub fn job_count(&self) -> usize {
        self.jobs.read().len()
    }
}

impl RemoteExecutor for LocalExecutor {
    fn submit(&self, spec: JobSpec) -> BoxFuture<'_, Result<JobHandle, JobError>> {
        Box::pin(async move {
            let handle = JobHandle::new(spec.name.clone());
            {
                let mut jobs = self.jobs.write();
                if let Some(existing) = jobs.get(&spec.name) {
                    if existing.state != JobState::Failed {
                        debug!(job = %spec.name, "Attaching to existing job");
                        return Ok(handle);
                    }
                }
                jobs.insert(
                    spec.name.clone(),
                    LocalJob {
                        state: JobState::Running,
                        message: String::new(),
                        output: FileSet::new(),
                    },
                );
            }

            let model = Arc::clone(&self.model);
            let jobs = Arc::clone(&self.jobs);
            tokio::task::spawn_blocking(move || {
                let outcome = model.run(&spec);
                let mut jobs = jobs.write();
                let Some(job) = jobs.get_mut(&spec.name) else {
                    return;
                };
                match outcome {
                    Ok(output) => {
                        info!(job = %spec.name, files = output.len(), "Local job complete");
                        job.state = JobState::Complete;
                        job.output = output;
                    }
                    Err(message) => {
                        warn!(job = %spec.name, %message, "Local job failed");
                        job.state = JobState::Failed;
                        job.message = message;
                    }
                }
            });
            Ok(handle)
        })
    }

    fn status<'a>(&'a self, handle: &'a JobHandle) -> BoxFuture<'a, Result<RemoteStatus, JobError>> {
        Box::pin(async move {
            let jobs = self.jobs.read();
            Ok(match jobs.get(&handle.name) {
                Some(job) => RemoteStatus::new(job.state, job.message.clone()),
                None => RemoteStatus::new(
                    JobState::Missing,
                    format!("job {} does not exist", handle.name),
                ),
            })
        })
    }

    fn output<'a>(&'a self, handle: &'a JobHandle) -> BoxFuture<'a, Result<FileSet, JobError>> {
        Box::pin(async move {
            let jobs = self.jobs.read();
            match jobs.get(&handle.name) {
                Some(job) if job.state == JobState::Complete => Ok(job.output.clone()),
                Some(job) => Err(JobError::Remote(format!(
                    "job {} is {}, not complete",
                    handle.name, job.state
                ))),
                None => Err(JobError::Remote(format!(
                    "job {} does not exist",
                    handle.name
                ))),
            }
        })
    }

    fn delete<'a>(&'a self, handle: &'a JobHandle) -> BoxFuture<'a, Result<(), JobError>> {
        Box::pin(async move {
            match self.jobs.write().remove(&handle.name) {
                Some(_) => Ok(()),
                None => Err(JobError::Remote(format!(
                    "job {} does not exist",
                    handle.name
                ))),
            }
        })
    }
}

// =============================================================================
// Screening model
// =============================================================================

/// Concentration proportional to local emissions, cell by cell.
///
/// With an emissions input, writes one output feature per input cell:
/// `PrimPM25 = PM2_5 * factor`, `pNH4 = NH3 * factor`, `pNO3 = NOx * factor`,
/// `pSO4 = SOx * factor`, `SOA = VOC * factor`, and a constant population.
///
/// Inventory runs have no emissions input. Every outer-nest cell of the
/// configured domain then gets `factor` per inventory sector in each
/// column, restricted to cells overlapping the emission mask's bounds
/// when one is given.
#[derive(Debug, Clone, Copy)]
pub struct ProportionalModel {
    pub factor: f64,
    pub population_per_cell: f64,
}

impl Default for ProportionalModel {
    fn default() -> Self {
        Self {
            factor: 1.0,
            population_per_cell: 1.0,
        }
    }
}

impl Model for ProportionalModel {
    fn run(&self, spec: &JobSpec) -> Result<FileSet, String> {
        let features = match spec.files.get(EMISSIONS_FILE) {
            Some(data) => {
                let input: FeatureCollection =
                    serde_json::from_slice(data).map_err(|e| format!("reading emissions: {e}"))?;
                input
                    .features
                    .iter()
                    .map(|f| {
                        let geometry = f
                            .geometry
                            .clone()
                            .ok_or_else(|| "emissions feature without geometry".to_string())?;
                        Ok(self.output_feature(geometry, |name| f.number(name).unwrap_or(0.0)))
                    })
                    .collect::<Result<Vec<_>, String>>()?
            }
            None => self.inventory_features(spec)?,
        };
        let body = serde_json::to_vec(&FeatureCollection::new(features))
            .map_err(|e| format!("writing output: {e}"))?;
        Ok(FileSet::from([(OUTPUT_FILE.to_string(), body)]))
    }
}

impl ProportionalModel {
    fn inventory_features(&self, spec: &JobSpec) -> Result<Vec<Feature>, String> {
        let data = spec
            .files
            .get(CONFIG_FILE)
            .ok_or_else(|| format!("job has neither {EMISSIONS_FILE} nor {CONFIG_FILE}"))?;
        let config: SimulationConfig =
            serde_json::from_slice(data).map_err(|e| format!("reading config: {e}"))?;

        let mask = match spec.files.get(MASK_FILE) {
            Some(data) => {
                let geometry: Geometry =
                    serde_json::from_slice(data).map_err(|e| format!("reading mask: {e}"))?;
                let polygon = geometry
                    .to_polygon()
                    .ok_or_else(|| "emission mask is not a polygon".to_string())?;
                Some(polygon.bounds().map_err(|e| format!("emission mask: {e}"))?)
            }
            None => None,
        };

        let emission = config.inventory.len() as f64;
        let d = &config.domain;
        let nx = d.xnests.first().copied().unwrap_or(0);
        let ny = d.ynests.first().copied().unwrap_or(0);
        let mut features = Vec::new();
        for j in 0..ny {
            for i in 0..nx {
                let min = Point::new(d.xo + i as f64 * d.dx, d.yo + j as f64 * d.dy);
                let cell = Bounds::new(min, Point::new(min.x + d.dx, min.y + d.dy));
                if mask.is_some_and(|m| !m.overlaps(&cell)) {
                    continue;
                }
                let geometry = Geometry::from_polygon(&Polygon::rect(cell.min, cell.max));
                features.push(self.output_feature(geometry, |_| emission));
            }
        }
        Ok(features)
    }

    fn output_feature(&self, geometry: Geometry, emission: impl Fn(&str) -> f64) -> Feature {
        let species = |name: &str| emission(name) * self.factor;
        let mut props = Map::new();
        props.insert("pop".into(), Value::from(self.population_per_cell));
        props.insert("mort".into(), Value::from(0.0));
        props.insert("PrimPM25".into(), Value::from(species("PM2_5")));
        props.insert("SOA".into(), Value::from(species("VOC")));
        props.insert("pNH4".into(), Value::from(species("NH3")));
        props.insert("pNO3".into(), Value::from(species("NOx")));
        props.insert("pSO4".into(), Value::from(species("SOx")));
        Feature {
            kind: "Feature".into(),
            geometry: Some(geometry),
            properties: props,
        }
    }
}
