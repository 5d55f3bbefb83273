//! Remote job execution contract.
//!
//! The air-quality model runs out of process. A [`RemoteExecutor`] accepts a
//! [`JobSpec`], reports its progress, hands back the output files and
//! removes the job when asked. Jobs are addressed by name; submitting a name
//! that already exists attaches to the existing job.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::JobError;
use crate::cache::BoxFuture;

/// Files exchanged with the executor, by file name.
pub type FileSet = BTreeMap<String, Vec<u8>>;

/// Everything the executor needs to start a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Unique job name. Doubles as the handle.
    pub name: String,
    /// Model sub-commands, e.g. `["run", "steady"]`.
    pub commands: Vec<String>,
    /// Input files by name.
    pub files: FileSet,
    /// Memory to reserve, in gigabytes.
    pub memory_gb: u32,
}

/// Reference to a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub name: String,
}

impl JobHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Lifecycle state reported by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Waiting,
    Running,
    Complete,
    Failed,
    /// The executor has no record of the job.
    Missing,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed | JobState::Missing)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Waiting => "waiting",
            JobState::Running => "running",
            JobState::Complete => "complete",
            JobState::Failed => "failed",
            JobState::Missing => "missing",
        };
        f.write_str(s)
    }
}

/// State plus the executor's free-form message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStatus {
    pub state: JobState,
    #[serde(default)]
    pub message: String,
}

impl RemoteStatus {
    pub fn new(state: JobState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
        }
    }
}

/// A system that runs model jobs.
pub trait RemoteExecutor: Send + Sync {
    fn submit(&self, spec: JobSpec) -> BoxFuture<'_, Result<JobHandle, JobError>>;

    fn status<'a>(&'a self, handle: &'a JobHandle) -> BoxFuture<'a, Result<RemoteStatus, JobError>>;

    /// Output files of a completed job.
    fn output<'a>(&'a self, handle: &'a JobHandle) -> BoxFuture<'a, Result<FileSet, JobError>>;

    fn delete<'a>(&'a self, handle: &'a JobHandle) -> BoxFuture<'a, Result<(), JobError>>;
}
