//! JSON-over-HTTP executor client.
//!
//! | Operation | Request                          | Response body  |
//! |-----------|----------------------------------|----------------|
//! | submit    | `POST {base}/jobs` + `JobSpec`   | `JobHandle`    |
//! | status    | `GET {base}/jobs/{name}`         | `RemoteStatus` |
//! | output    | `GET {base}/jobs/{name}/output`  | `FileSet`      |
//! | delete    | `DELETE {base}/jobs/{name}`      | (empty)        |
//!
//! A 404 on `status` means the server no longer knows the job and is
//! reported as [`JobState::Missing`]. Any other non-success status becomes
//! [`JobError::Remote`] carrying the response body.

use std::time::Duration;

use reqwest::{header, Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::executor::{FileSet, JobHandle, JobSpec, JobState, RemoteExecutor, RemoteStatus};
use super::JobError;
use crate::cache::BoxFuture;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Client for a job server speaking the protocol above.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
    base: Url,
}

impl HttpExecutor {
    /// Create a client for the server at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, JobError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, JobError> {
        let base = Url::parse(base_url)
            .map_err(|e| JobError::Config(format!("invalid executor URL {base_url:?}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(JobError::Config(format!(
                "executor URL {base_url:?} cannot have a path"
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cityaq/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, JobError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| JobError::Config(format!("executor URL {} cannot have a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

async fn check(response: Response) -> Result<Response, JobError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        format!("executor returned {status}")
    } else {
        body
    };
    Err(JobError::Remote(message))
}

async fn json<T: DeserializeOwned>(response: Response) -> Result<T, JobError> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

impl RemoteExecutor for HttpExecutor {
    fn submit(&self, spec: JobSpec) -> BoxFuture<'_, Result<JobHandle, JobError>> {
        Box::pin(async move {
            let url = self.url(&["jobs"])?;
            debug!(job = %spec.name, %url, "Submitting job");
            let response = self
                .client
                .post(url)
                .header(header::CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(&spec)?)
                .send()
                .await?;
            json(check(response).await?).await
        })
    }

    fn status<'a>(&'a self, handle: &'a JobHandle) -> BoxFuture<'a, Result<RemoteStatus, JobError>> {
        Box::pin(async move {
            let url = self.url(&["jobs", &handle.name])?;
            let response = self.client.get(url).send().await?;
            if response.status() == StatusCode::NOT_FOUND {
                let message = response.text().await.unwrap_or_default();
                return Ok(RemoteStatus::new(JobState::Missing, message));
            }
            json(check(response).await?).await
        })
    }

    fn output<'a>(&'a self, handle: &'a JobHandle) -> BoxFuture<'a, Result<FileSet, JobError>> {
        Box::pin(async move {
            let url = self.url(&["jobs", &handle.name, "output"])?;
            let response = self.client.get(url).send().await?;
            json(check(response).await?).await
        })
    }

    fn delete<'a>(&'a self, handle: &'a JobHandle) -> BoxFuture<'a, Result<(), JobError>> {
        Box::pin(async move {
            let url = self.url(&["jobs", &handle.name])?;
            let response = self.client.delete(url).send().await?;
            check(response).await?;
            Ok(())
        })
    }
}
