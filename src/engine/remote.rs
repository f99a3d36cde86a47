use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use url::Url;

use crate::core::config::DEFAULT_POLL_INTERVAL;
use crate::core::{
    ClientError, EngineHealth, JobState, JobStatus, OutputFile, ProjectSummary, ToolDefinition,
    ToolInvocation, ToolResult,
};
use crate::engine::{CancelSignal, ExecutionBackend, ProgressSink};

/// Per-request timeout for all service calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Submits tool runs as asynchronous jobs to the GeoEngine proxy service and
/// drives their state machine to a terminal state.
///
/// The service reports no real progress fraction while a job runs; callers
/// only see raw status observations.
#[derive(Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: Url,
    poll_interval: Duration,
    wait_timeout: Option<Duration>,
}

impl RemoteClient {
    /// Build a client for a host/port pair resolved by the caller.
    pub fn new(host: &str, port: u16) -> Result<Self, ClientError> {
        let base_url = Url::parse(&format!("http://{}:{}", host, port))
            .map_err(|err| ClientError::Unreachable(err.to_string()))?;
        Ok(Self::from_endpoint(base_url))
    }

    /// Build a client against an already-parsed endpoint.
    pub fn from_endpoint(base_url: Url) -> Self {
        RemoteClient {
            http: reqwest::Client::new(),
            base_url,
            poll_interval: DEFAULT_POLL_INTERVAL,
            wait_timeout: None,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Override the sleep interval between status polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Give up waiting for a terminal state after this long.
    pub fn with_wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Join path segments onto the base URL, percent-encoding each one so a
    /// job id or project name containing `/` or `?` cannot corrupt the path.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        {
            // Both constructors only ever produce http(s) URLs.
            let mut path = url.path_segments_mut().expect("base URL must be http(s)");
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        url
    }

    /// Check the health of the service.
    pub async fn health(&self) -> Result<EngineHealth, ClientError> {
        self.get_json(self.endpoint(&["api", "health"])).await
    }

    /// List all registered projects.
    pub async fn list_projects(&self) -> Result<Vec<ProjectSummary>, ClientError> {
        self.get_json(self.endpoint(&["api", "projects"])).await
    }

    /// Fetch the full configuration of one project.
    pub async fn get_project(&self, name: &str) -> Result<serde_json::Value, ClientError> {
        self.get_json(self.endpoint(&["api", "projects", name]))
            .await
    }

    /// List the tools a project declares.
    pub async fn project_tools(&self, name: &str) -> Result<Vec<ToolDefinition>, ClientError> {
        self.get_json(self.endpoint(&["api", "projects", name, "tools"]))
            .await
    }

    /// Submit a job; the service is the sole authority assigning the id.
    pub async fn submit(&self, invocation: &ToolInvocation) -> Result<String, ClientError> {
        let body = SubmitBody {
            project: &invocation.project,
            tool: &invocation.tool,
            inputs: invocation.set_inputs(),
            output_dir: invocation.output_dir.as_deref(),
        };
        let resp = self
            .http
            .post(self.endpoint(&["api", "jobs"]))
            .json(&body)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport_error)?;
        let created: JobCreated = decode(resp).await?;
        Ok(created.id)
    }

    /// Fetch the current status of a job. Polling a non-terminal job changes
    /// nothing server-side.
    pub async fn status(&self, job_id: &str) -> Result<JobStatus, ClientError> {
        self.get_json(self.endpoint(&["api", "jobs", job_id])).await
    }

    /// List jobs, including finished ones when `all` is set.
    pub async fn list_jobs(&self, all: bool) -> Result<Vec<JobStatus>, ClientError> {
        let mut url = self.endpoint(&["api", "jobs"]);
        if all {
            url.set_query(Some("all=true"));
        }
        self.get_json(url).await
    }

    /// Request cancellation of a job and return the resulting status.
    ///
    /// The service may still report `running` or `queued` briefly after this
    /// call; a wait loop eventually observes the terminal `cancelled` state.
    pub async fn cancel(&self, job_id: &str) -> Result<JobStatus, ClientError> {
        let resp = self
            .http
            .delete(self.endpoint(&["api", "jobs", job_id]))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport_error)?;
        decode(resp).await
    }

    /// Fetch the output files of a completed job.
    pub async fn job_output(&self, job_id: &str) -> Result<Vec<OutputFile>, ClientError> {
        let listing: OutputListing = self
            .get_json(self.endpoint(&["api", "jobs", job_id, "output"]))
            .await?;
        Ok(listing.files)
    }

    /// Poll a job until it reaches a terminal state.
    ///
    /// `on_status` fires for every observation, repeated `running` states
    /// included. `completed` returns the final status; `failed` surfaces the
    /// service-reported error; `cancelled` fails distinctly from a failure.
    /// With a timeout configured, exceeding it since the first poll fails
    /// with a timeout error before a terminal state is seen.
    pub async fn wait(
        &self,
        job_id: &str,
        interval: Duration,
        timeout: Option<Duration>,
        mut on_status: impl FnMut(&JobStatus) + Send,
    ) -> Result<JobStatus, ClientError> {
        let started = Instant::now();
        loop {
            let status = self.status(job_id).await?;
            on_status(&status);
            match status.state {
                JobState::Completed => return Ok(status),
                JobState::Failed => {
                    return Err(ClientError::ServiceFailure(format!(
                        "Job failed: {}",
                        status.error.as_deref().unwrap_or("Unknown error")
                    )))
                }
                JobState::Cancelled => return Err(ClientError::Cancelled),
                JobState::Queued | JobState::Running => {}
            }
            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    return Err(ClientError::Timeout(limit));
                }
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        let resp = self
            .http
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport_error)?;
        decode(resp).await
    }
}

#[derive(Serialize)]
struct SubmitBody<'a> {
    project: &'a str,
    tool: &'a str,
    inputs: indexmap::IndexMap<&'a str, &'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dir: Option<&'a str>,
}

#[derive(Deserialize)]
struct JobCreated {
    id: String,
}

#[derive(Deserialize)]
struct OutputListing {
    #[serde(default)]
    files: Vec<OutputFile>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// A transport-level failure, reported distinctly from an error body the
/// service returned.
fn transport_error(err: reqwest::Error) -> ClientError {
    ClientError::Unreachable(err.to_string())
}

/// Decode a response body, surfacing a server-supplied `error` message
/// verbatim when the status is non-success.
async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return resp
            .json::<T>()
            .await
            .map_err(|err| ClientError::MalformedResponse(err.to_string()));
    }
    let body = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody { error: Some(message) }) => Err(ClientError::ServiceFailure(message)),
        _ => Err(ClientError::ServiceFailure(format!(
            "HTTP {}: {}",
            status.as_u16(),
            body
        ))),
    }
}

#[async_trait]
impl ExecutionBackend for RemoteClient {
    async fn health(&self) -> Result<EngineHealth, ClientError> {
        RemoteClient::health(self).await
    }

    async fn list_projects(&self) -> Result<Vec<ProjectSummary>, ClientError> {
        RemoteClient::list_projects(self).await
    }

    async fn project_tools(&self, project: &str) -> Result<Vec<ToolDefinition>, ClientError> {
        RemoteClient::project_tools(self, project).await
    }

    /// Submit, poll to a terminal state, then fetch produced files.
    ///
    /// The cancellation predicate is checked once per poll iteration; the
    /// first `true` issues a cancel request, after which the loop keeps
    /// polling until the service reports the terminal `cancelled` state.
    async fn run_tool(
        &self,
        invocation: &ToolInvocation,
        progress: ProgressSink<'_>,
        cancelled: CancelSignal<'_>,
    ) -> Result<ToolResult, ClientError> {
        progress("Submitting job to GeoEngine...");
        let job_id = self.submit(invocation).await?;
        progress(&format!("Job submitted: {}", job_id));

        let started = Instant::now();
        let mut cancel_requested = false;
        loop {
            if !cancel_requested && cancelled() {
                progress("Cancelling job...");
                self.cancel(&job_id).await?;
                cancel_requested = true;
            }

            let status = self.status(&job_id).await?;
            progress(&format!("Status: {}", status.state));
            match status.state {
                JobState::Completed => break,
                JobState::Failed => {
                    return Ok(ToolResult::Failure {
                        reason: format!(
                            "Job failed: {}",
                            status.error.as_deref().unwrap_or("Unknown error")
                        ),
                    })
                }
                JobState::Cancelled => return Ok(ToolResult::Cancelled),
                JobState::Queued | JobState::Running => {}
            }

            if let Some(limit) = self.wait_timeout {
                if started.elapsed() >= limit {
                    return Err(ClientError::Timeout(limit));
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        let files = self.job_output(&job_id).await?;
        progress(&format!("Output files: {}", files.len()));
        Ok(ToolResult::CompletedNoPayload {
            exit_code: 0,
            files,
        })
    }
}
