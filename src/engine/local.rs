use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};

use crate::core::{
    ClientError, EngineHealth, ProjectSummary, ToolDefinition, ToolInvocation, ToolResult,
};
use crate::engine::{CancelSignal, ExecutionBackend, ProgressSink};

/// Grace period between a termination request and a hard kill.
const TERM_GRACE: Duration = Duration::from_secs(5);

/// Runs tools as child processes of a local engine binary.
///
/// The binary path is handed in at construction; locating it on the
/// filesystem is the caller's responsibility. Diagnostic progress arrives on
/// the child's stderr line by line, and the final structured result on its
/// stdout.
pub struct LocalRunner {
    binary: PathBuf,
}

impl LocalRunner {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        LocalRunner {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Arguments for `project run-tool`, one `--input KEY=VALUE` token per
    /// input that carries a value. Unset inputs never produce an assignment.
    pub fn tool_args(&self, invocation: &ToolInvocation) -> Vec<String> {
        let mut args = vec![
            "project".to_string(),
            "run-tool".to_string(),
            invocation.project.clone(),
            invocation.tool.clone(),
            "--json".to_string(),
        ];
        if let Some(dir) = &invocation.output_dir {
            args.push("--output-dir".to_string());
            args.push(dir.clone());
        }
        for (key, value) in invocation.set_inputs() {
            args.push("--input".to_string());
            args.push(format!("{}={}", key, value));
        }
        args
    }

    fn spawn(&self, args: &[String]) -> Result<Child, ClientError> {
        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => ClientError::NotFound(format!(
                    "geoengine binary not found at {}",
                    self.binary.display()
                )),
                _ => ClientError::Io(err),
            })
    }

    /// Run a tool to termination, forwarding each non-empty diagnostic line
    /// to `progress` and checking `cancelled` at every line boundary.
    ///
    /// Cancellation latency is bounded by one line of diagnostic output; a
    /// child that stays silent on stderr is only reaped once it exits.
    pub async fn run(
        &self,
        invocation: &ToolInvocation,
        progress: ProgressSink<'_>,
        cancelled: CancelSignal<'_>,
    ) -> Result<ToolResult, ClientError> {
        let args = self.tool_args(invocation);
        tracing::debug!(binary = %self.binary.display(), ?args, "spawning tool process");
        let mut child = self.spawn(&args)?;

        let stderr = child.stderr.take().expect("stderr must be piped");
        let mut stdout = child.stdout.take().expect("stdout must be piped");

        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let text = line.trim_end_matches('\r');
                    if !text.is_empty() {
                        progress(text);
                    }
                }
                Ok(None) => break,
                Err(err) => return Err(ClientError::Io(err)),
            }
            if cancelled() {
                tracing::info!("cancellation requested, stopping tool process");
                return terminate(child).await;
            }
        }

        // Drain stdout before reaping; a child blocked on a full stdout pipe
        // can never exit.
        let mut body = String::new();
        stdout
            .read_to_string(&mut body)
            .await
            .map_err(ClientError::Io)?;
        let status = child.wait().await.map_err(ClientError::Io)?;
        let exit_code = status.code().unwrap_or(-1);
        let body = body.trim();

        if status.success() {
            if body.is_empty() {
                return Ok(ToolResult::CompletedNoPayload {
                    exit_code: 0,
                    files: Vec::new(),
                });
            }
            let payload = serde_json::from_str(body).map_err(|err| {
                ClientError::MalformedResponse(format!("invalid JSON on stdout: {}", err))
            })?;
            return Ok(ToolResult::Success { payload });
        }

        // A non-zero exit with a structured body means the tool reported its
        // own error encoding; that takes precedence over the exit code.
        if !body.is_empty() {
            if let Ok(payload) = serde_json::from_str(body) {
                return Ok(ToolResult::Success { payload });
            }
        }
        Ok(ToolResult::Failure {
            reason: format!("Tool exited with code {}", exit_code),
        })
    }

    /// Check that the binary responds and report its version string.
    pub async fn version_check(&self) -> Result<EngineHealth, ClientError> {
        let output = self.capture(&["--version".to_string()]).await?;
        Ok(EngineHealth {
            status: "healthy".to_string(),
            version: Some(output.trim().to_string()),
        })
    }

    /// List registered projects via `project list --json`.
    pub async fn list_projects(&self) -> Result<Vec<ProjectSummary>, ClientError> {
        let output = self
            .capture(&[
                "project".to_string(),
                "list".to_string(),
                "--json".to_string(),
            ])
            .await?;
        serde_json::from_str(&output)
            .map_err(|err| ClientError::MalformedResponse(format!("project list: {}", err)))
    }

    /// List the tools a project declares via `project tools <name>`.
    pub async fn project_tools(&self, project: &str) -> Result<Vec<ToolDefinition>, ClientError> {
        let output = self
            .capture(&[
                "project".to_string(),
                "tools".to_string(),
                project.to_string(),
            ])
            .await?;
        serde_json::from_str(&output)
            .map_err(|err| ClientError::MalformedResponse(format!("project tools: {}", err)))
    }

    /// Run the binary to completion and return stdout, mapping a non-zero
    /// exit to a process failure carrying trimmed stderr.
    async fn capture(&self, args: &[String]) -> Result<String, ClientError> {
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => ClientError::NotFound(format!(
                    "geoengine binary not found at {}",
                    self.binary.display()
                )),
                _ => ClientError::Io(err),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClientError::ProcessFailure(format!(
                "geoengine {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Request a graceful stop, wait out the grace period, then kill.
async fn terminate(mut child: Child) -> Result<ToolResult, ClientError> {
    request_stop(&mut child);
    match tokio::time::timeout(TERM_GRACE, child.wait()).await {
        Ok(status) => {
            status.map_err(ClientError::Io)?;
        }
        Err(_) => {
            child.kill().await.map_err(ClientError::Io)?;
        }
    }
    Ok(ToolResult::Cancelled)
}

#[cfg(unix)]
fn request_stop(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: signalling a pid we own from spawn.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn request_stop(child: &mut Child) {
    let _ = child.start_kill();
}

#[async_trait]
impl ExecutionBackend for LocalRunner {
    async fn health(&self) -> Result<EngineHealth, ClientError> {
        self.version_check().await
    }

    async fn list_projects(&self) -> Result<Vec<ProjectSummary>, ClientError> {
        LocalRunner::list_projects(self).await
    }

    async fn project_tools(&self, project: &str) -> Result<Vec<ToolDefinition>, ClientError> {
        LocalRunner::project_tools(self, project).await
    }

    async fn run_tool(
        &self,
        invocation: &ToolInvocation,
        progress: ProgressSink<'_>,
        cancelled: CancelSignal<'_>,
    ) -> Result<ToolResult, ClientError> {
        self.run(invocation, progress, cancelled).await
    }
}
