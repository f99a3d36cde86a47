pub mod local;
pub mod remote;
pub mod resolver;

pub use local::LocalRunner;
pub use remote::RemoteClient;
pub use resolver::{resolve_outputs, OUTPUT_DIR_SLOT};

use async_trait::async_trait;

use crate::core::{
    ClientError, EngineHealth, ProjectSummary, ToolDefinition, ToolInvocation, ToolResult,
};

/// Callback receiving one line of text per progress event, delivered
/// synchronously on the task driving the run.
pub type ProgressSink<'a> = &'a mut (dyn FnMut(&str) + Send);

/// Predicate queried between progress events; `true` requests a stop. The
/// backend holds no cancellation state of its own.
pub type CancelSignal<'a> = &'a (dyn Fn() -> bool + Send + Sync);

/// The execution contract both transport strategies implement.
///
/// Backends run sequentially on the calling task; no internal parallelism.
/// Each call owns its own child process or job id, so concurrent invocations
/// never contend on shared state.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Check that the engine is reachable and report its version.
    async fn health(&self) -> Result<EngineHealth, ClientError>;

    /// List registered projects.
    async fn list_projects(&self) -> Result<Vec<ProjectSummary>, ClientError>;

    /// List the tools a project declares.
    async fn project_tools(&self, project: &str) -> Result<Vec<ToolDefinition>, ClientError>;

    /// Run a tool to termination, streaming diagnostics and honoring the
    /// cancellation predicate at the backend's checkpoints.
    async fn run_tool(
        &self,
        invocation: &ToolInvocation,
        progress: ProgressSink<'_>,
        cancelled: CancelSignal<'_>,
    ) -> Result<ToolResult, ClientError>;
}
