pub mod config;
pub mod entities;
pub mod error;
pub mod types;

pub use config::{BackendKind, ClientSettings, DEFAULT_HOST, DEFAULT_PORT};
pub use entities::{
    EngineHealth, JobStatus, OutputFile, ProjectSummary, RunReport, ToolDefinition,
    ToolInvocation, ToolOutput, ToolParameter, ToolResult,
};
pub use error::ClientError;
pub use types::{JobState, ParamType};
