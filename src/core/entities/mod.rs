use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::types::{JobState, ParamType};

/// One request to run a specific tool with concrete input values.
///
/// Immutable once constructed. Inputs carrying `None` are declared but unset;
/// they are omitted from command lines and request bodies, never sent as an
/// empty string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub project: String,
    pub tool: String,
    pub inputs: IndexMap<String, Option<String>>,
    pub output_dir: Option<String>,
}

impl ToolInvocation {
    pub fn new(project: impl Into<String>, tool: impl Into<String>) -> Self {
        ToolInvocation {
            project: project.into(),
            tool: tool.into(),
            inputs: IndexMap::new(),
            output_dir: None,
        }
    }

    /// Add an input entry, which may be unset.
    pub fn input(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.inputs.insert(key.into(), value);
        self
    }

    pub fn output_dir(mut self, dir: impl Into<String>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Inputs with a concrete value, in insertion order.
    pub fn set_inputs(&self) -> IndexMap<&str, &str> {
        self.inputs
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
            .collect()
    }
}

/// Job status object returned by the service for one job id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: String,
    #[serde(rename = "status")]
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// One file produced by a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Terminal outcome of one tool invocation. Exactly one variant is produced
/// per run; no further progress events follow it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ToolResult {
    /// The run produced a structured payload on its primary channel.
    Success { payload: Value },
    /// The run exited cleanly without a payload.
    CompletedNoPayload {
        exit_code: i32,
        files: Vec<OutputFile>,
    },
    /// The run failed with a human-readable reason.
    Failure { reason: String },
    /// The run was stopped at the caller's request.
    Cancelled,
}

/// Structured report the engine CLI prints on stdout when invoked with
/// `--json`. A `ToolResult::Success` payload usually decodes into this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub status: String,
    pub exit_code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub files: Vec<OutputFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    /// Decode a success payload into a run report, if it has that shape.
    pub fn from_value(value: &Value) -> Option<RunReport> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// Summary entry from the project listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_count: Option<usize>,
}

/// Tool declaration consumed from the engine, including the input and output
/// slots the GUI layer renders and the resolver matches against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub inputs: Vec<ToolParameter>,
    #[serde(default)]
    pub outputs: Vec<ToolOutput>,
}

/// Declared input slot of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(default)]
    pub param_type: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
}

fn default_required() -> bool {
    true
}

/// Declared output slot a tool promises to produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub name: String,
    #[serde(default)]
    pub param_type: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ToolOutput {
    pub fn named(name: impl Into<String>) -> Self {
        ToolOutput {
            name: name.into(),
            param_type: ParamType::default(),
            label: None,
        }
    }
}

/// Health report from either backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}
