use serde::{Deserialize, Serialize};

/// Job lifecycle state reported by the GeoEngine service.
///
/// States transition monotonically: `queued`/`running` reach exactly one of
/// the terminal states and never revert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    /// Whether no further transition can occur from this state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        write!(f, "{}", label)
    }
}

/// Parameter type vocabulary declared by tools.
///
/// Used only for parameter-widget construction by host GUI layers; the client
/// carries it through untouched. Unknown wire values fall back to `String`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Int,
    Float,
    Bool,
    Raster,
    Vector,
    File,
    Folder,
    #[default]
    #[serde(other)]
    String,
}
