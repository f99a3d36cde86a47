use std::time::Duration;

/// Error taxonomy for tool client operations.
///
/// No variant is retried internally; retry policy belongs to the caller.
/// Every variant renders a message suitable for showing to an end user.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The engine binary does not exist at the configured path.
    #[error("{0}")]
    NotFound(String),

    /// The service could not be reached at the transport level.
    #[error("Cannot connect to GeoEngine service: {0}")]
    Unreachable(String),

    /// A child process exited non-zero without a structured body.
    #[error("{0}")]
    ProcessFailure(String),

    /// The service reported a failure, either as a failed job or as an
    /// error body on a non-success HTTP status.
    #[error("{0}")]
    ServiceFailure(String),

    /// The run or job was stopped at the caller's request.
    #[error("Job was cancelled")]
    Cancelled,

    /// A remote wait loop exceeded its configured deadline.
    #[error("Job did not complete within {}", humantime::format_duration(*.0))]
    Timeout(Duration),

    /// Structured data was expected on a success path but did not parse.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Whether this error represents an explicit cancellation rather than a
    /// fault, so callers can avoid alarming the user.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }
}
