use thiserror::Error;

/// Errors surfaced by the scheduling entry points.
#[derive(Debug, Error)]
pub enum RunLoopError {
    /// A method name could not be found on the target (or there was no target).
    #[error("method `{name}` is not defined on the target")]
    InvalidMethod { name: String },

    /// The queue name is not part of the configured queue order.
    #[error("unknown queue `{name}`")]
    InvalidQueue { name: String },

    /// `end()` was called without a matching `begin()`.
    #[error("end() called without a matching begin()")]
    ReentrantEnd,

    /// A queued or timed invocation returned an error while running.
    #[error("invocation failed: {0}")]
    Invocation(#[source] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("queue list is empty")]
    Empty,

    #[error("queue `{0}` is listed more than once")]
    DuplicateQueue(String),

    #[error("anchor queue `{0}` does not exist")]
    UnknownAnchor(String),

    #[error("default queue `{0}` is not in the queue list")]
    UnknownDefaultQueue(String),

    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = RunLoopError> = std::result::Result<T, E>;
