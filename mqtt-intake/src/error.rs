use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Invalid lifecycle transition, fatal to the caller of start/stop and
/// non-fatal to a running broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("broker is already running")]
    AlreadyRunning,
    #[error("broker is not running")]
    NotRunning,
}

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed connection attempt metadata; the connection is rejected.
    #[error("validation error: {0}")]
    Validation(String),

    /// An interceptor step failed; the message is dropped, the client stays.
    #[error("interceptor step '{step}' failed: {source}")]
    Interceptor {
        step: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] StateError),
}
