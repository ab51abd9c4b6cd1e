use thiserror::Error;

/// Why a participant request was turned down.
///
/// Every variant is a local, recoverable rejection: the request has no effect
/// and the session keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("not allowed in the current session state: {0}")]
    SessionState(String),
    #[error("unknown participant {0}")]
    UnknownParticipant(u32),
    #[error("only the session owner may {0}")]
    NotPermitted(String),
}

impl RequestError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    pub fn session_state(msg: impl Into<String>) -> Self {
        Self::SessionState(msg.into())
    }
}
