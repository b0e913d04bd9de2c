use crate::net::Response;

/// Errors surfaced by the request pipeline.
///
/// The type is `Clone` because one settlement of a de-duplicated request is
/// observed by every caller that joined it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    /// Failure reported by the transport. When the transport still knew a
    /// status (and headers), `response` carries them in response shape.
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        response: Option<Box<Response>>,
    },

    #[error("Cache failure: {0}")]
    CacheFailure(String),

    #[error("Cannot decode response body: {0}")]
    Decode(String),

    /// A response that an interceptor decided to treat as a failure.
    #[error("HTTP status {}", .0.status())]
    Status(Box<Response>),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Internal pipeline error: {0}")]
    Internal(String),
}

impl NetError {
    /// Returns the response attached to this error, if any.
    pub fn response(&self) -> Option<&Response> {
        match self {
            NetError::Transport { response, .. } => response.as_deref(),
            NetError::Status(response) => Some(response),
            _ => None,
        }
    }
}
