//! Transport collaborator interface.
//!
//! The transport performs exactly one network exchange per call and reports
//! the raw outcome: status, body and a header block of `Key: Value` lines.
//! Parsing that block is the pipeline's job (see [`ResponseHeaders::parse`]).
use std::sync::Arc;

use futures::future::BoxFuture;
use http::Method;

use crate::errors::NetError;
use crate::net::request::{Body, RequestConfig};
use crate::net::response::{Response, ResponseHeaders};

/// What the transport is asked to send.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<Body>,
    pub with_credentials: bool,
}

/// What the transport received.
#[derive(Debug, Clone)]
pub struct RawReply {
    pub status: u16,
    pub status_text: String,
    pub body: Option<Body>,
    /// Newline-separated `Key: Value` lines.
    pub header_blob: String,
}

/// Transport-level failure. Non-2xx statuses are replies, not failures.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    /// Status, when the failure happened after one was received.
    pub status: Option<u16>,
    pub header_blob: Option<String>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            header_blob: None,
        }
    }

    /// Converts into a pipeline error, in response shape when a status is known.
    pub fn into_net_error(self, config: Arc<RequestConfig>) -> NetError {
        let response = self.status.map(|status| {
            let headers = self
                .header_blob
                .as_deref()
                .map(ResponseHeaders::parse)
                .unwrap_or_default();
            Box::new(Response::new(status, "", headers, None, config))
        });

        NetError::Transport {
            message: self.message,
            response,
        }
    }
}

/// A reply with its header block parsed.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub status_text: String,
    pub headers: ResponseHeaders,
    pub body: Option<Body>,
}

impl From<RawReply> for Reply {
    fn from(raw: RawReply) -> Self {
        Self {
            status: raw.status,
            status_text: raw.status_text,
            headers: ResponseHeaders::parse(&raw.header_blob),
            body: raw.body,
        }
    }
}

impl Reply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn into_response(self, config: Arc<RequestConfig>) -> Response {
        Response::new(self.status, self.status_text, self.headers, self.body, config)
    }
}

/// Performs network exchanges.
///
/// `request` is called synchronously by the dispatcher; the returned future
/// is polled by whoever awaits the call.
pub trait Transport: Send + Sync {
    fn request(&self, request: TransportRequest) -> BoxFuture<'static, Result<RawReply, TransportError>>;
}

/// A handle to a transport trait.
pub type TransportHandle = Arc<dyn Transport>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_reply_headers_are_parsed() {
        let reply = Reply::from(RawReply {
            status: 200,
            status_text: "OK".into(),
            body: None,
            header_blob: "X-A: 1\nx-a: 2".into(),
        });
        assert_eq!(reply.headers.get("x-a"), Some("1, 2"));
        assert!(reply.is_success());
    }

    #[test]
    fn failures_with_status_carry_a_response() {
        let config = Arc::new(RequestConfig::get("/x"));
        let err = TransportError {
            message: "connection reset".into(),
            status: Some(502),
            header_blob: Some("Retry-After: 5".into()),
        };

        match err.into_net_error(config.clone()) {
            NetError::Transport { message, response: Some(response) } => {
                assert_eq!(message, "connection reset");
                assert_eq!(response.status(), 502);
                assert_eq!(response.header("retry-after"), Some("5"));
                assert!(Arc::ptr_eq(response.config(), &config));
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(matches!(
            TransportError::new("dns").into_net_error(config),
            NetError::Transport { response: None, .. }
        ));
    }
}
