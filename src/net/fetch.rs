//! reqwest-backed [`Transport`].
//!
//! Credentialed requests go through a client with its own cookie store;
//! other requests use a client that neither sends nor stores cookies.
//!
//! The dispatcher hands over URLs as the caller wrote them, which may be
//! relative to the document. Those are joined onto the transport's base URL
//! (see [`HttpTransport::with_base`]); without a base they fail.
use futures::future::{self, BoxFuture, FutureExt};
use url::Url;

use crate::errors::NetError;
use crate::net::request::Body;
use crate::net::transport::{RawReply, Transport, TransportError, TransportRequest};

pub const DEFAULT_USER_AGENT: &str = "Gosub/1.0 (X11; Linux x86_64) Gecko/20250802 GosubBrowser/1.0";

pub struct HttpTransport {
    client: reqwest::Client,
    credentialed: reqwest::Client,
    base: Option<Url>,
}

impl HttpTransport {
    pub fn new(user_agent: &str) -> Result<Self, NetError> {
        let build = |cookies: bool| {
            reqwest::Client::builder()
                .user_agent(user_agent)
                .cookie_store(cookies)
                .build()
                .map_err(|e| NetError::InvalidArgument(format!("cannot build HTTP client: {e}")))
        };

        Ok(Self {
            client: build(false)?,
            credentialed: build(true)?,
            base: None,
        })
    }

    /// Relative request URLs are resolved against `base`, usually the
    /// document URL.
    pub fn with_base(mut self, base: Url) -> Self {
        self.base = Some(base);
        self
    }

    fn resolve_url(&self, raw: &str) -> Result<Url, TransportError> {
        match Url::parse(raw) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base {
                Some(base) => base
                    .join(raw)
                    .map_err(|e| TransportError::new(format!("invalid URL {raw}: {e}"))),
                None => Err(TransportError::new(format!("relative URL {raw} needs a base URL"))),
            },
            Err(e) => Err(TransportError::new(format!("invalid URL {raw}: {e}"))),
        }
    }
}

impl Transport for HttpTransport {
    fn request(&self, request: TransportRequest) -> BoxFuture<'static, Result<RawReply, TransportError>> {
        let client = if request.with_credentials {
            self.credentialed.clone()
        } else {
            self.client.clone()
        };
        let url = match self.resolve_url(&request.url) {
            Ok(url) => url,
            Err(err) => return future::ready(Err(err)).boxed(),
        };

        async move {
            let mut builder = client.request(request.method, url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder = match request.body {
                Some(Body::Bytes(bytes)) => builder.body(bytes),
                Some(Body::Text(text)) => builder.body(text),
                Some(Body::Json(value)) => builder.body(value.to_string()),
                None => builder,
            };

            let res = builder.send().await.map_err(transport_error)?;

            // Fetch results
            let status = res.status().as_u16();
            let status_text = res.status().canonical_reason().unwrap_or("").to_string();
            let header_blob = res
                .headers()
                .iter()
                .map(|(k, v)| format!("{}: {}", k, String::from_utf8_lossy(v.as_bytes())))
                .collect::<Vec<_>>()
                .join("\n");

            // Fetch body. We don't do streaming yet
            let bytes = res.bytes().await.map_err(|e| TransportError {
                message: e.to_string(),
                status: Some(status),
                header_blob: Some(header_blob.clone()),
            })?;

            let body = if bytes.is_empty() {
                None
            } else {
                match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => Some(Body::Text(text)),
                    Err(e) => Some(Body::Bytes(e.into_bytes())),
                }
            };

            Ok(RawReply {
                status,
                status_text,
                body,
                header_blob,
            })
        }
        .boxed()
    }
}

fn transport_error(e: reqwest::Error) -> TransportError {
    TransportError {
        message: e.to_string(),
        status: e.status().map(|s| s.as_u16()),
        header_blob: None,
    }
}
