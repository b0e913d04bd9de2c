//! Response model.
//!
//! A [`Response`] is built exactly once per completed attempt and never
//! mutated afterwards. Interceptors that want a different body or status use
//! the `with_*` methods, which return a new instance.
//!
//! ## Notes
//! - Header names are stored lower-cased. Repeated headers in the raw block
//!   are joined with `", "`, in order of appearance.
//! - `config` is the frozen request configuration that produced the
//!   response. Responses served from a cache or a shared in-flight request
//!   carry the configuration of the call they were delivered to.
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::net::request::{Body, RequestConfig};

/// Response headers with lower-cased names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeaders {
    entries: BTreeMap<String, String>,
}

impl ResponseHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a raw header block: one `Key: Value` per line.
    ///
    /// Keys are lower-cased, keys and values trimmed, and values of repeated
    /// keys joined with `", "`. Lines without a colon or with an empty key are
    /// ignored.
    pub fn parse(blob: &str) -> Self {
        let mut headers = Self::new();
        for line in blob.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            if key.is_empty() {
                continue;
            }
            headers.append(key, value.trim());
        }
        headers
    }

    /// Adds a value, joining it to an existing one with `", "`.
    pub fn append(&mut self, name: impl Into<String>, value: &str) {
        let name = name.into().to_ascii_lowercase();
        self.entries
            .entry(name)
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A completed HTTP exchange as seen by the pipeline.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    status_text: String,
    headers: ResponseHeaders,
    body: Option<Body>,
    config: Arc<RequestConfig>,
}

impl Response {
    pub fn new(
        status: u16,
        status_text: impl Into<String>,
        headers: ResponseHeaders,
        body: Option<Body>,
        config: Arc<RequestConfig>,
    ) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers,
            body,
            config,
        }
    }

    /// Numeric status code. Any code is a valid response, including 4xx/5xx.
    #[inline]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Reason phrase (e.g. `"Not Found"`), empty when unknown.
    #[inline]
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[inline]
    pub fn headers(&self) -> &ResponseHeaders {
        &self.headers
    }

    /// Shortcut for a single header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    #[inline]
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn into_body(self) -> Option<Body> {
        self.body
    }

    /// The request configuration this response was delivered for.
    #[inline]
    pub fn config(&self) -> &Arc<RequestConfig> {
        &self.config
    }

    /// Copy of this response with another body.
    pub fn with_body(self, body: Option<Body>) -> Self {
        Self { body, ..self }
    }

    /// Copy of this response with another status.
    pub fn with_status(self, status: u16, status_text: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            ..self
        }
    }

    /// Copy of this response attached to another request configuration.
    pub fn with_config(&self, config: Arc<RequestConfig>) -> Self {
        Self {
            config,
            ..self.clone()
        }
    }
}
