//! Request configuration model.
//!
//! A [`RequestConfig`] describes one call into the [`Dispatcher`](crate::net::Dispatcher).
//! It is created per call, mutated while headers are merged and while the
//! request interceptors run, and then frozen behind an `Arc` and attached to
//! the [`Response`](crate::net::Response) it produced.
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::errors::NetError;
use crate::net::cache::CacheHandle;

/// Query parameters. Key order is irrelevant; the query encoder sorts keys.
///
/// A `null` value means "absent" and is skipped, arrays are repeated
/// parameters and objects are serialized as JSON text.
pub type Params = HashMap<String, serde_json::Value>;

/// Identifier of a single call, used to correlate log lines.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request or response payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Body {
    /// Raw bytes, passed through untouched.
    Bytes(Vec<u8>),
    /// Text as sent or received on the wire.
    Text(String),
    /// Structured value; serialized before sending, produced when parsing JSON responses.
    Json(serde_json::Value),
}

impl Body {
    /// Returns the body as text when it is textual.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the structured value when the body has been parsed.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Body::Json(v) => Some(v),
            _ => None,
        }
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Text(s)
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Text(s.to_string())
    }
}

impl From<serde_json::Value> for Body {
    fn from(v: serde_json::Value) -> Self {
        Body::Json(v)
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self {
        Body::Bytes(b)
    }
}

/// Resolver for a late-bound header value. Returning `None` drops the header.
pub type HeaderResolver = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// A request header value.
#[derive(Clone)]
pub enum HeaderValue {
    Literal(String),
    /// Resolved once, while the request is being built.
    Computed(HeaderResolver),
}

impl HeaderValue {
    /// Returns the literal value, `None` when it has not been resolved yet.
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            HeaderValue::Literal(s) => Some(s),
            HeaderValue::Computed(_) => None,
        }
    }
}

impl fmt::Debug for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Literal(s) => write!(f, "{s:?}"),
            HeaderValue::Computed(_) => f.write_str("<computed>"),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(s: &str) -> Self {
        HeaderValue::Literal(s.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(s: String) -> Self {
        HeaderValue::Literal(s)
    }
}

/// Request headers, keyed by name as given by the caller.
///
/// Lookups are case-insensitive; inserting a name that differs only in case
/// from an existing one replaces that entry.
#[derive(Clone, Debug, Default)]
pub struct RequestHeaders {
    entries: BTreeMap<String, HeaderValue>,
}

impl RequestHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    fn key_of(&self, name: &str) -> Option<String> {
        self.entries
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Returns `true` when a header with this name (any case) is present.
    pub fn contains(&self, name: &str) -> bool {
        self.key_of(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.key_of(name).and_then(|k| self.entries.get(&k))
    }

    /// Returns the literal value of a header.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(HeaderValue::as_literal)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<HeaderValue>) {
        let name = name.into();
        if let Some(existing) = self.key_of(&name) {
            self.entries.remove(&existing);
        }
        self.entries.insert(name, value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<HeaderValue> {
        let key = self.key_of(name)?;
        self.entries.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Replaces every computed value by its resolution, dropping headers whose
    /// resolver returns `None`.
    pub fn resolve_computed(&mut self) {
        self.entries.retain(|_, value| match value {
            HeaderValue::Literal(_) => true,
            HeaderValue::Computed(resolver) => match resolver() {
                Some(resolved) => {
                    *value = HeaderValue::Literal(resolved);
                    true
                }
                None => false,
            },
        });
    }

    /// Returns all literal headers as name/value pairs, validating them as HTTP
    /// header names and values.
    pub fn to_pairs(&self) -> Result<Vec<(String, String)>, NetError> {
        let mut pairs = Vec::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            let HeaderValue::Literal(value) = value else {
                return Err(NetError::InvalidArgument(format!(
                    "header {name} has not been resolved"
                )));
            };
            validate_header(name, value)?;
            pairs.push((name.clone(), value.clone()));
        }
        Ok(pairs)
    }
}

/// Checks that `name` and `value` are valid on the wire.
pub(crate) fn validate_header(name: &str, value: &str) -> Result<(), NetError> {
    http::HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| NetError::InvalidArgument(format!("invalid header name: {name:?}")))?;
    http::HeaderValue::from_str(value)
        .map_err(|_| NetError::InvalidArgument(format!("invalid value for header {name}")))?;
    Ok(())
}

/// Caching behavior of a single request.
#[derive(Clone, Default)]
pub enum CachePolicy {
    /// Use the pipeline's configured default cache, if there is one.
    #[default]
    Inherit,
    /// Use the configured default cache, or the dispatcher's own cache.
    Default,
    /// Use this cache.
    Explicit(CacheHandle),
    /// Never cache and never de-duplicate.
    Disabled,
}

impl fmt::Debug for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CachePolicy::Inherit => f.write_str("Inherit"),
            CachePolicy::Default => f.write_str("Default"),
            CachePolicy::Explicit(_) => f.write_str("Explicit(..)"),
            CachePolicy::Disabled => f.write_str("Disabled"),
        }
    }
}

/// Returns `method` with its name upper-cased.
pub fn normalize_method(method: &Method) -> Result<Method, NetError> {
    let name = method.as_str();
    if name.bytes().all(|b| !b.is_ascii_lowercase()) {
        return Ok(method.clone());
    }
    parse_method(name)
}

/// Parses a method token, upper-casing it first.
pub fn parse_method(name: &str) -> Result<Method, NetError> {
    Method::from_bytes(name.to_ascii_uppercase().as_bytes())
        .map_err(|_| NetError::InvalidArgument(format!("invalid method: {name:?}")))
}

/// Configuration of a single request.
#[derive(Clone, Debug)]
pub struct RequestConfig {
    pub id: RequestId,
    pub method: Method,
    pub url: String,
    pub params: Option<Params>,
    pub headers: RequestHeaders,
    pub body: Option<Body>,
    pub with_credentials: bool,
    pub cache: CachePolicy,
    pub xsrf_cookie_name: Option<String>,
    pub xsrf_header_name: Option<String>,
    /// Not supported; a request carrying a timeout fails with `NotImplemented`.
    pub timeout: Option<Duration>,
    /// Not supported; a request carrying a token fails with `NotImplemented`.
    pub cancel: Option<CancellationToken>,
}

impl RequestConfig {
    /// Creates a request for any method token (e.g. `"get"`, `"JSONP"`).
    pub fn new(method: &str, url: impl Into<String>) -> Result<Self, NetError> {
        Ok(Self::with_method(parse_method(method)?, url))
    }

    pub fn with_method(method: Method, url: impl Into<String>) -> Self {
        Self {
            id: RequestId::new(),
            method,
            url: url.into(),
            params: None,
            headers: RequestHeaders::new(),
            body: None,
            with_credentials: false,
            cache: CachePolicy::Inherit,
            xsrf_cookie_name: None,
            xsrf_header_name: None,
            timeout: None,
            cancel: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::with_method(Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: impl Into<Body>) -> Self {
        Self::with_method(Method::POST, url).body(body)
    }

    #[inline]
    fn map(mut self, f: impl FnOnce(&mut RequestConfig)) -> Self {
        f(&mut self);
        self
    }

    pub fn param(self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.map(|c| {
            c.params
                .get_or_insert_with(Params::new)
                .insert(key.into(), value.into());
        })
    }

    pub fn params(self, params: Params) -> Self { self.map(|c| c.params = Some(params)) }
    pub fn header(self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self { self.map(|c| c.headers.insert(name, value)) }
    pub fn body(self, body: impl Into<Body>) -> Self { self.map(|c| c.body = Some(body.into())) }
    pub fn with_credentials(self, on: bool) -> Self { self.map(|c| c.with_credentials = on) }
    pub fn cache(self, policy: CachePolicy) -> Self { self.map(|c| c.cache = policy) }
    pub fn xsrf_cookie_name<S: Into<String>>(self, name: S) -> Self { self.map(|c| c.xsrf_cookie_name = Some(name.into())) }
    pub fn xsrf_header_name<S: Into<String>>(self, name: S) -> Self { self.map(|c| c.xsrf_header_name = Some(name.into())) }
    pub fn timeout(self, timeout: Duration) -> Self { self.map(|c| c.timeout = Some(timeout)) }
    pub fn cancel_token(self, token: CancellationToken) -> Self { self.map(|c| c.cancel = Some(token)) }

    /// Adds a header whose value is computed while the request is built.
    pub fn computed_header<F>(self, name: impl Into<String>, resolver: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.map(|c| c.headers.insert(name, HeaderValue::Computed(Arc::new(resolver))))
    }
}
