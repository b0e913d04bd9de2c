//! Pipeline configuration.
//!
//! `PipelineConfig` holds everything a [`Dispatcher`](crate::net::Dispatcher)
//! shares across calls: default headers, XSRF names, the default cache, the
//! coalescing window, query encoding and the global interceptor chain.
//!
//! `PipelineConfig` provides sensible defaults via [`Default`] and a fluent
//! [`PipelineConfig::builder()`] for customization with validation.
//!
//! # Examples
//!
//! ## Use defaults
//! ```rust
//! use gosub_net::config::PipelineConfig;
//! let cfg = PipelineConfig::default();
//! assert_eq!(cfg.xsrf_cookie_name, "XSRF-TOKEN");
//! assert!(cfg.coalesce_window.is_none());
//! ```
//!
//! ## Customize with the builder
//! ```rust
//! use std::time::Duration;
//! use gosub_net::config::PipelineConfig;
//! use gosub_net::net::{Interceptor, ParamSerializer, Step};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = PipelineConfig::builder()
//!     .xsrf_header_name("X-CSRF")
//!     .coalesce_window(Duration::from_millis(10))
//!     .param_serializer(ParamSerializer::JqLike)
//!     .common_header("X-Requested-With", "XMLHttpRequest")
//!     .interceptor(Interceptor::new("noop").on_request(Step::ready))
//!     .build()?; // returns Result<PipelineConfig, PipelineConfigError>
//! # Ok(()) }
//! ```
//!
//! # Fields (summary)
//! - `default_headers`: COMMON and per-method default headers.
//! - `xsrf_cookie_name` / `xsrf_header_name`: XSRF names (defaults
//!   `XSRF-TOKEN` / `X-XSRF-TOKEN`).
//! - `default_cache`: cache used by requests that do not choose one.
//! - `coalesce_window`: completions within this window are flushed together.
//! - `param_serializer` / `spaces_as_percent`: query string encoding.
//! - `interceptors`: global chain, always starting with the JSON interceptor.
//! - `with_credentials`: default for requests built by the shortcut calls.
//!
//! # Errors
//!
//! Builder validation returns [`PipelineConfigError`] for empty XSRF names,
//! a zero coalescing window or default headers that are not valid on the wire.
use std::fmt;
use std::time::Duration;

use crate::net::cache::CacheHandle;
use crate::net::headers::{DefaultHeaders, DEFAULT_XSRF_COOKIE_NAME, DEFAULT_XSRF_HEADER_NAME};
use crate::net::interceptor::{Interceptor, InterceptorChain};
use crate::net::query::{ParamSerializer, QueryEncoder};

#[derive(Clone)]
pub struct PipelineConfig {
    pub default_headers: DefaultHeaders,
    pub xsrf_cookie_name: String,
    pub xsrf_header_name: String,
    pub default_cache: Option<CacheHandle>,
    pub coalesce_window: Option<Duration>,
    pub param_serializer: ParamSerializer,
    pub spaces_as_percent: bool,
    pub interceptors: InterceptorChain,
    pub with_credentials: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_headers: DefaultHeaders::default(),
            xsrf_cookie_name: DEFAULT_XSRF_COOKIE_NAME.to_string(),
            xsrf_header_name: DEFAULT_XSRF_HEADER_NAME.to_string(),
            default_cache: None,
            coalesce_window: None,
            param_serializer: ParamSerializer::Default,
            spaces_as_percent: false,
            interceptors: InterceptorChain::with_json(),
            with_credentials: false,
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Query encoder matching this configuration.
    pub fn query_encoder(&self) -> QueryEncoder {
        QueryEncoder::new(self.param_serializer).spaces_as_percent(self.spaces_as_percent)
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("default_headers", &self.default_headers)
            .field("xsrf_cookie_name", &self.xsrf_cookie_name)
            .field("xsrf_header_name", &self.xsrf_header_name)
            .field("default_cache", &self.default_cache.is_some())
            .field("coalesce_window", &self.coalesce_window)
            .field("param_serializer", &self.param_serializer)
            .field("spaces_as_percent", &self.spaces_as_percent)
            .field("interceptors", &self.interceptors.len())
            .field("with_credentials", &self.with_credentials)
            .finish()
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Clone, Default)]
pub struct PipelineConfigBuilder {
    inner: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut PipelineConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn default_headers(self, headers: DefaultHeaders) -> Self { self.map(|c| c.default_headers = headers) }
    pub fn common_header(self, name: &str, value: &str) -> Self { self.map(|c| c.default_headers.set_common(name, value)) }
    pub fn method_header(self, method: &str, name: &str, value: &str) -> Self { self.map(|c| c.default_headers.set_for_method(method, name, value)) }
    pub fn xsrf_cookie_name<S: Into<String>>(self, name: S) -> Self { self.map(|c| c.xsrf_cookie_name = name.into()) }
    pub fn xsrf_header_name<S: Into<String>>(self, name: S) -> Self { self.map(|c| c.xsrf_header_name = name.into()) }
    pub fn default_cache(self, cache: CacheHandle) -> Self { self.map(|c| c.default_cache = Some(cache)) }
    pub fn coalesce_window(self, window: Duration) -> Self { self.map(|c| c.coalesce_window = Some(window)) }
    pub fn param_serializer(self, serializer: ParamSerializer) -> Self { self.map(|c| c.param_serializer = serializer) }
    pub fn spaces_as_percent(self, on: bool) -> Self { self.map(|c| c.spaces_as_percent = on) }
    pub fn with_credentials(self, on: bool) -> Self { self.map(|c| c.with_credentials = on) }

    /// Appends an interceptor to the global chain.
    pub fn interceptor(self, interceptor: Interceptor) -> Self { self.map(|c| c.interceptors.register(interceptor)) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut PipelineConfig)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(self) -> Result<PipelineConfig, PipelineConfigError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineConfigError {
    #[error("{0} must not be empty")]
    EmptyXsrfName(&'static str),
    #[error("coalesce_window must be longer than zero")]
    ZeroCoalesceWindow,
    #[error("invalid default header: {0}")]
    InvalidDefaultHeader(String),
}

fn validate(c: &PipelineConfig) -> Result<(), PipelineConfigError> {
    if c.xsrf_cookie_name.trim().is_empty() {
        return Err(PipelineConfigError::EmptyXsrfName("xsrf_cookie_name"));
    }
    if c.xsrf_header_name.trim().is_empty() {
        return Err(PipelineConfigError::EmptyXsrfName("xsrf_header_name"));
    }
    if c.coalesce_window == Some(Duration::ZERO) {
        return Err(PipelineConfigError::ZeroCoalesceWindow);
    }
    c.default_headers
        .validate()
        .map_err(|e| PipelineConfigError::InvalidDefaultHeader(e.to_string()))?;
    Ok(())
}
