//! Interceptors and the stage lists built from them.
//!
//! An [`Interceptor`] has up to four transforms. An [`InterceptorChain`]
//! keeps interceptors in registration order and turns them into a
//! [`StageList`]: while walking the registration order, each interceptor's
//! request stage is pushed to the *front* of the request list and its
//! response stage to the *back* of the response list. The interceptor
//! registered first therefore sees the request last (closest to the
//! transport) and the response first.
//!
//! ```text
//! registered: [I1, I2]
//! request:    I2.request -> I1.request -> transport
//! response:   transport -> I1.response -> I2.response
//! ```
//!
//! Per-call chains are walked after the global chain, so they wrap outside
//! of it.
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::errors::NetError;
use crate::net::request::{Body, RequestConfig};
use crate::net::step::Step;
use crate::net::Response;

/// Transform applied to a successful value.
pub type Transform<T> = Arc<dyn Fn(T) -> Step<T> + Send + Sync>;
/// Handler offered an error; it may recover with a value or fail again.
pub type Recover<T> = Arc<dyn Fn(NetError) -> Step<T> + Send + Sync>;

/// A set of optional request/response transforms.
#[derive(Clone, Default)]
pub struct Interceptor {
    name: String,
    request: Option<Transform<RequestConfig>>,
    request_error: Option<Recover<RequestConfig>>,
    response: Option<Transform<Response>>,
    response_error: Option<Recover<Response>>,
}

impl Interceptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn on_request<F>(mut self, f: F) -> Self
    where
        F: Fn(RequestConfig) -> Step<RequestConfig> + Send + Sync + 'static,
    {
        self.request = Some(Arc::new(f));
        self
    }

    pub fn on_request_error<F>(mut self, f: F) -> Self
    where
        F: Fn(NetError) -> Step<RequestConfig> + Send + Sync + 'static,
    {
        self.request_error = Some(Arc::new(f));
        self
    }

    pub fn on_response<F>(mut self, f: F) -> Self
    where
        F: Fn(Response) -> Step<Response> + Send + Sync + 'static,
    {
        self.response = Some(Arc::new(f));
        self
    }

    pub fn on_response_error<F>(mut self, f: F) -> Self
    where
        F: Fn(NetError) -> Step<Response> + Send + Sync + 'static,
    {
        self.response_error = Some(Arc::new(f));
        self
    }

    /// The built-in body interceptor: serializes structured request bodies to
    /// JSON text and parses JSON response bodies.
    pub fn json() -> Self {
        Self::new("json")
            .on_request(|mut config: RequestConfig| {
                config.body = config.body.map(stringify_body);
                Step::ready(config)
            })
            .on_response(|response: Response| match parse_json_body(&response) {
                Ok(Some(value)) => Step::ready(response.with_body(Some(Body::Json(value)))),
                Ok(None) => Step::ready(response),
                Err(err) => Step::failed(err),
            })
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("name", &self.name)
            .field("request", &self.request.is_some())
            .field("request_error", &self.request_error.is_some())
            .field("response", &self.response.is_some())
            .field("response_error", &self.response_error.is_some())
            .finish()
    }
}

/// Prefix some servers put in front of JSON to defeat script inclusion.
const JSON_PROTECTION_PREFIX: &str = ")]}'";

fn stringify_body(body: Body) -> Body {
    match body {
        Body::Json(serde_json::Value::String(s)) => Body::Text(s),
        Body::Json(value) => Body::Text(value.to_string()),
        other => other,
    }
}

fn strip_protection_prefix(text: &str) -> &str {
    let Some(rest) = text.strip_prefix(JSON_PROTECTION_PREFIX) else {
        return text;
    };
    let rest = rest.strip_prefix(',').unwrap_or(rest);
    rest.strip_prefix('\n').unwrap_or(text)
}

fn looks_like_json(text: &str) -> bool {
    (text.starts_with('{') && !text.starts_with("{{") && text.ends_with('}'))
        || (text.starts_with('[') && text.ends_with(']'))
}

/// Parses a textual body when it is declared or looks like JSON.
///
/// Bodies declared as `application/json` must parse; bodies that only look
/// like JSON are left as text when they do not.
fn parse_json_body(response: &Response) -> Result<Option<serde_json::Value>, NetError> {
    let Some(Body::Text(text)) = response.body() else {
        return Ok(None);
    };

    let trimmed = strip_protection_prefix(text).trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let declared = response
        .header("content-type")
        .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("application/json"));
    if !declared && !looks_like_json(trimmed) {
        return Ok(None);
    }

    match serde_json::from_str(trimmed) {
        Ok(value) => Ok(Some(value)),
        Err(_) if !declared => Ok(None),
        Err(e) => Err(NetError::Decode(format!("{}: {e}", response.config().url))),
    }
}

/// Interceptors in registration order.
#[derive(Clone, Debug, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Interceptor>,
}

impl InterceptorChain {
    /// An empty chain (for per-call interceptors).
    pub fn new() -> Self {
        Self::default()
    }

    /// The global chain: starts with the built-in JSON interceptor.
    pub fn with_json() -> Self {
        let mut chain = Self::new();
        chain.register(Interceptor::json());
        chain
    }

    pub fn register(&mut self, interceptor: Interceptor) {
        self.interceptors.push(interceptor);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, interceptor: Interceptor) -> Self {
        self.register(interceptor);
        self
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interceptor> {
        self.interceptors.iter()
    }

    /// Builds the stage lists for this chain alone.
    pub fn build(&self) -> StageList {
        StageList::from_registrations(self.interceptors.iter())
    }

    /// Builds the stage lists for this (global) chain wrapped by `outer`.
    pub fn build_with(&self, outer: &InterceptorChain) -> StageList {
        StageList::from_registrations(self.interceptors.iter().chain(outer.interceptors.iter()))
    }
}

/// One stage: a transform and an error handler, both always present.
pub struct Stage<T> {
    ok: Transform<T>,
    err: Recover<T>,
}

impl<T: Send + 'static> Stage<T> {
    fn new(ok: Option<Transform<T>>, err: Option<Recover<T>>) -> Self {
        Self {
            ok: ok.unwrap_or_else(|| Arc::new(Step::<T>::ready) as Transform<T>),
            err: err.unwrap_or_else(|| Arc::new(Step::<T>::failed) as Recover<T>),
        }
    }

    fn apply(&self, acc: Result<T, NetError>) -> Step<T> {
        match acc {
            Ok(value) => (self.ok)(value),
            Err(err) => (self.err)(err),
        }
    }
}

/// Ordered stages around the transport.
pub struct StageList {
    pub request: Arc<[Stage<RequestConfig>]>,
    pub response: Arc<[Stage<Response>]>,
}

impl StageList {
    fn from_registrations<'a>(interceptors: impl Iterator<Item = &'a Interceptor>) -> Self {
        let mut request = VecDeque::new();
        let mut response = VecDeque::new();

        for interceptor in interceptors {
            request.push_front(Stage::new(
                interceptor.request.clone(),
                interceptor.request_error.clone(),
            ));
            response.push_back(Stage::new(
                interceptor.response.clone(),
                interceptor.response_error.clone(),
            ));
        }

        Self {
            request: Vec::from(request).into(),
            response: Vec::from(response).into(),
        }
    }
}

/// Runs `stages[start..]` over `acc`.
///
/// Stages run synchronously while each returns `Ready`. The first `Pending`
/// stage ends the synchronous run; the rest is chained after it settles.
pub fn fold<T: Send + 'static>(
    stages: Arc<[Stage<T>]>,
    start: usize,
    acc: Result<T, NetError>,
) -> Step<T> {
    let mut acc = acc;
    for index in start..stages.len() {
        match stages[index].apply(acc) {
            Step::Ready(next) => acc = next,
            Step::Pending(fut) => {
                let stages = stages.clone();
                return Step::pending(async move {
                    let settled = fut.await;
                    fold(stages, index + 1, settled).settle().await
                });
            }
        }
    }
    Step::Ready(acc)
}
