//! Request dispatcher.
//!
//! A [`Dispatcher`] runs one request end-to-end:
//!
//! 1. *Building*: the method is upper-cased, default headers are merged in,
//!    the XSRF header is added for same-origin URLs and computed header
//!    values are resolved.
//! 2. The request stages of the interceptor chain run (outermost first).
//! 3. The dispatch stage builds the URL, consults the cache and the
//!    in-flight table, and invokes the transport.
//! 4. The response stages run (innermost first).
//! 5. The outcome is handed to the caller through the coalescer.
//!
//! Clones share the collaborators, the in-flight table, the built-in cache
//! and the coalescer.
use std::sync::Arc;

use futures::future::FutureExt;
use http::Method;

use crate::config::PipelineConfig;
use crate::cookies::{CookieStoreHandle, NoCookies};
use crate::errors::NetError;
use crate::net::cache::{CacheHandle, InMemoryCache};
use crate::net::coalesce::{Coalescer, FlushHook, TimerRef, TokioTimer};
use crate::net::headers::HeaderPolicy;
use crate::net::interceptor::{fold, InterceptorChain};
use crate::net::location::LocationResolver;
use crate::net::pending::PendingRequestTable;
use crate::net::query::QueryEncoder;
use crate::net::request::{normalize_method, parse_method, Body, CachePolicy, RequestConfig};
use crate::net::step::Step;
use crate::net::transport::{Reply, TransportError, TransportHandle, TransportRequest};
use crate::net::Response;

/// A handle to a location resolver trait.
pub type LocationHandle = Arc<dyn LocationResolver>;

struct DispatcherInner {
    transport: TransportHandle,
    location: LocationHandle,
    cookies: CookieStoreHandle,
    config: PipelineConfig,
    headers: HeaderPolicy,
    encoder: QueryEncoder,
    /// Cache used by `CachePolicy::Default` when no default cache is configured.
    builtin_cache: CacheHandle,
    pending: PendingRequestTable,
    coalescer: Coalescer,
}

/// Runs requests through the interceptor chain, the cache and the transport.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Sends `config` through the global interceptor chain.
    pub fn call(&self, config: RequestConfig) -> Step<Response> {
        self.call_with(config, &InterceptorChain::new())
    }

    /// Sends `config` through the global chain wrapped by `chain`.
    ///
    /// The returned step is `Ready` when nothing along the way suspended,
    /// e.g. for a cache hit without a coalescing window.
    pub fn call_with(&self, config: RequestConfig, chain: &InterceptorChain) -> Step<Response> {
        if config.timeout.is_some() {
            log::warn!("[{}] request timeouts are not supported", config.id);
            return Step::failed(NetError::NotImplemented("request timeouts"));
        }
        if config.cancel.is_some() {
            log::warn!("[{}] request cancellation is not supported", config.id);
            return Step::failed(NetError::NotImplemented("request cancellation"));
        }

        let config = match self.inner.prepare(config) {
            Ok(config) => config,
            Err(err) => return Step::failed(err),
        };
        log::debug!("[{}] {} {}", config.id, config.method, config.url);

        let stages = self.inner.config.interceptors.build_with(chain);
        let response_stages = stages.response;
        let inner = self.inner.clone();
        let coalescer = self.inner.coalescer.clone();

        fold(stages.request, 0, Ok(config))
            .and_then(move |outcome| match outcome {
                Ok(config) => inner.dispatch(config),
                Err(err) => Step::failed(err),
            })
            .and_then(move |outcome| fold(response_stages, 0, outcome))
            .and_then(move |outcome| coalescer.deliver(outcome))
    }

    /// A request for `method` and `url` with the configured credentials default.
    pub fn request(&self, method: Method, url: impl Into<String>) -> RequestConfig {
        RequestConfig::with_method(method, url).with_credentials(self.inner.config.with_credentials)
    }

    pub fn get(&self, url: impl Into<String>) -> Step<Response> {
        self.call(self.request(Method::GET, url))
    }

    pub fn delete(&self, url: impl Into<String>) -> Step<Response> {
        self.call(self.request(Method::DELETE, url))
    }

    pub fn head(&self, url: impl Into<String>) -> Step<Response> {
        self.call(self.request(Method::HEAD, url))
    }

    /// `JSONP` is sent like any other method; the transport decides what it means.
    pub fn jsonp(&self, url: impl Into<String>) -> Step<Response> {
        match parse_method("JSONP") {
            Ok(method) => self.call(self.request(method, url)),
            Err(err) => Step::failed(err),
        }
    }

    pub fn post(&self, url: impl Into<String>, body: impl Into<Body>) -> Step<Response> {
        self.call(self.request(Method::POST, url).body(body))
    }

    pub fn put(&self, url: impl Into<String>, body: impl Into<Body>) -> Step<Response> {
        self.call(self.request(Method::PUT, url).body(body))
    }

    pub fn patch(&self, url: impl Into<String>, body: impl Into<Body>) -> Step<Response> {
        self.call(self.request(Method::PATCH, url).body(body))
    }

    /// Snapshot of the URLs with a request in flight.
    pub fn pending_urls(&self) -> Vec<String> {
        self.inner.pending.urls()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// The cache used by `CachePolicy::Default` when no default cache is configured.
    pub fn builtin_cache(&self) -> &CacheHandle {
        &self.inner.builtin_cache
    }

    /// Runs every coalesced completion now.
    pub fn flush(&self) {
        self.inner.coalescer.flush();
    }
}

impl DispatcherInner {
    fn prepare(&self, mut config: RequestConfig) -> Result<RequestConfig, NetError> {
        config.method = normalize_method(&config.method)?;
        self.headers.apply(&mut config.headers, &config.method);

        let origin = self.location.current_origin();
        let xsrf = self.headers.apply_xsrf(
            &mut config.headers,
            &config.url,
            &origin,
            &*self.cookies,
            config.xsrf_cookie_name.as_deref(),
            config.xsrf_header_name.as_deref(),
        );
        if xsrf {
            log::trace!("[{}] added XSRF header", config.id);
        }

        config.headers.resolve_computed();
        Ok(config)
    }

    fn resolve_cache(&self, policy: &CachePolicy) -> Option<CacheHandle> {
        match policy {
            CachePolicy::Disabled => None,
            CachePolicy::Explicit(cache) => Some(cache.clone()),
            CachePolicy::Default => Some(
                self.config
                    .default_cache
                    .clone()
                    .unwrap_or_else(|| self.builtin_cache.clone()),
            ),
            CachePolicy::Inherit => self.config.default_cache.clone(),
        }
    }

    /// The dispatch stage: sits between the request and the response stages.
    fn dispatch(&self, mut config: RequestConfig) -> Step<Response> {
        let origin = self.location.current_origin();

        // interceptors may have added computed values
        config.headers.resolve_computed();
        if config.body.is_none() {
            config.headers.remove("Content-Type");
        }

        let url = self.encoder.build(&config.url, config.params.as_ref());
        let headers = match config.headers.to_pairs() {
            Ok(headers) => headers,
            Err(err) => return Step::failed(err),
        };

        let config = Arc::new(config);
        let request = TransportRequest {
            url: url.clone(),
            method: config.method.clone(),
            headers,
            body: config.body.clone(),
            with_credentials: config.with_credentials,
        };
        let cookie_url = origin.resolve(&url);

        let Some(cache) = self.resolve_cache(&config.cache) else {
            log::trace!("[{}] sending {} without cache", config.id, url);
            let reply = self.transport.request(request);
            let cookies = self.cookies.clone();
            return Step::pending(async move {
                let outcome = reply.await.map(Reply::from);
                if let (Ok(reply), Some(url)) = (&outcome, &cookie_url) {
                    cookies.store_response_cookies(url, &reply.headers);
                }
                settle(outcome, config)
            });
        };

        if config.method == Method::GET && !self.pending.contains(&url) {
            match cache.get(&url) {
                Ok(Some(hit)) => {
                    log::debug!("[{}] cache hit for {}", config.id, url);
                    return Step::ready(hit.with_config(config));
                }
                Ok(None) => {}
                Err(err) => {
                    log::warn!("[{}] cache lookup for {} failed: {}", config.id, url, err);
                    return Step::failed(err);
                }
            }
        }

        let (reply, joined) = self.pending.join_or_register(&url, |guard| {
            let reply = self.transport.request(request);
            let cookies = self.cookies.clone();
            let registrant = config.clone();
            async move {
                let outcome = reply.await.map(Reply::from);
                if let Ok(reply) = &outcome {
                    if registrant.method == Method::GET && reply.is_success() {
                        cache.put(guard.url(), reply.clone().into_response(registrant.clone()));
                    }
                    if let Some(url) = &cookie_url {
                        cookies.store_response_cookies(url, &reply.headers);
                    }
                }
                drop(guard);
                outcome
            }
            .boxed()
        });

        if joined {
            log::debug!("[{}] joining in-flight request for {}", config.id, url);
        } else {
            log::trace!("[{}] sending {}", config.id, url);
        }

        Step::pending(async move { settle(reply.await, config) })
    }
}

/// Turns the transport outcome into the caller's own response or error.
fn settle(outcome: Result<Reply, TransportError>, config: Arc<RequestConfig>) -> Result<Response, NetError> {
    match outcome {
        Ok(reply) => {
            log::debug!("[{}] {} {}", config.id, reply.status, config.url);
            Ok(reply.into_response(config))
        }
        Err(err) => {
            log::debug!("[{}] transport failed: {}", config.id, err);
            Err(err.into_net_error(config))
        }
    }
}

/// Wires the collaborators of a [`Dispatcher`].
///
/// A transport and a location are required. Cookies default to
/// [`NoCookies`], the configuration to [`PipelineConfig::default`]. When the
/// configuration has a coalescing window and no timer is given, a
/// [`TokioTimer`] on the current runtime is used.
#[derive(Default)]
pub struct DispatcherBuilder {
    transport: Option<TransportHandle>,
    location: Option<LocationHandle>,
    cookies: Option<CookieStoreHandle>,
    config: Option<PipelineConfig>,
    timer: Option<TimerRef>,
    flush_hook: Option<FlushHook>,
}

impl DispatcherBuilder {
    pub fn transport(mut self, transport: TransportHandle) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn location(mut self, location: LocationHandle) -> Self {
        self.location = Some(location);
        self
    }

    pub fn cookies(mut self, cookies: CookieStoreHandle) -> Self {
        self.cookies = Some(cookies);
        self
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn timer(mut self, timer: TimerRef) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Observes every coalescer flush with the number of completions it ran.
    pub fn flush_hook(mut self, hook: FlushHook) -> Self {
        self.flush_hook = Some(hook);
        self
    }

    pub fn build(self) -> Result<Dispatcher, NetError> {
        let transport = self
            .transport
            .ok_or_else(|| NetError::InvalidArgument("dispatcher needs a transport".into()))?;
        let location = self
            .location
            .ok_or_else(|| NetError::InvalidArgument("dispatcher needs a location".into()))?;
        let cookies = self.cookies.unwrap_or_else(|| Arc::new(NoCookies));
        let config = self.config.unwrap_or_default();

        let coalescer = match config.coalesce_window {
            Some(window) => {
                let timer: TimerRef = match self.timer {
                    Some(timer) => timer,
                    None => Arc::new(TokioTimer::current()?),
                };
                Coalescer::windowed(window, timer)
            }
            None => Coalescer::immediate(),
        };
        let coalescer = match self.flush_hook {
            Some(hook) => coalescer.with_flush_hook(hook),
            None => coalescer,
        };

        let headers = HeaderPolicy::new(
            config.default_headers.clone(),
            &config.xsrf_cookie_name,
            &config.xsrf_header_name,
        );

        Ok(Dispatcher {
            inner: Arc::new(DispatcherInner {
                transport,
                location,
                cookies,
                encoder: config.query_encoder(),
                headers,
                config,
                builtin_cache: Arc::new(InMemoryCache::new()),
                pending: PendingRequestTable::new(),
                coalescer,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::{Cookie, DocumentCookieJar};
    use crate::net::cache::ResponseCache;
    use crate::net::interceptor::Interceptor;
    use crate::net::location::FixedLocation;
    use crate::net::transport::{RawReply, Transport};
    use crate::net::ResponseHeaders;
    use futures::future::{self, BoxFuture};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use url::Url;

    type Responder = Box<dyn Fn(&TransportRequest) -> Result<RawReply, TransportError> + Send + Sync>;

    struct MockTransport {
        calls: AtomicUsize,
        seen: Mutex<Vec<TransportRequest>>,
        respond: Responder,
    }

    impl MockTransport {
        fn new<F>(respond: F) -> Arc<Self>
        where
            F: Fn(&TransportRequest) -> Result<RawReply, TransportError> + Send + Sync + 'static,
        {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                respond: Box::new(respond),
            })
        }

        fn replying(status: u16, body: &'static str, header_blob: &'static str) -> Arc<Self> {
            Self::new(move |_| Ok(raw(status, body, header_blob)))
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last(&self) -> TransportRequest {
            self.seen.lock().unwrap().last().cloned().expect("no request seen")
        }
    }

    impl Transport for MockTransport {
        fn request(&self, request: TransportRequest) -> BoxFuture<'static, Result<RawReply, TransportError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = (self.respond)(&request);
            self.seen.lock().unwrap().push(request);
            future::ready(outcome).boxed()
        }
    }

    fn raw(status: u16, body: &str, header_blob: &str) -> RawReply {
        RawReply {
            status,
            status_text: String::new(),
            body: (!body.is_empty()).then(|| Body::Text(body.to_string())),
            header_blob: header_blob.to_string(),
        }
    }

    fn dispatcher(transport: Arc<MockTransport>, config: PipelineConfig) -> Dispatcher {
        Dispatcher::builder()
            .transport(transport)
            .location(Arc::new(FixedLocation::from_url("https://app.example.com/").unwrap()))
            .config(config)
            .build()
            .unwrap()
    }

    fn cached_config(cache: Arc<InMemoryCache>) -> PipelineConfig {
        PipelineConfig::builder().default_cache(cache).build().unwrap()
    }

    fn header<'a>(request: &'a TransportRequest, name: &str) -> Option<&'a str> {
        request
            .headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    const JSON: &str = "Content-Type: application/json";

    #[tokio::test]
    async fn concurrent_gets_share_one_transport_call_when_cached() {
        let transport = MockTransport::replying(200, r#"{"n":1}"#, JSON);
        let d = dispatcher(transport.clone(), cached_config(Arc::new(InMemoryCache::new())));

        let a = d.get("/items");
        let b = d.get("/items");
        assert_eq!(d.pending_urls(), vec!["/items".to_string()]);

        let (a, b) = futures::join!(a.settle(), b.settle());
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(transport.calls(), 1);
        assert_eq!(a.body(), b.body());
        assert_eq!(a.body().and_then(Body::as_json), Some(&json!({"n": 1})));
        assert!(!Arc::ptr_eq(a.config(), b.config()));
        assert!(d.pending_urls().is_empty());
    }

    #[tokio::test]
    async fn without_cache_every_call_reaches_the_transport() {
        let transport = MockTransport::replying(200, "ok", "");
        let d = dispatcher(transport.clone(), PipelineConfig::default());

        let (a, b) = futures::join!(d.get("/items").settle(), d.get("/items").settle());
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(transport.calls(), 2);

        // an explicit opt-out beats a configured default cache
        let transport = MockTransport::replying(200, "ok", "");
        let d = dispatcher(transport.clone(), cached_config(Arc::new(InMemoryCache::new())));
        let a = d.call(RequestConfig::get("/items").cache(CachePolicy::Disabled));
        let b = d.call(RequestConfig::get("/items").cache(CachePolicy::Disabled));
        assert!(d.pending_urls().is_empty());
        let (a, b) = futures::join!(a.settle(), b.settle());
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn cache_hit_is_a_ready_copy_with_the_callers_config() {
        let cache = Arc::new(InMemoryCache::new());
        let transport = MockTransport::replying(200, r#"{"n":1}"#, JSON);
        let d = dispatcher(transport.clone(), cached_config(cache.clone()));

        let first = d.get("/items").await.unwrap();
        assert_eq!(first.body().and_then(Body::as_json), Some(&json!({"n": 1})));

        let second_config = RequestConfig::get("/items");
        let second_id = second_config.id;
        let step = d.call(second_config);
        assert!(step.is_ready());

        let second = step.await.unwrap();
        assert_eq!(transport.calls(), 1);
        assert_eq!(second.config().id, second_id);
        assert_eq!(second.body(), first.body());

        // the stored entry is untouched by the response stages
        let stored = cache.get("/items").unwrap().unwrap();
        assert_eq!(stored.body().and_then(Body::as_text), Some(r#"{"n":1}"#));
    }

    #[tokio::test]
    async fn default_policy_uses_the_builtin_cache() {
        let transport = MockTransport::replying(200, "ok", "");
        let d = dispatcher(transport.clone(), PipelineConfig::default());

        d.call(RequestConfig::get("/a").cache(CachePolicy::Default)).await.unwrap();
        d.call(RequestConfig::get("/a").cache(CachePolicy::Default)).await.unwrap();
        assert_eq!(transport.calls(), 1);
        assert!(d.builtin_cache().get("/a").unwrap().is_some());

        // inherit without a configured default does not touch it
        d.get("/a").await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn not_found_is_a_response_and_is_not_cached() {
        let cache = Arc::new(InMemoryCache::new());
        let transport = MockTransport::replying(404, "missing", "");
        let d = dispatcher(transport.clone(), cached_config(cache.clone()));

        let response = d.get("/nope").await.unwrap();
        assert_eq!(response.status(), 404);
        assert_eq!(response.body().and_then(Body::as_text), Some("missing"));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn interceptor_can_turn_statuses_into_errors() {
        let transport = MockTransport::replying(404, "", "");
        let d = dispatcher(transport, PipelineConfig::default());

        let strict = InterceptorChain::new().with(Interceptor::new("strict").on_response(|r: Response| {
            if r.is_success() {
                Step::ready(r)
            } else {
                Step::failed(NetError::Status(Box::new(r)))
            }
        }));

        match d.call_with(RequestConfig::get("/nope"), &strict).await {
            Err(NetError::Status(response)) => assert_eq!(response.status(), 404),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn request_errors_skip_the_transport() {
        let transport = MockTransport::replying(200, "", "");
        let d = dispatcher(transport.clone(), PipelineConfig::default());

        let chain = InterceptorChain::new().with(
            Interceptor::new("deny")
                .on_request(|_| Step::failed(NetError::Rejected("offline".into())))
                .on_response_error(|err| {
                    assert!(matches!(err, NetError::Rejected(_)));
                    let fallback = Arc::new(RequestConfig::get("/fallback"));
                    Step::ready(Response::new(299, "Recovered", ResponseHeaders::new(), None, fallback))
                }),
        );

        let response = d.call_with(RequestConfig::get("/items"), &chain).await.unwrap();
        assert_eq!(response.status(), 299);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn xsrf_cookie_from_a_response_is_sent_back_same_origin_only() {
        let transport = MockTransport::new(|request| {
            let blob = if request.url == "/login" {
                "Set-Cookie: XSRF-TOKEN=tok; Path=/"
            } else {
                ""
            };
            Ok(raw(200, "", blob))
        });
        let jar = Arc::new(DocumentCookieJar::new(Url::parse("https://app.example.com/").unwrap()));
        let d = Dispatcher::builder()
            .transport(transport.clone())
            .location(Arc::new(FixedLocation::from_url("https://app.example.com/").unwrap()))
            .cookies(jar.clone())
            .build()
            .unwrap();

        d.post("/login", json!({"user": "u"})).await.unwrap();
        assert_eq!(jar.all().len(), 1);

        d.get("/api").await.unwrap();
        assert_eq!(header(&transport.last(), "X-XSRF-TOKEN"), Some("tok"));

        d.get("https://other.example.org/api").await.unwrap();
        assert_eq!(header(&transport.last(), "X-XSRF-TOKEN"), None);

        d.call(RequestConfig::get("/api").xsrf_header_name("X-Custom")).await.unwrap();
        assert_eq!(header(&transport.last(), "X-Custom"), Some("tok"));
    }

    #[tokio::test]
    async fn request_interceptors_see_the_xsrf_header() {
        let transport = MockTransport::replying(200, "", "");
        let document = Url::parse("https://app.example.com/").unwrap();
        let jar = Arc::new(DocumentCookieJar::new(document.clone()));
        jar.set(Cookie::parse("XSRF-TOKEN=tok; Path=/", &document).unwrap());
        let d = Dispatcher::builder()
            .transport(transport.clone())
            .location(Arc::new(FixedLocation::from_url("https://app.example.com/").unwrap()))
            .cookies(jar)
            .build()
            .unwrap();

        let seen = Arc::new(Mutex::new(None));
        let recorded = seen.clone();
        let chain = InterceptorChain::new()
            .with(Interceptor::new("strip").on_request(|mut c: RequestConfig| {
                c.headers.remove("X-XSRF-TOKEN");
                Step::ready(c)
            }))
            .with(Interceptor::new("record").on_request(move |c: RequestConfig| {
                *recorded.lock().unwrap() = Some(c.headers.get_str("X-XSRF-TOKEN").map(str::to_string));
                Step::ready(c)
            }));

        d.call_with(RequestConfig::get("/api"), &chain).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(Some("tok".to_string())));
        assert_eq!(header(&transport.last(), "X-XSRF-TOKEN"), None);
    }

    #[tokio::test]
    async fn request_is_built_before_sending() {
        let transport = MockTransport::replying(201, "", "");
        let d = dispatcher(transport.clone(), PipelineConfig::default());

        let config = RequestConfig::new("post", "/s")
            .unwrap()
            .param("b", 2)
            .param("a", 1)
            .param("skip", serde_json::Value::Null)
            .body(json!({"a": 1}))
            .computed_header("X-Trace", || Some("t-1".to_string()))
            .computed_header("X-Gone", || None);
        d.call(config).await.unwrap();

        let sent = transport.last();
        assert_eq!(sent.method, Method::POST);
        assert_eq!(sent.url, "/s?a=1&b=2");
        assert_eq!(sent.body, Some(Body::Text(r#"{"a":1}"#.to_string())));
        assert_eq!(header(&sent, "content-type"), Some("application/json;charset=utf-8"));
        assert_eq!(header(&sent, "accept"), Some("application/json, text/plain, */*"));
        assert_eq!(header(&sent, "x-trace"), Some("t-1"));
        assert_eq!(header(&sent, "x-gone"), None);

        // no body, no content type
        d.call(d.request(Method::PUT, "/empty")).await.unwrap();
        assert_eq!(header(&transport.last(), "content-type"), None);
    }

    #[tokio::test]
    async fn caller_accept_header_is_kept() {
        let transport = MockTransport::replying(200, "", "");
        let d = dispatcher(transport.clone(), PipelineConfig::default());

        d.call(RequestConfig::get("/x").header("accept", "text/csv")).await.unwrap();
        assert_eq!(header(&transport.last(), "Accept"), Some("text/csv"));
    }

    #[tokio::test]
    async fn shortcut_methods() {
        let transport = MockTransport::replying(204, "", "");
        let d = dispatcher(transport.clone(), PipelineConfig::default());

        d.delete("/x").await.unwrap();
        assert_eq!(transport.last().method, Method::DELETE);
        d.head("/x").await.unwrap();
        assert_eq!(transport.last().method, Method::HEAD);
        d.jsonp("/x").await.unwrap();
        assert_eq!(transport.last().method.as_str(), "JSONP");
        d.put("/x", "v").await.unwrap();
        assert_eq!(transport.last().method, Method::PUT);
        d.patch("/x", "v").await.unwrap();
        assert_eq!(transport.last().method, Method::PATCH);
    }

    #[test]
    fn timeouts_and_cancellation_are_not_implemented() {
        let transport = MockTransport::replying(200, "", "");
        let d = dispatcher(transport.clone(), PipelineConfig::default());

        let step = d.call(RequestConfig::get("/x").timeout(Duration::from_secs(1)));
        assert!(matches!(step, Step::Ready(Err(NetError::NotImplemented(_)))));

        let step = d.call(RequestConfig::get("/x").cancel_token(CancellationToken::new()));
        assert!(matches!(step, Step::Ready(Err(NetError::NotImplemented(_)))));

        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn cache_failures_propagate() {
        struct BrokenCache;
        impl ResponseCache for BrokenCache {
            fn get(&self, key: &str) -> Result<Option<Response>, NetError> {
                Err(NetError::CacheFailure(format!("corrupt entry for {key}")))
            }
            fn put(&self, _key: &str, _response: Response) {}
        }

        let transport = MockTransport::replying(200, "", "");
        let d = dispatcher(transport.clone(), PipelineConfig::default());

        let step = d.call(RequestConfig::get("/x").cache(CachePolicy::Explicit(Arc::new(BrokenCache))));
        assert!(matches!(step, Step::Ready(Err(NetError::CacheFailure(_)))));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn transport_failures_clear_the_pending_entry() {
        let transport = MockTransport::new(|_| {
            Err(TransportError {
                message: "upstream reset".into(),
                status: Some(503),
                header_blob: Some("Retry-After: 1".into()),
            })
        });
        let d = dispatcher(transport, cached_config(Arc::new(InMemoryCache::new())));

        let step = d.get("/flaky");
        assert_eq!(d.pending_urls().len(), 1);

        let err = step.await.unwrap_err();
        assert_eq!(err.response().map(Response::status), Some(503));
        assert!(d.pending_urls().is_empty());
    }

    #[test]
    fn dropped_callers_release_the_pending_entry() {
        struct Hanging {
            calls: AtomicUsize,
        }
        impl Transport for Hanging {
            fn request(&self, _request: TransportRequest) -> BoxFuture<'static, Result<RawReply, TransportError>> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                future::pending().boxed()
            }
        }

        let transport = Arc::new(Hanging { calls: AtomicUsize::new(0) });
        let d = Dispatcher::builder()
            .transport(transport.clone())
            .location(Arc::new(FixedLocation::from_url("https://app.example.com/").unwrap()))
            .config(cached_config(Arc::new(InMemoryCache::new())))
            .build()
            .unwrap();

        let first = d.get("/stuck");
        let joined = d.get("/stuck");
        assert_eq!(d.pending_urls(), vec!["/stuck".to_string()]);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

        drop(first);
        assert_eq!(d.pending_urls().len(), 1);
        drop(joined);
        assert!(d.pending_urls().is_empty());

        let _retry = d.get("/stuck");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn completions_are_coalesced() {
        let flushes = Arc::new(Mutex::new(Vec::new()));
        let observed = flushes.clone();

        let transport = MockTransport::replying(200, "", "");
        let config = PipelineConfig::builder()
            .coalesce_window(Duration::from_millis(100))
            .build()
            .unwrap();
        let d = Dispatcher::builder()
            .transport(transport)
            .location(Arc::new(FixedLocation::from_url("https://app.example.com/").unwrap()))
            .config(config)
            .flush_hook(Arc::new(move |n| observed.lock().unwrap().push(n)))
            .build()
            .unwrap();

        let (a, b, c) = futures::join!(d.get("/a").settle(), d.get("/b").settle(), d.get("/c").settle());
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(*flushes.lock().unwrap(), vec![3]);
    }

    #[test]
    fn builder_requires_transport_and_location() {
        assert!(matches!(Dispatcher::builder().build(), Err(NetError::InvalidArgument(_))));

        let transport = MockTransport::replying(200, "", "");
        assert!(matches!(
            Dispatcher::builder().transport(transport).build(),
            Err(NetError::InvalidArgument(_))
        ));
    }
}
