use gosub_net::cookies::DocumentCookieJar;
use gosub_net::net::fetch::DEFAULT_USER_AGENT;
use gosub_net::net::{Body, FixedLocation, HttpTransport, InMemoryCache, Interceptor, Step};
use gosub_net::{Dispatcher, PipelineConfig};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://httpbin.org/json".to_string());
    let document = Url::parse(&url)?;

    // Configure the pipeline through the builder. Responses are cached and
    // completions arriving within 10ms of each other are delivered together.
    let config = PipelineConfig::builder()
        .default_cache(Arc::new(InMemoryCache::new()))
        .coalesce_window(Duration::from_millis(10))
        .interceptor(Interceptor::new("trace").on_response(|response| {
            println!("<- {} {}", response.status(), response.config().url);
            Step::ready(response)
        }))
        .build()?;

    // The document we act on behalf of decides what is same-origin and which
    // cookies can be read for the XSRF header.
    let dispatcher = Dispatcher::builder()
        .transport(Arc::new(HttpTransport::new(DEFAULT_USER_AGENT)?.with_base(document.clone())))
        .location(Arc::new(FixedLocation::from_url(document.as_str())?))
        .cookies(Arc::new(DocumentCookieJar::new(document.clone())))
        .config(config)
        .build()?;

    // Both calls share one request on the wire.
    let first = dispatcher.get(url.as_str());
    let second = dispatcher.get(url.as_str());
    println!("in flight: {:?}", dispatcher.pending_urls());

    let (first, second) = futures::join!(first.settle(), second.settle());
    let (first, second) = (first?, second?);

    // The third one is answered from the cache.
    let third = dispatcher.get(url.as_str()).await?;

    match first.body() {
        Some(Body::Json(value)) => println!("{}", serde_json::to_string_pretty(value)?),
        Some(Body::Text(text)) => println!("{text}"),
        Some(Body::Bytes(bytes)) => println!("<{} bytes>", bytes.len()),
        None => println!("<empty body>"),
    }
    println!(
        "statuses: {} {} {} (same body: {})",
        first.status(),
        second.status(),
        third.status(),
        first.body() == third.body()
    );

    Ok(())
}
