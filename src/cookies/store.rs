use std::sync::Arc;

use url::Url;

use crate::net::ResponseHeaders;

/// Read access to the cookies visible to the current document.
///
/// The pipeline only reads cookies (to find the XSRF token). Stores that
/// also want to learn from responses implement
/// [`CookieStore::store_response_cookies`], which the dispatcher calls for
/// every reply the transport delivers.
pub trait CookieStore: Send + Sync {
    /// Returns the value of the cookie called `name`, if the document can see it.
    fn get(&self, name: &str) -> Option<String>;

    /// Records the `Set-Cookie` headers of a response received from `url`.
    fn store_response_cookies(&self, _url: &Url, _headers: &ResponseHeaders) {}
}

/// A handle to a cookie store trait.
pub type CookieStoreHandle = Arc<dyn CookieStore>;

/// A store without cookies, for pipelines that never send XSRF headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCookies;

impl CookieStore for NoCookies {
    fn get(&self, _name: &str) -> Option<String> {
        None
    }
}
