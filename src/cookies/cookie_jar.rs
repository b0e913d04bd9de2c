//! In-memory cookie jar for a single document.
//!
//! The jar keeps every cookie it has been handed, whatever its domain, but
//! [`CookieStore::get`] only exposes cookies that the document URL can see
//! and that are not `HttpOnly`, like a script reading `document.cookie`.
//!
//! Response headers arrive with repeated `Set-Cookie` values joined by
//! `", "`. Since `Expires` dates contain a comma as well, the joined value is
//! split on `", "` and fragments that do not start with a `name=` pair are
//! glued back onto the previous cookie.
use std::sync::RwLock;

use url::Url;

use crate::cookies::{Cookie, CookieStore};
use crate::net::ResponseHeaders;

pub struct DocumentCookieJar {
    /// URL of the document whose view of the jar `get` returns.
    document: Url,
    /// Cookies, newest write wins for the same (name, domain, path).
    cookies: RwLock<Vec<Cookie>>,
}

impl DocumentCookieJar {
    pub fn new(document: Url) -> Self {
        Self {
            document,
            cookies: RwLock::new(Vec::new()),
        }
    }

    /// Adds or replaces a cookie.
    pub fn set(&self, cookie: Cookie) {
        let mut cookies = self.cookies.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = cookies
            .iter_mut()
            .find(|c| c.name == cookie.name && c.domain == cookie.domain && c.path == cookie.path)
        {
            *existing = cookie;
        } else {
            cookies.push(cookie);
        }
    }

    /// Returns a snapshot of every stored cookie.
    pub fn all(&self) -> Vec<Cookie> {
        self.cookies.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.cookies.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl CookieStore for DocumentCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        let cookies = self.cookies.read().unwrap_or_else(|e| e.into_inner());
        cookies
            .iter()
            .filter(|c| c.name == name && !c.http_only && c.matches(&self.document))
            .max_by_key(|c| c.path.len())
            .map(|c| c.value.clone())
    }

    fn store_response_cookies(&self, url: &Url, headers: &ResponseHeaders) {
        let Some(joined) = headers.get("set-cookie") else {
            return;
        };

        for raw in split_set_cookie(joined) {
            match Cookie::parse(&raw, url) {
                Some(cookie) => {
                    log::trace!("storing cookie {} for {}", cookie.name, cookie.domain);
                    self.set(cookie);
                }
                None => log::debug!("ignoring Set-Cookie from {url}: {raw}"),
            }
        }
    }
}

/// Splits a `", "`-joined list of `Set-Cookie` values.
fn split_set_cookie(joined: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for fragment in joined.split(", ") {
        let starts_cookie = fragment
            .split(';')
            .next()
            .is_some_and(|first| first.contains('='));

        match out.last_mut() {
            Some(previous) if !starts_cookie => {
                previous.push_str(", ");
                previous.push_str(fragment);
            }
            _ => out.push(fragment.to_string()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn jar() -> DocumentCookieJar {
        DocumentCookieJar::new(url("https://app.example.com/index.html"))
    }

    #[test]
    fn split_keeps_expires_dates_together() {
        let joined = "a=1; Expires=Wed, 21 Oct 2037 07:28:00 GMT; Path=/, b=2, c=3; HttpOnly";
        assert_eq!(
            split_set_cookie(joined),
            vec![
                "a=1; Expires=Wed, 21 Oct 2037 07:28:00 GMT; Path=/".to_string(),
                "b=2".to_string(),
                "c=3; HttpOnly".to_string(),
            ]
        );
    }

    #[test]
    fn response_cookies_become_visible() {
        let jar = jar();
        let headers = ResponseHeaders::parse(
            "Set-Cookie: XSRF-TOKEN=tok; Path=/\nSet-Cookie: session=s; Path=/; HttpOnly",
        );
        jar.store_response_cookies(&url("https://app.example.com/api/login"), &headers);

        assert_eq!(jar.get("XSRF-TOKEN").as_deref(), Some("tok"));
        // HttpOnly cookies are stored but hidden from document reads
        assert_eq!(jar.get("session"), None);
        assert_eq!(jar.all().len(), 2);
    }

    #[test]
    fn cookies_of_other_sites_are_not_visible() {
        let jar = jar();
        let headers = ResponseHeaders::parse("Set-Cookie: XSRF-TOKEN=foreign; Path=/");
        jar.store_response_cookies(&url("https://api.other.com/"), &headers);

        assert_eq!(jar.get("XSRF-TOKEN"), None);
        assert_eq!(jar.all().len(), 1);
    }

    #[test]
    fn last_write_wins() {
        let jar = jar();
        let u = url("https://app.example.com/");
        jar.store_response_cookies(&u, &ResponseHeaders::parse("Set-Cookie: t=1; Path=/"));
        jar.store_response_cookies(&u, &ResponseHeaders::parse("Set-Cookie: t=2; Path=/"));

        assert_eq!(jar.get("t").as_deref(), Some("2"));
        assert_eq!(jar.all().len(), 1);

        jar.clear();
        assert_eq!(jar.get("t"), None);
    }
}
