//! Cookie record and `Set-Cookie` parsing.
//!
//! Parsing is intentionally minimal: `Path`, `Domain` (leading dot
//! stripped), `Expires` (stored raw), `SameSite`, `Secure` and `HttpOnly` are
//! recognized. `Max-Age` and expiration enforcement are not implemented.
use serde::{Deserialize, Serialize};
use url::Url;

/// A cookie as stored by [`DocumentCookieJar`](crate::cookies::DocumentCookieJar).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name (case-sensitive).
    pub name: String,

    /// Raw cookie value (not URL-decoded).
    pub value: String,

    /// Path scoping (e.g. `"/"`).
    pub path: String,

    /// Domain scoping. Without a `Domain` attribute this is the host that set
    /// the cookie and `host_only` is `true`.
    pub domain: String,

    /// Only the exact `domain` host sees the cookie.
    pub host_only: bool,

    /// If `true`, cookie is sent only over HTTPS.
    pub secure: bool,

    /// Raw `Expires` attribute, if any. Session cookies have `None`.
    pub expires: Option<String>,

    /// SameSite policy (`"Strict"`, `"Lax"`, or `"None"`).
    pub same_site: Option<String>,

    /// Hidden from document-level reads (and therefore from XSRF lookups).
    pub http_only: bool,
}

impl Cookie {
    /// Parses one `Set-Cookie` value received from `url`.
    ///
    /// Returns `None` when the value has no `name=value` part, or when its
    /// `Domain` attribute does not cover the host of `url`.
    pub fn parse(set_cookie: &str, url: &Url) -> Option<Self> {
        let host = url.host_str()?.to_ascii_lowercase();
        let mut parts = set_cookie.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie {
            name: name.to_string(),
            value: value.trim().to_string(),
            path: default_path(url),
            domain: host.clone(),
            host_only: true,
            secure: false,
            expires: None,
            same_site: None,
            http_only: false,
        };

        for part in parts {
            let part = part.trim();
            if let Some((k, v)) = part.split_once('=') {
                let v = v.trim();
                match k.trim().to_ascii_lowercase().as_str() {
                    "path" if v.starts_with('/') => cookie.path = v.to_string(),
                    "domain" if !v.is_empty() => {
                        cookie.domain = v.trim_start_matches('.').to_ascii_lowercase();
                        cookie.host_only = false;
                    }
                    "expires" => cookie.expires = Some(v.to_string()),
                    "samesite" => {
                        let normalized = if v.eq_ignore_ascii_case("lax") {
                            "Lax"
                        } else if v.eq_ignore_ascii_case("strict") {
                            "Strict"
                        } else if v.eq_ignore_ascii_case("none") {
                            "None"
                        } else {
                            v
                        };
                        cookie.same_site = Some(normalized.to_string());
                    }
                    _ => {}
                }
            } else if part.eq_ignore_ascii_case("secure") {
                cookie.secure = true;
            } else if part.eq_ignore_ascii_case("httponly") {
                cookie.http_only = true;
            }
        }

        if !cookie.host_only && !domain_matches(&host, &cookie.domain) {
            return None;
        }

        Some(cookie)
    }

    /// Returns `true` when a request or document at `url` sees this cookie.
    pub fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();

        let domain_ok = if self.host_only {
            host == self.domain
        } else {
            domain_matches(&host, &self.domain)
        };

        domain_ok && path_matches(url.path(), &self.path) && (!self.secure || url.scheme() == "https")
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{domain}"))
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

fn default_path(url: &Url) -> String {
    url.path()
        .rsplit_once('/')
        .map_or("/", |(dir, _)| if dir.is_empty() { "/" } else { dir })
        .to_string()
}
