//! Default and XSRF request headers.
//!
//! [`HeaderPolicy`] merges the configured default headers into a request
//! without ever overriding a header the caller set, and adds the XSRF token
//! header for same-origin requests.
use std::collections::HashMap;

use http::Method;

use crate::cookies::CookieStore;
use crate::errors::NetError;
use crate::net::location::DocumentOrigin;
use crate::net::request::{validate_header, RequestHeaders};

pub const DEFAULT_ACCEPT: &str = "application/json, text/plain, */*";
pub const DEFAULT_CONTENT_TYPE: &str = "application/json;charset=utf-8";
pub const DEFAULT_XSRF_COOKIE_NAME: &str = "XSRF-TOKEN";
pub const DEFAULT_XSRF_HEADER_NAME: &str = "X-XSRF-TOKEN";

/// Default headers: a common group plus groups per (uppercase) method name.
#[derive(Debug, Clone)]
pub struct DefaultHeaders {
    common: Vec<(String, String)>,
    per_method: HashMap<String, Vec<(String, String)>>,
}

impl Default for DefaultHeaders {
    fn default() -> Self {
        let mut headers = Self::empty();
        headers.set_common("Accept", DEFAULT_ACCEPT);
        for method in ["POST", "PUT", "PATCH"] {
            headers.set_for_method(method, "Content-Type", DEFAULT_CONTENT_TYPE);
        }
        headers
    }
}

impl DefaultHeaders {
    /// No default headers at all.
    pub fn empty() -> Self {
        Self {
            common: Vec::new(),
            per_method: HashMap::new(),
        }
    }

    fn upsert(group: &mut Vec<(String, String)>, name: &str, value: &str) {
        match group.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value.to_string(),
            None => group.push((name.to_string(), value.to_string())),
        }
    }

    /// Sets a header sent with every method.
    pub fn set_common(&mut self, name: &str, value: &str) {
        Self::upsert(&mut self.common, name, value);
    }

    /// Sets a header sent with one method only.
    pub fn set_for_method(&mut self, method: &str, name: &str, value: &str) {
        let group = self.per_method.entry(method.to_ascii_uppercase()).or_default();
        Self::upsert(group, name, value);
    }

    /// Removes a header from the common group and from every method group.
    pub fn remove(&mut self, name: &str) {
        self.common.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        for group in self.per_method.values_mut() {
            group.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        }
    }

    /// Headers that apply to `method`; method-specific values win over common ones.
    pub fn for_method(&self, method: &Method) -> Vec<(String, String)> {
        let mut merged = self.common.clone();
        if let Some(group) = self.per_method.get(method.as_str()) {
            for (name, value) in group {
                Self::upsert(&mut merged, name, value);
            }
        }
        merged
    }

    /// Checks every configured header for wire validity.
    pub(crate) fn validate(&self) -> Result<(), NetError> {
        self.common
            .iter()
            .chain(self.per_method.values().flatten())
            .try_for_each(|(name, value)| validate_header(name, value))
    }
}

/// Applies default and XSRF headers.
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    defaults: DefaultHeaders,
    xsrf_cookie_name: String,
    xsrf_header_name: String,
}

impl Default for HeaderPolicy {
    fn default() -> Self {
        Self::new(
            DefaultHeaders::default(),
            DEFAULT_XSRF_COOKIE_NAME,
            DEFAULT_XSRF_HEADER_NAME,
        )
    }
}

impl HeaderPolicy {
    pub fn new(defaults: DefaultHeaders, xsrf_cookie_name: &str, xsrf_header_name: &str) -> Self {
        Self {
            defaults,
            xsrf_cookie_name: xsrf_cookie_name.to_string(),
            xsrf_header_name: xsrf_header_name.to_string(),
        }
    }

    /// Adds every default header for `method` that the caller did not set.
    ///
    /// `method` must already be upper-cased.
    pub fn apply(&self, headers: &mut RequestHeaders, method: &Method) {
        for (name, value) in self.defaults.for_method(method) {
            if !headers.contains(&name) {
                headers.insert(name, value);
            }
        }
    }

    /// Adds the XSRF header when `url` is same-origin with `origin` and the
    /// XSRF cookie exists.
    ///
    /// `cookie_name` and `header_name` override the configured names. A
    /// header already set by the caller is kept. Returns `true` when the header
    /// was written.
    pub fn apply_xsrf(
        &self,
        headers: &mut RequestHeaders,
        url: &str,
        origin: &DocumentOrigin,
        cookies: &dyn CookieStore,
        cookie_name: Option<&str>,
        header_name: Option<&str>,
    ) -> bool {
        if !origin.is_same_origin(url) {
            return false;
        }

        let header_name = header_name.unwrap_or(&self.xsrf_header_name);
        if headers.contains(header_name) {
            return false;
        }

        let cookie_name = cookie_name.unwrap_or(&self.xsrf_cookie_name);
        match cookies.get(cookie_name) {
            Some(token) => {
                headers.insert(header_name, token);
                true
            }
            None => false,
        }
    }
}
