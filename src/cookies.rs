//! Cookies: the [`CookieStore`] read by the XSRF policy, and
//! [`DocumentCookieJar`], an in-memory store fed from response headers.

mod cookie;
mod cookie_jar;
mod store;

pub use cookie::Cookie;
pub use cookie_jar::DocumentCookieJar;
pub use store::{CookieStore, CookieStoreHandle, NoCookies};
