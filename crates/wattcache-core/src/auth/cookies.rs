//! Cookie jar with an explicit, serializable representation.
//!
//! Implements `reqwest::cookie::CookieStore` so a `reqwest::Client` can use
//! it directly, while every cookie keeps its domain, path and expiry so the
//! jar survives a save/load cycle intact.

use chrono::{DateTime, Duration, Utc};
use cookie::Cookie;
use parking_lot::RwLock;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    /// Set when the cookie had no Domain attribute: it only matches the exact host
    #[serde(default)]
    pub host_only: bool,
}

impl StoredCookie {
    pub fn is_expired(&self) -> bool {
        self.expires.is_some_and(|at| at <= Utc::now())
    }

    fn same_slot(&self, other: &StoredCookie) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }

    fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        if !domain_matches(&host, &self.domain, self.host_only) {
            return false;
        }
        if self.secure && url.scheme() != "https" {
            return false;
        }
        path_matches(url.path(), &self.path)
    }

    /// Build a cookie from a `Set-Cookie` header value received from `url`.
    /// Returns `None` for unparseable headers or a Domain the host may not set.
    fn from_set_cookie(header: &str, url: &Url) -> Option<Self> {
        let parsed = Cookie::parse(header.to_string()).ok()?;
        let host = url.host_str()?.to_ascii_lowercase();

        let (domain, host_only) = match parsed.domain() {
            Some(domain) if !domain.is_empty() => {
                let domain = domain.trim_start_matches('.').to_ascii_lowercase();
                if !domain_matches(&host, &domain, false) {
                    debug!(cookie = parsed.name(), "Rejecting cookie for foreign domain");
                    return None;
                }
                (domain, false)
            }
            _ => (host, true),
        };

        let path = match parsed.path() {
            Some(path) if path.starts_with('/') => path.to_string(),
            _ => default_path(url.path()),
        };

        // Max-Age wins over Expires. A lifetime past chrono's range never expires.
        let expires = if let Some(max_age) = parsed.max_age() {
            Duration::try_seconds(max_age.whole_seconds())
                .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        } else {
            parsed
                .expires_datetime()
                .and_then(|at| DateTime::from_timestamp(at.unix_timestamp(), 0))
        };

        Some(Self {
            name: parsed.name().to_string(),
            value: parsed.value().to_string(),
            domain,
            path,
            expires,
            secure: parsed.secure().unwrap_or(false),
            http_only: parsed.http_only().unwrap_or(false),
            host_only,
        })
    }
}

pub(crate) fn domain_matches(host: &str, domain: &str, host_only: bool) -> bool {
    if host == domain {
        return true;
    }
    !host_only && host.ends_with(domain) && host[..host.len() - domain.len()].ends_with('.')
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

/// Default cookie path: the request path up to, not including, its last '/'
fn default_path(request_path: &str) -> String {
    if !request_path.starts_with('/') {
        return "/".to_string();
    }
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => request_path[..idx].to_string(),
    }
}

#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: RwLock<Vec<StoredCookie>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a jar from persisted cookies, dropping any that have expired
    pub fn from_cookies(cookies: Vec<StoredCookie>) -> Self {
        let live = cookies.into_iter().filter(|c| !c.is_expired()).collect();
        Self {
            cookies: RwLock::new(live),
        }
    }

    /// Copy of the current, unexpired cookies
    pub fn snapshot(&self) -> Vec<StoredCookie> {
        self.cookies
            .read()
            .iter()
            .filter(|c| !c.is_expired())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.cookies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.read().is_empty()
    }

    pub fn clear(&self) {
        self.cookies.write().clear();
    }

    fn insert(&self, cookie: StoredCookie) {
        let mut cookies = self.cookies.write();
        cookies.retain(|existing| !existing.same_slot(&cookie));
        // An already-expired cookie is the server's way of deleting it
        if !cookie.is_expired() {
            cookies.push(cookie);
        }
    }

    /// `Cookie` header value for a request to `url`
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let cookies = self.cookies.read();
        let mut matching: Vec<&StoredCookie> = cookies
            .iter()
            .filter(|c| !c.is_expired() && c.matches(url))
            .collect();
        if matching.is_empty() {
            return None;
        }
        // Longer paths first
        matching.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        Some(
            matching
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

impl reqwest::cookie::CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        for header in cookie_headers {
            let Ok(raw) = header.to_str() else {
                continue;
            };
            if let Some(cookie) = StoredCookie::from_set_cookie(raw, url) {
                self.insert(cookie);
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.header_for(url)
            .and_then(|value| HeaderValue::from_str(&value).ok())
    }
}
