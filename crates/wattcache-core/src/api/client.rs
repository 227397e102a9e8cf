//! Request dispatcher for ZwiftPower.
//!
//! Every request goes through the same pipeline: cache lookup, rate limiting,
//! session acquisition, the HTTP call, body decoding and cache write-through.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::auth::authenticator::parse_origin;
use crate::auth::SessionProvider;
use crate::cache::{CacheManager, CacheStats, Params};
use crate::rate_limit::RateLimiter;

use super::error::DispatchError;
use super::outcome::{HttpMethod, RequestOptions, RequestOutcome};

/// HTTP request timeout in seconds.
/// Some cache3.php payloads are large and slow to generate.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Content type recorded for bodies that decoded as JSON
const JSON_CONTENT_TYPE: &str = "json";

/// Assumed when a non-JSON response omits its Content-Type
const FALLBACK_CONTENT_TYPE: &str = "text/html";

pub struct ApiClient {
    base_url: Url,
    sessions: Arc<dyn SessionProvider>,
    cache: CacheManager,
    limiter: RateLimiter,
    timeout: Duration,
    caching: bool,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        sessions: Arc<dyn SessionProvider>,
        cache: CacheManager,
        limiter: RateLimiter,
    ) -> Result<Self> {
        let base_url =
            parse_origin(base_url).with_context(|| format!("Invalid base URL: {}", base_url))?;
        Ok(Self {
            base_url,
            sessions,
            cache,
            limiter,
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            caching: true,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Turn the response cache off entirely, whatever callers ask for
    pub fn with_caching(mut self, caching: bool) -> Self {
        self.caching = caching;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Run one request through the pipeline. Never fails: every problem is
    /// reported inside the returned outcome.
    pub async fn dispatch(
        &self,
        endpoint: &str,
        params: &Params,
        method: HttpMethod,
        options: RequestOptions,
    ) -> RequestOutcome {
        let use_cache = options.use_cache && self.caching;
        let entry_name = cache_name(endpoint, method);

        if use_cache {
            if let Some(entry) = self.cache.get_entry(&entry_name, params, options.cache_ttl) {
                debug!(endpoint, "Serving from cache");
                let content_type = entry.content_type().map(str::to_string);
                return RequestOutcome::from_cache(entry.data, content_type);
            }
        }

        self.limiter.throttle().await;

        let session = match self.sessions.get_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!(endpoint, error = %e, "No session available");
                return RequestOutcome::failure(DispatchError::Auth(e));
            }
        };

        let url = match self.base_url.join(endpoint) {
            Ok(url) => url,
            Err(e) => {
                return RequestOutcome::failure(DispatchError::Transport(format!(
                    "invalid endpoint {}: {}",
                    endpoint, e
                )))
            }
        };

        debug!(endpoint, method = %method, "Sending request");
        let request = match method {
            HttpMethod::Get => session.client().get(url).query(params),
            HttpMethod::Post => session.client().post(url).form(params),
        };

        let response = match request.timeout(self.timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(endpoint, error = %e, "Request failed");
                return RequestOutcome::failure(DispatchError::from_transport(&e));
            }
        };

        let status = response.status();
        let declared_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(endpoint, error = %e, "Failed to read response body");
                return RequestOutcome::failure(DispatchError::from_transport(&e));
            }
        };

        if !(status.is_success() || status.is_redirection()) {
            warn!(endpoint, status = status.as_u16(), "Request returned error status");
            return RequestOutcome::failure(DispatchError::from_status(status, &body));
        }

        let (data, content_type) = decode_body(body, declared_type);

        if status == reqwest::StatusCode::OK && use_cache && !is_empty_payload(&data) {
            let mut metadata = Map::new();
            metadata.insert("status_code".to_string(), json!(status.as_u16()));
            metadata.insert("content_type".to_string(), json!(content_type));
            self.cache.set(&entry_name, params, data.clone(), metadata);
        }

        RequestOutcome::from_network(data, status.as_u16(), content_type)
    }

    pub async fn get(&self, endpoint: &str, params: &Params, options: RequestOptions) -> RequestOutcome {
        self.dispatch(endpoint, params, HttpMethod::Get, options).await
    }

    pub async fn post(&self, endpoint: &str, params: &Params, options: RequestOptions) -> RequestOutcome {
        self.dispatch(endpoint, params, HttpMethod::Post, options).await
    }

    /// Drop the cached GET response for one endpoint, or everything when no
    /// endpoint is given.
    pub fn clear_cache(&self, endpoint: Option<&str>, params: &Params) -> bool {
        match endpoint {
            Some(endpoint) => self
                .cache
                .invalidate(&cache_name(endpoint, HttpMethod::Get), params),
            None => self.cache.clear_all(),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

/// Name responses are cached under. The same endpoint fetched with GET and
/// with POST are different resources.
pub fn cache_name(endpoint: &str, method: HttpMethod) -> String {
    format!("{}_{}", endpoint, method)
}

/// JSON when the body parses as JSON, otherwise the raw text tagged with the
/// server's declared content type.
fn decode_body(body: String, declared_type: Option<String>) -> (Value, String) {
    match serde_json::from_str::<Value>(&body) {
        Ok(value) => (value, JSON_CONTENT_TYPE.to_string()),
        Err(_) => (
            Value::String(body),
            declared_type.unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string()),
        ),
    }
}

/// Payloads not worth caching
fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_json_body() {
        let (data, content_type) = decode_body(r#"{"data": [1, 2]}"#.to_string(), None);
        assert_eq!(data, json!({"data": [1, 2]}));
        assert_eq!(content_type, "json");
    }

    #[test]
    fn test_decode_text_keeps_declared_type() {
        let (data, content_type) = decode_body(
            "<html>hi</html>".to_string(),
            Some("text/html; charset=UTF-8".to_string()),
        );
        assert_eq!(data, Value::String("<html>hi</html>".to_string()));
        assert_eq!(content_type, "text/html; charset=UTF-8");
    }

    #[test]
    fn test_decode_text_without_declared_type() {
        let (_, content_type) = decode_body("plain".to_string(), None);
        assert_eq!(content_type, "text/html");
    }

    #[test]
    fn test_empty_payloads() {
        assert!(is_empty_payload(&Value::Null));
        assert!(is_empty_payload(&json!("")));
        assert!(is_empty_payload(&json!([])));
        assert!(is_empty_payload(&json!({})));
        assert!(!is_empty_payload(&json!(0)));
        assert!(!is_empty_payload(&json!(false)));
        assert!(!is_empty_payload(&json!({"data": []})));
    }

    #[test]
    fn test_cache_name_includes_method() {
        assert_eq!(cache_name("api3.php", HttpMethod::Get), "api3.php_GET");
        assert_eq!(cache_name("api3.php", HttpMethod::Post), "api3.php_POST");
    }
}
