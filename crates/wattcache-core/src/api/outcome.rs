use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};
use serde_json::Value;

use super::error::DispatchError;
use crate::cache::manager::DEFAULT_TTL_SECS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    pub use_cache: bool,
    /// How old a cached response may be for this call
    pub cache_ttl: Duration,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            cache_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }
}

impl RequestOptions {
    pub fn with_ttl_secs(secs: u64) -> Self {
        Self {
            use_cache: true,
            cache_ttl: Duration::from_secs(secs),
        }
    }

    pub fn no_cache() -> Self {
        Self {
            use_cache: false,
            ..Self::default()
        }
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }
}

/// Result of one dispatch. Holds either data or an error, never both.
///
/// Serializes to the envelope callers branch on:
/// `{data?, error?, status_code?, cached, content_type?}`.
#[derive(Debug)]
pub struct RequestOutcome {
    result: Result<Value, DispatchError>,
    pub status_code: Option<u16>,
    pub cached: bool,
    pub content_type: Option<String>,
}

impl RequestOutcome {
    pub fn from_network(data: Value, status_code: u16, content_type: String) -> Self {
        Self {
            result: Ok(data),
            status_code: Some(status_code),
            cached: false,
            content_type: Some(content_type),
        }
    }

    pub fn from_cache(data: Value, content_type: Option<String>) -> Self {
        Self {
            result: Ok(data),
            status_code: Some(200),
            cached: true,
            content_type,
        }
    }

    pub fn failure(error: DispatchError) -> Self {
        Self {
            status_code: error.status_code(),
            result: Err(error),
            cached: false,
            content_type: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn data(&self) -> Option<&Value> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&DispatchError> {
        self.result.as_ref().err()
    }

    pub fn into_result(self) -> Result<Value, DispatchError> {
        self.result
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_code: Option<u16>,
    cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<&'a str>,
}

impl Serialize for RequestOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Envelope {
            data: self.data(),
            error: self.error().map(ToString::to_string),
            status_code: self.status_code,
            cached: self.cached,
            content_type: self.content_type.as_deref(),
        }
        .serialize(serializer)
    }
}
