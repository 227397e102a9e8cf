use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Request parameters. Ordered, so equal sets always serialize identically.
pub type Params = BTreeMap<String, String>;

/// Build [`Params`] from any sequence of key/value pairs
pub fn params<I, K, V>(pairs: I) -> Params
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[derive(Serialize)]
struct Canonical<'a> {
    endpoint: &'a str,
    params: &'a Params,
}

/// Hex SHA-256 of `{"endpoint":..,"params":{..}}` with params sorted by key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(endpoint: &str, params: &Params) -> Self {
        let canonical = Canonical { endpoint, params };
        let json = serde_json::to_vec(&canonical).unwrap_or_default();
        Self(hex::encode(Sha256::digest(&json)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
