//! Local response cache.
//!
//! This module provides the `CacheManager` for storing API responses on
//! disk, one JSON file per request. Files are addressed by a `CacheKey`, a
//! digest of the endpoint plus its sorted parameters.
//!
//! Entries only record when they were written. Each reader passes its own
//! TTL, so one entry can be stale for one caller and fresh for another.

pub mod key;
pub mod manager;

pub use key::{params, CacheKey, Params};
pub use manager::{CacheEntry, CacheError, CacheManager, CacheStats};
