//! wattcache core library.
//!
//! An authenticated, rate-limited, cached request pipeline for ZwiftPower:
//! session management with cookie persistence, a disk-backed response cache
//! with per-read TTLs, request spacing, and a dispatcher that reports every
//! result as a structured outcome.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod endpoints;
pub mod rate_limit;

pub use api::{ApiClient, DispatchError, HttpMethod, RequestOptions, RequestOutcome};
pub use auth::{AuthError, Authenticator, Credential, CredentialStore, SessionProvider};
pub use cache::{params, CacheManager, Params};
pub use config::Config;
pub use endpoints::{PowerApi, ProfileApi, RankingsApi};
pub use rate_limit::RateLimiter;
