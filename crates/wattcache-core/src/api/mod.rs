//! Request dispatch for ZwiftPower.
//!
//! `ApiClient` runs each call through cache, rate limiter and session
//! provider, and reports the result as a `RequestOutcome` instead of
//! failing. Both api3.php and cache3.php are served by the site's PHP
//! backend behind the same login cookies.

pub mod batch;
pub mod client;
pub mod error;
pub mod outcome;

pub use batch::run_batch;
pub use client::{cache_name, ApiClient};
pub use error::DispatchError;
pub use outcome::{HttpMethod, RequestOptions, RequestOutcome};
