//! Authentication module for managing sessions and credentials.
//!
//! This module provides:
//! - `Authenticator`: obtains a validated `Session`, logging in through the
//!   delegated OAuth flow or the site's own login form
//! - `SessionStore`: one persisted session per identity, keyed by a hash
//! - `CookieJar`: the session's cookies in a form that round-trips to disk
//! - `CredentialStore`: secure OS-level credential storage via keyring
//!
//! Sessions expire after 6 hours and are probed before every reuse.

pub mod authenticator;
pub mod cookies;
pub mod credentials;
pub mod error;
pub mod login;
pub mod session;
pub mod store;

pub use authenticator::{AuthOptions, Authenticator, SessionProvider};
pub use cookies::{CookieJar, StoredCookie};
pub use credentials::{Credential, CredentialStore};
pub use error::AuthError;
pub use session::{PersistedSession, Session};
pub use store::SessionStore;
