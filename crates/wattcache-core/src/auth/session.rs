use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::cookies::{CookieJar, StoredCookie};

/// Session expiry window in seconds.
/// ZwiftPower logins stay usable for roughly six hours.
pub const SESSION_EXPIRY_SECS: i64 = 21_600;

/// Current on-disk session format
pub(crate) const SESSION_FORMAT_VERSION: u32 = 1;

/// An authenticated HTTP context: a cookie jar plus a client that uses it.
///
/// Clone is cheap. The jar and `reqwest::Client` are both reference counted,
/// so the dispatcher borrows a clone per request while the authenticator keeps
/// ownership of the session's lifecycle.
#[derive(Debug, Clone)]
pub struct Session {
    identity_hash: String,
    created_at: DateTime<Utc>,
    jar: Arc<CookieJar>,
    client: Client,
}

impl Session {
    pub fn new(
        identity_hash: String,
        created_at: DateTime<Utc>,
        jar: Arc<CookieJar>,
        client: Client,
    ) -> Self {
        Self {
            identity_hash,
            created_at,
            jar,
            client,
        }
    }

    pub fn identity_hash(&self) -> &str {
        &self.identity_hash
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn cookie_jar(&self) -> &Arc<CookieJar> {
        &self.jar
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.created_at
    }

    pub fn is_expired(&self, expiry: Duration) -> bool {
        self.age() > expiry
    }

    pub fn to_persisted(&self) -> PersistedSession {
        PersistedSession {
            version: SESSION_FORMAT_VERSION,
            created_at: self.created_at,
            cookies: self.jar.snapshot(),
        }
    }
}

/// Serializable form of a [`Session`]: the cookie jar and its login time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    #[serde(default = "default_version")]
    pub version: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub cookies: Vec<StoredCookie>,
}

fn default_version() -> u32 {
    SESSION_FORMAT_VERSION
}

impl PersistedSession {
    pub fn age(&self) -> Duration {
        Utc::now() - self.created_at
    }

    pub fn is_expired(&self, expiry: Duration) -> bool {
        self.age() > expiry
    }
}
