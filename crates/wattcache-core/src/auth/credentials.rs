use std::fmt;

use anyhow::{Context, Result};
use keyring::Entry;
use sha2::{Digest, Sha256};

const SERVICE_NAME: &str = "wattcache";

/// Environment variable holding the login identity (email)
pub const IDENTITY_ENV: &str = "ZWIFT_EMAIL";

/// Environment variable holding the login secret (password)
pub const SECRET_ENV: &str = "ZWIFT_PASSWORD";

/// Number of hex characters of the identity digest used as a file key
const IDENTITY_HASH_LEN: usize = 16;

/// Login pair for the remote site.
///
/// The secret never appears in `Debug` output, and log lines refer to the
/// identity only through [`Credential::identity_hash`].
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    identity: String,
    secret: String,
}

impl Credential {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
        }
    }

    /// Build a credential from `ZWIFT_EMAIL` / `ZWIFT_PASSWORD`.
    /// Returns `None` unless both are set and non-empty.
    pub fn from_env() -> Option<Self> {
        let identity = std::env::var(IDENTITY_ENV).ok().filter(|s| !s.is_empty())?;
        let secret = std::env::var(SECRET_ENV).ok().filter(|s| !s.is_empty())?;
        Some(Self::new(identity, secret))
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn is_complete(&self) -> bool {
        !self.identity.is_empty() && !self.secret.is_empty()
    }

    pub fn identity_hash(&self) -> String {
        identity_hash(&self.identity)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identity", &self.identity_hash())
            .field("secret", &"[MASKED]")
            .finish()
    }
}

/// Stable short digest of an identity, used to name persisted session files
pub fn identity_hash(identity: &str) -> String {
    let digest = Sha256::digest(identity.as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(IDENTITY_HASH_LEN);
    hash
}

pub struct CredentialStore;

impl CredentialStore {
    /// Store the secret for an identity in the OS keychain
    pub fn store(credential: &Credential) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, credential.identity())
            .context("Failed to create keyring entry")?;
        entry
            .set_password(credential.secret())
            .context("Failed to store password in keychain")?;
        Ok(())
    }

    /// Retrieve a full credential for an identity from the OS keychain
    pub fn load(identity: &str) -> Result<Credential> {
        let entry = Entry::new(SERVICE_NAME, identity)
            .context("Failed to create keyring entry")?;
        let secret = entry
            .get_password()
            .context("Failed to retrieve password from keychain")?;
        Ok(Credential::new(identity, secret))
    }

    /// Delete stored credentials for an identity
    pub fn delete(identity: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, identity)
            .context("Failed to create keyring entry")?;
        entry
            .delete_credential()
            .context("Failed to delete credential from keychain")?;
        Ok(())
    }

    /// Check if credentials exist for an identity
    pub fn has_credentials(identity: &str) -> bool {
        if let Ok(entry) = Entry::new(SERVICE_NAME, identity) {
            entry.get_password().is_ok()
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_masks_secret() {
        let credential = Credential::new("rider@example.com", "hunter2");
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("rider@example.com"));
        assert!(debug.contains("[MASKED]"));
    }

    #[test]
    fn test_identity_hash_is_stable_and_short() {
        let a = identity_hash("rider@example.com");
        let b = identity_hash("rider@example.com");
        assert_eq!(a, b);
        assert_eq!(a.len(), IDENTITY_HASH_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, identity_hash("other@example.com"));
    }

    #[test]
    fn test_is_complete() {
        assert!(Credential::new("a", "b").is_complete());
        assert!(!Credential::new("", "b").is_complete());
        assert!(!Credential::new("a", "").is_complete());
    }
}
