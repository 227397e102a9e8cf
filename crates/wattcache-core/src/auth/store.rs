use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

use super::credentials::identity_hash;
use super::session::{PersistedSession, Session, SESSION_FORMAT_VERSION};

/// One JSON file per identity, named by the identity hash.
pub struct SessionStore {
    session_dir: PathBuf,
}

impl SessionStore {
    pub fn new(session_dir: PathBuf) -> Self {
        Self { session_dir }
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Load the persisted session for an identity.
    /// A missing, corrupt or foreign-version file is a miss, not an error.
    pub fn load(&self, identity: &str) -> Option<PersistedSession> {
        let hash = identity_hash(identity);
        let path = self.path_for_hash(&hash);
        if !path.exists() {
            debug!(identity = %hash, "No persisted session");
            return None;
        }

        match Self::read(&path) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(identity = %hash, error = %e, "Ignoring unreadable session file");
                None
            }
        }
    }

    /// Persist a session under its identity hash
    pub fn save(&self, session: &Session) -> Result<()> {
        let path = self.path_for_hash(session.identity_hash());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&session.to_persisted())?;
        std::fs::write(&path, contents).context("Failed to write session file")?;
        debug!(identity = %session.identity_hash(), "Session saved");
        Ok(())
    }

    /// Remove the persisted session, if any
    pub fn delete(&self, identity: &str) -> Result<()> {
        let path = self.path_for_hash(&identity_hash(identity));
        if path.exists() {
            std::fs::remove_file(&path).context("Failed to delete session file")?;
        }
        Ok(())
    }

    fn read(path: &Path) -> Result<PersistedSession> {
        let contents = std::fs::read_to_string(path).context("Failed to read session file")?;
        let session: PersistedSession =
            serde_json::from_str(&contents).context("Failed to parse session file")?;
        if session.version != SESSION_FORMAT_VERSION {
            bail!("Unsupported session format version {}", session.version);
        }
        Ok(session)
    }

    fn path_for_hash(&self, hash: &str) -> PathBuf {
        self.session_dir.join(format!("session_{}.json", hash))
    }
}
