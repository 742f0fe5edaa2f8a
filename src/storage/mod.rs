//! Persisted conversation state
//!
//! The whole [`StoreState`] is stored as JSON under a single key of an
//! embedded `sled` database.

use crate::config::StorageConfig;
use crate::error::{ChatlineError, Result};
use crate::store::StoreState;
use directories::ProjectDirs;
use sled::Db;
use std::path::{Path, PathBuf};

/// Key the state is stored under
pub const STATE_KEY: &str = "chatline-store";

/// Embedded state database
pub struct StateStorage {
    db: Db,
    path: PathBuf,
}

impl StateStorage {
    /// Open or create the database at `path`
    ///
    /// # Errors
    ///
    /// Returns `ChatlineError::Storage` if the database cannot be opened
    ///
    /// # Examples
    ///
    /// ```
    /// use chatline::storage::StateStorage;
    ///
    /// # fn main() -> chatline::error::Result<()> {
    /// let dir = tempfile::tempdir()?;
    /// let storage = StateStorage::open(dir.path().join("state.db"))?;
    /// assert!(storage.load_state()?.is_none());
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ChatlineError::Storage(format!("Failed to create data directory: {}", e))
            })?;
        }

        let db = sled::open(&path)
            .map_err(|e| ChatlineError::Storage(format!("Failed to open database: {}", e)))?;
        tracing::debug!("Opened state database at {}", path.display());
        Ok(Self { db, path })
    }

    /// Open the configured database, or the one in the platform data directory
    ///
    /// # Errors
    ///
    /// Returns `ChatlineError::Storage` if no data directory can be determined
    /// or the database cannot be opened
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match &config.path {
            Some(path) => Self::open(path),
            None => Self::open(default_path()?),
        }
    }

    /// Location of the database
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted state
    ///
    /// # Returns
    ///
    /// Returns `None` if nothing has been saved yet
    ///
    /// # Errors
    ///
    /// Returns `ChatlineError::Storage` if the read or decoding fails
    pub fn load_state(&self) -> Result<Option<StoreState>> {
        match self
            .db
            .get(STATE_KEY)
            .map_err(|e| ChatlineError::Storage(format!("Get failed: {}", e)))?
        {
            Some(bytes) => {
                let state = serde_json::from_slice(&bytes).map_err(|e| {
                    ChatlineError::Storage(format!("Deserialization failed: {}", e))
                })?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// Write the state and flush it to disk
    ///
    /// # Errors
    ///
    /// Returns `ChatlineError::Storage` if encoding, insertion or flushing fails
    pub fn save_state(&self, state: &StoreState) -> Result<()> {
        let value = serde_json::to_vec(state)
            .map_err(|e| ChatlineError::Storage(format!("Serialization failed: {}", e)))?;

        self.db
            .insert(STATE_KEY, value)
            .map_err(|e| ChatlineError::Storage(format!("Insert failed: {}", e)))?;

        self.db
            .flush()
            .map_err(|e| ChatlineError::Storage(format!("Flush failed: {}", e)))?;

        Ok(())
    }
}

/// Default database location in the platform data directory
///
/// # Errors
///
/// Returns `ChatlineError::Storage` if the platform has no data directory
pub fn default_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("com", "chatline", "chatline")
        .ok_or_else(|| ChatlineError::Storage("Could not determine data directory".into()))?;
    Ok(dirs.data_dir().join("state.db"))
}
