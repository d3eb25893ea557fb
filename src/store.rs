//! Persistent state store.
//!
//! The engine round-trips the entire [`AutomationState`] document through a
//! [`StateStore`] on every tick — the store is the only place state crosses
//! a process restart. [`JsonFileStore`] is the durable implementation;
//! [`MemoryStore`] backs the demo command and tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StoreError;
use crate::model::AutomationState;

/// Durable, asynchronous document store for the automation state.
pub trait StateStore {
    /// Load the current document, or `None` when no run has been persisted.
    async fn load(&self) -> Result<Option<AutomationState>, StoreError>;

    async fn save(&self, state: &AutomationState) -> Result<(), StoreError>;
}

/// JSON document on disk. Writes go through a sibling temp file and an
/// atomic rename so a crash mid-write never corrupts the last good state.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl StateStore for JsonFileStore {
    async fn load(&self) -> Result<Option<AutomationState>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e)),
        };
        let state = serde_json::from_slice(&bytes)?;
        Ok(Some(state))
    }

    async fn save(&self, state: &AutomationState) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// In-memory store for the demo command and tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Option<AutomationState>>,
}

impl MemoryStore {
    pub fn new(state: AutomationState) -> Self {
        Self {
            inner: Mutex::new(Some(state)),
        }
    }
}

impl StateStore for MemoryStore {
    async fn load(&self) -> Result<Option<AutomationState>, StoreError> {
        Ok(self.inner.lock().expect("store poisoned").clone())
    }

    async fn save(&self, state: &AutomationState) -> Result<(), StoreError> {
        *self.inner.lock().expect("store poisoned") = Some(state.clone());
        Ok(())
    }
}
