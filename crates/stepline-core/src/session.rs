//! Session/position state.
//!
//! A session is the checkpoint steps are appended to plus the next free
//! position in it. Positions only move forward after the service confirmed
//! a step, so re-running after a failure continues where the last confirmed
//! step left off.

use crate::CoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// The checkpoint and the next position to write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub checkpoint_id: i64,
    /// 1-based
    pub next_position: u32,
}

impl SessionState {
    pub fn new(checkpoint_id: i64, next_position: u32) -> Self {
        Self {
            checkpoint_id,
            next_position: next_position.max(1),
        }
    }

    /// A fresh session at position 1.
    pub fn start(checkpoint_id: i64) -> Self {
        Self::new(checkpoint_id, 1)
    }
}

/// Persistence for the session record
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the stored session, if any
    async fn load(&self) -> Result<Option<SessionState>, CoreError>;

    /// Overwrite the stored session
    async fn save(&self, state: &SessionState) -> Result<(), CoreError>;

    /// Remove the stored session
    async fn clear(&self) -> Result<(), CoreError>;
}

/// JSON file store, `~/.stepline/session.json` by default.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The default location under the user's home directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".stepline").join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Result<Option<SessionState>, CoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => {
                let state = serde_json::from_str(&text).map_err(|e| {
                    CoreError::SessionStoreError(format!("{} is corrupt: {}", self.path.display(), e))
                })?;
                debug!("Loaded session from {}", self.path.display());
                Ok(Some(state))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, state: &SessionState) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Replace atomically: write a sibling file, then rename it over the record
        let temp = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp, serde_json::to_vec_pretty(state)?).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Where a run reads and writes its position.
pub enum SessionContext {
    /// Backed by a store; every confirmed step is saved.
    Persistent {
        store: Arc<dyn SessionStore>,
        state: SessionState,
    },
    /// An explicit checkpoint for this run only. The stored session is
    /// never touched.
    Detached { state: SessionState },
}

impl SessionContext {
    /// Loads the stored session.
    pub async fn resume(store: Arc<dyn SessionStore>) -> Result<Self, CoreError> {
        let state = store.load().await?.ok_or_else(|| {
            CoreError::NoSession("set one with 'stepline session set <checkpoint>' or pass --checkpoint".into())
        })?;
        info!(
            checkpoint_id = state.checkpoint_id,
            next_position = state.next_position,
            "Resuming session"
        );
        Ok(SessionContext::Persistent { store, state })
    }

    pub fn persistent(store: Arc<dyn SessionStore>, state: SessionState) -> Self {
        SessionContext::Persistent { store, state }
    }

    pub fn detached(state: SessionState) -> Self {
        SessionContext::Detached { state }
    }

    pub fn state(&self) -> SessionState {
        match self {
            SessionContext::Persistent { state, .. } | SessionContext::Detached { state } => *state,
        }
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self, SessionContext::Persistent { .. })
    }

    /// Moves past a confirmed step and persists the new position.
    ///
    /// The local position advances even if saving fails, since the remote
    /// step exists either way.
    pub(crate) async fn advance(&mut self) -> Result<(), CoreError> {
        match self {
            SessionContext::Persistent { store, state } => {
                state.next_position += 1;
                store.save(state).await
            }
            SessionContext::Detached { state } => {
                state.next_position += 1;
                Ok(())
            }
        }
    }
}

/// Memory implementation for testing
#[cfg(feature = "testing")]
pub mod memory {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory session store that counts saves and can be told to fail.
    #[derive(Default)]
    pub struct MemorySessionStore {
        state: Mutex<Option<SessionState>>,
        saves: AtomicUsize,
        fail_saves: AtomicBool,
    }

    impl MemorySessionStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_state(state: SessionState) -> Self {
            let store = Self::default();
            if let Ok(mut slot) = store.state.lock() {
                *slot = Some(state);
            }
            store
        }

        /// Current stored value, bypassing the async trait
        pub fn current(&self) -> Option<SessionState> {
            self.state.lock().ok().and_then(|s| *s)
        }

        pub fn save_count(&self) -> usize {
            self.saves.load(Ordering::SeqCst)
        }

        pub fn set_fail_saves(&self, fail: bool) {
            self.fail_saves.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl SessionStore for MemorySessionStore {
        async fn load(&self) -> Result<Option<SessionState>, CoreError> {
            Ok(self.current())
        }

        async fn save(&self, state: &SessionState) -> Result<(), CoreError> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(CoreError::SessionStoreError("save rejected".into()));
            }
            let mut slot = self
                .state
                .lock()
                .map_err(|_| CoreError::SessionStoreError("lock poisoned".into()))?;
            *slot = Some(*state);
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn clear(&self) -> Result<(), CoreError> {
            let mut slot = self
                .state
                .lock()
                .map_err(|_| CoreError::SessionStoreError("lock poisoned".into()))?;
            *slot = None;
            Ok(())
        }
    }
}
