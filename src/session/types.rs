//! Session and session info types.

use super::aliases::AliasStore;
use crate::cache::{DecompileSettings, DiskCache};
use crate::engine::{Engine, EngineWorker};
use crate::error::QueryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// Status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Resources allocated, not yet registered.
    Created,
    /// Registered and accepting queries.
    Active,
    /// Removed from the registry; terminal.
    Closed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Created => write!(f, "created"),
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Where a result came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub backend: String,
    pub backend_version: String,
    pub settings: DecompileSettings,
}

/// Information about a session (serializable for API responses).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub artifact_path: String,
    pub artifact_hash: String,
    pub input_type: String,
    pub class_count: usize,
    pub cache_key: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub provenance: Provenance,
}

/// One loaded artifact bound to its engine worker, cache namespace and alias overlay.
pub struct Session {
    pub id: String,
    pub artifact_path: PathBuf,
    pub artifact_hash: String,
    pub input_type: String,
    pub class_count: usize,
    pub settings: DecompileSettings,
    pub backend: String,
    pub engine_version: String,
    pub cache_key: String,
    pub cache: Arc<DiskCache>,
    pub aliases: AliasStore,
    pub created_at: DateTime<Utc>,
    worker: EngineWorker,
    last_accessed: Mutex<DateTime<Utc>>,
    status: Mutex<SessionStatus>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: String,
        artifact_path: PathBuf,
        artifact_hash: String,
        settings: DecompileSettings,
        engine: crate::engine::EngineInfo,
        cache_key: String,
        cache: Arc<DiskCache>,
        worker: EngineWorker,
        aliases: AliasStore,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            artifact_path,
            artifact_hash,
            input_type: engine.input_type,
            class_count: engine.class_count,
            settings,
            backend: engine.backend,
            engine_version: engine.version,
            cache_key,
            cache,
            aliases,
            created_at: now,
            worker,
            last_accessed: Mutex::new(now),
            status: Mutex::new(SessionStatus::Created),
        }
    }

    pub fn status(&self) -> SessionStatus {
        *lock(&self.status)
    }

    pub(crate) fn set_status(&self, status: SessionStatus) {
        *lock(&self.status) = status;
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        *lock(&self.last_accessed)
    }

    /// Record an access. Advisory only; sessions never expire on their own.
    pub(crate) fn touch(&self) {
        *lock(&self.last_accessed) = Utc::now();
    }

    pub fn provenance(&self) -> Provenance {
        Provenance {
            backend: self.backend.clone(),
            backend_version: self.engine_version.clone(),
            settings: self.settings.clone(),
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id.clone(),
            artifact_path: self.artifact_path.display().to_string(),
            artifact_hash: self.artifact_hash.clone(),
            input_type: self.input_type.clone(),
            class_count: self.class_count,
            cache_key: self.cache_key.clone(),
            status: self.status(),
            created_at: self.created_at,
            last_accessed: self.last_accessed(),
            provenance: self.provenance(),
        }
    }

    /// Run `f` on this session's engine thread, after every job queued before it.
    pub async fn run<T, F>(&self, f: F) -> Result<T, QueryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn Engine) -> Result<T, QueryError> + Send + 'static,
    {
        self.worker.run(f).await
    }

    pub(crate) async fn shutdown(&self) {
        self.worker.shutdown().await;
    }
}
