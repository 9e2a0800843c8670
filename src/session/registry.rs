//! Session registry: loads artifacts and owns every live session.

use super::aliases::AliasStore;
use super::types::{Session, SessionInfo, SessionStatus};
use crate::cache::{cache_key, hash_artifact, DecompileSettings, DiskCache};
use crate::engine::{EngineFactory, EngineWorker};
use crate::error::QueryError;
use crate::expand_path;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default per-session request queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Registry of loaded sessions.
///
/// One instance is created at startup and handed to every transport.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    cache: Arc<DiskCache>,
    alias_dir: PathBuf,
    factory: Arc<dyn EngineFactory>,
    queue_capacity: usize,
}

impl SessionRegistry {
    pub fn new(
        cache: DiskCache,
        alias_dir: impl Into<PathBuf>,
        factory: Arc<dyn EngineFactory>,
        queue_capacity: usize,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            cache: Arc::new(cache),
            alias_dir: alias_dir.into(),
            factory,
            queue_capacity,
        }
    }

    pub fn cache(&self) -> &DiskCache {
        &self.cache
    }

    pub fn backend_name(&self) -> &'static str {
        self.factory.name()
    }

    /// Load an artifact into a new session.
    pub async fn load(
        &self,
        path: &str,
        settings: DecompileSettings,
    ) -> Result<Arc<Session>, QueryError> {
        let artifact_path = expand_path(path);
        let meta = tokio::fs::metadata(&artifact_path)
            .await
            .map_err(|e| QueryError::load_failed(path, e))?;
        if !meta.is_file() {
            return Err(QueryError::load_failed(path, "not a regular file"));
        }

        let hash_path = artifact_path.clone();
        let artifact_hash = tokio::task::spawn_blocking(move || hash_artifact(&hash_path))
            .await
            .map_err(|e| QueryError::Internal(format!("hash task failed: {e}")))?
            .map_err(|e| QueryError::load_failed(path, e))?;

        let session_id = Uuid::new_v4().to_string();
        info!(
            session_id = %session_id,
            path = %artifact_path.display(),
            hash = %artifact_hash,
            "Loading artifact"
        );

        let (worker, engine) = EngineWorker::spawn(
            &session_id,
            self.factory.clone(),
            artifact_path.clone(),
            settings.clone(),
            self.queue_capacity,
        )
        .await?;

        let key = cache_key(&artifact_hash, &engine.version, &settings);
        let alias_path = self.alias_dir.join(format!("{session_id}.sqlite3"));
        let aliases = match AliasStore::open(alias_path) {
            Ok(store) => store,
            Err(e) => {
                worker.shutdown().await;
                return Err(e);
            }
        };

        let session = Arc::new(Session::new(
            session_id.clone(),
            artifact_path,
            artifact_hash,
            settings,
            engine,
            key,
            self.cache.clone(),
            worker,
            aliases,
        ));
        debug!(session_id = %session_id, status = %session.status(), "Session created");

        session.set_status(SessionStatus::Active);
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), session.clone());

        info!(
            session_id = %session_id,
            classes = session.class_count,
            version = %session.engine_version,
            cache_key = %session.cache_key,
            "Session active"
        );
        Ok(session)
    }

    /// Look up a session and record the access.
    pub async fn get(&self, id: &str) -> Result<Arc<Session>, QueryError> {
        let session = self
            .sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| QueryError::SessionNotFound(id.to_string()))?;
        session.touch();
        Ok(session)
    }

    /// Close a session. Returns whether it was registered; closing twice is a no-op.
    ///
    /// The entry is removed before teardown, so concurrent lookups either miss or
    /// hold a session whose engine is still intact. Teardown runs on its own task
    /// and finishes even if the caller stops waiting for it.
    pub async fn close(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id);
        let Some(session) = removed else {
            debug!(session_id = %id, "Close on unknown session");
            return false;
        };

        session.set_status(SessionStatus::Closed);
        if let Err(e) = tokio::spawn(teardown(session)).await {
            warn!(session_id = %id, error = %e, "Session teardown task failed");
        }
        true
    }

    /// Close every registered session. Used once at shutdown.
    pub async fn close_all(&self) {
        let ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        if !ids.is_empty() {
            info!(count = ids.len(), "Closing all sessions");
        }
        for id in ids {
            self.close(&id).await;
        }
    }

    /// Snapshot of every live session, oldest first.
    pub async fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .read()
            .await
            .values()
            .map(|s| s.info())
            .collect();
        infos.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        infos
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Stop the engine thread, then drop the alias database.
async fn teardown(session: Arc<Session>) {
    session.shutdown().await;
    let id = session.id.clone();
    let store = session.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || store.aliases.release()).await {
        warn!(session_id = %id, error = %e, "Failed to release alias store");
    }
    info!(session_id = %id, "Session closed");
}
