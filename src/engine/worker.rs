//! Engine worker handle for async requests.

use super::loop_impl::run_engine_loop;
use super::request::{EngineRequest, Job};
use super::{Engine, EngineFactory, EngineInfo};
use crate::cache::DecompileSettings;
use crate::error::QueryError;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Backoff between enqueue retries while the session queue is full (milliseconds).
const SEND_BACKOFF_MS: u64 = 10;

/// Handle for sending jobs to one session's engine thread.
pub struct EngineWorker {
    session_id: String,
    tx: mpsc::SyncSender<EngineRequest>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl EngineWorker {
    /// Start the engine thread and build the engine on it.
    ///
    /// Resolves once the factory has finished. A factory error (or panic) ends
    /// the thread and is reported as a load failure for `path`.
    pub async fn spawn(
        session_id: &str,
        factory: Arc<dyn EngineFactory>,
        path: PathBuf,
        settings: DecompileSettings,
        queue_capacity: usize,
    ) -> Result<(Self, EngineInfo), QueryError> {
        let (tx, rx) = mpsc::sync_channel(queue_capacity.max(1));
        let (ready_tx, ready_rx) = oneshot::channel::<Result<EngineInfo, String>>();
        let display_path = path.display().to_string();
        let sid = session_id.to_string();

        let handle = std::thread::Builder::new()
            .name(format!("engine-{}", session_id.chars().take(8).collect::<String>()))
            .spawn(move || {
                let built = factory.create(&path, &settings).and_then(|engine| {
                    let class_count = engine.types()?.len();
                    let info = EngineInfo {
                        backend: factory.name().to_string(),
                        version: engine.version().to_string(),
                        input_type: engine.input_type().to_string(),
                        class_count,
                    };
                    Ok((engine, info))
                });
                match built {
                    Ok((engine, info)) => {
                        if ready_tx.send(Ok(info)).is_ok() {
                            run_engine_loop(&sid, engine, rx);
                        }
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("{e:#}")));
                    }
                }
            })
            .map_err(|e| QueryError::Internal(format!("failed to start engine thread: {e}")))?;

        let worker = Self {
            session_id: session_id.to_string(),
            tx,
            thread: Mutex::new(Some(handle)),
        };

        match ready_rx.await {
            Ok(Ok(info)) => {
                debug!(
                    session_id = %session_id,
                    version = %info.version,
                    classes = info.class_count,
                    "Engine ready"
                );
                Ok((worker, info))
            }
            Ok(Err(reason)) => {
                worker.join().await;
                Err(QueryError::load_failed(display_path, reason))
            }
            Err(_) => {
                worker.join().await;
                Err(QueryError::load_failed(
                    display_path,
                    "engine panicked while loading",
                ))
            }
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Queue `f` behind the jobs already waiting and return the receiver for its
    /// result. Waits for queue space when the queue is full.
    pub async fn submit<T, F>(&self, f: F) -> Result<oneshot::Receiver<Result<T, QueryError>>, QueryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn Engine) -> Result<T, QueryError> + Send + 'static,
    {
        let (resp, rx) = oneshot::channel();
        let job: Job = Box::new(move |engine: &mut dyn Engine| {
            let result = match panic::catch_unwind(AssertUnwindSafe(|| f(engine))) {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(error = %message, "Engine panicked while answering a query");
                    Err(QueryError::Upstream(message))
                }
            };
            let _ = resp.send(result);
        });

        self.send_with_retry(EngineRequest::Run(job)).await?;
        Ok(rx)
    }

    /// Run `f` against the engine and wait for its result.
    pub async fn run<T, F>(&self, f: F) -> Result<T, QueryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn Engine) -> Result<T, QueryError> + Send + 'static,
    {
        self.submit(f).await?.await?
    }

    async fn send_with_retry(&self, req: EngineRequest) -> Result<(), QueryError> {
        let mut pending = req;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return Ok(()),
                Err(mpsc::TrySendError::Full(req)) => {
                    pending = req;
                    tokio::time::sleep(Duration::from_millis(SEND_BACKOFF_MS)).await;
                }
                Err(mpsc::TrySendError::Disconnected(_)) => return Err(QueryError::WorkerClosed),
            }
        }
    }

    /// Stop the engine thread after it drains the jobs already queued.
    ///
    /// Calling this on a stopped worker is a no-op.
    pub async fn shutdown(&self) {
        let (resp, rx) = oneshot::channel();
        match self.send_with_retry(EngineRequest::Shutdown { resp }).await {
            Ok(()) => {
                if rx.await.is_err() {
                    debug!(session_id = %self.session_id, "Engine exited before acknowledging shutdown");
                }
            }
            Err(_) => debug!(session_id = %self.session_id, "Engine already stopped"),
        }
        self.join().await;
    }

    async fn join(&self) {
        let handle = match self.thread.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };
        let session_id = self.session_id.clone();
        match tokio::task::spawn_blocking(move || handle.join()).await {
            Ok(Ok(())) => info!(session_id = %session_id, "Engine worker stopped"),
            Ok(Err(_)) => warn!(session_id = %session_id, "Engine thread panicked"),
            Err(e) => warn!(session_id = %session_id, error = %e, "Failed to join engine thread"),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "engine panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::snapshot::fixtures;
    use crate::engine::SnapshotEngineFactory;

    async fn spawn_fixture(capacity: usize) -> (tempfile::TempDir, EngineWorker, EngineInfo) {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_artifact(dir.path(), &fixtures::sample_artifact());
        let (worker, info) = EngineWorker::spawn(
            "0f0e0d0c-test",
            Arc::new(SnapshotEngineFactory),
            path,
            DecompileSettings::default(),
            capacity,
        )
        .await
        .unwrap();
        (dir, worker, info)
    }

    #[tokio::test]
    async fn test_spawn_reports_engine_info() {
        let (_dir, worker, info) = spawn_fixture(8).await;
        assert_eq!(info.backend, "jadx");
        assert_eq!(info.version, fixtures::ENGINE_VERSION);
        assert_eq!(info.class_count, 4);

        let count = worker.run(|engine| Ok(engine.types()?.len())).await.unwrap();
        assert_eq!(count, 4);
        worker.shutdown().await;
    }

    #[tokio::test]
    async fn test_spawn_failure_is_load_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let err = EngineWorker::spawn(
            "broken",
            Arc::new(SnapshotEngineFactory),
            path,
            DecompileSettings::default(),
            4,
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.code(), "LOAD_FAILED");
        assert!(err.to_string().contains("broken.json"));
    }

    #[tokio::test]
    async fn test_panic_is_recovered() {
        let (_dir, worker, _) = spawn_fixture(8).await;
        let err = worker
            .run(|_engine| -> Result<(), QueryError> { panic!("decompiler blew up") })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UPSTREAM_FAILURE");
        assert!(err.to_string().contains("decompiler blew up"));

        // The session keeps working.
        let version = worker.run(|engine| Ok(engine.version().to_string())).await.unwrap();
        assert_eq!(version, fixtures::ENGINE_VERSION);
        worker.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_full_queue_waits_instead_of_failing() {
        let (_dir, worker, _) = spawn_fixture(2).await;
        let worker = Arc::new(worker);
        let (gate_tx, gate_rx) = mpsc::channel::<()>();

        let blocked = worker
            .submit(move |_engine| {
                let _ = gate_rx.recv();
                Ok(0usize)
            })
            .await
            .unwrap();

        let mut waiting = tokio::task::JoinSet::new();
        for i in 1..=10usize {
            let worker = worker.clone();
            waiting.spawn(async move { worker.run(move |_engine| Ok(i)).await });
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        gate_tx.send(()).unwrap();

        assert_eq!(blocked.await.unwrap().unwrap(), 0);
        let mut answered = Vec::new();
        while let Some(joined) = waiting.join_next().await {
            answered.push(joined.unwrap().unwrap());
        }
        answered.sort_unstable();
        assert_eq!(answered, (1..=10).collect::<Vec<_>>());
        worker.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_closes() {
        let (_dir, worker, _) = spawn_fixture(8).await;
        let queued = worker
            .submit(|engine| Ok(engine.types()?.len()))
            .await
            .unwrap();
        worker.shutdown().await;
        assert_eq!(queued.await.unwrap().unwrap(), 4);

        let err = worker.run(|_engine| Ok(())).await.unwrap_err();
        assert!(matches!(err, QueryError::WorkerClosed));
        // Second shutdown is a no-op.
        worker.shutdown().await;
    }
}
