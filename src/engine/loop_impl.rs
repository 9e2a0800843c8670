//! Engine worker loop.

use super::request::EngineRequest;
use super::Engine;
use std::sync::mpsc;
use tracing::{debug, info};

/// Run jobs against `engine` on the current thread until shutdown.
///
/// Returns when a shutdown request arrives or every sender is gone.
pub(crate) fn run_engine_loop(
    session_id: &str,
    mut engine: Box<dyn Engine>,
    rx: mpsc::Receiver<EngineRequest>,
) {
    let mut ack = None;
    let mut jobs = 0u64;

    while let Ok(req) = rx.recv() {
        match req {
            EngineRequest::Run(job) => {
                job(engine.as_mut());
                jobs += 1;
            }
            EngineRequest::Shutdown { resp } => {
                ack = Some(resp);
                break;
            }
        }
    }

    info!(session_id = %session_id, jobs, "Engine worker shutting down");
    drop(engine);
    match ack {
        Some(resp) => {
            let _ = resp.send(());
        }
        None => debug!(session_id = %session_id, "Engine channel closed without shutdown"),
    }
}
