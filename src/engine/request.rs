//! Request types for the engine worker.

use super::Engine;
use tokio::sync::oneshot;

/// A unit of work run against the session's engine. The job sends its own reply.
pub(crate) type Job = Box<dyn FnOnce(&mut dyn Engine) + Send>;

pub(crate) enum EngineRequest {
    Run(Job),
    /// Drop the engine and stop the loop. Jobs queued earlier run first.
    Shutdown { resp: oneshot::Sender<()> },
}
