//! Session lifecycle for loaded artifacts.
//!
//! ```text
//! load ──▶ Created ──▶ Active ──close──▶ Closed
//! ```
//!
//! Each session owns one engine worker thread, a private alias store and a
//! handle on the shared disk cache. Queries against one session run one at a
//! time on its worker; distinct sessions run in parallel.

mod aliases;
mod registry;
mod types;

pub use aliases::{AliasEntry, AliasStore};
pub use registry::{SessionRegistry, DEFAULT_QUEUE_CAPACITY};
pub use types::{Provenance, Session, SessionInfo, SessionStatus};

#[cfg(test)]
pub(crate) use registry::tests::registry as test_registry;
