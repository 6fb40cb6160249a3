//! # depot-reconciler: background sweeps
//!
//! Runs the seven-step periodic tick: junk-file removal and volume health
//! re-probe, timeout requeue, terminal-record purge, legacy completed-record
//! purge, orphan byte-file reclamation, empty-directory cleanup, and
//! throttled store compaction.

mod error;
mod reconciler;

pub use error::ReconcilerError;
pub use reconciler::{Reconciler, ReconcilerConfig, TickReport};
