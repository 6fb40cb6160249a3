//! # depot-recovery: corruption detection, rebuild, and the startup health loop
//!
//! Distinguishes a recoverable-corruption signature from transient lock
//! contention, runs the backup/delete/rebuild-from-scan protocol described
//! in the store's corruption recovery design, and drives the startup health
//! check that walks every known tenant before the rest of the system comes
//! up.

mod error;
mod service;

pub use error::RecoveryError;
pub use service::{ProbeOutcome, RecoveryConfig, RecoveryService};
