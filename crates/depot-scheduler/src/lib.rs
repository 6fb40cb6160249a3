//! # depot-scheduler: claim/retry/timeout state machine
//!
//! Implements the scheduler's contract over a tenant's metadata store:
//! atomic claim of the oldest eligible pending item, exponential/linear
//! backoff on failure, terminal failure at `max_retries`, and the
//! self-healing skip of records whose byte file has vanished.

mod backoff;
mod error;
mod scheduler;

pub use backoff::{backoff_for, RetryConfig};
pub use error::SchedulerError;
pub use scheduler::Scheduler;
