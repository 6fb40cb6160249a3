use depot_io::VolumeError;
use depot_pool::PoolError;
use depot_scheduler::SchedulerError;
use depot_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("i/o error during sweep: {0}")]
    Io(#[from] std::io::Error),
}
