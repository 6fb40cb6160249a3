use thiserror::Error;

/// Errors raised by the embedded per-tenant stores.
///
/// [`StoreError::Corruption`] is the recoverable-corruption signature the
/// recovery service watches for; it is kept distinct from
/// [`StoreError::LockContention`] (another process or handle holds the
/// store open — transient, must never trigger a rebuild) and from ordinary
/// [`StoreError::Io`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store reported recoverable corruption: {0}")]
    Corruption(String),

    #[error("store is locked by another handle: {0}")]
    LockContention(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("record not found")]
    NotFound,
}

/// Classifies a `sled::Error` into a three-way signature callers can act
/// on distinctly. `sled::Error::Corruption` maps directly; everything else
/// that looks like a held OS lock (sled takes an flock on the data
/// directory) is treated as transient lock contention, and the remainder
/// as plain I/O.
pub fn classify_sled_error(err: sled::Error) -> StoreError {
    match err {
        sled::Error::Corruption { .. } => StoreError::Corruption(err.to_string()),
        sled::Error::Io(io_err) => {
            let message = io_err.to_string();
            if message.to_lowercase().contains("lock") {
                StoreError::LockContention(message)
            } else {
                StoreError::Io(message)
            }
        }
        other => StoreError::Io(other.to_string()),
    }
}
