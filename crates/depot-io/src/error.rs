use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the volume layer.
#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path {path} escapes the volume mount root")]
    PathEscapesRoot { path: PathBuf },

    #[error("path component {component:?} contains a traversal or separator")]
    InvalidComponent { component: String },

    #[error("volume is not healthy")]
    Unhealthy,

    #[error("insufficient storage: available_space <= 0")]
    InsufficientStorage,
}
