//! # Replication Error Types

use kestrel_core::SceneError;
use thiserror::Error;

/// Errors that can occur while encoding, decoding or applying deltas.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetError {
    /// Underlying stream or scene failure.
    #[error(transparent)]
    Scene(#[from] SceneError),

    /// A delta batch carried a message type this build does not know.
    #[error("unknown delta message type {0}")]
    UnknownMessage(u8),

    /// The requested observer is not tracked by the scene.
    #[error("observer {0} is not tracked")]
    UnknownObserver(u32),
}

/// Result type for replication operations.
pub type NetResult<T> = Result<T, NetError>;
