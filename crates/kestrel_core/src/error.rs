//! # Scene Error Types
//!
//! All errors that can cross the scene/node/component boundary.
//!
//! Nothing in this crate panics across that boundary: load and save return
//! `SceneResult`, lookups return `Option`, and the lenient conditions
//! (unresolved references, duplicate identifiers) are logged rather than
//! raised. Callers decide whether a failure is fatal to them.

use thiserror::Error;

/// Errors that can occur while loading, saving or mutating a scene.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// The stream did not start with the scene format tag.
    #[error("not a scene stream: expected tag {expected:?}, found {found:?}")]
    BadFormatTag {
        /// The tag this build writes.
        expected: [u8; 4],
        /// The tag actually read.
        found: [u8; 4],
    },

    /// The stream ended early or contained an impossible value.
    ///
    /// Loads abort on this error and leave the graph in the last consistent
    /// state read before the failure point.
    #[error("malformed scene stream: {0}")]
    MalformedStream(String),

    /// A component type tag had no registered factory.
    #[error("unknown component type: {0}")]
    UnknownComponentType(String),

    /// Every identifier in a range is held by a live object.
    #[error("identifier range 0x{first:08x}..=0x{last:08x} exhausted")]
    CapacityExceeded {
        /// First identifier of the exhausted range.
        first: u32,
        /// Last identifier of the exhausted range.
        last: u32,
    },

    /// A required external collaborator was not provided.
    #[error("required collaborator missing: {0}")]
    MissingCollaborator(&'static str),

    /// A node or component handle no longer resolves (its slot was freed
    /// or belongs to another scene).
    #[error("stale or foreign handle")]
    StaleHandle,

    /// The structured-text scene document failed to parse or serialize.
    #[error("scene document error: {0}")]
    Document(String),

    /// Configuration file was syntactically or semantically invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for scene operations.
pub type SceneResult<T> = Result<T, SceneError>;
