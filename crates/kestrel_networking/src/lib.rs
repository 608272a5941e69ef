//! # KESTREL Networking
//!
//! Incremental replication of a [`kestrel_core::Scene`] to remote
//! observers. The core crate accumulates per-observer dirty identifier
//! sets; this crate turns them into ordered delta batches
//! ([`Replicator`]), encodes them for transport ([`protocol`]), and
//! applies them on the observing side ([`replica`]).
//!
//! ## What this crate is not
//!
//! There is no socket here. A transport layer frames and carries the
//! encoded batches; both the authoritative host and the replicas treat
//! them as opaque bytes until they reach [`DeltaBatch::decode`].

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod protocol;
pub mod replica;
pub mod replicator;

pub use error::{NetError, NetResult};
pub use kestrel_core::ObserverId;
pub use protocol::{ComponentState, DeltaBatch, DeltaMessage, NodeState};
pub use replica::apply_batch;
pub use replicator::Replicator;
