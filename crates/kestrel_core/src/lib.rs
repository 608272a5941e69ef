//! # KESTREL Scene Core
//!
//! The mutable heart of the engine: a hierarchy of nodes with attached
//! components, stable two-range identity, synchronous and progressive
//! (time-sliced) deserialization, attribute-level dirty notification and
//! the per-observer replication bookkeeping the networking layer drains.
//!
//! ## Architecture Rules
//!
//! 1. **One writer** - the main thread owns the graph; workers only push
//!    into the deferred dirty queue
//! 2. **One schema** - a component's attribute table drives files,
//!    documents, editors and network deltas alike
//! 3. **No ambient globals** - every collaborator arrives through
//!    [`EngineContext`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use kestrel_core::{CreateMode, EngineContext, Scene};
//!
//! let mut scene = Scene::new(EngineContext::with_builtins());
//! let child = scene.create_child(scene.root(), "player", CreateMode::Replicated)?;
//! let bytes = scene.save();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod arena;
pub mod attribute;
pub mod component;
pub mod components;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod handle;
pub mod ids;
pub mod io;
pub mod node;
pub mod replication;
pub mod scene;
pub mod transform;
pub mod variant;

pub use attribute::{find_attribute, mode, AttributeInfo};
pub use component::{
    file_attribute_values, net_attribute_values, Component, ComponentRegistry, ComponentSlot,
};
pub use components::{
    register_builtins, CollisionShape, MeshRenderer, ScriptBehavior, ShapeKind, SmoothedTransform,
};
pub use config::SceneConfig;
pub use context::{
    EngineContext, MemoryResourceCache, Resource, ResourceCache, SerialWorkQueue, WorkQueue,
    WorkerPool,
};
pub use error::{SceneError, SceneResult};
pub use events::SceneEvent;
pub use handle::{ComponentHandle, NodeHandle};
pub use ids::{
    CreateMode, IdAllocator, FIRST_LOCAL_ID, FIRST_REPLICATED_ID, LAST_LOCAL_ID,
    LAST_REPLICATED_ID,
};
pub use node::Node;
pub use replication::{ObserverId, SceneReplicationState};
pub use scene::resolver::SceneResolver;
pub use scene::{DirtyQueue, Scene};
pub use transform::Transform;
pub use variant::{Variant, VariantKind, VariantMap};
