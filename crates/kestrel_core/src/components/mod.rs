//! # Built-in Component Kinds
//!
//! The component set this build ships with. Each kind registers its factory
//! through [`register_builtins`]; engine extensions register additional
//! kinds against the same registry at startup.

pub mod mesh;
pub mod script;
pub mod shape;
pub mod smoothing;

pub use mesh::MeshRenderer;
pub use script::ScriptBehavior;
pub use shape::{CollisionShape, ShapeKind};
pub use smoothing::SmoothedTransform;

use crate::component::ComponentRegistry;

/// Registers every built-in component kind.
pub fn register_builtins(registry: &mut ComponentRegistry) {
    registry.register(ScriptBehavior::TYPE, || {
        Box::new(ScriptBehavior::default())
    });
    registry.register(CollisionShape::TYPE, || {
        Box::new(CollisionShape::default())
    });
    registry.register(SmoothedTransform::TYPE, || {
        Box::new(SmoothedTransform::default())
    });
    registry.register(MeshRenderer::TYPE, || Box::new(MeshRenderer::default()));
}
