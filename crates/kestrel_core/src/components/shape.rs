//! # Collision Shape
//!
//! Describes the collision geometry the physics bridge derives its body
//! from. Rebuilding that derived state is expensive, so attribute writes
//! only flag the rebuild; the actual recreation happens once in
//! `apply_attributes` after a load or a network burst has finished setting
//! fields.

use std::any::Any;

use glam::Vec3;

use crate::attribute::{mode, AttributeInfo};
use crate::component::Component;
use crate::context::EngineContext;
use crate::node::Node;
use crate::variant::Variant;

/// Collision geometry primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ShapeKind {
    /// Axis-aligned box.
    #[default]
    Box = 0,
    /// Sphere; only `size.x` is used as the diameter.
    Sphere = 1,
    /// Capsule; `size.x` is the diameter, `size.y` the height.
    Capsule = 2,
}

impl ShapeKind {
    /// Decodes a stored discriminant, defaulting unknown values to a box.
    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        match value {
            1 => Self::Sphere,
            2 => Self::Capsule,
            _ => Self::Box,
        }
    }
}

/// Collision shape component.
pub struct CollisionShape {
    kind: ShapeKind,
    size: Vec3,
    offset: Vec3,
    recreate_shape: bool,
    transform_dirty: bool,
    rebuild_count: u32,
    half_extents: Vec3,
}

impl Default for CollisionShape {
    fn default() -> Self {
        Self {
            kind: ShapeKind::Box,
            size: Vec3::ONE,
            offset: Vec3::ZERO,
            recreate_shape: false,
            transform_dirty: false,
            rebuild_count: 0,
            half_extents: Vec3::splat(0.5),
        }
    }
}

impl CollisionShape {
    /// Factory type tag.
    pub const TYPE: &'static str = "CollisionShape";

    /// Schema index of the shape kind.
    pub const ATTR_KIND: usize = 0;
    /// Schema index of the size.
    pub const ATTR_SIZE: usize = 1;
    /// Schema index of the local offset.
    pub const ATTR_OFFSET: usize = 2;

    const SCHEMA: &'static [AttributeInfo] = &[
        AttributeInfo::new("shape", mode::DEFAULT),
        AttributeInfo::new("size", mode::DEFAULT),
        AttributeInfo::new("offset", mode::DEFAULT),
    ];

    /// Current primitive kind.
    #[must_use]
    pub const fn kind(&self) -> ShapeKind {
        self.kind
    }

    /// Shape dimensions.
    #[must_use]
    pub const fn size(&self) -> Vec3 {
        self.size
    }

    /// Local offset from the node origin.
    #[must_use]
    pub const fn offset(&self) -> Vec3 {
        self.offset
    }

    /// True while a rebuild is pending `apply_attributes`.
    #[must_use]
    pub const fn needs_rebuild(&self) -> bool {
        self.recreate_shape
    }

    /// Number of times the derived shape was actually rebuilt.
    #[must_use]
    pub const fn rebuild_count(&self) -> u32 {
        self.rebuild_count
    }

    /// Derived half extents; valid after the last rebuild.
    #[must_use]
    pub const fn half_extents(&self) -> Vec3 {
        self.half_extents
    }

    /// True if the owning node moved since the last subsystem step.
    #[must_use]
    pub const fn is_transform_dirty(&self) -> bool {
        self.transform_dirty
    }
}

impl Component for CollisionShape {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn attributes(&self) -> &'static [AttributeInfo] {
        Self::SCHEMA
    }

    fn attribute(&self, index: usize) -> Variant {
        match index {
            Self::ATTR_KIND => Variant::Int(self.kind as i64),
            Self::ATTR_SIZE => Variant::Vec3(self.size),
            Self::ATTR_OFFSET => Variant::Vec3(self.offset),
            _ => Variant::Empty,
        }
    }

    fn set_attribute(&mut self, index: usize, value: &Variant) -> bool {
        let accepted = match index {
            Self::ATTR_KIND => match value.as_int() {
                Some(raw) => {
                    self.kind = ShapeKind::from_i64(raw);
                    true
                }
                None => false,
            },
            Self::ATTR_SIZE => match value.as_vec3() {
                Some(size) => {
                    // Dimensions are clamped, not rejected.
                    self.size = size.max(Vec3::ZERO);
                    true
                }
                None => false,
            },
            Self::ATTR_OFFSET => match value.as_vec3() {
                Some(offset) => {
                    self.offset = offset;
                    true
                }
                None => false,
            },
            _ => false,
        };
        if accepted {
            self.recreate_shape = true;
        }
        accepted
    }

    fn apply_attributes(&mut self, _ctx: &EngineContext) {
        if !self.recreate_shape {
            return;
        }
        self.half_extents = match self.kind {
            ShapeKind::Box => self.size * 0.5,
            ShapeKind::Sphere => Vec3::splat(self.size.x * 0.5),
            ShapeKind::Capsule => {
                Vec3::new(self.size.x * 0.5, self.size.y * 0.5, self.size.x * 0.5)
            }
        };
        self.rebuild_count += 1;
        self.recreate_shape = false;
    }

    fn on_marked_dirty(&mut self, _node: &Node) {
        self.transform_dirty = true;
    }

    fn on_subsystem_update(&mut self, _node: &mut Node, _time_step: f32) {
        // The physics bridge consumes the flag during its step.
        self.transform_dirty = false;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
