//! # Local Transform
//!
//! Position, rotation and scale of a node relative to its parent. World
//! transforms are composed through the ancestor chain and cached on the
//! node; see `Scene::world_transform`.

use glam::{Mat4, Quat, Vec3};

/// Local-space transform: translation, unit-quaternion rotation, scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Translation relative to the parent node.
    pub position: Vec3,
    /// Orientation as a unit quaternion.
    pub rotation: Quat,
    /// Non-uniform scale factor.
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    /// Identity transform: no translation, no rotation, uniform scale 1.
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Constructs from a position, identity rotation and scale.
    #[must_use]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Constructs from position and rotation with unit scale.
    #[must_use]
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            scale: Vec3::ONE,
        }
    }

    /// Builds the TRS matrix (`T * R * S`).
    #[must_use]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Applies a translation offset in parent space.
    pub fn translate(&mut self, offset: Vec3) {
        self.position += offset;
    }

    /// Applies an additional rotation.
    pub fn rotate(&mut self, delta: Quat) {
        self.rotation = (delta * self.rotation).normalize();
    }

    /// Multiplies the scale component-wise.
    pub fn scale_by(&mut self, factor: Vec3) {
        self.scale *= factor;
    }
}
