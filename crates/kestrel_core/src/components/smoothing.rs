//! # Smoothed Transform
//!
//! Chases a target position and rotation during the smoothing phase of the
//! frame update instead of snapping to it, hiding network quantization and
//! update-rate jitter. When the remaining distance exceeds the snap
//! threshold the node teleports: interpolating across that gap would read
//! as a glide through the world.
//!
//! Targets arrive through NET-mode attributes, so a replication update
//! burst steers the smoothing without touching the node transform directly.

use std::any::Any;

use glam::{Quat, Vec3};

use crate::attribute::{mode, AttributeInfo};
use crate::component::Component;
use crate::node::Node;
use crate::variant::Variant;

/// Rotation angle below which smoothing considers itself settled.
const ROTATION_EPSILON: f32 = 0.0001;
/// Squared distance below which smoothing considers itself settled.
const POSITION_EPSILON_SQ: f32 = 1e-8;

/// Target-chasing transform smoother.
pub struct SmoothedTransform {
    target_position: Vec3,
    target_rotation: Quat,
    smoothing: bool,
}

impl Default for SmoothedTransform {
    fn default() -> Self {
        Self {
            target_position: Vec3::ZERO,
            target_rotation: Quat::IDENTITY,
            smoothing: false,
        }
    }
}

impl SmoothedTransform {
    /// Factory type tag.
    pub const TYPE: &'static str = "SmoothedTransform";

    /// Schema index of the target position.
    pub const ATTR_TARGET_POSITION: usize = 0;
    /// Schema index of the target rotation.
    pub const ATTR_TARGET_ROTATION: usize = 1;

    // Targets are transient state driven by the network, not scene-file
    // content.
    const SCHEMA: &'static [AttributeInfo] = &[
        AttributeInfo::new("target_position", mode::NET),
        AttributeInfo::new("target_rotation", mode::NET),
    ];

    /// Current target position.
    #[must_use]
    pub const fn target_position(&self) -> Vec3 {
        self.target_position
    }

    /// Current target rotation.
    #[must_use]
    pub const fn target_rotation(&self) -> Quat {
        self.target_rotation
    }

    /// Sets a new target position and restarts smoothing.
    pub fn set_target_position(&mut self, position: Vec3) {
        self.target_position = position;
        self.smoothing = true;
    }

    /// Sets a new target rotation and restarts smoothing.
    pub fn set_target_rotation(&mut self, rotation: Quat) {
        self.target_rotation = rotation.normalize();
        self.smoothing = true;
    }

    /// True while the node is still converging on the target.
    #[must_use]
    pub const fn in_progress(&self) -> bool {
        self.smoothing
    }
}

impl Component for SmoothedTransform {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn attributes(&self) -> &'static [AttributeInfo] {
        Self::SCHEMA
    }

    fn attribute(&self, index: usize) -> Variant {
        match index {
            Self::ATTR_TARGET_POSITION => Variant::Vec3(self.target_position),
            Self::ATTR_TARGET_ROTATION => Variant::Quat(self.target_rotation),
            _ => Variant::Empty,
        }
    }

    fn set_attribute(&mut self, index: usize, value: &Variant) -> bool {
        match index {
            Self::ATTR_TARGET_POSITION => match value.as_vec3() {
                Some(position) => {
                    self.set_target_position(position);
                    true
                }
                None => false,
            },
            Self::ATTR_TARGET_ROTATION => match value.as_quat() {
                Some(rotation) => {
                    self.set_target_rotation(rotation);
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    fn on_smoothing(
        &mut self,
        node: &mut Node,
        constant: f32,
        squared_snap_threshold: f32,
    ) -> bool {
        if !self.smoothing {
            return false;
        }

        let mut transform = node.transform;
        let delta = self.target_position - transform.position;
        let mut settled = true;

        if delta.length_squared() > squared_snap_threshold {
            // Too far to interpolate; teleport.
            transform.position = self.target_position;
        } else if delta.length_squared() > POSITION_EPSILON_SQ {
            transform.position = transform.position.lerp(self.target_position, constant);
            settled = false;
        } else {
            transform.position = self.target_position;
        }

        let angle = transform.rotation.angle_between(self.target_rotation);
        if angle > ROTATION_EPSILON {
            transform.rotation = transform
                .rotation
                .slerp(self.target_rotation, constant)
                .normalize();
            settled = false;
        } else {
            transform.rotation = self.target_rotation;
        }

        if settled {
            self.smoothing = false;
        }

        let moved = transform != node.transform;
        node.transform = transform;
        moved
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
