//! # Scene Nodes
//!
//! A node is an addressable point in the spatial and logical hierarchy. It
//! owns its children and its attached components through the scene arenas;
//! the back-references to parent and scene are plain handles that never
//! participate in destruction.
//!
//! Mutation goes through the owning `Scene` so that identity registration,
//! dirty propagation and network marking stay in one place; this module
//! only holds the node's own data and read access to it.

use glam::Mat4;

use crate::handle::{ComponentHandle, NodeHandle};
use crate::transform::Transform;
use crate::variant::{Variant, VariantMap};

/// One node of the scene hierarchy.
pub struct Node {
    pub(crate) id: u32,
    pub(crate) name: String,
    pub(crate) enabled: bool,
    pub(crate) scene_member: bool,
    pub(crate) parent: NodeHandle,
    pub(crate) children: Vec<NodeHandle>,
    pub(crate) components: Vec<ComponentHandle>,
    pub(crate) transform: Transform,
    pub(crate) vars: VariantMap,
    pub(crate) world: Mat4,
    pub(crate) world_dirty: bool,
    pub(crate) net_snapshot: Option<Vec<Variant>>,
}

impl Node {
    pub(crate) fn new(name: &str, parent: NodeHandle) -> Self {
        Self {
            id: 0,
            name: name.to_owned(),
            enabled: true,
            scene_member: false,
            parent,
            children: Vec::new(),
            components: Vec::new(),
            transform: Transform::IDENTITY,
            vars: VariantMap::new(),
            world: Mat4::IDENTITY,
            world_dirty: true,
            net_snapshot: None,
        }
    }

    /// Scene identifier; 0 while unassigned.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Node name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enabled flag of this node alone; see `Scene::is_enabled_effective`
    /// for the inherited value.
    #[inline]
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// True while the node is registered with its scene's identifier maps.
    ///
    /// A node evicted by a duplicate-identifier registration stays alive in
    /// the hierarchy but loses membership.
    #[inline]
    #[must_use]
    pub const fn is_scene_member(&self) -> bool {
        self.scene_member
    }

    /// Handle of the parent node; null for the scene root.
    #[inline]
    #[must_use]
    pub const fn parent(&self) -> NodeHandle {
        self.parent
    }

    /// Handles of the owned child nodes, in creation order.
    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    /// Handles of the attached components, in attachment order.
    #[inline]
    #[must_use]
    pub fn components(&self) -> &[ComponentHandle] {
        &self.components
    }

    /// Local transform relative to the parent.
    #[inline]
    #[must_use]
    pub const fn transform(&self) -> Transform {
        self.transform
    }

    /// The variable bag.
    #[inline]
    #[must_use]
    pub const fn vars(&self) -> &VariantMap {
        &self.vars
    }

    /// Reads one variable, if set.
    #[must_use]
    pub fn var(&self, key: &str) -> Option<&Variant> {
        self.vars.get(key)
    }

    /// Cached world matrix; only valid while not dirty. Use
    /// `Scene::world_transform` to recompute on demand.
    #[inline]
    #[must_use]
    pub const fn cached_world(&self) -> Mat4 {
        self.world
    }

    /// True if the cached world matrix is stale.
    #[inline]
    #[must_use]
    pub const fn is_world_dirty(&self) -> bool {
        self.world_dirty
    }

    /// Network-visible state of the node itself, in a fixed order with
    /// variables sorted by key so snapshots compare deterministically.
    #[must_use]
    pub(crate) fn net_state(&self) -> Vec<Variant> {
        let mut state = vec![
            Variant::String(self.name.clone()),
            Variant::Vec3(self.transform.position),
            Variant::Quat(self.transform.rotation),
            Variant::Vec3(self.transform.scale),
            Variant::Bool(self.enabled),
        ];
        let mut keys: Vec<&String> = self.vars.keys().collect();
        keys.sort();
        for key in keys {
            state.push(Variant::String(key.clone()));
            state.push(self.vars[key].clone());
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_new_node_defaults() {
        let node = Node::new("camera", NodeHandle::NULL);
        assert_eq!(node.id(), 0);
        assert_eq!(node.name(), "camera");
        assert!(node.is_enabled());
        assert!(!node.is_scene_member());
        assert!(node.parent().is_null());
        assert!(node.children().is_empty());
        assert!(node.is_world_dirty());
    }

    #[test]
    fn test_net_state_sorts_vars() {
        let mut node = Node::new("n", NodeHandle::NULL);
        node.vars.insert("zeta".into(), Variant::Int(1));
        node.vars.insert("alpha".into(), Variant::Int(2));
        node.transform.position = Vec3::X;

        let state = node.net_state();
        // Fixed prefix: name, position, rotation, scale, enabled.
        assert_eq!(state[0], Variant::String("n".into()));
        assert_eq!(state[5], Variant::String("alpha".into()));
        assert_eq!(state[7], Variant::String("zeta".into()));
        // Deterministic: identical node state yields identical snapshots.
        assert_eq!(state, node.net_state());
    }
}
