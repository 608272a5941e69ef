//! # Observer Delta Assembly
//!
//! Owns the observer roster and turns one scene's replication state into
//! per-observer [`DeltaBatch`]es. One cycle is:
//!
//! 1. [`Replicator::prepare`]: drain the scene-level dirty sets, diffing
//!    attribute values and fanning real changes into every observer state.
//! 2. [`Replicator::collect`] per observer: drain that observer's dirty
//!    identifier sets into an ordered message batch and update what the
//!    observer is known to have.
//!
//! LOCAL-range nodes and components never enter a batch.

use std::collections::HashSet;

use kestrel_core::{
    net_attribute_values, ComponentHandle, CreateMode, NodeHandle, ObserverId, Scene,
};

use crate::error::{NetError, NetResult};
use crate::protocol::{ComponentState, DeltaBatch, DeltaMessage, NodeState};

/// Per-scene replication driver.
#[derive(Debug)]
pub struct Replicator {
    next_raw: u32,
    observers: Vec<ObserverId>,
}

impl Default for Replicator {
    fn default() -> Self {
        Self::new()
    }
}

impl Replicator {
    /// Creates a replicator with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_raw: 1,
            observers: Vec::new(),
        }
    }

    /// Registers a new observer on the scene. Its replication state is
    /// seeded with every live replicated node, so its first collected
    /// batch is a full resync.
    pub fn add_observer(&mut self, scene: &mut Scene) -> ObserverId {
        let id = ObserverId::new(self.next_raw);
        self.next_raw += 1;
        scene.add_replication_observer(id);
        self.observers.push(id);
        tracing::info!("observer {} connected", id.raw());
        id
    }

    /// Drops an observer and its replication state.
    pub fn remove_observer(&mut self, scene: &mut Scene, id: ObserverId) -> bool {
        self.observers.retain(|&observer| observer != id);
        let removed = scene.remove_replication_observer(id);
        if removed {
            tracing::info!("observer {} disconnected", id.raw());
        }
        removed
    }

    /// Currently tracked observers, in connection order.
    #[must_use]
    pub fn observers(&self) -> &[ObserverId] {
        &self.observers
    }

    /// Runs the once-per-cycle attribute diff; call before collecting any
    /// observer's batch for the cycle.
    pub fn prepare(scene: &mut Scene) {
        scene.prepare_network_update();
    }

    /// Drains one observer's dirty sets into an ordered batch: removals,
    /// then creations (parents before children), then updates. Clears the
    /// sets and updates the observer's known sets.
    ///
    /// # Errors
    ///
    /// [`NetError::UnknownObserver`] if the scene does not track the
    /// observer.
    pub fn collect(&self, scene: &mut Scene, observer: ObserverId) -> NetResult<DeltaBatch> {
        let (dirty_nodes, dirty_components) = {
            let Some(state) = scene.observer_state_mut(observer) else {
                return Err(NetError::UnknownObserver(observer.raw()));
            };
            (state.take_dirty_nodes(), state.take_dirty_components())
        };

        let mut messages = Vec::new();
        let mut newly_known_nodes: Vec<u32> = Vec::new();
        let mut newly_known_components: Vec<u32> = Vec::new();
        let mut forget_nodes: Vec<u32> = Vec::new();
        let mut forget_components: Vec<u32> = Vec::new();
        let mut created_components: HashSet<u32> = HashSet::new();

        // Removals first: components, then nodes.
        for &id in &dirty_components {
            if scene.get_component(id).is_none() && self.component_known(scene, observer, id) {
                messages.push(DeltaMessage::RemoveComponent { id });
                forget_components.push(id);
            }
        }
        for &id in &dirty_nodes {
            if scene.get_node(id).is_none() && self.node_known(scene, observer, id) {
                messages.push(DeltaMessage::RemoveNode { id });
                forget_nodes.push(id);
            }
        }

        // Creations, parents before children. The scene root is never
        // created on a replica: it already has one. Root state syncs as an
        // update against the shared root identifier instead.
        let mut creates: Vec<(u32, u32)> = Vec::new();
        for &id in &dirty_nodes {
            if let Some(handle) = scene.get_node(id) {
                if self.node_known(scene, observer, id) {
                    continue;
                }
                if handle == scene.root() {
                    newly_known_nodes.push(id);
                    if let Some(state) = capture_node_state(scene, handle) {
                        messages.push(DeltaMessage::UpdateNode { id, state });
                    }
                    continue;
                }
                creates.push((node_depth(scene, handle), id));
            }
        }
        creates.sort_unstable();
        for (_, id) in creates {
            let Some(handle) = scene.get_node(id) else {
                continue;
            };
            let Some(state) = capture_node_state(scene, handle) else {
                continue;
            };
            let parent = scene
                .node(handle)
                .and_then(|node| scene.node(node.parent()))
                .map_or(0, kestrel_core::Node::id);

            let mut components = Vec::new();
            if let Some(node) = scene.node(handle) {
                for &component in node.components() {
                    let Some(component_state) = capture_component_state(scene, component) else {
                        continue;
                    };
                    // Local-range components stay observer-private.
                    if component_state.id == 0
                        || CreateMode::of(component_state.id) != CreateMode::Replicated
                    {
                        continue;
                    }
                    created_components.insert(component_state.id);
                    newly_known_components.push(component_state.id);
                    components.push(component_state);
                }
            }

            newly_known_nodes.push(id);
            messages.push(DeltaMessage::CreateNode {
                id,
                parent,
                state,
                components,
            });
        }

        // Updates for nodes the observer already has.
        for &id in &dirty_nodes {
            if newly_known_nodes.contains(&id) {
                continue;
            }
            let Some(handle) = scene.get_node(id) else {
                continue;
            };
            if !self.node_known(scene, observer, id) {
                continue;
            }
            if let Some(state) = capture_node_state(scene, handle) {
                messages.push(DeltaMessage::UpdateNode { id, state });
            }
        }

        // Component creations and updates.
        for &id in &dirty_components {
            if created_components.contains(&id) {
                continue;
            }
            let Some(handle) = scene.get_component(id) else {
                continue;
            };
            if self.component_known(scene, observer, id) {
                if let Some(state) = capture_component_state(scene, handle) {
                    messages.push(DeltaMessage::UpdateComponent {
                        id,
                        values: state.values,
                    });
                }
                continue;
            }
            let owner = scene
                .component(handle)
                .and_then(|slot| scene.node(slot.node()))
                .map_or(0, kestrel_core::Node::id);
            let owner_known =
                newly_known_nodes.contains(&owner) || self.node_known(scene, observer, owner);
            if owner_known {
                if let Some(component) = capture_component_state(scene, handle) {
                    newly_known_components.push(id);
                    messages.push(DeltaMessage::CreateComponent {
                        node: owner,
                        component,
                    });
                }
            } else {
                tracing::debug!(
                    "component {id} dirty but node {owner} unknown to observer {}",
                    observer.raw()
                );
            }
        }

        if let Some(state) = scene.observer_state_mut(observer) {
            for id in forget_components {
                state.forget_component(id);
            }
            for id in forget_nodes {
                state.forget_node(id);
            }
            for id in newly_known_nodes {
                state.mark_node_known(id);
            }
            for id in newly_known_components {
                state.mark_component_known(id);
            }
        }

        Ok(DeltaBatch { messages })
    }

    fn node_known(&self, scene: &Scene, observer: ObserverId, id: u32) -> bool {
        scene
            .observer_state(observer)
            .is_some_and(|state| state.is_node_known(id))
    }

    fn component_known(&self, scene: &Scene, observer: ObserverId, id: u32) -> bool {
        scene
            .observer_state(observer)
            .is_some_and(|state| state.is_component_known(id))
    }
}

fn node_depth(scene: &Scene, handle: NodeHandle) -> u32 {
    let mut depth = 0;
    let mut current = handle;
    while let Some(node) = scene.node(current) {
        if node.parent().is_null() {
            break;
        }
        depth += 1;
        current = node.parent();
    }
    depth
}

fn capture_node_state(scene: &Scene, handle: NodeHandle) -> Option<NodeState> {
    let node = scene.node(handle)?;
    let transform = node.transform();
    Some(NodeState::capture(
        node.name(),
        transform.position,
        transform.rotation,
        transform.scale,
        node.is_enabled(),
        node.vars(),
    ))
}

fn capture_component_state(scene: &Scene, handle: ComponentHandle) -> Option<ComponentState> {
    let slot = scene.component(handle)?;
    let values = net_attribute_values(slot.component())
        .into_iter()
        .map(|(index, value)| (index as u32, value))
        .collect();
    Some(ComponentState {
        id: slot.id(),
        type_name: slot.component().type_name().to_owned(),
        values,
    })
}
