//! # Replica Application
//!
//! The receive side: applies a decoded [`DeltaBatch`] to an observing
//! scene. Objects are addressed by their wire identifiers through the
//! scene's O(1) identifier lookup; unknown identifiers are logged and
//! skipped, never fatal. After the whole batch is applied,
//! `apply_attributes` runs once per touched component so derived-state
//! rebuilds batch across the burst.

use kestrel_core::{ComponentHandle, NodeHandle, Scene, Transform, Variant};

use crate::protocol::{ComponentState, DeltaBatch, DeltaMessage, NodeState};

/// Applies one batch to a replica scene, returning how many messages took
/// effect.
pub fn apply_batch(scene: &mut Scene, batch: &DeltaBatch) -> usize {
    let mut touched: Vec<ComponentHandle> = Vec::new();
    let mut applied = 0;

    for message in &batch.messages {
        match message {
            DeltaMessage::RemoveComponent { id } => {
                if let Some(handle) = scene.get_component(*id) {
                    if scene.remove_component(handle) {
                        applied += 1;
                    }
                } else {
                    tracing::debug!("removal for unknown component {id}");
                }
            }
            DeltaMessage::RemoveNode { id } => {
                if let Some(handle) = scene.get_node(*id) {
                    if scene.remove_node(handle) {
                        applied += 1;
                    }
                } else {
                    tracing::debug!("removal for unknown node {id}");
                }
            }
            DeltaMessage::CreateNode {
                id,
                parent,
                state,
                components,
            } => {
                // An unknown parent (e.g. one that is LOCAL on the host)
                // reparents under the replica root.
                let parent_handle = scene.get_node(*parent).unwrap_or_else(|| scene.root());
                match scene.create_child_with_id(parent_handle, &state.name, *id) {
                    Ok(handle) => {
                        apply_node_state(scene, handle, state);
                        for component in components {
                            if let Some(created) = create_component(scene, handle, component) {
                                touched.push(created);
                            }
                        }
                        applied += 1;
                    }
                    Err(error) => {
                        tracing::warn!("failed to create replicated node {id}: {error}");
                    }
                }
            }
            DeltaMessage::UpdateNode { id, state } => {
                if let Some(handle) = scene.get_node(*id) {
                    apply_node_state(scene, handle, state);
                    applied += 1;
                } else {
                    tracing::debug!("update for unknown node {id}");
                }
            }
            DeltaMessage::CreateComponent { node, component } => {
                if let Some(handle) = scene.get_node(*node) {
                    if let Some(created) = create_component(scene, handle, component) {
                        touched.push(created);
                        applied += 1;
                    }
                } else {
                    tracing::debug!(
                        "component {} arrived for unknown node {node}",
                        component.id
                    );
                }
            }
            DeltaMessage::UpdateComponent { id, values } => {
                if let Some(handle) = scene.get_component(*id) {
                    apply_component_values(scene, handle, values);
                    touched.push(handle);
                    applied += 1;
                } else {
                    tracing::debug!("update for unknown component {id}");
                }
            }
        }
    }

    scene.apply_attributes(&touched);
    applied
}

fn apply_node_state(scene: &mut Scene, handle: NodeHandle, state: &NodeState) {
    scene.set_name(handle, &state.name);
    scene.set_transform(
        handle,
        Transform {
            position: state.position,
            rotation: state.rotation,
            scale: state.scale,
        },
    );
    scene.set_enabled(handle, state.enabled);
    for (key, value) in &state.vars {
        scene.set_var(handle, key, value.clone());
    }
}

fn create_component(
    scene: &mut Scene,
    node: NodeHandle,
    state: &ComponentState,
) -> Option<ComponentHandle> {
    match scene.add_component_with_id(node, &state.type_name, state.id) {
        Ok(handle) => {
            apply_component_values(scene, handle, &state.values);
            Some(handle)
        }
        Err(error) => {
            tracing::warn!(
                "failed to create replicated component {} ({}): {error}",
                state.id,
                state.type_name
            );
            None
        }
    }
}

fn apply_component_values(scene: &mut Scene, handle: ComponentHandle, values: &[(u32, Variant)]) {
    for (index, value) in values {
        if !scene.set_component_attribute(handle, *index as usize, value) {
            tracing::debug!("rejected replicated attribute {index}");
        }
    }
}
