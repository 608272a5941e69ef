//! # Deferred Reference Resolution
//!
//! Serialized graphs may contain forward references: an attribute naming a
//! node that appears later in the stream. Loading therefore runs in two
//! passes. Pass one instantiates every node and component, recording
//! old-identifier → new-handle pairs here together with every reference
//! attribute encountered. Pass two ([`SceneResolver::resolve`]) rewrites
//! the recorded attributes to the freshly assigned identifiers. The
//! resolver is transient: one per load or instantiate, dropped afterwards.

use std::collections::HashMap;

use crate::handle::{ComponentHandle, NodeHandle};
use crate::scene::Scene;
use crate::variant::Variant;

/// One reference attribute awaiting rewrite.
#[derive(Debug, Clone)]
struct PendingReference {
    component: ComponentHandle,
    attr_index: usize,
    value: Variant,
}

/// Load-scoped old-identifier → new-object table.
#[derive(Debug, Default)]
pub struct SceneResolver {
    nodes: HashMap<u32, NodeHandle>,
    components: HashMap<u32, ComponentHandle>,
    pending: Vec<PendingReference>,
}

impl SceneResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a node instantiated under `old_id` in the source data.
    pub fn add_node(&mut self, old_id: u32, handle: NodeHandle) {
        if old_id != 0 {
            self.nodes.insert(old_id, handle);
        }
    }

    /// Records a component instantiated under `old_id` in the source data.
    pub fn add_component(&mut self, old_id: u32, handle: ComponentHandle) {
        if old_id != 0 {
            self.components.insert(old_id, handle);
        }
    }

    /// Number of nodes recorded so far.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Handles of every component instantiated during this load, for the
    /// post-load `apply_attributes` sweep.
    #[must_use]
    pub fn component_handles(&self) -> Vec<ComponentHandle> {
        self.components.values().copied().collect()
    }

    /// Records a reference attribute for the second pass.
    ///
    /// Non-reference values and null references are ignored, so callers can
    /// funnel every loaded attribute through here.
    pub fn note_reference(
        &mut self,
        component: ComponentHandle,
        attr_index: usize,
        value: &Variant,
    ) {
        match value {
            Variant::NodeRef(id) | Variant::ComponentRef(id) if *id != 0 => {
                self.pending.push(PendingReference {
                    component,
                    attr_index,
                    value: value.clone(),
                });
            }
            _ => {}
        }
    }

    /// Pass two: rewrites every recorded reference attribute to the live
    /// identifier of its target.
    ///
    /// A reference whose target never appeared in the source data is
    /// nulled and logged; a missing target is not an error (the field is
    /// simply reset to its unset default).
    pub fn resolve(self, scene: &mut Scene) {
        for pending in &self.pending {
            let rewritten = match pending.value {
                Variant::NodeRef(old_id) => self
                    .nodes
                    .get(&old_id)
                    .and_then(|&handle| scene.node(handle))
                    .map_or(Variant::NodeRef(0), |node| Variant::NodeRef(node.id())),
                Variant::ComponentRef(old_id) => self
                    .components
                    .get(&old_id)
                    .and_then(|&handle| scene.component(handle))
                    .map_or(Variant::ComponentRef(0), |slot| {
                        Variant::ComponentRef(slot.id())
                    }),
                _ => continue,
            };

            if matches!(rewritten, Variant::NodeRef(0) | Variant::ComponentRef(0)) {
                tracing::debug!("nulling unresolved reference {:?}", pending.value);
            }
            scene.rewrite_component_attribute(pending.component, pending.attr_index, &rewritten);
        }
    }
}
