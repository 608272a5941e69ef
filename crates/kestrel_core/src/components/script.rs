//! # Scripted Behavior
//!
//! Attaches a named script resource to a node. The script payload itself is
//! opaque to the scene core (the scripting bridge compiles and runs it),
//! but the component owns the resource binding, the opaque state blob that
//! rides along in saves, and the explicit network-dirty path for events the
//! attribute diff cannot see.

use std::any::Any;
use std::sync::Arc;

use crate::attribute::{mode, AttributeInfo};
use crate::component::Component;
use crate::context::{EngineContext, Resource};
use crate::handle::NodeHandle;
use crate::node::Node;
use crate::variant::Variant;

/// Scripted behavior unit.
#[derive(Default)]
pub struct ScriptBehavior {
    script: String,
    state: Vec<u8>,
    target: u32,
    node: NodeHandle,
    loaded: Option<Arc<Resource>>,
    accumulated_time: f32,
}

impl ScriptBehavior {
    /// Factory type tag.
    pub const TYPE: &'static str = "ScriptBehavior";

    /// Schema index of the script resource name.
    pub const ATTR_SCRIPT: usize = 0;
    /// Schema index of the opaque state blob.
    pub const ATTR_STATE: usize = 1;
    /// Schema index of the target node reference.
    pub const ATTR_TARGET: usize = 2;

    const SCHEMA: &'static [AttributeInfo] = &[
        AttributeInfo::new("script", mode::DEFAULT),
        AttributeInfo::new("state", mode::DEFAULT),
        AttributeInfo::new("target", mode::DEFAULT),
    ];

    /// Name of the bound script resource.
    #[must_use]
    pub fn script(&self) -> &str {
        &self.script
    }

    /// Opaque script state blob.
    #[must_use]
    pub fn state(&self) -> &[u8] {
        &self.state
    }

    /// Replaces the opaque state blob.
    ///
    /// State changes are not cheaply diffable; callers that need the new
    /// state replicated pair this with the scene's explicit
    /// `mark_network_update_component`.
    pub fn set_state(&mut self, state: Vec<u8>) {
        self.state = state;
    }

    /// Scene identifier of the node this behavior acts on; 0 when unset.
    ///
    /// Serialized streams may reference nodes that appear later in the
    /// data; the load-time resolution pass rewrites this field after the
    /// whole subtree exists.
    #[must_use]
    pub const fn target(&self) -> u32 {
        self.target
    }

    /// True once the script resource was found in the cache.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// Handle of the owning node.
    #[must_use]
    pub const fn owner(&self) -> NodeHandle {
        self.node
    }

    /// Seconds of scaled scene time this behavior has run for.
    #[must_use]
    pub const fn accumulated_time(&self) -> f32 {
        self.accumulated_time
    }
}

impl Component for ScriptBehavior {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn attributes(&self) -> &'static [AttributeInfo] {
        Self::SCHEMA
    }

    fn attribute(&self, index: usize) -> Variant {
        match index {
            Self::ATTR_SCRIPT => Variant::String(self.script.clone()),
            Self::ATTR_STATE => Variant::Buffer(self.state.clone()),
            Self::ATTR_TARGET => Variant::NodeRef(self.target),
            _ => Variant::Empty,
        }
    }

    fn set_attribute(&mut self, index: usize, value: &Variant) -> bool {
        match index {
            Self::ATTR_SCRIPT => match value.as_str() {
                Some(name) => {
                    self.script = name.to_owned();
                    // Binding happens in apply_attributes.
                    self.loaded = None;
                    true
                }
                None => false,
            },
            Self::ATTR_STATE => match value {
                Variant::Buffer(data) => {
                    self.state = data.clone();
                    true
                }
                _ => false,
            },
            Self::ATTR_TARGET => match value.as_node_ref() {
                Some(id) => {
                    self.target = id;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    fn apply_attributes(&mut self, ctx: &EngineContext) {
        if self.script.is_empty() {
            self.loaded = None;
            return;
        }
        let Some(cache) = ctx.resource_cache() else {
            tracing::warn!(
                "no resource cache available, script '{}' stays unbound",
                self.script
            );
            self.loaded = None;
            return;
        };
        self.loaded = cache.get_resource("Script", &self.script);
        if self.loaded.is_none() {
            tracing::warn!("script resource '{}' not found", self.script);
        }
    }

    fn on_node_set(&mut self, node: NodeHandle) {
        self.node = node;
    }

    fn on_update(&mut self, _node: &mut Node, time_step: f32) {
        if self.loaded.is_some() {
            self.accumulated_time += time_step;
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
