//! # Mesh Renderer
//!
//! The renderable consumer of the transform-dirty path. The renderer bridge
//! reads the cached world matrix this component maintains; a missed dirty
//! notification here means stale geometry on screen, which is why the
//! propagation contract is load-bearing.

use std::any::Any;
use std::sync::Arc;

use glam::Mat4;

use crate::attribute::{mode, AttributeInfo};
use crate::component::Component;
use crate::context::{EngineContext, Resource};
use crate::node::Node;
use crate::variant::Variant;

/// Renderable model binding.
pub struct MeshRenderer {
    model: String,
    visible: bool,
    loaded: Option<Arc<Resource>>,
    world_cache: Option<Mat4>,
    dirty_notifications: u32,
}

impl Default for MeshRenderer {
    fn default() -> Self {
        Self {
            model: String::new(),
            visible: true,
            loaded: None,
            world_cache: None,
            dirty_notifications: 0,
        }
    }
}

impl MeshRenderer {
    /// Factory type tag.
    pub const TYPE: &'static str = "MeshRenderer";

    /// Schema index of the model resource name.
    pub const ATTR_MODEL: usize = 0;
    /// Schema index of the visibility flag.
    pub const ATTR_VISIBLE: usize = 1;

    const SCHEMA: &'static [AttributeInfo] = &[
        AttributeInfo::new("model", mode::DEFAULT),
        AttributeInfo::new("visible", mode::DEFAULT),
    ];

    /// Name of the bound model resource.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Visibility flag.
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.visible
    }

    /// True once the model resource was found in the cache.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// Cached world matrix, if no dirty notification invalidated it since
    /// the last refresh.
    #[must_use]
    pub const fn cached_world(&self) -> Option<Mat4> {
        self.world_cache
    }

    /// Stores a freshly composed world matrix.
    pub fn refresh_world(&mut self, world: Mat4) {
        self.world_cache = Some(world);
    }

    /// Number of dirty notifications received; exercised by the
    /// propagation tests.
    #[must_use]
    pub const fn dirty_notifications(&self) -> u32 {
        self.dirty_notifications
    }
}

impl Component for MeshRenderer {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn attributes(&self) -> &'static [AttributeInfo] {
        Self::SCHEMA
    }

    fn attribute(&self, index: usize) -> Variant {
        match index {
            Self::ATTR_MODEL => Variant::String(self.model.clone()),
            Self::ATTR_VISIBLE => Variant::Bool(self.visible),
            _ => Variant::Empty,
        }
    }

    fn set_attribute(&mut self, index: usize, value: &Variant) -> bool {
        match index {
            Self::ATTR_MODEL => match value.as_str() {
                Some(name) => {
                    self.model = name.to_owned();
                    self.loaded = None;
                    true
                }
                None => false,
            },
            Self::ATTR_VISIBLE => match value.as_bool() {
                Some(visible) => {
                    self.visible = visible;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    fn apply_attributes(&mut self, ctx: &EngineContext) {
        if self.model.is_empty() {
            self.loaded = None;
            return;
        }
        let Some(cache) = ctx.resource_cache() else {
            self.loaded = None;
            return;
        };
        self.loaded = cache.get_resource("Model", &self.model);
        if self.loaded.is_none() {
            tracing::warn!("model resource '{}' not found", self.model);
        }
    }

    fn on_marked_dirty(&mut self, _node: &Node) {
        self.world_cache = None;
        self.dirty_notifications += 1;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
