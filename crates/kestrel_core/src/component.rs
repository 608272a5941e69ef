//! # Components
//!
//! A component is a polymorphic behavior unit owned by exactly one node.
//! The set of component kinds is closed per build but open for extension:
//! kinds register a factory closure against a type tag at startup, and the
//! node/scene code depends only on the [`Component`] capability surface
//! (attribute schema, lifecycle hooks, update hooks), never on concrete
//! types.

use std::any::Any;
use std::collections::HashMap;

use crate::attribute::AttributeInfo;
use crate::context::EngineContext;
use crate::handle::NodeHandle;
use crate::node::Node;
use crate::variant::Variant;

/// Capability surface every component kind implements.
///
/// Attribute access is index-based against the static schema returned by
/// [`Component::attributes`]; the same schema drives file serialization,
/// the structured-text document and network replication.
pub trait Component: Any {
    /// Type tag used by the factory registry and the serializers.
    fn type_name(&self) -> &'static str;

    /// Static attribute schema, in serialization order.
    fn attributes(&self) -> &'static [AttributeInfo];

    /// Reads the current value of one attribute.
    fn attribute(&self, index: usize) -> Variant;

    /// Validates, clamps and stores one attribute value.
    ///
    /// Returns false if the index is out of range or the value's type does
    /// not fit the attribute. Implementations that derive expensive state
    /// from attributes should only flag the rebuild here and perform it in
    /// [`Component::apply_attributes`].
    fn set_attribute(&mut self, index: usize, value: &Variant) -> bool;

    /// Invoked once after a bulk load or a network attribute burst, never
    /// per individual field-set. Expensive derived-state rebuilds belong
    /// here.
    fn apply_attributes(&mut self, _ctx: &EngineContext) {}

    /// Invoked when the component is attached to its owning node.
    fn on_node_set(&mut self, _node: NodeHandle) {}

    /// Invoked when the owning node's world transform was invalidated.
    fn on_marked_dirty(&mut self, _node: &Node) {}

    /// Variable-timestep logic phase.
    fn on_update(&mut self, _node: &mut Node, _time_step: f32) {}

    /// Subsystem phase; fixed-timestep stepping happens here.
    fn on_subsystem_update(&mut self, _node: &mut Node, _time_step: f32) {}

    /// Transform-smoothing phase.
    ///
    /// Returns true if the node's local transform was written, so the scene
    /// re-runs dirty propagation for that node after the phase.
    fn on_smoothing(
        &mut self,
        _node: &mut Node,
        _constant: f32,
        _squared_snap_threshold: f32,
    ) -> bool {
        false
    }

    /// Post-update logic phase; observes smoothed transforms.
    fn on_post_update(&mut self, _node: &mut Node, _time_step: f32) {}

    /// Upcast for typed downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for typed downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Scene-side wrapper around one attached component.
///
/// Carries the identity and replication bookkeeping the scene owns for the
/// component: its identifier, its back-reference to the owning node, the
/// explicit network-dirty flag and the last-prepared snapshot of its
/// NET-mode attribute values.
pub struct ComponentSlot {
    pub(crate) id: u32,
    pub(crate) node: NodeHandle,
    pub(crate) network_dirty: bool,
    pub(crate) net_snapshot: Option<Vec<Variant>>,
    pub(crate) inner: Box<dyn Component>,
}

impl ComponentSlot {
    pub(crate) fn new(node: NodeHandle, inner: Box<dyn Component>) -> Self {
        Self {
            id: 0,
            node,
            network_dirty: false,
            net_snapshot: None,
            inner,
        }
    }

    /// Scene identifier; 0 while unregistered.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Handle of the owning node.
    #[inline]
    #[must_use]
    pub const fn node(&self) -> NodeHandle {
        self.node
    }

    /// True if game logic explicitly queued this component for the next
    /// network attribute check.
    #[inline]
    #[must_use]
    pub const fn is_network_dirty(&self) -> bool {
        self.network_dirty
    }

    /// Borrows the behavior unit.
    #[inline]
    #[must_use]
    pub fn component(&self) -> &dyn Component {
        self.inner.as_ref()
    }

    /// Mutably borrows the behavior unit.
    #[inline]
    pub fn component_mut(&mut self) -> &mut dyn Component {
        self.inner.as_mut()
    }

    /// Typed borrow of the behavior unit.
    #[must_use]
    pub fn downcast<C: Component>(&self) -> Option<&C> {
        self.inner.as_any().downcast_ref::<C>()
    }

    /// Typed mutable borrow of the behavior unit.
    pub fn downcast_mut<C: Component>(&mut self) -> Option<&mut C> {
        self.inner.as_any_mut().downcast_mut::<C>()
    }
}

/// Factory closure producing a fresh, default-initialized component.
pub type ComponentFactory = Box<dyn Fn() -> Box<dyn Component> + Send + Sync>;

/// Registry of component constructors keyed by type tag.
///
/// Process-lifetime state that is explicitly constructed and handed to the
/// scene through [`EngineContext`]; there is no ambient global registry.
#[derive(Default)]
pub struct ComponentRegistry {
    factories: HashMap<&'static str, ComponentFactory>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Creates a registry with every built-in component kind registered.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::components::register_builtins(&mut registry);
        registry
    }

    /// Registers a factory under a type tag, replacing any previous entry.
    pub fn register(
        &mut self,
        type_name: &'static str,
        factory: impl Fn() -> Box<dyn Component> + Send + Sync + 'static,
    ) {
        self.factories.insert(type_name, Box::new(factory));
    }

    /// True if a factory exists for the type tag.
    #[must_use]
    pub fn is_registered(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Constructs a fresh component of the tagged kind.
    #[must_use]
    pub fn create(&self, type_name: &str) -> Option<Box<dyn Component>> {
        self.factories.get(type_name).map(|factory| factory())
    }

    /// Returns the number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// True if no kinds are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// Reads the current values of a component's FILE-mode attributes, in
/// schema order, paired with their indices.
#[must_use]
pub fn file_attribute_values(component: &dyn Component) -> Vec<(usize, Variant)> {
    component
        .attributes()
        .iter()
        .enumerate()
        .filter(|(_, info)| info.is_file())
        .map(|(index, _)| (index, component.attribute(index)))
        .collect()
}

/// Reads the current values of a component's NET-mode attributes, in
/// schema order, paired with their indices.
#[must_use]
pub fn net_attribute_values(component: &dyn Component) -> Vec<(usize, Variant)> {
    component
        .attributes()
        .iter()
        .enumerate()
        .filter(|(_, info)| info.is_net())
        .map(|(index, _)| (index, component.attribute(index)))
        .collect()
}
