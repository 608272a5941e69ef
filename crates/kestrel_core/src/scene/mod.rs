//! # Scene
//!
//! The root aggregate of the graph. A scene owns the node and component
//! arenas, the four identifier maps and allocator cursors, the per-frame
//! update loop, the progressive-load state machine and the replication
//! bookkeeping every observer delta is derived from.
//!
//! ## Threading
//!
//! The scene has exactly one writer: the main thread. During the
//! `begin_threaded_update`/`end_threaded_update` bracket, worker threads
//! may run read-mostly per-node work and enqueue dirty notifications
//! through a cloned [`DirtyQueue`]; every other mutation is main-thread
//! only and intentionally unsynchronized.

pub mod async_load;
pub mod resolver;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use glam::{Mat4, Quat, Vec3};
use parking_lot::Mutex;

use crate::arena::Arena;
use crate::component::{net_attribute_values, Component, ComponentSlot};
use crate::config::SceneConfig;
use crate::context::EngineContext;
use crate::error::{SceneError, SceneResult};
use crate::events::{EventHub, SceneEvent};
use crate::handle::{ComponentHandle, NodeHandle};
use crate::ids::{CreateMode, IdAllocator};
use crate::io;
use crate::node::Node;
use crate::replication::{ObserverId, SceneReplicationState};
use crate::transform::Transform;
use crate::variant::Variant;

use self::async_load::AsyncProgress;
use self::resolver::SceneResolver;

/// Cross-thread queue of components awaiting a deferred dirty
/// notification.
///
/// Cloned into worker threads during the threaded-update bracket; the main
/// thread drains it in `end_threaded_update`. This queue is the only
/// mutable state shared across threads.
#[derive(Clone, Default)]
pub struct DirtyQueue {
    inner: Arc<Mutex<Vec<ComponentHandle>>>,
}

impl DirtyQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a component for deferred notification.
    pub fn push(&self, handle: ComponentHandle) {
        self.inner.lock().push(handle);
    }

    /// Number of queued entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    fn take(&self) -> Vec<ComponentHandle> {
        std::mem::take(&mut *self.inner.lock())
    }
}

/// The scene graph root aggregate.
pub struct Scene {
    ctx: EngineContext,

    pub(crate) nodes: Arena<Node>,
    pub(crate) components: Arena<ComponentSlot>,
    root: NodeHandle,

    replicated_nodes: HashMap<u32, NodeHandle>,
    local_nodes: HashMap<u32, NodeHandle>,
    replicated_components: HashMap<u32, ComponentHandle>,
    local_components: HashMap<u32, ComponentHandle>,

    replicated_node_ids: IdAllocator,
    local_node_ids: IdAllocator,
    replicated_component_ids: IdAllocator,
    local_component_ids: IdAllocator,

    file_name: Option<String>,
    checksum: u32,
    required_packages: Vec<String>,

    active: bool,
    time_scale: f32,
    smoothing_constant: f32,
    snap_threshold: f32,
    elapsed_time: f32,

    pub(crate) async_state: Option<AsyncProgress>,

    threaded_update: bool,
    delayed_dirty: DirtyQueue,

    net_dirty_nodes: HashSet<u32>,
    net_dirty_components: HashSet<u32>,
    observers: HashMap<ObserverId, SceneReplicationState>,

    events: EventHub,
}

impl Scene {
    /// Creates an empty scene with default tunables.
    ///
    /// The root node is assigned the first free replicated identifier so
    /// children can refer to the scene itself as a parent.
    #[must_use]
    pub fn new(ctx: EngineContext) -> Self {
        Self::with_config(ctx, SceneConfig::default())
    }

    /// Creates an empty scene with explicit tunables.
    #[must_use]
    pub fn with_config(ctx: EngineContext, config: SceneConfig) -> Self {
        let mut scene = Self {
            ctx,
            nodes: Arena::new(),
            components: Arena::new(),
            root: NodeHandle::NULL,
            replicated_nodes: HashMap::new(),
            local_nodes: HashMap::new(),
            replicated_components: HashMap::new(),
            local_components: HashMap::new(),
            replicated_node_ids: IdAllocator::new(CreateMode::Replicated),
            local_node_ids: IdAllocator::new(CreateMode::Local),
            replicated_component_ids: IdAllocator::new(CreateMode::Replicated),
            local_component_ids: IdAllocator::new(CreateMode::Local),
            file_name: None,
            checksum: 0,
            required_packages: Vec::new(),
            active: true,
            time_scale: config.time_scale,
            smoothing_constant: config.smoothing_constant,
            snap_threshold: config.snap_threshold,
            elapsed_time: 0.0,
            async_state: None,
            threaded_update: false,
            delayed_dirty: DirtyQueue::new(),
            net_dirty_nodes: HashSet::new(),
            net_dirty_components: HashSet::new(),
            observers: HashMap::new(),
            events: EventHub::new(),
        };

        let mut root = Node::new("", NodeHandle::NULL);
        // The replicated range is empty here; allocation cannot fail.
        root.id = scene
            .replicated_node_ids
            .allocate(&scene.replicated_nodes)
            .unwrap_or(crate::ids::FIRST_REPLICATED_ID);
        let (index, generation) = scene.nodes.insert(root);
        scene.root = NodeHandle::new(index, generation);
        scene.register_node(scene.root);
        scene
    }

    /// The engine context this scene was constructed with.
    #[inline]
    #[must_use]
    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Handle of the scene root node.
    #[inline]
    #[must_use]
    pub const fn root(&self) -> NodeHandle {
        self.root
    }

    /// Subscribes to structural, update-phase and load-progress events.
    pub fn subscribe_events(&mut self) -> Receiver<SceneEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&mut self, event: &SceneEvent) {
        self.events.emit(event);
    }

    // =========================================================================
    // Node and component access
    // =========================================================================

    /// Borrows a node, if the handle is live.
    #[inline]
    #[must_use]
    pub fn node(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(handle.index(), handle.generation())
    }

    pub(crate) fn node_mut_internal(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        self.nodes.get_mut(handle.index(), handle.generation())
    }

    /// Borrows a component slot, if the handle is live.
    #[inline]
    #[must_use]
    pub fn component(&self, handle: ComponentHandle) -> Option<&ComponentSlot> {
        self.components.get(handle.index(), handle.generation())
    }

    pub(crate) fn component_slot_mut(
        &mut self,
        handle: ComponentHandle,
    ) -> Option<&mut ComponentSlot> {
        self.components.get_mut(handle.index(), handle.generation())
    }

    /// Typed borrow of an attached component.
    #[must_use]
    pub fn component_as<C: Component>(&self, handle: ComponentHandle) -> Option<&C> {
        self.component(handle)?.downcast::<C>()
    }

    /// Typed mutable borrow of an attached component.
    ///
    /// Mutating replicated state through this path does not mark the
    /// component network-dirty; pair it with
    /// [`Scene::mark_network_update_component`] when the change must reach
    /// observers.
    pub fn component_as_mut<C: Component>(&mut self, handle: ComponentHandle) -> Option<&mut C> {
        self.component_slot_mut(handle)?.downcast_mut::<C>()
    }

    /// Number of live nodes, including the root.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of live components.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// O(1) lookup of a node handle by scene identifier.
    #[must_use]
    pub fn get_node(&self, id: u32) -> Option<NodeHandle> {
        match CreateMode::of(id) {
            CreateMode::Replicated => self.replicated_nodes.get(&id).copied(),
            CreateMode::Local => self.local_nodes.get(&id).copied(),
        }
    }

    /// O(1) lookup of a component handle by scene identifier.
    #[must_use]
    pub fn get_component(&self, id: u32) -> Option<ComponentHandle> {
        match CreateMode::of(id) {
            CreateMode::Replicated => self.replicated_components.get(&id).copied(),
            CreateMode::Local => self.local_components.get(&id).copied(),
        }
    }

    /// Identifiers of every live replicated node, sorted.
    #[must_use]
    pub fn replicated_node_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.replicated_nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    // =========================================================================
    // Hierarchy mutation
    // =========================================================================

    /// Creates a child node under `parent` with a freshly allocated
    /// identifier in the given range.
    ///
    /// # Errors
    ///
    /// [`SceneError::StaleHandle`] if the parent does not resolve,
    /// [`SceneError::CapacityExceeded`] if the identifier range is full.
    pub fn create_child(
        &mut self,
        parent: NodeHandle,
        name: &str,
        mode: CreateMode,
    ) -> SceneResult<NodeHandle> {
        if self.node(parent).is_none() {
            return Err(SceneError::StaleHandle);
        }
        let id = match mode {
            CreateMode::Replicated => self.replicated_node_ids.allocate(&self.replicated_nodes)?,
            CreateMode::Local => self.local_node_ids.allocate(&self.local_nodes)?,
        };
        self.insert_child(parent, name, id)
    }

    /// Creates a child node adopting a caller-supplied identifier, e.g.
    /// one read from a scene stream or a network delta. An identifier of 0
    /// allocates from the replicated range instead.
    ///
    /// If another live node already holds the identifier, the new node
    /// wins: the earlier node stays in the hierarchy but loses scene
    /// membership, and a warning is logged.
    ///
    /// # Errors
    ///
    /// [`SceneError::StaleHandle`] if the parent does not resolve,
    /// [`SceneError::CapacityExceeded`] if 0 was passed and the replicated
    /// range is full.
    pub fn create_child_with_id(
        &mut self,
        parent: NodeHandle,
        name: &str,
        id: u32,
    ) -> SceneResult<NodeHandle> {
        if id == 0 {
            return self.create_child(parent, name, CreateMode::Replicated);
        }
        if self.node(parent).is_none() {
            return Err(SceneError::StaleHandle);
        }
        self.insert_child(parent, name, id)
    }

    fn insert_child(&mut self, parent: NodeHandle, name: &str, id: u32) -> SceneResult<NodeHandle> {
        let mut node = Node::new(name, parent);
        node.id = id;
        let (index, generation) = self.nodes.insert(node);
        let handle = NodeHandle::new(index, generation);

        if let Some(parent_node) = self.nodes.get_mut(parent.index(), parent.generation()) {
            parent_node.children.push(handle);
        }
        self.register_node(handle);
        Ok(handle)
    }

    /// Factory-constructs a component by type tag and attaches it with a
    /// freshly allocated identifier.
    ///
    /// # Errors
    ///
    /// [`SceneError::UnknownComponentType`] if no factory is registered,
    /// [`SceneError::StaleHandle`] / [`SceneError::CapacityExceeded`] as
    /// for node creation.
    pub fn add_component(
        &mut self,
        node: NodeHandle,
        type_name: &str,
        mode: CreateMode,
    ) -> SceneResult<ComponentHandle> {
        if self.node(node).is_none() {
            return Err(SceneError::StaleHandle);
        }
        let inner = self
            .ctx
            .components()
            .create(type_name)
            .ok_or_else(|| SceneError::UnknownComponentType(type_name.to_owned()))?;
        let id = match mode {
            CreateMode::Replicated => self
                .replicated_component_ids
                .allocate(&self.replicated_components)?,
            CreateMode::Local => self.local_component_ids.allocate(&self.local_components)?,
        };
        self.insert_component(node, inner, id)
    }

    /// Attaches a component adopting a caller-supplied identifier; see
    /// [`Scene::create_child_with_id`] for the duplicate rules.
    ///
    /// # Errors
    ///
    /// As for [`Scene::add_component`].
    pub fn add_component_with_id(
        &mut self,
        node: NodeHandle,
        type_name: &str,
        id: u32,
    ) -> SceneResult<ComponentHandle> {
        if id == 0 {
            return self.add_component(node, type_name, CreateMode::Replicated);
        }
        if self.node(node).is_none() {
            return Err(SceneError::StaleHandle);
        }
        let inner = self
            .ctx
            .components()
            .create(type_name)
            .ok_or_else(|| SceneError::UnknownComponentType(type_name.to_owned()))?;
        self.insert_component(node, inner, id)
    }

    fn insert_component(
        &mut self,
        node: NodeHandle,
        inner: Box<dyn Component>,
        id: u32,
    ) -> SceneResult<ComponentHandle> {
        let mut slot = ComponentSlot::new(node, inner);
        slot.id = id;
        let (index, generation) = self.components.insert(slot);
        let handle = ComponentHandle::new(index, generation);

        if let Some(owner) = self.nodes.get_mut(node.index(), node.generation()) {
            owner.components.push(handle);
        }
        if let Some(slot) = self.components.get_mut(index, generation) {
            slot.inner.on_node_set(node);
        }
        self.register_component(handle);
        Ok(handle)
    }

    /// Detaches a node from its parent and recursively destroys it, its
    /// components and its descendants, releasing every identifier.
    ///
    /// The scene root cannot be removed. Returns false for the root or a
    /// stale handle.
    pub fn remove_node(&mut self, handle: NodeHandle) -> bool {
        if handle == self.root {
            return false;
        }
        let Some(node) = self.node(handle) else {
            return false;
        };
        let parent = node.parent;
        if let Some(parent_node) = self.nodes.get_mut(parent.index(), parent.generation()) {
            parent_node.children.retain(|&child| child != handle);
        }
        self.destroy_subtree(handle);
        true
    }

    /// Removes every child of a node.
    pub fn remove_all_children(&mut self, handle: NodeHandle) {
        let Some(node) = self.node(handle) else {
            return;
        };
        for child in node.children.clone() {
            self.remove_node(child);
        }
    }

    /// Detaches and destroys one component, releasing its identifier.
    pub fn remove_component(&mut self, handle: ComponentHandle) -> bool {
        let Some(slot) = self.component(handle) else {
            return false;
        };
        let owner = slot.node;
        if let Some(node) = self.nodes.get_mut(owner.index(), owner.generation()) {
            node.components.retain(|&component| component != handle);
        }
        self.destroy_component(handle);
        true
    }

    /// Removes every component attached to a node.
    pub fn remove_all_components(&mut self, handle: NodeHandle) {
        let Some(node) = self.node(handle) else {
            return;
        };
        for component in node.components.clone() {
            self.remove_component(component);
        }
    }

    fn destroy_subtree(&mut self, handle: NodeHandle) {
        let Some(node) = self.node(handle) else {
            return;
        };
        let children = node.children.clone();
        let components = node.components.clone();
        for child in children {
            self.destroy_subtree(child);
        }
        for component in components {
            self.destroy_component(component);
        }
        self.unregister_node(handle);
        self.nodes.remove(handle.index(), handle.generation());
    }

    fn destroy_component(&mut self, handle: ComponentHandle) {
        self.unregister_component(handle);
        self.components.remove(handle.index(), handle.generation());
    }

    // =========================================================================
    // Identifier registration
    // =========================================================================

    fn register_node(&mut self, handle: NodeHandle) {
        let Some(node) = self.nodes.get_mut(handle.index(), handle.generation()) else {
            return;
        };
        node.scene_member = true;
        let id = node.id;

        let map = match CreateMode::of(id) {
            CreateMode::Replicated => &mut self.replicated_nodes,
            CreateMode::Local => &mut self.local_nodes,
        };
        if let Some(&existing) = map.get(&id) {
            if existing != handle {
                tracing::warn!("overwriting node with id {id}");
                map.insert(id, handle);
                if let Some(evicted) = self.nodes.get_mut(existing.index(), existing.generation())
                {
                    evicted.scene_member = false;
                }
            }
        } else {
            map.insert(id, handle);
        }

        if CreateMode::of(id) == CreateMode::Replicated {
            self.mark_replication_dirty_id(id);
            self.net_dirty_nodes.insert(id);
        }
        self.emit(&SceneEvent::NodeAdded { id });
    }

    fn unregister_node(&mut self, handle: NodeHandle) {
        let Some(node) = self.nodes.get_mut(handle.index(), handle.generation()) else {
            return;
        };
        let id = node.id;
        node.id = 0;
        node.scene_member = false;
        if id == 0 {
            return;
        }

        let map = match CreateMode::of(id) {
            CreateMode::Replicated => &mut self.replicated_nodes,
            CreateMode::Local => &mut self.local_nodes,
        };
        // A node evicted by a duplicate registration is no longer in the
        // map; only remove the entry that still points at it.
        if map.get(&id) == Some(&handle) {
            map.remove(&id);
        }

        if CreateMode::of(id) == CreateMode::Replicated {
            // Observers must be told to delete the node.
            self.mark_replication_dirty_id(id);
            self.net_dirty_nodes.remove(&id);
        }
        self.emit(&SceneEvent::NodeRemoved { id });
    }

    fn register_component(&mut self, handle: ComponentHandle) {
        let Some(slot) = self.components.get_mut(handle.index(), handle.generation()) else {
            return;
        };
        let id = slot.id;
        let owner = slot.node;

        let map = match CreateMode::of(id) {
            CreateMode::Replicated => &mut self.replicated_components,
            CreateMode::Local => &mut self.local_components,
        };
        if let Some(&existing) = map.get(&id) {
            if existing != handle {
                tracing::warn!("overwriting component with id {id}");
                map.insert(id, handle);
                if let Some(evicted) =
                    self.components.get_mut(existing.index(), existing.generation())
                {
                    evicted.id = 0;
                }
            }
        } else {
            map.insert(id, handle);
        }

        let owner_id = self.node(owner).map_or(0, Node::id);
        if CreateMode::of(id) == CreateMode::Replicated && id != 0 {
            self.mark_replication_dirty_id(owner_id);
            for state in self.observers.values_mut() {
                state.mark_component_dirty(id);
            }
            self.net_dirty_components.insert(id);
        }
        self.emit(&SceneEvent::ComponentAdded {
            node_id: owner_id,
            component_id: id,
        });
    }

    fn unregister_component(&mut self, handle: ComponentHandle) {
        let Some(slot) = self.components.get_mut(handle.index(), handle.generation()) else {
            return;
        };
        let id = slot.id;
        let owner = slot.node;
        slot.id = 0;
        if id == 0 {
            return;
        }

        let map = match CreateMode::of(id) {
            CreateMode::Replicated => &mut self.replicated_components,
            CreateMode::Local => &mut self.local_components,
        };
        if map.get(&id) == Some(&handle) {
            map.remove(&id);
        }

        let owner_id = self.node(owner).map_or(0, Node::id);
        if CreateMode::of(id) == CreateMode::Replicated {
            self.mark_replication_dirty_id(owner_id);
            for state in self.observers.values_mut() {
                state.mark_component_dirty(id);
            }
            self.net_dirty_components.remove(&id);
        }
        self.emit(&SceneEvent::ComponentRemoved {
            node_id: owner_id,
            component_id: id,
        });
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Finds a child by name within the immediate children, or anywhere in
    /// the subtree in depth-first order when `recursive` is set.
    #[must_use]
    pub fn child_by_name(
        &self,
        handle: NodeHandle,
        name: &str,
        recursive: bool,
    ) -> Option<NodeHandle> {
        let node = self.node(handle)?;
        for &child in &node.children {
            if self.node(child).is_some_and(|c| c.name == name) {
                return Some(child);
            }
        }
        if recursive {
            for &child in &node.children {
                if let Some(found) = self.child_by_name(child, name, true) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// First component of type `C` attached to the node itself.
    #[must_use]
    pub fn component_of<C: Component>(&self, handle: NodeHandle) -> Option<ComponentHandle> {
        let node = self.node(handle)?;
        node.components
            .iter()
            .copied()
            .find(|&component| self.component_as::<C>(component).is_some())
    }

    /// Every component of type `C` on the node, and on its descendants in
    /// depth-first traversal order when `recursive` is set.
    #[must_use]
    pub fn components_of<C: Component>(
        &self,
        handle: NodeHandle,
        recursive: bool,
    ) -> Vec<ComponentHandle> {
        let mut found = Vec::new();
        self.collect_components::<C>(handle, recursive, &mut found);
        found
    }

    fn collect_components<C: Component>(
        &self,
        handle: NodeHandle,
        recursive: bool,
        found: &mut Vec<ComponentHandle>,
    ) {
        let Some(node) = self.node(handle) else {
            return;
        };
        for &component in &node.components {
            if self.component_as::<C>(component).is_some() {
                found.push(component);
            }
        }
        if recursive {
            for &child in &node.children {
                self.collect_components::<C>(child, true, found);
            }
        }
    }

    /// Component of type `C` attached to the scene root; how collaborators
    /// such as a physics world are discovered.
    #[must_use]
    pub fn scene_component<C: Component>(&self) -> Option<ComponentHandle> {
        self.component_of::<C>(self.root)
    }

    /// True if the node and every ancestor are enabled.
    #[must_use]
    pub fn is_enabled_effective(&self, handle: NodeHandle) -> bool {
        let mut current = handle;
        while let Some(node) = self.node(current) {
            if !node.enabled {
                return false;
            }
            if node.parent.is_null() {
                return true;
            }
            current = node.parent;
        }
        false
    }

    // =========================================================================
    // Node state mutation
    // =========================================================================

    /// Renames a node.
    pub fn set_name(&mut self, handle: NodeHandle, name: &str) -> bool {
        let Some(node) = self.nodes.get_mut(handle.index(), handle.generation()) else {
            return false;
        };
        node.name.clear();
        node.name.push_str(name);
        self.queue_network_node(handle);
        true
    }

    /// Enables or disables a node; disabled subtrees skip update phases.
    pub fn set_enabled(&mut self, handle: NodeHandle, enabled: bool) -> bool {
        let Some(node) = self.nodes.get_mut(handle.index(), handle.generation()) else {
            return false;
        };
        node.enabled = enabled;
        self.queue_network_node(handle);
        true
    }

    /// Writes one variable in a node's bag.
    pub fn set_var(&mut self, handle: NodeHandle, key: &str, value: Variant) -> bool {
        let Some(node) = self.nodes.get_mut(handle.index(), handle.generation()) else {
            return false;
        };
        node.vars.insert(key.to_owned(), value);
        self.queue_network_node(handle);
        true
    }

    /// Replaces a node's local transform and propagates dirty state.
    pub fn set_transform(&mut self, handle: NodeHandle, transform: Transform) -> bool {
        let Some(node) = self.nodes.get_mut(handle.index(), handle.generation()) else {
            return false;
        };
        node.transform = transform;
        self.finish_transform_change(handle);
        true
    }

    /// Sets the local position only.
    pub fn set_position(&mut self, handle: NodeHandle, position: Vec3) -> bool {
        let Some(node) = self.nodes.get_mut(handle.index(), handle.generation()) else {
            return false;
        };
        node.transform.position = position;
        self.finish_transform_change(handle);
        true
    }

    /// Sets the local rotation only.
    pub fn set_rotation(&mut self, handle: NodeHandle, rotation: Quat) -> bool {
        let Some(node) = self.nodes.get_mut(handle.index(), handle.generation()) else {
            return false;
        };
        node.transform.rotation = rotation.normalize();
        self.finish_transform_change(handle);
        true
    }

    /// Sets the local scale only.
    pub fn set_scale(&mut self, handle: NodeHandle, scale: Vec3) -> bool {
        let Some(node) = self.nodes.get_mut(handle.index(), handle.generation()) else {
            return false;
        };
        node.transform.scale = scale;
        self.finish_transform_change(handle);
        true
    }

    /// Moves a node by an offset in parent space.
    pub fn translate(&mut self, handle: NodeHandle, offset: Vec3) -> bool {
        let Some(node) = self.nodes.get_mut(handle.index(), handle.generation()) else {
            return false;
        };
        node.transform.translate(offset);
        self.finish_transform_change(handle);
        true
    }

    /// Applies an incremental rotation.
    pub fn rotate(&mut self, handle: NodeHandle, delta: Quat) -> bool {
        let Some(node) = self.nodes.get_mut(handle.index(), handle.generation()) else {
            return false;
        };
        node.transform.rotate(delta);
        self.finish_transform_change(handle);
        true
    }

    /// Multiplies a node's scale.
    pub fn scale_by(&mut self, handle: NodeHandle, factor: Vec3) -> bool {
        let Some(node) = self.nodes.get_mut(handle.index(), handle.generation()) else {
            return false;
        };
        node.transform.scale_by(factor);
        self.finish_transform_change(handle);
        true
    }

    fn finish_transform_change(&mut self, handle: NodeHandle) {
        self.mark_dirty(handle);
        self.queue_network_node(handle);
    }

    /// Invalidates cached world transforms for a node and its whole
    /// subtree, notifying every attached component along the way.
    ///
    /// A renderable that misses this notification renders stale geometry;
    /// the fan-out is the correctness-critical path of the scene graph.
    pub fn mark_dirty(&mut self, handle: NodeHandle) {
        let mut stack = vec![handle];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get_mut(current.index(), current.generation()) else {
                continue;
            };
            node.world_dirty = true;
            let components = node.components.clone();
            stack.extend(node.children.iter().copied());

            for component in components {
                self.mark_component_dirty(component);
            }
        }
    }

    /// Routes one component dirty notification: immediate on the main
    /// thread, deferred into the queue during the threaded-update bracket.
    pub fn mark_component_dirty(&mut self, handle: ComponentHandle) {
        if self.threaded_update {
            self.delayed_dirty.push(handle);
        } else {
            self.notify_component_dirty(handle);
        }
    }

    fn notify_component_dirty(&mut self, handle: ComponentHandle) {
        let Some(slot) = self.components.get(handle.index(), handle.generation()) else {
            return;
        };
        let owner = slot.node;
        let Some(node) = self.nodes.get(owner.index(), owner.generation()) else {
            return;
        };
        let Some(slot) = self.components.get_mut(handle.index(), handle.generation()) else {
            return;
        };
        slot.inner.on_marked_dirty(node);
    }

    /// Composes and caches the world transform of a node through its
    /// ancestor chain.
    pub fn world_transform(&mut self, handle: NodeHandle) -> Option<Mat4> {
        let node = self.node(handle)?;
        if !node.world_dirty {
            return Some(node.world);
        }
        let parent = node.parent;
        let local = node.transform.matrix();
        let world = if parent.is_null() {
            local
        } else {
            self.world_transform(parent)? * local
        };
        let node = self.nodes.get_mut(handle.index(), handle.generation())?;
        node.world = world;
        node.world_dirty = false;
        Some(world)
    }

    // =========================================================================
    // Component attribute access
    // =========================================================================

    /// Reads one component attribute by schema index.
    #[must_use]
    pub fn component_attribute(&self, handle: ComponentHandle, index: usize) -> Option<Variant> {
        let slot = self.component(handle)?;
        if index >= slot.component().attributes().len() {
            return None;
        }
        Some(slot.component().attribute(index))
    }

    /// Writes one component attribute by schema index and queues the
    /// component for the next network attribute check.
    pub fn set_component_attribute(
        &mut self,
        handle: ComponentHandle,
        index: usize,
        value: &Variant,
    ) -> bool {
        let Some(slot) = self.components.get_mut(handle.index(), handle.generation()) else {
            return false;
        };
        if !slot.inner.set_attribute(index, value) {
            return false;
        }
        self.queue_network_component(handle);
        true
    }

    /// Attribute write used by reference resolution; bypasses network
    /// queueing because resolution happens inside a load.
    pub(crate) fn rewrite_component_attribute(
        &mut self,
        handle: ComponentHandle,
        index: usize,
        value: &Variant,
    ) {
        if let Some(slot) = self.components.get_mut(handle.index(), handle.generation()) {
            slot.inner.set_attribute(index, value);
        }
    }

    // =========================================================================
    // Frame update
    // =========================================================================

    /// Advances the scene by one frame.
    ///
    /// While a progressive load is in flight this consumes the frame's load
    /// budget instead. Otherwise the four phases run in strict order:
    /// variable-timestep logic, subsystems, transform smoothing, post
    /// update. Elapsed time accumulates at the end.
    pub fn update(&mut self, time_step: f32) {
        if self.async_state.is_some() {
            self.update_async_loading();
            return;
        }
        if !self.active {
            return;
        }

        let dt = time_step * self.time_scale;

        self.emit(&SceneEvent::Update { time_step: dt });
        self.run_phase(|component, node| component.on_update(node, dt));

        self.emit(&SceneEvent::SubsystemUpdate { time_step: dt });
        self.run_phase(|component, node| component.on_subsystem_update(node, dt));

        let constant = 1.0 - 2.0_f32.powf(-dt * self.smoothing_constant).clamp(0.0, 1.0);
        let squared_snap_threshold = self.snap_threshold * self.snap_threshold;
        self.emit(&SceneEvent::UpdateSmoothing {
            constant,
            squared_snap_threshold,
        });
        self.run_smoothing_phase(constant, squared_snap_threshold);

        self.emit(&SceneEvent::PostUpdate { time_step: dt });
        self.run_phase(|component, node| component.on_post_update(node, dt));

        self.elapsed_time += dt;
    }

    fn phase_component_handles(&self) -> Vec<ComponentHandle> {
        self.components
            .iter()
            .map(|(index, generation, _)| ComponentHandle::new(index, generation))
            .collect()
    }

    fn run_phase(&mut self, mut hook: impl FnMut(&mut dyn Component, &mut Node)) {
        for handle in self.phase_component_handles() {
            let Some(slot) = self.components.get(handle.index(), handle.generation()) else {
                continue;
            };
            let owner = slot.node;
            if !self.is_enabled_effective(owner) {
                continue;
            }
            let Some(slot) = self.components.get_mut(handle.index(), handle.generation()) else {
                continue;
            };
            let Some(node) = self.nodes.get_mut(owner.index(), owner.generation()) else {
                continue;
            };
            hook(slot.inner.as_mut(), node);
        }
    }

    fn run_smoothing_phase(&mut self, constant: f32, squared_snap_threshold: f32) {
        let mut moved: Vec<NodeHandle> = Vec::new();
        for handle in self.phase_component_handles() {
            let Some(slot) = self.components.get(handle.index(), handle.generation()) else {
                continue;
            };
            let owner = slot.node;
            if !self.is_enabled_effective(owner) {
                continue;
            }
            let Some(slot) = self.components.get_mut(handle.index(), handle.generation()) else {
                continue;
            };
            let Some(node) = self.nodes.get_mut(owner.index(), owner.generation()) else {
                continue;
            };
            if slot
                .inner
                .on_smoothing(node, constant, squared_snap_threshold)
            {
                moved.push(owner);
            }
        }
        // Smoothing wrote transforms silently; run the normal dirty path
        // once per moved node after the phase.
        for handle in moved {
            self.finish_transform_change(handle);
        }
    }

    // =========================================================================
    // Threaded update bracket
    // =========================================================================

    /// Enters the threaded-update bracket if the work queue actually has
    /// workers; otherwise notifications stay immediate.
    pub fn begin_threaded_update(&mut self) {
        if self.ctx.work_queue().num_threads() > 0 {
            self.threaded_update = true;
        }
    }

    /// Leaves the bracket and applies every deferred dirty notification on
    /// the calling thread, in enqueue order.
    pub fn end_threaded_update(&mut self) {
        if !self.threaded_update {
            return;
        }
        self.threaded_update = false;
        for handle in self.delayed_dirty.take() {
            self.notify_component_dirty(handle);
        }
    }

    /// True while inside the threaded-update bracket.
    #[must_use]
    pub const fn is_threaded_update(&self) -> bool {
        self.threaded_update
    }

    /// Clones the deferred-dirty queue for worker threads to push into.
    #[must_use]
    pub fn dirty_queue(&self) -> DirtyQueue {
        self.delayed_dirty.clone()
    }

    // =========================================================================
    // Replication bookkeeping
    // =========================================================================

    /// Queues a node for the next network attribute check.
    pub fn mark_network_update_node(&mut self, handle: NodeHandle) {
        self.queue_network_node(handle);
    }

    /// Explicitly marks a component network-dirty, forcing it into the next
    /// delta even if its attribute values compare equal. Game logic uses
    /// this for state the diff cannot see.
    pub fn mark_network_update_component(&mut self, handle: ComponentHandle) {
        let Some(slot) = self.components.get_mut(handle.index(), handle.generation()) else {
            return;
        };
        let id = slot.id;
        if id != 0 && CreateMode::of(id) == CreateMode::Replicated {
            slot.network_dirty = true;
            self.net_dirty_components.insert(id);
        }
    }

    fn queue_network_node(&mut self, handle: NodeHandle) {
        if let Some(node) = self.node(handle) {
            let id = node.id;
            if id != 0 && CreateMode::of(id) == CreateMode::Replicated {
                self.net_dirty_nodes.insert(id);
            }
        }
    }

    fn queue_network_component(&mut self, handle: ComponentHandle) {
        if let Some(slot) = self.component(handle) {
            let id = slot.id;
            if id != 0 && CreateMode::of(id) == CreateMode::Replicated {
                self.net_dirty_components.insert(id);
            }
        }
    }

    /// Single choke point for replication fan-out: marks one replicated
    /// node identifier dirty in every tracked observer state.
    pub fn mark_replication_dirty(&mut self, handle: NodeHandle) {
        if let Some(node) = self.node(handle) {
            let id = node.id;
            self.mark_replication_dirty_id(id);
        }
    }

    fn mark_replication_dirty_id(&mut self, id: u32) {
        if id == 0 || CreateMode::of(id) != CreateMode::Replicated {
            return;
        }
        for state in self.observers.values_mut() {
            state.mark_node_dirty(id);
        }
    }

    /// Drains the scene-level dirty sets accumulated since the last call,
    /// diffing each entry against its last-prepared snapshot and fanning
    /// real changes out into every observer state. Called once per
    /// outgoing-delta cycle.
    pub fn prepare_network_update(&mut self) {
        let mut node_ids: Vec<u32> = self.net_dirty_nodes.drain().collect();
        node_ids.sort_unstable();
        for id in node_ids {
            let Some(&handle) = self.replicated_nodes.get(&id) else {
                continue;
            };
            let changed = {
                let Some(node) = self.nodes.get_mut(handle.index(), handle.generation()) else {
                    continue;
                };
                let state = node.net_state();
                let differs = node.net_snapshot.as_ref() != Some(&state);
                if differs {
                    node.net_snapshot = Some(state);
                }
                differs
            };
            if changed {
                self.mark_replication_dirty_id(id);
            }
        }

        let mut component_ids: Vec<u32> = self.net_dirty_components.drain().collect();
        component_ids.sort_unstable();
        for id in component_ids {
            let Some(&handle) = self.replicated_components.get(&id) else {
                continue;
            };
            let changed = {
                let Some(slot) = self.components.get_mut(handle.index(), handle.generation())
                else {
                    continue;
                };
                let values: Vec<Variant> = net_attribute_values(slot.component())
                    .into_iter()
                    .map(|(_, value)| value)
                    .collect();
                let forced = slot.network_dirty;
                slot.network_dirty = false;
                let differs = slot.net_snapshot.as_ref() != Some(&values);
                if differs {
                    slot.net_snapshot = Some(values);
                }
                forced || differs
            };
            if changed {
                for state in self.observers.values_mut() {
                    state.mark_component_dirty(id);
                }
            }
        }
    }

    /// Registers a new observer and seeds its replication state with every
    /// live replicated node identifier, producing a full resync on its
    /// first delta.
    pub fn add_replication_observer(&mut self, id: ObserverId) -> &mut SceneReplicationState {
        let mut seeded = SceneReplicationState::new();
        for &node_id in self.replicated_nodes.keys() {
            seeded.mark_node_dirty(node_id);
        }
        let state = self.observers.entry(id).or_default();
        *state = seeded;
        state
    }

    /// Drops an observer's replication state. Returns false if it was not
    /// tracked.
    pub fn remove_replication_observer(&mut self, id: ObserverId) -> bool {
        self.observers.remove(&id).is_some()
    }

    /// Borrows an observer's replication state.
    #[must_use]
    pub fn observer_state(&self, id: ObserverId) -> Option<&SceneReplicationState> {
        self.observers.get(&id)
    }

    /// Mutably borrows an observer's replication state.
    pub fn observer_state_mut(&mut self, id: ObserverId) -> Option<&mut SceneReplicationState> {
        self.observers.get_mut(&id)
    }

    /// Identifiers of every tracked observer, sorted.
    #[must_use]
    pub fn observer_ids(&self) -> Vec<ObserverId> {
        let mut ids: Vec<ObserverId> = self.observers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    // =========================================================================
    // Time, metadata, packages
    // =========================================================================

    /// Enables or disables frame updates (loading continues regardless).
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// True if frame updates run.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Sets the time-step multiplier; clamped to a small positive minimum.
    pub fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = scale.max(f32::EPSILON);
    }

    /// Current time-step multiplier.
    #[must_use]
    pub const fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Sets the smoothing time constant; clamped positive.
    pub fn set_smoothing_constant(&mut self, constant: f32) {
        self.smoothing_constant = constant.max(f32::EPSILON);
    }

    /// Current smoothing time constant.
    #[must_use]
    pub const fn smoothing_constant(&self) -> f32 {
        self.smoothing_constant
    }

    /// Sets the smoothing snap threshold; clamped non-negative.
    pub fn set_snap_threshold(&mut self, threshold: f32) {
        self.snap_threshold = threshold.max(0.0);
    }

    /// Current snap threshold.
    #[must_use]
    pub const fn snap_threshold(&self) -> f32 {
        self.snap_threshold
    }

    /// Overwrites accumulated scene time.
    pub fn set_elapsed_time(&mut self, time: f32) {
        self.elapsed_time = time;
    }

    /// Scaled seconds accumulated across updates.
    #[must_use]
    pub const fn elapsed_time(&self) -> f32 {
        self.elapsed_time
    }

    /// Origin name of the last successful load, if any.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// Checksum of the last successfully loaded data.
    #[must_use]
    pub const fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Records an external package this scene's content requires.
    pub fn add_required_package(&mut self, name: &str) {
        if name.is_empty() {
            return;
        }
        if !self.required_packages.iter().any(|p| p == name) {
            self.required_packages.push(name.to_owned());
        }
    }

    /// Packages recorded as required.
    #[must_use]
    pub fn required_packages(&self) -> &[String] {
        &self.required_packages
    }

    /// Clears the required-package list.
    pub fn clear_required_packages(&mut self) {
        self.required_packages.clear();
    }

    // =========================================================================
    // Load / save
    // =========================================================================

    /// Serializes the whole scene to the binary stream format.
    #[must_use]
    pub fn save(&self) -> Vec<u8> {
        io::binary::write_scene(self)
    }

    /// Serializes one node and its subtree to the binary record format,
    /// suitable for [`Scene::instantiate`].
    ///
    /// # Errors
    ///
    /// [`SceneError::StaleHandle`] if the node does not resolve.
    pub fn save_node(&self, handle: NodeHandle) -> SceneResult<Vec<u8>> {
        io::binary::write_node(self, handle)
    }

    /// Serializes one node and its subtree to the document format,
    /// suitable for [`Scene::instantiate_text`].
    ///
    /// # Errors
    ///
    /// [`SceneError::StaleHandle`] if the node does not resolve,
    /// [`SceneError::Document`] if serialization fails.
    pub fn save_node_text(&self, handle: NodeHandle) -> SceneResult<String> {
        let doc = io::text::node_to_doc(self, handle).ok_or(SceneError::StaleHandle)?;
        serde_json::to_string_pretty(&doc).map_err(|e| SceneError::Document(e.to_string()))
    }

    /// Synchronously replaces this scene's content from a binary stream.
    ///
    /// Blocks the caller until the whole graph is read. On failure the
    /// graph is left in the last consistent state read before the failure
    /// point; callers needing atomicity checkpoint beforehand.
    ///
    /// # Errors
    ///
    /// [`SceneError::BadFormatTag`] / [`SceneError::MalformedStream`] on
    /// invalid data.
    pub fn load(&mut self, data: &[u8], origin: Option<&str>) -> SceneResult<()> {
        self.stop_async_loading();
        tracing::info!("loading scene from {}", origin.unwrap_or("<memory>"));
        match io::binary::read_scene(self, data, origin) {
            Ok(()) => Ok(()),
            Err(error) => {
                tracing::error!("scene load failed: {error}");
                Err(error)
            }
        }
    }

    /// Serializes the whole scene to the structured-text document format.
    ///
    /// # Errors
    ///
    /// [`SceneError::Document`] if document serialization fails.
    pub fn save_text(&self) -> SceneResult<String> {
        let doc = io::text::scene_to_doc(self);
        serde_json::to_string_pretty(&doc).map_err(|e| SceneError::Document(e.to_string()))
    }

    /// Synchronously replaces this scene's content from a structured-text
    /// document; interchangeable with the binary form.
    ///
    /// # Errors
    ///
    /// [`SceneError::Document`] on parse failure, plus the binary-load
    /// error set.
    pub fn load_text(&mut self, text: &str, origin: Option<&str>) -> SceneResult<()> {
        self.stop_async_loading();
        tracing::info!(
            "loading scene document from {}",
            origin.unwrap_or("<memory>")
        );
        match io::text::read_scene_text(self, text, origin) {
            Ok(()) => Ok(()),
            Err(error) => {
                tracing::error!("scene document load failed: {error}");
                Err(error)
            }
        }
    }

    /// Loads a serialized node subtree as a new child of the scene root,
    /// rewriting every identifier into `mode` and applying the given
    /// position and rotation afterwards.
    ///
    /// # Errors
    ///
    /// The binary-load error set; on failure the partially created child
    /// is removed.
    pub fn instantiate(
        &mut self,
        data: &[u8],
        position: Vec3,
        rotation: Quat,
        mode: CreateMode,
    ) -> SceneResult<NodeHandle> {
        io::binary::instantiate(self, data, position, rotation, mode)
    }

    /// Document twin of [`Scene::instantiate`].
    ///
    /// # Errors
    ///
    /// The document-load error set; on failure the partially created child
    /// is removed.
    pub fn instantiate_text(
        &mut self,
        text: &str,
        position: Vec3,
        rotation: Quat,
        mode: CreateMode,
    ) -> SceneResult<NodeHandle> {
        io::text::instantiate_text(self, text, position, rotation, mode)
    }

    /// Resets the scene to empty: stops any progressive load, destroys all
    /// children and root components, clears source metadata and rewinds
    /// the identifier cursors.
    pub fn clear(&mut self) {
        self.stop_async_loading();
        self.remove_all_children(self.root);
        self.remove_all_components(self.root);
        self.file_name = None;
        self.checksum = 0;
        self.replicated_node_ids.reset();
        self.local_node_ids.reset();
        self.replicated_component_ids.reset();
        self.local_component_ids.reset();
    }

    pub(crate) fn finish_load(
        &mut self,
        resolver: SceneResolver,
        checksum: u32,
        origin: Option<&str>,
    ) {
        let loaded_components = resolver.component_handles();
        resolver.resolve(self);
        self.apply_attributes(&loaded_components);
        self.checksum = checksum;
        self.file_name = origin.map(str::to_owned);
    }

    /// Invokes `apply_attributes` once on each listed component.
    ///
    /// Called after a bulk load or a network attribute burst completes,
    /// never per individual field-set, so components can batch expensive
    /// derived-state rebuilds.
    pub fn apply_attributes(&mut self, handles: &[ComponentHandle]) {
        let ctx = self.ctx.clone();
        for &handle in handles {
            if let Some(slot) = self.components.get_mut(handle.index(), handle.generation()) {
                slot.inner.apply_attributes(&ctx);
            }
        }
    }
}
