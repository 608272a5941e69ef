//! # Scene Graph Behavior
//!
//! Dirty propagation, world-transform composition, the four-phase update
//! contract, the threaded-update bracket and structural event broadcast.

use std::any::Any;
use std::sync::{Arc, Mutex};

use glam::{Mat4, Vec3};

use kestrel_core::{
    AttributeInfo, Component, ComponentRegistry, CreateMode, EngineContext, MeshRenderer, Node,
    Scene, SceneConfig, SceneEvent, SmoothedTransform, Variant, WorkerPool,
};

/// Records which update phases ran, in order.
struct PhaseProbe {
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl Component for PhaseProbe {
    fn type_name(&self) -> &'static str {
        "PhaseProbe"
    }

    fn attributes(&self) -> &'static [AttributeInfo] {
        &[]
    }

    fn attribute(&self, _index: usize) -> Variant {
        Variant::Empty
    }

    fn set_attribute(&mut self, _index: usize, _value: &Variant) -> bool {
        false
    }

    fn on_update(&mut self, _node: &mut Node, _time_step: f32) {
        self.log.lock().unwrap().push("update");
    }

    fn on_subsystem_update(&mut self, _node: &mut Node, _time_step: f32) {
        self.log.lock().unwrap().push("subsystem");
    }

    fn on_smoothing(&mut self, _node: &mut Node, _constant: f32, _sq_snap: f32) -> bool {
        self.log.lock().unwrap().push("smoothing");
        false
    }

    fn on_post_update(&mut self, _node: &mut Node, _time_step: f32) {
        self.log.lock().unwrap().push("post");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn probe_context(log: Arc<Mutex<Vec<&'static str>>>) -> EngineContext {
    let mut registry = ComponentRegistry::with_builtins();
    registry.register("PhaseProbe", move || {
        Box::new(PhaseProbe { log: log.clone() })
    });
    EngineContext::new(registry)
}

fn mesh_notifications(scene: &Scene, handle: kestrel_core::ComponentHandle) -> u32 {
    scene
        .component_as::<MeshRenderer>(handle)
        .map_or(0, MeshRenderer::dirty_notifications)
}

#[test]
fn test_transform_dirty_reaches_all_descendants_once() {
    let mut scene = Scene::new(EngineContext::with_builtins());
    let root = scene.root();

    let top = scene.create_child(root, "top", CreateMode::Replicated).unwrap();
    let mid = scene.create_child(top, "mid", CreateMode::Replicated).unwrap();
    let leaf = scene.create_child(mid, "leaf", CreateMode::Replicated).unwrap();

    let top_mesh = scene
        .add_component(top, MeshRenderer::TYPE, CreateMode::Replicated)
        .unwrap();
    let mid_mesh = scene
        .add_component(mid, MeshRenderer::TYPE, CreateMode::Replicated)
        .unwrap();
    let leaf_mesh = scene
        .add_component(leaf, MeshRenderer::TYPE, CreateMode::Replicated)
        .unwrap();
    let root_mesh = scene
        .add_component(root, MeshRenderer::TYPE, CreateMode::Replicated)
        .unwrap();

    let baseline = [
        mesh_notifications(&scene, top_mesh),
        mesh_notifications(&scene, mid_mesh),
        mesh_notifications(&scene, leaf_mesh),
        mesh_notifications(&scene, root_mesh),
    ];

    scene.translate(mid, Vec3::X);

    // The moved node and every descendant: exactly one notification each.
    assert_eq!(mesh_notifications(&scene, mid_mesh), baseline[1] + 1);
    assert_eq!(mesh_notifications(&scene, leaf_mesh), baseline[2] + 1);
    // Ancestors are untouched: their world transforms did not change.
    assert_eq!(mesh_notifications(&scene, top_mesh), baseline[0]);
    assert_eq!(mesh_notifications(&scene, root_mesh), baseline[3]);
}

#[test]
fn test_world_transform_composes_through_ancestors() {
    let mut scene = Scene::new(EngineContext::with_builtins());
    let parent = scene
        .create_child(scene.root(), "parent", CreateMode::Replicated)
        .unwrap();
    let child = scene.create_child(parent, "child", CreateMode::Replicated).unwrap();

    scene.set_position(parent, Vec3::new(1.0, 0.0, 0.0));
    scene.set_position(child, Vec3::new(2.0, 0.0, 0.0));

    let world = scene.world_transform(child).unwrap();
    let (_, _, translation) = world.to_scale_rotation_translation();
    assert!((translation - Vec3::new(3.0, 0.0, 0.0)).length() < 1e-5);

    // Cached until the next mutation.
    assert!(!scene.node(child).unwrap().is_world_dirty());
    scene.translate(parent, Vec3::Y);
    assert!(scene.node(child).unwrap().is_world_dirty());

    let moved = scene.world_transform(child).unwrap();
    let (_, _, translation) = moved.to_scale_rotation_translation();
    assert!((translation - Vec3::new(3.0, 1.0, 0.0)).length() < 1e-5);
}

#[test]
fn test_update_phases_run_in_strict_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut scene = Scene::new(probe_context(log.clone()));
    let node = scene
        .create_child(scene.root(), "probe", CreateMode::Local)
        .unwrap();
    scene.add_component(node, "PhaseProbe", CreateMode::Local).unwrap();

    scene.update(0.016);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["update", "subsystem", "smoothing", "post"]
    );

    // Disabled subtrees skip every phase.
    log.lock().unwrap().clear();
    scene.set_enabled(node, false);
    scene.update(0.016);
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn test_time_scale_and_elapsed_time() {
    let mut scene = Scene::new(EngineContext::with_builtins());
    scene.set_time_scale(2.0);
    scene.update(0.5);
    scene.update(0.25);
    assert!((scene.elapsed_time() - 1.5).abs() < 1e-5);

    // An inactive scene accumulates nothing.
    scene.set_active(false);
    scene.update(1.0);
    assert!((scene.elapsed_time() - 1.5).abs() < 1e-5);
}

#[test]
fn test_scene_respects_config() {
    let config = SceneConfig {
        time_scale: 0.5,
        smoothing_constant: 10.0,
        snap_threshold: 1.0,
    };
    let mut scene = Scene::with_config(EngineContext::with_builtins(), config);
    assert_eq!(scene.time_scale(), 0.5);
    assert_eq!(scene.snap_threshold(), 1.0);

    scene.update(1.0);
    assert!((scene.elapsed_time() - 0.5).abs() < 1e-6);
}

#[test]
fn test_required_packages_deduplicate() {
    let mut scene = Scene::new(EngineContext::with_builtins());
    scene.add_required_package("core_assets.pak");
    scene.add_required_package("core_assets.pak");
    scene.add_required_package("");
    scene.add_required_package("dlc_marsh.pak");

    assert_eq!(
        scene.required_packages(),
        ["core_assets.pak", "dlc_marsh.pak"]
    );
    scene.clear_required_packages();
    assert!(scene.required_packages().is_empty());
}

#[test]
fn test_smoothing_phase_moves_toward_target() {
    let mut scene = Scene::new(EngineContext::with_builtins());
    let node = scene
        .create_child(scene.root(), "chaser", CreateMode::Replicated)
        .unwrap();
    let smoother = scene
        .add_component(node, SmoothedTransform::TYPE, CreateMode::Replicated)
        .unwrap();

    scene
        .component_as_mut::<SmoothedTransform>(smoother)
        .unwrap()
        .set_target_position(Vec3::new(1.0, 0.0, 0.0));

    for _ in 0..300 {
        scene.update(0.016);
    }
    let position = scene.node(node).unwrap().transform().position;
    assert!((position - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-2);
}

#[test]
fn test_threaded_update_defers_notifications() {
    let ctx = EngineContext::with_builtins().with_work_queue(Arc::new(WorkerPool::new(2)));
    let mut scene = Scene::new(ctx);
    let node = scene
        .create_child(scene.root(), "shared", CreateMode::Replicated)
        .unwrap();
    let mesh = scene
        .add_component(node, MeshRenderer::TYPE, CreateMode::Replicated)
        .unwrap();

    scene.begin_threaded_update();
    assert!(scene.is_threaded_update());

    let queue = scene.dirty_queue();
    std::thread::scope(|threads| {
        for _ in 0..2 {
            let worker_queue = queue.clone();
            threads.spawn(move || {
                worker_queue.push(mesh);
            });
        }
    });

    // Nothing applied yet: workers only enqueued.
    assert_eq!(mesh_notifications(&scene, mesh), 0);
    assert_eq!(queue.len(), 2);

    scene.end_threaded_update();
    assert!(!scene.is_threaded_update());
    assert_eq!(mesh_notifications(&scene, mesh), 2);
    assert!(queue.is_empty());
}

#[test]
fn test_threaded_bracket_is_noop_without_workers() {
    let mut scene = Scene::new(EngineContext::with_builtins());
    let node = scene
        .create_child(scene.root(), "solo", CreateMode::Replicated)
        .unwrap();
    let mesh = scene
        .add_component(node, MeshRenderer::TYPE, CreateMode::Replicated)
        .unwrap();

    // Default context has a serial work queue: the bracket never engages
    // and notifications stay immediate.
    scene.begin_threaded_update();
    assert!(!scene.is_threaded_update());
    scene.translate(node, Vec3::X);
    assert_eq!(mesh_notifications(&scene, mesh), 1);
    scene.end_threaded_update();
    assert_eq!(mesh_notifications(&scene, mesh), 1);
}

#[test]
fn test_structural_events_are_broadcast() {
    let mut scene = Scene::new(EngineContext::with_builtins());
    let events = scene.subscribe_events();

    let node = scene
        .create_child(scene.root(), "observed", CreateMode::Replicated)
        .unwrap();
    let node_id = scene.node(node).unwrap().id();
    let mesh = scene
        .add_component(node, MeshRenderer::TYPE, CreateMode::Replicated)
        .unwrap();
    let mesh_id = scene.component(mesh).unwrap().id();
    scene.remove_node(node);

    let received: Vec<SceneEvent> = events.try_iter().collect();
    assert!(received.contains(&SceneEvent::NodeAdded { id: node_id }));
    assert!(received.contains(&SceneEvent::ComponentAdded {
        node_id,
        component_id: mesh_id
    }));
    assert!(received.contains(&SceneEvent::ComponentRemoved {
        node_id,
        component_id: mesh_id
    }));
    assert!(received.contains(&SceneEvent::NodeRemoved { id: node_id }));
}

#[test]
fn test_component_cache_invalidation_and_refresh() {
    let mut scene = Scene::new(EngineContext::with_builtins());
    let node = scene
        .create_child(scene.root(), "prop", CreateMode::Replicated)
        .unwrap();
    let mesh = scene
        .add_component(node, MeshRenderer::TYPE, CreateMode::Replicated)
        .unwrap();

    let world = scene.world_transform(node).unwrap();
    scene
        .component_as_mut::<MeshRenderer>(mesh)
        .unwrap()
        .refresh_world(world);
    assert_eq!(
        scene.component_as::<MeshRenderer>(mesh).unwrap().cached_world(),
        Some(Mat4::IDENTITY)
    );

    scene.translate(node, Vec3::Z);
    // The dirty notification dropped the cache.
    assert_eq!(
        scene.component_as::<MeshRenderer>(mesh).unwrap().cached_world(),
        None
    );
}

#[test]
fn test_recursive_component_collection_order() {
    let mut scene = Scene::new(EngineContext::with_builtins());
    let root = scene.root();
    let a = scene.create_child(root, "a", CreateMode::Replicated).unwrap();
    let b = scene.create_child(a, "b", CreateMode::Replicated).unwrap();

    let on_a = scene
        .add_component(a, MeshRenderer::TYPE, CreateMode::Replicated)
        .unwrap();
    let on_b = scene
        .add_component(b, MeshRenderer::TYPE, CreateMode::Replicated)
        .unwrap();

    // Non-recursive sees only the node's own components.
    assert_eq!(scene.components_of::<MeshRenderer>(a, false), vec![on_a]);
    // Recursive collects in depth-first traversal order.
    assert_eq!(
        scene.components_of::<MeshRenderer>(a, true),
        vec![on_a, on_b]
    );
}
