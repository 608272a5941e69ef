//! # Progressive Loading
//!
//! The async state machine must produce the same graph as a synchronous
//! load, report monotonic progress, survive cancellation, and surface
//! mid-stream failures on a later update tick.

use glam::Vec3;

use kestrel_core::{
    CreateMode, EngineContext, MeshRenderer, NodeHandle, Scene, SceneEvent, Variant,
};

fn populated_scene(children: usize) -> Scene {
    let mut scene = Scene::new(EngineContext::with_builtins());
    let root = scene.root();
    for index in 0..children {
        let child = scene
            .create_child(root, &format!("district_{index}"), CreateMode::Replicated)
            .unwrap();
        scene.set_position(child, Vec3::new(index as f32, 0.0, 0.0));
        let mesh = scene
            .add_component(child, MeshRenderer::TYPE, CreateMode::Replicated)
            .unwrap();
        scene.set_component_attribute(
            mesh,
            MeshRenderer::ATTR_MODEL,
            &Variant::String(format!("models/district_{index}.mdl")),
        );
        // Nested content rides along with its root-level parent.
        scene
            .create_child(child, "detail", CreateMode::Replicated)
            .unwrap();
    }
    scene
}

fn drive_to_completion(scene: &mut Scene) -> Vec<(u32, u32)> {
    let mut observed = Vec::new();
    let mut guard = 0;
    while scene.is_async_loading() {
        scene.update(0.016);
        if scene.is_async_loading() {
            observed.push((scene.async_loaded_nodes(), scene.async_total_nodes()));
        }
        guard += 1;
        assert!(guard < 10_000, "async load never finished");
    }
    observed
}

fn assert_same_graph(a: &Scene, a_node: NodeHandle, b: &Scene, b_node: NodeHandle) {
    let left = a.node(a_node).unwrap();
    let right = b.node(b_node).unwrap();
    assert_eq!(left.name(), right.name());
    assert_eq!(left.children().len(), right.children().len());
    assert_eq!(left.components().len(), right.components().len());
    assert!(
        (left.transform().position - right.transform().position).length() < 1e-5
    );
    for (&lc, &rc) in left.children().iter().zip(right.children()) {
        assert_same_graph(a, lc, b, rc);
    }
}

#[test]
fn test_async_load_matches_synchronous_load() {
    let source = populated_scene(24);
    let bytes = source.save();

    let mut sync_scene = Scene::new(EngineContext::with_builtins());
    sync_scene.load(&bytes, None).unwrap();

    let mut async_scene = Scene::new(EngineContext::with_builtins());
    async_scene.load_async(bytes, None).unwrap();
    assert!(async_scene.is_async_loading());
    assert_eq!(async_scene.async_total_nodes(), 24);
    drive_to_completion(&mut async_scene);

    assert_same_graph(
        &sync_scene,
        sync_scene.root(),
        &async_scene,
        async_scene.root(),
    );
}

#[test]
fn test_async_document_load_matches_synchronous_load() {
    let source = populated_scene(12);
    let text = source.save_text().unwrap();

    let mut sync_scene = Scene::new(EngineContext::with_builtins());
    sync_scene.load_text(&text, None).unwrap();

    let mut async_scene = Scene::new(EngineContext::with_builtins());
    async_scene.load_async_text(&text, None).unwrap();
    drive_to_completion(&mut async_scene);

    assert_same_graph(
        &sync_scene,
        sync_scene.root(),
        &async_scene,
        async_scene.root(),
    );
}

#[test]
fn test_progress_is_monotonic_and_completes() {
    let source = populated_scene(16);
    let bytes = source.save();

    let mut scene = Scene::new(EngineContext::with_builtins());
    scene.load_async(bytes, None).unwrap();
    assert_eq!(scene.async_loaded_nodes(), 0);

    let mut last = 0;
    let observed = drive_to_completion(&mut scene);
    for (loaded, total) in observed {
        assert!(loaded >= last, "progress went backwards");
        assert!(total == 16 || total == 0, "total changed mid-load");
        last = loaded;
    }

    // Idle again: progress reports complete.
    assert!(!scene.is_async_loading());
    assert_eq!(scene.async_progress(), 1.0);
    assert_eq!(scene.node_count(), 1 + 16 * 2);
}

#[test]
fn test_empty_scene_completes_immediately() {
    let empty = Scene::new(EngineContext::with_builtins());
    let bytes = empty.save();

    let mut scene = Scene::new(EngineContext::with_builtins());
    scene.load_async(bytes, None).unwrap();
    assert_eq!(scene.async_total_nodes(), 0);
    // With nothing to stream, progress already reads complete.
    assert_eq!(scene.async_progress(), 1.0);

    scene.update(0.016);
    assert!(!scene.is_async_loading());
}

#[test]
fn test_finish_notification_carries_success() {
    let source = populated_scene(4);
    let bytes = source.save();

    let mut scene = Scene::new(EngineContext::with_builtins());
    let events = scene.subscribe_events();
    scene.load_async(bytes, None).unwrap();
    drive_to_completion(&mut scene);

    let received: Vec<SceneEvent> = events.try_iter().collect();
    assert!(received.contains(&SceneEvent::AsyncLoadFinished { success: true }));
}

#[test]
fn test_stop_leaves_partial_graph() {
    let source = populated_scene(8);
    let bytes = source.save();

    let mut scene = Scene::new(EngineContext::with_builtins());
    scene.load_async(bytes, None).unwrap();
    // Cancel before any children streamed in: only the root body exists.
    scene.stop_async_loading();
    assert!(!scene.is_async_loading());
    assert_eq!(scene.node(scene.root()).unwrap().children().len(), 0);

    // Updating afterwards is an ordinary frame, not a load tick.
    scene.update(0.016);
    assert!(!scene.is_async_loading());
}

#[test]
fn test_new_load_wins_over_inflight_load() {
    let big = populated_scene(8);
    let big_bytes = big.save();
    let small = populated_scene(2);
    let small_bytes = small.save();

    let mut scene = Scene::new(EngineContext::with_builtins());
    scene.load_async(big_bytes, None).unwrap();
    // A synchronous load interrupts and replaces the in-flight one.
    scene.load(&small_bytes, None).unwrap();
    assert!(!scene.is_async_loading());
    assert_eq!(scene.node(scene.root()).unwrap().children().len(), 2);
}

#[test]
fn test_midstream_failure_surfaces_on_update_tick() {
    let source = populated_scene(6);
    let bytes = source.save();
    // Truncate inside the streamed children, past the header.
    let truncated = bytes[..bytes.len() - 20].to_vec();

    let mut scene = Scene::new(EngineContext::with_builtins());
    let events = scene.subscribe_events();
    // The synchronous prefix is intact, so load_async itself succeeds.
    scene.load_async(truncated, None).unwrap();

    let mut ticks = 0;
    while scene.is_async_loading() && ticks < 1000 {
        scene.update(0.016);
        ticks += 1;
    }
    assert!(!scene.is_async_loading());

    let received: Vec<SceneEvent> = events.try_iter().collect();
    assert!(received.contains(&SceneEvent::AsyncLoadFinished { success: false }));
    // The partially populated graph is observable, not rolled back.
    assert!(!scene.node(scene.root()).unwrap().children().is_empty());
    // And the scene keeps working after the failed load.
    scene.update(0.016);
    assert!(!scene.is_async_loading());
}