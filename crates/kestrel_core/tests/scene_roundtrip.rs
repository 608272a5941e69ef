//! # Scene Serialization Round-Trips
//!
//! Saving a graph and loading the result into a fresh scene must
//! reconstruct the same structure, names, transforms and attribute
//! values, in both the binary and the document format.

use glam::{Quat, Vec3};

use kestrel_core::{
    CollisionShape, CreateMode, EngineContext, MeshRenderer, NodeHandle, Scene, ScriptBehavior,
    Transform, Variant,
};

fn sample_scene() -> Scene {
    let mut scene = Scene::new(EngineContext::with_builtins());
    let root = scene.root();

    let base = scene
        .create_child(root, "base", CreateMode::Replicated)
        .unwrap();
    scene.set_transform(
        base,
        Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_y(0.5),
            scale: Vec3::new(2.0, 2.0, 2.0),
        },
    );
    scene.set_var(base, "level", Variant::Int(4));
    scene.set_var(base, "label", Variant::String("alpha".into()));

    let arm = scene
        .create_child(base, "arm", CreateMode::Replicated)
        .unwrap();
    let mesh = scene
        .add_component(arm, MeshRenderer::TYPE, CreateMode::Replicated)
        .unwrap();
    scene.set_component_attribute(
        mesh,
        MeshRenderer::ATTR_MODEL,
        &Variant::String("models/arm.mdl".into()),
    );

    let shape = scene
        .add_component(base, CollisionShape::TYPE, CreateMode::Replicated)
        .unwrap();
    scene.set_component_attribute(
        shape,
        CollisionShape::ATTR_SIZE,
        &Variant::Vec3(Vec3::new(4.0, 1.0, 4.0)),
    );

    // A local-range child is file-persisted like any other node.
    let marker = scene
        .create_child(root, "marker", CreateMode::Local)
        .unwrap();
    scene.set_position(marker, Vec3::new(-5.0, 0.0, 0.0));

    scene
}

fn assert_isomorphic(a: &Scene, a_node: NodeHandle, b: &Scene, b_node: NodeHandle) {
    let left = a.node(a_node).expect("left node");
    let right = b.node(b_node).expect("right node");
    assert_eq!(left.name(), right.name());
    assert_eq!(left.is_enabled(), right.is_enabled());

    let lt = left.transform();
    let rt = right.transform();
    assert!((lt.position - rt.position).length() < 1e-5, "position drift");
    assert!((lt.scale - rt.scale).length() < 1e-5, "scale drift");
    assert!(lt.rotation.angle_between(rt.rotation) < 1e-4, "rotation drift");

    assert_eq!(left.vars().len(), right.vars().len());
    for (key, value) in left.vars() {
        assert_eq!(right.vars().get(key), Some(value), "var {key}");
    }

    assert_eq!(left.components().len(), right.components().len());
    for (&lc, &rc) in left.components().iter().zip(right.components()) {
        let ls = a.component(lc).expect("left component");
        let rs = b.component(rc).expect("right component");
        assert_eq!(ls.component().type_name(), rs.component().type_name());
        for index in 0..ls.component().attributes().len() {
            assert_eq!(
                ls.component().attribute(index),
                rs.component().attribute(index),
                "attribute {index} of {}",
                ls.component().type_name()
            );
        }
    }

    assert_eq!(left.children().len(), right.children().len());
    for (&lc, &rc) in left.children().iter().zip(right.children()) {
        assert_isomorphic(a, lc, b, rc);
    }
}

#[test]
fn test_binary_roundtrip_is_isomorphic() {
    let scene = sample_scene();
    let bytes = scene.save();

    let mut reloaded = Scene::new(EngineContext::with_builtins());
    reloaded.load(&bytes, Some("roundtrip.kscn")).unwrap();

    assert_isomorphic(&scene, scene.root(), &reloaded, reloaded.root());
    assert_eq!(reloaded.file_name(), Some("roundtrip.kscn"));
    assert_ne!(reloaded.checksum(), 0);
}

#[test]
fn test_document_roundtrip_is_isomorphic() {
    let scene = sample_scene();
    let text = scene.save_text().unwrap();

    let mut reloaded = Scene::new(EngineContext::with_builtins());
    reloaded.load_text(&text, None).unwrap();

    assert_isomorphic(&scene, scene.root(), &reloaded, reloaded.root());
}

#[test]
fn test_formats_are_interchangeable() {
    let scene = sample_scene();

    let mut via_binary = Scene::new(EngineContext::with_builtins());
    via_binary.load(&scene.save(), None).unwrap();

    let mut via_text = Scene::new(EngineContext::with_builtins());
    via_text.load_text(&via_binary.save_text().unwrap(), None).unwrap();

    assert_isomorphic(&scene, scene.root(), &via_text, via_text.root());
}

#[test]
fn test_saved_child_component_reaches_fresh_scene() {
    // Create scene, child with a scripted behavior, save, load elsewhere,
    // find by name recursively.
    let mut scene = Scene::new(EngineContext::with_builtins());
    let child = scene
        .create_child(scene.root(), "sentinel", CreateMode::Replicated)
        .unwrap();
    scene.set_position(child, Vec3::new(7.0, 0.0, -2.0));
    let script = scene
        .add_component(child, ScriptBehavior::TYPE, CreateMode::Replicated)
        .unwrap();
    scene.set_component_attribute(
        script,
        ScriptBehavior::ATTR_SCRIPT,
        &Variant::String("ai/sentinel.ks".into()),
    );

    let bytes = scene.save();
    let mut other = Scene::new(EngineContext::with_builtins());
    other.load(&bytes, None).unwrap();

    let found = other
        .child_by_name(other.root(), "sentinel", true)
        .expect("sentinel survives the round-trip");
    let node = other.node(found).unwrap();
    assert_eq!(node.transform().position, Vec3::new(7.0, 0.0, -2.0));

    let component = other
        .component_of::<ScriptBehavior>(found)
        .expect("script survives the round-trip");
    let behavior = other.component_as::<ScriptBehavior>(component).unwrap();
    assert_eq!(behavior.script(), "ai/sentinel.ks");
}

#[test]
fn test_forward_reference_resolves_after_load() {
    let mut scene = Scene::new(EngineContext::with_builtins());
    let root = scene.root();

    // "hunter" serializes before "prey" but references it: a forward
    // reference in the stream.
    let hunter = scene
        .create_child(root, "hunter", CreateMode::Replicated)
        .unwrap();
    let prey = scene
        .create_child(root, "prey", CreateMode::Replicated)
        .unwrap();
    let prey_id = scene.node(prey).unwrap().id();

    let script = scene
        .add_component(hunter, ScriptBehavior::TYPE, CreateMode::Replicated)
        .unwrap();
    scene.set_component_attribute(
        script,
        ScriptBehavior::ATTR_TARGET,
        &Variant::NodeRef(prey_id),
    );

    let bytes = scene.save();
    let mut reloaded = Scene::new(EngineContext::with_builtins());
    reloaded.load(&bytes, None).unwrap();

    let hunter2 = reloaded
        .child_by_name(reloaded.root(), "hunter", false)
        .unwrap();
    let prey2 = reloaded
        .child_by_name(reloaded.root(), "prey", false)
        .unwrap();
    let script2 = reloaded.component_of::<ScriptBehavior>(hunter2).unwrap();
    let behavior = reloaded.component_as::<ScriptBehavior>(script2).unwrap();

    // The reference still points at the node named "prey".
    assert_eq!(behavior.target(), reloaded.node(prey2).unwrap().id());
    assert_ne!(behavior.target(), 0);
}

#[test]
fn test_instantiate_rewrites_identifiers_and_references() {
    let mut scene = Scene::new(EngineContext::with_builtins());
    let root = scene.root();

    let squad = scene
        .create_child(root, "squad", CreateMode::Replicated)
        .unwrap();
    let leader = scene
        .create_child(squad, "leader", CreateMode::Replicated)
        .unwrap();
    let leader_id = scene.node(leader).unwrap().id();
    let script = scene
        .add_component(squad, ScriptBehavior::TYPE, CreateMode::Replicated)
        .unwrap();
    scene.set_component_attribute(
        script,
        ScriptBehavior::ATTR_TARGET,
        &Variant::NodeRef(leader_id),
    );

    let subtree = scene.save_node(squad).unwrap();
    let spawned = scene
        .instantiate(
            &subtree,
            Vec3::new(10.0, 0.0, 0.0),
            Quat::IDENTITY,
            CreateMode::Replicated,
        )
        .unwrap();

    // The clone holds fresh identifiers.
    let spawned_id = scene.node(spawned).unwrap().id();
    assert_ne!(spawned_id, scene.node(squad).unwrap().id());
    assert_eq!(
        scene.node(spawned).unwrap().transform().position,
        Vec3::new(10.0, 0.0, 0.0)
    );

    // The internal reference was rewritten to the clone's leader, not the
    // original's.
    let clone_leader = scene.child_by_name(spawned, "leader", false).unwrap();
    let clone_leader_id = scene.node(clone_leader).unwrap().id();
    let clone_script = scene.component_of::<ScriptBehavior>(spawned).unwrap();
    let behavior = scene.component_as::<ScriptBehavior>(clone_script).unwrap();
    assert_eq!(behavior.target(), clone_leader_id);
    assert_ne!(behavior.target(), leader_id);
}

#[test]
fn test_document_instantiate_clones_subtree() {
    let mut scene = Scene::new(EngineContext::with_builtins());
    let prop = scene
        .create_child(scene.root(), "crate_stack", CreateMode::Replicated)
        .unwrap();
    scene
        .add_component(prop, MeshRenderer::TYPE, CreateMode::Replicated)
        .unwrap();

    let doc = scene.save_node_text(prop).unwrap();
    let spawned = scene
        .instantiate_text(
            &doc,
            Vec3::new(0.0, 0.0, 4.0),
            Quat::IDENTITY,
            CreateMode::Local,
        )
        .unwrap();

    assert_ne!(spawned, prop);
    let clone = scene.node(spawned).unwrap();
    assert_eq!(clone.name(), "crate_stack");
    assert_eq!(clone.transform().position, Vec3::new(0.0, 0.0, 4.0));
    // Instantiated into the LOCAL range as requested.
    assert!(clone.id() >= kestrel_core::FIRST_LOCAL_ID);
    assert!(scene.component_of::<MeshRenderer>(spawned).is_some());
}

#[test]
fn test_unresolved_reference_is_nulled() {
    let mut scene = Scene::new(EngineContext::with_builtins());
    let lone = scene
        .create_child(scene.root(), "lone", CreateMode::Replicated)
        .unwrap();
    let script = scene
        .add_component(lone, ScriptBehavior::TYPE, CreateMode::Replicated)
        .unwrap();
    // Reference a node that will not exist in the stream.
    scene.set_component_attribute(script, ScriptBehavior::ATTR_TARGET, &Variant::NodeRef(777));

    let subtree = scene.save_node(lone).unwrap();
    let spawned = scene
        .instantiate(&subtree, Vec3::ZERO, Quat::IDENTITY, CreateMode::Replicated)
        .unwrap();

    let clone_script = scene.component_of::<ScriptBehavior>(spawned).unwrap();
    let behavior = scene.component_as::<ScriptBehavior>(clone_script).unwrap();
    // The load still succeeded; the dangling field reset to null.
    assert_eq!(behavior.target(), 0);
}

#[test]
fn test_randomized_graphs_roundtrip() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    // Deterministic seed: a failure here reproduces exactly.
    let mut rng = StdRng::seed_from_u64(0x5CEE_2026);

    for _ in 0..8 {
        let mut scene = Scene::new(EngineContext::with_builtins());
        let mut parents = vec![scene.root()];

        for index in 0..rng.gen_range(4..20) {
            let parent = parents[rng.gen_range(0..parents.len())];
            let mode = if rng.gen_bool(0.8) {
                CreateMode::Replicated
            } else {
                CreateMode::Local
            };
            let node = scene
                .create_child(parent, &format!("n{index}"), mode)
                .unwrap();
            scene.set_position(
                node,
                Vec3::new(rng.gen_range(-50.0..50.0), 0.0, rng.gen_range(-50.0..50.0)),
            );
            if rng.gen_bool(0.5) {
                let mesh = scene.add_component(node, MeshRenderer::TYPE, mode).unwrap();
                scene.set_component_attribute(
                    mesh,
                    MeshRenderer::ATTR_MODEL,
                    &Variant::String(format!("models/n{index}.mdl")),
                );
            }
            if rng.gen_bool(0.3) {
                scene.set_var(node, "seed", Variant::Int(rng.gen_range(0..1000)));
            }
            parents.push(node);
        }

        let mut reloaded = Scene::new(EngineContext::with_builtins());
        reloaded.load(&scene.save(), None).unwrap();
        assert_isomorphic(&scene, scene.root(), &reloaded, reloaded.root());

        let mut from_text = Scene::new(EngineContext::with_builtins());
        from_text.load_text(&scene.save_text().unwrap(), None).unwrap();
        assert_isomorphic(&scene, scene.root(), &from_text, from_text.root());
    }
}

#[test]
fn test_malformed_streams_are_rejected() {
    let mut scene = Scene::new(EngineContext::with_builtins());
    assert!(scene.load(b"not a scene at all", None).is_err());
    assert!(scene.load(b"KS", None).is_err());

    // Truncation mid-graph aborts but leaves the partial graph standing.
    let source = sample_scene();
    let bytes = source.save();
    let mut partial = Scene::new(EngineContext::with_builtins());
    assert!(partial.load(&bytes[..bytes.len() - 8], None).is_err());
}

#[test]
fn test_duplicate_identifier_adoption() {
    let mut scene = Scene::new(EngineContext::with_builtins());
    let root = scene.root();

    let first = scene.create_child_with_id(root, "first", 5).unwrap();
    let second = scene.create_child_with_id(root, "second", 5).unwrap();

    // The later registration wins the identifier map.
    assert_eq!(scene.get_node(5), Some(second));
    // The earlier node still exists in the hierarchy but lost membership.
    let evicted = scene.node(first).unwrap();
    assert!(!evicted.is_scene_member());
    assert_eq!(evicted.name(), "first");
    assert!(scene.node(second).unwrap().is_scene_member());
}

#[test]
fn test_identifier_reuse_after_removal() {
    let mut scene = Scene::new(EngineContext::with_builtins());
    let root = scene.root();

    let a = scene.create_child(root, "a", CreateMode::Replicated).unwrap();
    let a_id = scene.node(a).unwrap().id();
    let b = scene.create_child(root, "b", CreateMode::Replicated).unwrap();
    let b_id = scene.node(b).unwrap().id();
    assert_ne!(a_id, b_id);

    scene.remove_node(a);
    assert_eq!(scene.get_node(a_id), None);

    // A node created under the freed id adopts it cleanly, with no
    // duplicate warning: the id really was released.
    let adopted = scene.create_child_with_id(root, "adopted", a_id).unwrap();
    assert_eq!(scene.get_node(a_id), Some(adopted));
    assert!(scene.node(adopted).unwrap().is_scene_member());

    // And churn never produces two live nodes with one id.
    for index in 0..32 {
        let child = scene
            .create_child(root, &format!("fill_{index}"), CreateMode::Replicated)
            .unwrap();
        if index % 3 == 0 {
            scene.remove_node(child);
        }
    }
    let mut live = scene.replicated_node_ids();
    let before = live.len();
    live.dedup();
    assert_eq!(live.len(), before);
}
