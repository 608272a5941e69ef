//! # Structured-Text Scene Loading and Saving
//!
//! Bridges the live scene graph and the [`doc`](crate::io::doc) document
//! model. Loading follows the same two-pass identifier resolution as the
//! binary path and is interchangeable with it.

use std::collections::BTreeMap;

use glam::{Quat, Vec3};

use crate::attribute::find_attribute;
use crate::component::{file_attribute_values, ComponentSlot};
use crate::error::{SceneError, SceneResult};
use crate::handle::NodeHandle;
use crate::ids::CreateMode;
use crate::io::binary::checksum;
use crate::io::doc::{ComponentDoc, NodeDoc, SceneDoc, ValueDoc};
use crate::scene::resolver::SceneResolver;
use crate::scene::Scene;
use crate::transform::Transform;
use crate::variant::Variant;

/// Format tag carried by every scene document.
pub(crate) const DOC_FORMAT: &str = "kscn";

pub(crate) fn scene_to_doc(scene: &Scene) -> SceneDoc {
    SceneDoc {
        format: DOC_FORMAT.to_owned(),
        root: node_to_doc(scene, scene.root()).unwrap_or_else(|| NodeDoc {
            id: 0,
            name: String::new(),
            position: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0; 3],
            enabled: true,
            vars: BTreeMap::new(),
            components: Vec::new(),
            children: Vec::new(),
        }),
    }
}

pub(crate) fn node_to_doc(scene: &Scene, handle: NodeHandle) -> Option<NodeDoc> {
    let node = scene.node(handle)?;
    let transform = node.transform();

    let mut vars = BTreeMap::new();
    for (key, value) in node.vars() {
        vars.insert(key.clone(), ValueDoc::from(value));
    }

    let components = node
        .components()
        .iter()
        .filter_map(|&component| scene.component(component))
        .map(component_to_doc)
        .collect();
    let children = node
        .children()
        .iter()
        .filter_map(|&child| node_to_doc(scene, child))
        .collect();

    Some(NodeDoc {
        id: node.id(),
        name: node.name().to_owned(),
        position: transform.position.to_array(),
        rotation: transform.rotation.to_array(),
        scale: transform.scale.to_array(),
        enabled: node.is_enabled(),
        vars,
        components,
        children,
    })
}

fn component_to_doc(slot: &ComponentSlot) -> ComponentDoc {
    let schema = slot.component().attributes();
    let mut attributes = BTreeMap::new();
    for (index, value) in file_attribute_values(slot.component()) {
        attributes.insert(schema[index].name.to_owned(), ValueDoc::from(&value));
    }
    ComponentDoc {
        kind: slot.component().type_name().to_owned(),
        id: slot.id(),
        attributes,
    }
}

pub(crate) fn parse_doc(text: &str) -> SceneResult<SceneDoc> {
    let doc: SceneDoc =
        serde_json::from_str(text).map_err(|e| SceneError::Document(e.to_string()))?;
    if doc.format != DOC_FORMAT {
        return Err(SceneError::Document(format!(
            "unknown document format '{}'",
            doc.format
        )));
    }
    Ok(doc)
}

pub(crate) fn read_scene_text(
    scene: &mut Scene,
    text: &str,
    origin: Option<&str>,
) -> SceneResult<()> {
    let doc = parse_doc(text)?;
    scene.clear();

    let mut resolver = SceneResolver::new();
    let root = scene.root();
    resolver.add_node(doc.root.id, root);
    apply_node_body(scene, &mut resolver, root, &doc.root, None)?;
    for child in &doc.root.children {
        apply_node_doc(scene, &mut resolver, root, child, None)?;
    }

    scene.finish_load(resolver, checksum(text.as_bytes()), origin);
    Ok(())
}

/// Applies a node document body (name, transform, vars, components) to an
/// existing node.
pub(crate) fn apply_node_body(
    scene: &mut Scene,
    resolver: &mut SceneResolver,
    handle: NodeHandle,
    doc: &NodeDoc,
    rewrite: Option<CreateMode>,
) -> SceneResult<()> {
    {
        let node = scene
            .node_mut_internal(handle)
            .ok_or(SceneError::StaleHandle)?;
        node.name.clone_from(&doc.name);
        node.transform = Transform {
            position: Vec3::from_array(doc.position),
            rotation: Quat::from_array(doc.rotation),
            scale: Vec3::from_array(doc.scale),
        };
        node.enabled = doc.enabled;
        node.vars.clear();
        for (key, value) in &doc.vars {
            node.vars.insert(key.clone(), Variant::from(value));
        }
    }
    scene.mark_dirty(handle);

    for component in &doc.components {
        apply_component_doc(scene, resolver, handle, component, rewrite)?;
    }
    Ok(())
}

fn apply_component_doc(
    scene: &mut Scene,
    resolver: &mut SceneResolver,
    node: NodeHandle,
    doc: &ComponentDoc,
    rewrite: Option<CreateMode>,
) -> SceneResult<()> {
    let created = match rewrite {
        Some(mode) => scene.add_component(node, &doc.kind, mode),
        None => scene.add_component_with_id(node, &doc.kind, doc.id),
    };
    let handle = match created {
        Ok(handle) => handle,
        Err(SceneError::UnknownComponentType(kind)) => {
            tracing::warn!("skipping component of unknown type '{kind}'");
            return Ok(());
        }
        Err(error) => return Err(error),
    };
    resolver.add_component(doc.id, handle);

    let slot = scene
        .component_slot_mut(handle)
        .ok_or(SceneError::StaleHandle)?;
    let schema = slot.component().attributes();
    for (name, value_doc) in &doc.attributes {
        let Some(index) = find_attribute(schema, name) else {
            tracing::debug!("ignoring unknown attribute '{name}' on '{}'", doc.kind);
            continue;
        };
        let value = Variant::from(value_doc);
        slot.component_mut().set_attribute(index, &value);
        resolver.note_reference(handle, index, &value);
    }
    Ok(())
}

/// Creates a node from a document under `parent` and recurses into its
/// children.
pub(crate) fn apply_node_doc(
    scene: &mut Scene,
    resolver: &mut SceneResolver,
    parent: NodeHandle,
    doc: &NodeDoc,
    rewrite: Option<CreateMode>,
) -> SceneResult<NodeHandle> {
    let handle = match rewrite {
        Some(mode) => scene.create_child(parent, "", mode)?,
        None => scene.create_child_with_id(parent, "", doc.id)?,
    };
    resolver.add_node(doc.id, handle);
    apply_node_body(scene, resolver, handle, doc, rewrite)?;
    for child in &doc.children {
        apply_node_doc(scene, resolver, handle, child, rewrite)?;
    }
    Ok(handle)
}

pub(crate) fn instantiate_text(
    scene: &mut Scene,
    text: &str,
    position: Vec3,
    rotation: Quat,
    mode: CreateMode,
) -> SceneResult<NodeHandle> {
    let doc: NodeDoc =
        serde_json::from_str(text).map_err(|e| SceneError::Document(e.to_string()))?;
    let mut resolver = SceneResolver::new();
    let root = scene.root();
    let children_before = scene.node(root).map_or(0, |node| node.children().len());

    match apply_node_doc(scene, &mut resolver, root, &doc, Some(mode)) {
        Ok(handle) => {
            let loaded_components = resolver.component_handles();
            resolver.resolve(scene);
            scene.apply_attributes(&loaded_components);
            scene.set_position(handle, position);
            scene.set_rotation(handle, rotation);
            Ok(handle)
        }
        Err(error) => {
            let children: Vec<NodeHandle> = scene
                .node(root)
                .map(|node| node.children().to_vec())
                .unwrap_or_default();
            if children.len() > children_before {
                if let Some(&last) = children.last() {
                    scene.remove_node(last);
                }
            }
            Err(error)
        }
    }
}
