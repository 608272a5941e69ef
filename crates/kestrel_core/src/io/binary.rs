//! # Binary Scene Streams
//!
//! Stream layout: a 4-byte format tag, then the root node record. A node
//! record is its identifier, name, transform, enabled flag and variable
//! bag, followed by a count of component records (type tag, identifier and
//! a length-prefixed attribute blob each) and a count of child records,
//! recursively. The length prefix lets a reader skip components whose type
//! this build does not know.
//!
//! The same child-record framing serves the progressive loader: after the
//! root body and the child count, the stream position is a resumable
//! cursor.

use glam::{Quat, Vec3};

use crate::component::{file_attribute_values, ComponentSlot};
use crate::error::{SceneError, SceneResult};
use crate::handle::NodeHandle;
use crate::ids::CreateMode;
use crate::io::stream::{StreamReader, StreamWriter};
use crate::scene::resolver::SceneResolver;
use crate::scene::Scene;
use crate::transform::Transform;

/// Format tag opening every binary scene stream.
pub(crate) const SCENE_TAG: [u8; 4] = *b"KSCN";

/// FNV-1a over the source bytes; recorded on the scene after a load.
pub(crate) fn checksum(data: &[u8]) -> u32 {
    let mut hash: u32 = 0x811C_9DC5;
    for &byte in data {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

pub(crate) fn read_format_tag(reader: &mut StreamReader<'_>) -> SceneResult<()> {
    let bytes = reader
        .read_bytes(4)
        .map_err(|_| SceneError::MalformedStream("stream shorter than the format tag".into()))?;
    let found = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if found != SCENE_TAG {
        return Err(SceneError::BadFormatTag {
            expected: SCENE_TAG,
            found,
        });
    }
    Ok(())
}

pub(crate) fn write_scene(scene: &Scene) -> Vec<u8> {
    let mut writer = StreamWriter::new();
    writer.write_bytes(&SCENE_TAG);
    write_node_record(scene, &mut writer, scene.root());
    writer.into_bytes()
}

pub(crate) fn write_node(scene: &Scene, handle: NodeHandle) -> SceneResult<Vec<u8>> {
    if scene.node(handle).is_none() {
        return Err(SceneError::StaleHandle);
    }
    let mut writer = StreamWriter::new();
    write_node_record(scene, &mut writer, handle);
    Ok(writer.into_bytes())
}

fn write_node_record(scene: &Scene, writer: &mut StreamWriter, handle: NodeHandle) {
    let Some(node) = scene.node(handle) else {
        return;
    };
    writer.write_u32(node.id());
    writer.write_string(node.name());
    let transform = node.transform();
    writer.write_vec3(transform.position);
    writer.write_quat(transform.rotation);
    writer.write_vec3(transform.scale);
    writer.write_bool(node.is_enabled());

    // Variables in sorted order so identical graphs serialize identically.
    let mut keys: Vec<&String> = node.vars().keys().collect();
    keys.sort();
    writer.write_vle(keys.len() as u32);
    for key in keys {
        writer.write_string(key);
        writer.write_variant(&node.vars()[key]);
    }

    let components: Vec<&ComponentSlot> = node
        .components()
        .iter()
        .filter_map(|&component| scene.component(component))
        .collect();
    writer.write_vle(components.len() as u32);
    for slot in components {
        write_component_record(writer, slot);
    }

    let children: Vec<NodeHandle> = node
        .children()
        .iter()
        .copied()
        .filter(|&child| scene.node(child).is_some())
        .collect();
    writer.write_vle(children.len() as u32);
    for child in children {
        write_node_record(scene, writer, child);
    }
}

fn write_component_record(writer: &mut StreamWriter, slot: &ComponentSlot) {
    writer.write_string(slot.component().type_name());
    writer.write_u32(slot.id());

    let mut blob = StreamWriter::new();
    let values = file_attribute_values(slot.component());
    blob.write_vle(values.len() as u32);
    for (_, value) in &values {
        blob.write_variant(value);
    }
    writer.write_vle(blob.len() as u32);
    writer.write_bytes(blob.as_slice());
}

pub(crate) fn read_scene(
    scene: &mut Scene,
    data: &[u8],
    origin: Option<&str>,
) -> SceneResult<()> {
    let mut reader = StreamReader::new(data);
    read_format_tag(&mut reader)?;

    scene.clear();
    let mut resolver = SceneResolver::new();
    let root = scene.root();
    let old_root_id = reader.read_u32()?;
    resolver.add_node(old_root_id, root);
    read_node_body(scene, &mut resolver, &mut reader, root, None)?;

    let child_count = reader.read_vle()?;
    for _ in 0..child_count {
        read_node_record(scene, &mut resolver, &mut reader, root, None)?;
    }

    scene.finish_load(resolver, checksum(data), origin);
    Ok(())
}

/// Reads one node record (identifier, body, children) and attaches it
/// under `parent`. With `rewrite` set, stored identifiers are discarded
/// and fresh ones allocated in the given range.
pub(crate) fn read_node_record(
    scene: &mut Scene,
    resolver: &mut SceneResolver,
    reader: &mut StreamReader<'_>,
    parent: NodeHandle,
    rewrite: Option<CreateMode>,
) -> SceneResult<NodeHandle> {
    let old_id = reader.read_u32()?;
    let handle = match rewrite {
        Some(mode) => scene.create_child(parent, "", mode)?,
        None => scene.create_child_with_id(parent, "", old_id)?,
    };
    resolver.add_node(old_id, handle);
    read_node_body(scene, resolver, reader, handle, rewrite)?;

    let child_count = reader.read_vle()?;
    for _ in 0..child_count {
        read_node_record(scene, resolver, reader, handle, rewrite)?;
    }
    Ok(handle)
}

/// Reads a node body (everything between the identifier and the child
/// count) into an existing node.
pub(crate) fn read_node_body(
    scene: &mut Scene,
    resolver: &mut SceneResolver,
    reader: &mut StreamReader<'_>,
    handle: NodeHandle,
    rewrite: Option<CreateMode>,
) -> SceneResult<()> {
    let name = reader.read_string()?;
    let position = reader.read_vec3()?;
    let rotation = reader.read_quat()?;
    let scale = reader.read_vec3()?;
    let enabled = reader.read_bool()?;
    let var_count = reader.read_vle()?;
    {
        let node = scene
            .node_mut_internal(handle)
            .ok_or(SceneError::StaleHandle)?;
        node.name = name;
        node.transform = Transform {
            position,
            rotation,
            scale,
        };
        node.enabled = enabled;
        node.vars.clear();
        for _ in 0..var_count {
            let key = reader.read_string()?;
            let value = reader.read_variant()?;
            node.vars.insert(key, value);
        }
    }
    scene.mark_dirty(handle);

    let component_count = reader.read_vle()?;
    for _ in 0..component_count {
        read_component_record(scene, resolver, reader, handle, rewrite)?;
    }
    Ok(())
}

fn read_component_record(
    scene: &mut Scene,
    resolver: &mut SceneResolver,
    reader: &mut StreamReader<'_>,
    node: NodeHandle,
    rewrite: Option<CreateMode>,
) -> SceneResult<()> {
    let type_name = reader.read_string()?;
    let old_id = reader.read_u32()?;
    let blob_len = reader.read_vle()? as usize;
    let blob = reader.read_bytes(blob_len)?;
    let mut blob_reader = StreamReader::new(blob);

    let created = match rewrite {
        Some(mode) => scene.add_component(node, &type_name, mode),
        None => scene.add_component_with_id(node, &type_name, old_id),
    };
    let handle = match created {
        Ok(handle) => handle,
        Err(SceneError::UnknownComponentType(kind)) => {
            tracing::warn!("skipping component of unknown type '{kind}'");
            return Ok(());
        }
        Err(error) => return Err(error),
    };
    resolver.add_component(old_id, handle);

    let value_count = blob_reader.read_vle()? as usize;
    let slot = scene
        .component_slot_mut(handle)
        .ok_or(SceneError::StaleHandle)?;
    let file_indices: Vec<usize> = slot
        .component()
        .attributes()
        .iter()
        .enumerate()
        .filter(|(_, info)| info.is_file())
        .map(|(index, _)| index)
        .collect();
    for position in 0..value_count {
        let value = blob_reader.read_variant()?;
        // Values beyond the schema belong to a newer build; drop them.
        if let Some(&attr_index) = file_indices.get(position) {
            slot.component_mut().set_attribute(attr_index, &value);
            resolver.note_reference(handle, attr_index, &value);
        }
    }
    Ok(())
}

pub(crate) fn instantiate(
    scene: &mut Scene,
    data: &[u8],
    position: Vec3,
    rotation: Quat,
    mode: CreateMode,
) -> SceneResult<NodeHandle> {
    let mut reader = StreamReader::new(data);
    let mut resolver = SceneResolver::new();
    let root = scene.root();
    let children_before = scene.node(root).map_or(0, |node| node.children().len());

    match read_node_record(scene, &mut resolver, &mut reader, root, Some(mode)) {
        Ok(handle) => {
            let loaded_components = resolver.component_handles();
            resolver.resolve(scene);
            scene.apply_attributes(&loaded_components);
            scene.set_position(handle, position);
            scene.set_rotation(handle, rotation);
            Ok(handle)
        }
        Err(error) => {
            // Drop the partially built subtree, if creation got that far.
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
