//! # Delta Wire Protocol
//!
//! The message set one replication cycle produces for one observer:
//! removals first, then node creations (parents before children), then
//! attribute updates. Identifiers travel verbatim: both ends address
//! replicated objects by the same REPLICATED-range identifier, so no
//! per-connection identifier translation exists on this path.
//!
//! Encoding reuses the core byte codec; a batch is a count followed by
//! type-tagged messages.

use glam::{Quat, Vec3};

use kestrel_core::io::stream::{StreamReader, StreamWriter};
use kestrel_core::{Variant, VariantMap};

use crate::error::{NetError, NetResult};

/// Network-visible state of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeState {
    /// Node name.
    pub name: String,
    /// Local position.
    pub position: Vec3,
    /// Local rotation.
    pub rotation: Quat,
    /// Local scale.
    pub scale: Vec3,
    /// Enabled flag.
    pub enabled: bool,
    /// Variable bag entries, sorted by key.
    pub vars: Vec<(String, Variant)>,
}

impl NodeState {
    /// Captures the replicable state of a live node.
    #[must_use]
    pub fn capture(name: &str, position: Vec3, rotation: Quat, scale: Vec3, enabled: bool, vars: &VariantMap) -> Self {
        let mut entries: Vec<(String, Variant)> = vars
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            name: name.to_owned(),
            position,
            rotation,
            scale,
            enabled,
            vars: entries,
        }
    }

    fn encode(&self, writer: &mut StreamWriter) {
        writer.write_string(&self.name);
        writer.write_vec3(self.position);
        writer.write_quat(self.rotation);
        writer.write_vec3(self.scale);
        writer.write_bool(self.enabled);
        writer.write_vle(self.vars.len() as u32);
        for (key, value) in &self.vars {
            writer.write_string(key);
            writer.write_variant(value);
        }
    }

    fn decode(reader: &mut StreamReader<'_>) -> NetResult<Self> {
        let name = reader.read_string()?;
        let position = reader.read_vec3()?;
        let rotation = reader.read_quat()?;
        let scale = reader.read_vec3()?;
        let enabled = reader.read_bool()?;
        let var_count = reader.read_vle()?;
        let mut vars = Vec::with_capacity(var_count as usize);
        for _ in 0..var_count {
            let key = reader.read_string()?;
            let value = reader.read_variant()?;
            vars.push((key, value));
        }
        Ok(Self {
            name,
            position,
            rotation,
            scale,
            enabled,
            vars,
        })
    }
}

/// Network-visible state of one component: its identity plus the current
/// values of its NET-mode attributes, as `(schema index, value)` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentState {
    /// Component identifier.
    pub id: u32,
    /// Factory type tag.
    pub type_name: String,
    /// NET-mode attribute values.
    pub values: Vec<(u32, Variant)>,
}

impl ComponentState {
    fn encode(&self, writer: &mut StreamWriter) {
        writer.write_string(&self.type_name);
        writer.write_u32(self.id);
        writer.write_vle(self.values.len() as u32);
        for (index, value) in &self.values {
            writer.write_vle(*index);
            writer.write_variant(value);
        }
    }

    fn decode(reader: &mut StreamReader<'_>) -> NetResult<Self> {
        let type_name = reader.read_string()?;
        let id = reader.read_u32()?;
        let value_count = reader.read_vle()?;
        let mut values = Vec::with_capacity(value_count as usize);
        for _ in 0..value_count {
            let index = reader.read_vle()?;
            let value = reader.read_variant()?;
            values.push((index, value));
        }
        Ok(Self {
            id,
            type_name,
            values,
        })
    }
}

/// One replication instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaMessage {
    /// Delete a component the observer has instantiated.
    RemoveComponent {
        /// Component identifier.
        id: u32,
    },
    /// Delete a node (and implicitly its subtree) the observer has
    /// instantiated.
    RemoveNode {
        /// Node identifier.
        id: u32,
    },
    /// Instantiate a node with its full replicable state and components.
    CreateNode {
        /// Node identifier.
        id: u32,
        /// Identifier of the parent node; the observer falls back to its
        /// scene root if the parent is unknown there.
        parent: u32,
        /// Full node state.
        state: NodeState,
        /// Replicated components attached at creation time.
        components: Vec<ComponentState>,
    },
    /// Overwrite a known node's replicable state.
    UpdateNode {
        /// Node identifier.
        id: u32,
        /// Full node state.
        state: NodeState,
    },
    /// Attach a component to a node the observer already knows.
    CreateComponent {
        /// Owning node identifier.
        node: u32,
        /// Full component state.
        component: ComponentState,
    },
    /// Overwrite a known component's NET-mode attributes.
    UpdateComponent {
        /// Component identifier.
        id: u32,
        /// NET-mode attribute values.
        values: Vec<(u32, Variant)>,
    },
}

const MSG_REMOVE_COMPONENT: u8 = 1;
const MSG_REMOVE_NODE: u8 = 2;
const MSG_CREATE_NODE: u8 = 3;
const MSG_UPDATE_NODE: u8 = 4;
const MSG_CREATE_COMPONENT: u8 = 5;
const MSG_UPDATE_COMPONENT: u8 = 6;

impl DeltaMessage {
    fn encode(&self, writer: &mut StreamWriter) {
        match self {
            Self::RemoveComponent { id } => {
                writer.write_u8(MSG_REMOVE_COMPONENT);
                writer.write_u32(*id);
            }
            Self::RemoveNode { id } => {
                writer.write_u8(MSG_REMOVE_NODE);
                writer.write_u32(*id);
            }
            Self::CreateNode {
                id,
                parent,
                state,
                components,
            } => {
                writer.write_u8(MSG_CREATE_NODE);
                writer.write_u32(*id);
                writer.write_u32(*parent);
                state.encode(writer);
                writer.write_vle(components.len() as u32);
                for component in components {
                    component.encode(writer);
                }
            }
            Self::UpdateNode { id, state } => {
                writer.write_u8(MSG_UPDATE_NODE);
                writer.write_u32(*id);
                state.encode(writer);
            }
            Self::CreateComponent { node, component } => {
                writer.write_u8(MSG_CREATE_COMPONENT);
                writer.write_u32(*node);
                component.encode(writer);
            }
            Self::UpdateComponent { id, values } => {
                writer.write_u8(MSG_UPDATE_COMPONENT);
                writer.write_u32(*id);
                writer.write_vle(values.len() as u32);
                for (index, value) in values {
                    writer.write_vle(*index);
                    writer.write_variant(value);
                }
            }
        }
    }

    fn decode(reader: &mut StreamReader<'_>) -> NetResult<Self> {
        let tag = reader.read_u8()?;
        Ok(match tag {
            MSG_REMOVE_COMPONENT => Self::RemoveComponent {
                id: reader.read_u32()?,
            },
            MSG_REMOVE_NODE => Self::RemoveNode {
                id: reader.read_u32()?,
            },
            MSG_CREATE_NODE => {
                let id = reader.read_u32()?;
                let parent = reader.read_u32()?;
                let state = NodeState::decode(reader)?;
                let component_count = reader.read_vle()?;
                let mut components = Vec::with_capacity(component_count as usize);
                for _ in 0..component_count {
                    components.push(ComponentState::decode(reader)?);
                }
                Self::CreateNode {
                    id,
                    parent,
                    state,
                    components,
                }
            }
            MSG_UPDATE_NODE => Self::UpdateNode {
                id: reader.read_u32()?,
                state: NodeState::decode(reader)?,
            },
            MSG_CREATE_COMPONENT => Self::CreateComponent {
                node: reader.read_u32()?,
                component: ComponentState::decode(reader)?,
            },
            MSG_UPDATE_COMPONENT => {
                let id = reader.read_u32()?;
                let value_count = reader.read_vle()?;
                let mut values = Vec::with_capacity(value_count as usize);
                for _ in 0..value_count {
                    let index = reader.read_vle()?;
                    let value = reader.read_variant()?;
                    values.push((index, value));
                }
                Self::UpdateComponent { id, values }
            }
            other => return Err(NetError::UnknownMessage(other)),
        })
    }
}

/// The ordered message set for one observer, one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeltaBatch {
    /// Messages in application order.
    pub messages: Vec<DeltaMessage>,
}

impl DeltaBatch {
    /// True if the cycle produced nothing for this observer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of messages in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Encodes the batch for transport.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = StreamWriter::new();
        writer.write_vle(self.messages.len() as u32);
        for message in &self.messages {
            message.encode(&mut writer);
        }
        writer.into_bytes()
    }

    /// Decodes a batch received from transport.
    ///
    /// # Errors
    ///
    /// [`NetError::UnknownMessage`] on an unrecognized type tag, or the
    /// stream error set on truncation.
    pub fn decode(data: &[u8]) -> NetResult<Self> {
        let mut reader = StreamReader::new(data);
        let message_count = reader.read_vle()?;
        let mut messages = Vec::with_capacity(message_count as usize);
        for _ in 0..message_count {
            messages.push(DeltaMessage::decode(&mut reader)?);
        }
        Ok(Self { messages })
    }
}
