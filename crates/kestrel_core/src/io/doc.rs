//! # Structured-Text Scene Documents
//!
//! The human-readable twin of the binary scene stream: a root element
//! containing nested node elements, each with an identifier, component
//! children and named attribute values. Semantically interchangeable with
//! the binary form: loading either produces the same graph.
//!
//! Serialization rides on serde; the on-disk encoding is pretty-printed
//! JSON.

use std::collections::BTreeMap;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::variant::Variant;

/// Root element of a scene document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneDoc {
    /// Format tag; always `"kscn"` for this build.
    pub format: String,
    /// The scene root node.
    pub root: NodeDoc,
}

/// Document form of one node and its subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDoc {
    /// Scene identifier the node held when saved.
    pub id: u32,
    /// Node name.
    #[serde(default)]
    pub name: String,
    /// Local position.
    pub position: [f32; 3],
    /// Local rotation quaternion (x, y, z, w).
    pub rotation: [f32; 4],
    /// Local scale.
    pub scale: [f32; 3],
    /// Enabled flag.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Variable bag, sorted by key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, ValueDoc>,
    /// Attached components, in attachment order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentDoc>,
    /// Child nodes, in creation order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeDoc>,
}

fn default_true() -> bool {
    true
}

/// Document form of one attached component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDoc {
    /// Component type tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Scene identifier the component held when saved.
    pub id: u32,
    /// FILE-mode attribute values keyed by schema name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, ValueDoc>,
}

/// Document form of a [`Variant`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ValueDoc {
    /// No value.
    Empty,
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// 32-bit float.
    Float(f32),
    /// Three-component vector.
    Vec3([f32; 3]),
    /// Quaternion (x, y, z, w).
    Quat([f32; 4]),
    /// UTF-8 string.
    String(String),
    /// Opaque byte buffer.
    Buffer(Vec<u8>),
    /// Node reference by scene identifier.
    Node(u32),
    /// Component reference by scene identifier.
    Component(u32),
}

impl From<&Variant> for ValueDoc {
    fn from(value: &Variant) -> Self {
        match value {
            Variant::Empty => Self::Empty,
            Variant::Bool(v) => Self::Bool(*v),
            Variant::Int(v) => Self::Int(*v),
            Variant::Float(v) => Self::Float(*v),
            Variant::Vec3(v) => Self::Vec3(v.to_array()),
            Variant::Quat(v) => Self::Quat(v.to_array()),
            Variant::String(v) => Self::String(v.clone()),
            Variant::Buffer(v) => Self::Buffer(v.clone()),
            Variant::NodeRef(v) => Self::Node(*v),
            Variant::ComponentRef(v) => Self::Component(*v),
        }
    }
}

impl From<&ValueDoc> for Variant {
    fn from(value: &ValueDoc) -> Self {
        match value {
            ValueDoc::Empty => Self::Empty,
            ValueDoc::Bool(v) => Self::Bool(*v),
            ValueDoc::Int(v) => Self::Int(*v),
            ValueDoc::Float(v) => Self::Float(*v),
            ValueDoc::Vec3(v) => Self::Vec3(Vec3::from_array(*v)),
            ValueDoc::Quat(v) => Self::Quat(Quat::from_array(*v)),
            ValueDoc::String(v) => Self::String(v.clone()),
            ValueDoc::Buffer(v) => Self::Buffer(v.clone()),
            ValueDoc::Node(v) => Self::NodeRef(*v),
            ValueDoc::Component(v) => Self::ComponentRef(*v),
        }
    }
}
