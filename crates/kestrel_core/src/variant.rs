//! # Variant Values
//!
//! The dynamically-typed value carried by node variable bags, component
//! attributes, the file codecs and the replication protocol. One value type
//! drives all of them so a single schema entry can describe what a
//! serializer, an editor and a network codec each see.

use std::collections::HashMap;

use glam::{Quat, Vec3};

/// Dynamically typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    /// No value; the default state of an unset attribute.
    Empty,
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// 32-bit float.
    Float(f32),
    /// Three-component vector.
    Vec3(Vec3),
    /// Unit quaternion.
    Quat(Quat),
    /// UTF-8 string.
    String(String),
    /// Opaque byte buffer.
    Buffer(Vec<u8>),
    /// Cross-reference to a node by scene identifier.
    NodeRef(u32),
    /// Cross-reference to a component by scene identifier.
    ComponentRef(u32),
}

impl Default for Variant {
    fn default() -> Self {
        Self::Empty
    }
}

/// Wire/document discriminant for a [`Variant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VariantKind {
    /// [`Variant::Empty`].
    Empty = 0,
    /// [`Variant::Bool`].
    Bool = 1,
    /// [`Variant::Int`].
    Int = 2,
    /// [`Variant::Float`].
    Float = 3,
    /// [`Variant::Vec3`].
    Vec3 = 4,
    /// [`Variant::Quat`].
    Quat = 5,
    /// [`Variant::String`].
    String = 6,
    /// [`Variant::Buffer`].
    Buffer = 7,
    /// [`Variant::NodeRef`].
    NodeRef = 8,
    /// [`Variant::ComponentRef`].
    ComponentRef = 9,
}

impl VariantKind {
    /// Decodes a discriminant byte.
    #[must_use]
    pub const fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Empty),
            1 => Some(Self::Bool),
            2 => Some(Self::Int),
            3 => Some(Self::Float),
            4 => Some(Self::Vec3),
            5 => Some(Self::Quat),
            6 => Some(Self::String),
            7 => Some(Self::Buffer),
            8 => Some(Self::NodeRef),
            9 => Some(Self::ComponentRef),
            _ => None,
        }
    }
}

impl Variant {
    /// Returns the wire discriminant of this value.
    #[must_use]
    pub const fn kind(&self) -> VariantKind {
        match self {
            Self::Empty => VariantKind::Empty,
            Self::Bool(_) => VariantKind::Bool,
            Self::Int(_) => VariantKind::Int,
            Self::Float(_) => VariantKind::Float,
            Self::Vec3(_) => VariantKind::Vec3,
            Self::Quat(_) => VariantKind::Quat,
            Self::String(_) => VariantKind::String,
            Self::Buffer(_) => VariantKind::Buffer,
            Self::NodeRef(_) => VariantKind::NodeRef,
            Self::ComponentRef(_) => VariantKind::ComponentRef,
        }
    }

    /// Returns the boolean payload, if this is a `Bool`.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the integer payload, if this is an `Int`.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the float payload, if this is a `Float`.
    #[must_use]
    pub const fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the vector payload, if this is a `Vec3`.
    #[must_use]
    pub const fn as_vec3(&self) -> Option<Vec3> {
        match self {
            Self::Vec3(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the quaternion payload, if this is a `Quat`.
    #[must_use]
    pub const fn as_quat(&self) -> Option<Quat> {
        match self {
            Self::Quat(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string payload, if this is a `String`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Returns the referenced node identifier, if this is a `NodeRef`.
    #[must_use]
    pub const fn as_node_ref(&self) -> Option<u32> {
        match self {
            Self::NodeRef(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the referenced component identifier, if this is a
    /// `ComponentRef`.
    #[must_use]
    pub const fn as_component_ref(&self) -> Option<u32> {
        match self {
            Self::ComponentRef(v) => Some(*v),
            _ => None,
        }
    }
}

/// String-keyed variable bag attached to every node.
pub type VariantMap = HashMap<String, Variant>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_byte_roundtrip() {
        let values = [
            Variant::Empty,
            Variant::Bool(true),
            Variant::Int(-5),
            Variant::Float(1.5),
            Variant::Vec3(Vec3::X),
            Variant::Quat(Quat::IDENTITY),
            Variant::String("hi".into()),
            Variant::Buffer(vec![1, 2]),
            Variant::NodeRef(9),
            Variant::ComponentRef(10),
        ];
        for v in values {
            let byte = v.kind() as u8;
            assert_eq!(VariantKind::from_u8(byte), Some(v.kind()));
        }
        assert_eq!(VariantKind::from_u8(200), None);
    }

    #[test]
    fn test_typed_accessors() {
        assert_eq!(Variant::Int(7).as_int(), Some(7));
        assert_eq!(Variant::Int(7).as_bool(), None);
        assert_eq!(Variant::String("a".into()).as_str(), Some("a"));
        assert_eq!(Variant::NodeRef(3).as_node_ref(), Some(3));
    }
}
