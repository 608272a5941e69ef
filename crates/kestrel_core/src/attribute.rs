//! # Attribute Schema
//!
//! Components describe their serializable state through a static table of
//! [`AttributeInfo`] entries. The same table drives the file codecs, the
//! structured-text document, the network diff and any editor front-end:
//! one schema, three consumers.

/// Replication-mode bits for one attribute.
pub mod mode {
    /// Written to scene files and documents.
    pub const FILE: u8 = 1 << 0;
    /// Replicated to network observers.
    pub const NET: u8 = 1 << 1;
    /// Both file and network.
    pub const DEFAULT: u8 = FILE | NET;
}

/// One entry of a component's attribute schema.
#[derive(Debug, Clone, Copy)]
pub struct AttributeInfo {
    /// Attribute name as it appears in scene documents.
    pub name: &'static str,
    /// Bitwise OR of [`mode`] flags; empty means transient.
    pub mode: u8,
}

impl AttributeInfo {
    /// Shorthand constructor.
    #[must_use]
    pub const fn new(name: &'static str, mode: u8) -> Self {
        Self { name, mode }
    }

    /// True if the attribute participates in file serialization.
    #[inline]
    #[must_use]
    pub const fn is_file(&self) -> bool {
        self.mode & mode::FILE != 0
    }

    /// True if the attribute participates in network replication.
    #[inline]
    #[must_use]
    pub const fn is_net(&self) -> bool {
        self.mode & mode::NET != 0
    }
}

/// Looks up an attribute index by name in a schema table.
#[must_use]
pub fn find_attribute(schema: &[AttributeInfo], name: &str) -> Option<usize> {
    schema.iter().position(|info| info.name == name)
}
