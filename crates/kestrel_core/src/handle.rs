//! # Arena Handles
//!
//! Nodes and components live in scene-owned arenas; the rest of the engine
//! refers to them through copyable handles consisting of:
//! - A slot index into the arena
//! - A generation counter for detecting stale references
//!
//! Handles are distinct types per kind so a component handle can never be
//! passed where a node handle is expected.

/// Handle to a node slot in a scene arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeHandle(u64);

impl NodeHandle {
    /// Builds a handle from slot index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Null handle; never resolves.
    pub const NULL: Self = Self(u64::MAX);

    /// Checks whether this is the null handle.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for NodeHandle {
    fn default() -> Self {
        Self::NULL
    }
}

/// Handle to a component slot in a scene arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ComponentHandle(u64);

impl ComponentHandle {
    /// Builds a handle from slot index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Null handle; never resolves.
    pub const NULL: Self = Self(u64::MAX);

    /// Checks whether this is the null handle.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for ComponentHandle {
    fn default() -> Self {
        Self::NULL
    }
}
