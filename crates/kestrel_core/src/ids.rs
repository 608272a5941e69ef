//! # Scene Identity Ranges
//!
//! Every live node and component holds a `u32` identifier drawn from one of
//! two disjoint ranges:
//!
//! - **REPLICATED** (low values): network-visible, synchronized to every
//!   observer.
//! - **LOCAL** (high values): observer-private, never sent over the wire.
//!
//! Identifier `0` means "unassigned". An identifier is reused only after its
//! holder is destroyed.

use std::collections::HashMap;

use crate::error::{SceneError, SceneResult};

/// First identifier of the replicated range.
pub const FIRST_REPLICATED_ID: u32 = 0x1;
/// Last identifier of the replicated range.
pub const LAST_REPLICATED_ID: u32 = 0x00FF_FFFF;
/// First identifier of the local range.
pub const FIRST_LOCAL_ID: u32 = 0x0100_0000;
/// Last identifier of the local range.
pub const LAST_LOCAL_ID: u32 = 0xFFFF_FFFF;

/// Which identifier range a node or component is created in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CreateMode {
    /// Network-visible; state is synchronized to all observers.
    Replicated,
    /// Observer-private; never replicated.
    Local,
}

impl CreateMode {
    /// Classifies an assigned identifier by the range it falls in.
    ///
    /// Identifier `0` (unassigned) classifies as `Replicated`, matching the
    /// map the registration path would consult first.
    #[inline]
    #[must_use]
    pub const fn of(id: u32) -> Self {
        if id < FIRST_LOCAL_ID {
            Self::Replicated
        } else {
            Self::Local
        }
    }
}

/// Rotating-cursor identifier allocator for one (kind, range) combination.
///
/// The cursor advances past every identifier it hands out instead of
/// restarting from the range start, so sustained create/destroy churn stays
/// O(1) per allocation. The scan is capped at one full lap of the range:
/// a fully occupied range yields [`SceneError::CapacityExceeded`] instead of
/// spinning.
#[derive(Clone, Debug)]
pub struct IdAllocator {
    next: u32,
    first: u32,
    last: u32,
}

impl IdAllocator {
    /// Creates an allocator covering the standard range for `mode`.
    #[must_use]
    pub const fn new(mode: CreateMode) -> Self {
        match mode {
            CreateMode::Replicated => Self {
                next: FIRST_REPLICATED_ID,
                first: FIRST_REPLICATED_ID,
                last: LAST_REPLICATED_ID,
            },
            CreateMode::Local => Self {
                next: FIRST_LOCAL_ID,
                first: FIRST_LOCAL_ID,
                last: LAST_LOCAL_ID,
            },
        }
    }

    /// Creates an allocator over an arbitrary inclusive range.
    ///
    /// Exists so capacity behavior can be exercised without walking a
    /// 24-bit range.
    #[must_use]
    pub const fn with_range(first: u32, last: u32) -> Self {
        Self {
            next: first,
            first,
            last,
        }
    }

    /// Rewinds the cursor to the range start.
    pub fn reset(&mut self) {
        self.next = self.first;
    }

    /// Returns the lowest free identifier at or after the cursor.
    ///
    /// `live` is the map of identifiers currently held by live objects of
    /// this kind and range.
    ///
    /// # Errors
    ///
    /// [`SceneError::CapacityExceeded`] if every identifier in the range is
    /// in use.
    pub fn allocate<V>(&mut self, live: &HashMap<u32, V>) -> SceneResult<u32> {
        let span = u64::from(self.last - self.first) + 1;
        let mut scanned: u64 = 0;

        while scanned < span {
            let candidate = self.next;
            self.next = if self.next == self.last {
                self.first
            } else {
                self.next + 1
            };

            if !live.contains_key(&candidate) {
                return Ok(candidate);
            }
            scanned += 1;
        }

        Err(SceneError::CapacityExceeded {
            first: self.first,
            last: self.last,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges_are_disjoint() {
        assert!(LAST_REPLICATED_ID < FIRST_LOCAL_ID);
        assert_eq!(CreateMode::of(LAST_REPLICATED_ID), CreateMode::Replicated);
        assert_eq!(CreateMode::of(FIRST_LOCAL_ID), CreateMode::Local);
    }

    #[test]
    fn test_allocate_skips_live_ids() {
        let mut alloc = IdAllocator::new(CreateMode::Replicated);
        let mut live: HashMap<u32, ()> = HashMap::new();
        live.insert(1, ());
        live.insert(2, ());

        assert_eq!(alloc.allocate(&live).unwrap(), 3);
        // Cursor advanced past the returned id.
        assert_eq!(alloc.allocate(&live).unwrap(), 4);
    }

    #[test]
    fn test_cursor_wraps_at_range_end() {
        let mut alloc = IdAllocator::with_range(10, 12);
        let live: HashMap<u32, ()> = HashMap::new();

        assert_eq!(alloc.allocate(&live).unwrap(), 10);
        assert_eq!(alloc.allocate(&live).unwrap(), 11);
        assert_eq!(alloc.allocate(&live).unwrap(), 12);
        assert_eq!(alloc.allocate(&live).unwrap(), 10);
    }

    #[test]
    fn test_full_range_reports_capacity() {
        let mut alloc = IdAllocator::with_range(5, 7);
        let mut live: HashMap<u32, ()> = HashMap::new();
        live.insert(5, ());
        live.insert(6, ());
        live.insert(7, ());

        match alloc.allocate(&live) {
            Err(SceneError::CapacityExceeded { first: 5, last: 7 }) => {}
            other => panic!("expected CapacityExceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_released_id_is_reissued() {
        let mut alloc = IdAllocator::with_range(1, 2);
        let mut live: HashMap<u32, ()> = HashMap::new();

        let a = alloc.allocate(&live).unwrap();
        live.insert(a, ());
        let b = alloc.allocate(&live).unwrap();
        live.insert(b, ());

        live.remove(&a);
        assert_eq!(alloc.allocate(&live).unwrap(), a);
    }
}
