//! Entity and component identifiers and their allocation.
//!
//! Both [`EntityId`] and [`ComponentId`] are plain `u32` values partitioned
//! into disjoint ranges. The range an id falls into tells whether the owning
//! object is confirmed-replicated, replicated but still waiting for the host to
//! acknowledge it, or local-only:
//!
//! | range                          | meaning                           |
//! |--------------------------------|-----------------------------------|
//! | `0`                            | unassigned                        |
//! | `1 ..= 0x3FFF_FFFF`            | replicated, issued by the host    |
//! | `0x4000_0000 ..= 0x7FFF_FFFF`  | replicated, pending host ack      |
//! | `0x8000_0000 ..= u32::MAX`     | local, never replicated           |

use serde::{Deserialize, Serialize};
use std::fmt;

/// First id handed out by an authoritative allocator.
pub const FIRST_REPLICATED_ID: u32 = 1;
/// First id of the speculative (unacked) replicated range.
pub const FIRST_UNACKED_ID: u32 = 0x4000_0000;
/// First id of the local-only range.
pub const FIRST_LOCAL_ID: u32 = 0x8000_0000;

// ---------------------------------------------------------------------------
// IdRange
// ---------------------------------------------------------------------------

/// The range a raw id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdRange {
    /// The reserved value `0`.
    Unassigned,
    /// Issued by the authoritative host.
    Replicated,
    /// Issued speculatively by a non-authoritative participant.
    Unacked,
    /// Never leaves this participant.
    Local,
}

impl IdRange {
    /// Classify a raw id.
    pub fn of(raw: u32) -> Self {
        match raw {
            0 => IdRange::Unassigned,
            r if r < FIRST_UNACKED_ID => IdRange::Replicated,
            r if r < FIRST_LOCAL_ID => IdRange::Unacked,
            _ => IdRange::Local,
        }
    }
}

// ---------------------------------------------------------------------------
// EntityId / ComponentId
// ---------------------------------------------------------------------------

macro_rules! scene_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// The reserved "no id" value.
            pub const NONE: Self = Self(0);

            /// Raw `u32` value.
            #[inline]
            pub fn raw(self) -> u32 {
                self.0
            }

            /// `true` for the reserved value `0`.
            #[inline]
            pub fn is_none(self) -> bool {
                self.0 == 0
            }

            /// Which range this id belongs to.
            #[inline]
            pub fn range(self) -> IdRange {
                IdRange::of(self.0)
            }

            /// Replication status is derived from the range, never stored.
            #[inline]
            pub fn is_replicated(self) -> bool {
                self.0 < FIRST_LOCAL_ID
            }

            #[inline]
            pub fn is_local(self) -> bool {
                self.0 >= FIRST_LOCAL_ID
            }

            /// Replicated but not yet acknowledged by the host.
            #[inline]
            pub fn is_unacked(self) -> bool {
                self.range() == IdRange::Unacked
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(raw: u32) -> Self {
                Self(raw)
            }
        }
    };
}

scene_id!(
    /// Identifier of an entity inside one scene.
    EntityId,
    "EntityId"
);

scene_id!(
    /// Identifier of a component inside one entity.
    ComponentId,
    "ComponentId"
);

// ---------------------------------------------------------------------------
// UniqueIdGenerator
// ---------------------------------------------------------------------------

/// Hands out ids from the replicated, unacked and local ranges.
///
/// Ids issued by the generator are never reused until [`reset`](Self::reset),
/// but the generator knows nothing about ids assigned by hand. Callers check
/// their live map and allocate again on collision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueIdGenerator {
    /// Last issued replicated id (0 before the first allocation).
    replicated: u32,
    /// Last issued unacked id.
    unacked: u32,
    /// Last issued local id.
    local: u32,
}

impl UniqueIdGenerator {
    pub fn new() -> Self {
        Self {
            replicated: FIRST_REPLICATED_ID - 1,
            unacked: FIRST_UNACKED_ID - 1,
            local: FIRST_LOCAL_ID - 1,
        }
    }

    /// Next id of the host-issued replicated range.
    pub fn allocate_replicated(&mut self) -> u32 {
        self.replicated = next_in_range(self.replicated, FIRST_REPLICATED_ID, FIRST_UNACKED_ID - 1);
        self.replicated
    }

    /// Next id of the speculative replicated range.
    pub fn allocate_unacked(&mut self) -> u32 {
        self.unacked = next_in_range(self.unacked, FIRST_UNACKED_ID, FIRST_LOCAL_ID - 1);
        self.unacked
    }

    /// Next id of the local range.
    pub fn allocate_local(&mut self) -> u32 {
        self.local = next_in_range(self.local, FIRST_LOCAL_ID, u32::MAX);
        self.local
    }

    /// Fast-forward the replicated counter so the next allocation is above
    /// `min`. Never moves the counter backward.
    pub fn reset_replicated_id(&mut self, min: u32) {
        if min > self.replicated && min < FIRST_UNACKED_ID {
            self.replicated = min;
        }
    }

    /// Last issued replicated id.
    pub fn last_replicated(&self) -> u32 {
        self.replicated
    }

    /// Return every counter to its initial state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for UniqueIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn next_in_range(last: u32, first: u32, last_valid: u32) -> u32 {
    if last >= last_valid {
        tracing::warn!(first, last_valid, "id range exhausted, wrapping around");
        first
    } else {
        last + 1
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_allocations_start_at_range_base() {
        let mut gen = UniqueIdGenerator::new();
        assert_eq!(gen.allocate_replicated(), 1);
        assert_eq!(gen.allocate_replicated(), 2);
        assert_eq!(gen.allocate_unacked(), FIRST_UNACKED_ID);
        assert_eq!(gen.allocate_local(), FIRST_LOCAL_ID);
        assert_eq!(gen.allocate_local(), FIRST_LOCAL_ID + 1);
    }

    #[test]
    fn reset_replicated_id_never_moves_backward() {
        let mut gen = UniqueIdGenerator::new();
        gen.reset_replicated_id(10);
        assert_eq!(gen.allocate_replicated(), 11);
        gen.reset_replicated_id(5);
        assert_eq!(gen.allocate_replicated(), 12);
    }

    #[test]
    fn reset_restores_initial_counters() {
        let mut gen = UniqueIdGenerator::new();
        gen.allocate_replicated();
        gen.allocate_local();
        gen.allocate_unacked();
        gen.reset();
        assert_eq!(gen, UniqueIdGenerator::new());
        assert_eq!(gen.allocate_replicated(), 1);
    }

    #[test]
    fn local_range_wraps_at_end() {
        let mut gen = UniqueIdGenerator::new();
        gen.local = u32::MAX;
        assert_eq!(gen.allocate_local(), FIRST_LOCAL_ID);
    }

    #[test]
    fn replicated_range_wraps_before_unacked() {
        let mut gen = UniqueIdGenerator::new();
        gen.replicated = FIRST_UNACKED_ID - 1;
        assert_eq!(gen.allocate_replicated(), FIRST_REPLICATED_ID);
    }

    #[test]
    fn range_classification() {
        assert_eq!(IdRange::of(0), IdRange::Unassigned);
        assert_eq!(IdRange::of(1), IdRange::Replicated);
        assert_eq!(IdRange::of(FIRST_UNACKED_ID), IdRange::Unacked);
        assert_eq!(IdRange::of(FIRST_LOCAL_ID - 1), IdRange::Unacked);
        assert_eq!(IdRange::of(FIRST_LOCAL_ID), IdRange::Local);
        assert!(EntityId(FIRST_UNACKED_ID).is_replicated());
        assert!(EntityId(FIRST_UNACKED_ID).is_unacked());
        assert!(ComponentId(FIRST_LOCAL_ID).is_local());
    }

    #[test]
    fn id_display_and_debug() {
        assert_eq!(format!("{}", EntityId(7)), "7");
        assert_eq!(format!("{:?}", ComponentId(3)), "ComponentId(3)");
    }
}
