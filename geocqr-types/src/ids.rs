//! Dense, zero-cost identifier newtypes for cells, regions and items.
//!
//! Cell ids are dense in `[0, cellCount)` and region ids dense in
//! `[0, regionCount)`; item ids are unique but not necessarily contiguous.
//! Wrapping them in distinct types prevents accidentally mixing up, say, a
//! cell id and a region id when both are plain `u32`s at the call site.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! dense_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Sentinel used by collaborators to signal "no such id".
            pub const NULL: $name = $name(u32::MAX);

            #[inline]
            pub const fn new(id: u32) -> Self {
                Self(id)
            }

            #[inline]
            pub const fn get(self) -> u32 {
                self.0
            }

            #[inline]
            pub const fn is_null(self) -> bool {
                self.0 == u32::MAX
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            #[inline]
            fn from(id: u32) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u32 {
            #[inline]
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

dense_id!(CellId, "Identifier of a cell in the cell/region arrangement.");
dense_id!(RegionId, "Identifier of a region in the region DAG.");
dense_id!(ItemId, "Identifier of an individual map feature (POI/street/area).");
