//! Item-id encoding flags carried by every `Cqr`.
//!
//! A partial-match cell's item-index can either hold ids local to that cell
//! (small, cache-friendly) or globally-unique item ids (comparable across
//! cells). Most binary algebra operators require both operands to agree;
//! see `geocqr::cqr` for the conversion rules.

use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

/// Bit field describing how item ids are encoded in a CQR's partial cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemIdFlags(u8);

impl ItemIdFlags {
    /// Item ids in `pm` item-indices are local to their owning cell.
    pub const CELL_LOCAL: ItemIdFlags = ItemIdFlags(1 << 0);
    /// Item ids in `pm` item-indices are globally unique.
    pub const GLOBAL_ITEM_IDS: ItemIdFlags = ItemIdFlags(1 << 1);

    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[inline]
    pub const fn contains(self, other: ItemIdFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// The cell-id-local portion of these flags, used when masking to
    /// cell-item-id scope (e.g. after cell dilation, spec.md §4.4.4).
    #[inline]
    pub const fn cell_local_only(self) -> Self {
        Self::CELL_LOCAL
    }
}

impl Default for ItemIdFlags {
    fn default() -> Self {
        Self::CELL_LOCAL
    }
}

impl BitOr for ItemIdFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ItemIdFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_cell_local() {
        assert_eq!(ItemIdFlags::default(), ItemIdFlags::CELL_LOCAL);
    }

    #[test]
    fn contains_checks_bits() {
        let both = ItemIdFlags::CELL_LOCAL | ItemIdFlags::GLOBAL_ITEM_IDS;
        assert!(both.contains(ItemIdFlags::CELL_LOCAL));
        assert!(both.contains(ItemIdFlags::GLOBAL_ITEM_IDS));
        assert!(!ItemIdFlags::CELL_LOCAL.contains(ItemIdFlags::GLOBAL_ITEM_IDS));
    }
}
