//! # geocqr-types
//!
//! Core identifier and geometry types for the `geocqr` query engine.
//!
//! This crate provides the fundamental, dependency-light types shared
//! between the engine and its collaborators:
//!
//! - **Id types**: `CellId`, `RegionId`, `ItemId`
//! - **Geometry**: `Geometry` (point / way / polygon / multipolygon)
//! - **Flags**: `ItemIdFlags`
//!
//! All types are serializable with Serde and built on top of the `geo`
//! crate's geometric primitives.

pub mod flags;
pub mod geometry;
pub mod ids;

pub use flags::ItemIdFlags;
pub use geometry::Geometry;
pub use ids::{CellId, ItemId, RegionId};
