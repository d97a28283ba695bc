//! External store traits the core consumes (spec.md §6.2).
//!
//! These mirror the teacher's `StorageBackend` split in `storage.rs`: a
//! small set of `Send + Sync` trait objects, injected once at construction
//! and shared by `Arc` across requests. Nothing here is implemented by this
//! crate — implementations live behind the index build step this engine
//! deliberately doesn't own — but `test_support.rs` carries in-memory
//! doubles of each for unit tests.

use std::sync::Arc;

use geo::{Point, Polygon, Rect};
use geocqr_types::{CellId, Geometry, ItemId, ItemIdFlags, RegionId};

use crate::cqr::Cqr;
use crate::error::{QueryError, Result};
use crate::item_index::ItemIndex;

/// The lexical hint the calculator derives from a STRING leaf's shape
/// (spec.md §4.5: "derive a match-type hint ... from its structure").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Prefix,
    Suffix,
    Substring,
    Exact,
}

/// The item-index store (spec.md §6.2's `IndexStore`). Spec.md §6.2 frames
/// this as `at(idx_ptr) -> ItemIndex` over a raw pool offset, but the
/// pointer itself is memory-mapping plumbing spec.md §1 explicitly puts out
/// of scope ("file discovery, memory mapping, ... reference counting of
/// mapped blobs"); this trait exposes the resolved form directly and lets
/// an implementation keep its own pointer bookkeeping private.
pub trait IndexStore: Send + Sync {
    /// Every item id filed under `cell`.
    fn items_in_cell(&self, cell: CellId) -> ItemIndex;

    /// The geometry owned by `item` (spec.md §3.1). Needed by the resolver's
    /// item-accuracy family (`AC_POLYGON_ITEM`/`AC_POLYGON_ITEM_BBOX`), which
    /// §4.3 describes as testing "each item" directly — §6.2's own
    /// `IndexStore` contract doesn't name this lookup, but the item data
    /// model in §3.1 does, so it is grounded there rather than invented.
    fn item_geometry(&self, item: ItemId) -> Geometry;

    /// Every cell `item` is filed under (spec.md §3.1: an item "has a list
    /// of cell ids"). Needed by the calculator's `ITEM` leaf, which builds a
    /// CQR whose pm set is exactly those cells with `{item}` as their
    /// matched set (spec.md §4.5).
    fn item_cells(&self, item: ItemId) -> Vec<CellId>;

    /// Every `(key_id, value_id)` tag pair owned by `item` (spec.md §3.1's
    /// "key/value tags"). Walked by the KV-stats aggregator (spec.md §4.6)
    /// and KoMa's preprocess pass (spec.md §4.7); neither names the
    /// accessor directly, but both describe walking "its (key-id, value-id)
    /// pairs" per item, so it's grounded the same way `item_cells` is.
    fn item_key_values(&self, item: ItemId) -> Vec<(u32, u32)>;
}

/// Free-text completion and the geometric leaf shortcuts the text index
/// can serve directly (spec.md §6.2's `CellTextCompleter`).
pub trait CellTextCompleter: Send + Sync {
    fn complete(&self, query: &str, match_type: MatchType) -> Cqr;
    fn items(&self, query: &str, match_type: MatchType) -> Cqr;
    fn regions(&self, query: &str, match_type: MatchType) -> Cqr;

    fn cqr_from_cell_id(&self, cell: CellId) -> Cqr;
    fn cqr_from_triangle_id(&self, triangle: u32) -> Cqr;
    fn cqr_from_region_store_id(&self, region: RegionId) -> Cqr;
    fn cqr_from_point(&self, point: Point<f64>) -> Cqr;
    fn cqr_from_rect(&self, rect: Rect<f64>) -> Cqr;

    fn cqr_along_path(&self, radius_m: f64, points: &[Point<f64>]) -> Cqr;
    fn cqr_between(&self, a: Point<f64>, b: Point<f64>, radius_m: f64) -> Cqr;
}

/// Cell/region metadata (spec.md §6.2's `GeoHierarchy`).
pub trait GeoHierarchy: Send + Sync {
    fn root_region(&self) -> RegionId;
    fn cell_parents(&self, cell: CellId) -> Vec<RegionId>;
    fn region_cell_count(&self, region: RegionId) -> u32;
    fn region_item_count(&self, region: RegionId) -> u32;
    fn region_boundary(&self, region: RegionId) -> Option<Polygon<f64>>;
    fn cell_boundary(&self, cell: CellId) -> Rect<f64>;
    /// Every cell under `region`, direct or inherited from descendants.
    fn region_cells(&self, region: RegionId) -> Arc<[CellId]>;
    /// Cells under `region` but not under any of its child regions.
    fn region_exclusive_cells(&self, region: RegionId) -> Arc<[CellId]>;
    fn child_regions(&self, region: RegionId) -> Vec<RegionId>;
    fn parent_regions(&self, region: RegionId) -> Vec<RegionId>;
}

/// Point/path-to-cell lookups over the triangulated arrangement (spec.md
/// §6.2's `TriangulationArrangement`).
pub trait TriangulationArrangement: Send + Sync {
    /// `CellId::NULL` when the point falls outside the arrangement.
    fn cell_id(&self, point: Point<f64>) -> CellId;
    fn cells_along_path(&self, radius_m: f64, points: &[Point<f64>]) -> ItemIndex;
}

/// Cell-dilation backend (spec.md §6.2's `CQRDilator`, used by `%N%`). Spec.md
/// types the result as a generic `ItemIndex` (the source's `u32` sets are
/// reused for both item and cell ids); here the result is typed directly as
/// the cell ids it actually is, for the same reason `IndexStore`/
/// `GeoHierarchy` expose typed accessors instead of raw pool offsets.
pub trait CqrDilator: Send + Sync {
    fn dilate(&self, cqr: &Cqr, distance_m: f64, threads: usize) -> Vec<CellId>;
}

/// Optional routing collaborator for the relevant-element operator
/// (spec.md §6.2's `RoutingProvider`).
pub trait RoutingProvider: Send + Sync {
    fn cqr(
        &self,
        source: Point<f64>,
        target: Point<f64>,
        flags: ItemIdFlags,
        radius_m: f64,
    ) -> Cqr;
}

/// The bundle of collaborators a `QueryEngine` is constructed with.
///
/// `index_store`, `geo_hierarchy`, `triangulation` and `dilator` are
/// required: nearly every leaf and modifier touches at least one of them.
/// `text_completer` and `routing` are optional, matching spec.md §6.2's
/// note that `RoutingProvider` is optional and §7's `MissingData` error
/// ("no text index for a STRING leaf") — accessing either without one
/// configured raises `QueryError::MissingCollaborator`.
#[derive(Clone)]
pub struct Collaborators {
    pub index_store: Arc<dyn IndexStore>,
    pub geo_hierarchy: Arc<dyn GeoHierarchy>,
    pub triangulation: Arc<dyn TriangulationArrangement>,
    pub dilator: Arc<dyn CqrDilator>,
    pub text_completer: Option<Arc<dyn CellTextCompleter>>,
    pub routing: Option<Arc<dyn RoutingProvider>>,
}

impl Collaborators {
    pub fn new(
        index_store: Arc<dyn IndexStore>,
        geo_hierarchy: Arc<dyn GeoHierarchy>,
        triangulation: Arc<dyn TriangulationArrangement>,
        dilator: Arc<dyn CqrDilator>,
    ) -> Self {
        Self {
            index_store,
            geo_hierarchy,
            triangulation,
            dilator,
            text_completer: None,
            routing: None,
        }
    }

    pub fn with_text_completer(mut self, completer: Arc<dyn CellTextCompleter>) -> Self {
        self.text_completer = Some(completer);
        self
    }

    pub fn with_routing(mut self, routing: Arc<dyn RoutingProvider>) -> Self {
        self.routing = Some(routing);
        self
    }

    pub fn text_completer(&self) -> Result<&Arc<dyn CellTextCompleter>> {
        self.text_completer
            .as_ref()
            .ok_or(QueryError::MissingCollaborator("CellTextCompleter"))
    }

    pub fn routing(&self) -> Result<&Arc<dyn RoutingProvider>> {
        self.routing
            .as_ref()
            .ok_or(QueryError::MissingCollaborator("RoutingProvider"))
    }
}
