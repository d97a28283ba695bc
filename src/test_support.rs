//! In-memory collaborator implementations for tests.
//!
//! Grounded on the teacher's `MemoryBackend` (`storage.rs`): a plain
//! `BTreeMap`-backed stand-in behind the same trait the real backend uses,
//! so the calculator and csq builders can be exercised end-to-end without a
//! real mmap'd index. Gated the same way a crate depending on itself as a
//! dev-dependency exposes test fixtures to its own integration tests.

use std::sync::Arc;

use geo::{Point, Polygon, Rect};
use geocqr_types::{CellId, Geometry, ItemId, RegionId};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::collaborators::{
    CellTextCompleter, Collaborators, CqrDilator, GeoHierarchy, IndexStore, MatchType,
    TriangulationArrangement,
};
use crate::cqr::Cqr;
use crate::item_index::ItemIndex;

#[derive(Default)]
struct RegionData {
    parent: Option<RegionId>,
    children: Vec<RegionId>,
    boundary: Option<Polygon<f64>>,
    exclusive_cells: Vec<CellId>,
}

#[derive(Default)]
struct InnerState {
    regions: Vec<RegionData>,
    cell_bboxes: Vec<Rect<f64>>,
    cell_items: FxHashMap<CellId, Vec<ItemId>>,
    item_cells: FxHashMap<ItemId, Vec<CellId>>,
    item_geometries: Vec<Geometry>,
    item_key_values: FxHashMap<ItemId, Vec<(u32, u32)>>,
}

/// Builder and collaborator source for tests. `empty()` seeds a single root
/// region (`RegionId(0)`) with no cells; every region added via
/// [`add_region`](Self::add_region) with `parent: None` becomes a direct
/// child of it so the resolver's root-down BFS can reach it.
#[doc(hidden)]
pub struct InMemoryCollaborators {
    state: Arc<RwLock<InnerState>>,
}

impl InMemoryCollaborators {
    pub fn empty() -> Self {
        let root = RegionData::default();
        Self { state: Arc::new(RwLock::new(InnerState { regions: vec![root], ..Default::default() })) }
    }

    pub fn root(&self) -> RegionId {
        RegionId::new(0)
    }

    pub fn add_region(&mut self, parent: Option<RegionId>) -> RegionId {
        let parent = parent.unwrap_or(self.root());
        let mut state = self.state.write();
        let id = RegionId::new(state.regions.len() as u32);
        state.regions.push(RegionData { parent: Some(parent), ..Default::default() });
        state.regions[parent.get() as usize].children.push(id);
        id
    }

    pub fn set_region_boundary(&mut self, region: RegionId, boundary: Polygon<f64>) {
        self.state.write().regions[region.get() as usize].boundary = Some(boundary);
    }

    pub fn add_cell(&mut self, region: RegionId, bbox: (f64, f64, f64, f64)) -> CellId {
        let mut state = self.state.write();
        let id = CellId::new(state.cell_bboxes.len() as u32);
        state.cell_bboxes.push(Rect::new((bbox.0, bbox.1), (bbox.2, bbox.3)));
        state.regions[region.get() as usize].exclusive_cells.push(id);
        id
    }

    pub fn add_item(&mut self, geometry: Geometry) -> ItemId {
        let mut state = self.state.write();
        let id = ItemId::new(state.item_geometries.len() as u32);
        state.item_geometries.push(geometry);
        id
    }

    pub fn index_item_in_cell(&mut self, cell: CellId, item: ItemId) {
        let mut state = self.state.write();
        state.cell_items.entry(cell).or_default().push(item);
        state.item_cells.entry(item).or_default().push(cell);
    }

    pub fn tag_item(&mut self, item: ItemId, key: u32, value: u32) {
        self.state.write().item_key_values.entry(item).or_default().push((key, value));
    }

    pub fn collaborators(&self) -> Collaborators {
        let store: Arc<dyn IndexStore> = self.state.clone();
        let hierarchy: Arc<dyn GeoHierarchy> = self.state.clone();
        let triangulation: Arc<dyn TriangulationArrangement> = self.state.clone();
        let dilator: Arc<dyn CqrDilator> = self.state.clone();
        Collaborators::new(store, hierarchy, triangulation, dilator)
    }
}

impl IndexStore for RwLock<InnerState> {
    fn items_in_cell(&self, cell: CellId) -> ItemIndex {
        let state = self.read();
        match state.cell_items.get(&cell) {
            Some(items) => items.iter().copied().collect(),
            None => ItemIndex::empty(),
        }
    }

    fn item_geometry(&self, item: ItemId) -> Geometry {
        self.read().item_geometries[item.get() as usize].clone()
    }

    fn item_cells(&self, item: ItemId) -> Vec<CellId> {
        self.read().item_cells.get(&item).cloned().unwrap_or_default()
    }

    fn item_key_values(&self, item: ItemId) -> Vec<(u32, u32)> {
        self.read().item_key_values.get(&item).cloned().unwrap_or_default()
    }
}

fn region_cells_inner(state: &InnerState, region: RegionId) -> Vec<CellId> {
    let data = &state.regions[region.get() as usize];
    let mut cells = data.exclusive_cells.clone();
    for &child in &data.children {
        cells.extend(region_cells_inner(state, child));
    }
    cells
}

impl GeoHierarchy for RwLock<InnerState> {
    fn root_region(&self) -> RegionId {
        RegionId::new(0)
    }

    fn cell_parents(&self, cell: CellId) -> Vec<RegionId> {
        let state = self.read();
        state
            .regions
            .iter()
            .enumerate()
            .filter(|(_, r)| r.exclusive_cells.contains(&cell))
            .map(|(i, _)| RegionId::new(i as u32))
            .collect()
    }

    fn region_cell_count(&self, region: RegionId) -> u32 {
        let state = self.read();
        region_cells_inner(&state, region).len() as u32
    }

    fn region_item_count(&self, region: RegionId) -> u32 {
        let state = self.read();
        let cells = region_cells_inner(&state, region);
        cells.iter().map(|c| state.cell_items.get(c).map(|v| v.len()).unwrap_or(0) as u32).sum()
    }

    fn region_boundary(&self, region: RegionId) -> Option<Polygon<f64>> {
        self.read().regions[region.get() as usize].boundary.clone()
    }

    fn cell_boundary(&self, cell: CellId) -> Rect<f64> {
        self.read().cell_bboxes[cell.get() as usize]
    }

    fn region_cells(&self, region: RegionId) -> Arc<[CellId]> {
        let state = self.read();
        region_cells_inner(&state, region).into()
    }

    fn region_exclusive_cells(&self, region: RegionId) -> Arc<[CellId]> {
        self.read().regions[region.get() as usize].exclusive_cells.clone().into()
    }

    fn child_regions(&self, region: RegionId) -> Vec<RegionId> {
        self.read().regions[region.get() as usize].children.clone()
    }

    fn parent_regions(&self, region: RegionId) -> Vec<RegionId> {
        self.read().regions[region.get() as usize].parent.into_iter().collect()
    }
}

impl TriangulationArrangement for RwLock<InnerState> {
    fn cell_id(&self, point: Point<f64>) -> CellId {
        let state = self.read();
        state
            .cell_bboxes
            .iter()
            .position(|bbox| {
                point.x() >= bbox.min().x && point.x() <= bbox.max().x && point.y() >= bbox.min().y && point.y() <= bbox.max().y
            })
            .map(|i| CellId::new(i as u32))
            .unwrap_or(CellId::NULL)
    }

    fn cells_along_path(&self, _radius_m: f64, _points: &[Point<f64>]) -> ItemIndex {
        ItemIndex::empty()
    }
}

impl CqrDilator for RwLock<InnerState> {
    /// A no-op dilation: returns no extra cells. Real dilation needs actual
    /// spatial buffering, out of scope for this fixture.
    fn dilate(&self, cqr: &Cqr, _distance_m: f64, _threads: usize) -> Vec<CellId> {
        let _ = cqr;
        Vec::new()
    }
}

/// A `CellTextCompleter` over a flat `(word -> Cqr)` map, enough to drive
/// parser/calculator integration tests without a real text index.
#[doc(hidden)]
pub struct InMemoryTextCompleter {
    exact: FxHashMap<String, Cqr>,
}

impl InMemoryTextCompleter {
    pub fn new() -> Self {
        Self { exact: FxHashMap::default() }
    }

    pub fn insert(&mut self, word: impl Into<String>, cqr: Cqr) {
        self.exact.insert(word.into(), cqr);
    }
}

impl Default for InMemoryTextCompleter {
    fn default() -> Self {
        Self::new()
    }
}

impl CellTextCompleter for InMemoryTextCompleter {
    fn complete(&self, query: &str, _match_type: MatchType) -> Cqr {
        self.exact.get(query).cloned().unwrap_or_else(|| Cqr::empty(geocqr_types::ItemIdFlags::default()))
    }

    fn items(&self, query: &str, match_type: MatchType) -> Cqr {
        self.complete(query, match_type)
    }

    fn regions(&self, query: &str, match_type: MatchType) -> Cqr {
        self.complete(query, match_type)
    }

    fn cqr_from_cell_id(&self, cell: CellId) -> Cqr {
        Cqr::full(vec![cell], geocqr_types::ItemIdFlags::default())
    }

    fn cqr_from_triangle_id(&self, _triangle: u32) -> Cqr {
        Cqr::empty(geocqr_types::ItemIdFlags::default())
    }

    fn cqr_from_region_store_id(&self, _region: RegionId) -> Cqr {
        Cqr::empty(geocqr_types::ItemIdFlags::default())
    }

    fn cqr_from_point(&self, _point: Point<f64>) -> Cqr {
        Cqr::empty(geocqr_types::ItemIdFlags::default())
    }

    fn cqr_from_rect(&self, _rect: Rect<f64>) -> Cqr {
        Cqr::empty(geocqr_types::ItemIdFlags::default())
    }

    fn cqr_along_path(&self, _radius_m: f64, _points: &[Point<f64>]) -> Cqr {
        Cqr::empty(geocqr_types::ItemIdFlags::default())
    }

    fn cqr_between(&self, _a: Point<f64>, _b: Point<f64>, _radius_m: f64) -> Cqr {
        Cqr::empty(geocqr_types::ItemIdFlags::default())
    }
}
