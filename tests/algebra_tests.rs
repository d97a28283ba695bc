//! Integration coverage for the CQR algebra across both result shapes,
//! complementing the unit tests inside `src/cqr.rs`.

use geocqr::cqr::{Cqr, ResultShape, TreedCqr};
use geocqr::item_index::ItemIndex;
use geocqr::{CellId, ItemId, ItemIdFlags};

fn cell(id: u32) -> CellId {
    CellId::new(id)
}

fn items(ids: &[u32]) -> ItemIndex {
    ItemIndex::from_unsorted(ids.iter().map(|&i| ItemId::new(i)).collect())
}

#[test]
fn treed_and_eager_shapes_agree_on_a_three_way_expression() {
    let a = Cqr::full(vec![cell(1), cell(2)], ItemIdFlags::default());
    let b = Cqr::partial(vec![(cell(2), items(&[1]))], ItemIdFlags::default());
    let c = Cqr::full(vec![cell(3)], ItemIdFlags::default());

    let eager = a.clone().union(b.clone()).intersection(c.clone().union(a.clone()));

    let lazy = TreedCqr::from_cqr(a.clone())
        .union(TreedCqr::from_cqr(b))
        .intersection(TreedCqr::from_cqr(c).union(TreedCqr::from_cqr(a)))
        .to_cqr(2);

    assert_eq!(eager.fm(), lazy.fm());
    assert_eq!(eager.pm(), lazy.pm());
}

#[test]
fn difference_then_union_restores_the_original_fm_cells() {
    let a = Cqr::full(vec![cell(1), cell(2), cell(3)], ItemIdFlags::default());
    let b = Cqr::full(vec![cell(2)], ItemIdFlags::default());
    let restored = a.clone().difference(b.clone()).union(b);
    assert_eq!(restored.fm(), a.fm());
}

#[test]
fn symmetric_difference_is_commutative() {
    let a = Cqr::from_parts(vec![cell(1)], vec![(cell(2), items(&[1, 2]))], ItemIdFlags::default());
    let b = Cqr::from_parts(vec![cell(2)], vec![(cell(3), items(&[2, 3]))], ItemIdFlags::default());
    let ab = a.clone().symmetric_difference(b.clone());
    let ba = b.symmetric_difference(a);
    assert_eq!(ab.fm(), ba.fm());
    assert_eq!(ab.pm(), ba.pm());
}

#[test]
fn all_to_full_is_idempotent() {
    let a = Cqr::from_parts(vec![cell(1)], vec![(cell(2), items(&[1]))], ItemIdFlags::default());
    let once = a.all_to_full();
    let twice = once.clone().all_to_full();
    assert_eq!(once.fm(), twice.fm());
    assert!(twice.pm().is_empty());
}

#[test]
fn retain_cells_filters_both_fm_and_pm() {
    let a = Cqr::from_parts(
        vec![cell(1), cell(4)],
        vec![(cell(2), items(&[1])), (cell(3), items(&[2]))],
        ItemIdFlags::default(),
    );
    let kept = a.retain_cells(&|c| c.get() % 2 == 0);
    assert_eq!(kept.fm(), &[cell(4)]);
    assert_eq!(kept.pm(), &[(cell(2), items(&[1]))]);
}

#[test]
fn into_cqr_and_of_cqr_round_trip_through_both_shapes() {
    let original = Cqr::full(vec![cell(5)], ItemIdFlags::default());
    let as_treed = TreedCqr::of_cqr(original.clone());
    let back = as_treed.into_cqr(1);
    assert_eq!(back, original);
}
