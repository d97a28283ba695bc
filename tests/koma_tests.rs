//! Integration coverage for KoMa facet clustering over larger synthetic
//! item sets, complementing the unit tests inside `src/koma.rs`.

use geo::Point;
use geocqr::config::EngineConfig;
use geocqr::exclusions::{KeyExclusions, KeyValueExclusions};
use geocqr::item_index::ItemIndex;
use geocqr::koma::KomaClustering;
use geocqr::test_support::InMemoryCollaborators;
use geocqr::{Geometry, ItemId};

fn point_item(support: &mut InMemoryCollaborators) -> ItemId {
    support.add_item(Geometry::Point(Point::new(0.0, 0.0)))
}

#[test]
fn three_disjoint_groups_all_surface_as_facet_parents() {
    let mut support = InMemoryCollaborators::empty();
    let mut items = Vec::new();
    for key in 1..=3u32 {
        for _ in 0..15 {
            let item = point_item(&mut support);
            support.tag_item(item, key, key * 100);
            items.push(item);
        }
    }

    let collaborators = support.collaborators();
    let config = EngineConfig::default();
    let index = ItemIndex::from_unsorted(items);
    let koma = KomaClustering::preprocess(&index, &collaborators, &config);

    let top = koma.top_key_values(3, &KeyExclusions::none(), &KeyValueExclusions::none(), config.koma_near_disjoint_denominator);
    let keys: std::collections::HashSet<u32> = top.iter().map(|kv| kv.key_id).collect();
    assert_eq!(keys, [1u32, 2, 3].into_iter().collect());
}

#[test]
fn a_value_shared_with_an_admitted_parent_is_skipped_but_later_candidates_survive() {
    let mut support = InMemoryCollaborators::empty();
    let mut items = Vec::new();
    // Group A: key=1/value=10, 20 items.
    for _ in 0..20 {
        let item = point_item(&mut support);
        support.tag_item(item, 1, 10);
        items.push(item);
    }
    // Group B overlaps heavily with group A (shares 18 of its 20 items) and
    // should be rejected once A is admitted as a parent.
    let shared: Vec<ItemId> = items[..18].to_vec();
    for &item in &shared {
        support.tag_item(item, 2, 20);
    }
    // Group C is fully disjoint from both and should still be admitted.
    for _ in 0..20 {
        let item = point_item(&mut support);
        support.tag_item(item, 3, 30);
        items.push(item);
    }

    let collaborators = support.collaborators();
    let config = EngineConfig::default();
    let index = ItemIndex::from_unsorted(items);
    let koma = KomaClustering::preprocess(&index, &collaborators, &config);

    let top = koma.top_key_values(3, &KeyExclusions::none(), &KeyValueExclusions::none(), config.koma_near_disjoint_denominator);
    let keys: Vec<u32> = top.iter().map(|kv| kv.key_id).collect();
    assert!(keys.contains(&1) || keys.contains(&2));
    assert!(keys.contains(&3));
    assert!(!(keys.contains(&1) && keys.contains(&2)));
}

#[test]
fn values_of_key_are_ordered_by_count_descending() {
    let mut support = InMemoryCollaborators::empty();
    let mut items = Vec::new();
    for _ in 0..10 {
        let item = point_item(&mut support);
        support.tag_item(item, 5, 1);
        items.push(item);
    }
    for _ in 0..3 {
        let item = point_item(&mut support);
        support.tag_item(item, 5, 2);
        items.push(item);
    }

    let collaborators = support.collaborators();
    let config = EngineConfig::default();
    let index = ItemIndex::from_unsorted(items);
    let koma = KomaClustering::preprocess(&index, &collaborators, &config);

    let values = koma.values_of_key(5, 10, &KeyValueExclusions::none());
    assert_eq!(values.len(), 2);
    assert_eq!(values[0], (1, 10));
    assert_eq!(values[1], (2, 3));
}

#[test]
fn facets_stop_when_no_admissible_candidate_remains() {
    let mut support = InMemoryCollaborators::empty();
    let mut items = Vec::new();
    for _ in 0..10 {
        let item = point_item(&mut support);
        support.tag_item(item, 1, 1);
        items.push(item);
    }
    for _ in 0..10 {
        let item = point_item(&mut support);
        support.tag_item(item, 2, 2);
        items.push(item);
    }

    let collaborators = support.collaborators();
    let config = EngineConfig::default();
    let index = ItemIndex::from_unsorted(items);
    let koma = KomaClustering::preprocess(&index, &collaborators, &config);

    let mut key_exclusions = KeyExclusions::none();
    key_exclusions.preprocess();
    let facets = koma.facets(5, 10, &rustc_hash::FxHashMap::default(), &mut key_exclusions, &KeyValueExclusions::none(), config.koma_near_disjoint_denominator);

    // The seed pair needs two near-disjoint candidates, so the first round
    // admits both keys as a pair and `facets` keeps only the first. The
    // second round is left with a single remaining key, which can never
    // form a seed pair on its own, so `top_key_values` comes back empty and
    // the loop stops well short of the requested five facets.
    assert_eq!(facets.len(), 1);
}
