//! Assertions over pipeline outputs.

use std::collections::HashSet;

use swarm_render::SortOrder;
use swarm_render::sprite::{Hazard, SoftwareBackend};

/// Every adjacent pair of `ids[..live]` is ordered by `keys` under `order`.
#[track_caller]
pub fn assert_sorted_by_key(ids: &[u32], keys: &[f32], order: SortOrder) {
    for pair in ids.windows(2) {
        let (a, b) = (keys[pair[0] as usize], keys[pair[1] as usize]);
        assert!(
            order.in_order(a, b),
            "ids {} ({a}) and {} ({b}) out of {order:?} order",
            pair[0],
            pair[1]
        );
    }
}

#[track_caller]
pub fn assert_unique_ids(ids: &[u32]) {
    let mut seen = HashSet::with_capacity(ids.len());
    for &id in ids {
        assert!(seen.insert(id), "id {id} appears more than once in {ids:?}");
    }
}

/// `ids` is a permutation of `0..ids.len()`.
#[track_caller]
pub fn assert_permutation(ids: &[u32]) {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    let expected: Vec<u32> = (0..ids.len() as u32).collect();
    assert_eq!(sorted, expected, "not a permutation: {ids:?}");
}

#[track_caller]
pub fn assert_no_hazards(backend: &SoftwareBackend) {
    let hazards: &[Hazard] = backend.hazards();
    assert!(hazards.is_empty(), "pipeline hazards: {hazards:#?}");
}
