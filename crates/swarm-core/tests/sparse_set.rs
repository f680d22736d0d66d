//! Generational handle behaviour of `SparseSet`.

use swarm_core::alloc::sparse_set::{IndexSlot, SparseSet};

#[test]
fn test_push_and_get() {
    let mut set = SparseSet::new();

    let a = set.push(42);
    let b = set.push(100);
    assert_eq!(set.get(a), Some(&42));
    assert_eq!(set.get(b), Some(&100));
    assert_eq!(set.len(), 2);
}

#[test]
fn test_get_mut() {
    let mut set = SparseSet::new();

    let slot = set.push(42);
    if let Some(value) = set.get_mut(slot) {
        *value = 100;
    }
    assert_eq!(set.get(slot), Some(&100));
}

#[test]
fn test_unknown_index_misses() {
    let set = SparseSet::<i32>::new();
    assert_eq!(set.get(IndexSlot::new(0, 999)), None);
}

#[test]
fn test_generation_advances_on_reuse() {
    let mut set = SparseSet::new();

    let first = set.push("a");
    set.remove(first);
    let second = set.push("b");

    assert_eq!(second.index(), first.index());
    assert_eq!(second.generation(), first.generation() + 1);
    assert!(!set.contains(first));
    assert!(set.contains(second));
}

#[test]
fn test_iter_skips_removed() {
    let mut set = SparseSet::new();
    let slots: Vec<_> = (0..100u32).map(|i| set.push(i)).collect();

    set.remove(slots[0]);
    set.remove(slots[1]);

    let values: Vec<u32> = set.iter().map(|(_, v)| *v).collect();
    assert_eq!(values, (2..100).collect::<Vec<_>>());
    assert!(set.iter().all(|(slot, v)| set.get(slot) == Some(v)));
}
