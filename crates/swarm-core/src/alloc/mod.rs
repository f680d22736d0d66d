//! Allocation helpers.
//!
//! - [`sparse_set::SparseSet`], a generational arena addressed by [`sparse_set::IndexSlot`]
//! - AHash-backed map and set aliases

pub mod sparse_set;

pub use ahash::{AHashMap as HashMap, AHashSet as HashSet, RandomState};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashmap_ahash() {
        let mut map = HashMap::new();
        map.insert("sprites", 3u32);
        assert_eq!(map.get("sprites"), Some(&3));
    }

    #[test]
    fn test_hashset_ahash() {
        let mut set = HashSet::new();
        assert!(set.insert(7u32));
        assert!(!set.insert(7u32));
    }
}
