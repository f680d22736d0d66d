//! Live sprite set and the per-frame snapshot taken from it.

use std::sync::Arc;

use glam::Vec3;
use swarm_core::profiling::profile_function;

use super::error::SpriteError;
use super::instance::{GpuSprite, SpriteSource};
use super::sort::{SortOrder, live_key, sort_count};

pub type SpriteRef = Arc<dyn SpriteSource>;

/// Insertion-ordered list of sprite references.
///
/// The same sprite may be added more than once; removal drops every reference to it.
/// Mutate only between frames.
pub struct SpriteRegistry {
    sprites: Vec<SpriteRef>,
    max_instances: u32,
    rejected: u64,
}

impl SpriteRegistry {
    pub fn new(max_instances: u32) -> Self {
        Self {
            sprites: Vec::new(),
            max_instances,
            rejected: 0,
        }
    }

    /// Append a reference. Fails without inserting once `max_instances` is reached.
    pub fn add(&mut self, sprite: SpriteRef) -> Result<(), SpriteError> {
        if self.sprites.len() >= self.max_instances as usize {
            self.rejected += 1;
            tracing::warn!(
                max = self.max_instances,
                "sprite registration rejected, capacity reached"
            );
            return Err(SpriteError::CapacityExceeded {
                max: self.max_instances,
            });
        }
        self.sprites.push(sprite);
        Ok(())
    }

    /// Remove every reference to `sprite` (pointer identity). Returns how many were removed.
    pub fn remove(&mut self, sprite: &SpriteRef) -> usize {
        let before = self.sprites.len();
        self.sprites
            .retain(|existing| !std::ptr::addr_eq(Arc::as_ptr(existing), Arc::as_ptr(sprite)));
        before - self.sprites.len()
    }

    pub fn contains(&self, sprite: &SpriteRef) -> bool {
        self.sprites
            .iter()
            .any(|existing| std::ptr::addr_eq(Arc::as_ptr(existing), Arc::as_ptr(sprite)))
    }

    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }

    pub fn max_instances(&self) -> u32 {
        self.max_instances
    }

    /// Registrations refused since creation.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn clear(&mut self) {
        self.sprites.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpriteRef> + '_ {
        self.sprites.iter()
    }

    /// Pack every live sprite into `snapshot`, reusing its allocations.
    pub fn snapshot_into(&self, camera: Vec3, order: SortOrder, snapshot: &mut FrameSnapshot) {
        profile_function!();
        snapshot.sprites.clear();
        snapshot.keys.clear();
        for sprite in &self.sprites {
            let packed = sprite.desc().pack();
            snapshot.keys.push(live_key(camera.distance_squared(packed.position())));
            snapshot.sprites.push(packed);
        }
        let padded = sort_count(snapshot.len()) as usize;
        snapshot.keys.resize(padded, order.padding_key());
    }
}

/// Frame-local copy of the registry: packed records plus squared camera distances.
///
/// `keys` is padded to the sort count with the order's padding key.
#[derive(Debug, Default, Clone)]
pub struct FrameSnapshot {
    pub sprites: Vec<GpuSprite>,
    pub keys: Vec<f32>,
}

impl FrameSnapshot {
    pub fn len(&self) -> u32 {
        self.sprites.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }

    pub fn sort_count(&self) -> u32 {
        sort_count(self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sprite::instance::{Sprite, SpriteDesc};

    fn sprite_at(x: f32) -> SpriteRef {
        Sprite::new(SpriteDesc::at(Vec3::new(x, 0.0, 0.0)))
    }

    #[test]
    fn test_add_remove_roundtrip_keeps_count() {
        let mut registry = SpriteRegistry::new(8);
        registry.add(sprite_at(0.0)).unwrap();
        let before = registry.len();

        let sprite = sprite_at(1.0);
        registry.add(sprite.clone()).unwrap();
        registry.remove(&sprite);
        assert_eq!(registry.len(), before);
    }

    #[test]
    fn test_remove_drops_duplicates_and_is_idempotent() {
        let mut registry = SpriteRegistry::new(8);
        let sprite = sprite_at(1.0);
        registry.add(sprite.clone()).unwrap();
        registry.add(sprite_at(2.0)).unwrap();
        registry.add(sprite.clone()).unwrap();

        assert_eq!(registry.remove(&sprite), 2);
        assert_eq!(registry.remove(&sprite), 0);
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains(&sprite));
    }

    #[test]
    fn test_capacity_rejects_without_inserting() {
        let mut registry = SpriteRegistry::new(2);
        registry.add(sprite_at(0.0)).unwrap();
        registry.add(sprite_at(1.0)).unwrap();
        let err = registry.add(sprite_at(2.0)).unwrap_err();
        assert!(matches!(err, SpriteError::CapacityExceeded { max: 2 }));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.rejected(), 1);
    }

    #[test]
    fn test_snapshot_keys_are_padded_squared_distances() {
        let mut registry = SpriteRegistry::new(8);
        for x in [1.0, 2.0, 3.0] {
            registry.add(sprite_at(x)).unwrap();
        }
        let mut snapshot = FrameSnapshot::default();
        registry.snapshot_into(Vec3::ZERO, SortOrder::FrontToBack, &mut snapshot);
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.keys, vec![1.0, 4.0, 9.0, f32::INFINITY]);

        registry.clear();
        registry.snapshot_into(Vec3::ZERO, SortOrder::BackToFront, &mut snapshot);
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.keys, vec![f32::NEG_INFINITY]);
    }

    #[test]
    fn test_snapshot_clamps_non_finite_distances() {
        let mut registry = SpriteRegistry::new(8);
        registry.add(sprite_at(1.0)).unwrap();
        registry.add(sprite_at(f32::NAN)).unwrap();
        registry.add(sprite_at(f32::MAX)).unwrap();
        let mut snapshot = FrameSnapshot::default();
        registry.snapshot_into(Vec3::ZERO, SortOrder::FrontToBack, &mut snapshot);
        assert_eq!(snapshot.keys, vec![1.0, f32::MAX, f32::MAX, f32::INFINITY]);
    }
}
