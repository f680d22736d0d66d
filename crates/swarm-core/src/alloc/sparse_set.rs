use crate::profiling::profile_function;
use std::num::NonZeroU64;

/// Generational index into a [`SparseSet`].
///
/// The upper 32 bits hold the generation, the lower 32 bits the slot index plus one so the
/// value is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexSlot(NonZeroU64);

impl IndexSlot {
    pub fn new(generation: u32, idx: u32) -> Self {
        let raw = ((generation as u64) << 32) | (idx as u64 + 1);
        // idx + 1 never wraps to zero inside a u64.
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    pub fn generation(&self) -> u32 {
        (self.0.get() >> 32) as u32
    }

    pub fn index(&self) -> u32 {
        (self.0.get() & u32::MAX as u64) as u32 - 1
    }
}

struct Entry<T> {
    generation: u32,
    data: Option<T>,
}

/// Arena with stable, generation-checked handles and slot reuse.
///
/// Lookups through a stale handle return `None` instead of aliasing the value that now
/// lives in the recycled slot.
pub struct SparseSet<T> {
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> SparseSet<T> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn push(&mut self, data: T) -> IndexSlot {
        profile_function!();
        self.len += 1;
        if let Some(idx) = self.free.pop() {
            let entry = &mut self.entries[idx as usize];
            entry.data = Some(data);
            IndexSlot::new(entry.generation, idx)
        } else {
            let idx = self.entries.len() as u32;
            self.entries.push(Entry {
                generation: 0,
                data: Some(data),
            });
            IndexSlot::new(0, idx)
        }
    }

    fn entry(&self, slot: IndexSlot) -> Option<&Entry<T>> {
        self.entries
            .get(slot.index() as usize)
            .filter(|entry| entry.generation == slot.generation())
    }

    pub fn get(&self, slot: IndexSlot) -> Option<&T> {
        self.entry(slot).and_then(|entry| entry.data.as_ref())
    }

    pub fn get_mut(&mut self, slot: IndexSlot) -> Option<&mut T> {
        self.entries
            .get_mut(slot.index() as usize)
            .filter(|entry| entry.generation == slot.generation())
            .and_then(|entry| entry.data.as_mut())
    }

    pub fn contains(&self, slot: IndexSlot) -> bool {
        self.get(slot).is_some()
    }

    /// Removes the value and retires the handle. Returns `None` for stale handles.
    pub fn remove(&mut self, slot: IndexSlot) -> Option<T> {
        profile_function!();
        let index = slot.index();
        let entry = self
            .entries
            .get_mut(index as usize)
            .filter(|entry| entry.generation == slot.generation())?;
        let data = entry.data.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(index);
        self.len -= 1;
        Some(data)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live values with their handles, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (IndexSlot, &T)> + '_ {
        self.entries.iter().enumerate().filter_map(|(idx, entry)| {
            entry
                .data
                .as_ref()
                .map(|data| (IndexSlot::new(entry.generation, idx as u32), data))
        })
    }
}

impl<T> Default for SparseSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_eq_size!(IndexSlot, Option<IndexSlot>);
