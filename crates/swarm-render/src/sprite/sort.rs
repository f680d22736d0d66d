//! Bitonic sorting network over power-of-two padded distance keys.
//!
//! The network runs one dispatch per `(dim, block)` stage. [`bitonic_invocation`] is the
//! per-thread body of `bitonic_sort.wgsl`; the CPU sort path and the software backend
//! both run it, so every backend orders instances identically.

use super::kernel::{DispatchGrid, KernelParams};

/// Distance ordering of the sorted id buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortOrder {
    /// Farthest first, for alpha blending.
    #[default]
    BackToFront,
    /// Nearest first.
    FrontToBack,
}

impl SortOrder {
    pub fn is_descending(self) -> bool {
        matches!(self, SortOrder::BackToFront)
    }

    /// Key for padding slots so they always sort after every live instance.
    pub fn padding_key(self) -> f32 {
        match self {
            SortOrder::BackToFront => f32::NEG_INFINITY,
            SortOrder::FrontToBack => f32::INFINITY,
        }
    }

    /// Whether `a` may precede `b` in this order.
    pub fn in_order(self, a: f32, b: f32) -> bool {
        match self {
            SortOrder::BackToFront => a >= b,
            SortOrder::FrontToBack => a <= b,
        }
    }
}

/// Sort key for a live instance at `distance_squared` from the camera.
///
/// Non-finite distances clamp to `f32::MAX` so a live key never ties or loses to padding.
pub fn live_key(distance_squared: f32) -> f32 {
    if distance_squared.is_finite() {
        distance_squared
    } else {
        f32::MAX
    }
}

/// Element count of the sort buffers: the next power of two at or above `max(1, live)`.
pub fn sort_count(live: u32) -> u32 {
    live.max(1).next_power_of_two()
}

/// `(dim, block)` pairs of the network for `count` elements, in dispatch order.
#[derive(Debug, Clone)]
pub struct BitonicStages {
    count: u32,
    dim: u32,
    block: u32,
}

impl BitonicStages {
    pub fn new(count: u32) -> Self {
        Self {
            count,
            dim: 2,
            block: 1,
        }
    }

    /// Number of stages for a power-of-two `count` of `2^k` elements: `k(k+1)/2`.
    pub fn stage_count(count: u32) -> u32 {
        let k = count.max(1).trailing_zeros();
        k * (k + 1) / 2
    }
}

impl Iterator for BitonicStages {
    type Item = (u32, u32);

    fn next(&mut self) -> Option<Self::Item> {
        if self.dim > self.count || self.dim < 2 {
            return None;
        }
        let stage = (self.dim, self.block);
        if self.block > 1 {
            self.block /= 2;
        } else {
            self.dim = self.dim.saturating_mul(2);
            self.block = self.dim / 2;
        }
        Some(stage)
    }
}

/// Parameter block for the seed pass.
pub fn seed_params(count: u32) -> KernelParams {
    KernelParams {
        clear: 1,
        count,
        row_span: DispatchGrid::for_threads(count).row_span,
        ..Default::default()
    }
}

/// Parameter block for one network stage.
pub fn stage_params(count: u32, dim: u32, block: u32, order: SortOrder) -> KernelParams {
    KernelParams {
        clear: 0,
        count,
        dim,
        block,
        descending: order.is_descending() as u32,
        row_span: DispatchGrid::for_threads(count).row_span,
        ..Default::default()
    }
}

/// Body of one sort-kernel invocation at linear index `i`.
///
/// The seed pass writes the identity permutation. A stage pairs `i` with `i ^ block`; the
/// lower index of the pair swaps key and id together when the pair is out of order for
/// its half of the bitonic sequence.
pub fn bitonic_invocation(params: &KernelParams, i: u32, ids: &mut [u32], keys: &mut [f32]) {
    if i >= params.count {
        return;
    }
    if params.clear != 0 {
        ids[i as usize] = i;
        return;
    }
    let l = i ^ params.block;
    if l <= i || l >= params.count {
        return;
    }
    let (i, l) = (i as usize, l as usize);
    let ascending = ((i as u32 & params.dim) == 0) != (params.descending != 0);
    let swap = if ascending {
        keys[i] > keys[l]
    } else {
        keys[i] < keys[l]
    };
    if swap {
        keys.swap(i, l);
        ids.swap(i, l);
    }
}

/// Run the whole network on the CPU.
///
/// `keys` must already be padded to a power-of-two length; `ids` is overwritten with the
/// sorted permutation and `keys` ends up in sorted order.
pub fn sort_on_cpu(keys: &mut [f32], ids: &mut [u32], order: SortOrder) {
    let count = keys.len() as u32;
    debug_assert!(count.is_power_of_two());
    debug_assert_eq!(keys.len(), ids.len());

    let seed = seed_params(count);
    for i in 0..count {
        bitonic_invocation(&seed, i, ids, keys);
    }
    for (dim, block) in BitonicStages::new(count) {
        let params = stage_params(count, dim, block, order);
        for i in 0..count {
            bitonic_invocation(&params, i, ids, keys);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(keys: &[f32], order: SortOrder) -> Vec<f32> {
        let mut padded = keys.to_vec();
        padded.resize(sort_count(keys.len() as u32) as usize, order.padding_key());
        padded
    }

    #[test]
    fn test_sort_count() {
        assert_eq!(sort_count(0), 1);
        assert_eq!(sort_count(1), 1);
        assert_eq!(sort_count(2), 2);
        assert_eq!(sort_count(3), 4);
        assert_eq!(sort_count(1024), 1024);
        assert_eq!(sort_count(1025), 2048);
        for n in 0..=25_000u32 {
            let count = sort_count(n);
            assert!(count.is_power_of_two());
            assert!(count >= n);
            assert!(count / 2 < n.max(1));
        }
    }

    #[test]
    fn test_stage_schedule() {
        let stages: Vec<_> = BitonicStages::new(8).collect();
        assert_eq!(stages, vec![(2, 1), (4, 2), (4, 1), (8, 4), (8, 2), (8, 1)]);
        assert_eq!(BitonicStages::stage_count(8), 6);
        assert_eq!(BitonicStages::new(1).count(), 0);
        assert_eq!(BitonicStages::new(2).collect::<Vec<_>>(), vec![(2, 1)]);
        assert_eq!(
            BitonicStages::new(32_768).count() as u32,
            BitonicStages::stage_count(32_768)
        );
    }

    #[test]
    fn test_ascending_permutation() {
        let mut keys = padded(&[10.0, 1.0, 100.0, 5.0, 50.0], SortOrder::FrontToBack);
        let mut ids = vec![0; keys.len()];
        sort_on_cpu(&mut keys, &mut ids, SortOrder::FrontToBack);
        assert_eq!(&ids[..5], &[1, 3, 0, 4, 2]);
        assert!(ids[5..].iter().all(|&id| id >= 5));
    }

    #[test]
    fn test_descending_keys_monotonic() {
        let raw: Vec<f32> = (0..777u32).map(|i| ((i * 7919) % 1013) as f32).collect();
        let mut keys = padded(&raw, SortOrder::BackToFront);
        let mut ids = vec![0; keys.len()];
        sort_on_cpu(&mut keys, &mut ids, SortOrder::BackToFront);

        for window in ids[..raw.len()].windows(2) {
            assert!(raw[window[0] as usize] >= raw[window[1] as usize]);
        }
        let mut seen = ids.clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..keys.len() as u32).collect::<Vec<_>>());
    }

    #[test]
    fn test_padding_never_precedes_live() {
        for order in [SortOrder::BackToFront, SortOrder::FrontToBack] {
            let raw = [3.0, f32::MAX, 0.0];
            let mut keys = padded(&raw, order);
            let mut ids = vec![0; keys.len()];
            sort_on_cpu(&mut keys, &mut ids, order);
            assert!(ids[..3].iter().all(|&id| id < 3), "{order:?}: {ids:?}");
            assert_eq!(ids[3], 3);
        }
    }

    #[test]
    fn test_non_finite_keys_stay_ahead_of_padding() {
        for order in [SortOrder::BackToFront, SortOrder::FrontToBack] {
            for live in 2..=8u32 {
                for bad in [f32::NAN, f32::INFINITY] {
                    for at in 0..live {
                        let raw: Vec<f32> = (0..live)
                            .map(|i| if i == at { bad } else { (i + 1) as f32 * 3.0 })
                            .map(live_key)
                            .collect();
                        let mut keys = padded(&raw, order);
                        let mut ids = vec![0; keys.len()];
                        sort_on_cpu(&mut keys, &mut ids, order);

                        let mut front = ids[..live as usize].to_vec();
                        front.sort_unstable();
                        assert_eq!(
                            front,
                            (0..live).collect::<Vec<_>>(),
                            "{order:?} live={live} bad={bad} at={at}: {ids:?}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_live_key_clamps_non_finite() {
        assert_eq!(live_key(4.0), 4.0);
        assert_eq!(live_key(f32::NAN), f32::MAX);
        assert_eq!(live_key(f32::INFINITY), f32::MAX);
        assert_eq!(live_key(f32::NEG_INFINITY), f32::MAX);
    }

    #[test]
    fn test_stage_ignores_out_of_range_partner() {
        let params = stage_params(2, 2, 1, SortOrder::FrontToBack);
        let mut keys = vec![2.0, 1.0];
        let mut ids = vec![0, 1];
        bitonic_invocation(&params, 1, &mut ids, &mut keys);
        assert_eq!(ids, vec![0, 1]);
        bitonic_invocation(&params, 0, &mut ids, &mut keys);
        assert_eq!(ids, vec![1, 0]);
        bitonic_invocation(&params, 7, &mut ids, &mut keys);
    }
}
