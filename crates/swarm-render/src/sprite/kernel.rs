//! Compute kernel identifiers, their parameter block and dispatch geometry.

use bytemuck::{Pod, Zeroable};

/// Threads per workgroup in every sprite kernel (`@workgroup_size(256)`).
pub const WORKGROUP_SIZE: u32 = 256;

/// Maximum threads along X in one dispatch row. Larger grids spill into Y.
pub const MAX_DISPATCH_SPAN: u32 = 262_144;

/// Byte stride between parameter slots. Dynamic uniform offsets must be 256-aligned.
pub const PARAMS_STRIDE: u64 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// Seed pass or one compare-and-swap stage of the sorting network.
    BitonicSort,
    /// Sphere-vs-frustum test with atomic compaction.
    SphereCull,
    /// Survivor count to indirect draw arguments.
    DrawArgs,
}

impl Kernel {
    pub const ALL: [Kernel; 3] = [Kernel::BitonicSort, Kernel::SphereCull, Kernel::DrawArgs];

    pub fn label(self) -> &'static str {
        match self {
            Kernel::BitonicSort => "sprite_bitonic_sort",
            Kernel::SphereCull => "sprite_sphere_cull",
            Kernel::DrawArgs => "sprite_draw_args",
        }
    }
}

/// Uniform block shared by all three kernels. Each dispatch reads its own slot.
///
/// ```wgsl
/// struct Params {
///     clear: u32,
///     count: u32,
///     dim: u32,
///     block: u32,
///     descending: u32,
///     row_span: u32,
///     radius: f32,
///     index_count: u32,
/// }
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct KernelParams {
    /// Non-zero selects the seed pass of the sort kernel.
    pub clear: u32,
    /// Invocations with a linear index at or past this do nothing.
    pub count: u32,
    pub dim: u32,
    pub block: u32,
    pub descending: u32,
    /// Threads per dispatch row, for linearising `global_invocation_id`.
    pub row_span: u32,
    pub radius: f32,
    pub index_count: u32,
}

static_assertions::assert_eq_size!(KernelParams, [u32; 8]);

impl KernelParams {
    /// Linear invocation index for a grid position.
    #[inline]
    pub fn invocation(&self, x: u32, y: u32) -> u32 {
        y * self.row_span + x
    }
}

/// Workgroup counts for covering `threads` invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchGrid {
    pub workgroups: [u32; 3],
    pub row_span: u32,
}

impl DispatchGrid {
    pub fn for_threads(threads: u32) -> Self {
        if threads == 0 {
            return Self {
                workgroups: [0, 1, 1],
                row_span: 0,
            };
        }
        let row_threads = threads.min(MAX_DISPATCH_SPAN);
        let groups_x = row_threads.div_ceil(WORKGROUP_SIZE);
        let rows = threads.div_ceil(MAX_DISPATCH_SPAN);
        Self {
            workgroups: [groups_x, rows, 1],
            row_span: groups_x * WORKGROUP_SIZE,
        }
    }

    /// Single invocation.
    pub fn single() -> Self {
        Self {
            workgroups: [1, 1, 1],
            row_span: WORKGROUP_SIZE,
        }
    }

    pub fn thread_capacity(&self) -> u64 {
        self.workgroups.iter().map(|&n| n as u64).product::<u64>() * WORKGROUP_SIZE as u64
    }
}

/// One recorded compute dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dispatch {
    pub kernel: Kernel,
    /// Byte offset of this dispatch's [`KernelParams`] slot.
    pub params_offset: u32,
    pub workgroups: [u32; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_small() {
        let grid = DispatchGrid::for_threads(5);
        assert_eq!(grid.workgroups, [1, 1, 1]);
        assert_eq!(grid.row_span, 256);
    }

    #[test]
    fn test_grid_spills_into_y() {
        let grid = DispatchGrid::for_threads(MAX_DISPATCH_SPAN * 2);
        assert_eq!(grid.workgroups, [1024, 2, 1]);
        assert_eq!(grid.row_span, MAX_DISPATCH_SPAN);
        assert!(grid.thread_capacity() >= (MAX_DISPATCH_SPAN * 2) as u64);
    }

    #[test]
    fn test_grid_empty() {
        let grid = DispatchGrid::for_threads(0);
        assert_eq!(grid.workgroups[0], 0);
        assert_eq!(grid.thread_capacity(), 0);
    }

    #[test]
    fn test_invocation_index_unique_across_rows() {
        let grid = DispatchGrid::for_threads(MAX_DISPATCH_SPAN + 10);
        let params = KernelParams {
            row_span: grid.row_span,
            ..Default::default()
        };
        assert_eq!(params.invocation(0, 1), MAX_DISPATCH_SPAN);
        assert_eq!(params.invocation(MAX_DISPATCH_SPAN - 1, 0), MAX_DISPATCH_SPAN - 1);
    }
}
