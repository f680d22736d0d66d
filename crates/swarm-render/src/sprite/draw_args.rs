//! Survivor count to indirect draw arguments, without a CPU round trip.

use super::kernel::{DispatchGrid, KernelParams};
use crate::indirect::DrawIndexedIndirect;

/// Indices in the sprite quad (two triangles).
pub const QUAD_INDEX_COUNT: u32 = 6;

/// Index buffer for the quad. Corners are generated from `vertex_index` in the shader.
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

pub fn args_params(index_count: u32) -> KernelParams {
    KernelParams {
        count: 1,
        index_count,
        row_span: DispatchGrid::single().row_span,
        ..Default::default()
    }
}

/// Body of the single `draw_args.wgsl` invocation.
pub fn args_invocation(params: &KernelParams, i: u32, survivors: u32) -> Option<DrawIndexedIndirect> {
    (i == 0).then(|| DrawIndexedIndirect::instanced(params.index_count, survivors))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_mirror_counter() {
        let params = args_params(QUAD_INDEX_COUNT);
        let args = args_invocation(&params, 0, 17);
        assert_eq!(args, Some(DrawIndexedIndirect::new(6, 17, 0, 0, 0)));
        assert_eq!(args_invocation(&params, 1, 17), None);
    }
}
