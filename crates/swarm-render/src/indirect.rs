//! Indirect draw argument records.
//!
//! The sprite pipeline never reads the survivor count back to the CPU. A compute kernel
//! writes a [`DrawIndexedIndirect`] block that the render pass consumes directly.

use bytemuck::{Pod, Zeroable};

/// Indirect draw command for indexed geometry.
///
/// Matches the layout `wgpu::RenderPass::draw_indexed_indirect` reads. A non-zero
/// `first_instance` needs `INDIRECT_FIRST_INSTANCE`; the sprite pipeline always writes 0.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DrawIndexedIndirect {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

// SAFETY: DrawIndexedIndirect is a repr(C) struct of 4-byte fields with no padding
unsafe impl Pod for DrawIndexedIndirect {}
unsafe impl Zeroable for DrawIndexedIndirect {}

impl DrawIndexedIndirect {
    pub const fn new(
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> Self {
        Self {
            index_count,
            instance_count,
            first_index,
            base_vertex,
            first_instance,
        }
    }

    /// `instance_count` copies of the whole index range.
    pub const fn instanced(index_count: u32, instance_count: u32) -> Self {
        Self::new(index_count, instance_count, 0, 0, 0)
    }

    /// Decode the first record of a raw argument buffer.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bytes
            .get(..Self::SIZE as usize)
            .map(bytemuck::pod_read_unaligned)
    }
}

/// Marker trait for indirect command records.
pub trait IndirectCommand: Pod + Zeroable + Default {
    /// Size of a single command in bytes.
    const SIZE: u64;
}

impl IndirectCommand for DrawIndexedIndirect {
    const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}

static_assertions::assert_eq_size!(DrawIndexedIndirect, [u32; 5]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_indexed_indirect_size() {
        assert_eq!(DrawIndexedIndirect::SIZE, 20);
    }

    #[test]
    fn test_from_bytes() {
        let cmd = DrawIndexedIndirect::instanced(6, 42);
        let mut bytes = bytemuck::bytes_of(&cmd).to_vec();
        bytes.extend_from_slice(&[0xff; 12]);
        assert_eq!(DrawIndexedIndirect::from_bytes(&bytes), Some(cmd));
        assert_eq!(DrawIndexedIndirect::from_bytes(&bytes[..19]), None);
    }
}
