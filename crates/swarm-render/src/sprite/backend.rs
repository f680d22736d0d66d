//! The seam between the batch renderer and whatever executes its commands.
//!
//! The renderer owns [`BufferHandle`]s and drives a [`GpuBackend`] through buffer
//! creation, uploads, explicit state transitions, kernel dispatches and the final
//! indirect draw. [`WgpuSpriteBackend`](super::WgpuSpriteBackend) records real GPU
//! commands; [`SoftwareBackend`](super::SoftwareBackend) executes the same contract on the
//! CPU and checks every transition.

use bitflags::bitflags;
use swarm_core::alloc::sparse_set::IndexSlot;

use super::kernel::Dispatch;
use crate::readback::ReadbackError;

/// Stable handle to a backend buffer. Survives [`GpuBackend::resize_buffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub IndexSlot);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsages: u32 {
        const STORAGE = 1 << 0;
        const UNIFORM = 1 << 1;
        const INDIRECT = 1 << 2;
        const COPY_DST = 1 << 3;
        const COPY_SRC = 1 << 4;
        const INDEX = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: &'static str,
    /// Bytes, a multiple of 4.
    pub size: u64,
    pub usage: BufferUsages,
}

/// Access state of a buffer on the GPU timeline.
///
/// Newly created and resized buffers start in [`ResourceState::CopyDst`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Target of uploads and clears.
    CopyDst,
    /// Read-write storage in compute.
    UnorderedAccess,
    /// Read-only in compute or shading.
    ShaderRead,
    /// Source of indirect draw arguments.
    IndirectArgument,
}

impl ResourceState {
    pub fn readable_in_shader(self) -> bool {
        matches!(self, ResourceState::ShaderRead | ResourceState::UnorderedAccess)
    }
}

/// Every buffer the pipeline binds. Kernels pick the ones they use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpriteBindings {
    pub sprites: BufferHandle,
    pub keys: BufferHandle,
    pub sorted_ids: BufferHandle,
    pub planes: BufferHandle,
    pub counter: BufferHandle,
    pub compacted: BufferHandle,
    pub args: BufferHandle,
    pub params: BufferHandle,
    pub camera: BufferHandle,
}

impl SpriteBindings {
    pub fn all(&self) -> [BufferHandle; 9] {
        [
            self.sprites,
            self.keys,
            self.sorted_ids,
            self.planes,
            self.counter,
            self.compacted,
            self.args,
            self.params,
            self.camera,
        ]
    }
}

/// Command sink for the sprite pipeline. Commands execute in call order.
pub trait GpuBackend {
    fn create_buffer(&mut self, desc: &BufferDesc) -> BufferHandle;

    /// Replace the storage behind `handle` with `size` bytes. Contents are discarded and
    /// the state resets to [`ResourceState::CopyDst`].
    fn resize_buffer(&mut self, handle: BufferHandle, size: u64);

    fn destroy_buffer(&mut self, handle: BufferHandle);

    fn buffer_size(&self, handle: BufferHandle) -> u64;

    /// Upload `data` at `offset`. The buffer must be in [`ResourceState::CopyDst`].
    fn write_buffer(&mut self, handle: BufferHandle, offset: u64, data: &[u8]);

    /// Zero the whole buffer. The buffer must be in [`ResourceState::CopyDst`].
    fn clear_buffer(&mut self, handle: BufferHandle);

    /// Barrier. `from == to == UnorderedAccess` orders two compute writers.
    fn transition(&mut self, handle: BufferHandle, from: ResourceState, to: ResourceState);

    fn dispatch(&mut self, bindings: &SpriteBindings, dispatch: Dispatch);

    /// One instanced draw of the sprite quad with arguments read from `bindings.args`.
    fn draw_indexed_indirect(&mut self, bindings: &SpriteBindings);

    /// Hand recorded work to the device so later uploads cannot overtake it.
    fn flush(&mut self) {}
}

/// Backends that can copy buffer contents back to the CPU.
pub trait BufferReadback {
    fn read_buffer(&mut self, handle: BufferHandle) -> Result<Vec<u8>, ReadbackError>;
}
