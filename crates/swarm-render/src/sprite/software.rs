//! CPU execution of the sprite pipeline.
//!
//! [`SoftwareBackend`] runs every dispatch invocation by invocation through the same kernel
//! bodies the CPU sort and cull modes use, and validates the resource-state protocol along
//! the way: uploads need `CopyDst`, compute writes need `UnorderedAccess`, reads need a
//! readable state, and a buffer written by one dispatch must see a barrier before anything
//! touches it again. Violations are recorded as [`Hazard`]s instead of panicking so tests
//! can assert on them.

use std::sync::atomic::AtomicU32;

use swarm_core::alloc::sparse_set::SparseSet;
use swarm_core::profiling::profile_function;

use super::backend::{
    BufferDesc, BufferHandle, BufferReadback, GpuBackend, ResourceState, SpriteBindings,
};
use super::cull::cull_invocation;
use super::draw_args::args_invocation;
use super::instance::GpuSprite;
use super::kernel::{Dispatch, Kernel, KernelParams, WORKGROUP_SIZE};
use super::sort::bitonic_invocation;
use crate::indirect::DrawIndexedIndirect;
use crate::readback::ReadbackError;

/// One call made against the backend, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CreateBuffer {
        label: &'static str,
        size: u64,
    },
    ResizeBuffer {
        label: &'static str,
        size: u64,
    },
    DestroyBuffer {
        label: &'static str,
    },
    WriteBuffer {
        label: &'static str,
        offset: u64,
        len: usize,
    },
    ClearBuffer {
        label: &'static str,
    },
    Transition {
        label: &'static str,
        from: ResourceState,
        to: ResourceState,
    },
    Dispatch {
        kernel: Kernel,
        workgroups: [u32; 3],
        params: KernelParams,
    },
    DrawIndexedIndirect {
        args: DrawIndexedIndirect,
    },
}

/// A protocol violation observed while executing commands.
#[derive(Debug, Clone, PartialEq)]
pub enum Hazard {
    UnknownBuffer {
        op: &'static str,
    },
    /// A transition whose `from` does not match the tracked state.
    StateMismatch {
        label: &'static str,
        expected: ResourceState,
        actual: ResourceState,
    },
    /// An access the buffer's current state does not allow.
    InvalidAccess {
        label: &'static str,
        op: &'static str,
        state: ResourceState,
    },
    /// Accessed after a compute write without an intervening barrier.
    MissingBarrier {
        label: &'static str,
        op: &'static str,
    },
    OutOfBounds {
        label: &'static str,
        op: &'static str,
    },
}

/// What a draw would have rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub args: DrawIndexedIndirect,
    /// Instance ids fetched by the vertex stage, `compacted[..instance_count]`.
    pub instances: Vec<u32>,
}

struct SoftBuffer {
    desc: BufferDesc,
    words: Vec<u32>,
    state: ResourceState,
    /// Written by a dispatch since the last barrier.
    unsynced: bool,
}

#[derive(Clone, Copy)]
enum Access {
    Read,
    Write,
    Indirect,
}

#[derive(Default)]
pub struct SoftwareBackend {
    buffers: SparseSet<SoftBuffer>,
    calls: Vec<BackendCall>,
    hazards: Vec<Hazard>,
    draws: Vec<RecordedDraw>,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    pub fn hazards(&self) -> &[Hazard] {
        &self.hazards
    }

    pub fn draws(&self) -> &[RecordedDraw] {
        &self.draws
    }

    pub fn last_draw(&self) -> Option<&RecordedDraw> {
        self.draws.last()
    }

    pub fn dispatches(&self) -> impl Iterator<Item = (Kernel, &KernelParams)> + '_ {
        self.calls.iter().filter_map(|call| match call {
            BackendCall::Dispatch { kernel, params, .. } => Some((*kernel, params)),
            _ => None,
        })
    }

    pub fn count_dispatches(&self, kernel: Kernel) -> usize {
        self.dispatches().filter(|(k, _)| *k == kernel).count()
    }

    pub fn count_resizes(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, BackendCall::ResizeBuffer { .. }))
            .count()
    }

    /// Forget recorded calls, draws and hazards. Buffers are kept.
    pub fn clear_log(&mut self) {
        self.calls.clear();
        self.hazards.clear();
        self.draws.clear();
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn state_of(&self, handle: BufferHandle) -> Option<ResourceState> {
        self.buffers.get(handle.0).map(|buffer| buffer.state)
    }

    pub fn words(&self, handle: BufferHandle) -> Option<&[u32]> {
        self.buffers.get(handle.0).map(|buffer| buffer.words.as_slice())
    }

    fn label(&self, handle: BufferHandle) -> &'static str {
        self.buffers
            .get(handle.0)
            .map(|buffer| buffer.desc.label)
            .unwrap_or("<unknown>")
    }

    /// Validate an access and report whether the command may proceed.
    fn check(&mut self, handle: BufferHandle, access: Access, op: &'static str) -> bool {
        let Some(buffer) = self.buffers.get(handle.0) else {
            self.hazards.push(Hazard::UnknownBuffer { op });
            return false;
        };
        let label = buffer.desc.label;
        let state = buffer.state;
        if buffer.unsynced {
            self.hazards.push(Hazard::MissingBarrier { label, op });
        }
        let allowed = match access {
            Access::Read => state.readable_in_shader(),
            Access::Write => state == ResourceState::UnorderedAccess,
            Access::Indirect => state == ResourceState::IndirectArgument,
        };
        if !allowed {
            self.hazards
                .push(Hazard::InvalidAccess { label, op, state });
        }
        true
    }

    fn check_transfer(&mut self, handle: BufferHandle, op: &'static str) -> bool {
        let Some(buffer) = self.buffers.get(handle.0) else {
            self.hazards.push(Hazard::UnknownBuffer { op });
            return false;
        };
        if buffer.state != ResourceState::CopyDst {
            self.hazards.push(Hazard::InvalidAccess {
                label: buffer.desc.label,
                op,
                state: buffer.state,
            });
        }
        true
    }

    fn params(&self, bindings: &SpriteBindings, offset: u32) -> Option<KernelParams> {
        let words = self.words(bindings.params)?;
        let start = offset as usize / 4;
        let slot = words.get(start..start + 8)?;
        Some(bytemuck::pod_read_unaligned(bytemuck::cast_slice(slot)))
    }

    fn take_words(&mut self, handle: BufferHandle) -> Vec<u32> {
        self.buffers
            .get_mut(handle.0)
            .map(|buffer| std::mem::take(&mut buffer.words))
            .unwrap_or_default()
    }

    fn restore_words(&mut self, handle: BufferHandle, words: Vec<u32>) {
        if let Some(buffer) = self.buffers.get_mut(handle.0) {
            buffer.words = words;
            buffer.unsynced = true;
        }
    }

    /// Linear invocation indices covered by a grid.
    fn invocations(params: &KernelParams, workgroups: [u32; 3]) -> impl Iterator<Item = u32> {
        let row_threads = workgroups[0] * WORKGROUP_SIZE;
        let row_span = params.row_span;
        (0..workgroups[1]).flat_map(move |y| (0..row_threads).map(move |x| y * row_span + x))
    }

    fn run_bitonic(&mut self, b: &SpriteBindings, params: &KernelParams, workgroups: [u32; 3]) {
        let op = "bitonic_sort";
        let ok = [
            self.check(b.params, Access::Read, op),
            self.check(b.sorted_ids, Access::Write, op),
            self.check(b.keys, Access::Write, op),
        ];
        if ok.contains(&false) {
            return;
        }
        let mut ids = self.take_words(b.sorted_ids);
        let mut key_words = self.take_words(b.keys);
        let count = params.count as usize;
        if ids.len() < count || key_words.len() < count {
            self.hazards.push(Hazard::OutOfBounds {
                label: self.label(b.sorted_ids),
                op,
            });
        } else {
            let keys: &mut [f32] = bytemuck::cast_slice_mut(&mut key_words);
            for i in Self::invocations(params, workgroups) {
                bitonic_invocation(params, i, &mut ids, keys);
            }
        }
        self.restore_words(b.sorted_ids, ids);
        self.restore_words(b.keys, key_words);
    }

    fn run_cull(&mut self, b: &SpriteBindings, params: &KernelParams, workgroups: [u32; 3]) {
        let op = "sphere_cull";
        let ok = [
            self.check(b.params, Access::Read, op),
            self.check(b.sprites, Access::Read, op),
            self.check(b.planes, Access::Read, op),
            self.check(b.sorted_ids, Access::Read, op),
            self.check(b.counter, Access::Write, op),
            self.check(b.compacted, Access::Write, op),
        ];
        if ok.contains(&false) {
            return;
        }
        let counter_words = self.take_words(b.counter);
        let mut compacted = self.take_words(b.compacted);
        let counter = AtomicU32::new(counter_words.first().copied().unwrap_or(0));
        {
            let sprite_words = self.words(b.sprites).unwrap_or_default();
            let sprites: &[GpuSprite] = bytemuck::cast_slice(
                &sprite_words[..sprite_words.len() - sprite_words.len() % 24],
            );
            let plane_words = self.words(b.planes).unwrap_or_default();
            let planes: &[[f32; 4]] =
                bytemuck::cast_slice(&plane_words[..plane_words.len() - plane_words.len() % 4]);
            let sorted_ids = self.words(b.sorted_ids).unwrap_or_default();
            for i in Self::invocations(params, workgroups) {
                cull_invocation(params, i, sprites, planes, sorted_ids, &counter, &mut compacted);
            }
        }
        let mut counter_words = counter_words;
        if let Some(first) = counter_words.first_mut() {
            *first = counter.into_inner();
        }
        self.restore_words(b.counter, counter_words);
        self.restore_words(b.compacted, compacted);
    }

    fn run_args(&mut self, b: &SpriteBindings, params: &KernelParams, workgroups: [u32; 3]) {
        let op = "draw_args";
        let ok = [
            self.check(b.params, Access::Read, op),
            self.check(b.counter, Access::Read, op),
            self.check(b.args, Access::Write, op),
        ];
        if ok.contains(&false) {
            return;
        }
        let survivors = self
            .words(b.counter)
            .and_then(|words| words.first().copied())
            .unwrap_or(0);
        let mut args = self.take_words(b.args);
        for i in Self::invocations(params, workgroups) {
            if let Some(cmd) = args_invocation(params, i, survivors) {
                if let Some(dst) = args.get_mut(..5) {
                    dst.copy_from_slice(bytemuck::cast_slice(bytemuck::bytes_of(&cmd)));
                }
            }
        }
        self.restore_words(b.args, args);
    }
}

impl GpuBackend for SoftwareBackend {
    fn create_buffer(&mut self, desc: &BufferDesc) -> BufferHandle {
        self.calls.push(BackendCall::CreateBuffer {
            label: desc.label,
            size: desc.size,
        });
        BufferHandle(self.buffers.push(SoftBuffer {
            desc: *desc,
            words: vec![0; desc.size.div_ceil(4) as usize],
            state: ResourceState::CopyDst,
            unsynced: false,
        }))
    }

    fn resize_buffer(&mut self, handle: BufferHandle, size: u64) {
        let Some(buffer) = self.buffers.get_mut(handle.0) else {
            self.hazards.push(Hazard::UnknownBuffer { op: "resize" });
            return;
        };
        buffer.desc.size = size;
        buffer.words = vec![0; size.div_ceil(4) as usize];
        buffer.state = ResourceState::CopyDst;
        buffer.unsynced = false;
        let label = buffer.desc.label;
        self.calls.push(BackendCall::ResizeBuffer { label, size });
    }

    fn destroy_buffer(&mut self, handle: BufferHandle) {
        match self.buffers.remove(handle.0) {
            Some(buffer) => self.calls.push(BackendCall::DestroyBuffer {
                label: buffer.desc.label,
            }),
            None => self.hazards.push(Hazard::UnknownBuffer { op: "destroy" }),
        }
    }

    fn buffer_size(&self, handle: BufferHandle) -> u64 {
        self.buffers
            .get(handle.0)
            .map(|buffer| buffer.desc.size)
            .unwrap_or(0)
    }

    fn write_buffer(&mut self, handle: BufferHandle, offset: u64, data: &[u8]) {
        if !self.check_transfer(handle, "write_buffer") {
            return;
        }
        let label = self.label(handle);
        self.calls.push(BackendCall::WriteBuffer {
            label,
            offset,
            len: data.len(),
        });
        let Some(buffer) = self.buffers.get_mut(handle.0) else {
            return;
        };
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut buffer.words);
        let start = offset as usize;
        match bytes.get_mut(start..start + data.len()) {
            Some(dst) => dst.copy_from_slice(data),
            None => self.hazards.push(Hazard::OutOfBounds {
                label,
                op: "write_buffer",
            }),
        }
    }

    fn clear_buffer(&mut self, handle: BufferHandle) {
        if !self.check_transfer(handle, "clear_buffer") {
            return;
        }
        let label = self.label(handle);
        self.calls.push(BackendCall::ClearBuffer { label });
        if let Some(buffer) = self.buffers.get_mut(handle.0) {
            buffer.words.fill(0);
        }
    }

    fn transition(&mut self, handle: BufferHandle, from: ResourceState, to: ResourceState) {
        let Some(buffer) = self.buffers.get_mut(handle.0) else {
            self.hazards.push(Hazard::UnknownBuffer { op: "transition" });
            return;
        };
        let label = buffer.desc.label;
        if buffer.state != from {
            self.hazards.push(Hazard::StateMismatch {
                label,
                expected: from,
                actual: buffer.state,
            });
        }
        buffer.state = to;
        buffer.unsynced = false;
        self.calls.push(BackendCall::Transition { label, from, to });
    }

    fn dispatch(&mut self, bindings: &SpriteBindings, dispatch: Dispatch) {
        profile_function!();
        let Some(params) = self.params(bindings, dispatch.params_offset) else {
            self.hazards.push(Hazard::OutOfBounds {
                label: self.label(bindings.params),
                op: "dispatch",
            });
            return;
        };
        self.calls.push(BackendCall::Dispatch {
            kernel: dispatch.kernel,
            workgroups: dispatch.workgroups,
            params,
        });
        match dispatch.kernel {
            Kernel::BitonicSort => self.run_bitonic(bindings, &params, dispatch.workgroups),
            Kernel::SphereCull => self.run_cull(bindings, &params, dispatch.workgroups),
            Kernel::DrawArgs => self.run_args(bindings, &params, dispatch.workgroups),
        }
    }

    fn draw_indexed_indirect(&mut self, bindings: &SpriteBindings) {
        let op = "draw_indexed_indirect";
        let ok = [
            self.check(bindings.args, Access::Indirect, op),
            self.check(bindings.sprites, Access::Read, op),
            self.check(bindings.compacted, Access::Read, op),
            self.check(bindings.camera, Access::Read, op),
        ];
        if ok.contains(&false) {
            return;
        }
        let args = self
            .words(bindings.args)
            .and_then(|words| DrawIndexedIndirect::from_bytes(bytemuck::cast_slice(words)))
            .unwrap_or_default();
        let instances = self
            .words(bindings.compacted)
            .map(|words| {
                let end = (args.instance_count as usize).min(words.len());
                words[..end].to_vec()
            })
            .unwrap_or_default();
        self.calls.push(BackendCall::DrawIndexedIndirect { args });
        self.draws.push(RecordedDraw { args, instances });
    }
}

impl BufferReadback for SoftwareBackend {
    fn read_buffer(&mut self, handle: BufferHandle) -> Result<Vec<u8>, ReadbackError> {
        let buffer = self
            .buffers
            .get(handle.0)
            .ok_or(ReadbackError::UnknownBuffer)?;
        let bytes: &[u8] = bytemuck::cast_slice(&buffer.words);
        Ok(bytes[..buffer.desc.size as usize].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sprite::backend::BufferUsages;

    fn storage(backend: &mut SoftwareBackend, label: &'static str, size: u64) -> BufferHandle {
        backend.create_buffer(&BufferDesc {
            label,
            size,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
        })
    }

    #[test]
    fn test_write_requires_copy_dst() {
        let mut backend = SoftwareBackend::new();
        let buffer = storage(&mut backend, "ids", 16);
        backend.write_buffer(buffer, 4, &7u32.to_le_bytes());
        assert!(backend.hazards().is_empty());
        assert_eq!(backend.words(buffer), Some(&[0, 7, 0, 0][..]));

        backend.transition(buffer, ResourceState::CopyDst, ResourceState::ShaderRead);
        backend.write_buffer(buffer, 0, &[0; 4]);
        assert!(matches!(
            backend.hazards(),
            [Hazard::InvalidAccess {
                op: "write_buffer",
                ..
            }]
        ));
    }

    #[test]
    fn test_transition_from_wrong_state_recorded() {
        let mut backend = SoftwareBackend::new();
        let buffer = storage(&mut backend, "keys", 16);
        backend.transition(buffer, ResourceState::ShaderRead, ResourceState::UnorderedAccess);
        assert_eq!(
            backend.hazards(),
            &[Hazard::StateMismatch {
                label: "keys",
                expected: ResourceState::ShaderRead,
                actual: ResourceState::CopyDst,
            }]
        );
        assert_eq!(backend.state_of(buffer), Some(ResourceState::UnorderedAccess));
    }

    #[test]
    fn test_resize_resets_contents_and_state() {
        let mut backend = SoftwareBackend::new();
        let buffer = storage(&mut backend, "ids", 8);
        backend.write_buffer(buffer, 0, &[1; 8]);
        backend.transition(buffer, ResourceState::CopyDst, ResourceState::UnorderedAccess);
        backend.resize_buffer(buffer, 32);
        assert_eq!(backend.buffer_size(buffer), 32);
        assert_eq!(backend.words(buffer), Some(&[0u32; 8][..]));
        assert_eq!(backend.state_of(buffer), Some(ResourceState::CopyDst));
        assert_eq!(backend.count_resizes(), 1);
    }

    #[test]
    fn test_destroyed_handle_is_unknown() {
        let mut backend = SoftwareBackend::new();
        let buffer = storage(&mut backend, "ids", 8);
        backend.destroy_buffer(buffer);
        assert_eq!(backend.buffer_count(), 0);
        assert_eq!(backend.read_buffer(buffer), Err(ReadbackError::UnknownBuffer));
        backend.clear_buffer(buffer);
        assert_eq!(
            backend.hazards(),
            &[Hazard::UnknownBuffer {
                op: "clear_buffer"
            }]
        );
    }
}
