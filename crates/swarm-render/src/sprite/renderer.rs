//! Per-frame orchestration of the sprite pipeline.
//!
//! [`SpriteBatchRenderer::prepare`] snapshots the registry, uploads instances, planes and
//! keys, then runs sort, cull and argument generation with a transition between every
//! producer and its consumer. [`SpriteBatchRenderer::render`] issues the single indirect
//! draw.

use swarm_core::alloc::HashMap;
use swarm_core::profiling::{profile_function, profile_scope};

use super::backend::{
    BufferDesc, BufferHandle, BufferReadback, BufferUsages, GpuBackend, ResourceState,
    SpriteBindings,
};
use super::config::{BatchConfig, CullMode, SortMode};
use super::cull::{cull_on_cpu, cull_params};
use super::draw_args::{QUAD_INDEX_COUNT, args_params};
use super::error::SpriteError;
use super::instance::GpuSprite;
use super::kernel::{Dispatch, DispatchGrid, Kernel, KernelParams, PARAMS_STRIDE};
use super::registry::{FrameSnapshot, SpriteRegistry};
use super::sort::{BitonicStages, seed_params, sort_count, sort_on_cpu, stage_params};
use crate::camera::{CameraSource, CameraUniform, Viewport};
use crate::indirect::{DrawIndexedIndirect, IndirectCommand};

const SPRITE_STRIDE: u64 = std::mem::size_of::<GpuSprite>() as u64;
const PLANES_SIZE: u64 = 6 * 16;
const CAMERA_SIZE: u64 = std::mem::size_of::<CameraUniform>() as u64;

/// Counters for one prepared frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpriteFrameStats {
    pub live_instances: u32,
    pub sort_count: u32,
    pub dispatches: u32,
    pub barriers: u32,
    /// Buffers resized this frame.
    pub reallocations: u32,
    /// Registrations refused by the registry since it was created.
    pub rejected_registrations: u64,
}

/// Debug copy of the pipeline buffers after a frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineReadback {
    pub sorted_ids: Vec<u32>,
    pub distance_keys: Vec<f32>,
    pub survivor_count: u32,
    /// `compacted[..survivor_count]`.
    pub compacted: Vec<u32>,
    pub draw_args: DrawIndexedIndirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FramePhase {
    Idle,
    Prepared,
}

/// Last known state of every pipeline buffer.
#[derive(Default)]
struct StateTracker {
    states: HashMap<BufferHandle, ResourceState>,
    barriers: u32,
}

impl StateTracker {
    fn reset(&mut self, handle: BufferHandle) {
        self.states.insert(handle, ResourceState::CopyDst);
    }

    fn state(&self, handle: BufferHandle) -> ResourceState {
        self.states
            .get(&handle)
            .copied()
            .unwrap_or(ResourceState::CopyDst)
    }

    /// Move `handle` to `to`. A no-op when it is already there.
    fn to<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        handle: BufferHandle,
        to: ResourceState,
    ) {
        let from = self.state(handle);
        if from == to {
            return;
        }
        backend.transition(handle, from, to);
        self.states.insert(handle, to);
        self.barriers += 1;
    }

    /// Order two compute writers of the same buffer.
    fn uav_barrier<B: GpuBackend + ?Sized>(&mut self, backend: &mut B, handle: BufferHandle) {
        let from = self.state(handle);
        backend.transition(handle, from, ResourceState::UnorderedAccess);
        self.states.insert(handle, ResourceState::UnorderedAccess);
        self.barriers += 1;
    }
}

/// GPU-driven batch renderer for every registered sprite.
///
/// Owns the pipeline buffers through backend handles. Handles stay valid across resizes.
pub struct SpriteBatchRenderer {
    config: BatchConfig,
    bindings: SpriteBindings,
    tracker: StateTracker,
    instance_capacity: u32,
    sort_count: u32,
    live: u32,
    planes: [[f32; 4]; 6],
    phase: FramePhase,
    snapshot: FrameSnapshot,
    params: Vec<KernelParams>,
    params_bytes: Vec<u8>,
    scratch_keys: Vec<f32>,
    scratch_ids: Vec<u32>,
    scratch_compacted: Vec<u32>,
    stats: SpriteFrameStats,
}

impl SpriteBatchRenderer {
    /// Create every pipeline buffer at its initial size.
    pub fn new<B: GpuBackend + ?Sized>(backend: &mut B, config: BatchConfig) -> Self {
        profile_function!();
        let instance_capacity = config.initial_capacity.clamp(1, config.max_instances.max(1));
        let initial_sort_count = sort_count(0);
        let param_slots = Self::param_slots(sort_count(config.max_instances));

        let storage = BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC;
        let mut create = |label: &'static str, size: u64, usage: BufferUsages| {
            backend.create_buffer(&BufferDesc { label, size, usage })
        };
        let bindings = SpriteBindings {
            sprites: create(
                "sprite_instances",
                instance_capacity as u64 * SPRITE_STRIDE,
                storage,
            ),
            keys: create("sprite_distance_keys", initial_sort_count as u64 * 4, storage),
            sorted_ids: create("sprite_sorted_ids", initial_sort_count as u64 * 4, storage),
            planes: create(
                "sprite_frustum_planes",
                PLANES_SIZE,
                BufferUsages::STORAGE | BufferUsages::COPY_DST,
            ),
            counter: create("sprite_survivor_counter", 4, storage),
            compacted: create("sprite_compacted_ids", instance_capacity as u64 * 4, storage),
            args: create(
                "sprite_draw_args",
                DrawIndexedIndirect::SIZE,
                storage | BufferUsages::INDIRECT,
            ),
            params: create(
                "sprite_kernel_params",
                param_slots as u64 * PARAMS_STRIDE,
                BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            ),
            camera: create(
                "sprite_camera",
                CAMERA_SIZE,
                BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            ),
        };

        let mut tracker = StateTracker::default();
        for handle in bindings.all() {
            tracker.reset(handle);
        }

        tracing::debug!(
            label = config.label,
            instance_capacity,
            max_instances = config.max_instances,
            param_slots,
            "sprite batch renderer created"
        );

        Self {
            config,
            bindings,
            tracker,
            instance_capacity,
            sort_count: initial_sort_count,
            live: 0,
            planes: [[0.0; 4]; 6],
            phase: FramePhase::Idle,
            snapshot: FrameSnapshot::default(),
            params: Vec::new(),
            params_bytes: Vec::new(),
            scratch_keys: Vec::new(),
            scratch_ids: Vec::new(),
            scratch_compacted: Vec::new(),
            stats: SpriteFrameStats::default(),
        }
    }

    /// Parameter slots used by a frame: seed, every stage, cull, args.
    fn param_slots(sort_count: u32) -> u32 {
        BitonicStages::stage_count(sort_count) + 3
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn bindings(&self) -> &SpriteBindings {
        &self.bindings
    }

    pub fn instance_capacity(&self) -> u32 {
        self.instance_capacity
    }

    /// Element count the key and sorted-id buffers are currently sized for.
    pub fn sort_count(&self) -> u32 {
        self.sort_count
    }

    pub fn stats(&self) -> SpriteFrameStats {
        self.stats
    }

    /// Record the compute half of a frame: steps from snapshot to draw arguments.
    pub fn prepare<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        registry: &SpriteRegistry,
        camera: &dyn CameraSource,
        viewport: Viewport,
    ) -> Result<SpriteFrameStats, SpriteError> {
        profile_function!();
        if registry.len() > self.config.max_instances as usize {
            return Err(SpriteError::CapacityExceeded {
                max: self.config.max_instances,
            });
        }

        backend.flush();
        self.tracker.barriers = 0;
        self.stats = SpriteFrameStats {
            rejected_registrations: registry.rejected(),
            ..Default::default()
        };

        {
            profile_scope!("snapshot");
            registry.snapshot_into(
                camera.world_position(),
                self.config.sort_order,
                &mut self.snapshot,
            );
        }
        self.live = self.snapshot.len();
        let sort_count = self.snapshot.sort_count();

        self.upload_instances(backend);
        self.upload_view(backend, camera, viewport);
        self.ensure_sort_capacity(backend, sort_count);
        self.upload_params(backend);

        match self.config.sort_mode {
            SortMode::Gpu => self.sort_on_gpu(backend),
            SortMode::Cpu | SortMode::None => self.upload_cpu_order(backend),
        }

        match self.config.cull_mode {
            CullMode::Gpu => {
                self.cull_on_gpu(backend);
                self.build_args_on_gpu(backend);
            }
            CullMode::Cpu | CullMode::None => self.upload_cpu_cull(backend),
        }

        self.phase = FramePhase::Prepared;
        self.stats.live_instances = self.live;
        self.stats.sort_count = self.sort_count;
        self.stats.barriers = self.tracker.barriers;
        tracing::trace!(
            live = self.stats.live_instances,
            sort_count = self.stats.sort_count,
            dispatches = self.stats.dispatches,
            barriers = self.stats.barriers,
            "sprite frame prepared"
        );
        Ok(self.stats)
    }

    /// Issue the indirect draw recorded by [`prepare`](Self::prepare).
    pub fn render<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) -> Result<(), SpriteError> {
        profile_function!();
        if self.phase != FramePhase::Prepared {
            return Err(SpriteError::FrameNotPrepared);
        }
        backend.draw_indexed_indirect(&self.bindings);
        self.phase = FramePhase::Idle;
        Ok(())
    }

    /// Copy the sort, cull and argument buffers back for inspection.
    pub fn read_back<B: GpuBackend + BufferReadback + ?Sized>(
        &self,
        backend: &mut B,
    ) -> Result<PipelineReadback, SpriteError> {
        profile_function!();
        let count = self.sort_count as usize;
        let mut sorted_ids: Vec<u32> = words(&backend.read_buffer(self.bindings.sorted_ids)?);
        sorted_ids.truncate(count);
        let mut distance_keys: Vec<f32> = words(&backend.read_buffer(self.bindings.keys)?);
        distance_keys.truncate(count);
        let survivor_count = words::<u32>(&backend.read_buffer(self.bindings.counter)?)
            .first()
            .copied()
            .unwrap_or(0);
        let mut compacted: Vec<u32> = words(&backend.read_buffer(self.bindings.compacted)?);
        compacted.truncate(survivor_count as usize);
        let draw_args = DrawIndexedIndirect::from_bytes(&backend.read_buffer(self.bindings.args)?)
            .unwrap_or_default();
        Ok(PipelineReadback {
            sorted_ids,
            distance_keys,
            survivor_count,
            compacted,
            draw_args,
        })
    }

    /// Destroy every pipeline buffer.
    pub fn release<B: GpuBackend + ?Sized>(self, backend: &mut B) {
        for handle in self.bindings.all() {
            backend.destroy_buffer(handle);
        }
        tracing::debug!(label = self.config.label, "sprite batch renderer released");
    }

    fn resize<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        handle: BufferHandle,
        size: u64,
    ) {
        backend.resize_buffer(handle, size);
        self.tracker.reset(handle);
        self.stats.reallocations += 1;
    }

    /// Grow the instance and compacted buffers by doubling when `live` overflows them.
    fn ensure_instance_capacity<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        if self.live <= self.instance_capacity {
            return;
        }
        let capacity = self
            .live
            .next_power_of_two()
            .max(self.instance_capacity * 2)
            .min(self.config.max_instances);
        tracing::debug!(
            from = self.instance_capacity,
            to = capacity,
            "growing sprite instance buffers"
        );
        self.resize(backend, self.bindings.sprites, capacity as u64 * SPRITE_STRIDE);
        self.resize(backend, self.bindings.compacted, capacity as u64 * 4);
        self.instance_capacity = capacity;
    }

    /// Reallocate the key and sorted-id buffers when the padded count changes.
    fn ensure_sort_capacity<B: GpuBackend + ?Sized>(&mut self, backend: &mut B, sort_count: u32) {
        if sort_count == self.sort_count {
            return;
        }
        tracing::debug!(
            from = self.sort_count,
            to = sort_count,
            "resizing sprite sort buffers"
        );
        self.resize(backend, self.bindings.keys, sort_count as u64 * 4);
        self.resize(backend, self.bindings.sorted_ids, sort_count as u64 * 4);
        self.sort_count = sort_count;
    }

    fn upload<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        handle: BufferHandle,
        data: &[u8],
        rest: ResourceState,
    ) {
        self.tracker.to(backend, handle, ResourceState::CopyDst);
        if !data.is_empty() {
            backend.write_buffer(handle, 0, data);
        }
        self.tracker.to(backend, handle, rest);
    }

    fn dispatch<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        kernel: Kernel,
        slot: u32,
        grid: DispatchGrid,
    ) {
        backend.dispatch(
            &self.bindings,
            Dispatch {
                kernel,
                params_offset: slot * PARAMS_STRIDE as u32,
                workgroups: grid.workgroups,
            },
        );
        self.stats.dispatches += 1;
    }

    fn upload_instances<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        profile_scope!("upload_instances");
        self.ensure_instance_capacity(backend);
        let sprites = std::mem::take(&mut self.snapshot.sprites);
        self.upload(
            backend,
            self.bindings.sprites,
            bytemuck::cast_slice(&sprites),
            ResourceState::ShaderRead,
        );
        self.snapshot.sprites = sprites;
    }

    fn upload_view<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        camera: &dyn CameraSource,
        viewport: Viewport,
    ) {
        profile_scope!("upload_view");
        self.planes = camera.frustum(viewport).to_gpu();
        let planes = self.planes;
        self.upload(
            backend,
            self.bindings.planes,
            bytemuck::cast_slice(&planes),
            ResourceState::ShaderRead,
        );
        let uniform = CameraUniform::new(camera, viewport, self.config.half_extent);
        self.upload(
            backend,
            self.bindings.camera,
            bytemuck::bytes_of(&uniform),
            ResourceState::ShaderRead,
        );
    }

    /// Fill one parameter slot per dispatch and upload them together.
    fn upload_params<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        profile_scope!("upload_params");
        let count = self.sort_count;
        let order = self.config.sort_order;
        self.params.clear();
        self.params.push(seed_params(count));
        self.params.extend(
            BitonicStages::new(count).map(|(dim, block)| stage_params(count, dim, block, order)),
        );
        self.params.push(cull_params(self.live, self.config.cull_radius));
        self.params.push(args_params(QUAD_INDEX_COUNT));

        self.params_bytes.clear();
        self.params_bytes
            .resize(self.params.len() * PARAMS_STRIDE as usize, 0);
        for (slot, params) in self
            .params_bytes
            .chunks_exact_mut(PARAMS_STRIDE as usize)
            .zip(&self.params)
        {
            slot[..std::mem::size_of::<KernelParams>()]
                .copy_from_slice(bytemuck::bytes_of(params));
        }
        let bytes = std::mem::take(&mut self.params_bytes);
        self.upload(backend, self.bindings.params, &bytes, ResourceState::ShaderRead);
        self.params_bytes = bytes;
    }

    fn cull_slot(&self) -> u32 {
        self.params.len() as u32 - 2
    }

    fn args_slot(&self) -> u32 {
        self.params.len() as u32 - 1
    }

    fn sort_on_gpu<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        profile_scope!("bitonic_sort");
        let keys = std::mem::take(&mut self.snapshot.keys);
        self.tracker.to(backend, self.bindings.keys, ResourceState::CopyDst);
        backend.write_buffer(self.bindings.keys, 0, bytemuck::cast_slice(&keys));
        self.snapshot.keys = keys;

        let (ids, keys) = (self.bindings.sorted_ids, self.bindings.keys);
        self.tracker.to(backend, ids, ResourceState::UnorderedAccess);
        self.tracker.to(backend, keys, ResourceState::UnorderedAccess);

        let grid = DispatchGrid::for_threads(self.sort_count);
        self.dispatch(backend, Kernel::BitonicSort, 0, grid);
        self.tracker.uav_barrier(backend, ids);
        self.tracker.uav_barrier(backend, keys);

        let stages = BitonicStages::stage_count(self.sort_count);
        for stage in 0..stages {
            self.dispatch(backend, Kernel::BitonicSort, stage + 1, grid);
            self.tracker.uav_barrier(backend, ids);
            self.tracker.uav_barrier(backend, keys);
        }
        self.tracker.to(backend, ids, ResourceState::ShaderRead);
    }

    /// Fill `scratch_ids` (and `scratch_keys`) with the frame's order on the CPU.
    fn order_on_cpu(&mut self) {
        self.scratch_keys.clear();
        self.scratch_keys.extend_from_slice(&self.snapshot.keys);
        self.scratch_ids.clear();
        self.scratch_ids.resize(self.scratch_keys.len(), 0);
        match self.config.sort_mode {
            SortMode::None => {
                for (i, id) in self.scratch_ids.iter_mut().enumerate() {
                    *id = i as u32;
                }
            }
            SortMode::Gpu | SortMode::Cpu => {
                sort_on_cpu(&mut self.scratch_keys, &mut self.scratch_ids, self.config.sort_order)
            }
        }
    }

    fn upload_cpu_order<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        profile_scope!("cpu_sort");
        self.order_on_cpu();
        let keys = std::mem::take(&mut self.scratch_keys);
        let ids = std::mem::take(&mut self.scratch_ids);
        self.upload(
            backend,
            self.bindings.keys,
            bytemuck::cast_slice(&keys),
            ResourceState::ShaderRead,
        );
        self.upload(
            backend,
            self.bindings.sorted_ids,
            bytemuck::cast_slice(&ids),
            ResourceState::ShaderRead,
        );
        self.scratch_keys = keys;
        self.scratch_ids = ids;
    }

    fn cull_on_gpu<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        profile_scope!("sphere_cull");
        let (counter, compacted) = (self.bindings.counter, self.bindings.compacted);
        self.tracker.to(backend, counter, ResourceState::CopyDst);
        backend.clear_buffer(counter);
        self.tracker.to(backend, counter, ResourceState::UnorderedAccess);
        self.tracker.to(backend, compacted, ResourceState::UnorderedAccess);

        let slot = self.cull_slot();
        self.dispatch(backend, Kernel::SphereCull, slot, DispatchGrid::for_threads(self.live));

        self.tracker.to(backend, counter, ResourceState::ShaderRead);
        self.tracker.to(backend, compacted, ResourceState::ShaderRead);
    }

    fn build_args_on_gpu<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        profile_scope!("draw_args");
        let args = self.bindings.args;
        self.tracker.to(backend, args, ResourceState::UnorderedAccess);
        let slot = self.args_slot();
        self.dispatch(backend, Kernel::DrawArgs, slot, DispatchGrid::single());
        self.tracker.to(backend, args, ResourceState::IndirectArgument);
    }

    /// Cull on the CPU (or accept everything) and upload ids, count and draw arguments.
    fn upload_cpu_cull<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        profile_scope!("cpu_cull");
        if self.config.sort_mode == SortMode::Gpu {
            self.order_on_cpu();
        }
        let live = self.live as usize;
        let survivors = match self.config.cull_mode {
            CullMode::None => {
                self.scratch_compacted.clear();
                self.scratch_compacted.extend(
                    self.scratch_ids
                        .iter()
                        .copied()
                        .filter(|&id| (id as usize) < live),
                );
                self.scratch_compacted.len() as u32
            }
            CullMode::Gpu | CullMode::Cpu => cull_on_cpu(
                &self.snapshot.sprites,
                &self.planes,
                &self.scratch_ids,
                self.config.cull_radius,
                &mut self.scratch_compacted,
            ),
        };

        let compacted = std::mem::take(&mut self.scratch_compacted);
        self.upload(
            backend,
            self.bindings.compacted,
            bytemuck::cast_slice(&compacted),
            ResourceState::ShaderRead,
        );
        self.scratch_compacted = compacted;
        self.upload(
            backend,
            self.bindings.counter,
            bytemuck::bytes_of(&survivors),
            ResourceState::ShaderRead,
        );
        let args = DrawIndexedIndirect::instanced(QUAD_INDEX_COUNT, survivors);
        self.upload(
            backend,
            self.bindings.args,
            bytemuck::bytes_of(&args),
            ResourceState::IndirectArgument,
        );
    }
}

fn words<T: bytemuck::Pod>(bytes: &[u8]) -> Vec<T> {
    let usable = bytes.len() - bytes.len() % std::mem::size_of::<T>();
    bytemuck::pod_collect_to_vec(&bytes[..usable])
}
