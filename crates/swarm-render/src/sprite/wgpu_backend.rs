//! [`GpuBackend`] on a wgpu device.
//!
//! Commands for one frame accumulate in a [`FrameEncoder`]; [`WgpuSpriteBackend::submit`]
//! hands them to the queue. wgpu tracks buffer usage itself, so a transition here ends
//! the open compute pass and nothing more: every dispatch recorded afterwards lands in a
//! new pass and observes the writes before it.
//!
//! Uploads go through `Queue::write_buffer` and therefore execute before the frame's
//! command buffer. The batch renderer never uploads into a buffer a dispatch of the same
//! frame writes first, and [`GpuBackend::flush`] submits the previous frame before the
//! next one uploads anything.

use std::num::NonZeroU64;
use std::sync::Arc;

use swarm_core::alloc::HashMap;
use swarm_core::alloc::sparse_set::SparseSet;
use swarm_core::profiling::profile_function;
use wgpu::util::DeviceExt;

use super::backend::{
    BufferDesc, BufferHandle, BufferReadback, BufferUsages, GpuBackend, ResourceState,
    SpriteBindings,
};
use super::draw_args::QUAD_INDICES;
use super::kernel::{Dispatch, Kernel, KernelParams};
use super::textures::{SpriteTextureArray, TextureTableDesc};
use crate::GraphicsContext;
use crate::compute::FrameEncoder;
use crate::readback::{self, ReadbackError};

const FRAME_LABEL: &str = "sprite_frame";

const PARAMS_SIZE: u64 = std::mem::size_of::<KernelParams>() as u64;

pub(crate) fn to_wgpu_usages(usage: BufferUsages) -> wgpu::BufferUsages {
    const MAPPING: &[(BufferUsages, wgpu::BufferUsages)] = &[
        (BufferUsages::STORAGE, wgpu::BufferUsages::STORAGE),
        (BufferUsages::UNIFORM, wgpu::BufferUsages::UNIFORM),
        (BufferUsages::INDIRECT, wgpu::BufferUsages::INDIRECT),
        (BufferUsages::COPY_DST, wgpu::BufferUsages::COPY_DST),
        (BufferUsages::COPY_SRC, wgpu::BufferUsages::COPY_SRC),
        (BufferUsages::INDEX, wgpu::BufferUsages::INDEX),
    ];
    MAPPING
        .iter()
        .filter(|(ours, _)| usage.contains(*ours))
        .fold(wgpu::BufferUsages::empty(), |acc, (_, theirs)| acc | *theirs)
}

/// Whether each buffer a kernel binds after its parameter block is read-only.
pub(crate) fn kernel_access(kernel: Kernel) -> &'static [bool] {
    match kernel {
        Kernel::BitonicSort => &[false, false],
        Kernel::SphereCull => &[true, true, true, false, false],
        Kernel::DrawArgs => &[true, false],
    }
}

/// Buffers a kernel binds after its parameter block, in binding order.
pub(crate) fn kernel_buffers(kernel: Kernel, b: &SpriteBindings) -> Vec<BufferHandle> {
    match kernel {
        Kernel::BitonicSort => vec![b.sorted_ids, b.keys],
        Kernel::SphereCull => vec![b.sprites, b.planes, b.sorted_ids, b.counter, b.compacted],
        Kernel::DrawArgs => vec![b.counter, b.args],
    }
}

fn kernel_source(kernel: Kernel) -> &'static str {
    match kernel {
        Kernel::BitonicSort => include_str!("../shaders/bitonic_sort.wgsl"),
        Kernel::SphereCull => include_str!("../shaders/sphere_cull.wgsl"),
        Kernel::DrawArgs => include_str!("../shaders/draw_args.wgsl"),
    }
}

fn kernel_index(kernel: Kernel) -> usize {
    match kernel {
        Kernel::BitonicSort => 0,
        Kernel::SphereCull => 1,
        Kernel::DrawArgs => 2,
    }
}

fn storage_entry(
    binding: u32,
    read_only: bool,
    visibility: wgpu::ShaderStages,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(
    binding: u32,
    dynamic: bool,
    min_size: u64,
    visibility: wgpu::ShaderStages,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: NonZeroU64::new(min_size),
        },
        count: None,
    }
}

struct KernelPipeline {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

impl KernelPipeline {
    fn new(device: &wgpu::Device, kernel: Kernel) -> Self {
        let label = Some(kernel.label());
        let mut entries = vec![uniform_entry(
            0,
            true,
            PARAMS_SIZE,
            wgpu::ShaderStages::COMPUTE,
        )];
        for (binding, &read_only) in kernel_access(kernel).iter().enumerate() {
            entries.push(storage_entry(
                binding as u32 + 1,
                read_only,
                wgpu::ShaderStages::COMPUTE,
            ));
        }
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label,
            entries: &entries,
        });
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label,
            source: wgpu::ShaderSource::Wgsl(kernel_source(kernel).into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label,
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label,
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });
        Self { layout, pipeline }
    }
}

struct DrawPipeline {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    index_buffer: wgpu::Buffer,
}

impl DrawPipeline {
    fn new(device: &wgpu::Device, target_format: wgpu::TextureFormat) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sprite_draw_layout"),
            entries: &[
                storage_entry(0, true, wgpu::ShaderStages::VERTEX),
                storage_entry(1, true, wgpu::ShaderStages::VERTEX),
                uniform_entry(2, false, 0, wgpu::ShaderStages::VERTEX),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sprite_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/sprite.wgsl").into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sprite_draw_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("sprite_draw_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sprite_quad_indices"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            layout,
            pipeline,
            index_buffer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum BindGroupKind {
    Kernel(Kernel),
    Draw,
}

struct GpuBuffer {
    desc: BufferDesc,
    buffer: wgpu::Buffer,
}

struct RenderTarget {
    view: wgpu::TextureView,
    clear: Option<wgpu::Color>,
}

fn frame_encoder<'a>(
    slot: &'a mut Option<FrameEncoder>,
    context: &GraphicsContext,
) -> &'a mut FrameEncoder {
    slot.get_or_insert_with(|| FrameEncoder::new(context.device(), FRAME_LABEL))
}

/// Sprite pipeline on a wgpu device.
///
/// ```ignore
/// let mut backend = WgpuSpriteBackend::new(context.clone(), surface_format, TextureTableDesc::default());
/// let mut system = SpriteRendererSystem::new(BatchConfig::default());
/// system.initialize(&mut backend);
///
/// backend.begin_frame(view, Some(wgpu::Color::BLACK));
/// system.prepare(&mut backend, &camera, viewport)?;
/// system.render(&mut backend)?;
/// backend.end_frame();
/// ```
pub struct WgpuSpriteBackend {
    context: Arc<GraphicsContext>,
    buffers: SparseSet<GpuBuffer>,
    kernels: [KernelPipeline; 3],
    draw: DrawPipeline,
    textures: SpriteTextureArray,
    bind_groups: HashMap<(BindGroupKind, SpriteBindings), wgpu::BindGroup>,
    frame: Option<FrameEncoder>,
    target: Option<RenderTarget>,
}

impl WgpuSpriteBackend {
    pub fn new(
        context: Arc<GraphicsContext>,
        target_format: wgpu::TextureFormat,
        textures: TextureTableDesc,
    ) -> Self {
        profile_function!();
        let device = context.device();
        let kernels = Kernel::ALL.map(|kernel| KernelPipeline::new(device, kernel));
        let draw = DrawPipeline::new(device, target_format);
        let textures = SpriteTextureArray::new(device, textures);
        tracing::debug!(?target_format, "sprite wgpu backend created");
        Self {
            context,
            buffers: SparseSet::default(),
            kernels,
            draw,
            textures,
            bind_groups: HashMap::default(),
            frame: None,
            target: None,
        }
    }

    pub fn context(&self) -> &Arc<GraphicsContext> {
        &self.context
    }

    pub fn textures(&self) -> &SpriteTextureArray {
        &self.textures
    }

    pub fn textures_mut(&mut self) -> &mut SpriteTextureArray {
        &mut self.textures
    }

    pub fn buffer(&self, handle: BufferHandle) -> Option<&wgpu::Buffer> {
        self.buffers.get(handle.0).map(|buffer| &buffer.buffer)
    }

    /// Draw into `target` until [`end_frame`](Self::end_frame). The first draw clears it
    /// to `clear` when given.
    pub fn begin_frame(&mut self, target: wgpu::TextureView, clear: Option<wgpu::Color>) {
        self.target = Some(RenderTarget {
            view: target,
            clear,
        });
    }

    /// Submit everything recorded so far.
    pub fn submit(&mut self) -> Option<wgpu::SubmissionIndex> {
        let frame = self.frame.take()?;
        profile_function!();
        tracing::trace!(compute_passes = frame.pass_count(), "submitting sprite frame");
        Some(self.context.queue().submit(Some(frame.finish())))
    }

    /// Submit and drop the render target.
    pub fn end_frame(&mut self) -> Option<wgpu::SubmissionIndex> {
        let index = self.submit();
        self.target = None;
        index
    }

    fn wgpu_buffer(&self, handle: BufferHandle) -> Option<&wgpu::Buffer> {
        self.buffers.get(handle.0).map(|buffer| &buffer.buffer)
    }

    fn create_kernel_bind_group(
        &self,
        kernel: Kernel,
        bindings: &SpriteBindings,
    ) -> Option<wgpu::BindGroup> {
        let params = self.wgpu_buffer(bindings.params)?;
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: params,
                offset: 0,
                size: NonZeroU64::new(PARAMS_SIZE),
            }),
        }];
        for (binding, handle) in kernel_buffers(kernel, bindings).into_iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: binding as u32 + 1,
                resource: self.wgpu_buffer(handle)?.as_entire_binding(),
            });
        }
        Some(
            self.context
                .device()
                .create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(kernel.label()),
                    layout: &self.kernels[kernel_index(kernel)].layout,
                    entries: &entries,
                }),
        )
    }

    fn create_draw_bind_group(&self, bindings: &SpriteBindings) -> Option<wgpu::BindGroup> {
        Some(
            self.context
                .device()
                .create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("sprite_draw_bind_group"),
                    layout: &self.draw.layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: self.wgpu_buffer(bindings.sprites)?.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: self.wgpu_buffer(bindings.compacted)?.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: self.wgpu_buffer(bindings.camera)?.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: wgpu::BindingResource::TextureView(self.textures.view()),
                        },
                        wgpu::BindGroupEntry {
                            binding: 4,
                            resource: wgpu::BindingResource::Sampler(self.textures.sampler()),
                        },
                    ],
                }),
        )
    }

    /// Cached bind group, created on first use after any buffer (re)allocation.
    fn ensure_bind_group(&mut self, kind: BindGroupKind, bindings: &SpriteBindings) -> bool {
        let key = (kind, *bindings);
        if self.bind_groups.contains_key(&key) {
            return true;
        }
        let created = match kind {
            BindGroupKind::Kernel(kernel) => self.create_kernel_bind_group(kernel, bindings),
            BindGroupKind::Draw => self.create_draw_bind_group(bindings),
        };
        match created {
            Some(bind_group) => {
                self.bind_groups.insert(key, bind_group);
                true
            }
            None => {
                tracing::error!(?kind, "sprite bind group references a released buffer");
                false
            }
        }
    }

    fn allocate(&self, desc: &BufferDesc) -> wgpu::Buffer {
        self.context
            .device()
            .create_buffer(&wgpu::BufferDescriptor {
                label: Some(desc.label),
                size: desc.size.max(4).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT),
                usage: to_wgpu_usages(desc.usage),
                mapped_at_creation: false,
            })
    }
}

impl GpuBackend for WgpuSpriteBackend {
    fn create_buffer(&mut self, desc: &BufferDesc) -> BufferHandle {
        let buffer = self.allocate(desc);
        BufferHandle(self.buffers.push(GpuBuffer {
            desc: *desc,
            buffer,
        }))
    }

    fn resize_buffer(&mut self, handle: BufferHandle, size: u64) {
        let Some(desc) = self.buffers.get(handle.0).map(|buffer| buffer.desc) else {
            tracing::error!("resize of unknown sprite buffer");
            return;
        };
        let desc = BufferDesc { size, ..desc };
        let buffer = self.allocate(&desc);
        if let Some(slot) = self.buffers.get_mut(handle.0) {
            // Recorded commands keep the old allocation alive until they complete.
            *slot = GpuBuffer { desc, buffer };
        }
        self.bind_groups.clear();
    }

    fn destroy_buffer(&mut self, handle: BufferHandle) {
        if self.buffers.remove(handle.0).is_some() {
            self.bind_groups.clear();
        }
    }

    fn buffer_size(&self, handle: BufferHandle) -> u64 {
        self.buffers
            .get(handle.0)
            .map(|buffer| buffer.desc.size)
            .unwrap_or(0)
    }

    fn write_buffer(&mut self, handle: BufferHandle, offset: u64, data: &[u8]) {
        if let Some(buffer) = self.buffers.get(handle.0) {
            self.context.queue().write_buffer(&buffer.buffer, offset, data);
        }
    }

    fn clear_buffer(&mut self, handle: BufferHandle) {
        let Some(buffer) = self.buffers.get(handle.0) else {
            return;
        };
        frame_encoder(&mut self.frame, &self.context)
            .encoder()
            .clear_buffer(&buffer.buffer, 0, None);
    }

    fn transition(&mut self, handle: BufferHandle, from: ResourceState, to: ResourceState) {
        tracing::trace!(?handle, ?from, ?to, "sprite buffer transition");
        if let Some(frame) = self.frame.as_mut() {
            frame.end_pass();
        }
    }

    fn dispatch(&mut self, bindings: &SpriteBindings, dispatch: Dispatch) {
        let [x, y, z] = dispatch.workgroups;
        if x == 0 || y == 0 || z == 0 {
            return;
        }
        let kind = BindGroupKind::Kernel(dispatch.kernel);
        if !self.ensure_bind_group(kind, bindings) {
            return;
        }
        let Some(bind_group) = self.bind_groups.get(&(kind, *bindings)) else {
            return;
        };
        let pipeline = &self.kernels[kernel_index(dispatch.kernel)].pipeline;
        let pass = frame_encoder(&mut self.frame, &self.context).compute_pass();
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[dispatch.params_offset]);
        pass.dispatch_workgroups(x, y, z);
    }

    fn draw_indexed_indirect(&mut self, bindings: &SpriteBindings) {
        profile_function!();
        if self.target.is_none() {
            tracing::warn!("sprite draw without a render target; call begin_frame first");
            return;
        }
        if !self.ensure_bind_group(BindGroupKind::Draw, bindings) {
            return;
        }
        let (Some(target), Some(bind_group), Some(args)) = (
            self.target.as_mut(),
            self.bind_groups.get(&(BindGroupKind::Draw, *bindings)),
            self.buffers.get(bindings.args.0),
        ) else {
            return;
        };

        let load = match target.clear.take() {
            Some(color) => wgpu::LoadOp::Clear(color),
            None => wgpu::LoadOp::Load,
        };
        let encoder = frame_encoder(&mut self.frame, &self.context).encoder();
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("sprite_draw"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.draw.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.set_index_buffer(self.draw.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed_indirect(&args.buffer, 0);
    }

    fn flush(&mut self) {
        self.submit();
    }
}

impl BufferReadback for WgpuSpriteBackend {
    fn read_buffer(&mut self, handle: BufferHandle) -> Result<Vec<u8>, ReadbackError> {
        self.submit();
        let buffer = self
            .buffers
            .get(handle.0)
            .ok_or(ReadbackError::UnknownBuffer)?;
        readback::read_buffer(&self.context, &buffer.buffer, 0, buffer.desc.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_mapping() {
        let usage = BufferUsages::STORAGE | BufferUsages::INDIRECT | BufferUsages::COPY_DST;
        assert_eq!(
            to_wgpu_usages(usage),
            wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::INDIRECT
                | wgpu::BufferUsages::COPY_DST
        );
        assert_eq!(to_wgpu_usages(BufferUsages::empty()), wgpu::BufferUsages::empty());
    }

    #[test]
    fn test_kernel_binding_shapes_match_shaders() {
        assert_eq!(kernel_access(Kernel::BitonicSort), &[false, false]);
        assert_eq!(kernel_access(Kernel::DrawArgs), &[true, false]);

        for kernel in Kernel::ALL {
            let source = kernel_source(kernel);
            assert!(source.contains("@workgroup_size(256)"));
            let bindings = source.matches("@binding(").count();
            assert_eq!(bindings, kernel_access(kernel).len() + 1, "{kernel:?}");
            let writable = source.matches("read_write>").count();
            let expected = kernel_access(kernel).iter().filter(|read_only| !**read_only).count();
            assert_eq!(writable, expected, "{kernel:?}");
        }
    }
}
