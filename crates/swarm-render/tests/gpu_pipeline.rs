//! The sprite pipeline on a real device.
//!
//! Run with: cargo test --test gpu_pipeline -- --ignored

use std::sync::Arc;

use glam::Vec3;
use swarm_render::sprite::TextureTableDesc;
use swarm_render::{
    BatchConfig, GraphicsContext, GraphicsContextDescriptor, SoftwareBackend, SortOrder,
    SpriteRendererSystem, Viewport, WgpuSpriteBackend,
};
use swarm_test_utils::{
    TestCamera, assert_permutation, assert_sorted_by_key, assert_unique_ids, scattered, sprites_at,
};

const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const VIEWPORT: Viewport = Viewport::new(64.0, 64.0);

fn context() -> Option<Arc<GraphicsContext>> {
    let descriptor = GraphicsContextDescriptor::new().label("sprite_gpu_tests");
    match GraphicsContext::new_owned_sync_with_descriptor(descriptor) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            println!("GPU not available: {e:?}");
            None
        }
    }
}

fn target(ctx: &GraphicsContext) -> wgpu::TextureView {
    ctx.device()
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("sprite_test_target"),
            size: wgpu::Extent3d {
                width: VIEWPORT.width as u32,
                height: VIEWPORT.height as u32,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

fn small_textures() -> TextureTableDesc {
    TextureTableDesc { size: 4, layers: 2 }
}

#[test]
#[ignore] // Requires GPU
fn test_gpu_sort_orders_keys() {
    let Some(ctx) = context() else { return };
    let mut backend = WgpuSpriteBackend::new(ctx.clone(), FORMAT, small_textures());
    let config = BatchConfig::new().half_extent(0.5).sort_order(SortOrder::FrontToBack);
    let mut system = SpriteRendererSystem::new(config);
    let positions = scattered(1000, Vec3::new(0.0, 0.0, -50.0), 40.0, 9);
    for sprite in sprites_at(&positions) {
        system.register_sprite(sprite).unwrap();
    }
    system.initialize(&mut backend);

    let camera = TestCamera::at_origin();
    backend.begin_frame(target(&ctx), Some(wgpu::Color::BLACK));
    system.prepare(&mut backend, &camera, VIEWPORT).unwrap();
    system.render(&mut backend).unwrap();
    backend.end_frame();

    let keys: Vec<f32> = positions.iter().map(|p| p.length_squared()).collect();
    let readback = system.read_back(&mut backend).unwrap();
    assert_eq!(readback.sorted_ids.len(), 1024);
    assert_permutation(&readback.sorted_ids);
    assert_sorted_by_key(&readback.sorted_ids[..1000], &keys, SortOrder::FrontToBack);
    assert_eq!(readback.draw_args.instance_count, readback.survivor_count);
}

#[test]
#[ignore] // Requires GPU
fn test_gpu_survivors_match_software() {
    let Some(ctx) = context() else { return };
    let positions = scattered(600, Vec3::new(10.0, 0.0, -80.0), 90.0, 5);
    let config = BatchConfig::new().half_extent(0.5);

    let mut gpu = WgpuSpriteBackend::new(ctx.clone(), FORMAT, small_textures());
    let mut gpu_system = SpriteRendererSystem::new(config.clone());
    let mut soft = SoftwareBackend::new();
    let mut soft_system = SpriteRendererSystem::new(config);
    for sprite in sprites_at(&positions) {
        gpu_system.register_sprite(sprite.clone()).unwrap();
        soft_system.register_sprite(sprite).unwrap();
    }
    gpu_system.initialize(&mut gpu);
    soft_system.initialize(&mut soft);

    let camera = TestCamera::at_origin();
    gpu.begin_frame(target(&ctx), None);
    gpu_system.prepare(&mut gpu, &camera, VIEWPORT).unwrap();
    gpu_system.render(&mut gpu).unwrap();
    gpu.end_frame();
    soft_system.prepare(&mut soft, &camera, VIEWPORT).unwrap();
    soft_system.render(&mut soft).unwrap();

    let gpu_readback = gpu_system.read_back(&mut gpu).unwrap();
    let soft_readback = soft_system.read_back(&mut soft).unwrap();
    assert_eq!(gpu_readback.survivor_count, soft_readback.survivor_count);
    assert_unique_ids(&gpu_readback.compacted);

    // Concurrent appends may interleave, so compare as sets.
    let mut gpu_ids = gpu_readback.compacted;
    let mut soft_ids = soft_readback.compacted;
    gpu_ids.sort_unstable();
    soft_ids.sort_unstable();
    assert_eq!(gpu_ids, soft_ids);
}

#[test]
#[ignore] // Requires GPU
fn test_gpu_empty_frame_draws_nothing() {
    let Some(ctx) = context() else { return };
    let mut backend = WgpuSpriteBackend::new(ctx.clone(), FORMAT, small_textures());
    let mut system = SpriteRendererSystem::new(BatchConfig::default());
    system.initialize(&mut backend);

    backend.begin_frame(target(&ctx), Some(wgpu::Color::TRANSPARENT));
    system.prepare(&mut backend, &TestCamera::at_origin(), VIEWPORT).unwrap();
    system.render(&mut backend).unwrap();
    backend.end_frame();

    let readback = system.read_back(&mut backend).unwrap();
    assert_eq!(readback.survivor_count, 0);
    assert_eq!(readback.draw_args.instance_count, 0);
}

#[test]
#[ignore] // Requires GPU
fn test_texture_table_allocation() {
    let Some(ctx) = context() else { return };
    let mut backend = WgpuSpriteBackend::new(ctx.clone(), FORMAT, small_textures());
    let texels = [255u8; 4 * 4 * 4];
    let queue = ctx.queue();
    let first = backend.textures_mut().allocate(queue, &texels).unwrap();
    let second = backend.textures_mut().allocate(queue, &texels).unwrap();
    assert_eq!(first.layer(), Some(0));
    assert_eq!(second.layer(), Some(1));
    assert!(backend.textures_mut().allocate(queue, &texels).is_err());
}
