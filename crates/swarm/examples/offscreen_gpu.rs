//! Offscreen GPU Example
//!
//! Draws a grid of textured sprites into an offscreen texture with the wgpu backend, then
//! reads the pipeline buffers back and prints how many sprites survived culling.
//!
//! Run with: cargo run --example offscreen_gpu

use swarm::prelude::*;

const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    swarm::core::logging::init();

    let context = GraphicsContext::new_owned_sync()?;
    let info = context.info();
    tracing::info!(adapter = %info.name, backend = ?info.backend, "device ready");

    let table = TextureTableDesc::default();
    let mut backend = WgpuSpriteBackend::new(context.clone(), FORMAT, table);
    let checker: Vec<u8> = (0..table.size * table.size)
        .flat_map(|i| {
            let (x, y) = (i % table.size, i / table.size);
            if (x / 32 + y / 32) % 2 == 0 {
                [255, 255, 255, 255]
            } else {
                [40, 40, 40, 255]
            }
        })
        .collect();
    let texture = backend.textures_mut().allocate(context.queue(), &checker)?;

    let mut system = SpriteRendererSystem::new(BatchConfig::new().half_extent(0.4));
    for x in -20..20 {
        for y in -20..20 {
            let position = Vec3::new(x as f32, y as f32, -30.0 - (x + y) as f32 * 0.25);
            system.register_sprite(Sprite::new(SpriteDesc {
                color_texture: texture,
                ..SpriteDesc::at(position)
            }))?;
        }
    }
    system.initialize(&mut backend);

    let viewport = Viewport::new(512.0, 512.0);
    let target = context.device().create_texture(&wgpu::TextureDescriptor {
        label: Some("offscreen_target"),
        size: wgpu::Extent3d {
            width: viewport.width as u32,
            height: viewport.height as u32,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });

    let camera = Camera::perspective(60.0, 0.1, 200.0);
    backend.begin_frame(
        target.create_view(&wgpu::TextureViewDescriptor::default()),
        Some(wgpu::Color::BLACK),
    );
    let stats = system.prepare(&mut backend, &camera, viewport)?;
    system.render(&mut backend)?;
    backend.end_frame();

    let readback = system.read_back(&mut backend)?;
    println!(
        "{} of {} sprites survived culling ({} dispatches, {} barriers)",
        readback.survivor_count, stats.live_instances, stats.dispatches, stats.barriers
    );

    system.shutdown(&mut backend);
    Ok(())
}
