//! Headless Swarm Example
//!
//! Animates a few thousand sprites orbiting the origin and runs the whole pipeline on the
//! software backend, logging per-frame statistics.
//!
//! Run with: RUST_LOG=debug cargo run --example headless_swarm

use std::sync::Arc;

use swarm::core::profiling::{ProfilingBackend, init_profiling, new_frame};
use swarm::prelude::*;

const SPRITES: usize = 4_000;
const FRAMES: u32 = 120;

fn main() -> Result<(), SpriteError> {
    swarm::core::logging::init();
    init_profiling(ProfilingBackend::PuffinHttp);

    let mut backend = SoftwareBackend::new();
    let mut system =
        SpriteRendererSystem::new(BatchConfig::new().half_extent(1.0).initial_capacity(256));

    let mut sprites: Vec<Arc<Sprite>> = Vec::with_capacity(SPRITES);
    for i in 0..SPRITES {
        let sprite = Sprite::new(SpriteDesc {
            tint: Vec3::new((i % 7) as f32 / 7.0, 0.5, 1.0),
            ..SpriteDesc::at(orbit(i, 0.0))
        });
        system.register_sprite(sprite.clone())?;
        sprites.push(sprite);
    }
    system.initialize(&mut backend);

    let mut camera = Camera::perspective(60.0, 0.1, 500.0);
    camera.look_at(Vec3::new(0.0, 40.0, 120.0), Vec3::ZERO, Vec3::Y);
    let viewport = Viewport::new(1280.0, 720.0);

    for frame in 0..FRAMES {
        new_frame();
        let t = frame as f32 / 60.0;
        for (i, sprite) in sprites.iter().enumerate() {
            sprite.set_position(orbit(i, t));
        }

        backend.clear_log();
        let stats = system.prepare(&mut backend, &camera, viewport)?;
        system.render(&mut backend)?;

        let drawn = backend
            .last_draw()
            .map(|draw| draw.args.instance_count)
            .unwrap_or(0);
        if frame % 30 == 0 {
            tracing::info!(
                frame,
                live = stats.live_instances,
                drawn,
                dispatches = stats.dispatches,
                barriers = stats.barriers,
                "frame"
            );
        }
        if !backend.hazards().is_empty() {
            tracing::error!(hazards = ?backend.hazards(), "pipeline hazards");
        }
    }

    system.shutdown(&mut backend);
    Ok(())
}

/// Sprite `i` on one of several tilted rings at time `t`.
fn orbit(i: usize, t: f32) -> Vec3 {
    let ring = (i % 8) as f32;
    let radius = 20.0 + ring * 12.0;
    let angle = i as f32 * 0.618_034 * std::f32::consts::TAU + t / (1.0 + ring);
    let height = (angle * 3.0).sin() * ring;
    Vec3::new(angle.cos() * radius, height, angle.sin() * radius)
}
