//! Swarm - GPU-driven sprite batching
//!
//! Every registered sprite is drawn by one indexed indirect draw. Each frame the
//! instances are packed into a storage buffer, depth-sorted by a bitonic network,
//! frustum culled into a compacted id list, and the survivor count is turned into draw
//! arguments on the GPU.
//!
//! # Quick Start
//!
//! ```no_run
//! use swarm::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! swarm::core::logging::init();
//!
//! let context = GraphicsContext::new_owned_sync()?;
//! let mut backend = WgpuSpriteBackend::new(
//!     context.clone(),
//!     wgpu::TextureFormat::Bgra8UnormSrgb,
//!     TextureTableDesc::default(),
//! );
//!
//! let mut sprites = SpriteRendererSystem::new(BatchConfig::default());
//! let sprite = Sprite::new(SpriteDesc::at(Vec3::new(0.0, 0.0, -10.0)));
//! sprites.register_sprite(sprite.clone())?;
//! sprites.initialize(&mut backend);
//!
//! let camera = Camera::perspective(60.0, 0.1, 1000.0);
//! # let surface_view: wgpu::TextureView = unimplemented!();
//! backend.begin_frame(surface_view, Some(wgpu::Color::BLACK));
//! sprites.prepare(&mut backend, &camera, Viewport::new(1280.0, 720.0))?;
//! sprites.render(&mut backend)?;
//! backend.end_frame();
//! # Ok(())
//! # }
//! ```
//!
//! # Backends
//!
//! - [`WgpuSpriteBackend`](render::WgpuSpriteBackend) runs the WGSL kernels on a device.
//! - [`SoftwareBackend`](render::SoftwareBackend) runs the same kernel bodies on the CPU
//!   and records resource-state hazards, for tests and headless tools.

pub use swarm_core as core;
pub use swarm_render as render;
pub use swarm_render::wgpu;

/// Prelude module for convenient imports
pub mod prelude {
    pub use swarm_core::glam::{Mat4, Quat, Vec2, Vec3, Vec4};

    pub use swarm_render::sprite::{
        GpuBackend, SpriteComponent, SpriteFrameStats, SpriteLifecycle, TextureTableDesc,
    };
    pub use swarm_render::{
        BatchConfig, BillboardMode, Camera, CameraSource, CullMode, GraphicsContext,
        GraphicsContextDescriptor, SoftwareBackend, SortMode, SortOrder, Sprite, SpriteDesc,
        SpriteError, SpriteRendererSystem, SpriteSource, TextureIndex, Viewport,
        WgpuSpriteBackend,
    };

    pub use swarm_render::wgpu;
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_profiling_feature_forwards_to_core() {
        assert_eq!(
            crate::core::profiling::PROFILING_ENABLED,
            cfg!(feature = "profiling")
        );
    }
}
