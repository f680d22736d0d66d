//! Swarm Render
//!
//! wgpu device setup, cameras and the GPU-driven sprite pipeline.

pub mod camera;
pub mod compute;
pub mod context;
pub mod features;
pub mod indirect;
pub mod readback;
pub mod sprite;

pub use camera::{Camera, CameraSource, CameraUniform, ProjectionMode, Viewport};
pub use context::{GraphicsContext, GraphicsContextDescriptor, GraphicsError};
pub use features::GpuFeatures;
pub use indirect::{DrawIndexedIndirect, IndirectCommand};
pub use readback::ReadbackError;
pub use sprite::{
    BatchConfig, BillboardMode, CullMode, Frustum, SoftwareBackend, SortMode, SortOrder, Sprite,
    SpriteBatchRenderer, SpriteDesc, SpriteError, SpriteRegistry, SpriteRendererSystem,
    SpriteSource, TextureIndex, WgpuSpriteBackend,
};

pub use wgpu;
