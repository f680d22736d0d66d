//! GPU-driven sprite batching.
//!
//! Every registered sprite is packed into one instance buffer, depth-sorted by a bitonic
//! network, frustum culled with atomic compaction, and drawn with a single indexed
//! indirect draw whose instance count never leaves the GPU.

pub mod backend;
pub mod config;
pub mod cull;
pub mod draw_args;
pub mod error;
pub mod frustum;
pub mod instance;
pub mod kernel;
pub mod registry;
pub mod renderer;
pub mod software;
pub mod sort;
pub mod system;
pub mod textures;
pub mod wgpu_backend;

pub use backend::{
    BufferDesc, BufferHandle, BufferReadback, BufferUsages, GpuBackend, ResourceState,
    SpriteBindings,
};
pub use config::{BatchConfig, CullMode, DEFAULT_HALF_EXTENT, DEFAULT_MAX_INSTANCES, SortMode};
pub use error::SpriteError;
pub use frustum::{Frustum, FrustumSide, Plane};
pub use instance::{BillboardMode, GpuSprite, Sprite, SpriteDesc, SpriteSource, TextureIndex};
pub use kernel::{Dispatch, DispatchGrid, Kernel, KernelParams};
pub use registry::{FrameSnapshot, SpriteRef, SpriteRegistry};
pub use renderer::{PipelineReadback, SpriteBatchRenderer, SpriteFrameStats};
pub use software::{BackendCall, Hazard, RecordedDraw, SoftwareBackend};
pub use sort::SortOrder;
pub use system::{SpriteComponent, SpriteLifecycle, SpriteRendererSystem};
pub use textures::{SpriteTextureArray, TextureError, TextureTableDesc};
pub use wgpu_backend::WgpuSpriteBackend;
