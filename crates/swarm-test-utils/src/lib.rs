//! Test utilities for the swarm sprite pipeline.
//!
//! Fixtures build small scenes, [`TestCamera`] records how often the pipeline asks for
//! its matrices, and the assertion helpers check the ordering and uniqueness properties
//! every frame must satisfy.
//!
//! ```rust
//! use swarm_render::{BatchConfig, SoftwareBackend, SpriteRendererSystem, Viewport};
//! use swarm_test_utils::{TestCamera, sprites_at};
//! use glam::Vec3;
//!
//! let mut backend = SoftwareBackend::new();
//! let mut system = SpriteRendererSystem::new(BatchConfig::default());
//! for sprite in sprites_at(&[Vec3::new(0.0, 0.0, -10.0)]) {
//!     system.register_sprite(sprite).unwrap();
//! }
//! system.initialize(&mut backend);
//!
//! let camera = TestCamera::at_origin();
//! system.prepare(&mut backend, &camera, Viewport::new(64.0, 64.0)).unwrap();
//! system.render(&mut backend).unwrap();
//! assert_eq!(backend.last_draw().unwrap().args.instance_count, 1);
//! ```

pub mod assertions;
pub mod fixtures;
pub mod lifecycle;

pub use assertions::*;
pub use fixtures::*;
pub use lifecycle::*;
