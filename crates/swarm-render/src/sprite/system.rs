//! Host-facing entry point for sprite rendering.

use std::sync::Arc;

use super::backend::{BufferReadback, GpuBackend};
use super::config::BatchConfig;
use super::error::SpriteError;
use super::instance::{Sprite, SpriteDesc};
use super::registry::{SpriteRef, SpriteRegistry};
use super::renderer::{PipelineReadback, SpriteBatchRenderer, SpriteFrameStats};
use crate::camera::{CameraSource, Viewport};

/// Registry plus the batch renderer, created lazily by [`initialize`](Self::initialize).
///
/// Sprites can be registered before the GPU side exists; they are drawn from the first
/// prepared frame after initialization.
pub struct SpriteRendererSystem {
    config: BatchConfig,
    registry: SpriteRegistry,
    renderer: Option<SpriteBatchRenderer>,
}

impl SpriteRendererSystem {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            registry: SpriteRegistry::new(config.max_instances),
            config,
            renderer: None,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn registry(&self) -> &SpriteRegistry {
        &self.registry
    }

    pub fn renderer(&self) -> Option<&SpriteBatchRenderer> {
        self.renderer.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.renderer.is_some()
    }

    /// Create the GPU buffers. Calling it again is a no-op.
    pub fn initialize<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        if self.renderer.is_some() {
            tracing::debug!("sprite renderer already initialized");
            return;
        }
        self.renderer = Some(SpriteBatchRenderer::new(backend, self.config.clone()));
        tracing::info!(
            registered = self.registry.len(),
            max_instances = self.config.max_instances,
            "sprite renderer initialized"
        );
    }

    pub fn register_sprite(&mut self, sprite: SpriteRef) -> Result<(), SpriteError> {
        self.registry.add(sprite)
    }

    /// Returns how many references were removed.
    pub fn unregister_sprite(&mut self, sprite: &SpriteRef) -> usize {
        self.registry.remove(sprite)
    }

    pub fn prepare<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        camera: &dyn CameraSource,
        viewport: Viewport,
    ) -> Result<SpriteFrameStats, SpriteError> {
        let renderer = self.renderer.as_mut().ok_or(SpriteError::NotInitialized)?;
        renderer.prepare(backend, &self.registry, camera, viewport)
    }

    pub fn render<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) -> Result<(), SpriteError> {
        self.renderer
            .as_mut()
            .ok_or(SpriteError::NotInitialized)?
            .render(backend)
    }

    pub fn read_back<B: GpuBackend + BufferReadback + ?Sized>(
        &self,
        backend: &mut B,
    ) -> Result<PipelineReadback, SpriteError> {
        self.renderer
            .as_ref()
            .ok_or(SpriteError::NotInitialized)?
            .read_back(backend)
    }

    /// Release the GPU buffers. Registered sprites are kept.
    pub fn shutdown<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        if let Some(renderer) = self.renderer.take() {
            renderer.release(backend);
        }
    }
}

/// Hooks a host calls when a sprite-carrying object enters or leaves the scene.
pub trait SpriteLifecycle {
    fn on_activate(&mut self, system: &mut SpriteRendererSystem) -> Result<(), SpriteError>;
    fn on_deactivate(&mut self, system: &mut SpriteRendererSystem);
}

/// Scene component owning one sprite. Registers itself while active.
#[derive(Debug)]
pub struct SpriteComponent {
    sprite: Arc<Sprite>,
    active: bool,
}

impl SpriteComponent {
    pub fn new(desc: SpriteDesc) -> Self {
        Self {
            sprite: Sprite::new(desc),
            active: false,
        }
    }

    pub fn sprite(&self) -> &Arc<Sprite> {
        &self.sprite
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    fn source(&self) -> SpriteRef {
        self.sprite.clone()
    }
}

impl SpriteLifecycle for SpriteComponent {
    fn on_activate(&mut self, system: &mut SpriteRendererSystem) -> Result<(), SpriteError> {
        if self.active {
            return Ok(());
        }
        system.register_sprite(self.source())?;
        self.active = true;
        Ok(())
    }

    fn on_deactivate(&mut self, system: &mut SpriteRendererSystem) {
        if !self.active {
            return;
        }
        system.unregister_sprite(&self.source());
        self.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::sprite::software::SoftwareBackend;
    use glam::Vec3;

    #[test]
    fn test_prepare_before_initialize_fails() {
        let mut backend = SoftwareBackend::new();
        let mut system = SpriteRendererSystem::new(BatchConfig::default());
        let err = system
            .prepare(&mut backend, &Camera::perspective(60.0, 0.1, 100.0), Viewport::new(8.0, 8.0))
            .unwrap_err();
        assert!(matches!(err, SpriteError::NotInitialized));
        assert!(matches!(
            system.render(&mut backend),
            Err(SpriteError::NotInitialized)
        ));
    }

    #[test]
    fn test_registration_before_initialize_is_drawn() {
        let mut backend = SoftwareBackend::new();
        let mut system = SpriteRendererSystem::new(BatchConfig::default());
        let mut component = SpriteComponent::new(SpriteDesc::at(Vec3::new(0.0, 0.0, -10.0)));
        component.on_activate(&mut system).unwrap();
        component.on_activate(&mut system).unwrap();
        assert_eq!(system.registry().len(), 1);

        system.initialize(&mut backend);
        system.initialize(&mut backend);
        let stats = system
            .prepare(&mut backend, &Camera::perspective(60.0, 0.1, 100.0), Viewport::new(8.0, 8.0))
            .unwrap();
        assert_eq!(stats.live_instances, 1);
        system.render(&mut backend).unwrap();
        assert_eq!(backend.last_draw().map(|d| d.args.instance_count), Some(1));

        component.on_deactivate(&mut system);
        assert!(system.registry().is_empty());
        assert!(!component.is_active());
    }

    #[test]
    fn test_shutdown_releases_buffers() {
        let mut backend = SoftwareBackend::new();
        let mut system = SpriteRendererSystem::new(BatchConfig::default());
        system.initialize(&mut backend);
        assert_eq!(backend.buffer_count(), 9);
        system.shutdown(&mut backend);
        assert_eq!(backend.buffer_count(), 0);
        assert!(!system.is_initialized());
    }
}
