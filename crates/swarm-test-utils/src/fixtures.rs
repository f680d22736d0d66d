//! Scene fixtures.

use std::sync::atomic::{AtomicUsize, Ordering};

use glam::{Mat4, Quat, Vec3};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use swarm_render::sprite::SpriteRef;
use swarm_render::{Camera, CameraSource, Sprite, SpriteDesc, Viewport};

/// [`CameraSource`] wrapper that counts view-projection requests.
pub struct TestCamera {
    camera: Camera,
    view_projection_calls: AtomicUsize,
}

impl TestCamera {
    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            view_projection_calls: AtomicUsize::new(0),
        }
    }

    /// 90 degree perspective at the origin looking down `-Z`, far plane at 1000.
    pub fn at_origin() -> Self {
        Self::new(Camera::perspective(90.0, 0.1, 1000.0))
    }

    pub fn looking_at(eye: Vec3, target: Vec3) -> Self {
        let mut camera = Camera::perspective(90.0, 0.1, 1000.0);
        camera.look_at(eye, target, Vec3::Y);
        Self::new(camera)
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn view_projection_calls(&self) -> usize {
        self.view_projection_calls.load(Ordering::Relaxed)
    }
}

impl CameraSource for TestCamera {
    fn world_position(&self) -> Vec3 {
        self.camera.world_position()
    }

    fn world_rotation(&self) -> Quat {
        self.camera.world_rotation()
    }

    fn view_projection(&self, viewport: Viewport) -> Mat4 {
        self.view_projection_calls.fetch_add(1, Ordering::Relaxed);
        self.camera.view_projection(viewport)
    }
}

/// One untextured sprite per position.
pub fn sprites_at(positions: &[Vec3]) -> Vec<SpriteRef> {
    positions
        .iter()
        .map(|&position| Sprite::new(SpriteDesc::at(position)) as SpriteRef)
        .collect()
}

/// `count` positions on a line in front of the origin camera, `spacing` apart along `-Z`.
pub fn line_in_front(count: usize, spacing: f32) -> Vec<Vec3> {
    (0..count)
        .map(|i| Vec3::new(0.0, 0.0, -(i as f32 + 1.0) * spacing))
        .collect()
}

/// Deterministic pseudo-random positions in a cube of half size `extent` around `center`.
pub fn scattered(count: usize, center: Vec3, extent: f32, seed: u64) -> Vec<Vec3> {
    let mut rng = Pcg32::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let offset = Vec3::new(
                rng.random_range(-1.0..=1.0),
                rng.random_range(-1.0..=1.0),
                rng.random_range(-1.0..=1.0),
            );
            center + offset * extent
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scattered_is_deterministic() {
        let a = scattered(16, Vec3::ZERO, 10.0, 7);
        let b = scattered(16, Vec3::ZERO, 10.0, 7);
        assert_eq!(a, b);
        assert!(a.iter().all(|p| p.abs().max_element() <= 10.0));
        assert_ne!(a, scattered(16, Vec3::ZERO, 10.0, 8));
    }

    #[test]
    fn test_camera_counts_frustum_requests() {
        let camera = TestCamera::at_origin();
        let viewport = Viewport::new(10.0, 10.0);
        camera.frustum(viewport);
        camera.frustum(viewport);
        assert_eq!(camera.view_projection_calls(), 2);
    }
}
