//! Camera with perspective or orthographic projection.
//!
//! Matrices follow wgpu conventions: right-handed view space looking down `-Z`, clip depth
//! in `[0, 1]`.
//!
//! ```
//! use swarm_render::{Camera, CameraSource, Viewport};
//! use glam::Vec3;
//!
//! let mut camera = Camera::perspective(60.0, 0.1, 5000.0);
//! camera.look_at(Vec3::new(0.0, 5.0, 10.0), Vec3::ZERO, Vec3::Y);
//!
//! let frustum = camera.frustum(Viewport::new(1280.0, 720.0));
//! assert!(frustum.contains_sphere(Vec3::ZERO, 1.0));
//! ```

use glam::{Mat3, Mat4, Quat, Vec3};

use crate::sprite::frustum::Frustum;

/// Projection mode for a camera. Aspect ratio comes from the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectionMode {
    Orthographic {
        /// Visible world height; width follows the viewport aspect.
        height: f32,
        near: f32,
        far: f32,
    },
    Perspective {
        fov_y_radians: f32,
        near: f32,
        far: f32,
    },
}

/// Screen rectangle a camera renders into, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub const fn new(width: f32, height: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
        }
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }
}

/// What the sprite pipeline needs from the active camera.
///
/// Editor and runtime cameras go through this one path.
pub trait CameraSource {
    fn world_position(&self) -> Vec3;

    /// Maps camera-local axes (`+X` right, `+Y` up, `+Z` towards the viewer) to world space.
    fn world_rotation(&self) -> Quat;

    fn view_projection(&self, viewport: Viewport) -> Mat4;

    /// The six clip planes for `viewport`, recomputed on every call.
    fn frustum(&self, viewport: Viewport) -> Frustum {
        Frustum::from_view_projection(self.view_projection(viewport))
    }
}

/// A free camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    position: Vec3,
    rotation: Quat,
    projection: ProjectionMode,
}

impl Camera {
    pub fn perspective(fov_y_degrees: f32, near: f32, far: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            projection: ProjectionMode::Perspective {
                fov_y_radians: fov_y_degrees.to_radians(),
                near,
                far,
            },
        }
    }

    pub fn orthographic(height: f32, near: f32, far: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            projection: ProjectionMode::Orthographic { height, near, far },
        }
    }

    /// Place the camera at `eye` facing `target`.
    ///
    /// Leaves the rotation untouched when `eye == target` or `up` is parallel to the view
    /// direction.
    pub fn look_at(&mut self, eye: Vec3, target: Vec3, up: Vec3) {
        self.position = eye;
        let Some(forward) = (target - eye).try_normalize() else {
            return;
        };
        let Some(right) = forward.cross(up).try_normalize() else {
            return;
        };
        let up = right.cross(forward);
        self.rotation = Quat::from_mat3(&Mat3::from_cols(right, up, -forward));
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation.normalize();
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn set_projection(&mut self, projection: ProjectionMode) {
        self.projection = projection;
    }

    pub fn projection(&self) -> ProjectionMode {
        self.projection
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position).inverse()
    }

    pub fn projection_matrix(&self, viewport: Viewport) -> Mat4 {
        let aspect = viewport.aspect_ratio();
        match self.projection {
            ProjectionMode::Orthographic { height, near, far } => {
                let half_h = height * 0.5;
                let half_w = half_h * aspect;
                Mat4::orthographic_rh(-half_w, half_w, -half_h, half_h, near, far)
            }
            ProjectionMode::Perspective {
                fov_y_radians,
                near,
                far,
            } => Mat4::perspective_rh(fov_y_radians, aspect, near, far),
        }
    }

    /// Rotation-only matrix that turns a quad in the camera's XY plane to face the viewer.
    pub fn billboard_matrix(&self) -> Mat4 {
        Mat4::from_quat(self.rotation)
    }
}

impl CameraSource for Camera {
    fn world_position(&self) -> Vec3 {
        self.position
    }

    fn world_rotation(&self) -> Quat {
        self.rotation
    }

    fn view_projection(&self, viewport: Viewport) -> Mat4 {
        self.projection_matrix(viewport) * self.view_matrix()
    }
}

/// Camera block bound to the sprite shading stage.
///
/// ```wgsl
/// struct Camera {
///     view_proj: mat4x4<f32>,
///     billboard: mat4x4<f32>,
///     position: vec3<f32>,
///     half_extent: f32,
/// }
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    /// Camera rotation, used to orient billboards regardless of sprite rotation.
    pub billboard: [[f32; 4]; 4],
    pub position: [f32; 3],
    /// Half the quad edge length in world units.
    pub half_extent: f32,
}

impl CameraUniform {
    pub fn new(camera: &dyn CameraSource, viewport: Viewport, half_extent: f32) -> Self {
        Self {
            view_proj: camera.view_projection(viewport).to_cols_array_2d(),
            billboard: Mat4::from_quat(camera.world_rotation()).to_cols_array_2d(),
            position: camera.world_position().to_array(),
            half_extent,
        }
    }
}

static_assertions::assert_eq_size!(CameraUniform, [f32; 36]);
