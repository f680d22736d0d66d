//! View-frustum planes and the conservative sphere test shared by the CPU and GPU cull paths.

use glam::{Mat4, Vec3, Vec4};

/// `dot(normal, p) + distance`, positive on the inside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    pub const fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal, distance }
    }

    /// Normalize `(a, b, c, d)` so the signed distance is in world units.
    ///
    /// A zero normal (degenerate projection) is kept as is and accepts everything.
    pub fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = coefficients.truncate();
        let length = normal.length();
        if length > f32::EPSILON {
            Self::new(normal / length, coefficients.w / length)
        } else {
            Self::new(Vec3::ZERO, 0.0)
        }
    }

    /// The same plane facing the other way. Turns an outward-facing plane into an inward one.
    pub fn flipped(self) -> Self {
        Self::new(-self.normal, -self.distance)
    }

    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }

    pub fn to_gpu(self) -> [f32; 4] {
        self.normal.extend(self.distance).to_array()
    }
}

/// Index of each plane in [`Frustum::planes`] and in the GPU plane buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum FrustumSide {
    Left = 0,
    Right = 1,
    Top = 2,
    Bottom = 3,
    Far = 4,
    Near = 5,
}

/// Six inward-facing planes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Gribb-Hartmann extraction for a wgpu-style projection (clip depth in `[0, w]`).
    pub fn from_view_projection(m: Mat4) -> Self {
        let (r0, r1, r2, r3) = (m.row(0), m.row(1), m.row(2), m.row(3));
        Self {
            planes: [
                Plane::from_coefficients(r3 + r0),
                Plane::from_coefficients(r3 - r0),
                Plane::from_coefficients(r3 - r1),
                Plane::from_coefficients(r3 + r1),
                Plane::from_coefficients(r3 - r2),
                Plane::from_coefficients(r2),
            ],
        }
    }

    pub fn plane(&self, side: FrustumSide) -> Plane {
        self.planes[side as usize]
    }

    /// Conservative: rejects only spheres provably outside one plane (`s < -radius`).
    /// Spheres straddling a boundary are kept.
    pub fn contains_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(center) >= -radius)
    }

    /// Whether the sphere reaches the positive side of the near plane.
    pub fn sphere_in_front(&self, center: Vec3, radius: f32) -> bool {
        self.plane(FrustumSide::Near).signed_distance(center) >= -radius
    }

    pub fn to_gpu(&self) -> [[f32; 4]; 6] {
        self.planes.map(Plane::to_gpu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn looking_down_neg_z() -> Frustum {
        let proj = Mat4::perspective_rh(90f32.to_radians(), 1.0, 1.0, 100.0);
        Frustum::from_view_projection(proj)
    }

    #[test]
    fn test_planes_are_normalized_and_inward() {
        let frustum = looking_down_neg_z();
        for plane in frustum.planes {
            assert!((plane.normal.length() - 1.0).abs() < 1e-5);
            assert!(plane.signed_distance(Vec3::new(0.0, 0.0, -50.0)) > 0.0);
        }
    }

    #[test]
    fn test_near_and_far_distances() {
        let frustum = looking_down_neg_z();
        let near = frustum.plane(FrustumSide::Near);
        let far = frustum.plane(FrustumSide::Far);
        assert!(near.signed_distance(Vec3::new(0.0, 0.0, -1.0)).abs() < 1e-4);
        assert!(far.signed_distance(Vec3::new(0.0, 0.0, -100.0)).abs() < 1e-3);
        assert!(near.normal.abs_diff_eq(Vec3::NEG_Z, 1e-5));
        assert!(far.normal.abs_diff_eq(Vec3::Z, 1e-5));
    }

    #[test]
    fn test_side_planes_for_90_degree_fov() {
        let frustum = looking_down_neg_z();
        let left = frustum.plane(FrustumSide::Left);
        let top = frustum.plane(FrustumSide::Top);
        // At depth 10 the half-width is 10.
        assert!(left.signed_distance(Vec3::new(-10.0, 0.0, -10.0)).abs() < 1e-4);
        assert!(top.signed_distance(Vec3::new(0.0, 10.0, -10.0)).abs() < 1e-4);
        assert!(left.normal.x > 0.0);
        assert!(top.normal.y < 0.0);
    }

    #[test]
    fn test_sphere_test_is_conservative() {
        let frustum = looking_down_neg_z();
        let radius = 2.0;
        // Centre just outside the left plane, still within one radius.
        let straddling = Vec3::new(-11.0, 0.0, -10.0);
        assert!(frustum.plane(FrustumSide::Left).signed_distance(straddling) < 0.0);
        assert!(frustum.contains_sphere(straddling, radius));
        // Clearly outside on the left.
        assert!(!frustum.contains_sphere(Vec3::new(-30.0, 0.0, -10.0), radius));
        // Behind the camera.
        assert!(!frustum.contains_sphere(Vec3::new(0.0, 0.0, 10.0), radius));
        assert!(!frustum.sphere_in_front(Vec3::new(0.0, 0.0, 10.0), radius));
    }

    #[test]
    fn test_flipped_plane() {
        let plane = Plane::new(Vec3::X, 3.0);
        let point = Vec3::new(1.0, 4.0, 0.0);
        assert_eq!(plane.flipped().signed_distance(point), -plane.signed_distance(point));
    }
}
