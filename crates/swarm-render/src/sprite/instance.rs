//! Sprite instances: the host-facing data source and the packed GPU record.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};
use parking_lot::RwLock;

/// How the vertex stage orients a sprite's quad.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BillboardMode {
    /// Face the camera on both axes.
    #[default]
    Always = 0,
    /// Rotate about world Y only.
    YOnly = 1,
    /// Use the sprite's own rotation.
    None = 2,
}

/// Layer handle into the sprite texture table. [`TextureIndex::NONE`] draws untextured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct TextureIndex(pub i32);

impl TextureIndex {
    pub const NONE: Self = Self(-1);

    pub fn new(layer: u32) -> Self {
        Self(i32::try_from(layer).unwrap_or(-1))
    }

    pub fn layer(self) -> Option<u32> {
        u32::try_from(self.0).ok()
    }

    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl Default for TextureIndex {
    fn default() -> Self {
        Self::NONE
    }
}

/// Everything the pipeline pulls from a sprite once per frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpriteDesc {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub color_texture: TextureIndex,
    pub normal_texture: TextureIndex,
    pub tint: Vec3,
    pub alpha: f32,
    pub billboard: BillboardMode,
}

impl Default for SpriteDesc {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            color_texture: TextureIndex::NONE,
            normal_texture: TextureIndex::NONE,
            tint: Vec3::ONE,
            alpha: 1.0,
            billboard: BillboardMode::Always,
        }
    }
}

impl SpriteDesc {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Pack into the GPU record.
    ///
    /// Billboarded sprites keep translation and scale only; the camera supplies the
    /// orientation in the vertex stage.
    pub fn pack(&self) -> GpuSprite {
        let rotation = match self.billboard {
            BillboardMode::None => self.rotation,
            BillboardMode::Always | BillboardMode::YOnly => Quat::IDENTITY,
        };
        let transform = Mat4::from_scale_rotation_translation(self.scale, rotation, self.position);
        GpuSprite {
            transform: transform.to_cols_array_2d(),
            tint: self.tint.extend(self.alpha.clamp(0.0, 1.0)).to_array(),
            color_texture: self.color_texture.0,
            normal_texture: self.normal_texture.0,
            billboard: self.billboard as u32,
            _pad: 0,
        }
    }
}

/// Per-instance data source, implemented by whatever the host uses to represent a sprite.
pub trait SpriteSource: Send + Sync {
    fn desc(&self) -> SpriteDesc;

    fn world_position(&self) -> Vec3 {
        self.desc().position
    }
}

/// Stock [`SpriteSource`], shareable between the host and the registry.
#[derive(Debug, Default)]
pub struct Sprite {
    desc: RwLock<SpriteDesc>,
}

impl Sprite {
    pub fn new(desc: SpriteDesc) -> Arc<Self> {
        Arc::new(Self {
            desc: RwLock::new(desc),
        })
    }

    pub fn set_position(&self, position: Vec3) {
        self.desc.write().position = position;
    }

    pub fn set_tint(&self, tint: Vec3, alpha: f32) {
        let mut desc = self.desc.write();
        desc.tint = tint;
        desc.alpha = alpha;
    }

    pub fn update(&self, f: impl FnOnce(&mut SpriteDesc)) {
        f(&mut self.desc.write());
    }
}

impl SpriteSource for Sprite {
    fn desc(&self) -> SpriteDesc {
        *self.desc.read()
    }

    fn world_position(&self) -> Vec3 {
        self.desc.read().position
    }
}

/// One entry of the packed instance buffer.
///
/// ```wgsl
/// struct Sprite {
///     transform: mat4x4<f32>,
///     tint: vec4<f32>,
///     color_texture: i32,
///     normal_texture: i32,
///     billboard: u32,
///     _pad: u32,
/// }
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuSprite {
    pub transform: [[f32; 4]; 4],
    pub tint: [f32; 4],
    pub color_texture: i32,
    pub normal_texture: i32,
    pub billboard: u32,
    pub _pad: u32,
}

impl GpuSprite {
    pub fn position(&self) -> Vec3 {
        let [x, y, z, _] = self.transform[3];
        Vec3::new(x, y, z)
    }
}

static_assertions::assert_eq_size!(GpuSprite, [u8; 96]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_billboard_pack_drops_rotation() {
        let desc = SpriteDesc {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_z(1.0),
            scale: Vec3::new(2.0, 3.0, 1.0),
            ..Default::default()
        };
        let packed = desc.pack();
        assert_eq!(packed.position(), desc.position);
        assert_eq!(packed.transform[0], [2.0, 0.0, 0.0, 0.0]);
        assert_eq!(packed.transform[1], [0.0, 3.0, 0.0, 0.0]);
        assert_eq!(packed.billboard, BillboardMode::Always as u32);
    }

    #[test]
    fn test_fixed_pack_keeps_rotation() {
        let rotation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let desc = SpriteDesc {
            rotation,
            billboard: BillboardMode::None,
            ..Default::default()
        };
        let transform = Mat4::from_cols_array_2d(&desc.pack().transform);
        assert!((transform * glam::Vec4::X).truncate().abs_diff_eq(Vec3::NEG_Z, 1e-5));
    }

    #[test]
    fn test_texture_sentinel() {
        let packed = SpriteDesc::default().pack();
        assert_eq!(packed.color_texture, -1);
        assert_eq!(packed.normal_texture, -1);
        assert_eq!(TextureIndex::new(4).layer(), Some(4));
        assert_eq!(TextureIndex::NONE.layer(), None);
    }

    #[test]
    fn test_alpha_clamped() {
        let desc = SpriteDesc {
            tint: Vec3::new(0.5, 0.25, 1.0),
            alpha: 1.5,
            ..Default::default()
        };
        assert_eq!(desc.pack().tint, [0.5, 0.25, 1.0, 1.0]);
    }

    #[test]
    fn test_sprite_updates_visible_through_source() {
        let sprite = Sprite::new(SpriteDesc::default());
        sprite.set_position(Vec3::splat(4.0));
        sprite.update(|desc| desc.billboard = BillboardMode::YOnly);
        let desc = sprite.desc();
        assert_eq!(sprite.world_position(), Vec3::splat(4.0));
        assert_eq!(desc.billboard, BillboardMode::YOnly);
    }
}
