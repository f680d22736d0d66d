//! Layered texture table addressed by [`TextureIndex`].
//!
//! Every sprite texture lives in one `texture_2d_array`, so a single bind group serves the
//! whole batch and the shader picks a layer per instance. Index `-1` means no texture.

use swarm_core::profiling::profile_function;

use super::instance::TextureIndex;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TextureError {
    #[error("texture table is full ({layers} layers)")]
    TableFull { layers: u32 },
    #[error("layer {layer} out of range for a table of {layers} layers")]
    LayerOutOfRange { layer: u32, layers: u32 },
    #[error("expected {expected} bytes of RGBA8 data, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Square RGBA8 layers of one fixed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureTableDesc {
    pub size: u32,
    pub layers: u32,
}

impl Default for TextureTableDesc {
    fn default() -> Self {
        Self {
            size: 256,
            layers: 16,
        }
    }
}

impl TextureTableDesc {
    pub fn layer_bytes(&self) -> usize {
        self.size as usize * self.size as usize * 4
    }

    /// Validate an upload of `len` bytes into `layer`.
    pub fn check_upload(&self, layer: u32, len: usize) -> Result<(), TextureError> {
        if layer >= self.layers {
            return Err(TextureError::LayerOutOfRange {
                layer,
                layers: self.layers,
            });
        }
        if len != self.layer_bytes() {
            return Err(TextureError::SizeMismatch {
                expected: self.layer_bytes(),
                actual: len,
            });
        }
        Ok(())
    }
}

pub struct SpriteTextureArray {
    desc: TextureTableDesc,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    next_layer: u32,
}

impl SpriteTextureArray {
    pub fn new(device: &wgpu::Device, desc: TextureTableDesc) -> Self {
        let desc = TextureTableDesc {
            size: desc.size.max(1),
            layers: desc.layers.max(1),
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("sprite_texture_table"),
            size: wgpu::Extent3d {
                width: desc.size,
                height: desc.size,
                depth_or_array_layers: desc.layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("sprite_texture_table_view"),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("sprite_texture_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self {
            desc,
            texture,
            view,
            sampler,
            next_layer: 0,
        }
    }

    pub fn desc(&self) -> TextureTableDesc {
        self.desc
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    /// Layers handed out by [`allocate`](Self::allocate).
    pub fn allocated(&self) -> u32 {
        self.next_layer
    }

    /// Upload `rgba` into the next free layer.
    pub fn allocate(
        &mut self,
        queue: &wgpu::Queue,
        rgba: &[u8],
    ) -> Result<TextureIndex, TextureError> {
        if self.next_layer >= self.desc.layers {
            return Err(TextureError::TableFull {
                layers: self.desc.layers,
            });
        }
        let index = self.upload_layer(queue, self.next_layer, rgba)?;
        self.next_layer += 1;
        Ok(index)
    }

    /// Overwrite one layer with tightly packed RGBA8 texels.
    pub fn upload_layer(
        &self,
        queue: &wgpu::Queue,
        layer: u32,
        rgba: &[u8],
    ) -> Result<TextureIndex, TextureError> {
        profile_function!();
        self.desc.check_upload(layer, rgba.len())?;
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: layer,
                },
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * self.desc.size),
                rows_per_image: Some(self.desc.size),
            },
            wgpu::Extent3d {
                width: self.desc.size,
                height: self.desc.size,
                depth_or_array_layers: 1,
            },
        );
        tracing::debug!(layer, size = self.desc.size, "sprite texture layer uploaded");
        Ok(TextureIndex::new(layer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_validation() {
        let desc = TextureTableDesc { size: 2, layers: 3 };
        assert_eq!(desc.layer_bytes(), 16);
        assert!(desc.check_upload(2, 16).is_ok());
        assert_eq!(
            desc.check_upload(3, 16),
            Err(TextureError::LayerOutOfRange { layer: 3, layers: 3 })
        );
        assert_eq!(
            desc.check_upload(0, 12),
            Err(TextureError::SizeMismatch {
                expected: 16,
                actual: 12
            })
        );
    }
}
