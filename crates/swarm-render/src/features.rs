//! GPU feature negotiation.
//!
//! The sprite pipeline itself runs on core WebGPU (indirect draws with `first_instance == 0`,
//! storage buffers, atomics), so nothing here is required by default. The flags cover the
//! optional extras a host may ask for when creating the [`GraphicsContext`](crate::GraphicsContext).

use bitflags::bitflags;

bitflags! {
    /// Optional GPU features that can be required or requested.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GpuFeatures: u32 {
        /// Non-zero `first_instance` in indirect draws.
        const INDIRECT_FIRST_INSTANCE = 1 << 0;
        /// Timestamp queries on pass boundaries, for GPU stage timing.
        const TIMESTAMP_QUERY = 1 << 1;
        /// Timestamp writes inside command encoders.
        const TIMESTAMP_QUERY_INSIDE_ENCODERS = 1 << 2;
        /// Push constants, used instead of dynamic uniform offsets when present.
        const PUSH_CONSTANTS = 1 << 3;
    }
}

const MAPPING: &[(GpuFeatures, wgpu::Features)] = &[
    (
        GpuFeatures::INDIRECT_FIRST_INSTANCE,
        wgpu::Features::INDIRECT_FIRST_INSTANCE,
    ),
    (GpuFeatures::TIMESTAMP_QUERY, wgpu::Features::TIMESTAMP_QUERY),
    (
        GpuFeatures::TIMESTAMP_QUERY_INSIDE_ENCODERS,
        wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS,
    ),
    (GpuFeatures::PUSH_CONSTANTS, wgpu::Features::PUSH_CONSTANTS),
];

impl GpuFeatures {
    /// Convert to wgpu::Features.
    pub fn to_wgpu(self) -> wgpu::Features {
        MAPPING
            .iter()
            .filter(|(ours, _)| self.contains(*ours))
            .fold(wgpu::Features::empty(), |acc, (_, theirs)| acc | *theirs)
    }

    /// Convert from wgpu::Features, dropping features without a flag here.
    pub fn from_wgpu(features: wgpu::Features) -> Self {
        MAPPING
            .iter()
            .filter(|(_, theirs)| features.contains(*theirs))
            .fold(GpuFeatures::empty(), |acc, (ours, _)| acc | *ours)
    }

    /// The subset of `self` the adapter does not support.
    pub fn missing_on(self, adapter: &wgpu::Adapter) -> GpuFeatures {
        self - GpuFeatures::from_wgpu(adapter.features())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_features_empty() {
        assert_eq!(GpuFeatures::empty().to_wgpu(), wgpu::Features::empty());
    }

    #[test]
    fn test_gpu_features_roundtrip() {
        let features = GpuFeatures::all();
        assert_eq!(GpuFeatures::from_wgpu(features.to_wgpu()), features);
    }

    #[test]
    fn test_unknown_wgpu_features_dropped() {
        let wgpu_features = wgpu::Features::TIMESTAMP_QUERY | wgpu::Features::SHADER_F16;
        assert_eq!(GpuFeatures::from_wgpu(wgpu_features), GpuFeatures::TIMESTAMP_QUERY);
    }
}
