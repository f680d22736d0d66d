use super::sort::SortOrder;

/// Sprites the pipeline accepts before registration starts failing.
pub const DEFAULT_MAX_INSTANCES: u32 = 25_000;

/// Half the edge length of the sprite quad in world units.
pub const DEFAULT_HALF_EXTENT: f32 = 200.0;

/// Where the sort stage runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortMode {
    /// Bitonic network in compute dispatches.
    #[default]
    Gpu,
    /// Same network on the CPU, uploaded as the sorted id buffer.
    Cpu,
    /// Registration order.
    None,
}

/// Where the frustum cull runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CullMode {
    /// Sphere test and atomic compaction in a compute dispatch.
    #[default]
    Gpu,
    /// Same test on the CPU; compacted ids and draw arguments are uploaded.
    Cpu,
    /// Every live instance survives.
    None,
}

/// Configuration for [`SpriteBatchRenderer`](super::SpriteBatchRenderer).
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    pub max_instances: u32,
    /// Instance capacity allocated up front. Buffers double on demand up to `max_instances`.
    pub initial_capacity: u32,
    pub half_extent: f32,
    /// Bounding-sphere radius for culling. Defaults to the quad's half diagonal.
    pub cull_radius: f32,
    pub sort_order: SortOrder,
    pub sort_mode: SortMode,
    pub cull_mode: CullMode,
    pub label: &'static str,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_instances: DEFAULT_MAX_INSTANCES,
            initial_capacity: 1024,
            half_extent: DEFAULT_HALF_EXTENT,
            cull_radius: DEFAULT_HALF_EXTENT * std::f32::consts::SQRT_2,
            sort_order: SortOrder::BackToFront,
            sort_mode: SortMode::Gpu,
            cull_mode: CullMode::Gpu,
            label: "sprites",
        }
    }
}

impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_instances(mut self, max: u32) -> Self {
        self.max_instances = max.max(1);
        self.initial_capacity = self.initial_capacity.min(self.max_instances);
        self
    }

    pub fn initial_capacity(mut self, capacity: u32) -> Self {
        self.initial_capacity = capacity.clamp(1, self.max_instances);
        self
    }

    /// Sets the quad size and resets the cull radius to its half diagonal.
    pub fn half_extent(mut self, half_extent: f32) -> Self {
        self.half_extent = half_extent;
        self.cull_radius = half_extent * std::f32::consts::SQRT_2;
        self
    }

    pub fn cull_radius(mut self, radius: f32) -> Self {
        self.cull_radius = radius;
        self
    }

    pub fn sort_order(mut self, order: SortOrder) -> Self {
        self.sort_order = order;
        self
    }

    pub fn sort_mode(mut self, mode: SortMode) -> Self {
        self.sort_mode = mode;
        self
    }

    pub fn cull_mode(mut self, mode: CullMode) -> Self {
        self.cull_mode = mode;
        self
    }

    pub fn label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BatchConfig::default();
        assert_eq!(config.max_instances, 25_000);
        assert!((config.cull_radius - 282.842_7).abs() < 1e-3);
        assert_eq!(config.sort_order, SortOrder::BackToFront);
    }

    #[test]
    fn test_capacity_clamped_to_max() {
        let config = BatchConfig::new().max_instances(16).initial_capacity(64);
        assert_eq!(config.initial_capacity, 16);
        let config = BatchConfig::new().initial_capacity(0);
        assert_eq!(config.initial_capacity, 1);
    }
}
