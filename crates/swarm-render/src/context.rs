use crate::features::GpuFeatures;
use std::sync::Arc;

/// Failure to bring up a device.
#[derive(Debug, thiserror::Error)]
pub enum GraphicsError {
    #[error("no suitable GPU adapter found: {0}")]
    NoAdapter(String),
    #[error("required GPU features not supported by {adapter}: {missing:?}")]
    MissingFeatures {
        adapter: String,
        missing: GpuFeatures,
    },
    #[error("failed to create device: {0}")]
    RequestDevice(String),
}

/// Shared adapter, device and queue.
///
/// ```rust,no_run
/// use swarm_render::GraphicsContext;
///
/// let ctx = GraphicsContext::new_owned_sync()?;
/// let ctx2 = ctx.clone(); // Arc clone
/// # Ok::<(), swarm_render::GraphicsError>(())
/// ```
pub struct GraphicsContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    enabled_features: GpuFeatures,
}

impl GraphicsContext {
    pub async fn new_owned() -> Result<Arc<Self>, GraphicsError> {
        Self::new_owned_with_descriptor(GraphicsContextDescriptor::default()).await
    }

    /// Blocks the current thread until the device is ready.
    pub fn new_owned_sync() -> Result<Arc<Self>, GraphicsError> {
        pollster::block_on(Self::new_owned())
    }

    pub fn new_owned_sync_with_descriptor(
        descriptor: GraphicsContextDescriptor,
    ) -> Result<Arc<Self>, GraphicsError> {
        pollster::block_on(Self::new_owned_with_descriptor(descriptor))
    }

    pub async fn new_owned_with_descriptor(
        descriptor: GraphicsContextDescriptor,
    ) -> Result<Arc<Self>, GraphicsError> {
        Self::create(descriptor).await.map(Arc::new)
    }

    async fn create(descriptor: GraphicsContextDescriptor) -> Result<Self, GraphicsError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: descriptor.backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: descriptor.power_preference,
                compatible_surface: None,
                force_fallback_adapter: descriptor.force_fallback_adapter,
            })
            .await
            .map_err(|err| GraphicsError::NoAdapter(err.to_string()))?;

        let missing = descriptor.required_gpu_features.missing_on(&adapter);
        if !missing.is_empty() {
            return Err(GraphicsError::MissingFeatures {
                adapter: adapter.get_info().name,
                missing,
            });
        }

        let available = GpuFeatures::from_wgpu(adapter.features());
        let unavailable = descriptor.requested_gpu_features - available;
        if !unavailable.is_empty() {
            tracing::warn!("requested GPU features unavailable: {:?}", unavailable);
        }

        let enabled_features =
            descriptor.required_gpu_features | (descriptor.requested_gpu_features & available);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                required_features: enabled_features.to_wgpu(),
                required_limits: descriptor.limits.clone(),
                label: descriptor.label,
                ..Default::default()
            })
            .await
            .map_err(|err| GraphicsError::RequestDevice(err.to_string()))?;

        tracing::info!(
            adapter = %adapter.get_info().name,
            "created graphics context with features {:?}",
            enabled_features
        );

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            enabled_features,
        })
    }

    #[inline]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }

    pub fn gpu_features(&self) -> GpuFeatures {
        self.enabled_features
    }

    pub fn has_feature(&self, feature: GpuFeatures) -> bool {
        self.enabled_features.contains(feature)
    }

    /// Dynamic uniform offsets used by the kernel parameter block must be multiples of this.
    #[inline]
    pub fn min_uniform_buffer_offset_alignment(&self) -> u32 {
        self.device.limits().min_uniform_buffer_offset_alignment
    }

    #[inline]
    pub fn max_compute_workgroups_per_dimension(&self) -> u32 {
        self.device.limits().max_compute_workgroups_per_dimension
    }

    #[inline]
    pub fn max_storage_buffer_binding_size(&self) -> u32 {
        self.device.limits().max_storage_buffer_binding_size
    }
}

/// Descriptor for configuring graphics context creation.
pub struct GraphicsContextDescriptor {
    pub backends: wgpu::Backends,
    pub power_preference: wgpu::PowerPreference,
    pub force_fallback_adapter: bool,
    /// Creation fails with [`GraphicsError::MissingFeatures`] when any of these is absent.
    pub required_gpu_features: GpuFeatures,
    /// Best effort, logged when unavailable.
    pub requested_gpu_features: GpuFeatures,
    pub limits: wgpu::Limits,
    pub label: Option<&'static str>,
}

impl Default for GraphicsContextDescriptor {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            required_gpu_features: GpuFeatures::empty(),
            requested_gpu_features: GpuFeatures::empty(),
            limits: wgpu::Limits::default(),
            label: None,
        }
    }
}

impl GraphicsContextDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require_features(mut self, features: GpuFeatures) -> Self {
        self.required_gpu_features |= features;
        self
    }

    pub fn request_features(mut self, features: GpuFeatures) -> Self {
        self.requested_gpu_features |= features;
        self
    }

    pub fn power_preference(mut self, preference: wgpu::PowerPreference) -> Self {
        self.power_preference = preference;
        self
    }

    pub fn backends(mut self, backends: wgpu::Backends) -> Self {
        self.backends = backends;
        self
    }

    /// Allow a software adapter (lavapipe, WARP) when no hardware adapter is present.
    pub fn force_fallback_adapter(mut self, force: bool) -> Self {
        self.force_fallback_adapter = force;
        self
    }

    pub fn limits(mut self, limits: wgpu::Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn label(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }
}
