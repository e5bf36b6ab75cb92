//! Headless wgpu device setup

use crate::error::{MorphError, Result};
use std::sync::Arc;
use wgpu::{Adapter, Device, Instance, Queue};

/// Instance, adapter, device and queue shared by the simulator and renderer
pub struct GpuContext {
    pub instance: Instance,
    pub adapter: Adapter,
    pub device: Arc<Device>,
    pub queue: Arc<Queue>,
}

impl GpuContext {
    /// Creates a device without a surface, with limits raised to what the
    /// adapter supports
    pub fn headless() -> Result<Self> {
        pollster::block_on(Self::new_headless())
    }

    async fn new_headless() -> Result<Self> {
        let instance = Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .map_err(|e| MorphError::NoAdapter(e.to_string()))?;

        let info = adapter.get_info();
        log::info!(
            "GPU adapter: {} ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );

        let limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("morph device"),
                required_features: wgpu::Features::empty(),
                required_limits: limits.clone(),
                ..Default::default()
            })
            .await
            .map_err(|e| MorphError::RequestDevice(e.to_string()))?;

        Self::log_limits(&limits);

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    fn log_limits(limits: &wgpu::Limits) {
        log::info!("max_buffer_size: {}", limits.max_buffer_size);
        log::info!(
            "max_storage_buffer_binding_size: {}",
            limits.max_storage_buffer_binding_size
        );
        log::info!(
            "max_storage_buffers_per_shader_stage: {}",
            limits.max_storage_buffers_per_shader_stage
        );
        log::info!(
            "max_uniform_buffers_per_shader_stage: {}",
            limits.max_uniform_buffers_per_shader_stage
        );
        log::info!(
            "max_compute_workgroups_per_dimension: {}",
            limits.max_compute_workgroups_per_dimension
        );
    }

    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }
}
