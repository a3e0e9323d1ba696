use ash::vk;
use std::sync::Arc;

use crate::config::RendererConfig;
use crate::vulkan::{
    Allocator, CacheEpoch, DeviceBackend, FrameDeletionQueues, SurfaceProvider, Uploader,
    VulkanDevice, VulkanInstance,
};
use crate::Result;

/// Core GPU objects shared by every manager: instance, device, allocator, the blocking uploader
/// and the per-frame deletion queues.
///
/// Created once by the renderer and handed out by reference or `Arc`.
pub struct RenderContext {
    // Field order is teardown order: everything that allocates goes before the device.
    pub deletions: Arc<FrameDeletionQueues>,
    pub uploader: Arc<Uploader>,
    pub allocator: Arc<Allocator>,
    pub epoch: CacheEpoch,
    backend: Arc<dyn DeviceBackend>,
    pub device: Arc<VulkanDevice>,
    pub instance: Arc<VulkanInstance>,
}

impl RenderContext {
    pub fn new<S: SurfaceProvider + ?Sized>(surface_provider: &S, config: &RendererConfig) -> Result<Self> {
        let instance = Arc::new(VulkanInstance::new(surface_provider, config.enable_validation)?);
        let device = Arc::new(VulkanDevice::new(Arc::clone(&instance))?);
        let allocator = Arc::new(unsafe { Allocator::new(&device)? });
        let uploader = Arc::new(Uploader::new(
            Arc::clone(&device.device),
            device.graphics_queue,
            device.graphics_queue_family,
        )?);
        let backend: Arc<dyn DeviceBackend> = device.device.clone();

        log::info!(
            "Render context ready (validation: {}, max MSAA: {:?})",
            config.enable_validation,
            device.max_usable_sample_count()
        );

        Ok(Self {
            deletions: Arc::new(FrameDeletionQueues::new()),
            uploader,
            allocator,
            epoch: CacheEpoch::new(),
            backend,
            device,
            instance,
        })
    }

    pub fn raw_device(&self) -> &Arc<ash::Device> {
        &self.device.device
    }

    /// Object-creation seam for the descriptor and pipeline caches.
    pub fn backend(&self) -> Arc<dyn DeviceBackend> {
        Arc::clone(&self.backend)
    }

    pub fn max_usable_sample_count(&self) -> vk::SampleCountFlags {
        self.device.max_usable_sample_count()
    }

    /// Stalls until the GPU has finished all submitted work.
    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        let _ = self.device.wait_idle();
        self.deletions.flush_all();
        log::info!("Render context destroyed");
    }
}
