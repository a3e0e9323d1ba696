use ash::prelude::VkResult;
use ash::{khr::swapchain, vk};
use std::sync::Arc;

use crate::config::FRAMES_IN_FLIGHT;
use crate::vulkan::render_info::{AttachmentBinding, RenderInfo};
use crate::vulkan::render_target::{RenderTarget, RenderTargetKind, SwapchainSync};
use crate::vulkan::texture::{Texture, TextureDesc};
use crate::vulkan::transition::{ImageLayout, LayoutTracker};
use crate::vulkan::{Allocator, VulkanDevice};
use crate::{AshError, Result};

/// Acquire attempts (each followed by a rebuild) before a frame is skipped.
pub const MAX_ACQUIRE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Image(u32),
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Out of date or suboptimal; the swapchain should be rebuilt.
    Stale,
}

/// Acquire/present/rebuild primitives of a presentation surface.
pub trait PresentationOps {
    fn acquire(&mut self, frame: usize) -> Result<AcquireOutcome>;
    fn present(&mut self, frame: usize, image_index: u32) -> Result<PresentOutcome>;
    fn rebuild(&mut self) -> Result<()>;
}

/// Acquires the next image, rebuilding the swapchain whenever it reports out-of-date.
/// Returns `None` when no image could be acquired; the caller skips the frame.
pub fn acquire_with_rebuild<P: PresentationOps + ?Sized>(ops: &mut P, frame: usize) -> Result<Option<u32>> {
    for attempt in 0..MAX_ACQUIRE_ATTEMPTS {
        match ops.acquire(frame)? {
            AcquireOutcome::Image(index) => return Ok(Some(index)),
            AcquireOutcome::OutOfDate => {
                log::debug!("Swapchain out of date on acquire (attempt {})", attempt + 1);
                ops.rebuild()?;
            }
        }
    }

    log::warn!("No swapchain image after {MAX_ACQUIRE_ATTEMPTS} rebuilds, skipping frame");
    Ok(None)
}

/// Presents and rebuilds on out-of-date / suboptimal. Returns whether a rebuild happened.
pub fn present_with_rebuild<P: PresentationOps + ?Sized>(
    ops: &mut P,
    frame: usize,
    image_index: u32,
) -> Result<bool> {
    match ops.present(frame, image_index)? {
        PresentOutcome::Presented => Ok(false),
        PresentOutcome::Stale => {
            log::debug!("Swapchain stale after present, rebuilding");
            ops.rebuild()?;
            Ok(true)
        }
    }
}

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

pub fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Surface extent, falling back to `requested` clamped into the surface limits when the
/// surface leaves the size to the swapchain.
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, requested: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: requested.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: requested.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = capabilities.min_image_count.max(2);
    if capabilities.max_image_count > 0 {
        wanted.min(capabilities.max_image_count)
    } else {
        wanted
    }
}

/// Swapchain handle plus its images and views.
pub struct Swapchain {
    loader: swapchain::Device,
    device: Arc<ash::Device>,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Swapchain {
    pub fn new(gpu: &VulkanDevice, requested: vk::Extent2D, vsync: bool) -> Result<Self> {
        let loader = swapchain::Device::new(gpu.instance.instance(), &gpu.device);
        let mut swapchain = Self {
            loader,
            device: Arc::clone(&gpu.device),
            handle: vk::SwapchainKHR::null(),
            images: Vec::new(),
            views: Vec::new(),
            format: vk::Format::UNDEFINED,
            extent: vk::Extent2D::default(),
        };
        swapchain.build(gpu, requested, vsync)?;
        Ok(swapchain)
    }

    /// Replaces the swapchain. The device must be idle.
    pub fn recreate(&mut self, gpu: &VulkanDevice, requested: vk::Extent2D, vsync: bool) -> Result<()> {
        self.destroy_views();
        self.build(gpu, requested, vsync)
    }

    fn build(&mut self, gpu: &VulkanDevice, requested: vk::Extent2D, vsync: bool) -> Result<()> {
        let surface_loader = gpu.instance.surface_loader();
        let surface = gpu.instance.surface();
        let creation_failed = |e: vk::Result| {
            log::error!("Swapchain creation failed: {e:?}");
            AshError::SwapchainCreationFailed(format!("{e:?}"))
        };

        let (capabilities, formats, modes) = unsafe {
            (
                surface_loader
                    .get_physical_device_surface_capabilities(gpu.physical_device, surface)
                    .map_err(creation_failed)?,
                surface_loader
                    .get_physical_device_surface_formats(gpu.physical_device, surface)
                    .map_err(creation_failed)?,
                surface_loader
                    .get_physical_device_surface_present_modes(gpu.physical_device, surface)
                    .map_err(creation_failed)?,
            )
        };

        let surface_format = choose_surface_format(&formats).ok_or_else(|| {
            AshError::SwapchainCreationFailed("surface reports no formats".into())
        })?;
        let extent = choose_extent(&capabilities, requested);
        let image_count = choose_image_count(&capabilities);
        let present_mode = choose_present_mode(&modes, vsync);

        let queue_families = [gpu.graphics_queue_family, gpu.present_queue_family];
        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(self.handle);

        create_info = if gpu.graphics_queue_family != gpu.present_queue_family {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_families)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let old_handle = self.handle;
        let handle = unsafe { self.loader.create_swapchain(&create_info, None) }
            .map_err(creation_failed)?;
        if old_handle != vk::SwapchainKHR::null() {
            unsafe { self.loader.destroy_swapchain(old_handle, None) };
        }
        self.handle = handle;

        self.images = unsafe { self.loader.get_swapchain_images(handle) }.map_err(creation_failed)?;
        self.views = Vec::with_capacity(self.images.len());
        for &image in &self.images {
            let info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view =
                unsafe { self.device.create_image_view(&info, None) }.map_err(creation_failed)?;
            self.views.push(view);
        }

        self.format = surface_format.format;
        self.extent = extent;

        log::info!(
            "Swapchain created: {}x{}, {} images, {:?}",
            extent.width,
            extent.height,
            self.images.len(),
            present_mode
        );
        Ok(())
    }

    fn destroy_views(&mut self) {
        for view in self.views.drain(..) {
            unsafe { self.device.destroy_image_view(view, None) };
        }
    }

    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> VkResult<(u32, bool)> {
        unsafe {
            self.loader
                .acquire_next_image(self.handle, u64::MAX, semaphore, vk::Fence::null())
        }
    }

    pub fn present(&self, queue: vk::Queue, image_index: u32, wait: vk::Semaphore) -> VkResult<bool> {
        let swapchains = [self.handle];
        let indices = [image_index];
        let waits = [wait];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);

        unsafe { self.loader.queue_present(queue, &info) }
    }

    pub fn image(&self, index: u32) -> Option<vk::Image> {
        self.images.get(index as usize).copied()
    }

    pub fn view(&self, index: u32) -> Option<vk::ImageView> {
        self.views.get(index as usize).copied()
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_views();
        unsafe { self.loader.destroy_swapchain(self.handle, None) };
        log::info!("Swapchain destroyed");
    }
}

#[derive(Debug, Clone, Copy)]
struct FrameSemaphores {
    image_available: vk::Semaphore,
    render_finished: vk::Semaphore,
}

/// The window's render target: swapchain, per-image trackers, MSAA colour + depth attachments
/// and per-frame acquire/present semaphores.
pub struct Backbuffer {
    gpu: Arc<VulkanDevice>,
    allocator: Arc<Allocator>,
    swapchain: Swapchain,
    image_layouts: Vec<LayoutTracker>,
    msaa_colour: Option<Texture>,
    depth: Texture,
    semaphores: Vec<FrameSemaphores>,
    render_infos: Vec<RenderInfo>,
    requested: vk::Extent2D,
    samples: vk::SampleCountFlags,
    depth_format: vk::Format,
    vsync: bool,
    frame: usize,
    image_index: u32,
}

impl Backbuffer {
    pub fn new(
        gpu: Arc<VulkanDevice>,
        allocator: Arc<Allocator>,
        width: u32,
        height: u32,
        samples: vk::SampleCountFlags,
        vsync: bool,
    ) -> Result<Self> {
        let requested = vk::Extent2D { width, height };
        let depth_format = gpu.find_depth_format()?;
        let swapchain = Swapchain::new(&gpu, requested, vsync)?;
        let (msaa_colour, depth) =
            Self::create_attachments(&gpu, &allocator, &swapchain, samples, depth_format)?;
        let semaphores = Self::create_semaphores(&gpu.device)?;

        let mut backbuffer = Self {
            gpu,
            allocator,
            image_layouts: vec![LayoutTracker::default(); swapchain.image_count()],
            swapchain,
            msaa_colour,
            depth,
            semaphores,
            render_infos: Vec::new(),
            requested,
            samples,
            depth_format,
            vsync,
            frame: 0,
            image_index: 0,
        };
        backbuffer.render_infos = backbuffer.build_render_infos()?;
        Ok(backbuffer)
    }

    fn create_attachments(
        gpu: &VulkanDevice,
        allocator: &Arc<Allocator>,
        swapchain: &Swapchain,
        samples: vk::SampleCountFlags,
        depth_format: vk::Format,
    ) -> Result<(Option<Texture>, Texture)> {
        let extent = swapchain.extent();

        let msaa_colour = if samples != vk::SampleCountFlags::TYPE_1 {
            Some(Texture::new(
                Arc::clone(&gpu.device),
                Arc::clone(allocator),
                TextureDesc::flat(swapchain.format(), extent.width, extent.height)
                    .with_samples(samples)
                    .transient(),
            )?)
        } else {
            None
        };

        let depth = Texture::new(
            Arc::clone(&gpu.device),
            Arc::clone(allocator),
            TextureDesc::flat(depth_format, extent.width, extent.height)
                .with_samples(samples)
                .transient(),
        )?;

        Ok((msaa_colour, depth))
    }

    fn create_semaphores(device: &ash::Device) -> Result<Vec<FrameSemaphores>> {
        let info = vk::SemaphoreCreateInfo::default();
        (0..FRAMES_IN_FLIGHT)
            .map(|_| unsafe {
                Ok(FrameSemaphores {
                    image_available: device
                        .create_semaphore(&info, None)
                        .map_err(|e| AshError::vk("vkCreateSemaphore", e))?,
                    render_finished: device
                        .create_semaphore(&info, None)
                        .map_err(|e| AshError::vk("vkCreateSemaphore", e))?,
                })
            })
            .collect()
    }

    fn destroy_semaphores(&mut self) {
        for semaphores in self.semaphores.drain(..) {
            unsafe {
                self.gpu.device.destroy_semaphore(semaphores.image_available, None);
                self.gpu.device.destroy_semaphore(semaphores.render_finished, None);
            }
        }
    }

    fn build_render_infos(&mut self) -> Result<Vec<RenderInfo>> {
        let extent = self.swapchain.extent();
        let msaa_view = match self.msaa_colour.as_mut() {
            Some(texture) => Some(texture.attachment_view()?),
            None => None,
        };
        let depth_view = self.depth.attachment_view()?;

        (0..self.swapchain.image_count() as u32)
            .map(|index| {
                let swap_view = self.swapchain.view(index).ok_or_else(|| {
                    AshError::ResourceNotFound(format!("swapchain view {index}"))
                })?;

                let colour = match msaa_view {
                    Some(view) => {
                        let mut binding = AttachmentBinding::colour(view);
                        binding.resolve_view = Some(swap_view);
                        binding.store_op = vk::AttachmentStoreOp::DONT_CARE;
                        binding
                    }
                    None => AttachmentBinding::colour(swap_view),
                };

                let mut depth = AttachmentBinding::depth(depth_view);
                depth.store_op = vk::AttachmentStoreOp::DONT_CARE;

                let mut info = RenderInfo::new(extent.width, extent.height, self.samples);
                info.add_colour_attachment(colour, self.swapchain.format());
                info.set_depth_attachment(depth, self.depth_format);
                Ok(info)
            })
            .collect()
    }

    /// Rebuilds for a new window size. Zero or unchanged sizes are ignored.
    pub fn on_resize(&mut self, width: u32, height: u32) -> Result<bool> {
        if width == 0 || height == 0 {
            return Ok(false);
        }
        if width == self.requested.width && height == self.requested.height {
            return Ok(false);
        }

        self.requested = vk::Extent2D { width, height };
        self.rebuild()?;
        Ok(true)
    }

    /// Acquires the next swap image for `frame`, rebuilding as needed.
    pub fn acquire_frame(&mut self, frame: usize) -> Result<Option<u32>> {
        let index = acquire_with_rebuild(self, frame)?;
        if let Some(index) = index {
            self.frame = frame;
            self.image_index = index;
        }
        Ok(index)
    }

    pub fn present_frame(&mut self, frame: usize) -> Result<bool> {
        let index = self.image_index;
        present_with_rebuild(self, frame, index)
    }

    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    pub fn format(&self) -> vk::Format {
        self.swapchain.format()
    }

    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }
}

impl PresentationOps for Backbuffer {
    fn acquire(&mut self, frame: usize) -> Result<AcquireOutcome> {
        let semaphore = self.semaphores[frame % self.semaphores.len()].image_available;
        match self.swapchain.acquire_next_image(semaphore) {
            Ok((index, _suboptimal)) => Ok(AcquireOutcome::Image(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => {
                log::error!("vkAcquireNextImageKHR failed: {e:?}");
                Err(AshError::FrameAcquisitionFailed(format!("{e:?}")))
            }
        }
    }

    fn present(&mut self, frame: usize, image_index: u32) -> Result<PresentOutcome> {
        let wait = self.semaphores[frame % self.semaphores.len()].render_finished;
        match self
            .swapchain
            .present(self.gpu.present_queue, image_index, wait)
        {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Stale),
            Err(e) => {
                log::error!("vkQueuePresentKHR failed: {e:?}");
                Err(AshError::vk("vkQueuePresentKHR", e))
            }
        }
    }

    fn rebuild(&mut self) -> Result<()> {
        self.gpu.wait_idle()?;

        self.destroy_semaphores();
        self.render_infos.clear();
        self.msaa_colour = None;

        self.swapchain.recreate(&self.gpu, self.requested, self.vsync)?;
        let (msaa_colour, depth) = Self::create_attachments(
            &self.gpu,
            &self.allocator,
            &self.swapchain,
            self.samples,
            self.depth_format,
        )?;
        self.msaa_colour = msaa_colour;
        self.depth = depth;
        self.semaphores = Self::create_semaphores(&self.gpu.device)?;
        self.image_layouts = vec![LayoutTracker::default(); self.swapchain.image_count()];
        self.render_infos = self.build_render_infos()?;

        log::info!(
            "Backbuffer rebuilt at {}x{}",
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );
        Ok(())
    }
}

impl RenderTarget for Backbuffer {
    fn kind(&self) -> RenderTargetKind {
        RenderTargetKind::Backbuffer
    }

    fn width(&self) -> u32 {
        self.swapchain.extent().width
    }

    fn height(&self) -> u32 {
        self.swapchain.extent().height
    }

    fn msaa(&self) -> vk::SampleCountFlags {
        self.samples
    }

    fn render_info(&self) -> &RenderInfo {
        &self.render_infos[self.image_index as usize]
    }

    fn set_clear_colour(&mut self, idx: usize, colour: [f32; 4]) {
        for info in &mut self.render_infos {
            info.set_clear_colour(idx, colour);
        }
    }

    fn set_depth_stencil_clear(&mut self, depth: f32, stencil: u32) {
        for info in &mut self.render_infos {
            info.set_depth_stencil_clear(depth, stencil);
        }
    }

    fn attachment(&self, idx: usize) -> Option<&Texture> {
        match idx {
            0 => self.msaa_colour.as_ref(),
            _ => None,
        }
    }

    fn depth_attachment(&self) -> Option<&Texture> {
        Some(&self.depth)
    }

    fn begin_rendering(&mut self, device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
        let index = self.image_index;
        let image = self
            .swapchain
            .image(index)
            .ok_or_else(|| AshError::ResourceNotFound(format!("swapchain image {index}")))?;

        // Contents are cleared every frame, so the previous layout is discarded.
        let tracker = &mut self.image_layouts[index as usize];
        tracker.force(ImageLayout::Undefined, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        let transition = tracker.transition(ImageLayout::ColourAttachment)?;
        let barrier = transition.image_barrier(image, colour_range());
        let dependency =
            vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&barrier));
        unsafe { device.cmd_pipeline_barrier2(cmd, &dependency) };

        if let Some(msaa) = self.msaa_colour.as_mut() {
            if msaa.layout() != ImageLayout::ColourAttachment {
                msaa.transition_layout(device, cmd, ImageLayout::ColourAttachment)?;
            }
        }
        self.depth
            .transition_layout(device, cmd, ImageLayout::DepthStencilAttachment)?;
        Ok(())
    }

    fn end_rendering(&mut self, device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
        let index = self.image_index;
        let image = self
            .swapchain
            .image(index)
            .ok_or_else(|| AshError::ResourceNotFound(format!("swapchain image {index}")))?;

        let transition = self.image_layouts[index as usize].transition(ImageLayout::PresentSrc)?;
        let barrier = transition.image_barrier(image, colour_range());
        let dependency =
            vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&barrier));
        unsafe { device.cmd_pipeline_barrier2(cmd, &dependency) };
        Ok(())
    }

    fn swapchain_sync(&self) -> Option<SwapchainSync> {
        let semaphores = self.semaphores.get(self.frame % self.semaphores.len().max(1))?;
        Some(SwapchainSync {
            image_available: semaphores.image_available,
            render_finished: semaphores.render_finished,
        })
    }
}

impl Drop for Backbuffer {
    fn drop(&mut self) {
        let _ = self.gpu.wait_idle();
        self.destroy_semaphores();
    }
}

fn colour_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_extent_prefers_surface_size() {
        let requested = vk::Extent2D {
            width: 10_000,
            height: 300,
        };
        assert_eq!(
            choose_extent(&capabilities((800, 600)), requested),
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
        assert_eq!(
            choose_extent(&capabilities((u32::MAX, u32::MAX)), requested),
            vk::Extent2D {
                width: 4096,
                height: 300
            }
        );
    }

    #[test]
    fn test_present_mode_selection() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO], false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_surface_format_prefers_srgb() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(
            choose_surface_format(&formats).map(|f| f.format),
            Some(vk::Format::B8G8R8A8_SRGB)
        );
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn test_image_count_respects_limits() {
        assert_eq!(choose_image_count(&capabilities((1, 1))), 2);
        let mut caps = capabilities((1, 1));
        caps.min_image_count = 1;
        caps.max_image_count = 0;
        assert_eq!(choose_image_count(&caps), 2);
    }
}
