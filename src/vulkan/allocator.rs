use ash::vk;
use vk_mem::Alloc;

use crate::{AshError, Result};

/// Where a buffer's memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Residency {
    /// Mapped and written directly by the CPU.
    HostVisible,
    /// Device memory, written through a staging buffer and a transfer.
    DeviceLocal,
}

pub struct Allocator {
    pub vma: vk_mem::Allocator,
}

impl Allocator {
    /// Creates the VMA allocator for `device`.
    ///
    /// # Safety
    ///
    /// - `device` must be a fully initialised device that outlives the allocator
    /// - every buffer and image allocated here must be destroyed before the allocator is dropped
    pub unsafe fn new(device: &crate::vulkan::VulkanDevice) -> Result<Self> {
        let vma = vk_mem::Allocator::new(vk_mem::AllocatorCreateInfo::new(
            device.instance.instance(),
            &device.device,
            device.physical_device,
        ))
        .map_err(|e| {
            log::error!("VMA init failed: {e:?}");
            AshError::vk("vmaCreateAllocator", e)
        })?;

        log::info!("VMA allocator created");

        Ok(Self { vma })
    }

    /// Allocates a buffer with memory matching `residency`.
    ///
    /// # Safety
    ///
    /// The returned pair must be released with [`Allocator::destroy_buffer`] once the GPU no
    /// longer references it.
    pub unsafe fn create_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        residency: Residency,
    ) -> Result<(vk::Buffer, vk_mem::Allocation)> {
        let (memory_usage, flags) = match residency {
            Residency::HostVisible => (
                vk_mem::MemoryUsage::AutoPreferHost,
                vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
            ),
            Residency::DeviceLocal => (
                vk_mem::MemoryUsage::AutoPreferDevice,
                vk_mem::AllocationCreateFlags::empty(),
            ),
        };

        self.vma
            .create_buffer(
                &vk::BufferCreateInfo::default()
                    .size(size)
                    .usage(usage)
                    .sharing_mode(vk::SharingMode::EXCLUSIVE),
                &vk_mem::AllocationCreateInfo {
                    usage: memory_usage,
                    flags,
                    ..Default::default()
                },
            )
            .map_err(|e| {
                log::error!("Buffer allocation of {size} bytes failed: {e:?}");
                AshError::AllocationFailed(format!("vmaCreateBuffer ({size} bytes): {e:?}"))
            })
    }

    /// # Safety
    ///
    /// Same contract as [`Allocator::create_buffer`]; destroy with [`Allocator::destroy_image`].
    pub unsafe fn create_image(
        &self,
        image_info: &vk::ImageCreateInfo,
        transient: bool,
    ) -> Result<(vk::Image, vk_mem::Allocation)> {
        let usage = if transient {
            vk_mem::MemoryUsage::AutoPreferDevice
        } else {
            vk_mem::MemoryUsage::Auto
        };

        self.vma
            .create_image(
                image_info,
                &vk_mem::AllocationCreateInfo {
                    usage,
                    ..Default::default()
                },
            )
            .map_err(|e| {
                log::error!("Image allocation failed: {e:?}");
                AshError::AllocationFailed(format!("vmaCreateImage: {e:?}"))
            })
    }

    /// # Safety
    ///
    /// `buffer`/`allocation` must come from this allocator and be idle on the GPU.
    pub unsafe fn destroy_buffer(&self, buffer: vk::Buffer, allocation: &mut vk_mem::Allocation) {
        self.vma.destroy_buffer(buffer, allocation);
    }

    /// # Safety
    ///
    /// `image`/`allocation` must come from this allocator and be idle on the GPU.
    pub unsafe fn destroy_image(&self, image: vk::Image, allocation: &mut vk_mem::Allocation) {
        self.vma.destroy_image(image, allocation);
    }
}

impl Drop for Allocator {
    fn drop(&mut self) {
        log::info!("VMA allocator destroyed");
    }
}
