use ash::{khr::swapchain, vk, Device};
use std::collections::HashSet;
use std::sync::Arc;

use crate::vulkan::VulkanInstance;
use crate::{AshError, Result};

pub struct VulkanDevice {
    pub instance: Arc<VulkanInstance>,
    pub physical_device: vk::PhysicalDevice,
    pub device: Arc<Device>,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub graphics_queue_family: u32,
    pub present_queue_family: u32,
    pub properties: vk::PhysicalDeviceProperties,
}

impl VulkanDevice {
    /// Picks the first GPU with graphics + present queues and creates a logical device with
    /// dynamic rendering and synchronization2 enabled.
    pub fn new(instance: Arc<VulkanInstance>) -> Result<Self> {
        unsafe {
            let vk_instance = instance.instance();

            let physical_devices = vk_instance.enumerate_physical_devices().map_err(|e| {
                AshError::DeviceInitFailed(format!("Failed to enumerate devices: {e:?}"))
            })?;

            let (physical_device, graphics_queue_family, present_queue_family) = physical_devices
                .iter()
                .find_map(|&candidate| {
                    Self::find_queue_families(&instance, candidate)
                        .map(|(graphics, present)| (candidate, graphics, present))
                })
                .ok_or_else(|| {
                    log::error!("No GPU with graphics+present support among {} devices", physical_devices.len());
                    AshError::DeviceInitFailed("No GPU found with graphics+present support".into())
                })?;

            let properties = vk_instance.get_physical_device_properties(physical_device);
            if properties.api_version < vk::API_VERSION_1_3 {
                return Err(AshError::DeviceInitFailed(
                    "Selected GPU does not support Vulkan 1.3".into(),
                ));
            }
            log::info!(
                "Selected GPU: {:?}",
                properties.device_name_as_c_str().unwrap_or(c"<unknown>")
            );

            let queue_priorities = [1.0f32];
            let unique_families: HashSet<u32> =
                [graphics_queue_family, present_queue_family].into_iter().collect();
            let queue_infos: Vec<_> = unique_families
                .iter()
                .map(|&family| {
                    vk::DeviceQueueCreateInfo::default()
                        .queue_family_index(family)
                        .queue_priorities(&queue_priorities)
                })
                .collect();

            let device_extension_names = [swapchain::NAME.as_ptr()];
            let device_features = vk::PhysicalDeviceFeatures::default()
                .sampler_anisotropy(true)
                .sample_rate_shading(true);
            let mut vulkan13_features = vk::PhysicalDeviceVulkan13Features::default()
                .dynamic_rendering(true)
                .synchronization2(true);
            let mut features2 = vk::PhysicalDeviceFeatures2::default()
                .features(device_features)
                .push_next(&mut vulkan13_features);

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_infos)
                .enabled_extension_names(&device_extension_names)
                .push_next(&mut features2);

            let logical_device = vk_instance
                .create_device(physical_device, &device_create_info, None)
                .map_err(|e| {
                    log::error!("vkCreateDevice failed: {e:?}");
                    AshError::DeviceInitFailed(format!("vkCreateDevice failed: {e:?}"))
                })?;

            let device = Arc::new(logical_device);
            let graphics_queue = device.get_device_queue(graphics_queue_family, 0);
            let present_queue = device.get_device_queue(present_queue_family, 0);

            Ok(Self {
                instance,
                physical_device,
                device,
                graphics_queue,
                present_queue,
                graphics_queue_family,
                present_queue_family,
                properties,
            })
        }
    }

    fn find_queue_families(
        instance: &VulkanInstance,
        physical_device: vk::PhysicalDevice,
    ) -> Option<(u32, u32)> {
        let queue_families = unsafe {
            instance
                .instance()
                .get_physical_device_queue_family_properties(physical_device)
        };

        let mut graphics_family = None;
        let mut present_family = None;

        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;
            if graphics_family.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                graphics_family = Some(index);
            }

            let present_support = unsafe {
                instance.surface_loader().get_physical_device_surface_support(
                    physical_device,
                    index,
                    instance.surface(),
                )
            }
            .unwrap_or(false);

            if present_family.is_none() && present_support {
                present_family = Some(index);
            }
        }

        graphics_family.zip(present_family)
    }

    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.properties.limits
    }

    /// Alignment for dynamic offsets into buffers of the given descriptor type.
    pub fn dynamic_offset_alignment(&self, descriptor_type: vk::DescriptorType) -> u64 {
        match descriptor_type {
            vk::DescriptorType::STORAGE_BUFFER_DYNAMIC | vk::DescriptorType::STORAGE_BUFFER => {
                self.limits().min_storage_buffer_offset_alignment
            }
            _ => self.limits().min_uniform_buffer_offset_alignment,
        }
    }

    pub fn max_sampler_anisotropy(&self) -> f32 {
        self.limits().max_sampler_anisotropy
    }

    /// Highest sample count usable for both colour and depth attachments.
    pub fn max_usable_sample_count(&self) -> vk::SampleCountFlags {
        let limits = self.limits();
        highest_sample_count(
            limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts,
        )
    }

    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .instance()
                .get_physical_device_format_properties(self.physical_device, format)
        }
    }

    pub fn supports_linear_blit(&self, format: vk::Format) -> bool {
        self.format_properties(format)
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    }

    /// First candidate usable as a depth-stencil attachment with optimal tiling.
    pub fn find_depth_format(&self) -> Result<vk::Format> {
        [
            vk::Format::D32_SFLOAT_S8_UINT,
            vk::Format::D24_UNORM_S8_UINT,
            vk::Format::D32_SFLOAT,
        ]
        .into_iter()
        .find(|&format| {
            self.format_properties(format)
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or_else(|| AshError::UnsupportedFormat("no depth attachment format available".into()))
    }

    /// Blocks until the device is idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.map_err(|e| AshError::vk("vkDeviceWaitIdle", e))
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
        log::info!("Vulkan device destroyed");
    }
}

/// Highest single sample count contained in `counts`.
pub fn highest_sample_count(counts: vk::SampleCountFlags) -> vk::SampleCountFlags {
    [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ]
    .into_iter()
    .find(|&count| counts.contains(count))
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highest_sample_count() {
        let counts = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_8;
        assert_eq!(highest_sample_count(counts), vk::SampleCountFlags::TYPE_8);
        assert_eq!(
            highest_sample_count(vk::SampleCountFlags::TYPE_1),
            vk::SampleCountFlags::TYPE_1
        );
    }
}
