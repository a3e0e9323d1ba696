//! Global configuration constants and the renderer configuration record.

use ash::vk;
use serde::{Deserialize, Serialize};

/// Number of frames the CPU may record ahead of the GPU.
pub const FRAMES_IN_FLIGHT: usize = 3;

/// Per-frame baseline for every dynamic uniform/storage buffer (16 KiB).
pub const SHADER_BUFFER_FRAME_SIZE: u64 = 16 * 1024;

/// Initial capacity of a dynamic shader buffer across all frames in flight.
pub const SHADER_BUFFER_INITIAL_SIZE: u64 = SHADER_BUFFER_FRAME_SIZE * FRAMES_IN_FLIGHT as u64;

/// Factor applied to `sets_per_pool` each time the dynamic descriptor pool creates a pool.
pub const DESCRIPTOR_POOL_GROWTH_FACTOR: u32 = 2;

/// Upper bound for the number of sets in a single dynamic descriptor pool.
pub const DESCRIPTOR_POOL_MAX_SETS: u32 = 4092;

/// Sets in the first dynamic descriptor pool.
pub const DEFAULT_DESCRIPTOR_SETS: u32 = 64 * FRAMES_IN_FLIGHT as u32;

/// Descriptors of each type per set, used to size every pool.
pub const DEFAULT_POOL_RATIOS: [(vk::DescriptorType, f32); 11] = [
    (vk::DescriptorType::SAMPLER, 0.5),
    (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4.0),
    (vk::DescriptorType::SAMPLED_IMAGE, 4.0),
    (vk::DescriptorType::STORAGE_IMAGE, 1.0),
    (vk::DescriptorType::UNIFORM_TEXEL_BUFFER, 1.0),
    (vk::DescriptorType::STORAGE_TEXEL_BUFFER, 1.0),
    (vk::DescriptorType::UNIFORM_BUFFER, 2.0),
    (vk::DescriptorType::STORAGE_BUFFER, 2.0),
    (vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1.0),
    (vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, 1.0),
    (vk::DescriptorType::INPUT_ATTACHMENT, 0.5),
];

/// Default frame budget (in milliseconds) before a slow-frame warning is logged.
pub const DEFAULT_FRAME_BUDGET_MS: f32 = 1000.0 / 60.0;

/// Default clear colour for colour attachments (opaque black).
pub const DEFAULT_CLEAR_COLOUR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MsaaPreset {
    Off,
    X2,
    X4,
    #[default]
    Max,
}

impl MsaaPreset {
    /// Requested sample count. `Max` resolves to whatever the device supports.
    pub fn sample_count(self, device_max: vk::SampleCountFlags) -> vk::SampleCountFlags {
        let wanted = match self {
            MsaaPreset::Off => vk::SampleCountFlags::TYPE_1,
            MsaaPreset::X2 => vk::SampleCountFlags::TYPE_2,
            MsaaPreset::X4 => vk::SampleCountFlags::TYPE_4,
            MsaaPreset::Max => return device_max,
        };

        if wanted.as_raw() > device_max.as_raw() {
            device_max
        } else {
            wanted
        }
    }
}

/// Startup configuration for [`crate::Renderer`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub enable_validation: bool,
    pub vsync: bool,
    pub msaa: MsaaPreset,
    pub initial_descriptor_sets: u32,
    pub shader_buffer_frame_size: u64,
    pub frame_budget_ms: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(debug_assertions),
            vsync: false,
            msaa: MsaaPreset::default(),
            initial_descriptor_sets: DEFAULT_DESCRIPTOR_SETS,
            shader_buffer_frame_size: SHADER_BUFFER_FRAME_SIZE,
            frame_budget_ms: DEFAULT_FRAME_BUDGET_MS,
        }
    }
}

impl RendererConfig {
    /// Initial capacity for every dynamic shader buffer.
    pub fn shader_buffer_initial_size(&self) -> u64 {
        self.shader_buffer_frame_size * FRAMES_IN_FLIGHT as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_shader_buffer_covers_every_frame() {
        assert_eq!(SHADER_BUFFER_INITIAL_SIZE, 48 * 1024);
        assert_eq!(
            RendererConfig::default().shader_buffer_initial_size(),
            SHADER_BUFFER_INITIAL_SIZE
        );
    }

    #[test]
    fn msaa_preset_clamps_to_device() {
        let max = vk::SampleCountFlags::TYPE_2;
        assert_eq!(MsaaPreset::X4.sample_count(max), vk::SampleCountFlags::TYPE_2);
        assert_eq!(MsaaPreset::Off.sample_count(max), vk::SampleCountFlags::TYPE_1);
        assert_eq!(MsaaPreset::Max.sample_count(max), max);
    }
}
