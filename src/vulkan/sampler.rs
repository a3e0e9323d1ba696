use ash::vk;
use std::sync::Arc;

use crate::{AshError, Result};

/// Addressing + filtering description of a sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerStyle {
    pub filter: vk::Filter,
    pub wrap_u: vk::SamplerAddressMode,
    pub wrap_v: vk::SamplerAddressMode,
    pub wrap_w: vk::SamplerAddressMode,
    pub border: vk::BorderColor,
}

impl Default for SamplerStyle {
    fn default() -> Self {
        Self::uniform(vk::Filter::LINEAR, vk::SamplerAddressMode::REPEAT)
    }
}

impl SamplerStyle {
    pub fn uniform(filter: vk::Filter, wrap: vk::SamplerAddressMode) -> Self {
        Self {
            filter,
            wrap_u: wrap,
            wrap_v: wrap,
            wrap_w: wrap,
            border: vk::BorderColor::INT_OPAQUE_BLACK,
        }
    }

    pub fn clamped(filter: vk::Filter) -> Self {
        Self::uniform(filter, vk::SamplerAddressMode::CLAMP_TO_EDGE)
    }

    pub fn with_border(mut self, border: vk::BorderColor) -> Self {
        self.border = border;
        self
    }

    fn mipmap_mode(&self) -> vk::SamplerMipmapMode {
        if self.filter == vk::Filter::NEAREST {
            vk::SamplerMipmapMode::NEAREST
        } else {
            vk::SamplerMipmapMode::LINEAR
        }
    }

    pub fn create_info(&self, max_anisotropy: f32) -> vk::SamplerCreateInfo<'static> {
        vk::SamplerCreateInfo::default()
            .mag_filter(self.filter)
            .min_filter(self.filter)
            .mipmap_mode(self.mipmap_mode())
            .address_mode_u(self.wrap_u)
            .address_mode_v(self.wrap_v)
            .address_mode_w(self.wrap_w)
            .anisotropy_enable(max_anisotropy > 1.0)
            .max_anisotropy(max_anisotropy)
            .border_color(self.border)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .unnormalized_coordinates(false)
    }
}

/// A sampler created on first use.
pub struct TextureSampler {
    device: Arc<ash::Device>,
    style: SamplerStyle,
    max_anisotropy: f32,
    sampler: Option<vk::Sampler>,
}

impl TextureSampler {
    pub fn new(device: Arc<ash::Device>, style: SamplerStyle, max_anisotropy: f32) -> Self {
        Self {
            device,
            style,
            max_anisotropy,
            sampler: None,
        }
    }

    pub fn style(&self) -> SamplerStyle {
        self.style
    }

    pub fn handle(&mut self) -> Result<vk::Sampler> {
        if let Some(sampler) = self.sampler {
            return Ok(sampler);
        }

        let info = self.style.create_info(self.max_anisotropy);
        let sampler = unsafe { self.device.create_sampler(&info, None) }.map_err(|e| {
            log::error!("Failed to create sampler {:?}: {e:?}", self.style);
            AshError::vk("vkCreateSampler", e)
        })?;

        log::debug!("Created sampler {:?}", self.style);
        self.sampler = Some(sampler);
        Ok(sampler)
    }
}

impl Drop for TextureSampler {
    fn drop(&mut self) {
        if let Some(sampler) = self.sampler.take() {
            unsafe {
                self.device.destroy_sampler(sampler, None);
            }
        }
    }
}
