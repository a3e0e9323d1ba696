use ash::vk;
use std::sync::Arc;

use crate::vulkan::render_info::{AttachmentBinding, RenderInfo};
use crate::vulkan::texture::{Texture, TextureDesc};
use crate::vulkan::transition::ImageLayout;
use crate::vulkan::{Allocator, Uploader, VulkanDevice};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTargetKind {
    Offscreen,
    Backbuffer,
}

/// Semaphores a swapchain-backed target needs wired into the frame submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
}

/// Something a dynamic-rendering scope can draw into.
pub trait RenderTarget {
    fn kind(&self) -> RenderTargetKind;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn msaa(&self) -> vk::SampleCountFlags;
    fn render_info(&self) -> &RenderInfo;

    fn set_clear_colour(&mut self, idx: usize, colour: [f32; 4]);
    fn set_depth_stencil_clear(&mut self, depth: f32, stencil: u32);

    /// Sampleable colour attachment `idx`.
    fn attachment(&self, idx: usize) -> Option<&Texture>;
    fn depth_attachment(&self) -> Option<&Texture>;

    /// Moves attachments into attachment layouts. Called before the rendering scope opens.
    fn begin_rendering(&mut self, device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()>;

    /// Moves attachments into their post-pass layouts. Called after the rendering scope closes.
    fn end_rendering(&mut self, device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()>;

    /// Acquire/present semaphores for the current frame. Only swapchain targets have them.
    fn swapchain_sync(&self) -> Option<SwapchainSync> {
        None
    }
}

/// Parameters for an offscreen target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTargetDesc {
    pub width: u32,
    pub height: u32,
    pub colour_formats: Vec<vk::Format>,
    pub depth_format: Option<vk::Format>,
    pub samples: vk::SampleCountFlags,
    pub mip_levels: u32,
}

impl RenderTargetDesc {
    pub fn new(width: u32, height: u32, colour_formats: Vec<vk::Format>) -> Self {
        Self {
            width,
            height,
            colour_formats,
            depth_format: None,
            samples: vk::SampleCountFlags::TYPE_1,
            mip_levels: 1,
        }
    }

    pub fn with_depth(mut self, format: vk::Format) -> Self {
        self.depth_format = Some(format);
        self
    }

    pub fn with_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    pub fn with_mips(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    pub fn is_multisampled(&self) -> bool {
        self.samples != vk::SampleCountFlags::TYPE_1
    }
}

/// Texture-backed target. Multisampled targets render into transient attachments that
/// resolve into the single-sample colour textures.
#[derive(Debug)]
pub struct OffscreenTarget {
    desc: RenderTargetDesc,
    colour: Vec<Texture>,
    msaa_colour: Vec<Texture>,
    depth: Option<Texture>,
    render_info: RenderInfo,
}

impl OffscreenTarget {
    pub fn new(device: &Arc<ash::Device>, allocator: &Arc<Allocator>, desc: RenderTargetDesc) -> Result<Self> {
        let mut colour = Vec::with_capacity(desc.colour_formats.len());
        let mut msaa_colour = Vec::new();
        let mut render_info = RenderInfo::new(desc.width, desc.height, desc.samples);

        for &format in &desc.colour_formats {
            let mut resolved = Texture::new(
                Arc::clone(device),
                Arc::clone(allocator),
                TextureDesc::flat(format, desc.width, desc.height).with_mips(desc.mip_levels),
            )?;
            let resolved_view = resolved.attachment_view()?;

            let binding = if desc.is_multisampled() {
                let mut msaa = Texture::new(
                    Arc::clone(device),
                    Arc::clone(allocator),
                    TextureDesc::flat(format, desc.width, desc.height)
                        .with_samples(desc.samples)
                        .transient(),
                )?;
                let mut binding = AttachmentBinding::colour(msaa.attachment_view()?);
                binding.resolve_view = Some(resolved_view);
                binding.store_op = vk::AttachmentStoreOp::DONT_CARE;
                msaa_colour.push(msaa);
                binding
            } else {
                AttachmentBinding::colour(resolved_view)
            };

            render_info.add_colour_attachment(binding, format);
            colour.push(resolved);
        }

        let depth = match desc.depth_format {
            Some(format) => {
                let mut texture = Texture::new(
                    Arc::clone(device),
                    Arc::clone(allocator),
                    TextureDesc::flat(format, desc.width, desc.height).with_samples(desc.samples),
                )?;
                render_info.set_depth_attachment(AttachmentBinding::depth(texture.attachment_view()?), format);
                Some(texture)
            }
            None => None,
        };

        log::debug!(
            "Created offscreen target {}x{} ({} colour, depth: {}, {:?})",
            desc.width,
            desc.height,
            colour.len(),
            depth.is_some(),
            desc.samples
        );

        Ok(Self {
            desc,
            colour,
            msaa_colour,
            depth,
            render_info,
        })
    }

    /// Puts freshly created colour attachments into `ShaderReadOnly`, filling the mip chain
    /// when the target has more than one level.
    pub fn prepare(&mut self, gpu: &VulkanDevice, uploader: &Uploader) -> Result<()> {
        for texture in &self.colour {
            texture.ensure_mip_filtering(gpu)?;
        }

        let before: Vec<_> = self.colour.iter().map(Texture::layout_state).collect();
        let colour = &mut self.colour;

        let result = uploader.submit(|device, cmd| {
            for texture in colour.iter_mut() {
                if texture.mip_levels() > 1 {
                    texture.transition_layout(device, cmd, ImageLayout::TransferDst)?;
                    texture.record_mip_chain(device, cmd)?;
                } else {
                    texture.transition_layout(device, cmd, ImageLayout::ShaderReadOnly)?;
                }
            }
            Ok(())
        });

        if result.is_err() {
            for (texture, tracker) in self.colour.iter_mut().zip(before) {
                texture.restore_layout_state(tracker);
            }
        }
        result
    }

    /// Forgets every tracked attachment layout. Used when a recording that moved them was
    /// never submitted.
    pub fn discard_contents(&mut self) {
        for texture in self
            .colour
            .iter_mut()
            .chain(self.msaa_colour.iter_mut())
            .chain(self.depth.iter_mut())
        {
            texture.discard_contents();
        }
    }

    pub fn desc(&self) -> &RenderTargetDesc {
        &self.desc
    }

    pub fn attachment_mut(&mut self, idx: usize) -> Option<&mut Texture> {
        self.colour.get_mut(idx)
    }

    pub fn depth_attachment_mut(&mut self) -> Option<&mut Texture> {
        self.depth.as_mut()
    }

    pub fn colour_attachment_count(&self) -> usize {
        self.colour.len()
    }
}

/// Layout a colour attachment leaves its pass in. Only mip 0 is rendered, so a mipped
/// attachment goes to `TransferDst` and has the rest of its chain rebuilt from level 0.
pub fn colour_exit_layout(mip_levels: u32) -> ImageLayout {
    if mip_levels > 1 {
        ImageLayout::TransferDst
    } else {
        ImageLayout::ShaderReadOnly
    }
}

impl RenderTarget for OffscreenTarget {
    fn kind(&self) -> RenderTargetKind {
        RenderTargetKind::Offscreen
    }

    fn width(&self) -> u32 {
        self.desc.width
    }

    fn height(&self) -> u32 {
        self.desc.height
    }

    fn msaa(&self) -> vk::SampleCountFlags {
        self.desc.samples
    }

    fn render_info(&self) -> &RenderInfo {
        &self.render_info
    }

    fn set_clear_colour(&mut self, idx: usize, colour: [f32; 4]) {
        self.render_info.set_clear_colour(idx, colour);
    }

    fn set_depth_stencil_clear(&mut self, depth: f32, stencil: u32) {
        self.render_info.set_depth_stencil_clear(depth, stencil);
    }

    fn attachment(&self, idx: usize) -> Option<&Texture> {
        self.colour.get(idx)
    }

    fn depth_attachment(&self) -> Option<&Texture> {
        self.depth.as_ref()
    }

    fn begin_rendering(&mut self, device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
        for texture in self.colour.iter_mut().chain(self.msaa_colour.iter_mut()) {
            if texture.layout() != ImageLayout::ColourAttachment {
                texture.transition_layout(device, cmd, ImageLayout::ColourAttachment)?;
            }
        }
        if let Some(depth) = self.depth.as_mut() {
            depth.transition_layout(device, cmd, ImageLayout::DepthStencilAttachment)?;
        }
        Ok(())
    }

    fn end_rendering(&mut self, device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
        for texture in &mut self.colour {
            let exit = colour_exit_layout(texture.mip_levels());
            texture.transition_layout(device, cmd, exit)?;
            if exit == ImageLayout::TransferDst {
                texture.record_mip_chain(device, cmd)?;
            }
        }
        if let Some(depth) = self.depth.as_mut() {
            depth.transition_layout(device, cmd, ImageLayout::DepthStencilReadOnly)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desc_builders() {
        let desc = RenderTargetDesc::new(640, 480, vec![vk::Format::R16G16B16A16_SFLOAT])
            .with_depth(vk::Format::D32_SFLOAT)
            .with_samples(vk::SampleCountFlags::TYPE_4)
            .with_mips(3);

        assert!(desc.is_multisampled());
        assert_eq!(desc.depth_format, Some(vk::Format::D32_SFLOAT));
        assert_eq!(desc.mip_levels, 3);
        assert!(!RenderTargetDesc::new(1, 1, Vec::new()).is_multisampled());
    }
}
