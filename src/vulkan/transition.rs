//! Image layout state machine.
//!
//! Every image tracks a single [`ImageLayout`] plus the pipeline stage of the last barrier. A
//! transition is looked up in a fixed table before anything is recorded, so an unsupported pair
//! fails without touching the command buffer.

use ash::vk;

use crate::{AshError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    General,
    ColourAttachment,
    DepthStencilAttachment,
    DepthStencilReadOnly,
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
    PresentSrc,
}

impl ImageLayout {
    pub fn to_vk(self) -> vk::ImageLayout {
        match self {
            ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
            ImageLayout::General => vk::ImageLayout::GENERAL,
            ImageLayout::ColourAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ImageLayout::DepthStencilAttachment => {
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
            }
            ImageLayout::DepthStencilReadOnly => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            ImageLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }

    /// Accesses that must be made visible (as destination) or available (as source) for
    /// an image sitting in this layout.
    pub fn access(self) -> vk::AccessFlags2 {
        match self {
            ImageLayout::Undefined | ImageLayout::PresentSrc => vk::AccessFlags2::NONE,
            ImageLayout::General => vk::AccessFlags2::SHADER_READ | vk::AccessFlags2::SHADER_WRITE,
            ImageLayout::ColourAttachment => {
                vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE
            }
            ImageLayout::DepthStencilAttachment => {
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE
            }
            ImageLayout::DepthStencilReadOnly => {
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::SHADER_READ
            }
            ImageLayout::ShaderReadOnly => vk::AccessFlags2::SHADER_READ,
            ImageLayout::TransferSrc => vk::AccessFlags2::TRANSFER_READ,
            ImageLayout::TransferDst => vk::AccessFlags2::TRANSFER_WRITE,
        }
    }

    /// Stages that touch an image in this layout.
    pub fn stage(self) -> vk::PipelineStageFlags2 {
        match self {
            ImageLayout::Undefined => vk::PipelineStageFlags2::TOP_OF_PIPE,
            ImageLayout::General | ImageLayout::ShaderReadOnly => {
                vk::PipelineStageFlags2::COMPUTE_SHADER | vk::PipelineStageFlags2::FRAGMENT_SHADER
            }
            ImageLayout::ColourAttachment => vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            ImageLayout::DepthStencilAttachment => {
                vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS
            }
            ImageLayout::DepthStencilReadOnly => {
                vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS
                    | vk::PipelineStageFlags2::FRAGMENT_SHADER
            }
            ImageLayout::TransferSrc | ImageLayout::TransferDst => {
                vk::PipelineStageFlags2::TRANSFER
            }
            ImageLayout::PresentSrc => vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
        }
    }

    fn is_colour_only(self) -> bool {
        matches!(self, ImageLayout::ColourAttachment | ImageLayout::PresentSrc)
    }

    fn is_depth_only(self) -> bool {
        matches!(
            self,
            ImageLayout::DepthStencilAttachment | ImageLayout::DepthStencilReadOnly
        )
    }
}

/// Masks and stages for one barrier, resolved from the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ImageLayout,
    pub to: ImageLayout,
    pub src_stage: vk::PipelineStageFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_access: vk::AccessFlags2,
}

impl Transition {
    pub fn image_barrier(
        &self,
        image: vk::Image,
        range: vk::ImageSubresourceRange,
    ) -> vk::ImageMemoryBarrier2<'static> {
        vk::ImageMemoryBarrier2::default()
            .src_stage_mask(self.src_stage)
            .src_access_mask(self.src_access)
            .dst_stage_mask(self.dst_stage)
            .dst_access_mask(self.dst_access)
            .old_layout(self.from.to_vk())
            .new_layout(self.to.to_vk())
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(range)
    }
}

/// Looks up `from -> to`. `src_stage` is the stage recorded by the previous barrier.
pub fn lookup_transition(
    from: ImageLayout,
    to: ImageLayout,
    src_stage: vk::PipelineStageFlags2,
) -> Result<Transition> {
    let crosses_aspect = (from.is_colour_only() && to.is_depth_only())
        || (from.is_depth_only() && to.is_colour_only());

    if to == ImageLayout::Undefined || crosses_aspect {
        log::error!("Rejected layout transition {from:?} -> {to:?}");
        return Err(AshError::UnsupportedTransition { from, to });
    }

    Ok(Transition {
        from,
        to,
        src_stage,
        dst_stage: to.stage(),
        src_access: from.access(),
        dst_access: to.access(),
    })
}

/// Authoritative layout + stage for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTracker {
    layout: ImageLayout,
    stage: vk::PipelineStageFlags2,
}

impl Default for LayoutTracker {
    fn default() -> Self {
        Self {
            layout: ImageLayout::Undefined,
            stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
        }
    }
}

impl LayoutTracker {
    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    pub fn stage(&self) -> vk::PipelineStageFlags2 {
        self.stage
    }

    /// Resolves the barrier for `to` and advances the tracked state.
    /// On error the tracked state is left untouched.
    pub fn transition(&mut self, to: ImageLayout) -> Result<Transition> {
        let transition = lookup_transition(self.layout, to, self.stage)?;
        self.layout = to;
        self.stage = transition.dst_stage;
        Ok(transition)
    }

    /// Overrides the tracked state after barriers recorded outside the tracker
    /// (per-level mip barriers, render-pass-less resolves).
    pub fn force(&mut self, layout: ImageLayout, stage: vk::PipelineStageFlags2) {
        self.layout = layout;
        self.stage = stage;
    }

    /// Forgets the tracked layout after recorded barriers were thrown away unsubmitted.
    /// The next transition starts from `Undefined`, so the image contents are not kept.
    pub fn discard(&mut self) {
        *self = Self::default();
    }
}

pub fn is_depth_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D32_SFLOAT
            | vk::Format::S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

pub fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

/// Aspect used for barriers covering the whole image.
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match (is_depth_format(format), has_stencil(format)) {
        (true, true) if format == vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        (true, true) => vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
        (true, false) => vk::ImageAspectFlags::DEPTH,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Aspect used for sampled views. Depth-stencil images are sampled through depth only.
pub fn view_aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    if format == vk::Format::S8_UINT {
        vk::ImageAspectFlags::STENCIL
    } else if is_depth_format(format) {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Full mip chain length for an extent: `1 + floor(log2(max(w, h, d)))`.
pub fn max_mip_levels(width: u32, height: u32, depth: u32) -> u32 {
    let largest = width.max(height).max(depth).max(1);
    u32::BITS - largest.leading_zeros()
}

/// Clamps a requested mip count into `1..=max_mip_levels`.
pub fn clamp_mip_levels(requested: u32, width: u32, height: u32, depth: u32) -> u32 {
    requested.clamp(1, max_mip_levels(width, height, depth))
}

/// One step of a mip chain generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MipStep {
    Barrier {
        level: u32,
        from: ImageLayout,
        to: ImageLayout,
    },
    Blit {
        src_level: u32,
        dst_level: u32,
        src_extent: [i32; 3],
        dst_extent: [i32; 3],
    },
}

/// Plans the barriers and blits that fill levels `1..mip_levels` from level 0.
///
/// Every level must currently be in `TransferDst`; the chain ends with every level in
/// `ShaderReadOnly`.
pub fn plan_mipmaps(current: ImageLayout, mip_levels: u32, extent: [u32; 3]) -> Result<Vec<MipStep>> {
    if current != ImageLayout::TransferDst {
        return Err(AshError::PreconditionFailed(format!(
            "mipmap generation requires TransferDst, image is in {current:?}"
        )));
    }

    let mut steps = Vec::with_capacity(mip_levels as usize * 3);
    let mut size = [extent[0] as i32, extent[1] as i32, extent[2].max(1) as i32];

    for level in 1..mip_levels {
        let next = [
            (size[0] / 2).max(1),
            (size[1] / 2).max(1),
            (size[2] / 2).max(1),
        ];

        steps.push(MipStep::Barrier {
            level: level - 1,
            from: ImageLayout::TransferDst,
            to: ImageLayout::TransferSrc,
        });
        steps.push(MipStep::Blit {
            src_level: level - 1,
            dst_level: level,
            src_extent: size,
            dst_extent: next,
        });
        steps.push(MipStep::Barrier {
            level: level - 1,
            from: ImageLayout::TransferSrc,
            to: ImageLayout::ShaderReadOnly,
        });

        size = next;
    }

    steps.push(MipStep::Barrier {
        level: mip_levels.saturating_sub(1),
        from: ImageLayout::TransferDst,
        to: ImageLayout::ShaderReadOnly,
    });

    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_starts_undefined_at_top_of_pipe() {
        let tracker = LayoutTracker::default();
        assert_eq!(tracker.layout(), ImageLayout::Undefined);
        assert_eq!(tracker.stage(), vk::PipelineStageFlags2::TOP_OF_PIPE);
    }

    #[test]
    fn test_upload_sequence() {
        let mut tracker = LayoutTracker::default();

        let to_dst = tracker.transition(ImageLayout::TransferDst).unwrap();
        assert_eq!(to_dst.src_access, vk::AccessFlags2::NONE);
        assert_eq!(to_dst.dst_access, vk::AccessFlags2::TRANSFER_WRITE);
        assert_eq!(to_dst.src_stage, vk::PipelineStageFlags2::TOP_OF_PIPE);
        assert_eq!(to_dst.dst_stage, vk::PipelineStageFlags2::TRANSFER);

        let to_read = tracker.transition(ImageLayout::ShaderReadOnly).unwrap();
        assert_eq!(to_read.src_stage, vk::PipelineStageFlags2::TRANSFER);
        assert_eq!(to_read.src_access, vk::AccessFlags2::TRANSFER_WRITE);
        assert_eq!(to_read.dst_access, vk::AccessFlags2::SHADER_READ);
        assert_eq!(tracker.layout(), ImageLayout::ShaderReadOnly);
    }

    #[test]
    fn test_rejected_pair_leaves_state() {
        let mut tracker = LayoutTracker::default();
        tracker.transition(ImageLayout::ColourAttachment).unwrap();

        let err = tracker.transition(ImageLayout::DepthStencilAttachment).unwrap_err();
        assert!(matches!(
            err,
            AshError::UnsupportedTransition {
                from: ImageLayout::ColourAttachment,
                to: ImageLayout::DepthStencilAttachment
            }
        ));
        assert_eq!(tracker.layout(), ImageLayout::ColourAttachment);
        assert!(tracker.transition(ImageLayout::Undefined).is_err());
    }

    #[test]
    fn test_aspect_selection() {
        assert_eq!(
            aspect_for_format(vk::Format::D32_SFLOAT_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(aspect_for_format(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(aspect_for_format(vk::Format::R8G8B8A8_UNORM), vk::ImageAspectFlags::COLOR);
        assert_eq!(
            view_aspect_for_format(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH
        );
    }

    #[test]
    fn test_mip_level_clamp() {
        assert_eq!(max_mip_levels(1024, 512, 1), 11);
        assert_eq!(max_mip_levels(1, 1, 1), 1);
        assert_eq!(clamp_mip_levels(32, 300, 200, 1), 9);
        assert_eq!(clamp_mip_levels(0, 64, 64, 1), 1);
    }

    #[test]
    fn test_mipmap_plan_requires_transfer_dst() {
        let err = plan_mipmaps(ImageLayout::ShaderReadOnly, 4, [16, 16, 1]).unwrap_err();
        assert!(matches!(err, AshError::PreconditionFailed(_)));
    }

    #[test]
    fn test_mipmap_plan_ends_in_shader_read() {
        let steps = plan_mipmaps(ImageLayout::TransferDst, 3, [8, 4, 1]).unwrap();
        assert_eq!(steps.len(), 7);
        assert_eq!(
            steps[1],
            MipStep::Blit {
                src_level: 0,
                dst_level: 1,
                src_extent: [8, 4, 1],
                dst_extent: [4, 2, 1],
            }
        );
        assert_eq!(
            steps.last(),
            Some(&MipStep::Barrier {
                level: 2,
                from: ImageLayout::TransferDst,
                to: ImageLayout::ShaderReadOnly,
            })
        );
    }
}
