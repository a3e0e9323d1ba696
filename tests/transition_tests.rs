use ash::vk;
use ash_forward::vulkan::transition::{
    clamp_mip_levels, has_stencil, lookup_transition, plan_mipmaps, MipStep,
};
use ash_forward::vulkan::render_target::colour_exit_layout;
use ash_forward::vulkan::{ImageLayout, LayoutTracker};
use ash_forward::AshError;

#[test]
fn test_offscreen_attachment_round_trip() {
    let mut tracker = LayoutTracker::default();

    let to_colour = tracker.transition(ImageLayout::ColourAttachment).unwrap();
    assert_eq!(to_colour.dst_stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);

    let to_sampled = tracker.transition(ImageLayout::ShaderReadOnly).unwrap();
    assert_eq!(to_sampled.src_access, ImageLayout::ColourAttachment.access());
    assert_eq!(to_sampled.dst_access, vk::AccessFlags2::SHADER_READ);

    // Next frame renders into it again.
    let back = tracker.transition(ImageLayout::ColourAttachment).unwrap();
    assert_eq!(back.src_stage, ImageLayout::ShaderReadOnly.stage());
    assert_eq!(tracker.layout(), ImageLayout::ColourAttachment);
}

#[test]
fn test_rendered_mip_chain_is_rebuilt_after_the_pass() {
    let mut tracker = LayoutTracker::default();
    tracker.transition(ImageLayout::ColourAttachment).unwrap();

    let exit = colour_exit_layout(3);
    assert_eq!(exit, ImageLayout::TransferDst);
    let barrier = tracker.transition(exit).unwrap();
    assert_eq!(barrier.src_access, ImageLayout::ColourAttachment.access());

    let steps = plan_mipmaps(tracker.layout(), 3, [64, 64, 1]).unwrap();
    let blits: Vec<_> = steps
        .iter()
        .filter_map(|step| match step {
            MipStep::Blit { src_level, dst_level, .. } => Some((*src_level, *dst_level)),
            _ => None,
        })
        .collect();
    assert_eq!(blits, vec![(0, 1), (1, 2)]);

    // Every level ends up readable.
    let readable: Vec<_> = steps
        .iter()
        .filter_map(|step| match step {
            MipStep::Barrier {
                level,
                to: ImageLayout::ShaderReadOnly,
                ..
            } => Some(*level),
            _ => None,
        })
        .collect();
    assert_eq!(readable, vec![0, 1, 2]);

    assert_eq!(colour_exit_layout(1), ImageLayout::ShaderReadOnly);
}

#[test]
fn test_discarded_tracker_starts_over_from_undefined() {
    let mut tracker = LayoutTracker::default();
    tracker.transition(ImageLayout::ColourAttachment).unwrap();
    tracker.discard();

    assert_eq!(tracker, LayoutTracker::default());
    let barrier = tracker.transition(ImageLayout::ColourAttachment).unwrap();
    assert_eq!(barrier.from, ImageLayout::Undefined);
    assert_eq!(barrier.src_stage, vk::PipelineStageFlags2::TOP_OF_PIPE);
}

#[test]
fn test_swap_image_present_cycle() {
    let mut tracker = LayoutTracker::default();
    tracker.transition(ImageLayout::ColourAttachment).unwrap();
    let present = tracker.transition(ImageLayout::PresentSrc).unwrap();
    assert_eq!(present.dst_access, vk::AccessFlags2::NONE);
    assert_eq!(present.dst_stage, vk::PipelineStageFlags2::BOTTOM_OF_PIPE);
}

#[test]
fn test_transition_into_undefined_is_rejected() {
    let err = lookup_transition(
        ImageLayout::ShaderReadOnly,
        ImageLayout::Undefined,
        vk::PipelineStageFlags2::FRAGMENT_SHADER,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        AshError::UnsupportedTransition {
            from: ImageLayout::ShaderReadOnly,
            to: ImageLayout::Undefined
        }
    ));
}

#[test]
fn test_colour_and_depth_layouts_do_not_mix() {
    let stage = vk::PipelineStageFlags2::TOP_OF_PIPE;
    assert!(lookup_transition(ImageLayout::PresentSrc, ImageLayout::DepthStencilAttachment, stage).is_err());
    assert!(lookup_transition(ImageLayout::DepthStencilReadOnly, ImageLayout::ColourAttachment, stage).is_err());
    assert!(lookup_transition(ImageLayout::DepthStencilAttachment, ImageLayout::DepthStencilReadOnly, stage).is_ok());
}

#[test]
fn test_forced_layout_is_the_next_source() {
    let mut tracker = LayoutTracker::default();
    tracker.force(ImageLayout::TransferDst, vk::PipelineStageFlags2::TRANSFER);

    let barrier = tracker.transition(ImageLayout::ShaderReadOnly).unwrap();
    assert_eq!(barrier.from, ImageLayout::TransferDst);
    assert_eq!(barrier.src_stage, vk::PipelineStageFlags2::TRANSFER);
}

#[test]
fn test_mip_chain_walks_every_level() {
    let steps = plan_mipmaps(ImageLayout::TransferDst, 3, [8, 8, 1]).unwrap();

    let expected = vec![
        MipStep::Barrier {
            level: 0,
            from: ImageLayout::TransferDst,
            to: ImageLayout::TransferSrc,
        },
        MipStep::Blit {
            src_level: 0,
            dst_level: 1,
            src_extent: [8, 8, 1],
            dst_extent: [4, 4, 1],
        },
        MipStep::Barrier {
            level: 0,
            from: ImageLayout::TransferSrc,
            to: ImageLayout::ShaderReadOnly,
        },
        MipStep::Barrier {
            level: 1,
            from: ImageLayout::TransferDst,
            to: ImageLayout::TransferSrc,
        },
        MipStep::Blit {
            src_level: 1,
            dst_level: 2,
            src_extent: [4, 4, 1],
            dst_extent: [2, 2, 1],
        },
        MipStep::Barrier {
            level: 1,
            from: ImageLayout::TransferSrc,
            to: ImageLayout::ShaderReadOnly,
        },
        MipStep::Barrier {
            level: 2,
            from: ImageLayout::TransferDst,
            to: ImageLayout::ShaderReadOnly,
        },
    ];
    assert_eq!(steps, expected);
}

#[test]
fn test_single_level_plan_only_transitions() {
    let steps = plan_mipmaps(ImageLayout::TransferDst, 1, [16, 16, 1]).unwrap();
    assert_eq!(
        steps,
        vec![MipStep::Barrier {
            level: 0,
            from: ImageLayout::TransferDst,
            to: ImageLayout::ShaderReadOnly,
        }]
    );
}

#[test]
fn test_mip_plan_from_wrong_layout_fails() {
    for layout in [ImageLayout::Undefined, ImageLayout::ColourAttachment, ImageLayout::TransferSrc] {
        let err = plan_mipmaps(layout, 2, [4, 4, 1]).unwrap_err();
        assert!(matches!(err, AshError::PreconditionFailed(_)));
    }
}

#[test]
fn test_requested_mips_are_clamped() {
    assert_eq!(clamp_mip_levels(20, 256, 256, 1), 9);
    assert_eq!(clamp_mip_levels(4, 256, 256, 1), 4);
    assert!(has_stencil(vk::Format::D24_UNORM_S8_UINT));
    assert!(!has_stencil(vk::Format::D32_SFLOAT));
}
