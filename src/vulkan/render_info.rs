use ash::vk;

use crate::vulkan::transition::has_stencil;

/// Clear value for one attachment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttachmentClear {
    Colour([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl AttachmentClear {
    pub fn to_vk(self) -> vk::ClearValue {
        match self {
            AttachmentClear::Colour(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32 },
            },
            AttachmentClear::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

/// One attachment of a dynamic-rendering scope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttachmentBinding {
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub resolve_view: Option<vk::ImageView>,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear: AttachmentClear,
}

impl AttachmentBinding {
    pub fn colour(view: vk::ImageView) -> Self {
        Self {
            view,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            resolve_view: None,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear: AttachmentClear::Colour(crate::config::DEFAULT_CLEAR_COLOUR),
        }
    }

    pub fn depth(view: vk::ImageView) -> Self {
        Self {
            view,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            resolve_view: None,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear: AttachmentClear::DepthStencil {
                depth: 1.0,
                stencil: 0,
            },
        }
    }

    pub fn to_vk(&self) -> vk::RenderingAttachmentInfo<'static> {
        let info = vk::RenderingAttachmentInfo::default()
            .image_view(self.view)
            .image_layout(self.layout)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(self.clear.to_vk());

        match self.resolve_view {
            Some(resolve) => info
                .resolve_mode(vk::ResolveModeFlags::AVERAGE)
                .resolve_image_view(resolve)
                .resolve_image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
            None => info,
        }
    }
}

/// Attachment formats + sample count a pipeline is compiled against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TargetSignature {
    pub colour_formats: Vec<vk::Format>,
    pub depth_format: Option<vk::Format>,
    pub samples: vk::SampleCountFlags,
}

impl TargetSignature {
    pub fn stencil_format(&self) -> Option<vk::Format> {
        self.depth_format.filter(|&format| has_stencil(format))
    }
}

/// Everything needed to open a dynamic-rendering scope on a target.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderInfo {
    width: u32,
    height: u32,
    samples: vk::SampleCountFlags,
    colour: Vec<AttachmentBinding>,
    colour_formats: Vec<vk::Format>,
    depth: Option<(AttachmentBinding, vk::Format)>,
}

impl RenderInfo {
    pub fn new(width: u32, height: u32, samples: vk::SampleCountFlags) -> Self {
        Self {
            width,
            height,
            samples,
            colour: Vec::new(),
            colour_formats: Vec::new(),
            depth: None,
        }
    }

    pub fn add_colour_attachment(&mut self, binding: AttachmentBinding, format: vk::Format) {
        self.colour.push(binding);
        self.colour_formats.push(format);
    }

    pub fn set_depth_attachment(&mut self, binding: AttachmentBinding, format: vk::Format) {
        self.depth = Some((binding, format));
    }

    pub fn colour_attachment_mut(&mut self, idx: usize) -> Option<&mut AttachmentBinding> {
        self.colour.get_mut(idx)
    }

    pub fn depth_attachment_mut(&mut self) -> Option<&mut AttachmentBinding> {
        self.depth.as_mut().map(|(binding, _)| binding)
    }

    pub fn set_clear_colour(&mut self, idx: usize, colour: [f32; 4]) {
        if let Some(binding) = self.colour.get_mut(idx) {
            binding.clear = AttachmentClear::Colour(colour);
        }
    }

    pub fn set_depth_stencil_clear(&mut self, depth: f32, stencil: u32) {
        if let Some((binding, _)) = self.depth.as_mut() {
            binding.clear = AttachmentClear::DepthStencil { depth, stencil };
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    pub fn colour_attachment_count(&self) -> usize {
        self.colour.len()
    }

    pub fn signature(&self) -> TargetSignature {
        TargetSignature {
            colour_formats: self.colour_formats.clone(),
            depth_format: self.depth.map(|(_, format)| format),
            samples: self.samples,
        }
    }

    pub fn render_area(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D {
                width: self.width,
                height: self.height,
            },
        }
    }

    /// Viewport flipped so +Y points up in clip space.
    pub fn flipped_viewport(&self) -> vk::Viewport {
        vk::Viewport {
            x: 0.0,
            y: self.height as f32,
            width: self.width as f32,
            height: -(self.height as f32),
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    pub fn colour_attachment_infos(&self) -> Vec<vk::RenderingAttachmentInfo<'static>> {
        self.colour.iter().map(AttachmentBinding::to_vk).collect()
    }

    pub fn depth_attachment_info(&self) -> Option<vk::RenderingAttachmentInfo<'static>> {
        self.depth.map(|(binding, _)| binding.to_vk())
    }

    pub fn has_stencil(&self) -> bool {
        self.depth.is_some_and(|(_, format)| has_stencil(format))
    }
}
