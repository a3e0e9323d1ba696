use ash::vk;
use std::collections::HashMap;
use std::sync::Arc;

use crate::utils::handle_table::ResourceId;
use crate::vulkan::transition::{
    aspect_for_format, clamp_mip_levels, is_depth_format, lookup_transition, plan_mipmaps,
    view_aspect_for_format, ImageLayout, LayoutTracker, MipStep,
};
use crate::vulkan::{Allocator, VulkanDevice};
use crate::{AshError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Flat,
    FlatArray,
    Volume,
    Cube,
    CubeArray,
}

impl TextureKind {
    pub fn image_type(self) -> vk::ImageType {
        match self {
            TextureKind::Volume => vk::ImageType::TYPE_3D,
            _ => vk::ImageType::TYPE_2D,
        }
    }

    pub fn view_type(self) -> vk::ImageViewType {
        match self {
            TextureKind::Flat => vk::ImageViewType::TYPE_2D,
            TextureKind::FlatArray => vk::ImageViewType::TYPE_2D_ARRAY,
            TextureKind::Volume => vk::ImageViewType::TYPE_3D,
            TextureKind::Cube => vk::ImageViewType::CUBE,
            TextureKind::CubeArray => vk::ImageViewType::CUBE_ARRAY,
        }
    }

    pub fn is_cube(self) -> bool {
        matches!(self, TextureKind::Cube | TextureKind::CubeArray)
    }
}

/// Creation parameters for a [`Texture`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub kind: TextureKind,
    pub format: vk::Format,
    pub width: u32,
    pub height: u32,
    /// Extent depth for volumes, layer count for arrays, cube count for cube arrays.
    pub depth: u32,
    pub mip_levels: u32,
    pub samples: vk::SampleCountFlags,
    pub transient: bool,
    pub storage: bool,
}

impl TextureDesc {
    pub fn flat(format: vk::Format, width: u32, height: u32) -> Self {
        Self {
            kind: TextureKind::Flat,
            format,
            width,
            height,
            depth: 1,
            mip_levels: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            transient: false,
            storage: false,
        }
    }

    pub fn cube(format: vk::Format, size: u32) -> Self {
        Self {
            kind: TextureKind::Cube,
            ..Self::flat(format, size, size)
        }
    }

    pub fn with_kind(mut self, kind: TextureKind, depth: u32) -> Self {
        self.kind = kind;
        self.depth = depth.max(1);
        self
    }

    /// Requested mip count; clamped to the full chain for the extent.
    pub fn with_mips(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    pub fn with_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    pub fn storage(mut self) -> Self {
        self.storage = true;
        self
    }

    pub fn is_depth(&self) -> bool {
        is_depth_format(self.format)
    }

    pub fn face_count(&self) -> u32 {
        if self.kind.is_cube() {
            6
        } else {
            1
        }
    }

    pub fn layer_count(&self) -> u32 {
        match self.kind {
            TextureKind::Flat | TextureKind::Volume => 1,
            TextureKind::FlatArray => self.depth,
            TextureKind::Cube => 6,
            TextureKind::CubeArray => 6 * self.depth,
        }
    }

    pub fn extent(&self) -> vk::Extent3D {
        let depth = match self.kind {
            TextureKind::Volume => self.depth,
            _ => 1,
        };
        vk::Extent3D {
            width: self.width,
            height: self.height,
            depth,
        }
    }

    pub fn clamped_mip_levels(&self) -> u32 {
        let extent = self.extent();
        clamp_mip_levels(self.mip_levels, extent.width, extent.height, extent.depth)
    }

    pub fn image_usage(&self) -> vk::ImageUsageFlags {
        let mut usage = if self.transient {
            vk::ImageUsageFlags::TRANSIENT_ATTACHMENT
        } else {
            vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::SAMPLED
        };

        if self.storage {
            usage |= vk::ImageUsageFlags::STORAGE;
        }

        if self.is_depth() {
            usage |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        } else {
            usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }

        usage
    }

    pub fn image_flags(&self) -> vk::ImageCreateFlags {
        if self.kind.is_cube() {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        }
    }

    pub fn image_create_info(&self) -> vk::ImageCreateInfo<'static> {
        vk::ImageCreateInfo::default()
            .image_type(self.kind.image_type())
            .format(self.format)
            .extent(self.extent())
            .mip_levels(self.clamped_mip_levels())
            .array_layers(self.layer_count())
            .samples(self.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(self.image_usage())
            .flags(self.image_flags())
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
    }

    /// View type for a view covering `layer_count` layers. A single cube face is viewed as a
    /// one-layer 2D array.
    pub fn view_type_for(&self, layer_count: u32) -> vk::ImageViewType {
        if self.kind == TextureKind::Cube && layer_count == 1 {
            vk::ImageViewType::TYPE_2D_ARRAY
        } else {
            self.kind.view_type()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ViewKey {
    layer_count: u32,
    base_layer: u32,
    base_mip: u32,
    level_count: u32,
    aspect: vk::ImageAspectFlags,
}

/// View + sampler + layout as written into a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundTexture {
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
    pub layout: vk::ImageLayout,
}

impl BoundTexture {
    pub fn image_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.view,
            image_layout: self.layout,
        }
    }
}

/// A GPU image with its views and tracked layout.
pub struct Texture {
    device: Arc<ash::Device>,
    allocator: Arc<Allocator>,
    image: vk::Image,
    allocation: vk_mem::Allocation,
    desc: TextureDesc,
    mip_levels: u32,
    tracker: LayoutTracker,
    views: HashMap<ViewKey, vk::ImageView>,
    owner: Option<ResourceId>,
}

impl Texture {
    pub fn new(device: Arc<ash::Device>, allocator: Arc<Allocator>, desc: TextureDesc) -> Result<Self> {
        let info = desc.image_create_info();
        let (image, allocation) = unsafe { allocator.create_image(&info, desc.transient)? };

        log::debug!(
            "Created {:?} texture {}x{} {:?} ({} mips, {} layers)",
            desc.kind,
            desc.width,
            desc.height,
            desc.format,
            info.mip_levels,
            info.array_layers
        );

        Ok(Self {
            device,
            allocator,
            image,
            allocation,
            mip_levels: info.mip_levels,
            desc,
            tracker: LayoutTracker::default(),
            views: HashMap::new(),
            owner: None,
        })
    }

    pub fn image(&self) -> vk::Image {
        self.image
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn samples(&self) -> vk::SampleCountFlags {
        self.desc.samples
    }

    pub fn layout(&self) -> ImageLayout {
        self.tracker.layout()
    }

    pub fn stage(&self) -> vk::PipelineStageFlags2 {
        self.tracker.stage()
    }

    /// Render target this texture is attached to, if any.
    pub fn owner(&self) -> Option<ResourceId> {
        self.owner
    }

    pub fn set_owner(&mut self, owner: Option<ResourceId>) {
        self.owner = owner;
    }

    pub fn full_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: aspect_for_format(self.desc.format),
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: self.desc.layer_count(),
        }
    }

    /// View over every layer and mip.
    pub fn standard_view(&mut self) -> Result<vk::ImageView> {
        self.view(self.desc.layer_count(), 0, 0)
    }

    pub fn view(&mut self, layer_count: u32, base_layer: u32, base_mip: u32) -> Result<vk::ImageView> {
        self.cached_view(ViewKey {
            layer_count,
            base_layer,
            base_mip,
            level_count: self.mip_levels.saturating_sub(base_mip),
            aspect: view_aspect_for_format(self.desc.format),
        })
    }

    /// Single-mip view of layer 0 for use as a rendering attachment. Depth-stencil formats keep
    /// both aspects here.
    pub fn attachment_view(&mut self) -> Result<vk::ImageView> {
        self.cached_view(ViewKey {
            layer_count: 1,
            base_layer: 0,
            base_mip: 0,
            level_count: 1,
            aspect: aspect_for_format(self.desc.format),
        })
    }

    fn cached_view(&mut self, key: ViewKey) -> Result<vk::ImageView> {
        if let Some(&view) = self.views.get(&key) {
            return Ok(view);
        }

        if key.level_count == 0
            || key.base_mip + key.level_count > self.mip_levels
            || key.base_layer + key.layer_count > self.desc.layer_count()
        {
            return Err(AshError::PreconditionFailed(format!(
                "view range (layers {}+{}, mips {}+{}) outside image",
                key.base_layer, key.layer_count, key.base_mip, key.level_count
            )));
        }

        let info = vk::ImageViewCreateInfo::default()
            .image(self.image)
            .view_type(self.desc.view_type_for(key.layer_count))
            .format(self.desc.format)
            .components(vk::ComponentMapping::default())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: key.aspect,
                base_mip_level: key.base_mip,
                level_count: key.level_count,
                base_array_layer: key.base_layer,
                layer_count: key.layer_count,
            });

        let view = unsafe { self.device.create_image_view(&info, None) }.map_err(|e| {
            log::error!("Failed to create image view for {:?}: {e:?}", self.desc.format);
            AshError::vk("vkCreateImageView", e)
        })?;

        self.views.insert(key, view);
        Ok(view)
    }

    /// Descriptor binding for sampling the whole texture. Fails unless the tracked layout is
    /// one a shader can read.
    pub fn bound(&mut self, sampler: vk::Sampler) -> Result<BoundTexture> {
        let layout = sampled_layout(self.tracker.layout(), self.desc.is_depth())?;
        Ok(BoundTexture {
            view: self.standard_view()?,
            sampler,
            layout,
        })
    }

    /// Records a barrier moving every subresource to `new_layout`.
    /// Unsupported pairs fail before anything is recorded.
    pub fn transition_layout(
        &mut self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        new_layout: ImageLayout,
    ) -> Result<()> {
        let transition = self.tracker.transition(new_layout)?;
        let barrier = transition.image_barrier(self.image, self.full_range());
        let dependency =
            vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&barrier));

        unsafe { device.cmd_pipeline_barrier2(cmd, &dependency) };
        Ok(())
    }

    /// Current tracked state, for restoring after a recording that was never submitted.
    pub fn layout_state(&self) -> LayoutTracker {
        self.tracker
    }

    pub fn restore_layout_state(&mut self, tracker: LayoutTracker) {
        self.tracker = tracker;
    }

    /// Drops the tracked layout after its barriers were discarded unsubmitted.
    pub fn discard_contents(&mut self) {
        self.tracker.discard();
    }

    /// Fails when this texture has a mip chain the device cannot blit with a linear filter.
    /// Checked before any barrier is recorded.
    pub fn ensure_mip_filtering(&self, gpu: &VulkanDevice) -> Result<()> {
        check_mip_filtering(
            self.desc.format,
            self.mip_levels,
            self.mip_levels <= 1 || gpu.supports_linear_blit(self.desc.format),
        )
    }

    /// Fills mips `1..` from level 0 and leaves the whole image in `ShaderReadOnly`.
    /// Every level must be in `TransferDst`.
    pub fn generate_mipmaps(&mut self, gpu: &VulkanDevice, cmd: vk::CommandBuffer) -> Result<()> {
        self.ensure_mip_filtering(gpu)?;
        self.record_mip_chain(gpu.device.as_ref(), cmd)
    }

    /// [`Texture::generate_mipmaps`] without the format check, for callers that ran
    /// [`Texture::ensure_mip_filtering`] up front.
    pub fn record_mip_chain(&mut self, device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
        let extent = self.desc.extent();
        let steps = plan_mipmaps(
            self.tracker.layout(),
            self.mip_levels,
            [extent.width, extent.height, extent.depth],
        )?;

        let aspect = aspect_for_format(self.desc.format);
        let layer_count = self.desc.layer_count();

        for step in steps {
            match step {
                MipStep::Barrier { level, from, to } => {
                    let transition = lookup_transition(from, to, from.stage())?;
                    let barrier = transition.image_barrier(
                        self.image,
                        vk::ImageSubresourceRange {
                            aspect_mask: aspect,
                            base_mip_level: level,
                            level_count: 1,
                            base_array_layer: 0,
                            layer_count,
                        },
                    );
                    let dependency = vk::DependencyInfo::default()
                        .image_memory_barriers(std::slice::from_ref(&barrier));
                    unsafe { device.cmd_pipeline_barrier2(cmd, &dependency) };
                }
                MipStep::Blit {
                    src_level,
                    dst_level,
                    src_extent,
                    dst_extent,
                } => {
                    let region = vk::ImageBlit {
                        src_subresource: vk::ImageSubresourceLayers {
                            aspect_mask: aspect,
                            mip_level: src_level,
                            base_array_layer: 0,
                            layer_count,
                        },
                        src_offsets: [
                            vk::Offset3D::default(),
                            vk::Offset3D {
                                x: src_extent[0],
                                y: src_extent[1],
                                z: src_extent[2],
                            },
                        ],
                        dst_subresource: vk::ImageSubresourceLayers {
                            aspect_mask: aspect,
                            mip_level: dst_level,
                            base_array_layer: 0,
                            layer_count,
                        },
                        dst_offsets: [
                            vk::Offset3D::default(),
                            vk::Offset3D {
                                x: dst_extent[0],
                                y: dst_extent[1],
                                z: dst_extent[2],
                            },
                        ],
                    };
                    unsafe {
                        device.cmd_blit_image(
                            cmd,
                            self.image,
                            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                            self.image,
                            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                            &[region],
                            vk::Filter::LINEAR,
                        );
                    }
                }
            }
        }

        self.tracker.force(
            ImageLayout::ShaderReadOnly,
            vk::PipelineStageFlags2::FRAGMENT_SHADER,
        );
        Ok(())
    }

    /// Copy regions for `faces` tightly packed faces of `face_size` bytes into mip 0.
    pub fn face_copy_regions(&self, faces: u32, face_size: u64) -> Vec<vk::BufferImageCopy> {
        (0..faces)
            .map(|face| vk::BufferImageCopy {
                buffer_offset: face as u64 * face_size,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: view_aspect_for_format(self.desc.format),
                    mip_level: 0,
                    base_array_layer: face,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D::default(),
                image_extent: self.desc.extent(),
            })
            .collect()
    }
}

/// Layout a descriptor should name when sampling an image tracked in `tracked`.
pub fn sampled_layout(tracked: ImageLayout, is_depth: bool) -> Result<vk::ImageLayout> {
    match (tracked, is_depth) {
        (ImageLayout::ShaderReadOnly, _) => Ok(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        (ImageLayout::DepthStencilReadOnly, true) => {
            Ok(vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL)
        }
        (ImageLayout::General, _) => Ok(vk::ImageLayout::GENERAL),
        _ => Err(AshError::PreconditionFailed(format!("cannot sample an image in {tracked:?}"))),
    }
}

/// Mip chains are built with linear blits, which `format` must support.
pub fn check_mip_filtering(format: vk::Format, mip_levels: u32, linear_blit: bool) -> Result<()> {
    if mip_levels > 1 && !linear_blit {
        log::error!("{format:?} does not support linear blitting");
        return Err(AshError::UnsupportedFormat(format!(
            "{format:?} cannot be linearly blitted for mipmaps"
        )));
    }
    Ok(())
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            for (_, view) in self.views.drain() {
                self.device.destroy_image_view(view, None);
            }
            self.allocator.destroy_image(self.image, &mut self.allocation);
        }
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("image", &self.image)
            .field("desc", &self.desc)
            .field("mip_levels", &self.mip_levels)
            .field("layout", &self.tracker.layout())
            .finish()
    }
}
