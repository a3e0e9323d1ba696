//! Vulkan-facing building blocks: device bring-up, memory, descriptors, pipelines, textures,
//! render targets and frame submission.

pub mod allocator;
pub mod backend;
pub mod buffer;
pub mod command;
pub mod command_buffer;
pub mod deletion_queue;
pub mod descriptor_builder;
pub mod descriptor_cache;
pub mod descriptor_layout;
pub mod descriptor_pool;
pub mod device;
pub mod frame;
pub mod instance;
pub mod pipeline;
pub mod pipeline_cache;
pub mod render_info;
pub mod render_target;
pub mod sampler;
pub mod shader;
pub mod shader_buffer;
pub mod surface_provider;
pub mod swapchain;
pub mod texture;
pub mod transition;
pub mod vertex_format;

pub use allocator::{Allocator, Residency};
pub use backend::DeviceBackend;
pub use buffer::GpuBuffer;
pub use command::{CommandPool, Uploader};
pub use command_buffer::CommandBuffer;
pub use deletion_queue::{DeletionQueue, FrameDeletionQueues};
pub use descriptor_builder::DescriptorBuilder;
pub use descriptor_cache::{BuiltSet, CacheEpoch, DescriptorCache, DescriptorSetCache};
pub use descriptor_layout::{DescriptorLayoutCache, DescriptorLayoutKey, LayoutBinding};
pub use descriptor_pool::{DescriptorPoolDynamic, DescriptorPoolStatic, PoolRatio};
pub use device::VulkanDevice;
pub use frame::FrameCounter;
pub use instance::VulkanInstance;
pub use pipeline::{
    BlendState, ComputePipelineDefinition, DepthState, GraphicsPipelineDefinition,
    MultisampleState, PipelineData,
};
pub use pipeline_cache::PipelineCache;
pub use render_info::{AttachmentBinding, AttachmentClear, RenderInfo, TargetSignature};
pub use render_target::{OffscreenTarget, RenderTarget, RenderTargetDesc, RenderTargetKind};
pub use sampler::{SamplerStyle, TextureSampler};
pub use shader::{ShaderEffect, ShaderParameters, ShaderProgram, ShaderStage};
pub use shader_buffer::{DynamicShaderBuffer, ShaderBufferKind, ShaderBufferRing};
pub use surface_provider::{SurfaceProvider, WindowSurfaceProvider};
pub use swapchain::{Backbuffer, PresentationOps, Swapchain};
pub use texture::{BoundTexture, Texture, TextureDesc, TextureKind};
pub use transition::{ImageLayout, LayoutTracker};
pub use vertex_format::VertexFormat;
