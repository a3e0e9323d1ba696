//! Fixed-function state descriptions and pipeline assembly.
//!
//! Every state struct derives `Hash`/`Eq` so a whole [`GraphicsPipelineDefinition`] can serve as
//! part of a cache key. Float parameters are stored as raw bits for that reason.

use ash::prelude::VkResult;
use ash::vk;

use crate::vulkan::backend::DeviceBackend;
use crate::vulkan::render_info::TargetSignature;
use crate::vulkan::shader::{ShaderEffect, ShaderStage};
use crate::vulkan::vertex_format::VertexFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendEquation {
    pub src_factor: vk::BlendFactor,
    pub dst_factor: vk::BlendFactor,
    pub op: vk::BlendOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub enabled: bool,
    pub colour: BlendEquation,
    pub alpha: BlendEquation,
    pub write_mask: vk::ColorComponentFlags,
    pub logic_op: Option<vk::LogicOp>,
    constants_bits: [u32; 4],
}

impl Default for BlendState {
    /// Straight alpha blending.
    fn default() -> Self {
        Self {
            enabled: true,
            colour: BlendEquation {
                src_factor: vk::BlendFactor::SRC_ALPHA,
                dst_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
                op: vk::BlendOp::ADD,
            },
            alpha: BlendEquation {
                src_factor: vk::BlendFactor::ONE,
                dst_factor: vk::BlendFactor::ZERO,
                op: vk::BlendOp::ADD,
            },
            write_mask: vk::ColorComponentFlags::RGBA,
            logic_op: None,
            constants_bits: [0; 4],
        }
    }
}

impl BlendState {
    pub fn opaque() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_constants(mut self, constants: [f32; 4]) -> Self {
        self.constants_bits = constants.map(f32::to_bits);
        self
    }

    pub fn constants(&self) -> [f32; 4] {
        self.constants_bits.map(f32::from_bits)
    }

    fn attachment_state(&self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState {
            blend_enable: self.enabled.into(),
            src_color_blend_factor: self.colour.src_factor,
            dst_color_blend_factor: self.colour.dst_factor,
            color_blend_op: self.colour.op,
            src_alpha_blend_factor: self.alpha.src_factor,
            dst_alpha_blend_factor: self.alpha.dst_factor,
            alpha_blend_op: self.alpha.op,
            color_write_mask: self.write_mask,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
    pub compare_op: vk::CompareOp,
    pub stencil_test: bool,
    bounds_bits: [u32; 2],
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test: true,
            write: true,
            compare_op: vk::CompareOp::LESS,
            stencil_test: false,
            bounds_bits: [0.0f32.to_bits(), 1.0f32.to_bits()],
        }
    }
}

impl DepthState {
    pub fn disabled() -> Self {
        Self {
            test: false,
            write: false,
            ..Self::default()
        }
    }

    pub fn with_bounds(mut self, min: f32, max: f32) -> Self {
        self.bounds_bits = [min.to_bits(), max.to_bits()];
        self
    }

    pub fn bounds(&self) -> (f32, f32) {
        (
            f32::from_bits(self.bounds_bits[0]),
            f32::from_bits(self.bounds_bits[1]),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MultisampleState {
    pub sample_shading: bool,
    min_sample_shading_bits: u32,
}

impl Default for MultisampleState {
    fn default() -> Self {
        Self {
            sample_shading: true,
            min_sample_shading_bits: 0.2f32.to_bits(),
        }
    }
}

impl MultisampleState {
    pub fn with_min_sample_shading(mut self, min: f32) -> Self {
        self.min_sample_shading_bits = min.to_bits();
        self
    }

    pub fn min_sample_shading(&self) -> f32 {
        f32::from_bits(self.min_sample_shading_bits)
    }
}

/// Everything about a graphics pipeline that does not depend on the render target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphicsPipelineDefinition {
    pub effect: ShaderEffect,
    pub vertex_format: VertexFormat,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth: DepthState,
    pub blend: BlendState,
    pub multisample: MultisampleState,
}

impl GraphicsPipelineDefinition {
    pub fn new(effect: ShaderEffect, vertex_format: VertexFormat) -> Self {
        Self {
            effect,
            vertex_format,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            depth: DepthState::default(),
            blend: BlendState::default(),
            multisample: MultisampleState::default(),
        }
    }

    pub fn with_cull_mode(mut self, cull_mode: vk::CullModeFlags) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    pub fn with_front_face(mut self, front_face: vk::FrontFace) -> Self {
        self.front_face = front_face;
        self
    }

    pub fn with_depth(mut self, depth: DepthState) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_blend(mut self, blend: BlendState) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_multisample(mut self, multisample: MultisampleState) -> Self {
        self.multisample = multisample;
        self
    }

    pub fn with_topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }
}

/// Cache key: definition + target signature + resolved layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphicsPipelineKey {
    pub definition: GraphicsPipelineDefinition,
    pub target: TargetSignature,
    pub layout: vk::PipelineLayout,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComputePipelineDefinition {
    pub effect: ShaderEffect,
}

impl ComputePipelineDefinition {
    pub fn new(effect: ShaderEffect) -> Self {
        Self { effect }
    }

    pub fn stage(&self) -> Option<ShaderStage> {
        self.effect
            .stages
            .iter()
            .copied()
            .find(|s| s.stage == vk::ShaderStageFlags::COMPUTE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputePipelineKey {
    pub stage: ShaderStage,
    pub layout: vk::PipelineLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineLayoutKey {
    pub push_constant_size: u32,
    pub push_constant_stages: vk::ShaderStageFlags,
    pub set_layout: vk::DescriptorSetLayout,
}

impl PipelineLayoutKey {
    pub fn for_effect(effect: &ShaderEffect) -> Self {
        Self {
            push_constant_size: effect.push_constant_size,
            push_constant_stages: effect.push_constant_stages(),
            set_layout: effect.set_layout,
        }
    }
}

/// Pipeline + the layout it was built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineData {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

pub(crate) fn build_pipeline_layout(
    backend: &dyn DeviceBackend,
    key: &PipelineLayoutKey,
) -> VkResult<vk::PipelineLayout> {
    let push_ranges = [vk::PushConstantRange {
        stage_flags: key.push_constant_stages,
        offset: 0,
        size: key.push_constant_size,
    }];
    let set_layouts = [key.set_layout];

    let mut info = vk::PipelineLayoutCreateInfo::default();
    if key.set_layout != vk::DescriptorSetLayout::null() {
        info = info.set_layouts(&set_layouts);
    }
    if key.push_constant_size > 0 {
        info = info.push_constant_ranges(&push_ranges);
    }

    backend.create_pipeline_layout(&info)
}

pub(crate) fn build_graphics_pipeline(
    backend: &dyn DeviceBackend,
    key: &GraphicsPipelineKey,
) -> VkResult<vk::Pipeline> {
    let definition = &key.definition;

    let stages: Vec<_> = definition
        .effect
        .stages
        .iter()
        .map(ShaderStage::create_info)
        .collect();

    let binding_descriptions = definition.vertex_format.binding_descriptions();
    let attribute_descriptions = definition.vertex_format.attribute_descriptions();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&binding_descriptions)
        .vertex_attribute_descriptions(&attribute_descriptions);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(definition.topology)
        .primitive_restart_enable(false);

    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(definition.polygon_mode)
        .cull_mode(definition.cull_mode)
        .front_face(definition.front_face)
        .line_width(1.0);

    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(key.target.samples)
        .sample_shading_enable(definition.multisample.sample_shading)
        .min_sample_shading(definition.multisample.min_sample_shading());

    let (min_bounds, max_bounds) = definition.depth.bounds();
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(definition.depth.test)
        .depth_write_enable(definition.depth.write)
        .depth_compare_op(definition.depth.compare_op)
        .stencil_test_enable(definition.depth.stencil_test)
        .min_depth_bounds(min_bounds)
        .max_depth_bounds(max_bounds);

    let blend_attachments =
        vec![definition.blend.attachment_state(); key.target.colour_formats.len()];
    let mut colour_blend = vk::PipelineColorBlendStateCreateInfo::default()
        .attachments(&blend_attachments)
        .blend_constants(definition.blend.constants());
    if let Some(op) = definition.blend.logic_op {
        colour_blend = colour_blend.logic_op_enable(true).logic_op(op);
    }

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let mut rendering = vk::PipelineRenderingCreateInfo::default()
        .color_attachment_formats(&key.target.colour_formats)
        .depth_attachment_format(key.target.depth_format.unwrap_or(vk::Format::UNDEFINED))
        .stencil_attachment_format(key.target.stencil_format().unwrap_or(vk::Format::UNDEFINED));

    let info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&colour_blend)
        .dynamic_state(&dynamic_state)
        .layout(key.layout)
        .push_next(&mut rendering);

    backend.create_graphics_pipeline(&info)
}

pub(crate) fn build_compute_pipeline(
    backend: &dyn DeviceBackend,
    key: &ComputePipelineKey,
) -> VkResult<vk::Pipeline> {
    let info = vk::ComputePipelineCreateInfo::default()
        .stage(key.stage.create_info())
        .layout(key.layout);

    backend.create_compute_pipeline(&info)
}
