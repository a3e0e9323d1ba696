//! In-memory `DeviceBackend` that hands out synthetic handles and records what was created.

#![allow(dead_code)]

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use ash_forward::vulkan::shader::{ShaderEffect, ShaderStage};
use ash_forward::vulkan::DeviceBackend;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What the last graphics pipeline was created with.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsSnapshot {
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_test: bool,
    pub depth_write: bool,
    pub samples: vk::SampleCountFlags,
    pub blend_attachments: u32,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub colour_formats: Vec<vk::Format>,
    pub depth_format: vk::Format,
    pub stencil_format: vk::Format,
}

#[derive(Debug, Default)]
pub struct MockState {
    /// Pool handle -> (max sets, allocated sets).
    pub pools: HashMap<u64, (u32, u32)>,
    /// `max_sets` of every pool, in creation order.
    pub pool_sizes: Vec<u32>,
    pub pool_resets: usize,
    pub pools_destroyed: usize,
    pub layouts_created: usize,
    pub layouts_destroyed: usize,
    pub sets_allocated: usize,
    pub descriptor_writes: usize,
    pub pipeline_layouts_created: usize,
    pub pipeline_layouts_destroyed: usize,
    pub graphics_pipelines_created: usize,
    pub compute_pipelines_created: usize,
    pub pipelines_destroyed: usize,
    pub last_graphics: Option<GraphicsSnapshot>,
}

#[derive(Debug)]
pub struct MockDevice {
    next_handle: AtomicU64,
    pub state: Mutex<MockState>,
}

impl MockDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_handle: AtomicU64::new(0x1000),
            state: Mutex::new(MockState::default()),
        })
    }

    pub fn backend(self: &Arc<Self>) -> Arc<dyn DeviceBackend> {
        Arc::clone(self) as Arc<dyn DeviceBackend>
    }

    fn next(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }
}

impl DeviceBackend for MockDevice {
    fn create_descriptor_set_layout(
        &self,
        _info: &vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorSetLayout> {
        self.state.lock().layouts_created += 1;
        Ok(vk::DescriptorSetLayout::from_raw(self.next()))
    }

    fn destroy_descriptor_set_layout(&self, _layout: vk::DescriptorSetLayout) {
        self.state.lock().layouts_destroyed += 1;
    }

    fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorPool> {
        let handle = self.next();
        let mut state = self.state.lock();
        state.pools.insert(handle, (info.max_sets, 0));
        state.pool_sizes.push(info.max_sets);
        Ok(vk::DescriptorPool::from_raw(handle))
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VkResult<()> {
        let mut state = self.state.lock();
        if let Some((_, used)) = state.pools.get_mut(&pool.as_raw()) {
            *used = 0;
        }
        state.pool_resets += 1;
        Ok(())
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        let mut state = self.state.lock();
        state.pools.remove(&pool.as_raw());
        state.pools_destroyed += 1;
    }

    fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::DescriptorSet>> {
        let count = info.descriptor_set_count;
        let mut state = self.state.lock();
        let (max_sets, used) = state
            .pools
            .get_mut(&info.descriptor_pool.as_raw())
            .ok_or(vk::Result::ERROR_UNKNOWN)?;
        if *used + count > *max_sets {
            return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
        }
        *used += count;
        state.sets_allocated += count as usize;
        drop(state);

        Ok((0..count)
            .map(|_| vk::DescriptorSet::from_raw(self.next()))
            .collect())
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]) {
        self.state.lock().descriptor_writes += writes.len();
    }

    fn create_pipeline_layout(
        &self,
        _info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> VkResult<vk::PipelineLayout> {
        self.state.lock().pipeline_layouts_created += 1;
        Ok(vk::PipelineLayout::from_raw(self.next()))
    }

    fn destroy_pipeline_layout(&self, _layout: vk::PipelineLayout) {
        self.state.lock().pipeline_layouts_destroyed += 1;
    }

    fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline> {
        let snapshot = unsafe { snapshot(info) };
        let mut state = self.state.lock();
        state.graphics_pipelines_created += 1;
        state.last_graphics = Some(snapshot);
        drop(state);
        Ok(vk::Pipeline::from_raw(self.next()))
    }

    fn create_compute_pipeline(
        &self,
        _info: &vk::ComputePipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline> {
        self.state.lock().compute_pipelines_created += 1;
        Ok(vk::Pipeline::from_raw(self.next()))
    }

    fn destroy_pipeline(&self, _pipeline: vk::Pipeline) {
        self.state.lock().pipelines_destroyed += 1;
    }
}

/// Reads the fixed-function state back out of a create info.
///
/// # Safety
/// Every pointer in `info` must be valid, as it is for the duration of a create call.
unsafe fn snapshot(info: &vk::GraphicsPipelineCreateInfo<'_>) -> GraphicsSnapshot {
    let raster = &*info.p_rasterization_state;
    let depth = &*info.p_depth_stencil_state;
    let multisample = &*info.p_multisample_state;
    let blend = &*info.p_color_blend_state;
    let dynamic = &*info.p_dynamic_state;
    let dynamic_states =
        std::slice::from_raw_parts(dynamic.p_dynamic_states, dynamic.dynamic_state_count as usize)
            .to_vec();

    let mut colour_formats = Vec::new();
    let mut depth_format = vk::Format::UNDEFINED;
    let mut stencil_format = vk::Format::UNDEFINED;
    let mut next = info.p_next as *const vk::BaseInStructure<'_>;
    while !next.is_null() {
        if (*next).s_type == vk::StructureType::PIPELINE_RENDERING_CREATE_INFO {
            let rendering = &*(next as *const vk::PipelineRenderingCreateInfo<'_>);
            if rendering.color_attachment_count > 0 {
                colour_formats = std::slice::from_raw_parts(
                    rendering.p_color_attachment_formats,
                    rendering.color_attachment_count as usize,
                )
                .to_vec();
            }
            depth_format = rendering.depth_attachment_format;
            stencil_format = rendering.stencil_attachment_format;
        }
        next = (*next).p_next;
    }

    GraphicsSnapshot {
        cull_mode: raster.cull_mode,
        front_face: raster.front_face,
        depth_test: depth.depth_test_enable == vk::TRUE,
        depth_write: depth.depth_write_enable == vk::TRUE,
        samples: multisample.rasterization_samples,
        blend_attachments: blend.attachment_count,
        dynamic_states,
        colour_formats,
        depth_format,
        stencil_format,
    }
}

/// Vertex + fragment effect over synthetic modules.
pub fn forward_effect(set_layout: vk::DescriptorSetLayout) -> ShaderEffect {
    ShaderEffect::new(
        vec![
            ShaderStage {
                stage: vk::ShaderStageFlags::VERTEX,
                module: vk::ShaderModule::from_raw(0xA1),
            },
            ShaderStage {
                stage: vk::ShaderStageFlags::FRAGMENT,
                module: vk::ShaderModule::from_raw(0xA2),
            },
        ],
        set_layout,
    )
}

pub fn compute_effect(set_layout: vk::DescriptorSetLayout) -> ShaderEffect {
    ShaderEffect::new(
        vec![ShaderStage {
            stage: vk::ShaderStageFlags::COMPUTE,
            module: vk::ShaderModule::from_raw(0xC1),
        }],
        set_layout,
    )
}
