use ash::vk;
use std::collections::HashMap;
use std::sync::Arc;

use crate::utils::logging::ScopedTimer;
use crate::vulkan::backend::DeviceBackend;
use crate::vulkan::pipeline::{
    build_compute_pipeline, build_graphics_pipeline, build_pipeline_layout,
    ComputePipelineDefinition, ComputePipelineKey, GraphicsPipelineDefinition,
    GraphicsPipelineKey, PipelineData, PipelineLayoutKey,
};
use crate::vulkan::render_info::RenderInfo;
use crate::vulkan::shader::ShaderEffect;
use crate::{AshError, Result};

/// Append-only cache of pipelines and pipeline layouts. Everything is destroyed on drop.
pub struct PipelineCache {
    backend: Arc<dyn DeviceBackend>,
    layouts: HashMap<PipelineLayoutKey, vk::PipelineLayout>,
    graphics: HashMap<GraphicsPipelineKey, vk::Pipeline>,
    compute: HashMap<ComputePipelineKey, vk::Pipeline>,
}

impl PipelineCache {
    pub fn new(backend: Arc<dyn DeviceBackend>) -> Self {
        Self {
            backend,
            layouts: HashMap::new(),
            graphics: HashMap::new(),
            compute: HashMap::new(),
        }
    }

    pub fn fetch_pipeline_layout(&mut self, effect: &ShaderEffect) -> Result<vk::PipelineLayout> {
        let key = PipelineLayoutKey::for_effect(effect);
        if let Some(&layout) = self.layouts.get(&key) {
            return Ok(layout);
        }

        let layout = build_pipeline_layout(self.backend.as_ref(), &key).map_err(|e| {
            log::error!("Failed to create pipeline layout: {e:?}");
            AshError::vk("vkCreatePipelineLayout", e)
        })?;

        log::debug!(
            "Created pipeline layout (push constants: {} bytes)",
            key.push_constant_size
        );
        self.layouts.insert(key, layout);
        Ok(layout)
    }

    /// Returns the pipeline for `definition` rendering into targets shaped like `render_info`.
    pub fn fetch_graphics_pipeline(
        &mut self,
        definition: &GraphicsPipelineDefinition,
        render_info: &RenderInfo,
    ) -> Result<PipelineData> {
        let layout = self.fetch_pipeline_layout(&definition.effect)?;
        let key = GraphicsPipelineKey {
            definition: definition.clone(),
            target: render_info.signature(),
            layout,
        };

        if let Some(&pipeline) = self.graphics.get(&key) {
            return Ok(PipelineData { pipeline, layout });
        }

        let pipeline = {
            let _timer = ScopedTimer::new("graphics pipeline build");
            build_graphics_pipeline(self.backend.as_ref(), &key).map_err(|e| {
                log::error!("Failed to create graphics pipeline: {e:?}");
                AshError::vk("vkCreateGraphicsPipelines", e)
            })?
        };

        log::debug!(
            "Created graphics pipeline ({} colour attachments, {:?})",
            key.target.colour_formats.len(),
            key.target.samples
        );
        self.graphics.insert(key, pipeline);
        Ok(PipelineData { pipeline, layout })
    }

    pub fn fetch_compute_pipeline(
        &mut self,
        definition: &ComputePipelineDefinition,
    ) -> Result<PipelineData> {
        let stage = definition.stage().ok_or_else(|| {
            AshError::PreconditionFailed("compute effect has no compute stage".into())
        })?;
        let layout = self.fetch_pipeline_layout(&definition.effect)?;
        let key = ComputePipelineKey { stage, layout };

        if let Some(&pipeline) = self.compute.get(&key) {
            return Ok(PipelineData { pipeline, layout });
        }

        let pipeline = {
            let _timer = ScopedTimer::new("compute pipeline build");
            build_compute_pipeline(self.backend.as_ref(), &key).map_err(|e| {
                log::error!("Failed to create compute pipeline: {e:?}");
                AshError::vk("vkCreateComputePipelines", e)
            })?
        };

        self.compute.insert(key, pipeline);
        Ok(PipelineData { pipeline, layout })
    }

    pub fn graphics_pipeline_count(&self) -> usize {
        self.graphics.len()
    }

    pub fn compute_pipeline_count(&self) -> usize {
        self.compute.len()
    }

    pub fn layout_count(&self) -> usize {
        self.layouts.len()
    }
}

impl Drop for PipelineCache {
    fn drop(&mut self) {
        let graphics = self.graphics.drain().map(|(_, pipeline)| pipeline);
        let compute = self.compute.drain().map(|(_, pipeline)| pipeline);
        for pipeline in graphics.chain(compute) {
            self.backend.destroy_pipeline(pipeline);
        }
        for (_, layout) in self.layouts.drain() {
            self.backend.destroy_pipeline_layout(layout);
        }
    }
}
