use ash::vk;

use crate::renderer::forward_pass::{PassResources, PassStats, SampledTexture};
use crate::utils::{ResourceId, ScopedTimer};
use crate::vulkan::{
    CommandBuffer, ComputePipelineDefinition, DescriptorBuilder, DescriptorLayoutKey, LayoutBinding,
};
use crate::{AshError, Result};

/// A shader buffer bound to a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeBuffer<'a> {
    pub binding: u32,
    pub buffer: ResourceId,
    /// Pushed into the buffer's ring for this frame before the dispatch is recorded. Empty
    /// data binds whatever was pushed last.
    pub data: &'a [u8],
}

/// One compute dispatch recorded ahead of the frame's graphics passes.
#[derive(Debug, Clone, Copy)]
pub struct ComputeDispatch<'a> {
    pub pipeline: &'a ComputePipelineDefinition,
    pub buffers: &'a [ComputeBuffer<'a>],
    pub textures: &'a [SampledTexture],
    pub push_constants: &'a [u8],
    pub groups: [u32; 3],
}

impl<'a> ComputeDispatch<'a> {
    pub fn new(pipeline: &'a ComputePipelineDefinition, groups: [u32; 3]) -> Self {
        Self {
            pipeline,
            buffers: &[],
            textures: &[],
            push_constants: &[],
            groups,
        }
    }
}

/// Set layout for a dispatch binding buffers of the given descriptor types plus combined
/// image samplers at `texture_bindings`. Every binding is visible to the compute stage only.
pub fn compute_layout_key(
    buffers: &[(u32, vk::DescriptorType)],
    texture_bindings: &[u32],
) -> DescriptorLayoutKey {
    let mut bindings: Vec<_> = buffers
        .iter()
        .map(|&(binding, ty)| LayoutBinding::new(binding, ty, vk::ShaderStageFlags::COMPUTE))
        .chain(texture_bindings.iter().map(|&binding| {
            LayoutBinding::new(
                binding,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::COMPUTE,
            )
        }))
        .collect();
    bindings.sort_by_key(|b| b.binding);
    DescriptorLayoutKey::new(bindings)
}

/// Makes compute writes visible to later dispatches and to every graphics stage that can read
/// a buffer or image.
pub fn compute_write_barrier() -> vk::MemoryBarrier2<'static> {
    vk::MemoryBarrier2::default()
        .src_stage_mask(vk::PipelineStageFlags2::COMPUTE_SHADER)
        .src_access_mask(vk::AccessFlags2::SHADER_STORAGE_WRITE)
        .dst_stage_mask(
            vk::PipelineStageFlags2::COMPUTE_SHADER
                | vk::PipelineStageFlags2::DRAW_INDIRECT
                | vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT
                | vk::PipelineStageFlags2::VERTEX_SHADER
                | vk::PipelineStageFlags2::FRAGMENT_SHADER,
        )
        .dst_access_mask(
            vk::AccessFlags2::SHADER_STORAGE_READ
                | vk::AccessFlags2::UNIFORM_READ
                | vk::AccessFlags2::INDIRECT_COMMAND_READ
                | vk::AccessFlags2::VERTEX_ATTRIBUTE_READ
                | vk::AccessFlags2::SHADER_SAMPLED_READ,
        )
}

/// Records compute dispatches into the frame's command buffer, outside any rendering scope.
#[derive(Default)]
pub struct ComputePass {
    builder: DescriptorBuilder,
}

impl ComputePass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        frame: usize,
        cmd: &CommandBuffer,
        dispatches: &[ComputeDispatch<'_>],
        res: &mut PassResources<'_>,
    ) -> Result<PassStats> {
        let _timer = ScopedTimer::new("compute_pass");
        let mut stats = PassStats::default();

        for dispatch in dispatches {
            if dispatch.groups.contains(&0) {
                log::warn!("Skipping compute dispatch with empty group count {:?}", dispatch.groups);
                stats.skipped += 1;
                continue;
            }

            let effect = &dispatch.pipeline.effect;
            if dispatch.push_constants.len() > effect.push_constant_size as usize {
                return Err(AshError::PreconditionFailed(format!(
                    "{}B of compute push constants exceed the {}B range",
                    dispatch.push_constants.len(),
                    effect.push_constant_size
                )));
            }

            // Pushing can grow a buffer and invalidate cached sets, so it goes first.
            for buffer in dispatch.buffers {
                if !buffer.data.is_empty() {
                    res.shader_buffers.push_data(buffer.buffer, frame, buffer.data)?;
                }
            }

            let data = res.pipelines.fetch_compute_pipeline(dispatch.pipeline)?;
            cmd.bind_pipeline(vk::PipelineBindPoint::COMPUTE, data.pipeline);
            stats.pipeline_binds += 1;

            res.shader_buffers.unbind_all();
            for buffer in dispatch.buffers {
                res.shader_buffers
                    .bind(buffer.buffer, buffer.binding, vk::ShaderStageFlags::COMPUTE)?;
            }

            self.builder.clear();
            res.shader_buffers.write_bindings(&mut self.builder);
            for slot in dispatch.textures {
                let bound = res.bind_texture(slot.source, &slot.sampler)?;
                self.builder.bind_image(
                    slot.binding,
                    bound.image_info(),
                    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    vk::ShaderStageFlags::COMPUTE,
                );
            }

            let built = res.descriptors.build(&self.builder)?;
            if built.layout != effect.set_layout {
                log::error!("Compute effect set layout does not match its bound resources");
                return Err(AshError::PreconditionFailed(format!(
                    "compute effect expects set layout {:?}, dispatch resources produce {:?}",
                    effect.set_layout, built.layout
                )));
            }
            if !built.cached {
                stats.descriptor_sets_written += 1;
            }

            cmd.bind_descriptor_set(
                vk::PipelineBindPoint::COMPUTE,
                data.layout,
                built.set,
                &res.shader_buffers.dynamic_offsets(),
            );
            if !dispatch.push_constants.is_empty() {
                cmd.push_constants(data.layout, vk::ShaderStageFlags::COMPUTE, dispatch.push_constants);
            }

            let [x, y, z] = dispatch.groups;
            cmd.dispatch(x, y, z);

            let barrier = compute_write_barrier();
            cmd.pipeline_barrier(
                &vk::DependencyInfo::default().memory_barriers(std::slice::from_ref(&barrier)),
            );
            stats.dispatches += 1;
        }

        res.shader_buffers.unbind_all();
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::forward_pass::TextureSource;

    #[test]
    fn test_layout_key_matches_builder_shape() {
        let key = compute_layout_key(
            &[
                (1, vk::DescriptorType::STORAGE_BUFFER_DYNAMIC),
                (0, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC),
            ],
            &[3, 2],
        );

        let mut builder = DescriptorBuilder::new();
        let buffer = vk::DescriptorBufferInfo::default();
        let image = vk::DescriptorImageInfo::default();
        builder
            .bind_buffer(0, buffer, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, vk::ShaderStageFlags::COMPUTE)
            .bind_image(2, image, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::COMPUTE)
            .bind_buffer(1, buffer, vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, vk::ShaderStageFlags::COMPUTE)
            .bind_image(3, image, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::COMPUTE);

        assert_eq!(builder.layout_key(), key);
        assert!(key
            .bindings
            .iter()
            .all(|b| b.stage_flags == vk::ShaderStageFlags::COMPUTE));
    }

    #[test]
    fn test_compute_writes_reach_graphics_reads() {
        let barrier = compute_write_barrier();
        assert_eq!(barrier.src_stage_mask, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert!(barrier.dst_stage_mask.contains(
            vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT | vk::PipelineStageFlags2::FRAGMENT_SHADER
        ));
        // Back-to-back dispatches are ordered too.
        assert!(barrier.dst_stage_mask.contains(vk::PipelineStageFlags2::COMPUTE_SHADER));
        assert!(barrier.dst_access_mask.contains(vk::AccessFlags2::SHADER_STORAGE_READ));
    }

    #[test]
    fn test_dispatch_defaults() {
        let definition = ComputePipelineDefinition::new(crate::vulkan::ShaderEffect::new(
            Vec::new(),
            vk::DescriptorSetLayout::null(),
        ));
        let depth = [SampledTexture::new(
            2,
            TextureSource::Depth {
                target: ResourceId::new(0, 0),
            },
            "nearest",
        )];
        let dispatch = ComputeDispatch {
            textures: &depth,
            ..ComputeDispatch::new(&definition, [1, 1, 1])
        };
        assert!(dispatch.buffers.is_empty());
        assert!(dispatch.push_constants.is_empty());
        assert_eq!(dispatch.textures[0].binding, 2);
    }
}
