use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::renderer::{Mesh, RenderTargetManager, ShaderBufferManager, TextureManager};
use crate::utils::{HandleTable, ResourceId, ScopedTimer};
use crate::vulkan::{
    BoundTexture, CommandBuffer, DescriptorBuilder, DescriptorCache, DescriptorLayoutKey,
    GraphicsPipelineDefinition, LayoutBinding, PipelineCache, RenderInfo, ShaderParameters,
};
use crate::{AshError, Result};

/// Per-draw transform data pushed into the instance buffer.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    pub model: [f32; 16],
    pub normal: [f32; 16],
}

impl InstanceData {
    pub fn new(model: Mat4) -> Self {
        Self {
            model: model.to_cols_array(),
            normal: normal_matrix(model).to_cols_array(),
        }
    }
}

/// Inverse-transpose of `model`; identity for singular matrices.
pub fn normal_matrix(model: Mat4) -> Mat4 {
    if model.determinant().abs() <= f32::EPSILON {
        return Mat4::IDENTITY;
    }
    model.inverse().transpose()
}

#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraData {
    pub view: [f32; 16],
    pub projection: [f32; 16],
    pub view_projection: [f32; 16],
    pub position: [f32; 4],
}

impl CameraData {
    pub fn new(view: Mat4, projection: Mat4, position: Vec3) -> Self {
        Self {
            view: view.to_cols_array(),
            projection: projection.to_cols_array(),
            view_projection: (projection * view).to_cols_array(),
            position: position.extend(1.0).to_array(),
        }
    }
}

/// Image behind a sampled binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSource {
    Texture(ResourceId),
    /// Colour attachment `index` of an offscreen target.
    Attachment { target: ResourceId, index: usize },
    /// Depth attachment of an offscreen target.
    Depth { target: ResourceId },
}

/// A combined image sampler at `binding`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledTexture {
    pub binding: u32,
    pub source: TextureSource,
    pub sampler: String,
}

impl SampledTexture {
    pub fn new(binding: u32, source: TextureSource, sampler: &str) -> Self {
        Self {
            binding,
            source,
            sampler: sampler.to_owned(),
        }
    }
}

/// Pipeline state, textures and push constants shared by every draw that uses it.
#[derive(Debug, Clone)]
pub struct Material {
    pub pipeline: GraphicsPipelineDefinition,
    pub textures: Vec<SampledTexture>,
    push_constants: Vec<u8>,
}

impl Material {
    pub fn new(pipeline: GraphicsPipelineDefinition) -> Self {
        Self {
            pipeline,
            textures: Vec::new(),
            push_constants: Vec::new(),
        }
    }

    pub fn with_texture(mut self, binding: u32, texture: ResourceId, sampler: &str) -> Self {
        self.textures
            .push(SampledTexture::new(binding, TextureSource::Texture(texture), sampler));
        self
    }

    /// Samples colour attachment `index` of offscreen target `target`. The target's pass must
    /// be recorded before any pass drawing with this material.
    pub fn with_attachment(
        mut self,
        binding: u32,
        target: ResourceId,
        index: usize,
        sampler: &str,
    ) -> Self {
        self.textures.push(SampledTexture::new(
            binding,
            TextureSource::Attachment { target, index },
            sampler,
        ));
        self
    }

    pub fn with_depth_attachment(mut self, binding: u32, target: ResourceId, sampler: &str) -> Self {
        self.textures
            .push(SampledTexture::new(binding, TextureSource::Depth { target }, sampler));
        self
    }

    /// Packs `parameters` into the push constant block. Must fit the effect's push range.
    pub fn set_parameters(&mut self, parameters: &mut ShaderParameters) -> Result<()> {
        let packed = parameters.packed();
        let limit = self.pipeline.effect.push_constant_size as usize;
        if packed.len() > limit {
            return Err(AshError::PreconditionFailed(format!(
                "{}B of material parameters exceed the {limit}B push constant range",
                packed.len()
            )));
        }
        self.push_constants = packed.to_vec();
        Ok(())
    }

    pub fn push_constants(&self) -> &[u8] {
        &self.push_constants
    }
}

/// One mesh drawn with one material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCommand {
    pub mesh: ResourceId,
    pub material: ResourceId,
    pub transform: Mat4,
}

/// Binding slots used by the forward shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardBindings {
    pub camera: u32,
    pub instance: u32,
}

impl ForwardBindings {
    /// Set layout the pass produces for a material sampling textures at `texture_bindings`.
    /// Material effects must be built against the layout created from this key.
    pub fn layout_key(&self, texture_bindings: &[u32]) -> DescriptorLayoutKey {
        let mut bindings = vec![
            LayoutBinding::new(
                self.camera,
                vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                vk::ShaderStageFlags::ALL_GRAPHICS,
            ),
            LayoutBinding::new(
                self.instance,
                vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                vk::ShaderStageFlags::VERTEX,
            ),
        ];
        bindings.extend(texture_bindings.iter().map(|&binding| {
            LayoutBinding::new(
                binding,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
            )
        }));
        bindings.sort_by_key(|b| b.binding);
        DescriptorLayoutKey::new(bindings)
    }
}

impl Default for ForwardBindings {
    fn default() -> Self {
        Self {
            camera: 0,
            instance: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub draws: u32,
    pub dispatches: u32,
    pub pipeline_binds: u32,
    pub descriptor_sets_written: u32,
    pub skipped: u32,
}

/// Everything a pass reads or mutates while recording.
pub struct PassResources<'a> {
    pub pipelines: &'a mut PipelineCache,
    pub descriptors: &'a mut DescriptorCache,
    pub shader_buffers: &'a mut ShaderBufferManager,
    pub textures: &'a mut TextureManager,
    pub render_targets: &'a mut RenderTargetManager,
    pub meshes: &'a HandleTable<Mesh>,
    pub materials: &'a HandleTable<Material>,
}

impl PassResources<'_> {
    /// Resolves `source` to a descriptor image. Attachments must have left their pass.
    pub fn bind_texture(&mut self, source: TextureSource, sampler: &str) -> Result<BoundTexture> {
        let target_missing =
            |target: ResourceId| AshError::ResourceNotFound(format!("render target {target:?}"));
        match source {
            TextureSource::Texture(id) => self.textures.bind(id, sampler),
            TextureSource::Attachment { target, index } => {
                let sampler = self.textures.sampler(sampler)?;
                self.render_targets
                    .get_mut(target)
                    .ok_or_else(|| target_missing(target))?
                    .attachment_mut(index)
                    .ok_or_else(|| {
                        AshError::ResourceNotFound(format!("attachment {index} of {target:?}"))
                    })?
                    .bound(sampler)
            }
            TextureSource::Depth { target } => {
                let sampler = self.textures.sampler(sampler)?;
                self.render_targets
                    .get_mut(target)
                    .ok_or_else(|| target_missing(target))?
                    .depth_attachment_mut()
                    .ok_or_else(|| {
                        AshError::ResourceNotFound(format!("depth attachment of {target:?}"))
                    })?
                    .bound(sampler)
            }
        }
    }
}

/// Tracks the material whose pipeline is currently bound.
#[derive(Debug, Default)]
pub struct MaterialBinder {
    bound: Option<ResourceId>,
}

impl MaterialBinder {
    /// `true` when `material` differs from the last one bound.
    pub fn needs_bind(&mut self, material: ResourceId) -> bool {
        if self.bound == Some(material) {
            return false;
        }
        self.bound = Some(material);
        true
    }

    pub fn reset(&mut self) {
        self.bound = None;
    }
}

/// Forward pass: one camera buffer per frame, one instance push per draw, pipelines rebound
/// only when the material changes.
pub struct ForwardPass {
    bindings: ForwardBindings,
    camera_buffer: ResourceId,
    instance_buffer: ResourceId,
    builder: DescriptorBuilder,
    binder: MaterialBinder,
}

impl ForwardPass {
    pub fn new(shader_buffers: &mut ShaderBufferManager, bindings: ForwardBindings) -> Result<Self> {
        let camera_buffer = shader_buffers.create_uniform_buffer("forward_camera")?;
        let instance_buffer = shader_buffers.create_uniform_buffer("forward_instances")?;

        Ok(Self {
            bindings,
            camera_buffer,
            instance_buffer,
            builder: DescriptorBuilder::new(),
            binder: MaterialBinder::default(),
        })
    }

    pub fn bindings(&self) -> ForwardBindings {
        self.bindings
    }

    /// Set layout the pass produces for a material sampling textures at `texture_bindings`.
    pub fn layout_key(&self, texture_bindings: &[u32]) -> DescriptorLayoutKey {
        self.bindings.layout_key(texture_bindings)
    }

    /// Records `draws` into the open rendering scope on `cmd`, described by `render_info`.
    pub fn record(
        &mut self,
        frame: usize,
        cmd: &CommandBuffer,
        render_info: &RenderInfo,
        camera: &CameraData,
        draws: &[DrawCommand],
        res: &mut PassResources<'_>,
    ) -> Result<PassStats> {
        let _timer = ScopedTimer::new("forward_pass");
        let mut stats = PassStats::default();
        self.binder.reset();

        res.shader_buffers
            .push_data(self.camera_buffer, frame, bytemuck::bytes_of(camera))?;
        res.shader_buffers.unbind_all();
        res.shader_buffers.bind(
            self.camera_buffer,
            self.bindings.camera,
            vk::ShaderStageFlags::ALL_GRAPHICS,
        )?;
        res.shader_buffers.bind(
            self.instance_buffer,
            self.bindings.instance,
            vk::ShaderStageFlags::VERTEX,
        )?;

        let mut pipeline = None;

        for draw in draws {
            let (Some(mesh), Some(material)) =
                (res.meshes.get(draw.mesh), res.materials.get(draw.material))
            else {
                log::warn!("Skipping draw with stale mesh {:?} or material {:?}", draw.mesh, draw.material);
                stats.skipped += 1;
                continue;
            };

            // Pushing can grow the buffer and invalidate cached sets, so it goes first.
            let instance = InstanceData::new(draw.transform);
            res.shader_buffers
                .push_data(self.instance_buffer, frame, bytemuck::bytes_of(&instance))?;

            if self.binder.needs_bind(draw.material) {
                let data = res
                    .pipelines
                    .fetch_graphics_pipeline(&material.pipeline, render_info)?;
                cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, data.pipeline);
                pipeline = Some(data);
                stats.pipeline_binds += 1;
            }
            let Some(data) = pipeline else {
                continue;
            };

            self.builder.clear();
            res.shader_buffers.write_bindings(&mut self.builder);
            for slot in &material.textures {
                let bound = res.bind_texture(slot.source, &slot.sampler)?;
                self.builder.bind_image(
                    slot.binding,
                    bound.image_info(),
                    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    vk::ShaderStageFlags::FRAGMENT,
                );
            }

            let built = res.descriptors.build(&self.builder)?;
            if built.layout != material.pipeline.effect.set_layout {
                log::error!("Material {:?} set layout does not match its bound resources", draw.material);
                return Err(AshError::PreconditionFailed(format!(
                    "material {:?} expects set layout {:?}, draw resources produce {:?}",
                    draw.material, material.pipeline.effect.set_layout, built.layout
                )));
            }
            if !built.cached {
                stats.descriptor_sets_written += 1;
            }

            cmd.bind_descriptor_set(
                vk::PipelineBindPoint::GRAPHICS,
                data.layout,
                built.set,
                &res.shader_buffers.dynamic_offsets(),
            );

            if !material.push_constants().is_empty() {
                cmd.push_constants(
                    data.layout,
                    material.pipeline.effect.push_constant_stages(),
                    material.push_constants(),
                );
            }

            mesh.record_draw(cmd, 1);
            stats.draws += 1;
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::{Quat, Vec4};

    #[test]
    fn test_normal_matrix_undoes_scale() {
        let model = Mat4::from_scale(Vec3::splat(2.0));
        let normal = normal_matrix(model);
        assert_relative_eq!(normal.x_axis.x, 0.5, epsilon = 1e-6);
        assert_relative_eq!(normal.w_axis.w, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_normal_matrix_of_rotation_is_rotation() {
        let model = Mat4::from_quat(Quat::from_rotation_y(0.7));
        let normal = normal_matrix(model);
        let n = normal * Vec4::X;
        let m = model * Vec4::X;
        assert_relative_eq!(n.x, m.x, epsilon = 1e-5);
        assert_relative_eq!(n.z, m.z, epsilon = 1e-5);
    }

    #[test]
    fn test_singular_model_gives_identity_normal() {
        let model = Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(normal_matrix(model), Mat4::IDENTITY);
    }

    #[test]
    fn test_pipeline_rebinds_only_on_material_change() {
        let a = ResourceId::new(0, 0);
        let b = ResourceId::new(1, 0);
        let mut binder = MaterialBinder::default();

        let binds = [a, a, b, b, a]
            .into_iter()
            .filter(|&m| binder.needs_bind(m))
            .count();
        assert_eq!(binds, 3);

        binder.reset();
        assert!(binder.needs_bind(a));
    }

    #[test]
    fn test_layout_key_matches_builder_shape() {
        let bindings = ForwardBindings::default();
        let key = bindings.layout_key(&[3, 2]);

        let mut builder = DescriptorBuilder::new();
        let buffer = vk::DescriptorBufferInfo::default();
        let image = vk::DescriptorImageInfo::default();
        builder
            .bind_image(3, image, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT)
            .bind_buffer(1, buffer, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, vk::ShaderStageFlags::VERTEX)
            .bind_image(2, image, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT)
            .bind_buffer(
                0,
                buffer,
                vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                vk::ShaderStageFlags::ALL_GRAPHICS,
            );

        assert_eq!(builder.layout_key(), key);
        let order: Vec<_> = key.bindings.iter().map(|b| b.binding).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_instance_data_layout() {
        assert_eq!(std::mem::size_of::<InstanceData>(), 128);
        assert_eq!(std::mem::size_of::<CameraData>(), 208);
    }
}
