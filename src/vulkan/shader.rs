use ash::vk;
use bytemuck::Pod;
use std::io::Cursor;
use std::sync::Arc;

use crate::{AshError, Result};

/// A compiled shader module for one stage.
pub struct ShaderProgram {
    device: Arc<ash::Device>,
    module: vk::ShaderModule,
    stage: vk::ShaderStageFlags,
}

impl ShaderProgram {
    /// Creates a module from SPIR-V bytes. The byte span must be a whole number of words.
    pub fn from_spirv(device: Arc<ash::Device>, stage: vk::ShaderStageFlags, bytes: &[u8]) -> Result<Self> {
        let code = ash::util::read_spv(&mut Cursor::new(bytes))?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

        let module = unsafe { device.create_shader_module(&create_info, None) }.map_err(|e| {
            log::error!("Failed to create {stage:?} shader module: {e:?}");
            AshError::vk("vkCreateShaderModule", e)
        })?;

        log::debug!("Loaded {stage:?} shader ({} bytes)", bytes.len());
        Ok(Self {
            device,
            module,
            stage,
        })
    }

    pub fn module(&self) -> vk::ShaderModule {
        self.module
    }

    pub fn stage(&self) -> vk::ShaderStageFlags {
        self.stage
    }

    pub fn shader_stage(&self) -> ShaderStage {
        ShaderStage {
            stage: self.stage,
            module: self.module,
        }
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Stage + module pair as it appears in pipeline keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderStage {
    pub stage: vk::ShaderStageFlags,
    pub module: vk::ShaderModule,
}

impl ShaderStage {
    pub fn create_info(&self) -> vk::PipelineShaderStageCreateInfo<'static> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage)
            .module(self.module)
            .name(c"main")
    }
}

/// The shaders that make up one pass, plus the resource signature they share.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderEffect {
    pub stages: Vec<ShaderStage>,
    pub set_layout: vk::DescriptorSetLayout,
    pub push_constant_size: u32,
}

impl ShaderEffect {
    pub fn new(stages: Vec<ShaderStage>, set_layout: vk::DescriptorSetLayout) -> Self {
        Self {
            stages,
            set_layout,
            push_constant_size: 0,
        }
    }

    pub fn with_push_constants(mut self, size: u32) -> Self {
        self.push_constant_size = size;
        self
    }

    pub fn is_compute(&self) -> bool {
        self.stages
            .first()
            .is_some_and(|s| s.stage == vk::ShaderStageFlags::COMPUTE)
    }

    /// Stages that see the push constant range.
    pub fn push_constant_stages(&self) -> vk::ShaderStageFlags {
        if self.is_compute() {
            vk::ShaderStageFlags::COMPUTE
        } else {
            vk::ShaderStageFlags::ALL_GRAPHICS
        }
    }
}

/// Named shader constants packed in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ShaderParameters {
    entries: Vec<(String, Vec<u8>)>,
    packed: Vec<u8>,
    dirty: bool,
}

impl ShaderParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name`, keeping its original position if it was set before.
    pub fn set<T: Pod>(&mut self, name: &str, value: &T) {
        self.set_bytes(name, bytemuck::bytes_of(value));
    }

    pub fn set_slice<T: Pod>(&mut self, name: &str, values: &[T]) {
        self.set_bytes(name, bytemuck::cast_slice(values));
    }

    pub fn set_bytes(&mut self, name: &str, bytes: &[u8]) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, data)) => {
                data.clear();
                data.extend_from_slice(bytes);
            }
            None => self.entries.push((name.to_owned(), bytes.to_vec())),
        }
        self.dirty = true;
    }

    pub fn packed(&mut self) -> &[u8] {
        if self.dirty {
            self.packed.clear();
            for (_, data) in &self.entries {
                self.packed.extend_from_slice(data);
            }
            self.dirty = false;
        }
        &self.packed
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.packed.clear();
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_parameters_keep_insertion_order() {
        let mut params = ShaderParameters::new();
        params.set("time", &1.0f32);
        params.set("frame", &7u32);
        params.set("time", &2.0f32);

        let packed = params.packed().to_vec();
        assert_eq!(packed.len(), 8);
        assert_eq!(&packed[..4], bytemuck::bytes_of(&2.0f32));
        assert_eq!(&packed[4..], bytemuck::bytes_of(&7u32));
    }

    #[test]
    fn test_push_constant_stages_follow_first_stage() {
        let compute = ShaderEffect::new(
            vec![ShaderStage {
                stage: vk::ShaderStageFlags::COMPUTE,
                module: vk::ShaderModule::from_raw(1),
            }],
            vk::DescriptorSetLayout::null(),
        );
        assert_eq!(compute.push_constant_stages(), vk::ShaderStageFlags::COMPUTE);

        let graphics = ShaderEffect::new(
            vec![ShaderStage {
                stage: vk::ShaderStageFlags::VERTEX,
                module: vk::ShaderModule::from_raw(2),
            }],
            vk::DescriptorSetLayout::null(),
        );
        assert_eq!(graphics.push_constant_stages(), vk::ShaderStageFlags::ALL_GRAPHICS);
    }
}
