use ash::vk;
use std::collections::HashMap;
use std::sync::Arc;

use crate::vulkan::DeviceBackend;
use crate::{AshError, Result};

/// One binding slot of a descriptor set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub stage_flags: vk::ShaderStageFlags,
    pub count: u32,
    pub flags: vk::DescriptorBindingFlags,
}

impl LayoutBinding {
    pub fn new(
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        Self {
            binding,
            descriptor_type,
            stage_flags,
            count: 1,
            flags: vk::DescriptorBindingFlags::empty(),
        }
    }

    fn to_vk(self) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(self.binding)
            .descriptor_type(self.descriptor_type)
            .descriptor_count(self.count)
            .stage_flags(self.stage_flags)
    }
}

/// Structural description of a descriptor set layout. Binding order is significant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DescriptorLayoutKey {
    pub bindings: Vec<LayoutBinding>,
    pub flags: vk::DescriptorSetLayoutCreateFlags,
}

impl DescriptorLayoutKey {
    pub fn new(bindings: Vec<LayoutBinding>) -> Self {
        Self {
            bindings,
            flags: vk::DescriptorSetLayoutCreateFlags::empty(),
        }
    }

    pub fn with_binding(mut self, binding: LayoutBinding) -> Self {
        self.bindings.push(binding);
        self
    }
}

/// Append-only cache of descriptor set layouts. Layouts live until the cache is dropped.
pub struct DescriptorLayoutCache {
    backend: Arc<dyn DeviceBackend>,
    layouts: HashMap<DescriptorLayoutKey, vk::DescriptorSetLayout>,
}

impl DescriptorLayoutCache {
    pub fn new(backend: Arc<dyn DeviceBackend>) -> Self {
        Self {
            backend,
            layouts: HashMap::new(),
        }
    }

    pub fn create_layout(&mut self, key: &DescriptorLayoutKey) -> Result<vk::DescriptorSetLayout> {
        if let Some(&layout) = self.layouts.get(key) {
            return Ok(layout);
        }

        let bindings: Vec<_> = key.bindings.iter().map(|b| b.to_vk()).collect();
        let binding_flags: Vec<_> = key.bindings.iter().map(|b| b.flags).collect();
        let mut flags_info =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);

        let mut create_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&bindings)
            .flags(key.flags);

        if binding_flags.iter().any(|flags| !flags.is_empty()) {
            create_info = create_info.push_next(&mut flags_info);
        }

        let layout = self
            .backend
            .create_descriptor_set_layout(&create_info)
            .map_err(|e| {
                log::error!("Failed to create descriptor set layout: {e:?}");
                AshError::vk("vkCreateDescriptorSetLayout", e)
            })?;

        log::debug!(
            "Created descriptor set layout with {} bindings",
            key.bindings.len()
        );
        self.layouts.insert(key.clone(), layout);
        Ok(layout)
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

impl Drop for DescriptorLayoutCache {
    fn drop(&mut self) {
        for (_, layout) in self.layouts.drain() {
            self.backend.destroy_descriptor_set_layout(layout);
        }
    }
}
