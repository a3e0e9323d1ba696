use ash::vk;
use ash::vk::Handle;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::vulkan::descriptor_layout::{DescriptorLayoutKey, LayoutBinding};
use crate::vulkan::DeviceBackend;

#[derive(Debug, Clone, Copy)]
enum BoundResource {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    binding: LayoutBinding,
    resource: BoundResource,
}

/// Collects the resources bound for one draw and turns them into a layout key, a content hash
/// and the descriptor writes for a freshly allocated set.
#[derive(Debug, Clone, Default)]
pub struct DescriptorBuilder {
    writes: Vec<PendingWrite>,
}

impl DescriptorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.writes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Binding the same slot twice replaces the earlier resource.
    pub fn bind_buffer(
        &mut self,
        binding: u32,
        info: vk::DescriptorBufferInfo,
        descriptor_type: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
    ) -> &mut Self {
        self.push(
            LayoutBinding::new(binding, descriptor_type, stages),
            BoundResource::Buffer(info),
        );
        self
    }

    pub fn bind_image(
        &mut self,
        binding: u32,
        info: vk::DescriptorImageInfo,
        descriptor_type: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
    ) -> &mut Self {
        self.push(
            LayoutBinding::new(binding, descriptor_type, stages),
            BoundResource::Image(info),
        );
        self
    }

    fn push(&mut self, binding: LayoutBinding, resource: BoundResource) {
        let write = PendingWrite { binding, resource };
        match self
            .writes
            .iter_mut()
            .find(|w| w.binding.binding == binding.binding)
        {
            Some(existing) => *existing = write,
            None => self.writes.push(write),
        }
        self.writes.sort_by_key(|w| w.binding.binding);
    }

    pub fn layout_key(&self) -> DescriptorLayoutKey {
        DescriptorLayoutKey::new(self.writes.iter().map(|w| w.binding).collect())
    }

    /// Hash over the layout shape and the identity of every bound resource.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.layout_key().hash(&mut hasher);

        for write in &self.writes {
            match write.resource {
                BoundResource::Buffer(info) => {
                    info.buffer.as_raw().hash(&mut hasher);
                    info.offset.hash(&mut hasher);
                    info.range.hash(&mut hasher);
                }
                BoundResource::Image(info) => {
                    info.image_view.as_raw().hash(&mut hasher);
                    info.sampler.as_raw().hash(&mut hasher);
                    info.image_layout.hash(&mut hasher);
                }
            }
        }

        hasher.finish()
    }

    pub fn write_set(&self, backend: &dyn DeviceBackend, set: vk::DescriptorSet) {
        let writes: Vec<_> = self
            .writes
            .iter()
            .map(|write| {
                let base = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(write.binding.binding)
                    .descriptor_type(write.binding.descriptor_type);

                match &write.resource {
                    BoundResource::Buffer(info) => base.buffer_info(std::slice::from_ref(info)),
                    BoundResource::Image(info) => base.image_info(std::slice::from_ref(info)),
                }
            })
            .collect();

        backend.update_descriptor_sets(&writes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_info(raw: u64, range: u64) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: vk::Buffer::from_raw(raw),
            offset: 0,
            range,
        }
    }

    #[test]
    fn test_key_is_sorted_by_binding() {
        let mut builder = DescriptorBuilder::new();
        builder
            .bind_buffer(
                2,
                buffer_info(1, 64),
                vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                vk::ShaderStageFlags::ALL_GRAPHICS,
            )
            .bind_buffer(
                0,
                buffer_info(2, 64),
                vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                vk::ShaderStageFlags::ALL_GRAPHICS,
            );

        let bindings: Vec<_> = builder
            .layout_key()
            .bindings
            .iter()
            .map(|b| b.binding)
            .collect();
        assert_eq!(bindings, vec![0, 2]);
    }

    #[test]
    fn test_hash_tracks_resource_identity() {
        let mut a = DescriptorBuilder::new();
        a.bind_buffer(
            0,
            buffer_info(10, 128),
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            vk::ShaderStageFlags::VERTEX,
        );
        let mut b = a.clone();
        assert_eq!(a.content_hash(), b.content_hash());

        b.bind_buffer(
            0,
            buffer_info(11, 128),
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            vk::ShaderStageFlags::VERTEX,
        );
        assert_ne!(a.content_hash(), b.content_hash());
    }
}
