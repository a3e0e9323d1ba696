use ash::vk;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::renderer::RenderContext;
use crate::utils::{HandleTable, ResourceId};
use crate::vulkan::shader_buffer::ShaderBufferKind;
use crate::vulkan::{
    Allocator, CacheEpoch, DescriptorBuilder, DynamicShaderBuffer, FrameDeletionQueues, Uploader,
};
use crate::{AshError, Result};

/// Which buffer occupies each descriptor binding, ordered by binding.
#[derive(Debug, Clone, Default)]
pub struct BindingSlots {
    slots: BTreeMap<u32, (ResourceId, vk::ShaderStageFlags)>,
}

impl BindingSlots {
    /// Puts `id` at `binding`. A buffer already bound elsewhere moves; whatever held `binding`
    /// before is evicted and returned.
    pub fn bind(
        &mut self,
        id: ResourceId,
        binding: u32,
        stages: vk::ShaderStageFlags,
    ) -> Option<ResourceId> {
        self.slots.retain(|_, (bound, _)| *bound != id);
        self.slots
            .insert(binding, (id, stages))
            .map(|(evicted, _)| evicted)
    }

    pub fn unbind(&mut self, id: ResourceId) -> bool {
        let before = self.slots.len();
        self.slots.retain(|_, (bound, _)| *bound != id);
        self.slots.len() != before
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn binding_of(&self, id: ResourceId) -> Option<u32> {
        self.slots
            .iter()
            .find(|(_, (bound, _))| *bound == id)
            .map(|(&binding, _)| binding)
    }

    /// `(binding, id, stages)` in ascending binding order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, ResourceId, vk::ShaderStageFlags)> + '_ {
        self.slots
            .iter()
            .map(|(&binding, &(id, stages))| (binding, id, stages))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

struct NamedBuffer {
    name: String,
    buffer: DynamicShaderBuffer,
}

/// Owns every dynamic UBO/SSBO and tracks which are bound for the next draw.
pub struct ShaderBufferManager {
    buffers: HandleTable<NamedBuffer>,
    bindings: BindingSlots,
    allocator: Arc<Allocator>,
    uploader: Arc<Uploader>,
    epoch: CacheEpoch,
    deletions: Arc<FrameDeletionQueues>,
    initial_size: u64,
    uniform_alignment: u64,
    storage_alignment: u64,
}

impl ShaderBufferManager {
    pub fn new(context: &RenderContext, initial_size: u64) -> Self {
        Self {
            buffers: HandleTable::new(),
            bindings: BindingSlots::default(),
            allocator: Arc::clone(&context.allocator),
            uploader: Arc::clone(&context.uploader),
            epoch: context.epoch.clone(),
            deletions: Arc::clone(&context.deletions),
            initial_size,
            uniform_alignment: context
                .device
                .dynamic_offset_alignment(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC),
            storage_alignment: context
                .device
                .dynamic_offset_alignment(vk::DescriptorType::STORAGE_BUFFER_DYNAMIC),
        }
    }

    pub fn create_uniform_buffer(&mut self, name: &str) -> Result<ResourceId> {
        self.create(name, ShaderBufferKind::Uniform)
    }

    pub fn create_storage_buffer(&mut self, name: &str) -> Result<ResourceId> {
        self.create(name, ShaderBufferKind::Storage)
    }

    fn create(&mut self, name: &str, kind: ShaderBufferKind) -> Result<ResourceId> {
        let alignment = match kind {
            ShaderBufferKind::Uniform => self.uniform_alignment,
            ShaderBufferKind::Storage => self.storage_alignment,
        };
        let buffer = DynamicShaderBuffer::new(
            kind,
            self.initial_size,
            alignment,
            Arc::clone(&self.allocator),
            Arc::clone(&self.uploader),
            self.epoch.clone(),
            Arc::clone(&self.deletions),
        )?;

        let id = self.buffers.insert(NamedBuffer {
            name: name.to_owned(),
            buffer,
        });
        log::debug!("Shader buffer '{name}' registered as {id:?}");
        Ok(id)
    }

    pub fn get(&self, id: ResourceId) -> Option<&DynamicShaderBuffer> {
        self.buffers.get(id).map(|entry| &entry.buffer)
    }

    pub fn find(&self, name: &str) -> Option<ResourceId> {
        self.buffers
            .iter()
            .find(|(_, entry)| entry.name == name)
            .map(|(id, _)| id)
    }

    /// Appends `data` to the buffer's ring for `frame`. Returns the dynamic offset it landed at,
    /// or `None` for an empty push.
    pub fn push_data(&mut self, id: ResourceId, frame: usize, data: &[u8]) -> Result<Option<u32>> {
        let entry = self
            .buffers
            .get_mut(id)
            .ok_or_else(|| AshError::ResourceNotFound(format!("shader buffer {id:?}")))?;
        entry.buffer.push_data(frame, data)
    }

    pub fn bind(&mut self, id: ResourceId, binding: u32, stages: vk::ShaderStageFlags) -> Result<()> {
        if !self.buffers.contains(id) {
            return Err(AshError::ResourceNotFound(format!("shader buffer {id:?}")));
        }
        if let Some(evicted) = self.bindings.bind(id, binding, stages) {
            log::trace!("Binding {binding}: {evicted:?} replaced by {id:?}");
        }
        Ok(())
    }

    pub fn unbind(&mut self, id: ResourceId) -> bool {
        self.bindings.unbind(id)
    }

    pub fn unbind_all(&mut self) {
        self.bindings.clear();
    }

    /// Adds every bound buffer to `builder` at its binding.
    pub fn write_bindings(&self, builder: &mut DescriptorBuilder) {
        for (binding, id, stages) in self.bindings.iter() {
            if let Some(entry) = self.buffers.get(id) {
                builder.bind_buffer(
                    binding,
                    entry.buffer.descriptor_info(),
                    entry.buffer.descriptor_type(),
                    stages,
                );
            }
        }
    }

    /// Dynamic offsets of the bound buffers, in binding order.
    pub fn dynamic_offsets(&self) -> Vec<u32> {
        self.bindings
            .iter()
            .filter_map(|(_, id, _)| self.buffers.get(id))
            .map(|entry| entry.buffer.dynamic_offset())
            .collect()
    }

    /// Releases `frame`'s share of every ring. Call once the slot's fence has been waited.
    pub fn reset_frame(&mut self, frame: usize) {
        for entry in self.buffers.iter_mut() {
            entry.buffer.reset_frame(frame);
        }
    }

    pub fn destroy(&mut self, id: ResourceId) -> bool {
        self.bindings.unbind(id);
        self.buffers.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_iterate_in_binding_order() {
        let mut slots = BindingSlots::default();
        let a = ResourceId::new(0, 0);
        let b = ResourceId::new(1, 0);
        let c = ResourceId::new(2, 0);

        slots.bind(c, 5, vk::ShaderStageFlags::FRAGMENT);
        slots.bind(a, 0, vk::ShaderStageFlags::VERTEX);
        slots.bind(b, 2, vk::ShaderStageFlags::ALL_GRAPHICS);

        let order: Vec<_> = slots.iter().map(|(binding, id, _)| (binding, id)).collect();
        assert_eq!(order, vec![(0, a), (2, b), (5, c)]);
    }

    #[test]
    fn test_rebinding_moves_and_evicts() {
        let mut slots = BindingSlots::default();
        let a = ResourceId::new(0, 0);
        let b = ResourceId::new(1, 0);

        assert_eq!(slots.bind(a, 0, vk::ShaderStageFlags::VERTEX), None);
        assert_eq!(slots.bind(a, 3, vk::ShaderStageFlags::VERTEX), None);
        assert_eq!(slots.binding_of(a), Some(3));
        assert_eq!(slots.len(), 1);

        assert_eq!(slots.bind(b, 3, vk::ShaderStageFlags::VERTEX), Some(a));
        assert_eq!(slots.binding_of(a), None);

        assert!(slots.unbind(b));
        assert!(!slots.unbind(b));
        assert!(slots.is_empty());
    }
}
