use ash::vk;
use std::collections::HashMap;
use std::sync::Arc;

use crate::renderer::RenderContext;
use crate::utils::{HandleTable, ResourceId};
use crate::vulkan::{Allocator, OffscreenTarget, RenderTargetDesc, Uploader, VulkanDevice};
use crate::{AshError, Result};

/// Owns offscreen targets by name. Attachments record the id of the target that owns them.
pub struct RenderTargetManager {
    gpu: Arc<VulkanDevice>,
    allocator: Arc<Allocator>,
    uploader: Arc<Uploader>,
    targets: HandleTable<OffscreenTarget>,
    names: HashMap<String, ResourceId>,
}

impl RenderTargetManager {
    pub fn new(context: &RenderContext) -> Self {
        Self {
            gpu: Arc::clone(&context.device),
            allocator: Arc::clone(&context.allocator),
            uploader: Arc::clone(&context.uploader),
            targets: HandleTable::new(),
            names: HashMap::new(),
        }
    }

    /// Best depth format the device supports, for `RenderTargetDesc::with_depth`.
    pub fn default_depth_format(&self) -> Result<vk::Format> {
        self.gpu.find_depth_format()
    }

    /// Creates the target and moves its colour attachments to `ShaderReadOnly`, generating
    /// mips when the desc asks for more than one level.
    pub fn create_target(&mut self, name: &str, desc: RenderTargetDesc) -> Result<ResourceId> {
        if desc.colour_formats.is_empty() && desc.depth_format.is_none() {
            return Err(AshError::PreconditionFailed(format!(
                "render target '{name}' has no attachments"
            )));
        }
        let max_samples = self.gpu.max_usable_sample_count();
        if desc.samples.as_raw() > max_samples.as_raw() {
            return Err(AshError::PreconditionFailed(format!(
                "render target '{name}' wants {:?}, device supports up to {max_samples:?}",
                desc.samples
            )));
        }

        let mut target = OffscreenTarget::new(&self.gpu.device, &self.allocator, desc)?;
        target.prepare(&self.gpu, &self.uploader)?;

        let id = self.targets.insert(target);
        if let Some(target) = self.targets.get_mut(id) {
            for idx in 0..target.colour_attachment_count() {
                if let Some(texture) = target.attachment_mut(idx) {
                    texture.set_owner(Some(id));
                }
            }
        }
        self.names.insert(name.to_owned(), id);

        log::info!("Render target '{name}' registered as {id:?}");
        Ok(id)
    }

    pub fn find(&self, name: &str) -> Option<ResourceId> {
        self.names.get(name).copied().filter(|&id| self.targets.contains(id))
    }

    pub fn get(&self, id: ResourceId) -> Option<&OffscreenTarget> {
        self.targets.get(id)
    }

    pub fn get_mut(&mut self, id: ResourceId) -> Option<&mut OffscreenTarget> {
        self.targets.get_mut(id)
    }

    pub fn get_by_name_mut(&mut self, name: &str) -> Option<&mut OffscreenTarget> {
        let id = self.find(name)?;
        self.targets.get_mut(id)
    }

    /// The target is dropped immediately; callers must make sure the GPU is done with it.
    pub fn destroy(&mut self, id: ResourceId) -> bool {
        self.names.retain(|_, named| *named != id);
        self.targets.remove(id).is_some()
    }

    /// Forgets the tracked layout of every attachment, after a frame that moved them was
    /// thrown away unsubmitted.
    pub fn discard_contents(&mut self) {
        for target in self.targets.iter_mut() {
            target.discard_contents();
        }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
