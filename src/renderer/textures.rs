use ash::vk;
use std::collections::HashMap;
use std::sync::Arc;

use crate::renderer::RenderContext;
use crate::utils::{HandleTable, ResourceId};
use crate::vulkan::{
    Allocator, BoundTexture, GpuBuffer, ImageLayout, SamplerStyle, Texture, TextureDesc,
    TextureSampler, Uploader, VulkanDevice,
};
use crate::{AshError, Result};

/// Owns textures and named samplers. Other code holds [`ResourceId`]s.
pub struct TextureManager {
    gpu: Arc<VulkanDevice>,
    allocator: Arc<Allocator>,
    uploader: Arc<Uploader>,
    textures: HandleTable<Texture>,
    names: HashMap<String, ResourceId>,
    samplers: HashMap<String, TextureSampler>,
}

impl TextureManager {
    pub fn new(context: &RenderContext) -> Self {
        Self {
            gpu: Arc::clone(&context.device),
            allocator: Arc::clone(&context.allocator),
            uploader: Arc::clone(&context.uploader),
            textures: HandleTable::new(),
            names: HashMap::new(),
            samplers: HashMap::new(),
        }
    }

    /// Uploads `pixels` into mip 0 of every layer and fills the rest of the chain.
    /// The texture ends up in `ShaderReadOnly`.
    pub fn create_from_data(&mut self, name: &str, desc: TextureDesc, pixels: &[u8]) -> Result<ResourceId> {
        let layers = desc.layer_count();
        let layer_size = upload_layer_size(pixels.len(), layers)?;
        let mut texture = self.new_texture(desc)?;
        let regions = texture.face_copy_regions(layers, layer_size);

        self.upload(&mut texture, pixels, &regions)?;
        log::info!(
            "Uploaded texture '{name}' ({}x{}, {} mips)",
            texture.width(),
            texture.height(),
            texture.mip_levels()
        );
        Ok(self.register(name, texture))
    }

    /// Six faces packed back to back in `+X, -X, +Y, -Y, +Z, -Z` order, all in one staging buffer.
    pub fn create_cube_map(
        &mut self,
        name: &str,
        format: vk::Format,
        size: u32,
        mip_levels: u32,
        faces: &[u8],
    ) -> Result<ResourceId> {
        let desc = TextureDesc::cube(format, size).with_mips(mip_levels);
        let face_size = upload_layer_size(faces.len(), 6)?;
        let mut texture = self.new_texture(desc)?;
        let regions = texture.face_copy_regions(6, face_size);

        self.upload(&mut texture, faces, &regions)?;
        log::info!("Uploaded cube map '{name}' ({size}x{size}, {face_size}B per face)");
        Ok(self.register(name, texture))
    }

    /// GPU-written texture with no initial contents, left in `Undefined`.
    pub fn create_attachment(&mut self, name: &str, desc: TextureDesc) -> Result<ResourceId> {
        let texture = self.new_texture(desc)?;
        Ok(self.register(name, texture))
    }

    /// Takes ownership of a texture created elsewhere, e.g. a render target attachment.
    pub fn adopt(&mut self, name: &str, texture: Texture) -> ResourceId {
        self.register(name, texture)
    }

    /// Creates the sampler `name` or returns the one already registered under it.
    pub fn create_sampler(&mut self, name: &str, style: SamplerStyle) -> Result<vk::Sampler> {
        let max_anisotropy = self.gpu.max_sampler_anisotropy();
        let device = &self.gpu.device;

        let sampler = self.samplers.entry(name.to_owned()).or_insert_with(|| {
            TextureSampler::new(Arc::clone(device), style, max_anisotropy)
        });
        if sampler.style() != style {
            log::warn!("Sampler '{name}' already exists with {:?}; keeping it", sampler.style());
        }
        sampler.handle()
    }

    pub fn sampler(&mut self, name: &str) -> Result<vk::Sampler> {
        self.samplers
            .get_mut(name)
            .ok_or_else(|| AshError::ResourceNotFound(format!("sampler '{name}'")))?
            .handle()
    }

    pub fn find(&self, name: &str) -> Option<ResourceId> {
        self.names.get(name).copied().filter(|&id| self.textures.contains(id))
    }

    pub fn get(&self, id: ResourceId) -> Option<&Texture> {
        self.textures.get(id)
    }

    pub fn get_mut(&mut self, id: ResourceId) -> Option<&mut Texture> {
        self.textures.get_mut(id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Texture> {
        self.find(name).and_then(|id| self.textures.get(id))
    }

    /// Texture `id` paired with sampler `sampler_name`, ready for a descriptor write. Fails while
    /// the texture sits in a layout shaders cannot read.
    pub fn bind(&mut self, id: ResourceId, sampler_name: &str) -> Result<BoundTexture> {
        let sampler = self.sampler(sampler_name)?;
        self.textures
            .get_mut(id)
            .ok_or_else(|| AshError::ResourceNotFound(format!("texture {id:?}")))?
            .bound(sampler)
    }

    /// The texture is dropped immediately; callers must make sure the GPU is done with it.
    pub fn destroy(&mut self, id: ResourceId) -> bool {
        self.names.retain(|_, named| *named != id);
        self.textures.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    fn new_texture(&self, desc: TextureDesc) -> Result<Texture> {
        Texture::new(
            Arc::clone(&self.gpu.device),
            Arc::clone(&self.allocator),
            desc,
        )
    }

    fn register(&mut self, name: &str, texture: Texture) -> ResourceId {
        let id = self.textures.insert(texture);
        if let Some(previous) = self.names.insert(name.to_owned(), id) {
            log::debug!("Texture name '{name}' moved from {previous:?} to {id:?}");
        }
        id
    }

    fn upload(&self, texture: &mut Texture, pixels: &[u8], regions: &[vk::BufferImageCopy]) -> Result<()> {
        texture.ensure_mip_filtering(&self.gpu)?;

        let mut staging = GpuBuffer::staging(Arc::clone(&self.allocator), pixels.len() as u64)?;
        staging.write(pixels, 0)?;

        let staging_buffer = staging.handle();
        let before = texture.layout_state();

        let result = self.uploader.submit(|device, cmd| {
            texture.transition_layout(device, cmd, ImageLayout::TransferDst)?;
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    staging_buffer,
                    texture.image(),
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    regions,
                );
            }

            if texture.mip_levels() > 1 {
                texture.record_mip_chain(device, cmd)
            } else {
                texture.transition_layout(device, cmd, ImageLayout::ShaderReadOnly)
            }
        });

        if result.is_err() {
            texture.restore_layout_state(before);
        }
        result
    }
}

/// Bytes per layer for an upload of `total` bytes split evenly over `layers`.
fn upload_layer_size(total: usize, layers: u32) -> Result<u64> {
    if total == 0 || layers == 0 {
        return Err(AshError::PreconditionFailed("texture upload with no pixel data".into()));
    }
    if total % layers as usize != 0 {
        return Err(AshError::PreconditionFailed(format!(
            "{total}B of pixel data cannot be split into {layers} equal layers"
        )));
    }
    Ok((total / layers as usize) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_size_splits_evenly() {
        assert_eq!(upload_layer_size(6 * 64, 6).unwrap(), 64);
        assert_eq!(upload_layer_size(256, 1).unwrap(), 256);
    }

    #[test]
    fn test_layer_size_rejects_ragged_or_empty_data() {
        assert!(matches!(upload_layer_size(0, 1), Err(AshError::PreconditionFailed(_))));
        assert!(matches!(upload_layer_size(100, 6), Err(AshError::PreconditionFailed(_))));
    }
}
