use ash::vk;
use bytemuck::Pod;
use std::sync::Arc;

use crate::renderer::RenderContext;
use crate::vulkan::{CommandBuffer, GpuBuffer, Residency};
use crate::{AshError, Result};

/// Device-local vertex buffer plus an optional 32-bit index buffer.
pub struct Mesh {
    name: String,
    vertex_buffer: GpuBuffer,
    index_buffer: Option<GpuBuffer>,
    vertex_count: u32,
    index_count: u32,
}

impl Mesh {
    /// Uploads `vertices` and `indices` through staging buffers. An empty index slice gives a
    /// non-indexed mesh.
    pub fn upload<V: Pod>(
        context: &RenderContext,
        name: &str,
        vertices: &[V],
        indices: &[u32],
    ) -> Result<Self> {
        if vertices.is_empty() {
            return Err(AshError::PreconditionFailed(format!("mesh '{name}' has no vertices")));
        }
        validate_indices(vertices.len(), indices)?;

        let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
        let vertex_buffer = upload_buffer(
            context,
            vertex_bytes,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &format!("{name}_vertices"),
        )?;

        let index_buffer = if indices.is_empty() {
            None
        } else {
            Some(upload_buffer(
                context,
                bytemuck::cast_slice(indices),
                vk::BufferUsageFlags::INDEX_BUFFER,
                &format!("{name}_indices"),
            )?)
        };

        log::debug!(
            "Uploaded mesh '{name}': {} vertices, {} indices",
            vertices.len(),
            indices.len()
        );

        Ok(Self {
            name: name.to_owned(),
            vertex_buffer,
            index_buffer,
            vertex_count: vertices.len() as u32,
            index_count: indices.len() as u32,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn is_indexed(&self) -> bool {
        self.index_buffer.is_some()
    }

    /// Binds the buffers and records one draw of `instance_count` instances.
    pub fn record_draw(&self, cmd: &CommandBuffer, instance_count: u32) {
        cmd.bind_vertex_buffers(0, &[self.vertex_buffer.handle()], &[0]);
        match &self.index_buffer {
            Some(indices) => {
                cmd.bind_index_buffer(indices.handle(), 0, vk::IndexType::UINT32);
                cmd.draw_indexed(self.index_count, instance_count, 0, 0, 0);
            }
            None => cmd.draw(self.vertex_count, instance_count, 0, 0),
        }
    }
}

fn upload_buffer(
    context: &RenderContext,
    bytes: &[u8],
    usage: vk::BufferUsageFlags,
    name: &str,
) -> Result<GpuBuffer> {
    let mut buffer = GpuBuffer::new(
        Arc::clone(&context.allocator),
        bytes.len() as u64,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        Residency::DeviceLocal,
        Some(name),
    )?;
    buffer.upload(&context.uploader, bytes, 0)?;
    Ok(buffer)
}

/// Every index must address an existing vertex.
pub fn validate_indices(vertex_count: usize, indices: &[u32]) -> Result<()> {
    match indices.iter().position(|&i| i as usize >= vertex_count) {
        Some(pos) => Err(AshError::PreconditionFailed(format!(
            "index {} at position {pos} is out of range for {vertex_count} vertices",
            indices[pos]
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_within_range() {
        assert!(validate_indices(3, &[0, 1, 2, 2, 1, 0]).is_ok());
        assert!(validate_indices(3, &[]).is_ok());
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        let err = validate_indices(4, &[0, 1, 4]).unwrap_err();
        assert!(err.to_string().contains("position 2"));
    }
}
