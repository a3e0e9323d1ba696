use ash::vk;
use std::sync::Arc;
use vk_mem::Alloc;

use crate::vulkan::{Allocator, Residency, Uploader};
use crate::{AshError, Result};

/// A single buffer allocation, destroyed on drop.
pub struct GpuBuffer {
    buffer: vk::Buffer,
    allocation: vk_mem::Allocation,
    allocator: Arc<Allocator>,
    size: u64,
    usage: vk::BufferUsageFlags,
    residency: Residency,
    name: Option<String>,
}

impl GpuBuffer {
    pub fn new(
        allocator: Arc<Allocator>,
        size: u64,
        usage: vk::BufferUsageFlags,
        residency: Residency,
        name: Option<&str>,
    ) -> Result<Self> {
        match name {
            Some(n) => log::debug!("Creating buffer '{n}' ({size}B, {residency:?})"),
            None => log::debug!("Creating buffer ({size}B, {residency:?})"),
        }

        let (buffer, allocation) = unsafe { allocator.create_buffer(size, usage, residency)? };

        Ok(Self {
            buffer,
            allocation,
            allocator,
            size,
            usage,
            residency,
            name: name.map(str::to_owned),
        })
    }

    /// Host-visible transfer source sized for `size` bytes.
    pub fn staging(allocator: Arc<Allocator>, size: u64) -> Result<Self> {
        Self::new(
            allocator,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            Residency::HostVisible,
            None,
        )
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    pub fn residency(&self) -> Residency {
        self.residency
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Copies `data` into mapped memory at `offset`. Only valid for host-visible buffers.
    pub fn write(&mut self, data: &[u8], offset: u64) -> Result<()> {
        if self.residency != Residency::HostVisible {
            return Err(AshError::PreconditionFailed(
                "direct writes require a host-visible buffer".into(),
            ));
        }
        self.check_range(offset, data.len() as u64)?;

        unsafe {
            let ptr = self
                .allocator
                .vma
                .map_memory(&mut self.allocation)
                .map_err(|e| AshError::vk("vmaMapMemory", e))?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset as usize), data.len());
            let flushed = self
                .allocator
                .vma
                .flush_allocation(&self.allocation, offset, data.len() as u64);
            self.allocator.vma.unmap_memory(&mut self.allocation);
            flushed.map_err(|e| AshError::vk("vmaFlushAllocation", e))?;
        }

        Ok(())
    }

    /// Writes `data` at `offset` regardless of residency. Device-local buffers go through a
    /// temporary staging buffer and a blocking transfer.
    pub fn upload(&mut self, uploader: &Uploader, data: &[u8], offset: u64) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        match self.residency {
            Residency::HostVisible => self.write(data, offset),
            Residency::DeviceLocal => {
                self.check_range(offset, data.len() as u64)?;
                let mut staging = GpuBuffer::staging(Arc::clone(&self.allocator), data.len() as u64)?;
                staging.write(data, 0)?;
                uploader.copy_buffer(staging.handle(), self.buffer, 0, offset, data.len() as u64)
            }
        }
    }

    /// Device-side copy of this buffer's first `size` bytes into `dst` at `dst_offset`.
    pub fn copy_to(&self, uploader: &Uploader, dst: &GpuBuffer, size: u64, dst_offset: u64) -> Result<()> {
        if size > self.size || dst_offset + size > dst.size {
            return Err(AshError::PreconditionFailed(format!(
                "copy of {size}B does not fit ({}B -> {}B at {dst_offset})",
                self.size, dst.size
            )));
        }
        uploader.copy_buffer(self.buffer, dst.buffer, 0, dst_offset, size)
    }

    pub fn descriptor_info(&self, range: u64) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset: 0,
            range,
        }
    }

    fn check_range(&self, offset: u64, len: u64) -> Result<()> {
        if offset + len > self.size {
            return Err(AshError::PreconditionFailed(format!(
                "write of {len}B at {offset} overruns buffer of {}B",
                self.size
            )));
        }
        Ok(())
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        if let Some(ref name) = self.name {
            log::debug!("Destroying buffer '{name}'");
        }
        unsafe {
            self.allocator
                .destroy_buffer(self.buffer, &mut self.allocation);
        }
    }
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuBuffer")
            .field("buffer", &self.buffer)
            .field("size", &self.size)
            .field("residency", &self.residency)
            .field("name", &self.name)
            .finish()
    }
}
