use ash::vk;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::{AshError, Result};

/// Command pool that frees the buffers it handed out when dropped.
pub struct CommandPool {
    device: Arc<ash::Device>,
    pool: vk::CommandPool,
    queue_family_index: u32,
    tracked_buffers: Vec<vk::CommandBuffer>,
}

impl CommandPool {
    pub fn new(
        device: Arc<ash::Device>,
        queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(flags);

        let pool = unsafe {
            device.create_command_pool(&pool_info, None).map_err(|e| {
                log::error!("Failed to create command pool: {e:?}");
                AshError::vk("vkCreateCommandPool", e)
            })?
        };

        Ok(Self {
            device,
            pool,
            queue_family_index,
            tracked_buffers: Vec::new(),
        })
    }

    pub fn allocate_primary_buffers(&mut self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let buffers = unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(|e| AshError::vk("vkAllocateCommandBuffers", e))?
        };

        self.tracked_buffers.extend_from_slice(&buffers);
        Ok(buffers)
    }

    /// Returns a buffer to the pool before the pool itself is dropped.
    pub fn free(&mut self, buffer: vk::CommandBuffer) {
        self.tracked_buffers.retain(|&b| b != buffer);
        unsafe {
            self.device
                .free_command_buffers(self.pool, std::slice::from_ref(&buffer));
        }
    }

    pub fn reset(&mut self) -> Result<()> {
        unsafe {
            self.device
                .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())
                .map_err(|e| AshError::vk("vkResetCommandPool", e))
        }
    }

    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            if !self.tracked_buffers.is_empty() {
                self.device
                    .free_command_buffers(self.pool, &self.tracked_buffers);
            }
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}

/// Blocking one-shot submissions on the graphics queue (uploads, copies, mip generation).
pub struct Uploader {
    device: Arc<ash::Device>,
    queue: vk::Queue,
    pool: Mutex<CommandPool>,
}

impl Uploader {
    pub fn new(device: Arc<ash::Device>, queue: vk::Queue, queue_family_index: u32) -> Result<Self> {
        let pool = CommandPool::new(
            Arc::clone(&device),
            queue_family_index,
            vk::CommandPoolCreateFlags::TRANSIENT,
        )?;

        Ok(Self {
            device,
            queue,
            pool: Mutex::new(pool),
        })
    }

    /// Records `recorder` into a fresh command buffer, submits it and waits for the queue.
    /// Nothing is submitted if `recorder` fails.
    pub fn submit<F>(&self, recorder: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
    {
        let mut pool = self.pool.lock();
        let cmd = pool
            .allocate_primary_buffers(1)?
            .into_iter()
            .next()
            .ok_or_else(|| AshError::VulkanError("No command buffer allocated".into()))?;

        let result = self.record_and_submit(cmd, recorder);
        pool.free(cmd);
        result
    }

    fn record_and_submit<F>(&self, cmd: vk::CommandBuffer, recorder: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
    {
        unsafe {
            self.device
                .begin_command_buffer(
                    cmd,
                    &vk::CommandBufferBeginInfo::default()
                        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
                )
                .map_err(|e| AshError::vk("vkBeginCommandBuffer", e))?;

            let recorded = recorder(&self.device, cmd);

            self.device
                .end_command_buffer(cmd)
                .map_err(|e| AshError::vk("vkEndCommandBuffer", e))?;
            recorded?;

            let submit_info = vk::SubmitInfo::default().command_buffers(std::slice::from_ref(&cmd));
            self.device
                .queue_submit(self.queue, &[submit_info], vk::Fence::null())
                .map_err(|e| AshError::vk("vkQueueSubmit", e))?;
            self.device
                .queue_wait_idle(self.queue)
                .map_err(|e| AshError::vk("vkQueueWaitIdle", e))?;
        }

        Ok(())
    }

    /// Device-side copy of `size` bytes between two buffers.
    pub fn copy_buffer(
        &self,
        src: vk::Buffer,
        dst: vk::Buffer,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) -> Result<()> {
        self.submit(|device, cmd| {
            let region = vk::BufferCopy {
                src_offset,
                dst_offset,
                size,
            };
            unsafe { device.cmd_copy_buffer(cmd, src, dst, &[region]) };
            Ok(())
        })
    }
}
