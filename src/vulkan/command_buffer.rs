use ash::vk;
use std::sync::Arc;

use crate::config::FRAMES_IN_FLIGHT;
use crate::vulkan::command::CommandPool;
use crate::vulkan::render_target::{RenderTarget, SwapchainSync};
use crate::{AshError, Result};

struct FrameSlot {
    pool: CommandPool,
    buffer: vk::CommandBuffer,
    fence: vk::Fence,
}

/// Per-frame graphics command recording: one pool, buffer and fence per frame slot.
pub struct CommandBuffer {
    device: Arc<ash::Device>,
    queue: vk::Queue,
    slots: Vec<FrameSlot>,
    frame: usize,
    recording: bool,
    rendering: bool,
    swapchain_sync: Option<SwapchainSync>,
}

impl CommandBuffer {
    pub fn new(device: Arc<ash::Device>, queue: vk::Queue, queue_family_index: u32) -> Result<Self> {
        let mut slots = Vec::with_capacity(FRAMES_IN_FLIGHT);
        for _ in 0..FRAMES_IN_FLIGHT {
            let mut pool = CommandPool::new(
                Arc::clone(&device),
                queue_family_index,
                vk::CommandPoolCreateFlags::TRANSIENT,
            )?;
            let buffer = pool
                .allocate_primary_buffers(1)?
                .into_iter()
                .next()
                .ok_or_else(|| AshError::VulkanError("No command buffer allocated".into()))?;

            let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
            let fence = unsafe { device.create_fence(&fence_info, None) }.map_err(|e| {
                log::error!("Failed to create frame fence: {e:?}");
                AshError::vk("vkCreateFence", e)
            })?;

            slots.push(FrameSlot {
                pool,
                buffer,
                fence,
            });
        }

        Ok(Self {
            device,
            queue,
            slots,
            frame: 0,
            recording: false,
            rendering: false,
            swapchain_sync: None,
        })
    }

    pub fn handle(&self) -> vk::CommandBuffer {
        self.slots[self.frame].buffer
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Waits for the slot's previous submission, resets its pool and begins a one-time-submit
    /// recording.
    pub fn begin_recording(&mut self, frame: usize) -> Result<()> {
        if self.recording {
            return Err(AshError::PreconditionFailed(
                "begin_recording while already recording".into(),
            ));
        }

        self.frame = frame % self.slots.len();
        let slot = &mut self.slots[self.frame];

        unsafe {
            self.device
                .wait_for_fences(&[slot.fence], true, u64::MAX)
                .map_err(|e| AshError::vk("vkWaitForFences", e))?;
        }
        slot.pool.reset()?;

        let begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(slot.buffer, &begin_info) }
            .map_err(|e| AshError::vk("vkBeginCommandBuffer", e))?;

        self.recording = true;
        self.swapchain_sync = None;
        Ok(())
    }

    /// Ends the recording without submitting it. The slot's fence stays signalled.
    pub fn cancel_recording(&mut self) -> Result<()> {
        if !self.recording {
            return Ok(());
        }
        unsafe { self.device.end_command_buffer(self.handle()) }
            .map_err(|e| AshError::vk("vkEndCommandBuffer", e))?;
        self.recording = false;
        self.rendering = false;
        self.swapchain_sync = None;
        Ok(())
    }

    /// Transitions the target's attachments and opens a dynamic-rendering scope covering it,
    /// with a flipped viewport and full scissor.
    pub fn begin_rendering(&mut self, target: &mut dyn RenderTarget) -> Result<()> {
        if !self.recording || self.rendering {
            return Err(AshError::PreconditionFailed(
                "begin_rendering needs an open recording and no open rendering scope".into(),
            ));
        }

        let cmd = self.handle();
        target.begin_rendering(&self.device, cmd)?;

        let info = target.render_info();
        let colour_attachments = info.colour_attachment_infos();
        let depth_attachment = info.depth_attachment_info();

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(info.render_area())
            .layer_count(1)
            .color_attachments(&colour_attachments);
        if let Some(depth) = depth_attachment.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth);
            if info.has_stencil() {
                rendering_info = rendering_info.stencil_attachment(depth);
            }
        }

        unsafe {
            self.device.cmd_begin_rendering(cmd, &rendering_info);
            self.device
                .cmd_set_viewport(cmd, 0, &[info.flipped_viewport()]);
            self.device.cmd_set_scissor(cmd, 0, &[info.render_area()]);
        }

        if let Some(sync) = target.swapchain_sync() {
            self.swapchain_sync = Some(sync);
        }
        self.rendering = true;
        Ok(())
    }

    /// Closes the rendering scope and moves the target's attachments to their sampled (or
    /// present) layouts.
    pub fn end_rendering(&mut self, target: &mut dyn RenderTarget) -> Result<()> {
        if !self.rendering {
            return Err(AshError::PreconditionFailed(
                "end_rendering without begin_rendering".into(),
            ));
        }

        let cmd = self.handle();
        unsafe { self.device.cmd_end_rendering(cmd) };
        self.rendering = false;
        target.end_rendering(&self.device, cmd)
    }

    /// Ends recording and submits on the graphics queue. Swapchain semaphores are wired only
    /// when a swapchain target was rendered this frame.
    pub fn submit(&mut self, compute_wait: Option<vk::SemaphoreSubmitInfo<'static>>) -> Result<()> {
        if !self.recording || self.rendering {
            return Err(AshError::PreconditionFailed(
                "submit needs an open recording and no open rendering scope".into(),
            ));
        }

        let slot = &self.slots[self.frame];
        unsafe { self.device.end_command_buffer(slot.buffer) }
            .map_err(|e| AshError::vk("vkEndCommandBuffer", e))?;
        self.recording = false;

        let (mut waits, signals) = submit_semaphores(self.swapchain_sync.take());
        waits.extend(compute_wait);

        let buffer_info = vk::CommandBufferSubmitInfo::default().command_buffer(slot.buffer);
        let submit_info = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&waits)
            .command_buffer_infos(std::slice::from_ref(&buffer_info))
            .signal_semaphore_infos(&signals);

        unsafe {
            self.device
                .reset_fences(&[slot.fence])
                .map_err(|e| AshError::vk("vkResetFences", e))?;
            self.device
                .queue_submit2(self.queue, &[submit_info], slot.fence)
                .map_err(|e| {
                    log::error!("Frame submission failed: {e:?}");
                    AshError::vk("vkQueueSubmit2", e)
                })?;
        }

        Ok(())
    }

    pub fn bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe { self.device.cmd_bind_pipeline(self.handle(), bind_point, pipeline) };
    }

    pub fn bind_descriptor_set(
        &self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.handle(),
                bind_point,
                layout,
                0,
                &[set],
                dynamic_offsets,
            );
        }
    }

    pub fn bind_vertex_buffers(&self, first_binding: u32, buffers: &[vk::Buffer], offsets: &[u64]) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.handle(), first_binding, buffers, offsets)
        };
    }

    pub fn bind_index_buffer(&self, buffer: vk::Buffer, offset: u64, index_type: vk::IndexType) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(self.handle(), buffer, offset, index_type)
        };
    }

    pub fn push_constants(
        &self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        data: &[u8],
    ) {
        unsafe {
            self.device
                .cmd_push_constants(self.handle(), layout, stages, 0, data)
        };
    }

    pub fn draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device.cmd_draw(
                self.handle(),
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            )
        };
    }

    pub fn draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                self.handle(),
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        };
    }

    pub fn dispatch(&self, groups_x: u32, groups_y: u32, groups_z: u32) {
        unsafe { self.device.cmd_dispatch(self.handle(), groups_x, groups_y, groups_z) };
    }

    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe { self.device.cmd_copy_buffer(self.handle(), src, dst, regions) };
    }

    pub fn copy_buffer_to_image(
        &self,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe {
            self.device
                .cmd_copy_buffer_to_image(self.handle(), src, dst, dst_layout, regions)
        };
    }

    pub fn blit_image(
        &self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    ) {
        unsafe {
            self.device.cmd_blit_image(
                self.handle(),
                src,
                src_layout,
                dst,
                dst_layout,
                regions,
                filter,
            )
        };
    }

    /// Raw synchronization2 barrier.
    pub fn pipeline_barrier(&self, dependency: &vk::DependencyInfo<'_>) {
        unsafe { self.device.cmd_pipeline_barrier2(self.handle(), dependency) };
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        unsafe {
            let fences: Vec<_> = self.slots.iter().map(|slot| slot.fence).collect();
            let _ = self.device.wait_for_fences(&fences, true, u64::MAX);
            for fence in fences {
                self.device.destroy_fence(fence, None);
            }
        }
    }
}

/// Wait/signal semaphore lists for a frame submission.
pub fn submit_semaphores(
    sync: Option<SwapchainSync>,
) -> (
    Vec<vk::SemaphoreSubmitInfo<'static>>,
    Vec<vk::SemaphoreSubmitInfo<'static>>,
) {
    match sync {
        Some(sync) => (
            vec![vk::SemaphoreSubmitInfo::default()
                .semaphore(sync.image_available)
                .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)],
            vec![vk::SemaphoreSubmitInfo::default()
                .semaphore(sync.render_finished)
                .stage_mask(vk::PipelineStageFlags2::ALL_GRAPHICS)],
        ),
        None => (Vec::new(), Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_offscreen_submission_has_no_semaphores() {
        let (waits, signals) = submit_semaphores(None);
        assert!(waits.is_empty());
        assert!(signals.is_empty());
    }

    #[test]
    fn test_swapchain_submission_waits_on_acquire() {
        let sync = SwapchainSync {
            image_available: vk::Semaphore::from_raw(1),
            render_finished: vk::Semaphore::from_raw(2),
        };
        let (waits, signals) = submit_semaphores(Some(sync));
        assert_eq!(waits.len(), 1);
        assert_eq!(waits[0].semaphore.as_raw(), 1);
        assert_eq!(waits[0].stage_mask, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(signals[0].semaphore.as_raw(), 2);
    }
}
