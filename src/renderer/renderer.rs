use ash::vk;
use bytemuck::Pod;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RendererConfig;
use crate::renderer::compute_pass::{compute_layout_key, ComputeBuffer, ComputeDispatch, ComputePass};
use crate::renderer::forward_pass::{
    CameraData, DrawCommand, ForwardBindings, ForwardPass, Material, PassResources, PassStats,
};
use crate::renderer::{Mesh, RenderContext, RenderTargetManager, ShaderBufferManager, TextureManager};
use crate::utils::{warn_if_frame_budget_exceeded, HandleTable, ResourceId};
use crate::vulkan::{
    Backbuffer, CommandBuffer, DescriptorCache, FrameCounter, PipelineCache, PresentationOps,
    RenderTarget, ShaderProgram, ShaderStage, SurfaceProvider,
};
use crate::{AshError, Result};

/// Draws recorded into an offscreen target before the backbuffer pass.
#[derive(Debug, Clone, Copy)]
pub struct OffscreenPass<'a> {
    pub target: ResourceId,
    pub camera: CameraData,
    pub draws: &'a [DrawCommand],
}

/// Everything drawn in one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameRequest<'a> {
    pub camera: CameraData,
    pub draws: &'a [DrawCommand],
    /// Recorded first, in order, with a barrier after each dispatch.
    pub compute: &'a [ComputeDispatch<'a>],
    pub offscreen: &'a [OffscreenPass<'a>],
    /// Binary semaphore signalled by compute work this frame depends on.
    pub compute_wait: Option<vk::Semaphore>,
}

impl<'a> FrameRequest<'a> {
    pub fn new(camera: CameraData, draws: &'a [DrawCommand]) -> Self {
        Self {
            camera,
            draws,
            compute: &[],
            offscreen: &[],
            compute_wait: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented {
        stats: PassStats,
        frame_time: Duration,
    },
    /// No swap image could be acquired; nothing was submitted.
    Skipped,
}

/// Forward renderer: owns the context, managers, caches and the frame loop.
pub struct Renderer {
    // Teardown order: users of the context first, the context last.
    compute: ComputePass,
    forward: ForwardPass,
    materials: HandleTable<Material>,
    meshes: HandleTable<Mesh>,
    descriptors: DescriptorCache,
    pipelines: PipelineCache,
    shaders: HandleTable<ShaderProgram>,
    shader_buffers: ShaderBufferManager,
    render_targets: RenderTargetManager,
    textures: TextureManager,
    command_buffer: CommandBuffer,
    backbuffer: Backbuffer,
    frame_counter: FrameCounter,
    config: RendererConfig,
    context: RenderContext,
}

impl Renderer {
    pub fn new<S: SurfaceProvider + ?Sized>(surface_provider: &S, config: RendererConfig) -> Result<Self> {
        log::info!("Initializing renderer ({config:?})");

        let context = RenderContext::new(surface_provider, &config)?;
        let (width, height) = surface_provider.physical_size();
        let samples = config.msaa.sample_count(context.max_usable_sample_count());

        let backbuffer = Backbuffer::new(
            Arc::clone(&context.device),
            Arc::clone(&context.allocator),
            width,
            height,
            samples,
            config.vsync,
        )?;
        let command_buffer = CommandBuffer::new(
            Arc::clone(context.raw_device()),
            context.device.graphics_queue,
            context.device.graphics_queue_family,
        )?;

        let mut shader_buffers = ShaderBufferManager::new(&context, config.shader_buffer_initial_size());
        let forward = ForwardPass::new(&mut shader_buffers, ForwardBindings::default())?;
        let descriptors = DescriptorCache::new(
            context.backend(),
            context.epoch.clone(),
            config.initial_descriptor_sets,
        )?;

        log::info!("Renderer ready ({width}x{height}, {samples:?})");

        Ok(Self {
            compute: ComputePass::new(),
            forward,
            materials: HandleTable::new(),
            meshes: HandleTable::new(),
            descriptors,
            pipelines: PipelineCache::new(context.backend()),
            shaders: HandleTable::new(),
            shader_buffers,
            render_targets: RenderTargetManager::new(&context),
            textures: TextureManager::new(&context),
            command_buffer,
            backbuffer,
            frame_counter: FrameCounter::new(),
            config,
            context,
        })
    }

    /// Records and submits one frame. Returns [`FrameOutcome::Skipped`] when the swapchain
    /// could not produce an image even after rebuilding.
    pub fn render_frame(&mut self, request: &FrameRequest<'_>) -> Result<FrameOutcome> {
        let started = Instant::now();
        let frame = self.frame_counter.index();

        self.command_buffer.begin_recording(frame)?;
        self.context.deletions.flush(frame);
        self.shader_buffers.reset_frame(frame);

        // The swap image comes first: nothing is recorded for a frame that gets skipped.
        let acquired = match self.begin_frame(frame) {
            Ok(acquired) => acquired,
            Err(e) => {
                let _ = self.command_buffer.cancel_recording();
                return Err(e);
            }
        };
        if !acquired {
            self.command_buffer.cancel_recording()?;
            log::debug!("Frame {} skipped: no swap image", self.frame_counter.frame_number());
            return Ok(FrameOutcome::Skipped);
        }

        let stats = match self.record_frame(frame, request) {
            Ok(stats) => stats,
            Err(e) => {
                log::error!("Frame {} abandoned: {e}", self.frame_counter.frame_number());
                self.abandon_frame();
                return Err(e);
            }
        };

        let compute_wait = request.compute_wait.map(|semaphore| {
            vk::SemaphoreSubmitInfo::default()
                .semaphore(semaphore)
                .stage_mask(vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT)
        });
        self.command_buffer.submit(compute_wait)?;
        self.backbuffer.present_frame(frame)?;
        self.frame_counter.advance();

        let frame_time = started.elapsed();
        warn_if_frame_budget_exceeded(frame_time, self.config.frame_budget_ms);
        Ok(FrameOutcome::Presented { stats, frame_time })
    }

    /// Recycles this slot's descriptor pools and acquires a swap image. `false` means no image
    /// was available.
    fn begin_frame(&mut self, frame: usize) -> Result<bool> {
        self.descriptors.begin_frame(frame)?;
        Ok(self.backbuffer.acquire_frame(frame)?.is_some())
    }

    /// Compute dispatches, then offscreen passes in order, then the backbuffer pass.
    fn record_frame(&mut self, frame: usize, request: &FrameRequest<'_>) -> Result<PassStats> {
        let mut res = PassResources {
            pipelines: &mut self.pipelines,
            descriptors: &mut self.descriptors,
            shader_buffers: &mut self.shader_buffers,
            textures: &mut self.textures,
            render_targets: &mut self.render_targets,
            meshes: &self.meshes,
            materials: &self.materials,
        };
        let mut total = PassStats::default();

        if !request.compute.is_empty() {
            let stats = self
                .compute
                .record(frame, &self.command_buffer, request.compute, &mut res)?;
            accumulate(&mut total, stats);
        }

        for pass in request.offscreen {
            let missing = || AshError::ResourceNotFound(format!("render target {:?}", pass.target));

            let target = res.render_targets.get_mut(pass.target).ok_or_else(missing)?;
            self.command_buffer.begin_rendering(&mut *target)?;
            let render_info = target.render_info().clone();

            let stats = self.forward.record(
                frame,
                &self.command_buffer,
                &render_info,
                &pass.camera,
                pass.draws,
                &mut res,
            )?;

            let target = res.render_targets.get_mut(pass.target).ok_or_else(missing)?;
            self.command_buffer.end_rendering(&mut *target)?;
            accumulate(&mut total, stats);
        }

        self.command_buffer.begin_rendering(&mut self.backbuffer)?;
        let stats = self.forward.record(
            frame,
            &self.command_buffer,
            self.backbuffer.render_info(),
            &request.camera,
            request.draws,
            &mut res,
        )?;
        self.command_buffer.end_rendering(&mut self.backbuffer)?;
        accumulate(&mut total, stats);

        Ok(total)
    }

    /// Drops a frame that failed mid-recording. Its barriers never run, so every layout they
    /// advanced is forgotten, and the swapchain is rebuilt to release the acquired image.
    fn abandon_frame(&mut self) {
        if let Err(e) = self.command_buffer.cancel_recording() {
            log::error!("Failed to end abandoned command buffer: {e}");
        }
        if let Err(e) = self.context.wait_idle() {
            log::error!("Device wait idle failed while abandoning a frame: {e}");
        }
        self.render_targets.discard_contents();
        if let Err(e) = self.backbuffer.rebuild() {
            log::error!("Swapchain rebuild after abandoned frame failed: {e}");
        }
    }

    /// Rebuilds the swapchain for a new drawable size. Zero or unchanged sizes are ignored.
    pub fn on_window_resize(&mut self, width: u32, height: u32) -> Result<()> {
        if self.backbuffer.on_resize(width, height)? {
            log::info!("Swapchain resized to {width}x{height}");
        }
        Ok(())
    }

    pub fn load_shader(&mut self, stage: vk::ShaderStageFlags, spirv: &[u8]) -> Result<ResourceId> {
        let program = ShaderProgram::from_spirv(Arc::clone(self.context.raw_device()), stage, spirv)?;
        Ok(self.shaders.insert(program))
    }

    pub fn shader_stage(&self, id: ResourceId) -> Option<ShaderStage> {
        self.shaders.get(id).map(ShaderProgram::shader_stage)
    }

    /// Set layout for forward materials sampling textures at `texture_bindings`.
    pub fn forward_set_layout(&mut self, texture_bindings: &[u32]) -> Result<vk::DescriptorSetLayout> {
        let key = self.forward.layout_key(texture_bindings);
        self.descriptors.layouts().create_layout(&key)
    }

    /// Set layout for a compute effect binding `buffers` and sampling at `texture_bindings`.
    pub fn compute_set_layout(
        &mut self,
        buffers: &[ComputeBuffer<'_>],
        texture_bindings: &[u32],
    ) -> Result<vk::DescriptorSetLayout> {
        let typed = buffers
            .iter()
            .map(|buffer| {
                self.shader_buffers
                    .get(buffer.buffer)
                    .map(|found| (buffer.binding, found.descriptor_type()))
                    .ok_or_else(|| {
                        AshError::ResourceNotFound(format!("shader buffer {:?}", buffer.buffer))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        let key = compute_layout_key(&typed, texture_bindings);
        self.descriptors.layouts().create_layout(&key)
    }

    pub fn upload_mesh<V: Pod>(&mut self, name: &str, vertices: &[V], indices: &[u32]) -> Result<ResourceId> {
        let mesh = Mesh::upload(&self.context, name, vertices, indices)?;
        Ok(self.meshes.insert(mesh))
    }

    pub fn add_material(&mut self, material: Material) -> ResourceId {
        self.materials.insert(material)
    }

    pub fn material_mut(&mut self, id: ResourceId) -> Option<&mut Material> {
        self.materials.get_mut(id)
    }

    pub fn textures(&mut self) -> &mut TextureManager {
        &mut self.textures
    }

    pub fn render_targets(&mut self) -> &mut RenderTargetManager {
        &mut self.render_targets
    }

    pub fn shader_buffers(&mut self) -> &mut ShaderBufferManager {
        &mut self.shader_buffers
    }

    pub fn pipelines(&self) -> &PipelineCache {
        &self.pipelines
    }

    pub fn descriptors(&self) -> &DescriptorCache {
        &self.descriptors
    }

    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    pub fn backbuffer(&self) -> &Backbuffer {
        &self.backbuffer
    }

    pub fn set_clear_colour(&mut self, colour: [f32; 4]) {
        self.backbuffer.set_clear_colour(0, colour);
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_counter.frame_number()
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.context.wait_idle()
    }
}

fn accumulate(total: &mut PassStats, stats: PassStats) {
    total.draws += stats.draws;
    total.dispatches += stats.dispatches;
    total.pipeline_binds += stats.pipeline_binds;
    total.descriptor_sets_written += stats.descriptor_sets_written;
    total.skipped += stats.skipped;
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Shutting down renderer after {} frames", self.frame_counter.frame_number());
        if let Err(e) = self.context.wait_idle() {
            log::error!("Device wait idle failed during shutdown: {e}");
        }
        self.context.deletions.flush_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_accumulate_across_passes() {
        let mut total = PassStats::default();
        accumulate(
            &mut total,
            PassStats {
                draws: 3,
                dispatches: 0,
                pipeline_binds: 1,
                descriptor_sets_written: 2,
                skipped: 0,
            },
        );
        accumulate(
            &mut total,
            PassStats {
                draws: 2,
                dispatches: 2,
                pipeline_binds: 2,
                descriptor_sets_written: 0,
                skipped: 1,
            },
        );
        assert_eq!(total.draws, 5);
        assert_eq!(total.dispatches, 2);
        assert_eq!(total.pipeline_binds, 3);
        assert_eq!(total.descriptor_sets_written, 2);
        assert_eq!(total.skipped, 1);
    }

    #[test]
    fn test_frame_request_defaults() {
        let camera = CameraData::new(glam::Mat4::IDENTITY, glam::Mat4::IDENTITY, glam::Vec3::ZERO);
        let request = FrameRequest::new(camera, &[]);
        assert!(request.offscreen.is_empty());
        assert!(request.compute.is_empty());
        assert!(request.compute_wait.is_none());
    }
}
