//! # ash_forward
//!
//! Descriptor, pipeline and resource lifecycle core for a forward Vulkan renderer, built on
//! ASH (Vulkan bindings) and VMA (GPU memory allocator).
//!
//! ## Features
//!
//! - **Dynamic shader buffers**: per-draw uniform/storage data in auto-growing rings addressed by
//!   dynamic offsets
//! - **Descriptor caching**: layouts keyed by structure, sets keyed by content, pools that rotate
//!   and grow on exhaustion
//! - **Pipeline caching**: graphics and compute pipelines keyed by full state and target shape
//! - **Layout tracking**: every image transition checked against an explicit table before it is
//!   recorded
//! - **Dynamic rendering**: offscreen and swapchain targets behind one [`vulkan::RenderTarget`]
//!   trait, with out-of-date swapchains rebuilt in place
//!
//! ## Quick Start
//!
//! ```ignore
//! use ash_forward::{FrameRequest, Renderer, RendererConfig, Result};
//! use ash_forward::vulkan::WindowSurfaceProvider;
//!
//! fn run(window: &winit::window::Window) -> Result<()> {
//!     let mut renderer = Renderer::new(&WindowSurfaceProvider::new(window), RendererConfig::default())?;
//!
//!     // Main loop
//!     renderer.render_frame(&FrameRequest::new(camera, &draws))?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **`vulkan`**: device objects, caches, textures, targets and command recording
//! - **`renderer`**: the shared context, resource managers, the compute and forward passes and
//!   the frame loop

#![allow(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod config;
mod error;
pub mod renderer;
pub mod utils;
pub mod vulkan;

pub use config::{MsaaPreset, RendererConfig};
pub use error::{AshError, Result};
pub use renderer::{
    CameraData, DrawCommand, FrameOutcome, FrameRequest, Material, Mesh, RenderContext, Renderer,
};
pub use utils::ResourceId;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::renderer::{
        ComputeBuffer, ComputeDispatch, ForwardBindings, OffscreenPass, PassStats, TextureSource,
    };
    pub use crate::vulkan::{
        ComputePipelineDefinition, GraphicsPipelineDefinition, RenderTargetDesc, SamplerStyle, ShaderEffect, TextureDesc,
        VertexFormat,
    };
    pub use crate::{
        AshError, CameraData, DrawCommand, FrameRequest, Material, Renderer, RendererConfig,
        ResourceId, Result,
    };
}
