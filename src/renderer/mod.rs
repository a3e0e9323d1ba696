//! Renderer-facing layer: the shared context, resource managers, the compute and forward
//! passes and the frame loop.

pub mod compute_pass;
pub mod context;
pub mod forward_pass;
pub mod mesh;
pub mod render_targets;
#[allow(clippy::module_inception)]
pub mod renderer;
pub mod shader_buffers;
pub mod textures;

pub use compute_pass::{ComputeBuffer, ComputeDispatch, ComputePass};
pub use context::RenderContext;
pub use forward_pass::{
    CameraData, DrawCommand, ForwardBindings, ForwardPass, InstanceData, Material, PassStats,
    SampledTexture, TextureSource,
};
pub use mesh::Mesh;
pub use render_targets::RenderTargetManager;
pub use renderer::{FrameOutcome, FrameRequest, OffscreenPass, Renderer};
pub use shader_buffers::{BindingSlots, ShaderBufferManager};
pub use textures::TextureManager;
