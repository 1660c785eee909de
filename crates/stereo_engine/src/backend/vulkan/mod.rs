//! Vulkan backend implementation
//!
//! Wrapper types over the raw `ash` API: device context, the shared memory
//! arena, swapchain, render pass, framebuffers, pipeline/renderer, texture,
//! sampler, and frame synchronization. Each wrapper owns its handles and
//! releases them on drop; the engine is responsible for dropping wrappers in
//! reverse creation order.

use ash::vk;
use thiserror::Error;

pub mod arena;
pub mod commands;
pub mod context;
pub mod frame_sync;
pub mod framebuffer;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod swapchain;
pub mod texture;
pub mod ubo;

pub use arena::{ArenaBlock, ArenaRegion, MappedBlock, MemoryArena};
pub use commands::CommandResources;
pub use context::VulkanContext;
pub use frame_sync::{DeviceFence, FrameSlots, FrameSync, SlotFence, MAX_FRAMES_IN_FLIGHT};
pub use framebuffer::Framebuffer;
pub use pipeline::{MeshRenderer, PushConstants};
pub use render_pass::{PresentTarget, RenderPass};
pub use sampler::Sampler;
pub use swapchain::{Swapchain, SWAPCHAIN_IMAGE_COUNT};
pub use texture::Texture;
pub use ubo::{CameraUbo, LightData, LightUbo, MAX_LIGHTS};

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// A startup-time configuration invariant does not hold on this device
    #[error("Configuration error: {0}")]
    Config(String),

    /// An arena region ran out of capacity
    #[error("Arena region {region:?} exhausted: {requested} bytes requested, {remaining} remaining")]
    ArenaExhausted {
        /// The region that could not satisfy the request
        region: ArenaRegion,
        /// Number of bytes that were requested (after alignment)
        requested: u64,
        /// Number of bytes left in the region
        remaining: u64,
    },

    /// Shader bytecode could not be loaded from disk
    #[error("Failed to load shader {path}: {source}")]
    ShaderLoad {
        /// Path of the SPIR-V file
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

impl From<vk::Result> for VulkanError {
    fn from(result: vk::Result) -> Self {
        VulkanError::Api(result)
    }
}
