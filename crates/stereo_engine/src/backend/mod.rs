//! # Backend Module
//!
//! Concrete GPU backend implementations. Everything that talks to the Vulkan
//! API directly lives under this module; the rest of the engine consumes the
//! wrapper types exported here and never issues raw API calls itself.

pub mod vulkan;

pub use vulkan::{VulkanError, VulkanResult};
