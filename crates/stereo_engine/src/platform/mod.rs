//! Platform layer
//!
//! GLFW windowing and Vulkan surface creation. Everything GLFW-specific
//! stays in this module; the rest of the engine only sees [`Window`].

pub mod window;

pub use window::{Window, WindowError, WindowResult};
