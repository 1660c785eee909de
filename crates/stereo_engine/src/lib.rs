//! # Stereo Engine
//!
//! A dual-target Vulkan renderer: a windowed desktop view on the main
//! thread and an independent HMD render loop on a worker thread, sharing
//! one logical device, one bump-allocated memory arena and a small block
//! of mutex-guarded scene state.
//!
//! ## Features
//!
//! - **Shared GPU arena**: two fixed regions sub-allocated by bump pointer,
//!   safe to use from both render loops
//! - **HMD session lifecycle**: connect-retry-teardown state machine on a
//!   dedicated thread, driver-agnostic behind the [`vr::HmdDriver`] trait
//! - **Triple-buffered pacing**: per-loop frame slots capped by fences
//! - **Forward renderer**: MSAA, mipmapped texturing and Blinn-Phong
//!   lighting over `ash`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stereo_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     stereo_engine::foundation::logging::init();
//!     let mut engine = Engine::new(EngineConfig::default())?;
//!     engine.start_vr(StubDriver::new())?;
//!     while !engine.window().should_close() {
//!         engine.window_mut().poll_events();
//!         engine.draw_frame()?;
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions, clippy::too_many_arguments)]

pub mod backend;
pub mod engine;
pub mod foundation;
pub mod platform;
pub mod scene;
pub mod shared_state;
pub mod vr;

pub use backend::{VulkanError, VulkanResult};
pub use engine::{Engine, EngineConfig, EngineError, EngineResult};
pub use shared_state::SharedState;

/// Commonly used types, for glob import by applications.
pub mod prelude {
    pub use crate::engine::{Engine, EngineConfig, EngineError, EngineResult};
    pub use crate::foundation::math::{Mat4, Point3, Quat, Vec2, Vec3, Vec4};
    pub use crate::platform::Window;
    pub use crate::scene::{Light, OrbitCamera};
    pub use crate::shared_state::SharedState;
    pub use crate::vr::{HmdDriver, StubDriver};
}
