//! HMD support
//!
//! Driver abstraction, VR view math, the session state machine and its
//! worker thread, and the Vulkan session resource bundle.

pub mod driver;
pub mod math;
pub mod session;
pub mod stub;
pub mod worker;

pub use driver::{
    ConnectError, Eye, EyeFov, EyeImages, EyePose, HmdDriver, HmdSession, HmdStatus, VrError,
};
pub use session::{SharedRenderResources, VkSessionFactory, VkVrSession};
pub use stub::StubDriver;
pub use worker::{Pacing, Phase, SessionEvent, SessionFactory, VrLoop, VrSession, VrWorker};
