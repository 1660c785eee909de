//! HMD driver interface
//!
//! The engine consumes head-mounted displays through these traits; concrete
//! drivers wrap a vendor runtime and hand the engine swapchain images,
//! tracked poses and per-eye projection parameters. [`crate::vr::StubDriver`]
//! is the always-disconnected fallback used when no runtime is installed.

use ash::vk;
use thiserror::Error;

use crate::backend::vulkan::VulkanError;
use crate::foundation::math::{Quat, Vec3};

/// Left or right eye.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    /// Left eye, index 0.
    Left,
    /// Right eye, index 1.
    Right,
}

impl Eye {
    /// Both eyes in render order.
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    /// Array index of this eye.
    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }
}

/// Asymmetric per-eye field of view, as half-angle tangents.
#[derive(Debug, Clone, Copy)]
pub struct EyeFov {
    /// Tangent of the angle above the center line.
    pub up_tan: f32,
    /// Tangent of the angle below the center line.
    pub down_tan: f32,
    /// Tangent of the angle to the left of the center line.
    pub left_tan: f32,
    /// Tangent of the angle to the right of the center line.
    pub right_tan: f32,
}

/// A tracked eye pose in the driver's Y-up tracking space.
#[derive(Debug, Clone, Copy)]
pub struct EyePose {
    /// Eye position.
    pub position: Vec3,
    /// Eye orientation.
    pub orientation: Quat,
}

impl Default for EyePose {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            orientation: Quat::identity(),
        }
    }
}

/// Runtime status reported by the driver each frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmdStatus {
    /// Headset is connected and usable.
    pub hmd_present: bool,
    /// The runtime asked the application to release the session.
    pub should_quit: bool,
    /// Rendered frames are currently shown on the headset.
    pub visible: bool,
    /// This application receives headset input.
    pub input_focus: bool,
    /// The user asked for the tracking origin to be recentered.
    pub should_recenter: bool,
}

/// Compositor swapchain images for one eye.
pub struct EyeImages {
    /// Images owned by the driver's compositor.
    pub images: Vec<vk::Image>,
    /// Image format.
    pub format: vk::Format,
    /// Image extent.
    pub extent: vk::Extent2D,
}

/// Why a connection attempt did not produce a session.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// No headset is attached; retry later.
    #[error("no HMD present")]
    NotPresent,

    /// The vendor runtime is missing or refused the session.
    #[error("HMD runtime unavailable: {0}")]
    RuntimeUnavailable(String),
}

/// Errors inside an open session. These terminate the HMD render loop.
#[derive(Error, Debug)]
pub enum VrError {
    /// The driver runtime reported a session failure.
    #[error("HMD session error: {0}")]
    Session(String),

    /// Head tracking was lost and did not recover.
    #[error("head tracking lost")]
    TrackingLost,

    /// A Vulkan operation inside the HMD render loop failed.
    #[error(transparent)]
    Vulkan(#[from] VulkanError),
}

/// Entry point of an HMD driver: detection and session creation.
pub trait HmdDriver: Send {
    /// Session type produced by this driver.
    type Session: HmdSession;

    /// Try to open a session on the attached headset.
    fn connect(&mut self) -> Result<Self::Session, ConnectError>;
}

/// An open connection to a headset.
pub trait HmdSession: Send {
    /// Current runtime status.
    fn status(&mut self) -> HmdStatus;

    /// The physical device driving the headset.
    ///
    /// The engine refuses sessions on a different GPU than the one it
    /// renders with; cross-device composition is not supported.
    fn physical_device(&self, instance: &ash::Instance) -> Result<vk::PhysicalDevice, VrError>;

    /// Register the queue the session's frames are submitted on. Called
    /// once after the session opens, before the first frame.
    fn synchronize_queue(&mut self, queue: vk::Queue) -> Result<(), VrError>;

    /// Field of view for `eye`.
    fn eye_fov(&self, eye: Eye) -> EyeFov;

    /// Compositor swapchain images for `eye`, created against `device`.
    /// [`EyeImages::extent`] is the render target size for that eye.
    fn eye_images(&mut self, eye: Eye, device: &ash::Device) -> Result<EyeImages, VrError>;

    /// Index of the compositor image to render into next for `eye`.
    fn acquire_image(&mut self, eye: Eye) -> Result<u32, VrError>;

    /// Predicted eye poses for the frame about to be rendered.
    fn wait_poses(&mut self) -> Result<[EyePose; 2], VrError>;

    /// Hand the rendered frame and the poses it was rendered with to the
    /// compositor.
    fn end_frame(&mut self, poses: &[EyePose; 2]) -> Result<(), VrError>;

    /// Recenter the tracking origin on the current head pose.
    fn recenter(&mut self) -> Result<(), VrError>;
}
