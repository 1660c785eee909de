//! Stub HMD driver
//!
//! Used when no vendor runtime is linked in. `connect` always reports that
//! no headset is present, so the HMD render loop idles in its retry cycle
//! and the application behaves as a plain windowed renderer.

use ash::vk;

use crate::vr::driver::{
    ConnectError, Eye, EyeFov, EyeImages, EyePose, HmdDriver, HmdSession, HmdStatus, VrError,
};

/// Driver that never finds a headset.
#[derive(Debug, Default)]
pub struct StubDriver;

impl StubDriver {
    /// Create the stub driver.
    pub fn new() -> Self {
        Self
    }
}

impl HmdDriver for StubDriver {
    type Session = StubSession;

    fn connect(&mut self) -> Result<Self::Session, ConnectError> {
        Err(ConnectError::NotPresent)
    }
}

/// Session type for [`StubDriver`]; never instantiated.
pub struct StubSession;

impl HmdSession for StubSession {
    fn status(&mut self) -> HmdStatus {
        HmdStatus::default()
    }

    fn physical_device(&self, _instance: &ash::Instance) -> Result<vk::PhysicalDevice, VrError> {
        Err(VrError::Session("stub session has no device".to_string()))
    }

    fn synchronize_queue(&mut self, _queue: vk::Queue) -> Result<(), VrError> {
        Ok(())
    }

    fn eye_fov(&self, _eye: Eye) -> EyeFov {
        EyeFov {
            up_tan: 1.0,
            down_tan: 1.0,
            left_tan: 1.0,
            right_tan: 1.0,
        }
    }

    fn eye_images(&mut self, _eye: Eye, _device: &ash::Device) -> Result<EyeImages, VrError> {
        Err(VrError::Session("stub session has no images".to_string()))
    }

    fn acquire_image(&mut self, _eye: Eye) -> Result<u32, VrError> {
        Err(VrError::Session("stub session has no images".to_string()))
    }

    fn wait_poses(&mut self) -> Result<[EyePose; 2], VrError> {
        Ok([EyePose::default(), EyePose::default()])
    }

    fn end_frame(&mut self, _poses: &[EyePose; 2]) -> Result<(), VrError> {
        Ok(())
    }

    fn recenter(&mut self) -> Result<(), VrError> {
        Ok(())
    }
}
