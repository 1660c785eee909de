//! Desktop orbit camera
//!
//! Spherical-coordinate camera used by the window view. The HMD view gets
//! its matrices from tracked eye poses instead and never goes through this
//! type.

use crate::foundation::math::{Mat4, Point3, Vec3};

/// Camera orbiting a target point at a fixed-up world.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    /// Point the camera looks at.
    pub target: Point3,
    /// Horizontal angle in radians.
    pub yaw: f32,
    /// Vertical angle in radians, clamped away from the poles.
    pub pitch: f32,
    /// Distance from the target.
    pub distance: f32,
    /// Vertical field of view in radians.
    pub fov_y: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: Point3::origin(),
            yaw: 0.0,
            pitch: 0.4,
            distance: 4.0,
            fov_y: 60f32.to_radians(),
        }
    }
}

impl OrbitCamera {
    const MAX_PITCH: f32 = std::f32::consts::FRAC_PI_2 - 0.01;
    const MIN_DISTANCE: f32 = 0.5;

    /// Rotate by the given angle deltas.
    pub fn orbit(&mut self, delta_yaw: f32, delta_pitch: f32) {
        self.yaw += delta_yaw;
        self.pitch = (self.pitch + delta_pitch).clamp(-Self::MAX_PITCH, Self::MAX_PITCH);
    }

    /// Move toward or away from the target.
    pub fn zoom(&mut self, delta: f32) {
        self.distance = (self.distance + delta).max(Self::MIN_DISTANCE);
    }

    /// Camera position in world space (Z up).
    pub fn position(&self) -> Point3 {
        let offset = Vec3::new(
            self.distance * self.pitch.cos() * self.yaw.cos(),
            self.distance * self.pitch.cos() * self.yaw.sin(),
            self.distance * self.pitch.sin(),
        );
        self.target + offset
    }

    /// World-to-camera view matrix.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(&self.position(), &self.target, &Vec3::z())
    }

    /// Perspective projection for the given aspect ratio, with the Y axis
    /// flipped for Vulkan clip space.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        let mut projection = Mat4::new_perspective(aspect, self.fov_y, 0.1, 100.0);
        projection[(1, 1)] *= -1.0;
        projection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn position_respects_distance() {
        let camera = OrbitCamera {
            distance: 5.0,
            ..OrbitCamera::default()
        };
        let offset = camera.position() - camera.target;
        assert_relative_eq!(offset.norm(), 5.0, epsilon = 1e-5);
    }

    #[test]
    fn pitch_stays_off_the_poles() {
        let mut camera = OrbitCamera::default();
        camera.orbit(0.0, 10.0);
        assert!(camera.pitch < std::f32::consts::FRAC_PI_2);
        camera.orbit(0.0, -20.0);
        assert!(camera.pitch > -std::f32::consts::FRAC_PI_2);
    }

    #[test]
    fn projection_flips_y_for_vulkan() {
        let camera = OrbitCamera::default();
        let projection = camera.projection_matrix(16.0 / 9.0);
        assert!(projection[(1, 1)] < 0.0);
    }
}
