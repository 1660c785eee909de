//! State shared between the window and HMD render loops
//!
//! One mutex per field, never held across a frame or while taking another
//! lock. Readers get a snapshot copy; writers replace the whole value, so a
//! reader can never observe a half-updated eye pose pair.
//!
//! Ownership is one-directional per field: the window loop writes lights
//! and the object orientation, the HMD loop writes eye poses; each side
//! only reads the other's fields.

use std::sync::Mutex;

use crate::foundation::math::{Mat4, Quat};
use crate::scene::Light;

/// Shared state block handed to both render loops behind an `Arc`.
pub struct SharedState {
    lights: Mutex<Vec<Light>>,
    eye_poses: Mutex<[Mat4; 2]>,
    orientation: Mutex<Quat>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            lights: Mutex::new(Vec::new()),
            eye_poses: Mutex::new([Mat4::identity(), Mat4::identity()]),
            orientation: Mutex::new(Quat::identity()),
        }
    }
}

impl SharedState {
    /// Create the block with no lights, identity poses and orientation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the light list.
    pub fn set_lights(&self, lights: Vec<Light>) {
        *self.lights.lock().expect("lights mutex poisoned") = lights;
    }

    /// Snapshot of the current lights.
    pub fn lights(&self) -> Vec<Light> {
        self.lights.lock().expect("lights mutex poisoned").clone()
    }

    /// Publish both eye-to-world pose matrices at once.
    pub fn set_eye_poses(&self, poses: [Mat4; 2]) {
        *self.eye_poses.lock().expect("eye pose mutex poisoned") = poses;
    }

    /// Snapshot of the last published eye poses.
    pub fn eye_poses(&self) -> [Mat4; 2] {
        *self.eye_poses.lock().expect("eye pose mutex poisoned")
    }

    /// Replace the shared object orientation.
    pub fn set_orientation(&self, orientation: Quat) {
        *self.orientation.lock().expect("orientation mutex poisoned") = orientation;
    }

    /// Snapshot of the shared object orientation.
    pub fn orientation(&self) -> Quat {
        *self.orientation.lock().expect("orientation mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use std::sync::Arc;

    #[test]
    fn reads_return_last_written_values() {
        let state = SharedState::new();

        let lights = vec![Light::point(Vec3::new(1.0, 2.0, 3.0), Vec3::new(1.0, 1.0, 1.0))];
        state.set_lights(lights.clone());
        assert_eq!(state.lights().len(), 1);
        assert_eq!(state.lights()[0].position, lights[0].position);

        let poses = [Mat4::identity() * 2.0, Mat4::identity() * 3.0];
        state.set_eye_poses(poses);
        assert_eq!(state.eye_poses()[0], poses[0]);
        assert_eq!(state.eye_poses()[1], poses[1]);

        let orientation = Quat::from_euler_angles(0.1, 0.2, 0.3);
        state.set_orientation(orientation);
        assert_eq!(state.orientation(), orientation);
    }

    #[test]
    fn eye_pose_pairs_are_published_atomically() {
        let state = Arc::new(SharedState::new());
        state.set_eye_poses([Mat4::identity() * 0.0, Mat4::identity() * 0.0]);

        let writer_state = Arc::clone(&state);
        let writer = std::thread::spawn(move || {
            for i in 0..10_000u32 {
                let m = Mat4::identity() * i as f32;
                writer_state.set_eye_poses([m, m]);
            }
        });

        // Both matrices of a snapshot must always carry the same value.
        for _ in 0..10_000 {
            let [left, right] = state.eye_poses();
            assert_eq!(left, right, "observed a torn eye pose pair");
        }

        writer.join().unwrap();
    }

    #[test]
    fn fields_are_independent() {
        let state = SharedState::new();

        // Writing one field must not disturb the others.
        let orientation = Quat::from_euler_angles(1.0, 0.0, 0.0);
        state.set_orientation(orientation);
        state.set_lights(vec![]);
        state.set_eye_poses([Mat4::identity(), Mat4::identity()]);
        assert_eq!(state.orientation(), orientation);
    }
}
