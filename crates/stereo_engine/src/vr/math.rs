//! VR view and projection math
//!
//! HMD runtimes track in a Y-up, right-handed space while the engine's
//! world is Z-up. The conversion matrix here maps tracking space into world
//! space without changing handedness, and the projection builds the
//! off-center frustum each eye needs from its half-angle tangents.

use crate::foundation::math::{Mat4, Vec3};
use crate::vr::driver::{EyeFov, EyePose};

/// Rotation taking the driver's Y-up axes to the engine's Z-up axes.
///
/// Columns: X stays X, tracking -Z becomes world Y, tracking Y becomes
/// world Z. Determinant is +1, so chirality is preserved.
pub fn y_up_to_z_up() -> Mat4 {
    Mat4::from_columns(&[
        Vec3::new(1.0, 0.0, 0.0).push(0.0),
        Vec3::new(0.0, 0.0, 1.0).push(0.0),
        Vec3::new(0.0, -1.0, 0.0).push(0.0),
        Vec3::new(0.0, 0.0, 0.0).push(1.0),
    ])
}

/// World-to-eye view matrix for a tracked pose.
///
/// The pose is eye-to-tracking; the result is its inverse composed with
/// the tracking-to-world conversion. The eye looks along its local -Z.
pub fn eye_view(pose: &EyePose) -> Mat4 {
    let eye_to_tracking = pose
        .orientation
        .to_homogeneous()
        .append_translation(&pose.position);
    let tracking_to_world = y_up_to_z_up();
    let eye_to_world = tracking_to_world * eye_to_tracking;
    eye_to_world
        .try_inverse()
        .unwrap_or_else(Mat4::identity)
}

/// Eye-to-world transform for a tracked pose, published as the shared
/// eye pose matrix.
pub fn eye_to_world(pose: &EyePose) -> Mat4 {
    y_up_to_z_up()
        * pose
            .orientation
            .to_homogeneous()
            .append_translation(&pose.position)
}

/// Off-center perspective projection from half-angle tangents, mapping to
/// Vulkan clip space (Y down, depth 0..1).
pub fn eye_projection(fov: EyeFov, near: f32, far: f32) -> Mat4 {
    let width = fov.right_tan + fov.left_tan;
    let height = fov.up_tan + fov.down_tan;

    let mut m = Mat4::zeros();
    m[(0, 0)] = 2.0 / width;
    m[(0, 2)] = (fov.right_tan - fov.left_tan) / width;
    // Y negated for Vulkan clip space.
    m[(1, 1)] = -2.0 / height;
    m[(1, 2)] = -(fov.up_tan - fov.down_tan) / height;
    m[(2, 2)] = far / (near - far);
    m[(2, 3)] = near * far / (near - far);
    m[(3, 2)] = -1.0;
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Quat, Vec4};
    use approx::assert_relative_eq;

    #[test]
    fn conversion_preserves_handedness() {
        let m = y_up_to_z_up();
        let rotation = m.fixed_view::<3, 3>(0, 0).into_owned();
        assert_relative_eq!(rotation.determinant(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn conversion_maps_tracking_axes_to_world_axes() {
        let m = y_up_to_z_up();
        // Tracking "up" (Y) becomes world up (Z).
        let up = m * Vec4::new(0.0, 1.0, 0.0, 0.0);
        assert_relative_eq!(up, Vec4::new(0.0, 0.0, 1.0, 0.0), epsilon = 1e-6);
        // Tracking "forward" (-Z) becomes world forward (Y).
        let forward = m * Vec4::new(0.0, 0.0, -1.0, 0.0);
        assert_relative_eq!(forward, Vec4::new(0.0, 1.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn identity_pose_view_is_the_conversion_inverse() {
        let view = eye_view(&EyePose::default());
        let should_be_identity = view * y_up_to_z_up();
        assert_relative_eq!(should_be_identity, Mat4::identity(), epsilon = 1e-5);
    }

    #[test]
    fn eye_to_world_round_trips_with_view() {
        let pose = EyePose {
            position: crate::foundation::math::Vec3::new(0.1, 1.7, -0.3),
            orientation: Quat::from_euler_angles(0.2, 0.4, -0.1),
        };
        let product = eye_view(&pose) * eye_to_world(&pose);
        assert_relative_eq!(product, Mat4::identity(), epsilon = 1e-4);
    }

    #[test]
    fn projection_maps_frustum_corners_to_clip_edges() {
        let fov = EyeFov {
            up_tan: 1.1,
            down_tan: 1.3,
            left_tan: 1.2,
            right_tan: 1.0,
        };
        let near = 0.1;
        let far = 100.0;
        let m = eye_projection(fov, near, far);

        // A point on the near plane's right frustum edge lands at x = +1.
        let right_edge = m * Vec4::new(fov.right_tan * near, 0.0, -near, 1.0);
        assert_relative_eq!(right_edge.x / right_edge.w, 1.0, epsilon = 1e-5);

        // A point on the top edge lands at y = -1 (Vulkan Y points down).
        let top_edge = m * Vec4::new(0.0, fov.up_tan * near, -near, 1.0);
        assert_relative_eq!(top_edge.y / top_edge.w, -1.0, epsilon = 1e-5);

        // Near plane maps to depth 0, far plane to depth 1.
        let at_near = m * Vec4::new(0.0, 0.0, -near, 1.0);
        assert_relative_eq!(at_near.z / at_near.w, 0.0, epsilon = 1e-5);
        let at_far = m * Vec4::new(0.0, 0.0, -far, 1.0);
        assert_relative_eq!(at_far.z / at_far.w, 1.0, epsilon = 1e-4);
    }
}
