//! Uniform buffer layouts
//!
//! Plain `repr(C)` structs matching the std140 layout of the shader uniform
//! blocks. Matrices and vectors are stored as raw float arrays so the structs
//! are `Pod` and can be copied byte-for-byte into mapped arena memory.

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{Mat4, Vec3};

/// Maximum number of lights the shader uniform block holds.
pub const MAX_LIGHTS: usize = 8;

/// Per-eye camera uniform block (binding 0).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraUbo {
    /// Projection matrix, column-major.
    pub projection: [[f32; 4]; 4],
    /// View matrix, column-major.
    pub view: [[f32; 4]; 4],
    /// Eye position in world space, w unused.
    pub eye: [f32; 4],
}

impl CameraUbo {
    /// Build the block from engine math types.
    pub fn new(projection: Mat4, view: Mat4, eye: Vec3) -> Self {
        Self {
            projection: mat4_to_columns(projection),
            view: mat4_to_columns(view),
            eye: [eye.x, eye.y, eye.z, 0.0],
        }
    }
}

/// One light entry inside [`LightUbo`], std140-padded.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct LightData {
    /// Position for point lights, direction for directional lights.
    /// w = 1 marks the entry as a point light, w = 0 as directional.
    pub position: [f32; 4],
    /// Ambient contribution, w unused.
    pub ambient: [f32; 4],
    /// Diffuse contribution, w unused.
    pub diffuse: [f32; 4],
    /// Specular contribution, w unused.
    pub specular: [f32; 4],
}

/// Light list uniform block (binding 1). Unused entries stay zeroed; the
/// shader skips any entry whose position vector is all zeros.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct LightUbo {
    /// Fixed-capacity light array.
    pub lights: [LightData; MAX_LIGHTS],
}

impl Default for LightUbo {
    fn default() -> Self {
        Self {
            lights: [LightData::default(); MAX_LIGHTS],
        }
    }
}

fn mat4_to_columns(m: Mat4) -> [[f32; 4]; 4] {
    let mut columns = [[0.0f32; 4]; 4];
    for (c, column) in columns.iter_mut().enumerate() {
        for (r, value) in column.iter_mut().enumerate() {
            *value = m[(r, c)];
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4;

    #[test]
    fn camera_ubo_is_std140_sized() {
        assert_eq!(std::mem::size_of::<CameraUbo>(), 144);
        assert_eq!(std::mem::size_of::<LightData>(), 64);
        assert_eq!(std::mem::size_of::<LightUbo>(), 64 * MAX_LIGHTS);
    }

    #[test]
    fn matrices_are_stored_column_major() {
        let m = Mat4::new(
            1.0, 2.0, 3.0, 4.0, //
            5.0, 6.0, 7.0, 8.0, //
            9.0, 10.0, 11.0, 12.0, //
            13.0, 14.0, 15.0, 16.0,
        );
        let columns = mat4_to_columns(m);
        // First column of the matrix is the first row-major stride of each row.
        assert_eq!(columns[0], [1.0, 5.0, 9.0, 13.0]);
        assert_eq!(columns[3], [4.0, 8.0, 12.0, 16.0]);
    }
}
