//! Scene building blocks
//!
//! CPU-side geometry, camera and lighting types plus procedural content
//! used by the demo applications. Everything here is pure data until a
//! mesh or texture is uploaded through the Vulkan backend.

pub mod camera;
pub mod light;
pub mod mesh;

pub use camera::OrbitCamera;
pub use light::Light;
pub use mesh::{Mesh, MeshData, Vertex};

/// Generate a `size` x `size` RGBA8 checkerboard with `tiles` squares per
/// side. Used as the default material texture.
pub fn checkerboard_rgba(size: u32, tiles: u32) -> Vec<u8> {
    let tile = (size / tiles).max(1);
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let on = ((x / tile) + (y / tile)) % 2 == 0;
            let value = if on { 0xff } else { 0x40 };
            pixels.extend_from_slice(&[value, value, value, 0xff]);
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkerboard_alternates_tiles() {
        let size = 8;
        let pixels = checkerboard_rgba(size, 4);
        assert_eq!(pixels.len(), (size * size * 4) as usize);

        let texel = |x: u32, y: u32| pixels[((y * size + x) * 4) as usize];
        assert_eq!(texel(0, 0), 0xff);
        assert_eq!(texel(2, 0), 0x40);
        assert_eq!(texel(0, 2), 0x40);
        assert_eq!(texel(2, 2), 0xff);
    }
}
