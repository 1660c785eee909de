//! Scene lighting

use crate::backend::vulkan::ubo::{LightData, LightUbo, MAX_LIGHTS};
use crate::foundation::math::Vec3;

/// A single light source.
#[derive(Debug, Clone, Copy)]
pub struct Light {
    /// Position (point) or direction (directional).
    pub position: Vec3,
    /// Whether `position` is a world-space point or a direction.
    pub point: bool,
    /// Ambient color contribution.
    pub ambient: Vec3,
    /// Diffuse color contribution.
    pub diffuse: Vec3,
    /// Specular color contribution.
    pub specular: Vec3,
}

impl Light {
    /// Directional light shining along `direction`.
    pub fn directional(direction: Vec3, color: Vec3) -> Self {
        Self {
            position: direction,
            point: false,
            ambient: color * 0.1,
            diffuse: color,
            specular: color,
        }
    }

    /// Point light at `position`.
    pub fn point(position: Vec3, color: Vec3) -> Self {
        Self {
            position,
            point: true,
            ambient: color * 0.1,
            diffuse: color,
            specular: color,
        }
    }
}

/// Pack up to [`MAX_LIGHTS`] lights into the shader uniform block.
/// Extra lights are dropped; unused entries stay zeroed.
pub fn pack_lights(lights: &[Light]) -> LightUbo {
    let mut ubo = LightUbo::default();
    for (entry, light) in ubo.lights.iter_mut().zip(lights.iter().take(MAX_LIGHTS)) {
        let w = if light.point { 1.0 } else { 0.0 };
        *entry = LightData {
            position: [light.position.x, light.position.y, light.position.z, w],
            ambient: [light.ambient.x, light.ambient.y, light.ambient.z, 0.0],
            diffuse: [light.diffuse.x, light.diffuse.y, light.diffuse.z, 0.0],
            specular: [light.specular.x, light.specular.y, light.specular.z, 0.0],
        };
    }
    ubo
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_marks_point_and_directional_lights() {
        let lights = [
            Light::point(Vec3::new(1.0, 2.0, 3.0), Vec3::new(1.0, 1.0, 1.0)),
            Light::directional(Vec3::new(0.0, 0.0, -1.0), Vec3::new(0.5, 0.5, 0.5)),
        ];
        let ubo = pack_lights(&lights);
        assert_eq!(ubo.lights[0].position, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(ubo.lights[1].position[3], 0.0);
        // Unused entries contribute nothing.
        assert_eq!(ubo.lights[2].diffuse, [0.0; 4]);
    }

    #[test]
    fn pack_drops_lights_beyond_capacity() {
        let lights = vec![Light::point(Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0)); MAX_LIGHTS + 3];
        let ubo = pack_lights(&lights);
        assert_eq!(ubo.lights.len(), MAX_LIGHTS);
    }

    #[test]
    fn unused_entries_are_skippable_by_the_shader() {
        // The fragment shader skips entries whose position vector is all
        // zeros; a zeroed direction would otherwise normalize to NaN and
        // poison the lighting sum. Active entries must not trip the guard.
        let lights = [
            Light::directional(Vec3::new(0.0, 0.0, -1.0), Vec3::new(1.0, 1.0, 1.0)),
            Light::point(Vec3::new(2.0, 0.0, 1.0), Vec3::new(0.4, 0.4, 0.4)),
        ];
        let ubo = pack_lights(&lights);

        assert_ne!(ubo.lights[0].position, [0.0; 4]);
        assert_ne!(ubo.lights[1].position, [0.0; 4]);
        for entry in &ubo.lights[lights.len()..] {
            assert_eq!(entry.position, [0.0; 4]);
            assert_eq!(entry.ambient, [0.0; 4]);
            assert_eq!(entry.diffuse, [0.0; 4]);
            assert_eq!(entry.specular, [0.0; 4]);
        }
    }
}
