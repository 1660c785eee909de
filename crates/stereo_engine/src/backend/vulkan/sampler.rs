//! Texture sampler

use ash::{vk, Device};

use crate::backend::vulkan::{VulkanError, VulkanResult};

/// Trilinear sampler with anisotropic filtering over a full mip chain.
pub struct Sampler {
    device: Device,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Create a sampler covering `mip_levels` of detail.
    pub fn new(device: Device, mip_levels: u32) -> VulkanResult<Self> {
        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(true)
            .max_anisotropy(16.0)
            .min_lod(0.0)
            .max_lod(mip_levels as f32)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK);

        let sampler = unsafe {
            device
                .create_sampler(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, sampler })
    }

    /// Raw sampler handle.
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}
