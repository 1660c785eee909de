//! Vulkan swapchain management
//!
//! Swapchain creation, recreation on resize/out-of-date, and cleanup. Frame
//! pacing relies on exactly three swapchain images; a surface that cannot
//! deliver three is rejected at startup rather than papered over.

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device};

use crate::backend::vulkan::context::PhysicalDeviceInfo;
use crate::backend::vulkan::{VulkanError, VulkanResult};

/// Number of swapchain images required for triple buffering.
pub const SWAPCHAIN_IMAGE_COUNT: u32 = 3;

/// Vulkan swapchain wrapper with automatic resource management.
pub struct Swapchain {
    device: Device,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a new swapchain for `surface`.
    pub fn new(
        device: Device,
        swapchain_loader: SwapchainLoader,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
        physical_device_info: &PhysicalDeviceInfo,
        window_extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        Self::create(
            device,
            swapchain_loader,
            surface,
            surface_loader,
            physical_device_info,
            window_extent,
            vk::SwapchainKHR::null(),
        )
    }

    /// Recreate the swapchain after a resize or an out-of-date result.
    ///
    /// Passes the previous handle as `old_swapchain` so in-flight
    /// presentation can complete; the old wrapper is destroyed by RAII once
    /// the caller drops it.
    pub fn recreate(
        &self,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
        physical_device_info: &PhysicalDeviceInfo,
        window_extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        Self::create(
            self.device.clone(),
            self.swapchain_loader.clone(),
            surface,
            surface_loader,
            physical_device_info,
            window_extent,
            self.swapchain,
        )
    }

    fn create(
        device: Device,
        swapchain_loader: SwapchainLoader,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
        physical_device_info: &PhysicalDeviceInfo,
        window_extent: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<Self> {
        let surface_caps = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(physical_device_info.device, surface)
                .map_err(VulkanError::Api)?
        };

        let surface_formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(physical_device_info.device, surface)
                .map_err(VulkanError::Api)?
        };

        let format = surface_formats
            .iter()
            .find(|sf| {
                sf.format == vk::Format::B8G8R8A8_SRGB
                    && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .or_else(|| surface_formats.first())
            .copied()
            .ok_or_else(|| {
                VulkanError::Config("surface reports no supported formats".to_string())
            })?;

        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(physical_device_info.device, surface)
                .map_err(VulkanError::Api)?
        };

        let present_mode = present_modes
            .iter()
            .cloned()
            .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
            .unwrap_or(vk::PresentModeKHR::FIFO);

        let extent = if surface_caps.current_extent.width != u32::MAX {
            surface_caps.current_extent
        } else {
            vk::Extent2D {
                width: window_extent.width.clamp(
                    surface_caps.min_image_extent.width,
                    surface_caps.max_image_extent.width,
                ),
                height: window_extent.height.clamp(
                    surface_caps.min_image_extent.height,
                    surface_caps.max_image_extent.height,
                ),
            }
        };

        // Frame pacing assumes triple buffering; refuse surfaces that
        // cannot provide exactly three images.
        if surface_caps.min_image_count > SWAPCHAIN_IMAGE_COUNT
            || (surface_caps.max_image_count > 0
                && surface_caps.max_image_count < SWAPCHAIN_IMAGE_COUNT)
        {
            return Err(VulkanError::Config(format!(
                "surface supports {}..{} images, triple buffering requires {}",
                surface_caps.min_image_count,
                surface_caps.max_image_count,
                SWAPCHAIN_IMAGE_COUNT
            )));
        }

        let swapchain_create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(SWAPCHAIN_IMAGE_COUNT)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&swapchain_create_info, None)
                .map_err(VulkanError::Api)?
        };

        let images = unsafe {
            swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };

        if images.len() as u32 != SWAPCHAIN_IMAGE_COUNT {
            unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
            return Err(VulkanError::Config(format!(
                "driver delivered {} swapchain images, expected {}",
                images.len(),
                SWAPCHAIN_IMAGE_COUNT
            )));
        }

        let image_views: Result<Vec<_>, _> = images
            .iter()
            .map(|&image| {
                let create_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format.format)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });

                unsafe { device.create_image_view(&create_info, None) }
            })
            .collect();

        let image_views = image_views.map_err(VulkanError::Api)?;

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            image_views,
            format,
            extent,
        })
    }

    /// Get swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Get image views
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Get swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Get swapchain loader
    pub fn loader(&self) -> &SwapchainLoader {
        &self.swapchain_loader
    }

    /// Number of swapchain images.
    pub fn image_count(&self) -> u32 {
        self.image_views.len() as u32
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &image_view in &self.image_views {
                self.device.destroy_image_view(image_view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}
