//! Framebuffers and transient render targets
//!
//! Owns the multisampled color and depth images backing the render pass plus
//! one `vk::Framebuffer` per swapchain image. The transient images are
//! allocated from the arena once, sized for `max_extent`; because arena
//! blocks cannot be freed, a resize only rebuilds the framebuffer objects
//! against the retained attachments instead of reallocating memory.

use ash::{vk, Device};

use crate::backend::vulkan::arena::{ArenaRegion, MemoryArena};
use crate::backend::vulkan::render_pass::{DEPTH_FORMAT, MSAA_SAMPLES, RenderPass};
use crate::backend::vulkan::{VulkanError, VulkanResult};

struct TransientImage {
    image: vk::Image,
    view: vk::ImageView,
}

impl TransientImage {
    fn new(
        device: &Device,
        arena: &MemoryArena,
        format: vk::Format,
        extent: vk::Extent2D,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> VulkanResult<Self> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(MSAA_SAMPLES)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe {
            device
                .create_image(&image_info, None)
                .map_err(VulkanError::Api)?
        };

        let block = arena.allocate_image(ArenaRegion::DeviceLocal, image)?;
        unsafe {
            device
                .bind_image_memory(image, block.memory, block.offset)
                .map_err(VulkanError::Api)?;
        }

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe {
            device
                .create_image_view(&view_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { image, view })
    }

    fn destroy(&self, device: &Device) {
        unsafe {
            device.destroy_image_view(self.view, None);
            device.destroy_image(self.image, None);
        }
    }
}

/// Framebuffers plus the shared multisampled attachments behind them.
pub struct Framebuffer {
    device: Device,
    color: TransientImage,
    depth: TransientImage,
    framebuffers: Vec<vk::Framebuffer>,
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// Create framebuffers for `image_views` (the resolve targets).
    ///
    /// `max_extent` bounds every extent this framebuffer will ever be
    /// recreated with; the transient attachments are sized for it up front.
    pub fn new(
        device: Device,
        arena: &MemoryArena,
        render_pass: &RenderPass,
        image_views: &[vk::ImageView],
        extent: vk::Extent2D,
        max_extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let color = TransientImage::new(
            &device,
            arena,
            render_pass.color_format(),
            max_extent,
            vk::ImageUsageFlags::COLOR_ATTACHMENT,
            vk::ImageAspectFlags::COLOR,
        )?;

        let depth = TransientImage::new(
            &device,
            arena,
            DEPTH_FORMAT,
            max_extent,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
        )?;

        let framebuffers =
            Self::create_framebuffers(&device, render_pass, &color, &depth, image_views, extent)?;

        Ok(Self {
            device,
            color,
            depth,
            framebuffers,
            extent,
        })
    }

    fn create_framebuffers(
        device: &Device,
        render_pass: &RenderPass,
        color: &TransientImage,
        depth: &TransientImage,
        image_views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Vec<vk::Framebuffer>> {
        image_views
            .iter()
            .map(|&resolve_view| {
                let attachments = [color.view, depth.view, resolve_view];
                let create_info = vk::FramebufferCreateInfo::builder()
                    .render_pass(render_pass.handle())
                    .attachments(&attachments)
                    .width(extent.width)
                    .height(extent.height)
                    .layers(1);

                unsafe {
                    device
                        .create_framebuffer(&create_info, None)
                        .map_err(VulkanError::Api)
                }
            })
            .collect()
    }

    /// Rebuild the framebuffer objects for a new extent and resolve views.
    ///
    /// The transient attachments are reused; `extent` must not exceed the
    /// `max_extent` given at creation.
    pub fn recreate(
        &mut self,
        render_pass: &RenderPass,
        image_views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<()> {
        for &framebuffer in &self.framebuffers {
            unsafe { self.device.destroy_framebuffer(framebuffer, None) };
        }
        self.framebuffers = Self::create_framebuffers(
            &self.device,
            render_pass,
            &self.color,
            &self.depth,
            image_views,
            extent,
        )?;
        self.extent = extent;
        Ok(())
    }

    /// Framebuffer for swapchain image `index`.
    pub fn handle(&self, index: usize) -> vk::Framebuffer {
        self.framebuffers[index]
    }

    /// Current framebuffer extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        for &framebuffer in &self.framebuffers {
            unsafe { self.device.destroy_framebuffer(framebuffer, None) };
        }
        self.color.destroy(&self.device);
        self.depth.destroy(&self.device);
    }
}
