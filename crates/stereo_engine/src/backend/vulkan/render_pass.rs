//! Render pass configuration
//!
//! One forward pass shared by both render targets: a 4x multisampled color
//! attachment, a matching depth attachment, and a single-sample resolve
//! attachment that receives the final image. The window path resolves into
//! swapchain images (final layout `PRESENT_SRC_KHR`), the HMD path into
//! compositor swapchain images (final layout `SHADER_READ_ONLY_OPTIMAL`,
//! which is what the compositor samples).

use ash::{vk, Device};

use crate::backend::vulkan::{VulkanError, VulkanResult};

/// Sample count used for multisampled rendering.
pub const MSAA_SAMPLES: vk::SampleCountFlags = vk::SampleCountFlags::TYPE_4;

/// Depth attachment format.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D24_UNORM_S8_UINT;

/// What the resolved image is consumed by, which fixes its final layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentTarget {
    /// Resolve target is presented to a window surface.
    Surface,
    /// Resolve target is sampled by the HMD compositor.
    Compositor,
}

/// Forward render pass with MSAA color, depth, and resolve attachments.
pub struct RenderPass {
    device: Device,
    render_pass: vk::RenderPass,
    color_format: vk::Format,
}

impl RenderPass {
    /// Create the pass for color attachments of `color_format`.
    pub fn new(
        device: Device,
        color_format: vk::Format,
        target: PresentTarget,
    ) -> VulkanResult<Self> {
        let final_layout = match target {
            PresentTarget::Surface => vk::ImageLayout::PRESENT_SRC_KHR,
            PresentTarget::Compositor => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };

        let attachments = [
            // Multisampled color, transient.
            vk::AttachmentDescription::builder()
                .format(color_format)
                .samples(MSAA_SAMPLES)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .build(),
            // Multisampled depth, transient.
            vk::AttachmentDescription::builder()
                .format(DEPTH_FORMAT)
                .samples(MSAA_SAMPLES)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .build(),
            // Single-sample resolve target.
            vk::AttachmentDescription::builder()
                .format(color_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::DONT_CARE)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(final_layout)
                .build(),
        ];

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let resolve_refs = [vk::AttachmentReference {
            attachment: 2,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];

        let subpasses = [vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .resolve_attachments(&resolve_refs)
            .depth_stencil_attachment(&depth_ref)
            .build()];

        let dependencies = [vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .build()];

        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe {
            device
                .create_render_pass(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            render_pass,
            color_format,
        })
    }

    /// Raw render pass handle.
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Color format the pass was created for.
    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}
