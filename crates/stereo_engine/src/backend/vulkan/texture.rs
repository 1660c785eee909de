//! Texture upload and mipmap generation
//!
//! Uploads RGBA8 pixel data through a staging buffer and generates a full
//! mip chain with linear blits. Upload happens on whichever queue the
//! calling render loop owns; the function blocks until the copy retires so
//! the staging memory can be reused immediately.

use ash::{vk, Device};

use crate::backend::vulkan::arena::{ArenaRegion, MemoryArena};
use crate::backend::vulkan::{VulkanError, VulkanResult};

/// A sampled 2D texture with a full mip chain.
pub struct Texture {
    device: Device,
    image: vk::Image,
    view: vk::ImageView,
    mip_levels: u32,
}

impl Texture {
    /// Upload `pixels` (tightly packed RGBA8, `width * height * 4` bytes)
    /// and generate mipmaps.
    pub fn from_rgba8(
        device: Device,
        arena: &MemoryArena,
        command_pool: vk::CommandPool,
        queue: vk::Queue,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> VulkanResult<Self> {
        assert_eq!(pixels.len(), (width * height * 4) as usize);

        let mip_levels = 32 - width.max(height).leading_zeros();

        // Staging buffer in mapped host memory.
        let staging_info = vk::BufferCreateInfo::builder()
            .size(pixels.len() as vk::DeviceSize)
            .usage(vk::BufferUsageFlags::TRANSFER_SRC)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let staging_buffer = unsafe {
            device
                .create_buffer(&staging_info, None)
                .map_err(VulkanError::Api)?
        };
        let staging = arena.allocate_mapped(staging_buffer)?;
        unsafe {
            device
                .bind_buffer_memory(staging_buffer, staging.block.memory, staging.block.offset)
                .map_err(VulkanError::Api)?;
        }
        staging.write(0, pixels);

        // Device-local image with the whole mip chain.
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk::Format::R8G8B8A8_SRGB)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(mip_levels)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(
                vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::SAMPLED,
            )
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

        Self::upload_and_blit(
            &device,
            command_pool,
            queue,
            staging_buffer,
            image,
            width,
            height,
            mip_levels,
        )?;

        // The staging memory stays resident in the arena's mapped list; the
        // buffer handle itself is no longer needed.
        unsafe { device.destroy_buffer(staging_buffer, None) };

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(vk::Format::R8G8B8A8_SRGB)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = unsafe {
            device
                .create_image_view(&view_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            image,
            view,
            mip_levels,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn upload_and_blit(
        device: &Device,
        command_pool: vk::CommandPool,
        queue: vk::Queue,
        staging_buffer: vk::Buffer,
        image: vk::Image,
        width: u32,
        height: u32,
        mip_levels: u32,
    ) -> VulkanResult<()> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = unsafe {
            device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)?[0]
        };

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        let subresource = |mip: u32| vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: mip,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };

        // All mips to TRANSFER_DST.
        let to_dst = vk::ImageMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            })
            .build();
        unsafe {
            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_dst],
            );
        }

        // Copy pixels into mip 0.
        let copy = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .build();
        unsafe {
            device.cmd_copy_buffer_to_image(
                command_buffer,
                staging_buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[copy],
            );
        }

        // Blit chain: each level is downsampled from the previous one.
        let mut mip_width = width as i32;
        let mut mip_height = height as i32;
        for mip in 1..mip_levels {
            let src_to_read = vk::ImageMemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::TRANSFER_READ)
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(subresource(mip - 1))
                .build();
            unsafe {
                device.cmd_pipeline_barrier(
                    command_buffer,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[src_to_read],
                );
            }

            let next_width = (mip_width / 2).max(1);
            let next_height = (mip_height / 2).max(1);
            let blit = vk::ImageBlit::builder()
                .src_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: mip - 1,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .src_offsets([
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D {
                        x: mip_width,
                        y: mip_height,
                        z: 1,
                    },
                ])
                .dst_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: mip,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .dst_offsets([
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D {
                        x: next_width,
                        y: next_height,
                        z: 1,
                    },
                ])
                .build();
            unsafe {
                device.cmd_blit_image(
                    command_buffer,
                    image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[blit],
                    vk::Filter::LINEAR,
                );
            }

            // Retire the source level to its final layout.
            let src_to_shader = vk::ImageMemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::TRANSFER_READ)
                .dst_access_mask(vk::AccessFlags::SHADER_READ)
                .old_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(subresource(mip - 1))
                .build();
            unsafe {
                device.cmd_pipeline_barrier(
                    command_buffer,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[src_to_shader],
                );
            }

            mip_width = next_width;
            mip_height = next_height;
        }

        // Last level never became a blit source.
        let last_to_shader = vk::ImageMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ)
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(subresource(mip_levels - 1))
            .build();
        unsafe {
            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[last_to_shader],
            );

            device
                .end_command_buffer(command_buffer)
                .map_err(VulkanError::Api)?;

            let command_buffers = [command_buffer];
            let submit = vk::SubmitInfo::builder()
                .command_buffers(&command_buffers)
                .build();
            device
                .queue_submit(queue, &[submit], vk::Fence::null())
                .map_err(VulkanError::Api)?;
            device.queue_wait_idle(queue).map_err(VulkanError::Api)?;

            device.free_command_buffers(command_pool, &command_buffers);
        }

        Ok(())
    }

    /// Sampled image view over the full mip chain.
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Number of mip levels.
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
        }
    }
}
