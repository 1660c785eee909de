//! Command pool and per-slot command buffers

use ash::{vk, Device};

use crate::backend::vulkan::{VulkanError, VulkanResult};

/// A command pool plus one resettable primary buffer per frame slot.
///
/// Pools are not thread safe; each render loop owns its own.
pub struct CommandResources {
    device: Device,
    pool: vk::CommandPool,
    buffers: Vec<vk::CommandBuffer>,
}

impl CommandResources {
    /// Create the pool on `queue_family` with `slot_count` buffers.
    pub fn new(device: Device, queue_family: u32, slot_count: usize) -> VulkanResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family);
        let pool = unsafe {
            device
                .create_command_pool(&pool_info, None)
                .map_err(VulkanError::Api)?
        };

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(slot_count as u32);
        let buffers = unsafe {
            device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            pool,
            buffers,
        })
    }

    /// Raw pool handle (for one-shot uploads).
    pub fn pool(&self) -> vk::CommandPool {
        self.pool
    }

    /// Command buffer for frame slot `slot`.
    pub fn buffer(&self, slot: usize) -> vk::CommandBuffer {
        self.buffers[slot]
    }
}

impl Drop for CommandResources {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}
