//! Mesh geometry and GPU upload
//!
//! [`MeshData`] is plain CPU geometry (procedural generators live here too);
//! [`Mesh`] is the uploaded, device-local copy bound at draw time.

use ash::{vk, Device};
use bytemuck::{Pod, Zeroable};

use crate::backend::vulkan::arena::{ArenaRegion, MemoryArena};
use crate::backend::vulkan::{VulkanError, VulkanResult};
use crate::foundation::math::Vec3;

/// Interleaved vertex: position, normal, texture coordinates.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position.
    pub position: [f32; 3],
    /// Object-space normal.
    pub normal: [f32; 3],
    /// Texture coordinates.
    pub uv: [f32; 2],
}

impl Vertex {
    /// Vertex buffer binding description for the mesh pipeline.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Attribute descriptions matching the vertex shader inputs.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 12,
            },
            vk::VertexInputAttributeDescription {
                location: 2,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 24,
            },
        ]
    }
}

/// CPU-side mesh geometry.
pub struct MeshData {
    /// Vertex list.
    pub vertices: Vec<Vertex>,
    /// Triangle list indices.
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Unit UV sphere with `segments` latitude rings and `2 * segments`
    /// longitude slices. Texture coordinates repeat `uv_scale` times around
    /// the sphere so the checkerboard tiles visibly.
    pub fn uv_sphere(segments: u32, uv_scale: f32) -> Self {
        let stacks = segments;
        let slices = segments * 2;

        let mut vertices = Vec::with_capacity(((stacks + 1) * (slices + 1)) as usize);
        for stack in 0..=stacks {
            let v = stack as f32 / stacks as f32;
            let phi = v * std::f32::consts::PI;
            for slice in 0..=slices {
                let u = slice as f32 / slices as f32;
                let theta = u * std::f32::consts::TAU;

                let position = Vec3::new(
                    phi.sin() * theta.cos(),
                    phi.sin() * theta.sin(),
                    phi.cos(),
                );
                vertices.push(Vertex {
                    position: position.into(),
                    normal: position.into(),
                    uv: [u * uv_scale, v * uv_scale],
                });
            }
        }

        let mut indices = Vec::with_capacity((stacks * slices * 6) as usize);
        let row = slices + 1;
        for stack in 0..stacks {
            for slice in 0..slices {
                let a = stack * row + slice;
                let b = a + row;
                indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }

        Self { vertices, indices }
    }
}

/// Device-local vertex and index buffers for one mesh.
pub struct Mesh {
    device: Device,
    vertex_buffer: vk::Buffer,
    index_buffer: vk::Buffer,
    index_count: u32,
}

impl Mesh {
    /// Upload `data` to device-local arena memory through a staging buffer.
    pub fn upload(
        device: Device,
        arena: &MemoryArena,
        command_pool: vk::CommandPool,
        queue: vk::Queue,
        data: &MeshData,
    ) -> VulkanResult<Self> {
        let vertex_buffer = upload_buffer(
            &device,
            arena,
            command_pool,
            queue,
            bytemuck::cast_slice(&data.vertices),
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        let index_buffer = upload_buffer(
            &device,
            arena,
            command_pool,
            queue,
            bytemuck::cast_slice(&data.indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
        )?;

        Ok(Self {
            device,
            vertex_buffer,
            index_buffer,
            index_count: data.indices.len() as u32,
        })
    }

    /// Vertex buffer handle.
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer
    }

    /// Index buffer handle.
    pub fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer
    }

    /// Number of indices to draw.
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.vertex_buffer, None);
            self.device.destroy_buffer(self.index_buffer, None);
        }
    }
}

/// Create a device-local buffer and copy `bytes` into it via staging.
fn upload_buffer(
    device: &Device,
    arena: &MemoryArena,
    command_pool: vk::CommandPool,
    queue: vk::Queue,
    bytes: &[u8],
    usage: vk::BufferUsageFlags,
) -> VulkanResult<vk::Buffer> {
    let size = bytes.len() as vk::DeviceSize;

    let staging_info = vk::BufferCreateInfo::builder()
        .size(size)
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
    staging.write(0, bytes);

    let buffer_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(usage | vk::BufferUsageFlags::TRANSFER_DST)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);
    let buffer = unsafe {
        device
            .create_buffer(&buffer_info, None)
            .map_err(VulkanError::Api)?
    };
    let block = arena.allocate_buffer(ArenaRegion::DeviceLocal, buffer)?;
    unsafe {
        device
            .bind_buffer_memory(buffer, block.memory, block.offset)
            .map_err(VulkanError::Api)?;
    }

    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);
    unsafe {
        let command_buffer = device
            .allocate_command_buffers(&alloc_info)
            .map_err(VulkanError::Api)?[0];

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        device
            .begin_command_buffer(command_buffer, &begin_info)
            .map_err(VulkanError::Api)?;

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        device.cmd_copy_buffer(command_buffer, staging_buffer, buffer, &[region]);
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
        device.destroy_buffer(staging_buffer, None);
    }

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uv_sphere_has_expected_counts() {
        let segments = 16;
        let data = MeshData::uv_sphere(segments, 8.0);
        let stacks = segments;
        let slices = segments * 2;
        assert_eq!(data.vertices.len(), ((stacks + 1) * (slices + 1)) as usize);
        assert_eq!(data.indices.len(), (stacks * slices * 6) as usize);
    }

    #[test]
    fn uv_sphere_vertices_are_unit_length() {
        let data = MeshData::uv_sphere(8, 1.0);
        for vertex in &data.vertices {
            let [x, y, z] = vertex.position;
            let length = (x * x + y * y + z * z).sqrt();
            assert!((length - 1.0).abs() < 1e-5, "vertex off the unit sphere");
            assert_eq!(vertex.position, vertex.normal);
        }
    }

    #[test]
    fn uv_sphere_indices_are_in_bounds() {
        let data = MeshData::uv_sphere(4, 1.0);
        let count = data.vertices.len() as u32;
        assert!(data.indices.iter().all(|&i| i < count));
        assert_eq!(data.indices.len() % 3, 0);
    }
}
