//! Mesh rendering pipeline
//!
//! Descriptor layout, uniform slots and the graphics pipeline for textured,
//! lit meshes. Each render target creates its own `MeshRenderer` with one
//! uniform slot per frame view (one per swapchain image for the window, one
//! per image and eye for the HMD), so no slot is ever written while the GPU
//! still reads it.
//!
//! Viewport and scissor are dynamic state; the same pipeline survives window
//! resizes and serves both the window and HMD extents.

use std::io::Cursor;
use std::mem;

use ash::util::read_spv;
use ash::{vk, Device};
use bytemuck::{Pod, Zeroable};

use crate::backend::vulkan::arena::{MappedBlock, MemoryArena};
use crate::backend::vulkan::render_pass::{MSAA_SAMPLES, RenderPass};
use crate::backend::vulkan::sampler::Sampler;
use crate::backend::vulkan::texture::Texture;
use crate::backend::vulkan::ubo::{CameraUbo, LightUbo};
use crate::backend::vulkan::{VulkanError, VulkanResult};
use crate::foundation::math::{align_up, Mat4};
use crate::scene::mesh::{Mesh, Vertex};

const VERT_SHADER_PATH: &str = "target/shaders/mesh_vert.spv";
const FRAG_SHADER_PATH: &str = "target/shaders/mesh_frag.spv";

/// Per-draw push constant block: model matrix and its inverse transpose.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PushConstants {
    /// Model-to-world transform, column-major.
    pub model: [[f32; 4]; 4],
    /// Inverse transpose of `model` for normal transformation.
    pub model_inverse_transpose: [[f32; 4]; 4],
}

impl PushConstants {
    /// Build the block from a model matrix.
    pub fn new(model: Mat4) -> Self {
        let inverse_transpose = model
            .try_inverse()
            .unwrap_or_else(Mat4::identity)
            .transpose();
        Self {
            model: model.into(),
            model_inverse_transpose: inverse_transpose.into(),
        }
    }
}

/// A GPU buffer of per-slot uniform strides with a persistent mapping.
struct SlotBuffer {
    buffer: vk::Buffer,
    mapped: MappedBlock,
    stride: vk::DeviceSize,
}

impl SlotBuffer {
    fn new(
        device: &Device,
        arena: &MemoryArena,
        element_size: usize,
        slot_count: usize,
        alignment: vk::DeviceSize,
    ) -> VulkanResult<Self> {
        let stride = align_up(element_size as u64, alignment.max(1));
        let create_info = vk::BufferCreateInfo::builder()
            .size(stride * slot_count as vk::DeviceSize)
            .usage(vk::BufferUsageFlags::UNIFORM_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe {
            device
                .create_buffer(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        let mapped = arena.allocate_mapped(buffer)?;
        unsafe {
            device
                .bind_buffer_memory(buffer, mapped.block.memory, mapped.block.offset)
                .map_err(VulkanError::Api)?;
        }
        Ok(Self {
            buffer,
            mapped,
            stride,
        })
    }

    fn write_slot(&self, slot: usize, bytes: &[u8]) {
        self.mapped.write(slot * self.stride as usize, bytes);
    }
}

/// Pipeline, descriptors and uniform storage for mesh rendering.
pub struct MeshRenderer {
    device: Device,
    descriptor_set_layout: vk::DescriptorSetLayout,
    descriptor_pool: vk::DescriptorPool,
    descriptor_sets: Vec<vk::DescriptorSet>,
    pipeline_layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    camera: SlotBuffer,
    lights: SlotBuffer,
}

impl MeshRenderer {
    /// Create the renderer with `slot_count` independent uniform slots.
    pub fn new(
        device: Device,
        arena: &MemoryArena,
        render_pass: &RenderPass,
        texture: &Texture,
        sampler: &Sampler,
        slot_count: usize,
        uniform_alignment: vk::DeviceSize,
    ) -> VulkanResult<Self> {
        let camera = SlotBuffer::new(
            &device,
            arena,
            mem::size_of::<CameraUbo>(),
            slot_count,
            uniform_alignment,
        )?;
        let lights = SlotBuffer::new(
            &device,
            arena,
            mem::size_of::<LightUbo>(),
            slot_count,
            uniform_alignment,
        )?;

        let descriptor_set_layout = Self::create_descriptor_set_layout(&device)?;
        let (descriptor_pool, descriptor_sets) = Self::create_descriptor_sets(
            &device,
            descriptor_set_layout,
            &camera,
            &lights,
            texture,
            sampler,
            slot_count,
        )?;

        let pipeline_layout = Self::create_pipeline_layout(&device, descriptor_set_layout)?;
        let pipeline = Self::create_pipeline(&device, render_pass, pipeline_layout)?;

        Ok(Self {
            device,
            descriptor_set_layout,
            descriptor_pool,
            descriptor_sets,
            pipeline_layout,
            pipeline,
            camera,
            lights,
        })
    }

    fn create_descriptor_set_layout(device: &Device) -> VulkanResult<vk::DescriptorSetLayout> {
        let bindings = [
            vk::DescriptorSetLayoutBinding::builder()
                .binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
                .build(),
            vk::DescriptorSetLayoutBinding::builder()
                .binding(1)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::FRAGMENT)
                .build(),
            vk::DescriptorSetLayoutBinding::builder()
                .binding(2)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::FRAGMENT)
                .build(),
        ];

        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        unsafe {
            device
                .create_descriptor_set_layout(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    fn create_descriptor_sets(
        device: &Device,
        layout: vk::DescriptorSetLayout,
        camera: &SlotBuffer,
        lights: &SlotBuffer,
        texture: &Texture,
        sampler: &Sampler,
        slot_count: usize,
    ) -> VulkanResult<(vk::DescriptorPool, Vec<vk::DescriptorSet>)> {
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 2 * slot_count as u32,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: slot_count as u32,
            },
        ];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(slot_count as u32)
            .pool_sizes(&pool_sizes);
        let pool = unsafe {
            device
                .create_descriptor_pool(&pool_info, None)
                .map_err(VulkanError::Api)?
        };

        let layouts = vec![layout; slot_count];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let sets = unsafe {
            device
                .allocate_descriptor_sets(&alloc_info)
                .map_err(VulkanError::Api)?
        };

        for (slot, &set) in sets.iter().enumerate() {
            let camera_info = [vk::DescriptorBufferInfo {
                buffer: camera.buffer,
                offset: slot as vk::DeviceSize * camera.stride,
                range: mem::size_of::<CameraUbo>() as vk::DeviceSize,
            }];
            let light_info = [vk::DescriptorBufferInfo {
                buffer: lights.buffer,
                offset: slot as vk::DeviceSize * lights.stride,
                range: mem::size_of::<LightUbo>() as vk::DeviceSize,
            }];
            let image_info = [vk::DescriptorImageInfo {
                sampler: sampler.handle(),
                image_view: texture.view(),
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            }];

            let writes = [
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&camera_info)
                    .build(),
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(1)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&light_info)
                    .build(),
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(2)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_info)
                    .build(),
            ];

            unsafe { device.update_descriptor_sets(&writes, &[]) };
        }

        Ok((pool, sets))
    }

    fn create_pipeline_layout(
        device: &Device,
        descriptor_set_layout: vk::DescriptorSetLayout,
    ) -> VulkanResult<vk::PipelineLayout> {
        let set_layouts = [descriptor_set_layout];
        let push_constant_ranges = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: mem::size_of::<PushConstants>() as u32,
        }];
        let create_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        unsafe {
            device
                .create_pipeline_layout(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    fn load_shader(device: &Device, path: &str) -> VulkanResult<vk::ShaderModule> {
        let bytes = std::fs::read(path).map_err(|source| VulkanError::ShaderLoad {
            path: path.to_string(),
            source,
        })?;
        let code = read_spv(&mut Cursor::new(&bytes)).map_err(|source| VulkanError::ShaderLoad {
            path: path.to_string(),
            source,
        })?;
        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
        unsafe {
            device
                .create_shader_module(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    fn create_pipeline(
        device: &Device,
        render_pass: &RenderPass,
        layout: vk::PipelineLayout,
    ) -> VulkanResult<vk::Pipeline> {
        let vert_module = Self::load_shader(device, VERT_SHADER_PATH)?;
        let frag_module = Self::load_shader(device, FRAG_SHADER_PATH)?;

        let entry_point = std::ffi::CString::new("main").unwrap();
        let stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module)
                .name(&entry_point)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module)
                .name(&entry_point)
                .build(),
        ];

        let binding_descriptions = [Vertex::binding_description()];
        let attribute_descriptions = Vertex::attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&binding_descriptions)
            .vertex_attribute_descriptions(&attribute_descriptions);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0);

        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(MSAA_SAMPLES);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder()
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let create_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass.handle())
            .subpass(0)
            .build();

        let pipeline = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, e)| VulkanError::Api(e))?[0]
        };

        unsafe {
            device.destroy_shader_module(vert_module, None);
            device.destroy_shader_module(frag_module, None);
        }

        Ok(pipeline)
    }

    /// Write the camera block for uniform slot `slot`.
    pub fn set_camera(&self, slot: usize, camera: &CameraUbo) {
        self.camera.write_slot(slot, bytemuck::bytes_of(camera));
    }

    /// Write the light block for uniform slot `slot`.
    pub fn set_lights(&self, slot: usize, lights: &LightUbo) {
        self.lights.write_slot(slot, bytemuck::bytes_of(lights));
    }

    /// Record pipeline, viewport and descriptor binds for `slot`.
    pub fn bind(&self, command_buffer: vk::CommandBuffer, slot: usize, extent: vk::Extent2D) {
        unsafe {
            self.device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline,
            );

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            self.device.cmd_set_viewport(command_buffer, 0, &[viewport]);

            let scissor = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            self.device.cmd_set_scissor(command_buffer, 0, &[scissor]);

            self.device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                0,
                &[self.descriptor_sets[slot]],
                &[],
            );
        }
    }

    /// Record an indexed draw of `mesh` transformed by `model`.
    pub fn draw(&self, command_buffer: vk::CommandBuffer, mesh: &Mesh, model: Mat4) {
        let push = PushConstants::new(model);
        unsafe {
            self.device.cmd_push_constants(
                command_buffer,
                self.pipeline_layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(&push),
            );
            self.device
                .cmd_bind_vertex_buffers(command_buffer, 0, &[mesh.vertex_buffer()], &[0]);
            self.device.cmd_bind_index_buffer(
                command_buffer,
                mesh.index_buffer(),
                0,
                vk::IndexType::UINT32,
            );
            self.device
                .cmd_draw_indexed(command_buffer, mesh.index_count(), 1, 0, 0, 0);
        }
    }
}

impl Drop for MeshRenderer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device
                .destroy_pipeline_layout(self.pipeline_layout, None);
            self.device
                .destroy_descriptor_pool(self.descriptor_pool, None);
            self.device
                .destroy_descriptor_set_layout(self.descriptor_set_layout, None);
            self.device.destroy_buffer(self.camera.buffer, None);
            self.device.destroy_buffer(self.lights.buffer, None);
        }
    }
}
