//! Vulkan-backed HMD session resources
//!
//! [`VkSessionFactory`] is the production [`SessionFactory`]: connecting
//! opens a driver session and builds every Vulkan object that renders into
//! it (compositor image views, render pass, framebuffers, renderer, frame
//! pacing). Dropping the bundle waits for the HMD queue and releases those
//! objects before the driver session closes.
//!
//! Geometry, texture and sampler are uploaded once by the engine and shared
//! with the window renderer; everything else here is session-scoped.

use std::sync::Arc;

use ash::{vk, Device, Instance};

use crate::backend::vulkan::arena::MemoryArena;
use crate::backend::vulkan::commands::CommandResources;
use crate::backend::vulkan::frame_sync::{DeviceFence, FrameSlots, MAX_FRAMES_IN_FLIGHT};
use crate::backend::vulkan::framebuffer::Framebuffer;
use crate::backend::vulkan::pipeline::MeshRenderer;
use crate::backend::vulkan::render_pass::{PresentTarget, RenderPass};
use crate::backend::vulkan::sampler::Sampler;
use crate::backend::vulkan::texture::Texture;
use crate::backend::vulkan::ubo::CameraUbo;
use crate::backend::vulkan::{VulkanError, VulkanResult};
use crate::foundation::math::{Mat4, Vec3};
use crate::scene::light::pack_lights;
use crate::scene::Mesh;
use crate::shared_state::SharedState;
use crate::vr::driver::{ConnectError, Eye, EyePose, HmdDriver, HmdSession, VrError};
use crate::vr::math::{eye_projection, eye_to_world, eye_view};
use crate::vr::worker::{SessionEvent, SessionFactory, VrSession};

const NEAR_PLANE: f32 = 0.1;
const FAR_PLANE: f32 = 100.0;

/// GPU resources shared between the engine and every HMD session.
pub struct SharedRenderResources {
    /// Vulkan instance handle, for driver physical-device queries.
    pub instance: Instance,
    /// The physical device the engine renders with.
    pub physical_device: vk::PhysicalDevice,
    /// Logical device handle.
    pub device: Device,
    /// Process-wide memory arena.
    pub arena: Arc<MemoryArena>,
    /// Queue reserved for the HMD render loop.
    pub queue: vk::Queue,
    /// Queue family for command pool creation.
    pub queue_family: u32,
    /// Uniform buffer offset alignment from the device limits.
    pub uniform_alignment: vk::DeviceSize,
    /// The scene mesh, uploaded once.
    pub mesh: Arc<Mesh>,
    /// The scene texture, uploaded once.
    pub texture: Arc<Texture>,
    /// Sampler for the texture.
    pub sampler: Arc<Sampler>,
}

/// Production session factory: driver connection plus Vulkan resource
/// construction.
pub struct VkSessionFactory<D: HmdDriver> {
    driver: D,
    resources: SharedRenderResources,
}

impl<D: HmdDriver> VkSessionFactory<D> {
    /// Wrap `driver` with the shared render resources.
    pub fn new(driver: D, resources: SharedRenderResources) -> Self {
        Self { driver, resources }
    }
}

impl<D: HmdDriver> SessionFactory for VkSessionFactory<D>
where
    D::Session: 'static,
{
    type Session = VkVrSession<D::Session>;

    fn connect(&mut self) -> Result<Self::Session, ConnectError> {
        let session = self.driver.connect()?;

        // Single-GPU configuration only: the headset must be driven by the
        // device the engine already renders with.
        let hmd_device = session
            .physical_device(&self.resources.instance)
            .map_err(|err| {
                ConnectError::RuntimeUnavailable(format!("physical device query failed: {err}"))
            })?;
        if hmd_device != self.resources.physical_device {
            return Err(ConnectError::RuntimeUnavailable(
                "HMD is driven by a different GPU than the rendering device".to_string(),
            ));
        }

        VkVrSession::build(session, &self.resources).map_err(|err| {
            ConnectError::RuntimeUnavailable(format!("session setup failed: {err}"))
        })
    }
}

struct EyeViews {
    device: Device,
    views: Vec<vk::ImageView>,
}

impl Drop for EyeViews {
    fn drop(&mut self) {
        for &view in &self.views {
            unsafe { self.device.destroy_image_view(view, None) };
        }
    }
}

// Field order: framebuffers are destroyed before the views they reference.
struct EyeTarget {
    framebuffer: Framebuffer,
    views: EyeViews,
    extent: vk::Extent2D,
    projection: Mat4,
}

/// One open HMD session with all Vulkan resources rendering into it.
///
/// Field order is teardown order: framebuffers and renderer go before the
/// render pass and image views, and the driver session closes last.
pub struct VkVrSession<S: HmdSession> {
    eye_targets: Vec<EyeTarget>,
    renderer: MeshRenderer,
    render_pass: RenderPass,
    slots: FrameSlots<DeviceFence>,
    commands: CommandResources,
    session: S,

    device: Device,
    queue: vk::Queue,
    mesh: Arc<Mesh>,
    _texture: Arc<Texture>,
    _sampler: Arc<Sampler>,
}

impl<S: HmdSession> VkVrSession<S> {
    fn build(mut session: S, resources: &SharedRenderResources) -> VulkanResult<Self> {
        let device = resources.device.clone();

        // Compositor images for both eyes; the format fixes the render pass.
        let left_images = session
            .eye_images(Eye::Left, &device)
            .map_err(|err| VulkanError::InitializationFailed(err.to_string()))?;
        let right_images = session
            .eye_images(Eye::Right, &device)
            .map_err(|err| VulkanError::InitializationFailed(err.to_string()))?;

        let render_pass =
            RenderPass::new(device.clone(), left_images.format, PresentTarget::Compositor)?;

        let mut eye_targets = Vec::with_capacity(2);
        for (eye, images) in [(Eye::Left, left_images), (Eye::Right, right_images)] {
            let views: Result<Vec<_>, _> = images
                .images
                .iter()
                .map(|&image| {
                    let view_info = vk::ImageViewCreateInfo::builder()
                        .image(image)
                        .view_type(vk::ImageViewType::TYPE_2D)
                        .format(images.format)
                        .subresource_range(vk::ImageSubresourceRange {
                            aspect_mask: vk::ImageAspectFlags::COLOR,
                            base_mip_level: 0,
                            level_count: 1,
                            base_array_layer: 0,
                            layer_count: 1,
                        });
                    unsafe { device.create_image_view(&view_info, None) }
                })
                .collect();
            let views = views.map_err(VulkanError::Api)?;

            // HMD extents never change while the session is open.
            let framebuffer = Framebuffer::new(
                device.clone(),
                &resources.arena,
                &render_pass,
                &views,
                images.extent,
                images.extent,
            )?;

            eye_targets.push(EyeTarget {
                framebuffer,
                views: EyeViews {
                    device: device.clone(),
                    views,
                },
                extent: images.extent,
                projection: eye_projection(session.eye_fov(eye), NEAR_PLANE, FAR_PLANE),
            });
        }

        let image_count = eye_targets[0].views.views.len();
        // One uniform slot per compositor image and eye.
        let renderer = MeshRenderer::new(
            device.clone(),
            &resources.arena,
            &render_pass,
            &resources.texture,
            &resources.sampler,
            image_count * 2,
            resources.uniform_alignment,
        )?;

        let mut fences = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            fences.push(DeviceFence::new(device.clone())?);
        }
        let slots = FrameSlots::new(fences);

        let commands =
            CommandResources::new(device.clone(), resources.queue_family, MAX_FRAMES_IN_FLIGHT)?;

        session
            .synchronize_queue(resources.queue)
            .map_err(|err| VulkanError::InitializationFailed(err.to_string()))?;

        Ok(Self {
            eye_targets,
            renderer,
            render_pass,
            slots,
            commands,
            session,
            device,
            queue: resources.queue,
            mesh: Arc::clone(&resources.mesh),
            _texture: Arc::clone(&resources.texture),
            _sampler: Arc::clone(&resources.sampler),
        })
    }

    fn record_and_submit(
        &mut self,
        shared: &SharedState,
        poses: &[EyePose; 2],
        image_indices: [u32; 2],
    ) -> VulkanResult<()> {
        let command_buffer = self.commands.buffer(self.slots.current_index());
        let lights = pack_lights(&shared.lights());
        let model = shared.orientation().to_homogeneous();

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        for eye in Eye::BOTH {
            let target = &self.eye_targets[eye.index()];
            let image_index = image_indices[eye.index()] as usize;
            let slot = image_index * 2 + eye.index();

            let pose = &poses[eye.index()];
            let world_from_eye = eye_to_world(pose);
            let eye_position = Vec3::new(
                world_from_eye[(0, 3)],
                world_from_eye[(1, 3)],
                world_from_eye[(2, 3)],
            );
            self.renderer.set_camera(
                slot,
                &CameraUbo::new(target.projection, eye_view(pose), eye_position),
            );
            self.renderer.set_lights(slot, &lights);

            let clear_values = [
                vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: [0.0, 0.0, 0.05, 1.0],
                    },
                },
                vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                },
                vk::ClearValue::default(),
            ];
            let pass_info = vk::RenderPassBeginInfo::builder()
                .render_pass(self.render_pass.handle())
                .framebuffer(target.framebuffer.handle(image_index))
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: target.extent,
                })
                .clear_values(&clear_values);

            unsafe {
                self.device.cmd_begin_render_pass(
                    command_buffer,
                    &pass_info,
                    vk::SubpassContents::INLINE,
                );
            }
            self.renderer.bind(command_buffer, slot, target.extent);
            self.renderer.draw(command_buffer, &self.mesh, model);
            unsafe {
                self.device.cmd_end_render_pass(command_buffer);
            }
        }

        unsafe {
            self.device
                .end_command_buffer(command_buffer)
                .map_err(VulkanError::Api)?;

            let command_buffers = [command_buffer];
            let submit = vk::SubmitInfo::builder()
                .command_buffers(&command_buffers)
                .build();
            self.device
                .queue_submit(self.queue, &[submit], self.slots.current_fence().handle())
                .map_err(VulkanError::Api)?;
        }

        Ok(())
    }
}

impl<S: HmdSession> VrSession for VkVrSession<S> {
    fn render_frame(&mut self, shared: &SharedState) -> Result<SessionEvent, VrError> {
        let status = self.session.status();
        if status.should_quit {
            return Ok(SessionEvent::QuitRequested);
        }

        // The pose wait paces the loop at the headset's refresh rate.
        let poses = self.session.wait_poses()?;

        // Published every iteration, visible or not, so the window loop
        // always has a recent pose for its eye markers.
        shared.set_eye_poses([eye_to_world(&poses[0]), eye_to_world(&poses[1])]);

        if status.visible {
            self.slots.wait_current()?;

            let image_indices = [
                self.session.acquire_image(Eye::Left)?,
                self.session.acquire_image(Eye::Right)?,
            ];

            // The frame is certain to submit from here on.
            self.slots.commit_current()?;
            self.record_and_submit(shared, &poses, image_indices)?;
            self.slots.advance();

            self.session.end_frame(&poses)?;
        }

        if status.should_recenter {
            self.session.recenter()?;
        }

        Ok(SessionEvent::Continue)
    }
}

impl<S: HmdSession> Drop for VkVrSession<S> {
    fn drop(&mut self) {
        // The HMD queue must be quiet before session resources go away.
        unsafe {
            let _ = self.device.queue_wait_idle(self.queue);
        }
    }
}
