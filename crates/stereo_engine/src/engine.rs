//! Engine core
//!
//! Owns the window, the Vulkan context, the shared memory arena and the
//! window render loop, and starts/stops the HMD render thread. Fields are
//! declared in reverse creation order so dropping the engine tears
//! everything down deterministically: worker thread first, GPU objects
//! next, then the arena, the device and finally the window.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ash::vk;
use thiserror::Error;

use crate::backend::vulkan::commands::CommandResources;
use crate::backend::vulkan::frame_sync::FrameSync;
use crate::backend::vulkan::framebuffer::Framebuffer;
use crate::backend::vulkan::pipeline::MeshRenderer;
use crate::backend::vulkan::render_pass::{PresentTarget, RenderPass};
use crate::backend::vulkan::sampler::Sampler;
use crate::backend::vulkan::swapchain::Swapchain;
use crate::backend::vulkan::texture::Texture;
use crate::backend::vulkan::ubo::CameraUbo;
use crate::backend::vulkan::{MemoryArena, VulkanContext, VulkanError};
use crate::foundation::math::{Mat4, Point3, Quat};
use crate::platform::window::{Window, WindowError};
use crate::scene::light::pack_lights;
use crate::scene::{checkerboard_rgba, Light, Mesh, MeshData, OrbitCamera};
use crate::shared_state::SharedState;
use crate::vr::driver::HmdDriver;
use crate::vr::session::{SharedRenderResources, VkSessionFactory};
use crate::vr::worker::VrWorker;

/// Largest window framebuffer the transient render targets are sized for.
/// Resizes beyond this are clamped with a warning.
const MAX_WINDOW_EXTENT: vk::Extent2D = vk::Extent2D {
    width: 2560,
    height: 1600,
};

const TEXTURE_SIZE: u32 = 128;
const TEXTURE_TILES: u32 = 8;
const SPHERE_SEGMENTS: u32 = 16;
const SPHERE_UV_SCALE: f32 = 8.0;
const EYE_MARKER_SCALE: f32 = 0.05;
const FPS_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Engine startup configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Application name reported to Vulkan.
    pub app_name: String,
    /// Window title.
    pub window_title: String,
    /// Initial window width in pixels.
    pub window_width: u32,
    /// Initial window height in pixels.
    pub window_height: u32,
    /// Size of the device-local arena region in bytes.
    pub device_local_arena: vk::DeviceSize,
    /// Size of the host-visible arena region in bytes.
    pub host_visible_arena: vk::DeviceSize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_name: "stereo_engine".to_string(),
            window_title: "Stereo Engine".to_string(),
            window_width: 1280,
            window_height: 720,
            device_local_arena: 256 * 1024 * 1024,
            host_visible_arena: 64 * 1024 * 1024,
        }
    }
}

/// Top-level engine errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Vulkan backend failure.
    #[error(transparent)]
    Vulkan(#[from] VulkanError),

    /// Windowing failure.
    #[error(transparent)]
    Window(#[from] WindowError),

    /// The HMD render thread could not be created.
    #[error("failed to spawn HMD render thread: {0}")]
    Thread(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// The engine: window loop owner and HMD loop supervisor.
pub struct Engine {
    // Stopped explicitly before any GPU teardown.
    vr_worker: Option<VrWorker>,

    renderer: MeshRenderer,
    framebuffer: Framebuffer,
    render_pass: RenderPass,
    swapchain: Swapchain,
    frame_sync: FrameSync,
    commands: CommandResources,

    mesh: Arc<Mesh>,
    texture: Arc<Texture>,
    sampler: Arc<Sampler>,

    shared: Arc<SharedState>,
    camera: OrbitCamera,
    lights: Vec<Light>,

    frame_counter: u32,
    last_fps_log: Instant,
    pending_rebuild: bool,

    arena: Arc<MemoryArena>,
    context: VulkanContext,
    window: Window,
}

impl Engine {
    /// Bring up the window, device, arena and window-side render objects.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let window = Window::new(&config.window_title, config.window_width, config.window_height)?;
        let context = VulkanContext::new(&window, &config.app_name)?;
        let device = context.raw_device();

        let arena = Arc::new(MemoryArena::new(
            context.instance(),
            context.physical_device.device,
            device.clone(),
            config.device_local_arena,
            config.host_visible_arena,
        )?);

        let (width, height) = window.get_framebuffer_size();
        let swapchain = Swapchain::new(
            device.clone(),
            context.device.swapchain_loader.clone(),
            context.surface,
            &context.surface_loader,
            &context.physical_device,
            vk::Extent2D { width, height },
        )?;

        let render_pass =
            RenderPass::new(device.clone(), swapchain.format().format, PresentTarget::Surface)?;

        let max_extent = vk::Extent2D {
            width: MAX_WINDOW_EXTENT.width.max(width),
            height: MAX_WINDOW_EXTENT.height.max(height),
        };
        let framebuffer = Framebuffer::new(
            device.clone(),
            &arena,
            &render_pass,
            swapchain.image_views(),
            swapchain.extent(),
            max_extent,
        )?;

        let commands = CommandResources::new(
            device.clone(),
            context.queue_family(),
            swapchain.image_count() as usize,
        )?;
        let frame_sync = FrameSync::new(device.clone())?;

        // Scene content, uploaded once and shared with HMD sessions.
        let pixels = checkerboard_rgba(TEXTURE_SIZE, TEXTURE_TILES);
        let texture = Arc::new(Texture::from_rgba8(
            device.clone(),
            &arena,
            commands.pool(),
            context.device.window_queue,
            TEXTURE_SIZE,
            TEXTURE_SIZE,
            &pixels,
        )?);
        let sampler = Arc::new(Sampler::new(device.clone(), texture.mip_levels())?);
        let mesh = Arc::new(Mesh::upload(
            device.clone(),
            &arena,
            commands.pool(),
            context.device.window_queue,
            &MeshData::uv_sphere(SPHERE_SEGMENTS, SPHERE_UV_SCALE),
        )?);

        let renderer = MeshRenderer::new(
            device,
            &arena,
            &render_pass,
            &texture,
            &sampler,
            swapchain.image_count() as usize,
            context.uniform_buffer_alignment(),
        )?;

        log::info!(
            "Engine initialized: {}x{} window, {} swapchain images",
            width,
            height,
            swapchain.image_count()
        );

        Ok(Self {
            vr_worker: None,
            renderer,
            framebuffer,
            render_pass,
            swapchain,
            frame_sync,
            commands,
            mesh,
            texture,
            sampler,
            shared: Arc::new(SharedState::new()),
            camera: OrbitCamera::default(),
            lights: Vec::new(),
            frame_counter: 0,
            last_fps_log: Instant::now(),
            pending_rebuild: false,
            arena,
            context,
            window,
        })
    }

    /// The window, for event polling and input.
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Mutable window access.
    pub fn window_mut(&mut self) -> &mut Window {
        &mut self.window
    }

    /// The desktop camera.
    pub fn camera_mut(&mut self) -> &mut OrbitCamera {
        &mut self.camera
    }

    /// The shared state block.
    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// Replace the scene lights, published to both render loops.
    pub fn set_lights(&mut self, lights: Vec<Light>) {
        self.shared.set_lights(lights.clone());
        self.lights = lights;
    }

    /// Rotate the shared object by `delta`.
    pub fn rotate_object(&mut self, delta: Quat) {
        let orientation = delta * self.shared.orientation();
        self.shared.set_orientation(orientation);
    }

    /// Start the HMD render thread with the given driver.
    pub fn start_vr<D>(&mut self, driver: D) -> EngineResult<()>
    where
        D: HmdDriver + 'static,
        D::Session: 'static,
    {
        let resources = SharedRenderResources {
            instance: self.context.instance().clone(),
            physical_device: self.context.physical_device.device,
            device: self.context.raw_device(),
            arena: Arc::clone(&self.arena),
            queue: self.context.device.vr_queue,
            queue_family: self.context.queue_family(),
            uniform_alignment: self.context.uniform_buffer_alignment(),
            mesh: Arc::clone(&self.mesh),
            texture: Arc::clone(&self.texture),
            sampler: Arc::clone(&self.sampler),
        };
        let factory = VkSessionFactory::new(driver, resources);
        self.vr_worker = Some(VrWorker::spawn(factory, Arc::clone(&self.shared))?);
        log::info!("HMD render thread started");
        Ok(())
    }

    /// Render and present one window frame.
    ///
    /// An out-of-date swapchain rebuilds the presentation chain and returns
    /// without rendering; the caller just calls again next iteration.
    pub fn draw_frame(&mut self) -> EngineResult<()> {
        if self.pending_rebuild {
            self.rebuild_swapchain()?;
        }

        self.frame_sync.slots().wait_current()?;

        let acquire = unsafe {
            self.swapchain.loader().acquire_next_image(
                self.swapchain.handle(),
                u64::MAX,
                self.frame_sync.image_available(),
                vk::Fence::null(),
            )
        };
        let (image_index, suboptimal) = match acquire {
            Ok(result) => result,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                // Fence is still signaled and the slot was not advanced, so
                // the retry next iteration cannot deadlock.
                self.rebuild_swapchain()?;
                return Ok(());
            }
            Err(err) => return Err(VulkanError::Api(err).into()),
        };
        if suboptimal {
            self.pending_rebuild = true;
        }

        // The frame is certain to submit from here on.
        self.frame_sync.slots().commit_current()?;

        let slot = image_index as usize;
        let extent = self.swapchain.extent();
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        self.renderer.set_camera(
            slot,
            &CameraUbo::new(
                self.camera.projection_matrix(aspect),
                self.camera.view_matrix(),
                self.camera.position() - Point3::origin(),
            ),
        );
        self.renderer.set_lights(slot, &pack_lights(&self.lights));

        self.record_commands(slot, image_index)?;
        self.submit_and_present(slot, image_index)?;

        self.frame_sync.slots_mut().advance();
        self.log_fps();
        Ok(())
    }

    fn record_commands(&mut self, slot: usize, image_index: u32) -> EngineResult<()> {
        let device = self.context.raw_device();
        let command_buffer = self.commands.buffer(slot);
        let extent = self.swapchain.extent();
        let model = self.shared.orientation().to_homogeneous();

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.02, 0.02, 0.05, 1.0],
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
            .framebuffer(self.framebuffer.handle(image_index as usize))
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        unsafe {
            device.cmd_begin_render_pass(command_buffer, &pass_info, vk::SubpassContents::INLINE);
        }
        self.renderer.bind(command_buffer, slot, extent);
        self.renderer.draw(command_buffer, &self.mesh, model);

        // Small markers at the latest published eye poses, so the headset's
        // position is visible from the desktop view.
        if self.vr_worker.is_some() {
            let marker_scale = Mat4::new_scaling(EYE_MARKER_SCALE);
            for pose in self.shared.eye_poses() {
                self.renderer
                    .draw(command_buffer, &self.mesh, pose * marker_scale);
            }
        }

        unsafe {
            device.cmd_end_render_pass(command_buffer);
            device
                .end_command_buffer(command_buffer)
                .map_err(VulkanError::Api)?;
        }

        Ok(())
    }

    fn submit_and_present(&mut self, slot: usize, image_index: u32) -> EngineResult<()> {
        let device = self.context.raw_device();
        let command_buffers = [self.commands.buffer(slot)];
        let wait_semaphores = [self.frame_sync.image_available()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.frame_sync.render_finished()];

        let submit = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();
        unsafe {
            device
                .queue_submit(
                    self.context.device.window_queue,
                    &[submit],
                    self.frame_sync.slots().current_fence().handle(),
                )
                .map_err(VulkanError::Api)?;
        }

        let swapchains = [self.swapchain.handle()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let present = unsafe {
            self.swapchain
                .loader()
                .queue_present(self.context.device.present_queue, &present_info)
        };
        match present {
            Ok(false) => {}
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.pending_rebuild = true;
            }
            Err(err) => return Err(VulkanError::Api(err).into()),
        }

        Ok(())
    }

    fn rebuild_swapchain(&mut self) -> EngineResult<()> {
        self.pending_rebuild = false;
        self.context.wait_idle()?;

        let (width, height) = self.window.get_framebuffer_size();
        if width == 0 || height == 0 {
            // Minimized; keep the old chain and try again later.
            self.pending_rebuild = true;
            return Ok(());
        }

        let mut extent = vk::Extent2D { width, height };
        let max = self.framebuffer_max_extent();
        if extent.width > max.width || extent.height > max.height {
            log::warn!(
                "Window {}x{} exceeds render target budget {}x{}, clamping",
                extent.width,
                extent.height,
                max.width,
                max.height
            );
            extent.width = extent.width.min(max.width);
            extent.height = extent.height.min(max.height);
        }

        let new_swapchain = self.swapchain.recreate(
            self.context.surface,
            &self.context.surface_loader,
            &self.context.physical_device,
            extent,
        )?;
        // Old swapchain is destroyed after the new one was chained to it.
        self.swapchain = new_swapchain;

        self.framebuffer.recreate(
            &self.render_pass,
            self.swapchain.image_views(),
            self.swapchain.extent(),
        )?;

        log::debug!(
            "Swapchain rebuilt at {}x{}",
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );
        Ok(())
    }

    fn framebuffer_max_extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: MAX_WINDOW_EXTENT.width.max(self.framebuffer.extent().width),
            height: MAX_WINDOW_EXTENT.height.max(self.framebuffer.extent().height),
        }
    }

    fn log_fps(&mut self) {
        self.frame_counter += 1;
        let elapsed = self.last_fps_log.elapsed();
        if elapsed >= FPS_LOG_INTERVAL {
            let fps = self.frame_counter as f64 / elapsed.as_secs_f64();
            log::info!("Window loop: {:.1} fps", fps);
            self.frame_counter = 0;
            self.last_fps_log = Instant::now();
        }
    }

    /// Stop the HMD thread and quiesce the device.
    ///
    /// Called from `Drop` as well; explicit use lets applications shut down
    /// before the engine value goes out of scope.
    pub fn shutdown(&mut self) {
        if let Some(worker) = self.vr_worker.take() {
            worker.stop_and_join();
        }
        if let Err(err) = self.context.wait_idle() {
            log::error!("device_wait_idle failed during shutdown: {err}");
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
        // Remaining fields drop in declaration order: renderer, framebuffer,
        // render pass, swapchain, sync, commands, scene resources, arena,
        // context, window.
    }
}
