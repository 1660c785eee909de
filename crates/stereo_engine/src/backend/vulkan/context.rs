//! Vulkan context management
//!
//! Instance, surface, physical device selection and logical device creation.
//! The context hands out three queues from a single graphics+compute family:
//! one for the window render loop, one for the HMD render loop, and one for
//! presentation, so the two loops never contend on queue submission.

use std::ffi::{CStr, CString};

#[cfg(debug_assertions)]
use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::vk;
use ash::{Device, Entry, Instance};

use crate::backend::vulkan::{VulkanError, VulkanResult};
use crate::platform::Window;

/// Number of device queues requested from the graphics family: window
/// rendering, HMD rendering, and presentation.
pub const QUEUE_COUNT: u32 = 3;

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    /// Debug utilities extension (debug builds)
    #[cfg(debug_assertions)]
    pub debug_utils: Option<DebugUtils>,
    /// Debug messenger handle (debug builds)
    #[cfg(debug_assertions)]
    pub debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl VulkanInstance {
    /// Create a new Vulkan instance with validation layers
    pub fn new(window: &Window, app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }.map_err(|e| {
            VulkanError::InitializationFailed(format!("Failed to load Vulkan: {:?}", e))
        })?;

        let app_name_cstr = CString::new(app_name).unwrap();
        let engine_name_cstr = CString::new("StereoEngine").unwrap();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        // Get required extensions from GLFW
        let required_extensions = window.required_instance_extensions().ok_or_else(|| {
            VulkanError::InitializationFailed("GLFW reported no Vulkan support".to_string())
        })?;

        let cstr_extensions: Vec<CString> = required_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()).unwrap())
            .collect();

        #[allow(unused_mut)] // Mutable in debug builds for adding debug extensions
        let mut extensions: Vec<*const i8> =
            cstr_extensions.iter().map(|ext| ext.as_ptr()).collect();

        #[cfg(debug_assertions)]
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_names = if cfg!(debug_assertions) && enable_validation {
            vec![CString::new("VK_LAYER_KHRONOS_validation").unwrap()]
        } else {
            vec![]
        };

        let layer_names_ptrs: Vec<*const i8> =
            layer_names.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names_ptrs);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        #[cfg(debug_assertions)]
        let (debug_utils, debug_messenger) = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let debug_messenger = Self::setup_debug_messenger(&debug_utils)?;
            (Some(debug_utils), Some(debug_messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            #[cfg(debug_assertions)]
            debug_utils,
            #[cfg(debug_assertions)]
            debug_messenger,
        })
    }

    #[cfg(debug_assertions)]
    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            #[cfg(debug_assertions)]
            if let (Some(debug_utils), Some(debug_messenger)) =
                (&self.debug_utils, &self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(*debug_messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Debug callback for validation layers
#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let callback_data = *callback_data;
    let message = CStr::from_ptr(callback_data.p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Index of the queue family used for everything
    pub queue_family: u32,
}

impl PhysicalDeviceInfo {
    /// Select a physical device with a queue family that supports graphics,
    /// compute and presentation and can supply [`QUEUE_COUNT`] queues.
    pub fn select_suitable_device(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let devices = unsafe {
            instance
                .enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };

        for device in devices {
            if let Ok(device_info) = Self::evaluate_device(instance, device, surface, surface_loader)
            {
                log::info!("Selected GPU: {}", unsafe {
                    CStr::from_ptr(device_info.properties.device_name.as_ptr()).to_string_lossy()
                });
                return Ok(device_info);
            }
        }

        Err(VulkanError::InitializationFailed(
            "No suitable GPU found".to_string(),
        ))
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        // One family must cover graphics + compute, presentation, and have
        // enough queues for both render loops plus presentation.
        let required_flags = vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE;
        let mut queue_family = None;

        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;

            if !family.queue_flags.contains(required_flags) {
                continue;
            }
            if family.queue_count < QUEUE_COUNT {
                continue;
            }

            let present_support = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, index, surface)
                    .map_err(VulkanError::Api)?
            };

            if present_support {
                queue_family = Some(index);
                break;
            }
        }

        let queue_family = queue_family.ok_or_else(|| {
            VulkanError::InitializationFailed(
                "No queue family with graphics+compute, present support and 3 queues".to_string(),
            )
        })?;

        // Check device extensions support
        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };

        let required_extensions = [SwapchainLoader::name()];
        let has_required_extensions = required_extensions.iter().all(|required| {
            extensions.iter().any(|available| {
                let extension_name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
                extension_name == *required
            })
        });

        if !has_required_extensions {
            return Err(VulkanError::InitializationFailed(
                "Required device extensions not supported".to_string(),
            ));
        }

        Ok(Self {
            device,
            properties,
            features,
            queue_family,
        })
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Queue used by the window render loop
    pub window_queue: vk::Queue,
    /// Queue used by the HMD render loop
    pub vr_queue: vk::Queue,
    /// Queue used for swapchain presentation
    pub present_queue: vk::Queue,
    /// Index of the shared queue family
    pub queue_family: u32,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Create a logical device with three queues from the shared family.
    pub fn new(instance: &Instance, physical_device_info: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let priorities = [1.0f32; QUEUE_COUNT as usize];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(physical_device_info.queue_family)
            .queue_priorities(&priorities)
            .build()];

        let required_extensions = [SwapchainLoader::name().as_ptr()];

        let device_features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(true)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features);

        let device = unsafe {
            instance
                .create_device(physical_device_info.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let window_queue = unsafe { device.get_device_queue(physical_device_info.queue_family, 0) };
        let vr_queue = unsafe { device.get_device_queue(physical_device_info.queue_family, 1) };
        let present_queue = unsafe { device.get_device_queue(physical_device_info.queue_family, 2) };

        let swapchain_loader = SwapchainLoader::new(instance, &device);

        Ok(Self {
            device,
            window_queue,
            vr_queue,
            present_queue,
            queue_family: physical_device_info.queue_family,
            swapchain_loader,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            // Ensure device is idle before destruction
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Main Vulkan context that owns the instance, surface and logical device.
///
/// Declared in reverse creation order so field drops tear down the surface,
/// then the device, then the instance.
pub struct VulkanContext {
    /// Vulkan surface for the window swapchain
    pub surface: vk::SurfaceKHR,
    /// Surface extension loader
    pub surface_loader: Surface,
    /// Selected physical device information
    pub physical_device: PhysicalDeviceInfo,
    /// Logical device and queues
    pub device: LogicalDevice,
    /// Vulkan instance and debug utilities
    pub instance: VulkanInstance,
}

impl VulkanContext {
    /// Create a new Vulkan context for the window
    pub fn new(window: &Window, app_name: &str) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(window, app_name, cfg!(debug_assertions))?;

        // Create surface using GLFW's built-in method
        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface = window
            .create_vulkan_surface(instance.instance.handle())
            .map_err(|e| VulkanError::InitializationFailed(format!("Surface creation: {}", e)))?;

        let physical_device =
            PhysicalDeviceInfo::select_suitable_device(&instance.instance, surface, &surface_loader)?;

        let device = LogicalDevice::new(&instance.instance, &physical_device)?;

        Ok(Self {
            surface,
            surface_loader,
            physical_device,
            device,
            instance,
        })
    }

    /// Get a reference to the Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Get the raw Device handle
    pub fn raw_device(&self) -> Device {
        self.device.device.clone()
    }

    /// Get the shared queue family index
    pub fn queue_family(&self) -> u32 {
        self.device.queue_family
    }

    /// Minimum alignment for dynamic/strided uniform buffer offsets.
    pub fn uniform_buffer_alignment(&self) -> vk::DeviceSize {
        self.physical_device
            .properties
            .limits
            .min_uniform_buffer_offset_alignment
    }

    /// Block until the device has finished all submitted work.
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .device
                .device_wait_idle()
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device.device_wait_idle();
            self.surface_loader.destroy_surface(self.surface, None);
        }
        // Remaining fields drop in declaration order: device before instance.
    }
}
