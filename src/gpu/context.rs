// gpu/context.rs — instance, device and queue acquisition.
//
// RESPONSIBILITIES
// ─────────────────
// 1. Create the Vulkan instance, enabling VK_LAYER_KHRONOS_validation when
//    it is installed and the caller asked for it. A missing layer degrades
//    silently — recovery works the same without diagnostics.
// 2. Route validation messages: VERBOSE dropped, ERROR to stderr, the rest
//    to stdout, each line prefixed "Validation layer: ".
// 3. Pick the first physical device exposing a compute-capable queue
//    family. No scoring — for a one-shot offline dispatch any compute
//    queue is as good as any other.
// 4. Create the logical device (one queue, priority 1.0, no optional
//    features) and the compute command pool.
//
// Whether validation ended up enabled is an explicit field on the context
// (`validation_enabled`), consulted again at device creation — not a
// process-wide flag.
//
// TEARDOWN
// ─────────
// `Drop` releases command pool → device → debug messenger → instance, the
// strict reverse of creation. Construction failures unwind whatever was
// created before returning, so an error never leaks a live handle.

use std::ffi::{c_void, CStr};

use ash::ext::debug_utils;
use ash::vk;

use crate::gpu::GpuError;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Owns the instance-level diagnostics messenger.
struct DebugMessenger {
    loader: debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

/// Owns every context-lifetime Vulkan object: instance, optional debug
/// messenger, logical device, compute queue and command pool.
///
/// Create once per run via [`DeviceContext::new`]; drop exactly once at the
/// end (or immediately on a later setup failure — every other GPU object in
/// this crate borrows the context and is dropped before it).
pub struct DeviceContext {
    pub physical_device: vk::PhysicalDevice,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_family_index: u32,
    pub device: ash::Device,
    pub queue: vk::Queue,
    pub command_pool: vk::CommandPool,
    /// Whether the validation layer was requested AND available.
    pub validation_enabled: bool,
    debug: Option<DebugMessenger>,
    instance: ash::Instance,
    /// Keeps the Vulkan loader library alive until everything above is
    /// destroyed. Never accessed directly.
    _entry: ash::Entry,
}

/// Validation message hook: drop VERBOSE, errors to stderr, rest to stdout.
unsafe extern "system" fn validation_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE) {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        eprintln!("Validation layer: {message}");
    } else {
        println!("Validation layer: {message}");
    }
    vk::FALSE
}

/// Messenger configuration: all severities registered (VERBOSE is filtered
/// inside the callback, keeping the filter policy in one place), all
/// message types.
fn messenger_info<'a>() -> vk::DebugUtilsMessengerCreateInfoEXT<'a> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
        )
        .pfn_user_callback(Some(validation_callback))
}

/// Index of the first queue family supporting compute, if any.
fn find_compute_family(instance: &ash::Instance, device: vk::PhysicalDevice) -> Option<u32> {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::COMPUTE))
        .map(|index| index as u32)
}

impl DeviceContext {
    /// Acquire the GPU: instance (with best-effort validation when
    /// `enable_validation`), first compute-capable physical device, logical
    /// device, queue and command pool.
    ///
    /// # Errors
    /// [`GpuError::Loader`] if no Vulkan runtime is present,
    /// [`GpuError::NoSuitableDevice`] if nothing exposes a compute queue,
    /// [`GpuError::Setup`] on any native creation failure. Partial state is
    /// fully released before the error is returned.
    pub fn new(enable_validation: bool) -> Result<Self, GpuError> {
        let entry = unsafe { ash::Entry::load() }.map_err(GpuError::Loader)?;

        let validation_enabled = enable_validation && has_validation_layer(&entry);

        // ----- instance -------------------------------------------------
        let app_info = vk::ApplicationInfo::default()
            .application_name(c"unveil")
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"unveil")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_2);

        let layer_names = [VALIDATION_LAYER.as_ptr()];
        let extension_names = [debug_utils::NAME.as_ptr()];
        // Chained into instance creation so create/destroy of the instance
        // itself is also covered by the messenger.
        let mut chained_messenger = messenger_info();

        let mut create_info = vk::InstanceCreateInfo::default().application_info(&app_info);
        if validation_enabled {
            create_info = create_info
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names)
                .push_next(&mut chained_messenger);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(|r| GpuError::setup("vkCreateInstance", r))?;

        // ----- debug messenger -----------------------------------------
        let debug = if validation_enabled {
            let loader = debug_utils::Instance::new(&entry, &instance);
            match unsafe { loader.create_debug_utils_messenger(&messenger_info(), None) } {
                Ok(messenger) => Some(DebugMessenger { loader, messenger }),
                Err(r) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(GpuError::setup("vkCreateDebugUtilsMessengerEXT", r));
                }
            }
        } else {
            None
        };

        // Everything below unwinds through this on failure.
        let cleanup_instance = |debug: &Option<DebugMessenger>| unsafe {
            if let Some(d) = debug {
                d.loader.destroy_debug_utils_messenger(d.messenger, None);
            }
            instance.destroy_instance(None);
        };

        // ----- physical device -----------------------------------------
        let physical_devices = match unsafe { instance.enumerate_physical_devices() } {
            Ok(devices) => devices,
            Err(r) => {
                cleanup_instance(&debug);
                return Err(GpuError::setup("vkEnumeratePhysicalDevices", r));
            }
        };

        // First device with a compute queue wins — no scoring.
        let picked = physical_devices
            .into_iter()
            .find_map(|pd| find_compute_family(&instance, pd).map(|family| (pd, family)));
        let (physical_device, queue_family_index) = match picked {
            Some(found) => found,
            None => {
                cleanup_instance(&debug);
                return Err(GpuError::NoSuitableDevice);
            }
        };

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let device_name = properties
            .device_name_as_c_str()
            .unwrap_or(c"<unnamed>")
            .to_string_lossy();
        eprintln!(
            "[unveil] Vulkan device: {device_name} (compute queue family {queue_family_index}, \
             validation {})",
            if validation_enabled { "on" } else { "off" }
        );

        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        // ----- logical device ------------------------------------------
        let queue_priorities = [1.0f32];
        let queue_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family_index)
            .queue_priorities(&queue_priorities)];
        let features = vk::PhysicalDeviceFeatures::default();

        let mut device_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_features(&features);
        if validation_enabled {
            // Ignored by modern loaders but kept for layer-aware drivers.
            device_info = device_info.enabled_layer_names(&layer_names);
        }

        let device = match unsafe { instance.create_device(physical_device, &device_info, None) }
        {
            Ok(device) => device,
            Err(r) => {
                cleanup_instance(&debug);
                return Err(GpuError::setup("vkCreateDevice", r));
            }
        };

        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        // ----- command pool --------------------------------------------
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);
        let command_pool = match unsafe { device.create_command_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(r) => {
                unsafe { device.destroy_device(None) };
                cleanup_instance(&debug);
                return Err(GpuError::setup("vkCreateCommandPool", r));
            }
        };

        Ok(DeviceContext {
            physical_device,
            memory_properties,
            queue_family_index,
            device,
            queue,
            command_pool,
            validation_enabled,
            debug,
            instance,
            _entry: entry,
        })
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            if let Some(debug) = &self.debug {
                debug.loader.destroy_debug_utils_messenger(debug.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// True when VK_LAYER_KHRONOS_validation is installed.
fn has_validation_layer(entry: &ash::Entry) -> bool {
    let layers = match unsafe { entry.enumerate_instance_layer_properties() } {
        Ok(layers) => layers,
        Err(_) => return false,
    };
    layers.iter().any(|layer| {
        layer
            .layer_name_as_c_str()
            .is_ok_and(|name| name == VALIDATION_LAYER)
    })
}
