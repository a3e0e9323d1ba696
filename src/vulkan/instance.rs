use ash::{ext::debug_utils, khr::surface, vk, Entry, Instance};
use log::warn;
use std::ffi::CStr;

use crate::vulkan::SurfaceProvider;
use crate::{AshError, Result};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Owns the loader entry, the instance, the optional debug messenger and the window surface.
pub struct VulkanInstance {
    entry: Entry,
    instance: Instance,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,
    debug_utils: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    pub fn new<S: SurfaceProvider + ?Sized>(surface_provider: &S, enable_validation: bool) -> Result<Self> {
        unsafe {
            let entry = Entry::load().map_err(|e| {
                AshError::DeviceInitFailed(format!("Failed to load Vulkan entry: {e:?}"))
            })?;

            let validation_enabled = enable_validation && Self::has_validation_layer(&entry)?;
            let layers: Vec<*const std::ffi::c_char> = if validation_enabled {
                vec![VALIDATION_LAYER.as_ptr()]
            } else {
                Vec::new()
            };

            let mut extensions = surface_provider.required_extensions();
            if validation_enabled {
                extensions.push(debug_utils::NAME.as_ptr());
            }

            let app_info = vk::ApplicationInfo::default()
                .application_name(c"ash_forward")
                .application_version(vk::make_api_version(0, 0, 1, 0))
                .engine_name(c"ash_forward")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            let mut debug_create_info = Self::debug_messenger_create_info();
            let mut create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_extension_names(&extensions)
                .enabled_layer_names(&layers);
            if validation_enabled {
                create_info = create_info.push_next(&mut debug_create_info);
            }

            let instance = entry.create_instance(&create_info, None).map_err(|e| {
                log::error!("vkCreateInstance failed: {e:?}");
                AshError::DeviceInitFailed(format!("vkCreateInstance failed: {e:?}"))
            })?;

            let debug_utils = if validation_enabled {
                let loader = debug_utils::Instance::new(&entry, &instance);
                let messenger = loader
                    .create_debug_utils_messenger(&Self::debug_messenger_create_info(), None)
                    .map_err(|e| {
                        AshError::DeviceInitFailed(format!("Failed to create debug messenger: {e:?}"))
                    })?;
                Some((loader, messenger))
            } else {
                None
            };

            let surface = surface_provider.create_surface(&entry, &instance)?;
            let surface_loader = surface::Instance::new(&entry, &instance);

            log::info!("Vulkan instance created (validation: {validation_enabled})");

            Ok(Self {
                entry,
                instance,
                surface_loader,
                surface,
                debug_utils,
            })
        }
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn surface_loader(&self) -> &surface::Instance {
        &self.surface_loader
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    fn has_validation_layer(entry: &Entry) -> Result<bool> {
        let available = unsafe { entry.enumerate_instance_layer_properties() }.map_err(|e| {
            AshError::DeviceInitFailed(format!("Failed to enumerate instance layers: {e:?}"))
        })?;

        let found = available
            .iter()
            .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER));
        if !found {
            warn!("Validation requested but {VALIDATION_LAYER:?} is not installed");
        }
        Ok(found)
    }

    fn debug_messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback))
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }

            if self.surface != vk::SurfaceKHR::null() {
                self.surface_loader.destroy_surface(self.surface, None);
                self.surface = vk::SurfaceKHR::null();
            }

            self.instance.destroy_instance(None);
        }
        log::info!("Vulkan instance destroyed");
    }
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_types: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = if callback_data.is_null() || (*callback_data).p_message.is_null() {
        String::from("<null>")
    } else {
        CStr::from_ptr((*callback_data).p_message)
            .to_string_lossy()
            .into_owned()
    };

    let level = if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else {
        log::Level::Debug
    };

    log::log!(target: "vulkan", level, "[{message_types:?}] {message}");

    vk::FALSE
}
