use ash::{vk, Entry, Instance};
use std::ffi::c_char;
use winit::window::Window;

#[cfg(any(target_os = "windows", target_os = "linux"))]
use raw_window_handle::{HasWindowHandle, RawWindowHandle};

use crate::{AshError, Result};

/// Platform hook the renderer uses to obtain a presentable surface.
pub trait SurfaceProvider {
    /// # Safety
    /// The surface must remain valid for the lifetime of `instance`.
    unsafe fn create_surface(&self, entry: &Entry, instance: &Instance) -> Result<vk::SurfaceKHR>;

    /// Instance extensions the surface type needs.
    fn required_extensions(&self) -> Vec<*const c_char>;

    /// Current drawable size in pixels.
    fn physical_size(&self) -> (u32, u32);
}

/// `winit` window surface.
pub struct WindowSurfaceProvider<'a> {
    window: &'a Window,
}

impl<'a> WindowSurfaceProvider<'a> {
    pub fn new(window: &'a Window) -> Self {
        Self { window }
    }
}

impl SurfaceProvider for WindowSurfaceProvider<'_> {
    fn required_extensions(&self) -> Vec<*const c_char> {
        #[allow(unused_mut)]
        let mut extensions = vec![ash::khr::surface::NAME.as_ptr()];

        #[cfg(target_os = "windows")]
        extensions.push(ash::khr::win32_surface::NAME.as_ptr());

        #[cfg(target_os = "linux")]
        {
            extensions.push(ash::khr::xlib_surface::NAME.as_ptr());
            extensions.push(ash::khr::wayland_surface::NAME.as_ptr());
        }

        extensions
    }

    unsafe fn create_surface(&self, entry: &Entry, instance: &Instance) -> Result<vk::SurfaceKHR> {
        create_surface_impl(entry, instance, self.window)
    }

    fn physical_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }
}

#[cfg(target_os = "windows")]
unsafe fn create_surface_impl(
    entry: &Entry,
    instance: &Instance,
    window: &Window,
) -> Result<vk::SurfaceKHR> {
    use ash::khr::win32_surface;

    match window.window_handle().map(|h| h.as_raw()) {
        Ok(RawWindowHandle::Win32(handle)) => {
            let loader = win32_surface::Instance::new(entry, instance);
            let hinstance = handle.hinstance.map(|h| h.get()).unwrap_or(0);
            let create_info = vk::Win32SurfaceCreateInfoKHR::default()
                .hwnd(handle.hwnd.get() as vk::HWND)
                .hinstance(hinstance as vk::HINSTANCE);

            loader
                .create_win32_surface(&create_info, None)
                .map_err(|e| AshError::vk("vkCreateWin32SurfaceKHR", e))
        }
        _ => Err(AshError::DeviceInitFailed(
            "Window does not expose a Win32 handle".to_string(),
        )),
    }
}

#[cfg(target_os = "linux")]
unsafe fn create_surface_impl(
    entry: &Entry,
    instance: &Instance,
    window: &Window,
) -> Result<vk::SurfaceKHR> {
    use ash::khr::{wayland_surface, xlib_surface};
    use raw_window_handle::{HasDisplayHandle, RawDisplayHandle};

    let window_handle = window.window_handle().map(|h| h.as_raw());
    let display_handle = window.display_handle().map(|h| h.as_raw());

    match (window_handle, display_handle) {
        (Ok(RawWindowHandle::Wayland(handle)), Ok(RawDisplayHandle::Wayland(display))) => {
            let loader = wayland_surface::Instance::new(entry, instance);
            let create_info = vk::WaylandSurfaceCreateInfoKHR::default()
                .display(display.display.as_ptr())
                .surface(handle.surface.as_ptr());
            loader
                .create_wayland_surface(&create_info, None)
                .map_err(|e| AshError::vk("vkCreateWaylandSurfaceKHR", e))
        }
        (Ok(RawWindowHandle::Xlib(handle)), Ok(RawDisplayHandle::Xlib(display))) => {
            let loader = xlib_surface::Instance::new(entry, instance);
            let dpy = display
                .display
                .map(|d| d.as_ptr())
                .unwrap_or(std::ptr::null_mut());
            let create_info = vk::XlibSurfaceCreateInfoKHR::default()
                .dpy(dpy as *mut _)
                .window(handle.window);
            loader
                .create_xlib_surface(&create_info, None)
                .map_err(|e| AshError::vk("vkCreateXlibSurfaceKHR", e))
        }
        _ => Err(AshError::DeviceInitFailed(
            "Window does not expose a Wayland or Xlib handle".to_string(),
        )),
    }
}

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
unsafe fn create_surface_impl(
    _entry: &Entry,
    _instance: &Instance,
    _window: &Window,
) -> Result<vk::SurfaceKHR> {
    Err(AshError::DeviceInitFailed(
        "No window surface support on this platform".to_string(),
    ))
}
