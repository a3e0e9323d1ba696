//! Error types for the engine core.
//!
//! This module provides a unified error type [`AshError`] and a convenient [`Result`] alias.
//! Every variant except [`AshError::SwapchainOutOfDate`] is fatal: the failing call site logs it
//! and hands it up unchanged, and nothing in the crate retries.

use std::fmt;

use ash::vk;

use crate::vulkan::transition::ImageLayout;

/// Main error type for the engine.
#[derive(Debug)]
pub enum AshError {
    /// A Vulkan API call failed.
    VulkanError(String),
    /// An I/O operation failed (shader or pixel blobs read from disk).
    IoError(std::io::Error),
    /// Instance or device initialization failed, or a required capability is missing.
    DeviceInitFailed(String),
    /// Swapchain creation failed.
    SwapchainCreationFailed(String),
    /// Failed to acquire the next swapchain image for a reason other than staleness.
    FrameAcquisitionFailed(String),
    /// Swapchain is out of date or suboptimal. Handled inside the backbuffer.
    SwapchainOutOfDate(String),
    /// A handle or name did not resolve to a live resource.
    ResourceNotFound(String),
    /// The (old, new) layout pair has no entry in the transition table.
    UnsupportedTransition { from: ImageLayout, to: ImageLayout },
    /// An operation was called on a resource in the wrong state.
    PreconditionFailed(String),
    /// A format does not support the requested view, usage or filter.
    UnsupportedFormat(String),
    /// A GPU memory allocation or pool growth failed.
    AllocationFailed(String),
}

impl AshError {
    /// Wraps a native result code with the name of the operation that produced it.
    pub fn vk(operation: &str, result: vk::Result) -> Self {
        Self::VulkanError(format!("{operation} failed: {result:?}"))
    }
}

impl fmt::Display for AshError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::VulkanError(msg) => write!(f, "Vulkan error: {msg}"),
            Self::IoError(err) => write!(f, "IO error: {err}"),
            Self::DeviceInitFailed(msg) => write!(f, "Device init failed: {msg}"),
            Self::SwapchainCreationFailed(msg) => write!(f, "Swapchain creation failed: {msg}"),
            Self::FrameAcquisitionFailed(msg) => write!(f, "Frame acquisition failed: {msg}"),
            Self::SwapchainOutOfDate(msg) => write!(f, "Swapchain out of date: {msg}"),
            Self::ResourceNotFound(msg) => write!(f, "Resource not found: {msg}"),
            Self::UnsupportedTransition { from, to } => {
                write!(f, "Unsupported layout transition: {from:?} -> {to:?}")
            }
            Self::PreconditionFailed(msg) => write!(f, "Precondition failed: {msg}"),
            Self::UnsupportedFormat(msg) => write!(f, "Unsupported format: {msg}"),
            Self::AllocationFailed(msg) => write!(f, "Allocation failed: {msg}"),
        }
    }
}

impl std::error::Error for AshError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoError(err) => Some(err),
            _ => None,
        }
    }
}

/// Convenient Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, AshError>;

impl From<std::io::Error> for AshError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err)
    }
}

impl From<vk::Result> for AshError {
    fn from(result: vk::Result) -> Self {
        Self::VulkanError(format!("{result:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AshError::VulkanError("test".to_string());
        assert!(err.to_string().contains("Vulkan error"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: AshError = io_err.into();
        assert!(matches!(err, AshError::IoError(_)));
    }

    #[test]
    fn test_vk_helper_names_operation_and_code() {
        let err = AshError::vk("vkCreateDescriptorPool", vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        let text = err.to_string();
        assert!(text.contains("vkCreateDescriptorPool"));
        assert!(text.contains("ERROR_OUT_OF_HOST_MEMORY"));
    }

    #[test]
    fn test_unsupported_transition_display() {
        let err = AshError::UnsupportedTransition {
            from: ImageLayout::ColourAttachment,
            to: ImageLayout::Undefined,
        };
        assert!(err.to_string().contains("ColourAttachment -> Undefined"));
    }
}
