//! Vulkan backend for the Tandem frame pacer.
//!
//! This crate provides:
//! - Vulkan instance and device management
//! - GPU capability detection
//! - Memory allocation via gpu-allocator
//! - Command pool and synchronization helpers
//! - Surface and swapchain handling
//! - [`VulkanFrameDevice`] and [`SwapchainPresenter`], the Vulkan side of the
//!   frame cycle traits

pub mod capabilities;
pub mod command;
pub mod context;
pub mod error;
pub mod frame_device;
pub mod instance;
pub mod memory;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use capabilities::{GpuCapabilities, GpuVendor};
pub use context::{GpuContext, GpuContextBuilder};
pub use error::{GpuError, Result};
pub use frame_device::{CommandRecorder, SwapchainPresenter, VulkanFrameDevice};
pub use memory::{GpuAllocator, GpuBuffer};
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use swapchain::Swapchain;
pub use sync::{create_fence, create_semaphore};

pub use gpu_allocator::MemoryLocation;
