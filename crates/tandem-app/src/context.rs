//! Application context.

use std::sync::Arc;

use ash::vk;
use tandem_frame::FrameCycle;
use tandem_gpu::{GpuContext, SurfaceContext, Swapchain, VulkanFrameDevice};
use winit::window::Window;

use crate::instance::EngineInstance;

/// Frame cycle driven by the Vulkan backend.
pub type VulkanFrameCycle = FrameCycle<VulkanFrameDevice>;

/// Application context shared across all app methods.
///
/// Owns the window, GPU context, surface and swapchain. The frame cycle and
/// its device live next to it in the runner so the recording step can borrow
/// this context while the cycle is borrowed mutably.
///
/// Dropping the context destroys the swapchain, the surface, the device and
/// the instance, in that order. The frame cycle must be shut down first.
pub struct AppContext {
    /// GPU context with device and queues.
    pub gpu: GpuContext,
    /// Surface context for windowed rendering.
    pub surface: SurfaceContext,
    /// Current swapchain.
    pub swapchain: Swapchain,
    /// Whether vsync is enabled.
    pub vsync: bool,
    /// The window handle. Outlives the surface created from it.
    pub window: Arc<Window>,
    _instance: EngineInstance,
}

impl AppContext {
    /// Create a new application context.
    ///
    /// # Safety
    /// The window must have valid handles.
    pub(crate) unsafe fn new(
        instance: EngineInstance,
        window: Arc<Window>,
        gpu: GpuContext,
        vsync: bool,
    ) -> anyhow::Result<Self> {
        // SAFETY: Caller guarantees window has valid handles
        let surface = unsafe { SurfaceContext::from_window(&gpu, window.as_ref())? };

        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        // SAFETY: GPU context is valid and the surface was just created
        let swapchain = match unsafe { surface.create_swapchain(&gpu, width, height, vsync, None) }
        {
            Ok(swapchain) => swapchain,
            Err(e) => {
                // SAFETY: No swapchain uses the surface
                unsafe { surface.destroy() };
                return Err(e.into());
            }
        };

        tracing::info!(
            "Swapchain created: {}x{} ({} images)",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.images.len()
        );

        Ok(Self {
            gpu,
            surface,
            swapchain,
            vsync,
            window,
            _instance: instance,
        })
    }

    /// Get the current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    /// Get the swapchain width.
    pub fn width(&self) -> u32 {
        self.swapchain.extent.width
    }

    /// Get the swapchain height.
    pub fn height(&self) -> u32 {
        self.swapchain.extent.height
    }

    /// Swapchain image for an acquired index.
    pub fn swapchain_image(&self, image_index: u32) -> Option<vk::Image> {
        self.swapchain.images.get(image_index as usize).copied()
    }

    /// Recreate the swapchain (e.g., after resize).
    ///
    /// # Safety
    /// No frame slot may have work in flight.
    pub(crate) unsafe fn recreate_swapchain(
        &mut self,
        width: u32,
        height: u32,
    ) -> anyhow::Result<()> {
        // SAFETY: Caller guarantees every slot has drained
        unsafe {
            self.surface.recreate_swapchain(
                &self.gpu,
                &mut self.swapchain,
                width,
                height,
                self.vsync,
            )?;
        }
        Ok(())
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        // SAFETY: The frame cycle was shut down before the context is dropped,
        // so nothing references the swapchain or the surface
        unsafe {
            if let Err(e) = self.gpu.wait_idle() {
                tracing::error!("Failed to wait idle: {e}");
            }
            self.swapchain.destroy(&self.surface.swapchain_loader);
            self.surface.destroy();
        }
        tracing::debug!("Swapchain and surface destroyed");
    }
}
