//! `TandemApp` trait definition.

use crate::context::{AppContext, VulkanFrameCycle};
use crate::frame::FrameContext;
use winit::event::WindowEvent;

/// Trait for Tandem applications.
///
/// The framework owns the window, the GPU context, the swapchain and the
/// frame cycle. The application records commands into the frame it is given
/// and hands resources it wants released to the deletion queues.
pub trait TandemApp: Sized {
    /// Initialize the application.
    ///
    /// Called once after the window, GPU context, swapchain and frame cycle
    /// exist. Resources that live for the whole run can be registered with
    /// [`tandem_frame::FrameCycle::schedule_global`] so they are released at
    /// shutdown, after the GPU has drained.
    fn init(ctx: &mut AppContext, frames: &mut VulkanFrameCycle) -> anyhow::Result<Self>;

    /// Update application state.
    ///
    /// Called once per logical frame before rendering.
    ///
    /// # Arguments
    /// * `ctx` - Application context with GPU and window access
    /// * `dt` - Delta time in seconds since last frame
    fn update(&mut self, ctx: &AppContext, dt: f32);

    /// Record a frame.
    ///
    /// The command buffer is already begun and is ended, submitted and
    /// presented by the framework. The swapchain image arrives in
    /// `UNDEFINED` layout and must be left in `PRESENT_SRC_KHR`.
    ///
    /// Returning an error is fatal and stops the event loop.
    fn render(&mut self, ctx: &AppContext, frame: &mut FrameContext<'_>) -> anyhow::Result<()>;

    /// Handle window resize.
    ///
    /// Called after the swapchain was recreated, with no frame in flight.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle window events.
    ///
    /// Return `true` if the event was handled and should not be processed
    /// further.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Cleanup resources before shutdown.
    ///
    /// Called once every frame slot has drained, before the deletion queues
    /// are flushed.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
