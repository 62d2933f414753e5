//! Per-frame context for rendering.

use ash::vk;
use tandem_frame::DeletionQueue;

/// Context for the current frame being recorded.
pub struct FrameContext<'a> {
    /// Command buffer for recording rendering commands.
    pub command_buffer: vk::CommandBuffer,
    /// Index of the acquired swapchain image.
    pub image_index: u32,
    /// The swapchain image for this frame.
    pub swapchain_image: vk::Image,
    /// Delta time since last frame in seconds.
    pub dt: f32,
    /// Logical frame number.
    pub frame_number: u64,
    /// Frame slot the commands are recorded into.
    pub slot_index: usize,
    deletions: &'a mut DeletionQueue,
}

impl<'a> FrameContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        command_buffer: vk::CommandBuffer,
        image_index: u32,
        swapchain_image: vk::Image,
        dt: f32,
        frame_number: u64,
        slot_index: usize,
        deletions: &'a mut DeletionQueue,
    ) -> Self {
        Self {
            command_buffer,
            image_index,
            swapchain_image,
            dt,
            frame_number,
            slot_index,
            deletions,
        }
    }

    /// Release a resource used by this frame once the GPU has finished it.
    ///
    /// The action runs when this frame's slot is next reused, or at shutdown.
    pub fn defer<F>(&mut self, action: F)
    where
        F: FnOnce() + 'static,
    {
        self.deletions.schedule(action);
    }

    /// Fallible form of [`FrameContext::defer`]. An error is fatal when the
    /// queue is flushed.
    pub fn defer_fallible<F, E>(&mut self, action: F)
    where
        F: FnOnce() -> Result<(), E> + 'static,
        E: Into<tandem_frame::BoxError>,
    {
        self.deletions.schedule_fallible(action);
    }
}
