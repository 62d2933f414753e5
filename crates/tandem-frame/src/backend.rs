//! Traits connecting the frame cycle to a GPU.
//!
//! [`FrameDevice`] stands for the logical device and its graphics queue,
//! [`Presenter`] for the swapchain. The frame cycle only observes the GPU
//! through the fences and semaphores these traits hand out.

use std::time::Duration;

/// Result of a bounded fence wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceStatus {
    /// The GPU signaled the fence.
    Signaled,
    /// The bound elapsed first.
    TimedOut,
}

/// Result of asking the swapchain for the next image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired; the semaphore will be signaled when it is released
    /// by the presentation engine.
    Acquired {
        image_index: u32,
        /// The swapchain still works but no longer matches the surface.
        suboptimal: bool,
    },
    /// No image was acquired; the swapchain must be recreated.
    OutOfDate,
}

/// Result of queueing an image for presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    /// Whether the swapchain should be recreated before the next frame.
    pub const fn needs_resize(self) -> bool {
        !matches!(self, Self::Presented)
    }
}

/// Synchronization attached to one submission.
pub struct SubmitSync<'a, D: FrameDevice + ?Sized> {
    /// Waited on before colour output begins.
    pub wait_semaphore: &'a D::Semaphore,
    /// Signaled once the submitted work completes.
    pub signal_semaphore: &'a D::Semaphore,
    /// Signaled once the submitted work completes, for the CPU.
    pub fence: &'a D::Fence,
}

/// Device and queue provider.
///
/// Creation calls either succeed or report an error that the caller treats
/// as fatal. Destroy calls must only be made once the object is no longer in
/// use by the GPU.
pub trait FrameDevice {
    /// GPU to CPU signal.
    type Fence;
    /// GPU to GPU ordering signal.
    type Semaphore;
    /// Reusable command recording context.
    type Recorder;
    /// Backend failure.
    type Error: std::error::Error + Send + Sync + 'static;

    fn create_fence(&mut self, signaled: bool) -> Result<Self::Fence, Self::Error>;
    fn create_semaphore(&mut self) -> Result<Self::Semaphore, Self::Error>;
    fn create_recorder(&mut self) -> Result<Self::Recorder, Self::Error>;

    /// Block until `fence` is signaled or `timeout` elapses.
    fn wait_fence(
        &mut self,
        fence: &Self::Fence,
        timeout: Duration,
    ) -> Result<FenceStatus, Self::Error>;

    /// Return `fence` to the unsignaled state.
    fn reset_fence(&mut self, fence: &Self::Fence) -> Result<(), Self::Error>;

    /// Return `recorder` to the empty, ready-to-record state.
    fn reset_recorder(&mut self, recorder: &mut Self::Recorder) -> Result<(), Self::Error>;

    fn begin_recording(&mut self, recorder: &mut Self::Recorder) -> Result<(), Self::Error>;

    /// Finalize the recording so it can be submitted.
    fn end_recording(&mut self, recorder: &mut Self::Recorder) -> Result<(), Self::Error>;

    /// Submit a finalized recording to the graphics queue.
    fn submit(
        &mut self,
        recorder: &Self::Recorder,
        sync: SubmitSync<'_, Self>,
    ) -> Result<(), Self::Error>;

    fn destroy_fence(&mut self, fence: Self::Fence);
    fn destroy_semaphore(&mut self, semaphore: Self::Semaphore);
    fn destroy_recorder(&mut self, recorder: Self::Recorder);
}

/// Swapchain provider.
///
/// `OutOfDate` and `Suboptimal` outcomes are routed to the resize path by the
/// caller; only genuine failures come back as errors.
pub trait Presenter<D: FrameDevice> {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Acquire the next presentable image, signaling `signal` when it is ready.
    fn acquire(
        &mut self,
        timeout: Duration,
        signal: &D::Semaphore,
    ) -> Result<AcquireOutcome, Self::Error>;

    /// Present `image_index` once `wait` is signaled.
    fn present(
        &mut self,
        image_index: u32,
        wait: &D::Semaphore,
    ) -> Result<PresentOutcome, Self::Error>;
}
