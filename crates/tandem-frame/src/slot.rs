//! Per-frame slot resources.

use crate::backend::FrameDevice;
use crate::deletion::DeletionQueue;

/// Resources owned by one position of the frame ring.
///
/// At most one submission is outstanding per slot: a new submission into the
/// slot must wait until the fence from the previous one has signaled.
pub struct FrameSlot<D: FrameDevice> {
    pub(crate) index: usize,
    pub(crate) recorder: D::Recorder,
    /// Signaled when this slot's last submission completes
    pub(crate) in_flight: D::Fence,
    /// Signaled when the acquired swapchain image is ready
    pub(crate) image_acquired: D::Semaphore,
    /// Signaled when rendering into the image is complete
    pub(crate) render_finished: D::Semaphore,
    pub(crate) deletions: DeletionQueue,
    pub(crate) submissions: u64,
    /// False between a fence reset and the submission that signals it again
    pub(crate) fence_armed: bool,
}

impl<D: FrameDevice> FrameSlot<D> {
    /// Create the slot's primitives.
    ///
    /// The fence starts signaled so the first wait on a fresh slot returns
    /// immediately. On failure the primitives created so far are destroyed and
    /// the name of the failing primitive is returned with the error.
    pub fn new(device: &mut D, index: usize) -> Result<Self, (&'static str, D::Error)> {
        let in_flight = device.create_fence(true).map_err(|e| ("fence", e))?;

        let image_acquired = match device.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                device.destroy_fence(in_flight);
                return Err(("image-acquired semaphore", e));
            }
        };

        let render_finished = match device.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                device.destroy_semaphore(image_acquired);
                device.destroy_fence(in_flight);
                return Err(("render-finished semaphore", e));
            }
        };

        let recorder = match device.create_recorder() {
            Ok(recorder) => recorder,
            Err(e) => {
                device.destroy_semaphore(render_finished);
                device.destroy_semaphore(image_acquired);
                device.destroy_fence(in_flight);
                return Err(("recorder", e));
            }
        };

        Ok(Self {
            index,
            recorder,
            in_flight,
            image_acquired,
            render_finished,
            deletions: DeletionQueue::new(),
            submissions: 0,
            fence_armed: true,
        })
    }

    /// Reset the recorder to empty-and-ready.
    ///
    /// Only valid once this slot's fence has been observed signaled. The
    /// synchronization primitives themselves are reused unchanged.
    pub fn reset(&mut self, device: &mut D) -> Result<(), D::Error> {
        device.reset_recorder(&mut self.recorder)
    }

    /// Position of this slot in the ring.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Fence signaled when this slot's last submission completes.
    pub fn fence(&self) -> &D::Fence {
        &self.in_flight
    }

    /// Semaphore the acquire call signals.
    pub fn image_acquired(&self) -> &D::Semaphore {
        &self.image_acquired
    }

    /// Semaphore the submission signals and presentation waits on.
    pub fn render_finished(&self) -> &D::Semaphore {
        &self.render_finished
    }

    pub fn recorder(&self) -> &D::Recorder {
        &self.recorder
    }

    /// Private deletion queue, flushed the next time this slot is reclaimed.
    pub fn deletion_queue(&self) -> &DeletionQueue {
        &self.deletions
    }

    pub fn deletion_queue_mut(&mut self) -> &mut DeletionQueue {
        &mut self.deletions
    }

    /// Whether the fence is signaled or will be signaled by outstanding work.
    ///
    /// A slot whose fence was reset but whose submission then failed has
    /// nothing in flight, and its fence will never signal on its own.
    pub fn fence_armed(&self) -> bool {
        self.fence_armed
    }

    /// Number of submissions made through this slot.
    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    /// Destroy the slot's primitives.
    ///
    /// The fence must have been observed signaled and the deletion queue
    /// flushed beforehand.
    pub fn destroy(self, device: &mut D) {
        let Self {
            recorder,
            in_flight,
            image_acquired,
            render_finished,
            ..
        } = self;

        device.destroy_recorder(recorder);
        device.destroy_semaphore(render_finished);
        device.destroy_semaphore(image_acquired);
        device.destroy_fence(in_flight);
    }
}
