//! Frame cycle controller.
//!
//! Drives one logical frame at a time through the ring:
//!
//! ```text
//! select -> wait -> reclaim -> rearm -> acquire -> record -> submit -> present -> advance
//! ```
//!
//! The fence wait is the only point where the CPU blocks on the GPU. Slots
//! are serialized by their fence; different slots overlap on the GPU, which
//! lets the CPU record frame `k + 1` while the GPU still executes frame `k`.

use tandem_core::FrameConfig;

use crate::backend::{
    AcquireOutcome, FenceStatus, FrameDevice, PresentOutcome, Presenter, SubmitSync,
};
use crate::deletion::DeletionQueue;
use crate::error::{BoxError, FrameError, FrameStep, Result};
use crate::ring::FrameRing;

/// Identifies the frame handed to the recording step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameInfo {
    /// Logical frame counter.
    pub frame_number: u64,
    /// Slot the frame is recorded into.
    pub slot_index: usize,
    /// Acquired swapchain image.
    pub image_index: u32,
}

/// What the recording step gets to work with.
pub struct FrameRecording<'a, D: FrameDevice> {
    /// Recorder, already begun; it is finalized after the step returns.
    pub recorder: &'a mut D::Recorder,
    /// Private queue of the slot; flushed the next time the slot is reclaimed.
    pub deletions: &'a mut DeletionQueue,
    pub info: FrameInfo,
}

impl<D: FrameDevice> FrameRecording<'_, D> {
    /// Release something once the GPU is done with this frame.
    pub fn schedule<F>(&mut self, action: F)
    where
        F: FnOnce() + 'static,
    {
        self.deletions.schedule(action);
    }

    pub fn schedule_fallible<F, E>(&mut self, action: F)
    where
        F: FnOnce() -> std::result::Result<(), E> + 'static,
        E: Into<BoxError>,
    {
        self.deletions.schedule_fallible(action);
    }
}

/// Result of a frame that did not fail fatally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and presented.
    Presented { frame_number: u64, image_index: u32 },
    /// The swapchain is out of date or suboptimal and must be recreated.
    ///
    /// `advanced` is false when the frame was abandoned before submission.
    NeedsResize { advanced: bool },
}

impl FrameOutcome {
    pub const fn needs_resize(self) -> bool {
        matches!(self, Self::NeedsResize { .. })
    }
}

/// Owns the frame ring and runs the per-frame sequence over it.
pub struct FrameCycle<D: FrameDevice> {
    ring: FrameRing<D>,
    config: FrameConfig,
}

impl<D: FrameDevice> FrameCycle<D> {
    /// Validate `config` and create every slot of the ring.
    pub fn new(device: &mut D, config: FrameConfig) -> Result<Self> {
        config.validate()?;
        let ring = FrameRing::new(device, config.frame_overlap)?;

        tracing::info!(
            "Frame cycle ready: {} slots, fence timeout {:?}",
            config.frame_overlap,
            config.fence_timeout()
        );

        Ok(Self { ring, config })
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn ring(&self) -> &FrameRing<D> {
        &self.ring
    }

    pub fn ring_mut(&mut self) -> &mut FrameRing<D> {
        &mut self.ring
    }

    /// Logical frame counter.
    pub fn frame_number(&self) -> u64 {
        self.ring.frame_number()
    }

    /// Schedule an engine-lifetime cleanup action, run at shutdown.
    pub fn schedule_global<F>(&mut self, action: F)
    where
        F: FnOnce() + 'static,
    {
        self.ring.schedule_global(action);
    }

    /// Fallible form of [`FrameCycle::schedule_global`].
    pub fn schedule_global_fallible<F, E>(&mut self, action: F)
    where
        F: FnOnce() -> std::result::Result<(), E> + 'static,
        E: Into<BoxError>,
    {
        self.ring.schedule_global_fallible(action);
    }

    /// Run one logical frame.
    ///
    /// `record` receives the begun recorder of the current slot together with
    /// that slot's deletion queue, and must append the frame's commands. The
    /// recorder is finalized after it returns.
    ///
    /// An out-of-date swapchain on acquire abandons the frame without
    /// advancing the counter. A suboptimal or out-of-date swapchain on present
    /// still advances, since the work was submitted. Both return
    /// [`FrameOutcome::NeedsResize`]. Everything else that fails is fatal.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn run_frame<P, F, E>(
        &mut self,
        device: &mut D,
        presenter: &mut P,
        record: F,
    ) -> Result<FrameOutcome>
    where
        P: Presenter<D>,
        F: FnOnce(&mut FrameRecording<'_, D>) -> std::result::Result<(), E>,
        E: Into<BoxError>,
    {
        let frame = self.ring.frame_number();
        let fence_timeout = self.config.fence_timeout();
        let acquire_timeout = self.config.acquire_timeout();

        // Select
        let slot_index = self.ring.current_index();
        let slot = self.ring.current_mut();

        // Wait for the work submitted one ring-length ago
        let status = if slot.fence_armed {
            device
                .wait_fence(&slot.in_flight, fence_timeout)
                .map_err(|e| FrameError::step(FrameStep::Wait, frame, e))?
        } else {
            tracing::debug!("Frame {frame}: slot {slot_index} has no submission in flight");
            FenceStatus::Signaled
        };
        match status {
            FenceStatus::Signaled => {}
            FenceStatus::TimedOut => {
                tracing::error!("Frame {frame}: slot {slot_index} fence wait timed out");
                return Err(FrameError::FenceTimeout {
                    slot: slot_index,
                    frame,
                    timeout: fence_timeout,
                });
            }
        }

        // Reclaim: the work that used these resources has finished
        slot.deletions
            .flush()
            .map_err(|e| FrameError::deletion(FrameStep::Reclaim, frame, e))?;

        // Rearm
        slot.reset(device)
            .map_err(|e| FrameError::step(FrameStep::Rearm, frame, e))?;

        // Acquire
        let (image_index, acquire_suboptimal) = match presenter
            .acquire(acquire_timeout, &slot.image_acquired)
            .map_err(|e| FrameError::step(FrameStep::Acquire, frame, e))?
        {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => (image_index, suboptimal),
            AcquireOutcome::OutOfDate => {
                tracing::warn!("Frame {frame}: swapchain out of date on acquire, skipping frame");
                return Ok(FrameOutcome::NeedsResize { advanced: false });
            }
        };

        // Record
        device
            .begin_recording(&mut slot.recorder)
            .map_err(|e| FrameError::step(FrameStep::Record, frame, e))?;

        let info = FrameInfo {
            frame_number: frame,
            slot_index,
            image_index,
        };
        let mut recording = FrameRecording {
            recorder: &mut slot.recorder,
            deletions: &mut slot.deletions,
            info,
        };
        record(&mut recording).map_err(|e| FrameError::Recording {
            frame,
            source: e.into(),
        })?;

        device
            .end_recording(&mut slot.recorder)
            .map_err(|e| FrameError::step(FrameStep::Record, frame, e))?;

        // The fence is cleared only now that a submission will signal it again
        device
            .reset_fence(&slot.in_flight)
            .map_err(|e| FrameError::step(FrameStep::Rearm, frame, e))?;
        slot.fence_armed = false;

        // Submit
        device
            .submit(
                &slot.recorder,
                SubmitSync {
                    wait_semaphore: &slot.image_acquired,
                    signal_semaphore: &slot.render_finished,
                    fence: &slot.in_flight,
                },
            )
            .map_err(|e| FrameError::step(FrameStep::Submit, frame, e))?;
        slot.fence_armed = true;
        slot.submissions += 1;

        // Present
        let presented = presenter
            .present(image_index, &slot.render_finished)
            .map_err(|e| FrameError::step(FrameStep::Present, frame, e))?;

        // Advance
        self.ring.advance();

        if acquire_suboptimal || presented.needs_resize() {
            if presented == PresentOutcome::OutOfDate {
                tracing::warn!("Frame {frame}: swapchain out of date on present");
            } else {
                tracing::debug!("Frame {frame}: swapchain suboptimal");
            }
            return Ok(FrameOutcome::NeedsResize { advanced: true });
        }

        tracing::trace!("Frame {frame} presented image {image_index} from slot {slot_index}");

        Ok(FrameOutcome::Presented {
            frame_number: frame,
            image_index,
        })
    }

    /// Wait until no slot has work in flight, without releasing anything.
    ///
    /// Used before recreating the swapchain. Deletion queues are left alone;
    /// they still run when their slot is next reclaimed.
    pub fn wait_idle(&self, device: &mut D) -> Result<()> {
        self.ring.wait_all(device, self.config.fence_timeout())
    }

    /// Wait for every slot's work, then release everything.
    ///
    /// Order: wait on every fence, flush every private deletion queue, flush
    /// the global queue, destroy the slot primitives.
    pub fn shutdown(self, device: &mut D) -> Result<()> {
        tracing::info!(
            "Frame cycle shutting down after {} frames",
            self.ring.frame_number()
        );
        self.ring.destroy(device, self.config.fence_timeout())
    }
}
