//! Fixed-size ring of frame slots.

use std::time::Duration;

use crate::backend::{FenceStatus, FrameDevice};
use crate::deletion::DeletionQueue;
use crate::error::{BoxError, FrameError, FrameStep, Result};
use crate::slot::FrameSlot;

/// Ring of frame slots selected by a monotonically increasing frame counter.
///
/// The number of slots is fixed for the lifetime of the ring. The ring also
/// owns the global deletion queue for engine-lifetime resources, which is
/// only flushed at shutdown.
pub struct FrameRing<D: FrameDevice> {
    slots: Vec<FrameSlot<D>>,
    global_deletions: DeletionQueue,
    frame_number: u64,
}

impl<D: FrameDevice> FrameRing<D> {
    /// Create `overlap` slots with their primitives.
    ///
    /// On failure every slot created so far is destroyed again.
    pub fn new(device: &mut D, overlap: usize) -> Result<Self> {
        if overlap == 0 {
            return Err(tandem_core::Error::InvalidConfig(
                "a frame ring needs at least one slot".to_string(),
            )
            .into());
        }

        let mut slots = Vec::with_capacity(overlap);
        for index in 0..overlap {
            match FrameSlot::new(device, index) {
                Ok(slot) => slots.push(slot),
                Err((what, e)) => {
                    for slot in slots {
                        slot.destroy(device);
                    }
                    return Err(FrameError::Creation {
                        what,
                        slot: index,
                        source: e.into(),
                    });
                }
            }
        }

        tracing::debug!("Frame ring created with {overlap} slots");

        Ok(Self {
            slots,
            global_deletions: DeletionQueue::new(),
            frame_number: 0,
        })
    }

    /// Number of slots.
    pub fn overlap(&self) -> usize {
        self.slots.len()
    }

    /// Logical frame counter.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Index of the slot the current frame uses.
    pub fn current_index(&self) -> usize {
        (self.frame_number % self.slots.len() as u64) as usize
    }

    /// Slot for the current frame.
    pub fn current(&self) -> &FrameSlot<D> {
        &self.slots[self.current_index()]
    }

    pub fn current_mut(&mut self) -> &mut FrameSlot<D> {
        let index = self.current_index();
        &mut self.slots[index]
    }

    pub fn slot(&self, index: usize) -> Option<&FrameSlot<D>> {
        self.slots.get(index)
    }

    pub fn slots(&self) -> &[FrameSlot<D>] {
        &self.slots
    }

    /// Move on to the next logical frame.
    ///
    /// Only called once a frame has been submitted and presentation requested.
    pub fn advance(&mut self) {
        self.frame_number = self.frame_number.wrapping_add(1);
    }

    /// Schedule an action that runs at shutdown, after every slot is drained.
    pub fn schedule_global<F>(&mut self, action: F)
    where
        F: FnOnce() + 'static,
    {
        self.global_deletions.schedule(action);
    }

    /// Fallible form of [`FrameRing::schedule_global`].
    pub fn schedule_global_fallible<F, E>(&mut self, action: F)
    where
        F: FnOnce() -> std::result::Result<(), E> + 'static,
        E: Into<BoxError>,
    {
        self.global_deletions.schedule_fallible(action);
    }

    /// Run the global deletion queue.
    ///
    /// Only safe once no GPU work can reference the released resources.
    pub fn flush_global(&mut self) -> Result<()> {
        self.global_deletions
            .flush()
            .map_err(|e| FrameError::deletion(FrameStep::Shutdown, self.frame_number, e))
    }

    pub fn global_deletion_queue(&self) -> &DeletionQueue {
        &self.global_deletions
    }

    /// Block until every slot's submitted work has completed.
    ///
    /// Stops at the first slot that does not drain within `timeout`. Slots
    /// with nothing in flight are skipped.
    pub fn wait_all(&self, device: &mut D, timeout: Duration) -> Result<()> {
        for slot in self.slots.iter().filter(|slot| slot.fence_armed) {
            match device
                .wait_fence(slot.fence(), timeout)
                .map_err(|e| FrameError::step(FrameStep::Wait, self.frame_number, e))?
            {
                FenceStatus::Signaled => {}
                FenceStatus::TimedOut => {
                    return Err(FrameError::FenceTimeout {
                        slot: slot.index(),
                        frame: self.frame_number,
                        timeout,
                    });
                }
            }
        }
        Ok(())
    }

    /// Drain and release the ring.
    ///
    /// Waits on every fence, then flushes every private queue, then the
    /// global queue, then destroys the slot primitives. All phases run even
    /// if one fails; the first error is returned. A slot whose fence could
    /// not be confirmed signaled is leaked rather than released under the GPU,
    /// and the global queue is left unflushed in that case.
    pub fn destroy(self, device: &mut D, timeout: Duration) -> Result<()> {
        let Self {
            mut slots,
            mut global_deletions,
            frame_number,
        } = self;

        let mut first_error: Option<FrameError> = None;
        let mut record = |error: FrameError| {
            tracing::error!("Frame ring shutdown: {error}");
            if first_error.is_none() {
                first_error = Some(error);
            }
        };

        let mut drained = Vec::with_capacity(slots.len());
        for slot in &slots {
            if !slot.fence_armed {
                drained.push(true);
                continue;
            }
            let idle = match device.wait_fence(slot.fence(), timeout) {
                Ok(FenceStatus::Signaled) => true,
                Ok(FenceStatus::TimedOut) => {
                    record(FrameError::FenceTimeout {
                        slot: slot.index(),
                        frame: frame_number,
                        timeout,
                    });
                    false
                }
                Err(e) => {
                    record(FrameError::step(FrameStep::Shutdown, frame_number, e));
                    false
                }
            };
            drained.push(idle);
        }

        for (slot, idle) in slots.iter_mut().zip(&drained) {
            if *idle {
                if let Err(e) = slot.deletions.flush() {
                    record(FrameError::deletion(FrameStep::Shutdown, frame_number, e));
                }
            }
        }

        if drained.iter().all(|idle| *idle) {
            if let Err(e) = global_deletions.flush() {
                record(FrameError::deletion(FrameStep::Shutdown, frame_number, e));
            }
        } else {
            tracing::warn!("Skipping global deletions: not every frame slot drained");
        }

        for (slot, idle) in slots.into_iter().zip(drained) {
            if idle {
                slot.destroy(device);
            } else {
                tracing::warn!("Leaking primitives of frame slot {}", slot.index());
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}
