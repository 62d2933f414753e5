//! Frame pacing core for the Tandem renderer.
//!
//! This crate coordinates CPU command recording with asynchronous GPU
//! execution across a small ring of in-flight frames:
//! - [`DeletionQueue`]: LIFO deferred cleanup actions
//! - [`FrameSlot`]: one recorder, one fence, two semaphores and a private deletion queue
//! - [`FrameRing`]: fixed ring of slots indexed by the frame counter
//! - [`FrameCycle`]: the wait / reclaim / record / submit / present sequence
//!
//! The GPU itself is reached only through the [`FrameDevice`] and
//! [`Presenter`] traits, so the same controller drives a Vulkan device or a
//! simulated one.

pub mod backend;
pub mod cycle;
pub mod deletion;
pub mod error;
pub mod ring;
pub mod slot;

pub use backend::{
    AcquireOutcome, FenceStatus, FrameDevice, PresentOutcome, Presenter, SubmitSync,
};
pub use cycle::{FrameCycle, FrameInfo, FrameOutcome, FrameRecording};
pub use deletion::{DeletionError, DeletionQueue};
pub use error::{BoxError, FrameError, FrameStep, Result};
pub use ring::FrameRing;
pub use slot::FrameSlot;
