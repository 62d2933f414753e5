//! Frame pacing error types.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::deletion::DeletionError;

/// Type-erased error coming from a backend or a caller-supplied step.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Step of the frame cycle, used to say where a fatal error happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameStep {
    Wait,
    Reclaim,
    Rearm,
    Acquire,
    Record,
    Submit,
    Present,
    Shutdown,
}

impl FrameStep {
    /// Lowercase step name used in diagnostics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wait => "wait",
            Self::Reclaim => "reclaim",
            Self::Rearm => "rearm",
            Self::Acquire => "acquire",
            Self::Record => "record",
            Self::Submit => "submit",
            Self::Present => "present",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for FrameStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal frame pacing errors.
///
/// Recoverable swapchain conditions are not errors; they are reported
/// through [`crate::FrameOutcome::NeedsResize`].
#[derive(Error, Debug)]
pub enum FrameError {
    /// Configuration rejected before any primitive was created.
    #[error("Invalid frame configuration: {0}")]
    Config(#[from] tandem_core::Error),

    /// A fence, semaphore or recorder could not be created at startup.
    #[error("Failed to create {what} for frame slot {slot}: {source}")]
    Creation {
        what: &'static str,
        slot: usize,
        #[source]
        source: BoxError,
    },

    /// The GPU did not finish a slot's previous work in time.
    #[error("Timed out after {timeout:?} waiting for frame slot {slot} (frame {frame}); GPU presumed hung or lost")]
    FenceTimeout {
        slot: usize,
        frame: u64,
        timeout: Duration,
    },

    /// A backend call failed during one of the cycle steps.
    #[error("Frame {frame}: {step} step failed: {source}")]
    Step {
        step: FrameStep,
        frame: u64,
        #[source]
        source: BoxError,
    },

    /// The caller-supplied recording step reported failure.
    #[error("Frame {frame}: recording step failed: {source}")]
    Recording {
        frame: u64,
        #[source]
        source: BoxError,
    },

    /// A deferred deletion action reported failure while a queue was flushed.
    #[error("Frame {frame}: {step} step failed: {source}")]
    Deletion {
        step: FrameStep,
        frame: u64,
        #[source]
        source: DeletionError,
    },
}

impl FrameError {
    pub(crate) fn step(step: FrameStep, frame: u64, source: impl Into<BoxError>) -> Self {
        Self::Step {
            step,
            frame,
            source: source.into(),
        }
    }

    pub(crate) const fn deletion(step: FrameStep, frame: u64, source: DeletionError) -> Self {
        Self::Deletion {
            step,
            frame,
            source,
        }
    }

    /// Step the error is attributed to, if any.
    pub const fn failed_step(&self) -> Option<FrameStep> {
        match self {
            Self::FenceTimeout { .. } => Some(FrameStep::Wait),
            Self::Step { step, .. } | Self::Deletion { step, .. } => Some(*step),
            Self::Recording { .. } => Some(FrameStep::Record),
            Self::Config(_) | Self::Creation { .. } => None,
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, FrameError>;
