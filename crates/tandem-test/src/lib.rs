//! Test harness for the Tandem frame pacer.
//!
//! Provides a simulated GPU that implements the frame backend traits and
//! records every call in a shared event log, so tests can assert on the
//! exact ordering of fence waits, resets, submissions and deletions.

pub mod mock;

pub use mock::{
    Event, EventLog, FenceId, MockDevice, MockPresenter, MockRecorder, SemaphoreId,
};

use thiserror::Error;

/// Failures reported by the simulated GPU.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MockError {
    /// A failure the test asked for.
    #[error("Injected failure: {0}")]
    Injected(&'static str),
    /// The frame code used the simulated API incorrectly.
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),
}

pub type Result<T> = std::result::Result<T, MockError>;
