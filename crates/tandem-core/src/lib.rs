//! Core types for the Tandem frame pacer.
//!
//! This crate provides the foundational pieces shared by every other crate:
//! - Engine-wide constants (frame overlap, default timeouts)
//! - Frame pacing configuration
//! - Common error types

pub mod config;
pub mod error;

pub use config::FrameConfig;
pub use error::{Error, Result};

/// Engine-wide constants
pub mod constants {
    /// Number of frames whose CPU recording may overlap GPU execution.
    pub const FRAME_OVERLAP: usize = 2;
    /// Default bound on a single fence wait (one second).
    pub const DEFAULT_FENCE_TIMEOUT_NS: u64 = 1_000_000_000;
    /// Default bound on swapchain image acquisition (one second).
    pub const DEFAULT_ACQUIRE_TIMEOUT_NS: u64 = 1_000_000_000;
}
