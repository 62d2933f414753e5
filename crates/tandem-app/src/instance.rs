//! Single engine instance per process.

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

static CLAIMED: AtomicBool = AtomicBool::new(false);

/// Error returned when a second engine is started in the same process.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("An engine instance is already running in this process")]
pub struct InstanceError;

/// Proof that this process runs exactly one engine.
///
/// Held by [`crate::AppContext`]; the claim is released when it is dropped.
/// There is no global accessor: the context is passed around explicitly.
#[derive(Debug)]
pub struct EngineInstance {
    _private: (),
}

impl EngineInstance {
    /// Claim the process-wide engine slot.
    pub fn claim() -> Result<Self, InstanceError> {
        CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self { _private: () })
            .map_err(|_| InstanceError)
    }
}

impl Drop for EngineInstance {
    fn drop(&mut self) {
        CLAIMED.store(false, Ordering::Release);
    }
}
