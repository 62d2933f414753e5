//! Deferred resource deletion.
//!
//! GPU resources cannot be released while submitted work may still read
//! them. A [`DeletionQueue`] records the cleanup for such resources as
//! closures and runs them later, once the owner has proven (through a fence)
//! that the work referencing them is complete.
//!
//! Actions run in reverse order of scheduling so that a resource is never
//! torn down before something that was built on top of it.

use thiserror::Error;

use crate::error::BoxError;

type Action = Box<dyn FnOnce() -> std::result::Result<(), BoxError>>;

/// A deletion action reported failure while the queue was flushed.
#[derive(Error, Debug)]
#[error("Deletion action {position} of {total} failed: {source}")]
pub struct DeletionError {
    /// 1-based position of the failed action in scheduling order.
    pub position: usize,
    /// Number of actions the flush executed.
    pub total: usize,
    #[source]
    pub source: BoxError,
}

/// LIFO queue of deferred cleanup actions.
///
/// Single writer, single flusher: everything scheduled on a queue must be
/// scheduled strictly before the flush that is meant to run it.
#[derive(Default)]
pub struct DeletionQueue {
    actions: Vec<Action>,
}

impl DeletionQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an infallible cleanup action.
    pub fn schedule<F>(&mut self, action: F)
    where
        F: FnOnce() + 'static,
    {
        self.actions.push(Box::new(move || {
            action();
            Ok(())
        }));
    }

    /// Schedule a cleanup action whose release call can report an error.
    ///
    /// An error surfaces from [`DeletionQueue::flush`] and is fatal to the
    /// caller; the queue itself never retries.
    pub fn schedule_fallible<F, E>(&mut self, action: F)
    where
        F: FnOnce() -> std::result::Result<(), E> + 'static,
        E: Into<BoxError>,
    {
        self.actions
            .push(Box::new(move || action().map_err(Into::into)));
    }

    /// Run every scheduled action, newest first, and leave the queue empty.
    ///
    /// Flushing an empty queue does nothing. Every action runs even if an
    /// earlier one fails; the first failure is returned and later ones are
    /// logged.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn flush(&mut self) -> std::result::Result<(), DeletionError> {
        let total = self.actions.len();
        if total == 0 {
            return Ok(());
        }

        let mut first_error = None;
        let mut position = total;
        while let Some(action) = self.actions.pop() {
            if let Err(source) = action() {
                if first_error.is_none() {
                    first_error = Some(DeletionError {
                        position,
                        total,
                        source,
                    });
                } else {
                    tracing::error!("Deletion action {position} of {total} failed: {source}");
                }
            }
            position -= 1;
        }

        tracing::trace!("Flushed {total} deletion actions");

        first_error.map_or(Ok(()), Err)
    }

    /// Number of actions waiting for the next flush.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the queue has nothing to run.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl std::fmt::Debug for DeletionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionQueue")
            .field("pending", &self.actions.len())
            .finish()
    }
}

impl Drop for DeletionQueue {
    fn drop(&mut self) {
        // Actions are never run from Drop: nothing here proves the GPU is done.
        if !self.actions.is_empty() {
            tracing::warn!(
                "Deletion queue dropped with {} unflushed actions; their resources leak",
                self.actions.len()
            );
        }
    }
}
