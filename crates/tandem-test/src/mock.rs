//! Simulated GPU.
//!
//! [`MockDevice`] hands out fence, semaphore and recorder handles and keeps
//! their state the way a driver would: submitted work stays pending until the
//! CPU waits on its fence, at which point the simulated GPU completes it
//! (unless the device has been told to hang). Misuse that a real driver would
//! reject, such as submitting with a signaled fence, is reported as
//! [`MockError::InvalidUsage`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use tandem_frame::{
    AcquireOutcome, FenceStatus, FrameDevice, PresentOutcome, Presenter, SubmitSync,
};

use crate::{MockError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FenceId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SemaphoreId(pub usize);

/// Everything the simulated GPU observed, in call order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    FenceCreated { fence: FenceId, signaled: bool },
    SemaphoreCreated(SemaphoreId),
    RecorderCreated(usize),
    FenceWaited { fence: FenceId, status: FenceStatus },
    FenceReset(FenceId),
    RecorderReset(usize),
    RecordingBegun(usize),
    RecordingEnded { recorder: usize, commands: usize },
    Submitted {
        recorder: usize,
        fence: FenceId,
        wait: SemaphoreId,
        signal: SemaphoreId,
    },
    GpuCompleted(FenceId),
    Acquired { image_index: u32, signal: SemaphoreId },
    AcquireOutOfDate,
    Presented {
        image_index: u32,
        wait: SemaphoreId,
        outcome: PresentOutcome,
    },
    FenceDestroyed(FenceId),
    SemaphoreDestroyed(SemaphoreId),
    RecorderDestroyed(usize),
    /// Free-form entry pushed by test code, e.g. from a deletion action.
    Marker(String),
}

/// Shared, append-only event log.
#[derive(Clone, Debug, Default)]
pub struct EventLog(Rc<RefCell<Vec<Event>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: Event) {
        self.0.borrow_mut().push(event);
    }

    /// Push a [`Event::Marker`].
    pub fn marker(&self, text: impl Into<String>) {
        self.push(Event::Marker(text.into()));
    }

    /// Copy of every event so far.
    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Index of the first event matching `pred`.
    pub fn position(&self, pred: impl Fn(&Event) -> bool) -> Option<usize> {
        self.0.borrow().iter().position(pred)
    }

    /// Indices of every event matching `pred`.
    pub fn positions(&self, pred: impl Fn(&Event) -> bool) -> Vec<usize> {
        self.0
            .borrow()
            .iter()
            .enumerate()
            .filter(|(_, e)| pred(e))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.0.borrow().iter().filter(|e| pred(e)).count()
    }

    /// Index of the marker with the given text.
    pub fn marker_position(&self, text: &str) -> Option<usize> {
        self.position(|e| matches!(e, Event::Marker(m) if m == text))
    }
}

/// Command recorder handed out by [`MockDevice`].
#[derive(Debug)]
pub struct MockRecorder {
    id: usize,
    recording: bool,
    finalized: bool,
    commands: Vec<String>,
}

impl MockRecorder {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Append a command; only valid between begin and end.
    pub fn push_command(&mut self, command: impl Into<String>) -> Result<()> {
        if !self.recording {
            return Err(MockError::InvalidUsage(format!(
                "recorder {} is not recording",
                self.id
            )));
        }
        self.commands.push(command.into());
        Ok(())
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }
}

#[derive(Debug)]
struct FenceState {
    signaled: bool,
    pending: bool,
    alive: bool,
}

/// Simulated device and graphics queue.
#[derive(Debug, Default)]
pub struct MockDevice {
    log: EventLog,
    fences: Vec<FenceState>,
    semaphores: Vec<bool>,
    recorders: Vec<bool>,
    hung: bool,
    submissions: u64,
    fail_fence_creation_at: Option<usize>,
    fail_recorder_creation_at: Option<usize>,
    fail_submit_at: Option<u64>,
}

impl MockDevice {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn log(&self) -> EventLog {
        self.log.clone()
    }

    /// Stop completing submitted work; waits on pending fences time out.
    pub fn hang(&mut self) {
        self.hung = true;
    }

    /// Make the `n`th fence creation (0-based) fail.
    pub fn fail_fence_creation_at(&mut self, n: usize) {
        self.fail_fence_creation_at = Some(n);
    }

    /// Make the `n`th recorder creation (0-based) fail.
    pub fn fail_recorder_creation_at(&mut self, n: usize) {
        self.fail_recorder_creation_at = Some(n);
    }

    /// Make the `n`th submission (0-based) fail.
    pub fn fail_submit_at(&mut self, n: u64) {
        self.fail_submit_at = Some(n);
    }

    /// Number of submissions accepted so far.
    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    /// Fences, semaphores and recorders not yet destroyed.
    pub fn live_objects(&self) -> usize {
        self.fences.iter().filter(|f| f.alive).count()
            + self.semaphores.iter().filter(|alive| **alive).count()
            + self.recorders.iter().filter(|alive| **alive).count()
    }

    pub fn fence_signaled(&self, fence: FenceId) -> bool {
        self.fences.get(fence.0).is_some_and(|f| f.signaled)
    }

    fn fence_mut(&mut self, fence: FenceId) -> Result<&mut FenceState> {
        match self.fences.get_mut(fence.0) {
            Some(state) if state.alive => Ok(state),
            _ => Err(MockError::InvalidUsage(format!(
                "fence {} does not exist",
                fence.0
            ))),
        }
    }
}

impl FrameDevice for MockDevice {
    type Fence = FenceId;
    type Semaphore = SemaphoreId;
    type Recorder = MockRecorder;
    type Error = MockError;

    fn create_fence(&mut self, signaled: bool) -> Result<FenceId> {
        if self.fail_fence_creation_at == Some(self.fences.len()) {
            return Err(MockError::Injected("fence creation"));
        }
        let fence = FenceId(self.fences.len());
        self.fences.push(FenceState {
            signaled,
            pending: false,
            alive: true,
        });
        self.log.push(Event::FenceCreated { fence, signaled });
        Ok(fence)
    }

    fn create_semaphore(&mut self) -> Result<SemaphoreId> {
        let semaphore = SemaphoreId(self.semaphores.len());
        self.semaphores.push(true);
        self.log.push(Event::SemaphoreCreated(semaphore));
        Ok(semaphore)
    }

    fn create_recorder(&mut self) -> Result<MockRecorder> {
        if self.fail_recorder_creation_at == Some(self.recorders.len()) {
            return Err(MockError::Injected("recorder creation"));
        }
        let id = self.recorders.len();
        self.recorders.push(true);
        self.log.push(Event::RecorderCreated(id));
        Ok(MockRecorder {
            id,
            recording: false,
            finalized: false,
            commands: Vec::new(),
        })
    }

    fn wait_fence(&mut self, fence: &FenceId, _timeout: Duration) -> Result<FenceStatus> {
        let hung = self.hung;
        let state = self.fence_mut(*fence)?;
        let completed = state.pending && !hung;
        if completed {
            state.pending = false;
            state.signaled = true;
        }
        let status = if state.signaled {
            FenceStatus::Signaled
        } else {
            FenceStatus::TimedOut
        };

        if completed {
            self.log.push(Event::GpuCompleted(*fence));
        }
        self.log.push(Event::FenceWaited {
            fence: *fence,
            status,
        });
        Ok(status)
    }

    fn reset_fence(&mut self, fence: &FenceId) -> Result<()> {
        let state = self.fence_mut(*fence)?;
        if state.pending {
            return Err(MockError::InvalidUsage(format!(
                "fence {} reset while its work is in flight",
                fence.0
            )));
        }
        state.signaled = false;
        self.log.push(Event::FenceReset(*fence));
        Ok(())
    }

    fn reset_recorder(&mut self, recorder: &mut MockRecorder) -> Result<()> {
        recorder.recording = false;
        recorder.finalized = false;
        recorder.commands.clear();
        self.log.push(Event::RecorderReset(recorder.id));
        Ok(())
    }

    fn begin_recording(&mut self, recorder: &mut MockRecorder) -> Result<()> {
        if recorder.recording || recorder.finalized {
            return Err(MockError::InvalidUsage(format!(
                "recorder {} begun without a reset",
                recorder.id
            )));
        }
        recorder.recording = true;
        self.log.push(Event::RecordingBegun(recorder.id));
        Ok(())
    }

    fn end_recording(&mut self, recorder: &mut MockRecorder) -> Result<()> {
        if !recorder.recording {
            return Err(MockError::InvalidUsage(format!(
                "recorder {} ended while not recording",
                recorder.id
            )));
        }
        recorder.recording = false;
        recorder.finalized = true;
        self.log.push(Event::RecordingEnded {
            recorder: recorder.id,
            commands: recorder.commands.len(),
        });
        Ok(())
    }

    fn submit(&mut self, recorder: &MockRecorder, sync: SubmitSync<'_, Self>) -> Result<()> {
        if !recorder.finalized {
            return Err(MockError::InvalidUsage(format!(
                "recorder {} submitted before it was finalized",
                recorder.id
            )));
        }
        if self.fail_submit_at == Some(self.submissions) {
            return Err(MockError::Injected("submit"));
        }

        let fence = *sync.fence;
        let state = self.fence_mut(fence)?;
        if state.signaled || state.pending {
            return Err(MockError::InvalidUsage(format!(
                "fence {} submitted while signaled or in use",
                fence.0
            )));
        }
        state.pending = true;

        self.submissions += 1;
        self.log.push(Event::Submitted {
            recorder: recorder.id,
            fence,
            wait: *sync.wait_semaphore,
            signal: *sync.signal_semaphore,
        });
        Ok(())
    }

    fn destroy_fence(&mut self, fence: FenceId) {
        let state = &mut self.fences[fence.0];
        assert!(state.alive, "fence {} destroyed twice", fence.0);
        assert!(
            !state.pending,
            "fence {} destroyed with work in flight",
            fence.0
        );
        state.alive = false;
        self.log.push(Event::FenceDestroyed(fence));
    }

    fn destroy_semaphore(&mut self, semaphore: SemaphoreId) {
        assert!(
            self.semaphores[semaphore.0],
            "semaphore {} destroyed twice",
            semaphore.0
        );
        self.semaphores[semaphore.0] = false;
        self.log.push(Event::SemaphoreDestroyed(semaphore));
    }

    fn destroy_recorder(&mut self, recorder: MockRecorder) {
        assert!(
            self.recorders[recorder.id],
            "recorder {} destroyed twice",
            recorder.id
        );
        self.recorders[recorder.id] = false;
        self.log.push(Event::RecorderDestroyed(recorder.id));
    }
}

/// Simulated swapchain.
///
/// Images are handed out round-robin. Individual acquire and present calls
/// (counted from 0) can be scripted to report out-of-date or suboptimal.
#[derive(Debug)]
pub struct MockPresenter {
    log: EventLog,
    image_count: u32,
    next_image: u32,
    acquire_calls: usize,
    present_calls: usize,
    out_of_date_acquires: Vec<usize>,
    suboptimal_acquires: Vec<usize>,
    failed_acquires: Vec<usize>,
    present_outcomes: HashMap<usize, PresentOutcome>,
}

impl MockPresenter {
    pub fn new(log: EventLog, image_count: u32) -> Self {
        Self {
            log,
            image_count: image_count.max(1),
            next_image: 0,
            acquire_calls: 0,
            present_calls: 0,
            out_of_date_acquires: Vec::new(),
            suboptimal_acquires: Vec::new(),
            failed_acquires: Vec::new(),
            present_outcomes: HashMap::new(),
        }
    }

    /// Report out-of-date on the given acquire calls.
    pub fn out_of_date_on_acquire(&mut self, calls: &[usize]) {
        self.out_of_date_acquires.extend_from_slice(calls);
    }

    /// Report suboptimal on the given acquire calls.
    pub fn suboptimal_on_acquire(&mut self, calls: &[usize]) {
        self.suboptimal_acquires.extend_from_slice(calls);
    }

    /// Fail the given acquire calls outright.
    pub fn fail_acquire(&mut self, calls: &[usize]) {
        self.failed_acquires.extend_from_slice(calls);
    }

    /// Report `outcome` on the given present call.
    pub fn present_outcome_at(&mut self, call: usize, outcome: PresentOutcome) {
        self.present_outcomes.insert(call, outcome);
    }

    pub fn acquire_calls(&self) -> usize {
        self.acquire_calls
    }

    pub fn present_calls(&self) -> usize {
        self.present_calls
    }
}

impl Presenter<MockDevice> for MockPresenter {
    type Error = MockError;

    fn acquire(&mut self, _timeout: Duration, signal: &SemaphoreId) -> Result<AcquireOutcome> {
        let call = self.acquire_calls;
        self.acquire_calls += 1;

        if self.failed_acquires.contains(&call) {
            return Err(MockError::Injected("acquire"));
        }
        if self.out_of_date_acquires.contains(&call) {
            self.log.push(Event::AcquireOutOfDate);
            return Ok(AcquireOutcome::OutOfDate);
        }

        let image_index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        self.log.push(Event::Acquired {
            image_index,
            signal: *signal,
        });
        Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal: self.suboptimal_acquires.contains(&call),
        })
    }

    fn present(&mut self, image_index: u32, wait: &SemaphoreId) -> Result<PresentOutcome> {
        let call = self.present_calls;
        self.present_calls += 1;

        let outcome = self
            .present_outcomes
            .get(&call)
            .copied()
            .unwrap_or(PresentOutcome::Presented);
        self.log.push(Event::Presented {
            image_index,
            wait: *wait,
            outcome,
        });
        Ok(outcome)
    }
}
