//! Frame cycle behaviour against the simulated GPU.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use tandem_core::FrameConfig;
use tandem_frame::{
    FenceStatus, FrameCycle, FrameError, FrameOutcome, FrameRecording, FrameStep, PresentOutcome,
};
use tandem_test::{Event, EventLog, FenceId, MockDevice, MockError, MockPresenter};

struct Harness {
    log: EventLog,
    device: MockDevice,
    presenter: MockPresenter,
    cycle: FrameCycle<MockDevice>,
}

impl Harness {
    fn new(overlap: usize) -> Self {
        let log = EventLog::new();
        let mut device = MockDevice::new(log.clone());
        let presenter = MockPresenter::new(log.clone(), 3);
        let cycle = FrameCycle::new(
            &mut device,
            FrameConfig::default().with_frame_overlap(overlap),
        )
        .unwrap();
        Self {
            log,
            device,
            presenter,
            cycle,
        }
    }

    fn frame(&mut self) -> Result<FrameOutcome, FrameError> {
        self.cycle
            .run_frame(&mut self.device, &mut self.presenter, clear)
    }

    fn frame_with<F>(&mut self, record: F) -> Result<FrameOutcome, FrameError>
    where
        F: FnOnce(&mut FrameRecording<'_, MockDevice>) -> Result<(), MockError>,
    {
        self.cycle
            .run_frame(&mut self.device, &mut self.presenter, record)
    }

    fn shutdown(mut self) -> (MockDevice, Result<(), FrameError>) {
        let result = self.cycle.shutdown(&mut self.device);
        (self.device, result)
    }
}

fn clear(rec: &mut FrameRecording<'_, MockDevice>) -> Result<(), MockError> {
    rec.recorder.push_command("clear")
}

/// Fences and recorders are created slot by slot, so slot `i` owns fence `i`
/// and recorder `i`.
fn assert_slot_exclusivity(log: &EventLog) {
    let mut idle: HashMap<usize, bool> = HashMap::new();
    let mut submissions: HashMap<usize, u32> = HashMap::new();

    for event in log.events() {
        match event {
            Event::FenceCreated { fence, signaled } => {
                idle.insert(fence.0, signaled);
            }
            Event::FenceWaited {
                fence,
                status: FenceStatus::Signaled,
            } => {
                idle.insert(fence.0, true);
            }
            Event::RecorderReset(slot) => {
                assert_eq!(
                    idle.get(&slot),
                    Some(&true),
                    "slot {slot} rearmed before its previous occupancy completed"
                );
            }
            Event::FenceReset(fence) => {
                assert_eq!(
                    idle.get(&fence.0),
                    Some(&true),
                    "fence {} reset before it was observed signaled",
                    fence.0
                );
            }
            Event::Submitted { fence, .. } => {
                idle.insert(fence.0, false);
                *submissions.entry(fence.0).or_default() += 1;
            }
            _ => {}
        }
    }

    assert!(!submissions.is_empty());
}

#[test]
fn frames_present_and_advance() {
    let mut h = Harness::new(2);

    let mut images = Vec::new();
    for expected in 0..4 {
        match h.frame().unwrap() {
            FrameOutcome::Presented {
                frame_number,
                image_index,
            } => {
                assert_eq!(frame_number, expected);
                images.push(image_index);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(images, vec![0, 1, 2, 0]);
    assert_eq!(h.cycle.frame_number(), 4);
    assert_eq!(h.cycle.ring().slot(0).unwrap().submissions(), 2);
    assert_eq!(h.cycle.ring().slot(1).unwrap().submissions(), 2);

    let (device, result) = h.shutdown();
    result.unwrap();
    assert_eq!(device.live_objects(), 0);
}

#[test]
fn submission_uses_slot_primitives() {
    let mut h = Harness::new(2);
    h.frame().unwrap();
    h.frame().unwrap();

    let ring = h.cycle.ring();
    let submits: Vec<_> = h
        .log
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Submitted {
                recorder,
                fence,
                wait,
                signal,
            } => Some((recorder, fence, wait, signal)),
            _ => None,
        })
        .collect();

    assert_eq!(submits.len(), 2);
    for (slot_index, (recorder, fence, wait, signal)) in submits.into_iter().enumerate() {
        let slot = ring.slot(slot_index).unwrap();
        assert_eq!(recorder, slot.recorder().id());
        assert_eq!(&fence, slot.fence());
        assert_eq!(&wait, slot.image_acquired());
        assert_eq!(&signal, slot.render_finished());
    }

    // Presentation waits on the semaphore the submission signals.
    let presents = h.log.positions(|e| matches!(e, Event::Presented { .. }));
    assert_eq!(presents.len(), 2);
}

#[test]
fn no_slot_rearmed_before_previous_occupancy_completes() {
    for overlap in [1, 2, 3] {
        let mut h = Harness::new(overlap);
        for _ in 0..12 {
            h.frame().unwrap();
        }
        assert_slot_exclusivity(&h.log);

        let (_, result) = h.shutdown();
        result.unwrap();
    }
}

#[test]
fn global_actions_deferred_until_shutdown() {
    let overlap = 2;
    let mut h = Harness::new(overlap);

    let global_runs = Rc::new(Cell::new(0u32));
    let counter = Rc::clone(&global_runs);
    h.cycle.schedule_global(move || counter.set(counter.get() + 1));

    let frame_runs = Rc::new(Cell::new(0u32));
    for _ in 0..3 * overlap {
        let counter = Rc::clone(&frame_runs);
        h.frame_with(move |rec| {
            rec.deletions.schedule(move || counter.set(counter.get() + 1));
            clear(rec)
        })
        .unwrap();
        assert_eq!(global_runs.get(), 0);
    }

    // Per-slot queues were flushed in between.
    assert_eq!(frame_runs.get(), 4);
    assert_eq!(global_runs.get(), 0);

    let (_, result) = h.shutdown();
    result.unwrap();
    assert_eq!(frame_runs.get(), 6);
    assert_eq!(global_runs.get(), 1);
}

#[test]
fn frame_counter_skips_out_of_date_acquires() {
    let mut h = Harness::new(2);
    h.presenter.out_of_date_on_acquire(&[2, 6]);

    let mut skipped = 0;
    for _ in 0..10 {
        match h.frame().unwrap() {
            FrameOutcome::Presented { .. } => {}
            FrameOutcome::NeedsResize { advanced: false } => skipped += 1,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(skipped, 2);
    assert_eq!(h.cycle.frame_number(), 8);
    assert_eq!(h.device.submissions(), 8);
    assert_slot_exclusivity(&h.log);
}

#[test]
fn out_of_date_acquire_leaves_fence_signaled() {
    let mut h = Harness::new(2);
    h.presenter.out_of_date_on_acquire(&[0]);

    assert_eq!(
        h.frame().unwrap(),
        FrameOutcome::NeedsResize { advanced: false }
    );
    assert!(h.device.fence_signaled(FenceId(0)));
    assert_eq!(h.log.count(|e| matches!(e, Event::FenceReset(_))), 0);

    // Retrying after the resize path reuses the same slot without blocking.
    assert!(matches!(
        h.frame().unwrap(),
        FrameOutcome::Presented {
            frame_number: 0,
            ..
        }
    ));

    let (device, result) = h.shutdown();
    result.unwrap();
    assert_eq!(device.live_objects(), 0);
}

#[test]
fn slot_action_runs_when_slot_is_reused() {
    let mut h = Harness::new(2);

    let log = h.log.clone();
    h.frame_with(move |rec| {
        assert_eq!(rec.info.slot_index, 0);
        rec.schedule(move || log.marker("release frame 0 scratch"));
        clear(rec)
    })
    .unwrap();
    assert!(h.log.marker_position("release frame 0 scratch").is_none());

    h.frame().unwrap();
    assert!(h.log.marker_position("release frame 0 scratch").is_none());

    h.frame().unwrap();
    let released = h
        .log
        .marker_position("release frame 0 scratch")
        .expect("slot 0 action should run on frame 2");

    let waits = h.log.positions(|e| {
        matches!(
            e,
            Event::FenceWaited {
                fence: FenceId(0),
                status: FenceStatus::Signaled
            }
        )
    });
    let begins = h.log.positions(|e| matches!(e, Event::RecordingBegun(_)));
    assert_eq!(begins.len(), 3);

    let frame2_wait = *waits.last().unwrap();
    assert!(frame2_wait < released, "reclaim ran before the fence wait");
    assert!(released < begins[2], "reclaim ran after recording began");
}

#[test]
fn hung_gpu_times_out_fatally() {
    let mut h = Harness::new(2);
    h.frame().unwrap();
    h.frame().unwrap();

    h.device.hang();
    let err = h.frame().unwrap_err();

    assert!(matches!(
        err,
        FrameError::FenceTimeout {
            slot: 0,
            frame: 2,
            ..
        }
    ));
    assert_eq!(err.failed_step(), Some(FrameStep::Wait));
    assert_eq!(h.cycle.frame_number(), 2);

    // Slots whose work never finished are leaked, not destroyed under the GPU.
    let (device, result) = h.shutdown();
    assert!(matches!(result, Err(FrameError::FenceTimeout { .. })));
    assert_eq!(device.live_objects(), 8);
}

#[test]
fn wait_idle_drains_every_slot_without_reclaiming() {
    let mut h = Harness::new(2);
    let log = h.log.clone();
    h.frame_with(move |rec| {
        rec.schedule(move || log.marker("scratch"));
        clear(rec)
    })
    .unwrap();
    h.frame().unwrap();

    h.cycle.wait_idle(&mut h.device).unwrap();
    let slots = h.cycle.ring().slots();
    assert!(slots.iter().all(|slot| h.device.fence_signaled(*slot.fence())));
    assert!(h.log.marker_position("scratch").is_none());
    assert_eq!(h.cycle.frame_number(), 2);

    // The slot's queue still runs when the slot comes around again.
    h.frame().unwrap();
    assert!(h.log.marker_position("scratch").is_some());
    assert!(h.shutdown().1.is_ok());
}

#[test]
fn wait_idle_reports_a_hung_slot() {
    let mut h = Harness::new(2);
    h.frame().unwrap();
    h.device.hang();

    let err = h.cycle.wait_idle(&mut h.device).unwrap_err();
    assert!(matches!(err, FrameError::FenceTimeout { slot: 0, frame: 1, .. }));
}

#[test]
fn suboptimal_present_advances_and_requests_resize() {
    let mut h = Harness::new(2);
    h.presenter
        .present_outcome_at(0, PresentOutcome::Suboptimal);
    h.presenter.present_outcome_at(1, PresentOutcome::OutOfDate);

    assert_eq!(
        h.frame().unwrap(),
        FrameOutcome::NeedsResize { advanced: true }
    );
    assert_eq!(
        h.frame().unwrap(),
        FrameOutcome::NeedsResize { advanced: true }
    );
    assert_eq!(h.cycle.frame_number(), 2);
    assert_eq!(h.device.submissions(), 2);

    assert!(matches!(
        h.frame().unwrap(),
        FrameOutcome::Presented { .. }
    ));
}

#[test]
fn suboptimal_acquire_still_renders() {
    let mut h = Harness::new(2);
    h.presenter.suboptimal_on_acquire(&[0]);

    assert_eq!(
        h.frame().unwrap(),
        FrameOutcome::NeedsResize { advanced: true }
    );
    assert_eq!(h.device.submissions(), 1);
    assert_eq!(h.presenter.present_calls(), 1);
}

#[test]
fn recording_failure_is_fatal_and_leaves_slot_consistent() {
    let mut h = Harness::new(2);

    let err = h
        .frame_with(|_| Err(MockError::Injected("draw")))
        .unwrap_err();
    assert!(matches!(err, FrameError::Recording { frame: 0, .. }));
    assert_eq!(err.failed_step(), Some(FrameStep::Record));
    assert!(err.to_string().contains("recording step failed"));
    assert_eq!(h.cycle.frame_number(), 0);
    assert_eq!(h.device.submissions(), 0);
    assert!(h.device.fence_signaled(FenceId(0)));

    let (device, result) = h.shutdown();
    result.unwrap();
    assert_eq!(device.live_objects(), 0);
}

#[test]
fn recording_step_accepts_anyhow_errors() {
    let log = EventLog::new();
    let mut device = MockDevice::new(log.clone());
    let mut presenter = MockPresenter::new(log, 2);
    let mut cycle = FrameCycle::new(&mut device, FrameConfig::default()).unwrap();

    let err = cycle
        .run_frame(&mut device, &mut presenter, |_| {
            Err(anyhow::anyhow!("pipeline missing"))
        })
        .unwrap_err();
    assert!(err.to_string().contains("pipeline missing"));

    cycle.shutdown(&mut device).unwrap();
}

#[test]
fn submit_failure_names_the_step() {
    let mut h = Harness::new(2);
    h.device.fail_submit_at(1);

    h.frame().unwrap();
    let err = h.frame().unwrap_err();

    assert_eq!(err.failed_step(), Some(FrameStep::Submit));
    assert!(err.to_string().contains("submit step failed"));
    assert_eq!(h.cycle.frame_number(), 1);
}

#[test]
fn acquire_failure_names_the_step() {
    let mut h = Harness::new(2);
    h.presenter.fail_acquire(&[0]);

    let err = h.frame().unwrap_err();
    assert_eq!(err.failed_step(), Some(FrameStep::Acquire));
    assert_eq!(h.device.submissions(), 0);
}

#[test]
fn failed_reclaim_is_fatal() {
    let mut h = Harness::new(2);
    h.frame_with(|rec| {
        rec.schedule_fallible(|| Err::<(), _>(MockError::Injected("free")));
        clear(rec)
    })
    .unwrap();
    h.frame().unwrap();

    let err = h.frame().unwrap_err();
    assert!(matches!(
        err,
        FrameError::Deletion {
            step: FrameStep::Reclaim,
            frame: 2,
            ..
        }
    ));
    assert_eq!(err.failed_step(), Some(FrameStep::Reclaim));
    assert!(err.to_string().contains("reclaim step failed"));
    assert_eq!(h.cycle.frame_number(), 2);
}

#[test]
fn failed_global_action_names_shutdown() {
    let mut h = Harness::new(2);
    h.cycle
        .schedule_global_fallible(|| Err::<(), _>(MockError::Injected("allocator")));
    h.frame().unwrap();

    let (device, result) = h.shutdown();
    let err = result.unwrap_err();
    assert_eq!(err.failed_step(), Some(FrameStep::Shutdown));
    assert!(err.to_string().contains("shutdown step failed"));
    // The failure does not stop the slots from being released.
    assert_eq!(device.live_objects(), 0);
}

#[test]
fn shutdown_after_failed_submit_releases_everything() {
    let mut h = Harness::new(2);
    h.device.fail_submit_at(0);
    let ran = Rc::new(Cell::new(0));
    let counter = Rc::clone(&ran);
    h.cycle.schedule_global(move || counter.set(counter.get() + 1));

    let err = h.frame().unwrap_err();
    assert_eq!(err.failed_step(), Some(FrameStep::Submit));
    assert!(!h.cycle.ring().current().fence_armed());
    assert!(!h.device.fence_signaled(*h.cycle.ring().current().fence()));

    // Nothing was submitted, so there is nothing to wait for.
    h.cycle.wait_idle(&mut h.device).unwrap();

    let (device, result) = h.shutdown();
    result.unwrap();
    assert_eq!(ran.get(), 1);
    assert_eq!(device.live_objects(), 0);
}

#[test]
fn slot_with_failed_submit_is_reused_without_waiting() {
    let mut h = Harness::new(2);
    h.device.fail_submit_at(0);
    assert!(h.frame().is_err());

    let fence = *h.cycle.ring().current().fence();
    let waits_before = h
        .log
        .count(|e| matches!(e, Event::FenceWaited { fence: f, .. } if *f == fence));

    // The next submission is the second one, which the device accepts.
    h.device.fail_submit_at(u64::MAX);
    assert!(matches!(
        h.frame().unwrap(),
        FrameOutcome::Presented { frame_number: 0, .. }
    ));
    let waits_after = h
        .log
        .count(|e| matches!(e, Event::FenceWaited { fence: f, .. } if *f == fence));
    assert_eq!(waits_before, waits_after);
    assert!(h.cycle.ring().slot(0).unwrap().fence_armed());
    assert!(h.shutdown().1.is_ok());
}

#[test]
fn shutdown_drains_then_flushes_then_destroys() {
    let mut h = Harness::new(2);

    let log = h.log.clone();
    h.cycle.schedule_global(move || log.marker("global"));

    for frame in 0..3 {
        let log = h.log.clone();
        h.frame_with(move |rec| {
            rec.deletions
                .schedule(move || log.marker(format!("frame {frame}")));
            clear(rec)
        })
        .unwrap();
    }

    let before = h.log.len();
    let log = h.log.clone();
    let (device, result) = h.shutdown();
    result.unwrap();
    assert_eq!(device.live_objects(), 0);

    let events = log.events();
    let shutdown_events = &events[before..];
    let index = |pred: &dyn Fn(&Event) -> bool| {
        shutdown_events
            .iter()
            .position(|e| pred(e))
            .expect("event missing")
    };

    let last_wait = shutdown_events
        .iter()
        .rposition(|e| matches!(e, Event::FenceWaited { .. }))
        .unwrap();
    let frame2 = index(&|e| matches!(e, Event::Marker(m) if m == "frame 2"));
    let frame1 = index(&|e| matches!(e, Event::Marker(m) if m == "frame 1"));
    let global = index(&|e| matches!(e, Event::Marker(m) if m == "global"));
    let first_destroy = index(&|e| {
        matches!(
            e,
            Event::FenceDestroyed(_) | Event::SemaphoreDestroyed(_) | Event::RecorderDestroyed(_)
        )
    });

    assert_eq!(
        shutdown_events
            .iter()
            .filter(|e| matches!(e, Event::FenceWaited { .. }))
            .count(),
        2
    );
    assert!(last_wait < frame2);
    assert!(frame2 < frame1);
    assert!(frame1 < global);
    assert!(global < first_destroy);
    assert!(shutdown_events
        .iter()
        .all(|e| !matches!(e, Event::Marker(m) if m == "frame 0")));
}

#[test]
fn creation_failure_releases_partial_ring() {
    let log = EventLog::new();
    let mut device = MockDevice::new(log);
    device.fail_fence_creation_at(1);

    let err = FrameCycle::new(&mut device, FrameConfig::default())
        .err()
        .expect("second slot's fence should fail");
    assert!(matches!(
        err,
        FrameError::Creation {
            what: "fence",
            slot: 1,
            ..
        }
    ));
    assert_eq!(device.live_objects(), 0);

    let mut device = MockDevice::new(EventLog::new());
    device.fail_recorder_creation_at(0);
    let err = FrameCycle::new(&mut device, FrameConfig::default())
        .err()
        .expect("recorder creation should fail");
    assert!(matches!(
        err,
        FrameError::Creation {
            what: "recorder",
            slot: 0,
            ..
        }
    ));
    assert_eq!(device.live_objects(), 0);
}

#[test]
fn invalid_config_rejected_before_creation() {
    let mut device = MockDevice::new(EventLog::new());
    let err = FrameCycle::new(&mut device, FrameConfig::default().with_frame_overlap(0))
        .err()
        .expect("zero overlap should be rejected");
    assert!(matches!(err, FrameError::Config(_)));
    assert!(device.log().is_empty());
}
