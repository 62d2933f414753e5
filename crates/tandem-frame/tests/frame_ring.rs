//! Frame ring indexing and ownership.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tandem_frame::FrameRing;
use tandem_test::{EventLog, MockDevice};

#[test]
fn current_slot_follows_counter_modulo_overlap() {
    let mut device = MockDevice::new(EventLog::new());
    let mut ring = FrameRing::new(&mut device, 3).unwrap();

    let mut seen = Vec::new();
    for _ in 0..7 {
        seen.push(ring.current_index());
        assert_eq!(ring.current().index(), ring.current_index());
        ring.advance();
    }

    assert_eq!(seen, vec![0, 1, 2, 0, 1, 2, 0]);
    assert_eq!(ring.frame_number(), 7);
    ring.destroy(&mut device, Duration::from_secs(1)).unwrap();
}

#[test]
fn selecting_a_slot_has_no_side_effects() {
    let log = EventLog::new();
    let mut device = MockDevice::new(log.clone());
    let ring = FrameRing::new(&mut device, 2).unwrap();
    let created = log.len();

    let first = ring.current().index();
    let second = ring.current().index();

    assert_eq!(first, second);
    assert_eq!(ring.frame_number(), 0);
    assert_eq!(log.len(), created);
    ring.destroy(&mut device, Duration::from_secs(1)).unwrap();
}

#[test]
fn slots_own_distinct_primitives() {
    let mut device = MockDevice::new(EventLog::new());
    let ring = FrameRing::new(&mut device, 2).unwrap();

    let a = ring.slot(0).unwrap();
    let b = ring.slot(1).unwrap();
    assert_ne!(a.fence(), b.fence());
    assert_ne!(a.image_acquired(), b.image_acquired());
    assert_ne!(a.render_finished(), b.render_finished());
    assert_ne!(a.image_acquired(), a.render_finished());
    assert_ne!(a.recorder().id(), b.recorder().id());
    assert!(ring.slot(2).is_none());

    // Fences start signaled so the first wait never blocks.
    assert!(device.fence_signaled(*a.fence()));
    assert!(device.fence_signaled(*b.fence()));

    ring.destroy(&mut device, Duration::from_secs(1)).unwrap();
    assert_eq!(device.live_objects(), 0);
}

#[test]
fn global_queue_flushes_in_reverse() {
    let mut device = MockDevice::new(EventLog::new());
    let mut ring = FrameRing::new(&mut device, 2).unwrap();

    let order = Rc::new(RefCell::new(Vec::new()));
    for name in ["allocator", "pipeline", "scratch"] {
        let order = Rc::clone(&order);
        ring.schedule_global(move || order.borrow_mut().push(name));
    }
    assert_eq!(ring.global_deletion_queue().len(), 3);

    ring.flush_global().unwrap();
    assert_eq!(*order.borrow(), vec!["scratch", "pipeline", "allocator"]);
    assert!(ring.global_deletion_queue().is_empty());

    // Already flushed; shutdown has nothing left to run.
    ring.destroy(&mut device, Duration::from_secs(1)).unwrap();
    assert_eq!(order.borrow().len(), 3);
}

#[test]
fn slot_queue_flushed_at_destroy() {
    let mut device = MockDevice::new(EventLog::new());
    let mut ring = FrameRing::new(&mut device, 2).unwrap();

    let ran = Rc::new(RefCell::new(Vec::new()));
    for index in 0..2 {
        let ran = Rc::clone(&ran);
        ring.advance();
        let slot = ring.current_mut();
        assert_eq!(slot.index(), (index + 1) % 2);
        slot.deletion_queue_mut()
            .schedule(move || ran.borrow_mut().push(index));
    }
    assert_eq!(ring.slot(0).unwrap().deletion_queue().len(), 1);

    ring.destroy(&mut device, Duration::from_secs(1)).unwrap();

    // Slot 0 is drained before slot 1.
    assert_eq!(*ran.borrow(), vec![1, 0]);
}
