/*!
 * Task Notification Tests
 */

mod common;

use common::{eventually, expect_report, running, running_with, sim};
use pretty_assertions::assert_eq;
use rtos_shim::{
    NotifyAction, ShimConfig, ShimError, SimConfig, TaskSpec, MAX_DELAY,
};

/// Task that parks forever so its slots stay untouched by the test body
fn parked(shim: &rtos_shim::Shim<rtos_shim::SimKernel>) -> rtos_shim::TaskHandle<rtos_shim::SimKernel> {
    let sleeper = shim.clone();
    shim.task_create(TaskSpec::new("parked"), move || loop {
        sleeper.delay(1_000);
    })
    .unwrap()
}

#[test]
fn test_no_overwrite_without_waiter_stores_value() {
    let (_kernel, shim) = sim();
    let task = parked(&shim);
    task.notify(0, 5, NotifyAction::SetOverwrite, None).unwrap();

    let mut previous = 0;
    task.notify(0, 7, NotifyAction::SetNoOverwrite, Some(&mut previous))
        .unwrap();
    assert_eq!(previous, 5);
    assert_eq!(task.notify_value_clear(0, 0), 7);
}

#[test]
fn test_no_overwrite_with_blocked_waiter_fails() {
    let (_kernel, shim) = running();
    let (tx, rx) = flume::unbounded();
    let waiter = shim.clone();
    let task = shim
        .task_create(TaskSpec::new("waiter"), move || {
            let _ = tx.send(waiter.notify_wait(0, 0, u32::MAX, MAX_DELAY));
        })
        .unwrap();

    // A zero write wakes nobody, so it is safe to retry until the waiter parks
    assert!(eventually(|| {
        task.notify(0, 0, NotifyAction::SetNoOverwrite, None) == Err(ShimError::Fail)
    }));
    let mut previous = u32::MAX;
    assert_eq!(
        task.notify(0, 7, NotifyAction::SetNoOverwrite, Some(&mut previous)),
        Err(ShimError::Fail)
    );
    assert_eq!(previous, 0);

    task.notify(0, 9, NotifyAction::SetOverwrite, Some(&mut previous))
        .unwrap();
    assert_eq!(previous, 0);
    assert_eq!(expect_report(&rx), Ok(9));
}

#[test]
fn test_no_action_unblocks_waiter() {
    let (_kernel, shim) = running();
    let (tx, rx) = flume::unbounded();
    let (ready_tx, ready_rx) = flume::unbounded::<()>();
    let waiter = shim.clone();
    let task = shim
        .task_create(TaskSpec::new("waiter"), move || {
            let _ = ready_tx.send(());
            let woke = waiter.notify_wait(0, u32::MAX, u32::MAX, MAX_DELAY);
            let taken = waiter.notify_take(1, true, MAX_DELAY);
            let _ = tx.send((woke, taken));
        })
        .unwrap();

    expect_report(&ready_rx);
    assert!(eventually(|| task.notify(0, 0, NotifyAction::SetNoOverwrite, None).is_err()));
    task.notify(0, 0xF0, NotifyAction::NoActionJustUnblock, None).unwrap();

    assert!(eventually(|| task.notify(1, 0, NotifyAction::SetNoOverwrite, None).is_err()));
    task.notify(1, 0, NotifyAction::NoActionJustUnblock, None).unwrap();

    // Both waits see only the marker bit
    assert_eq!(expect_report(&rx), (Ok(1), 1));
}

#[test]
fn test_actions_update_value() {
    let (_kernel, shim) = sim();
    let task = parked(&shim);
    task.notify(0, 0b0011, NotifyAction::SetBits, None).unwrap();
    task.notify(0, 0b0100, NotifyAction::SetBits, None).unwrap();
    assert_eq!(task.notify_value_clear(0, 0), 0b0111);

    task.notify_give(0).unwrap();
    assert_eq!(task.notify_value_clear(0, 0), 0b1000);

    // Only the unblock marker bit lands in the value
    task.notify(0, 0xFF, NotifyAction::NoActionJustUnblock, None).unwrap();
    assert_eq!(task.notify_value_clear(0, u32::MAX), 0b1001);
    assert_eq!(task.notify_value_clear(0, 0), 0);
}

#[test]
fn test_state_clear_reports_pending_only() {
    let (_kernel, shim) = sim();
    let task = parked(&shim);
    assert!(!task.notify_state_clear(0));
    task.notify_give(0).unwrap();
    assert!(task.notify_state_clear(0));
    assert_eq!(task.notify_value_clear(0, 0), 1);
}

#[test]
fn test_take_counts_gives() {
    let (_kernel, shim) = running();
    let (tx, rx) = flume::unbounded();
    let (go_tx, go_rx) = flume::unbounded::<()>();
    let waiter = shim.clone();
    let task = shim
        .task_create(TaskSpec::new("taker"), move || {
            let _ = go_rx.recv();
            let first = waiter.notify_take(0, false, MAX_DELAY);
            let second = waiter.notify_take(0, true, MAX_DELAY);
            let timed_out = waiter.notify_take(0, true, 5);
            let _ = tx.send((first, second, timed_out));
        })
        .unwrap();

    for _ in 0..3 {
        task.notify_give(0).unwrap();
    }
    go_tx.send(()).unwrap();
    assert_eq!(expect_report(&rx), (3, 2, 0));
}

#[test]
fn test_wait_clears_on_entry_and_exit() {
    let (_kernel, shim) = running();
    let (tx, rx) = flume::unbounded();
    let (ready_tx, ready_rx) = flume::unbounded::<()>();
    let waiter = shim.clone();
    let task = shim
        .task_create(TaskSpec::new("waiter"), move || {
            let _ = ready_tx.send(());
            let value = waiter.notify_wait(0, u32::MAX, 0b01, MAX_DELAY);
            let _ = tx.send(value);
        })
        .unwrap();

    expect_report(&ready_rx);
    std::thread::sleep(std::time::Duration::from_millis(20));
    task.notify(0, 0b11, NotifyAction::SetBits, None).unwrap();
    assert_eq!(expect_report(&rx), Ok(0b11));
    assert!(eventually(|| task.notify_value_clear(0, 0) == 0b10));
}

#[test]
fn test_wait_times_out_with_fail() {
    let (_kernel, shim) = running();
    let (tx, rx) = flume::unbounded();
    let waiter = shim.clone();
    shim.task_create(TaskSpec::new("waiter"), move || {
        let _ = tx.send(waiter.notify_wait(0, 0, 0, 5));
    })
    .unwrap();
    assert_eq!(expect_report(&rx), Err(ShimError::Fail));
}

#[test]
fn test_wait_outside_task_fails() {
    let (_kernel, shim) = running();
    assert_eq!(shim.notify_wait(0, 0, 0, 0), Err(ShimError::Fail));
    assert_eq!(shim.notify_take(0, true, 0), 0);
}

#[test]
fn test_indexed_slots_are_independent() {
    let (_kernel, shim) = running_with(SimConfig::default(), ShimConfig::with_notification_entries(3));
    let task = parked(&shim);
    assert_eq!(task.notification_slots(), 3);
    task.notify(2, 9, NotifyAction::SetOverwrite, None).unwrap();
    assert_eq!(task.notify_value_clear(0, 0), 0);
    assert_eq!(task.notify_value_clear(2, 0), 9);
}

#[test]
#[should_panic(expected = "out of range")]
fn test_index_out_of_range_panics() {
    let (_kernel, shim) = sim();
    let task = parked(&shim);
    let _ = task.notify(1, 0, NotifyAction::Increment, None);
}

#[test]
fn test_notify_deleted_task_fails() {
    let (_kernel, shim) = sim();
    let task = parked(&shim);
    let alias = task.clone();
    shim.task_delete(Some(task));
    assert_eq!(alias.notify_give(0), Err(ShimError::Fail));
}

#[test]
fn test_isr_notify_reports_no_yield() {
    let (kernel, shim) = sim();
    let task = parked(&shim);
    kernel.run_in_isr(|| {
        let mut woken = true;
        task.notify_from_isr(0, 4, NotifyAction::SetOverwrite, None, Some(&mut woken))
            .unwrap();
        assert!(!woken);
        woken = true;
        task.notify_give_from_isr(0, Some(&mut woken));
        assert!(!woken);
    });
    assert_eq!(task.notify_value_clear(0, 0), 5);
}
