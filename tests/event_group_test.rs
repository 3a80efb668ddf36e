/*!
 * Event Group Tests
 * Native all-bits waits and the polling fallback must agree
 */

mod common;

use common::{expect_report, running_with, sim_with};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rtos_shim::{ShimConfig, SimConfig, TaskSpec, WaitOutcome, WaitRequest, MAX_DELAY, NO_WAIT};

fn hosts() -> [SimConfig; 2] {
    [SimConfig::default(), SimConfig::without_all_bits_wait()]
}

#[test]
fn test_wait_all_without_clear_keeps_bits() {
    for host in hosts() {
        let (_kernel, shim) = sim_with(host, ShimConfig::default());
        let group = shim.event_group_create().unwrap();
        group.set_bits(0b1010);
        assert_eq!(group.wait_bits(0b1010, false, true, NO_WAIT), 0b1010);
        assert_eq!(group.get_bits(), 0b1010);
    }
}

#[test]
fn test_clear_on_exit_clears_only_mask() {
    for host in hosts() {
        let (_kernel, shim) = sim_with(host, ShimConfig::default());
        let group = shim.event_group_create().unwrap();
        group.set_bits(0b110);
        assert_eq!(group.wait_bits(0b100, true, true, NO_WAIT), 0b110);
        assert_eq!(group.get_bits(), 0b010);
    }
}

#[test]
fn test_timeout_reports_current_bits() {
    for host in hosts() {
        let (_kernel, shim) = sim_with(host, ShimConfig::default());
        let group = shim.event_group_create().unwrap();
        group.set_bits(0b01);
        let outcome = group.wait(WaitRequest {
            mask: 0b11,
            clear_on_exit: true,
            wait_for_all: true,
            ticks: 5,
        });
        assert_eq!(outcome, WaitOutcome::TimedOut(0b01));
        assert_eq!(group.get_bits(), 0b01);
    }
}

#[test]
fn test_all_bits_arrive_from_separate_tasks() {
    for host in hosts() {
        let (_kernel, shim) = running_with(host, ShimConfig::default());
        let group = shim.event_group_create().unwrap();
        let (tx, rx) = flume::unbounded();

        let waiter = group.clone();
        shim.task_create(TaskSpec::new("waiter"), move || {
            let outcome = waiter.wait(WaitRequest {
                mask: 0b11,
                clear_on_exit: true,
                wait_for_all: true,
                ticks: MAX_DELAY,
            });
            let _ = tx.send(outcome);
        })
        .unwrap();

        for bit in [0b01, 0b10] {
            let setter = group.clone();
            shim.task_create(TaskSpec::new("setter"), move || {
                setter.set_bits(bit);
            })
            .unwrap();
            std::thread::sleep(std::time::Duration::from_millis(10));
        }

        let outcome = expect_report(&rx);
        assert!(outcome.is_satisfied());
        assert_eq!(outcome.bits() & 0b11, 0b11);
        assert_eq!(group.get_bits() & 0b11, 0);
    }
}

#[test]
fn test_sync_sets_then_waits_and_clears() {
    let (_kernel, shim) = sim_with(SimConfig::default(), ShimConfig::default());
    let group = shim.event_group_create().unwrap();
    group.set_bits(0b1011);
    assert_eq!(group.sync(0b100, 0b111, NO_WAIT), 0b1111);
    assert_eq!(group.get_bits(), 0b1000);

    // Own bit stays set when the others never arrive
    let bits = group.sync(0b001, 0b011, 5);
    assert_eq!(bits & 0b011, 0b001);
    assert_eq!(group.get_bits(), 0b1001);
}

#[test]
fn test_isr_set_and_clear() {
    let (kernel, shim) = sim_with(SimConfig::default(), ShimConfig::default());
    let group = shim.event_group_create().unwrap();
    kernel.run_in_isr(|| {
        let mut woken = true;
        group.set_bits_from_isr(0b11, Some(&mut woken)).unwrap();
        assert!(!woken);
        group.clear_bits_from_isr(0b01).unwrap();
        assert_eq!(group.get_bits_from_isr(), 0b10);
    });
}

#[test]
fn test_static_group_allocates_nothing() {
    let (kernel, shim) = sim_with(SimConfig::default(), ShimConfig::default());
    let group = shim.event_group_create_static().unwrap();
    group.set_bits(1);
    group.delete();
    assert_eq!(kernel.heap_stats().allocations, 0);
    assert_eq!(shim.registry_stats().events, 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_fallback_matches_native(
        initial in any::<u32>(),
        mask in 1u32..=u32::MAX,
        clear in any::<bool>(),
        all in any::<bool>(),
    ) {
        let mut results = Vec::new();
        for host in hosts() {
            let (_kernel, shim) = sim_with(host, ShimConfig::default());
            let group = shim.event_group_create().unwrap();
            group.set_bits(initial);
            let outcome = group.wait(WaitRequest {
                mask,
                clear_on_exit: clear,
                wait_for_all: all,
                ticks: NO_WAIT,
            });
            results.push((outcome, group.get_bits()));
        }
        prop_assert_eq!(results[0], results[1]);
    }

    #[test]
    fn prop_clear_bits_leaves_complement(initial in any::<u32>(), mask in any::<u32>()) {
        let (_kernel, shim) = sim_with(SimConfig::default(), ShimConfig::default());
        let group = shim.event_group_create().unwrap();
        group.set_bits(initial);
        prop_assert_eq!(group.clear_bits(mask), initial & !mask);
        prop_assert_eq!(group.get_bits(), initial & !mask);
    }
}
