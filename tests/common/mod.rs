/*!
 * Shared helpers for integration tests
 */

#![allow(dead_code)]

use rtos_shim::{SchedulerHooks, Shim, ShimConfig, SimConfig, SimKernel};
use std::sync::Arc;
use std::time::Duration;

/// Generous bound for cross-thread handoffs on a loaded CI machine
pub const HANDOFF: Duration = Duration::from_secs(5);

pub fn sim() -> (Arc<SimKernel>, Shim<SimKernel>) {
    sim_with(SimConfig::default(), ShimConfig::default())
}

pub fn sim_with(host: SimConfig, config: ShimConfig) -> (Arc<SimKernel>, Shim<SimKernel>) {
    let kernel = SimKernel::new(host);
    let shim = Shim::new(kernel.clone(), config);
    (kernel, shim)
}

/// Shim whose scheduler is already running
pub fn running() -> (Arc<SimKernel>, Shim<SimKernel>) {
    let (kernel, shim) = sim();
    shim.start_scheduler(SchedulerHooks::new())
        .expect("scheduler start");
    (kernel, shim)
}

pub fn running_with(host: SimConfig, config: ShimConfig) -> (Arc<SimKernel>, Shim<SimKernel>) {
    let (kernel, shim) = sim_with(host, config);
    shim.start_scheduler(SchedulerHooks::new())
        .expect("scheduler start");
    (kernel, shim)
}

/// Receive one report from a task, failing the test on timeout
pub fn expect_report<T>(rx: &flume::Receiver<T>) -> T {
    rx.recv_timeout(HANDOFF).expect("task did not report in time")
}

/// Poll `cond` until it holds or the handoff bound passes
pub fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + HANDOFF;
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}
