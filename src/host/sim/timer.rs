/*!
 * Sim Timers
 *
 * Soft timers served by one daemon thread. An armed timer owns exactly one
 * entry in the deadline map; re-arming or stopping removes it. Each arm
 * also bumps a generation so an entry the daemon already took is skipped.
 */

use super::SimKernel;
use crate::core::types::{ReloadMode, Tick};
use crate::host::types::{HostError, HostResult, HostTimerCallback, TimerControl, TimerInfo};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct TimerSlot {
    period: Tick,
    mode: ReloadMode,
    active: bool,
    deadline: Option<Instant>,
    /// Key of this timer's entry in the deadline map
    pending: Option<(Instant, u64)>,
    generation: u64,
    detached: bool,
}

pub(super) struct TimerCtl {
    name: String,
    callback: HostTimerCallback,
    slot: Mutex<TimerSlot>,
}

/// Host timer object of the sim
pub struct SimTimer(Arc<TimerCtl>);

impl fmt::Debug for SimTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimTimer")
            .field("name", &self.0.name)
            .field("slot", &*self.0.slot.lock())
            .finish()
    }
}

struct Pending {
    timer: Weak<TimerCtl>,
    generation: u64,
}

#[derive(Default)]
struct Schedule {
    pending: BTreeMap<(Instant, u64), Pending>,
    seq: u64,
    shutdown: bool,
}

/// Deadline queue plus the daemon that drains it
pub(super) struct TimerService {
    tick: Duration,
    schedule: Mutex<Schedule>,
    wake: Condvar,
    started: AtomicBool,
}

impl TimerService {
    pub fn new(tick: Duration) -> Self {
        Self {
            tick,
            schedule: Mutex::new(Schedule::default()),
            wake: Condvar::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Queue `timer` for `at`, replacing its previous entry; caller holds the slot
    fn arm(&self, timer: &Arc<TimerCtl>, slot: &mut TimerSlot, at: Instant) {
        let mut schedule = self.schedule.lock();
        if let Some(stale) = slot.pending.take() {
            schedule.pending.remove(&stale);
        }
        schedule.seq += 1;
        let key = (at, schedule.seq);
        schedule.pending.insert(
            key,
            Pending {
                timer: Arc::downgrade(timer),
                generation: slot.generation,
            },
        );
        slot.pending = Some(key);
        drop(schedule);
        self.wake.notify_one();
    }

    fn disarm(&self, slot: &mut TimerSlot) {
        if let Some(stale) = slot.pending.take() {
            self.schedule.lock().pending.remove(&stale);
        }
    }

    #[cfg(test)]
    pub(super) fn pending_len(&self) -> usize {
        self.schedule.lock().pending.len()
    }

    /// Spawn the daemon once
    pub fn start(self: &Arc<Self>, name: &str) -> HostResult<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let service = Arc::clone(self);
        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || service.run())
            .map(|_| ())
            .map_err(|e| {
                self.started.store(false, Ordering::Release);
                tracing::error!(error = %e, "failed to spawn timer daemon");
                HostError::NoMemory
            })
    }

    pub fn shutdown(&self) {
        self.schedule.lock().shutdown = true;
        self.wake.notify_all();
    }

    fn run(&self) {
        loop {
            let mut schedule = self.schedule.lock();
            if schedule.shutdown {
                return;
            }
            let Some((&key, _)) = schedule.pending.first_key_value() else {
                self.wake.wait(&mut schedule);
                continue;
            };
            if key.0 > Instant::now() {
                self.wake.wait_until(&mut schedule, key.0);
                continue;
            }
            let due = schedule.pending.remove(&key);
            drop(schedule);

            if let Some(due) = due {
                self.fire(due, key.0);
            }
        }
    }

    fn fire(&self, due: Pending, at: Instant) {
        let Some(timer) = due.timer.upgrade() else {
            return;
        };
        {
            let mut slot = timer.slot.lock();
            if slot.generation != due.generation || !slot.active || slot.detached {
                return;
            }
            slot.pending = None;
            match slot.mode {
                ReloadMode::Periodic => {
                    let next = at + self.tick * slot.period;
                    slot.deadline = Some(next);
                    self.arm(&timer, &mut slot, next);
                }
                ReloadMode::OneShot => {
                    slot.active = false;
                    slot.deadline = None;
                }
            }
        }
        (timer.callback)();
    }
}

impl SimKernel {
    pub(super) fn timer_init_impl(
        &self,
        name: &str,
        period: Tick,
        mode: ReloadMode,
        callback: HostTimerCallback,
    ) -> HostResult<SimTimer> {
        if period == 0 {
            return Err(HostError::Invalid);
        }
        Ok(SimTimer(Arc::new(TimerCtl {
            name: name.to_string(),
            callback,
            slot: Mutex::new(TimerSlot {
                period,
                mode,
                active: false,
                deadline: None,
                pending: None,
                generation: 0,
                detached: false,
            }),
        })))
    }

    pub(super) fn timer_start_impl(&self, timer: &SimTimer) -> HostResult<()> {
        let mut slot = timer.0.slot.lock();
        if slot.detached {
            return Err(HostError::Error);
        }
        let at = Instant::now() + self.clock.duration(slot.period);
        slot.generation += 1;
        slot.active = true;
        slot.deadline = Some(at);
        self.timers.arm(&timer.0, &mut slot, at);
        Ok(())
    }

    pub(super) fn timer_stop_impl(&self, timer: &SimTimer) -> HostResult<()> {
        let mut slot = timer.0.slot.lock();
        if slot.detached {
            return Err(HostError::Error);
        }
        slot.generation += 1;
        slot.active = false;
        slot.deadline = None;
        self.timers.disarm(&mut slot);
        Ok(())
    }

    pub(super) fn timer_control_impl(
        &self,
        timer: &SimTimer,
        control: TimerControl,
    ) -> HostResult<()> {
        let mut slot = timer.0.slot.lock();
        if slot.detached {
            return Err(HostError::Error);
        }
        match control {
            TimerControl::SetPeriod(0) => return Err(HostError::Invalid),
            TimerControl::SetPeriod(period) => slot.period = period,
            TimerControl::SetMode(mode) => slot.mode = mode,
        }
        Ok(())
    }

    pub(super) fn timer_info_impl(&self, timer: &SimTimer) -> TimerInfo {
        let slot = timer.0.slot.lock();
        TimerInfo {
            period: slot.period,
            mode: slot.mode,
            active: slot.active,
            deadline: slot
                .deadline
                .filter(|_| slot.active)
                .map(|at| self.clock.tick_at(at)),
        }
    }

    pub(super) fn timer_detach_impl(&self, timer: &SimTimer) -> HostResult<()> {
        let mut slot = timer.0.slot.lock();
        if slot.detached {
            return Err(HostError::Error);
        }
        slot.detached = true;
        slot.active = false;
        slot.generation += 1;
        self.timers.disarm(&mut slot);
        Ok(())
    }
}
