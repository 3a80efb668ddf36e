/*!
 * Scheduler Types
 * Run state of the emulated scheduler and the hooks installed at startup
 */

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Scheduler run state as reported by the emulated API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SchedulerState {
    NotStarted = 1,
    Running = 2,
}

impl SchedulerState {
    #[inline]
    const fn from_u8(raw: u8) -> Self {
        match raw {
            2 => SchedulerState::Running,
            _ => SchedulerState::NotStarted,
        }
    }
}

/// Callback installed into the host (idle loop, tick)
pub type HookFn = Arc<dyn Fn() + Send + Sync + 'static>;

/// Application hooks wired up by `start_scheduler`
#[derive(Clone, Default)]
pub struct SchedulerHooks {
    pub idle: Option<HookFn>,
    pub tick: Option<HookFn>,
}

impl SchedulerHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.idle = Some(Arc::new(hook));
        self
    }

    pub fn with_tick_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.tick = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for SchedulerHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerHooks")
            .field("idle", &self.idle.is_some())
            .field("tick", &self.tick.is_some())
            .finish()
    }
}

/// Per-shim scheduler bookkeeping
pub(crate) struct SchedulerCell {
    state: AtomicU8,
    bootstrapped: AtomicBool,
    tick_hook: RwLock<Option<HookFn>>,
}

impl SchedulerCell {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(SchedulerState::NotStarted as u8),
            bootstrapped: AtomicBool::new(false),
            tick_hook: RwLock::new(None),
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    /// NotStarted -> Running; later calls are no-ops
    pub(crate) fn mark_running(&self) -> bool {
        self.state
            .compare_exchange(
                SchedulerState::NotStarted as u8,
                SchedulerState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Claim the one-time bootstrap; false if already claimed
    pub(crate) fn claim_bootstrap(&self) -> bool {
        !self.bootstrapped.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn release_bootstrap(&self) {
        self.bootstrapped.store(false, Ordering::Release);
    }

    pub(crate) fn set_tick_hook(&self, hook: Option<HookFn>) {
        *self.tick_hook.write() = hook;
    }

    pub(crate) fn tick_hook(&self) -> Option<HookFn> {
        self.tick_hook.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_happens_once() {
        let cell = SchedulerCell::new();
        assert_eq!(cell.state(), SchedulerState::NotStarted);
        assert!(cell.mark_running());
        assert!(!cell.mark_running());
        assert!(cell.is_running());
    }

    #[test]
    fn test_bootstrap_claim() {
        let cell = SchedulerCell::new();
        assert!(cell.claim_bootstrap());
        assert!(!cell.claim_bootstrap());
        cell.release_bootstrap();
        assert!(cell.claim_bootstrap());
    }

    #[test]
    fn test_hooks_builder() {
        let hooks = SchedulerHooks::new().with_idle_hook(|| {});
        assert!(hooks.idle.is_some());
        assert!(hooks.tick.is_none());
    }
}
