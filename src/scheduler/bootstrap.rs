/*!
 * Scheduler Bootstrap
 *
 * One-time startup: timer service, idle hook, the switch hook that flips
 * the scheduler state on the first dispatch, the tick hook, then the host
 * scheduler itself.
 */

use super::types::{SchedulerHooks, SchedulerState};
use crate::core::errors::{collapse, ShimError, ShimResult};
use crate::host::{HostHook, HostKernel};
use crate::shim::Shim;
use std::sync::Arc;

impl<H: HostKernel> Shim<H> {
    /// Start the host scheduler
    ///
    /// Returns once the host is dispatching; a second call fails.
    pub fn start_scheduler(&self, hooks: SchedulerHooks) -> ShimResult<()> {
        let core = &self.core;
        if !core.scheduler.claim_bootstrap() {
            tracing::warn!("scheduler already started");
            return Err(ShimError::Fail);
        }
        let host = &*core.host;

        if let Err(error) = host.timer_thread_init(&core.config.timer_daemon_name) {
            tracing::error!(%error, "timer service failed to start");
            core.scheduler.release_bootstrap();
            return Err(ShimError::Fail);
        }

        if let Some(idle) = hooks.idle {
            host.set_idle_hook(Some(idle));
        }

        // Weak: the hook lives in the host, which the core itself owns
        let weak = Arc::downgrade(core);
        let switch: HostHook = Arc::new(move || {
            if let Some(core) = weak.upgrade() {
                if core.scheduler.mark_running() {
                    tracing::debug!("first context switch");
                }
            }
        });
        host.set_scheduler_hook(Some(switch));
        core.scheduler.set_tick_hook(hooks.tick);

        let started = collapse(host.scheduler_start(), "scheduler_start", ShimError::Fail);
        if started.is_err() {
            host.set_scheduler_hook(None);
            core.scheduler.release_bootstrap();
        }
        started
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.core.scheduler.state()
    }

    /// Advance the host tick by one and run the tick hook
    ///
    /// Never requests a context switch.
    pub fn increment_tick(&self) -> bool {
        self.core.host.tick_increase();
        if let Some(hook) = self.core.scheduler.tick_hook() {
            hook();
        }
        false
    }

    pub fn tick_rate_hz(&self) -> u32 {
        self.core.host.tick_rate_hz()
    }
}
