/*!
 * Software Timer Facade
 *
 * One-shot and periodic timers mapped onto the host timer object. Every
 * command goes through one dispatch; a deleted timer rejects them all.
 */

use super::types::{TimerCommand, TimerId, TimerState};
use crate::core::control::ControlBlock;
use crate::core::errors::{collapse, init_error, ShimError, ShimResult};
use crate::core::registry::{ObjectKey, ObjectTag};
use crate::core::types::{report_no_yield, AllocationMode, ReloadMode, Tick};
use crate::host::{HostKernel, TimerControl};
use crate::shim::{Shim, ShimCore};
use parking_lot::Mutex;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// Expiry callback; receives the timer that fired
pub type TimerCallback<H> = Arc<dyn Fn(&Timer<H>) + Send + Sync + 'static>;

pub struct TimerObject<H: HostKernel> {
    core: Arc<ShimCore<H>>,
    name: String,
    mode: AllocationMode,
    timer: H::Timer,
    timer_id: Mutex<Option<TimerId>>,
    deleted: AtomicBool,
    control: Mutex<Option<ControlBlock>>,
    number: AtomicU32,
}

impl<H: HostKernel> Drop for TimerObject<H> {
    fn drop(&mut self) {
        self.core.registry.forget(ObjectKey::of(self));
    }
}

/// Handle to a software timer
pub struct Timer<H: HostKernel>(Arc<TimerObject<H>>);

impl<H: HostKernel> Clone for Timer<H> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<H: HostKernel> PartialEq for Timer<H> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<H: HostKernel> Eq for Timer<H> {}

impl<H: HostKernel> fmt::Debug for Timer<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("name", &self.0.name)
            .field("mode", &self.0.mode)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Construction
// ============================================================================

impl<H: HostKernel> Shim<H> {
    fn create_timer(
        &self,
        name: &str,
        period: Tick,
        auto_reload: bool,
        timer_id: Option<TimerId>,
        mode: AllocationMode,
        callback: TimerCallback<H>,
    ) -> ShimResult<Timer<H>> {
        let core = &self.core;
        let host = &*core.host;
        let control = ControlBlock::reserve(host, mode, mem::size_of::<TimerObject<H>>())?;

        // The host callback is built before the object exists; it finds the
        // handle through this cell once creation completes
        let cell: Arc<OnceLock<Weak<TimerObject<H>>>> = Arc::new(OnceLock::new());
        let fired = Arc::clone(&cell);
        let host_callback = Box::new(move || {
            if let Some(object) = fired.get().and_then(Weak::upgrade) {
                callback(&Timer(object));
            }
        });

        let reload = ReloadMode::from_auto_reload(auto_reload);
        let timer = match host.timer_init(name, period, reload, host_callback) {
            Ok(timer) => timer,
            Err(e) => {
                tracing::warn!(name, period, "host timer init failed");
                control.release(host);
                return Err(init_error(e));
            }
        };

        let object = Arc::new(TimerObject {
            core: Arc::clone(core),
            name: name.to_string(),
            mode,
            timer,
            timer_id: Mutex::new(timer_id),
            deleted: AtomicBool::new(false),
            control: Mutex::new(Some(control)),
            number: AtomicU32::new(0),
        });
        let _ = cell.set(Arc::downgrade(&object));
        core.registry.register(ObjectKey::of(&*object), ObjectTag::Timer);
        tracing::debug!(name, period, ?reload, ?mode, "timer created");
        Ok(Timer(object))
    }

    /// Create a dormant timer; `auto_reload` makes it periodic
    pub fn timer_create(
        &self,
        name: &str,
        period: Tick,
        auto_reload: bool,
        timer_id: Option<TimerId>,
        callback: impl Fn(&Timer<H>) + Send + Sync + 'static,
    ) -> ShimResult<Timer<H>> {
        self.create_timer(
            name,
            period,
            auto_reload,
            timer_id,
            AllocationMode::Dynamic,
            Arc::new(callback),
        )
    }

    pub fn timer_create_static(
        &self,
        name: &str,
        period: Tick,
        auto_reload: bool,
        timer_id: Option<TimerId>,
        callback: impl Fn(&Timer<H>) + Send + Sync + 'static,
    ) -> ShimResult<Timer<H>> {
        self.create_timer(
            name,
            period,
            auto_reload,
            timer_id,
            AllocationMode::Static,
            Arc::new(callback),
        )
    }

    /// Deferred calls need a host work queue, which the host lacks
    pub fn pend_function_call(
        &self,
        _function: impl FnOnce() + Send + 'static,
        _ticks: Tick,
    ) -> ShimResult<()> {
        tracing::warn!("pend_function_call is not supported by the host");
        Err(ShimError::NotSupported("pend_function_call"))
    }

    pub fn pend_function_call_from_isr(
        &self,
        function: impl FnOnce() + Send + 'static,
        woken: Option<&mut bool>,
    ) -> ShimResult<()> {
        report_no_yield(woken);
        self.pend_function_call(function, 0)
    }
}

// ============================================================================
// Commands
// ============================================================================

impl<H: HostKernel> Timer<H> {
    #[inline]
    fn host(&self) -> &H {
        &self.0.core.host
    }

    /// Run one timer command
    ///
    /// `value` is the new period for the change-period commands.
    /// `_ticks_to_wait` is accepted for signature parity: commands apply
    /// synchronously and never queue.
    pub fn generic_command(
        &self,
        command: TimerCommand,
        value: Tick,
        woken: Option<&mut bool>,
        _ticks_to_wait: Tick,
    ) -> ShimResult<()> {
        report_no_yield(woken);
        if self.0.deleted.load(Ordering::Acquire) {
            tracing::warn!(name = %self.0.name, %command, "command on a deleted timer");
            return Err(ShimError::Fail);
        }

        let host = self.host();
        let timer = &self.0.timer;
        match command {
            TimerCommand::StartDontTrace
            | TimerCommand::Start
            | TimerCommand::Reset
            | TimerCommand::StartFromIsr
            | TimerCommand::ResetFromIsr => {
                collapse(host.timer_start(timer), "timer_start", ShimError::Fail)
            }
            TimerCommand::Stop | TimerCommand::StopFromIsr => {
                collapse(host.timer_stop(timer), "timer_stop", ShimError::Fail)
            }
            TimerCommand::ChangePeriod | TimerCommand::ChangePeriodFromIsr => {
                let result = host
                    .timer_control(timer, TimerControl::SetPeriod(value))
                    .and_then(|()| host.timer_start(timer));
                collapse(result, "timer_control", ShimError::Fail)
            }
            TimerCommand::Delete => {
                self.delete_now();
                Ok(())
            }
            TimerCommand::ExecuteCallback | TimerCommand::ExecuteCallbackFromIsr => {
                tracing::warn!(name = %self.0.name, %command, "timer command not supported");
                Err(ShimError::NotSupported("pended callback execution"))
            }
        }
    }

    /// Dispatch a raw command number; unknown numbers are `NotSupported`
    pub fn generic_command_raw(
        &self,
        raw: i32,
        value: Tick,
        woken: Option<&mut bool>,
        ticks_to_wait: Tick,
    ) -> ShimResult<()> {
        match TimerCommand::from_raw(raw) {
            Some(command) => self.generic_command(command, value, woken, ticks_to_wait),
            None => {
                report_no_yield(woken);
                tracing::warn!(name = %self.0.name, raw, "unknown timer command");
                Err(ShimError::NotSupported("unknown timer command"))
            }
        }
    }

    fn delete_now(&self) {
        let object = &self.0;
        if object.deleted.swap(true, Ordering::AcqRel) {
            return;
        }
        let host = &*object.core.host;
        object.core.registry.retire(ObjectKey::of(&**object), ObjectTag::Timer);
        if let Err(error) = host.timer_detach(&object.timer) {
            tracing::warn!(name = %object.name, %error, "host detach failed");
        }
        if let Some(control) = object.control.lock().take() {
            control.release(host);
        }
        tracing::debug!(name = %object.name, mode = ?object.mode, "timer deleted");
    }

    pub fn start(&self, ticks_to_wait: Tick) -> ShimResult<()> {
        self.generic_command(TimerCommand::Start, 0, None, ticks_to_wait)
    }

    pub fn stop(&self, ticks_to_wait: Tick) -> ShimResult<()> {
        self.generic_command(TimerCommand::Stop, 0, None, ticks_to_wait)
    }

    /// Restart the period from now
    pub fn reset(&self, ticks_to_wait: Tick) -> ShimResult<()> {
        self.generic_command(TimerCommand::Reset, 0, None, ticks_to_wait)
    }

    /// Set a new period and re-arm; the reload mode is kept
    pub fn change_period(&self, period: Tick, ticks_to_wait: Tick) -> ShimResult<()> {
        self.generic_command(TimerCommand::ChangePeriod, period, None, ticks_to_wait)
    }

    pub fn delete(&self, ticks_to_wait: Tick) -> ShimResult<()> {
        self.generic_command(TimerCommand::Delete, 0, None, ticks_to_wait)
    }

    pub fn start_from_isr(&self, woken: Option<&mut bool>) -> ShimResult<()> {
        self.generic_command(TimerCommand::StartFromIsr, 0, woken, 0)
    }

    pub fn stop_from_isr(&self, woken: Option<&mut bool>) -> ShimResult<()> {
        self.generic_command(TimerCommand::StopFromIsr, 0, woken, 0)
    }

    pub fn reset_from_isr(&self, woken: Option<&mut bool>) -> ShimResult<()> {
        self.generic_command(TimerCommand::ResetFromIsr, 0, woken, 0)
    }

    pub fn change_period_from_isr(
        &self,
        period: Tick,
        woken: Option<&mut bool>,
    ) -> ShimResult<()> {
        self.generic_command(TimerCommand::ChangePeriodFromIsr, period, woken, 0)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn state(&self) -> TimerState {
        if self.0.deleted.load(Ordering::Acquire) {
            TimerState::Deleted
        } else if self.host().timer_info(&self.0.timer).active {
            TimerState::Armed
        } else {
            TimerState::Idle
        }
    }

    pub fn period(&self) -> Tick {
        self.host().timer_info(&self.0.timer).period
    }

    pub fn set_reload_mode(&self, auto_reload: bool) {
        let mode = ReloadMode::from_auto_reload(auto_reload);
        let _cs = self.0.core.critical();
        if let Err(error) = self.host().timer_control(&self.0.timer, TimerControl::SetMode(mode)) {
            tracing::warn!(name = %self.0.name, %error, "reload mode change rejected");
        }
    }

    pub fn reload_mode(&self) -> ReloadMode {
        let _cs = self.0.core.critical();
        self.host().timer_info(&self.0.timer).mode
    }

    pub fn is_active(&self) -> bool {
        self.state() == TimerState::Armed
    }

    /// Absolute tick of the next expiry; `None` while not armed
    pub fn expiry_time(&self) -> Option<Tick> {
        self.host().timer_info(&self.0.timer).deadline
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[inline]
    pub fn allocation_mode(&self) -> AllocationMode {
        self.0.mode
    }

    pub fn timer_id(&self) -> Option<TimerId> {
        let _cs = self.0.core.critical();
        self.0.timer_id.lock().clone()
    }

    pub fn set_timer_id(&self, timer_id: Option<TimerId>) {
        let _cs = self.0.core.critical();
        *self.0.timer_id.lock() = timer_id;
    }

    pub fn timer_number(&self) -> u32 {
        self.0.number.load(Ordering::Relaxed)
    }

    pub fn set_timer_number(&self, number: u32) {
        self.0.number.store(number, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{SimConfig, SimKernel};

    fn shim() -> (Arc<SimKernel>, Shim<SimKernel>) {
        let kernel = SimKernel::new(SimConfig::default());
        (kernel.clone(), Shim::with_defaults(kernel))
    }

    #[test]
    fn test_state_machine() {
        let (_k, shim) = shim();
        let timer = shim.timer_create("t", 1_000, false, None, |_| {}).unwrap();
        assert_eq!(timer.state(), TimerState::Idle);
        timer.start(0).unwrap();
        assert_eq!(timer.state(), TimerState::Armed);
        assert!(timer.expiry_time().is_some());
        timer.stop(0).unwrap();
        assert_eq!(timer.state(), TimerState::Idle);
        assert_eq!(timer.expiry_time(), None);
        timer.delete(0).unwrap();
        assert_eq!(timer.state(), TimerState::Deleted);
        assert_eq!(timer.start(0), Err(ShimError::Fail));
        assert_eq!(timer.delete(0), Err(ShimError::Fail));
    }

    #[test]
    fn test_change_period_rearms() {
        let (_k, shim) = shim();
        let timer = shim.timer_create("t", 500, true, None, |_| {}).unwrap();
        timer.start(0).unwrap();
        timer.change_period(2_000, 0).unwrap();
        assert_eq!(timer.period(), 2_000);
        assert!(timer.is_active());
        assert_eq!(timer.reload_mode(), ReloadMode::Periodic);

        // From idle too
        timer.stop(0).unwrap();
        timer.change_period(300, 0).unwrap();
        assert_eq!(timer.period(), 300);
        assert!(timer.is_active());
    }

    #[test]
    fn test_unsupported_commands() {
        let (_k, shim) = shim();
        let timer = shim.timer_create("t", 10, false, None, |_| {}).unwrap();
        let mut woken = true;
        assert!(matches!(
            timer.generic_command_raw(42, 0, Some(&mut woken), 0),
            Err(ShimError::NotSupported(_))
        ));
        assert!(!woken);
        assert!(matches!(
            timer.generic_command(TimerCommand::ExecuteCallback, 0, None, 0),
            Err(ShimError::NotSupported(_))
        ));
        assert!(matches!(
            shim.pend_function_call(|| {}, 0),
            Err(ShimError::NotSupported(_))
        ));
    }

    #[test]
    fn test_timer_id_and_reload_mode() {
        let (_k, shim) = shim();
        let timer = shim
            .timer_create("t", 10, false, Some(Arc::new(7u32)), |_| {})
            .unwrap();
        let id = timer.timer_id().unwrap();
        assert_eq!(id.downcast_ref::<u32>(), Some(&7));
        timer.set_timer_id(Some(Arc::new("next")));
        assert!(timer.timer_id().unwrap().downcast_ref::<&str>().is_some());

        assert_eq!(timer.reload_mode(), ReloadMode::OneShot);
        timer.set_reload_mode(true);
        assert_eq!(timer.reload_mode(), ReloadMode::Periodic);
    }

    #[test]
    fn test_heap_per_allocation_mode() {
        let (kernel, shim) = shim();
        let dynamic = shim.timer_create("d", 10, false, None, |_| {}).unwrap();
        let fixed = shim.timer_create_static("s", 10, false, None, |_| {}).unwrap();
        assert_eq!(kernel.heap_stats().live_blocks, 1);
        assert_eq!(shim.registry_stats().timers, 2);
        dynamic.delete(0).unwrap();
        fixed.delete(0).unwrap();
        assert_eq!(kernel.heap_stats().live_blocks, 0);
        assert_eq!(shim.registry_stats().timers, 0);
    }

    #[test]
    fn test_zero_period_rejected() {
        let (_k, shim) = shim();
        let err = shim.timer_create("z", 0, false, None, |_| {}).unwrap_err();
        assert_eq!(err, ShimError::Fail);
    }
}
