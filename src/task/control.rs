/*!
 * Task Control and Queries
 */

use super::lifecycle::TaskHandle;
use super::types::TaskState;
use crate::core::types::{Affinity, AllocationMode, Priority, Tick};
use crate::host::{HostKernel, ThreadState};
use crate::shim::Shim;
use std::sync::atomic::Ordering;

impl<H: HostKernel> TaskHandle<H> {
    #[inline]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[inline]
    pub fn id(&self) -> H::ThreadId {
        self.0.id
    }

    #[inline]
    pub fn allocation_mode(&self) -> AllocationMode {
        self.0.mode
    }

    pub fn priority(&self) -> Priority {
        self.0.host.thread_priority(&self.0.thread)
    }

    #[inline]
    pub fn priority_from_isr(&self) -> Priority {
        self.priority()
    }

    /// # Panics
    ///
    /// When `priority` is not below the configured priority count.
    pub fn set_priority(&self, priority: Priority) {
        assert!(
            priority < self.0.max_priorities,
            "task {} priority {} is not below {}",
            self.0.name,
            priority,
            self.0.max_priorities
        );
        if let Err(error) = self.0.host.thread_set_priority(&self.0.thread, priority) {
            tracing::warn!(task = %self.0.name, priority, %error, "priority change rejected");
        }
    }

    pub fn suspend(&self) {
        if let Err(error) = self.0.host.thread_suspend(&self.0.thread) {
            tracing::debug!(task = %self.0.name, %error, "suspend ignored");
        }
    }

    pub fn resume(&self) {
        if let Err(error) = self.0.host.thread_resume(&self.0.thread) {
            tracing::debug!(task = %self.0.name, %error, "resume ignored");
        }
    }

    /// Returns whether the task was actually resumed
    pub fn resume_from_isr(&self) -> bool {
        self.0.host.thread_resume(&self.0.thread).is_ok()
    }

    /// Cut a pending `delay` short
    ///
    /// False when the task is not delaying; waits on objects are left alone.
    pub fn abort_delay(&self) -> bool {
        let host = &*self.0.host;
        if host.thread_state(&self.0.thread) != ThreadState::Blocked {
            return false;
        }
        host.thread_resume(&self.0.thread).is_ok()
    }

    pub fn state(&self) -> TaskState {
        if self.0.is_deleted() {
            return TaskState::Deleted;
        }
        TaskState::from_thread(self.0.host.thread_state(&self.0.thread))
    }

    /// Core the host placed the task on
    pub fn affinity(&self) -> Affinity {
        match self.0.host.thread_cpu(&self.0.thread) {
            Some(cpu) => Affinity::Core(cpu),
            None => Affinity::NoAffinity,
        }
    }

    /// Base address of the task's stack, for diagnostics
    #[inline]
    pub fn stack_start(&self) -> usize {
        self.0.stack_start
    }

    #[inline]
    pub fn stack_depth(&self) -> usize {
        self.0.stack_depth
    }

    pub fn task_number(&self) -> u32 {
        self.0.number.load(Ordering::Relaxed)
    }

    pub fn set_task_number(&self, number: u32) {
        self.0.number.store(number, Ordering::Relaxed);
    }

    /// Number of notification slots the task owns
    pub fn notification_slots(&self) -> usize {
        self.0.slots.len()
    }
}

impl<H: HostKernel> Shim<H> {
    /// Block the calling thread for `ticks`
    pub fn delay(&self, ticks: Tick) {
        self.core.host.thread_delay(ticks);
    }

    /// Periodic delay; advances `previous` by `increment`
    ///
    /// Returns false when the deadline had already passed.
    pub fn delay_until(&self, previous: &mut Tick, increment: Tick) -> bool {
        assert!(increment > 0, "delay_until increment must be non-zero");
        self.core.host.thread_delay_until(previous, increment)
    }

    pub fn yield_now(&self) {
        self.core.host.thread_yield();
    }

    /// Task running on the calling thread; `None` before the scheduler runs
    pub fn current_task(&self) -> Option<TaskHandle<H>> {
        self.core.current_task()
    }

    pub fn task_by_name(&self, name: &str) -> Option<TaskHandle<H>> {
        self.core
            .tasks
            .iter()
            .find(|entry| entry.value().name() == name)
            .map(|entry| entry.value().clone())
    }

    /// Live shim tasks
    pub fn number_of_tasks(&self) -> usize {
        self.core.tasks.len()
    }

    pub fn tick_count(&self) -> Tick {
        self.core.host.tick_get()
    }

    #[inline]
    pub fn tick_count_from_isr(&self) -> Tick {
        self.tick_count()
    }

    /// Jump the tick count forward without running the tick hook
    pub fn step_tick(&self, ticks: Tick) {
        let host = &*self.core.host;
        let _cs = self.core.critical();
        host.tick_set(host.tick_get().wrapping_add(ticks));
    }

    /// Lock the scheduler; nests with `resume_all`
    pub fn suspend_all(&self) {
        self.core.host.enter_critical();
    }

    /// Unlock the scheduler; never reports a pending yield
    pub fn resume_all(&self) -> bool {
        self.core.host.exit_critical();
        false
    }

    pub fn in_isr_context(&self) -> bool {
        self.core.host.interrupt_nest() > 0
    }
}
