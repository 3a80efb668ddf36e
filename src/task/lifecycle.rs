/*!
 * Task Lifecycle
 *
 * Creation wraps a host thread together with its notification slots and,
 * for dynamic tasks, a heap-reserved control block and stack. Every
 * failure after a partial host-side setup rolls the reservations back.
 * Deletion detaches the host thread first, then releases memory (dynamic
 * tasks only) and every populated notification slot.
 */

use super::types::{TaskEntry, TaskSpec};
use crate::core::control::{release_region, reserve_region, ControlBlock};
use crate::core::errors::{ShimError, ShimResult};
use crate::core::registry::{ObjectKey, ObjectTag};
use crate::core::types::{Affinity, AllocationMode, Priority};
use crate::event::NotificationSlots;
use crate::host::{HostKernel, Region, ThreadParams};
use crate::shim::{Shim, ShimCore};
use parking_lot::Mutex;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

pub struct TaskControl<H: HostKernel> {
    pub(crate) host: Arc<H>,
    core: Weak<ShimCore<H>>,
    pub(crate) name: String,
    pub(crate) mode: AllocationMode,
    pub(crate) thread: H::Thread,
    pub(crate) id: H::ThreadId,
    pub(crate) max_priorities: Priority,
    pub(crate) stack_start: usize,
    pub(crate) stack_depth: usize,
    pub(crate) slots: NotificationSlots<H>,
    control: Mutex<Option<ControlBlock>>,
    deleted: AtomicBool,
    pub(crate) number: AtomicU32,
}

impl<H: HostKernel> TaskControl<H> {
    #[inline]
    pub(crate) fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// Detach the host thread and release what the task owns
    fn destroy(&self, core: &ShimCore<H>) {
        let host = &*self.host;
        core.registry.retire(ObjectKey::of(self), ObjectTag::Thread);
        self.deleted.store(true, Ordering::Release);

        let stack = host.thread_detach(&self.thread).unwrap_or_else(|error| {
            tracing::warn!(task = %self.name, %error, "host thread detach failed");
            None
        });
        if self.mode.is_dynamic() {
            if let Some(stack) = stack {
                release_region(host, stack);
            }
            if let Some(control) = self.control.lock().take() {
                control.release(host);
            }
        }
        {
            let _cs = core.critical();
            self.slots.release(host);
        }
        core.tasks.remove(&self.id);
        tracing::debug!(task = %self.name, mode = ?self.mode, "task deleted");
    }
}

impl<H: HostKernel> Drop for TaskControl<H> {
    fn drop(&mut self) {
        if let Some(core) = self.core.upgrade() {
            core.registry.forget(ObjectKey::of(self));
        }
    }
}

/// Handle to a task
pub struct TaskHandle<H: HostKernel>(pub(crate) Arc<TaskControl<H>>);

impl<H: HostKernel> Clone for TaskHandle<H> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<H: HostKernel> PartialEq for TaskHandle<H> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<H: HostKernel> Eq for TaskHandle<H> {}

impl<H: HostKernel> fmt::Debug for TaskHandle<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("name", &self.0.name)
            .field("id", &self.0.id)
            .field("mode", &self.0.mode)
            .field("deleted", &self.0.is_deleted())
            .finish()
    }
}

// ============================================================================
// Creation
// ============================================================================

impl<H: HostKernel> Shim<H> {
    /// Create and start a task whose control block and stack come from the
    /// host heap
    ///
    /// # Panics
    ///
    /// When `spec.priority` is not below the configured priority count.
    pub fn task_create(
        &self,
        spec: TaskSpec,
        entry: impl FnOnce() + Send + 'static,
    ) -> ShimResult<TaskHandle<H>> {
        self.spawn_task(spec, AllocationMode::Dynamic, None, Box::new(entry))
    }

    /// Create and start a task running on the caller's `stack`
    pub fn task_create_static(
        &self,
        spec: TaskSpec,
        stack: &'static mut [u8],
        entry: impl FnOnce() + Send + 'static,
    ) -> ShimResult<TaskHandle<H>> {
        self.spawn_task(spec, AllocationMode::Static, Some(stack), Box::new(entry))
    }

    fn spawn_task(
        &self,
        spec: TaskSpec,
        mode: AllocationMode,
        stack: Option<&'static mut [u8]>,
        entry: TaskEntry,
    ) -> ShimResult<TaskHandle<H>> {
        let core = &self.core;
        let host = &*core.host;
        let max_priorities = core.config.max_priorities;
        assert!(
            spec.priority < max_priorities,
            "task {} priority {} is not below {}",
            spec.name,
            spec.priority,
            max_priorities
        );

        let control = ControlBlock::reserve(host, mode, mem::size_of::<TaskControl<H>>())?;
        let stack = match stack {
            Some(buf) => Region::Caller(buf),
            None => match reserve_region(host, spec.stack_depth) {
                Some(region) => region,
                None => {
                    tracing::warn!(task = %spec.name, stack = spec.stack_depth, "stack allocation failed");
                    control.release(host);
                    return Err(ShimError::StackAllocation);
                }
            },
        };
        let stack_start = stack.base_addr();
        let stack_depth = stack.len();

        let params = ThreadParams {
            name: spec.name.clone(),
            entry,
            stack,
            priority: spec.priority,
            time_slice: core.config.thread_time_slice,
        };
        let thread = match host.thread_init(params) {
            Ok(thread) => thread,
            Err(rejected) => {
                tracing::warn!(task = %spec.name, error = %rejected.error, "host thread init failed");
                release_region(host, rejected.resource);
                control.release(host);
                return Err(ShimError::Fail);
            }
        };

        let id = host.thread_id(&thread);
        let task = TaskHandle(Arc::new(TaskControl {
            host: Arc::clone(&core.host),
            core: Arc::downgrade(core),
            slots: NotificationSlots::new(&spec.name, core.config.notification_array_entries),
            name: spec.name,
            mode,
            thread,
            id,
            max_priorities,
            stack_start,
            stack_depth,
            control: Mutex::new(Some(control)),
            deleted: AtomicBool::new(false),
            number: AtomicU32::new(0),
        }));

        // Pin before the first instruction runs; a single core has nothing to pin
        if let Affinity::Core(cpu) = spec.affinity {
            if host.cpu_count() > 1 {
                if let Err(error) = host.thread_bind_cpu(&task.0.thread, cpu) {
                    tracing::warn!(task = %task.0.name, cpu, %error, "cpu binding rejected");
                }
            }
        }

        core.registry.register(ObjectKey::of(&*task.0), ObjectTag::Thread);
        core.tasks.insert(id, task.clone());
        if let Err(error) = host.thread_start(&task.0.thread) {
            tracing::warn!(task = %task.0.name, %error, "host thread start failed");
            task.0.destroy(core);
            return Err(ShimError::Fail);
        }

        tracing::debug!(
            task = %task.0.name,
            priority = spec.priority,
            stack = stack_depth,
            ?mode,
            "task created"
        );
        Ok(task)
    }

    /// Delete `task`, or the calling task when `None`
    ///
    /// Deleting the calling task does not return.
    ///
    /// # Panics
    ///
    /// When the task was already deleted through another handle.
    pub fn task_delete(&self, task: Option<TaskHandle<H>>) {
        let host = &*self.core.host;
        let target = match task {
            Some(task) => task,
            None => match self.core.current_task() {
                Some(task) => task,
                None => {
                    tracing::warn!("task_delete(None) outside a shim task");
                    return;
                }
            },
        };

        let is_self = host.thread_self() == target.0.id;
        target.0.destroy(&self.core);
        drop(target);
        if is_self {
            host.thread_exit();
        }
    }
}

impl<H: HostKernel> TaskHandle<H> {
    /// Delete this task; same as `Shim::task_delete(Some(self))`
    pub fn delete(self) {
        match self.0.core.upgrade() {
            Some(core) => Shim { core }.task_delete(Some(self)),
            None => tracing::warn!(task = %self.0.name, "task outlived its shim"),
        }
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
    fn test_dynamic_task_heap_released_once() {
        let (kernel, shim) = shim();
        let task = shim
            .task_create(TaskSpec::new("worker").with_stack_depth(1024), || {})
            .unwrap();
        // Control block and stack
        assert_eq!(kernel.heap_stats().live_blocks, 2);
        assert_eq!(shim.registry_stats().threads, 1);

        shim.task_delete(Some(task));
        let stats = kernel.heap_stats();
        assert_eq!(stats.live_blocks, 0);
        assert_eq!(stats.frees, 2);
        assert_eq!(shim.registry_stats().threads, 0);
    }

    #[test]
    fn test_notify_after_delete_creates_no_slot() {
        let (_kernel, shim) = shim();
        let task = shim.task_create(TaskSpec::new("worker"), || {}).unwrap();
        let alias = task.clone();
        shim.task_delete(Some(task));

        assert_eq!(alias.notify_give(0), Err(ShimError::Fail));
        assert_eq!(alias.0.slots.populated(), 0);
    }

    #[test]
    fn test_notify_racing_delete_leaves_no_live_slot() {
        let (_kernel, shim) = shim();
        for _ in 0..20 {
            let task = shim.task_create(TaskSpec::new("worker"), || {}).unwrap();
            let alias = task.clone();
            let notifier = std::thread::spawn(move || {
                while alias.notify_give(0).is_ok() {}
                alias
            });
            shim.task_delete(Some(task));
            let alias = notifier.join().unwrap();
            let populated = alias.0.slots.populated();
            assert_eq!(alias.notify_give(0), Err(ShimError::Fail));
            assert_eq!(alias.0.slots.populated(), populated);
        }
    }

    #[test]
    fn test_static_task_frees_nothing() {
        let (kernel, shim) = shim();
        let stack: &'static mut [u8] = Box::leak(vec![0u8; 512].into_boxed_slice());
        let task = shim
            .task_create_static(TaskSpec::new("static"), stack, || {})
            .unwrap();
        assert_eq!(task.0.mode, AllocationMode::Static);
        shim.task_delete(Some(task));
        let stats = kernel.heap_stats();
        assert_eq!(stats.allocations, 0);
        assert_eq!(stats.frees, 0);
    }

    #[test]
    fn test_init_failure_rolls_back() {
        let (kernel, shim) = shim();
        let err = shim
            .task_create(TaskSpec::new("tiny").with_stack_depth(16), || {})
            .unwrap_err();
        assert_eq!(err, ShimError::Fail);
        assert_eq!(kernel.heap_stats().live_blocks, 0);
        assert_eq!(shim.registry_stats().threads, 0);
    }

    #[test]
    fn test_stack_allocation_failure() {
        let kernel = SimKernel::new(SimConfig::with_heap_capacity(2048));
        let shim = Shim::with_defaults(kernel.clone());
        let err = shim
            .task_create(TaskSpec::new("big").with_stack_depth(1 << 20), || {})
            .unwrap_err();
        assert_eq!(err, ShimError::StackAllocation);
        assert_eq!(kernel.heap_stats().live_blocks, 0);
    }

    #[test]
    #[should_panic(expected = "priority")]
    fn test_priority_out_of_range() {
        let (_k, shim) = shim();
        let max = shim.config().max_priorities;
        let _ = shim.task_create(TaskSpec::new("hot").with_priority(max), || {});
    }

    #[test]
    #[should_panic(expected = "double delete")]
    fn test_double_delete_panics() {
        let (_k, shim) = shim();
        let task = shim.task_create(TaskSpec::new("twice"), || {}).unwrap();
        let alias = task.clone();
        shim.task_delete(Some(task));
        shim.task_delete(Some(alias));
    }
}
