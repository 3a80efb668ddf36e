/*!
 * Semaphore and Mutex Vocabulary
 * Constructors plus give/take spelled over the unified send/receive
 */

use super::object::{Backing, BackingSpec, Queue};
use super::types::{CopyPosition, QueueType, SyncKind};
use crate::core::errors::ShimResult;
use crate::core::types::{AllocationMode, Tick, NO_WAIT};
use crate::host::HostKernel;
use crate::shim::Shim;
use crate::task::TaskHandle;

impl<H: HostKernel> Shim<H> {
    pub fn mutex_create(&self) -> ShimResult<Queue<H>> {
        self.create_sync(QueueType::Mutex, AllocationMode::Dynamic, BackingSpec::Mutex)
    }

    pub fn mutex_create_static(&self) -> ShimResult<Queue<H>> {
        self.create_sync(QueueType::Mutex, AllocationMode::Static, BackingSpec::Mutex)
    }

    pub fn recursive_mutex_create(&self) -> ShimResult<Queue<H>> {
        self.create_sync(
            QueueType::RecursiveMutex,
            AllocationMode::Dynamic,
            BackingSpec::Mutex,
        )
    }

    pub fn recursive_mutex_create_static(&self) -> ShimResult<Queue<H>> {
        self.create_sync(
            QueueType::RecursiveMutex,
            AllocationMode::Static,
            BackingSpec::Mutex,
        )
    }

    /// Binary semaphore, created empty
    pub fn binary_semaphore_create(&self) -> ShimResult<Queue<H>> {
        self.create_sync(
            QueueType::BinarySemaphore,
            AllocationMode::Dynamic,
            BackingSpec::Semaphore { initial: 0, max: 1 },
        )
    }

    pub fn binary_semaphore_create_static(&self) -> ShimResult<Queue<H>> {
        self.create_sync(
            QueueType::BinarySemaphore,
            AllocationMode::Static,
            BackingSpec::Semaphore { initial: 0, max: 1 },
        )
    }

    pub fn counting_semaphore_create(&self, max: u32, initial: u32) -> ShimResult<Queue<H>> {
        assert!(max != 0, "counting semaphore max must be non-zero");
        assert!(initial <= max, "initial count {initial} exceeds max {max}");
        self.create_sync(
            QueueType::CountingSemaphore,
            AllocationMode::Dynamic,
            BackingSpec::Semaphore { initial, max },
        )
    }

    pub fn counting_semaphore_create_static(
        &self,
        max: u32,
        initial: u32,
    ) -> ShimResult<Queue<H>> {
        assert!(max != 0, "counting semaphore max must be non-zero");
        assert!(initial <= max, "initial count {initial} exceeds max {max}");
        self.create_sync(
            QueueType::CountingSemaphore,
            AllocationMode::Static,
            BackingSpec::Semaphore { initial, max },
        )
    }
}

impl<H: HostKernel> Queue<H> {
    /// Release a mutex or signal a semaphore
    #[inline]
    pub fn give(&self) -> ShimResult<()> {
        self.send(&[], NO_WAIT, CopyPosition::Back)
    }

    /// Acquire a mutex or wait on a semaphore
    #[inline]
    pub fn take(&self, ticks: Tick) -> ShimResult<()> {
        self.receive(&mut [], ticks)
    }

    /// The host mutex is recursive, so this is a plain release
    pub fn give_recursive(&self) -> ShimResult<()> {
        debug_assert_eq!(self.kind(), SyncKind::Mutex);
        self.give()
    }

    pub fn take_recursive(&self, ticks: Tick) -> ShimResult<()> {
        debug_assert_eq!(self.kind(), SyncKind::Mutex);
        self.take(ticks)
    }

    /// Shim task holding the mutex; `None` when free or not a mutex
    pub fn mutex_holder(&self) -> Option<TaskHandle<H>> {
        let Backing::Mutex(mutex) = &self.0.backing else {
            return None;
        };
        let core = &self.0.core;
        let _cs = core.critical();
        core.host
            .mutex_owner(mutex)
            .and_then(|owner| core.task_of(&owner))
    }

    /// Current count of a semaphore (0 or 1 for a mutex)
    #[inline]
    pub fn semaphore_count(&self) -> u32 {
        self.query_count()
    }
}

#[cfg(test)]
mod tests {
    use crate::core::errors::ShimError;
    use crate::core::types::NO_WAIT;
    use crate::host::{SimConfig, SimKernel};
    use crate::shim::Shim;

    fn shim() -> Shim<SimKernel> {
        Shim::with_defaults(SimKernel::new(SimConfig::default()))
    }

    #[test]
    fn test_binary_semaphore_starts_empty() {
        let shim = shim();
        let sem = shim.binary_semaphore_create().unwrap();
        assert_eq!(sem.take(NO_WAIT), Err(ShimError::Empty));
        sem.give().unwrap();
        assert_eq!(sem.give(), Err(ShimError::Full));
        sem.take(NO_WAIT).unwrap();
        sem.delete();
    }

    #[test]
    fn test_counting_semaphore_bounds() {
        let shim = shim();
        let sem = shim.counting_semaphore_create(3, 2).unwrap();
        assert_eq!(sem.semaphore_count(), 2);
        assert_eq!(sem.max_count(), Some(3));
        sem.give().unwrap();
        assert_eq!(sem.give(), Err(ShimError::Full));
        sem.delete();
    }

    #[test]
    #[should_panic(expected = "exceeds max")]
    fn test_counting_semaphore_initial_above_max() {
        let _ = shim().counting_semaphore_create(1, 2);
    }

    #[test]
    fn test_recursive_mutex_nests() {
        let shim = shim();
        let m = shim.recursive_mutex_create().unwrap();
        m.take_recursive(NO_WAIT).unwrap();
        m.take_recursive(NO_WAIT).unwrap();
        m.give_recursive().unwrap();
        assert_eq!(m.query_count(), 0);
        m.give_recursive().unwrap();
        assert_eq!(m.query_count(), 1);
        m.delete();
    }

    #[test]
    fn test_mutex_holder_outside_task_is_none() {
        let shim = shim();
        let m = shim.mutex_create().unwrap();
        m.take(NO_WAIT).unwrap();
        // Held, but not by a shim task
        assert!(m.mutex_holder().is_none());
        m.give().unwrap();

        let sem = shim.binary_semaphore_create().unwrap();
        assert!(sem.mutex_holder().is_none());
    }
}
