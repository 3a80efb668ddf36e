/*!
 * Sim IPC Objects
 * Recursive mutex, counting semaphore and fixed-slot message queue
 */

use super::thread::{current_id, SimThreadId};
use super::wait::WaitCell;
use super::SimKernel;
use crate::core::types::Tick;
use crate::host::types::{HostError, HostResult, Region, Rejected};

// ============================================================================
// Mutex
// ============================================================================

#[derive(Debug, Default)]
struct MutexState {
    owner: Option<SimThreadId>,
    hold: u32,
}

/// Recursive mutex; release is owner-checked
#[derive(Debug)]
pub struct SimMutex {
    name: String,
    cell: WaitCell<MutexState>,
}

impl SimMutex {
    pub(super) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cell: WaitCell::new(MutexState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl SimKernel {
    pub(super) fn mutex_take_impl(&self, mutex: &SimMutex, ticks: Tick) -> HostResult<()> {
        let me = current_id();
        self.block_on(&mutex.cell, ticks, |st| match st.owner {
            None => {
                st.owner = Some(me);
                st.hold = 1;
                Some(Ok(()))
            }
            Some(owner) if owner == me => {
                st.hold += 1;
                Some(Ok(()))
            }
            Some(_) => None,
        })
    }

    pub(super) fn mutex_release_impl(&self, mutex: &SimMutex) -> HostResult<()> {
        let me = current_id();
        self.mutate(&mutex.cell, |st| {
            if st.inner.owner != Some(me) {
                return Err(HostError::Error);
            }
            st.inner.hold -= 1;
            if st.inner.hold == 0 {
                st.inner.owner = None;
            }
            Ok(())
        })
    }

    pub(super) fn mutex_owner_impl(&self, mutex: &SimMutex) -> Option<SimThreadId> {
        mutex.cell.lock().inner.owner
    }

    pub(super) fn mutex_detach_impl(&self, mutex: &SimMutex) -> HostResult<()> {
        self.mutate(&mutex.cell, |st| st.detached = true);
        Ok(())
    }
}

// ============================================================================
// Semaphore
// ============================================================================

#[derive(Debug)]
struct SemState {
    value: u32,
    max: u32,
}

#[derive(Debug)]
pub struct SimSemaphore {
    name: String,
    cell: WaitCell<SemState>,
}

impl SimSemaphore {
    pub(super) fn new(name: &str, initial: u32, max: u32) -> Self {
        Self {
            name: name.to_string(),
            cell: WaitCell::new(SemState {
                value: initial,
                max,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl SimKernel {
    pub(super) fn semaphore_take_impl(&self, sem: &SimSemaphore, ticks: Tick) -> HostResult<()> {
        self.block_on(&sem.cell, ticks, |st| {
            if st.value > 0 {
                st.value -= 1;
                Some(Ok(()))
            } else {
                None
            }
        })
    }

    pub(super) fn semaphore_release_impl(&self, sem: &SimSemaphore) -> HostResult<()> {
        self.mutate(&sem.cell, |st| {
            if st.inner.value >= st.inner.max {
                return Err(HostError::Full);
            }
            st.inner.value += 1;
            Ok(())
        })
    }

    pub(super) fn semaphore_value_impl(&self, sem: &SimSemaphore) -> u32 {
        sem.cell.lock().inner.value
    }

    pub(super) fn semaphore_reset_impl(&self, sem: &SimSemaphore, value: u32) -> HostResult<()> {
        self.mutate(&sem.cell, |st| {
            if value > st.inner.max {
                return Err(HostError::Invalid);
            }
            st.inner.value = value;
            Ok(())
        })
    }

    pub(super) fn semaphore_detach_impl(&self, sem: &SimSemaphore) -> HostResult<()> {
        self.mutate(&sem.cell, |st| st.detached = true);
        Ok(())
    }
}

// ============================================================================
// Message queue
// ============================================================================

/// Ring of `capacity` slots of `msg_size` bytes laid out in the pool
#[derive(Debug)]
struct Ring {
    pool: Option<Region>,
    msg_size: usize,
    capacity: usize,
    head: usize,
    count: usize,
}

impl Ring {
    #[inline]
    fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    fn slot(&mut self, index: usize) -> &mut [u8] {
        let start = index * self.msg_size;
        let size = self.msg_size;
        match self.pool.as_mut() {
            Some(pool) => &mut pool.as_mut_slice()[start..start + size],
            None => &mut [],
        }
    }

    fn push_back(&mut self, item: &[u8]) {
        let index = (self.head + self.count) % self.capacity;
        self.slot(index)[..item.len()].copy_from_slice(item);
        self.count += 1;
    }

    fn push_front(&mut self, item: &[u8]) {
        self.head = (self.head + self.capacity - 1) % self.capacity;
        let head = self.head;
        self.slot(head)[..item.len()].copy_from_slice(item);
        self.count += 1;
    }

    fn pop_front(&mut self, buf: &mut [u8]) -> usize {
        let size = self.msg_size;
        let head = self.head;
        buf[..size].copy_from_slice(self.slot(head));
        self.head = (self.head + 1) % self.capacity;
        self.count -= 1;
        size
    }
}

#[derive(Debug)]
pub struct SimMessageQueue {
    name: String,
    msg_size: usize,
    capacity: usize,
    cell: WaitCell<Ring>,
}

impl SimMessageQueue {
    pub(super) fn new(
        name: &str,
        msg_size: usize,
        capacity: usize,
        pool: Region,
    ) -> Result<Self, Rejected<Region>> {
        let required = msg_size.checked_mul(capacity);
        if capacity == 0 || required.map_or(true, |bytes| pool.len() < bytes) {
            return Err(Rejected::new(HostError::Invalid, pool));
        }
        Ok(Self {
            name: name.to_string(),
            msg_size,
            capacity,
            cell: WaitCell::new(Ring {
                pool: Some(pool),
                msg_size,
                capacity,
                head: 0,
                count: 0,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub(super) fn capacity(&self) -> usize {
        self.capacity
    }
}

impl SimKernel {
    pub(super) fn mq_send_impl(
        &self,
        mq: &SimMessageQueue,
        item: &[u8],
        urgent: bool,
    ) -> HostResult<()> {
        if item.len() > mq.msg_size {
            return Err(HostError::Invalid);
        }
        self.checkpoint();
        self.mutate(&mq.cell, |st| {
            if st.detached {
                return Err(HostError::Error);
            }
            if st.inner.is_full() {
                return Err(HostError::Full);
            }
            if urgent {
                st.inner.push_front(item);
            } else {
                st.inner.push_back(item);
            }
            Ok(())
        })
    }

    pub(super) fn mq_send_wait_impl(
        &self,
        mq: &SimMessageQueue,
        item: &[u8],
        ticks: Tick,
        urgent: bool,
    ) -> HostResult<()> {
        if item.len() > mq.msg_size {
            return Err(HostError::Invalid);
        }
        let result = self.block_on(&mq.cell, ticks, |ring| {
            if ring.is_full() {
                None
            } else if urgent {
                ring.push_front(item);
                Some(Ok(()))
            } else {
                ring.push_back(item);
                Some(Ok(()))
            }
        });
        mq.cell.notify_all();
        result.map_err(|e| match e {
            HostError::Timeout => HostError::Full,
            other => other,
        })
    }

    pub(super) fn mq_recv_impl(
        &self,
        mq: &SimMessageQueue,
        buf: &mut [u8],
        ticks: Tick,
    ) -> HostResult<usize> {
        if buf.len() < mq.msg_size {
            return Err(HostError::Invalid);
        }
        let result = self.block_on(&mq.cell, ticks, |ring| {
            if ring.count == 0 {
                None
            } else {
                Some(Ok(ring.pop_front(buf)))
            }
        });
        mq.cell.notify_all();
        result
    }

    pub(super) fn mq_reset_impl(&self, mq: &SimMessageQueue) -> HostResult<()> {
        self.mutate(&mq.cell, |st| {
            st.inner.head = 0;
            st.inner.count = 0;
        });
        Ok(())
    }

    pub(super) fn mq_entries_impl(&self, mq: &SimMessageQueue) -> usize {
        mq.cell.lock().inner.count
    }

    pub(super) fn mq_detach_impl(&self, mq: &SimMessageQueue) -> HostResult<Option<Region>> {
        Ok(self.mutate(&mq.cell, |st| {
            st.detached = true;
            st.inner.pool.take()
        }))
    }
}
