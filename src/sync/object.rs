/*!
 * Unified Synchronization Object
 *
 * One handle type for mutexes, counting semaphores and message queues.
 * Every operation reads the immutable backing kind and routes to the
 * matching host primitive; host result codes collapse into
 * Pass / Full / Empty / Fail.
 */

use super::types::{CopyPosition, QueueType, SyncKind};
use crate::core::control::{release_region, reserve_region, ControlBlock};
use crate::core::errors::{collapse, init_error, ShimError, ShimResult};
use crate::core::registry::ObjectKey;
use crate::core::types::{AllocationMode, Tick, NO_WAIT};
use crate::host::{HostKernel, Region};
use crate::shim::{Shim, ShimCore};
use parking_lot::Mutex;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Host storage owned by a sync object
pub(crate) enum Backing<H: HostKernel> {
    Mutex(H::Mutex),
    Semaphore {
        sem: H::Semaphore,
        max_count: u32,
    },
    MessageQueue {
        mq: H::MessageQueue,
        capacity: usize,
        item_size: usize,
    },
}

impl<H: HostKernel> Backing<H> {
    #[inline]
    fn kind(&self) -> SyncKind {
        match self {
            Backing::Mutex(_) => SyncKind::Mutex,
            Backing::Semaphore { .. } => SyncKind::CountingSemaphore,
            Backing::MessageQueue { .. } => SyncKind::MessageQueue,
        }
    }
}

/// What to build for a new sync object
pub(crate) enum BackingSpec {
    Mutex,
    Semaphore {
        initial: u32,
        max: u32,
    },
    MessageQueue {
        length: usize,
        item_size: usize,
        storage: Option<&'static mut [u8]>,
    },
}

pub struct SyncObject<H: HostKernel> {
    pub(crate) core: Arc<ShimCore<H>>,
    name: String,
    queue_type: QueueType,
    mode: AllocationMode,
    pub(crate) backing: Backing<H>,
    control: Mutex<Option<ControlBlock>>,
    number: AtomicU32,
}

impl<H: HostKernel> SyncObject<H> {
    #[inline]
    fn key(&self) -> ObjectKey {
        ObjectKey::of(self)
    }
}

impl<H: HostKernel> Drop for SyncObject<H> {
    fn drop(&mut self) {
        // Handles dropped without delete leave their tag behind
        self.core.registry.forget(ObjectKey::of(self));
    }
}

/// Handle to a queue, mutex or semaphore
pub struct Queue<H: HostKernel>(pub(crate) Arc<SyncObject<H>>);

impl<H: HostKernel> Clone for Queue<H> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<H: HostKernel> PartialEq for Queue<H> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<H: HostKernel> Eq for Queue<H> {}

impl<H: HostKernel> fmt::Debug for Queue<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.0.name)
            .field("kind", &self.kind())
            .field("queue_type", &self.0.queue_type)
            .field("mode", &self.0.mode)
            .finish()
    }
}

// ============================================================================
// Construction
// ============================================================================

impl<H: HostKernel> Shim<H> {
    pub(crate) fn create_sync(
        &self,
        queue_type: QueueType,
        mode: AllocationMode,
        spec: BackingSpec,
    ) -> ShimResult<Queue<H>> {
        let core = &self.core;
        let host = &*core.host;
        let kind = queue_type.kind();
        let name = core.registry.next_name(kind.tag());

        let control = ControlBlock::reserve(host, mode, mem::size_of::<SyncObject<H>>())?;
        let backing = match build_backing(host, &name, mode, spec) {
            Ok(backing) => backing,
            Err(e) => {
                control.release(host);
                return Err(e);
            }
        };

        let object = Arc::new(SyncObject {
            core: Arc::clone(core),
            name,
            queue_type,
            mode,
            backing,
            control: Mutex::new(Some(control)),
            number: AtomicU32::new(0),
        });
        core.registry.register(object.key(), kind.tag());
        tracing::debug!(name = %object.name, %kind, ?mode, "sync object created");
        Ok(Queue(object))
    }

    /// Message queue of `length` items of `item_size` bytes on the host heap
    pub fn queue_create(&self, length: usize, item_size: usize) -> ShimResult<Queue<H>> {
        assert!(length > 0, "queue length must be non-zero");
        self.create_sync(
            QueueType::Base,
            AllocationMode::Dynamic,
            BackingSpec::MessageQueue {
                length,
                item_size,
                storage: None,
            },
        )
    }

    /// Message queue whose item storage is `storage`
    pub fn queue_create_static(
        &self,
        length: usize,
        item_size: usize,
        storage: &'static mut [u8],
    ) -> ShimResult<Queue<H>> {
        assert!(length > 0, "queue length must be non-zero");
        assert!(
            storage.len() >= length * item_size,
            "queue storage of {} bytes cannot hold {} items of {} bytes",
            storage.len(),
            length,
            item_size
        );
        self.create_sync(
            QueueType::Base,
            AllocationMode::Static,
            BackingSpec::MessageQueue {
                length,
                item_size,
                storage: Some(storage),
            },
        )
    }

    /// Generic constructor keyed by the emulated API's queue type
    pub fn queue_generic_create(
        &self,
        length: usize,
        item_size: usize,
        queue_type: QueueType,
    ) -> ShimResult<Queue<H>> {
        let spec = match queue_type {
            QueueType::Base | QueueType::Set => {
                assert!(length > 0, "queue length must be non-zero");
                BackingSpec::MessageQueue {
                    length,
                    item_size,
                    storage: None,
                }
            }
            QueueType::Mutex | QueueType::RecursiveMutex => BackingSpec::Mutex,
            QueueType::BinarySemaphore => BackingSpec::Semaphore { initial: 0, max: 1 },
            QueueType::CountingSemaphore => BackingSpec::Semaphore {
                initial: 0,
                max: (length as u32).max(1),
            },
        };
        self.create_sync(queue_type, AllocationMode::Dynamic, spec)
    }
}

fn build_backing<H: HostKernel>(
    host: &H,
    name: &str,
    mode: AllocationMode,
    spec: BackingSpec,
) -> ShimResult<Backing<H>> {
    match spec {
        BackingSpec::Mutex => host.mutex_init(name).map(Backing::Mutex).map_err(init_error),
        BackingSpec::Semaphore { initial, max } => host
            .semaphore_init(name, initial, max)
            .map(|sem| Backing::Semaphore {
                sem,
                max_count: max,
            })
            .map_err(init_error),
        BackingSpec::MessageQueue {
            length,
            item_size,
            storage,
        } => {
            let pool = match (mode, storage) {
                (_, Some(storage)) => Region::Caller(storage),
                (AllocationMode::Dynamic, None) => reserve_region(host, length * item_size)
                    .ok_or_else(|| {
                        tracing::warn!(name, length, item_size, "message pool allocation failed");
                        ShimError::Allocation
                    })?,
                (AllocationMode::Static, None) => return Err(ShimError::Fail),
            };
            match host.message_queue_init(name, item_size, length, pool) {
                Ok(mq) => Ok(Backing::MessageQueue {
                    mq,
                    capacity: length,
                    item_size,
                }),
                Err(rejected) => {
                    release_region(host, rejected.resource);
                    Err(init_error(rejected.error))
                }
            }
        }
    }
}

// ============================================================================
// Operations
// ============================================================================

impl<H: HostKernel> Queue<H> {
    #[inline]
    pub(crate) fn host(&self) -> &H {
        &self.0.core.host
    }

    #[inline]
    pub fn kind(&self) -> SyncKind {
        self.0.backing.kind()
    }

    #[inline]
    pub fn queue_type(&self) -> QueueType {
        self.0.queue_type
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[inline]
    pub fn allocation_mode(&self) -> AllocationMode {
        self.0.mode
    }

    /// Queue length; `None` for mutexes and semaphores
    pub fn capacity(&self) -> Option<usize> {
        match &self.0.backing {
            Backing::MessageQueue { capacity, .. } => Some(*capacity),
            _ => None,
        }
    }

    pub fn item_size(&self) -> Option<usize> {
        match &self.0.backing {
            Backing::MessageQueue { item_size, .. } => Some(*item_size),
            _ => None,
        }
    }

    /// Semaphore ceiling; `None` for other kinds
    pub fn max_count(&self) -> Option<u32> {
        match &self.0.backing {
            Backing::Semaphore { max_count, .. } => Some(*max_count),
            _ => None,
        }
    }

    fn release_only(&self, position: CopyPosition) -> ShimResult<()> {
        if position == CopyPosition::Back {
            return Ok(());
        }
        tracing::warn!(name = %self.0.name, kind = %self.kind(), ?position, "insertion position not supported");
        Err(ShimError::NotSupported(
            "front/overwrite insertion on a mutex or semaphore",
        ))
    }

    /// Post `item` (mutex/semaphore: release)
    ///
    /// Back and Front block up to `ticks` when full; Front lands at the head.
    /// Overwrite replaces the single item of a length-one queue.
    pub fn send(&self, item: &[u8], ticks: Tick, position: CopyPosition) -> ShimResult<()> {
        let host = self.host();
        match &self.0.backing {
            Backing::Mutex(mutex) => {
                self.release_only(position)?;
                collapse(host.mutex_release(mutex), "mutex_release", ShimError::Full)
            }
            Backing::Semaphore { sem, .. } => {
                self.release_only(position)?;
                collapse(host.semaphore_release(sem), "semaphore_release", ShimError::Full)
            }
            Backing::MessageQueue {
                mq,
                capacity,
                item_size,
            } => {
                assert!(
                    item.len() >= *item_size,
                    "item of {} bytes is smaller than the queue item size {}",
                    item.len(),
                    item_size
                );
                let item = &item[..*item_size];
                let result = match position {
                    CopyPosition::Back if ticks == NO_WAIT => host.message_queue_send(mq, item),
                    CopyPosition::Back => host.message_queue_send_wait(mq, item, ticks),
                    CopyPosition::Front if ticks == NO_WAIT => host.message_queue_urgent(mq, item),
                    CopyPosition::Front => host.message_queue_urgent_wait(mq, item, ticks),
                    CopyPosition::Overwrite => {
                        assert_eq!(*capacity, 1, "overwrite requires a queue of length one");
                        let _cs = self.0.core.critical();
                        host.message_queue_reset(mq)
                            .and_then(|()| host.message_queue_send(mq, item))
                    }
                };
                collapse(result, "message_queue_send", ShimError::Full)
            }
        }
    }

    #[inline]
    pub fn send_to_back(&self, item: &[u8], ticks: Tick) -> ShimResult<()> {
        self.send(item, ticks, CopyPosition::Back)
    }

    #[inline]
    pub fn send_to_front(&self, item: &[u8], ticks: Tick) -> ShimResult<()> {
        self.send(item, ticks, CopyPosition::Front)
    }

    #[inline]
    pub fn overwrite(&self, item: &[u8]) -> ShimResult<()> {
        self.send(item, NO_WAIT, CopyPosition::Overwrite)
    }

    /// Take one item into `buf` (mutex/semaphore: take)
    pub fn receive(&self, buf: &mut [u8], ticks: Tick) -> ShimResult<()> {
        let host = self.host();
        match &self.0.backing {
            Backing::Mutex(mutex) => {
                collapse(host.mutex_take(mutex, ticks), "mutex_take", ShimError::Empty)
            }
            Backing::Semaphore { sem, .. } => {
                collapse(host.semaphore_take(sem, ticks), "semaphore_take", ShimError::Empty)
            }
            Backing::MessageQueue { mq, item_size, .. } => {
                assert!(
                    buf.len() >= *item_size,
                    "buffer of {} bytes is smaller than the queue item size {}",
                    buf.len(),
                    item_size
                );
                collapse(
                    host.message_queue_recv(mq, &mut buf[..*item_size], ticks),
                    "message_queue_recv",
                    ShimError::Empty,
                )
                .map(|_| ())
            }
        }
    }

    /// Non-destructive read; the host has none
    pub fn peek(&self, _buf: &mut [u8], _ticks: Tick) -> ShimResult<()> {
        tracing::warn!(name = %self.0.name, "peek is not supported by the host");
        Err(ShimError::NotSupported("peek"))
    }

    /// Drop all items (semaphore: count back to zero)
    pub fn reset(&self) -> ShimResult<()> {
        let host = self.host();
        match &self.0.backing {
            Backing::Mutex(_) => {
                tracing::warn!(name = %self.0.name, "reset is not supported on a mutex");
                Err(ShimError::NotSupported("reset on a mutex"))
            }
            Backing::Semaphore { sem, .. } => {
                collapse(host.semaphore_reset(sem, 0), "semaphore_reset", ShimError::Fail)
            }
            Backing::MessageQueue { mq, .. } => {
                collapse(host.message_queue_reset(mq), "message_queue_reset", ShimError::Fail)
            }
        }
    }

    /// Queue depth, semaphore value, or mutex state (1 = available)
    pub fn query_count(&self) -> u32 {
        let host = self.host();
        match &self.0.backing {
            Backing::Mutex(mutex) => host.mutex_value(mutex),
            Backing::Semaphore { sem, .. } => host.semaphore_value(sem),
            Backing::MessageQueue { mq, .. } => host.message_queue_entries(mq) as u32,
        }
    }

    #[inline]
    pub fn messages_waiting(&self) -> u32 {
        self.query_count()
    }

    /// Free slots of a message queue
    ///
    /// # Panics
    ///
    /// When the handle is not a message queue.
    pub fn spaces_available(&self) -> usize {
        match &self.0.backing {
            Backing::MessageQueue { mq, capacity, .. } => {
                let _cs = self.0.core.critical();
                capacity.saturating_sub(self.host().message_queue_entries(mq))
            }
            _ => panic!("spaces_available on {} {}", self.kind(), self.0.name),
        }
    }

    pub fn queue_number(&self) -> u32 {
        self.0.number.load(Ordering::Relaxed)
    }

    pub fn set_queue_number(&self, number: u32) {
        self.0.number.store(number, Ordering::Relaxed);
    }

    /// Release the host object and, for dynamic objects, its memory
    ///
    /// # Panics
    ///
    /// When the object was already deleted through another handle.
    pub fn delete(self) {
        let object = &self.0;
        let host = &*object.core.host;
        object.core.registry.retire(object.key(), self.kind().tag());

        let detached = match &object.backing {
            Backing::Mutex(mutex) => host.mutex_detach(mutex),
            Backing::Semaphore { sem, .. } => host.semaphore_detach(sem),
            Backing::MessageQueue { mq, .. } => host.message_queue_detach(mq).map(|pool| {
                if let Some(pool) = pool {
                    release_region(host, pool);
                }
            }),
        };
        if let Err(error) = detached {
            tracing::warn!(name = %object.name, %error, "host detach failed");
        }
        if let Some(control) = object.control.lock().take() {
            control.release(host);
        }
        tracing::debug!(name = %object.name, kind = %self.kind(), mode = ?object.mode, "sync object deleted");
    }
}
