/*!
 * Host Kernel Interface
 * Every primitive the shim forwards to; the host owns scheduling and blocking
 */

use super::types::{
    EventCaps, EventOption, HeapBlock, HostHook, HostResult, HostTimerCallback, IrqLevel, Region,
    Rejected, ThreadParams, ThreadState, TimerControl, TimerInfo,
};
use crate::core::types::{EventBits, Priority, ReloadMode, Tick};
use std::fmt::Debug;
use std::hash::Hash;

/// Host kernel the shim runs on
///
/// Object types are owned by the shim wrapper that created them and are
/// passed back by reference. Blocking calls take a timeout in host ticks
/// (`0` polls, `MAX_DELAY` waits forever) and must release the interrupt
/// lock while parked.
pub trait HostKernel: Send + Sync + 'static {
    type ThreadId: Copy + Eq + Hash + Debug + Send + Sync + 'static;
    type Thread: Send + Sync + 'static;
    type Mutex: Send + Sync + 'static;
    type Semaphore: Send + Sync + 'static;
    type MessageQueue: Send + Sync + 'static;
    type Event: Send + Sync + 'static;
    type Timer: Send + Sync + 'static;

    // ------------------------------------------------------------------
    // Interrupts and critical sections
    // ------------------------------------------------------------------

    /// Mask interrupts, returning the level to restore; nests
    fn interrupt_disable(&self) -> IrqLevel;
    fn interrupt_enable(&self, level: IrqLevel);
    /// Interrupt nesting depth of the caller; non-zero inside an ISR
    fn interrupt_nest(&self) -> u32;
    /// Lock the scheduler (no preemption, interrupts still served)
    fn enter_critical(&self);
    fn exit_critical(&self);

    // ------------------------------------------------------------------
    // Clock
    // ------------------------------------------------------------------

    fn tick_get(&self) -> Tick;
    fn tick_set(&self, tick: Tick);
    fn tick_increase(&self);
    fn tick_rate_hz(&self) -> u32;

    // ------------------------------------------------------------------
    // Heap
    // ------------------------------------------------------------------

    fn heap_alloc(&self, size: usize) -> Option<HeapBlock>;
    fn heap_free(&self, block: HeapBlock);

    // ------------------------------------------------------------------
    // Threads
    // ------------------------------------------------------------------

    /// Initialize a thread; on failure the stack is handed back
    fn thread_init(&self, params: ThreadParams) -> Result<Self::Thread, Rejected<Region>>;
    fn thread_start(&self, thread: &Self::Thread) -> HostResult<()>;
    /// Detach a thread from the scheduler, handing back its stack
    fn thread_detach(&self, thread: &Self::Thread) -> HostResult<Option<Region>>;
    /// Terminate the calling thread
    fn thread_exit(&self) -> !;
    fn thread_self(&self) -> Self::ThreadId;
    fn thread_id(&self, thread: &Self::Thread) -> Self::ThreadId;
    fn thread_suspend(&self, thread: &Self::Thread) -> HostResult<()>;
    /// Resume a suspended thread or cut a pending delay short; a thread
    /// blocked on an object is not woken
    fn thread_resume(&self, thread: &Self::Thread) -> HostResult<()>;
    fn thread_yield(&self);
    fn thread_delay(&self, ticks: Tick);
    /// Sleep until `*previous + increment`, then advance `*previous`;
    /// returns whether the caller actually slept
    fn thread_delay_until(&self, previous: &mut Tick, increment: Tick) -> bool;
    fn thread_state(&self, thread: &Self::Thread) -> ThreadState;
    fn thread_priority(&self, thread: &Self::Thread) -> Priority;
    fn thread_set_priority(&self, thread: &Self::Thread, priority: Priority) -> HostResult<()>;
    fn thread_bind_cpu(&self, thread: &Self::Thread, cpu: usize) -> HostResult<()>;
    fn thread_cpu(&self, thread: &Self::Thread) -> Option<usize>;
    fn thread_count(&self) -> usize;
    fn cpu_count(&self) -> usize;

    // ------------------------------------------------------------------
    // Mutex
    // ------------------------------------------------------------------

    fn mutex_init(&self, name: &str) -> HostResult<Self::Mutex>;
    fn mutex_take(&self, mutex: &Self::Mutex, ticks: Tick) -> HostResult<()>;
    fn mutex_release(&self, mutex: &Self::Mutex) -> HostResult<()>;
    fn mutex_detach(&self, mutex: &Self::Mutex) -> HostResult<()>;
    fn mutex_owner(&self, mutex: &Self::Mutex) -> Option<Self::ThreadId>;
    /// 1 when available, 0 when held
    fn mutex_value(&self, mutex: &Self::Mutex) -> u32;

    // ------------------------------------------------------------------
    // Semaphore
    // ------------------------------------------------------------------

    fn semaphore_init(&self, name: &str, initial: u32, max: u32) -> HostResult<Self::Semaphore>;
    fn semaphore_take(&self, sem: &Self::Semaphore, ticks: Tick) -> HostResult<()>;
    fn semaphore_release(&self, sem: &Self::Semaphore) -> HostResult<()>;
    fn semaphore_detach(&self, sem: &Self::Semaphore) -> HostResult<()>;
    fn semaphore_value(&self, sem: &Self::Semaphore) -> u32;
    fn semaphore_reset(&self, sem: &Self::Semaphore, value: u32) -> HostResult<()>;

    // ------------------------------------------------------------------
    // Message queue
    // ------------------------------------------------------------------

    /// Initialize a queue of `capacity` slots of `msg_size` bytes inside `pool`
    fn message_queue_init(
        &self,
        name: &str,
        msg_size: usize,
        capacity: usize,
        pool: Region,
    ) -> Result<Self::MessageQueue, Rejected<Region>>;
    fn message_queue_send(&self, mq: &Self::MessageQueue, item: &[u8]) -> HostResult<()>;
    fn message_queue_send_wait(
        &self,
        mq: &Self::MessageQueue,
        item: &[u8],
        ticks: Tick,
    ) -> HostResult<()>;
    /// Insert at the head without blocking
    fn message_queue_urgent(&self, mq: &Self::MessageQueue, item: &[u8]) -> HostResult<()>;
    /// Insert at the head, waiting up to `ticks` for a free slot
    fn message_queue_urgent_wait(
        &self,
        mq: &Self::MessageQueue,
        item: &[u8],
        ticks: Tick,
    ) -> HostResult<()>;
    fn message_queue_recv(
        &self,
        mq: &Self::MessageQueue,
        buf: &mut [u8],
        ticks: Tick,
    ) -> HostResult<usize>;
    fn message_queue_reset(&self, mq: &Self::MessageQueue) -> HostResult<()>;
    fn message_queue_entries(&self, mq: &Self::MessageQueue) -> usize;
    fn message_queue_capacity(&self, mq: &Self::MessageQueue) -> usize;
    /// Detach, handing back the message pool
    fn message_queue_detach(&self, mq: &Self::MessageQueue) -> HostResult<Option<Region>>;

    // ------------------------------------------------------------------
    // Event set
    // ------------------------------------------------------------------

    fn event_init(&self, name: &str) -> HostResult<Self::Event>;
    /// OR `bits` into the set and wake satisfied waiters
    fn event_send(&self, event: &Self::Event, bits: EventBits) -> HostResult<()>;
    /// Wait for `set` per `option`; returns the bits seen before any clear
    fn event_recv(
        &self,
        event: &Self::Event,
        set: EventBits,
        option: EventOption,
        ticks: Tick,
    ) -> HostResult<EventBits>;
    /// Raw read; caller holds a critical section when racing writers
    fn event_bits(&self, event: &Self::Event) -> EventBits;
    /// Raw write without waking anyone; caller holds a critical section
    fn event_store(&self, event: &Self::Event, bits: EventBits);
    fn event_has_waiters(&self, event: &Self::Event) -> bool;
    fn event_detach(&self, event: &Self::Event) -> HostResult<()>;
    fn event_caps(&self) -> EventCaps;

    // ------------------------------------------------------------------
    // Timer
    // ------------------------------------------------------------------

    /// Start the timer service thread; idempotent
    fn timer_thread_init(&self, name: &str) -> HostResult<()>;
    fn timer_init(
        &self,
        name: &str,
        period: Tick,
        mode: ReloadMode,
        callback: HostTimerCallback,
    ) -> HostResult<Self::Timer>;
    fn timer_start(&self, timer: &Self::Timer) -> HostResult<()>;
    fn timer_stop(&self, timer: &Self::Timer) -> HostResult<()>;
    fn timer_control(&self, timer: &Self::Timer, control: TimerControl) -> HostResult<()>;
    fn timer_info(&self, timer: &Self::Timer) -> TimerInfo;
    fn timer_detach(&self, timer: &Self::Timer) -> HostResult<()>;

    // ------------------------------------------------------------------
    // Scheduler
    // ------------------------------------------------------------------

    fn set_idle_hook(&self, hook: Option<HostHook>);
    /// Hook run on every context switch
    fn set_scheduler_hook(&self, hook: Option<HostHook>);
    fn scheduler_start(&self) -> HostResult<()>;
}
