/*!
 * Simulated Host Kernel
 *
 * Reference `HostKernel` on std threads. One logical interrupt lock
 * serializes kernel entries the way masking interrupts does on a single
 * core; blocking calls park on per-object condvars with that lock released.
 */

mod clock;
mod event;
mod heap;
mod ipc;
mod irq;
mod thread;
mod timer;
mod wait;

pub use event::SimEvent;
pub use heap::HeapStats;
pub use ipc::{SimMessageQueue, SimMutex, SimSemaphore};
pub use thread::{SimThread, SimThreadId, MIN_STACK_SIZE};
pub use timer::SimTimer;

use super::traits::HostKernel;
use super::types::{
    EventCaps, EventOption, HeapBlock, HostError, HostHook, HostResult, HostTimerCallback,
    IrqLevel, Region, Rejected, ThreadParams, ThreadState, TimerControl, TimerInfo,
};
use crate::core::types::{EventBits, Priority, ReloadMode, Tick};
use clock::TickClock;
use heap::SimHeap;
use irq::IrqLock;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thread::ThreadTable;
use timer::TimerService;
use wait::WaitCell;

thread_local! {
    static IRQ_NEST: Cell<u32> = const { Cell::new(0) };
}

// ============================================================================
// Configuration
// ============================================================================

/// Settings of the simulated host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub tick_rate_hz: u32,
    /// Heap limit in bytes; `None` is unbounded
    pub heap_capacity: Option<usize>,
    /// Honor `EventOption::AND` in `event_recv`
    pub native_all_bits_wait: bool,
    pub cpu_count: usize,
    /// Pause between idle hook runs
    pub idle_interval: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 1000,
            heap_capacity: None,
            native_all_bits_wait: true,
            cpu_count: 1,
            idle_interval: Duration::from_millis(5),
        }
    }
}

impl SimConfig {
    /// Host whose event primitive only supports any-bit waits
    pub fn without_all_bits_wait() -> Self {
        Self {
            native_all_bits_wait: false,
            ..Self::default()
        }
    }

    /// Host with a bounded heap
    pub fn with_heap_capacity(bytes: usize) -> Self {
        Self {
            heap_capacity: Some(bytes),
            ..Self::default()
        }
    }

    /// Multi-core host
    pub fn smp(cpu_count: usize) -> Self {
        Self {
            cpu_count: cpu_count.max(1),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// ============================================================================
// Kernel
// ============================================================================

#[derive(Default)]
struct Hooks {
    idle: Option<HostHook>,
    scheduler: Option<HostHook>,
}

pub struct SimKernel {
    me: Weak<SimKernel>,
    config: SimConfig,
    irq: IrqLock,
    sched_lock: IrqLock,
    clock: TickClock,
    heap: SimHeap,
    threads: ThreadTable,
    timers: Arc<TimerService>,
    started: WaitCell<bool>,
    hooks: Mutex<Hooks>,
}

impl SimKernel {
    pub fn new(config: SimConfig) -> Arc<Self> {
        let clock = TickClock::new(config.tick_rate_hz);
        let tick = clock.duration(1);
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            irq: IrqLock::new(),
            sched_lock: IrqLock::new(),
            clock,
            heap: SimHeap::new(config.heap_capacity),
            threads: ThreadTable::new(),
            timers: Arc::new(TimerService::new(tick)),
            started: WaitCell::new(false),
            hooks: Mutex::new(Hooks::default()),
            config,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    pub fn is_started(&self) -> bool {
        self.started.lock().inner
    }

    /// Run `f` as if it were an interrupt handler on the calling thread
    pub fn run_in_isr<R>(&self, f: impl FnOnce() -> R) -> R {
        struct Nest;
        impl Drop for Nest {
            fn drop(&mut self) {
                IRQ_NEST.with(|n| n.set(n.get() - 1));
            }
        }
        IRQ_NEST.with(|n| n.set(n.get() + 1));
        let _nest = Nest;
        f()
    }

    fn run_scheduler_hook(&self) {
        let hook = self.hooks.lock().scheduler.clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn spawn_idle(&self) -> HostResult<()> {
        let kernel = self.me.clone();
        let interval = self.config.idle_interval;
        std::thread::Builder::new()
            .name("tidle0".to_string())
            .spawn(move || loop {
                let Some(kernel) = kernel.upgrade() else {
                    return;
                };
                let hook = kernel.hooks.lock().idle.clone();
                drop(kernel);
                if let Some(hook) = hook {
                    hook();
                }
                std::thread::sleep(interval);
            })
            .map(|_| ())
            .map_err(|_| HostError::NoMemory)
    }
}

impl Drop for SimKernel {
    fn drop(&mut self) {
        self.timers.shutdown();
    }
}

impl HostKernel for SimKernel {
    type ThreadId = SimThreadId;
    type Thread = SimThread;
    type Mutex = SimMutex;
    type Semaphore = SimSemaphore;
    type MessageQueue = SimMessageQueue;
    type Event = SimEvent;
    type Timer = SimTimer;

    fn interrupt_disable(&self) -> IrqLevel {
        self.irq.acquire()
    }

    fn interrupt_enable(&self, level: IrqLevel) {
        self.irq.release(level);
    }

    fn interrupt_nest(&self) -> u32 {
        IRQ_NEST.with(Cell::get)
    }

    fn enter_critical(&self) {
        let _ = self.sched_lock.acquire();
    }

    fn exit_critical(&self) {
        self.sched_lock.release_one();
    }

    fn tick_get(&self) -> Tick {
        self.clock.now()
    }

    fn tick_set(&self, tick: Tick) {
        self.clock.set(tick);
    }

    fn tick_increase(&self) {
        self.clock.increase();
    }

    fn tick_rate_hz(&self) -> u32 {
        self.clock.rate_hz()
    }

    fn heap_alloc(&self, size: usize) -> Option<HeapBlock> {
        self.heap.alloc(size)
    }

    fn heap_free(&self, block: HeapBlock) {
        self.heap.free(block);
    }

    fn thread_init(&self, params: ThreadParams) -> Result<SimThread, Rejected<Region>> {
        self.thread_init_impl(params)
    }

    fn thread_start(&self, thread: &SimThread) -> HostResult<()> {
        self.thread_start_impl(thread)
    }

    fn thread_detach(&self, thread: &SimThread) -> HostResult<Option<Region>> {
        self.thread_detach_impl(thread)
    }

    fn thread_exit(&self) -> ! {
        self.thread_exit_impl()
    }

    fn thread_self(&self) -> SimThreadId {
        thread::current_id()
    }

    fn thread_id(&self, thread: &SimThread) -> SimThreadId {
        self.thread_id_of(thread)
    }

    fn thread_suspend(&self, thread: &SimThread) -> HostResult<()> {
        self.thread_suspend_impl(thread)
    }

    fn thread_resume(&self, thread: &SimThread) -> HostResult<()> {
        self.thread_resume_impl(thread)
    }

    fn thread_yield(&self) {
        self.checkpoint();
        std::thread::yield_now();
    }

    fn thread_delay(&self, ticks: Tick) {
        self.thread_delay_impl(ticks);
    }

    fn thread_delay_until(&self, previous: &mut Tick, increment: Tick) -> bool {
        self.thread_delay_until_impl(previous, increment)
    }

    fn thread_state(&self, thread: &SimThread) -> ThreadState {
        self.thread_state_impl(thread)
    }

    fn thread_priority(&self, thread: &SimThread) -> Priority {
        self.thread_priority_impl(thread)
    }

    fn thread_set_priority(&self, thread: &SimThread, priority: Priority) -> HostResult<()> {
        self.thread_set_priority_impl(thread, priority)
    }

    fn thread_bind_cpu(&self, thread: &SimThread, cpu: usize) -> HostResult<()> {
        self.thread_bind_cpu_impl(thread, cpu)
    }

    fn thread_cpu(&self, thread: &SimThread) -> Option<usize> {
        self.thread_cpu_impl(thread)
    }

    fn thread_count(&self) -> usize {
        self.threads.len()
    }

    fn cpu_count(&self) -> usize {
        self.config.cpu_count
    }

    fn mutex_init(&self, name: &str) -> HostResult<SimMutex> {
        Ok(SimMutex::new(name))
    }

    fn mutex_take(&self, mutex: &SimMutex, ticks: Tick) -> HostResult<()> {
        self.mutex_take_impl(mutex, ticks)
    }

    fn mutex_release(&self, mutex: &SimMutex) -> HostResult<()> {
        self.mutex_release_impl(mutex)
    }

    fn mutex_detach(&self, mutex: &SimMutex) -> HostResult<()> {
        self.mutex_detach_impl(mutex)
    }

    fn mutex_owner(&self, mutex: &SimMutex) -> Option<SimThreadId> {
        self.mutex_owner_impl(mutex)
    }

    fn mutex_value(&self, mutex: &SimMutex) -> u32 {
        u32::from(self.mutex_owner_impl(mutex).is_none())
    }

    fn semaphore_init(&self, name: &str, initial: u32, max: u32) -> HostResult<SimSemaphore> {
        if max == 0 || initial > max {
            return Err(HostError::Invalid);
        }
        Ok(SimSemaphore::new(name, initial, max))
    }

    fn semaphore_take(&self, sem: &SimSemaphore, ticks: Tick) -> HostResult<()> {
        self.semaphore_take_impl(sem, ticks)
    }

    fn semaphore_release(&self, sem: &SimSemaphore) -> HostResult<()> {
        self.semaphore_release_impl(sem)
    }

    fn semaphore_detach(&self, sem: &SimSemaphore) -> HostResult<()> {
        self.semaphore_detach_impl(sem)
    }

    fn semaphore_value(&self, sem: &SimSemaphore) -> u32 {
        self.semaphore_value_impl(sem)
    }

    fn semaphore_reset(&self, sem: &SimSemaphore, value: u32) -> HostResult<()> {
        self.semaphore_reset_impl(sem, value)
    }

    fn message_queue_init(
        &self,
        name: &str,
        msg_size: usize,
        capacity: usize,
        pool: Region,
    ) -> Result<SimMessageQueue, Rejected<Region>> {
        SimMessageQueue::new(name, msg_size, capacity, pool)
    }

    fn message_queue_send(&self, mq: &SimMessageQueue, item: &[u8]) -> HostResult<()> {
        self.mq_send_impl(mq, item, false)
    }

    fn message_queue_send_wait(
        &self,
        mq: &SimMessageQueue,
        item: &[u8],
        ticks: Tick,
    ) -> HostResult<()> {
        self.mq_send_wait_impl(mq, item, ticks, false)
    }

    fn message_queue_urgent(&self, mq: &SimMessageQueue, item: &[u8]) -> HostResult<()> {
        self.mq_send_impl(mq, item, true)
    }

    fn message_queue_urgent_wait(
        &self,
        mq: &SimMessageQueue,
        item: &[u8],
        ticks: Tick,
    ) -> HostResult<()> {
        self.mq_send_wait_impl(mq, item, ticks, true)
    }

    fn message_queue_recv(
        &self,
        mq: &SimMessageQueue,
        buf: &mut [u8],
        ticks: Tick,
    ) -> HostResult<usize> {
        self.mq_recv_impl(mq, buf, ticks)
    }

    fn message_queue_reset(&self, mq: &SimMessageQueue) -> HostResult<()> {
        self.mq_reset_impl(mq)
    }

    fn message_queue_entries(&self, mq: &SimMessageQueue) -> usize {
        self.mq_entries_impl(mq)
    }

    fn message_queue_capacity(&self, mq: &SimMessageQueue) -> usize {
        mq.capacity()
    }

    fn message_queue_detach(&self, mq: &SimMessageQueue) -> HostResult<Option<Region>> {
        self.mq_detach_impl(mq)
    }

    fn event_init(&self, name: &str) -> HostResult<SimEvent> {
        Ok(SimEvent::new(name))
    }

    fn event_send(&self, event: &SimEvent, bits: EventBits) -> HostResult<()> {
        self.event_send_impl(event, bits)
    }

    fn event_recv(
        &self,
        event: &SimEvent,
        set: EventBits,
        option: EventOption,
        ticks: Tick,
    ) -> HostResult<EventBits> {
        self.event_recv_impl(event, set, option, ticks)
    }

    fn event_bits(&self, event: &SimEvent) -> EventBits {
        self.event_bits_impl(event)
    }

    fn event_store(&self, event: &SimEvent, bits: EventBits) {
        self.event_store_impl(event, bits);
    }

    fn event_has_waiters(&self, event: &SimEvent) -> bool {
        self.event_has_waiters_impl(event)
    }

    fn event_detach(&self, event: &SimEvent) -> HostResult<()> {
        self.event_detach_impl(event)
    }

    fn event_caps(&self) -> EventCaps {
        EventCaps {
            native_all_bits: self.config.native_all_bits_wait,
        }
    }

    fn timer_thread_init(&self, name: &str) -> HostResult<()> {
        self.timers.start(name)
    }

    fn timer_init(
        &self,
        name: &str,
        period: Tick,
        mode: ReloadMode,
        callback: HostTimerCallback,
    ) -> HostResult<SimTimer> {
        self.timer_init_impl(name, period, mode, callback)
    }

    fn timer_start(&self, timer: &SimTimer) -> HostResult<()> {
        self.timer_start_impl(timer)
    }

    fn timer_stop(&self, timer: &SimTimer) -> HostResult<()> {
        self.timer_stop_impl(timer)
    }

    fn timer_control(&self, timer: &SimTimer, control: TimerControl) -> HostResult<()> {
        self.timer_control_impl(timer, control)
    }

    fn timer_info(&self, timer: &SimTimer) -> TimerInfo {
        self.timer_info_impl(timer)
    }

    fn timer_detach(&self, timer: &SimTimer) -> HostResult<()> {
        self.timer_detach_impl(timer)
    }

    fn set_idle_hook(&self, hook: Option<HostHook>) {
        self.hooks.lock().idle = hook;
    }

    fn set_scheduler_hook(&self, hook: Option<HostHook>) {
        self.hooks.lock().scheduler = hook;
    }

    fn scheduler_start(&self) -> HostResult<()> {
        {
            let mut st = self.started.lock();
            if st.inner {
                return Err(HostError::Busy);
            }
            st.inner = true;
        }
        self.started.notify_all();
        self.spawn_idle()?;
        // First dispatch
        self.run_scheduler_hook();
        tracing::info!(
            tick_rate_hz = self.clock.rate_hz(),
            cpus = self.config.cpu_count,
            "sim scheduler started"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{MAX_DELAY, NO_WAIT};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread as os_thread;

    #[test]
    fn test_semaphore_blocks_until_release() {
        let kernel = SimKernel::new(SimConfig::default());
        let sem = Arc::new(kernel.semaphore_init("s", 0, 4).unwrap());
        assert_eq!(kernel.semaphore_take(&sem, NO_WAIT), Err(HostError::Timeout));

        let waiter = {
            let kernel = Arc::clone(&kernel);
            let sem = Arc::clone(&sem);
            os_thread::spawn(move || kernel.semaphore_take(&sem, MAX_DELAY))
        };
        os_thread::sleep(Duration::from_millis(20));
        kernel.semaphore_release(&sem).unwrap();
        assert_eq!(waiter.join().unwrap(), Ok(()));
        assert_eq!(kernel.semaphore_value(&sem), 0);
    }

    #[test]
    fn test_mutex_recursion_and_owner_check() {
        let kernel = SimKernel::new(SimConfig::default());
        let m = Arc::new(kernel.mutex_init("m").unwrap());
        kernel.mutex_take(&m, NO_WAIT).unwrap();
        kernel.mutex_take(&m, NO_WAIT).unwrap();
        assert_eq!(kernel.mutex_value(&m), 0);

        let other = {
            let kernel = Arc::clone(&kernel);
            let m = Arc::clone(&m);
            os_thread::spawn(move || kernel.mutex_release(&m))
        };
        assert_eq!(other.join().unwrap(), Err(HostError::Error));

        kernel.mutex_release(&m).unwrap();
        assert_eq!(kernel.mutex_value(&m), 0);
        kernel.mutex_release(&m).unwrap();
        assert_eq!(kernel.mutex_value(&m), 1);
    }

    #[test]
    fn test_event_and_wait_and_clear() {
        let kernel = SimKernel::new(SimConfig::default());
        let ev = kernel.event_init("e").unwrap();
        kernel.event_send(&ev, 0b011).unwrap();
        let seen = kernel
            .event_recv(&ev, 0b011, EventOption::AND | EventOption::CLEAR, NO_WAIT)
            .unwrap();
        assert_eq!(seen, 0b011);
        assert_eq!(kernel.event_bits(&ev), 0);
    }

    #[test]
    fn test_event_and_rejected_without_native_support() {
        let kernel = SimKernel::new(SimConfig::without_all_bits_wait());
        let ev = kernel.event_init("e").unwrap();
        assert_eq!(
            kernel.event_recv(&ev, 1, EventOption::AND, NO_WAIT),
            Err(HostError::NoSys)
        );
        assert!(!kernel.event_caps().native_all_bits);
    }

    #[test]
    fn test_event_waiter_count() {
        let kernel = SimKernel::new(SimConfig::default());
        let ev = Arc::new(kernel.event_init("e").unwrap());
        let waiter = {
            let kernel = Arc::clone(&kernel);
            let ev = Arc::clone(&ev);
            os_thread::spawn(move || kernel.event_recv(&ev, 1, EventOption::OR, MAX_DELAY))
        };
        os_thread::sleep(Duration::from_millis(20));
        assert!(kernel.event_has_waiters(&ev));
        kernel.event_send(&ev, 1).unwrap();
        assert_eq!(waiter.join().unwrap(), Ok(1));
        assert!(!kernel.event_has_waiters(&ev));
    }

    #[test]
    fn test_message_queue_full_and_timeout() {
        let kernel = SimKernel::new(SimConfig::default());
        let pool = Region::Heap(kernel.heap_alloc(8).unwrap());
        let mq = kernel.message_queue_init("q", 4, 2, pool).unwrap();
        kernel.message_queue_send(&mq, &[1; 4]).unwrap();
        kernel.message_queue_send(&mq, &[2; 4]).unwrap();
        assert_eq!(kernel.message_queue_send(&mq, &[3; 4]), Err(HostError::Full));
        assert_eq!(
            kernel.message_queue_send_wait(&mq, &[3; 4], 5),
            Err(HostError::Full)
        );
        let mut buf = [0u8; 4];
        kernel.message_queue_recv(&mq, &mut buf, NO_WAIT).unwrap();
        assert_eq!(buf, [1; 4]);
        if let Ok(Some(Region::Heap(block))) = kernel.message_queue_detach(&mq) {
            kernel.heap_free(block);
        }
        assert_eq!(kernel.heap_stats().live_blocks, 0);
    }

    #[test]
    fn test_urgent_wait_lands_at_head_once_space_frees() {
        let kernel = SimKernel::new(SimConfig::default());
        let pool = Region::Heap(kernel.heap_alloc(2).unwrap());
        let mq = Arc::new(kernel.message_queue_init("q", 1, 2, pool).unwrap());
        kernel.message_queue_send(&mq, &[1]).unwrap();
        kernel.message_queue_send(&mq, &[2]).unwrap();
        assert_eq!(kernel.message_queue_urgent_wait(&mq, &[9], 5), Err(HostError::Full));

        let drainer = {
            let (kernel, mq) = (Arc::clone(&kernel), Arc::clone(&mq));
            os_thread::spawn(move || {
                os_thread::sleep(Duration::from_millis(20));
                let mut buf = [0u8; 1];
                kernel.message_queue_recv(&mq, &mut buf, NO_WAIT).map(|_| buf[0])
            })
        };
        assert_eq!(kernel.message_queue_urgent_wait(&mq, &[9], MAX_DELAY), Ok(()));
        assert_eq!(drainer.join().unwrap(), Ok(1));

        let mut buf = [0u8; 1];
        kernel.message_queue_recv(&mq, &mut buf, NO_WAIT).unwrap();
        assert_eq!(buf, [9]);
        kernel.message_queue_recv(&mq, &mut buf, NO_WAIT).unwrap();
        assert_eq!(buf, [2]);
    }

    #[test]
    fn test_timer_fires_periodically() {
        let kernel = SimKernel::new(SimConfig::default());
        kernel.timer_thread_init("timer").unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let timer = kernel
            .timer_init(
                "t",
                10,
                ReloadMode::Periodic,
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        kernel.timer_start(&timer).unwrap();
        os_thread::sleep(Duration::from_millis(55));
        kernel.timer_stop(&timer).unwrap();
        let n = fired.load(Ordering::SeqCst);
        assert!(n >= 2, "fired {n} times");
        assert!(!kernel.timer_info(&timer).active);
    }

    #[test]
    fn test_timer_rearm_keeps_one_deadline() {
        let kernel = SimKernel::new(SimConfig::default());
        let timer = kernel
            .timer_init("slow", 1_000_000, ReloadMode::OneShot, Box::new(|| {}))
            .unwrap();
        for _ in 0..100 {
            kernel.timer_start(&timer).unwrap();
        }
        assert_eq!(kernel.timers.pending_len(), 1);

        kernel.timer_stop(&timer).unwrap();
        assert_eq!(kernel.timers.pending_len(), 0);

        kernel.timer_start(&timer).unwrap();
        kernel.timer_detach(&timer).unwrap();
        assert_eq!(kernel.timers.pending_len(), 0);
    }

    #[test]
    fn test_isr_nesting_is_per_call() {
        let kernel = SimKernel::new(SimConfig::default());
        assert_eq!(kernel.interrupt_nest(), 0);
        let inside = kernel.run_in_isr(|| kernel.interrupt_nest());
        assert_eq!(inside, 1);
        assert_eq!(kernel.interrupt_nest(), 0);
    }

    #[test]
    fn test_sim_config_from_json() {
        let config = SimConfig::from_json(r#"{"tick_rate_hz": 100, "cpu_count": 2}"#).unwrap();
        assert_eq!(config.tick_rate_hz, 100);
        assert_eq!(config.cpu_count, 2);
        assert!(config.native_all_bits_wait);
    }
}
