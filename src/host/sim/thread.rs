/*!
 * Sim Threads
 *
 * Host threads run on OS threads. They stay parked until the scheduler is
 * started, then run their entry. Suspension and close requests from other
 * threads are observed at the target's next kernel call.
 */

use super::wait::WaitCell;
use super::SimKernel;
use crate::core::types::{Priority, Tick};
use crate::host::types::{
    HostError, HostResult, Region, Rejected, ThreadEntry, ThreadParams, ThreadState,
};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Smallest stack the sim accepts
pub const MIN_STACK_SIZE: usize = 64;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_ID: Cell<u64> = const { Cell::new(0) };
    static CURRENT: RefCell<Option<Arc<ThreadCtl>>> = const { RefCell::new(None) };
}

/// Identity of any OS thread calling into the sim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SimThreadId(u64);

impl fmt::Display for SimThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub(super) fn current_id() -> SimThreadId {
    CURRENT_ID.with(|id| {
        if id.get() == 0 {
            id.set(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed));
        }
        SimThreadId(id.get())
    })
}

fn current_ctl() -> Option<Arc<ThreadCtl>> {
    CURRENT.with(|c| c.borrow().clone())
}

/// Unwind payload used by `thread_exit`
struct ThreadExit;

#[derive(Debug)]
struct RunState {
    state: ThreadState,
    suspended: bool,
    closed: bool,
    delaying: bool,
    woken: bool,
}

pub(super) struct ThreadCtl {
    id: SimThreadId,
    name: String,
    priority: AtomicU32,
    cpu: Mutex<Option<usize>>,
    run: WaitCell<RunState>,
    stack: Mutex<Option<Region>>,
    entry: Mutex<Option<ThreadEntry>>,
}

/// Host thread object of the sim
pub struct SimThread(Arc<ThreadCtl>);

impl fmt::Debug for SimThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimThread")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .finish()
    }
}

/// Live threads by id
pub(super) struct ThreadTable {
    live: DashMap<SimThreadId, Arc<ThreadCtl>, RandomState>,
}

impl ThreadTable {
    pub fn new() -> Self {
        Self {
            live: DashMap::with_hasher(RandomState::new()),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Record the caller's state if it is a sim thread
    pub fn mark_current(&self, state: ThreadState) {
        if let Some(ctl) = current_ctl() {
            let mut run = ctl.run.lock();
            if !run.inner.closed && !run.inner.suspended {
                run.inner.state = state;
            }
        }
    }

    fn remove(&self, id: SimThreadId) {
        self.live.remove(&id);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

impl SimKernel {
    pub(super) fn thread_init_impl(
        &self,
        params: ThreadParams,
    ) -> Result<SimThread, Rejected<Region>> {
        if params.stack.len() < MIN_STACK_SIZE {
            tracing::debug!(
                name = %params.name,
                stack = params.stack.len(),
                "stack below minimum"
            );
            return Err(Rejected::new(HostError::Invalid, params.stack));
        }

        let ctl = Arc::new(ThreadCtl {
            id: SimThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed)),
            name: params.name,
            priority: AtomicU32::new(params.priority),
            cpu: Mutex::new(None),
            run: WaitCell::new(RunState {
                state: ThreadState::Init,
                suspended: false,
                closed: false,
                delaying: false,
                woken: false,
            }),
            stack: Mutex::new(Some(params.stack)),
            entry: Mutex::new(Some(params.entry)),
        });
        self.threads.live.insert(ctl.id, Arc::clone(&ctl));
        Ok(SimThread(ctl))
    }

    pub(super) fn thread_start_impl(&self, thread: &SimThread) -> HostResult<()> {
        {
            let mut run = thread.0.run.lock();
            if run.inner.state != ThreadState::Init || run.inner.closed {
                return Err(HostError::Error);
            }
            run.inner.state = ThreadState::Ready;
        }

        let kernel = self.me.clone();
        let ctl = Arc::clone(&thread.0);
        std::thread::Builder::new()
            .name(thread.0.name.clone())
            .spawn(move || trampoline(kernel, ctl))
            .map(|_| ())
            .map_err(|e| {
                tracing::error!(name = %thread.0.name, error = %e, "failed to spawn OS thread");
                HostError::NoMemory
            })
    }

    pub(super) fn thread_detach_impl(&self, thread: &SimThread) -> HostResult<Option<Region>> {
        {
            // A thread whose entry returned is closed but still holds its stack
            let mut run = thread.0.run.lock();
            if run.detached {
                return Err(HostError::Error);
            }
            run.detached = true;
            run.inner.closed = true;
            run.inner.state = ThreadState::Closed;
        }
        thread.0.run.notify_all();
        {
            // Wake a trampoline still parked before scheduler start
            let _started = self.started.lock();
            self.started.notify_all();
        }
        self.threads.remove(thread.0.id);
        Ok(thread.0.stack.lock().take())
    }

    pub(super) fn thread_exit_impl(&self) -> ! {
        let Some(ctl) = current_ctl() else {
            panic!("thread_exit called outside a host thread");
        };
        {
            let mut run = ctl.run.lock();
            run.inner.closed = true;
            run.inner.state = ThreadState::Closed;
        }
        self.threads.remove(ctl.id);
        panic::resume_unwind(Box::new(ThreadExit));
    }

    /// Honor pending close/suspend requests for the calling thread
    pub(super) fn checkpoint(&self) {
        let Some(ctl) = current_ctl() else {
            return;
        };
        let mut run = ctl.run.lock();
        while run.inner.suspended && !run.inner.closed {
            run.inner.state = ThreadState::Suspended;
            ctl.run.condvar().wait(&mut run);
        }
        if run.inner.closed {
            drop(run);
            panic::resume_unwind(Box::new(ThreadExit));
        }
        run.inner.state = ThreadState::Running;
    }

    pub(super) fn thread_suspend_impl(&self, thread: &SimThread) -> HostResult<()> {
        {
            let mut run = thread.0.run.lock();
            if run.inner.closed || run.inner.state == ThreadState::Init {
                return Err(HostError::Error);
            }
            run.inner.suspended = true;
            run.inner.state = ThreadState::Suspended;
        }
        if thread.0.id == current_id() {
            self.checkpoint();
        }
        Ok(())
    }

    pub(super) fn thread_resume_impl(&self, thread: &SimThread) -> HostResult<()> {
        let mut run = thread.0.run.lock();
        if run.inner.closed {
            return Err(HostError::Error);
        }
        if run.inner.suspended {
            run.inner.suspended = false;
            run.inner.state = if run.inner.delaying {
                ThreadState::Blocked
            } else {
                ThreadState::Ready
            };
        } else if run.inner.delaying {
            run.inner.woken = true;
            run.inner.state = ThreadState::Ready;
        } else {
            return Err(HostError::Error);
        }
        drop(run);
        thread.0.run.notify_all();
        Ok(())
    }

    pub(super) fn thread_delay_impl(&self, ticks: Tick) {
        self.checkpoint();
        if ticks == 0 {
            std::thread::yield_now();
            return;
        }
        let until = Instant::now() + self.clock.duration(ticks);

        let Some(ctl) = current_ctl() else {
            std::thread::sleep(until.saturating_duration_since(Instant::now()));
            return;
        };

        let saved = self.irq.release_all();
        {
            let mut run = ctl.run.lock();
            run.inner.delaying = true;
            run.inner.woken = false;
            run.inner.state = ThreadState::Blocked;
            while !run.inner.woken && !run.inner.closed {
                if ctl.run.condvar().wait_until(&mut run, until).timed_out() {
                    break;
                }
            }
            run.inner.delaying = false;
            run.inner.woken = false;
        }
        self.irq.restore(saved);
        self.checkpoint();
    }

    pub(super) fn thread_delay_until_impl(&self, previous: &mut Tick, increment: Tick) -> bool {
        let elapsed = self.clock.now().wrapping_sub(*previous);
        *previous = previous.wrapping_add(increment);
        if elapsed < increment {
            self.thread_delay_impl(increment - elapsed);
            true
        } else {
            false
        }
    }

    pub(super) fn thread_state_impl(&self, thread: &SimThread) -> ThreadState {
        let run = thread.0.run.lock();
        if run.inner.closed {
            ThreadState::Closed
        } else if run.inner.suspended {
            ThreadState::Suspended
        } else {
            run.inner.state
        }
    }

    pub(super) fn thread_set_priority_impl(
        &self,
        thread: &SimThread,
        priority: Priority,
    ) -> HostResult<()> {
        thread.0.priority.store(priority, Ordering::Release);
        Ok(())
    }

    pub(super) fn thread_priority_impl(&self, thread: &SimThread) -> Priority {
        thread.0.priority.load(Ordering::Acquire)
    }

    pub(super) fn thread_bind_cpu_impl(&self, thread: &SimThread, cpu: usize) -> HostResult<()> {
        if cpu >= self.config.cpu_count {
            return Err(HostError::Invalid);
        }
        *thread.0.cpu.lock() = Some(cpu);
        Ok(())
    }

    pub(super) fn thread_cpu_impl(&self, thread: &SimThread) -> Option<usize> {
        *thread.0.cpu.lock()
    }

    #[inline]
    pub(super) fn thread_id_of(&self, thread: &SimThread) -> SimThreadId {
        thread.0.id
    }

    /// Park until the scheduler starts; false when the thread was closed first
    fn wait_for_scheduler(&self, ctl: &ThreadCtl) -> bool {
        let mut st = self.started.lock();
        loop {
            if ctl.run.lock().inner.closed {
                return false;
            }
            if st.inner {
                return true;
            }
            self.started.condvar().wait(&mut st);
        }
    }

    fn switch_in(&self, ctl: &ThreadCtl) {
        {
            let mut run = ctl.run.lock();
            if !run.inner.closed {
                run.inner.state = ThreadState::Running;
            }
        }
        self.run_scheduler_hook();
    }
}

fn trampoline(kernel: Weak<SimKernel>, ctl: Arc<ThreadCtl>) {
    CURRENT_ID.with(|id| id.set(ctl.id.0));
    CURRENT.with(|c| *c.borrow_mut() = Some(Arc::clone(&ctl)));

    let Some(kernel) = kernel.upgrade() else {
        return;
    };
    let entry = if kernel.wait_for_scheduler(&ctl) {
        kernel.switch_in(&ctl);
        ctl.entry.lock().take()
    } else {
        None
    };
    if let Some(entry) = entry {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            kernel.checkpoint();
            entry();
        }));
        if let Err(payload) = outcome {
            if !payload.is::<ThreadExit>() {
                tracing::error!(
                    thread = %ctl.name,
                    "thread panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        }
    }

    {
        let mut run = ctl.run.lock();
        run.inner.closed = true;
        run.inner.state = ThreadState::Closed;
    }
    kernel.threads.remove(ctl.id);
    CURRENT.with(|c| c.borrow_mut().take());
}
