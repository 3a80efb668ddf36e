/*!
 * Blocking Waits
 *
 * Every sim object is a `WaitCell`: state behind a mutex plus a condvar.
 * Lock order is interrupt lock, then object mutex. A blocked caller
 * gives up the interrupt lock while parked and takes it back (after
 * dropping the object mutex) on wake.
 */

use super::clock::Deadline;
use super::SimKernel;
use crate::core::types::Tick;
use crate::host::types::{HostError, HostResult, ThreadState};
use parking_lot::{Condvar, Mutex, MutexGuard};

#[derive(Debug)]
pub(super) struct Waitable<S> {
    pub inner: S,
    pub waiters: usize,
    pub detached: bool,
}

#[derive(Debug)]
pub(super) struct WaitCell<S> {
    state: Mutex<Waitable<S>>,
    cv: Condvar,
}

impl<S> WaitCell<S> {
    pub fn new(inner: S) -> Self {
        Self {
            state: Mutex::new(Waitable {
                inner,
                waiters: 0,
                detached: false,
            }),
            cv: Condvar::new(),
        }
    }

    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, Waitable<S>> {
        self.state.lock()
    }

    #[inline]
    pub fn notify_all(&self) {
        self.cv.notify_all();
    }

    #[inline]
    pub fn condvar(&self) -> &Condvar {
        &self.cv
    }
}

impl SimKernel {
    /// Run `f` on the object state with interrupts masked; wakes waiters after
    pub(super) fn mutate<S, R>(
        &self,
        cell: &WaitCell<S>,
        f: impl FnOnce(&mut Waitable<S>) -> R,
    ) -> R {
        let _irq = self.irq.guard();
        let mut st = cell.lock();
        let result = f(&mut st);
        cell.notify_all();
        result
    }

    /// Retry `attempt` until it yields a result or the timeout expires
    ///
    /// `attempt` returns `None` to keep waiting. Detaching the object wakes
    /// and fails every waiter.
    pub(super) fn block_on<S, T>(
        &self,
        cell: &WaitCell<S>,
        ticks: Tick,
        mut attempt: impl FnMut(&mut S) -> Option<HostResult<T>>,
    ) -> HostResult<T> {
        self.checkpoint();
        let deadline = self.clock.deadline(ticks);
        let _irq = self.irq.guard();
        let mut st = cell.lock();

        loop {
            if st.detached {
                return Err(HostError::Error);
            }
            if let Some(result) = attempt(&mut st.inner) {
                return result;
            }
            let until = match deadline {
                Deadline::Poll => return Err(HostError::Timeout),
                Deadline::At(at) => Some(at),
                Deadline::Forever => None,
            };

            st.waiters += 1;
            let saved = self.irq.release_all();
            self.threads.mark_current(ThreadState::Blocked);
            let timed_out = match until {
                Some(at) => cell.cv.wait_until(&mut st, at).timed_out(),
                None => {
                    cell.cv.wait(&mut st);
                    false
                }
            };
            st.waiters -= 1;
            MutexGuard::unlocked(&mut st, || self.irq.restore(saved));
            self.threads.mark_current(ThreadState::Running);

            if timed_out {
                if st.detached {
                    return Err(HostError::Error);
                }
                return attempt(&mut st.inner).unwrap_or(Err(HostError::Timeout));
            }
        }
    }
}
