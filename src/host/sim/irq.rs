/*!
 * Logical Interrupt Lock
 *
 * One owner at a time, reentrant for the owner. Masking interrupts on a
 * single core serializes every kernel entry; this lock gives OS threads the
 * same guarantee.
 */

use crate::host::types::IrqLevel;
use parking_lot::{Condvar, Mutex};
use std::thread::{self, ThreadId};

#[derive(Debug, Default)]
struct IrqState {
    owner: Option<ThreadId>,
    depth: usize,
}

#[derive(Debug, Default)]
pub(super) struct IrqLock {
    state: Mutex<IrqState>,
    free: Condvar,
}

impl IrqLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock (or nest deeper), returning the depth to restore
    pub fn acquire(&self) -> IrqLevel {
        let me = thread::current().id();
        let mut st = self.state.lock();
        while st.owner.is_some_and(|owner| owner != me) {
            self.free.wait(&mut st);
        }
        st.owner = Some(me);
        let level = IrqLevel(st.depth);
        st.depth += 1;
        level
    }

    /// Restore the depth saved by the matching `acquire`
    pub fn release(&self, level: IrqLevel) {
        let mut st = self.state.lock();
        if st.owner != Some(thread::current().id()) {
            tracing::error!(depth = level.0, "interrupt level restored by non-owner");
            return;
        }
        st.depth = level.0;
        if st.depth == 0 {
            st.owner = None;
            drop(st);
            self.free.notify_one();
        }
    }

    /// Drop one nesting level (scheduler lock has no saved level)
    pub fn release_one(&self) {
        let depth = self.state.lock().depth;
        self.release(IrqLevel(depth.saturating_sub(1)));
    }

    /// Fully release before parking; returns the depth for `restore`
    pub fn release_all(&self) -> usize {
        let mut st = self.state.lock();
        if st.owner != Some(thread::current().id()) {
            return 0;
        }
        let depth = st.depth;
        st.depth = 0;
        st.owner = None;
        drop(st);
        self.free.notify_one();
        depth
    }

    /// Re-take the lock at the depth returned by `release_all`
    pub fn restore(&self, depth: usize) {
        if depth == 0 {
            return;
        }
        let me = thread::current().id();
        let mut st = self.state.lock();
        while st.owner.is_some_and(|owner| owner != me) {
            self.free.wait(&mut st);
        }
        st.owner = Some(me);
        st.depth = depth;
    }

    pub fn guard(&self) -> IrqGuard<'_> {
        let level = self.acquire();
        IrqGuard { lock: self, level }
    }

    #[cfg(test)]
    pub fn is_held_by_current(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }
}

pub(super) struct IrqGuard<'a> {
    lock: &'a IrqLock,
    level: IrqLevel,
}

impl Drop for IrqGuard<'_> {
    fn drop(&mut self) {
        self.lock.release(self.level);
    }
}
