/*!
 * Task Notifications
 *
 * Each task owns a fixed array of notification slots. A slot is a host
 * event set created on first use, inside the same critical section as the
 * bit operation that needed it. The slot's bits are the notification
 * value; a non-zero value means a notification is pending.
 */

use crate::core::errors::{collapse, init_error, ShimError, ShimResult};
use crate::core::types::{remaining_ticks, report_no_yield, EventBits, Tick, MAX_DELAY};
use crate::host::{CriticalSection, EventOption, HostError, HostKernel};
use crate::shim::Shim;
use crate::task::TaskHandle;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// How `notify` updates the target value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyAction {
    /// Leave the value alone, just wake the task
    NoActionJustUnblock,
    /// OR the value in
    SetBits,
    /// Add one to the value
    Increment,
    SetOverwrite,
    /// Write only when nobody is blocked on the slot
    SetNoOverwrite,
}

impl NotifyAction {
    /// Decode the emulated API's action number
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(NotifyAction::NoActionJustUnblock),
            1 => Some(NotifyAction::SetBits),
            2 => Some(NotifyAction::Increment),
            3 => Some(NotifyAction::SetOverwrite),
            4 => Some(NotifyAction::SetNoOverwrite),
            _ => None,
        }
    }
}

/// Bit posted by `NoActionJustUnblock`; a waiter needs a non-zero value to wake
const UNBLOCK_MARKER: EventBits = 1;

/// Lazily populated event sets, one per notification index
pub(crate) struct NotificationSlots<H: HostKernel> {
    owner: String,
    slots: Box<[OnceLock<H::Event>]>,
}

impl<H: HostKernel> NotificationSlots<H> {
    pub(crate) fn new(owner: &str, entries: usize) -> Self {
        Self {
            owner: owner.to_string(),
            slots: (0..entries).map(|_| OnceLock::new()).collect(),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn check(&self, index: usize) {
        assert!(
            index < self.slots.len(),
            "notification index {index} out of range for task {} ({} slots)",
            self.owner,
            self.slots.len()
        );
    }

    pub(crate) fn get(&self, index: usize) -> Option<&H::Event> {
        self.check(index);
        self.slots[index].get()
    }

    /// Slot `index`, creating its event set; caller holds a critical section
    pub(crate) fn get_or_init(&self, host: &H, index: usize) -> ShimResult<&H::Event> {
        self.check(index);
        let slot = &self.slots[index];
        if let Some(event) = slot.get() {
            return Ok(event);
        }
        let event = host.event_init(&self.owner).map_err(init_error)?;
        if slot.set(event).is_err() {
            tracing::debug!(task = %self.owner, index, "notification slot raced");
        }
        slot.get().ok_or(ShimError::Fail)
    }

    pub(crate) fn populated(&self) -> usize {
        self.slots.iter().filter(|slot| slot.get().is_some()).count()
    }

    /// Detach every populated slot
    pub(crate) fn release(&self, host: &H) {
        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(event) = slot.get() {
                if let Err(error) = host.event_detach(event) {
                    tracing::warn!(task = %self.owner, index, %error, "slot detach failed");
                }
            }
        }
    }
}

/// Block until the slot holds a non-zero value, then replace it with
/// `consume(value)`; `None` when the budget runs out
fn consume_value<H: HostKernel>(
    host: &H,
    event: &H::Event,
    ticks: Tick,
    consume: impl Fn(EventBits) -> EventBits,
) -> Option<EventBits> {
    let start = host.tick_get();
    loop {
        {
            let _cs = CriticalSection::enter(host);
            let value = host.event_bits(event);
            if value != 0 {
                host.event_store(event, consume(value));
                return Some(value);
            }
        }

        let budget = if ticks == MAX_DELAY {
            MAX_DELAY
        } else {
            remaining_ticks(start, host.tick_get(), ticks)
        };
        if budget == 0 {
            return None;
        }
        match host.event_recv(event, EventBits::MAX, EventOption::OR, budget) {
            Ok(_) | Err(HostError::Timeout) => {}
            Err(error) => {
                tracing::warn!(%error, "notification wait failed");
                return None;
            }
        }
    }
}

// ============================================================================
// Sending side
// ============================================================================

impl<H: HostKernel> TaskHandle<H> {
    /// Update slot `index` of this task per `action` and wake it
    ///
    /// The value before the update is written to `previous`. Fails when
    /// the task was deleted, or for `SetNoOverwrite` while a task is
    /// blocked on the slot (value left untouched).
    ///
    /// # Panics
    ///
    /// When `index` is out of range.
    pub fn notify(
        &self,
        index: usize,
        value: u32,
        action: NotifyAction,
        previous: Option<&mut u32>,
    ) -> ShimResult<()> {
        let task = &self.0;
        let host = &*task.host;
        // Checked under the lock so a concurrent delete cannot strand a new slot
        let _cs = CriticalSection::enter(host);
        if task.is_deleted() {
            tracing::warn!(task = %task.name, index, "notify on a deleted task");
            return Err(ShimError::Fail);
        }
        let event = task.slots.get_or_init(host, index)?;
        let current = host.event_bits(event);
        if let Some(previous) = previous {
            *previous = current;
        }
        let signal = match action {
            NotifyAction::NoActionJustUnblock => UNBLOCK_MARKER,
            NotifyAction::SetBits => current | value,
            NotifyAction::Increment => current.wrapping_add(1),
            NotifyAction::SetOverwrite => value,
            NotifyAction::SetNoOverwrite => {
                if host.event_has_waiters(event) {
                    return Err(ShimError::Fail);
                }
                value
            }
        };
        if action != NotifyAction::NoActionJustUnblock {
            host.event_store(event, signal);
        }

        // The host rejects an empty send; a zero value has nobody to wake
        if signal == 0 {
            return Ok(());
        }
        collapse(host.event_send(event, signal), "event_send", ShimError::Fail)
    }

    pub fn notify_from_isr(
        &self,
        index: usize,
        value: u32,
        action: NotifyAction,
        previous: Option<&mut u32>,
        woken: Option<&mut bool>,
    ) -> ShimResult<()> {
        report_no_yield(woken);
        self.notify(index, value, action, previous)
    }

    /// Increment slot `index`, counting-semaphore style
    pub fn notify_give(&self, index: usize) -> ShimResult<()> {
        self.notify(index, 0, NotifyAction::Increment, None)
    }

    pub fn notify_give_from_isr(&self, index: usize, woken: Option<&mut bool>) {
        report_no_yield(woken);
        if let Err(error) = self.notify_give(index) {
            tracing::debug!(task = %self.0.name, index, %error, "give from isr dropped");
        }
    }

    /// Clear `bits` of slot `index`; returns the value before clearing
    pub fn notify_value_clear(&self, index: usize, bits: u32) -> u32 {
        let task = &self.0;
        let host = &*task.host;
        let _cs = CriticalSection::enter(host);
        match task.slots.get(index) {
            Some(event) => {
                let previous = host.event_bits(event);
                host.event_store(event, previous & !bits);
                previous
            }
            None => 0,
        }
    }

    /// Whether slot `index` has a pending notification; the value is kept
    pub fn notify_state_clear(&self, index: usize) -> bool {
        let task = &self.0;
        let host = &*task.host;
        let _cs = CriticalSection::enter(host);
        task.slots
            .get(index)
            .is_some_and(|event| host.event_bits(event) != 0)
    }
}

// ============================================================================
// Receiving side (calling task)
// ============================================================================

impl<H: HostKernel> Shim<H> {
    fn notified_task(&self, op: &'static str) -> ShimResult<TaskHandle<H>> {
        self.core.current_task().ok_or_else(|| {
            tracing::warn!(op, "notification wait outside a shim task");
            ShimError::Fail
        })
    }

    /// Wait for a notification on slot `index` of the calling task
    ///
    /// `clear_on_entry` bits are cleared before waiting, `clear_on_exit`
    /// bits once a value arrives. Returns the value seen before the exit
    /// clear; `Fail` on timeout.
    pub fn notify_wait(
        &self,
        index: usize,
        clear_on_entry: u32,
        clear_on_exit: u32,
        ticks: Tick,
    ) -> ShimResult<u32> {
        let task = self.notified_task("notify_wait")?;
        let host = &*self.core.host;
        let event = {
            let _cs = self.core.critical();
            let event = task.0.slots.get_or_init(host, index)?;
            let bits = host.event_bits(event);
            host.event_store(event, bits & !clear_on_entry);
            event
        };
        consume_value(host, event, ticks, |value| value & !clear_on_exit).ok_or(ShimError::Fail)
    }

    /// Counting-semaphore style wait on slot `index` of the calling task
    ///
    /// Returns the value before it was zeroed (`clear_count_on_exit`) or
    /// decremented; 0 on timeout.
    pub fn notify_take(&self, index: usize, clear_count_on_exit: bool, ticks: Tick) -> u32 {
        let Ok(task) = self.notified_task("notify_take") else {
            return 0;
        };
        let host = &*self.core.host;
        let event = {
            let _cs = self.core.critical();
            match task.0.slots.get_or_init(host, index) {
                Ok(event) => event,
                Err(_) => return 0,
            }
        };
        consume_value(host, event, ticks, |value| {
            if clear_count_on_exit {
                0
            } else {
                value - 1
            }
        })
        .unwrap_or(0)
    }
}
