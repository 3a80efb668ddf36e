/*!
 * Sim Event Set
 * 32-bit flag set with AND/OR waits and clear-on-receive
 */

use super::wait::WaitCell;
use super::SimKernel;
use crate::core::types::{EventBits, Tick};
use crate::host::types::{EventOption, HostError, HostResult};

#[derive(Debug)]
pub struct SimEvent {
    name: String,
    cell: WaitCell<EventBits>,
}

impl SimEvent {
    pub(super) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cell: WaitCell::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl SimKernel {
    pub(super) fn event_send_impl(&self, event: &SimEvent, bits: EventBits) -> HostResult<()> {
        if bits == 0 {
            return Err(HostError::Invalid);
        }
        self.mutate(&event.cell, |st| {
            if st.detached {
                return Err(HostError::Error);
            }
            st.inner |= bits;
            Ok(())
        })
    }

    pub(super) fn event_recv_impl(
        &self,
        event: &SimEvent,
        set: EventBits,
        option: EventOption,
        ticks: Tick,
    ) -> HostResult<EventBits> {
        let all = option.contains(EventOption::AND);
        if set == 0 || all == option.contains(EventOption::OR) {
            return Err(HostError::Invalid);
        }
        if all && !self.config.native_all_bits_wait {
            return Err(HostError::NoSys);
        }
        let clear = option.contains(EventOption::CLEAR);

        self.block_on(&event.cell, ticks, |bits| {
            let satisfied = if all {
                *bits & set == set
            } else {
                *bits & set != 0
            };
            if !satisfied {
                return None;
            }
            let seen = *bits;
            if clear {
                *bits &= !set;
            }
            Some(Ok(seen))
        })
    }

    pub(super) fn event_bits_impl(&self, event: &SimEvent) -> EventBits {
        event.cell.lock().inner
    }

    pub(super) fn event_store_impl(&self, event: &SimEvent, bits: EventBits) {
        event.cell.lock().inner = bits;
    }

    pub(super) fn event_has_waiters_impl(&self, event: &SimEvent) -> bool {
        event.cell.lock().waiters > 0
    }

    pub(super) fn event_detach_impl(&self, event: &SimEvent) -> HostResult<()> {
        self.mutate(&event.cell, |st| st.detached = true);
        Ok(())
    }
}
