/*!
 * Event Groups
 * Explicit bit groups over one host event set
 */

use super::wait::{self, WaitOutcome, WaitRequest};
use crate::core::control::ControlBlock;
use crate::core::errors::{collapse, init_error, ShimError, ShimResult};
use crate::core::registry::{ObjectKey, ObjectTag};
use crate::core::types::{report_no_yield, AllocationMode, EventBits, Tick};
use crate::host::HostKernel;
use crate::shim::{Shim, ShimCore};
use parking_lot::Mutex;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub struct EventGroupObject<H: HostKernel> {
    core: Arc<ShimCore<H>>,
    name: String,
    mode: AllocationMode,
    event: H::Event,
    control: Mutex<Option<ControlBlock>>,
    number: AtomicU32,
}

impl<H: HostKernel> Drop for EventGroupObject<H> {
    fn drop(&mut self) {
        self.core.registry.forget(ObjectKey::of(self));
    }
}

/// Handle to an event group
pub struct EventGroup<H: HostKernel>(Arc<EventGroupObject<H>>);

impl<H: HostKernel> Clone for EventGroup<H> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<H: HostKernel> PartialEq for EventGroup<H> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<H: HostKernel> Eq for EventGroup<H> {}

impl<H: HostKernel> fmt::Debug for EventGroup<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventGroup")
            .field("name", &self.0.name)
            .field("mode", &self.0.mode)
            .field("bits", &self.get_bits())
            .finish()
    }
}

impl<H: HostKernel> Shim<H> {
    fn create_event_group(&self, mode: AllocationMode) -> ShimResult<EventGroup<H>> {
        let core = &self.core;
        let host = &*core.host;
        let name = core.registry.next_name(ObjectTag::Event);

        let control = ControlBlock::reserve(host, mode, mem::size_of::<EventGroupObject<H>>())?;
        let event = match host.event_init(&name) {
            Ok(event) => event,
            Err(e) => {
                control.release(host);
                return Err(init_error(e));
            }
        };

        let object = Arc::new(EventGroupObject {
            core: Arc::clone(core),
            name,
            mode,
            event,
            control: Mutex::new(Some(control)),
            number: AtomicU32::new(0),
        });
        core.registry.register(ObjectKey::of(&*object), ObjectTag::Event);
        tracing::debug!(name = %object.name, ?mode, "event group created");
        Ok(EventGroup(object))
    }

    pub fn event_group_create(&self) -> ShimResult<EventGroup<H>> {
        self.create_event_group(AllocationMode::Dynamic)
    }

    /// Event group whose control block the caller provides
    pub fn event_group_create_static(&self) -> ShimResult<EventGroup<H>> {
        self.create_event_group(AllocationMode::Static)
    }
}

impl<H: HostKernel> EventGroup<H> {
    #[inline]
    fn host(&self) -> &H {
        &self.0.core.host
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[inline]
    pub fn allocation_mode(&self) -> AllocationMode {
        self.0.mode
    }

    /// Block until `mask` is satisfied (any or all bits), up to `ticks`
    ///
    /// Returns the bits seen when the wait ended: before the clear when it
    /// succeeded, the current bits when it timed out.
    ///
    /// # Panics
    ///
    /// When `mask` is zero.
    pub fn wait_bits(
        &self,
        mask: EventBits,
        clear_on_exit: bool,
        wait_for_all: bool,
        ticks: Tick,
    ) -> EventBits {
        self.wait(WaitRequest {
            mask,
            clear_on_exit,
            wait_for_all,
            ticks,
        })
        .bits()
    }

    /// Same as [`wait_bits`](Self::wait_bits), reporting whether the
    /// condition held
    pub fn wait(&self, request: WaitRequest) -> WaitOutcome {
        assert!(request.mask != 0, "event group {} waited on an empty mask", self.0.name);
        wait::wait_bits(self.host(), &self.0.event, request)
    }

    #[inline]
    pub fn set_bits(&self, mask: EventBits) -> EventBits {
        wait::set_bits(self.host(), &self.0.event, mask)
    }

    /// Clear `mask`, returning the bits left set
    #[inline]
    pub fn clear_bits(&self, mask: EventBits) -> EventBits {
        wait::clear_bits(self.host(), &self.0.event, mask)
    }

    #[inline]
    pub fn get_bits(&self) -> EventBits {
        wait::read_bits(self.host(), &self.0.event)
    }

    #[inline]
    pub fn get_bits_from_isr(&self) -> EventBits {
        self.get_bits()
    }

    pub fn set_bits_from_isr(&self, mask: EventBits, woken: Option<&mut bool>) -> ShimResult<()> {
        report_no_yield(woken);
        collapse(
            self.host().event_send(&self.0.event, mask),
            "event_send",
            ShimError::Fail,
        )
    }

    pub fn clear_bits_from_isr(&self, mask: EventBits) -> ShimResult<()> {
        self.clear_bits(mask);
        Ok(())
    }

    /// Set `to_set`, then wait for all of `wait_for` and clear them
    ///
    /// The two steps are separate: a concurrent setter may run in between.
    pub fn sync(&self, to_set: EventBits, wait_for: EventBits, ticks: Tick) -> EventBits {
        if to_set != 0 {
            self.set_bits(to_set);
        }
        self.wait_bits(wait_for, true, true, ticks)
    }

    pub fn event_group_number(&self) -> u32 {
        self.0.number.load(Ordering::Relaxed)
    }

    pub fn set_event_group_number(&self, number: u32) {
        self.0.number.store(number, Ordering::Relaxed);
    }

    /// # Panics
    ///
    /// When the group was already deleted through another handle.
    pub fn delete(self) {
        let object = &self.0;
        let host = &*object.core.host;
        object.core.registry.retire(ObjectKey::of(&**object), ObjectTag::Event);

        if let Err(error) = host.event_detach(&object.event) {
            tracing::warn!(name = %object.name, %error, "host detach failed");
        }
        if let Some(control) = object.control.lock().take() {
            control.release(host);
        }
        tracing::debug!(name = %object.name, mode = ?object.mode, "event group deleted");
    }
}
