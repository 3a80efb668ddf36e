/*!
 * Event and Notification Engine
 *
 * Bit-group waits (any/all, clear on exit) over the host event set, used
 * by explicit event groups and by per-task notification slots.
 */

pub mod group;
pub mod notify;
pub mod wait;

pub use group::{EventGroup, EventGroupObject};
pub use notify::NotifyAction;
pub(crate) use notify::NotificationSlots;
pub use wait::{WaitOutcome, WaitRequest};
