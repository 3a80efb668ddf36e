/*!
 * Task Lifecycle Facade
 *
 * Tasks wrap host threads; the shim adds allocation bookkeeping,
 * notification slots and the emulated API's control surface.
 */

mod control;
pub mod lifecycle;
pub mod types;

pub use lifecycle::{TaskControl, TaskHandle};
pub use types::{TaskEntry, TaskSpec, TaskState, DEFAULT_PRIORITY, DEFAULT_STACK_DEPTH};
