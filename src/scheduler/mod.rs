/*!
 * Scheduler Module
 * Bootstrap of the host scheduler and the emulated run state
 */

mod bootstrap;
pub mod types;

pub use types::{HookFn, SchedulerHooks, SchedulerState};
