/*!
 * Timer Module
 * Software timers and the command dispatch of the emulated API
 */

pub mod facade;
pub mod types;

pub use facade::{Timer, TimerCallback, TimerObject};
pub use types::{TimerCommand, TimerId, TimerState};
