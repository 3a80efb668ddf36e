/*!
 * RTOS Shim Library
 *
 * Task, queue, semaphore, event-group, notification and timer API of a
 * classic embedded RTOS, forwarded to a host kernel behind `HostKernel`.
 * `SimKernel` is a std-thread host for running the API off-target.
 */

pub mod core;
pub mod event;
pub mod host;
pub mod monitoring;
pub mod scheduler;
mod shim;
pub mod sync;
pub mod task;
pub mod timer;

// Re-exports
pub use crate::core::{
    base_type_of, Affinity, AllocationMode, BaseType, ConfigError, EventBits, Priority,
    RegistryStats, ReloadMode, ShimConfig, ShimError, ShimResult, Tick, MAX_DELAY, NO_WAIT,
    PD_FAIL, PD_PASS,
};
pub use event::{EventGroup, NotifyAction, WaitOutcome, WaitRequest};
pub use host::{HostKernel, SimConfig, SimKernel};
pub use monitoring::init_tracing;
pub use scheduler::{SchedulerHooks, SchedulerState};
pub use shim::Shim;
pub use sync::{CopyPosition, Queue, QueueType, SyncKind};
pub use task::{TaskHandle, TaskSpec, TaskState};
pub use timer::{Timer, TimerCommand, TimerId, TimerState};
