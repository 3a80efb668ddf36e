/*!
 * Host Kernel Boundary
 *
 * The trait the shim forwards every operation to, the values crossing it,
 * and a std-thread reference implementation.
 */

pub mod critical;
pub mod sim;
pub mod traits;
pub mod types;

pub use critical::CriticalSection;
pub use sim::{HeapStats, SimConfig, SimKernel, SimThreadId};
pub use traits::HostKernel;
pub use types::{
    EventCaps, EventOption, HeapBlock, HostError, HostHook, HostResult, HostTimerCallback,
    IrqLevel, Region, Rejected, ThreadEntry, ThreadParams, ThreadState, TimerControl, TimerInfo,
};
