/*!
 * Host Boundary Types
 * Values exchanged with the host kernel: result codes, flags, memory regions
 */

use crate::core::types::{Priority, ReloadMode, Tick};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result codes of the host kernel
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostError {
    #[error("generic error")]
    Error,
    #[error("timed out")]
    Timeout,
    #[error("resource full")]
    Full,
    #[error("resource empty")]
    Empty,
    #[error("no memory")]
    NoMemory,
    #[error("not supported by host")]
    NoSys,
    #[error("busy")]
    Busy,
    #[error("invalid argument")]
    Invalid,
}

/// Result type for host calls
pub type HostResult<T> = Result<T, HostError>;

/// Host call that consumed a resource and failed, handing the resource back
#[derive(Debug)]
pub struct Rejected<R> {
    pub error: HostError,
    pub resource: R,
}

impl<R> Rejected<R> {
    pub fn new(error: HostError, resource: R) -> Self {
        Self { error, resource }
    }
}

bitflags! {
    /// Receive options of the host event primitive
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventOption: u8 {
        /// All requested bits must be set
        const AND = 0x01;
        /// Any requested bit suffices
        const OR = 0x02;
        /// Clear the requested bits on success
        const CLEAR = 0x04;
    }
}

/// What the host event primitive can wait for natively
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventCaps {
    /// `EventOption::AND` is honored by `event_recv`
    pub native_all_bits: bool,
}

/// Saved interrupt state returned by `interrupt_disable`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct IrqLevel(pub usize);

/// Host view of a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadState {
    Init,
    Ready,
    Running,
    Blocked,
    Suspended,
    Closed,
}

/// Timer reconfiguration commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerControl {
    SetPeriod(Tick),
    SetMode(ReloadMode),
}

/// Snapshot of a host timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerInfo {
    pub period: Tick,
    pub mode: ReloadMode,
    pub active: bool,
    /// Absolute tick of the next expiry while active
    pub deadline: Option<Tick>,
}

/// Thread body handed to the host
pub type ThreadEntry = Box<dyn FnOnce() + Send + 'static>;

/// Host timer expiry callback
pub type HostTimerCallback = Box<dyn Fn() + Send + Sync + 'static>;

/// Idle / scheduler hook installed into the host
pub type HostHook = std::sync::Arc<dyn Fn() + Send + Sync + 'static>;

/// Everything the host needs to initialize a thread
pub struct ThreadParams {
    pub name: String,
    pub entry: ThreadEntry,
    pub stack: Region,
    pub priority: Priority,
    pub time_slice: Tick,
}

impl fmt::Debug for ThreadParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadParams")
            .field("name", &self.name)
            .field("stack", &self.stack.len())
            .field("priority", &self.priority)
            .field("time_slice", &self.time_slice)
            .finish()
    }
}

// ============================================================================
// Memory
// ============================================================================

/// Block handed out by the host heap
///
/// Must be returned through `HostKernel::heap_free`; the id lets the host
/// account for it exactly once.
#[derive(Debug)]
pub struct HeapBlock {
    id: u64,
    mem: Box<[u8]>,
}

impl HeapBlock {
    /// Zeroed block; for host implementations
    pub fn new(id: u64, size: usize) -> Self {
        Self {
            id,
            mem: vec![0u8; size].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mem.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mem.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.mem
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mem
    }
}

/// Backing memory for stacks and message pools
#[derive(Debug)]
pub enum Region {
    /// Reserved from the host heap; released by the shim
    Heap(HeapBlock),
    /// Caller-supplied storage; never released by the shim
    Caller(&'static mut [u8]),
}

impl Region {
    #[inline]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            Region::Heap(block) => block.as_slice(),
            Region::Caller(buf) => buf,
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            Region::Heap(block) => block.as_mut_slice(),
            Region::Caller(buf) => buf,
        }
    }

    /// Start address, reported as the stack base for diagnostics
    #[inline]
    pub fn base_addr(&self) -> usize {
        self.as_slice().as_ptr() as usize
    }

    #[inline]
    pub fn is_heap(&self) -> bool {
        matches!(self, Region::Heap(_))
    }
}
