/*!
 * Core Types
 * Common types used across the shim: ticks, priorities, result codes
 */

use serde::{Deserialize, Serialize};

/// Time measured in host kernel ticks
pub type Tick = u32;

/// Block indefinitely
pub const MAX_DELAY: Tick = Tick::MAX;

/// Poll once and return
pub const NO_WAIT: Tick = 0;

/// Task priority (0 = idle)
pub type Priority = u32;

/// Bit state carried by event groups and notification slots
pub type EventBits = u32;

/// Signed status word of the emulated API
pub type BaseType = i32;

pub const PD_PASS: BaseType = 1;
pub const PD_FAIL: BaseType = 0;
pub const ERR_QUEUE_FULL: BaseType = 0;
pub const ERR_QUEUE_EMPTY: BaseType = 0;
pub const ERR_COULD_NOT_ALLOCATE_REQUIRED_MEMORY: BaseType = -1;

/// How an object's control block (and stack or pool) was provided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMode {
    /// Caller-owned storage, never released by the shim
    Static,
    /// Reserved from the host heap, released on delete
    Dynamic,
}

impl AllocationMode {
    #[inline]
    pub const fn is_dynamic(self) -> bool {
        matches!(self, AllocationMode::Dynamic)
    }
}

/// Timer reload behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadMode {
    OneShot,
    Periodic,
}

impl ReloadMode {
    /// Map the emulated API's `uxAutoReload` flag
    #[inline]
    pub const fn from_auto_reload(auto_reload: bool) -> Self {
        if auto_reload {
            ReloadMode::Periodic
        } else {
            ReloadMode::OneShot
        }
    }

    #[inline]
    pub const fn is_periodic(self) -> bool {
        matches!(self, ReloadMode::Periodic)
    }
}

/// CPU affinity requested for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affinity {
    /// Let the host place the task
    NoAffinity,
    /// Pin to one core
    Core(usize),
}

impl Default for Affinity {
    fn default() -> Self {
        Affinity::NoAffinity
    }
}

/// ISR entry points never request a context switch on exit
#[inline]
pub(crate) fn report_no_yield(woken: Option<&mut bool>) {
    if let Some(flag) = woken {
        *flag = false;
    }
}

/// Ticks left of `budget` that started at `start`, tolerant of counter wrap
#[inline]
pub(crate) fn remaining_ticks(start: Tick, now: Tick, budget: Tick) -> Tick {
    let elapsed = now.wrapping_sub(start);
    budget.saturating_sub(elapsed)
}
