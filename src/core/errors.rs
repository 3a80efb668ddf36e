/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 */

use super::types::{
    BaseType, ERR_COULD_NOT_ALLOCATE_REQUIRED_MEMORY, ERR_QUEUE_EMPTY, ERR_QUEUE_FULL, PD_FAIL,
};
use crate::host::HostError;
use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

/// Errors returned by the shimmed API
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ShimError {
    #[error("Could not allocate required memory")]
    #[diagnostic(
        code(shim::allocation),
        help("The host heap is exhausted. Use a static constructor or free objects first.")
    )]
    Allocation,

    #[error("Could not allocate task stack")]
    #[diagnostic(
        code(shim::stack_allocation),
        help("Reduce the requested stack depth or supply a static stack buffer.")
    )]
    StackAllocation,

    #[error("Queue is full")]
    #[diagnostic(code(shim::full), help("Retry with a timeout or drain the queue first."))]
    Full,

    #[error("Queue is empty")]
    #[diagnostic(code(shim::empty), help("Retry with a timeout or wait for a sender."))]
    Empty,

    #[error("Operation not supported: {0}")]
    #[diagnostic(
        code(shim::not_supported),
        help("The host kernel has no equivalent for this operation on this object kind.")
    )]
    NotSupported(&'static str),

    #[error("Operation failed")]
    #[diagnostic(code(shim::fail), help("The host kernel rejected the request or it timed out."))]
    Fail,
}

impl ShimError {
    /// Numeric status code of the emulated API
    pub const fn to_base_type(self) -> BaseType {
        match self {
            ShimError::Allocation | ShimError::StackAllocation => {
                ERR_COULD_NOT_ALLOCATE_REQUIRED_MEMORY
            }
            ShimError::Full => ERR_QUEUE_FULL,
            ShimError::Empty => ERR_QUEUE_EMPTY,
            ShimError::NotSupported(_) | ShimError::Fail => PD_FAIL,
        }
    }
}

/// Result type for shimmed operations
pub type ShimResult<T> = Result<T, ShimError>;

/// Collapse a host result into the shim taxonomy, logging the host code
#[inline]
pub(crate) fn collapse<T>(
    result: Result<T, HostError>,
    op: &'static str,
    err: ShimError,
) -> ShimResult<T> {
    result.map_err(|host| {
        if !matches!(host, HostError::Timeout | HostError::Full | HostError::Empty) {
            tracing::warn!(op, error = %host, "host rejected request");
        }
        err
    })
}

/// Host object construction failure: heap exhaustion or a plain rejection
#[inline]
pub(crate) fn init_error(host: HostError) -> ShimError {
    match host {
        HostError::NoMemory => ShimError::Allocation,
        other => {
            tracing::warn!(error = %other, "host object init failed");
            ShimError::Fail
        }
    }
}

/// Status code of any shim result
#[inline]
pub fn base_type_of<T>(result: &ShimResult<T>) -> BaseType {
    match result {
        Ok(_) => super::types::PD_PASS,
        Err(e) => e.to_base_type(),
    }
}
