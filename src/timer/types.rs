/*!
 * Timer Types
 */

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Lifecycle of a software timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerState {
    Idle,
    Armed,
    /// Terminal; every later command fails
    Deleted,
}

/// Commands accepted by the timer dispatch, numbered as in the emulated API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum TimerCommand {
    ExecuteCallbackFromIsr = -2,
    ExecuteCallback = -1,
    StartDontTrace = 0,
    Start = 1,
    Reset = 2,
    Stop = 3,
    ChangePeriod = 4,
    Delete = 5,
    StartFromIsr = 6,
    ResetFromIsr = 7,
    StopFromIsr = 8,
    ChangePeriodFromIsr = 9,
}

impl TimerCommand {
    pub const fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            -2 => TimerCommand::ExecuteCallbackFromIsr,
            -1 => TimerCommand::ExecuteCallback,
            0 => TimerCommand::StartDontTrace,
            1 => TimerCommand::Start,
            2 => TimerCommand::Reset,
            3 => TimerCommand::Stop,
            4 => TimerCommand::ChangePeriod,
            5 => TimerCommand::Delete,
            6 => TimerCommand::StartFromIsr,
            7 => TimerCommand::ResetFromIsr,
            8 => TimerCommand::StopFromIsr,
            9 => TimerCommand::ChangePeriodFromIsr,
            _ => return None,
        })
    }

    #[inline]
    pub const fn raw(self) -> i32 {
        self as i32
    }

    pub const fn is_from_isr(self) -> bool {
        matches!(
            self,
            TimerCommand::ExecuteCallbackFromIsr
                | TimerCommand::StartFromIsr
                | TimerCommand::ResetFromIsr
                | TimerCommand::StopFromIsr
                | TimerCommand::ChangePeriodFromIsr
        )
    }
}

impl fmt::Display for TimerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.raw())
    }
}

/// Opaque payload attached to a timer
pub type TimerId = Arc<dyn Any + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_numbers_round_trip() {
        for raw in -2..=9 {
            let cmd = TimerCommand::from_raw(raw).unwrap();
            assert_eq!(cmd.raw(), raw);
        }
        assert_eq!(TimerCommand::from_raw(10), None);
        assert_eq!(TimerCommand::from_raw(-3), None);
    }

    #[test]
    fn test_isr_commands() {
        assert!(TimerCommand::StopFromIsr.is_from_isr());
        assert!(!TimerCommand::Stop.is_from_isr());
        assert_eq!(TimerCommand::Delete.to_string(), "Delete(5)");
    }
}
