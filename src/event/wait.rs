/*!
 * Bit-Group Wait Engine
 *
 * Shared by event groups and notification slots. Waits map onto the host
 * event primitive directly when it can wait for all bits; otherwise they
 * poll: block until any missing bit arrives, then re-check the whole mask
 * under a critical section, with a shrinking tick budget.
 */

use crate::core::types::{remaining_ticks, EventBits, Tick, MAX_DELAY};
use crate::host::{CriticalSection, EventOption, HostError, HostKernel};

/// Parameters of a bit wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitRequest {
    pub mask: EventBits,
    pub clear_on_exit: bool,
    pub wait_for_all: bool,
    pub ticks: Tick,
}

/// How a bit wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Bits as they were when the condition held, before any clear
    Satisfied(EventBits),
    /// Bits at the moment the budget ran out
    TimedOut(EventBits),
}

impl WaitOutcome {
    #[inline]
    pub fn bits(self) -> EventBits {
        match self {
            WaitOutcome::Satisfied(bits) | WaitOutcome::TimedOut(bits) => bits,
        }
    }

    #[inline]
    pub fn is_satisfied(self) -> bool {
        matches!(self, WaitOutcome::Satisfied(_))
    }
}

#[inline]
pub(crate) fn read_bits<H: HostKernel>(host: &H, event: &H::Event) -> EventBits {
    let _cs = CriticalSection::enter(host);
    host.event_bits(event)
}

/// OR `mask` in and wake waiters; returns the bits right after the set
pub(crate) fn set_bits<H: HostKernel>(host: &H, event: &H::Event, mask: EventBits) -> EventBits {
    let _cs = CriticalSection::enter(host);
    if mask != 0 {
        if let Err(error) = host.event_send(event, mask) {
            tracing::warn!(%error, mask, "event send rejected");
        }
    }
    host.event_bits(event)
}

/// Clear `mask`; returns the bits after the clear
pub(crate) fn clear_bits<H: HostKernel>(host: &H, event: &H::Event, mask: EventBits) -> EventBits {
    let _cs = CriticalSection::enter(host);
    let bits = host.event_bits(event) & !mask;
    host.event_store(event, bits);
    bits
}

pub(crate) fn wait_bits<H: HostKernel>(
    host: &H,
    event: &H::Event,
    request: WaitRequest,
) -> WaitOutcome {
    if request.wait_for_all && !host.event_caps().native_all_bits {
        return wait_all_polling(host, event, request);
    }

    let mut option = if request.wait_for_all {
        EventOption::AND
    } else {
        EventOption::OR
    };
    if request.clear_on_exit {
        option |= EventOption::CLEAR;
    }
    match host.event_recv(event, request.mask, option, request.ticks) {
        Ok(bits) => WaitOutcome::Satisfied(bits),
        Err(HostError::Timeout) => WaitOutcome::TimedOut(read_bits(host, event)),
        Err(error) => {
            tracing::warn!(%error, mask = request.mask, "event receive failed");
            WaitOutcome::TimedOut(read_bits(host, event))
        }
    }
}

fn wait_all_polling<H: HostKernel>(
    host: &H,
    event: &H::Event,
    request: WaitRequest,
) -> WaitOutcome {
    let mask = request.mask;
    let start = host.tick_get();

    loop {
        let missing = {
            let _cs = CriticalSection::enter(host);
            let bits = host.event_bits(event);
            if bits & mask == mask {
                if request.clear_on_exit {
                    host.event_store(event, bits & !mask);
                }
                return WaitOutcome::Satisfied(bits);
            }
            mask & !bits
        };

        let budget = if request.ticks == MAX_DELAY {
            MAX_DELAY
        } else {
            remaining_ticks(start, host.tick_get(), request.ticks)
        };
        if budget == 0 {
            return WaitOutcome::TimedOut(read_bits(host, event));
        }

        match host.event_recv(event, missing, EventOption::OR, budget) {
            Ok(_) | Err(HostError::Timeout) => {}
            Err(error) => {
                tracing::warn!(%error, mask, "event receive failed while polling");
                return WaitOutcome::TimedOut(read_bits(host, event));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{SimConfig, SimKernel};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn request(mask: EventBits, clear: bool, all: bool, ticks: Tick) -> WaitRequest {
        WaitRequest {
            mask,
            clear_on_exit: clear,
            wait_for_all: all,
            ticks,
        }
    }

    fn both_paths() -> [Arc<SimKernel>; 2] {
        [
            SimKernel::new(SimConfig::default()),
            SimKernel::new(SimConfig::without_all_bits_wait()),
        ]
    }

    #[test]
    fn test_all_bits_clear_returns_pre_clear_value() {
        for kernel in both_paths() {
            let ev = kernel.event_init("e").unwrap();
            set_bits(&*kernel, &ev, 0b110);
            let out = wait_bits(&*kernel, &ev, request(0b100, true, true, 0));
            assert_eq!(out, WaitOutcome::Satisfied(0b110));
            assert_eq!(read_bits(&*kernel, &ev), 0b010);
        }
    }

    #[test]
    fn test_timeout_reports_current_bits() {
        for kernel in both_paths() {
            let ev = kernel.event_init("e").unwrap();
            set_bits(&*kernel, &ev, 0b001);
            let out = wait_bits(&*kernel, &ev, request(0b011, false, true, 10));
            assert_eq!(out, WaitOutcome::TimedOut(0b001));
        }
    }

    #[test]
    fn test_polling_collects_bits_from_two_setters() {
        let kernel = SimKernel::new(SimConfig::without_all_bits_wait());
        let ev = Arc::new(kernel.event_init("e").unwrap());

        let setter = {
            let kernel = Arc::clone(&kernel);
            let ev = Arc::clone(&ev);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                set_bits(&*kernel, &ev, 0b01);
                thread::sleep(Duration::from_millis(10));
                set_bits(&*kernel, &ev, 0b10);
            })
        };

        let out = wait_bits(&*kernel, &ev, request(0b11, true, true, MAX_DELAY));
        setter.join().unwrap();
        assert_eq!(out, WaitOutcome::Satisfied(0b11));
        assert_eq!(read_bits(&*kernel, &ev), 0);
    }

    #[test]
    fn test_clear_bits_returns_remaining() {
        let kernel = SimKernel::new(SimConfig::default());
        let ev = kernel.event_init("e").unwrap();
        set_bits(&*kernel, &ev, 0b1111);
        assert_eq!(clear_bits(&*kernel, &ev, 0b0101), 0b1010);
    }
}
