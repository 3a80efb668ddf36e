/*!
 * Tick Clock
 * Monotonic clock quantized to ticks, with a settable offset
 */

use crate::core::types::{Tick, MAX_DELAY, NO_WAIT};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

/// When a blocking call gives up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Deadline {
    Poll,
    At(Instant),
    Forever,
}

#[derive(Debug)]
pub(super) struct TickClock {
    origin: Instant,
    tick: Duration,
    rate_hz: u32,
    offset: AtomicI64,
}

impl TickClock {
    pub fn new(rate_hz: u32) -> Self {
        let rate_hz = rate_hz.max(1);
        Self {
            origin: Instant::now(),
            tick: Duration::from_nanos(1_000_000_000 / u64::from(rate_hz)),
            rate_hz,
            offset: AtomicI64::new(0),
        }
    }

    #[inline]
    pub fn rate_hz(&self) -> u32 {
        self.rate_hz
    }

    fn raw_at(&self, at: Instant) -> i64 {
        let elapsed = at.saturating_duration_since(self.origin);
        (elapsed.as_nanos() / self.tick.as_nanos()) as i64
    }

    pub fn tick_at(&self, at: Instant) -> Tick {
        self.raw_at(at)
            .wrapping_add(self.offset.load(Ordering::Acquire)) as Tick
    }

    #[inline]
    pub fn now(&self) -> Tick {
        self.tick_at(Instant::now())
    }

    pub fn set(&self, tick: Tick) {
        let raw = self.raw_at(Instant::now());
        self.offset
            .store(i64::from(tick).wrapping_sub(raw), Ordering::Release);
    }

    pub fn increase(&self) {
        self.offset.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    pub fn duration(&self, ticks: Tick) -> Duration {
        self.tick * ticks
    }

    pub fn deadline(&self, ticks: Tick) -> Deadline {
        match ticks {
            NO_WAIT => Deadline::Poll,
            MAX_DELAY => Deadline::Forever,
            n => Deadline::At(Instant::now() + self.duration(n)),
        }
    }
}
