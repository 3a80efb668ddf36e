/*!
 * Structured Tracing
 *
 * Environment variables:
 * - RUST_LOG: log filter (default: info)
 * - RTOS_SHIM_TRACE_JSON: JSON output when "1" or "true"
 */

use std::time::Instant;
use tracing::{debug, info, span, warn, Level, Span};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const TRACE_JSON_ENV: &str = "RTOS_SHIM_TRACE_JSON";

fn json_requested() -> bool {
    std::env::var(TRACE_JSON_ENV)
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false)
}

/// Install the global subscriber
///
/// Returns false when a subscriber was already installed.
pub fn init_tracing() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if json_requested() {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        info!(json = json_requested(), "tracing initialized");
    }
    installed
}

/// Span around one shim operation; logs its duration on drop
pub struct OperationSpan {
    span: Span,
    start: Instant,
    operation: &'static str,
    slow_after_ms: u128,
}

impl OperationSpan {
    pub fn new(operation: &'static str) -> Self {
        let span = span!(
            Level::DEBUG,
            "operation",
            operation,
            duration_us = tracing::field::Empty,
            result = tracing::field::Empty,
        );
        Self {
            span,
            start: Instant::now(),
            operation,
            slow_after_ms: 100,
        }
    }

    /// Warn instead of debug when the operation takes longer than `ms`
    pub fn slow_after(mut self, ms: u128) -> Self {
        self.slow_after_ms = ms;
        self
    }

    pub fn record_result(&self, success: bool) {
        self.span
            .record("result", if success { "success" } else { "error" });
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for OperationSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self.span.enter();
        self.span.record("duration_us", duration.as_micros() as u64);
        if duration.as_millis() > self.slow_after_ms {
            warn!(
                operation = self.operation,
                duration_ms = duration.as_millis() as u64,
                slow = true,
                "slow operation"
            );
        } else {
            debug!(
                operation = self.operation,
                duration_us = duration.as_micros() as u64,
                "operation completed"
            );
        }
    }
}

#[inline]
pub fn span_operation(operation: &'static str) -> OperationSpan {
    OperationSpan::new(operation)
}
