//! Step runner: executes one named step with retry and backoff.
//!
//! The runner enforces the step's own retryable/fatal classification
//! mechanically. A panic inside a step is caught at this boundary and
//! converted into a fatal failure; it never escapes the engine.

use crate::cancellation::CancellationToken;
use crate::context::{ExecutionContext, StepResult};
use crate::events::EventSink;
use crate::retry::RetryPolicy;
use crate::step::{Step, StepOutput};
use futures::FutureExt;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// How a step's run within one pipeline concluded.
#[derive(Debug)]
pub(crate) enum StepDisposition {
    /// The step succeeded and its result was recorded.
    Completed,
    /// The step terminally failed (fatal, or retries exhausted).
    Failed {
        /// The step's final error message.
        message: String,
        /// Attempts actually made.
        attempts: u32,
    },
    /// The pipeline deadline fired during an attempt or a backoff wait.
    DeadlineExceeded,
    /// Cancellation was observed during a backoff wait.
    Cancelled {
        /// The cancellation reason.
        reason: String,
    },
}

/// Runs one step to its terminal outcome, recording a [`StepResult`] into
/// the context on every path.
///
/// `duration` in the recorded result is summed across all attempts;
/// `attempts` is the count actually made. Backoff sleeps are interrupted
/// immediately by the pipeline deadline or the caller's cancellation. When a
/// `sink` is given, each scheduled retry is announced as a `step.retrying`
/// event before the backoff wait begins.
pub(crate) async fn run_step(
    name: &str,
    step: &Arc<dyn Step>,
    ctx: &mut ExecutionContext,
    policy: &RetryPolicy,
    deadline: Instant,
    token: &CancellationToken,
    sink: Option<&dyn EventSink>,
) -> StepDisposition {
    let mut attempts: u32 = 0;
    let mut total = Duration::ZERO;

    loop {
        attempts += 1;
        let attempt_started = Instant::now();

        let outcome = {
            let attempt = std::panic::AssertUnwindSafe(step.run(ctx)).catch_unwind();
            tokio::select! {
                result = attempt => Some(result),
                () = tokio::time::sleep_until(deadline) => None,
            }
        };
        total += attempt_started.elapsed();

        let Some(outcome) = outcome else {
            // The attempt outran the pipeline deadline and was abandoned.
            let output = StepOutput::fail("pipeline deadline exceeded during step execution");
            ctx.record_result(StepResult::from_output(name, output, total, attempts));
            return StepDisposition::DeadlineExceeded;
        };

        let output = match outcome {
            Ok(output) => output,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(step = name, panic = %message, "step panicked");
                StepOutput::fail(format!("step panicked: {message}"))
            }
        };

        if output.is_success() {
            tracing::debug!(
                step = name,
                attempts,
                duration_ms = total.as_millis() as u64,
                "step completed"
            );
            ctx.record_result(StepResult::from_output(name, output, total, attempts));
            return StepDisposition::Completed;
        }

        let retryable = output.is_retryable();
        let message = output
            .error
            .clone()
            .unwrap_or_else(|| "step failed".to_string());

        if !policy.should_retry(attempts, retryable) {
            tracing::warn!(
                step = name,
                attempts,
                retryable,
                error = %message,
                "step terminally failed"
            );
            ctx.record_result(StepResult::from_output(name, output, total, attempts));
            return StepDisposition::Failed { message, attempts };
        }

        let delay = policy.delay_for(attempts);
        tracing::debug!(
            step = name,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %message,
            "retrying step after backoff"
        );
        if let Some(sink) = sink {
            sink.try_emit(
                "step.retrying",
                Some(serde_json::json!({
                    "pipeline": ctx.pipeline(),
                    "step": name,
                    "attempt": attempts,
                    "delay_ms": delay.as_millis() as u64,
                    "error": &message,
                })),
            );
        }

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = tokio::time::sleep_until(deadline) => {
                let timed_out = StepOutput::fail_retryable(format!(
                    "pipeline deadline exceeded while waiting to retry: {message}"
                ));
                ctx.record_result(StepResult::from_output(name, timed_out, total, attempts));
                return StepDisposition::DeadlineExceeded;
            }
            () = token.cancelled() => {
                let reason = token
                    .reason()
                    .unwrap_or_else(|| "cancelled by caller".to_string());
                let cancelled = StepOutput::fail_retryable(format!(
                    "cancelled while waiting to retry: {message}"
                ));
                ctx.record_result(StepResult::from_output(name, cancelled, total, attempts));
                return StepDisposition::Cancelled { reason };
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
