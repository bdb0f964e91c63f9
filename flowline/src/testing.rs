//! Mock steps for testing.
//!
//! These fixtures drive the engine in unit and integration tests without any
//! real business logic behind them.

use crate::context::ExecutionContext;
use crate::events::EventSink;
use crate::step::{Step, StepOutput};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// A step that always succeeds with optional data.
#[derive(Debug)]
pub struct SuccessStep {
    name: String,
    output: HashMap<String, serde_json::Value>,
}

impl SuccessStep {
    /// Creates a step that succeeds with no data.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: HashMap::new(),
        }
    }

    /// Creates a step that succeeds with data.
    #[must_use]
    pub fn with_output(
        name: impl Into<String>,
        output: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            name: name.into(),
            output,
        }
    }
}

#[async_trait]
impl Step for SuccessStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: &ExecutionContext) -> StepOutput {
        StepOutput::ok(self.output.clone())
    }
}

/// A step that always fails, counting its invocations.
#[derive(Debug)]
pub struct FailStep {
    name: String,
    error: String,
    retryable: bool,
    calls: Mutex<usize>,
}

impl FailStep {
    /// Creates a step that fails fatally.
    #[must_use]
    pub fn fatal(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
            retryable: false,
            calls: Mutex::new(0),
        }
    }

    /// Creates a step that fails retryably.
    #[must_use]
    pub fn retryable(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            retryable: true,
            ..Self::fatal(name, error)
        }
    }

    /// Returns the number of times the step was invoked.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl Step for FailStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: &ExecutionContext) -> StepOutput {
        *self.calls.lock() += 1;
        if self.retryable {
            StepOutput::fail_retryable(self.error.clone())
        } else {
            StepOutput::fail(self.error.clone())
        }
    }
}

/// A step that fails retryably a fixed number of times, then succeeds.
#[derive(Debug)]
pub struct FlakyStep {
    name: String,
    failures_before_success: usize,
    calls: Mutex<usize>,
}

impl FlakyStep {
    /// Creates a step that fails `failures_before_success` times first.
    #[must_use]
    pub fn new(name: impl Into<String>, failures_before_success: usize) -> Self {
        Self {
            name: name.into(),
            failures_before_success,
            calls: Mutex::new(0),
        }
    }

    /// Returns the number of times the step was invoked.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl Step for FlakyStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: &ExecutionContext) -> StepOutput {
        let call = {
            let mut calls = self.calls.lock();
            *calls += 1;
            *calls
        };

        if call <= self.failures_before_success {
            StepOutput::fail_retryable(format!("transient failure on attempt {call}"))
        } else {
            StepOutput::ok_value("recovered_after", serde_json::json!(call - 1))
        }
    }
}

/// A step that sleeps before succeeding.
#[derive(Debug)]
pub struct SlowStep {
    name: String,
    delay: Duration,
}

impl SlowStep {
    /// Creates a step that sleeps for `delay` and then succeeds.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
        }
    }
}

#[async_trait]
impl Step for SlowStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: &ExecutionContext) -> StepOutput {
        tokio::time::sleep(self.delay).await;
        StepOutput::ok_empty()
    }
}

/// A step that panics when run.
#[derive(Debug)]
pub struct PanicStep {
    name: String,
}

impl PanicStep {
    /// Creates a panicking step.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Step for PanicStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: &ExecutionContext) -> StepOutput {
        panic!("deliberate test panic in '{}'", self.name);
    }
}

/// A best-effort step: its work fails but it reports success with degraded
/// output instead of failing the pipeline.
///
/// This is the convention for non-critical steps (e.g. notifications): the
/// engine treats all steps uniformly, so softness is expressed by the step
/// itself.
#[derive(Debug)]
pub struct SoftFailStep {
    name: String,
}

impl SoftFailStep {
    /// Creates a soft-failing step.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Step for SoftFailStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: &ExecutionContext) -> StepOutput {
        StepOutput::ok_value("delivered", serde_json::json!(false))
            .add_metadata("degraded", serde_json::json!(true))
            .add_metadata("reason", serde_json::json!("downstream unavailable"))
    }
}

/// A step that writes a value into the run's global data.
#[derive(Debug)]
pub struct WriteStep {
    name: String,
    key: String,
    value: serde_json::Value,
}

impl WriteStep {
    /// Creates a step that writes `key = value` into global data.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            value,
        }
    }
}

#[async_trait]
impl Step for WriteStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &ExecutionContext) -> StepOutput {
        ctx.global_data().set(self.key.clone(), self.value.clone());
        StepOutput::ok_empty()
    }
}

/// An event sink that records every event name it receives, in order.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<String>>,
}

impl RecordingEventSink {
    /// Creates an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the event names received so far.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Returns how many events of `event_type` were received.
    #[must_use]
    pub fn count(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.as_str() == event_type)
            .count()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn emit(&self, event_type: &str, _data: Option<serde_json::Value>) {
        self.events.lock().push(event_type.to_string());
    }

    fn try_emit(&self, event_type: &str, _data: Option<serde_json::Value>) {
        self.events.lock().push(event_type.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineDefinition;

    fn context() -> ExecutionContext {
        let definition = PipelineDefinition::new("test").step("s");
        ExecutionContext::new(&definition, HashMap::new())
    }

    #[tokio::test]
    async fn test_flaky_step_sequence() {
        let step = FlakyStep::new("flaky", 2);
        let ctx = context();

        assert!(!step.run(&ctx).await.is_success());
        assert!(!step.run(&ctx).await.is_success());
        assert!(step.run(&ctx).await.is_success());
        assert_eq!(step.call_count(), 3);
    }

    #[tokio::test]
    async fn test_fail_step_classification() {
        let ctx = context();

        let fatal = FailStep::fatal("f", "no");
        assert!(!fatal.run(&ctx).await.is_retryable());

        let transient = FailStep::retryable("t", "later");
        assert!(transient.run(&ctx).await.is_retryable());
    }

    #[tokio::test]
    async fn test_soft_fail_reports_success() {
        let step = SoftFailStep::new("notify");
        let output = step.run(&context()).await;

        assert!(output.is_success());
        assert_eq!(output.get("delivered"), Some(&serde_json::json!(false)));
        assert_eq!(output.metadata.get("degraded"), Some(&serde_json::json!(true)));
    }

    #[tokio::test]
    async fn test_write_step_mutates_global_data() {
        let step = WriteStep::new("w", "checked", serde_json::json!(true));
        let ctx = context();
        let output = step.run(&ctx).await;

        assert!(output.is_success());
        assert_eq!(ctx.global_data().get("checked"), Some(serde_json::json!(true)));
    }
}
