//! Execution state for a single pipeline run.
//!
//! An [`ExecutionContext`] is created by the engine at submission time, owned
//! by exactly one run, mutated only by the step runner driving that run, and
//! handed back to the caller read-only once a terminal state is reached.

use crate::pipeline::PipelineDefinition;
use crate::step::StepOutput;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// The lifecycle status of a pipeline run.
///
/// `Pending -> Running -> exactly one terminal state`. Terminal states are
/// final; the context refuses transitions out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Run created, no step started yet.
    Pending,
    /// Steps are executing.
    Running,
    /// All steps completed successfully.
    Succeeded,
    /// A step exhausted its retries or failed fatally.
    Failed,
    /// The pipeline deadline elapsed.
    TimedOut,
    /// The caller's cancellation signal was observed.
    Cancelled,
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl PipelineStatus {
    /// Returns true if the status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }

    /// Returns true if the run completed successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// The recorded outcome of one step within one run.
///
/// Created once per step per run; immutable after the step finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// The step name.
    pub step_name: String,
    /// Whether the step ultimately succeeded.
    pub success: bool,
    /// Output data from the final attempt.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub output: HashMap<String, serde_json::Value>,
    /// Error message from the final attempt, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Total duration summed across all attempts.
    pub duration: Duration,
    /// Whether the final failure was classified retryable.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
    /// Attempts actually made.
    pub attempts: u32,
    /// Metadata from the final attempt.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StepResult {
    /// Builds a result from a step's final output.
    #[must_use]
    pub fn from_output(
        step_name: impl Into<String>,
        output: StepOutput,
        duration: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            success: output.success,
            output: output.output,
            error: output.error,
            duration,
            retryable: output.retryable,
            attempts,
            metadata: output.metadata,
        }
    }
}

/// A thread-safe key/value bag shared across the steps of one run.
///
/// Unlike step results, which are write-once, global data is freely
/// overwritten by later steps.
#[derive(Debug, Default)]
pub struct DataBag {
    data: RwLock<HashMap<String, serde_json::Value>>,
}

impl DataBag {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bag seeded with data.
    #[must_use]
    pub fn from_map(data: HashMap<String, serde_json::Value>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Gets a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.data.read().get(key).cloned()
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Sets a value, overwriting any previous one.
    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.data.write().insert(key.into(), value);
    }

    /// Removes a value, returning it if present.
    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.data.write().remove(key)
    }

    /// Returns a copy of all data.
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, serde_json::Value> {
        self.data.read().clone()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

/// The mutable state of one concrete pipeline run.
#[derive(Debug)]
pub struct ExecutionContext {
    id: Uuid,
    definition: PipelineDefinition,
    status: PipelineStatus,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    completed_steps: Vec<String>,
    results: HashMap<String, StepResult>,
    global_data: DataBag,
    error: Option<String>,
}

impl ExecutionContext {
    /// Creates a new pending context for one run of `definition`.
    #[must_use]
    pub fn new(
        definition: &PipelineDefinition,
        initial_data: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            definition: definition.clone(),
            status: PipelineStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            completed_steps: Vec::new(),
            results: HashMap::new(),
            global_data: DataBag::from_map(initial_data),
            error: None,
        }
    }

    /// Returns the unique run id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the pipeline definition this run was launched from.
    #[must_use]
    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        self.definition.name()
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    /// Returns when the run was created.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the run reached a terminal state, if it has.
    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns the names of successfully completed steps, in pipeline order.
    #[must_use]
    pub fn completed_steps(&self) -> &[String] {
        &self.completed_steps
    }

    /// Returns all recorded step results, keyed by step name.
    #[must_use]
    pub fn results(&self) -> &HashMap<String, StepResult> {
        &self.results
    }

    /// Returns the result for one step, if recorded.
    #[must_use]
    pub fn result(&self, step_name: &str) -> Option<&StepResult> {
        self.results.get(step_name)
    }

    /// Returns the shared key/value data for this run.
    #[must_use]
    pub fn global_data(&self) -> &DataBag {
        &self.global_data
    }

    /// Returns the terminal error, if the run failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Marks the run as running. Called by the engine when step 1 starts.
    pub(crate) fn mark_running(&mut self) {
        if self.guard_terminal("mark_running") {
            return;
        }
        self.status = PipelineStatus::Running;
    }

    /// Records the terminal result of a step.
    ///
    /// Successful steps are also appended to `completed_steps`, preserving
    /// pipeline order.
    pub(crate) fn record_result(&mut self, result: StepResult) {
        if self.guard_terminal("record_result") {
            return;
        }
        if result.success {
            self.completed_steps.push(result.step_name.clone());
        }
        self.results.insert(result.step_name.clone(), result);
    }

    /// Moves the run into a terminal state.
    pub(crate) fn finish(&mut self, status: PipelineStatus, error: Option<String>) {
        if self.guard_terminal("finish") {
            return;
        }
        debug_assert!(status.is_terminal(), "finish requires a terminal status");
        self.status = status;
        self.completed_at = Some(Utc::now());
        self.error = error;
    }

    /// Refuses mutation once a terminal state is reached.
    ///
    /// Returns true (and records the violation) when the context is already
    /// terminal. A hit here is a programming error in the engine.
    fn guard_terminal(&self, operation: &str) -> bool {
        if self.status.is_terminal() {
            tracing::error!(
                run_id = %self.id,
                pipeline = %self.pipeline(),
                status = %self.status,
                operation,
                "attempted mutation of a terminal execution context"
            );
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineDefinition;
    use crate::step::StepOutput;

    fn context() -> ExecutionContext {
        let definition = PipelineDefinition::new("orders").step("validate").step("pay");
        let mut initial = HashMap::new();
        initial.insert("order_id".to_string(), serde_json::json!("ord-1"));
        ExecutionContext::new(&definition, initial)
    }

    #[test]
    fn test_new_context_is_pending() {
        let ctx = context();
        assert_eq!(ctx.status(), PipelineStatus::Pending);
        assert_eq!(ctx.pipeline(), "orders");
        assert!(ctx.completed_steps().is_empty());
        assert!(ctx.completed_at().is_none());
        assert_eq!(
            ctx.global_data().get("order_id"),
            Some(serde_json::json!("ord-1"))
        );
    }

    #[test]
    fn test_status_transitions() {
        let mut ctx = context();
        ctx.mark_running();
        assert_eq!(ctx.status(), PipelineStatus::Running);

        ctx.finish(PipelineStatus::Succeeded, None);
        assert_eq!(ctx.status(), PipelineStatus::Succeeded);
        assert!(ctx.completed_at().is_some());
        assert!(ctx.error().is_none());
    }

    #[test]
    fn test_record_result_tracks_order() {
        let mut ctx = context();
        ctx.mark_running();

        ctx.record_result(StepResult::from_output(
            "validate",
            StepOutput::ok_empty(),
            Duration::from_millis(5),
            1,
        ));
        ctx.record_result(StepResult::from_output(
            "pay",
            StepOutput::fail("declined"),
            Duration::from_millis(9),
            1,
        ));

        assert_eq!(ctx.completed_steps(), ["validate".to_string()]);
        assert_eq!(ctx.results().len(), 2);
        assert!(!ctx.result("pay").unwrap().success);
        assert_eq!(ctx.result("pay").unwrap().error.as_deref(), Some("declined"));
    }

    #[test]
    fn test_terminal_context_refuses_mutation() {
        let mut ctx = context();
        ctx.mark_running();
        ctx.finish(PipelineStatus::Failed, Some("boom".to_string()));

        ctx.record_result(StepResult::from_output(
            "late",
            StepOutput::ok_empty(),
            Duration::ZERO,
            1,
        ));
        ctx.finish(PipelineStatus::Succeeded, None);

        assert_eq!(ctx.status(), PipelineStatus::Failed);
        assert!(ctx.results().is_empty());
        assert_eq!(ctx.error(), Some("boom"));
    }

    #[test]
    fn test_data_bag_overwrites() {
        let bag = DataBag::new();
        bag.set("status", serde_json::json!("validated"));
        bag.set("status", serde_json::json!("paid"));

        assert_eq!(bag.get("status"), Some(serde_json::json!("paid")));
        assert_eq!(bag.len(), 1);
        assert_eq!(bag.remove("status"), Some(serde_json::json!("paid")));
        assert!(bag.is_empty());
    }

    #[test]
    fn test_pipeline_status_predicates() {
        assert!(PipelineStatus::Succeeded.is_terminal());
        assert!(PipelineStatus::Failed.is_terminal());
        assert!(PipelineStatus::TimedOut.is_terminal());
        assert!(PipelineStatus::Cancelled.is_terminal());
        assert!(!PipelineStatus::Pending.is_terminal());
        assert!(!PipelineStatus::Running.is_terminal());
        assert!(PipelineStatus::Succeeded.is_success());
        assert!(!PipelineStatus::Failed.is_success());
    }

    #[test]
    fn test_step_result_serialization() {
        let result = StepResult::from_output(
            "notify",
            StepOutput::fail_retryable("smtp timeout"),
            Duration::from_millis(123),
            3,
        );
        let json = serde_json::to_string(&result).unwrap();
        let back: StepResult = serde_json::from_str(&json).unwrap();

        assert_eq!(back.step_name, "notify");
        assert_eq!(back.attempts, 3);
        assert!(back.retryable);
    }
}
