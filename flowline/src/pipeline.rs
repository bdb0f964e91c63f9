//! Pipeline definitions.
//!
//! A definition is an immutable, reusable template: an ordered list of step
//! names plus timeout and retry defaults. One definition may launch many
//! independent execution contexts.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// An ordered, named pipeline template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    name: String,
    steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retry_policy: Option<RetryPolicy>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    step_retry_overrides: HashMap<String, RetryPolicy>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    metadata: HashMap<String, serde_json::Value>,
}

impl PipelineDefinition {
    /// Creates an empty definition with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            timeout: None,
            retry_policy: None,
            step_retry_overrides: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    /// Appends a step name to the execution order.
    #[must_use]
    pub fn step(mut self, name: impl Into<String>) -> Self {
        self.steps.push(name.into());
        self
    }

    /// Appends several step names to the execution order.
    #[must_use]
    pub fn steps(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.steps.extend(names.into_iter().map(Into::into));
        self
    }

    /// Sets the overall pipeline timeout.
    ///
    /// Runs without an explicit timeout use the engine's default.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the default retry policy for all steps in this pipeline.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Overrides the retry policy for one named step.
    #[must_use]
    pub fn with_step_retry(mut self, step: impl Into<String>, policy: RetryPolicy) -> Self {
        self.step_retry_overrides.insert(step.into(), policy);
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the ordered step names.
    #[must_use]
    pub fn step_names(&self) -> &[String] {
        &self.steps
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Returns the explicit timeout, if set.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns the pipeline-level default retry policy, if set.
    #[must_use]
    pub fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry_policy.as_ref()
    }

    /// Returns the retry override for one step, if set.
    #[must_use]
    pub fn step_retry(&self, step: &str) -> Option<&RetryPolicy> {
        self.step_retry_overrides.get(step)
    }

    /// Returns the definition metadata.
    #[must_use]
    pub fn metadata(&self) -> &HashMap<String, serde_json::Value> {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_preserves_order() {
        let definition = PipelineDefinition::new("orders")
            .step("validate")
            .steps(["pay", "inventory"])
            .step("notify");

        assert_eq!(definition.name(), "orders");
        assert_eq!(
            definition.step_names(),
            ["validate", "pay", "inventory", "notify"]
        );
        assert_eq!(definition.step_count(), 4);
    }

    #[test]
    fn test_timeout_and_retry_defaults() {
        let definition = PipelineDefinition::new("orders")
            .step("pay")
            .with_timeout(Duration::from_secs(10))
            .with_retry_policy(RetryPolicy::new().with_max_attempts(5));

        assert_eq!(definition.timeout(), Some(Duration::from_secs(10)));
        assert_eq!(definition.retry_policy().unwrap().max_attempts, 5);
    }

    #[test]
    fn test_step_retry_override() {
        let definition = PipelineDefinition::new("orders")
            .step("pay")
            .step("notify")
            .with_step_retry("notify", RetryPolicy::no_retries());

        assert!(definition.step_retry("pay").is_none());
        assert_eq!(definition.step_retry("notify").unwrap().max_attempts, 1);
    }

    #[test]
    fn test_reusable_and_cloneable() {
        let definition = PipelineDefinition::new("orders")
            .step("validate")
            .with_metadata("owner", serde_json::json!("checkout"));

        let copy = definition.clone();
        assert_eq!(copy.step_names(), definition.step_names());
        assert_eq!(
            copy.metadata().get("owner"),
            Some(&serde_json::json!("checkout"))
        );
    }
}
