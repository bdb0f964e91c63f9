//! Step trait and step output type.
//!
//! Steps are the units of work an engine drives. The engine never inspects
//! concrete step types; it only sees the [`Step`] contract and the
//! [`StepOutput`] the step reports. Retryability is declared by the output,
//! never inferred from error content.
//!
//! Steps must be idempotent with respect to being retried: the engine may
//! invoke a step multiple times on transient failure.

use crate::context::ExecutionContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;

/// Trait for pipeline steps.
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Returns the name of the step.
    fn name(&self) -> &str;

    /// Executes the step against the shared run state.
    ///
    /// The output's `retryable` flag classifies a failure as transient
    /// (eligible for retry) or fatal (stops the pipeline immediately).
    async fn run(&self, ctx: &ExecutionContext) -> StepOutput;
}

/// The outcome a step reports from one attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutput {
    /// Whether the attempt succeeded.
    pub success: bool,

    /// Output data produced by the step.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub output: HashMap<String, serde_json::Value>,

    /// Error message for failed attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Whether a failure may be retried.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,

    /// Additional metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Default for StepOutput {
    fn default() -> Self {
        Self::ok_empty()
    }
}

impl StepOutput {
    /// Creates a successful output with data.
    #[must_use]
    pub fn ok(output: HashMap<String, serde_json::Value>) -> Self {
        Self {
            success: true,
            output,
            error: None,
            retryable: false,
            metadata: HashMap::new(),
        }
    }

    /// Creates a successful output with no data.
    #[must_use]
    pub fn ok_empty() -> Self {
        Self::ok(HashMap::new())
    }

    /// Creates a successful output with a single value.
    #[must_use]
    pub fn ok_value(key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut output = HashMap::new();
        output.insert(key.into(), value);
        Self::ok(output)
    }

    /// Creates a fatal failure output.
    #[must_use]
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: HashMap::new(),
            error: Some(error.into()),
            retryable: false,
            metadata: HashMap::new(),
        }
    }

    /// Creates a retryable failure output.
    #[must_use]
    pub fn fail_retryable(error: impl Into<String>) -> Self {
        Self {
            retryable: true,
            ..Self::fail(error)
        }
    }

    /// Merges data into the output.
    #[must_use]
    pub fn with_output(mut self, output: HashMap<String, serde_json::Value>) -> Self {
        self.output.extend(output);
        self
    }

    /// Adds a single metadata entry.
    #[must_use]
    pub fn add_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns true if the output indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Returns true if a failed output may be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Gets a value from the output data.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.output.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_output() {
        let output = StepOutput::ok_value("total", serde_json::json!(99.5));
        assert!(output.is_success());
        assert!(!output.is_retryable());
        assert_eq!(output.get("total"), Some(&serde_json::json!(99.5)));
    }

    #[test]
    fn test_fail_is_fatal_by_default() {
        let output = StepOutput::fail("payment declined");
        assert!(!output.is_success());
        assert!(!output.is_retryable());
        assert_eq!(output.error.as_deref(), Some("payment declined"));
    }

    #[test]
    fn test_fail_retryable() {
        let output = StepOutput::fail_retryable("gateway unavailable");
        assert!(!output.is_success());
        assert!(output.is_retryable());
    }

    #[test]
    fn test_builders_merge() {
        let mut extra = HashMap::new();
        extra.insert("count".to_string(), serde_json::json!(3));

        let output = StepOutput::ok_value("id", serde_json::json!("abc"))
            .with_output(extra)
            .add_metadata("degraded", serde_json::json!(true));

        assert_eq!(output.output.len(), 2);
        assert_eq!(output.metadata.get("degraded"), Some(&serde_json::json!(true)));
    }

    #[test]
    fn test_serialization_round_trip() {
        let output = StepOutput::fail_retryable("transient");
        let json = serde_json::to_string(&output).unwrap();
        let back: StepOutput = serde_json::from_str(&json).unwrap();

        assert_eq!(back.success, output.success);
        assert_eq!(back.retryable, output.retryable);
        assert_eq!(back.error, output.error);
    }
}
