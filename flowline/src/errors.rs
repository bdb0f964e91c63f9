//! Error types for the flowline engine.
//!
//! Registration and preflight errors are raised before any run state exists.
//! Run-terminal errors carry the populated [`ExecutionContext`] so callers
//! can inspect which steps completed and why the run stopped.

use crate::context::ExecutionContext;
use std::time::Duration;
use thiserror::Error;

/// The error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A step name is already registered.
    #[error("step '{name}' is already registered")]
    DuplicateStep {
        /// The conflicting step name.
        name: String,
    },

    /// A step registration was rejected.
    #[error("invalid step registration: {reason}")]
    InvalidStep {
        /// Why the registration was rejected.
        reason: String,
    },

    /// A pipeline definition references steps that are not registered.
    #[error("pipeline '{pipeline}' references unregistered steps: {}", missing.join(", "))]
    UnknownStep {
        /// The pipeline name.
        pipeline: String,
        /// Every referenced step name with no registration.
        missing: Vec<String>,
    },

    /// The engine configuration failed validation.
    #[error("invalid engine configuration: {reason}")]
    Configuration {
        /// Why validation failed.
        reason: String,
    },

    /// Waiting for a concurrency slot was abandoned.
    #[error("engine busy: gave up waiting for a slot for pipeline '{pipeline}': {reason}")]
    Busy {
        /// The pipeline that never started.
        pipeline: String,
        /// Why the wait was abandoned.
        reason: String,
    },

    /// A step terminally failed and stopped the pipeline.
    #[error("step '{step}' failed after {attempts} attempt(s): {message}")]
    StepFailed {
        /// The failing step name.
        step: String,
        /// Attempts actually made.
        attempts: u32,
        /// The step's error message.
        message: String,
        /// The run state at the moment of failure.
        context: Box<ExecutionContext>,
    },

    /// The pipeline deadline elapsed before all steps completed.
    #[error("pipeline '{pipeline}' timed out after {elapsed:?}")]
    Timeout {
        /// The pipeline name.
        pipeline: String,
        /// Wall time spent before the deadline fired.
        elapsed: Duration,
        /// The run state at the moment the deadline fired.
        context: Box<ExecutionContext>,
    },

    /// The caller's cancellation signal stopped the pipeline.
    #[error("pipeline '{pipeline}' cancelled: {reason}")]
    Cancelled {
        /// The pipeline name.
        pipeline: String,
        /// The cancellation reason.
        reason: String,
        /// The run state at the moment cancellation was observed.
        context: Box<ExecutionContext>,
    },
}

impl EngineError {
    /// Creates a duplicate step error.
    #[must_use]
    pub fn duplicate_step(name: impl Into<String>) -> Self {
        Self::DuplicateStep { name: name.into() }
    }

    /// Creates an invalid step error.
    #[must_use]
    pub fn invalid_step(reason: impl Into<String>) -> Self {
        Self::InvalidStep {
            reason: reason.into(),
        }
    }

    /// Creates an unknown step error.
    #[must_use]
    pub fn unknown_step(pipeline: impl Into<String>, missing: Vec<String>) -> Self {
        Self::UnknownStep {
            pipeline: pipeline.into(),
            missing,
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Creates a busy error.
    #[must_use]
    pub fn busy(pipeline: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Busy {
            pipeline: pipeline.into(),
            reason: reason.into(),
        }
    }

    /// Returns the execution context attached to a run-terminal error.
    ///
    /// Registration and preflight errors carry no context because no run
    /// state was created before they were raised.
    #[must_use]
    pub fn execution_context(&self) -> Option<&ExecutionContext> {
        match self {
            Self::StepFailed { context, .. }
            | Self::Timeout { context, .. }
            | Self::Cancelled { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Returns true for errors raised before any run state existed.
    #[must_use]
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::DuplicateStep { .. }
                | Self::InvalidStep { .. }
                | Self::UnknownStep { .. }
                | Self::Configuration { .. }
                | Self::Busy { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineDefinition;
    use std::collections::HashMap;

    #[test]
    fn test_unknown_step_lists_missing_names() {
        let err = EngineError::unknown_step(
            "orders",
            vec!["validate".to_string(), "notify".to_string()],
        );
        let msg = err.to_string();
        assert!(msg.contains("orders"));
        assert!(msg.contains("validate"));
        assert!(msg.contains("notify"));
        assert!(err.is_preflight());
        assert!(err.execution_context().is_none());
    }

    #[test]
    fn test_step_failed_exposes_context() {
        let definition = PipelineDefinition::new("orders").step("validate");
        let ctx = ExecutionContext::new(&definition, HashMap::new());

        let err = EngineError::StepFailed {
            step: "validate".to_string(),
            attempts: 2,
            message: "bad payload".to_string(),
            context: Box::new(ctx),
        };

        assert!(!err.is_preflight());
        let attached = err.execution_context().unwrap();
        assert_eq!(attached.pipeline(), "orders");
        assert!(err.to_string().contains("after 2 attempt(s)"));
    }

    #[test]
    fn test_duplicate_step_display() {
        let err = EngineError::duplicate_step("payment");
        assert_eq!(err.to_string(), "step 'payment' is already registered");
    }
}
