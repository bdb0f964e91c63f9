//! The pipeline engine: step registry, concurrency gate, pipeline driver.

use crate::cancellation::CancellationToken;
use crate::config::EngineConfig;
use crate::context::{ExecutionContext, PipelineStatus};
use crate::errors::EngineError;
use crate::events::{BufferedEventSink, EventSink, NoOpEventSink};
use crate::pipeline::PipelineDefinition;
use crate::retry::RetryPolicy;
use crate::runner::{run_step, StepDisposition};
use crate::step::Step;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// Drives pipeline definitions through their steps.
///
/// The engine owns the step registry and a pool of concurrency slots
/// bounding how many runs execute simultaneously. One run drives its steps
/// strictly in declared order; only different runs are concurrent.
pub struct Engine {
    config: EngineConfig,
    registry: RwLock<HashMap<String, Arc<dyn Step>>>,
    slots: Arc<Semaphore>,
    sink: Arc<dyn EventSink>,
}

impl Engine {
    /// Creates an engine from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] when the config is invalid.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let slots = Arc::new(Semaphore::new(config.max_concurrent_pipelines));
        Ok(Self {
            config,
            registry: RwLock::new(HashMap::new()),
            slots,
            sink: Arc::new(NoOpEventSink),
        })
    }

    /// Creates an engine with the default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        // The default config always validates.
        match Self::new(EngineConfig::default()) {
            Ok(engine) => engine,
            Err(_) => unreachable!("default EngineConfig is valid"),
        }
    }

    /// Sets the event sink observability hooks emit through.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Installs `downstream` behind a [`BufferedEventSink`] whose queue
    /// capacity is [`EngineConfig::buffer_size`].
    ///
    /// The buffer's forwarding task is spawned immediately, so this must be
    /// called from within a tokio runtime.
    #[must_use]
    pub fn with_buffered_sink(self, downstream: Arc<dyn EventSink>) -> Self {
        let buffer_size = self.config.buffer_size;
        self.with_event_sink(Arc::new(BufferedEventSink::new(downstream, buffer_size)))
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registers a step under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidStep`] for an empty name and
    /// [`EngineError::DuplicateStep`] when the name is taken; the original
    /// registration is left intact.
    pub fn register_step(
        &self,
        name: impl Into<String>,
        step: Arc<dyn Step>,
    ) -> Result<(), EngineError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(EngineError::invalid_step("step name must not be empty"));
        }

        let mut registry = self.registry.write();
        if registry.contains_key(&name) {
            return Err(EngineError::duplicate_step(name));
        }

        tracing::debug!(step = %name, "registered step");
        registry.insert(name, step);
        Ok(())
    }

    /// Returns true if a step is registered under `name`.
    #[must_use]
    pub fn has_step(&self, name: &str) -> bool {
        self.registry.read().contains_key(name)
    }

    /// Returns the number of registered steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.registry.read().len()
    }

    /// Runs one pipeline to completion.
    ///
    /// Equivalent to [`Engine::execute_with_token`] with a token that never
    /// fires.
    ///
    /// # Errors
    ///
    /// See [`Engine::execute_with_token`].
    pub async fn execute(
        &self,
        definition: &PipelineDefinition,
        initial_data: HashMap<String, serde_json::Value>,
    ) -> Result<ExecutionContext, EngineError> {
        self.execute_with_token(definition, initial_data, CancellationToken::new())
            .await
    }

    /// Runs one pipeline to completion under a cancellation token.
    ///
    /// Validates that every step in the definition is registered before
    /// touching any concurrency slot, then blocks for a slot (the wait is
    /// abandoned with [`EngineError::Busy`] if `token` fires first), builds
    /// the execution context, and drives the steps in declared order. The
    /// slot is released on every exit path.
    ///
    /// # Errors
    ///
    /// - [`EngineError::UnknownStep`] if the definition references
    ///   unregistered steps; no side effects.
    /// - [`EngineError::Busy`] if cancellation fires while waiting for a
    ///   slot.
    /// - [`EngineError::StepFailed`], [`EngineError::Timeout`], or
    ///   [`EngineError::Cancelled`] for runs that started; these carry the
    ///   populated context (see [`EngineError::execution_context`]).
    pub async fn execute_with_token(
        &self,
        definition: &PipelineDefinition,
        initial_data: HashMap<String, serde_json::Value>,
        token: CancellationToken,
    ) -> Result<ExecutionContext, EngineError> {
        let steps = self.resolve_steps(definition)?;

        let _slot = self.acquire_slot(definition, &token).await?;

        let mut ctx = ExecutionContext::new(definition, initial_data);
        let timeout = definition.timeout().unwrap_or(self.config.default_timeout);
        let started = Instant::now();
        let deadline = started + timeout;

        tracing::info!(
            pipeline = %definition.name(),
            run_id = %ctx.id(),
            steps = definition.step_count(),
            timeout_ms = timeout.as_millis() as u64,
            "pipeline started"
        );
        self.emit(
            "pipeline.started",
            serde_json::json!({
                "pipeline": definition.name(),
                "run_id": ctx.id().to_string(),
                "steps": definition.step_count(),
            }),
        );

        ctx.mark_running();

        let step_sink = self
            .config
            .observability_enabled()
            .then_some(self.sink.as_ref());

        for (name, step) in steps {
            if token.is_cancelled() {
                let reason = token
                    .reason()
                    .unwrap_or_else(|| "cancelled by caller".to_string());
                return Err(self.finalize_cancelled(ctx, reason));
            }
            if Instant::now() >= deadline {
                return Err(self.finalize_timed_out(ctx, started.elapsed()));
            }

            let policy = self.effective_policy(definition, &name);
            self.emit(
                "step.started",
                serde_json::json!({ "pipeline": ctx.pipeline(), "step": &name }),
            );

            match run_step(&name, &step, &mut ctx, &policy, deadline, &token, step_sink).await {
                StepDisposition::Completed => {
                    self.emit(
                        "step.completed",
                        serde_json::json!({ "pipeline": ctx.pipeline(), "step": &name }),
                    );
                }
                StepDisposition::Failed { message, attempts } => {
                    self.emit(
                        "step.failed",
                        serde_json::json!({
                            "pipeline": ctx.pipeline(),
                            "step": &name,
                            "attempts": attempts,
                            "error": &message,
                        }),
                    );
                    return Err(self.finalize_failed(ctx, name, attempts, message));
                }
                StepDisposition::DeadlineExceeded => {
                    return Err(self.finalize_timed_out(ctx, started.elapsed()));
                }
                StepDisposition::Cancelled { reason } => {
                    return Err(self.finalize_cancelled(ctx, reason));
                }
            }
        }

        ctx.finish(PipelineStatus::Succeeded, None);
        tracing::info!(
            pipeline = %ctx.pipeline(),
            run_id = %ctx.id(),
            duration_ms = started.elapsed().as_millis() as u64,
            "pipeline succeeded"
        );
        self.emit(
            "pipeline.completed",
            serde_json::json!({
                "pipeline": ctx.pipeline(),
                "run_id": ctx.id().to_string(),
                "duration_ms": started.elapsed().as_millis() as u64,
            }),
        );
        Ok(ctx)
    }

    /// Snapshots the step implementations for a run, failing fast on any
    /// unregistered name.
    fn resolve_steps(
        &self,
        definition: &PipelineDefinition,
    ) -> Result<Vec<(String, Arc<dyn Step>)>, EngineError> {
        let registry = self.registry.read();
        let mut steps = Vec::with_capacity(definition.step_count());
        let mut missing = Vec::new();

        for name in definition.step_names() {
            match registry.get(name) {
                Some(step) => steps.push((name.clone(), Arc::clone(step))),
                None => missing.push(name.clone()),
            }
        }

        if missing.is_empty() {
            Ok(steps)
        } else {
            Err(EngineError::unknown_step(definition.name(), missing))
        }
    }

    async fn acquire_slot(
        &self,
        definition: &PipelineDefinition,
        token: &CancellationToken,
    ) -> Result<tokio::sync::OwnedSemaphorePermit, EngineError> {
        if token.is_cancelled() {
            return Err(EngineError::busy(
                definition.name(),
                token
                    .reason()
                    .unwrap_or_else(|| "cancelled before acquiring a slot".to_string()),
            ));
        }

        tokio::select! {
            permit = Arc::clone(&self.slots).acquire_owned() => {
                permit.map_err(|_| {
                    EngineError::busy(definition.name(), "engine shut down")
                })
            }
            () = token.cancelled() => {
                Err(EngineError::busy(
                    definition.name(),
                    token
                        .reason()
                        .unwrap_or_else(|| "cancelled while waiting for a slot".to_string()),
                ))
            }
        }
    }

    fn effective_policy(&self, definition: &PipelineDefinition, step: &str) -> RetryPolicy {
        definition
            .step_retry(step)
            .or_else(|| definition.retry_policy())
            .unwrap_or(&self.config.default_retry_policy)
            .clone()
    }

    fn finalize_failed(
        &self,
        mut ctx: ExecutionContext,
        step: String,
        attempts: u32,
        message: String,
    ) -> EngineError {
        let error = format!("step '{step}' failed after {attempts} attempt(s): {message}");
        ctx.finish(PipelineStatus::Failed, Some(error));
        tracing::warn!(
            pipeline = %ctx.pipeline(),
            run_id = %ctx.id(),
            step = %step,
            attempts,
            "pipeline failed"
        );
        self.emit(
            "pipeline.failed",
            serde_json::json!({
                "pipeline": ctx.pipeline(),
                "run_id": ctx.id().to_string(),
                "step": &step,
            }),
        );
        EngineError::StepFailed {
            step,
            attempts,
            message,
            context: Box::new(ctx),
        }
    }

    fn finalize_timed_out(&self, mut ctx: ExecutionContext, elapsed: Duration) -> EngineError {
        let pipeline = ctx.pipeline().to_string();
        ctx.finish(
            PipelineStatus::TimedOut,
            Some(format!("pipeline timed out after {elapsed:?}")),
        );
        tracing::warn!(
            pipeline = %pipeline,
            run_id = %ctx.id(),
            elapsed_ms = elapsed.as_millis() as u64,
            "pipeline timed out"
        );
        self.emit(
            "pipeline.timed_out",
            serde_json::json!({
                "pipeline": &pipeline,
                "run_id": ctx.id().to_string(),
                "elapsed_ms": elapsed.as_millis() as u64,
            }),
        );
        EngineError::Timeout {
            pipeline,
            elapsed,
            context: Box::new(ctx),
        }
    }

    fn finalize_cancelled(&self, mut ctx: ExecutionContext, reason: String) -> EngineError {
        let pipeline = ctx.pipeline().to_string();
        ctx.finish(
            PipelineStatus::Cancelled,
            Some(format!("pipeline cancelled: {reason}")),
        );
        tracing::info!(
            pipeline = %pipeline,
            run_id = %ctx.id(),
            reason = %reason,
            "pipeline cancelled"
        );
        self.emit(
            "pipeline.cancelled",
            serde_json::json!({
                "pipeline": &pipeline,
                "run_id": ctx.id().to_string(),
                "reason": &reason,
            }),
        );
        EngineError::Cancelled {
            pipeline,
            reason,
            context: Box::new(ctx),
        }
    }

    fn emit(&self, event_type: &str, data: serde_json::Value) {
        if self.config.observability_enabled() {
            self.sink.try_emit(event_type, Some(data));
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("steps", &self.step_count())
            .field(
                "max_concurrent_pipelines",
                &self.config.max_concurrent_pipelines,
            )
            .finish()
    }
}
