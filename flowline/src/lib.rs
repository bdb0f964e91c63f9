//! # Flowline
//!
//! A pipeline execution engine: register named processing steps, compose
//! them into declared pipelines, and run those pipelines with per-step
//! retry/backoff, an overall timeout, and bounded pipeline-level
//! concurrency.
//!
//! One pipeline run drives its steps strictly in declared order against a
//! shared, mutable execution context. Only different runs execute
//! concurrently, bounded by the engine's slot pool.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flowline::prelude::*;
//!
//! let engine = Engine::with_defaults();
//! engine.register_step("validate", Arc::new(ValidateStep::new()))?;
//! engine.register_step("pay", Arc::new(PaymentStep::new()))?;
//!
//! let pipeline = PipelineDefinition::new("orders")
//!     .step("validate")
//!     .step("pay")
//!     .with_timeout(Duration::from_secs(30));
//!
//! let ctx = engine.execute(&pipeline, initial_data).await?;
//! assert!(ctx.status().is_success());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod retry;
mod runner;
pub mod step;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::EngineConfig;
    pub use crate::context::{DataBag, ExecutionContext, PipelineStatus, StepResult};
    pub use crate::engine::Engine;
    pub use crate::errors::EngineError;
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::PipelineDefinition;
    pub use crate::retry::RetryPolicy;
    pub use crate::step::{Step, StepOutput};
}
