//! External-agent supervision for Ogma.
//!
//! One task = one subprocess invocation = at most one result artifact.
//! The [`AgentRunner`] stages a private snapshot workdir, launches the
//! external reasoning agent bound to the `ogma-toolserver` tool surface,
//! races its exit against a cancellation token, and maps every failure
//! into the pipeline taxonomy. Retryable failures (`llm_error`,
//! `parse_error`) re-run from freshly serialized state up to the attempt
//! ceiling; everything else is terminal immediately.

pub mod error;
pub mod runner;

pub use error::{Result, RunnerError};
pub use runner::{
    AgentRunner, AgentTask, DEFAULT_MAX_ATTEMPTS, RunReport, RunnerConfig, TaskOutcome, TaskRunner,
};
