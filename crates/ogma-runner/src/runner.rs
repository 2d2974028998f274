//! Supervised invocation of one external agent task.
//!
//! # Flow
//!
//! 1. Stage a private workdir: serialized snapshot, `tools.json` pointing
//!    the agent at the statically built `ogma-toolserver`, and a system
//!    prompt file.
//! 2. Spawn the agent executable with the workdir, model id, turn budget,
//!    and task instruction.
//! 3. Await exit, killing the subprocess the moment cancellation fires.
//! 4. Read the result artifact. Absence on a clean exit is a valid
//!    "no output" outcome; a nonzero exit is an error.
//!
//! A retry re-runs all four steps against freshly serialized state.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ogma_protocol::{ARTIFACT_FILE, Snapshot};
use ogma_types::{AgentResult, EnrichResult, TaskKind, Thoroughness};

use crate::error::{Result, RunnerError};

/// Default attempt ceiling for retryable failures.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// One unit of agent work.
#[derive(Debug, Clone)]
pub struct AgentTask {
    /// What the agent is being asked to do.
    pub kind: TaskKind,
    /// Session the task belongs to.
    pub session_id: String,
    /// Resource under extraction/enrichment, absent for session-wide tasks.
    pub resource_id: Option<String>,
    /// Task instruction handed to the agent verbatim.
    pub instruction: String,
    /// Effort tier controlling the turn budget.
    pub thoroughness: Thoroughness,
    /// Point-in-time graph slice the agent works against.
    pub snapshot: Snapshot,
}

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// External agent executable.
    pub agent_command: PathBuf,
    /// Statically built tool-server binary.
    pub toolserver_command: PathBuf,
    /// Model identifier passed through to the agent.
    pub model: String,
    /// Root directory for per-task workdirs.
    pub workdir_root: PathBuf,
    /// Attempt ceiling for retryable failures.
    pub max_attempts: u32,
    /// Keep workdirs after the task finishes (debugging).
    pub keep_workdirs: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            agent_command: PathBuf::from("ogma-agent"),
            toolserver_command: PathBuf::from("ogma-toolserver"),
            model: String::new(),
            workdir_root: std::env::temp_dir().join("ogma"),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            keep_workdirs: false,
        }
    }
}

/// How one supervised task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome<T> {
    /// Clean exit with a parsed artifact.
    Output(T),
    /// Clean exit, no artifact: the agent had nothing to submit.
    NoOutput,
    /// Cancellation fired before or during the run; nothing was produced.
    Cancelled,
}

impl<T> TaskOutcome<T> {
    /// Unwrap the output if present.
    pub fn into_output(self) -> Option<T> {
        match self {
            Self::Output(value) => Some(value),
            _ => None,
        }
    }
}

/// A terminal run result plus how many attempts it took.
#[derive(Debug)]
pub struct RunReport<T> {
    /// Terminal outcome or the error that exhausted the retry budget.
    pub outcome: Result<TaskOutcome<T>>,
    /// Attempts consumed (1-based).
    pub attempts: u32,
}

/// Trait seam for the orchestrator, enabling test mocking.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Run an extraction or cross-link task.
    async fn run_extraction(
        &self,
        task: &AgentTask,
        cancel: &CancellationToken,
    ) -> RunReport<AgentResult>;

    /// Run an enrichment task.
    async fn run_enrichment(
        &self,
        task: &AgentTask,
        cancel: &CancellationToken,
    ) -> RunReport<EnrichResult>;
}

/// Production runner that spawns the real agent subprocess.
pub struct AgentRunner {
    config: RunnerConfig,
}

impl AgentRunner {
    /// Create a runner with the given configuration.
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Run one task to a terminal outcome, retrying retryable failures up
    /// to the attempt ceiling. Every attempt re-stages from scratch.
    pub async fn run<T: DeserializeOwned>(
        &self,
        task: &AgentTask,
        cancel: &CancellationToken,
    ) -> RunReport<T> {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.run_once(task, cancel).await {
                Ok(outcome) => {
                    return RunReport {
                        outcome: Ok(outcome),
                        attempts: attempt,
                    };
                }
                Err(e) if e.is_retryable() && attempt < max_attempts && !cancel.is_cancelled() => {
                    warn!(
                        task = task.kind.as_str(),
                        attempt,
                        error = %e,
                        "Agent attempt failed, retrying"
                    );
                }
                Err(e) => {
                    return RunReport {
                        outcome: Err(e),
                        attempts: attempt,
                    };
                }
            }
        }
        unreachable!("retry loop returns on the final attempt")
    }

    /// One attempt: stage, spawn, await, read artifact.
    async fn run_once<T: DeserializeOwned>(
        &self,
        task: &AgentTask,
        cancel: &CancellationToken,
    ) -> Result<TaskOutcome<T>> {
        // Cancellation checkpoint before any work or subprocess spawn
        if cancel.is_cancelled() {
            return Ok(TaskOutcome::Cancelled);
        }

        let workdir = self.stage_workdir(task)?;
        let result = self.invoke_agent(task, &workdir, cancel).await;

        if !self.config.keep_workdirs {
            if let Err(e) = std::fs::remove_dir_all(&workdir) {
                warn!(workdir = %workdir.display(), error = %e, "Workdir cleanup failed");
            }
        }

        result
    }

    /// Stage the private workdir: snapshot, tool-server definition, prompt.
    fn stage_workdir(&self, task: &AgentTask) -> Result<PathBuf> {
        let workdir = self
            .config
            .workdir_root
            .join(format!("{}-{}", task.kind.as_str(), Uuid::new_v4()));
        task.snapshot.write_to(&workdir)?;

        let tools = json!({
            "tools": [{
                "name": "ogma",
                "command": self.config.toolserver_command,
                "args": ["--snapshot", workdir],
            }]
        });
        std::fs::write(
            workdir.join("tools.json"),
            serde_json::to_string_pretty(&tools).map_err(|e| RunnerError::Artifact(e.to_string()))?,
        )?;

        std::fs::write(workdir.join("system_prompt.md"), system_prompt(task))?;

        debug!(workdir = %workdir.display(), task = task.kind.as_str(), "Workdir staged");
        Ok(workdir)
    }

    /// Spawn the agent, race its exit against cancellation, read the artifact.
    async fn invoke_agent<T: DeserializeOwned>(
        &self,
        task: &AgentTask,
        workdir: &Path,
        cancel: &CancellationToken,
    ) -> Result<TaskOutcome<T>> {
        let mut command = Command::new(&self.config.agent_command);
        command
            .arg("--workdir")
            .arg(workdir)
            .arg("--model")
            .arg(&self.config.model)
            .arg("--max-turns")
            .arg(task.thoroughness.turn_budget().to_string())
            .arg("--instruction")
            .arg(&task.instruction)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        let mut child = command
            .spawn()
            .map_err(|e| RunnerError::Spawn(format!("{}: {e}", self.config.agent_command.display())))?;

        info!(
            task = task.kind.as_str(),
            session_id = %task.session_id,
            resource_id = task.resource_id.as_deref().unwrap_or("-"),
            turns = task.thoroughness.turn_budget(),
            "Agent spawned"
        );

        let status = tokio::select! {
            status = child.wait() => {
                status.map_err(|e| RunnerError::Spawn(format!("wait failed: {e}")))?
            }
            _ = cancel.cancelled() => {
                // Forceful termination; in-flight I/O is abandoned, not drained
                let _ = child.start_kill();
                let _ = child.wait().await;
                info!(task = task.kind.as_str(), "Agent killed on cancellation");
                return Ok(TaskOutcome::Cancelled);
            }
        };

        if !status.success() {
            return Err(RunnerError::NonZeroExit {
                code: status.code().unwrap_or(-1),
            });
        }

        let artifact_path = workdir.join(ARTIFACT_FILE);
        if !artifact_path.exists() {
            debug!(task = task.kind.as_str(), "Agent produced no output");
            return Ok(TaskOutcome::NoOutput);
        }

        let raw = std::fs::read_to_string(&artifact_path)?;
        let parsed: T = serde_json::from_str(&raw)
            .map_err(|e| RunnerError::Artifact(format!("{e}")))?;
        Ok(TaskOutcome::Output(parsed))
    }
}

#[async_trait]
impl TaskRunner for AgentRunner {
    async fn run_extraction(
        &self,
        task: &AgentTask,
        cancel: &CancellationToken,
    ) -> RunReport<AgentResult> {
        self.run(task, cancel).await
    }

    async fn run_enrichment(
        &self,
        task: &AgentTask,
        cancel: &CancellationToken,
    ) -> RunReport<EnrichResult> {
        self.run(task, cancel).await
    }
}

/// Base prompt staged into every task workdir.
///
/// Kept generic: the interesting variation lives in the per-task
/// instruction and the thoroughness tier.
fn system_prompt(task: &AgentTask) -> String {
    let detail = match task.thoroughness {
        Thoroughness::Quick => {
            "Work quickly. Prefer list_chunks and search_chunks over reading every chunk."
        }
        Thoroughness::Thorough => {
            "Be thorough. Read every chunk with get_chunk before deciding on concepts and links."
        }
    };
    format!(
        "You analyze study materials through the `ogma` tool server defined in tools.json.\n\
         All query tools read a fixed snapshot; nothing you do changes it.\n\
         When finished you MUST call submit_result exactly once with your structured result.\n\
         Exiting without calling submit_result means you found nothing to report.\n\n\
         Task: {}\n{}\n",
        task.kind.as_str(),
        detail
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ogma_types::IndexErrorKind;

    fn test_task(snapshot: Snapshot) -> AgentTask {
        AgentTask {
            kind: TaskKind::Extract,
            session_id: "s1".to_string(),
            resource_id: Some("r1".to_string()),
            instruction: "extract concepts".to_string(),
            thoroughness: Thoroughness::Quick,
            snapshot,
        }
    }

    /// Write an executable shell script standing in for the agent binary.
    ///
    /// The agent is invoked as `--workdir <dir> --model <m> --max-turns <n>
    /// --instruction <s>`, so `$2` is the workdir.
    #[cfg(unix)]
    fn fake_agent(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-agent.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    fn test_config(dir: &Path, agent: PathBuf, max_attempts: u32) -> RunnerConfig {
        RunnerConfig {
            agent_command: agent,
            toolserver_command: PathBuf::from("ogma-toolserver"),
            model: "test-model".to_string(),
            workdir_root: dir.join("work"),
            max_attempts,
            keep_workdirs: false,
        }
    }

    #[tokio::test]
    async fn test_spawn_failure_is_llm_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = AgentRunner::new(RunnerConfig {
            agent_command: PathBuf::from("nonexistent-agent-binary-12345"),
            workdir_root: dir.path().join("work"),
            max_attempts: 1,
            ..Default::default()
        });
        let cancel = CancellationToken::new();

        let report: RunReport<AgentResult> =
            runner.run(&test_task(Snapshot::default()), &cancel).await;
        let err = report.outcome.unwrap_err();
        assert_eq!(err.classify(), IndexErrorKind::LlmError);
        assert_eq!(report.attempts, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clean_exit_without_artifact_is_no_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let agent = fake_agent(dir.path(), "exit 0");
        let runner = AgentRunner::new(test_config(dir.path(), agent, 1));
        let cancel = CancellationToken::new();

        let report: RunReport<AgentResult> =
            runner.run(&test_task(Snapshot::default()), &cancel).await;
        assert!(matches!(report.outcome.unwrap(), TaskOutcome::NoOutput));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_artifact_parsed_on_clean_exit() {
        let dir = tempfile::TempDir::new().unwrap();
        let agent = fake_agent(
            dir.path(),
            r#"printf '{"concepts": [{"name": "Heat Equation"}]}' > "$2/result.json""#,
        );
        let runner = AgentRunner::new(test_config(dir.path(), agent, 1));
        let cancel = CancellationToken::new();

        let report: RunReport<AgentResult> =
            runner.run(&test_task(Snapshot::default()), &cancel).await;
        match report.outcome.unwrap() {
            TaskOutcome::Output(result) => {
                assert_eq!(result.concepts.len(), 1);
                assert_eq!(result.concepts[0].name, "Heat Equation");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_error_even_with_artifact() {
        let dir = tempfile::TempDir::new().unwrap();
        let agent = fake_agent(
            dir.path(),
            r#"printf '{}' > "$2/result.json"; exit 3"#,
        );
        let runner = AgentRunner::new(test_config(dir.path(), agent, 1));
        let cancel = CancellationToken::new();

        let report: RunReport<AgentResult> =
            runner.run(&test_task(Snapshot::default()), &cancel).await;
        match report.outcome.unwrap_err() {
            RunnerError::NonZeroExit { code } => assert_eq!(code, 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_malformed_artifact_retries_then_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        // Count attempts through a side file outside the per-attempt workdir
        let counter = dir.path().join("attempts");
        let agent = fake_agent(
            dir.path(),
            &format!(
                r#"echo x >> "{}"; printf 'not json' > "$2/result.json""#,
                counter.display()
            ),
        );
        let runner = AgentRunner::new(test_config(dir.path(), agent, 2));
        let cancel = CancellationToken::new();

        let report: RunReport<AgentResult> =
            runner.run(&test_task(Snapshot::default()), &cancel).await;
        let err = report.outcome.unwrap_err();
        assert_eq!(err.classify(), IndexErrorKind::ParseError);
        assert_eq!(report.attempts, 2);

        let attempts = std::fs::read_to_string(&counter).unwrap().lines().count();
        assert_eq!(attempts, 2, "both attempts ran against fresh workdirs");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation_kills_subprocess() {
        let dir = tempfile::TempDir::new().unwrap();
        let agent = fake_agent(dir.path(), "sleep 30");
        let runner = AgentRunner::new(test_config(dir.path(), agent, 3));
        let cancel = CancellationToken::new();

        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            cancel_clone.cancel();
        });

        let started = std::time::Instant::now();
        let report: RunReport<AgentResult> =
            runner.run(&test_task(Snapshot::default()), &cancel).await;
        assert!(matches!(report.outcome.unwrap(), TaskOutcome::Cancelled));
        assert!(
            started.elapsed() < std::time::Duration::from_secs(10),
            "kill must not wait for the subprocess to finish sleeping"
        );
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_spawns_nothing() {
        let runner = AgentRunner::new(RunnerConfig {
            agent_command: PathBuf::from("nonexistent-agent-binary-12345"),
            max_attempts: 3,
            ..Default::default()
        });
        let cancel = CancellationToken::new();
        cancel.cancel();

        // A missing binary would error if we tried to spawn; Cancelled
        // proves we never got that far.
        let report: RunReport<AgentResult> =
            runner.run(&test_task(Snapshot::default()), &cancel).await;
        assert!(matches!(report.outcome.unwrap(), TaskOutcome::Cancelled));
    }

    #[test]
    fn test_system_prompt_varies_with_thoroughness() {
        let mut task = test_task(Snapshot::default());
        let quick = system_prompt(&task);
        task.thoroughness = Thoroughness::Thorough;
        let thorough = system_prompt(&task);
        assert_ne!(quick, thorough);
        assert!(quick.contains("submit_result"));
        assert!(thorough.contains("submit_result"));
    }
}
