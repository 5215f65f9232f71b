//! Deploy process supervision.
//!
//! One `DeployRun` per matched project per push. The launch call spawns the
//! external deploy process and returns immediately; a detached monitor task
//! streams the child's output to the operator log as it arrives, waits for
//! both streams to close and the process to exit, and only then emits the
//! terminal outcome and reports it as a commit status. Runs are fully
//! independent: no concurrency limit, no serialization, no timeout, no
//! retry.

use chrono::{DateTime, Utc};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{Config, ProjectSpec};
use crate::event::InboundEvent;
use crate::status::{CommitState, StatusReporter};

/// Terminal outcome of one deploy run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Process exited 0.
    Success,
    /// Process exited non-zero, or was terminated by a signal (no code).
    Failure { exit_code: Option<i32> },
    /// Process could not be spawned at all.
    SpawnError,
}

/// Handle to a launched deploy. Dropping it detaches the run; the monitor
/// task keeps going until the process exits.
pub struct DeployRun {
    pub id: Uuid,
    pub project: String,
    pub started_at: DateTime<Utc>,
    outcome: JoinHandle<RunOutcome>,
}

impl DeployRun {
    /// Waits for the run's terminal outcome.
    pub async fn wait(self) -> RunOutcome {
        match self.outcome.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(project = %self.project, "Deploy monitor task failed: {}", e);
                RunOutcome::Failure { exit_code: None }
            }
        }
    }
}

/// Launches the project's deploy process for the given event.
///
/// Returns as soon as the process is spawned; a spawn failure yields a run
/// whose outcome is already `SpawnError`. Never blocks on the deploy
/// itself.
pub fn launch(
    snapshot: &Arc<Config>,
    project: &ProjectSpec,
    event: &InboundEvent,
    reporter: &Arc<StatusReporter>,
) -> DeployRun {
    let id = Uuid::now_v7();
    let started_at = Utc::now();

    let mut cmd = Command::new(&project.deploy_script);
    cmd.args(&project.deploy_args)
        .current_dir(project.work_dir())
        .envs(&project.env)
        .env("DEPLOY_PROJECT", &project.name)
        .env("DEPLOY_REPO", &event.repository)
        .env("DEPLOY_BRANCH", event.branch())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(sha) = &event.commit_sha {
        cmd.env("DEPLOY_COMMIT", sha);
    }

    let snapshot = Arc::clone(snapshot);
    let reporter = Arc::clone(reporter);
    let project = project.clone();
    let sha = event.commit_sha.clone();
    let project_name = project.name.clone();

    let outcome = match cmd.spawn() {
        Ok(child) => {
            info!(
                run = %id,
                project = %project.name,
                script = %project.deploy_script,
                args = ?project.deploy_args,
                "Starting deploy"
            );
            tokio::spawn(monitor(id, child, snapshot, project, sha, reporter))
        }
        Err(e) => {
            error!(
                run = %id,
                project = %project.name,
                script = %project.deploy_script,
                "Failed to spawn deploy process: {}",
                e
            );
            tokio::spawn(async move {
                if let Some(sha) = sha {
                    reporter
                        .report(
                            &snapshot.github,
                            &project,
                            &sha,
                            CommitState::Error,
                            "Deploy process could not be started",
                        )
                        .await;
                }
                RunOutcome::SpawnError
            })
        }
    };

    DeployRun {
        id,
        project: project_name,
        started_at,
        outcome,
    }
}

/// Owns the child for its whole life: pumps both output streams, waits for
/// exit, then emits the single terminal outcome.
async fn monitor(
    id: Uuid,
    mut child: Child,
    snapshot: Arc<Config>,
    project: ProjectSpec,
    sha: Option<String>,
    reporter: Arc<StatusReporter>,
) -> RunOutcome {
    if let Some(sha) = &sha {
        reporter
            .report(
                &snapshot.github,
                &project,
                sha,
                CommitState::Pending,
                "Deploy running",
            )
            .await;
    }

    let stdout_pump = child
        .stdout
        .take()
        .map(|stream| tokio::spawn(pump_lines(id, project.name.clone(), "stdout", stream)));
    let stderr_pump = child
        .stderr
        .take()
        .map(|stream| tokio::spawn(pump_lines(id, project.name.clone(), "stderr", stream)));

    let status = child.wait().await;

    // Drain both streams to EOF before declaring the run terminal.
    if let Some(pump) = stdout_pump {
        let _ = pump.await;
    }
    if let Some(pump) = stderr_pump {
        let _ = pump.await;
    }

    let exit_code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            error!(run = %id, project = %project.name, "Failed to wait for deploy process: {}", e);
            None
        }
    };

    let (outcome, state, description) = match exit_code {
        Some(0) => (
            RunOutcome::Success,
            CommitState::Success,
            "Deploy succeeded".to_string(),
        ),
        Some(code) => (
            RunOutcome::Failure {
                exit_code: Some(code),
            },
            CommitState::Failure,
            format!("Deploy failed (exit {})", code),
        ),
        None => (
            RunOutcome::Failure { exit_code: None },
            CommitState::Failure,
            "Deploy failed (terminated by signal)".to_string(),
        ),
    };

    if outcome == RunOutcome::Success {
        info!(run = %id, project = %project.name, "Deploy finished successfully");
    } else {
        error!(run = %id, project = %project.name, exit_code = ?exit_code, "Deploy failed");
    }

    if let Some(sha) = &sha {
        reporter
            .report(&snapshot.github, &project, sha, state, &description)
            .await;
    }

    outcome
}

/// Forwards one output stream to the operator log, line by line, as the
/// process produces it.
async fn pump_lines<R>(run_id: Uuid, project: String, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                info!(run = %run_id, project = %project, stream, "{}", line);
            }
            Ok(None) => break,
            Err(e) => {
                warn!(run = %run_id, project = %project, stream, "Output stream error: {}", e);
                break;
            }
        }
    }
}
