//! Fleet controller: one addressable namespace over everything a session has
//! spawned (sub-agent tasks and PTY-backed terminal sessions) with
//! list/kill/steer semantics.
//!
//! - **list**: merged view of the task tree and the terminal sessions.
//! - **kill**: a task id cascades through its descendants; a PTY id is a
//!   direct close. Bulk kill tolerates partial failure.
//! - **steer**: PTY-only redirection; tasks run autonomously and cannot be
//!   redirected mid-flight.
//!
//! PTY entries are addressed as `sess:<id>`; bare ids are task ids.

mod services;

pub use services::{
    TaskInfo, TaskService, TaskStatus, TaskTerminationReport, TerminalService,
    TerminalSessionInfo, LIVE_TASK_STATUSES,
};

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RuntimeConfig;

/// Id prefix distinguishing PTY-backed fleet entries from task ids.
pub const PTY_ID_PREFIX: &str = "sess:";

/// Interrupt byte injected before steering (^C).
const INTERRUPT_BYTE: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FleetAgentKind {
    Task,
    PtySession,
}

impl FleetAgentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::PtySession => "pty",
        }
    }
}

/// Unified view of one spawned agent, derived at query time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetAgent {
    pub id: String,
    pub kind: FleetAgentKind,
    pub label: String,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillTarget {
    All,
    Id(String),
}

impl KillTarget {
    /// `"all"` is the bulk sentinel; anything else is a specific id.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("all") {
            Self::All
        } else {
            Self::Id(raw.trim().to_string())
        }
    }
}

/// Result of a kill request. Partial failure is tolerated: `errors` maps each
/// failed target to its error while `killed` lists everything actually
/// removed (cascades included, `sess:` prefixes preserved).
#[derive(Debug, Clone, Default)]
pub struct KillOutcome {
    pub killed: Vec<String>,
    pub errors: BTreeMap<String, String>,
}

impl KillOutcome {
    /// True iff at least one target was killed or there were no errors at
    /// all.
    pub fn success(&self) -> bool {
        !self.killed.is_empty() || self.errors.is_empty()
    }
}

pub struct FleetController {
    scope: String,
    tasks: Arc<dyn TaskService>,
    terminals: Arc<dyn TerminalService>,
    steer_grace: Duration,
}

impl FleetController {
    pub fn new(
        scope: impl Into<String>,
        tasks: Arc<dyn TaskService>,
        terminals: Arc<dyn TerminalService>,
        config: &RuntimeConfig,
    ) -> Result<Self> {
        let scope = scope.into();
        if scope.trim().is_empty() {
            bail!("Fleet controller requires a session scope id");
        }
        Ok(Self {
            scope,
            tasks,
            terminals,
            steer_grace: config.steer_grace(),
        })
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Merged fleet view: descendant tasks first, then terminal sessions
    /// with the `sess:` prefix applied.
    pub async fn list(&self) -> Result<Vec<FleetAgent>> {
        let tasks = self
            .tasks
            .list_descendant_tasks(&self.scope, None)
            .await
            .context("Failed to list descendant tasks")?;
        let sessions = self
            .terminals
            .list_sessions(&self.scope)
            .await
            .context("Failed to list terminal sessions")?;

        let mut agents = Vec::with_capacity(tasks.len() + sessions.len());
        for task in tasks {
            agents.push(FleetAgent {
                id: task.task_id,
                kind: FleetAgentKind::Task,
                label: task.title,
                status: task.status.as_str().to_string(),
                created_at: task.created_at,
            });
        }
        for session in sessions {
            agents.push(FleetAgent {
                id: format!("{PTY_ID_PREFIX}{}", session.id),
                kind: FleetAgentKind::PtySession,
                label: if session.label.is_empty() {
                    session.slug
                } else {
                    session.label
                },
                status: "running".to_string(),
                created_at: session.created_at,
            });
        }
        Ok(agents)
    }

    /// Kill one target or the whole fleet. Never aborts the batch on a
    /// single failure.
    pub async fn kill(&self, target: KillTarget) -> Result<KillOutcome> {
        let mut outcome = KillOutcome::default();
        match target {
            KillTarget::Id(id) => {
                if let Some(session_id) = id.strip_prefix(PTY_ID_PREFIX) {
                    self.kill_pty(session_id, &mut outcome).await;
                } else {
                    self.kill_task(&id, &mut outcome).await;
                }
            }
            KillTarget::All => {
                let tasks = self
                    .tasks
                    .list_descendant_tasks(&self.scope, Some(LIVE_TASK_STATUSES))
                    .await
                    .context("Failed to list live tasks for bulk kill")?;
                for task in tasks {
                    // A cascade from an earlier parent may have taken this
                    // task down already; don't terminate (or report) twice.
                    if outcome.killed.contains(&task.task_id) {
                        continue;
                    }
                    self.kill_task(&task.task_id, &mut outcome).await;
                }

                match self.terminals.list_sessions(&self.scope).await {
                    Ok(sessions) => {
                        for session in sessions {
                            self.kill_pty(&session.id, &mut outcome).await;
                        }
                    }
                    Err(err) => {
                        outcome
                            .errors
                            .insert(format!("{PTY_ID_PREFIX}*"), err.to_string());
                    }
                }
            }
        }
        Ok(outcome)
    }

    /// Redirect a PTY-backed agent. Task-backed targets are rejected before
    /// any service call: task isolation is a correctness boundary.
    pub async fn steer(&self, target: &str, message: &str, interrupt: bool) -> Result<()> {
        let Some(session_id) = target.strip_prefix(PTY_ID_PREFIX) else {
            bail!(
                "Cannot steer '{target}': only PTY sessions ({PTY_ID_PREFIX}<id>) accept \
                 redirection; tasks run autonomously"
            );
        };
        if session_id.trim().is_empty() {
            bail!("Cannot steer: empty PTY session id");
        }

        if interrupt {
            self.terminals
                .send_input(session_id, &[INTERRUPT_BYTE])
                .await
                .with_context(|| format!("Failed to interrupt PTY session {session_id}"))?;
            // Give the process time to observably stop before new input.
            tokio::time::sleep(self.steer_grace).await;
        }

        let mut directive = message.to_string();
        if !directive.ends_with('\n') {
            directive.push('\n');
        }
        self.terminals
            .send_input(session_id, directive.as_bytes())
            .await
            .with_context(|| format!("Failed to steer PTY session {session_id}"))?;
        tracing::info!(session_id, interrupt, "steered PTY session");
        Ok(())
    }

    async fn kill_task(&self, task_id: &str, outcome: &mut KillOutcome) {
        match self
            .tasks
            .terminate_descendant_task(&self.scope, task_id)
            .await
        {
            Ok(report) => {
                for terminated in report.terminated_task_ids {
                    if !outcome.killed.contains(&terminated) {
                        outcome.killed.push(terminated);
                    }
                }
            }
            Err(err) => {
                outcome.errors.insert(task_id.to_string(), err.to_string());
            }
        }
    }

    async fn kill_pty(&self, session_id: &str, outcome: &mut KillOutcome) {
        let fleet_id = format!("{PTY_ID_PREFIX}{session_id}");
        match self.terminals.close(session_id).await {
            Ok(()) => outcome.killed.push(fleet_id),
            Err(err) => {
                outcome.errors.insert(fleet_id, err.to_string());
            }
        }
    }
}
