//! Background process ledger: tracks shell commands that started attached to
//! a visible tool call ("foreground") and may be detached ("background"),
//! independent of the turn that spawned them.
//!
//! The ledger owns no process state of its own; the process service is
//! authoritative. It layers two things on top of the service's view:
//! foreground bookkeeping per tool call, and an optimistic
//! pending-termination overlay so a terminate request is reflected in the
//! feed immediately and the process never flickers back "alive" between the
//! request and the service reporting it gone.
//!
//! One ledger instance per session, constructed and discarded by the
//! session's owner.

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;

use crate::config::RuntimeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Running,
    Exited,
    Killed,
    Failed,
}

impl ProcessStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Exited => "exited",
            Self::Killed => "killed",
            Self::Failed => "failed",
        }
    }

    /// Terminal states are absorbing.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// A shell execution detached (or detachable) from its originating tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundProcess {
    pub id: String,
    pub status: ProcessStatus,
    pub tool_call_id: String,
}

/// Authoritative owner of the session's shell processes.
#[async_trait]
pub trait ProcessService: Send + Sync {
    async fn snapshot(&self, session_id: &str) -> Result<Vec<BackgroundProcess>>;
    async fn terminate(&self, process_id: &str) -> Result<()>;
}

/// One published state of the ledger feed. `version` increases with every
/// published change; consumers must drop anything older than what they have
/// already applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerSnapshot {
    pub version: u64,
    pub processes: Vec<BackgroundProcess>,
    pub foreground_tool_call_ids: Vec<String>,
}

/// A live subscription to ledger snapshots, bound to a cancellation token.
/// `next` returns `None` once the token fires or the ledger is dropped, and
/// dropping the feed releases the underlying receiver.
pub struct LedgerFeed {
    receiver: watch::Receiver<LedgerSnapshot>,
    cancel: CancellationToken,
}

impl LedgerFeed {
    pub async fn next(&mut self) -> Option<LedgerSnapshot> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            changed = self.receiver.changed() => match changed {
                Ok(()) => Some(self.receiver.borrow_and_update().clone()),
                Err(_) => None,
            },
        }
    }

    /// Latest snapshot without waiting for a change.
    pub fn current(&self) -> LedgerSnapshot {
        self.receiver.borrow().clone()
    }
}

struct LedgerState {
    session_id: String,
    processes: Vec<BackgroundProcess>,
    foreground_tool_call_ids: Vec<String>,
    pending_termination: HashSet<String>,
    version: u64,
}

impl LedgerState {
    fn new(session_id: String) -> Self {
        Self {
            session_id,
            processes: Vec::new(),
            foreground_tool_call_ids: Vec::new(),
            pending_termination: HashSet::new(),
            version: 0,
        }
    }

    /// The view consumers see: a process marked pending-termination is
    /// already absent while it is still reported running underneath.
    fn visible_processes(&self) -> Vec<BackgroundProcess> {
        self.processes
            .iter()
            .filter(|p| !self.pending_termination.contains(&p.id))
            .cloned()
            .collect()
    }
}

pub struct BackgroundProcessLedger {
    service: Arc<dyn ProcessService>,
    state: Mutex<LedgerState>,
    feed: watch::Sender<LedgerSnapshot>,
    refresh_notify: Notify,
    poll_interval: Duration,
}

impl BackgroundProcessLedger {
    pub fn new(
        session_id: impl Into<String>,
        service: Arc<dyn ProcessService>,
        config: &RuntimeConfig,
    ) -> Self {
        let (feed, _) = watch::channel(LedgerSnapshot::default());
        Self {
            service,
            state: Mutex::new(LedgerState::new(session_id.into())),
            feed,
            refresh_notify: Notify::new(),
            poll_interval: config.ledger_poll_interval(),
        }
    }

    pub fn session_id(&self) -> String {
        self.state.lock().session_id.clone()
    }

    /// Subscribe to the snapshot feed. The subscription lives until `cancel`
    /// fires or the feed struct is dropped.
    pub fn subscribe(&self, cancel: CancellationToken) -> LedgerFeed {
        LedgerFeed {
            receiver: self.feed.subscribe(),
            cancel,
        }
    }

    /// A tool call spawned a shell command that is still attached to it.
    pub fn register_foreground(&self, tool_call_id: impl Into<String>) {
        let tool_call_id = tool_call_id.into();
        {
            let mut state = self.state.lock();
            if !state.foreground_tool_call_ids.contains(&tool_call_id) {
                state.foreground_tool_call_ids.push(tool_call_id);
            }
        }
        self.publish_if_changed();
    }

    /// Explicitly detach one tool call's command. Detaching an id that is no
    /// longer foreground (the command finished first) is a no-op: that race
    /// is expected and non-fatal.
    pub fn send_to_background(&self, tool_call_id: &str) {
        {
            let mut state = self.state.lock();
            state
                .foreground_tool_call_ids
                .retain(|id| id != tool_call_id);
        }
        self.publish_if_changed();
    }

    /// A new user message was sent: every currently-foreground command is
    /// detached so the conversation never blocks on a running shell.
    /// Idempotent under repeated calls.
    pub fn on_message_sent(&self) {
        let detached = {
            let mut state = self.state.lock();
            let detached = state.foreground_tool_call_ids.len();
            state.foreground_tool_call_ids.clear();
            detached
        };
        if detached > 0 {
            tracing::debug!(detached, "auto-backgrounded foreground tool calls");
        }
        self.publish_if_changed();
    }

    /// Terminate a background process. The pending marker is set before the
    /// service call so the feed reflects the request immediately; it is
    /// rolled back on failure and otherwise held until the service's own
    /// state reports the process gone.
    pub async fn terminate(&self, process_id: &str) -> Result<()> {
        {
            let mut state = self.state.lock();
            let Some(process) = state.processes.iter().find(|p| p.id == process_id) else {
                bail!("Unknown background process: {process_id}");
            };
            if process.status.is_terminal() {
                // Already gone; nothing to terminate.
                return Ok(());
            }
            state.pending_termination.insert(process_id.to_string());
        }
        self.publish_if_changed();

        match self.service.terminate(process_id).await {
            Ok(()) => {
                self.refresh_notify.notify_waiters();
                Ok(())
            }
            Err(err) => {
                // Roll back the optimistic marker so the caller can retry.
                self.state.lock().pending_termination.remove(process_id);
                self.publish_if_changed();
                Err(err)
            }
        }
    }

    /// Pull the authoritative process view and reconcile the overlay:
    /// pending markers for processes no longer running are cleared.
    pub async fn refresh(&self) -> Result<()> {
        let session_id = self.session_id();
        let processes = self.service.snapshot(&session_id).await?;
        {
            let mut state = self.state.lock();
            // The session may have been switched while the snapshot was in
            // flight; a stale snapshot must not resurrect discarded state.
            if state.session_id != session_id {
                return Ok(());
            }
            state.pending_termination.retain(|id| {
                processes
                    .iter()
                    .any(|p| p.id == *id && p.status == ProcessStatus::Running)
            });
            state.processes = processes;
        }
        self.publish_if_changed();
        Ok(())
    }

    /// Periodic reconciliation loop. Exits cleanly when `cancel` fires;
    /// `terminate` nudges it so confirmations land before the next tick.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = self.refresh_notify.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
            if let Err(err) = self.refresh().await {
                tracing::warn!(error = %err, "ledger refresh failed");
            }
        }
    }

    /// Scope the ledger to a different session, discarding all current
    /// process/foreground/pending state.
    pub fn switch_session(&self, session_id: impl Into<String>) {
        {
            let mut state = self.state.lock();
            let version = state.version;
            *state = LedgerState::new(session_id.into());
            state.version = version;
        }
        self.publish_if_changed();
    }

    /// Publish a new snapshot only when membership actually changed: same
    /// length and same members (order-insensitive) means no downstream work.
    fn publish_if_changed(&self) {
        let mut state = self.state.lock();
        let current = self.feed.borrow();
        let processes = state.visible_processes();
        let foreground = state.foreground_tool_call_ids.clone();
        if same_membership(&current.processes, &processes)
            && same_ids(&current.foreground_tool_call_ids, &foreground)
        {
            return;
        }
        drop(current);
        state.version += 1;
        let snapshot = LedgerSnapshot {
            version: state.version,
            processes,
            foreground_tool_call_ids: foreground,
        };
        // Send unconditionally; receivers may come and go.
        self.feed.send_replace(snapshot);
    }
}

fn same_membership(a: &[BackgroundProcess], b: &[BackgroundProcess]) -> bool {
    a.len() == b.len() && a.iter().all(|p| b.contains(p))
}

fn same_ids(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().all(|id| b.contains(id))
}
