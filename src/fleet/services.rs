//! Collaborator services the fleet controller observes and commands. The
//! runtime never owns task or terminal state; these traits are the full
//! surface it is allowed to touch.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    AwaitingReport,
    Completed,
    Failed,
    Terminated,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::AwaitingReport => "awaiting_report",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Terminated => "terminated",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str_opt(raw: &str) -> Option<Self> {
        match raw {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "awaiting_report" => Some(Self::AwaitingReport),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "terminated" => Some(Self::Terminated),
            _ => None,
        }
    }

    /// Statuses a bulk kill targets.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Queued | Self::Running | Self::AwaitingReport)
    }
}

/// Live statuses, in the order bulk operations enumerate them.
pub const LIVE_TASK_STATUSES: &[TaskStatus] =
    &[TaskStatus::Queued, TaskStatus::Running, TaskStatus::AwaitingReport];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub task_id: String,
    pub title: String,
    pub status: TaskStatus,
    pub created_at: String,
    /// Distance from the scope root; direct children are depth 0.
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalSessionInfo {
    pub id: String,
    pub label: String,
    pub slug: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskTerminationReport {
    /// Every task actually terminated, the requested one and its cascade.
    pub terminated_task_ids: Vec<String>,
}

/// Sub-agent task service. Tasks may have descendants forming a
/// cascade-terminable tree.
#[async_trait]
pub trait TaskService: Send + Sync {
    async fn list_descendant_tasks(
        &self,
        scope: &str,
        statuses: Option<&[TaskStatus]>,
    ) -> Result<Vec<TaskInfo>>;

    async fn terminate_descendant_task(
        &self,
        scope: &str,
        task_id: &str,
    ) -> Result<TaskTerminationReport>;
}

/// PTY-backed terminal session service.
#[async_trait]
pub trait TerminalService: Send + Sync {
    async fn list_sessions(&self, scope: &str) -> Result<Vec<TerminalSessionInfo>>;
    async fn send_input(&self, session_id: &str, bytes: &[u8]) -> Result<()>;
    async fn close(&self, session_id: &str) -> Result<()>;
    async fn session_meta(&self, session_id: &str) -> Result<Option<TerminalSessionInfo>>;
}
