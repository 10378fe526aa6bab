//! End-to-end session runtime flow: append history, compact, build the
//! outbound payload, background a shell on a new user message, and tear the
//! fleet down.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use longspur::fleet::{
    FleetController, KillTarget, TaskInfo, TaskService, TaskStatus, TaskTerminationReport,
    TerminalService, TerminalSessionInfo,
};
use longspur::{
    build_model_payload, BackgroundProcess, BackgroundProcessLedger, HistoryStore, Message,
    ProcessService, ProcessStatus, ProviderKind, RuntimeConfig,
};

struct StaticProcessService {
    processes: Mutex<Vec<BackgroundProcess>>,
}

#[async_trait]
impl ProcessService for StaticProcessService {
    async fn snapshot(&self, _session_id: &str) -> Result<Vec<BackgroundProcess>> {
        Ok(self.processes.lock().clone())
    }

    async fn terminate(&self, process_id: &str) -> Result<()> {
        let mut processes = self.processes.lock();
        if let Some(process) = processes.iter_mut().find(|p| p.id == process_id) {
            process.status = ProcessStatus::Killed;
        }
        Ok(())
    }
}

struct StaticFleetServices {
    tasks: Vec<TaskInfo>,
    sessions: Vec<TerminalSessionInfo>,
}

#[async_trait]
impl TaskService for StaticFleetServices {
    async fn list_descendant_tasks(
        &self,
        _scope: &str,
        statuses: Option<&[TaskStatus]>,
    ) -> Result<Vec<TaskInfo>> {
        Ok(self
            .tasks
            .iter()
            .filter(|t| statuses.map_or(true, |s| s.contains(&t.status)))
            .cloned()
            .collect())
    }

    async fn terminate_descendant_task(
        &self,
        _scope: &str,
        task_id: &str,
    ) -> Result<TaskTerminationReport> {
        // The researcher task carries one descendant in its cascade.
        let terminated_task_ids = if task_id == "task-researcher" {
            vec!["task-researcher".to_string(), "task-researcher-sub".to_string()]
        } else {
            vec![task_id.to_string()]
        };
        Ok(TaskTerminationReport {
            terminated_task_ids,
        })
    }
}

#[async_trait]
impl TerminalService for StaticFleetServices {
    async fn list_sessions(&self, _scope: &str) -> Result<Vec<TerminalSessionInfo>> {
        Ok(self.sessions.clone())
    }

    async fn send_input(&self, _session_id: &str, _bytes: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn close(&self, _session_id: &str) -> Result<()> {
        Ok(())
    }

    async fn session_meta(&self, session_id: &str) -> Result<Option<TerminalSessionInfo>> {
        Ok(self.sessions.iter().find(|s| s.id == session_id).cloned())
    }
}

fn fleet_services() -> Arc<StaticFleetServices> {
    Arc::new(StaticFleetServices {
        tasks: vec![
            TaskInfo {
                task_id: "task-researcher".to_string(),
                title: "research the failure".to_string(),
                status: TaskStatus::Running,
                created_at: "2026-01-01T00:00:00Z".to_string(),
                depth: 0,
            },
            TaskInfo {
                task_id: "task-fixer".to_string(),
                title: "apply the fix".to_string(),
                status: TaskStatus::Queued,
                created_at: "2026-01-01T00:01:00Z".to_string(),
                depth: 0,
            },
        ],
        sessions: vec![TerminalSessionInfo {
            id: "pty-repl".to_string(),
            label: "dev repl".to_string(),
            slug: "dev-repl".to_string(),
            created_at: "2026-01-01T00:02:00Z".to_string(),
        }],
    })
}

#[tokio::test]
async fn history_compaction_and_payload_assembly_round_trip() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("history.jsonl");

    {
        let store = HistoryStore::open(&path).unwrap();
        store.append(Message::user("old question")).unwrap();
        store.append(Message::assistant("old answer")).unwrap();
        store
            .append(Message::compaction_summary("summary of the above", 1, "user"))
            .unwrap();
        store.append(Message::user("new question")).unwrap();
    }

    // Reopen from disk: the durable boundary survives the JSONL round trip.
    let store = HistoryStore::open(&path).unwrap();
    let messages = store.messages();
    assert_eq!(messages.len(), 4);

    let payload = build_model_payload(
        &messages,
        ProviderKind::Anthropic,
        "you are a coding agent",
        Vec::new(),
        None,
    );
    assert_eq!(payload.messages.len(), 2);
    assert_eq!(payload.messages[0].content, "summary of the above");
    assert!(payload.system.cache_control.is_some());
    assert!(payload.messages.last().unwrap().cache_control.is_some());
}

#[tokio::test]
async fn new_user_message_backgrounds_running_shell_and_feed_reports_it() {
    let service = Arc::new(StaticProcessService {
        processes: Mutex::new(vec![BackgroundProcess {
            id: "proc-build".to_string(),
            status: ProcessStatus::Running,
            tool_call_id: "call-build".to_string(),
        }]),
    });
    let ledger = BackgroundProcessLedger::new(
        "sess-main",
        Arc::clone(&service) as Arc<dyn ProcessService>,
        &RuntimeConfig::default(),
    );

    ledger.register_foreground("call-build");
    ledger.refresh().await.unwrap();

    let cancel = CancellationToken::new();
    let feed = ledger.subscribe(cancel.clone());
    assert_eq!(feed.current().foreground_tool_call_ids, vec!["call-build"]);

    // The user keeps typing: the running shell detaches rather than blocking
    // the conversation.
    ledger.on_message_sent();
    let snapshot = feed.current();
    assert!(snapshot.foreground_tool_call_ids.is_empty());
    assert_eq!(snapshot.processes.len(), 1);

    // Terminating reflects immediately and reconciles once the service
    // confirms.
    ledger.terminate("proc-build").await.unwrap();
    assert!(feed.current().processes.is_empty());
    ledger.refresh().await.unwrap();
    let confirmed = feed.current();
    assert_eq!(confirmed.processes.len(), 1);
    assert_eq!(confirmed.processes[0].status, ProcessStatus::Killed);

    cancel.cancel();
}

#[tokio::test]
async fn fleet_kill_all_reports_cascades_and_prefixed_pty() {
    let services = fleet_services();
    let fleet = FleetController::new(
        "sess-main",
        Arc::clone(&services) as Arc<dyn TaskService>,
        Arc::clone(&services) as Arc<dyn TerminalService>,
        &RuntimeConfig::default(),
    )
    .unwrap();

    let agents = fleet.list().await.unwrap();
    assert_eq!(agents.len(), 3);
    assert!(agents.iter().any(|a| a.id == "sess:pty-repl"));

    let outcome = fleet.kill(KillTarget::All).await.unwrap();
    assert!(outcome.success());
    assert!(outcome.killed.len() >= 4);
    assert!(outcome.killed.contains(&"task-researcher".to_string()));
    assert!(outcome.killed.contains(&"task-researcher-sub".to_string()));
    assert!(outcome.killed.contains(&"task-fixer".to_string()));
    assert!(outcome.killed.contains(&"sess:pty-repl".to_string()));
}

#[tokio::test]
async fn steering_a_task_is_rejected_steering_a_pty_succeeds() {
    let services = fleet_services();
    let config = RuntimeConfig {
        steer_grace_ms: 1,
        ..RuntimeConfig::default()
    };
    let fleet = FleetController::new(
        "sess-main",
        Arc::clone(&services) as Arc<dyn TaskService>,
        Arc::clone(&services) as Arc<dyn TerminalService>,
        &config,
    )
    .unwrap();

    let err = fleet
        .steer("task-researcher", "stop researching", true)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("autonomously"));

    fleet
        .steer("sess:pty-repl", "cargo check", true)
        .await
        .unwrap();
}
