//! longspur: agent session runtime.
//!
//! One session is a conversation plus everything it spawned. This crate keeps
//! the conversation history consistent ([`history`]), decides what history is
//! sent to the model ([`history::compaction`], [`providers::cache`],
//! [`turn`]), and manages the concurrent lifecycle of spawned work: background
//! shell commands ([`ledger`]) and the unified task/PTY fleet ([`fleet`]).
//! [`transcript`] produces portable, privacy-aware exports of a frozen
//! history.
//!
//! Model transport, UI rendering, and checkout/login plumbing are external
//! collaborators behind the traits in [`ledger`] and [`fleet`].

pub mod config;
pub mod fleet;
pub mod history;
pub mod ledger;
pub mod providers;
pub mod transcript;
pub mod turn;
pub mod util;

pub use config::RuntimeConfig;
pub use fleet::{FleetAgent, FleetAgentKind, FleetController, KillOutcome, KillTarget};
pub use history::{
    find_latest_compaction_boundary_index, slice_messages_from_latest_compaction_boundary,
    HistoryStore, Message, MessageMetadata, Part, Role, ToolCallState,
};
pub use ledger::{
    BackgroundProcess, BackgroundProcessLedger, LedgerFeed, LedgerSnapshot, ProcessService,
    ProcessStatus,
};
pub use providers::{
    annotate_payload, CacheControl, CacheTtl, ModelPayload, PayloadMessage, ProviderKind,
    SystemPrompt, ToolDescriptor, ToolHandler,
};
pub use transcript::{export_jsonl, sanitize_transcript, SanitizeOptions};
pub use turn::build_model_payload;
