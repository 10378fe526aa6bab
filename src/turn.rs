//! Outbound payload assembly: history snapshot → compaction slice → payload
//! messages → cache planning. This is the path every model request takes.

use crate::history::{slice_messages_from_latest_compaction_boundary, Message, Role};
use crate::providers::{
    annotate_payload, CacheTtl, ModelPayload, PayloadMessage, ProviderKind, SystemPrompt,
    ToolDescriptor,
};

/// Build the cache-annotated payload for one model request. History before
/// the latest durable compaction boundary is not sent; the boundary summary
/// message stands in for it.
pub fn build_model_payload(
    messages: &[Message],
    provider: ProviderKind,
    system_prompt: &str,
    tools: Vec<ToolDescriptor>,
    ttl: Option<CacheTtl>,
) -> ModelPayload {
    let live = slice_messages_from_latest_compaction_boundary(messages);
    if live.len() < messages.len() {
        tracing::debug!(
            sent = live.len(),
            compacted = messages.len() - live.len(),
            "history compacted for outbound request"
        );
    }

    let payload = ModelPayload {
        system: SystemPrompt::new(system_prompt),
        messages: live
            .iter()
            // System turns live in the system prompt slot, not the message
            // list.
            .filter(|message| message.role != Role::System)
            .map(|message| PayloadMessage::new(message.role, message.text()))
            .collect(),
        tools,
    };

    annotate_payload(provider, &payload, ttl)
}
