//! Compaction boundary resolution over a history snapshot.
//!
//! A durable boundary is an assistant message whose metadata passes every
//! sub-check of `Message::is_durable_compaction_boundary`. History read back
//! from disk can carry boundary-shaped junk (legacy un-epoched markers,
//! user-role messages with boundary metadata, corrupt trigger values); the
//! resolver skips those without stopping, so a malformed marker can never
//! shadow the durable boundary beneath it.

use super::Message;

/// Index of the most recent durable compaction boundary, or `None` when no
/// valid boundary exists. Newer boundaries supersede older ones, so this is
/// a single backward scan with early return.
pub fn find_latest_compaction_boundary_index(messages: &[Message]) -> Option<usize> {
    messages
        .iter()
        .enumerate()
        .rev()
        .find(|(_, message)| message.is_durable_compaction_boundary())
        .map(|(index, _)| index)
}

/// The slice of history to send to the model. On a boundary hit the boundary
/// message becomes the head of the payload (it is a self-contained summary of
/// everything before it). When no boundary exists this returns the input
/// slice itself: callers rely on reference equality to detect "no compaction
/// occurred" without a flag or an allocation.
pub fn slice_messages_from_latest_compaction_boundary(messages: &[Message]) -> &[Message] {
    match find_latest_compaction_boundary_index(messages) {
        Some(index) => &messages[index..],
        None => messages,
    }
}
