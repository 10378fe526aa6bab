pub mod compaction;
mod message;
mod store;

pub use compaction::{
    find_latest_compaction_boundary_index, slice_messages_from_latest_compaction_boundary,
};
pub use message::{Message, MessageMetadata, Part, Role, ToolCallState};
pub use store::HistoryStore;
