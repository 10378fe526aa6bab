//! Append-ordered record of a session's messages.
//!
//! The store is the ground truth for message order: `append` assigns the next
//! `history_sequence` and never mutates one once assigned. Persistence is an
//! append-only log, one JSON object per line; corrupt lines are skipped on
//! replay, never fatal.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use super::Message;

pub struct HistoryStore {
    inner: Mutex<StoreInner>,
}

struct StoreInner {
    messages: Vec<Message>,
    next_sequence: u64,
    log: Option<File>,
}

impl HistoryStore {
    /// Unpersisted store for ephemeral sessions and tests.
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                messages: Vec::new(),
                next_sequence: 1,
                log: None,
            }),
        }
    }

    /// Open a file-backed store, replaying any existing log. Lines that fail
    /// to parse are skipped with a warning so a partially-written tail never
    /// blocks a session from loading.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create history directory: {}", parent.display())
            })?;
        }

        let mut messages = Vec::new();
        if path.exists() {
            messages = Self::replay(&path)?;
        }
        let next_sequence = messages
            .iter()
            .filter_map(|m| m.metadata.history_sequence)
            .max()
            .map_or(1, |max| max + 1);

        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open history log: {}", path.display()))?;

        Ok(Self {
            inner: Mutex::new(StoreInner {
                messages,
                next_sequence,
                log: Some(log),
            }),
        })
    }

    fn replay(path: &Path) -> Result<Vec<Message>> {
        let file = File::open(path)
            .with_context(|| format!("Failed to read history log: {}", path.display()))?;
        let mut messages = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line
                .with_context(|| format!("Failed to read history log: {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(&line) {
                Ok(message) => messages.push(message),
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        line = line_no + 1,
                        error = %err,
                        "Skipping corrupt history record"
                    );
                }
            }
        }
        Ok(messages)
    }

    /// Append a message, assigning the next `history_sequence` and a
    /// timestamp when the caller did not set one. Returns the message as
    /// stored. Appends are serialized; the lock is the single writer.
    pub fn append(&self, mut message: Message) -> Result<Message> {
        let mut inner = self.inner.lock();
        message.metadata.history_sequence = Some(inner.next_sequence);
        inner.next_sequence += 1;
        if message.metadata.timestamp.is_none() {
            message.metadata.timestamp = Some(chrono::Utc::now());
        }

        if let Some(log) = inner.log.as_mut() {
            let line = serde_json::to_string(&message)?;
            log.write_all(line.as_bytes())
                .and_then(|()| log.write_all(b"\n"))
                .context("Failed to append history record")?;
        }

        inner.messages.push(message.clone());
        Ok(message)
    }

    /// Full ordered history snapshot.
    pub fn messages(&self) -> Vec<Message> {
        self.inner.lock().messages.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the history one JSON object per line, each record optionally
    /// annotated with the owning session id.
    pub fn export_jsonl(&self, session_id: Option<&str>) -> Result<String> {
        let messages = self.messages();
        let mut out = String::new();
        for message in &messages {
            let mut value = serde_json::to_value(message)?;
            if let (Some(session_id), Some(object)) = (session_id, value.as_object_mut()) {
                object.insert(
                    "session_id".to_string(),
                    serde_json::Value::String(session_id.to_string()),
                );
            }
            out.push_str(&serde_json::to_string(&value)?);
            out.push('\n');
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::HistoryStore;
    use crate::history::Message;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn append_assigns_strictly_increasing_sequences() {
        let store = HistoryStore::in_memory();
        let first = store.append(Message::user("one")).unwrap();
        let second = store.append(Message::assistant("two")).unwrap();
        assert_eq!(first.metadata.history_sequence, Some(1));
        assert_eq!(second.metadata.history_sequence, Some(2));
        assert!(second.metadata.timestamp.is_some());
    }

    #[test]
    fn open_replays_log_and_continues_sequence() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("history.jsonl");

        {
            let store = HistoryStore::open(&path).unwrap();
            store.append(Message::user("hello")).unwrap();
            store.append(Message::assistant("hi")).unwrap();
        }

        let reopened = HistoryStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        let appended = reopened.append(Message::user("again")).unwrap();
        assert_eq!(appended.metadata.history_sequence, Some(3));
    }

    #[test]
    fn replay_skips_corrupt_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("history.jsonl");

        {
            let store = HistoryStore::open(&path).unwrap();
            store.append(Message::user("kept")).unwrap();
        }
        let mut raw = fs::read_to_string(&path).unwrap();
        raw.push_str("{not json\n");
        fs::write(&path, raw).unwrap();

        let reopened = HistoryStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.messages()[0].text(), "kept");
    }

    #[test]
    fn export_annotates_records_with_session_id() {
        let store = HistoryStore::in_memory();
        store.append(Message::user("hello")).unwrap();

        let plain = store.export_jsonl(None).unwrap();
        assert!(!plain.contains("session_id"));

        let annotated = store.export_jsonl(Some("sess-1")).unwrap();
        for line in annotated.lines() {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["session_id"], "sess-1");
        }
    }
}
