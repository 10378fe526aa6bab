//! Portable transcript export over a frozen history snapshot.
//!
//! Sharing a session must not ship model-internal deliberation, redacted
//! tool output, unbounded logs, or credentials that leaked into tool
//! results. The sanitizer works on a copy; the live history is untouched.

use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;

use crate::config::DEFAULT_EXPORT_MAX_CHARS;
use crate::history::{Message, Part, ToolCallState};
use crate::util::truncate_with_ellipsis;

const REDACTED_OUTPUT_PLACEHOLDER: &str = "[output redacted]";

static CREDENTIAL_KV_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(token|api[_-]?key|password|secret|bearer|credential)(["']?\s*[:=]\s*)["']?([A-Za-z0-9_\-\./+]{8,})["']?"#,
    )
    .unwrap()
});

/// Replace credential-shaped values with a masked placeholder, keeping the
/// key so the transcript stays readable.
pub fn scrub_credentials(input: &str) -> String {
    CREDENTIAL_KV_REGEX
        .replace_all(input, |caps: &regex::Captures| {
            format!("{}{}[REDACTED]", &caps[1], &caps[2])
        })
        .to_string()
}

#[derive(Debug, Clone)]
pub struct SanitizeOptions {
    /// Keep `reasoning` parts in the export. Off by default.
    pub include_reasoning: bool,
    /// Per-block character cap before the truncation marker.
    pub max_text_chars: usize,
    /// Annotate every exported record with this session id.
    pub session_id: Option<String>,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            include_reasoning: false,
            max_text_chars: DEFAULT_EXPORT_MAX_CHARS,
            session_id: None,
        }
    }
}

/// Reduced, privacy-aware copy of the history.
pub fn sanitize_transcript(messages: &[Message], options: &SanitizeOptions) -> Vec<Message> {
    messages
        .iter()
        .map(|message| {
            let mut sanitized = message.clone();
            sanitized.parts = message
                .parts
                .iter()
                .filter_map(|part| sanitize_part(part, options))
                .collect();
            sanitized
        })
        .collect()
}

fn sanitize_part(part: &Part, options: &SanitizeOptions) -> Option<Part> {
    match part {
        Part::Text { text } => Some(Part::Text {
            text: clean_text(text, options),
        }),
        Part::Reasoning { text } => options.include_reasoning.then(|| Part::Reasoning {
            text: clean_text(text, options),
        }),
        Part::DynamicTool {
            tool_name,
            state,
            output,
            nested_calls,
        } => {
            let output = match (state, output) {
                (ToolCallState::OutputRedacted, Some(_)) => {
                    Some(serde_json::Value::String(REDACTED_OUTPUT_PLACEHOLDER.into()))
                }
                (_, Some(value)) => Some(clean_value(value, options)),
                (_, None) => None,
            };
            let nested_calls = nested_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .filter_map(|call| sanitize_part(call, options))
                    .collect()
            });
            Some(Part::DynamicTool {
                tool_name: tool_name.clone(),
                state: *state,
                output,
                nested_calls,
            })
        }
    }
}

fn clean_text(text: &str, options: &SanitizeOptions) -> String {
    scrub_credentials(&truncate_with_ellipsis(text, options.max_text_chars))
}

fn clean_value(value: &serde_json::Value, options: &SanitizeOptions) -> serde_json::Value {
    match value {
        serde_json::Value::String(text) => serde_json::Value::String(clean_text(text, options)),
        serde_json::Value::Array(items) => serde_json::Value::Array(
            items.iter().map(|item| clean_value(item, options)).collect(),
        ),
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), clean_value(item, options)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Sanitized export, one JSON object per line, optionally annotated with the
/// session id.
pub fn export_jsonl(messages: &[Message], options: &SanitizeOptions) -> Result<String> {
    let sanitized = sanitize_transcript(messages, options);
    let mut out = String::new();
    for message in &sanitized {
        let mut value = serde_json::to_value(message)?;
        if let (Some(session_id), Some(object)) =
            (options.session_id.as_deref(), value.as_object_mut())
        {
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

#[cfg(test)]
mod tests {
    use super::{export_jsonl, sanitize_transcript, scrub_credentials, SanitizeOptions};
    use crate::history::{Message, Part, Role, ToolCallState};
    use serde_json::json;

    #[test]
    fn scrub_masks_credential_values_and_keeps_keys() {
        let input = r#"export API_KEY=sk_live_abcdef123456 and token: "ghp_0123456789abcdef""#;
        let out = scrub_credentials(input);
        assert!(!out.contains("sk_live_abcdef123456"));
        assert!(!out.contains("ghp_0123456789abcdef"));
        assert!(out.to_lowercase().contains("api_key"));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn reasoning_is_dropped_by_default_and_kept_on_opt_in() {
        let message = Message::new(
            Role::Assistant,
            vec![
                Part::Reasoning {
                    text: "private thoughts".into(),
                },
                Part::Text {
                    text: "public answer".into(),
                },
            ],
        );

        let default = sanitize_transcript(&[message.clone()], &SanitizeOptions::default());
        assert_eq!(default[0].parts.len(), 1);
        assert_eq!(default[0].text(), "public answer");

        let opted_in = sanitize_transcript(
            &[message],
            &SanitizeOptions {
                include_reasoning: true,
                ..SanitizeOptions::default()
            },
        );
        assert_eq!(opted_in[0].parts.len(), 2);
    }

    #[test]
    fn redacted_tool_output_is_replaced_with_placeholder() {
        let message = Message::new(
            Role::Assistant,
            vec![Part::DynamicTool {
                tool_name: "shell".into(),
                state: ToolCallState::OutputRedacted,
                output: Some(json!({"stdout": "something sensitive"})),
                nested_calls: None,
            }],
        );
        let sanitized = sanitize_transcript(&[message], &SanitizeOptions::default());
        let Part::DynamicTool { output, .. } = &sanitized[0].parts[0] else {
            panic!("tool part must survive");
        };
        assert_eq!(output.as_ref().unwrap(), "[output redacted]");
    }

    #[test]
    fn oversized_tool_output_is_truncated_with_marker() {
        let message = Message::new(
            Role::Assistant,
            vec![Part::DynamicTool {
                tool_name: "shell".into(),
                state: ToolCallState::OutputAvailable,
                output: Some(json!({"stdout": "x".repeat(200)})),
                nested_calls: None,
            }],
        );
        let options = SanitizeOptions {
            max_text_chars: 50,
            ..SanitizeOptions::default()
        };
        let sanitized = sanitize_transcript(&[message], &options);
        let Part::DynamicTool { output, .. } = &sanitized[0].parts[0] else {
            panic!("tool part must survive");
        };
        let stdout = output.as_ref().unwrap()["stdout"].as_str().unwrap();
        assert!(stdout.contains("150 chars truncated"));
    }

    #[test]
    fn export_annotates_lines_with_session_id() {
        let messages = vec![Message::user("hello"), Message::assistant("hi")];
        let options = SanitizeOptions {
            session_id: Some("sess-42".into()),
            ..SanitizeOptions::default()
        };
        let jsonl = export_jsonl(&messages, &options).unwrap();
        assert_eq!(jsonl.lines().count(), 2);
        for line in jsonl.lines() {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["session_id"], "sess-42");
        }
    }

    #[test]
    fn live_history_is_never_mutated() {
        let messages = vec![Message::new(
            Role::Assistant,
            vec![Part::Reasoning {
                text: "keep me in the original".into(),
            }],
        )];
        let _ = sanitize_transcript(&messages, &SanitizeOptions::default());
        assert_eq!(messages[0].parts.len(), 1);
    }
}
