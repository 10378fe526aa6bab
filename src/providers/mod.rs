//! Outbound model payload types and per-provider capabilities.
//!
//! The runtime stops at the fully assembled, cache-annotated payload; the
//! actual HTTP/SDK transport is a collaborator outside this crate.

pub mod cache;

pub use cache::annotate_payload;

use crate::history::Role;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
    Google,
    Local,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Google => "google",
            Self::Local => "local",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str_opt(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "anthropic" => Some(Self::Anthropic),
            "openai" => Some(Self::OpenAi),
            "google" | "gemini" => Some(Self::Google),
            "local" | "ollama" => Some(Self::Local),
            _ => None,
        }
    }

    pub fn supports_cache_control(self) -> bool {
        matches!(self, Self::Anthropic)
    }

    /// Documented per-provider cap on cache breakpoints in one request.
    pub fn cache_breakpoint_limit(self) -> usize {
        match self {
            Self::Anthropic => 4,
            _ => 0,
        }
    }
}

/// Cache lifetime selection. When unset the provider's implicit default
/// applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CacheTtl {
    #[serde(rename = "5m")]
    Short,
    #[serde(rename = "1h")]
    Long,
}

impl CacheTtl {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Short => "5m",
            Self::Long => "1h",
        }
    }
}

/// A provider cache-breakpoint annotation ("everything up to here is
/// stable").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheControl {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<CacheTtl>,
}

impl CacheControl {
    pub fn ephemeral(ttl: Option<CacheTtl>) -> Self {
        Self {
            kind: "ephemeral",
            ttl,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemPrompt {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

impl SystemPrompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cache_control: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayloadMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

impl PayloadMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            cache_control: None,
        }
    }
}

/// Execution behavior for a tool that runs on the local side.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value>;
}

/// Tool descriptors are an explicit tagged union so that annotating a tool
/// with cache control is a per-kind clone, never reflection over arbitrary
/// runtime objects.
#[derive(Clone)]
pub enum ToolDescriptor {
    /// Runs locally; the handler is shared behavior that must survive
    /// clone-and-annotate unchanged.
    LocalExecutable {
        name: String,
        description: String,
        parameters_schema: serde_json::Value,
        handler: Arc<dyn ToolHandler>,
        cache_control: Option<CacheControl>,
    },
    /// Executes remotely/statelessly; a plain descriptor.
    RemoteNative {
        name: String,
        description: String,
        parameters_schema: serde_json::Value,
        cache_control: Option<CacheControl>,
    },
}

impl ToolDescriptor {
    pub fn name(&self) -> &str {
        match self {
            Self::LocalExecutable { name, .. } | Self::RemoteNative { name, .. } => name,
        }
    }

    pub fn cache_control(&self) -> Option<&CacheControl> {
        match self {
            Self::LocalExecutable { cache_control, .. }
            | Self::RemoteNative { cache_control, .. } => cache_control.as_ref(),
        }
    }

    /// A new descriptor with the annotation attached; behavior is unchanged
    /// (the local handler is carried over by reference).
    pub fn with_cache_control(&self, control: CacheControl) -> Self {
        match self {
            Self::LocalExecutable {
                name,
                description,
                parameters_schema,
                handler,
                ..
            } => Self::LocalExecutable {
                name: name.clone(),
                description: description.clone(),
                parameters_schema: parameters_schema.clone(),
                handler: Arc::clone(handler),
                cache_control: Some(control),
            },
            Self::RemoteNative {
                name,
                description,
                parameters_schema,
                ..
            } => Self::RemoteNative {
                name: name.clone(),
                description: description.clone(),
                parameters_schema: parameters_schema.clone(),
                cache_control: Some(control),
            },
        }
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalExecutable {
                name,
                cache_control,
                ..
            } => f
                .debug_struct("LocalExecutable")
                .field("name", name)
                .field("cache_control", cache_control)
                .finish_non_exhaustive(),
            Self::RemoteNative {
                name,
                cache_control,
                ..
            } => f
                .debug_struct("RemoteNative")
                .field("name", name)
                .field("cache_control", cache_control)
                .finish_non_exhaustive(),
        }
    }
}

/// Everything the transport needs for one model request.
#[derive(Debug, Clone)]
pub struct ModelPayload {
    pub system: SystemPrompt,
    pub messages: Vec<PayloadMessage>,
    pub tools: Vec<ToolDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::{CacheControl, CacheTtl, ProviderKind, ToolDescriptor, ToolHandler};
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct EchoHandler;

    #[async_trait]
    impl ToolHandler for EchoHandler {
        async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value> {
            Ok(args)
        }
    }

    #[test]
    fn provider_ids_parse_case_insensitively() {
        assert_eq!(
            ProviderKind::from_str_opt("Anthropic"),
            Some(ProviderKind::Anthropic)
        );
        assert_eq!(
            ProviderKind::from_str_opt("ollama"),
            Some(ProviderKind::Local)
        );
        assert_eq!(ProviderKind::from_str_opt("unknown"), None);
    }

    #[test]
    fn cache_control_serializes_ephemeral_with_optional_ttl() {
        let bare = serde_json::to_value(CacheControl::ephemeral(None)).unwrap();
        assert_eq!(bare, json!({"type": "ephemeral"}));

        let long = serde_json::to_value(CacheControl::ephemeral(Some(CacheTtl::Long))).unwrap();
        assert_eq!(long, json!({"type": "ephemeral", "ttl": "1h"}));
    }

    #[tokio::test]
    async fn local_tool_annotation_preserves_execution_behavior() {
        let tool = ToolDescriptor::LocalExecutable {
            name: "echo".into(),
            description: "echoes args".into(),
            parameters_schema: json!({"type": "object"}),
            handler: Arc::new(EchoHandler),
            cache_control: None,
        };

        let annotated = tool.with_cache_control(CacheControl::ephemeral(None));
        assert!(annotated.cache_control().is_some());
        assert!(tool.cache_control().is_none());

        let ToolDescriptor::LocalExecutable { handler, .. } = annotated else {
            panic!("annotation must not change the tool kind");
        };
        let out = handler.execute(json!({"k": "v"})).await.unwrap();
        assert_eq!(out, json!({"k": "v"}));
    }
}
