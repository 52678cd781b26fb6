//! LLM Context
//!
//! `Context` is the single source of truth for the conversation history:
//! `{messages, tools?, tool_choice?}`. Message wire shape follows OpenAI's
//! chat-completions schema (role + string-or-parts content, assistant
//! `tool_calls`, tool `tool_call_id`) per §3.2/§6.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A chunk of message content: either plain text or an OpenAI-style
/// `{type: "text", text}` part. Kept as an enum (not always `Vec<Part>`) so
/// the common "one string" case doesn't require building a one-element
/// vector everywhere a message is constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl Content {
    pub fn text(s: impl Into<String>) -> Self {
        Content::Text(s.into())
    }

    pub fn as_plain_str(&self) -> Option<&str> {
        match self {
            Content::Text(s) => Some(s.as_str()),
            Content::Parts(parts) if parts.len() == 1 && parts[0].kind == "text" => {
                Some(parts[0].text.as_str())
            }
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(s) => s.is_empty(),
            Content::Parts(parts) => parts.iter().all(|p| p.text.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// JSON-encoded arguments string (assembled from streamed fragments).
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ToolCallKind,
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolCallKind {
    #[serde(rename = "function")]
    Function,
}

/// A single turn in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System { content: Content },
    Developer { content: Content },
    User { content: Content },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<Content>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCall>>,
    },
    Tool {
        content: Content,
        tool_call_id: String,
    },
}

impl Message {
    pub fn role(&self) -> &'static str {
        match self {
            Message::System { .. } => "system",
            Message::Developer { .. } => "developer",
            Message::User { .. } => "user",
            Message::Assistant { .. } => "assistant",
            Message::Tool { .. } => "tool",
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Message::User {
            content: Content::text(text),
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Message::Assistant {
            content: Some(Content::Parts(vec![ContentPart {
                kind: "text".to_string(),
                text: text.into(),
            }])),
            tool_calls: None,
        }
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Message::Assistant {
            content: None,
            tool_calls: Some(calls),
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Message::Tool {
            content: Content::text(text),
            tool_call_id: tool_call_id.into(),
        }
    }

    /// Plain-string content, if this message carries one (used by the
    /// same-role merge law — §3.4).
    pub fn plain_content(&self) -> Option<&str> {
        match self {
            Message::System { content }
            | Message::Developer { content }
            | Message::User { content } => content.as_plain_str(),
            Message::Assistant { content: Some(c), .. } => c.as_plain_str(),
            Message::Tool { content, .. } => content.as_plain_str(),
            _ => None,
        }
    }

    fn with_plain_content(&self, text: String) -> Message {
        match self {
            Message::System { .. } => Message::System {
                content: Content::Text(text),
            },
            Message::Developer { .. } => Message::Developer {
                content: Content::Text(text),
            },
            Message::User { .. } => Message::User {
                content: Content::Text(text),
            },
            Message::Assistant { tool_calls, .. } => Message::Assistant {
                content: Some(Content::Text(text)),
                tool_calls: tool_calls.clone(),
            },
            Message::Tool { tool_call_id, .. } => Message::Tool {
                content: Content::Text(text),
                tool_call_id: tool_call_id.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    /// Forces a specific named function (§3.2: `{function: name}`).
    Function { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub kind: ToolCallKind,
    pub function: FunctionDef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
    /// Node the scenario manager should move to once this tool's handler
    /// returns (§3.3). Not serialized — a server-local wiring detail.
    #[serde(skip)]
    pub transition_to: Option<String>,
}

/// The authoritative conversation state: append-only from the consumer's
/// point of view, replaced wholesale per update by its owning aggregator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Context {
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, applying the same-role merge law (§3.4): if the
    /// new message and the current last message share a role and both have
    /// plain-string content, they are merged into one message separated by
    /// a space instead of appended as two.
    pub fn append(&self, message: Message) -> Context {
        let mut messages = self.messages.clone();
        if let (Some(last), Some(new_text)) = (messages.last(), message.plain_content()) {
            if last.role() == message.role() {
                if let Some(last_text) = last.plain_content() {
                    let merged = format!("{last_text} {new_text}");
                    let idx = messages.len() - 1;
                    messages[idx] = last.with_plain_content(merged);
                    return Context {
                        messages,
                        tools: self.tools.clone(),
                        tool_choice: self.tool_choice.clone(),
                    };
                }
            }
        }
        messages.push(message);
        Context {
            messages,
            tools: self.tools.clone(),
            tool_choice: self.tool_choice.clone(),
        }
    }

    pub fn append_all(&self, new_messages: impl IntoIterator<Item = Message>) -> Context {
        new_messages
            .into_iter()
            .fold(self.clone(), |ctx, m| ctx.append(m))
    }
}

/// Shared handle to a registered tool's server-local handler.
pub type ToolHandler = Arc<
    dyn Fn(serde_json::Value) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<serde_json::Value, String>> + Send>>
        + Send
        + Sync,
>;

/// A tool as registered with the dispatcher: its wire definition plus the
/// server-local handler and optional scenario transition callback (§3.3).
#[derive(Clone)]
pub struct RegisteredTool {
    pub def: ToolDef,
    pub handler: ToolHandler,
    pub transition_to: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_law_same_role_plain_text() {
        let ctx = Context::new().append(Message::user("hel")).append(Message::user("lo"));
        assert_eq!(ctx.messages.len(), 1);
        assert_eq!(ctx.messages[0].plain_content(), Some("hel lo"));
    }

    #[test]
    fn merge_law_different_roles_appends() {
        let ctx = Context::new()
            .append(Message::user("hi"))
            .append(Message::assistant_text("hello"));
        assert_eq!(ctx.messages.len(), 2);
    }

    #[test]
    fn tool_choice_function_round_trips_through_json() {
        let choice = ToolChoice::Function { name: "lookup_order".to_string() };
        let value = serde_json::to_value(&choice).unwrap();
        assert_eq!(value, serde_json::json!({"function": {"name": "lookup_order"}}));
        let back: ToolChoice = serde_json::from_value(value).unwrap();
        assert_eq!(back, choice);
    }

    #[test]
    fn merge_law_generalizes_arbitrary_pair() {
        // Property 3: for any c, m1, m2 with same role + plain content.
        for (a, b) in [("foo", "bar"), ("", "x"), ("x", "")] {
            let ctx = Context::new().append(Message::user(a)).append(Message::user(b));
            assert_eq!(ctx.messages.last().unwrap().plain_content(), Some(format!("{a} {b}")).as_deref());
        }
    }
}
