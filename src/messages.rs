//! Conversation payload types.
//!
//! The caller owns the history and sends all of it every turn. These types
//! mirror what a chat front end posts, and are converted into chat-completion
//! request messages right before the first model call.

use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AgentError;
use crate::provider::tool_call;
use crate::tools::ToolOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// One piece of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        output: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub parts: Vec<MessagePart>,
}

impl ConversationMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![MessagePart::Text { text: text.into() }],
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            parts: vec![MessagePart::Text { text: text.into() }],
        }
    }

    /// Assistant message for one step: optional text followed by its tool calls.
    pub fn assistant_step(text: Option<&str>, calls: &[ChatCompletionMessageToolCall]) -> Self {
        let mut parts = Vec::with_capacity(calls.len() + 1);
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            parts.push(MessagePart::Text {
                text: text.to_string(),
            });
        }
        parts.extend(calls.iter().map(|c| MessagePart::ToolCall {
            tool_call_id: c.id.clone(),
            tool_name: c.function.name.clone(),
            input: serde_json::from_str(&c.function.arguments)
                .unwrap_or_else(|_| Value::String(c.function.arguments.clone())),
        }));
        Self {
            role: Role::Assistant,
            parts,
        }
    }

    /// Tool message carrying the results of one step, in call order.
    pub fn tool_results(results: &[ToolOutput]) -> Self {
        Self {
            role: Role::Tool,
            parts: results
                .iter()
                .map(|r| MessagePart::ToolResult {
                    tool_call_id: r.id.clone(),
                    tool_name: r.name.clone(),
                    output: r.to_value(),
                })
                .collect(),
        }
    }

    /// Concatenated text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    fn check(&self, index: usize) -> Result<(), AgentError> {
        let invalid = |message: &str| AgentError::InvalidMessage {
            index,
            message: message.to_string(),
        };
        if self.parts.is_empty() {
            return Err(invalid("message has no parts"));
        }
        for part in &self.parts {
            let allowed = matches!(
                (self.role, part),
                (Role::User, MessagePart::Text { .. })
                    | (Role::Assistant, MessagePart::Text { .. })
                    | (Role::Assistant, MessagePart::ToolCall { .. })
                    | (Role::Tool, MessagePart::ToolResult { .. })
            );
            if !allowed {
                return Err(invalid(match self.role {
                    Role::User => "user messages may only contain text",
                    Role::Assistant => "assistant messages may only contain text and tool calls",
                    Role::Tool => "tool messages may only contain tool results",
                }));
            }
        }
        Ok(())
    }
}

/// Build request messages: the system prompt followed by the converted history.
///
/// The whole history is validated before anything is converted.
pub fn to_request_messages(
    system: &str,
    history: &[ConversationMessage],
) -> Result<Vec<ChatCompletionRequestMessage>, AgentError> {
    for (index, msg) in history.iter().enumerate() {
        msg.check(index)?;
    }

    let mut out: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(history.len() + 1);
    out.push(
        ChatCompletionRequestSystemMessageArgs::default()
            .content(system)
            .build()?
            .into(),
    );

    for msg in history {
        match msg.role {
            Role::User => out.push(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(msg.text())
                    .build()?
                    .into(),
            ),
            Role::Assistant => {
                let calls: Vec<ChatCompletionMessageToolCall> = msg
                    .parts
                    .iter()
                    .filter_map(|p| match p {
                        MessagePart::ToolCall {
                            tool_call_id,
                            tool_name,
                            input,
                        } => Some(tool_call(tool_call_id, tool_name, input)),
                        _ => None,
                    })
                    .collect();
                let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                builder.content(msg.text());
                if !calls.is_empty() {
                    builder.tool_calls(calls);
                }
                out.push(builder.build()?.into());
            }
            Role::Tool => {
                for part in &msg.parts {
                    if let MessagePart::ToolResult {
                        tool_call_id,
                        output,
                        ..
                    } = part
                    {
                        out.push(
                            ChatCompletionRequestToolMessageArgs::default()
                                .content(output.to_string())
                                .tool_call_id(tool_call_id.clone())
                                .build()?
                                .into(),
                        );
                    }
                }
            }
        }
    }
    Ok(out)
}
