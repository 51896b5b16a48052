//! Context → OpenAI-style message array conversion, shared by the
//! Chat Completions family.

use serde_json::json;

use crate::transform::{prepare_messages, TargetModel};
use crate::types::{
    AssistantMessage, Content, Context, Message, Model, Tool, ToolResultContent,
    ToolResultMessage, UserContent, UserContentBlock, UserMessage,
};
use crate::utils::sanitize_for_api;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SystemPromptRole {
    System,
    Developer,
}

impl SystemPromptRole {
    fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Developer => "developer",
        }
    }
}

/// How recorded thinking blocks are replayed to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AssistantThinkingMode {
    /// Drop thinking blocks from the request.
    Omit,
    /// Replay thinking as an ordinary text part (Mistral-style).
    AsText,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct OpenAiLikeMessageOptions {
    pub system_role: SystemPromptRole,
    pub requires_tool_result_name: bool,
    pub thinking_mode: AssistantThinkingMode,
}

pub(crate) fn convert_messages(
    model: &Model,
    context: &Context,
    options: &OpenAiLikeMessageOptions,
) -> serde_json::Value {
    let mut messages = Vec::new();

    push_system_prompt(&mut messages, context, options.system_role);

    let prepared = prepare_messages(&context.messages, &TargetModel::of(model));

    for message in &prepared {
        match message {
            Message::User(user) => messages.push(convert_user_message(model, user)),
            Message::Assistant(assistant) => {
                if let Some(converted) = convert_assistant_message(assistant, options.thinking_mode)
                {
                    messages.push(converted);
                }
            }
            Message::ToolResult(result) => {
                messages.push(convert_tool_result(
                    result,
                    options.requires_tool_result_name,
                ));
            }
        }
    }

    json!(messages)
}

fn push_system_prompt(
    messages: &mut Vec<serde_json::Value>,
    context: &Context,
    role: SystemPromptRole,
) {
    let Some(system_prompt) = &context.system_prompt else {
        return;
    };

    messages.push(json!({
        "role": role.as_str(),
        "content": sanitize_for_api(system_prompt),
    }));
}

fn convert_user_message(model: &Model, user: &UserMessage) -> serde_json::Value {
    let content = match &user.content {
        UserContent::Text(text) => json!(sanitize_for_api(text)),
        UserContent::Multi(blocks) => {
            let parts: Vec<serde_json::Value> = blocks
                .iter()
                .filter_map(|block| match block {
                    UserContentBlock::Text(t) => Some(json!({
                        "type": "text",
                        "text": sanitize_for_api(&t.text),
                    })),
                    UserContentBlock::Image(img) => model.supports_images().then(|| {
                        json!({
                            "type": "image_url",
                            "image_url": {
                                "url": format!(
                                    "data:{};base64,{}",
                                    img.mime_type,
                                    img.to_base64()
                                )
                            }
                        })
                    }),
                })
                .collect();
            json!(parts)
        }
    };

    json!({
        "role": "user",
        "content": content,
    })
}

fn convert_assistant_message(
    assistant: &AssistantMessage,
    thinking_mode: AssistantThinkingMode,
) -> Option<serde_json::Value> {
    let mut msg = json!({ "role": "assistant" });

    let mut text_parts: Vec<serde_json::Value> = Vec::new();
    for block in &assistant.content {
        match block {
            Content::Text { inner } if !inner.text.is_empty() => {
                text_parts.push(json!({ "type": "text", "text": sanitize_for_api(&inner.text) }));
            }
            Content::Thinking { inner }
                if thinking_mode == AssistantThinkingMode::AsText
                    && !inner.thinking.trim().is_empty() =>
            {
                text_parts
                    .push(json!({ "type": "text", "text": sanitize_for_api(&inner.thinking) }));
            }
            _ => {}
        }
    }

    if !text_parts.is_empty() {
        msg["content"] = json!(text_parts);
    }

    let tool_calls: Vec<serde_json::Value> = assistant
        .content
        .iter()
        .filter_map(|c| match c {
            Content::ToolCall { inner } => Some(json!({
                "id": inner.id,
                "type": "function",
                "function": {
                    "name": inner.name,
                    "arguments": inner.arguments.to_string(),
                }
            })),
            _ => None,
        })
        .collect();

    if !tool_calls.is_empty() {
        msg["tool_calls"] = json!(tool_calls);
    }

    // Skip assistant messages with nothing to replay.
    if msg.get("content").is_none() && msg.get("tool_calls").is_none() {
        return None;
    }

    Some(msg)
}

fn convert_tool_result(result: &ToolResultMessage, requires_name: bool) -> serde_json::Value {
    let text = result
        .content
        .iter()
        .filter_map(|c| match c {
            ToolResultContent::Text(t) => Some(sanitize_for_api(&t.text)),
            ToolResultContent::Image(_) => None,
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut msg = json!({
        "role": "tool",
        "tool_call_id": result.tool_call_id,
        "content": text,
    });

    if requires_name {
        msg["name"] = json!(result.tool_name);
    }

    msg
}

pub(crate) fn convert_tools(tools: &[Tool]) -> serde_json::Value {
    let converted: Vec<serde_json::Value> = tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                    "strict": false,
                }
            })
        })
        .collect();
    json!(converted)
}
