//! Current-block state machine shared by the streaming adapters.
//!
//! Adapters feed text, reasoning, and tool-call deltas as they arrive; this
//! module keeps the in-progress block, appends to `output.content`, and
//! pushes the normalized start/delta/end events in order. Tool-call argument
//! text is accumulated raw; at block end it must parse as strict JSON, and a
//! malformed tail degrades to the tolerant parser's best-effort snapshot
//! (schema validation rejects the call downstream).

use serde::Deserialize;
use serde_json::Value;

use crate::types::{
    AssistantMessage, AssistantMessageEvent, Content, EventStreamSender, StopReason, ToolCall,
};
use crate::utils::parse_partial_json;

#[derive(Debug)]
pub(crate) enum CurrentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
        signature: Option<String>,
    },
    ToolCall {
        id: String,
        name: String,
        partial_args: String,
    },
}

pub(crate) struct ReasoningDelta<'a> {
    pub text: &'a str,
    pub signature: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OpenAiLikeToolCallDelta {
    pub id: Option<String>,
    pub function: Option<OpenAiLikeFunctionDelta>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OpenAiLikeFunctionDelta {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiLikeStreamUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: Option<u32>,
    pub cache_read_input_tokens: Option<u32>,
    pub cache_creation_input_tokens: Option<u32>,
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    pub completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PromptTokensDetails {
    pub cached_tokens: Option<u32>,
    pub cache_write_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionTokensDetails {
    pub reasoning_tokens: Option<u32>,
}

pub(crate) fn update_usage_from_chunk(
    usage: &OpenAiLikeStreamUsage,
    output: &mut AssistantMessage,
) {
    let cache_read = usage
        .cache_read_input_tokens
        .or_else(|| {
            usage
                .prompt_tokens_details
                .as_ref()
                .and_then(|details| details.cached_tokens)
        })
        .unwrap_or(0);

    let cache_write = usage
        .cache_creation_input_tokens
        .or_else(|| {
            usage
                .prompt_tokens_details
                .as_ref()
                .and_then(|details| details.cache_write_tokens)
        })
        .unwrap_or(0);

    let reasoning_tokens = usage
        .completion_tokens_details
        .as_ref()
        .and_then(|details| details.reasoning_tokens)
        .unwrap_or(0);

    let input = usage.prompt_tokens.saturating_sub(cache_read);
    let output_tokens = usage.completion_tokens + reasoning_tokens;
    let total_tokens = usage
        .total_tokens
        .unwrap_or(usage.prompt_tokens + output_tokens);

    output.usage.input = input;
    output.usage.output = output_tokens;
    output.usage.cache_read = cache_read;
    output.usage.cache_write = cache_write;
    output.usage.total_tokens = total_tokens;
}

pub(crate) fn handle_text_delta(
    content: &str,
    output: &mut AssistantMessage,
    sender: &mut EventStreamSender,
    current_block: &mut Option<CurrentBlock>,
) {
    if content.is_empty() {
        return;
    }

    match current_block {
        Some(CurrentBlock::Text { text }) => {
            text.push_str(content);
            if let Some(Content::Text { inner }) =
                output.content.last_mut()
            {
                inner.text.push_str(content);
            }
            sender.push(AssistantMessageEvent::TextDelta {
                content_index: output.content.len().saturating_sub(1),
                delta: content.to_string(),
                partial: output.clone(),
            });
        }
        _ => {
            finish_current_block(current_block, output, sender);

            let text = content.to_string();
            *current_block = Some(CurrentBlock::Text { text: text.clone() });
            output.content.push(Content::text(""));
            let content_index = output.content.len() - 1;

            sender.push(AssistantMessageEvent::TextStart {
                content_index,
                partial: output.clone(),
            });
            if let Some(Content::Text { inner }) = output.content.last_mut() {
                inner.text = text.clone();
            }
            sender.push(AssistantMessageEvent::TextDelta {
                content_index,
                delta: text,
                partial: output.clone(),
            });
        }
    }
}

pub(crate) fn handle_reasoning_delta(
    reasoning: ReasoningDelta<'_>,
    output: &mut AssistantMessage,
    sender: &mut EventStreamSender,
    current_block: &mut Option<CurrentBlock>,
) {
    if reasoning.text.is_empty() {
        return;
    }

    match current_block {
        Some(CurrentBlock::Thinking { thinking, .. }) => {
            thinking.push_str(reasoning.text);
            if let Some(Content::Thinking { inner }) = output.content.last_mut() {
                inner.thinking.push_str(reasoning.text);
            }
            sender.push(AssistantMessageEvent::ThinkingDelta {
                content_index: output.content.len().saturating_sub(1),
                delta: reasoning.text.to_string(),
                partial: output.clone(),
            });
        }
        _ => {
            finish_current_block(current_block, output, sender);

            let thinking = reasoning.text.to_string();
            *current_block = Some(CurrentBlock::Thinking {
                thinking: thinking.clone(),
                signature: reasoning.signature.map(str::to_string),
            });
            output.content.push(Content::thinking(""));
            let content_index = output.content.len() - 1;

            sender.push(AssistantMessageEvent::ThinkingStart {
                content_index,
                partial: output.clone(),
            });
            if let Some(Content::Thinking { inner }) = output.content.last_mut() {
                inner.thinking = thinking.clone();
            }
            sender.push(AssistantMessageEvent::ThinkingDelta {
                content_index,
                delta: thinking,
                partial: output.clone(),
            });
        }
    }
}

pub(crate) fn handle_tool_calls(
    tool_calls: &[OpenAiLikeToolCallDelta],
    output: &mut AssistantMessage,
    sender: &mut EventStreamSender,
    current_block: &mut Option<CurrentBlock>,
) {
    for tool_call in tool_calls {
        if should_start_new_tool_call(current_block, tool_call) {
            start_tool_call_block(tool_call, output, sender, current_block);
        }

        apply_tool_call_delta(tool_call, output, sender, current_block);
    }
}

fn should_start_new_tool_call(
    current_block: &Option<CurrentBlock>,
    tool_call: &OpenAiLikeToolCallDelta,
) -> bool {
    match current_block {
        Some(CurrentBlock::ToolCall { id, .. }) => tool_call
            .id
            .as_ref()
            .is_some_and(|new_id| !new_id.is_empty() && !id.is_empty() && new_id != id),
        _ => has_tool_call_identity(tool_call),
    }
}

fn has_tool_call_identity(tool_call: &OpenAiLikeToolCallDelta) -> bool {
    if tool_call
        .id
        .as_ref()
        .is_some_and(|tool_call_id| !tool_call_id.is_empty())
    {
        return true;
    }

    tool_call
        .function
        .as_ref()
        .and_then(|function| function.name.as_ref())
        .is_some_and(|tool_name| !tool_name.is_empty())
}

fn start_tool_call_block(
    tool_call: &OpenAiLikeToolCallDelta,
    output: &mut AssistantMessage,
    sender: &mut EventStreamSender,
    current_block: &mut Option<CurrentBlock>,
) {
    finish_current_block(current_block, output, sender);

    let id = tool_call.id.clone().unwrap_or_default();
    let name = tool_call
        .function
        .as_ref()
        .and_then(|function| function.name.clone())
        .unwrap_or_default();

    *current_block = Some(CurrentBlock::ToolCall {
        id: id.clone(),
        name: name.clone(),
        partial_args: String::new(),
    });

    output.content.push(Content::tool_call(
        id,
        name,
        Value::Object(serde_json::Map::new()),
    ));

    sender.push(AssistantMessageEvent::ToolCallStart {
        content_index: output.content.len() - 1,
        partial: output.clone(),
    });
}

fn apply_tool_call_delta(
    tool_call: &OpenAiLikeToolCallDelta,
    output: &mut AssistantMessage,
    sender: &mut EventStreamSender,
    current_block: &mut Option<CurrentBlock>,
) {
    let Some(CurrentBlock::ToolCall {
        id,
        name,
        partial_args,
    }) = current_block
    else {
        return;
    };

    if let Some(new_id) = &tool_call.id {
        if !new_id.is_empty() {
            *id = new_id.clone();
        }
    }

    if let Some(function) = &tool_call.function {
        if let Some(new_name) = &function.name {
            if !new_name.is_empty() {
                *name = new_name.clone();
            }
        }

        if let Some(arguments) = &function.arguments {
            partial_args.push_str(arguments);

            // Keep the partial's arguments a live snapshot for consumers
            // that render in-progress calls.
            let snapshot = parse_partial_json(partial_args);
            if let Some(Content::ToolCall { inner }) = output.content.last_mut() {
                inner.id = id.clone().into();
                inner.name = name.clone();
                inner.arguments = snapshot;
            }

            sender.push(AssistantMessageEvent::ToolCallDelta {
                content_index: output.content.len() - 1,
                delta: arguments.clone(),
                partial: output.clone(),
            });
        }
    }
}

/// Emit a complete tool call whose arguments arrived pre-parsed (Google
/// family). A single synthetic delta carries the serialized form so delta
/// concatenation always reproduces the final arguments.
pub(crate) fn emit_complete_tool_call(
    id: String,
    name: String,
    arguments: Value,
    output: &mut AssistantMessage,
    sender: &mut EventStreamSender,
    current_block: &mut Option<CurrentBlock>,
) {
    finish_current_block(current_block, output, sender);

    let serialized = arguments.to_string();

    output
        .content
        .push(Content::tool_call(id.clone(), name.clone(), arguments.clone()));
    let content_index = output.content.len() - 1;

    sender.push(AssistantMessageEvent::ToolCallStart {
        content_index,
        partial: output.clone(),
    });
    sender.push(AssistantMessageEvent::ToolCallDelta {
        content_index,
        delta: serialized,
        partial: output.clone(),
    });
    sender.push(AssistantMessageEvent::ToolCallEnd {
        content_index,
        tool_call: ToolCall {
            id: id.into(),
            name,
            arguments,
            thought_signature: None,
        },
        partial: output.clone(),
    });
}

pub(crate) fn finish_current_block(
    current_block: &mut Option<CurrentBlock>,
    output: &mut AssistantMessage,
    sender: &mut EventStreamSender,
) {
    let Some(block) = current_block.take() else {
        return;
    };

    let content_index = output.content.len().saturating_sub(1);

    match block {
        CurrentBlock::Text { text } => {
            if let Some(Content::Text { inner }) = output.content.get_mut(content_index) {
                inner.text = text.clone();
            }

            sender.push(AssistantMessageEvent::TextEnd {
                content_index,
                content: text,
                partial: output.clone(),
            });
        }
        CurrentBlock::Thinking {
            thinking,
            signature,
        } => {
            if let Some(Content::Thinking { inner }) = output.content.get_mut(content_index) {
                inner.thinking = thinking.clone();
                inner.thinking_signature = signature;
            }

            sender.push(AssistantMessageEvent::ThinkingEnd {
                content_index,
                content: thinking,
                partial: output.clone(),
            });
        }
        CurrentBlock::ToolCall {
            id,
            name,
            partial_args,
        } => {
            let arguments: Value = match serde_json::from_str(&partial_args) {
                Ok(v) => v,
                Err(_) => {
                    log::debug!("tool call arguments were not strict JSON at block end");
                    parse_partial_json(&partial_args)
                }
            };

            if let Some(Content::ToolCall { inner }) = output.content.get_mut(content_index) {
                inner.id = id.clone().into();
                inner.name = name.clone();
                inner.arguments = arguments.clone();
            }

            sender.push(AssistantMessageEvent::ToolCallEnd {
                content_index,
                tool_call: ToolCall {
                    id: id.into(),
                    name,
                    arguments,
                    thought_signature: None,
                },
                partial: output.clone(),
            });
        }
    }
}

pub(crate) fn map_stop_reason(reason: &str) -> StopReason {
    match reason {
        "stop" => StopReason::Stop,
        "length" => StopReason::Length,
        "function_call" | "tool_calls" => StopReason::ToolUse,
        "content_filter" => StopReason::Error,
        _ => StopReason::Stop,
    }
}
