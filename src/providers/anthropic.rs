//! Anthropic Messages streaming adapter.

use serde::Deserialize;
use serde_json::json;

use super::shared::{
    build_http_client, finish_current_block, initialize_output, process_sse_events,
    push_stream_done, push_stream_error, reasoning, send_streaming_request, AuthHeader,
    CurrentBlock,
};
use crate::transform::{prepare_messages, TargetModel};
use crate::types::{
    Api, AssistantMessage, AssistantMessageEvent, AssistantMessageEventStream, Content, Context,
    EventStreamSender, Message, Model, StopReason, StreamOptions, Tool, ToolResultContent,
    UserContent, UserContentBlock,
};
use crate::utils::sanitize_for_api;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub fn stream_anthropic(
    model: &Model,
    context: &Context,
    options: StreamOptions,
) -> AssistantMessageEventStream {
    let (stream, sender) = AssistantMessageEventStream::new();

    let model = model.clone();
    let context = context.clone();

    tokio::spawn(async move {
        run_stream(model, context, options, sender).await;
    });

    stream
}

async fn run_stream(
    model: Model,
    context: Context,
    options: StreamOptions,
    mut sender: EventStreamSender,
) {
    let mut output = initialize_output(
        Api::AnthropicMessages,
        model.provider.clone(),
        model.id.clone(),
    );

    if let Err(error) = run_stream_inner(&model, &context, &options, &mut output, &mut sender).await
    {
        push_stream_error(&mut output, &mut sender, error);
    }
}

async fn run_stream_inner(
    model: &Model,
    context: &Context,
    options: &StreamOptions,
    output: &mut AssistantMessage,
    sender: &mut EventStreamSender,
) -> Result<(), crate::Error> {
    let api_key = options
        .api_key
        .as_ref()
        .ok_or_else(|| crate::Error::NoApiKey(model.provider.to_string()))?;

    let mut version_headers = std::collections::HashMap::new();
    version_headers.insert("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string());

    let client = build_http_client(
        AuthHeader::Named {
            name: "x-api-key",
            value: api_key.as_str(),
        },
        Some(&version_headers),
        merge_optional_headers(model.headers.as_ref(), options.headers.as_ref()).as_ref(),
    )?;

    let params = build_params(model, context, options);
    let cancel = sender.cancellation(options.cancel.clone());

    let response = send_streaming_request(&client, &model.base_url, &params, &cancel).await?;

    sender.push(AssistantMessageEvent::Start {
        partial: output.clone(),
    });

    let mut current_block: Option<CurrentBlock> = None;
    let mut provider_error: Option<String> = None;

    process_sse_events(response, &cancel, |event_name, data| {
        if provider_error.is_some() {
            return;
        }
        match serde_json::from_str::<AnthropicEvent>(data) {
            Ok(event) => {
                if let Some(message) = process_event(event, output, sender, &mut current_block) {
                    provider_error = Some(message);
                }
            }
            Err(_) => log::debug!("skipping undecodable {event_name} event"),
        }
    })
    .await?;

    if let Some(message) = provider_error {
        return Err(crate::Error::InvalidResponse(message));
    }

    finish_current_block(&mut current_block, output, sender);
    push_stream_done(output, sender, &model.cost);

    Ok(())
}

fn merge_optional_headers(
    model_headers: Option<&std::collections::HashMap<String, String>>,
    extra_headers: Option<&std::collections::HashMap<String, String>>,
) -> Option<std::collections::HashMap<String, String>> {
    match (model_headers, extra_headers) {
        (None, None) => None,
        (a, b) => {
            let mut merged = a.cloned().unwrap_or_default();
            if let Some(extra) = b {
                merged.extend(extra.clone());
            }
            Some(merged)
        }
    }
}

/// Returns the provider error message if the event is terminal-with-error.
fn process_event(
    event: AnthropicEvent,
    output: &mut AssistantMessage,
    sender: &mut EventStreamSender,
    current_block: &mut Option<CurrentBlock>,
) -> Option<String> {
    match event {
        AnthropicEvent::MessageStart { message } => {
            if let Some(usage) = message.usage {
                apply_usage(&usage, output);
            }
            None
        }
        AnthropicEvent::ContentBlockStart { content_block, .. } => {
            finish_current_block(current_block, output, sender);
            match content_block {
                AnthropicContentBlock::Text { text } => {
                    *current_block = Some(CurrentBlock::Text { text: text.clone() });
                    output.content.push(Content::text(text));
                    sender.push(AssistantMessageEvent::TextStart {
                        content_index: output.content.len() - 1,
                        partial: output.clone(),
                    });
                }
                AnthropicContentBlock::Thinking { thinking } => {
                    *current_block = Some(CurrentBlock::Thinking {
                        thinking: thinking.clone(),
                        signature: None,
                    });
                    output.content.push(Content::thinking(thinking));
                    sender.push(AssistantMessageEvent::ThinkingStart {
                        content_index: output.content.len() - 1,
                        partial: output.clone(),
                    });
                }
                AnthropicContentBlock::ToolUse { id, name } => {
                    *current_block = Some(CurrentBlock::ToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        partial_args: String::new(),
                    });
                    output.content.push(Content::tool_call(
                        id,
                        name,
                        serde_json::Value::Object(serde_json::Map::new()),
                    ));
                    sender.push(AssistantMessageEvent::ToolCallStart {
                        content_index: output.content.len() - 1,
                        partial: output.clone(),
                    });
                }
                AnthropicContentBlock::Unknown => {
                    log::debug!("dropping unknown content block type");
                }
            }
            None
        }
        AnthropicEvent::ContentBlockDelta { delta, .. } => {
            let content_index = output.content.len().saturating_sub(1);
            match delta {
                AnthropicDelta::TextDelta { text } => {
                    if let Some(CurrentBlock::Text { text: buffer }) = current_block {
                        buffer.push_str(&text);
                        if let Some(Content::Text { inner }) = output.content.last_mut() {
                            inner.text.push_str(&text);
                        }
                        sender.push(AssistantMessageEvent::TextDelta {
                            content_index,
                            delta: text,
                            partial: output.clone(),
                        });
                    }
                }
                AnthropicDelta::ThinkingDelta { thinking } => {
                    if let Some(CurrentBlock::Thinking {
                        thinking: buffer, ..
                    }) = current_block
                    {
                        buffer.push_str(&thinking);
                        if let Some(Content::Thinking { inner }) = output.content.last_mut() {
                            inner.thinking.push_str(&thinking);
                        }
                        sender.push(AssistantMessageEvent::ThinkingDelta {
                            content_index,
                            delta: thinking,
                            partial: output.clone(),
                        });
                    }
                }
                AnthropicDelta::SignatureDelta { signature: sig } => {
                    if let Some(CurrentBlock::Thinking { signature, .. }) = current_block {
                        match signature {
                            Some(existing) => existing.push_str(&sig),
                            None => *signature = Some(sig),
                        }
                    }
                }
                AnthropicDelta::InputJsonDelta { partial_json } => {
                    if let Some(CurrentBlock::ToolCall { partial_args, .. }) = current_block {
                        partial_args.push_str(&partial_json);
                        sender.push(AssistantMessageEvent::ToolCallDelta {
                            content_index,
                            delta: partial_json,
                            partial: output.clone(),
                        });
                    }
                }
                AnthropicDelta::Unknown => {
                    log::debug!("dropping unknown delta type");
                }
            }
            None
        }
        AnthropicEvent::ContentBlockStop { .. } => {
            finish_current_block(current_block, output, sender);
            None
        }
        AnthropicEvent::MessageDelta { delta, usage } => {
            if let Some(stop_reason) = delta.and_then(|d| d.stop_reason) {
                output.stop_reason = map_anthropic_stop_reason(&stop_reason);
            }
            if let Some(usage) = usage {
                apply_usage(&usage, output);
            }
            None
        }
        AnthropicEvent::Error { error } => Some(error.message),
        AnthropicEvent::MessageStop | AnthropicEvent::Ping | AnthropicEvent::Unknown => None,
    }
}

fn apply_usage(usage: &AnthropicUsage, output: &mut AssistantMessage) {
    if let Some(input) = usage.input_tokens {
        output.usage.input = input;
    }
    if let Some(tokens) = usage.output_tokens {
        output.usage.output = tokens;
    }
    if let Some(cache_read) = usage.cache_read_input_tokens {
        output.usage.cache_read = cache_read;
    }
    if let Some(cache_write) = usage.cache_creation_input_tokens {
        output.usage.cache_write = cache_write;
    }
    output.usage.total_tokens = output.usage.input
        + output.usage.output
        + output.usage.cache_read
        + output.usage.cache_write;
}

fn map_anthropic_stop_reason(reason: &str) -> StopReason {
    match reason {
        "end_turn" | "stop_sequence" => StopReason::Stop,
        "max_tokens" => StopReason::Length,
        "tool_use" => StopReason::ToolUse,
        "refusal" => StopReason::Error,
        _ => StopReason::Stop,
    }
}

fn supports_xhigh(model_id: &str) -> bool {
    model_id.contains("opus")
}

fn build_params(model: &Model, context: &Context, options: &StreamOptions) -> serde_json::Value {
    let mut params = json!({
        "model": model.id,
        "max_tokens": options.max_tokens.unwrap_or(model.max_tokens),
        "stream": true,
    });

    if let Some(system) = &context.system_prompt {
        params["system"] = json!(sanitize_for_api(system));
    }

    if let Some(temperature) = options.temperature {
        params["temperature"] = json!(temperature);
    }

    params["messages"] = convert_messages(model, context);

    if let Some(tools) = &context.tools {
        if !tools.is_empty() {
            params["tools"] = convert_tools(tools);
        }
    }

    let level = reasoning::effective_level(model.reasoning, options.reasoning);
    let budget = options
        .thinking_budget_tokens
        .or_else(|| reasoning::anthropic_budget_tokens(level, supports_xhigh(&model.id)));
    if model.reasoning {
        if let Some(budget_tokens) = budget {
            params["thinking"] = json!({
                "type": "enabled",
                "budget_tokens": budget_tokens,
            });
        }
    }

    params
}

fn convert_messages(model: &Model, context: &Context) -> serde_json::Value {
    let prepared = prepare_messages(&context.messages, &TargetModel::of(model));
    let mut messages: Vec<serde_json::Value> = Vec::new();

    for message in &prepared {
        match message {
            Message::User(user) => {
                let content = match &user.content {
                    UserContent::Text(text) => {
                        json!([{ "type": "text", "text": sanitize_for_api(text) }])
                    }
                    UserContent::Multi(blocks) => {
                        let parts: Vec<serde_json::Value> = blocks
                            .iter()
                            .filter_map(|block| match block {
                                UserContentBlock::Text(t) => Some(json!({
                                    "type": "text",
                                    "text": sanitize_for_api(&t.text),
                                })),
                                UserContentBlock::Image(img) => {
                                    model.supports_images().then(|| {
                                        json!({
                                            "type": "image",
                                            "source": {
                                                "type": "base64",
                                                "media_type": img.mime_type,
                                                "data": img.to_base64(),
                                            }
                                        })
                                    })
                                }
                            })
                            .collect();
                        json!(parts)
                    }
                };
                messages.push(json!({ "role": "user", "content": content }));
            }
            Message::Assistant(assistant) => {
                let blocks: Vec<serde_json::Value> = assistant
                    .content
                    .iter()
                    .filter_map(|block| match block {
                        Content::Text { inner } if !inner.text.is_empty() => Some(json!({
                            "type": "text",
                            "text": sanitize_for_api(&inner.text),
                        })),
                        Content::Thinking { inner } if !inner.thinking.trim().is_empty() => {
                            Some(json!({
                                "type": "thinking",
                                "thinking": inner.thinking,
                                "signature": inner.thinking_signature.clone().unwrap_or_default(),
                            }))
                        }
                        Content::ToolCall { inner } => Some(json!({
                            "type": "tool_use",
                            "id": inner.id,
                            "name": inner.name,
                            "input": inner.arguments,
                        })),
                        _ => None,
                    })
                    .collect();

                if !blocks.is_empty() {
                    messages.push(json!({ "role": "assistant", "content": blocks }));
                }
            }
            Message::ToolResult(result) => {
                let content: Vec<serde_json::Value> = result
                    .content
                    .iter()
                    .filter_map(|c| match c {
                        ToolResultContent::Text(t) => Some(json!({
                            "type": "text",
                            "text": sanitize_for_api(&t.text),
                        })),
                        ToolResultContent::Image(img) => model.supports_images().then(|| {
                            json!({
                                "type": "image",
                                "source": {
                                    "type": "base64",
                                    "media_type": img.mime_type,
                                    "data": img.to_base64(),
                                }
                            })
                        }),
                    })
                    .collect();

                messages.push(json!({
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": result.tool_call_id,
                        "content": content,
                        "is_error": result.is_error,
                    }]
                }));
            }
        }
    }

    json!(messages)
}

fn convert_tools(tools: &[Tool]) -> serde_json::Value {
    let converted: Vec<serde_json::Value> = tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.parameters,
            })
        })
        .collect();
    json!(converted)
}

// SSE event types

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicEvent {
    MessageStart {
        message: AnthropicMessageStart,
    },
    ContentBlockStart {
        #[allow(dead_code)]
        index: usize,
        content_block: AnthropicContentBlock,
    },
    ContentBlockDelta {
        #[allow(dead_code)]
        index: usize,
        delta: AnthropicDelta,
    },
    ContentBlockStop {
        #[allow(dead_code)]
        index: usize,
    },
    MessageDelta {
        delta: Option<AnthropicMessageDelta>,
        usage: Option<AnthropicUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: AnthropicError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct AnthropicMessageStart {
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicDelta {
    TextDelta {
        text: String,
    },
    ThinkingDelta {
        thinking: String,
    },
    SignatureDelta {
        signature: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct AnthropicMessageDelta {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
    cache_read_input_tokens: Option<u32>,
    cache_creation_input_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InputType, KnownProvider, ModelCost, Provider, ReasoningLevel};

    fn make_model(reasoning: bool) -> Model {
        Model {
            id: "claude-sonnet-4-20250514".to_string(),
            name: "Claude Sonnet 4".to_string(),
            api: Api::AnthropicMessages,
            provider: Provider::Known(KnownProvider::Anthropic),
            base_url: "https://api.anthropic.com/v1/messages".to_string(),
            reasoning,
            input: vec![InputType::Text, InputType::Image],
            cost: ModelCost::ZERO,
            context_window: 200_000,
            max_tokens: 8_192,
            headers: None,
            compat: None,
        }
    }

    fn simple_context() -> Context {
        Context {
            system_prompt: None,
            messages: vec![Message::user("hello")],
            tools: None,
        }
    }

    #[test]
    fn high_reasoning_requests_8192_token_budget() {
        let model = make_model(true);
        let options = StreamOptions {
            reasoning: Some(ReasoningLevel::High),
            ..Default::default()
        };

        let params = build_params(&model, &simple_context(), &options);
        assert_eq!(params["thinking"]["type"], "enabled");
        assert_eq!(params["thinking"]["budget_tokens"], 8192);
    }

    #[test]
    fn non_reasoning_model_omits_thinking_entirely() {
        let model = make_model(false);
        let options = StreamOptions {
            reasoning: Some(ReasoningLevel::High),
            ..Default::default()
        };

        let params = build_params(&model, &simple_context(), &options);
        assert!(params.get("thinking").is_none());
    }

    #[test]
    fn off_reasoning_omits_thinking() {
        let model = make_model(true);
        let options = StreamOptions {
            reasoning: Some(ReasoningLevel::Off),
            ..Default::default()
        };

        let params = build_params(&model, &simple_context(), &options);
        assert!(params.get("thinking").is_none());
    }

    #[test]
    fn explicit_budget_overrides_the_table() {
        let model = make_model(true);
        let options = StreamOptions {
            reasoning: Some(ReasoningLevel::Low),
            thinking_budget_tokens: Some(3_000),
            ..Default::default()
        };

        let params = build_params(&model, &simple_context(), &options);
        assert_eq!(params["thinking"]["budget_tokens"], 3000);
    }

    #[test]
    fn tool_results_are_replayed_as_user_blocks() {
        let model = make_model(false);
        let assistant = AssistantMessage {
            content: vec![Content::tool_call(
                "toolu_1",
                "get_weather",
                serde_json::json!({"city": "Tokyo"}),
            )],
            api: model.api.clone(),
            provider: model.provider.clone(),
            model: model.id.clone(),
            usage: Default::default(),
            stop_reason: StopReason::ToolUse,
            error_message: None,
            timestamp: 0,
        };
        let context = Context {
            system_prompt: None,
            messages: vec![
                Message::user("weather?"),
                Message::Assistant(assistant),
                Message::ToolResult(crate::types::ToolResultMessage {
                    tool_call_id: "toolu_1".into(),
                    tool_name: "get_weather".to_string(),
                    content: vec![ToolResultContent::text("sunny, 22C")],
                    details: None,
                    is_error: false,
                    timestamp: 0,
                }),
            ],
            tools: None,
        };

        let params = build_params(&model, &context, &StreamOptions::default());
        let messages = params["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"][0]["type"], "tool_use");
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"][0]["type"], "tool_result");
        assert_eq!(messages[2]["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn stop_reasons_map_to_normalized_set() {
        assert_eq!(map_anthropic_stop_reason("end_turn"), StopReason::Stop);
        assert_eq!(map_anthropic_stop_reason("max_tokens"), StopReason::Length);
        assert_eq!(map_anthropic_stop_reason("tool_use"), StopReason::ToolUse);
        assert_eq!(map_anthropic_stop_reason("stop_sequence"), StopReason::Stop);
        assert_eq!(map_anthropic_stop_reason("refusal"), StopReason::Error);
        assert_eq!(map_anthropic_stop_reason("whatever"), StopReason::Stop);
    }
}
