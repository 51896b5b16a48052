//! OpenAI Responses streaming adapter.
//!
//! The Responses wire is shared by three backends: api.openai.com, Azure
//! OpenAI, and the Codex backend. The host-specific adapters configure an
//! endpoint and delegate to the runtime here.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::json;

use super::shared::{
    build_http_client, finish_current_block, handle_reasoning_delta, handle_text_delta,
    initialize_output, process_sse_stream, push_stream_done, push_stream_error, reasoning,
    send_streaming_request, AuthHeader, CurrentBlock, ReasoningDelta,
};
use crate::transform::{prepare_messages, TargetModel};
use crate::types::{
    Api, AssistantMessage, AssistantMessageEvent, AssistantMessageEventStream, Content, Context,
    EventStreamSender, Message, Model, StopReason, StreamOptions, Tool, ToolResultContent,
    UserContent, UserContentBlock,
};
use crate::utils::sanitize_for_api;

#[derive(Debug, Clone)]
pub(crate) enum ResponsesAuth {
    Bearer(String),
    ApiKeyHeader(String),
}

#[derive(Debug, Clone)]
pub(crate) struct ResponsesEndpoint {
    pub api: Api,
    pub url: String,
    pub auth: ResponsesAuth,
    /// Extra default headers beyond the model/options ones.
    pub headers: HashMap<String, String>,
    /// Whether the backend requires the `instructions` field to be present.
    pub requires_instructions: bool,
}

pub fn stream_openai_responses(
    model: &Model,
    context: &Context,
    options: StreamOptions,
) -> AssistantMessageEventStream {
    let api_key = options.api_key.clone().unwrap_or_default();
    let endpoint = ResponsesEndpoint {
        api: Api::OpenAIResponses,
        url: model.base_url.clone(),
        auth: ResponsesAuth::Bearer(api_key),
        headers: HashMap::new(),
        requires_instructions: false,
    };
    stream_responses(endpoint, model, context, options)
}

pub(crate) fn stream_responses(
    endpoint: ResponsesEndpoint,
    model: &Model,
    context: &Context,
    options: StreamOptions,
) -> AssistantMessageEventStream {
    let (stream, sender) = AssistantMessageEventStream::new();

    let model = model.clone();
    let context = context.clone();

    tokio::spawn(async move {
        run_stream(endpoint, model, context, options, sender).await;
    });

    stream
}

async fn run_stream(
    endpoint: ResponsesEndpoint,
    model: Model,
    context: Context,
    options: StreamOptions,
    mut sender: EventStreamSender,
) {
    let mut output = initialize_output(
        endpoint.api.clone(),
        model.provider.clone(),
        model.id.clone(),
    );

    if let Err(error) =
        run_stream_inner(&endpoint, &model, &context, &options, &mut output, &mut sender).await
    {
        push_stream_error(&mut output, &mut sender, error);
    }
}

async fn run_stream_inner(
    endpoint: &ResponsesEndpoint,
    model: &Model,
    context: &Context,
    options: &StreamOptions,
    output: &mut AssistantMessage,
    sender: &mut EventStreamSender,
) -> Result<(), crate::Error> {
    let auth = match &endpoint.auth {
        ResponsesAuth::Bearer(token) if token.is_empty() => {
            return Err(crate::Error::NoApiKey(model.provider.to_string()))
        }
        ResponsesAuth::ApiKeyHeader(key) if key.is_empty() => {
            return Err(crate::Error::NoApiKey(model.provider.to_string()))
        }
        ResponsesAuth::Bearer(token) => AuthHeader::Bearer(token.as_str()),
        ResponsesAuth::ApiKeyHeader(key) => AuthHeader::Named {
            name: "api-key",
            value: key.as_str(),
        },
    };

    let mut default_headers = endpoint.headers.clone();
    if let Some(model_headers) = &model.headers {
        default_headers.extend(model_headers.clone());
    }

    let client = build_http_client(auth, Some(&default_headers), options.headers.as_ref())?;
    let params = build_params(endpoint, model, context, options);
    let cancel = sender.cancellation(options.cancel.clone());

    let response = send_streaming_request(&client, &endpoint.url, &params, &cancel).await?;

    sender.push(AssistantMessageEvent::Start {
        partial: output.clone(),
    });

    let mut state = ResponsesState::default();

    process_sse_stream::<ResponsesEvent, _>(response, &cancel, |event| {
        process_event(event, output, sender, &mut state);
    })
    .await?;

    if let Some(message) = state.provider_error {
        return Err(crate::Error::InvalidResponse(message));
    }

    finish_current_block(&mut state.current_block, output, sender);

    if state.saw_function_call && output.stop_reason == StopReason::Stop {
        output.stop_reason = StopReason::ToolUse;
    }

    push_stream_done(output, sender, &model.cost);

    Ok(())
}

#[derive(Default)]
struct ResponsesState {
    current_block: Option<CurrentBlock>,
    saw_function_call: bool,
    provider_error: Option<String>,
}

fn process_event(
    event: ResponsesEvent,
    output: &mut AssistantMessage,
    sender: &mut EventStreamSender,
    state: &mut ResponsesState,
) {
    if state.provider_error.is_some() {
        return;
    }

    match event {
        ResponsesEvent::OutputItemAdded { item } => {
            if let ResponsesItem::FunctionCall { call_id, name, .. } = item {
                finish_current_block(&mut state.current_block, output, sender);
                state.saw_function_call = true;
                state.current_block = Some(CurrentBlock::ToolCall {
                    id: call_id.clone().unwrap_or_default(),
                    name: name.clone().unwrap_or_default(),
                    partial_args: String::new(),
                });
                output.content.push(Content::tool_call(
                    call_id.unwrap_or_default(),
                    name.unwrap_or_default(),
                    serde_json::Value::Object(serde_json::Map::new()),
                ));
                sender.push(AssistantMessageEvent::ToolCallStart {
                    content_index: output.content.len() - 1,
                    partial: output.clone(),
                });
            }
        }
        ResponsesEvent::OutputTextDelta { delta } => {
            handle_text_delta(&delta, output, sender, &mut state.current_block);
        }
        ResponsesEvent::ReasoningSummaryTextDelta { delta }
        | ResponsesEvent::ReasoningTextDelta { delta } => {
            handle_reasoning_delta(
                ReasoningDelta {
                    text: &delta,
                    signature: None,
                },
                output,
                sender,
                &mut state.current_block,
            );
        }
        ResponsesEvent::FunctionCallArgumentsDelta { delta } => {
            if let Some(CurrentBlock::ToolCall { partial_args, .. }) = &mut state.current_block {
                partial_args.push_str(&delta);
                sender.push(AssistantMessageEvent::ToolCallDelta {
                    content_index: output.content.len() - 1,
                    delta,
                    partial: output.clone(),
                });
            }
        }
        ResponsesEvent::OutputItemDone { .. } => {
            finish_current_block(&mut state.current_block, output, sender);
        }
        ResponsesEvent::Completed { response } => {
            apply_response_tail(&response, output);
        }
        ResponsesEvent::Incomplete { response } => {
            apply_response_tail(&response, output);
            let reason = response
                .incomplete_details
                .and_then(|d| d.reason)
                .unwrap_or_default();
            output.stop_reason = if reason == "max_output_tokens" {
                StopReason::Length
            } else {
                StopReason::Stop
            };
        }
        ResponsesEvent::Failed { response } => {
            state.provider_error = Some(
                response
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "response failed".to_string()),
            );
        }
        ResponsesEvent::Error { message } => {
            state.provider_error = Some(message.unwrap_or_else(|| "unknown error".to_string()));
        }
        ResponsesEvent::Unknown => {
            log::debug!("dropping unknown responses event");
        }
    }
}

fn apply_response_tail(response: &ResponsesTail, output: &mut AssistantMessage) {
    let Some(usage) = &response.usage else {
        return;
    };

    let cached = usage
        .input_tokens_details
        .as_ref()
        .and_then(|d| d.cached_tokens)
        .unwrap_or(0);
    let reasoning_tokens = usage
        .output_tokens_details
        .as_ref()
        .and_then(|d| d.reasoning_tokens)
        .unwrap_or(0);

    output.usage.input = usage.input_tokens.saturating_sub(cached);
    output.usage.output = usage.output_tokens + reasoning_tokens;
    output.usage.cache_read = cached;
    output.usage.cache_write = 0;
    output.usage.total_tokens = output.usage.input + output.usage.output + cached;
}

fn build_params(
    endpoint: &ResponsesEndpoint,
    model: &Model,
    context: &Context,
    options: &StreamOptions,
) -> serde_json::Value {
    let mut params = json!({
        "model": model.id,
        "stream": true,
        "store": false,
    });

    match &context.system_prompt {
        Some(system) => params["instructions"] = json!(sanitize_for_api(system)),
        None if endpoint.requires_instructions => params["instructions"] = json!(""),
        None => {}
    }

    params["input"] = convert_input(model, context);

    if let Some(max_tokens) = options.max_tokens {
        params["max_output_tokens"] = json!(max_tokens);
    }

    if let Some(temperature) = options.temperature {
        params["temperature"] = json!(temperature);
    }

    if let Some(tools) = &context.tools {
        if !tools.is_empty() {
            params["tools"] = convert_tools(tools);
        }
    }

    let level = reasoning::effective_level(model.reasoning, options.reasoning);
    if let Some(effort) = reasoning::openai_effort(level, false) {
        params["reasoning"] = json!({ "effort": effort, "summary": "auto" });
    }

    params
}

fn convert_input(model: &Model, context: &Context) -> serde_json::Value {
    let prepared = prepare_messages(&context.messages, &TargetModel::of(model));
    let mut items: Vec<serde_json::Value> = Vec::new();

    for message in &prepared {
        match message {
            Message::User(user) => {
                let content = match &user.content {
                    UserContent::Text(text) => {
                        json!([{ "type": "input_text", "text": sanitize_for_api(text) }])
                    }
                    UserContent::Multi(blocks) => {
                        let parts: Vec<serde_json::Value> = blocks
                            .iter()
                            .filter_map(|block| match block {
                                UserContentBlock::Text(t) => Some(json!({
                                    "type": "input_text",
                                    "text": sanitize_for_api(&t.text),
                                })),
                                UserContentBlock::Image(img) => {
                                    model.supports_images().then(|| {
                                        json!({
                                            "type": "input_image",
                                            "image_url": format!(
                                                "data:{};base64,{}",
                                                img.mime_type,
                                                img.to_base64()
                                            ),
                                        })
                                    })
                                }
                            })
                            .collect();
                        json!(parts)
                    }
                };
                items.push(json!({ "role": "user", "content": content }));
            }
            Message::Assistant(assistant) => {
                let text_parts: Vec<serde_json::Value> = assistant
                    .content
                    .iter()
                    .filter_map(|c| match c {
                        Content::Text { inner } if !inner.text.is_empty() => Some(json!({
                            "type": "output_text",
                            "text": sanitize_for_api(&inner.text),
                        })),
                        _ => None,
                    })
                    .collect();

                if !text_parts.is_empty() {
                    items.push(json!({ "role": "assistant", "content": text_parts }));
                }

                for block in &assistant.content {
                    if let Content::ToolCall { inner } = block {
                        items.push(json!({
                            "type": "function_call",
                            "call_id": inner.id,
                            "name": inner.name,
                            "arguments": inner.arguments.to_string(),
                        }));
                    }
                }
            }
            Message::ToolResult(result) => {
                let text = result
                    .content
                    .iter()
                    .filter_map(|c| match c {
                        ToolResultContent::Text(t) => Some(sanitize_for_api(&t.text)),
                        ToolResultContent::Image(_) => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n");

                items.push(json!({
                    "type": "function_call_output",
                    "call_id": result.tool_call_id,
                    "output": text,
                }));
            }
        }
    }

    json!(items)
}

fn convert_tools(tools: &[Tool]) -> serde_json::Value {
    let converted: Vec<serde_json::Value> = tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
                "strict": false,
            })
        })
        .collect();
    json!(converted)
}

// SSE event types

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponsesEvent {
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { item: ResponsesItem },
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { delta: String },
    #[serde(rename = "response.reasoning_summary_text.delta")]
    ReasoningSummaryTextDelta { delta: String },
    #[serde(rename = "response.reasoning_text.delta")]
    ReasoningTextDelta { delta: String },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta { delta: String },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        #[allow(dead_code)]
        item: ResponsesItem,
    },
    #[serde(rename = "response.completed")]
    Completed { response: ResponsesTail },
    #[serde(rename = "response.incomplete")]
    Incomplete { response: ResponsesTail },
    #[serde(rename = "response.failed")]
    Failed { response: ResponsesTail },
    #[serde(rename = "error")]
    Error { message: Option<String> },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponsesItem {
    Message,
    Reasoning,
    FunctionCall {
        call_id: Option<String>,
        name: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct ResponsesTail {
    usage: Option<ResponsesUsage>,
    error: Option<ResponsesError>,
    incomplete_details: Option<IncompleteDetails>,
}

#[derive(Debug, Deserialize)]
struct ResponsesUsage {
    input_tokens: u32,
    output_tokens: u32,
    input_tokens_details: Option<InputTokensDetails>,
    output_tokens_details: Option<OutputTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct InputTokensDetails {
    cached_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OutputTokensDetails {
    reasoning_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ResponsesError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct IncompleteDetails {
    reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InputType, KnownProvider, ModelCost, Provider, ReasoningLevel};

    fn make_model(reasoning: bool) -> Model {
        Model {
            id: "gpt-5.2".to_string(),
            name: "GPT-5.2".to_string(),
            api: Api::OpenAIResponses,
            provider: Provider::Known(KnownProvider::OpenAI),
            base_url: "https://api.openai.com/v1/responses".to_string(),
            reasoning,
            input: vec![InputType::Text, InputType::Image],
            cost: ModelCost::ZERO,
            context_window: 400_000,
            max_tokens: 128_000,
            headers: None,
            compat: None,
        }
    }

    fn endpoint() -> ResponsesEndpoint {
        ResponsesEndpoint {
            api: Api::OpenAIResponses,
            url: "https://api.openai.com/v1/responses".to_string(),
            auth: ResponsesAuth::Bearer("key".to_string()),
            headers: HashMap::new(),
            requires_instructions: false,
        }
    }

    #[test]
    fn system_prompt_becomes_instructions() {
        let model = make_model(false);
        let context = Context {
            system_prompt: Some("Be brief.".to_string()),
            messages: vec![Message::user("hi")],
            tools: None,
        };

        let params = build_params(&endpoint(), &model, &context, &StreamOptions::default());
        assert_eq!(params["instructions"], "Be brief.");
        assert_eq!(params["store"], false);
        assert_eq!(params["input"][0]["role"], "user");
        assert_eq!(params["input"][0]["content"][0]["type"], "input_text");
    }

    #[test]
    fn reasoning_effort_rides_in_reasoning_block() {
        let model = make_model(true);
        let context = Context {
            system_prompt: None,
            messages: vec![Message::user("hi")],
            tools: None,
        };
        let options = StreamOptions {
            reasoning: Some(ReasoningLevel::High),
            ..Default::default()
        };

        let params = build_params(&endpoint(), &model, &context, &options);
        assert_eq!(params["reasoning"]["effort"], "high");
    }

    #[test]
    fn tool_round_trip_uses_call_items() {
        let model = make_model(false);
        let assistant = AssistantMessage {
            content: vec![Content::tool_call(
                "call_9",
                "search",
                serde_json::json!({"query": "rust"}),
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
                Message::user("find rust"),
                Message::Assistant(assistant),
                Message::ToolResult(crate::types::ToolResultMessage {
                    tool_call_id: "call_9".into(),
                    tool_name: "search".to_string(),
                    content: vec![ToolResultContent::text("found 3 results")],
                    details: None,
                    is_error: false,
                    timestamp: 0,
                }),
            ],
            tools: None,
        };

        let params = build_params(&endpoint(), &model, &context, &StreamOptions::default());
        let input = params["input"].as_array().unwrap();
        assert_eq!(input[1]["type"], "function_call");
        assert_eq!(input[1]["call_id"], "call_9");
        assert_eq!(input[2]["type"], "function_call_output");
        assert_eq!(input[2]["output"], "found 3 results");
    }

    #[test]
    fn function_call_stream_ends_with_tool_use() {
        let event: ResponsesEvent = serde_json::from_str(
            r#"{"type":"response.output_item.added","item":{"type":"function_call","call_id":"call_1","name":"get_weather"}}"#,
        )
        .unwrap();
        assert!(matches!(
            event,
            ResponsesEvent::OutputItemAdded {
                item: ResponsesItem::FunctionCall { .. }
            }
        ));
    }

    #[test]
    fn unknown_event_types_deserialize_to_unknown() {
        let event: ResponsesEvent =
            serde_json::from_str(r#"{"type":"response.brand_new.event"}"#).unwrap();
        assert!(matches!(event, ResponsesEvent::Unknown));
    }
}
