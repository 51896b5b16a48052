//! Google GenAI streaming adapter.
//!
//! `streamGenerateContent?alt=sse` is shared by three backends: the
//! Generative Language API, Vertex AI, and the Cloud Code (Gemini CLI)
//! backend. The host-specific adapters configure an endpoint and delegate
//! to the runtime here; the Cloud Code backend additionally wraps the
//! request and response in an envelope.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::json;

use super::shared::{
    build_http_client, emit_complete_tool_call, finish_current_block, handle_reasoning_delta,
    handle_text_delta, initialize_output, process_sse_stream, push_stream_done, push_stream_error,
    reasoning, send_streaming_request, AuthHeader, CurrentBlock, ReasoningDelta,
};
use crate::transform::{prepare_messages, TargetModel};
use crate::types::{
    Api, AssistantMessage, AssistantMessageEvent, AssistantMessageEventStream, Content, Context,
    EventStreamSender, Message, Model, ReasoningLevel, StopReason, StreamOptions, Tool,
    ToolResultContent, UserContent, UserContentBlock,
};
use crate::utils::sanitize_for_api;

#[derive(Debug, Clone)]
pub(crate) enum GoogleAuth {
    /// `x-goog-api-key` header (Generative Language API).
    ApiKey(String),
    /// OAuth bearer token (Vertex, Cloud Code).
    Bearer(String),
}

#[derive(Debug, Clone)]
pub(crate) struct GoogleEndpoint {
    pub api: Api,
    pub url: String,
    pub auth: GoogleAuth,
    /// Cloud Code wraps the generate request in `{model, project, request}`
    /// and nests each chunk under `response`.
    pub envelope: Option<GoogleEnvelope>,
}

#[derive(Debug, Clone)]
pub(crate) struct GoogleEnvelope {
    pub model: String,
    pub project: Option<String>,
}

pub fn stream_google(
    model: &Model,
    context: &Context,
    options: StreamOptions,
) -> AssistantMessageEventStream {
    let api_key = options.api_key.clone().unwrap_or_default();
    let endpoint = GoogleEndpoint {
        api: Api::GoogleGenerativeAi,
        url: format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            model.base_url.trim_end_matches('/'),
            model.id
        ),
        auth: GoogleAuth::ApiKey(api_key),
        envelope: None,
    };
    stream_google_endpoint(endpoint, model, context, options)
}

pub(crate) fn stream_google_endpoint(
    endpoint: GoogleEndpoint,
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
    endpoint: GoogleEndpoint,
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
    endpoint: &GoogleEndpoint,
    model: &Model,
    context: &Context,
    options: &StreamOptions,
    output: &mut AssistantMessage,
    sender: &mut EventStreamSender,
) -> Result<(), crate::Error> {
    let auth = match &endpoint.auth {
        GoogleAuth::ApiKey(key) if key.is_empty() => {
            return Err(crate::Error::NoApiKey(model.provider.to_string()))
        }
        GoogleAuth::Bearer(token) if token.is_empty() => {
            return Err(crate::Error::NoApiKey(model.provider.to_string()))
        }
        GoogleAuth::ApiKey(key) => AuthHeader::Named {
            name: "x-goog-api-key",
            value: key.as_str(),
        },
        GoogleAuth::Bearer(token) => AuthHeader::Bearer(token.as_str()),
    };

    let client = build_http_client(auth, model.headers.as_ref(), options.headers.as_ref())?;

    let request = build_request(model, context, options);
    let params = match &endpoint.envelope {
        Some(envelope) => {
            let mut wrapped = json!({
                "model": envelope.model,
                "request": request,
            });
            if let Some(project) = &envelope.project {
                wrapped["project"] = json!(project);
            }
            wrapped
        }
        None => request,
    };

    let cancel = sender.cancellation(options.cancel.clone());
    let response = send_streaming_request(&client, &endpoint.url, &params, &cancel).await?;

    sender.push(AssistantMessageEvent::Start {
        partial: output.clone(),
    });

    let mut state = GoogleState::default();
    let enveloped = endpoint.envelope.is_some();

    process_sse_stream::<serde_json::Value, _>(response, &cancel, |raw| {
        let chunk_value = if enveloped {
            raw.get("response").cloned().unwrap_or(raw)
        } else {
            raw
        };
        match serde_json::from_value::<GoogleChunk>(chunk_value) {
            Ok(chunk) => process_chunk(&chunk, output, sender, &mut state),
            Err(_) => log::debug!("skipping undecodable google chunk"),
        }
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
struct GoogleState {
    current_block: Option<CurrentBlock>,
    saw_function_call: bool,
    tool_call_counter: usize,
    provider_error: Option<String>,
}

fn process_chunk(
    chunk: &GoogleChunk,
    output: &mut AssistantMessage,
    sender: &mut EventStreamSender,
    state: &mut GoogleState,
) {
    if let Some(usage) = &chunk.usage_metadata {
        apply_usage(usage, output);
    }

    let Some(candidate) = chunk.candidates.as_ref().and_then(|c| c.first()) else {
        return;
    };

    if let Some(content) = &candidate.content {
        for part in content.parts.iter().flatten() {
            process_part(part, output, sender, state);
        }
    }

    if let Some(reason) = &candidate.finish_reason {
        match reason.as_str() {
            "STOP" => output.stop_reason = StopReason::Stop,
            "MAX_TOKENS" => output.stop_reason = StopReason::Length,
            other => {
                state.provider_error = Some(format!("generation stopped: {other}"));
            }
        }
    }
}

fn process_part(
    part: &GooglePart,
    output: &mut AssistantMessage,
    sender: &mut EventStreamSender,
    state: &mut GoogleState,
) {
    if let Some(function_call) = &part.function_call {
        state.saw_function_call = true;
        state.tool_call_counter += 1;
        // The wire carries no call id; derive a stable one.
        let id = format!("{}_{}", function_call.name, state.tool_call_counter);
        emit_complete_tool_call(
            id,
            function_call.name.clone(),
            function_call.args.clone().unwrap_or_else(|| json!({})),
            output,
            sender,
            &mut state.current_block,
        );
        return;
    }

    let Some(text) = &part.text else {
        return;
    };

    if part.thought.unwrap_or(false) {
        handle_reasoning_delta(
            ReasoningDelta {
                text,
                signature: part.thought_signature.as_deref(),
            },
            output,
            sender,
            &mut state.current_block,
        );
    } else {
        handle_text_delta(text, output, sender, &mut state.current_block);
    }
}

fn apply_usage(usage: &GoogleUsageMetadata, output: &mut AssistantMessage) {
    let cached = usage.cached_content_token_count.unwrap_or(0);
    let prompt = usage.prompt_token_count.unwrap_or(0);
    let candidates = usage.candidates_token_count.unwrap_or(0);
    let thoughts = usage.thoughts_token_count.unwrap_or(0);

    output.usage.input = prompt.saturating_sub(cached);
    output.usage.output = candidates + thoughts;
    output.usage.cache_read = cached;
    output.usage.cache_write = 0;
    output.usage.total_tokens = prompt + candidates + thoughts;
}

fn build_request(model: &Model, context: &Context, options: &StreamOptions) -> serde_json::Value {
    let mut request = json!({
        "contents": convert_contents(model, context),
    });

    if let Some(system) = &context.system_prompt {
        request["systemInstruction"] = json!({
            "parts": [{ "text": sanitize_for_api(system) }],
        });
    }

    if let Some(tools) = &context.tools {
        if !tools.is_empty() {
            request["tools"] = convert_tools(tools);
        }
    }

    let mut generation_config = json!({});
    if let Some(temperature) = options.temperature {
        generation_config["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = options.max_tokens {
        generation_config["maxOutputTokens"] = json!(max_tokens);
    }

    let level = reasoning::effective_level(model.reasoning, options.reasoning);
    if model.reasoning {
        let mut thinking_config = json!({});
        if reasoning::google_uses_thinking_level(&model.id) {
            thinking_config["thinkingLevel"] =
                json!(reasoning::google_thinking_level(level).to_uppercase());
        } else {
            let budget = options
                .thinking_budget_tokens
                .unwrap_or_else(|| reasoning::google_budget_tokens(level));
            thinking_config["thinkingBudget"] = json!(budget);
        }
        if level != ReasoningLevel::Off {
            thinking_config["includeThoughts"] = json!(true);
        }
        generation_config["thinkingConfig"] = thinking_config;
    }

    request["generationConfig"] = generation_config;
    request
}

fn convert_contents(model: &Model, context: &Context) -> serde_json::Value {
    let prepared = prepare_messages(&context.messages, &TargetModel::of(model));
    let mut contents: Vec<serde_json::Value> = Vec::new();

    for message in &prepared {
        match message {
            Message::User(user) => {
                let parts: Vec<serde_json::Value> = match &user.content {
                    UserContent::Text(text) => {
                        vec![json!({ "text": sanitize_for_api(text) })]
                    }
                    UserContent::Multi(blocks) => blocks
                        .iter()
                        .filter_map(|block| match block {
                            UserContentBlock::Text(t) => {
                                Some(json!({ "text": sanitize_for_api(&t.text) }))
                            }
                            UserContentBlock::Image(img) => model.supports_images().then(|| {
                                json!({
                                    "inlineData": {
                                        "mimeType": img.mime_type,
                                        "data": img.to_base64(),
                                    }
                                })
                            }),
                        })
                        .collect(),
                };
                contents.push(json!({ "role": "user", "parts": parts }));
            }
            Message::Assistant(assistant) => {
                let parts: Vec<serde_json::Value> = assistant
                    .content
                    .iter()
                    .filter_map(|block| match block {
                        Content::Text { inner } if !inner.text.is_empty() => {
                            Some(json!({ "text": sanitize_for_api(&inner.text) }))
                        }
                        Content::ToolCall { inner } => Some(json!({
                            "functionCall": {
                                "name": inner.name,
                                "args": inner.arguments,
                            }
                        })),
                        _ => None,
                    })
                    .collect();

                if !parts.is_empty() {
                    contents.push(json!({ "role": "model", "parts": parts }));
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

                contents.push(json!({
                    "role": "user",
                    "parts": [{
                        "functionResponse": {
                            "name": result.tool_name,
                            "response": { "output": text },
                        }
                    }]
                }));
            }
        }
    }

    json!(contents)
}

fn convert_tools(tools: &[Tool]) -> serde_json::Value {
    let declarations: Vec<serde_json::Value> = tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            })
        })
        .collect();
    json!([{ "functionDeclarations": declarations }])
}

// Wire chunk types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleChunk {
    candidates: Option<Vec<GoogleCandidate>>,
    usage_metadata: Option<GoogleUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleCandidate {
    content: Option<GoogleContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleContent {
    parts: Option<Vec<GooglePart>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GooglePart {
    text: Option<String>,
    thought: Option<bool>,
    thought_signature: Option<String>,
    function_call: Option<GoogleFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct GoogleFunctionCall {
    name: String,
    args: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleUsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
    thoughts_token_count: Option<u32>,
    cached_content_token_count: Option<u32>,
}
