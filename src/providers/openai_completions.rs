//! OpenAI Chat Completions streaming adapter, also serving every
//! OpenAI-compatible endpoint (Groq, xAI, Mistral, OpenRouter, local
//! servers) through detected or per-model compat flags.

use serde::Deserialize;
use serde_json::json;

use super::shared::{
    build_http_client, convert_messages, convert_tools, finish_current_block,
    handle_reasoning_delta, handle_text_delta, handle_tool_calls, initialize_output,
    map_stop_reason, process_sse_stream, push_stream_done, push_stream_error, reasoning,
    send_streaming_request, update_usage_from_chunk, AssistantThinkingMode, AuthHeader,
    CurrentBlock, OpenAiLikeMessageOptions, OpenAiLikeStreamUsage, OpenAiLikeToolCallDelta,
    ReasoningDelta, SystemPromptRole,
};
use crate::types::{
    Api, AssistantMessage, AssistantMessageEvent, AssistantMessageEventStream, Context,
    EventStreamSender, KnownProvider, MaxTokensField, Model, Provider, StreamOptions,
    ThinkingFormat,
};
use crate::utils::{ThinkFragment, ThinkTagParser};

/// Resolved compatibility settings with all fields decided.
#[derive(Debug, Clone)]
struct ResolvedCompat {
    supports_store: bool,
    supports_developer_role: bool,
    supports_reasoning_effort: bool,
    supports_usage_in_streaming: bool,
    max_tokens_field: MaxTokensField,
    requires_tool_result_name: bool,
    requires_thinking_as_text: bool,
    thinking_format: ThinkingFormat,
    parse_think_tags: bool,
}

pub fn stream_openai_completions(
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
        Api::OpenAICompletions,
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

    let compat = resolve_compat(model);
    let client = build_http_client(
        AuthHeader::Bearer(api_key.as_str()),
        model.headers.as_ref(),
        options.headers.as_ref(),
    )?;
    let params = build_params(model, context, options, &compat);
    let cancel = sender.cancellation(options.cancel.clone());

    let response = send_streaming_request(&client, &model.base_url, &params, &cancel).await?;

    sender.push(AssistantMessageEvent::Start {
        partial: output.clone(),
    });

    let mut current_block: Option<CurrentBlock> = None;
    let mut think_parser = compat.parse_think_tags.then(ThinkTagParser::new);

    process_sse_stream::<StreamChunk, _>(response, &cancel, |chunk| {
        process_chunk(&chunk, output, sender, &mut current_block, &mut think_parser);
    })
    .await?;

    if let Some(parser) = &mut think_parser {
        for fragment in parser.flush() {
            emit_fragment(fragment, output, sender, &mut current_block);
        }
    }

    finish_current_block(&mut current_block, output, sender);
    push_stream_done(output, sender, &model.cost);

    Ok(())
}

fn process_chunk(
    chunk: &StreamChunk,
    output: &mut AssistantMessage,
    sender: &mut EventStreamSender,
    current_block: &mut Option<CurrentBlock>,
    think_parser: &mut Option<ThinkTagParser>,
) {
    if let Some(usage) = &chunk.usage {
        update_usage_from_chunk(usage, output);
    }

    let Some(choice) = chunk.choices.first() else {
        return;
    };

    if let Some(reason) = &choice.finish_reason {
        output.stop_reason = map_stop_reason(reason);
    }

    let Some(delta) = &choice.delta else {
        return;
    };

    if let Some(content) = &delta.content {
        match think_parser {
            Some(parser) => {
                for fragment in parser.feed(content) {
                    emit_fragment(fragment, output, sender, current_block);
                }
            }
            None => handle_text_delta(content, output, sender, current_block),
        }
    }

    let reasoning_text = delta
        .reasoning_content
        .as_ref()
        .or(delta.reasoning.as_ref())
        .or(delta.reasoning_text.as_ref());

    if let Some(text) = reasoning_text {
        handle_reasoning_delta(
            ReasoningDelta {
                text,
                signature: None,
            },
            output,
            sender,
            current_block,
        );
    }

    if let Some(tool_calls) = &delta.tool_calls {
        handle_tool_calls(tool_calls, output, sender, current_block);
    }
}

fn emit_fragment(
    fragment: ThinkFragment,
    output: &mut AssistantMessage,
    sender: &mut EventStreamSender,
    current_block: &mut Option<CurrentBlock>,
) {
    match fragment {
        ThinkFragment::Text(text) => handle_text_delta(&text, output, sender, current_block),
        ThinkFragment::Thinking(thinking) => handle_reasoning_delta(
            ReasoningDelta {
                text: &thinking,
                signature: Some("think_tag"),
            },
            output,
            sender,
            current_block,
        ),
    }
}

fn build_params(
    model: &Model,
    context: &Context,
    options: &StreamOptions,
    compat: &ResolvedCompat,
) -> serde_json::Value {
    let mut params = json!({
        "model": model.id,
        "stream": true,
    });

    let message_options = OpenAiLikeMessageOptions {
        system_role: if model.reasoning && compat.supports_developer_role {
            SystemPromptRole::Developer
        } else {
            SystemPromptRole::System
        },
        requires_tool_result_name: compat.requires_tool_result_name,
        thinking_mode: if compat.requires_thinking_as_text {
            AssistantThinkingMode::AsText
        } else {
            AssistantThinkingMode::Omit
        },
    };
    params["messages"] = convert_messages(model, context, &message_options);

    if compat.supports_usage_in_streaming {
        params["stream_options"] = json!({ "include_usage": true });
    }

    if compat.supports_store {
        params["store"] = json!(false);
    }

    if let Some(max_tokens) = options.max_tokens {
        match compat.max_tokens_field {
            MaxTokensField::MaxTokens => params["max_tokens"] = json!(max_tokens),
            MaxTokensField::MaxCompletionTokens => {
                params["max_completion_tokens"] = json!(max_tokens)
            }
        }
    }

    if let Some(temperature) = options.temperature {
        params["temperature"] = json!(temperature);
    }

    if let Some(tools) = &context.tools {
        if !tools.is_empty() {
            params["tools"] = convert_tools(tools);
        }
    }

    if let Some(tool_choice) = &options.tool_choice {
        params["tool_choice"] = serde_json::to_value(tool_choice).unwrap_or(json!("auto"));
    }

    let level = reasoning::effective_level(model.reasoning, options.reasoning);
    if compat.supports_reasoning_effort {
        if compat.thinking_format == ThinkingFormat::Zai {
            if level != crate::types::ReasoningLevel::Off {
                params["thinking"] = json!({ "type": "enabled" });
            }
        } else if let Some(effort) = reasoning::openai_effort(level, false) {
            params["reasoning_effort"] = json!(effort);
        }
    }

    params
}

/// Detect compatibility settings from provider and base URL.
fn detect_compat(model: &Model) -> ResolvedCompat {
    let provider = &model.provider;
    let base_url = &model.base_url;

    let is_zai =
        matches!(provider, Provider::Known(KnownProvider::Zai)) || base_url.contains("api.z.ai");

    let is_non_standard = matches!(
        provider,
        Provider::Known(KnownProvider::Cerebras)
            | Provider::Known(KnownProvider::Xai)
            | Provider::Known(KnownProvider::Mistral)
            | Provider::Known(KnownProvider::Zai)
    ) || base_url.contains("cerebras.ai")
        || base_url.contains("api.x.ai")
        || base_url.contains("mistral.ai")
        || is_zai;

    let use_max_tokens = matches!(provider, Provider::Known(KnownProvider::Mistral))
        || base_url.contains("mistral.ai");

    let is_grok =
        matches!(provider, Provider::Known(KnownProvider::Xai)) || base_url.contains("api.x.ai");

    let is_mistral = matches!(provider, Provider::Known(KnownProvider::Mistral))
        || base_url.contains("mistral.ai");

    // Local OpenAI-compatible servers inline reasoning as <think> tags.
    let is_local_server = matches!(provider, Provider::Custom(_));

    ResolvedCompat {
        supports_store: !is_non_standard && !is_local_server,
        supports_developer_role: !is_non_standard && !is_local_server,
        supports_reasoning_effort: !is_grok && !is_local_server,
        supports_usage_in_streaming: true,
        max_tokens_field: if use_max_tokens || is_local_server {
            MaxTokensField::MaxTokens
        } else {
            MaxTokensField::MaxCompletionTokens
        },
        requires_tool_result_name: is_mistral,
        requires_thinking_as_text: is_mistral,
        thinking_format: if is_zai {
            ThinkingFormat::Zai
        } else {
            ThinkingFormat::Openai
        },
        parse_think_tags: is_local_server,
    }
}

/// Resolved compatibility settings, merging detected with model overrides.
fn resolve_compat(model: &Model) -> ResolvedCompat {
    let detected = detect_compat(model);

    let Some(explicit) = &model.compat else {
        return detected;
    };

    ResolvedCompat {
        supports_store: explicit.supports_store.unwrap_or(detected.supports_store),
        supports_developer_role: explicit
            .supports_developer_role
            .unwrap_or(detected.supports_developer_role),
        supports_reasoning_effort: explicit
            .supports_reasoning_effort
            .unwrap_or(detected.supports_reasoning_effort),
        supports_usage_in_streaming: explicit
            .supports_usage_in_streaming
            .unwrap_or(detected.supports_usage_in_streaming),
        max_tokens_field: explicit
            .max_tokens_field
            .unwrap_or(detected.max_tokens_field),
        requires_tool_result_name: explicit
            .requires_tool_result_name
            .unwrap_or(detected.requires_tool_result_name),
        requires_thinking_as_text: explicit
            .requires_thinking_as_text
            .unwrap_or(detected.requires_thinking_as_text),
        thinking_format: explicit.thinking_format.unwrap_or(detected.thinking_format),
        parse_think_tags: explicit
            .parse_think_tags
            .unwrap_or(detected.parse_think_tags),
    }
}

// SSE response types

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<OpenAiLikeStreamUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
    reasoning: Option<String>,
    reasoning_text: Option<String>,
    tool_calls: Option<Vec<OpenAiLikeToolCallDelta>>,
}
