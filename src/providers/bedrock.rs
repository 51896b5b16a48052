//! Amazon Bedrock ConverseStream adapter.
//!
//! Rides on `aws-sdk-bedrockruntime`, which supplies the SigV4 credential
//! chain; the event stream arrives as typed `ConverseStreamOutput` values
//! rather than SSE lines.

use aws_config::BehaviorVersion;
use aws_sdk_bedrockruntime::types::{
    ContentBlock as BedrockContentBlock, ContentBlockDelta, ContentBlockStart,
    ConversationRole, ConverseStreamOutput, ImageBlock, ImageFormat, ImageSource,
    InferenceConfiguration, Message as BedrockMessage, ReasoningContentBlockDelta,
    StopReason as BedrockStopReason, SystemContentBlock, Tool as BedrockTool,
    ToolConfiguration, ToolInputSchema, ToolResultBlock, ToolResultContentBlock,
    ToolResultStatus, ToolSpecification, ToolUseBlock,
};
use aws_smithy_types::{Blob, Document, Number};
use serde_json::json;

use super::shared::{
    finish_current_block, initialize_output, push_stream_done, push_stream_error, reasoning,
    CurrentBlock,
};
use crate::transform::{prepare_messages, TargetModel};
use crate::types::{
    Api, AssistantMessage, AssistantMessageEvent, AssistantMessageEventStream, Content, Context,
    EventStreamSender, Message, Model, ReasoningLevel, StopReason, StreamOptions,
    ToolResultContent, UserContent, UserContentBlock,
};
use crate::utils::sanitize_for_api;

pub fn stream_bedrock(
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
        Api::BedrockConverseStream,
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
    let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let client = aws_sdk_bedrockruntime::Client::new(&config);
    let cancel = sender.cancellation(options.cancel.clone());

    let mut request = client.converse_stream().model_id(&model.id);

    if let Some(system) = &context.system_prompt {
        request = request.system(SystemContentBlock::Text(sanitize_for_api(system)));
    }

    for message in convert_messages(model, context)? {
        request = request.messages(message);
    }

    if let Some(tools) = &context.tools {
        if !tools.is_empty() {
            let mut tool_config = ToolConfiguration::builder();
            for tool in tools {
                let spec = ToolSpecification::builder()
                    .name(&tool.name)
                    .description(&tool.description)
                    .input_schema(ToolInputSchema::Json(value_to_document(&tool.parameters)))
                    .build()
                    .map_err(|e| crate::Error::InvalidResponse(e.to_string()))?;
                tool_config = tool_config.tools(BedrockTool::ToolSpec(spec));
            }
            request = request.tool_config(
                tool_config
                    .build()
                    .map_err(|e| crate::Error::InvalidResponse(e.to_string()))?,
            );
        }
    }

    let mut inference = InferenceConfiguration::builder()
        .max_tokens(options.max_tokens.unwrap_or(model.max_tokens) as i32);
    if let Some(temperature) = options.temperature {
        inference = inference.temperature(temperature as f32);
    }
    request = request.inference_config(inference.build());

    let level = reasoning::effective_level(model.reasoning, options.reasoning);
    if level != ReasoningLevel::Off {
        let budget = options
            .thinking_budget_tokens
            .or_else(|| reasoning::anthropic_budget_tokens(level, false))
            .unwrap_or(0);
        request = request.additional_model_request_fields(value_to_document(&json!({
            "thinking": { "type": "enabled", "budget_tokens": budget },
        })));
    }

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(crate::Error::Aborted),
        response = request.send() => {
            response.map_err(|e| crate::Error::InvalidResponse(e.to_string()))?
        }
    };

    sender.push(AssistantMessageEvent::Start {
        partial: output.clone(),
    });

    let mut stream = response.stream;
    let mut current_block: Option<CurrentBlock> = None;

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(crate::Error::Aborted),
            event = stream.recv() => {
                event.map_err(|e| crate::Error::InvalidResponse(e.to_string()))?
            }
        };

        let Some(event) = event else {
            break;
        };

        match event {
            ConverseStreamOutput::MessageStart(_) => {}
            ConverseStreamOutput::ContentBlockStart(start_event) => {
                if let Some(ContentBlockStart::ToolUse(start)) = start_event.start {
                    finish_current_block(&mut current_block, output, sender);
                    current_block = Some(CurrentBlock::ToolCall {
                        id: start.tool_use_id.clone(),
                        name: start.name.clone(),
                        partial_args: String::new(),
                    });
                    output.content.push(Content::tool_call(
                        start.tool_use_id,
                        start.name,
                        serde_json::Value::Object(serde_json::Map::new()),
                    ));
                    sender.push(AssistantMessageEvent::ToolCallStart {
                        content_index: output.content.len() - 1,
                        partial: output.clone(),
                    });
                }
            }
            ConverseStreamOutput::ContentBlockDelta(delta_event) => {
                process_delta(delta_event.delta, output, sender, &mut current_block);
            }
            ConverseStreamOutput::ContentBlockStop(_) => {
                finish_current_block(&mut current_block, output, sender);
            }
            ConverseStreamOutput::MessageStop(stop_event) => {
                output.stop_reason = map_bedrock_stop_reason(&stop_event.stop_reason);
            }
            ConverseStreamOutput::Metadata(metadata) => {
                if let Some(usage) = metadata.usage {
                    let cache_read = usage.cache_read_input_tokens.unwrap_or(0).max(0) as u32;
                    let cache_write = usage.cache_write_input_tokens.unwrap_or(0).max(0) as u32;
                    output.usage.input = usage.input_tokens.max(0) as u32;
                    output.usage.output = usage.output_tokens.max(0) as u32;
                    output.usage.cache_read = cache_read;
                    output.usage.cache_write = cache_write;
                    output.usage.total_tokens = usage.total_tokens.max(0) as u32;
                }
            }
            other => {
                log::debug!("dropping unhandled converse stream event: {other:?}");
            }
        }
    }

    finish_current_block(&mut current_block, output, sender);
    push_stream_done(output, sender, &model.cost);

    Ok(())
}

fn process_delta(
    delta: Option<ContentBlockDelta>,
    output: &mut AssistantMessage,
    sender: &mut EventStreamSender,
    current_block: &mut Option<CurrentBlock>,
) {
    use super::shared::{handle_reasoning_delta, handle_text_delta, ReasoningDelta};

    match delta {
        Some(ContentBlockDelta::Text(text)) => {
            handle_text_delta(&text, output, sender, current_block);
        }
        Some(ContentBlockDelta::ReasoningContent(reasoning_delta)) => match reasoning_delta {
            ReasoningContentBlockDelta::Text(text) => {
                handle_reasoning_delta(
                    ReasoningDelta {
                        text: &text,
                        signature: None,
                    },
                    output,
                    sender,
                    current_block,
                );
            }
            ReasoningContentBlockDelta::Signature(signature_delta) => {
                if let Some(CurrentBlock::Thinking { signature, .. }) = current_block {
                    match signature {
                        Some(existing) => existing.push_str(&signature_delta),
                        None => *signature = Some(signature_delta),
                    }
                }
            }
            _ => log::debug!("dropping redacted or unknown reasoning delta"),
        },
        Some(ContentBlockDelta::ToolUse(tool_delta)) => {
            if let Some(CurrentBlock::ToolCall { partial_args, .. }) = current_block {
                partial_args.push_str(&tool_delta.input);
                sender.push(AssistantMessageEvent::ToolCallDelta {
                    content_index: output.content.len() - 1,
                    delta: tool_delta.input,
                    partial: output.clone(),
                });
            }
        }
        _ => log::debug!("dropping unknown content block delta"),
    }
}

fn map_bedrock_stop_reason(reason: &BedrockStopReason) -> StopReason {
    match reason {
        BedrockStopReason::EndTurn | BedrockStopReason::StopSequence => StopReason::Stop,
        BedrockStopReason::MaxTokens => StopReason::Length,
        BedrockStopReason::ToolUse => StopReason::ToolUse,
        BedrockStopReason::ContentFiltered | BedrockStopReason::GuardrailIntervened => {
            StopReason::Error
        }
        _ => StopReason::Stop,
    }
}

fn convert_messages(
    model: &Model,
    context: &Context,
) -> Result<Vec<BedrockMessage>, crate::Error> {
    let prepared = prepare_messages(&context.messages, &TargetModel::of(model));
    let mut messages: Vec<BedrockMessage> = Vec::new();

    for message in &prepared {
        let built = match message {
            Message::User(user) => {
                let mut builder = BedrockMessage::builder().role(ConversationRole::User);
                match &user.content {
                    UserContent::Text(text) => {
                        builder =
                            builder.content(BedrockContentBlock::Text(sanitize_for_api(text)));
                    }
                    UserContent::Multi(blocks) => {
                        for block in blocks {
                            match block {
                                UserContentBlock::Text(t) => {
                                    builder = builder.content(BedrockContentBlock::Text(
                                        sanitize_for_api(&t.text),
                                    ));
                                }
                                UserContentBlock::Image(img) => {
                                    if let Some(image) =
                                        build_image_block(&img.mime_type, &img.data)
                                    {
                                        if model.supports_images() {
                                            builder =
                                                builder.content(BedrockContentBlock::Image(image));
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
                builder.build()
            }
            Message::Assistant(assistant) => {
                let mut builder = BedrockMessage::builder().role(ConversationRole::Assistant);
                let mut any_content = false;
                for block in &assistant.content {
                    match block {
                        Content::Text { inner } if !inner.text.is_empty() => {
                            builder = builder
                                .content(BedrockContentBlock::Text(sanitize_for_api(&inner.text)));
                            any_content = true;
                        }
                        Content::ToolCall { inner } => {
                            let tool_use = ToolUseBlock::builder()
                                .tool_use_id(inner.id.as_str())
                                .name(&inner.name)
                                .input(value_to_document(&inner.arguments))
                                .build()
                                .map_err(|e| crate::Error::InvalidResponse(e.to_string()))?;
                            builder = builder.content(BedrockContentBlock::ToolUse(tool_use));
                            any_content = true;
                        }
                        _ => {}
                    }
                }
                if !any_content {
                    continue;
                }
                builder.build()
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

                let tool_result = ToolResultBlock::builder()
                    .tool_use_id(result.tool_call_id.as_str())
                    .content(ToolResultContentBlock::Text(text))
                    .status(if result.is_error {
                        ToolResultStatus::Error
                    } else {
                        ToolResultStatus::Success
                    })
                    .build()
                    .map_err(|e| crate::Error::InvalidResponse(e.to_string()))?;

                BedrockMessage::builder()
                    .role(ConversationRole::User)
                    .content(BedrockContentBlock::ToolResult(tool_result))
                    .build()
            }
        };

        messages.push(built.map_err(|e| crate::Error::InvalidResponse(e.to_string()))?);
    }

    Ok(messages)
}

fn build_image_block(mime_type: &str, data: &[u8]) -> Option<ImageBlock> {
    let format = match mime_type {
        "image/png" => ImageFormat::Png,
        "image/jpeg" => ImageFormat::Jpeg,
        "image/gif" => ImageFormat::Gif,
        "image/webp" => ImageFormat::Webp,
        _ => return None,
    };

    ImageBlock::builder()
        .format(format)
        .source(ImageSource::Bytes(Blob::new(data.to_vec())))
        .build()
        .ok()
}

/// `serde_json::Value` → `aws_smithy_types::Document`.
fn value_to_document(value: &serde_json::Value) -> Document {
    match value {
        serde_json::Value::Null => Document::Null,
        serde_json::Value::Bool(b) => Document::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Document::Number(Number::PosInt(u))
            } else if let Some(i) = n.as_i64() {
                Document::Number(Number::NegInt(i))
            } else {
                Document::Number(Number::Float(n.as_f64().unwrap_or(0.0)))
            }
        }
        serde_json::Value::String(s) => Document::String(s.clone()),
        serde_json::Value::Array(items) => {
            Document::Array(items.iter().map(value_to_document).collect())
        }
        serde_json::Value::Object(map) => Document::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_document(v)))
                .collect(),
        ),
    }
}
