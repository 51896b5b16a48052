//! The stateful agent loop: drives multi-turn tool-calling conversations
//! with mid-run steering, queued follow-ups, and cooperative cancellation.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::types::{
    AgentContext, AgentEvent, AgentEventSender, AgentEventStream, AgentLoopConfig, AgentMessage,
    AgentTool, AgentToolResult, MessageQueueFn,
};
use crate::error::Error;
use crate::types::{
    AssistantMessage, AssistantMessageEvent, Context, Message, SimpleStreamOptions, StopReason,
    Tool, ToolCall, ToolResultMessage,
};
use crate::utils::validate_tool_arguments;

/// Result text for tool calls preempted by a queued steering message.
pub const SKIPPED_TOOL_CALL_TEXT: &str = "Skipped due to queued user message";

/// Start an agent run with new prompt messages. The prompts are appended to
/// the context and announced as the first turn's messages.
pub fn agent_loop(
    prompts: Vec<AgentMessage>,
    context: AgentContext,
    config: AgentLoopConfig,
) -> AgentEventStream {
    let (stream, sender) = AgentEventStream::new();

    tokio::spawn(async move {
        run_loop(context, prompts, config, sender).await;
    });

    stream
}

/// Continue a run from the current context without a new user prompt,
/// typically to process queued follow-ups.
///
/// # Errors
///
/// The context must be non-empty and must not end with an assistant
/// message (there would be nothing to respond to).
pub fn agent_loop_continue(
    context: AgentContext,
    config: AgentLoopConfig,
) -> crate::error::Result<AgentEventStream> {
    if context.messages.is_empty() {
        return Err(Error::InvalidResponse(
            "Cannot continue: no messages in context".to_string(),
        ));
    }

    if matches!(context.messages.last(), Some(Message::Assistant(_))) {
        return Err(Error::InvalidResponse(
            "Cannot continue: context already ends with an assistant message".to_string(),
        ));
    }

    let (stream, sender) = AgentEventStream::new();

    tokio::spawn(async move {
        run_loop(context, Vec::new(), config, sender).await;
    });

    Ok(stream)
}

async fn run_loop(
    mut context: AgentContext,
    prompts: Vec<AgentMessage>,
    config: AgentLoopConfig,
    mut sender: AgentEventSender,
) {
    let cancel = config.cancel.clone().unwrap_or_default();
    let mut new_messages: Vec<AgentMessage> = Vec::new();
    let mut pending: Vec<AgentMessage> = prompts;

    sender.push(AgentEvent::AgentStart);

    'run: loop {
        let mut run_another_turn = true;

        while run_another_turn || !pending.is_empty() {
            if cancel.is_cancelled() {
                break 'run;
            }

            sender.push(AgentEvent::TurnStart);

            for message in pending.drain(..) {
                sender.push(AgentEvent::MessageStart {
                    message: message.clone(),
                });
                sender.push(AgentEvent::MessageEnd {
                    message: message.clone(),
                });
                context.messages.push(message.clone());
                new_messages.push(message);
            }

            let message =
                stream_assistant_response(&mut context, &config, cancel.clone(), &sender).await;
            new_messages.push(Message::Assistant(message.clone()));

            if matches!(message.stop_reason, StopReason::Error | StopReason::Aborted) {
                sender.push(AgentEvent::TurnEnd {
                    message: Message::Assistant(message),
                    tool_results: vec![],
                });
                break 'run;
            }

            let tool_calls = message.tool_calls().len();
            run_another_turn = tool_calls > 0 || message.stop_reason == StopReason::ToolUse;

            let mut tool_results: Vec<AgentMessage> = Vec::new();
            let mut steering: Vec<AgentMessage> = Vec::new();

            if tool_calls > 0 {
                let execution = execute_tool_calls(
                    &context.tools,
                    &message,
                    &cancel,
                    &sender,
                    config.get_steering_messages.as_ref(),
                )
                .await;
                steering = execution.steering;

                for result in execution.results {
                    let as_message = Message::ToolResult(result);
                    context.messages.push(as_message.clone());
                    new_messages.push(as_message.clone());
                    tool_results.push(as_message);
                }
            }

            sender.push(AgentEvent::TurnEnd {
                message: Message::Assistant(message),
                tool_results,
            });

            if cancel.is_cancelled() {
                break 'run;
            }

            pending = if steering.is_empty() {
                drain_queue(config.get_steering_messages.as_ref())
            } else {
                steering
            };
        }

        // The turn ended quietly; a queued follow-up starts another round.
        let follow_ups = drain_queue(config.get_follow_up_messages.as_ref());
        if follow_ups.is_empty() {
            break;
        }
        pending = follow_ups;
    }

    sender.push(AgentEvent::AgentEnd {
        messages: new_messages.clone(),
    });
    sender.end(new_messages);
}

fn drain_queue(queue: Option<&MessageQueueFn>) -> Vec<AgentMessage> {
    queue.map(|get| get()).unwrap_or_default()
}

async fn stream_assistant_response(
    context: &mut AgentContext,
    config: &AgentLoopConfig,
    cancel: CancellationToken,
    sender: &AgentEventSender,
) -> AssistantMessage {
    let llm_messages = (config.convert_to_llm)(&context.messages);
    let tools: Option<Vec<Tool>> = if context.tools.is_empty() {
        None
    } else {
        Some(context.tools.iter().map(|t| t.definition()).collect())
    };

    let llm_context = Context {
        system_prompt: context.system_prompt.clone(),
        messages: llm_messages,
        tools,
    };

    let options = SimpleStreamOptions {
        api_key: config.api_key.clone(),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        reasoning: config.reasoning,
        cancel: Some(cancel),
    };

    let stream_result = match &config.stream_fn {
        Some(stream_fn) => stream_fn(&config.model, &llm_context, options),
        None => crate::stream::stream_simple(&config.model, &llm_context, options),
    };

    let mut stream = match stream_result {
        Ok(stream) => stream,
        Err(error) => {
            // Stream construction failures (unknown api, missing key) still
            // produce an assistant message so the history stays coherent.
            let message = failure_message(config, &error);
            context.messages.push(Message::Assistant(message.clone()));
            sender.push(AgentEvent::MessageStart {
                message: Message::Assistant(message.clone()),
            });
            sender.push(AgentEvent::MessageEnd {
                message: Message::Assistant(message.clone()),
            });
            return message;
        }
    };

    let mut added_partial = false;
    let mut last_partial: Option<AssistantMessage> = None;

    while let Some(event) = stream.next().await {
        match &event {
            AssistantMessageEvent::Start { partial } => {
                last_partial = Some(partial.clone());
                context.messages.push(Message::Assistant(partial.clone()));
                added_partial = true;
                sender.push(AgentEvent::MessageStart {
                    message: Message::Assistant(partial.clone()),
                });
            }
            AssistantMessageEvent::Done { message, .. }
            | AssistantMessageEvent::Error { error: message, .. } => {
                let final_message = message.clone();
                if added_partial {
                    if let Some(slot) = context.messages.last_mut() {
                        *slot = Message::Assistant(final_message.clone());
                    }
                } else {
                    context.messages.push(Message::Assistant(final_message.clone()));
                    sender.push(AgentEvent::MessageStart {
                        message: Message::Assistant(final_message.clone()),
                    });
                }
                sender.push(AgentEvent::MessageEnd {
                    message: Message::Assistant(final_message.clone()),
                });
                return final_message;
            }
            _ => {
                let partial = event.partial().clone();
                if added_partial {
                    if let Some(slot) = context.messages.last_mut() {
                        *slot = Message::Assistant(partial.clone());
                    }
                }
                sender.push(AgentEvent::MessageUpdate {
                    message: Message::Assistant(partial.clone()),
                    assistant_message_event: event,
                });
                last_partial = Some(partial);
            }
        }
    }

    // The stream closed without a terminal event; salvage what we have.
    let message = last_partial.unwrap_or_else(|| {
        failure_message(
            config,
            &Error::InvalidResponse("stream ended without terminal event".to_string()),
        )
    });
    if added_partial {
        if let Some(slot) = context.messages.last_mut() {
            *slot = Message::Assistant(message.clone());
        }
    } else {
        context.messages.push(Message::Assistant(message.clone()));
    }
    sender.push(AgentEvent::MessageEnd {
        message: Message::Assistant(message.clone()),
    });
    message
}

fn failure_message(config: &AgentLoopConfig, error: &Error) -> AssistantMessage {
    let aborted = matches!(error, Error::Aborted);
    AssistantMessage {
        content: vec![],
        api: config.model.api.clone(),
        provider: config.model.provider.clone(),
        model: config.model.id.clone(),
        usage: Default::default(),
        stop_reason: if aborted {
            StopReason::Aborted
        } else {
            StopReason::Error
        },
        error_message: (!aborted).then(|| error.to_string()),
        timestamp: crate::types::message::current_timestamp(),
    }
}

struct ToolExecution {
    results: Vec<ToolResultMessage>,
    steering: Vec<AgentMessage>,
}

/// Execute the assistant's tool calls sequentially in content order.
///
/// Before each call the cancel signal and the steering queue are checked;
/// a queued steering message preempts the remaining calls, which get error
/// results with [`SKIPPED_TOOL_CALL_TEXT`].
async fn execute_tool_calls(
    tools: &[Arc<dyn AgentTool>],
    assistant_message: &AssistantMessage,
    cancel: &CancellationToken,
    sender: &AgentEventSender,
    get_steering_messages: Option<&MessageQueueFn>,
) -> ToolExecution {
    let tool_calls = assistant_message.tool_calls();

    let mut results: Vec<ToolResultMessage> = Vec::new();
    let mut steering: Vec<AgentMessage> = Vec::new();

    for (index, tool_call) in tool_calls.iter().copied().enumerate() {
        if cancel.is_cancelled() {
            break;
        }

        if let Some(get_steering) = get_steering_messages {
            let queued = get_steering();
            if !queued.is_empty() {
                steering = queued;
                for skipped in tool_calls[index..].iter().copied() {
                    results.push(skip_tool_call(skipped, sender));
                }
                break;
            }
        }

        let (result, is_error) = run_single_tool(tools, tool_call, cancel, sender).await;

        sender.push(AgentEvent::ToolExecutionEnd {
            tool_call_id: tool_call.id.clone(),
            tool_name: tool_call.name.clone(),
            result: result.clone(),
            is_error,
        });

        results.push(ToolResultMessage {
            tool_call_id: tool_call.id.clone(),
            tool_name: tool_call.name.clone(),
            content: result.content,
            details: result.details,
            is_error,
            timestamp: crate::types::message::current_timestamp(),
        });
    }

    ToolExecution { results, steering }
}

async fn run_single_tool(
    tools: &[Arc<dyn AgentTool>],
    tool_call: &ToolCall,
    cancel: &CancellationToken,
    sender: &AgentEventSender,
) -> (AgentToolResult, bool) {
    sender.push(AgentEvent::ToolExecutionStart {
        tool_call_id: tool_call.id.clone(),
        tool_name: tool_call.name.clone(),
        args: tool_call.arguments.clone(),
    });

    let Some(tool) = tools.iter().find(|t| t.name() == tool_call.name) else {
        return (
            AgentToolResult::text(format!("Tool {} not found", tool_call.name)),
            true,
        );
    };

    let validated_args = match validate_tool_arguments(&tool.definition(), tool_call) {
        Ok(args) => args,
        Err(error) => return (AgentToolResult::text(error.to_string()), true),
    };

    let events = sender.event_sender();
    let update_id = tool_call.id.clone();
    let update_name = tool_call.name.clone();
    let on_update: super::types::ToolUpdateFn = Box::new(move |partial_result| {
        let _ = events.send(AgentEvent::ToolExecutionUpdate {
            tool_call_id: update_id.clone(),
            tool_name: update_name.clone(),
            partial_result,
        });
    });

    match tool
        .execute(
            tool_call.id.as_str(),
            validated_args,
            cancel.clone(),
            Some(on_update),
        )
        .await
    {
        Ok(result) => (result, false),
        Err(message) => (AgentToolResult::text(message), true),
    }
}

fn skip_tool_call(tool_call: &ToolCall, sender: &AgentEventSender) -> ToolResultMessage {
    let result = AgentToolResult::text(SKIPPED_TOOL_CALL_TEXT);

    sender.push(AgentEvent::ToolExecutionStart {
        tool_call_id: tool_call.id.clone(),
        tool_name: tool_call.name.clone(),
        args: tool_call.arguments.clone(),
    });
    sender.push(AgentEvent::ToolExecutionEnd {
        tool_call_id: tool_call.id.clone(),
        tool_name: tool_call.name.clone(),
        result: result.clone(),
        is_error: true,
    });

    ToolResultMessage {
        tool_call_id: tool_call.id.clone(),
        tool_name: tool_call.name.clone(),
        content: result.content,
        details: result.details,
        is_error: true,
        timestamp: crate::types::message::current_timestamp(),
    }
}
