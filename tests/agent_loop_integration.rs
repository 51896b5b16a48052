//! End-to-end agent loop scenarios driven by a scripted stream function:
//! tool round trips, argument validation, mid-run steering, cancellation,
//! and queued follow-ups.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use manifold_llm::agent::{
    agent_loop, AgentContext, AgentEvent, AgentLoopConfig, AgentTool, AgentToolResult,
    LoopStreamFn, ToolUpdateFn, SKIPPED_TOOL_CALL_TEXT,
};
use manifold_llm::{
    Agent, Api, AssistantMessage, AssistantMessageEvent, AssistantMessageEventStream, Content,
    Context, InputType, Message, Model, ModelCost, Provider, StopReason, StopReasonError,
    StopReasonSuccess, ToolCall, ToolResultContent, Usage,
};

fn test_model() -> Model {
    Model {
        id: "scripted-agent".to_string(),
        name: "Scripted Agent Model".to_string(),
        api: Api::Custom("scripted-agent".to_string()),
        provider: Provider::Custom("scripted".to_string()),
        base_url: "memory://scripted".to_string(),
        reasoning: false,
        input: vec![InputType::Text],
        cost: ModelCost::ZERO,
        context_window: 32_768,
        max_tokens: 4_096,
        headers: None,
        compat: None,
    }
}

#[derive(Clone)]
enum Script {
    Text(&'static str),
    ToolCalls(Vec<(&'static str, serde_json::Value)>),
    HangUntilCancel(&'static str),
}

fn blank_output(model: &Model) -> AssistantMessage {
    AssistantMessage {
        content: vec![],
        api: model.api.clone(),
        provider: model.provider.clone(),
        model: model.id.clone(),
        usage: Usage::default(),
        stop_reason: StopReason::Stop,
        error_message: None,
        timestamp: 0,
    }
}

fn play(
    script: Script,
    model: &Model,
    cancel: Option<CancellationToken>,
) -> AssistantMessageEventStream {
    let (stream, mut sender) = AssistantMessageEventStream::new();
    let mut output = blank_output(model);

    match script {
        Script::Text(text) => {
            sender.push(AssistantMessageEvent::Start {
                partial: output.clone(),
            });
            output.content.push(Content::text(""));
            sender.push(AssistantMessageEvent::TextStart {
                content_index: 0,
                partial: output.clone(),
            });
            if let Some(Content::Text { inner }) = output.content.last_mut() {
                inner.text = text.to_string();
            }
            sender.push(AssistantMessageEvent::TextDelta {
                content_index: 0,
                delta: text.to_string(),
                partial: output.clone(),
            });
            sender.push(AssistantMessageEvent::TextEnd {
                content_index: 0,
                content: text.to_string(),
                partial: output.clone(),
            });
            output.usage.output = 4;
            output.usage.total_tokens = 4;
            sender.push(AssistantMessageEvent::Done {
                reason: StopReasonSuccess::Stop,
                message: output,
            });
        }
        Script::ToolCalls(calls) => {
            output.stop_reason = StopReason::ToolUse;
            sender.push(AssistantMessageEvent::Start {
                partial: output.clone(),
            });
            for (index, (name, args)) in calls.into_iter().enumerate() {
                let id = format!("call_{}", index + 1);
                output
                    .content
                    .push(Content::tool_call(id.clone(), name, args.clone()));
                sender.push(AssistantMessageEvent::ToolCallStart {
                    content_index: index,
                    partial: output.clone(),
                });
                sender.push(AssistantMessageEvent::ToolCallDelta {
                    content_index: index,
                    delta: args.to_string(),
                    partial: output.clone(),
                });
                sender.push(AssistantMessageEvent::ToolCallEnd {
                    content_index: index,
                    tool_call: ToolCall {
                        id: id.into(),
                        name: name.to_string(),
                        arguments: args,
                        thought_signature: None,
                    },
                    partial: output.clone(),
                });
            }
            output.usage.output = 7;
            output.usage.total_tokens = 7;
            sender.push(AssistantMessageEvent::Done {
                reason: StopReasonSuccess::ToolUse,
                message: output,
            });
        }
        Script::HangUntilCancel(text) => {
            let cancel = cancel.unwrap_or_default();
            tokio::spawn(async move {
                sender.push(AssistantMessageEvent::Start {
                    partial: output.clone(),
                });
                output.content.push(Content::text(""));
                sender.push(AssistantMessageEvent::TextStart {
                    content_index: 0,
                    partial: output.clone(),
                });
                if let Some(Content::Text { inner }) = output.content.last_mut() {
                    inner.text = text.to_string();
                }
                sender.push(AssistantMessageEvent::TextDelta {
                    content_index: 0,
                    delta: text.to_string(),
                    partial: output.clone(),
                });

                cancel.cancelled().await;

                output.stop_reason = StopReason::Aborted;
                sender.push(AssistantMessageEvent::Error {
                    reason: StopReasonError::Aborted,
                    error: output,
                });
            });
        }
    }

    stream
}

fn scripted_stream_fn(
    scripts: Vec<Script>,
    contexts: Arc<Mutex<Vec<Context>>>,
) -> LoopStreamFn {
    let queue = Arc::new(Mutex::new(VecDeque::from(scripts)));
    Arc::new(move |model, context, options| {
        contexts.lock().unwrap().push(context.clone());
        let script = queue
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted stream fn called more times than scripted");
        Ok(play(script, model, options.cancel))
    })
}

struct StubTool {
    name: &'static str,
    schema: serde_json::Value,
    reply: &'static str,
    invocations: Arc<AtomicUsize>,
    on_invoke: Option<Box<dyn Fn() + Send + Sync>>,
}

impl StubTool {
    fn new(name: &'static str, schema: serde_json::Value, reply: &'static str) -> Self {
        Self {
            name,
            schema,
            reply,
            invocations: Arc::new(AtomicUsize::new(0)),
            on_invoke: None,
        }
    }
}

#[async_trait]
impl AgentTool for StubTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "stub tool"
    }

    fn parameters(&self) -> serde_json::Value {
        self.schema.clone()
    }

    async fn execute(
        &self,
        _tool_call_id: &str,
        _args: serde_json::Value,
        _cancel: CancellationToken,
        _on_update: Option<ToolUpdateFn>,
    ) -> Result<AgentToolResult, String> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &self.on_invoke {
            hook();
        }
        Ok(AgentToolResult::text(self.reply))
    }
}

fn string_arg_schema(field: &str) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": { field: { "type": "string" } },
        "required": [field]
    })
}

fn result_text(message: &Message) -> &str {
    match message {
        Message::ToolResult(result) => match &result.content[0] {
            ToolResultContent::Text(t) => &t.text,
            ToolResultContent::Image(_) => panic!("expected text result"),
        },
        other => panic!("expected tool result, got {other:?}"),
    }
}

#[tokio::test]
async fn tool_call_round_trip_produces_four_messages() {
    let contexts = Arc::new(Mutex::new(Vec::new()));
    let weather = Arc::new(StubTool::new(
        "get_weather",
        string_arg_schema("city"),
        "sunny, 22C",
    ));
    let invocations = Arc::clone(&weather.invocations);

    let mut config = AgentLoopConfig::new(test_model());
    config.stream_fn = Some(scripted_stream_fn(
        vec![
            Script::ToolCalls(vec![("get_weather", json!({"city": "Tokyo"}))]),
            Script::Text("Sunny, 22°C."),
        ],
        Arc::clone(&contexts),
    ));

    let context = AgentContext {
        system_prompt: None,
        messages: vec![],
        tools: vec![weather],
    };

    let stream = agent_loop(vec![Message::user("weather in Tokyo?")], context, config);
    let messages = stream.result().await.unwrap();

    assert_eq!(messages.len(), 4);
    assert!(matches!(messages[0], Message::User(_)));
    match &messages[1] {
        Message::Assistant(assistant) => {
            assert_eq!(assistant.tool_calls().len(), 1);
            assert_eq!(assistant.stop_reason, StopReason::ToolUse);
        }
        other => panic!("expected assistant, got {other:?}"),
    }
    assert_eq!(result_text(&messages[2]), "sunny, 22C");
    match &messages[3] {
        Message::Assistant(assistant) => match &assistant.content[0] {
            Content::Text { inner } => assert_eq!(inner.text, "Sunny, 22°C."),
            other => panic!("expected text, got {other:?}"),
        },
        other => panic!("expected assistant, got {other:?}"),
    }

    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    // The second LLM call saw the tool result in its context.
    let recorded = contexts.lock().unwrap();
    assert_eq!(recorded.len(), 2);
    assert!(recorded[1]
        .messages
        .iter()
        .any(|m| matches!(m, Message::ToolResult(r) if !r.is_error)));
}

#[tokio::test]
async fn invalid_tool_args_skip_execute_and_continue_the_loop() {
    let contexts = Arc::new(Mutex::new(Vec::new()));
    let search = Arc::new(StubTool::new(
        "search",
        string_arg_schema("query"),
        "unused",
    ));
    let invocations = Arc::clone(&search.invocations);

    let mut config = AgentLoopConfig::new(test_model());
    config.stream_fn = Some(scripted_stream_fn(
        vec![
            Script::ToolCalls(vec![("search", json!({"query": 42}))]),
            Script::Text("Let me try differently."),
        ],
        Arc::clone(&contexts),
    ));

    let context = AgentContext {
        system_prompt: None,
        messages: vec![],
        tools: vec![search],
    };

    let stream = agent_loop(vec![Message::user("find it")], context, config);
    let messages = stream.result().await.unwrap();

    // user, assistant(tool_call), error tool result, assistant(text)
    assert_eq!(messages.len(), 4);
    match &messages[2] {
        Message::ToolResult(result) => {
            assert!(result.is_error);
            assert!(result_text(&messages[2]).contains("Validation failed"));
        }
        other => panic!("expected tool result, got {other:?}"),
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
    assert_eq!(contexts.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn steering_skips_remaining_tool_calls_and_drives_next_turn() {
    let contexts = Arc::new(Mutex::new(Vec::new()));
    let steering_queue: Arc<Mutex<Vec<Message>>> = Arc::new(Mutex::new(Vec::new()));

    // Tool A enqueues a steering message while it runs, as if the user
    // typed during execution.
    let queue_for_tool = Arc::clone(&steering_queue);
    let mut tool_a = StubTool::new("tool_a", string_arg_schema("input"), "done-1");
    tool_a.on_invoke = Some(Box::new(move || {
        queue_for_tool.lock().unwrap().push(Message::user("stop"));
    }));
    let tool_a = Arc::new(tool_a);
    let tool_b = Arc::new(StubTool::new("tool_b", string_arg_schema("input"), "done-2"));
    let b_invocations = Arc::clone(&tool_b.invocations);

    let mut config = AgentLoopConfig::new(test_model());
    config.stream_fn = Some(scripted_stream_fn(
        vec![
            Script::ToolCalls(vec![
                ("tool_a", json!({"input": "first"})),
                ("tool_b", json!({"input": "second"})),
            ]),
            Script::Text("Stopping as requested."),
        ],
        Arc::clone(&contexts),
    ));
    let queue_for_loop = Arc::clone(&steering_queue);
    config.get_steering_messages = Some(Arc::new(move || {
        queue_for_loop.lock().unwrap().drain(..).collect()
    }));

    let context = AgentContext {
        system_prompt: None,
        messages: vec![],
        tools: vec![tool_a, tool_b],
    };

    let stream = agent_loop(vec![Message::user("do both things")], context, config);
    let messages = stream.result().await.unwrap();

    // user, assistant(2 calls), real result, skipped result, steering user,
    // assistant(text)
    assert_eq!(messages.len(), 6);
    assert_eq!(result_text(&messages[2]), "done-1");
    assert_eq!(result_text(&messages[3]), SKIPPED_TOOL_CALL_TEXT);
    match &messages[3] {
        Message::ToolResult(result) => assert!(result.is_error),
        other => panic!("expected tool result, got {other:?}"),
    }
    match &messages[4] {
        Message::User(user) => match &user.content {
            manifold_llm::UserContent::Text(text) => assert_eq!(text, "stop"),
            other => panic!("expected text, got {other:?}"),
        },
        other => panic!("expected user message, got {other:?}"),
    }

    assert_eq!(b_invocations.load(Ordering::SeqCst), 0);

    // The steering message reached the second LLM call.
    let recorded = contexts.lock().unwrap();
    assert_eq!(recorded.len(), 2);
    let last = recorded[1].messages.last().unwrap();
    assert!(matches!(last, Message::User(_)));
}

#[tokio::test]
async fn cancellation_finalizes_with_aborted_and_agent_end() {
    let contexts = Arc::new(Mutex::new(Vec::new()));
    let cancel = CancellationToken::new();

    let mut config = AgentLoopConfig::new(test_model());
    config.cancel = Some(cancel.clone());
    config.stream_fn = Some(scripted_stream_fn(
        vec![Script::HangUntilCancel("Once upon a time")],
        Arc::clone(&contexts),
    ));

    let context = AgentContext::default();
    let mut stream = agent_loop(vec![Message::user("tell me a story")], context, config);

    let mut aborted_messages = 0;
    let mut events_after_agent_end = 0;
    let mut agent_ended = false;
    let mut final_messages = Vec::new();

    while let Some(event) = stream.next().await {
        if agent_ended {
            events_after_agent_end += 1;
        }
        match event {
            AgentEvent::MessageUpdate { .. } => {
                // Abort mid-stream, once the text started flowing.
                cancel.cancel();
            }
            AgentEvent::MessageEnd { message } => {
                if let Message::Assistant(assistant) = &message {
                    if assistant.stop_reason == StopReason::Aborted {
                        aborted_messages += 1;
                    }
                }
            }
            AgentEvent::AgentEnd { messages } => {
                agent_ended = true;
                final_messages = messages;
            }
            _ => {}
        }
    }

    assert!(agent_ended);
    assert_eq!(events_after_agent_end, 0);
    assert_eq!(aborted_messages, 1);

    let last = final_messages.last().unwrap();
    match last {
        Message::Assistant(assistant) => {
            assert_eq!(assistant.stop_reason, StopReason::Aborted);
        }
        other => panic!("expected assistant, got {other:?}"),
    }
}

#[tokio::test]
async fn follow_ups_start_a_new_turn_after_the_run_quiesces() {
    let contexts = Arc::new(Mutex::new(Vec::new()));
    let follow_up: Arc<Mutex<Option<Message>>> =
        Arc::new(Mutex::new(Some(Message::user("and then?"))));

    let mut config = AgentLoopConfig::new(test_model());
    config.stream_fn = Some(scripted_stream_fn(
        vec![Script::Text("First answer."), Script::Text("Second answer.")],
        Arc::clone(&contexts),
    ));
    let queue = Arc::clone(&follow_up);
    config.get_follow_up_messages = Some(Arc::new(move || {
        queue.lock().unwrap().take().into_iter().collect()
    }));

    let context = AgentContext::default();
    let stream = agent_loop(vec![Message::user("begin")], context, config);
    let messages = stream.result().await.unwrap();

    // user, assistant, follow-up user, assistant
    assert_eq!(messages.len(), 4);
    assert!(matches!(&messages[2], Message::User(_)));
    assert_eq!(contexts.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn facade_runs_a_prompt_and_notifies_subscribers() {
    let contexts = Arc::new(Mutex::new(Vec::new()));
    let agent = Agent::new(test_model());
    agent.set_stream_fn(Some(scripted_stream_fn(
        vec![Script::Text("Hello there.")],
        Arc::clone(&contexts),
    )));

    let starts = Arc::new(AtomicUsize::new(0));
    let ends = Arc::new(AtomicUsize::new(0));
    let starts_clone = Arc::clone(&starts);
    let ends_clone = Arc::clone(&ends);
    agent.subscribe(move |event| match event {
        AgentEvent::AgentStart => {
            starts_clone.fetch_add(1, Ordering::SeqCst);
        }
        AgentEvent::AgentEnd { .. } => {
            ends_clone.fetch_add(1, Ordering::SeqCst);
        }
        _ => {}
    });

    agent.prompt("hi").await.unwrap();

    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert_eq!(ends.load(Ordering::SeqCst), 1);
    assert!(!agent.is_running());

    let messages = agent.messages();
    assert_eq!(messages.len(), 2);
    assert!(matches!(&messages[0], Message::User(_)));
    assert!(matches!(&messages[1], Message::Assistant(_)));
}

#[tokio::test]
async fn facade_steering_preempts_remaining_tools() {
    let contexts = Arc::new(Mutex::new(Vec::new()));
    let agent = Agent::new(test_model());

    // Tool A steers the agent mid-run through the façade handle.
    let agent_for_tool = agent.clone();
    let mut tool_a = StubTool::new("tool_a", string_arg_schema("input"), "done-1");
    tool_a.on_invoke = Some(Box::new(move || {
        agent_for_tool.steer(Message::user("stop"));
    }));
    let tool_b = Arc::new(StubTool::new("tool_b", string_arg_schema("input"), "done-2"));
    let b_invocations = Arc::clone(&tool_b.invocations);

    agent
        .set_tools(vec![Arc::new(tool_a), tool_b])
        .unwrap();
    agent.set_stream_fn(Some(scripted_stream_fn(
        vec![
            Script::ToolCalls(vec![
                ("tool_a", json!({"input": "first"})),
                ("tool_b", json!({"input": "second"})),
            ]),
            Script::Text("Stopped."),
        ],
        Arc::clone(&contexts),
    )));

    agent.prompt("do both").await.unwrap();

    assert_eq!(b_invocations.load(Ordering::SeqCst), 0);
    let messages = agent.messages();
    let skipped = messages
        .iter()
        .filter(|m| matches!(m, Message::ToolResult(r) if r.is_error))
        .count();
    assert_eq!(skipped, 1);
}
