//! Types shared by the agent loop and the agent façade.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::types::{
    AssistantMessageEvent, AssistantMessageEventStream, Context, Message, Model, ReasoningLevel,
    SimpleStreamOptions, Tool, ToolCallId, ToolResultContent,
};

/// The application's message type. Applications with richer message types
/// supply their own `convert_to_llm`; the default is the identity on
/// [`Message`].
pub type AgentMessage = Message;

pub type ConvertToLlmFn = Arc<dyn Fn(&[AgentMessage]) -> Vec<Message> + Send + Sync>;

/// Drains a queue of injected messages. Called by the loop between turns
/// and between tool calls; an empty vec means nothing queued.
pub type MessageQueueFn = Arc<dyn Fn() -> Vec<AgentMessage> + Send + Sync>;

/// Signature of the dispatch entry the loop drives; overridable for tests
/// and custom routing.
pub type LoopStreamFn = Arc<
    dyn Fn(&Model, &Context, SimpleStreamOptions) -> Result<AssistantMessageEventStream>
        + Send
        + Sync,
>;

/// Callback for streaming partial tool output to subscribers.
pub type ToolUpdateFn = Box<dyn Fn(AgentToolResult) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct AgentToolResult {
    pub content: Vec<ToolResultContent>,
    pub details: Option<serde_json::Value>,
}

impl AgentToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolResultContent::text(text)],
            details: None,
        }
    }
}

/// A tool the agent can execute.
///
/// `execute` receives the cancel signal and is expected to return promptly
/// once it fires, either with its in-progress partial result or an error.
/// A `String` error becomes an `is_error` tool result visible to the model;
/// it never fails the run.
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &str;

    fn label(&self) -> &str {
        self.name()
    }

    fn description(&self) -> &str;

    fn parameters(&self) -> serde_json::Value;

    async fn execute(
        &self,
        tool_call_id: &str,
        args: serde_json::Value,
        cancel: CancellationToken,
        on_update: Option<ToolUpdateFn>,
    ) -> std::result::Result<AgentToolResult, String>;

    /// The LLM-facing tool definition.
    fn definition(&self) -> Tool {
        Tool::new(self.name(), self.description(), self.parameters())
    }
}

#[derive(Clone, Default)]
pub struct AgentContext {
    pub system_prompt: Option<String>,
    pub messages: Vec<AgentMessage>,
    pub tools: Vec<Arc<dyn AgentTool>>,
}

#[derive(Clone)]
pub struct AgentLoopConfig {
    pub model: Model,
    pub convert_to_llm: ConvertToLlmFn,
    pub reasoning: Option<ReasoningLevel>,
    pub api_key: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    /// Overrides the dispatch layer's `stream_simple` when set.
    pub stream_fn: Option<LoopStreamFn>,
    pub cancel: Option<CancellationToken>,
    pub get_steering_messages: Option<MessageQueueFn>,
    pub get_follow_up_messages: Option<MessageQueueFn>,
}

impl AgentLoopConfig {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            convert_to_llm: Arc::new(|messages| messages.to_vec()),
            reasoning: None,
            api_key: None,
            temperature: None,
            max_tokens: None,
            stream_fn: None,
            cancel: None,
            get_steering_messages: None,
            get_follow_up_messages: None,
        }
    }
}

/// Higher-level event vocabulary emitted by the agent loop.
#[derive(Clone)]
pub enum AgentEvent {
    AgentStart,
    AgentEnd {
        messages: Vec<AgentMessage>,
    },
    TurnStart,
    TurnEnd {
        message: AgentMessage,
        tool_results: Vec<AgentMessage>,
    },
    MessageStart {
        message: AgentMessage,
    },
    MessageUpdate {
        message: AgentMessage,
        assistant_message_event: AssistantMessageEvent,
    },
    MessageEnd {
        message: AgentMessage,
    },
    ToolExecutionStart {
        tool_call_id: ToolCallId,
        tool_name: String,
        args: serde_json::Value,
    },
    ToolExecutionUpdate {
        tool_call_id: ToolCallId,
        tool_name: String,
        partial_result: AgentToolResult,
    },
    ToolExecutionEnd {
        tool_call_id: ToolCallId,
        tool_name: String,
        result: AgentToolResult,
        is_error: bool,
    },
}

/// A stream of agent events with a latched final result: the messages the
/// run appended to the context.
pub struct AgentEventStream {
    receiver: UnboundedReceiverStream<AgentEvent>,
    result_receiver: Option<oneshot::Receiver<Vec<AgentMessage>>>,
}

pub struct AgentEventSender {
    events: mpsc::UnboundedSender<AgentEvent>,
    result: Option<oneshot::Sender<Vec<AgentMessage>>>,
}

impl AgentEventStream {
    pub fn new() -> (Self, AgentEventSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = oneshot::channel();

        let stream = Self {
            receiver: UnboundedReceiverStream::new(rx),
            result_receiver: Some(result_rx),
        };

        let sender = AgentEventSender {
            events: tx,
            result: Some(result_tx),
        };

        (stream, sender)
    }

    /// Await the messages produced by the run.
    pub async fn result(mut self) -> Result<Vec<AgentMessage>> {
        let receiver = self
            .result_receiver
            .take()
            .ok_or_else(|| Error::InvalidResponse("result() already called".to_string()))?;

        receiver
            .await
            .map_err(|_| Error::InvalidResponse("Agent loop ended without result".to_string()))
    }
}

impl Stream for AgentEventStream {
    type Item = AgentEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}

impl AgentEventSender {
    pub fn push(&self, event: AgentEvent) {
        // Ignore send errors: the consumer may have been dropped.
        let _ = self.events.send(event);
    }

    /// A cloneable raw event sender for update callbacks.
    pub(crate) fn event_sender(&self) -> mpsc::UnboundedSender<AgentEvent> {
        self.events.clone()
    }

    /// Latch the run result and close the stream.
    pub fn end(&mut self, messages: Vec<AgentMessage>) {
        if let Some(sender) = self.result.take() {
            let _ = sender.send(messages);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn agent_stream_yields_events_and_result() {
        let (mut stream, mut sender) = AgentEventStream::new();

        sender.push(AgentEvent::AgentStart);
        sender.push(AgentEvent::AgentEnd {
            messages: vec![Message::user("hi")],
        });
        sender.end(vec![Message::user("hi")]);
        drop(sender);

        let events: Vec<_> = stream.by_ref().collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], AgentEvent::AgentStart));

        let result = stream.result().await.unwrap();
        assert_eq!(result.len(), 1);
    }
}
