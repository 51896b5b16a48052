use super::content::ToolCall;
use super::message::AssistantMessage;
use super::usage::StopReason;

/// Normalized event vocabulary pushed by every provider adapter.
///
/// Every non-terminal event carries `partial`, the in-progress assistant
/// message with all deltas so far applied. Terminal events (`Done`/`Error`)
/// carry the finalized message; a stream yields at most one of them.
#[derive(Debug, Clone)]
pub enum AssistantMessageEvent {
    Start { partial: AssistantMessage },
    TextStart { content_index: usize, partial: AssistantMessage },
    TextDelta { content_index: usize, delta: String, partial: AssistantMessage },
    TextEnd { content_index: usize, content: String, partial: AssistantMessage },
    ThinkingStart { content_index: usize, partial: AssistantMessage },
    ThinkingDelta { content_index: usize, delta: String, partial: AssistantMessage },
    ThinkingEnd { content_index: usize, content: String, partial: AssistantMessage },
    ToolCallStart { content_index: usize, partial: AssistantMessage },
    ToolCallDelta { content_index: usize, delta: String, partial: AssistantMessage },
    ToolCallEnd { content_index: usize, tool_call: ToolCall, partial: AssistantMessage },
    Done { reason: StopReasonSuccess, message: AssistantMessage },
    Error { reason: StopReasonError, error: AssistantMessage },
}

impl AssistantMessageEvent {
    /// The in-progress (or final) message carried by this event.
    pub fn partial(&self) -> &AssistantMessage {
        match self {
            Self::Start { partial }
            | Self::TextStart { partial, .. }
            | Self::TextDelta { partial, .. }
            | Self::TextEnd { partial, .. }
            | Self::ThinkingStart { partial, .. }
            | Self::ThinkingDelta { partial, .. }
            | Self::ThinkingEnd { partial, .. }
            | Self::ToolCallStart { partial, .. }
            | Self::ToolCallDelta { partial, .. }
            | Self::ToolCallEnd { partial, .. } => partial,
            Self::Done { message, .. } => message,
            Self::Error { error, .. } => error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReasonSuccess {
    Stop,
    Length,
    ToolUse,
}

impl From<StopReasonSuccess> for StopReason {
    fn from(value: StopReasonSuccess) -> Self {
        match value {
            StopReasonSuccess::Stop => Self::Stop,
            StopReasonSuccess::Length => Self::Length,
            StopReasonSuccess::ToolUse => Self::ToolUse,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReasonError {
    Error,
    Aborted,
}

impl From<StopReasonError> for StopReason {
    fn from(value: StopReasonError) -> Self {
        match value {
            StopReasonError::Error => Self::Error,
            StopReasonError::Aborted => Self::Aborted,
        }
    }
}
