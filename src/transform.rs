//! Message normalization and cross-provider history transformation.
//!
//! Every adapter runs the conversation through `prepare_messages` before
//! building its wire request:
//! - tool-result messages appearing before any tool-calling assistant
//!   message are elided (truncated histories)
//! - errored/aborted assistant messages are dropped
//! - thinking blocks recorded against a different model become plain text,
//!   or are dropped when empty
//! - orphaned tool calls receive synthetic error results
//! - adjacent user messages are concatenated
//!
//! `transform_messages` additionally supports tool-call ID normalization for
//! wire formats with stricter ID grammars, remapping the matching results.

use crate::types::{
    Api, AssistantMessage, Content, Message, Provider, StopReason, TextContent, ToolCall,
    ToolCallId, ToolResultContent, ToolResultMessage, UserContent,
};
use std::collections::{HashMap, HashSet};

/// Information about the model a request is being built for.
#[derive(Debug, Clone)]
pub struct TargetModel {
    pub api: Api,
    pub provider: Provider,
    pub model_id: String,
}

impl TargetModel {
    pub fn of(model: &crate::types::Model) -> Self {
        Self {
            api: model.api.clone(),
            provider: model.provider.clone(),
            model_id: model.id.clone(),
        }
    }
}

/// Normalize a conversation for a request against `target`.
///
/// This is the shared pipeline every provider adapter applies; see the
/// module docs for the individual rules.
pub fn prepare_messages(messages: &[Message], target: &TargetModel) -> Vec<Message> {
    let trimmed = elide_leading_tool_results(messages);
    let transformed = transform_messages_simple(&trimmed, target);
    merge_adjacent_user_messages(transformed)
}

/// Transform messages for cross-provider compatibility.
///
/// `normalize_tool_call_id` lets a caller rewrite tool-call IDs into the
/// target provider's grammar; matching tool results are remapped.
pub fn transform_messages<F>(
    messages: &[Message],
    target: &TargetModel,
    normalize_tool_call_id: Option<F>,
) -> Vec<Message>
where
    F: Fn(&str, &TargetModel, &AssistantMessage) -> String,
{
    let mut tool_call_id_map: HashMap<ToolCallId, ToolCallId> = HashMap::new();

    let transformed: Vec<Message> = messages
        .iter()
        .filter_map(|msg| {
            transform_message(
                msg,
                target,
                normalize_tool_call_id.as_ref(),
                &mut tool_call_id_map,
            )
        })
        .collect();

    insert_synthetic_tool_results(transformed)
}

/// `transform_messages` without ID normalization.
pub fn transform_messages_simple(messages: &[Message], target: &TargetModel) -> Vec<Message> {
    transform_messages::<fn(&str, &TargetModel, &AssistantMessage) -> String>(
        messages, target, None,
    )
}

fn elide_leading_tool_results(messages: &[Message]) -> Vec<Message> {
    let mut seen_tool_call_assistant = false;

    messages
        .iter()
        .filter(|msg| match msg {
            Message::Assistant(assistant) => {
                if assistant.content.iter().any(|c| c.as_tool_call().is_some()) {
                    seen_tool_call_assistant = true;
                }
                true
            }
            Message::ToolResult(_) => seen_tool_call_assistant,
            Message::User(_) => true,
        })
        .cloned()
        .collect()
}

fn merge_adjacent_user_messages(messages: Vec<Message>) -> Vec<Message> {
    let mut result: Vec<Message> = Vec::with_capacity(messages.len());

    for msg in messages {
        match (&msg, result.last_mut()) {
            (Message::User(incoming), Some(Message::User(previous))) => {
                previous.content = concat_user_content(&previous.content, &incoming.content);
                previous.timestamp = incoming.timestamp;
            }
            _ => result.push(msg),
        }
    }

    result
}

fn concat_user_content(a: &UserContent, b: &UserContent) -> UserContent {
    match (a, b) {
        (UserContent::Text(left), UserContent::Text(right)) => {
            UserContent::Text(format!("{}\n{}", left, right))
        }
        _ => {
            let mut blocks = user_content_blocks(a);
            blocks.extend(user_content_blocks(b));
            UserContent::Multi(blocks)
        }
    }
}

fn user_content_blocks(content: &UserContent) -> Vec<crate::types::UserContentBlock> {
    match content {
        UserContent::Text(text) => vec![crate::types::UserContentBlock::Text(TextContent::new(
            text.clone(),
        ))],
        UserContent::Multi(blocks) => blocks.clone(),
    }
}

fn transform_message<F>(
    msg: &Message,
    target: &TargetModel,
    normalize_fn: Option<&F>,
    id_map: &mut HashMap<ToolCallId, ToolCallId>,
) -> Option<Message>
where
    F: Fn(&str, &TargetModel, &AssistantMessage) -> String,
{
    match msg {
        Message::User(user) => Some(Message::User(user.clone())),

        Message::ToolResult(result) => {
            let tool_call_id = id_map
                .get(&result.tool_call_id)
                .cloned()
                .unwrap_or_else(|| result.tool_call_id.clone());

            Some(Message::ToolResult(ToolResultMessage {
                tool_call_id,
                tool_name: result.tool_name.clone(),
                content: result.content.clone(),
                details: result.details.clone(),
                is_error: result.is_error,
                timestamp: result.timestamp,
            }))
        }

        Message::Assistant(assistant) => {
            if matches!(
                assistant.stop_reason,
                StopReason::Error | StopReason::Aborted
            ) {
                return None;
            }

            let is_same_model = is_same_model_provider(assistant, target);

            let content = assistant
                .content
                .iter()
                .filter_map(|block| {
                    transform_content_block(
                        block,
                        is_same_model,
                        target,
                        assistant,
                        normalize_fn,
                        id_map,
                    )
                })
                .collect();

            Some(Message::Assistant(AssistantMessage {
                content,
                api: assistant.api.clone(),
                provider: assistant.provider.clone(),
                model: assistant.model.clone(),
                usage: assistant.usage.clone(),
                stop_reason: assistant.stop_reason,
                error_message: assistant.error_message.clone(),
                timestamp: assistant.timestamp,
            }))
        }
    }
}

fn is_same_model_provider(msg: &AssistantMessage, target: &TargetModel) -> bool {
    msg.provider == target.provider && msg.api == target.api && msg.model == target.model_id
}

fn transform_content_block<F>(
    block: &Content,
    is_same_model: bool,
    target: &TargetModel,
    assistant: &AssistantMessage,
    normalize_fn: Option<&F>,
    id_map: &mut HashMap<ToolCallId, ToolCallId>,
) -> Option<Content>
where
    F: Fn(&str, &TargetModel, &AssistantMessage) -> String,
{
    match block {
        Content::Thinking { inner } => {
            // Same model with signature: keep for replay.
            if is_same_model && inner.thinking_signature.is_some() {
                return Some(block.clone());
            }

            if inner.thinking.trim().is_empty() {
                return None;
            }

            if is_same_model {
                return Some(block.clone());
            }

            // Different model: downgrade to plain text.
            Some(Content::text(&inner.thinking))
        }

        Content::Text { inner } => {
            if is_same_model {
                Some(block.clone())
            } else {
                Some(Content::Text {
                    inner: TextContent {
                        text: inner.text.clone(),
                        text_signature: None,
                    },
                })
            }
        }

        Content::ToolCall { inner } => {
            let mut new_call = inner.clone();

            if !is_same_model {
                new_call.thought_signature = None;

                if let Some(normalize) = normalize_fn {
                    let normalized_id =
                        ToolCallId::from(normalize(inner.id.as_str(), target, assistant));
                    if normalized_id != inner.id {
                        id_map.insert(inner.id.clone(), normalized_id.clone());
                        new_call.id = normalized_id;
                    }
                }
            }

            Some(Content::ToolCall { inner: new_call })
        }

        Content::Image { .. } => Some(block.clone()),
    }
}

fn insert_synthetic_tool_results(messages: Vec<Message>) -> Vec<Message> {
    let mut result: Vec<Message> = Vec::new();
    let mut pending_tool_calls: Vec<ToolCall> = Vec::new();
    let mut existing_result_ids: HashSet<ToolCallId> = HashSet::new();

    for msg in messages {
        match &msg {
            Message::Assistant(assistant) => {
                insert_orphaned_results(&mut result, &pending_tool_calls, &existing_result_ids);
                pending_tool_calls.clear();
                existing_result_ids.clear();

                for content in &assistant.content {
                    if let Content::ToolCall { inner } = content {
                        pending_tool_calls.push(inner.clone());
                    }
                }

                result.push(msg);
            }

            Message::ToolResult(tool_result) => {
                existing_result_ids.insert(tool_result.tool_call_id.clone());
                result.push(msg);
            }

            Message::User(_) => {
                // A user message interrupts the tool flow.
                insert_orphaned_results(&mut result, &pending_tool_calls, &existing_result_ids);
                pending_tool_calls.clear();
                existing_result_ids.clear();

                result.push(msg);
            }
        }
    }

    insert_orphaned_results(&mut result, &pending_tool_calls, &existing_result_ids);

    result
}

fn insert_orphaned_results(
    result: &mut Vec<Message>,
    pending: &[ToolCall],
    existing: &HashSet<ToolCallId>,
) {
    for tc in pending {
        if !existing.contains(&tc.id) {
            result.push(Message::ToolResult(ToolResultMessage {
                tool_call_id: tc.id.clone(),
                tool_name: tc.name.clone(),
                content: vec![ToolResultContent::text("No result provided")],
                details: None,
                is_error: true,
                timestamp: crate::types::message::current_timestamp(),
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{KnownProvider, ThinkingContent, Usage, UserMessage};

    fn make_target(api: Api, provider: KnownProvider, model_id: &str) -> TargetModel {
        TargetModel {
            api,
            provider: Provider::Known(provider),
            model_id: model_id.to_string(),
        }
    }

    fn make_assistant(
        api: Api,
        provider: KnownProvider,
        model: &str,
        content: Vec<Content>,
    ) -> AssistantMessage {
        AssistantMessage {
            content,
            api,
            provider: Provider::Known(provider),
            model: model.to_string(),
            usage: Usage::default(),
            stop_reason: StopReason::Stop,
            error_message: None,
            timestamp: 0,
        }
    }

    fn make_user(text: &str) -> UserMessage {
        UserMessage {
            content: UserContent::Text(text.to_string()),
            timestamp: 0,
        }
    }

    fn anthropic_target() -> TargetModel {
        make_target(
            Api::AnthropicMessages,
            KnownProvider::Anthropic,
            "claude-sonnet-4-20250514",
        )
    }

    fn make_tool_result(id: &str, name: &str, text: &str) -> ToolResultMessage {
        ToolResultMessage {
            tool_call_id: id.into(),
            tool_name: name.to_string(),
            content: vec![ToolResultContent::text(text)],
            details: None,
            is_error: false,
            timestamp: 0,
        }
    }

    #[test]
    fn user_message_passthrough() {
        let messages = vec![Message::User(make_user("Hello"))];

        let result = prepare_messages(&messages, &anthropic_target());

        assert_eq!(result.len(), 1);
        assert!(matches!(result[0], Message::User(_)));
    }

    #[test]
    fn errored_assistant_messages_are_filtered() {
        let mut assistant = make_assistant(
            Api::AnthropicMessages,
            KnownProvider::Anthropic,
            "claude-sonnet-4-20250514",
            vec![Content::text("Some text")],
        );
        assistant.stop_reason = StopReason::Error;
        assistant.error_message = Some("API error".to_string());

        let messages = vec![
            Message::User(make_user("Hello")),
            Message::Assistant(assistant),
        ];

        let result = prepare_messages(&messages, &anthropic_target());

        assert_eq!(result.len(), 1);
        assert!(matches!(result[0], Message::User(_)));
    }

    #[test]
    fn aborted_assistant_messages_are_filtered() {
        let mut assistant = make_assistant(
            Api::AnthropicMessages,
            KnownProvider::Anthropic,
            "claude-sonnet-4-20250514",
            vec![Content::text("Partial")],
        );
        assistant.stop_reason = StopReason::Aborted;

        let result = prepare_messages(&[Message::Assistant(assistant)], &anthropic_target());
        assert!(result.is_empty());
    }

    #[test]
    fn leading_tool_results_are_elided() {
        let messages = vec![
            Message::ToolResult(make_tool_result("call-0", "search", "stale")),
            Message::User(make_user("Hi")),
        ];

        let result = prepare_messages(&messages, &anthropic_target());

        assert_eq!(result.len(), 1);
        assert!(matches!(result[0], Message::User(_)));
    }

    #[test]
    fn adjacent_user_messages_are_concatenated() {
        let messages = vec![
            Message::User(make_user("first")),
            Message::User(make_user("second")),
        ];

        let result = prepare_messages(&messages, &anthropic_target());

        assert_eq!(result.len(), 1);
        match &result[0] {
            Message::User(user) => match &user.content {
                UserContent::Text(text) => assert_eq!(text, "first\nsecond"),
                UserContent::Multi(_) => panic!("expected text content"),
            },
            _ => panic!("expected user message"),
        }
    }

    #[test]
    fn thinking_kept_for_same_model_with_signature() {
        let thinking = ThinkingContent {
            thinking: "Let me think...".to_string(),
            thinking_signature: Some("sig123".to_string()),
        };
        let assistant = make_assistant(
            Api::AnthropicMessages,
            KnownProvider::Anthropic,
            "claude-sonnet-4-20250514",
            vec![Content::Thinking { inner: thinking }],
        );

        let result =
            transform_messages_simple(&[Message::Assistant(assistant)], &anthropic_target());

        assert_eq!(result.len(), 1);
        let Message::Assistant(a) = &result[0] else {
            panic!("expected assistant message");
        };
        assert!(matches!(a.content[0], Content::Thinking { .. }));
    }

    #[test]
    fn thinking_becomes_text_for_different_model() {
        let thinking = ThinkingContent {
            thinking: "Let me think about this carefully.".to_string(),
            thinking_signature: Some("sig123".to_string()),
        };
        let assistant = make_assistant(
            Api::AnthropicMessages,
            KnownProvider::Anthropic,
            "claude-sonnet-4-20250514",
            vec![Content::Thinking { inner: thinking }],
        );
        let target = make_target(Api::OpenAICompletions, KnownProvider::OpenAI, "gpt-4o");

        let result = transform_messages_simple(&[Message::Assistant(assistant)], &target);

        let Message::Assistant(a) = &result[0] else {
            panic!("expected assistant message");
        };
        let Content::Text { inner } = &a.content[0] else {
            panic!("expected text content");
        };
        assert_eq!(inner.text, "Let me think about this carefully.");
        assert!(inner.text_signature.is_none());
    }

    #[test]
    fn empty_thinking_is_dropped() {
        let thinking = ThinkingContent {
            thinking: "   ".to_string(),
            thinking_signature: None,
        };
        let assistant = make_assistant(
            Api::AnthropicMessages,
            KnownProvider::Anthropic,
            "claude-sonnet-4-20250514",
            vec![
                Content::Thinking { inner: thinking },
                Content::text("Hello!"),
            ],
        );
        let target = make_target(Api::OpenAICompletions, KnownProvider::OpenAI, "gpt-4o");

        let result = transform_messages_simple(&[Message::Assistant(assistant)], &target);

        let Message::Assistant(a) = &result[0] else {
            panic!("expected assistant message");
        };
        assert_eq!(a.content.len(), 1);
        assert!(matches!(a.content[0], Content::Text { .. }));
    }

    #[test]
    fn tool_call_ids_are_normalized_with_result_remap() {
        use serde_json::json;

        let tool_call = ToolCall {
            id: "original-id-123".into(),
            name: "search".to_string(),
            arguments: json!({"query": "test"}),
            thought_signature: Some("sig".to_string()),
        };
        let assistant = make_assistant(
            Api::AnthropicMessages,
            KnownProvider::Anthropic,
            "claude-sonnet-4-20250514",
            vec![Content::ToolCall { inner: tool_call }],
        );

        let messages = vec![
            Message::Assistant(assistant),
            Message::ToolResult(make_tool_result("original-id-123", "search", "results")),
        ];

        let target = make_target(Api::OpenAICompletions, KnownProvider::OpenAI, "gpt-4o");
        let normalize = |id: &str, _target: &TargetModel, _msg: &AssistantMessage| -> String {
            format!("call_{}", id.replace('-', "_"))
        };

        let result = transform_messages(&messages, &target, Some(normalize));

        assert_eq!(result.len(), 2);

        if let Message::Assistant(a) = &result[0] {
            if let Content::ToolCall { inner } = &a.content[0] {
                assert_eq!(inner.id.as_str(), "call_original_id_123");
                assert!(inner.thought_signature.is_none());
            }
        }

        if let Message::ToolResult(r) = &result[1] {
            assert_eq!(r.tool_call_id.as_str(), "call_original_id_123");
        }
    }

    #[test]
    fn orphaned_tool_call_gets_synthetic_result() {
        use serde_json::json;

        let tool_call = ToolCall {
            id: "call-123".into(),
            name: "search".to_string(),
            arguments: json!({"query": "test"}),
            thought_signature: None,
        };
        let assistant = make_assistant(
            Api::AnthropicMessages,
            KnownProvider::Anthropic,
            "claude-sonnet-4-20250514",
            vec![Content::ToolCall { inner: tool_call }],
        );

        let messages = vec![
            Message::Assistant(assistant),
            Message::User(make_user("Never mind")),
        ];

        let result = transform_messages_simple(&messages, &anthropic_target());

        assert_eq!(result.len(), 3);
        assert!(matches!(result[0], Message::Assistant(_)));

        let Message::ToolResult(r) = &result[1] else {
            panic!("expected tool result at index 1");
        };
        assert_eq!(r.tool_call_id.as_str(), "call-123");
        assert_eq!(r.tool_name, "search");
        assert!(r.is_error);

        assert!(matches!(result[2], Message::User(_)));
    }

    #[test]
    fn partial_results_only_synthesize_the_missing_ones() {
        use serde_json::json;

        let assistant = make_assistant(
            Api::AnthropicMessages,
            KnownProvider::Anthropic,
            "claude-sonnet-4-20250514",
            vec![
                Content::ToolCall {
                    inner: ToolCall {
                        id: "call-1".into(),
                        name: "tool_a".to_string(),
                        arguments: json!({}),
                        thought_signature: None,
                    },
                },
                Content::ToolCall {
                    inner: ToolCall {
                        id: "call-2".into(),
                        name: "tool_b".to_string(),
                        arguments: json!({}),
                        thought_signature: None,
                    },
                },
            ],
        );

        let messages = vec![
            Message::Assistant(assistant),
            Message::ToolResult(make_tool_result("call-1", "tool_a", "result a")),
            Message::User(make_user("Continue")),
        ];

        let result = transform_messages_simple(&messages, &anthropic_target());

        assert_eq!(result.len(), 4);

        let synthetic = result.iter().find(|m| {
            matches!(m, Message::ToolResult(r) if r.tool_call_id.as_str() == "call-2")
        });
        let Some(Message::ToolResult(r)) = synthetic else {
            panic!("expected synthetic result for call-2");
        };
        assert!(r.is_error);
        assert_eq!(r.tool_name, "tool_b");
    }

    #[test]
    fn no_synthetic_result_when_all_present() {
        use serde_json::json;

        let assistant = make_assistant(
            Api::AnthropicMessages,
            KnownProvider::Anthropic,
            "claude-sonnet-4-20250514",
            vec![Content::ToolCall {
                inner: ToolCall {
                    id: "call-1".into(),
                    name: "search".to_string(),
                    arguments: json!({}),
                    thought_signature: None,
                },
            }],
        );

        let messages = vec![
            Message::Assistant(assistant),
            Message::ToolResult(make_tool_result("call-1", "search", "found it")),
        ];

        let result = transform_messages_simple(&messages, &anthropic_target());
        assert_eq!(result.len(), 2);
    }
}
