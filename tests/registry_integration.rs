//! End-to-end tests for the registries and the dispatch layer, using an
//! in-process echo provider instead of live HTTP.

use std::sync::Arc;

use manifold_llm::{
    complete_simple, register_api_provider_scoped, Api, ApiProvider, AssistantMessage,
    AssistantMessageEvent, AssistantMessageEventStream, Content, Context, InputType, Message,
    Model, ModelCost, Provider, SimpleStreamOptions, StopReason, StopReasonSuccess, StreamOptions,
    Usage, UserContent,
};

fn echo_model(api_name: &str) -> Model {
    Model {
        id: "echo-1".to_string(),
        name: "Echo".to_string(),
        api: Api::Custom(api_name.to_string()),
        provider: Provider::Custom("echo".to_string()),
        base_url: "memory://echo".to_string(),
        reasoning: false,
        input: vec![InputType::Text],
        cost: ModelCost {
            input: 1.0,
            output: 2.0,
            cache_read: 0.0,
            cache_write: 0.0,
        },
        context_window: 8_192,
        max_tokens: 1_024,
        headers: None,
        compat: None,
    }
}

/// Streams back the last user message prefixed with `"Echo: "`.
fn echo_stream(model: &Model, context: &Context) -> AssistantMessageEventStream {
    let last_user = context
        .messages
        .iter()
        .rev()
        .find_map(|message| match message {
            Message::User(user) => match &user.content {
                UserContent::Text(text) => Some(text.clone()),
                UserContent::Multi(_) => None,
            },
            _ => None,
        })
        .unwrap_or_default();

    let (stream, mut sender) = AssistantMessageEventStream::new();

    let mut output = AssistantMessage {
        content: vec![],
        api: model.api.clone(),
        provider: model.provider.clone(),
        model: model.id.clone(),
        usage: Usage::default(),
        stop_reason: StopReason::Stop,
        error_message: None,
        timestamp: 0,
    };

    sender.push(AssistantMessageEvent::Start {
        partial: output.clone(),
    });

    let text = format!("Echo: {last_user}");
    output.content.push(Content::text(""));
    sender.push(AssistantMessageEvent::TextStart {
        content_index: 0,
        partial: output.clone(),
    });
    if let Some(Content::Text { inner }) = output.content.last_mut() {
        inner.text = text.clone();
    }
    sender.push(AssistantMessageEvent::TextDelta {
        content_index: 0,
        delta: text.clone(),
        partial: output.clone(),
    });
    sender.push(AssistantMessageEvent::TextEnd {
        content_index: 0,
        content: text.clone(),
        partial: output.clone(),
    });

    output.usage.input = 4;
    output.usage.output = text.split_whitespace().count() as u32;
    output.usage.total_tokens = output.usage.input + output.usage.output;
    output.usage.finalize_cost(&model.cost);

    sender.push(AssistantMessageEvent::Done {
        reason: StopReasonSuccess::Stop,
        message: output,
    });

    stream
}

fn echo_provider(api_name: &str) -> ApiProvider {
    let api = Api::Custom(api_name.to_string());
    ApiProvider::new(
        api,
        Arc::new(|model: &Model, context: &Context, _options: StreamOptions| {
            Ok(echo_stream(model, context))
        }),
        Arc::new(
            |model: &Model, context: &Context, _options: SimpleStreamOptions| {
                Ok(echo_stream(model, context))
            },
        ),
    )
}

#[tokio::test]
async fn echo_provider_round_trips_through_dispatch() {
    let _guard = register_api_provider_scoped(echo_provider("echo-dispatch"));
    let model = echo_model("echo-dispatch");

    let context = Context {
        system_prompt: None,
        messages: vec![Message::user("hello world")],
        tools: None,
    };

    let result = complete_simple(&model, &context, SimpleStreamOptions::default())
        .await
        .expect("echo completion should succeed");

    match &result.content[0] {
        Content::Text { inner } => assert_eq!(inner.text, "Echo: hello world"),
        other => panic!("expected text content, got {other:?}"),
    }
    assert!(result.usage.output > 0);
    assert_eq!(result.stop_reason, StopReason::Stop);
}

#[tokio::test]
async fn echo_usage_cost_follows_the_rate_table() {
    let _guard = register_api_provider_scoped(echo_provider("echo-cost"));
    let model = echo_model("echo-cost");

    let context = Context {
        system_prompt: None,
        messages: vec![Message::user("count my tokens")],
        tools: None,
    };

    let result = complete_simple(&model, &context, SimpleStreamOptions::default())
        .await
        .unwrap();

    let expected = f64::from(result.usage.input) * 1.0 / 1_000_000.0
        + f64::from(result.usage.output) * 2.0 / 1_000_000.0;
    assert!((result.usage.cost.total - expected).abs() < 1e-12);
}

#[tokio::test]
async fn scoped_provider_disappears_after_guard_drop() {
    let api = Api::Custom("echo-scoped".to_string());
    let model = echo_model("echo-scoped");
    let context = Context {
        system_prompt: None,
        messages: vec![Message::user("hi")],
        tools: None,
    };

    {
        let _guard = register_api_provider_scoped(echo_provider("echo-scoped"));
        assert!(manifold_llm::get_api_provider(&api).is_some());
        assert!(
            complete_simple(&model, &context, SimpleStreamOptions::default())
                .await
                .is_ok()
        );
    }

    assert!(manifold_llm::get_api_provider(&api).is_none());
    let result = manifold_llm::stream_simple(&model, &context, SimpleStreamOptions::default());
    assert!(matches!(result, Err(manifold_llm::Error::UnknownApi(_))));
}

#[tokio::test]
async fn builtin_models_are_listed_by_provider() {
    let anthropic_models = manifold_llm::get_models(Some("anthropic"));
    assert!(!anthropic_models.is_empty());
    assert!(anthropic_models
        .iter()
        .all(|m| m.api == Api::AnthropicMessages));

    let model = manifold_llm::get_model("anthropic", "claude-sonnet-4-20250514")
        .expect("builtin sonnet model");
    assert!(model.reasoning);

    assert!(manifold_llm::get_providers()
        .iter()
        .any(|p| p.as_str() == "openai"));
}
