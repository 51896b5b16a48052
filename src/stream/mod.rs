//! Dispatch layer: route a request to the registered adapter for the
//! model's API, resolving the API key first.

use crate::error::{Error, Result};
use crate::providers::get_env_api_key;
use crate::registry::get_api_provider;
use crate::types::{
    Api, AssistantMessage, AssistantMessageEventStream, Context, Model, SimpleStreamOptions,
    StreamOptions,
};

/// Stream a completion with the full option surface.
///
/// Resolves the API key (options → environment per provider → provider
/// credential chain) and dispatches on `model.api`.
///
/// # Errors
///
/// `Error::UnknownApi` when no provider is registered for the model's API;
/// `Error::NoApiKey` when the provider needs a key and none was found.
pub fn stream(
    model: &Model,
    context: &Context,
    options: StreamOptions,
) -> Result<AssistantMessageEventStream> {
    let provider = get_api_provider(&model.api)
        .ok_or_else(|| Error::UnknownApi(model.api.to_string()))?;

    let resolved = StreamOptions {
        api_key: resolve_api_key(model, options.api_key)?,
        ..options
    };

    (provider.stream)(model, context, resolved)
}

/// Stream a completion with the reduced option surface; the adapter maps
/// the reasoning level into provider-specific options.
pub fn stream_simple(
    model: &Model,
    context: &Context,
    options: SimpleStreamOptions,
) -> Result<AssistantMessageEventStream> {
    let provider = get_api_provider(&model.api)
        .ok_or_else(|| Error::UnknownApi(model.api.to_string()))?;

    let resolved = SimpleStreamOptions {
        api_key: resolve_api_key(model, options.api_key)?,
        ..options
    };

    (provider.stream_simple)(model, context, resolved)
}

/// Stream and await the final message.
pub async fn complete(
    model: &Model,
    context: &Context,
    options: StreamOptions,
) -> Result<AssistantMessage> {
    stream(model, context, options)?.result().await
}

/// `stream_simple` and await the final message.
pub async fn complete_simple(
    model: &Model,
    context: &Context,
    options: SimpleStreamOptions,
) -> Result<AssistantMessage> {
    stream_simple(model, context, options)?.result().await
}

fn resolve_api_key(model: &Model, from_options: Option<String>) -> Result<Option<String>> {
    let api_key = from_options.or_else(|| get_env_api_key(&model.provider));

    if api_key.is_none() && requires_api_key(&model.api) {
        return Err(Error::NoApiKey(model.provider.to_string()));
    }

    Ok(api_key)
}

/// Backends whose credentials are resolved out-of-band (AWS chain, ADC,
/// OAuth file) construct streams without a key in options. Custom APIs are
/// given the benefit of the doubt.
fn requires_api_key(api: &Api) -> bool {
    !matches!(
        api,
        Api::GoogleVertex | Api::BedrockConverseStream | Api::GoogleGeminiCli | Api::Custom(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InputType, KnownProvider, Message, ModelCost, Provider};
    use serial_test::serial;
    use tokio::time::{timeout, Duration};

    fn openai_test_model(base_url: &str) -> Model {
        Model {
            id: "gpt-4o-mini".to_string(),
            name: "GPT-4o Mini".to_string(),
            api: Api::OpenAICompletions,
            provider: Provider::Known(KnownProvider::OpenAI),
            base_url: base_url.to_string(),
            reasoning: false,
            input: vec![InputType::Text],
            cost: ModelCost::ZERO,
            context_window: 128_000,
            max_tokens: 16_384,
            headers: None,
            compat: None,
        }
    }

    fn simple_context() -> Context {
        Context {
            system_prompt: None,
            messages: vec![Message::user("Hello")],
            tools: None,
        }
    }

    #[tokio::test]
    #[serial]
    async fn stream_requires_api_key_for_openai() {
        std::env::remove_var("OPENAI_API_KEY");
        let model = openai_test_model("http://127.0.0.1:1");

        let result = stream(&model, &simple_context(), StreamOptions::default());
        assert!(matches!(result, Err(Error::NoApiKey(_))));
    }

    #[tokio::test]
    #[serial]
    async fn unknown_api_fails_synchronously() {
        let mut model = openai_test_model("http://127.0.0.1:1");
        model.api = Api::Custom("not-registered".to_string());

        let result = stream(&model, &simple_context(), StreamOptions::default());
        assert!(matches!(result, Err(Error::UnknownApi(_))));
    }

    #[tokio::test]
    #[serial]
    async fn unreachable_endpoint_surfaces_as_error_event() {
        let model = openai_test_model("http://127.0.0.1:1");
        let options = StreamOptions {
            api_key: Some("test-key".to_string()),
            ..Default::default()
        };

        let stream = stream(&model, &simple_context(), options).expect("dispatch should succeed");
        let result = timeout(Duration::from_secs(5), stream.result())
            .await
            .expect("stream should finish quickly");

        assert!(result.is_err());
    }

    #[tokio::test]
    #[serial]
    async fn cancellation_latches_aborted_result() {
        let model = openai_test_model("http://127.0.0.1:1");
        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();
        let options = StreamOptions {
            api_key: Some("test-key".to_string()),
            cancel: Some(cancel),
            ..Default::default()
        };

        let stream = stream(&model, &simple_context(), options).expect("dispatch should succeed");
        let result = timeout(Duration::from_secs(5), stream.result())
            .await
            .expect("stream should finish quickly");

        assert!(matches!(result, Err(Error::Aborted)));
    }

    #[test]
    #[serial]
    fn out_of_band_backends_skip_the_key_check() {
        assert!(!requires_api_key(&Api::GoogleVertex));
        assert!(!requires_api_key(&Api::BedrockConverseStream));
        assert!(!requires_api_key(&Api::GoogleGeminiCli));
        assert!(requires_api_key(&Api::AnthropicMessages));
        assert!(requires_api_key(&Api::OpenAIResponses));
    }
}
