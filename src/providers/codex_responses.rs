//! Codex backend adapter: the Responses wire over the ChatGPT backend.
//!
//! Authenticates with a JWT bearer token (`OPENAI_CODEX_API_KEY`) and always
//! sends the `instructions` field, which the backend requires even when no
//! system prompt is set.

use std::collections::HashMap;

use super::openai_responses::{stream_responses, ResponsesAuth, ResponsesEndpoint};
use crate::types::{Api, AssistantMessageEventStream, Context, Model, StreamOptions};

pub fn stream_codex_responses(
    model: &Model,
    context: &Context,
    options: StreamOptions,
) -> AssistantMessageEventStream {
    let api_key = options.api_key.clone().unwrap_or_default();

    let mut headers = HashMap::new();
    headers.insert(
        "OpenAI-Beta".to_string(),
        "responses=experimental".to_string(),
    );
    headers.insert("originator".to_string(), "codex_cli_rs".to_string());

    let endpoint = ResponsesEndpoint {
        api: Api::OpenAICodexResponses,
        url: model.base_url.clone(),
        auth: ResponsesAuth::Bearer(api_key),
        headers,
        requires_instructions: true,
    };
    stream_responses(endpoint, model, context, options)
}
