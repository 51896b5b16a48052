//! Azure OpenAI adapter: the Responses wire on the Azure host.
//!
//! Azure authenticates with an `api-key` header and versions the endpoint
//! with an `api-version` query parameter; the body and event stream are the
//! standard Responses protocol.

use std::collections::HashMap;

use super::openai_responses::{stream_responses, ResponsesAuth, ResponsesEndpoint};
use crate::types::{Api, AssistantMessageEventStream, Context, Model, StreamOptions};

const DEFAULT_API_VERSION: &str = "preview";

pub fn stream_azure_responses(
    model: &Model,
    context: &Context,
    options: StreamOptions,
) -> AssistantMessageEventStream {
    let api_key = options.api_key.clone().unwrap_or_default();
    let endpoint = ResponsesEndpoint {
        api: Api::AzureResponses,
        url: versioned_url(&model.base_url),
        auth: ResponsesAuth::ApiKeyHeader(api_key),
        headers: HashMap::new(),
        requires_instructions: false,
    };
    stream_responses(endpoint, model, context, options)
}

fn versioned_url(base_url: &str) -> String {
    if base_url.contains("api-version=") {
        return base_url.to_string();
    }
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!("{base_url}{separator}api-version={DEFAULT_API_VERSION}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_version_is_appended_once() {
        assert_eq!(
            versioned_url("https://acme.openai.azure.com/openai/v1/responses"),
            "https://acme.openai.azure.com/openai/v1/responses?api-version=preview"
        );
        assert_eq!(
            versioned_url("https://acme.openai.azure.com/openai/v1/responses?api-version=2025-04-01"),
            "https://acme.openai.azure.com/openai/v1/responses?api-version=2025-04-01"
        );
    }
}
