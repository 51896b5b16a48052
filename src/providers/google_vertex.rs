//! Vertex AI adapter: the GenAI wire on the Vertex host.
//!
//! Vertex takes project and location from the environment and authenticates
//! with an OAuth bearer token. The full ADC service-account exchange is a
//! consumer concern; callers either supply a token via `api_key` or export
//! `GOOGLE_OAUTH_ACCESS_TOKEN`.

use std::env;

use super::google::{stream_google_endpoint, GoogleAuth, GoogleEndpoint};
use crate::types::{
    Api, AssistantMessageEventStream, Context, Model, StopReason, StreamOptions,
};

pub fn stream_google_vertex(
    model: &Model,
    context: &Context,
    options: StreamOptions,
) -> AssistantMessageEventStream {
    let endpoint = match resolve_endpoint(model, &options) {
        Ok(endpoint) => endpoint,
        Err(error) => return failed_stream(model, error),
    };
    stream_google_endpoint(endpoint, model, context, options)
}

fn resolve_endpoint(
    model: &Model,
    options: &StreamOptions,
) -> Result<GoogleEndpoint, crate::Error> {
    let token = options
        .api_key
        .clone()
        .filter(|key| key != "<authenticated>" && !key.is_empty())
        .or_else(|| env::var("GOOGLE_OAUTH_ACCESS_TOKEN").ok())
        .ok_or_else(|| crate::Error::NoApiKey(model.provider.to_string()))?;

    let project = env::var("GOOGLE_CLOUD_PROJECT")
        .or_else(|_| env::var("GCLOUD_PROJECT"))
        .map_err(|_| {
            crate::Error::InvalidResponse(
                "GOOGLE_CLOUD_PROJECT is required for Vertex AI".to_string(),
            )
        })?;
    let location = env::var("GOOGLE_CLOUD_LOCATION").unwrap_or_else(|_| "global".to_string());

    let url = format!(
        "{}/projects/{}/locations/{}/publishers/google/models/{}:streamGenerateContent?alt=sse",
        model.base_url.trim_end_matches('/'),
        project,
        location,
        model.id,
    );

    Ok(GoogleEndpoint {
        api: Api::GoogleVertex,
        url,
        auth: GoogleAuth::Bearer(token),
        envelope: None,
    })
}

/// A stream that fails immediately with the given error, keeping the
/// fault-barrier contract when the endpoint cannot even be constructed.
fn failed_stream(model: &Model, error: crate::Error) -> AssistantMessageEventStream {
    use super::shared::initialize_output;
    use crate::types::{AssistantMessageEvent, StopReasonError};

    let (stream, mut sender) = AssistantMessageEventStream::new();
    let mut output = initialize_output(
        Api::GoogleVertex,
        model.provider.clone(),
        model.id.clone(),
    );
    output.stop_reason = StopReason::Error;
    output.error_message = Some(error.to_string());
    sender.push(AssistantMessageEvent::Error {
        reason: StopReasonError::Error,
        error: output,
    });
    stream
}
