//! Gemini CLI (Cloud Code) backend adapter.
//!
//! Speaks the GenAI wire wrapped in the Cloud Code envelope
//! (`{model, project, request}` out, `{response}` back in) and
//! authenticates with the OAuth credentials the Gemini CLI stores in
//! `~/.gemini/oauth_creds.json`, refreshing the access token when expired.

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::json;

use super::google::{stream_google_endpoint, GoogleAuth, GoogleEndpoint, GoogleEnvelope};
use super::shared::{initialize_output, unix_timestamp_millis};
use crate::types::{
    Api, AssistantMessageEvent, AssistantMessageEventStream, Context, EventStreamSender, Model,
    StopReason, StopReasonError, StreamOptions,
};

const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
// The Gemini CLI's public installed-app OAuth client.
const OAUTH_CLIENT_ID: &str =
    "681255809395-oo8ft2oprdrnp9e3aqf6av3hmdib135j.apps.googleusercontent.com";
const OAUTH_CLIENT_SECRET: &str = "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";
// Refresh slightly early so a token never expires mid-request.
const EXPIRY_SLACK_MS: i64 = 60_000;

pub fn stream_gemini_cli(
    model: &Model,
    context: &Context,
    options: StreamOptions,
) -> AssistantMessageEventStream {
    let (stream, sender) = AssistantMessageEventStream::new();

    let model = model.clone();
    let context = context.clone();

    tokio::spawn(async move {
        run_stream(model, context, options, sender).await;
    });

    stream
}

async fn run_stream(
    model: Model,
    context: Context,
    options: StreamOptions,
    mut sender: EventStreamSender,
) {
    let token = match resolve_access_token(&options).await {
        Ok(token) => token,
        Err(error) => {
            let mut output = initialize_output(
                Api::GoogleGeminiCli,
                model.provider.clone(),
                model.id.clone(),
            );
            output.stop_reason = StopReason::Error;
            output.error_message = Some(error.to_string());
            sender.push(AssistantMessageEvent::Error {
                reason: StopReasonError::Error,
                error: output,
            });
            return;
        }
    };

    let endpoint = GoogleEndpoint {
        api: Api::GoogleGeminiCli,
        url: format!(
            "{}:streamGenerateContent?alt=sse",
            model.base_url.trim_end_matches('/')
        ),
        auth: GoogleAuth::Bearer(token),
        envelope: Some(GoogleEnvelope {
            model: model.id.clone(),
            project: std::env::var("GOOGLE_CLOUD_PROJECT").ok(),
        }),
    };

    // The inner stream drives the sender we already own, so forward events.
    // Dropping the inner stream on consumer loss cancels its producer.
    let mut inner = stream_google_endpoint(endpoint, &model, &context, options);
    use futures::StreamExt;
    loop {
        tokio::select! {
            _ = sender.consumer_gone().cancelled() => break,
            event = inner.next() => match event {
                Some(event) => sender.push(event),
                None => break,
            },
        }
    }
}

async fn resolve_access_token(options: &StreamOptions) -> Result<String, crate::Error> {
    if let Some(key) = &options.api_key {
        if !key.is_empty() && key != "<authenticated>" {
            return Ok(key.clone());
        }
    }

    let path = credentials_path().ok_or_else(|| {
        crate::Error::NoApiKey("google-gemini-cli (no home directory)".to_string())
    })?;

    let raw = tokio::fs::read_to_string(&path).await.map_err(|_| {
        crate::Error::NoApiKey(format!(
            "google-gemini-cli (no credentials at {})",
            path.display()
        ))
    })?;

    let creds: OauthCredentials = serde_json::from_str(&raw)?;

    let expired = creds
        .expiry_date
        .map_or(true, |expiry| expiry - EXPIRY_SLACK_MS <= unix_timestamp_millis());

    if !expired {
        if let Some(token) = creds.access_token {
            return Ok(token);
        }
    }

    let refresh_token = creds.refresh_token.ok_or_else(|| {
        crate::Error::NoApiKey("google-gemini-cli (no refresh token)".to_string())
    })?;

    let refreshed = refresh_access_token(&refresh_token).await?;

    // Persist the refreshed token the way the CLI itself does; failure to
    // write is not fatal for this request.
    let updated = json!({
        "access_token": refreshed.access_token,
        "refresh_token": refresh_token,
        "expiry_date": unix_timestamp_millis() + refreshed.expires_in * 1_000,
        "token_type": "Bearer",
    });
    if let Ok(serialized) = serde_json::to_string_pretty(&updated) {
        let _ = tokio::fs::write(&path, serialized).await;
    }

    Ok(refreshed.access_token)
}

async fn refresh_access_token(refresh_token: &str) -> Result<RefreshedToken, crate::Error> {
    let client = reqwest::Client::new();
    let response = client
        .post(TOKEN_ENDPOINT)
        .form(&[
            ("client_id", OAUTH_CLIENT_ID),
            ("client_secret", OAUTH_CLIENT_SECRET),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await?;

    if !response.status().is_success() {
        let status_code = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        return Err(crate::Error::ApiError {
            status_code,
            message,
        });
    }

    Ok(response.json::<RefreshedToken>().await?)
}

fn credentials_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".gemini").join("oauth_creds.json"))
}

#[derive(Debug, Deserialize)]
struct OauthCredentials {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expiry_date: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RefreshedToken {
    access_token: String,
    expires_in: i64,
}
