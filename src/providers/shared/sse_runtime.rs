//! Request/response plumbing shared by the SSE-speaking adapters.

use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::types::{
    Api, AssistantMessage, AssistantMessageEvent, ModelCost, Provider, StopReason,
    StopReasonError, StopReasonSuccess, Usage,
};
use crate::types::EventStreamSender;

use super::timestamp::unix_timestamp_millis;

pub(crate) fn initialize_output(api: Api, provider: Provider, model: String) -> AssistantMessage {
    AssistantMessage {
        content: vec![],
        api,
        provider,
        model,
        usage: Usage::default(),
        stop_reason: StopReason::Stop,
        error_message: None,
        timestamp: unix_timestamp_millis(),
    }
}

/// Fault barrier tail: convert an adapter error into the terminal `Error`
/// event. Aborts keep their own stop reason and are never logged as errors.
pub(crate) fn push_stream_error(
    output: &mut AssistantMessage,
    sender: &mut EventStreamSender,
    error: crate::Error,
) {
    let reason = match error {
        crate::Error::Aborted => StopReasonError::Aborted,
        _ => StopReasonError::Error,
    };

    match reason {
        StopReasonError::Aborted => {
            output.stop_reason = StopReason::Aborted;
        }
        StopReasonError::Error => {
            output.stop_reason = StopReason::Error;
            output.error_message = Some(error.to_string());
            log::debug!("stream failed: {error}");
        }
    }

    sender.push(AssistantMessageEvent::Error {
        reason,
        error: output.clone(),
    });
}

/// Finalize cost from the model's rate table and push `Done`.
pub(crate) fn push_stream_done(
    output: &mut AssistantMessage,
    sender: &mut EventStreamSender,
    rates: &ModelCost,
) {
    output.usage.finalize_cost(rates);
    sender.push(AssistantMessageEvent::Done {
        reason: done_reason_from_stop_reason(output.stop_reason),
        message: output.clone(),
    });
}

fn done_reason_from_stop_reason(stop_reason: StopReason) -> StopReasonSuccess {
    match stop_reason {
        StopReason::Stop => StopReasonSuccess::Stop,
        StopReason::Length => StopReasonSuccess::Length,
        StopReason::ToolUse => StopReasonSuccess::ToolUse,
        _ => StopReasonSuccess::Stop,
    }
}

pub(crate) async fn send_streaming_request(
    client: &reqwest::Client,
    url: &str,
    params: &serde_json::Value,
    cancel: &CancellationToken,
) -> Result<reqwest::Response, crate::Error> {
    let request = client.post(url).json(params).send();

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(crate::Error::Aborted),
        response = request => response?,
    };

    if response.status().is_success() {
        return Ok(response);
    }

    let status_code = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    Err(crate::Error::ApiError {
        status_code,
        message: body,
    })
}

/// Read an SSE body line-wise, decoding each `data:` payload as `TChunk`.
///
/// Malformed lines and undecodable payloads are skipped. Returns
/// `Error::Aborted` when the cancel token fires mid-stream.
pub(crate) async fn process_sse_stream<TChunk, F>(
    response: reqwest::Response,
    cancel: &CancellationToken,
    mut on_chunk: F,
) -> Result<(), crate::Error>
where
    TChunk: DeserializeOwned,
    F: FnMut(TChunk),
{
    process_sse_events(response, cancel, |_event, data| {
        if let Ok(chunk) = serde_json::from_str::<TChunk>(data) {
            on_chunk(chunk);
        } else {
            log::debug!("skipping undecodable SSE payload");
        }
    })
    .await
}

/// Read an SSE body line-wise as `event:`/`data:` pairs.
///
/// `on_data` receives the most recent event name (empty when the server
/// sends bare data lines) together with each data payload. A literal
/// `[DONE]` sentinel terminates the stream.
pub(crate) async fn process_sse_events<F>(
    response: reqwest::Response,
    cancel: &CancellationToken,
    mut on_data: F,
) -> Result<(), crate::Error>
where
    F: FnMut(&str, &str),
{
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();
    let mut event_name = String::new();
    let mut done_received = false;

    loop {
        let chunk_result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(crate::Error::Aborted),
            chunk = stream.next() => chunk,
        };

        let Some(chunk_result) = chunk_result else {
            break;
        };

        let chunk = chunk_result?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(line_end) = buffer.find('\n') {
            let line = buffer[..line_end].trim().to_string();
            buffer = buffer[line_end + 1..].to_string();

            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            if let Some(name) = line.strip_prefix("event:") {
                event_name = name.trim().to_string();
                continue;
            }

            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim_start();
                if data == "[DONE]" {
                    done_received = true;
                    break;
                }
                on_data(&event_name, data);
            }
        }

        if done_received {
            break;
        }
    }

    Ok(())
}
