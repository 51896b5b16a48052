use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::mpsc;
use futures::Stream;
use tokio::sync::oneshot;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::usage::StopReason;
use super::{AssistantMessage, AssistantMessageEvent};
use crate::error::{Error, Result};

/// A stream of assistant message events.
///
/// This wraps an async channel and provides:
/// - Async iteration over events via the `Stream` trait
/// - A `result()` method to await the final `AssistantMessage`
///
/// The stream is created by provider implementations and events are pushed
/// via the sender handle returned from `AssistantMessageEventStream::new()`.
/// Dropping the stream cancels the producer task through the sender's
/// `consumer_gone()` token.
pub struct AssistantMessageEventStream {
    receiver: mpsc::UnboundedReceiver<AssistantMessageEvent>,
    result_receiver: Option<oneshot::Receiver<AssistantMessage>>,
    _consumer_guard: DropGuard,
}

/// Handle for pushing events into an `AssistantMessageEventStream`.
pub struct EventStreamSender {
    sender: mpsc::UnboundedSender<AssistantMessageEvent>,
    result_sender: Option<oneshot::Sender<AssistantMessage>>,
    consumer_gone: CancellationToken,
    finished: bool,
}

impl AssistantMessageEventStream {
    /// Create a new event stream and sender pair.
    ///
    /// The sender is used by provider implementations to push events.
    /// The stream is returned to the caller for iteration.
    pub fn new() -> (Self, EventStreamSender) {
        let (tx, rx) = mpsc::unbounded();
        let (result_tx, result_rx) = oneshot::channel();
        let consumer_gone = CancellationToken::new();

        let stream = Self {
            receiver: rx,
            result_receiver: Some(result_rx),
            _consumer_guard: consumer_gone.clone().drop_guard(),
        };

        let sender = EventStreamSender {
            sender: tx,
            result_sender: Some(result_tx),
            consumer_gone,
            finished: false,
        };

        (stream, sender)
    }

    /// Await the final result of the stream.
    ///
    /// Resolves once the terminal event has been pushed. Streams that
    /// latched an `Error` event resolve to `Err`: `Error::Aborted` for
    /// cancellation, `Error::InvalidResponse` otherwise.
    pub async fn result(mut self) -> Result<AssistantMessage> {
        let receiver = self
            .result_receiver
            .take()
            .ok_or_else(|| Error::InvalidResponse("result() already called".to_string()))?;

        let message = receiver
            .await
            .map_err(|_| Error::InvalidResponse("Stream ended without result".to_string()))?;

        match message.stop_reason {
            StopReason::Aborted => Err(Error::Aborted),
            StopReason::Error => Err(Error::InvalidResponse(
                message
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "Stream failed".to_string()),
            )),
            _ => Ok(message),
        }
    }
}

impl Stream for AssistantMessageEventStream {
    type Item = AssistantMessageEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}

impl EventStreamSender {
    /// Push an event to the stream.
    ///
    /// The first terminal event (`Done` or `Error`) latches the result and
    /// closes the stream; anything pushed after it is discarded, so a
    /// provider that emits several done signals cannot corrupt the stream.
    pub fn push(&mut self, event: AssistantMessageEvent) {
        if self.finished {
            log::debug!("event pushed after terminal event; discarding");
            return;
        }

        if let AssistantMessageEvent::Done { message, .. }
        | AssistantMessageEvent::Error { error: message, .. } = &event
        {
            self.finished = true;
            if let Some(sender) = self.result_sender.take() {
                let _ = sender.send(message.clone());
            }
        }

        // Ignore send errors: the consumer may have been dropped.
        let _ = self.sender.unbounded_send(event);
    }

    /// Close the stream without a terminal event. Dropping the sender has
    /// the same effect; calling this is idempotent by construction.
    pub fn end(self) {}

    /// Token cancelled when the consumer side of the stream is dropped.
    /// Producer tasks select on this to stop streaming into the void.
    pub fn consumer_gone(&self) -> &CancellationToken {
        &self.consumer_gone
    }

    /// Single cancellation source for a producer task: fires when the
    /// caller's cancel signal fires or when the consumer drops the stream.
    pub fn cancellation(&self, external: Option<CancellationToken>) -> CancellationToken {
        let combined = self.consumer_gone.child_token();
        if let Some(external) = external {
            if external.is_cancelled() {
                combined.cancel();
                return combined;
            }
            let on_cancel = combined.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = external.cancelled() => on_cancel.cancel(),
                    _ = on_cancel.cancelled() => {}
                }
            });
        }
        combined
    }

    /// Whether a terminal event has been pushed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
