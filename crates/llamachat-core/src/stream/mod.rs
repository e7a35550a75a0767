//! Streaming pipeline: raw byte chunks → framed records → text deltas.

pub mod decoder;
pub mod framer;

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{ready, Stream, StreamExt};
use pin_project_lite::pin_project;
use tracing::{debug, info, warn};

use crate::ai::ollama::{ChatRequest, OllamaClient};
use crate::error::ChatError;
use crate::state::StreamId;

pub use decoder::{decode_record, ChatChunk, ChunkMessage};
pub use framer::LineFramer;

pin_project! {
    /// Text deltas decoded from a chunked NDJSON byte stream, in record order.
    ///
    /// Malformed records are skipped. A transport error ends the stream after
    /// the records completed so far have been yielded.
    pub struct DeltaStream<S> {
        #[pin]
        inner: S,
        framer: LineFramer,
        pending: VecDeque<String>,
        finished: bool,
        malformed: usize,
        backend_error: Option<String>,
        transport_error: Option<String>,
    }
}

impl<S> DeltaStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            framer: LineFramer::new(),
            pending: VecDeque::new(),
            finished: false,
            malformed: 0,
            backend_error: None,
            transport_error: None,
        }
    }

    /// Records dropped because they did not parse.
    pub fn malformed(&self) -> usize {
        self.malformed
    }

    /// Last `error` reported by the server inside the stream.
    pub fn backend_error(&self) -> Option<&str> {
        self.backend_error.as_deref()
    }

    /// Set when the body stopped being readable before the server finished.
    pub fn transport_error(&self) -> Option<&str> {
        self.transport_error.as_deref()
    }

    /// Error worth reporting once the stream is exhausted, if any.
    pub fn error(&self) -> Option<&str> {
        self.transport_error().or(self.backend_error())
    }
}

impl<S, B, E> Stream for DeltaStream<S>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    type Item = String;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(delta) = this.pending.pop_front() {
                return Poll::Ready(Some(delta));
            }
            if *this.finished {
                return Poll::Ready(None);
            }

            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(bytes)) => {
                    for record in this.framer.push(bytes.as_ref()) {
                        match decode_record(&record) {
                            Ok(chunk) => {
                                if let Some(error) = chunk.error.as_ref() {
                                    warn!(%error, "model server reported an error");
                                    *this.backend_error = Some(error.clone());
                                }
                                if chunk.done {
                                    debug!(reason = ?chunk.done_reason, "final record received");
                                }
                                if let Some(delta) = chunk.into_delta() {
                                    this.pending.push_back(delta);
                                }
                            }
                            Err(err) => {
                                *this.malformed += 1;
                                debug!(error = %err, "dropping malformed record");
                            }
                        }
                    }
                }
                Some(Err(err)) => {
                    warn!(error = %err, "stream aborted by transport");
                    let error = ChatError::Connection(err.to_string());
                    *this.transport_error = Some(error.to_string());
                    this.framer.finish();
                    *this.finished = true;
                }
                None => {
                    this.framer.finish();
                    *this.finished = true;
                }
            }
        }
    }
}

/// Progress of one stream, tagged with the stream it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamUpdate {
    Delta { stream: StreamId, text: String },
    Finished { stream: StreamId, error: Option<String> },
    Failed { stream: StreamId, error: String },
}

impl StreamUpdate {
    pub fn stream(&self) -> StreamId {
        match self {
            Self::Delta { stream, .. }
            | Self::Finished { stream, .. }
            | Self::Failed { stream, .. } => *stream,
        }
    }
}

/// Run one chat stream to completion, reporting each step through `emit`.
///
/// `emit` returns `false` once nobody is listening anymore; reading stops there.
pub async fn pump<F>(client: &OllamaClient, request: &ChatRequest, stream: StreamId, mut emit: F)
where
    F: FnMut(StreamUpdate) -> bool,
{
    info!(
        %stream,
        model = %request.model,
        messages = request.messages.len(),
        "starting chat stream"
    );

    let mut deltas = match client.chat(request).await {
        Ok(deltas) => deltas,
        Err(err) => {
            warn!(%stream, error = %err, "chat request failed");
            emit(StreamUpdate::Failed {
                stream,
                error: err.to_string(),
            });
            return;
        }
    };

    let mut received = 0usize;
    while let Some(text) = deltas.next().await {
        received += 1;
        if !emit(StreamUpdate::Delta { stream, text }) {
            debug!(%stream, "receiver dropped, abandoning stream");
            return;
        }
    }

    info!(%stream, deltas = received, malformed = deltas.malformed(), "chat stream finished");
    emit(StreamUpdate::Finished {
        stream,
        error: deltas.error().map(str::to_string),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Conversation;
    use futures_util::stream;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chunks(parts: Vec<Vec<u8>>) -> impl Stream<Item = Result<Vec<u8>, String>> {
        stream::iter(parts.into_iter().map(Ok))
    }

    fn record(content: &str) -> String {
        format!(
            "{}\n",
            serde_json::json!({"model": "m", "message": {"role": "assistant", "content": content}, "done": false})
        )
    }

    async fn collect(parts: Vec<Vec<u8>>) -> Vec<String> {
        DeltaStream::new(chunks(parts)).collect().await
    }

    #[tokio::test]
    async fn test_deltas_in_order() {
        let body = format!("{}{}{}", record("Hel"), record("lo, "), record("world!"));
        let deltas = collect(vec![body.into_bytes()]).await;
        assert_eq!(deltas, vec!["Hel", "lo, ", "world!"]);
    }

    #[tokio::test]
    async fn test_malformed_record_between_valid_ones() {
        let body = format!(
            "{}{{\"message\": {{\"content\": oops}}\n{}",
            record("first"),
            record("second")
        );
        let mut deltas = DeltaStream::new(chunks(vec![body.into_bytes()]));
        assert_eq!(deltas.next().await.as_deref(), Some("first"));
        assert_eq!(deltas.next().await.as_deref(), Some("second"));
        assert_eq!(deltas.next().await, None);
        assert_eq!(deltas.malformed(), 1);
    }

    #[tokio::test]
    async fn test_every_split_yields_same_deltas() {
        let body = format!(
            "{}{}{}{}",
            record("Grüße, "),
            record("世界"),
            "{\"done\":true}\n",
            record(" 🦀")
        );
        let bytes = body.into_bytes();
        let expected = collect(vec![bytes.clone()]).await;
        assert_eq!(expected, vec!["Grüße, ", "世界", " 🦀"]);

        for first in 0..bytes.len() {
            for second in (first..bytes.len()).step_by(7) {
                let parts = vec![
                    bytes[..first].to_vec(),
                    bytes[first..second].to_vec(),
                    bytes[second..].to_vec(),
                ];
                assert_eq!(collect(parts).await, expected, "split at {first}/{second}");
            }
        }
    }

    #[tokio::test]
    async fn test_byte_at_a_time() {
        let body = format!("{}{}", record("one "), record("twö"));
        let parts = body.into_bytes().into_iter().map(|b| vec![b]).collect();
        assert_eq!(collect(parts).await, vec!["one ", "twö"]);
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let complete = record("kept");
        let partial = "{\"message\":{\"content\":\"lost";
        let parts: Vec<Result<Vec<u8>, String>> = vec![
            Ok(complete.into_bytes()),
            Ok(partial.as_bytes().to_vec()),
            Err("connection reset".to_string()),
            Ok(record("never").into_bytes()),
        ];
        let mut deltas = DeltaStream::new(stream::iter(parts));
        assert_eq!(deltas.next().await.as_deref(), Some("kept"));
        assert_eq!(deltas.next().await, None);
        assert_eq!(deltas.transport_error(), Some("Connection error: connection reset"));
        assert_eq!(deltas.error(), Some("Connection error: connection reset"));
    }

    #[tokio::test]
    async fn test_unterminated_final_record_dropped() {
        let body = format!("{}{}", record("a"), record("b").trim_end());
        assert_eq!(collect(vec![body.into_bytes()]).await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_backend_error_captured() {
        let body = format!("{}{}", record("partial"), "{\"error\":\"out of memory\"}\n");
        let mut deltas = DeltaStream::new(chunks(vec![body.into_bytes()]));
        assert_eq!(deltas.next().await.as_deref(), Some("partial"));
        assert_eq!(deltas.next().await, None);
        assert_eq!(deltas.backend_error(), Some("out of memory"));
        assert_eq!(deltas.transport_error(), None);
        assert_eq!(deltas.error(), Some("out of memory"));
    }

    async fn mock_chat(body: String) -> (MockServer, OllamaClient) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
            .mount(&server)
            .await;
        let client = OllamaClient::new(&server.uri());
        (server, client)
    }

    fn request() -> ChatRequest {
        ChatRequest::new("llama3.2", Vec::new(), 0.7)
    }

    #[tokio::test]
    async fn test_pump_tags_updates_with_stream() {
        let body = format!(
            "{}{}{}",
            record("Hel"),
            record("lo"),
            "{\"done\":true,\"done_reason\":\"stop\"}\n"
        );
        let (_server, client) = mock_chat(body).await;
        let stream = StreamId(7);

        let mut updates = Vec::new();
        pump(&client, &request(), stream, |update| {
            updates.push(update);
            true
        })
        .await;

        assert_eq!(
            updates,
            vec![
                StreamUpdate::Delta { stream, text: "Hel".to_string() },
                StreamUpdate::Delta { stream, text: "lo".to_string() },
                StreamUpdate::Finished { stream, error: None },
            ]
        );
        assert!(updates.iter().all(|update| update.stream() == stream));
    }

    #[tokio::test]
    async fn test_pump_into_conversation() {
        let body = format!(
            "{}{}{}",
            record("Run:\n\n\n\n"),
            record("```sh\nls -la   "),
            "{\"done\":true}\n"
        );
        let (_server, client) = mock_chat(body).await;

        let mut conversation = Conversation::new();
        let stream = conversation.send("how do I list files?").unwrap();
        let request = ChatRequest::new("llama3.2", conversation.history(), 0.7);
        pump(&client, &request, stream, |update| conversation.apply(update)).await;

        assert!(!conversation.is_streaming());
        assert_eq!(conversation.last_error(), None);
        assert_eq!(conversation.messages()[1].content, "Run:\n\n```sh\nls -la\n```");
    }

    #[tokio::test]
    async fn test_pump_reports_backend_error_on_finish() {
        let body = format!("{}{}", record("partial"), "{\"error\":\"model not loaded\"}\n");
        let (_server, client) = mock_chat(body).await;
        let stream = StreamId(1);

        let mut last = None;
        pump(&client, &request(), stream, |update| {
            last = Some(update);
            true
        })
        .await;

        assert_eq!(
            last,
            Some(StreamUpdate::Finished {
                stream,
                error: Some("model not loaded".to_string()),
            })
        );
    }

    #[tokio::test]
    async fn test_pump_stops_when_receiver_is_gone() {
        let body = format!("{}{}{}", record("one"), record("two"), record("three"));
        let (_server, client) = mock_chat(body).await;

        let mut emitted = 0;
        pump(&client, &request(), StreamId(1), |_| {
            emitted += 1;
            false
        })
        .await;

        assert_eq!(emitted, 1);
    }
}
