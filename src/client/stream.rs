use crate::adapter::ResponseAdapter;
use crate::client::types::CallStats;
use crate::pipeline::{with_idle_timeout, SseEvent};
use crate::types::{CanonicalResponse, StreamSummary};
use crate::{BoxStream, PipeResult, Result};
use futures::{stream, Stream, StreamExt};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct AdaptState {
    frames: Option<BoxStream<'static, SseEvent>>,
    adapter: ResponseAdapter,
    summary: Arc<Mutex<StreamSummary>>,
}

impl AdaptState {
    fn publish(&self) {
        *self.summary.lock().unwrap_or_else(|p| p.into_inner()) = self.adapter.summary();
    }
}

/// Frames → canonical chunks. Frames the adapter skips never reach the caller, so
/// the idle timer downstream only restarts on real chunks.
fn adapt_frames(state: AdaptState) -> BoxStream<'static, CanonicalResponse> {
    let stream = stream::unfold(state, |mut state| async move {
        loop {
            let Some(frames) = state.frames.as_mut() else {
                return None;
            };
            match frames.next().await {
                Some(Ok(event)) => match state.adapter.adapt_event(&event) {
                    Ok(Some(chunk)) => {
                        state.publish();
                        return Some((Ok(chunk), state));
                    }
                    Ok(None) => {
                        state.publish();
                        continue;
                    }
                    Err(e) => {
                        state.frames = None;
                        state.publish();
                        return Some((Err(e), state));
                    }
                },
                Some(Err(e)) => {
                    state.frames = None;
                    return Some((Err(e), state));
                }
                None => {
                    state.frames = None;
                    let tail = state.adapter.finish();
                    state.publish();
                    return tail.map(|chunk| (Ok(chunk), state));
                }
            }
        }
    });
    Box::pin(stream)
}

/// Stream of canonical chunks of one call.
///
/// Ends with `None` on a natural end, or with one terminal error:
/// `Error::Cancelled`, `Error::IdleTimeout`, a transport error, or an in-band
/// `Error::Remote`.
pub struct ChatStream {
    inner: BoxStream<'static, CanonicalResponse>,
    summary: Arc<Mutex<StreamSummary>>,
    stats: CallStats,
}

impl ChatStream {
    pub(crate) fn new(
        frames: BoxStream<'static, SseEvent>,
        adapter: ResponseAdapter,
        idle: Duration,
        cancel: CancellationToken,
        stats: CallStats,
    ) -> Self {
        let summary = Arc::new(Mutex::new(StreamSummary::default()));
        let adapted = adapt_frames(AdaptState {
            frames: Some(frames),
            adapter,
            summary: summary.clone(),
        });
        Self {
            inner: with_idle_timeout(adapted, idle, cancel),
            summary,
            stats,
        }
    }

    /// Usage, finish reason and chunk count seen so far.
    pub fn summary(&self) -> StreamSummary {
        self.summary.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn stats(&self) -> &CallStats {
        &self.stats
    }

    /// Drain the stream into one response.
    pub async fn collect_response(mut self) -> Result<CanonicalResponse> {
        let mut out = CanonicalResponse::default();
        while let Some(chunk) = self.next().await {
            let chunk = chunk?;
            out.parts.extend(chunk.parts);
            out.model_version = chunk.model_version.or(out.model_version);
            out.response_id = chunk.response_id.or(out.response_id);
        }
        let summary = self.summary();
        out.usage = summary.usage;
        out.finish_reason = summary.finish_reason;
        Ok(out)
    }
}

impl Stream for ChatStream {
    type Item = PipeResult<CanonicalResponse>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SharedCaches;
    use crate::types::ModelFamily;
    use crate::Error;
    use serde_json::json;

    fn stats() -> CallStats {
        CallStats {
            request_id: "r".into(),
            session_id: "s".into(),
            model: "gemini-2.5-flash".into(),
            family: ModelFamily::GeminiFlash,
            endpoint: "http://e".into(),
            http_status: 200,
            attempts: Vec::new(),
            duration_ms: 0,
            upstream_request_id: None,
        }
    }

    fn frames(values: Vec<String>) -> BoxStream<'static, SseEvent> {
        Box::pin(tokio_stream::iter(
            values.into_iter().map(|d| Ok::<_, Error>(SseEvent::data(d))),
        ))
    }

    fn text_frame(text: &str) -> String {
        json!({"response": {"candidates": [
            {"content": {"role": "model", "parts": [{"text": text}]}}
        ]}})
        .to_string()
    }

    fn chat_stream(
        input: BoxStream<'static, SseEvent>,
        adapter: ResponseAdapter,
        idle: Duration,
    ) -> ChatStream {
        ChatStream::new(input, adapter, idle, CancellationToken::new(), stats())
    }

    #[tokio::test]
    async fn three_frame_stream_yields_two_chunks_and_final_usage() {
        let adapter = ResponseAdapter::new(ModelFamily::GeminiFlash, "s", SharedCaches::isolated());
        let input = frames(vec![
            text_frame("Hel"),
            text_frame("lo"),
            json!({"response": {
                "candidates": [{"content": {"parts": []}, "finishReason": "STOP"}],
                "usageMetadata": {
                    "promptTokenCount": 4, "candidatesTokenCount": 2, "totalTokenCount": 6
                }
            }})
            .to_string(),
        ]);
        let mut s = chat_stream(input, adapter, Duration::from_secs(5));
        let mut chunks = Vec::new();
        while let Some(c) = s.next().await {
            chunks.push(c.unwrap());
        }
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| !c.is_empty()));
        assert_eq!(chunks[0].text(), "Hel");
        let summary = s.summary();
        assert_eq!(summary.chunks, 2);
        assert_eq!(summary.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(summary.usage.unwrap().total_tokens, Some(6));
    }

    #[tokio::test]
    async fn stalled_stream_times_out() {
        let adapter = ResponseAdapter::new(ModelFamily::GeminiFlash, "s", SharedCaches::isolated());
        let input: BoxStream<'static, SseEvent> =
            Box::pin(stream::pending::<PipeResult<SseEvent>>());
        let mut s = chat_stream(input, adapter, Duration::from_millis(30));
        assert!(matches!(s.next().await, Some(Err(Error::IdleTimeout { .. }))));
        assert!(s.next().await.is_none());
    }

    #[tokio::test]
    async fn keepalive_frames_do_not_reset_idle_timer() {
        let adapter = ResponseAdapter::new(ModelFamily::GeminiFlash, "s", SharedCaches::isolated());
        let keepalives = stream::unfold((), |_| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Some((Ok::<_, Error>(SseEvent::data("{}")), ()))
        });
        let mut s = chat_stream(Box::pin(keepalives), adapter, Duration::from_millis(60));
        assert!(matches!(s.next().await, Some(Err(Error::IdleTimeout { .. }))));
    }

    #[tokio::test]
    async fn collect_response_merges_chunks() {
        let adapter = ResponseAdapter::new(ModelFamily::GeminiFlash, "s", SharedCaches::isolated());
        let input = frames(vec![
            json!({"candidates": [{"content": {"parts": [{"text": "a"}]}}]}).to_string(),
            json!({"candidates": [{"content": {"parts": [{"text": "b"}]}, "finishReason": "STOP"}]})
                .to_string(),
        ]);
        let s = chat_stream(input, adapter, Duration::from_secs(5));
        let response = s.collect_response().await.unwrap();
        assert_eq!(response.text(), "ab");
        assert_eq!(response.finish_reason.as_deref(), Some("STOP"));
    }
}
