//! Streaming decoder (Bytes -> SSE frames) with cooperative cancellation.

use crate::pipeline::sse::{SseEvent, SseParser};
use crate::{BoxStream, Error};
use bytes::Bytes;
use futures::{stream, StreamExt};
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;

struct DecodeState {
    /// `None` once the reader has been released.
    input: Option<BoxStream<'static, Bytes>>,
    parser: SseParser,
    ready: VecDeque<SseEvent>,
    cancel: CancellationToken,
}

/// Decode a byte stream into SSE frames.
///
/// The cancellation token is checked before every yielded frame and raced against
/// every read. A cancellation ends the stream with one terminal `Err(Error::Cancelled)`;
/// a transport error ends it with that error. The input is dropped on every exit path.
pub fn decode_sse(
    input: BoxStream<'static, Bytes>,
    cancel: CancellationToken,
) -> BoxStream<'static, SseEvent> {
    let state = DecodeState {
        input: Some(input),
        parser: SseParser::new(),
        ready: VecDeque::new(),
        cancel,
    };

    let stream = stream::unfold(state, |mut state| async move {
        loop {
            if state.input.is_none() && state.ready.is_empty() {
                return None;
            }

            // Queued frames are discarded once cancelled.
            if state.cancel.is_cancelled() {
                state.input = None;
                state.ready.clear();
                return Some((Err(Error::Cancelled), state));
            }

            if let Some(event) = state.ready.pop_front() {
                return Some((Ok(event), state));
            }

            let mut input = state.input.take()?;

            let next = tokio::select! {
                biased;
                _ = state.cancel.cancelled() => {
                    drop(input);
                    return Some((Err(Error::Cancelled), state));
                }
                next = input.next() => next,
            };

            match next {
                Some(Ok(bytes)) => {
                    state.ready.extend(state.parser.feed(&bytes));
                    state.input = Some(input);
                }
                Some(Err(e)) => {
                    drop(input);
                    return Some((Err(e), state));
                }
                None => {
                    drop(input);
                    state.ready.extend(state.parser.finish());
                    // Loop once more to drain; `input` stays `None` so we stop afterwards.
                }
            }
        }
    });

    Box::pin(stream)
}
