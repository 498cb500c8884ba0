use crate::{BoxStream, Error};
use futures::{stream, StreamExt};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Terminate `input` with `Err(Error::IdleTimeout)` when no item arrives within `idle`
/// of the previous one (or of the start).
///
/// The timer restarts on every item, so it measures stalls rather than total time.
/// Cancellation short-circuits the wait with `Err(Error::Cancelled)`. The first error
/// item, produced here or upstream, ends the stream.
pub fn with_idle_timeout<T>(
    input: BoxStream<'static, T>,
    idle: Duration,
    cancel: CancellationToken,
) -> BoxStream<'static, T>
where
    T: Send + 'static,
{
    let stream = stream::unfold(Some(input), move |state| {
        let cancel = cancel.clone();
        async move {
            let mut input = state?;
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Cancelled),
                res = tokio::time::timeout(idle, input.next()) => match res {
                    Ok(item) => Ok(item),
                    Err(_) => Err(Error::IdleTimeout { idle_ms: idle.as_millis() as u64 }),
                },
            };
            match next {
                Ok(Some(Ok(item))) => Some((Ok(item), Some(input))),
                Ok(Some(Err(e))) => Some((Err(e), None)),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "stream terminated while waiting for next chunk");
                    Some((Err(e), None))
                }
            }
        }
    });
    Box::pin(stream)
}
