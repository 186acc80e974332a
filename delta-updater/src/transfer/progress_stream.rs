//! Response bodies collected with download progress.
//!
//! Retrievers hand back whole files, so a body is drained into one buffer
//! while the running total goes to a [`ProgressCallback`].

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use std::pin::pin;
use std::sync::Arc;
use tokio::time::{Duration, Instant};

/// Receives the cumulative number of bytes received so far
pub type ProgressCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Minimum gap between two intermediate reports
const REPORT_INTERVAL: Duration = Duration::from_millis(250);

/// Largest buffer reserved up front from a declared content length
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// A callback that ignores every update
pub fn noop_progress() -> ProgressCallback {
    Arc::new(|_| {})
}

/// Drain `chunks` into a single buffer.
///
/// `progress` sees the running total at most every 250ms and always once
/// with the final size. The first chunk error aborts collection and no final
/// report is made.
pub async fn collect_with_progress<S, E>(
    chunks: S,
    expected_len: Option<u64>,
    progress: &ProgressCallback,
) -> Result<Bytes, E>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    let mut chunks = pin!(chunks);
    let capacity = expected_len.unwrap_or(0).min(MAX_PREALLOCATION) as usize;
    let mut body = BytesMut::with_capacity(capacity);
    let mut last_report = Instant::now();

    while let Some(chunk) = chunks.next().await {
        body.extend_from_slice(&chunk?);
        if last_report.elapsed() >= REPORT_INTERVAL {
            progress(body.len() as u64);
            last_report = Instant::now();
        }
    }

    progress(body.len() as u64);
    Ok(body.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::io;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_collects_and_reports_final_total() {
        let seen = Arc::new(AtomicU64::new(0));
        let seen_clone = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |bytes| {
            seen_clone.store(bytes, Ordering::Relaxed);
        });

        let chunks = vec![
            Ok::<_, io::Error>(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ];
        let body = collect_with_progress(stream::iter(chunks), Some(11), &callback)
            .await
            .unwrap();

        assert_eq!(&body[..], b"hello world");
        assert_eq!(seen.load(Ordering::Relaxed), 11);
    }

    #[tokio::test]
    async fn test_chunk_error_stops_without_final_report() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let callback: ProgressCallback = Arc::new(move |_| {
            calls_clone.fetch_add(1, Ordering::Relaxed);
        });

        let chunks = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            Ok(Bytes::from_static(b"never read")),
        ];
        let result = collect_with_progress(stream::iter(chunks), None, &callback).await;

        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_empty_body() {
        let body = collect_with_progress(
            stream::iter(Vec::<Result<Bytes, io::Error>>::new()),
            Some(0),
            &noop_progress(),
        )
        .await
        .unwrap();
        assert!(body.is_empty());
    }
}
