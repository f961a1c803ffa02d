//! Fan-out of one network body into a consumer and the cache writer
//!
//! A single driver reads the response body and forwards each chunk, in
//! arrival order, to the consumer and to the cache writer. The consumer
//! channel is bounded, so a slow reader slows the download. The cache channel
//! is unbounded: a slow or stalled writer never holds back the consumer.
//! The cache side is best-effort: once its receiver is gone the driver stops
//! feeding it and carries on. The consumer side may also go away, in which
//! case the cache is still populated to the end.

use std::io;

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{DownloadError, DownloadResult};

use super::options::FetchOptions;
use super::progress::DownloadProgress;

pub(crate) type ChunkSender = mpsc::Sender<io::Result<Bytes>>;
pub(crate) type CacheSender = mpsc::UnboundedSender<io::Result<Bytes>>;

/// Turn a chunk receiver into a stream that ends when every sender is gone
pub(crate) fn receiver_stream(
    rx: mpsc::Receiver<io::Result<Bytes>>,
) -> BoxStream<'static, io::Result<Bytes>> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}

/// Unbounded counterpart of [`receiver_stream`] for the cache side
pub(crate) fn cache_stream(
    rx: mpsc::UnboundedReceiver<io::Result<Bytes>>,
) -> BoxStream<'static, io::Result<Bytes>> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}

/// Body driver for one download
pub(crate) struct Tee {
    pub url: String,
    pub total: u64,
    pub consumer: Option<ChunkSender>,
    pub cache: Option<CacheSender>,
    pub options: FetchOptions,
}

enum Forward {
    Sent,
    Closed,
    Cancelled,
}

async fn forward(tx: &ChunkSender, chunk: Bytes, cancel: &CancellationToken) -> Forward {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Forward::Cancelled,
        sent = tx.send(Ok(chunk)) => match sent {
            Ok(()) => Forward::Sent,
            Err(_) => Forward::Closed,
        },
    }
}

impl Tee {
    /// Read `body` to the end, returning the number of bytes received
    ///
    /// On cancellation, body error or a short body, both sides receive an
    /// error item so the cache write session is aborted rather than closed.
    pub async fn run<S>(mut self, body: S) -> DownloadResult<u64>
    where
        S: Stream<Item = reqwest::Result<Bytes>>,
    {
        let mut body = std::pin::pin!(body);
        let mut received = 0u64;
        let cancel = self.options.cancel.clone();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Download of {} cancelled after {} bytes", self.url, received);
                    self.abort(io::ErrorKind::Interrupted, "download cancelled");
                    return Err(DownloadError::Cancelled);
                }
                next = body.next() => next,
            };

            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    warn!("Body of {} failed after {} bytes: {}", self.url, received, e);
                    self.abort(io::ErrorKind::BrokenPipe, &e.to_string());
                    return Err(DownloadError::Http(e));
                }
                None => break,
            };
            received += chunk.len() as u64;

            if let Some(tx) = &self.cache {
                if tx.send(Ok(chunk.clone())).is_err() {
                    warn!("Cache writer for {} stopped; continuing without cache", self.url);
                    self.cache = None;
                }
            }

            if let Some(tx) = &self.consumer {
                match forward(tx, chunk, &cancel).await {
                    Forward::Sent => {}
                    Forward::Closed => {
                        debug!("Consumer of {} went away; still populating cache", self.url);
                        self.consumer = None;
                    }
                    Forward::Cancelled => continue,
                }
            }

            if received < self.total {
                self.options
                    .report(DownloadProgress::new(received, self.total));
            }
        }

        if received != self.total {
            self.abort(io::ErrorKind::UnexpectedEof, "body shorter than Content-Length");
            return Err(DownloadError::IncompleteDownload {
                received,
                expected: self.total,
            });
        }

        self.options.report(DownloadProgress::complete(self.total));
        debug!("Received {} bytes for {}", received, self.url);
        Ok(received)
    }

    /// Push an error item to both sides without blocking the driver
    ///
    /// The cache channel is unbounded, so the writer always sees the error
    /// and discards the partial file. The consumer's error is queued behind
    /// whatever it has not read yet.
    fn abort(&mut self, kind: io::ErrorKind, reason: &str) {
        if let Some(tx) = self.cache.take() {
            let _ = tx.send(Err(io::Error::new(kind, reason.to_string())));
        }
        if let Some(tx) = self.consumer.take() {
            let error = io::Error::new(kind, reason.to_string());
            if let Err(mpsc::error::TrySendError::Full(item)) = tx.try_send(Err(error)) {
                tokio::spawn(async move {
                    let _ = tx.send(item).await;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_receiver_stream_ends_with_senders() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok(Bytes::from_static(b"ab"))).await.unwrap();
        tx.send(Ok(Bytes::from_static(b"cd"))).await.unwrap();
        drop(tx);

        let items: Vec<Bytes> = receiver_stream(rx)
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(items, vec![Bytes::from_static(b"ab"), Bytes::from_static(b"cd")]);
    }

    fn body(parts: &[&'static [u8]]) -> impl Stream<Item = reqwest::Result<Bytes>> {
        let items: Vec<reqwest::Result<Bytes>> =
            parts.iter().map(|p| Ok(Bytes::from_static(*p))).collect();
        stream::iter(items)
    }

    fn cache_only_tee(total: u64, options: FetchOptions) -> (Tee, mpsc::UnboundedReceiver<io::Result<Bytes>>) {
        let (cache_tx, cache_rx) = mpsc::unbounded_channel();
        let tee = Tee {
            url: "https://example.com/m.gguf".to_string(),
            total,
            consumer: None,
            cache: Some(cache_tx),
            options,
        };
        (tee, cache_rx)
    }

    #[tokio::test]
    async fn test_cache_side_never_blocks_consumer() {
        let parts = vec![&b"0123456789"[..]; 200];
        let (mut tee, cache_rx) = cache_only_tee(2_000, FetchOptions::default());
        let (consumer_tx, consumer_rx) = mpsc::channel(4);
        tee.consumer = Some(consumer_tx);

        // Nobody reads the cache side while the consumer drains the body
        let driver = tokio::spawn(tee.run(body(&parts)));
        let consumed: Vec<u8> = receiver_stream(consumer_rx)
            .map(|chunk| chunk.unwrap().to_vec())
            .concat()
            .await;
        assert_eq!(consumed.len(), 2_000);
        assert_eq!(driver.await.unwrap().unwrap(), 2_000);

        let cached: Vec<u8> = cache_stream(cache_rx)
            .map(|chunk| chunk.unwrap().to_vec())
            .concat()
            .await;
        assert_eq!(cached, consumed);
    }

    #[tokio::test]
    async fn test_cancel_after_full_body_still_aborts_cache() {
        let options = FetchOptions::default();
        let cancel = options.cancel.clone();
        let (tee, cache_rx) = cache_only_tee(8, options);

        // Every byte arrives, but the body never signals its end
        let stalled = body(&[b"abcd", b"efgh"]).chain(stream::pending());
        let driver = tokio::spawn(tee.run(stalled));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();

        assert!(matches!(
            driver.await.unwrap(),
            Err(DownloadError::Cancelled)
        ));
        let items: Vec<io::Result<Bytes>> = cache_stream(cache_rx).collect().await;
        assert_eq!(items.len(), 3);
        assert!(items[2].is_err());
    }

    #[tokio::test]
    async fn test_forward_reports_closed_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let cancel = CancellationToken::new();
        assert!(matches!(
            forward(&tx, Bytes::from_static(b"x"), &cancel).await,
            Forward::Closed
        ));
    }

    #[tokio::test]
    async fn test_forward_yields_to_cancellation() {
        let (tx, _rx) = mpsc::channel(1);
        tx.send(Ok(Bytes::from_static(b"fill"))).await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            forward(&tx, Bytes::from_static(b"x"), &cancel).await,
            Forward::Cancelled
        ));
    }
}
