//! Byte-counting stream wrapper shared by downloads and uploads.

use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Called with the size of every chunk that passes through the stream.
pub type ProgressCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Stream wrapper that counts bytes and reports each chunk to a callback.
pub struct ProgressStream<S> {
    inner: S,
    bytes_transferred: u64,
    callback: ProgressCallback,
}

impl<S, E> ProgressStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    pub fn new(inner: S, callback: ProgressCallback) -> Self {
        Self {
            inner,
            bytes_transferred: 0,
            callback,
        }
    }

    /// Bytes seen so far.
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }
}

impl<S, E> Stream for ProgressStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                let chunk_size = bytes.len() as u64;
                self.bytes_transferred += chunk_size;
                (self.callback)(chunk_size);
                Poll::Ready(Some(Ok(bytes)))
            }
            other => other,
        }
    }
}
