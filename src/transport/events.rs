//! Streaming newline-delimited JSON event decoding.
//!
//! The engine's events endpoint emits one JSON document per line over an
//! unbounded byte stream, fragmented at arbitrary chunk boundaries. The
//! decoder buffers bytes across chunks, splits on newlines, and yields
//! each line that parses as JSON. Malformed or empty lines are skipped
//! silently; they never abort the sequence. Splitting happens at the byte
//! level, so a chunk boundary inside a multi-byte UTF-8 sequence is
//! harmless.
//!
//! The carry-over buffer is owned by the decoder value itself, never by
//! the transport, so concurrent decode calls against one transport cannot
//! interleave their buffers. Dropping the decoder drops the underlying
//! byte stream, which cancels the request that produced it.

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use serde_json::Value;

use crate::error::{ConnectionError, Result};

/// A lazy, single-pass sequence of decoded JSON event records.
///
/// Finite only if the underlying stream ends; not restartable, since a
/// fresh sequence requires re-issuing the underlying request. An upstream I/O
/// failure is yielded once as an error, after which the sequence ends.
pub struct EventStream<S> {
    inner: S,
    buffer: BytesMut,
    pending: VecDeque<Value>,
    done: bool,
}

impl<S> EventStream<S> {
    /// Wraps a byte stream in an event decoder.
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }

    /// Appends a chunk to the buffer and decodes every complete line.
    ///
    /// The final (possibly incomplete) fragment stays in the buffer for
    /// the next chunk.
    fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(newline) = self.buffer.iter().position(|&byte| byte == b'\n') {
            let line = self.buffer.split_to(newline + 1);
            push_candidate(&mut self.pending, &line);
        }
    }

    /// Makes one final decode attempt on whatever the buffer still holds.
    fn finish(&mut self) {
        let remainder = self.buffer.split();
        push_candidate(&mut self.pending, &remainder);
    }
}

/// Trims a candidate line and queues it if it parses as JSON.
fn push_candidate(pending: &mut VecDeque<Value>, raw: &[u8]) {
    let candidate = raw.trim_ascii();
    if candidate.is_empty() {
        return;
    }
    match serde_json::from_slice(candidate) {
        Ok(value) => pending.push_back(value),
        Err(error) => {
            tracing::debug!(error = %error, "skipping undecodable event line");
        }
    }
}

impl<S, E> Stream for EventStream<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: fmt::Display,
{
    type Item = Result<Value>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(value) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(value)));
            }
            if this.done {
                return Poll::Ready(None);
            }
            match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
                Some(Ok(chunk)) => this.feed(&chunk),
                Some(Err(error)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(ConnectionError::Exchange {
                        message: error.to_string(),
                    }
                    .into())));
                }
                None => {
                    this.finish();
                    this.done = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![expect(
        clippy::expect_used,
        clippy::indexing_slicing,
        reason = "expect and literal indexing are standard practice in tests"
    )]

    use std::io;

    use futures_util::StreamExt;
    use rstest::rstest;

    use super::*;

    fn chunked(parts: &[&str]) -> Vec<io::Result<Bytes>> {
        parts
            .iter()
            .map(|part| Ok(Bytes::copy_from_slice(part.as_bytes())))
            .collect()
    }

    async fn decode_all(parts: &[&str]) -> Vec<Value> {
        let stream = futures_util::stream::iter(chunked(parts));
        EventStream::new(stream)
            .map(|item| item.expect("decoding should not fail"))
            .collect()
            .await
    }

    #[tokio::test]
    async fn line_split_across_chunks_yields_one_record() {
        let records = decode_all(&["{\"Type\":\"container\",\"", "Action\":\"start\"}\n"]).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["Type"], "container");
        assert_eq!(records[0]["Action"], "start");
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped_in_order() {
        let records = decode_all(&[
            "{\"id\":1}\n",
            "not json at all\n",
            "{\"id\":2}\n",
            "{truncated\n",
            "{\"id\":3}\n",
        ])
        .await;
        let ids: Vec<i64> = records
            .iter()
            .map(|record| record["id"].as_i64().expect("id should be a number"))
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn trailing_fragment_is_flushed_at_end_of_stream() {
        let records = decode_all(&["{\"id\":1}\n{\"id\":", "2}"]).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["id"], 2);
    }

    #[tokio::test]
    async fn empty_and_whitespace_lines_are_skipped() {
        let records = decode_all(&["\n \n\t\n{\"id\":1}\n\n"]).await;
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn whitespace_only_stream_yields_nothing() {
        let records = decode_all(&["  \n", " "]).await;
        assert!(records.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn any_chunk_boundary_yields_exactly_one_record() {
        // Non-ASCII content makes boundary handling inside multi-byte
        // UTF-8 sequences observable.
        let document = "{\"Action\":\"señal\",\"Type\":\"contenedor\"}\n";
        let raw = document.as_bytes();
        for split in 1..raw.len() {
            let (head, tail) = raw.split_at(split);
            let chunks: Vec<io::Result<Bytes>> = vec![
                Ok(Bytes::copy_from_slice(head)),
                Ok(Bytes::copy_from_slice(tail)),
            ];
            let records: Vec<Value> = EventStream::new(futures_util::stream::iter(chunks))
                .map(|item| item.expect("decoding should not fail"))
                .collect()
                .await;
            assert_eq!(records.len(), 1, "split at byte {split}");
            assert_eq!(records[0]["Action"], "señal", "split at byte {split}");
        }
    }

    #[tokio::test]
    async fn upstream_error_is_yielded_once_then_stream_ends() {
        let chunks: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"{\"id\":1}\n")),
            Err(io::Error::other("connection reset")),
        ];
        let mut stream = EventStream::new(futures_util::stream::iter(chunks));
        let first = stream.next().await.expect("first item should exist");
        assert_eq!(first.expect("first item should decode")["id"], 1);
        let second = stream.next().await.expect("second item should exist");
        let error = second.expect_err("second item should be the upstream error");
        assert!(error.to_string().contains("connection reset"));
        assert!(stream.next().await.is_none());
    }
}
