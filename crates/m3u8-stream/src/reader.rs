use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{StreamError, StreamResult},
    store::{Segment, SegmentStore},
};

/// Largest single read issued while seeking forward.
const SEEK_CHUNK: u64 = 64 * 1024;

/// The part of the head segment that has not been delivered yet.
struct Cursor {
    sequence_index: u64,
    remaining: Bytes,
}

impl From<Segment> for Cursor {
    fn from(segment: Segment) -> Self {
        Self {
            sequence_index: segment.reference.sequence_index,
            remaining: segment.payload,
        }
    }
}

/// Consumer side of a [SegmentStore], serving the segments as one byte sequence.
pub struct StreamReader {
    store: Arc<SegmentStore>,
    cancel: CancellationToken,
    current: Option<Cursor>,
    position: u64,
}

impl StreamReader {
    pub fn new(store: Arc<SegmentStore>, cancel: CancellationToken) -> Self {
        Self {
            store,
            cancel,
            current: None,
            position: 0,
        }
    }

    /// Reads between 1 and `max_bytes` bytes.
    ///
    /// Waits only while nothing has been copied yet: once some bytes are
    /// available they are returned instead of waiting for the next segment.
    /// An empty result means the playlist ended and every segment was read.
    pub async fn read(&mut self, max_bytes: usize) -> StreamResult<Bytes> {
        self.read_inner(max_bytes, None).await
    }

    /// Same as [StreamReader::read], additionally aborted by `cancel`.
    ///
    /// Cancelling this token fails only the current call, the stream stays usable.
    pub async fn read_with_cancel(
        &mut self,
        max_bytes: usize,
        cancel: &CancellationToken,
    ) -> StreamResult<Bytes> {
        self.read_inner(max_bytes, Some(cancel)).await
    }

    async fn read_inner(
        &mut self,
        max_bytes: usize,
        caller: Option<&CancellationToken>,
    ) -> StreamResult<Bytes> {
        // a disposed stream has released its segments, including the one under the cursor
        if self.cancel.is_cancelled() {
            return Err(StreamError::Cancelled);
        }
        if max_bytes == 0 {
            return Ok(Bytes::new());
        }

        let mut output = BytesMut::new();
        while output.len() < max_bytes {
            if self.current.is_none() {
                let head = if output.is_empty() {
                    self.wait_head(caller).await?
                } else {
                    self.store.peek()
                };
                let Some(head) = head else {
                    break;
                };
                self.current = Some(head.into());
            }

            let Some(cursor) = self.current.as_mut() else {
                break;
            };
            let take = cursor.remaining.len().min(max_bytes - output.len());
            output.extend_from_slice(&cursor.remaining.split_to(take));

            if cursor.remaining.is_empty() {
                let drained = cursor.sequence_index;
                self.current = None;
                if let Some(popped) = self.store.pop_front() {
                    debug_assert_eq!(popped.reference.sequence_index, drained);
                }
            }
        }

        self.position += output.len() as u64;
        Ok(output.freeze())
    }

    async fn wait_head(&self, caller: Option<&CancellationToken>) -> StreamResult<Option<Segment>> {
        match caller {
            Some(caller) => tokio::select! {
                biased;
                _ = caller.cancelled() => Err(StreamError::Cancelled),
                head = self.store.peek_or_wait(&self.cancel) => head,
            },
            None => self.store.peek_or_wait(&self.cancel).await,
        }
    }

    /// Moves forward to `position` by reading through the bytes in between.
    ///
    /// Returns the reached position, which is short of `position` only when the
    /// playlist ended first. Bytes already delivered are gone, so seeking
    /// backwards fails with [StreamError::UnsupportedSeek].
    pub async fn seek(&mut self, position: u64) -> StreamResult<u64> {
        if position < self.position {
            return Err(StreamError::UnsupportedSeek {
                requested: position,
                position: self.position,
            });
        }

        while self.position < position {
            let step = (position - self.position).min(SEEK_CHUNK) as usize;
            if self.read(step).await?.is_empty() {
                break;
            }
        }
        Ok(self.position)
    }

    /// Bytes delivered so far.
    pub fn position(&self) -> u64 {
        self.position
    }
}
