use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use bytes::Bytes;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{StreamError, StreamResult};

/// Identity of a segment: the uri exactly as it appeared in the playlist.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentRef {
    pub uri: String,
    /// Position in discovery order, allocated by the poller, starts from 0
    pub sequence_index: u64,
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub reference: SegmentRef,
    pub payload: Bytes,
}

impl Segment {
    pub fn new(reference: SegmentRef, payload: Bytes) -> Self {
        Self { reference, payload }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[derive(Default)]
struct StoreState {
    queue: VecDeque<Segment>,
    buffered_bytes: usize,
    failure: Option<Arc<StreamError>>,
    finished: bool,
}

/// Ordered buffer between the poller and the reader.
///
/// The producer appends at the tail, the single consumer peeks and pops at the
/// head. The lock is only held for queue manipulation, never across an await.
#[derive(Default)]
pub struct SegmentStore {
    state: Mutex<StoreState>,
    notify: Notify,
}

impl SegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a segment at the tail and wakes a waiting reader. Never blocks.
    ///
    /// Segments offered after the store was finished or failed are dropped.
    pub fn append(&self, segment: Segment) {
        {
            let mut state = self.state();
            if state.finished || state.failure.is_some() {
                tracing::debug!(
                    "Store closed, dropping segment {}.",
                    segment.reference.uri
                );
                return;
            }
            debug_assert!(state
                .queue
                .back()
                .map_or(true, |last| last.reference.sequence_index
                    <= segment.reference.sequence_index));

            state.buffered_bytes += segment.len();
            state.queue.push_back(segment);
        }
        self.notify.notify_waiters();
    }

    /// Returns the head segment without waiting, if there is one.
    pub fn peek(&self) -> Option<Segment> {
        self.state().queue.front().cloned()
    }

    /// Returns the head segment, waiting for the producer if the queue is empty.
    ///
    /// Resolves to `Ok(None)` once the producer finished and everything was
    /// drained. Buffered segments are still served after a producer failure;
    /// the failure is reported once the queue runs dry.
    pub async fn peek_or_wait(&self, cancel: &CancellationToken) -> StreamResult<Option<Segment>> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // register before inspecting the queue so an append in between is not missed
            notified.as_mut().enable();

            if cancel.is_cancelled() {
                return Err(StreamError::Cancelled);
            }

            {
                let state = self.state();
                if let Some(segment) = state.queue.front() {
                    return Ok(Some(segment.clone()));
                }
                if let Some(failure) = &state.failure {
                    return Err(StreamError::ProducerFailed(failure.clone()));
                }
                if state.finished {
                    return Ok(None);
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StreamError::Cancelled),
                _ = &mut notified => {}
            }
        }
    }

    /// Removes the head segment once the reader has drained it.
    pub fn pop_front(&self) -> Option<Segment> {
        let mut state = self.state();
        let segment = state.queue.pop_front()?;
        state.buffered_bytes -= segment.len();
        Some(segment)
    }

    /// Records a fatal producer error. Only the first failure is kept.
    pub fn mark_failed(&self, error: StreamError) {
        {
            let mut state = self.state();
            if state.failure.is_none() {
                state.failure = Some(Arc::new(error));
            }
        }
        self.notify.notify_waiters();
    }

    /// The producer reached the end of the playlist, nothing will be appended anymore.
    pub fn mark_finished(&self) {
        self.state().finished = true;
        self.notify.notify_waiters();
    }

    pub fn failure(&self) -> Option<Arc<StreamError>> {
        self.state().failure.clone()
    }

    /// Drops every buffered segment.
    pub fn clear(&self) {
        let mut state = self.state();
        state.queue.clear();
        state.buffered_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().queue.is_empty()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.state().buffered_bytes
    }
}
