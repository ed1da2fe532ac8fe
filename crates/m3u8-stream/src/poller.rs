use std::{collections::HashSet, sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{StreamError, StreamResult},
    fetch::{HttpTransport, SegmentFetcher},
    options::StreamOptions,
    playlist::{self, ParsedPlaylist},
    store::{Segment, SegmentRef, SegmentStore},
    util::retry::RetryPolicy,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Running,
    Stopping,
    Stopped,
}

/// What the poller remembers between two playlist refreshes.
#[derive(Debug, Default)]
pub struct PlaylistState {
    /// First non-zero target duration seen, never updated afterwards.
    pub target_duration: Option<u64>,
    /// Every uri ever taken from the playlist, fetched or skipped.
    pub seen_uris: HashSet<String>,
    next_sequence_index: u64,
}

impl PlaylistState {
    fn pin_target_duration(&mut self, target_duration: Option<u64>) {
        if self.target_duration.is_none() {
            self.target_duration = target_duration.filter(|duration| *duration > 0);
        }
    }

    fn discover(&mut self, uri: &str) -> Option<SegmentRef> {
        if !self.seen_uris.insert(uri.to_string()) {
            return None;
        }

        let sequence_index = self.next_sequence_index;
        self.next_sequence_index += 1;
        Some(SegmentRef {
            uri: uri.to_string(),
            sequence_index,
        })
    }
}

/// Refresh loop feeding a [SegmentStore] from a live playlist.
///
/// Segments are fetched one at a time in playlist order, so the store receives
/// them in discovery order without any reordering buffer.
pub struct ManifestPoller<T> {
    fetcher: SegmentFetcher<T>,
    store: Arc<SegmentStore>,
    retry: RetryPolicy,
    default_target_duration: u64,
    playlist: PlaylistState,
    cancel: CancellationToken,
    errors: mpsc::UnboundedSender<StreamError>,
}

impl<T> ManifestPoller<T>
where
    T: HttpTransport,
{
    /// Creates a poller together with the receiving end of its non-fatal error channel.
    pub fn new(
        fetcher: SegmentFetcher<T>,
        store: Arc<SegmentStore>,
        options: &StreamOptions,
        cancel: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<StreamError>) {
        let (errors, receiver) = mpsc::unbounded_channel();
        let poller = Self {
            fetcher,
            store,
            retry: options.retry_policy(),
            default_target_duration: options.default_target_duration,
            playlist: PlaylistState::default(),
            cancel,
            errors,
        };
        (poller, receiver)
    }

    /// Starts the refresh loop on its own task.
    pub fn spawn(self) -> PollerHandle {
        let (state, receiver) = watch::channel(PollerState::Running);
        let cancel = self.cancel.clone();
        let task = tokio::spawn(self.run(state));

        PollerHandle {
            cancel,
            state: receiver,
            task: Mutex::new(Some(task)),
        }
    }

    async fn run(mut self, state: watch::Sender<PollerState>) {
        let mut exit = ExitGuard {
            store: self.store.clone(),
            state,
            completed: false,
        };
        tracing::info!("Start polling {}.", self.fetcher.manifest_url());

        match self.poll().await {
            Ok(()) => {
                tracing::info!(
                    "Playlist ended after {} segments.",
                    self.playlist.seen_uris.len()
                );
                self.store.mark_finished();
            }
            Err(StreamError::Cancelled) => {
                exit.state.send_replace(PollerState::Stopping);
                tracing::info!("Poller cancelled, stopping.");
            }
            Err(error) => {
                tracing::error!("Polling playlist failed: {error}");
                self.store.mark_failed(error);
            }
        }

        exit.completed = true;
    }

    /// Refreshes until the playlist ends, the poller is cancelled or a fatal error occurs.
    async fn poll(&mut self) -> StreamResult<()> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(StreamError::Cancelled);
            }

            let fetcher = &self.fetcher;
            let text = self
                .retry
                .run(&self.cancel, fetcher.manifest_url(), move || {
                    fetcher.fetch_manifest()
                })
                .await?;
            let playlist = playlist::parse(&text)?;
            self.playlist.pin_target_duration(playlist.target_duration);

            self.fetch_new_segments(&playlist).await?;
            if playlist.end_list {
                return Ok(());
            }

            let interval = self.poll_interval();
            tracing::debug!("Next playlist refresh in {interval:?}.");
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(StreamError::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    async fn fetch_new_segments(&mut self, playlist: &ParsedPlaylist) -> StreamResult<()> {
        let new_segments: Vec<_> = playlist
            .segments
            .iter()
            .filter_map(|uri| self.playlist.discover(uri))
            .collect();
        if new_segments.is_empty() {
            return Ok(());
        }
        tracing::info!(
            "{} new segments found (media sequence {:?}).",
            new_segments.len(),
            playlist.media_sequence
        );

        for reference in new_segments {
            let url = match self.fetcher.resolve(&reference.uri) {
                Ok(url) => url,
                Err(error) => {
                    tracing::warn!("Skipping segment {}: {error}", reference.uri);
                    _ = self.errors.send(error);
                    continue;
                }
            };

            let fetcher = &self.fetcher;
            let url = &url;
            let result = self
                .retry
                .run(&self.cancel, url, move || fetcher.fetch_segment(url))
                .await;
            match result {
                Ok(payload) => {
                    tracing::debug!(
                        "Segment {} fetched, {} bytes.",
                        reference.uri,
                        payload.len()
                    );
                    self.store.append(Segment::new(reference, payload));
                }
                Err(StreamError::Cancelled) => return Err(StreamError::Cancelled),
                Err(error) => {
                    tracing::warn!("Segment {} dropped. {error}", reference.uri);
                    _ = self.errors.send(error);
                }
            }
        }

        Ok(())
    }

    /// Half the target duration, so the playlist is polled faster than segments are published.
    fn poll_interval(&self) -> Duration {
        let target_duration = self
            .playlist
            .target_duration
            .unwrap_or(self.default_target_duration)
            .max(1);
        Duration::from_secs(target_duration) / 2
    }
}

/// Publishes [PollerState::Stopped] however the poller task ends.
///
/// A task that panics or is aborted never completes `run`, so the store is
/// failed here and readers do not wait forever.
struct ExitGuard {
    store: Arc<SegmentStore>,
    state: watch::Sender<PollerState>,
    completed: bool,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if !self.completed {
            tracing::error!("Poller task ended abnormally.");
            self.store.mark_failed(StreamError::PollerAborted);
        }
        self.state.send_replace(PollerState::Stopped);
    }
}

/// Owner side of a spawned [ManifestPoller].
pub struct PollerHandle {
    cancel: CancellationToken,
    state: watch::Receiver<PollerState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollerHandle {
    /// Asks the poller to stop. It stops at its next suspension point.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> PollerState {
        *self.state.borrow()
    }

    /// Waits until the poller reached [PollerState::Stopped].
    pub async fn stopped(&self) {
        let mut state = self.state.clone();
        // the sender is gone only if the task is gone as well
        _ = state.wait_for(|state| *state == PollerState::Stopped).await;
    }

    /// Stops the poller and waits for its task to finish.
    pub async fn join(&self) {
        self.stop();

        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(error) = task.await {
                tracing::error!("Poller task failed: {error}");
            }
        }
        self.stopped().await;
    }
}
