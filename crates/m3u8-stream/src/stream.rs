use std::{io, sync::Arc, time::Duration};

use bytes::Bytes;
use tokio::{io::AsyncRead, sync::mpsc};
use tokio_util::{io::StreamReader as AsyncStreamReader, sync::CancellationToken};
use url::Url;

use crate::{
    error::{StreamError, StreamResult},
    fetch::{HttpTransport, SegmentFetcher},
    options::StreamOptions,
    poller::{ManifestPoller, PollerHandle, PollerState},
    reader::StreamReader,
    store::SegmentStore,
    util::http::HttpClient,
};

/// A live m3u8 playlist read as one continuous byte stream.
///
/// ```text
///                        segments                         read(n)
/// ┌──────────────────┐              ┌────────────────┐              ┌────────────────┐
/// │  ManifestPoller  ├──────────────►  SegmentStore  ├──────────────►  StreamReader  │
/// │   [tokio task]   │   in order   │ [Mutex+Notify] │     bytes    │    [caller]    │
/// └────────┬─────────┘              └────────────────┘              └────────┬───────┘
///          │                                                                 │
///          └─────────────────────── CancellationToken ───────────────────────┘
/// ```
///
/// The poller keeps refreshing the playlist in the background while the
/// caller reads. Disposing the stream cancels both sides and waits for the
/// poller task to finish.
pub struct M3u8Stream {
    reader: StreamReader,
    handle: StreamHandle,
    errors: Option<mpsc::UnboundedReceiver<StreamError>>,
    read_chunk_size: usize,
}

impl M3u8Stream {
    /// Opens `url` with default options. Must be called within a tokio runtime.
    pub fn open(url: impl AsRef<str>) -> StreamResult<Self> {
        M3u8StreamBuilder::new().open(url)
    }

    pub fn builder() -> M3u8StreamBuilder {
        M3u8StreamBuilder::new()
    }

    /// See [StreamReader::read].
    pub async fn read(&mut self, max_bytes: usize) -> StreamResult<Bytes> {
        self.reader.read(max_bytes).await
    }

    /// See [StreamReader::read_with_cancel].
    pub async fn read_with_cancel(
        &mut self,
        max_bytes: usize,
        cancel: &CancellationToken,
    ) -> StreamResult<Bytes> {
        self.reader.read_with_cancel(max_bytes, cancel).await
    }

    /// Forward-only seek, see [StreamReader::seek].
    pub async fn seek(&mut self, position: u64) -> StreamResult<u64> {
        self.reader.seek(position).await
    }

    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    /// Size reported to consumers that ask for one. A live stream has no
    /// known end, so this is always `u64::MAX` and not a count of buffered bytes.
    pub fn reported_len(&self) -> u64 {
        u64::MAX
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> PollerState {
        self.handle.state()
    }

    /// Takes the channel of non-fatal errors, such as segments dropped after
    /// exhausting their retries. Can be taken only once.
    pub fn take_errors(&mut self) -> Option<mpsc::UnboundedReceiver<StreamError>> {
        self.errors.take()
    }

    /// Cancels pending reads, stops the poller and waits for it.
    pub async fn dispose(self) {
        self.handle.dispose().await;
    }

    /// Adapts the stream to [AsyncRead].
    ///
    /// Disposal shows up as end of file, a producer failure as an
    /// [io::ErrorKind::Other] error.
    pub fn into_async_read(self) -> impl AsyncRead + Send + Unpin {
        let chunk_size = self.read_chunk_size;
        let chunks = futures::stream::unfold(self, move |mut stream| async move {
            match stream.read(chunk_size).await {
                Ok(chunk) if chunk.is_empty() => None,
                Ok(chunk) => Some((Ok(chunk), stream)),
                Err(StreamError::Cancelled) => None,
                Err(error) => Some((Err(io::Error::other(error)), stream)),
            }
        });
        AsyncStreamReader::new(Box::pin(chunks))
    }
}

impl Drop for M3u8Stream {
    fn drop(&mut self) {
        // the poller notices on its own, dispose() is needed to wait for it
        self.handle.cancel();
    }
}

/// Cloneable control over a running stream, usable while a read is pending.
#[derive(Clone)]
pub struct StreamHandle {
    poller: Arc<PollerHandle>,
    store: Arc<SegmentStore>,
}

impl StreamHandle {
    pub fn cancel(&self) {
        self.poller.stop();
    }

    pub fn state(&self) -> PollerState {
        self.poller.state()
    }

    /// Waits until the poller stopped, whatever the reason.
    pub async fn stopped(&self) {
        self.poller.stopped().await;
    }

    /// Cancels the stream, waits for the poller to stop and releases the
    /// buffered segments. Calling it again is a no-op.
    pub async fn dispose(&self) {
        self.poller.join().await;
        self.store.clear();
        tracing::debug!("Stream disposed.");
    }
}

pub struct M3u8StreamBuilder<T = HttpClient> {
    transport: T,
    options: StreamOptions,
    parent: Option<CancellationToken>,
}

impl M3u8StreamBuilder<HttpClient> {
    pub fn new() -> Self {
        Self {
            transport: HttpClient::default(),
            options: StreamOptions::default(),
            parent: None,
        }
    }
}

impl Default for M3u8StreamBuilder<HttpClient> {
    fn default() -> Self {
        Self::new()
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl<T> M3u8StreamBuilder<T>
where
    T: HttpTransport,
{
    /// Replaces the transport used for the playlist and segment requests.
    pub fn transport<U>(self, transport: U) -> M3u8StreamBuilder<U>
    where
        U: HttpTransport,
    {
        M3u8StreamBuilder {
            transport,
            options: self.options,
            parent: self.parent,
        }
    }

    pub fn options(mut self, options: StreamOptions) -> Self {
        self.options = options;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.options.retries = retries;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.options.retry_backoff_ms = duration_millis(backoff);
        self
    }

    pub fn max_retry_backoff(mut self, backoff: Duration) -> Self {
        self.options.max_retry_backoff_ms = duration_millis(backoff);
        self
    }

    pub fn default_target_duration(mut self, seconds: u64) -> Self {
        self.options.default_target_duration = seconds;
        self
    }

    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.options.read_chunk_size = size.max(1);
        self
    }

    /// The stream is also cancelled when `token` is.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.parent = Some(token);
        self
    }

    /// Starts polling `url`. Must be called within a tokio runtime.
    pub fn open(self, url: impl AsRef<str>) -> StreamResult<M3u8Stream> {
        let url = Url::parse(url.as_ref())?;
        let cancel = match &self.parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };

        let store = Arc::new(SegmentStore::new());
        let fetcher = SegmentFetcher::new(self.transport, url);
        let (poller, errors) =
            ManifestPoller::new(fetcher, store.clone(), &self.options, cancel.clone());
        let poller = poller.spawn();

        Ok(M3u8Stream {
            reader: StreamReader::new(store.clone(), cancel),
            handle: StreamHandle {
                poller: Arc::new(poller),
                store,
            },
            errors: Some(errors),
            read_chunk_size: self.options.read_chunk_size.max(1),
        })
    }
}
