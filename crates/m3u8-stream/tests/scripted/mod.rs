
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use bytes::Bytes;
use m3u8_stream::{FetchError, HttpTransport, M3u8Stream, StreamResult};
use url::Url;

pub const MANIFEST_URL: &str = "http://live.test/stream/index.m3u8";

/// In-memory playlist server.
///
/// Playlists are served in the order they were scripted; the last one keeps
/// being served once the others are used up. Segments are looked up by file name.
#[derive(Default)]
pub struct ScriptedTransport {
    manifests: Mutex<VecDeque<Result<String, String>>>,
    segments: Mutex<HashMap<String, Bytes>>,
    manifest_requests: AtomicUsize,
    segment_requests: Mutex<HashMap<String, usize>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn manifest(&self, text: impl Into<String>) -> &Self {
        self.manifests.lock().unwrap().push_back(Ok(text.into()));
        self
    }

    pub fn manifest_error(&self, message: &str) -> &Self {
        self.manifests
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    pub fn segment(&self, name: &str, payload: impl Into<Bytes>) -> &Self {
        self.segments
            .lock()
            .unwrap()
            .insert(name.to_string(), payload.into());
        self
    }

    pub fn manifest_requests(&self) -> usize {
        self.manifest_requests.load(Ordering::Relaxed)
    }

    pub fn segment_requests(&self, name: &str) -> usize {
        self.segment_requests
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or_default()
    }
}

impl HttpTransport for ScriptedTransport {
    async fn get_text(&self, _url: Url) -> Result<String, FetchError> {
        self.manifest_requests.fetch_add(1, Ordering::Relaxed);

        let mut manifests = self.manifests.lock().unwrap();
        let manifest = if manifests.len() > 1 {
            manifests.pop_front()
        } else {
            manifests.front().cloned()
        };
        match manifest {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(FetchError::Transport(message)),
            None => Err(FetchError::Transport("no playlist scripted".to_string())),
        }
    }

    async fn get_bytes(&self, url: Url) -> Result<Bytes, FetchError> {
        let name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string();
        *self
            .segment_requests
            .lock()
            .unwrap()
            .entry(name.clone())
            .or_default() += 1;

        self.segments
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .ok_or_else(|| FetchError::Transport(format!("{name} not found")))
    }
}

/// Builds a playlist whose segments all last `target_duration` seconds.
pub fn playlist(target_duration: u64, segments: &[&str], end_list: bool) -> String {
    let mut text = format!("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:{target_duration}\n");
    for uri in segments {
        text.push_str(&format!("#EXTINF:{target_duration}.0,\n{uri}\n"));
    }
    if end_list {
        text.push_str("#EXT-X-ENDLIST\n");
    }
    text
}

pub fn open(transport: &Arc<ScriptedTransport>) -> M3u8Stream {
    M3u8Stream::builder()
        .transport(transport.clone())
        .retries(2)
        .retry_backoff(Duration::from_millis(10))
        .open(MANIFEST_URL)
        .unwrap()
}

pub async fn read_to_end(stream: &mut M3u8Stream) -> StreamResult<Vec<u8>> {
    let mut data = Vec::new();
    loop {
        let chunk = stream.read(1024).await?;
        if chunk.is_empty() {
            return Ok(data);
        }
        data.extend_from_slice(&chunk);
    }
}
