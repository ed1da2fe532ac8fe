use std::sync::Arc;

use thiserror::Error;
use url::Url;

/// Structural problems in the playlist text. All of them are fatal for a poller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("The playlist does not contain any data")]
    EmptyPlaylist,

    #[error("Invalid m3u8 file: {0}")]
    MalformedPlaylist(String),

    #[error("EXTINF on line {line} is not followed by a segment uri")]
    TruncatedPlaylist { line: usize },
}

/// Failure of a single request against the HTTP collaborator.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Transport(String),
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Exceeded retry limit fetching {url} ({attempts} attempts): {source}")]
    RetriesExhausted {
        url: Url,
        attempts: u32,
        #[source]
        source: FetchError,
    },

    #[error("Stream cancelled")]
    Cancelled,

    #[error("Poller task stopped unexpectedly")]
    PollerAborted,

    #[error("Playlist producer failed: {0}")]
    ProducerFailed(Arc<StreamError>),

    #[error("Can not seek backwards to {requested}, stream is already at {position}")]
    UnsupportedSeek { requested: u64, position: u64 },

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),
}

impl StreamError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StreamError::Cancelled)
    }

    /// The error that stopped the producer, if this is a [StreamError::ProducerFailed].
    pub fn producer_error(&self) -> Option<&StreamError> {
        match self {
            StreamError::ProducerFailed(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

pub type StreamResult<T> = Result<T, StreamError>;
