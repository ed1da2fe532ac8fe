use std::{future::Future, sync::Arc};

use bytes::Bytes;
use url::Url;

use crate::{
    error::{FetchError, StreamResult},
    util::http::HttpClient,
};

/// The network side of a stream: plain `GET` requests for text and for bytes.
pub trait HttpTransport: Send + Sync + 'static {
    fn get_text(&self, url: Url) -> impl Future<Output = Result<String, FetchError>> + Send;

    fn get_bytes(&self, url: Url) -> impl Future<Output = Result<Bytes, FetchError>> + Send;
}

impl<T> HttpTransport for Arc<T>
where
    T: HttpTransport,
{
    fn get_text(&self, url: Url) -> impl Future<Output = Result<String, FetchError>> + Send {
        self.as_ref().get_text(url)
    }

    fn get_bytes(&self, url: Url) -> impl Future<Output = Result<Bytes, FetchError>> + Send {
        self.as_ref().get_bytes(url)
    }
}

impl HttpClient {
    async fn get_success(&self, url: Url) -> Result<reqwest::Response, FetchError> {
        let response = self.get(url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            if let Ok(body) = response.text().await {
                tracing::warn!("Error body: {body}");
            }
            return Err(FetchError::HttpError(status));
        }
        Ok(response)
    }
}

impl HttpTransport for HttpClient {
    async fn get_text(&self, url: Url) -> Result<String, FetchError> {
        let response = self.get_success(url).await?;
        Ok(response.text().await?)
    }

    async fn get_bytes(&self, url: Url) -> Result<Bytes, FetchError> {
        let response = self.get_success(url).await?;
        Ok(response.bytes().await?)
    }
}

/// Fetches the playlist and its segments. No retry happens here.
pub struct SegmentFetcher<T> {
    transport: T,
    manifest_url: Url,
}

impl<T> SegmentFetcher<T>
where
    T: HttpTransport,
{
    pub fn new(transport: T, manifest_url: Url) -> Self {
        Self {
            transport,
            manifest_url,
        }
    }

    pub fn manifest_url(&self) -> &Url {
        &self.manifest_url
    }

    /// Resolves a segment uri as written in the playlist. Relative uris are
    /// relative to the playlist location.
    pub fn resolve(&self, uri: &str) -> StreamResult<Url> {
        Ok(self.manifest_url.join(uri)?)
    }

    pub async fn fetch_manifest(&self) -> Result<String, FetchError> {
        self.transport.get_text(self.manifest_url.clone()).await
    }

    pub async fn fetch_segment(&self, url: &Url) -> Result<Bytes, FetchError> {
        self.transport.get_bytes(url.clone()).await
    }
}
