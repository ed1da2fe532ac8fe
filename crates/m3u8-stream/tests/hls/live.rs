use std::time::Duration;

use m3u8_stream::{FetchError, M3u8Stream, ParseError, PollerState, StreamError};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::hls::{setup_mock_server, HlsMock};

#[tokio::test]
async fn test_partial_reads_over_http() -> anyhow::Result<()> {
    let (uri, server) =
        setup_mock_server("#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXTINF:4,\nseg1.ts\n").await;
    server.mock_segment("/live/seg1.ts", (0..10).collect()).await;

    let mut stream = M3u8Stream::open(&uri)?;
    assert_eq!(stream.read(6).await?, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(stream.read(10).await?, vec![6, 7, 8, 9]);

    // nothing new is published, the next read waits until it is cancelled
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.cancel();
    });
    let error = stream.read_with_cancel(10, &cancel).await.unwrap_err();
    assert!(error.is_cancelled());
    assert_eq!(stream.state(), PollerState::Running);

    let handle = stream.handle();
    stream.dispose().await;
    assert_eq!(handle.state(), PollerState::Stopped);

    Ok(())
}

#[tokio::test]
async fn test_absolute_segment_uris() -> anyhow::Result<()> {
    let server = wiremock::MockServer::start().await;
    let base = server.uri();
    let (uri, _playlist_server) = setup_mock_server(&format!(
        "#EXTM3U
#EXT-X-TARGETDURATION:10
#EXT-X-VERSION:3
#EXTINF:9.009,
{base}/media/first.ts
#EXTINF:9.009,
{base}/media/second.ts
#EXT-X-ENDLIST"
    ))
    .await;
    server
        .mock_segment("/media/first.ts", b"first;".to_vec())
        .await
        .mock_segment("/media/second.ts", b"second".to_vec())
        .await;

    let stream = M3u8Stream::open(&uri)?;
    let mut reader = stream.into_async_read();
    let mut data = String::new();
    reader.read_to_string(&mut data).await?;

    assert_eq!(data, "first;second");

    Ok(())
}

#[tokio::test]
async fn test_missing_segment_reports_http_status() -> anyhow::Result<()> {
    let (uri, server) = setup_mock_server(
        "#EXTM3U
#EXT-X-TARGETDURATION:2
#EXTINF:2,
gone.ts
#EXTINF:2,
kept.ts
#EXT-X-ENDLIST",
    )
    .await;
    server.mock_segment("/live/kept.ts", b"kept".to_vec()).await;

    let mut stream = M3u8Stream::builder().retries(0).open(&uri)?;
    let mut errors = stream.take_errors().expect("errors taken once");

    assert_eq!(stream.read(16).await?, "kept");
    assert!(stream.read(16).await?.is_empty());

    match errors.recv().await {
        Some(StreamError::RetriesExhausted {
            source: FetchError::HttpError(status),
            attempts: 1,
            ..
        }) => assert_eq!(status, 404),
        other => panic!("unexpected error: {other:?}"),
    }

    Ok(())
}

#[tokio::test]
async fn test_not_a_playlist() -> anyhow::Result<()> {
    let (uri, _server) = setup_mock_server("<html><body>Not found</body></html>").await;

    let mut stream = M3u8Stream::open(&uri)?;
    let error = tokio::time::timeout(Duration::from_secs(5), stream.read(16))
        .await?
        .unwrap_err();
    assert!(matches!(
        error.producer_error(),
        Some(StreamError::Parse(ParseError::MalformedPlaylist(_)))
    ));

    Ok(())
}

#[tokio::test]
async fn test_invalid_url() {
    let result = M3u8Stream::open("not a url");
    assert!(matches!(result, Err(StreamError::UrlParseError(_))));
}
