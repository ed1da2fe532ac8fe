use m3u8_stream::M3u8Stream;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let url = std::env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: pipe <m3u8_url>");
        std::process::exit(1);
    });

    let stream = M3u8Stream::open(url)?;
    let handle = stream.handle();
    let mut reader = stream.into_async_read();
    let mut stdout = tokio::io::stdout();

    tokio::select! {
        result = tokio::io::copy(&mut reader, &mut stdout) => {
            let copied = result?;
            tracing::info!("Playlist ended, {copied} bytes written.");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl-C received, stopping stream.");
        }
    }

    drop(reader);
    handle.dispose().await;
    Ok(())
}
