//! VBAN Receiver Application
//!
//! Listens for a VBAN stream and writes the re-chunked PCM to a file, or
//! discards it when no output path is given.
//!
//! Usage: `receiver [config.toml] [output.pcm]`

use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vban_stream::{
    audio::{AudioSink, NullSink, WriterSink},
    config::AppConfig,
    session::StreamSession,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting VBAN Receiver");

    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from);
    let output_path = args.next().map(PathBuf::from);

    let config = AppConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    let sink: Box<dyn AudioSink> = match &output_path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            tracing::info!("Writing raw PCM to {}", path.display());
            Box::new(WriterSink::new(BufWriter::new(file)))
        }
        None => Box::new(NullSink::new()),
    };

    let mut session = StreamSession::new(&config, sink)?;
    session.start()?;

    if let Some(addr) = session.local_addr() {
        tracing::info!("Listening on {}", addr);
    }
    if let Some(format) = config.pipeline.expected_format {
        tracing::info!("Expecting {}", format.to_format());
    }
    tracing::info!("Waiting for audio streams... (Ctrl+C to stop)");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stats_timer = tokio::time::interval(Duration::from_secs(5));
    stats_timer.tick().await;

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl+C")?;
                break;
            }
            _ = stats_timer.tick() => {
                let rx = session.receiver_stats();
                let pipeline = session.pipeline_stats();
                let playback = session.playback_stats();
                tracing::info!(
                    "Receiver stats: {} datagrams, {} dispatched, {} dropped, {} size mismatches",
                    rx.datagrams,
                    rx.dispatched,
                    rx.dropped(),
                    rx.size_mismatch
                );
                tracing::info!(
                    "Pipeline stats: {} chunks queued, {} played, {} overruns, {} queue full",
                    pipeline.chunks,
                    playback.chunks,
                    pipeline.overruns,
                    pipeline.queue_full
                );
            }
        }
    }

    tracing::info!("Shutting down...");
    let report = tokio::task::spawn_blocking(move || session.shutdown()).await??;
    tracing::info!(
        "Received {} datagrams, played {} bytes",
        report.receiver.datagrams,
        report.playback.bytes
    );

    Ok(())
}
