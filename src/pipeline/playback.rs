//! Playback worker: pops chunks and writes them to an [`AudioSink`]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use super::queue::ChunkReceiver;
use crate::audio::AudioSink;
use crate::config::ThreadConfig;
use crate::error::{Error, PipelineError, SinkError};

#[derive(Debug, Default)]
pub struct PlaybackStats {
    chunks: AtomicU64,
    bytes: AtomicU64,
    sink_errors: AtomicU64,
    /// Chunks that arrived out of sequence
    gaps: AtomicU64,
}

impl PlaybackStats {
    pub fn snapshot(&self) -> PlaybackStatsSnapshot {
        PlaybackStatsSnapshot {
            chunks: self.chunks.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
            gaps: self.gaps.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStatsSnapshot {
    pub chunks: u64,
    pub bytes: u64,
    pub sink_errors: u64,
    pub gaps: u64,
}

/// Drain `queue` into `sink` until shutdown or disconnect
///
/// Sink write errors are counted and skipped; [`SinkError::Closed`] ends
/// the loop. Returns the sink so the caller can inspect or reuse it.
pub fn run_playback<S: AudioSink>(queue: ChunkReceiver, mut sink: S, stats: &PlaybackStats) -> S {
    let mut expected = 0u64;

    while let Some(chunk) = queue.pop() {
        if chunk.sequence() != expected {
            stats.gaps.fetch_add(1, Ordering::Relaxed);
        }
        expected = chunk.sequence() + 1;

        match sink.write_chunk(chunk.as_bytes()) {
            Ok(()) => {
                stats.chunks.fetch_add(1, Ordering::Relaxed);
                stats
                    .bytes
                    .fetch_add(chunk.len() as u64, Ordering::Relaxed);
            }
            Err(SinkError::Closed) => {
                info!("Audio sink closed, stopping playback");
                break;
            }
            Err(e) => {
                stats.sink_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Sink write failed for chunk {}: {}", chunk.sequence(), e);
            }
        }
    }

    if let Err(e) = sink.flush() {
        warn!("Sink flush failed: {}", e);
    }
    sink
}

/// [`run_playback`] on a dedicated thread
pub struct PlaybackWorker<S: AudioSink + 'static> {
    handle: JoinHandle<S>,
    stats: Arc<PlaybackStats>,
}

impl<S: AudioSink + 'static> PlaybackWorker<S> {
    pub fn spawn(queue: ChunkReceiver, sink: S, thread: &ThreadConfig) -> crate::Result<Self> {
        let stats = Arc::new(PlaybackStats::default());
        let worker_stats = stats.clone();

        let handle = thread
            .builder()
            .spawn(move || run_playback(queue, sink, &worker_stats))
            .map_err(Error::Io)?;
        debug!("Playback thread '{}' started", thread.name);

        Ok(Self { handle, stats })
    }

    pub fn stats(&self) -> PlaybackStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn stats_handle(&self) -> Arc<PlaybackStats> {
        self.stats.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the thread; it exits once its queue is shut down or drained
    pub fn join(self) -> crate::Result<S> {
        self.handle
            .join()
            .map_err(|_| Error::Pipeline(PipelineError::WorkerPanicked))
    }
}
