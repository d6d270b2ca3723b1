//! Re-chunking of packet payloads
//!
//! Payload sizes follow the sender's packet size; the sink wants a fixed
//! chunk size. Payloads are appended to a ring buffer and every complete
//! chunk is copied out into an owned [`Chunk`] before its bytes are
//! consumed, so the ring can be overwritten while the chunk is in flight.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use super::queue::{Chunk, ChunkSender};
use crate::audio::RingBuffer;
use crate::codec::Packet;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::network::AudioHandler;
use crate::protocol::{AudioFormat, MAX_PAYLOAD_SIZE};

/// Producer-side counters
#[derive(Debug, Default)]
pub struct PipelineStats {
    payloads: AtomicU64,
    payload_bytes: AtomicU64,
    chunks: AtomicU64,
    overruns: AtomicU64,
    queue_full: AtomicU64,
    format_rejects: AtomicU64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            payloads: self.payloads.load(Ordering::Relaxed),
            payload_bytes: self.payload_bytes.load(Ordering::Relaxed),
            chunks: self.chunks.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            queue_full: self.queue_full.load(Ordering::Relaxed),
            format_rejects: self.format_rejects.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStatsSnapshot {
    pub payloads: u64,
    pub payload_bytes: u64,
    pub chunks: u64,
    /// Payloads dropped because the ring had no room
    pub overruns: u64,
    pub queue_full: u64,
    pub format_rejects: u64,
}

/// Ring buffer plus chunk slicer feeding a handoff queue
pub struct StreamPipeline {
    ring: RingBuffer,
    chunk_size: usize,
    queue: ChunkSender,
    expected_format: Option<AudioFormat>,
    next_sequence: u64,
    stats: Arc<PipelineStats>,
}

impl StreamPipeline {
    pub fn new(config: &PipelineConfig, queue: ChunkSender) -> Result<Self, PipelineError> {
        if config.chunk_size == 0 {
            return Err(PipelineError::InvalidConfig("chunk_size must be non-zero".into()));
        }
        if config.ring_capacity < MAX_PAYLOAD_SIZE.max(config.chunk_size) {
            return Err(PipelineError::InvalidConfig(format!(
                "ring_capacity {} cannot hold a {}-byte payload and a {}-byte chunk",
                config.ring_capacity, MAX_PAYLOAD_SIZE, config.chunk_size
            )));
        }

        if queue.capacity() == 0 {
            return Err(PipelineError::InvalidConfig(
                "handoff queue needs room for at least one chunk".into(),
            ));
        }

        let expected_format = config.expected_format.map(|f| f.to_format());
        if let Some(format) = expected_format {
            if !format.is_supported() {
                return Err(PipelineError::UnsupportedFormat(format.to_string()));
            }
        }

        let ring = RingBuffer::new(config.ring_capacity)
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            ring,
            chunk_size: config.chunk_size,
            queue,
            expected_format,
            next_sequence: 0,
            stats: Arc::new(PipelineStats::default()),
        })
    }

    /// Append raw PCM and emit every complete chunk
    ///
    /// Returns the number of chunks emitted. When the payload does not fit,
    /// buffered chunks are offered to the queue first to make room; a payload
    /// that still does not fit is dropped whole and reported as an overrun.
    pub fn push_payload(&mut self, payload: &[u8]) -> Result<usize, PipelineError> {
        self.stats.payloads.fetch_add(1, Ordering::Relaxed);
        self.stats
            .payload_bytes
            .fetch_add(payload.len() as u64, Ordering::Relaxed);

        let mut emitted = 0;
        if payload.len() > self.ring.free_space() {
            match self.drain_chunks() {
                Ok(n) => emitted = n,
                Err(PipelineError::QueueFull) => {}
                Err(e) => return Err(e),
            }
        }

        let written = self.ring.write(payload);
        let drained = self.drain_chunks();

        if let Err(e) = written {
            self.stats.overruns.fetch_add(1, Ordering::Relaxed);
            return Err(PipelineError::Overrun(e));
        }
        drained.map(|n| n + emitted)
    }

    /// Check a packet's format against the sink's, then push its payload
    pub fn handle_packet(&mut self, packet: &Packet<'_>) -> Result<usize, PipelineError> {
        let format = packet.header.format();

        if !format.is_supported() {
            self.stats.format_rejects.fetch_add(1, Ordering::Relaxed);
            return Err(PipelineError::UnsupportedFormat(format.to_string()));
        }
        if let Some(expected) = self.expected_format {
            if expected != format {
                self.stats.format_rejects.fetch_add(1, Ordering::Relaxed);
                return Err(PipelineError::FormatMismatch {
                    expected: expected.to_string(),
                    actual: format.to_string(),
                });
            }
        }

        self.push_payload(packet.payload)
    }

    /// Bytes waiting for a full chunk
    pub fn buffered(&self) -> usize {
        self.ring.len()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn ring_overflows(&self) -> u64 {
        self.ring.overflow_count()
    }

    pub fn stats(&self) -> PipelineStatsSnapshot {
        self.stats.snapshot()
    }

    /// Shared counters, readable after the pipeline moves to another thread
    pub fn stats_handle(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    fn drain_chunks(&mut self) -> Result<usize, PipelineError> {
        let mut emitted = 0;

        while self.ring.len() >= self.chunk_size {
            let data = Bytes::copy_from_slice(&self.ring.readable()[..self.chunk_size]);
            let chunk = Chunk::new(data, self.next_sequence);

            if let Err(e) = self.queue.push(chunk) {
                if e == PipelineError::QueueFull {
                    self.stats.queue_full.fetch_add(1, Ordering::Relaxed);
                }
                return Err(e);
            }

            self.ring
                .consume(self.chunk_size)
                .map_err(PipelineError::Overrun)?;
            self.next_sequence += 1;
            self.stats.chunks.fetch_add(1, Ordering::Relaxed);
            emitted += 1;
        }

        Ok(emitted)
    }
}

impl AudioHandler for StreamPipeline {
    fn on_audio(&mut self, packet: &Packet<'_>, from: SocketAddr) {
        match self.handle_packet(packet) {
            Ok(_) => {}
            Err(PipelineError::Overrun(e)) => warn!(
                "Ring buffer overrun, dropped frame {} from {}: {}",
                packet.header.frame_counter, from, e
            ),
            Err(PipelineError::QueueFull) => {
                warn!("Handoff queue full, {} bytes held back", self.buffered())
            }
            Err(PipelineError::QueueClosed) => debug!("Handoff queue closed"),
            Err(e) => debug!("Skipping packet from {}: {}", from, e),
        }
    }
}
