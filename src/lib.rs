//! # VBAN Stream
//!
//! Real-time VBAN audio transport: a receiver that validates incoming UDP
//! datagrams and re-buffers their PCM payloads into fixed-size chunks for a
//! downstream sink, plus the symmetric sender.
//!
//! ## Architecture Overview
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────────────────────┐
//!  │                       RECEIVE THREAD (network::receiver)             │
//!  │                                                                      │
//!  │   UDP socket ──► codec::decode ──► Dispatcher                        │
//!  │   (blocking        (magic, length,    (stream-name filter,           │
//!  │    recv_from)       bit fields)        audio/PCM only, size policy)  │
//!  │                                            │                         │
//!  │                                            ▼                         │
//!  │                         pipeline::StreamPipeline                     │
//!  │                ┌───────────────────────────────────────────┐         │
//!  │                │ audio::RingBuffer (mirrored, 2×capacity)  │         │
//!  │                │   write payload ─► slice fixed chunks     │         │
//!  │                └──────────────────────┬────────────────────┘         │
//!  └───────────────────────────────────────┼──────────────────────────────┘
//!                                          │ owned Chunk (copied bytes)
//!                                          ▼
//!                        pipeline::queue (bounded, backpressure)
//!                                          │
//!  ┌───────────────────────────────────────┼──────────────────────────────┐
//!  │                 PLAYBACK THREAD (pipeline::playback)                 │
//!  │                                       ▼                              │
//!  │                    audio::AudioSink::write_chunk (blocking)          │
//!  └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`session::StreamSession`] owns all of the above and tears it down in a
//! fixed order. [`network::sender::VbanSender`] reuses the codec to emit
//! packets.

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod network;
pub mod pipeline;
pub mod protocol;
#[cfg(feature = "receiver")]
pub mod session;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default sample rate for generated and expected audio
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// Well-known VBAN UDP port
    pub const DEFAULT_UDP_PORT: u16 = 6980;

    /// Default socket receive buffer
    pub const DEFAULT_RECV_BUFFER_SIZE: usize = 256 * 1024;

    /// Receive timeout backstop for stop requests
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

    /// Samples per packet the sender emits by default
    pub const DEFAULT_SAMPLES_PER_FRAME: usize = 256;

    /// Ring buffer capacity in bytes (holds several maximum payloads)
    pub const DEFAULT_RING_CAPACITY: usize = 4096;

    /// Bytes per chunk handed to the sink
    pub const DEFAULT_CHUNK_SIZE: usize = 32;

    /// Chunks buffered between producer and consumer
    pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
}
