//! Error types for the VBAN streaming library

use thiserror::Error;

use crate::protocol::DataType;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Receiver error: {0}")]
    Receiver(#[from] ReceiverError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Packet encoding/decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Packet too short: {len} bytes")]
    TooShort { len: usize },

    #[error("Invalid magic: {0:#010x}")]
    BadMagic(u32),

    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Invalid samples per frame: {0} (expected 1-256)")]
    InvalidSampleCount(usize),

    #[error("Invalid channel count: {0} (expected 1-256)")]
    InvalidChannelCount(usize),

    #[error("Unsupported data type: {0:?}")]
    UnsupportedDataType(DataType),

    #[error("Unsupported sample rate: {0}")]
    UnsupportedSampleRate(String),

    #[error("Payload of {len} bytes is not a whole number of {frame_bytes}-byte frames")]
    PayloadNotFrameAligned { len: usize, frame_bytes: usize },
}

/// Ring buffer errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    #[error("Capacity must be non-zero")]
    ZeroCapacity,

    #[error("Buffer full: {requested} bytes requested, {free} free")]
    Full { requested: usize, free: usize },

    #[error("Consume of {requested} bytes exceeds {available} stored")]
    ConsumeTooMuch { requested: usize, available: usize },
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Socket option failed: {0}")]
    SocketOption(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Partial send: expected {expected} bytes, sent {sent}")]
    PartialSend { expected: usize, sent: usize },

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Stream name '{0}' exceeds 16 bytes")]
    InvalidStreamName(String),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Receiver lifecycle errors
#[derive(Error, Debug)]
pub enum ReceiverError {
    #[error("Receiver already started")]
    AlreadyStarted,

    #[error("Receiver not started")]
    NotStarted,

    #[error("Audio handler unavailable (lost after worker panic)")]
    HandlerUnavailable,

    #[error("Failed to spawn receiver thread: {0}")]
    SpawnFailed(String),

    #[error("Receiver thread panicked")]
    WorkerPanicked,

    #[error("Invalid receiver configuration: {0}")]
    InvalidConfig(String),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
}

/// Streaming pipeline errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Ring buffer overrun: {0}")]
    Overrun(BufferError),

    #[error("Handoff queue full")]
    QueueFull,

    #[error("Handoff queue closed")]
    QueueClosed,

    #[error("Stream format {actual} does not match expected {expected}")]
    FormatMismatch { expected: String, actual: String },

    #[error("Unsupported stream format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("Playback thread panicked")]
    WorkerPanicked,
}

/// Audio sink errors
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Sink IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sink closed")]
    Closed,
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
