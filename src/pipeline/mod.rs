//! Receive-side streaming pipeline
//!
//! Payload bytes flow from the receive thread through [`StreamPipeline`]
//! (ring buffer, fixed-size chunks) into a bounded queue, and from there
//! into an [`AudioSink`](crate::audio::AudioSink) on the playback thread.

pub mod playback;
pub mod queue;
pub mod stream;

pub use playback::{run_playback, PlaybackStats, PlaybackStatsSnapshot, PlaybackWorker};
pub use queue::{handoff_queue, Chunk, ChunkReceiver, ChunkSender, QueueShutdown};
pub use stream::{PipelineStats, PipelineStatsSnapshot, StreamPipeline};
