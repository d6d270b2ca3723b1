//! Audio subsystem module

pub mod buffer;
pub mod sink;

pub use buffer::RingBuffer;
pub use sink::{AudioSink, NullSink, WriterSink};
