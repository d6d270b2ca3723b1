//! Audio sinks
//!
//! A sink accepts fixed-size PCM chunks in a format negotiated up front and
//! blocks until each chunk is consumed. Device rendering sits behind this
//! trait; the library only ships sinks that discard or write raw PCM.

use std::io::Write;

use crate::error::SinkError;

/// Destination for re-chunked PCM
pub trait AudioSink: Send {
    /// Write one chunk, blocking until it has been accepted
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), SinkError>;

    /// Flush anything the sink buffers internally
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: AudioSink + ?Sized> AudioSink for Box<S> {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), SinkError> {
        (**self).write_chunk(chunk)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }
}

/// Sink that discards audio and counts bytes
#[derive(Debug, Default)]
pub struct NullSink {
    bytes_written: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl AudioSink for NullSink {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), SinkError> {
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }
}

/// Sink writing raw interleaved PCM to any [`Write`] implementation
pub struct WriterSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> AudioSink for WriterSink<W> {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), SinkError> {
        self.writer.write_all(chunk)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sink_counts() {
        let mut sink = NullSink::new();
        sink.write_chunk(&[0; 32]).unwrap();
        sink.write_chunk(&[0; 32]).unwrap();
        assert_eq!(sink.bytes_written(), 64);
    }

    #[test]
    fn test_writer_sink_preserves_order() {
        let mut sink = WriterSink::new(Vec::new());
        sink.write_chunk(&[1, 2]).unwrap();
        sink.write_chunk(&[3]).unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.into_inner(), vec![1, 2, 3]);
    }

    #[test]
    fn test_boxed_sink() {
        let mut sink: Box<dyn AudioSink> = Box::new(NullSink::new());
        assert!(sink.write_chunk(&[0; 4]).is_ok());
    }
}
