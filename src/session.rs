//! A complete receive session: socket, pipeline, queue and playback thread
//!
//! Teardown order matters. The receive thread may be blocked pushing into a
//! full queue, and the playback thread may be blocked popping from an empty
//! one, so the queue is cancelled before either thread is joined.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use crate::audio::AudioSink;
use crate::config::AppConfig;
use crate::error::{ReceiverError, Result};
use crate::network::receiver::{ReceiverStatsSnapshot, VbanReceiver};
use crate::network::ReceiverState;
use crate::pipeline::{
    handoff_queue, PipelineStats, PipelineStatsSnapshot, PlaybackStatsSnapshot, PlaybackWorker,
    QueueShutdown, StreamPipeline,
};

/// Final state handed back when a session ends
pub struct SessionReport<S> {
    pub sink: S,
    pub receiver: ReceiverStatsSnapshot,
    pub pipeline: PipelineStatsSnapshot,
    pub playback: PlaybackStatsSnapshot,
}

pub struct StreamSession<S: AudioSink + 'static> {
    receiver: Option<VbanReceiver<StreamPipeline>>,
    playback: Option<PlaybackWorker<S>>,
    queue: QueueShutdown,
    pipeline_stats: Arc<PipelineStats>,
}

impl<S: AudioSink + 'static> StreamSession<S> {
    /// Bind the socket and start the playback thread; audio flows after [`start`](Self::start)
    pub fn new(config: &AppConfig, sink: S) -> Result<Self> {
        config.validate_receiver()?;

        let p = &config.pipeline;
        let (tx, rx, queue) = handoff_queue(p.queue_capacity, p.queue_full);
        let pipeline = StreamPipeline::new(p, tx)?;
        let pipeline_stats = pipeline.stats_handle();

        let receiver = VbanReceiver::new(&config.network, &config.receiver, pipeline)?;
        let playback = PlaybackWorker::spawn(rx, sink, &p.playback_thread)?;

        Ok(Self {
            receiver: Some(receiver),
            playback: Some(playback),
            queue,
            pipeline_stats,
        })
    }

    pub fn start(&mut self) -> Result<()> {
        let receiver = self.receiver.as_mut().ok_or(ReceiverError::NotStarted)?;
        receiver.start()?;
        Ok(())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.receiver.as_ref().map(VbanReceiver::local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.receiver
            .as_ref()
            .is_some_and(|r| r.state() == ReceiverState::Running)
    }

    pub fn receiver_stats(&self) -> ReceiverStatsSnapshot {
        self.receiver
            .as_ref()
            .map(VbanReceiver::stats)
            .unwrap_or_default()
    }

    pub fn pipeline_stats(&self) -> PipelineStatsSnapshot {
        self.pipeline_stats.snapshot()
    }

    pub fn playback_stats(&self) -> PlaybackStatsSnapshot {
        self.playback
            .as_ref()
            .map(PlaybackWorker::stats)
            .unwrap_or_default()
    }

    /// Stop immediately, discarding anything still queued
    ///
    /// Order: request receiver stop, cancel the queue, join the receiver,
    /// join playback.
    pub fn shutdown(mut self) -> Result<SessionReport<S>> {
        if let Some(receiver) = self.receiver.as_ref() {
            if receiver.state() == ReceiverState::Running {
                receiver.request_stop()?;
            }
        }
        self.queue.shutdown();
        self.finish_threads()
    }

    /// Stop receiving, then let playback drain what is already queued
    ///
    /// Partial chunks still in the ring are discarded.
    pub fn finish(mut self) -> Result<SessionReport<S>> {
        self.finish_threads()
    }

    fn finish_threads(&mut self) -> Result<SessionReport<S>> {
        let mut receiver_stats = ReceiverStatsSnapshot::default();

        if let Some(mut receiver) = self.receiver.take() {
            if receiver.state() == ReceiverState::Running {
                receiver.request_stop()?;
            }
            receiver.wait_stopped()?;
            receiver_stats = receiver.stats();

            // Dropping the pipeline closes the producer side of the queue
            drop(receiver.into_handler()?);
        }

        let playback = self.playback.take().ok_or(ReceiverError::NotStarted)?;
        let playback_stats = playback.stats_handle();
        let sink = playback.join()?;

        let report = SessionReport {
            sink,
            receiver: receiver_stats,
            pipeline: self.pipeline_stats.snapshot(),
            playback: playback_stats.snapshot(),
        };
        info!(
            "Session ended: {} datagrams, {} chunks played, {} overruns",
            report.receiver.datagrams, report.playback.chunks, report.pipeline.overruns
        );
        Ok(report)
    }
}

impl<S: AudioSink + 'static> Drop for StreamSession<S> {
    fn drop(&mut self) {
        if let Some(receiver) = self.receiver.as_ref() {
            if receiver.state() == ReceiverState::Running {
                let _ = receiver.request_stop();
            }
        }
        self.queue.shutdown();
        self.receiver.take();
        if let Some(playback) = self.playback.take() {
            let _ = playback.join();
        }
    }
}

#[cfg(all(test, feature = "sender"))]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::audio::{NullSink, WriterSink};
    use crate::config::{AudioFormatConfig, QueueFullPolicy};
    use crate::network::VbanSender;
    use crate::protocol::{AudioFormat, DataType};

    fn loopback_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.network.bind_address = "127.0.0.1".into();
        config.network.listen_port = 0;
        config.network.recv_buffer_size = None;
        config.receiver.stream_name = "Session".into();
        config.pipeline.expected_format = Some(AudioFormatConfig {
            sample_rate: 48000,
            channels: 1,
            data_type: DataType::I16,
        });
        config
    }

    fn wait_for(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !done() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_end_to_end_over_loopback() {
        let mut session = StreamSession::new(&loopback_config(), WriterSink::new(Vec::new())).unwrap();
        session.start().unwrap();
        assert!(session.is_running());

        let target = session.local_addr().unwrap();
        let format = AudioFormat::from_hz(48000, 1, DataType::I16);
        let mut sender = VbanSender::with_format(target, format, "Session").unwrap();
        let mut other = VbanSender::with_format(target, format, "Other").unwrap();

        let mut sent = Vec::new();
        for frame in 0..8u8 {
            let payload = vec![frame; 128];
            sender.send(&payload, 64).unwrap();
            other.send(&[0xFF; 128], 64).unwrap();
            sent.extend_from_slice(&payload);
        }

        wait_for(|| session.receiver_stats().datagrams >= 16);
        let report = session.finish().unwrap();

        assert_eq!(report.receiver.name_mismatch, 8);
        assert_eq!(report.pipeline.chunks, 32);
        assert_eq!(report.playback.chunks, 32);
        assert_eq!(report.sink.into_inner(), sent);
    }

    #[test]
    fn test_shutdown_with_blocked_producer() {
        let mut config = loopback_config();
        config.pipeline.queue_capacity = 1;
        config.pipeline.queue_full = QueueFullPolicy::Block;

        struct GatedSink(crossbeam_channel::Receiver<()>);
        impl AudioSink for GatedSink {
            fn write_chunk(&mut self, _chunk: &[u8]) -> std::result::Result<(), crate::error::SinkError> {
                let _ = self.0.recv();
                Ok(())
            }
        }
        let (release, gate) = crossbeam_channel::bounded::<()>(0);

        let mut session = StreamSession::new(&config, GatedSink(gate)).unwrap();
        session.start().unwrap();

        // 128 bytes make four chunks: one held by the sink, one queued,
        // and the receive thread blocked pushing the third
        let format = AudioFormat::from_hz(48000, 1, DataType::I16);
        let mut sender =
            VbanSender::with_format(session.local_addr().unwrap(), format, "Session").unwrap();
        sender.send(&[0u8; 128], 64).unwrap();
        wait_for(|| session.pipeline_stats().chunks >= 2);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(session.pipeline_stats().chunks, 2);
        assert_eq!(session.receiver_stats().dispatched, 0);

        let opener = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            drop(release);
        });

        let started = Instant::now();
        let report = session.shutdown().unwrap();
        let elapsed = started.elapsed();
        opener.join().unwrap();

        // Playback cannot finish until the sink is released
        assert!(elapsed >= Duration::from_millis(150), "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5), "{:?}", elapsed);
        assert_eq!(report.receiver.dispatched, 1);
        assert_eq!(report.pipeline.chunks, 2);
        assert!((1..=2).contains(&report.playback.chunks));
    }

    #[test]
    fn test_receive_only_session_ignores_sender_section() {
        let mut config = loopback_config();
        config.sender.destination = "not an address".into();
        let session = StreamSession::new(&config, NullSink::new()).unwrap();
        session.shutdown().unwrap();
    }

    #[test]
    fn test_session_without_start() {
        let session = StreamSession::new(&loopback_config(), NullSink::new()).unwrap();
        assert!(!session.is_running());
        let report = session.shutdown().unwrap();
        assert_eq!(report.sink.bytes_written(), 0);
        assert_eq!(report.receiver.datagrams, 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = loopback_config();
        config.pipeline.chunk_size = 0;
        assert!(StreamSession::new(&config, NullSink::new()).is_err());
    }
}
