//! VBAN Sender Application
//!
//! Streams a test tone to a VBAN receiver at real-time pace.
//!
//! Usage: `sender [config.toml] [ip:port]`

use anyhow::{bail, Context, Result};
use std::f64::consts::TAU;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vban_stream::{
    config::AppConfig,
    network::sender::VbanSender,
    protocol::{AudioFormat, DataType},
};

const TONE_FREQUENCY_HZ: f64 = 440.0;

/// Sine generator writing interleaved samples in the stream's data type
struct ToneGenerator {
    phase: f64,
    step: f64,
    amplitude: f64,
}

impl ToneGenerator {
    fn new(frequency: f64, sample_rate: u32) -> Self {
        Self {
            phase: 0.0,
            step: TAU * frequency / sample_rate as f64,
            amplitude: 0.5,
        }
    }

    fn fill(&mut self, format: &AudioFormat, samples: usize, out: &mut Vec<u8>) {
        out.clear();
        for _ in 0..samples {
            let value = self.phase.sin() * self.amplitude;
            self.phase = (self.phase + self.step) % TAU;
            for _ in 0..format.channels {
                push_sample(value, format.data_type, out);
            }
        }
    }
}

fn push_sample(value: f64, data_type: DataType, out: &mut Vec<u8>) {
    match data_type {
        DataType::U8 => out.push(((value + 1.0) * 127.5) as u8),
        DataType::I16 => out.extend_from_slice(&((value * i16::MAX as f64) as i16).to_le_bytes()),
        DataType::I24 => {
            let v = (value * 8_388_607.0) as i32;
            out.extend_from_slice(&v.to_le_bytes()[..3]);
        }
        DataType::I32 => out.extend_from_slice(&((value * i32::MAX as f64) as i32).to_le_bytes()),
        DataType::F32 => out.extend_from_slice(&(value as f32).to_le_bytes()),
        DataType::F64 => out.extend_from_slice(&value.to_le_bytes()),
        DataType::I12 | DataType::I10 => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting VBAN Sender");

    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from);
    let mut config = AppConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;
    if let Some(destination) = args.next() {
        config.sender.destination = destination;
    }
    config
        .validate_sender()
        .context("Invalid sender configuration")?;
    let format = config.sender.format.to_format();
    if !format.is_supported() {
        bail!("Cannot generate audio in {}", format);
    }

    let mut sender = VbanSender::new(&config.sender)?;
    let samples = config
        .sender
        .samples_per_frame
        .min(sender.max_samples_per_packet());

    tracing::info!(
        "Sending {:.0} Hz tone to {} as '{}' ({} samples/packet)",
        TONE_FREQUENCY_HZ,
        sender.destination(),
        config.sender.stream_name,
        samples
    );

    let mut tone = ToneGenerator::new(TONE_FREQUENCY_HZ, format.sample_rate_hz());
    let mut payload = Vec::with_capacity(format.payload_len(samples));

    let period = Duration::from_secs_f64(samples as f64 / format.sample_rate_hz() as f64);
    let mut ticker = tokio::time::interval(period);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut last_stats_time = Instant::now();

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl+C")?;
                break;
            }
            _ = ticker.tick() => {
                tone.fill(&format, samples, &mut payload);
                if let Err(e) = sender.send(&payload, samples) {
                    tracing::warn!("Send failed: {}", e);
                }

                if last_stats_time.elapsed() >= Duration::from_secs(5) {
                    last_stats_time = Instant::now();
                    let stats = sender.stats();
                    tracing::info!(
                        "Sender stats: {} packets, {} bytes, {} failures",
                        stats.packets_sent,
                        stats.bytes_sent,
                        stats.send_failures
                    );
                }
            }
        }
    }

    tracing::info!("Sender stopped after {} packets", sender.stats().packets_sent);
    Ok(())
}
