//! Application configuration
//!
//! Loaded from TOML; every section falls back to defaults for missing keys.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{Error, Result};
use crate::protocol::{AudioFormat, DataType, STREAM_NAME_LEN};

/// What to do with a packet whose payload length disagrees with its header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeMismatchPolicy {
    /// Log a warning and pass the packet on
    #[default]
    Forward,
    /// Log a warning and drop the packet
    Drop,
}

/// What the producer does when the handoff queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueFullPolicy {
    /// Block until the consumer makes room
    #[default]
    Block,
    /// Fail immediately with a queue-full error
    Drop,
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub receiver: ReceiverConfig,
    pub sender: SenderConfig,
    pub pipeline: PipelineConfig,
}

/// Socket settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: String,
    /// 0 binds an ephemeral port
    pub listen_port: u16,
    /// SO_RCVBUF hint in bytes
    pub recv_buffer_size: Option<usize>,
    /// Receive timeout, so a lost wake-up cannot park the thread forever
    pub poll_interval_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            listen_port: DEFAULT_UDP_PORT,
            recv_buffer_size: Some(DEFAULT_RECV_BUFFER_SIZE),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl NetworkConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|e| Error::Config(format!("bind_address '{}': {}", self.bind_address, e)))?;
        Ok(SocketAddr::new(ip, self.listen_port))
    }
}

/// Scheduling hints for a worker thread
///
/// These only shape the execution environment; `priority` and `core_id`
/// are advisory and logged when the platform offers no portable way to
/// apply them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    pub name: String,
    pub stack_size: Option<usize>,
    pub priority: Option<i32>,
    pub core_id: Option<usize>,
}

impl ThreadConfig {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            stack_size: None,
            priority: None,
            core_id: None,
        }
    }

    /// A `std::thread::Builder` carrying the name and stack size
    pub fn builder(&self) -> std::thread::Builder {
        let builder = std::thread::Builder::new().name(self.name.clone());
        match self.stack_size {
            Some(size) => builder.stack_size(size),
            None => builder,
        }
    }
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self::named("vban-worker")
    }
}

/// Receiver behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Only accept this stream (empty accepts any)
    pub stream_name: String,
    pub size_mismatch: SizeMismatchPolicy,
    pub thread: ThreadConfig,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            stream_name: String::new(),
            size_mismatch: SizeMismatchPolicy::default(),
            thread: ThreadConfig::named("vban-rx"),
        }
    }
}

/// Stream format as written in config files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormatConfig {
    /// Hz
    pub sample_rate: u32,
    pub channels: u16,
    pub data_type: DataType,
}

impl AudioFormatConfig {
    pub fn to_format(self) -> AudioFormat {
        AudioFormat::from_hz(self.sample_rate, self.channels, self.data_type)
    }
}

impl Default for AudioFormatConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            data_type: DataType::I16,
        }
    }
}

/// Sender behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    pub stream_name: String,
    /// `ip:port`
    pub destination: String,
    pub samples_per_frame: usize,
    pub format: AudioFormatConfig,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            stream_name: "Stream1".to_string(),
            destination: format!("127.0.0.1:{}", DEFAULT_UDP_PORT),
            samples_per_frame: DEFAULT_SAMPLES_PER_FRAME,
            format: AudioFormatConfig::default(),
        }
    }
}

impl SenderConfig {
    pub fn destination_addr(&self) -> Result<SocketAddr> {
        self.destination
            .parse()
            .map_err(|e| Error::Config(format!("destination '{}': {}", self.destination, e)))
    }
}

/// Re-buffering and handoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Ring buffer capacity in bytes, at least one maximum payload
    pub ring_capacity: usize,
    /// Bytes per chunk handed to the sink
    pub chunk_size: usize,
    /// Chunks the handoff queue holds before backpressure
    pub queue_capacity: usize,
    pub queue_full: QueueFullPolicy,
    /// Format the sink was opened with; other streams are filtered out
    pub expected_format: Option<AudioFormatConfig>,
    pub playback_thread: ThreadConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ring_capacity: DEFAULT_RING_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            queue_full: QueueFullPolicy::default(),
            expected_format: None,
            playback_thread: ThreadConfig::named("vban-playback"),
        }
    }
}

impl AppConfig {
    /// Parse a TOML document
    ///
    /// Only the syntax and field types are checked here. Each side runs its
    /// own [`validate_receiver`](Self::validate_receiver) or
    /// [`validate_sender`](Self::validate_sender) before building sockets.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Per-user config file location
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "vban-stream").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load `path`, else the per-user file, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Check cross-field constraints for both directions
    pub fn validate(&self) -> Result<()> {
        self.validate_receiver()?;
        self.validate_sender()
    }

    /// Network, receiver and pipeline sections
    pub fn validate_receiver(&self) -> Result<()> {
        self.network.listen_addr()?;

        if self.receiver.stream_name.len() > STREAM_NAME_LEN {
            return Err(Error::Config(format!(
                "receiver.stream_name is {} bytes, limit is {}",
                self.receiver.stream_name.len(),
                STREAM_NAME_LEN
            )));
        }

        let p = &self.pipeline;
        if p.ring_capacity < crate::protocol::MAX_PAYLOAD_SIZE {
            return Err(Error::Config(format!(
                "pipeline.ring_capacity {} is smaller than one payload ({})",
                p.ring_capacity,
                crate::protocol::MAX_PAYLOAD_SIZE
            )));
        }
        if p.chunk_size == 0 || p.chunk_size > p.ring_capacity {
            return Err(Error::Config(format!(
                "pipeline.chunk_size {} must be in 1..={}",
                p.chunk_size, p.ring_capacity
            )));
        }
        if p.queue_capacity == 0 {
            return Err(Error::Config("pipeline.queue_capacity must be non-zero".into()));
        }
        if let Some(expected) = p.expected_format {
            if !expected.to_format().is_supported() {
                return Err(Error::Config(format!(
                    "pipeline.expected_format {} is not supported",
                    expected.to_format()
                )));
            }
        }

        Ok(())
    }

    /// Sender section
    pub fn validate_sender(&self) -> Result<()> {
        let s = &self.sender;
        s.destination_addr()?;
        if !s.format.to_format().is_supported() {
            return Err(Error::Config(format!(
                "sender.format {} is not supported",
                s.format.to_format()
            )));
        }
        let payload = s.format.to_format().payload_len(s.samples_per_frame);
        if !(1..=256).contains(&s.samples_per_frame)
            || payload > crate::protocol::MAX_PAYLOAD_SIZE
        {
            return Err(Error::Config(format!(
                "sender.samples_per_frame {} gives a {}-byte payload",
                s.samples_per_frame, payload
            )));
        }

        Ok(())
    }
}
