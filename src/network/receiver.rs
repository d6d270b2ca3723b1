//! VBAN receiver
//!
//! A dedicated thread blocks in `recv_from`, runs every datagram through a
//! [`Dispatcher`] and hands accepted PCM packets to an [`AudioHandler`].
//!
//! Lifecycle: `Idle -> Running -> Stopping -> Idle`. Stopping flips the
//! shared state, then sends a zero-length datagram to the socket's own
//! address so the blocked read returns at once. The socket read timeout
//! bounds the wait if that datagram is lost. Joining the thread is the
//! exit confirmation; the handler travels back with the join so the
//! receiver can be started again.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use super::udp::{self, UdpSocket};
use super::{AudioHandler, ReceiverState, StreamReceiver};
use crate::codec::{FrameContinuity, PacketDecoder};
use crate::config::{NetworkConfig, ReceiverConfig, SizeMismatchPolicy, ThreadConfig};
use crate::error::{CodecError, NetworkError, ReceiverError};
use crate::protocol::{StreamName, SubProtocol, MAX_PACKET_SIZE, STREAM_NAME_LEN};

/// Why a datagram never reached the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    TooShort,
    BadMagic,
    /// Well-formed but structurally invalid, e.g. an oversize payload
    Malformed,
    NameMismatch,
    NotAudio,
    UnsupportedCodec,
    SizeMismatch,
}

/// Outcome of dispatching one datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Dispatched,
    Dropped(DropReason),
}

/// Receive counters, updated from the receive thread
#[derive(Debug, Default)]
pub struct ReceiverStats {
    datagrams: AtomicU64,
    bytes: AtomicU64,
    dispatched: AtomicU64,
    too_short: AtomicU64,
    bad_magic: AtomicU64,
    malformed: AtomicU64,
    name_mismatch: AtomicU64,
    unsupported: AtomicU64,
    size_mismatch: AtomicU64,
    receive_errors: AtomicU64,
}

impl ReceiverStats {
    pub fn snapshot(&self) -> ReceiverStatsSnapshot {
        ReceiverStatsSnapshot {
            datagrams: self.datagrams.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            too_short: self.too_short.load(Ordering::Relaxed),
            bad_magic: self.bad_magic.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            name_mismatch: self.name_mismatch.load(Ordering::Relaxed),
            unsupported: self.unsupported.load(Ordering::Relaxed),
            size_mismatch: self.size_mismatch.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`ReceiverStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStatsSnapshot {
    pub datagrams: u64,
    pub bytes: u64,
    pub dispatched: u64,
    pub too_short: u64,
    pub bad_magic: u64,
    pub malformed: u64,
    pub name_mismatch: u64,
    pub unsupported: u64,
    /// Counted under both policies
    pub size_mismatch: u64,
    pub receive_errors: u64,
}

impl ReceiverStatsSnapshot {
    pub fn dropped(&self) -> u64 {
        self.datagrams.saturating_sub(self.dispatched)
    }
}

/// Per-datagram validation and routing, independent of any socket
pub struct Dispatcher<H> {
    filter: Option<StreamName>,
    size_policy: SizeMismatchPolicy,
    decoder: PacketDecoder,
    handler: H,
    stats: Arc<ReceiverStats>,
}

impl<H: AudioHandler> Dispatcher<H> {
    /// An empty `stream_name` accepts every stream
    pub fn new(config: &ReceiverConfig, handler: H) -> Result<Self, ReceiverError> {
        let filter = if config.stream_name.is_empty() {
            None
        } else {
            Some(StreamName::try_new(&config.stream_name).ok_or_else(|| {
                ReceiverError::InvalidConfig(format!(
                    "stream name '{}' exceeds {} bytes",
                    config.stream_name, STREAM_NAME_LEN
                ))
            })?)
        };

        Ok(Self {
            filter,
            size_policy: config.size_mismatch,
            decoder: PacketDecoder::new(),
            handler,
            stats: Arc::new(ReceiverStats::default()),
        })
    }

    /// Validate one datagram and invoke the handler if it is accepted
    ///
    /// Checks run in order: length, magic, stream name, sub-protocol,
    /// codec, payload size. The first failure decides the drop reason.
    pub fn dispatch(&mut self, datagram: &[u8], from: SocketAddr) -> Disposition {
        ReceiverStats::bump(&self.stats.datagrams);
        self.stats
            .bytes
            .fetch_add(datagram.len() as u64, Ordering::Relaxed);

        let packet = match self.decoder.decode(datagram) {
            Ok(packet) => packet,
            Err(CodecError::TooShort { len }) => {
                debug!("Dropping {}-byte datagram from {}: shorter than header", len, from);
                ReceiverStats::bump(&self.stats.too_short);
                return Disposition::Dropped(DropReason::TooShort);
            }
            Err(CodecError::BadMagic(magic)) => {
                trace!("Dropping datagram from {} with magic {:#010x}", from, magic);
                ReceiverStats::bump(&self.stats.bad_magic);
                return Disposition::Dropped(DropReason::BadMagic);
            }
            Err(e) => {
                debug!("Dropping malformed datagram from {}: {}", from, e);
                ReceiverStats::bump(&self.stats.malformed);
                return Disposition::Dropped(DropReason::Malformed);
            }
        };
        let header = &packet.header;

        if let Some(expected) = &self.filter {
            if header.stream_name != *expected {
                trace!("Ignoring stream '{}' from {}", header.stream_name, from);
                ReceiverStats::bump(&self.stats.name_mismatch);
                return Disposition::Dropped(DropReason::NameMismatch);
            }
        }

        if header.sub_protocol != SubProtocol::Audio {
            trace!("Ignoring {:?} packet from {}", header.sub_protocol, from);
            ReceiverStats::bump(&self.stats.unsupported);
            return Disposition::Dropped(DropReason::NotAudio);
        }
        if !header.is_pcm_audio() {
            debug!("Ignoring {:?} codec on stream '{}'", header.codec, header.stream_name);
            ReceiverStats::bump(&self.stats.unsupported);
            return Disposition::Dropped(DropReason::UnsupportedCodec);
        }

        match self.decoder.observe(header) {
            FrameContinuity::Gap(missed) => debug!(
                "Stream '{}': {} frame(s) missing before {}",
                header.stream_name, missed, header.frame_counter
            ),
            FrameContinuity::Duplicate | FrameContinuity::Late => trace!(
                "Stream '{}': out-of-order frame {}",
                header.stream_name,
                header.frame_counter
            ),
            FrameContinuity::First => info!(
                "Stream '{}' from {}: {}",
                header.stream_name,
                from,
                header.format()
            ),
            FrameContinuity::InOrder => {}
        }

        if !packet.payload_matches_format() {
            ReceiverStats::bump(&self.stats.size_mismatch);
            warn!(
                "Stream '{}' frame {}: payload is {} bytes, header implies {}",
                header.stream_name,
                header.frame_counter,
                packet.payload.len(),
                header.expected_payload_len()
            );
            if self.size_policy == SizeMismatchPolicy::Drop {
                return Disposition::Dropped(DropReason::SizeMismatch);
            }
        }

        self.handler.on_audio(&packet, from);
        ReceiverStats::bump(&self.stats.dispatched);
        Disposition::Dispatched
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    pub fn decoder(&self) -> &PacketDecoder {
        &self.decoder
    }

    pub fn stats(&self) -> Arc<ReceiverStats> {
        self.stats.clone()
    }
}

/// UDP receiver running a [`Dispatcher`] on its own thread
pub struct VbanReceiver<H: AudioHandler + 'static> {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    thread: ThreadConfig,
    state: Arc<Mutex<ReceiverState>>,
    /// Present while idle
    dispatcher: Option<Dispatcher<H>>,
    /// Present while running or until reaped
    worker: Option<JoinHandle<Dispatcher<H>>>,
    stats: Arc<ReceiverStats>,
}

impl<H: AudioHandler + 'static> VbanReceiver<H> {
    /// Bind the socket; the receiver starts idle
    pub fn new(
        network: &NetworkConfig,
        config: &ReceiverConfig,
        handler: H,
    ) -> Result<Self, ReceiverError> {
        let addr = network
            .listen_addr()
            .map_err(|e| NetworkError::InvalidAddress(e.to_string()))?;
        let dispatcher = Dispatcher::new(config, handler)?;

        let socket = udp::create_socket(addr, network.recv_buffer_size)?;
        udp::set_poll_interval(&socket, network.poll_interval_ms)?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

        info!(
            "VBAN receiver bound to {} (stream filter: '{}')",
            local_addr,
            if config.stream_name.is_empty() { "*" } else { &config.stream_name }
        );

        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
            thread: config.thread.clone(),
            state: Arc::new(Mutex::new(ReceiverState::Idle)),
            stats: dispatcher.stats(),
            dispatcher: Some(dispatcher),
            worker: None,
        })
    }

    /// Spawn the receive thread
    pub fn start(&mut self) -> Result<(), ReceiverError> {
        let mut state = self.state.lock();
        if *state != ReceiverState::Idle {
            return Err(ReceiverError::AlreadyStarted);
        }

        // A worker that exited on its own (handler panic) is still unjoined
        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(dispatcher) => self.dispatcher = Some(dispatcher),
                Err(_) => warn!("Previous receive thread panicked"),
            }
        }
        let dispatcher = self
            .dispatcher
            .take()
            .ok_or(ReceiverError::HandlerUnavailable)?;

        if self.thread.priority.is_some() || self.thread.core_id.is_some() {
            debug!(
                "Thread '{}': priority {:?} / core {:?} are advisory and not applied",
                self.thread.name, self.thread.priority, self.thread.core_id
            );
        }

        *state = ReceiverState::Running;
        let socket = self.socket.clone();
        let shared = self.state.clone();
        let spawned = self
            .thread
            .builder()
            .spawn(move || receive_loop(socket, shared, dispatcher));

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                info!("VBAN receiver started on {}", self.local_addr);
                Ok(())
            }
            Err(e) => {
                *state = ReceiverState::Idle;
                error!("Failed to spawn receive thread: {}", e);
                Err(ReceiverError::SpawnFailed(e.to_string()))
            }
        }
    }

    /// Ask the thread to exit without waiting for it
    pub fn request_stop(&self) -> Result<(), ReceiverError> {
        {
            let mut state = self.state.lock();
            if *state != ReceiverState::Running {
                return Err(ReceiverError::NotStarted);
            }
            *state = ReceiverState::Stopping;
        }

        if let Err(e) = udp::send_wake(self.local_addr) {
            warn!(
                "Wake datagram to {} failed ({}); waiting for receive timeout",
                self.local_addr, e
            );
        }
        Ok(())
    }

    /// Join the thread after [`request_stop`](Self::request_stop)
    pub fn wait_stopped(&mut self) -> Result<(), ReceiverError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let joined = worker.join();
        *self.state.lock() = ReceiverState::Idle;

        match joined {
            Ok(dispatcher) => {
                self.dispatcher = Some(dispatcher);
                info!("VBAN receiver on {} stopped", self.local_addr);
                Ok(())
            }
            Err(_) => {
                error!("Receive thread panicked");
                Err(ReceiverError::WorkerPanicked)
            }
        }
    }

    /// Stop and wait; returns only after the thread has exited
    pub fn stop(&mut self) -> Result<(), ReceiverError> {
        self.request_stop()?;
        self.wait_stopped()
    }

    pub fn state(&self) -> ReceiverState {
        *self.state.lock()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> ReceiverStatsSnapshot {
        self.stats.snapshot()
    }

    /// The handler, while the receiver is idle
    pub fn handler(&self) -> Option<&H> {
        self.dispatcher.as_ref().map(Dispatcher::handler)
    }

    /// Stop if needed and give back the handler
    pub fn into_handler(mut self) -> Result<H, ReceiverError> {
        if self.state() == ReceiverState::Running {
            self.request_stop()?;
        }
        self.wait_stopped()?;
        self.dispatcher
            .take()
            .map(Dispatcher::into_handler)
            .ok_or(ReceiverError::HandlerUnavailable)
    }
}

impl<H: AudioHandler + 'static> StreamReceiver for VbanReceiver<H> {
    fn start(&mut self) -> Result<(), ReceiverError> {
        VbanReceiver::start(self)
    }

    fn stop(&mut self) -> Result<(), ReceiverError> {
        VbanReceiver::stop(self)
    }

    fn state(&self) -> ReceiverState {
        VbanReceiver::state(self)
    }
}

impl<H: AudioHandler + 'static> Drop for VbanReceiver<H> {
    fn drop(&mut self) {
        if self.state() == ReceiverState::Running {
            let _ = self.request_stop();
        }
        let _ = self.wait_stopped();
    }
}

/// Resets the shared state when the receive thread exits, unwinding included
struct IdleOnExit(Arc<Mutex<ReceiverState>>);

impl Drop for IdleOnExit {
    fn drop(&mut self) {
        *self.0.lock() = ReceiverState::Idle;
    }
}

fn receive_loop<H: AudioHandler>(
    socket: Arc<UdpSocket>,
    state: Arc<Mutex<ReceiverState>>,
    mut dispatcher: Dispatcher<H>,
) -> Dispatcher<H> {
    let _idle = IdleOnExit(state.clone());
    let stats = dispatcher.stats();

    // One spare byte so an oversize datagram is seen as oversize, not truncated to fit
    let mut buf = vec![0u8; MAX_PACKET_SIZE + 1];

    debug!("Receive loop running");
    loop {
        let received = socket.recv_from(&mut buf);

        if *state.lock() != ReceiverState::Running {
            break;
        }

        match received {
            // Stop wakes the loop with an empty datagram; one left over from
            // an earlier run is not traffic
            Ok((0, _)) => continue,
            Ok((len, from)) => {
                dispatcher.dispatch(&buf[..len], from);
            }
            Err(e) if udp::is_timeout(&e) => continue,
            Err(e) => {
                ReceiverStats::bump(&stats.receive_errors);
                warn!("recv_from failed: {}", e);
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }
    debug!("Receive loop exiting");

    dispatcher
}
