//! Network subsystem for UDP audio transport

pub mod udp;
#[cfg(feature = "sender")]
pub mod sender;
#[cfg(feature = "receiver")]
pub mod receiver;

use std::net::SocketAddr;

use crate::codec::Packet;
use crate::error::{NetworkError, ReceiverError};

pub use udp::{create_socket, UdpSocket};
#[cfg(feature = "sender")]
pub use sender::VbanSender;
#[cfg(feature = "receiver")]
pub use receiver::{Dispatcher, VbanReceiver};

/// Consumer of validated PCM audio packets
///
/// Called on the receive thread, once per accepted datagram, in arrival
/// order. The payload borrows the receive buffer and is only valid for the
/// duration of the call. Any per-consumer context lives in the implementor
/// (or in a closure's captures).
pub trait AudioHandler: Send {
    fn on_audio(&mut self, packet: &Packet<'_>, from: SocketAddr);
}

impl<F> AudioHandler for F
where
    F: FnMut(&Packet<'_>, SocketAddr) + Send,
{
    fn on_audio(&mut self, packet: &Packet<'_>, from: SocketAddr) {
        self(packet, from)
    }
}

/// Receiver lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Idle,
    Running,
    Stopping,
}

/// Something that listens for a stream on its own thread
pub trait StreamReceiver {
    fn start(&mut self) -> Result<(), ReceiverError>;

    /// Stop and wait for the worker to exit
    fn stop(&mut self) -> Result<(), ReceiverError>;

    fn state(&self) -> ReceiverState;

    fn is_running(&self) -> bool {
        self.state() == ReceiverState::Running
    }
}

/// Something that emits audio packets
pub trait StreamSender {
    /// Send one packet of `num_samples` samples, returning bytes written
    fn send(&mut self, payload: &[u8], num_samples: usize) -> Result<usize, NetworkError>;
}
