//! VBAN sender
//!
//! Stamps audio with a header via [`PacketEncoder`] and emits one datagram
//! per call. There is no retry; a failed or short send is reported and the
//! next call carries on with the next frame counter.

use std::net::SocketAddr;

use tracing::{debug, info, warn};

use super::udp::{self, UdpSocket};
use super::StreamSender;
use crate::codec::PacketEncoder;
use crate::config::SenderConfig;
use crate::error::NetworkError;
use crate::protocol::{AudioFormat, StreamName};

/// Sender statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub send_failures: u64,
}

/// One outgoing VBAN stream
pub struct VbanSender {
    socket: UdpSocket,
    destination: SocketAddr,
    encoder: PacketEncoder,
    stats: SenderStats,
}

impl VbanSender {
    /// Build a sender from config
    pub fn new(config: &SenderConfig) -> Result<Self, NetworkError> {
        let destination = config
            .destination_addr()
            .map_err(|e| NetworkError::InvalidAddress(e.to_string()))?;
        Self::with_format(destination, config.format.to_format(), &config.stream_name)
    }

    pub fn with_format(
        destination: SocketAddr,
        format: AudioFormat,
        stream_name: &str,
    ) -> Result<Self, NetworkError> {
        if StreamName::try_new(stream_name).is_none() {
            return Err(NetworkError::InvalidStreamName(stream_name.to_string()));
        }
        let encoder = PacketEncoder::new(format, stream_name)?;
        let socket = udp::create_send_socket(destination)?;

        info!(
            "VBAN sender for stream '{}' ({}) -> {}",
            stream_name, format, destination
        );

        Ok(Self {
            socket,
            destination,
            encoder,
            stats: SenderStats::default(),
        })
    }

    /// Encode and send one packet, returning the datagram size
    pub fn send(&mut self, payload: &[u8], num_samples: usize) -> Result<usize, NetworkError> {
        let packet = self.encoder.encode(payload, num_samples)?;

        match self.socket.send_to(&packet, self.destination) {
            Ok(sent) if sent == packet.len() => {
                self.stats.packets_sent += 1;
                self.stats.bytes_sent += sent as u64;
                Ok(sent)
            }
            Ok(sent) => {
                self.stats.send_failures += 1;
                warn!("Short send to {}: {} of {} bytes", self.destination, sent, packet.len());
                Err(NetworkError::PartialSend {
                    expected: packet.len(),
                    sent,
                })
            }
            Err(e) => {
                self.stats.send_failures += 1;
                debug!("Send to {} failed: {}", self.destination, e);
                Err(NetworkError::SendFailed(e.to_string()))
            }
        }
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }

    pub fn format(&self) -> &AudioFormat {
        self.encoder.format()
    }

    /// Counter the next packet will carry
    pub fn frame_counter(&self) -> u32 {
        self.encoder.frame_counter()
    }

    pub fn max_samples_per_packet(&self) -> usize {
        self.encoder.max_samples_per_packet()
    }

    pub fn stats(&self) -> SenderStats {
        self.stats
    }
}

impl StreamSender for VbanSender {
    fn send(&mut self, payload: &[u8], num_samples: usize) -> Result<usize, NetworkError> {
        VbanSender::send(self, payload, num_samples)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::codec::decode;
    use crate::error::CodecError;
    use crate::protocol::DataType;

    fn listener() -> std::net::UdpSocket {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        socket
    }

    #[test]
    fn test_send_over_loopback() {
        let rx = listener();
        let format = AudioFormat::from_hz(48000, 2, DataType::I16);
        let mut sender =
            VbanSender::with_format(rx.local_addr().unwrap(), format, "Stream1").unwrap();

        for _ in 0..3 {
            assert_eq!(sender.send(&[0u8; 256], 64).unwrap(), 28 + 256);
        }

        let mut buf = [0u8; 2048];
        for expected in 0..3u32 {
            let (len, _) = rx.recv_from(&mut buf).unwrap();
            let packet = decode(&buf[..len]).unwrap();
            assert_eq!(packet.header.frame_counter, expected);
            assert_eq!(packet.header.stream_name.as_bytes(), b"Stream1");
            assert!(packet.payload_matches_format());
        }
        assert_eq!(sender.stats().packets_sent, 3);
        assert_eq!(sender.frame_counter(), 3);
    }

    #[test]
    fn test_rejects_bad_payload_without_sending() {
        let rx = listener();
        let format = AudioFormat::from_hz(48000, 2, DataType::I16);
        let mut sender =
            VbanSender::with_format(rx.local_addr().unwrap(), format, "S").unwrap();

        assert!(matches!(
            sender.send(&[0u8; 10], 64),
            Err(NetworkError::Codec(CodecError::PayloadNotFrameAligned { .. }))
        ));
        assert!(matches!(
            sender.send(&vec![0u8; 2000], 500),
            Err(NetworkError::Codec(CodecError::PayloadTooLarge(_)))
        ));
        assert_eq!(sender.frame_counter(), 0);
        assert_eq!(sender.stats(), SenderStats::default());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SenderConfig::default();
        config.stream_name = "a much too long stream name".into();
        assert!(matches!(
            VbanSender::new(&config),
            Err(NetworkError::InvalidStreamName(_))
        ));

        let mut config = SenderConfig::default();
        config.destination = "nowhere".into();
        assert!(matches!(
            VbanSender::new(&config),
            Err(NetworkError::InvalidAddress(_))
        ));

        let mut config = SenderConfig::default();
        config.format.data_type = DataType::I12;
        assert!(matches!(
            VbanSender::new(&config),
            Err(NetworkError::Codec(CodecError::UnsupportedDataType(_)))
        ));
    }
}
