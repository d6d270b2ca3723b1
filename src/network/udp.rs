//! UDP socket setup

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, warn};

use crate::error::NetworkError;

pub use std::net::UdpSocket;

/// Bind a UDP socket, applying the receive buffer hint when given
///
/// A failed buffer resize only logs; the kernel default still works.
pub fn create_socket(
    addr: SocketAddr,
    recv_buffer_size: Option<usize>,
) -> Result<UdpSocket, NetworkError> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NetworkError::BindFailed(format!("socket(): {}", e)))?;

    if let Some(size) = recv_buffer_size {
        match socket.set_recv_buffer_size(size) {
            Ok(()) => debug!(
                "SO_RCVBUF requested {} bytes, got {:?}",
                size,
                socket.recv_buffer_size().ok()
            ),
            Err(e) => warn!("Failed to set SO_RCVBUF to {}: {}", size, e),
        }
    }

    socket
        .bind(&addr.into())
        .map_err(|e| NetworkError::BindFailed(format!("{}: {}", addr, e)))?;

    Ok(socket.into())
}

/// Socket for sending to `destination`, bound to an ephemeral port of the same family
pub fn create_send_socket(destination: SocketAddr) -> Result<UdpSocket, NetworkError> {
    let local = match destination {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    create_socket(local, None)
}

/// Apply the receive timeout; zero means block indefinitely
pub fn set_poll_interval(socket: &UdpSocket, interval_ms: u64) -> Result<(), NetworkError> {
    let timeout = (interval_ms > 0).then(|| Duration::from_millis(interval_ms));
    socket
        .set_read_timeout(timeout)
        .map_err(|e| NetworkError::SocketOption(format!("SO_RCVTIMEO: {}", e)))
}

/// Address a local datagram must target to reach a socket bound to `local`
///
/// Wildcard binds are reachable through loopback.
pub fn wake_address(local: SocketAddr) -> SocketAddr {
    let ip = match local.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, local.port())
}

/// Send a zero-length datagram to unblock a thread parked in `recv_from`
pub fn send_wake(local: SocketAddr) -> io::Result<()> {
    let target = wake_address(local);
    let from = match target {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    let socket = UdpSocket::bind(from)?;
    socket.send_to(&[], target)?;
    Ok(())
}

/// Transient receive errors the loop should retry silently
pub(crate) fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn test_wake_address_maps_wildcard_to_loopback() {
        let v4: SocketAddr = "0.0.0.0:6980".parse().unwrap();
        assert_eq!(wake_address(v4), "127.0.0.1:6980".parse().unwrap());

        let v6: SocketAddr = "[::]:6980".parse().unwrap();
        assert_eq!(wake_address(v6), "[::1]:6980".parse().unwrap());

        let fixed: SocketAddr = "192.168.1.20:7000".parse().unwrap();
        assert_eq!(wake_address(fixed), fixed);
    }

    #[test]
    fn test_create_socket_ephemeral_port() {
        let socket = create_socket(loopback(), Some(64 * 1024)).unwrap();
        assert_ne!(socket.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn test_bind_conflict_reports_bind_failed() {
        let first = create_socket(loopback(), None).unwrap();
        let taken = first.local_addr().unwrap();
        assert!(matches!(
            create_socket(taken, None),
            Err(NetworkError::BindFailed(_))
        ));
    }

    #[test]
    fn test_wake_datagram_arrives_empty() {
        let socket = create_socket(loopback(), None).unwrap();
        set_poll_interval(&socket, 1000).unwrap();

        send_wake(socket.local_addr().unwrap()).unwrap();

        let mut buf = [0u8; 16];
        let (len, _) = socket.recv_from(&mut buf).unwrap();
        assert_eq!(len, 0);
    }

    #[test]
    fn test_poll_interval_times_out() {
        let socket = create_socket(loopback(), None).unwrap();
        set_poll_interval(&socket, 20).unwrap();

        let mut buf = [0u8; 16];
        let err = socket.recv_from(&mut buf).unwrap_err();
        assert!(is_timeout(&err));
    }
}
