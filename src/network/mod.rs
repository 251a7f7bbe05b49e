//! Datagram transport used by the exchange.
//!
//! The exchange only needs to send one datagram and receive the next one;
//! [`UdpTransport`] is the socket-backed implementation used by the binary.

use crate::config::ClientConfig;
use bytes::Bytes;
use std::{
    future::Future,
    io,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket as StdUdpSocket},
};
use thiserror::Error;
use tokio::net::UdpSocket as TokioUdpSocket;

/// Largest datagram the client reads.
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Defines all possible errors for socket operations.
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("Failed to create a new socket")]
    CreateSocket(#[source] io::Error),

    #[error("Failed to enable broadcast on socket")]
    SetBroadcast(#[source] io::Error),

    #[error("Failed to set SO_BINDTODEVICE on interface '{interface}'")]
    BindToDevice {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to bind socket to address")]
    BindSocket(#[source] io::Error),

    #[error("Failed to set SO_REUSEADDR on socket")]
    SetReuseAddress(#[source] io::Error),

    #[error("Failed to set socket to non-blocking mode")]
    SetNonBlocking(#[source] io::Error),

    #[error("Failed to convert socket to TokioUdpSocket")]
    ConvertToTokio(#[source] io::Error),

    #[allow(dead_code)]
    #[error("Binding to a specific device is not implemented on this platform")]
    NotImplemented,
}

/// Send/receive primitive the exchange runs over.
///
/// The listener task calls `receive` while the controller calls `send`, so
/// implementations are shared behind an `Arc`.
pub trait Transport: Send + Sync + 'static {
    /// Transmits one DHCP datagram towards the server(s).
    fn send(&self, packet: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Waits for the next inbound datagram.
    fn receive(&self) -> impl Future<Output = io::Result<Bytes>> + Send;
}

/// UDP broadcast transport: bound to `0.0.0.0:68`, sending to
/// `255.255.255.255:67`.
#[derive(Debug)]
pub struct UdpTransport {
    socket: TokioUdpSocket,
    destination: SocketAddr,
}

impl UdpTransport {
    pub fn bind(config: &ClientConfig) -> Result<Self, SocketError> {
        let socket = new_tokio_socket(config.interface.as_deref(), config.client_port)?;
        let destination =
            SocketAddr::V4(SocketAddrV4::new(config.broadcast_address, config.server_port));
        tracing::debug!(
            "Bound UDP transport on port {} (interface: {}), sending to {}",
            config.client_port,
            config.interface.as_deref().unwrap_or("any"),
            destination
        );
        Ok(Self {
            socket,
            destination,
        })
    }
}

impl Transport for UdpTransport {
    async fn send(&self, packet: &[u8]) -> io::Result<()> {
        let sent = self.socket.send_to(packet, self.destination).await?;
        tracing::trace!("Sent {} bytes to {}", sent, self.destination);
        Ok(())
    }

    async fn receive(&self) -> io::Result<Bytes> {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        let (len, addr) = self.socket.recv_from(&mut buf).await?;
        tracing::trace!("Received {} bytes from {}", len, addr);
        Ok(Bytes::copy_from_slice(&buf[..len]))
    }
}

/// Creates a `tokio::net::UdpSocket` that can broadcast, optionally pinned to
/// one network device.
pub fn new_tokio_socket(
    interface: Option<&str>,
    port: u16,
) -> Result<TokioUdpSocket, SocketError> {
    use socket2::{Domain, Socket, Type};

    // Create a socket2 socket, which allows setting options before binding.
    let socket2 =
        Socket::new(Domain::IPV4, Type::DGRAM, None).map_err(SocketError::CreateSocket)?;

    socket2
        .set_broadcast(true)
        .map_err(SocketError::SetBroadcast)?;

    // Another DHCP client may already hold port 68.
    socket2
        .set_reuse_address(true)
        .map_err(SocketError::SetReuseAddress)?;

    if let Some(interface) = interface {
        bind_to_device(&socket2, interface)?;
    }

    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    socket2.bind(&addr.into()).map_err(SocketError::BindSocket)?;

    // Convert to a standard socket, then into a Tokio socket.
    let std_socket: StdUdpSocket = socket2.into();
    std_socket
        .set_nonblocking(true)
        .map_err(SocketError::SetNonBlocking)?;
    TokioUdpSocket::from_std(std_socket).map_err(SocketError::ConvertToTokio)
}

#[cfg(target_os = "linux")]
fn bind_to_device(socket: &socket2::Socket, interface: &str) -> Result<(), SocketError> {
    use std::os::fd::AsRawFd;

    // SAFETY: the fd is owned by `socket` for the duration of the call and the
    // option value points at `interface.len()` readable bytes.
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_BINDTODEVICE,
            interface.as_ptr() as *const libc::c_void,
            interface.len() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(SocketError::BindToDevice {
            interface: interface.to_string(),
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// Fallback for non-Linux systems where `SO_BINDTODEVICE` is not available.
#[cfg(not(target_os = "linux"))]
fn bind_to_device(_socket: &socket2::Socket, _interface: &str) -> Result<(), SocketError> {
    Err(SocketError::NotImplemented)
}
