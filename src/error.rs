use crate::{mac::MacAddr, network::SocketError};
use std::{io, net::Ipv4Addr, time::Duration};
use thiserror::Error;

/// Structural violations found while decoding a DHCP datagram.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedPacket {
    #[error("Packet too short: {len} bytes (minimum 240)")]
    TooShort { len: usize },

    #[error("Invalid magic cookie {0:02x?}")]
    BadMagicCookie([u8; 4]),

    #[error("Option {code} at offset {offset} runs past the end of the packet")]
    TruncatedOption { code: u8, offset: usize },

    #[error("Options area has no End (255) marker")]
    MissingEnd,
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Socket operation failed")]
    Socket(#[from] SocketError),

    #[error("Transport send/receive failed")]
    Transport(#[source] io::Error),

    #[error("Malformed DHCP packet")]
    Malformed(#[from] MalformedPacket),

    #[error("Packet is addressed to {0}, not to this client")]
    UnmatchedClient(MacAddr),

    #[error("Server {} refused the request (DHCPNAK)", display_server(.server))]
    Nak { server: Option<Ipv4Addr> },

    #[error("Failed to parse MAC address: {0}")]
    MacParse(String),

    #[error("No reply in {phase} phase after {attempts} attempts")]
    RetriesExhausted { phase: &'static str, attempts: u32 },

    #[error("Exchange did not complete within {0:?}")]
    DeadlineElapsed(Duration),

    #[error("Listener stopped before the exchange completed")]
    ListenerStopped,

    #[error("State machine reached a critical failure: {0}")]
    Critical(String),
}

fn display_server(server: &Option<Ipv4Addr>) -> String {
    server.map_or_else(|| "<unknown>".to_string(), |ip| ip.to_string())
}
