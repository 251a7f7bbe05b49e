//! # ToyDHCP - A Minimal DHCPv4 Client
//!
//! ToyDHCP builds and parses raw DHCP datagrams and drives the four-message
//! lease acquisition (DISCOVER, OFFER, REQUEST, ACK/NAK) over UDP broadcast.
//!
//! ## Features
//!
//! - Byte-exact RFC 2131 packet codec with TLV option parsing
//! - Listener task plus controller loop on Tokio, with timed retries
//! - Pluggable [`Transport`] so the exchange can run over any datagram pipe
//! - Optional client identifier, retry cap and overall deadline
//!
//! ## Example
//!
//! ```rust,no_run
//! use toydhcp::{ClientConfig, DhcpClient, MacAddr, Outcome};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new(MacAddr::random());
//!     let client = DhcpClient::new(config).await?;
//!     match client.acquire_lease().await {
//!         Outcome::Leased(lease) => println!("{lease}"),
//!         other => println!("No lease: {other}"),
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod mac;
pub mod network;
pub mod v4;

pub use client::{DhcpClient, Lease, Outcome};
pub use config::{Args, ClientConfig};
pub use error::{ClientError, MalformedPacket};
pub use mac::MacAddr;
pub use network::{Transport, UdpTransport};
pub use v4::{DhcpMessage, MessageType};
