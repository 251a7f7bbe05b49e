//! DHCPv4 protocol implementation
//!
//! This module contains the DHCPv4-specific implementation including:
//! - Packet encoding and decoding, with the options area
//! - Message construction for DISCOVER and REQUEST
//! - The lease-acquisition state machine

pub mod handler;
pub mod message;
pub mod options;
pub mod packet;


pub use handler::{DhcpV4Handler, ExchangeState, Offer, Phase};
pub use message::{build_dhcp_discover, build_dhcp_request, MessageBuilder};
pub use options::{ClientId, DhcpOption, DhcpOptions, InfoOptions};
pub use packet::{DhcpMessage, MessageType};
