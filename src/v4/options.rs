//! DHCP options (RFC 2132) as carried after the magic cookie.
//!
//! Options are stored in wire order as raw bytes. Only a handful of
//! informational codes are interpreted, see [`InfoOptions`].

use crate::{error::MalformedPacket, mac::MacAddr};
use bytes::{BufMut as _, Bytes, BytesMut};
use std::net::Ipv4Addr;

/// Option codes this client emits or interprets.
pub mod code {
    pub const PAD: u8 = 0;
    pub const SUBNET_MASK: u8 = 1;
    pub const ROUTER: u8 = 3;
    pub const DNS_SERVER: u8 = 6;
    pub const DOMAIN_NAME: u8 = 15;
    pub const BROADCAST_ADDR: u8 = 28;
    pub const REQUESTED_IP: u8 = 50;
    pub const LEASE_TIME: u8 = 51;
    pub const MESSAGE_TYPE: u8 = 53;
    pub const SERVER_ID: u8 = 54;
    pub const RENEWAL_TIME: u8 = 58;
    pub const REBINDING_TIME: u8 = 59;
    pub const CLIENT_ID: u8 = 61;
    pub const END: u8 = 255;
}

const MAX_OPTION_LEN: usize = u8::MAX as usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpOption {
    pub code: u8,
    pub data: Bytes,
}

/// Ordered option set with at most one entry per code.
///
/// `get` returns `None` when the code is absent and `Some(&[])` when it is
/// present with zero length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DhcpOptions {
    entries: Vec<DhcpOption>,
}

impl DhcpOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an option, replacing the data of an existing entry with the same
    /// code while keeping its position.
    pub fn insert(&mut self, code: u8, data: impl Into<Bytes>) {
        let mut data = data.into();
        if data.len() > MAX_OPTION_LEN {
            tracing::warn!(
                "Option {} is {} bytes, truncating to {}",
                code,
                data.len(),
                MAX_OPTION_LEN
            );
            data.truncate(MAX_OPTION_LEN);
        }
        match self.entries.iter_mut().find(|opt| opt.code == code) {
            Some(existing) => existing.data = data,
            None => self.entries.push(DhcpOption { code, data }),
        }
    }

    pub fn get(&self, code: u8) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|opt| opt.code == code)
            .map(|opt| opt.data.as_ref())
    }

    pub fn contains(&self, code: u8) -> bool {
        self.get(code).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DhcpOption> {
        self.entries.iter()
    }

    pub fn codes(&self) -> impl Iterator<Item = u8> + '_ {
        self.entries.iter().map(|opt| opt.code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes every option as code/length/data followed by the End marker.
    pub(crate) fn encode_into(&self, buf: &mut BytesMut) {
        for opt in &self.entries {
            buf.put_u8(opt.code);
            buf.put_u8(opt.data.len() as u8);
            buf.put_slice(&opt.data);
        }
        buf.put_u8(code::END);
    }

    /// Walks the options area that starts at `offset` in `packet`.
    pub(crate) fn parse(packet: &[u8], offset: usize) -> Result<Self, MalformedPacket> {
        let mut options = Self::new();
        let mut cursor = offset;
        loop {
            let Some(&option_code) = packet.get(cursor) else {
                return Err(MalformedPacket::MissingEnd);
            };
            match option_code {
                code::END => return Ok(options),
                code::PAD => cursor += 1,
                _ => {
                    let Some(&len) = packet.get(cursor + 1) else {
                        return Err(MalformedPacket::TruncatedOption {
                            code: option_code,
                            offset: cursor,
                        });
                    };
                    let start = cursor + 2;
                    let end = start + len as usize;
                    let Some(data) = packet.get(start..end) else {
                        return Err(MalformedPacket::TruncatedOption {
                            code: option_code,
                            offset: cursor,
                        });
                    };
                    if options.contains(option_code) {
                        tracing::debug!(
                            "Duplicate option {}, keeping the last one",
                            option_code
                        );
                    }
                    options.insert(option_code, Bytes::copy_from_slice(data));
                    cursor = end;
                }
            }
        }
    }
}

/// Client identifier (option 61) in the form `<prefix>-<MAC uppercase hex>`.
///
/// Servers correlate on this value, so one instance is used for both the
/// DISCOVER and the REQUEST of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(prefix: &str, mac: &MacAddr) -> Self {
        Self(format!("{prefix}-{}", mac.to_hex_upper()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// Informational options decoded into typed values.
///
/// A field is `None` when the option is absent or its length does not fit
/// the expected type; the raw bytes stay available in [`DhcpOptions`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoOptions {
    pub subnet_mask: Option<Ipv4Addr>,
    pub routers: Option<Vec<Ipv4Addr>>,
    pub dns_servers: Option<Vec<Ipv4Addr>>,
    pub domain_name: Option<String>,
    pub broadcast_address: Option<Ipv4Addr>,
    pub lease_time: Option<u32>,
    pub renewal_time: Option<u32>,
    pub rebinding_time: Option<u32>,
    pub server_identifier: Option<Ipv4Addr>,
}

impl InfoOptions {
    pub fn from_options(options: &DhcpOptions) -> Self {
        let addr = |c| options.get(c).and_then(parse_ipv4);
        let addrs = |c| options.get(c).and_then(parse_ipv4_list);
        let secs = |c| options.get(c).and_then(parse_u32);
        Self {
            subnet_mask: addr(code::SUBNET_MASK),
            routers: addrs(code::ROUTER),
            dns_servers: addrs(code::DNS_SERVER),
            domain_name: options.get(code::DOMAIN_NAME).map(parse_string),
            broadcast_address: addr(code::BROADCAST_ADDR),
            lease_time: secs(code::LEASE_TIME),
            renewal_time: secs(code::RENEWAL_TIME),
            rebinding_time: secs(code::REBINDING_TIME),
            server_identifier: addr(code::SERVER_ID),
        }
    }
}

fn parse_ipv4(data: &[u8]) -> Option<Ipv4Addr> {
    let octets: [u8; 4] = data.try_into().ok()?;
    Some(Ipv4Addr::from(octets))
}

fn parse_ipv4_list(data: &[u8]) -> Option<Vec<Ipv4Addr>> {
    if data.is_empty() || data.len() % 4 != 0 {
        return None;
    }
    Some(data.chunks_exact(4).filter_map(parse_ipv4).collect())
}

fn parse_u32(data: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = data.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

fn parse_string(data: &[u8]) -> String {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&data[..end]).into_owned()
}
