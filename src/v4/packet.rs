//! DHCPv4 wire format (RFC 2131 section 2).
//!
//! ```text
//! offset  size  field
//!      0     1  op
//!      1     1  htype
//!      2     1  hlen
//!      3     1  hops
//!      4     4  xid
//!      8     2  secs
//!     10     2  flags
//!     12     4  ciaddr
//!     16     4  yiaddr
//!     20     4  siaddr
//!     24     4  giaddr
//!     28    16  chaddr
//!     44    64  sname
//!    108   128  file
//!    236     4  magic cookie (99.130.83.99)
//!    240     -  options, terminated by 255
//! ```

use super::options::{code, DhcpOptions, InfoOptions};
use crate::{
    error::MalformedPacket,
    mac::{MacAddr, ETH_ALEN},
};
use bytes::{Buf as _, BufMut as _, Bytes, BytesMut};
use std::{fmt, net::Ipv4Addr};

pub const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];

pub const BOOTREQUEST: u8 = 1;
pub const BOOTREPLY: u8 = 2;
pub const HTYPE_ETHERNET: u8 = 1;
pub const HLEN_ETHERNET: u8 = ETH_ALEN as u8;

/// Broadcast bit of the `flags` field.
pub const FLAG_BROADCAST: u16 = 0x8000;

pub const CHADDR_OFFSET: usize = 28;
pub const CHADDR_LEN: usize = 16;
pub const SNAME_LEN: usize = 64;
pub const FILE_LEN: usize = 128;
pub const MAGIC_COOKIE_OFFSET: usize = 236;
pub const OPTIONS_OFFSET: usize = MAGIC_COOKIE_OFFSET + MAGIC_COOKIE.len();

/// Encoded packets are zero-padded up to this size for BOOTP relay agents.
pub const MIN_PACKET_SIZE: usize = 300;

/// DHCP message type carried in option 53.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Discover,
    Offer,
    Request,
    Ack,
    Nak,
    /// Option 53 is missing, empty or carries a type this client does not handle.
    Invalid,
}

impl MessageType {
    pub fn from_code(value: u8) -> Self {
        match value {
            1 => Self::Discover,
            2 => Self::Offer,
            3 => Self::Request,
            5 => Self::Ack,
            6 => Self::Nak,
            _ => Self::Invalid,
        }
    }

    pub fn code(&self) -> Option<u8> {
        match self {
            Self::Discover => Some(1),
            Self::Offer => Some(2),
            Self::Request => Some(3),
            Self::Ack => Some(5),
            Self::Nak => Some(6),
            Self::Invalid => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Discover => "DHCPDISCOVER",
            Self::Offer => "DHCPOFFER",
            Self::Request => "DHCPREQUEST",
            Self::Ack => "DHCPACK",
            Self::Nak => "DHCPNAK",
            Self::Invalid => "INVALID",
        };
        f.write_str(name)
    }
}

/// One DHCP packet.
///
/// Built either by [`MessageBuilder`](super::message::MessageBuilder) or by
/// [`DhcpMessage::decode`]; there are no setters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpMessage {
    pub(crate) op: u8,
    pub(crate) htype: u8,
    pub(crate) hlen: u8,
    pub(crate) hops: u8,
    pub(crate) xid: u32,
    pub(crate) secs: u16,
    pub(crate) flags: u16,
    pub(crate) ciaddr: Ipv4Addr,
    pub(crate) yiaddr: Ipv4Addr,
    pub(crate) siaddr: Ipv4Addr,
    pub(crate) giaddr: Ipv4Addr,
    pub(crate) chaddr: [u8; CHADDR_LEN],
    pub(crate) sname: [u8; SNAME_LEN],
    pub(crate) file: [u8; FILE_LEN],
    pub(crate) options: DhcpOptions,
    pub(crate) message_type: MessageType,
    pub(crate) info: InfoOptions,
}

impl DhcpMessage {
    /// Parses a datagram.
    ///
    /// A missing option 53 is not an error; the message decodes with
    /// [`MessageType::Invalid`].
    pub fn decode(data: &[u8]) -> Result<Self, MalformedPacket> {
        if data.len() < OPTIONS_OFFSET {
            return Err(MalformedPacket::TooShort { len: data.len() });
        }
        let mut cookie = [0u8; 4];
        cookie.copy_from_slice(&data[MAGIC_COOKIE_OFFSET..OPTIONS_OFFSET]);
        if cookie != MAGIC_COOKIE {
            return Err(MalformedPacket::BadMagicCookie(cookie));
        }

        let options = DhcpOptions::parse(data, OPTIONS_OFFSET)?;

        let mut header = &data[..MAGIC_COOKIE_OFFSET];
        let op = header.get_u8();
        let htype = header.get_u8();
        let hlen = header.get_u8();
        let hops = header.get_u8();
        let xid = header.get_u32();
        let secs = header.get_u16();
        let flags = header.get_u16();
        let ciaddr = Ipv4Addr::from(header.get_u32());
        let yiaddr = Ipv4Addr::from(header.get_u32());
        let siaddr = Ipv4Addr::from(header.get_u32());
        let giaddr = Ipv4Addr::from(header.get_u32());
        let mut chaddr = [0u8; CHADDR_LEN];
        header.copy_to_slice(&mut chaddr);
        let mut sname = [0u8; SNAME_LEN];
        header.copy_to_slice(&mut sname);
        let mut file = [0u8; FILE_LEN];
        header.copy_to_slice(&mut file);

        Ok(Self::assemble(
            [op, htype, hlen, hops],
            xid,
            secs,
            flags,
            [ciaddr, yiaddr, siaddr, giaddr],
            chaddr,
            sname,
            file,
            options,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        [op, htype, hlen, hops]: [u8; 4],
        xid: u32,
        secs: u16,
        flags: u16,
        [ciaddr, yiaddr, siaddr, giaddr]: [Ipv4Addr; 4],
        chaddr: [u8; CHADDR_LEN],
        sname: [u8; SNAME_LEN],
        file: [u8; FILE_LEN],
        options: DhcpOptions,
    ) -> Self {
        let message_type = options
            .get(code::MESSAGE_TYPE)
            .and_then(|data| data.first().copied())
            .map_or(MessageType::Invalid, MessageType::from_code);
        let info = InfoOptions::from_options(&options);
        Self {
            op,
            htype,
            hlen,
            hops,
            xid,
            secs,
            flags,
            ciaddr,
            yiaddr,
            siaddr,
            giaddr,
            chaddr,
            sname,
            file,
            options,
            message_type,
            info,
        }
    }

    /// Serializes the header, magic cookie and options, zero-padded to
    /// [`MIN_PACKET_SIZE`].
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(MIN_PACKET_SIZE);
        buf.put_u8(self.op);
        buf.put_u8(self.htype);
        buf.put_u8(self.hlen);
        buf.put_u8(self.hops);
        buf.put_u32(self.xid);
        buf.put_u16(self.secs);
        buf.put_u16(self.flags);
        buf.put_slice(&self.ciaddr.octets());
        buf.put_slice(&self.yiaddr.octets());
        buf.put_slice(&self.siaddr.octets());
        buf.put_slice(&self.giaddr.octets());
        buf.put_slice(&self.chaddr);
        buf.put_slice(&self.sname);
        buf.put_slice(&self.file);
        buf.put_slice(&MAGIC_COOKIE);
        self.options.encode_into(&mut buf);
        if buf.len() < MIN_PACKET_SIZE {
            buf.resize(MIN_PACKET_SIZE, 0);
        }
        buf.freeze()
    }

    pub fn op(&self) -> u8 {
        self.op
    }

    pub fn htype(&self) -> u8 {
        self.htype
    }

    pub fn hlen(&self) -> u8 {
        self.hlen
    }

    pub fn hops(&self) -> u8 {
        self.hops
    }

    pub fn xid(&self) -> u32 {
        self.xid
    }

    pub fn secs(&self) -> u16 {
        self.secs
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }

    pub fn is_broadcast(&self) -> bool {
        self.flags & FLAG_BROADCAST != 0
    }

    pub fn ciaddr(&self) -> Ipv4Addr {
        self.ciaddr
    }

    pub fn yiaddr(&self) -> Ipv4Addr {
        self.yiaddr
    }

    pub fn siaddr(&self) -> Ipv4Addr {
        self.siaddr
    }

    pub fn giaddr(&self) -> Ipv4Addr {
        self.giaddr
    }

    pub fn chaddr(&self) -> &[u8; CHADDR_LEN] {
        &self.chaddr
    }

    /// First six bytes of `chaddr`.
    pub fn client_mac(&self) -> MacAddr {
        let mut octets = [0u8; ETH_ALEN];
        octets.copy_from_slice(&self.chaddr[..ETH_ALEN]);
        MacAddr::new(octets)
    }

    pub fn sname(&self) -> &[u8; SNAME_LEN] {
        &self.sname
    }

    pub fn file(&self) -> &[u8; FILE_LEN] {
        &self.file
    }

    pub fn options(&self) -> &DhcpOptions {
        &self.options
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn info(&self) -> &InfoOptions {
        &self.info
    }

    /// Option 54 if present, `siaddr` otherwise.
    pub fn server_address(&self) -> Ipv4Addr {
        self.info.server_identifier.unwrap_or(self.siaddr)
    }
}

fn nul_terminated(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

impl fmt::Display for DhcpMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Message Type: {}", self.message_type)?;
        writeln!(
            f,
            "Op: {} Hardware Type: {} Hardware Length: {} Hops: {}",
            self.op, self.htype, self.hlen, self.hops
        )?;
        writeln!(f, "Transaction ID: {:#010x}", self.xid)?;
        writeln!(f, "Seconds Elapsed: {} Flags: {:#06x}", self.secs, self.flags)?;
        writeln!(f, "Client IP: {}", self.ciaddr)?;
        writeln!(f, "Your IP: {}", self.yiaddr)?;
        writeln!(f, "Next Server IP: {}", self.siaddr)?;
        writeln!(f, "Relay Agent IP: {}", self.giaddr)?;
        writeln!(f, "Client MAC: {}", self.client_mac())?;
        writeln!(f, "Server Hostname: {:?}", nul_terminated(&self.sname))?;
        write!(f, "Options:")?;
        for opt in self.options.iter() {
            write!(f, "\n  {:>3}: {:02x?}", opt.code, opt.data.as_ref())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v4::message::MessageBuilder;

    fn header() -> Vec<u8> {
        let mut packet = vec![0u8; OPTIONS_OFFSET];
        packet[0] = BOOTREPLY;
        packet[1] = HTYPE_ETHERNET;
        packet[2] = HLEN_ETHERNET;
        packet[4..8].copy_from_slice(&0xdeadbeefu32.to_be_bytes());
        packet[16..20].copy_from_slice(&[192, 168, 1, 50]);
        packet[20..24].copy_from_slice(&[192, 168, 1, 1]);
        packet[28..34].copy_from_slice(&[0x02, 0, 0, 0, 0, 1]);
        packet[MAGIC_COOKIE_OFFSET..OPTIONS_OFFSET].copy_from_slice(&MAGIC_COOKIE);
        packet
    }

    #[test]
    fn test_decode_fixed_fields() {
        let mut packet = header();
        packet.extend_from_slice(&[53, 1, 2, 255]);

        let msg = DhcpMessage::decode(&packet).unwrap();
        assert_eq!(msg.op(), BOOTREPLY);
        assert_eq!(msg.xid(), 0xdeadbeef);
        assert_eq!(msg.yiaddr(), Ipv4Addr::new(192, 168, 1, 50));
        assert_eq!(msg.siaddr(), Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(msg.client_mac(), MacAddr::new([0x02, 0, 0, 0, 0, 1]));
        assert_eq!(msg.message_type(), MessageType::Offer);
    }

    #[test]
    fn test_decode_too_short() {
        let packet = vec![0u8; 239];
        assert_eq!(
            DhcpMessage::decode(&packet),
            Err(MalformedPacket::TooShort { len: 239 })
        );
    }

    #[test]
    fn test_decode_bad_cookie() {
        let mut packet = header();
        packet[236] = 0x64;
        packet.push(255);
        assert!(matches!(
            DhcpMessage::decode(&packet),
            Err(MalformedPacket::BadMagicCookie([0x64, 0x82, 0x53, 0x63]))
        ));
    }

    #[test]
    fn test_decode_missing_end() {
        let mut packet = header();
        packet.extend_from_slice(&[53, 1, 5, 0, 0]);
        assert_eq!(DhcpMessage::decode(&packet), Err(MalformedPacket::MissingEnd));

        // Exactly 240 bytes leaves no room for an End marker.
        assert_eq!(DhcpMessage::decode(&header()), Err(MalformedPacket::MissingEnd));
    }

    #[test]
    fn test_decode_truncated_option() {
        let mut packet = header();
        packet.extend_from_slice(&[53, 1, 5, 51, 4, 0, 0]);
        assert_eq!(
            DhcpMessage::decode(&packet),
            Err(MalformedPacket::TruncatedOption { code: 51, offset: 243 })
        );
    }

    #[test]
    fn test_decode_end_with_trailing_padding() {
        let mut packet = header();
        packet.extend_from_slice(&[0, 0, 53, 1, 5, 255]);
        packet.extend_from_slice(&[0u8; 60]);

        let msg = DhcpMessage::decode(&packet).unwrap();
        assert_eq!(msg.message_type(), MessageType::Ack);
        assert_eq!(msg.options().len(), 1);
    }

    #[test]
    fn test_missing_message_type_is_invalid() {
        let mut packet = header();
        packet.extend_from_slice(&[1, 4, 255, 255, 255, 0, 255]);

        let msg = DhcpMessage::decode(&packet).unwrap();
        assert_eq!(msg.message_type(), MessageType::Invalid);
        assert_eq!(msg.info().subnet_mask, Some(Ipv4Addr::new(255, 255, 255, 0)));
    }

    #[test]
    fn test_duplicate_option_last_wins() {
        let mut packet = header();
        packet.extend_from_slice(&[53, 1, 2, 51, 4, 0, 0, 0, 60, 51, 4, 0, 0, 1, 0, 255]);

        let msg = DhcpMessage::decode(&packet).unwrap();
        assert_eq!(msg.info().lease_time, Some(256));
        assert_eq!(msg.options().len(), 2);
    }

    #[test]
    fn test_server_address_prefers_option_54() {
        let mut packet = header();
        packet.extend_from_slice(&[53, 1, 2, 54, 4, 10, 0, 0, 1, 255]);
        let msg = DhcpMessage::decode(&packet).unwrap();
        assert_eq!(msg.server_address(), Ipv4Addr::new(10, 0, 0, 1));

        let mut packet = header();
        packet.extend_from_slice(&[53, 1, 2, 255]);
        let msg = DhcpMessage::decode(&packet).unwrap();
        assert_eq!(msg.server_address(), Ipv4Addr::new(192, 168, 1, 1));
    }

    #[test]
    fn test_encode_layout_and_round_trip() {
        let msg = MessageBuilder::new(BOOTREPLY, 0x01020304, MacAddr::new([2, 1, 2, 3, 4, 5]))
            .yiaddr(Ipv4Addr::new(10, 0, 0, 7))
            .message_type(MessageType::Ack)
            .option(code::LEASE_TIME, 3600u32.to_be_bytes().to_vec())
            .option(code::ROUTER, vec![10, 0, 0, 1])
            .build();

        let bytes = msg.encode();
        assert_eq!(bytes.len(), MIN_PACKET_SIZE);
        assert_eq!(&bytes[MAGIC_COOKIE_OFFSET..OPTIONS_OFFSET], &MAGIC_COOKIE);
        assert_eq!(&bytes[OPTIONS_OFFSET..OPTIONS_OFFSET + 3], &[53, 1, 5]);

        let decoded = DhcpMessage::decode(&bytes).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.info().lease_time, Some(3600));
    }
}
