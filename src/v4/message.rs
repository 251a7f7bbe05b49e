use super::{
    options::{code, ClientId, DhcpOptions},
    packet::{
        DhcpMessage, MessageType, BOOTREQUEST, CHADDR_LEN, FILE_LEN, FLAG_BROADCAST,
        HLEN_ETHERNET, HTYPE_ETHERNET, SNAME_LEN,
    },
};
use crate::mac::{MacAddr, ETH_ALEN};
use bytes::Bytes;
use std::net::Ipv4Addr;

/// Assembles a [`DhcpMessage`].
///
/// Option 53 is always written first, whatever order the setters are
/// called in.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    op: u8,
    xid: u32,
    mac: MacAddr,
    flags: u16,
    ciaddr: Ipv4Addr,
    yiaddr: Ipv4Addr,
    siaddr: Ipv4Addr,
    giaddr: Ipv4Addr,
    message_type: Option<MessageType>,
    options: DhcpOptions,
}

impl MessageBuilder {
    pub fn new(op: u8, xid: u32, mac: MacAddr) -> Self {
        Self {
            op,
            xid,
            mac,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            message_type: None,
            options: DhcpOptions::new(),
        }
    }

    pub fn broadcast(mut self) -> Self {
        self.flags |= FLAG_BROADCAST;
        self
    }

    pub fn ciaddr(mut self, ip: Ipv4Addr) -> Self {
        self.ciaddr = ip;
        self
    }

    pub fn yiaddr(mut self, ip: Ipv4Addr) -> Self {
        self.yiaddr = ip;
        self
    }

    pub fn siaddr(mut self, ip: Ipv4Addr) -> Self {
        self.siaddr = ip;
        self
    }

    pub fn giaddr(mut self, ip: Ipv4Addr) -> Self {
        self.giaddr = ip;
        self
    }

    pub fn message_type(mut self, message_type: MessageType) -> Self {
        self.message_type = Some(message_type);
        self
    }

    pub fn option(mut self, option_code: u8, data: impl Into<Bytes>) -> Self {
        self.options.insert(option_code, data);
        self
    }

    pub fn build(self) -> DhcpMessage {
        let mut options = DhcpOptions::new();
        if let Some(type_code) = self.message_type.and_then(|t| t.code()) {
            options.insert(code::MESSAGE_TYPE, vec![type_code]);
        }
        for opt in self.options.iter() {
            if opt.code != code::MESSAGE_TYPE || !options.contains(code::MESSAGE_TYPE) {
                options.insert(opt.code, opt.data.clone());
            }
        }

        let mut chaddr = [0u8; CHADDR_LEN];
        chaddr[..ETH_ALEN].copy_from_slice(self.mac.as_bytes());

        DhcpMessage::assemble(
            [self.op, HTYPE_ETHERNET, HLEN_ETHERNET, 0],
            self.xid,
            0,
            self.flags,
            [self.ciaddr, self.yiaddr, self.siaddr, self.giaddr],
            chaddr,
            [0u8; SNAME_LEN],
            [0u8; FILE_LEN],
            options,
        )
    }
}

/// Constructs a DHCP Discover message.
///
/// Option 50 is only present when a `requested_ip` hint is given.
pub fn build_dhcp_discover(
    mac_addr: &MacAddr,
    xid: u32,
    requested_ip: Option<Ipv4Addr>,
    client_id: Option<&ClientId>,
) -> Bytes {
    let mut builder = MessageBuilder::new(BOOTREQUEST, xid, *mac_addr)
        .broadcast()
        .message_type(MessageType::Discover);

    if let Some(ip) = requested_ip {
        builder = builder.option(code::REQUESTED_IP, ip.octets().to_vec());
    }
    if let Some(id) = client_id {
        builder = builder.option(code::CLIENT_ID, id.as_bytes().to_vec());
    }

    builder.build().encode()
}

/// Constructs a DHCP Request message answering the offer of `server_ip`.
pub fn build_dhcp_request(
    mac_addr: &MacAddr,
    xid: u32,
    offered_ip: Ipv4Addr,
    server_ip: Ipv4Addr,
    client_id: Option<&ClientId>,
) -> Bytes {
    let mut builder = MessageBuilder::new(BOOTREQUEST, xid, *mac_addr)
        .broadcast()
        .siaddr(server_ip)
        .message_type(MessageType::Request)
        .option(code::REQUESTED_IP, offered_ip.octets().to_vec())
        .option(code::SERVER_ID, server_ip.octets().to_vec());

    if let Some(id) = client_id {
        builder = builder.option(code::CLIENT_ID, id.as_bytes().to_vec());
    }

    builder.build().encode()
}
