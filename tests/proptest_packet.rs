use proptest::prelude::*;
use std::net::Ipv4Addr;

use toydhcp::{
    v4::{build_dhcp_discover, build_dhcp_request, options::code},
    DhcpMessage, MacAddr, MalformedPacket, MessageType,
};

const DHCP_MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];
const DHCP_FIXED_HEADER_SIZE: usize = 240;

fn valid_header() -> Vec<u8> {
    let mut packet = vec![0u8; DHCP_FIXED_HEADER_SIZE];
    packet[0] = 2;
    packet[1] = 1;
    packet[2] = 6;
    packet[236..240].copy_from_slice(&DHCP_MAGIC_COOKIE);
    packet
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2000))]

    #[test]
    fn decode_never_panics_on_arbitrary_bytes(data: Vec<u8>) {
        let _ = DhcpMessage::decode(&data);
    }

    #[test]
    fn decode_never_panics_on_random_options(
        options_data in prop::collection::vec(any::<u8>(), 0..512)
    ) {
        let mut packet = valid_header();
        packet.extend_from_slice(&options_data);
        let _ = DhcpMessage::decode(&packet);
    }

    #[test]
    fn short_packets_always_rejected(
        data in prop::collection::vec(any::<u8>(), 0..240)
    ) {
        let len = data.len();
        prop_assert_eq!(DhcpMessage::decode(&data), Err(MalformedPacket::TooShort { len }));
    }

    #[test]
    fn bad_magic_cookie_always_rejected(cookie in any::<[u8; 4]>()) {
        prop_assume!(cookie != DHCP_MAGIC_COOKIE);

        let mut packet = valid_header();
        packet[236..240].copy_from_slice(&cookie);
        packet.push(255);

        prop_assert_eq!(DhcpMessage::decode(&packet), Err(MalformedPacket::BadMagicCookie(cookie)));
    }

    #[test]
    fn options_without_end_always_rejected(
        pads in 0usize..64,
        option_data in prop::collection::vec(any::<u8>(), 0..32)
    ) {
        let mut packet = valid_header();
        packet.extend(std::iter::repeat(0u8).take(pads));
        packet.push(224);
        packet.push(option_data.len() as u8);
        packet.extend_from_slice(&option_data);

        prop_assert!(DhcpMessage::decode(&packet).is_err());
    }

    #[test]
    fn end_marker_after_padding_is_accepted(
        leading in 0usize..32,
        trailing in 0usize..128
    ) {
        let mut packet = valid_header();
        packet.extend(std::iter::repeat(0u8).take(leading));
        packet.extend_from_slice(&[53, 1, 5, 255]);
        packet.extend(std::iter::repeat(0u8).take(trailing));

        let msg = DhcpMessage::decode(&packet).unwrap();
        prop_assert_eq!(msg.message_type(), MessageType::Ack);
    }

    #[test]
    fn header_fields_survive_decode_encode(
        xid in any::<u32>(),
        secs in any::<u16>(),
        flags in any::<u16>(),
        ciaddr in any::<[u8; 4]>(),
        yiaddr in any::<[u8; 4]>(),
        siaddr in any::<[u8; 4]>(),
        giaddr in any::<[u8; 4]>(),
        chaddr in any::<[u8; 16]>(),
    ) {
        let mut packet = valid_header();
        packet[4..8].copy_from_slice(&xid.to_be_bytes());
        packet[8..10].copy_from_slice(&secs.to_be_bytes());
        packet[10..12].copy_from_slice(&flags.to_be_bytes());
        packet[12..16].copy_from_slice(&ciaddr);
        packet[16..20].copy_from_slice(&yiaddr);
        packet[20..24].copy_from_slice(&siaddr);
        packet[24..28].copy_from_slice(&giaddr);
        packet[28..44].copy_from_slice(&chaddr);
        packet.extend_from_slice(&[53, 1, 2, 255]);

        let parsed = DhcpMessage::decode(&packet).unwrap();
        let encoded = parsed.encode();
        prop_assert!(encoded.len() >= 300);
        prop_assert_eq!(&encoded[236..240], &DHCP_MAGIC_COOKIE[..]);

        let reparsed = DhcpMessage::decode(&encoded).unwrap();
        prop_assert_eq!(reparsed.secs(), secs);
        prop_assert_eq!(reparsed.flags(), flags);
        prop_assert_eq!(reparsed.ciaddr(), Ipv4Addr::from(ciaddr));
        prop_assert_eq!(reparsed.giaddr(), Ipv4Addr::from(giaddr));
        prop_assert_eq!(reparsed.chaddr(), &chaddr);
        prop_assert_eq!(reparsed, parsed);
    }

    #[test]
    fn request_echoes_offered_addresses(
        mac in any::<[u8; 6]>(),
        xid in any::<u32>(),
        offered in any::<[u8; 4]>(),
        server in any::<[u8; 4]>(),
    ) {
        let packet = build_dhcp_request(
            &MacAddr::new(mac),
            xid,
            Ipv4Addr::from(offered),
            Ipv4Addr::from(server),
            None,
        );
        let msg = DhcpMessage::decode(&packet).unwrap();

        prop_assert_eq!(msg.options().codes().next(), Some(code::MESSAGE_TYPE));
        prop_assert_eq!(msg.options().get(code::REQUESTED_IP), Some(&offered[..]));
        prop_assert_eq!(msg.options().get(code::SERVER_ID), Some(&server[..]));
        prop_assert_eq!(msg.client_mac(), MacAddr::new(mac));
        prop_assert_eq!(msg.xid(), xid);
    }

    #[test]
    fn discover_carries_requested_ip_only_when_given(
        hint in prop::option::of(any::<[u8; 4]>()),
        xid in any::<u32>(),
    ) {
        let mac = MacAddr::random();
        let packet = build_dhcp_discover(&mac, xid, hint.map(Ipv4Addr::from), None);
        let msg = DhcpMessage::decode(&packet).unwrap();

        prop_assert_eq!(msg.message_type(), MessageType::Discover);
        prop_assert_eq!(msg.options().get(code::REQUESTED_IP), hint.as_ref().map(|ip| &ip[..]));
    }
}
