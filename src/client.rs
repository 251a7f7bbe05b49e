//! DHCP client implementation
//!
//! This module drives one lease acquisition:
//! - a listener task that decodes and filters inbound datagrams
//! - a controller loop that feeds them to the state machine with a timed wait
//! - the terminal [`Outcome`] of the exchange

use crate::{
    config::ClientConfig,
    error::ClientError,
    mac::MacAddr,
    network::{Transport, UdpTransport},
    v4::{handler::DhcpV4Handler, packet::DhcpMessage},
};
use bytes::Bytes;
use std::{fmt, io, net::Ipv4Addr, sync::Arc, time::Duration};
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
    time::{self, Instant},
};

/// Actions returned by the state machine, carried out by the client driver.
pub enum Action {
    /// Transmit the packet and open a new wait window.
    Send(Bytes),
    /// Keep waiting within the current window.
    Wait,
    Finish(Outcome),
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send(packet) => write!(f, "Send({} bytes)", packet.len()),
            Self::Wait => f.write_str("Wait"),
            Self::Finish(outcome) => write!(f, "Finish({outcome})"),
        }
    }
}

/// External events the state machine reacts to.
#[derive(Debug)]
pub enum Event<'a> {
    PacketReceived(&'a DhcpMessage),
    Timeout,
    TransportFailed(io::Error),
}

/// Lease information taken from a DHCPACK.
#[derive(Debug, Clone)]
pub struct Lease {
    pub address: Ipv4Addr,
    pub subnet_mask: Option<Ipv4Addr>,
    pub routers: Option<Vec<Ipv4Addr>>,
    pub dns_servers: Option<Vec<Ipv4Addr>>,
    pub domain_name: Option<String>,
    pub broadcast_address: Option<Ipv4Addr>,
    pub lease_duration: Option<Duration>,
    pub renewal_time: Option<Duration>,
    pub rebinding_time: Option<Duration>,
    pub server_identifier: Option<Ipv4Addr>,
    /// The acknowledgement itself, with every option the server sent.
    pub ack: DhcpMessage,
}

impl Lease {
    pub fn from_ack(ack: &DhcpMessage) -> Self {
        let info = ack.info();
        let secs = |t: Option<u32>| t.map(|s| Duration::from_secs(s.into()));
        Self {
            address: ack.yiaddr(),
            subnet_mask: info.subnet_mask,
            routers: info.routers.clone(),
            dns_servers: info.dns_servers.clone(),
            domain_name: info.domain_name.clone(),
            broadcast_address: info.broadcast_address,
            lease_duration: secs(info.lease_time),
            renewal_time: secs(info.renewal_time),
            rebinding_time: secs(info.rebinding_time),
            server_identifier: info.server_identifier,
            ack: ack.clone(),
        }
    }
}

fn join_addrs(addrs: &[Ipv4Addr]) -> String {
    addrs
        .iter()
        .map(Ipv4Addr::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Leased IP: {}", self.address)?;
        if let Some(server) = self.server_identifier {
            write!(f, "\nDHCP Server: {server}")?;
        }
        if let Some(mask) = self.subnet_mask {
            write!(f, "\nSubnet Mask: {mask}")?;
        }
        if let Some(routers) = &self.routers {
            write!(f, "\nRouter: {}", join_addrs(routers))?;
        }
        if let Some(dns) = &self.dns_servers {
            write!(f, "\nDNS Server: {}", join_addrs(dns))?;
        }
        if let Some(domain) = &self.domain_name {
            write!(f, "\nDNS Domain Name: {domain}")?;
        }
        if let Some(broadcast) = self.broadcast_address {
            write!(f, "\nBroadcast Address: {broadcast}")?;
        }
        for (label, value) in [
            ("Lease", self.lease_duration),
            ("Renewal", self.renewal_time),
            ("Rebinding", self.rebinding_time),
        ] {
            if let Some(value) = value {
                write!(f, "\n{label}: {} sec", value.as_secs())?;
            }
        }
        Ok(())
    }
}

/// Terminal result of one lease acquisition.
#[derive(Debug)]
pub enum Outcome {
    Leased(Lease),
    /// The server answered with a DHCPNAK, kept for diagnostics.
    Nacked(DhcpMessage),
    Failed(ClientError),
}

impl Outcome {
    pub fn is_leased(&self) -> bool {
        matches!(self, Self::Leased(_))
    }

    pub fn into_result(self) -> Result<Lease, ClientError> {
        match self {
            Self::Leased(lease) => Ok(lease),
            Self::Nacked(nak) => Err(ClientError::Nak {
                server: nak.info().server_identifier,
            }),
            Self::Failed(e) => Err(e),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leased(lease) => write!(f, "leased {}", lease.address),
            Self::Nacked(nak) => write!(f, "nacked by {}", nak.server_address()),
            Self::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

/// Common trait for DHCP state machines.
pub trait DhcpStateMachine {
    /// Enters the first phase and returns the first packet to send.
    fn start(&mut self) -> Result<Action, ClientError>;
    /// Handles an event and returns the next action to perform.
    fn handle_event(&mut self, event: Event) -> Result<Action, ClientError>;
    /// Name of the current state, for logging.
    fn state_name(&self) -> &'static str;
}

/// Inbound queue item produced by the listener.
#[derive(Debug)]
enum Inbound {
    Packet(DhcpMessage),
    TransportFailed(io::Error),
}

/// Aborts the listener task when the exchange ends, however it ends.
struct ListenerGuard(JoinHandle<()>);

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Decodes a datagram and keeps it only if it is addressed to `mac`.
pub fn screen(datagram: &[u8], mac: &MacAddr) -> Result<DhcpMessage, ClientError> {
    let msg = DhcpMessage::decode(datagram)?;
    let client_mac = msg.client_mac();
    if client_mac != *mac {
        return Err(ClientError::UnmatchedClient(client_mac));
    }
    Ok(msg)
}

async fn listen<T: Transport>(
    transport: Arc<T>,
    mac: MacAddr,
    tx: UnboundedSender<Inbound>,
) {
    loop {
        let datagram = match transport.receive().await {
            Ok(datagram) => datagram,
            Err(e) => {
                tracing::error!("Socket receive error: {}", e);
                let _ = tx.send(Inbound::TransportFailed(e));
                return;
            }
        };

        match screen(&datagram, &mac) {
            Ok(msg) => {
                tracing::debug!("Queued {} (xid {:#010x})", msg.message_type(), msg.xid());
                if tx.send(Inbound::Packet(msg)).is_err() {
                    return;
                }
            }
            Err(ClientError::UnmatchedClient(other)) => {
                tracing::trace!("Ignoring packet for {}", other);
            }
            Err(e) => {
                tracing::debug!("Discarding {} byte datagram: {}", datagram.len(), e);
            }
        }
    }
}

pub struct DhcpClient<T: Transport = UdpTransport> {
    config: ClientConfig,
    transport: Arc<T>,
}

impl DhcpClient<UdpTransport> {
    /// Opens the UDP broadcast transport described by `config`.
    pub async fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let transport = UdpTransport::bind(&config)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> DhcpClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Runs DISCOVER, OFFER, REQUEST, ACK/NAK to completion.
    ///
    /// Undecodable and foreign packets are dropped along the way; only the
    /// three terminal outcomes are reported.
    pub async fn acquire_lease(&self) -> Outcome {
        let xid: u32 = rand::random();
        let mut handler = DhcpV4Handler::new(&self.config, xid);
        tracing::info!(
            "Starting lease acquisition for {} (xid {:#010x})",
            self.config.mac_address,
            xid
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        // The listener is running before the first DISCOVER goes out.
        let _listener = ListenerGuard(tokio::spawn(listen(
            Arc::clone(&self.transport),
            self.config.mac_address,
            tx,
        )));

        let exchange = self.drive(&mut handler, &mut rx);
        match self.config.deadline {
            Some(limit) => match time::timeout(limit, exchange).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!("Exchange deadline of {:?} elapsed", limit);
                    Outcome::Failed(ClientError::DeadlineElapsed(limit))
                }
            },
            None => exchange.await,
        }
    }

    async fn drive(
        &self,
        handler: &mut impl DhcpStateMachine,
        rx: &mut UnboundedReceiver<Inbound>,
    ) -> Outcome {
        let mut window_end = Instant::now() + self.config.retry_timeout;
        let mut next_action = handler.start();

        loop {
            let action = match next_action {
                Ok(action) => action,
                Err(e) => {
                    tracing::error!("Exchange failed in {}: {}", handler.state_name(), e);
                    return Outcome::Failed(e);
                }
            };
            tracing::trace!("State: {}, Action: {:?}", handler.state_name(), action);

            next_action = match action {
                Action::Send(packet) => match self.transport.send(&packet).await {
                    Ok(()) => {
                        window_end = Instant::now() + self.config.retry_timeout;
                        Ok(Action::Wait)
                    }
                    Err(e) => {
                        tracing::error!("Socket send error: {}", e);
                        handler.handle_event(Event::TransportFailed(e))
                    }
                },
                Action::Wait => match time::timeout_at(window_end, rx.recv()).await {
                    Ok(Some(Inbound::Packet(msg))) => {
                        handler.handle_event(Event::PacketReceived(&msg))
                    }
                    Ok(Some(Inbound::TransportFailed(e))) => {
                        handler.handle_event(Event::TransportFailed(e))
                    }
                    Ok(None) => Err(ClientError::ListenerStopped),
                    Err(_) => {
                        tracing::debug!("Timeout waiting for response");
                        handler.handle_event(Event::Timeout)
                    }
                },
                Action::Finish(outcome) => {
                    tracing::info!("Exchange finished: {}", outcome);
                    return outcome;
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v4::{message::MessageBuilder, options::code, packet::{MessageType, BOOTREPLY}};

    const MAC: MacAddr = MacAddr::new([0x02, 0x0c, 0x29, 0xa8, 0x92, 0xf4]);

    #[test]
    fn test_screen_filters_foreign_mac() {
        let other = MacAddr::new([0x02, 0, 0, 0, 0, 9]);
        let packet = MessageBuilder::new(BOOTREPLY, 7, other)
            .message_type(MessageType::Offer)
            .build()
            .encode();

        assert!(matches!(
            screen(&packet, &MAC),
            Err(ClientError::UnmatchedClient(mac)) if mac == other
        ));
    }

    #[test]
    fn test_screen_reports_malformed() {
        assert!(matches!(
            screen(&[0u8; 12], &MAC),
            Err(ClientError::Malformed(_))
        ));
    }

    #[test]
    fn test_lease_from_ack() {
        let ack = MessageBuilder::new(BOOTREPLY, 7, MAC)
            .yiaddr(Ipv4Addr::new(192, 168, 1, 50))
            .message_type(MessageType::Ack)
            .option(code::SERVER_ID, vec![192, 168, 1, 1])
            .option(code::LEASE_TIME, 7200u32.to_be_bytes().to_vec())
            .option(code::DNS_SERVER, vec![192, 168, 1, 1, 9, 9, 9, 9])
            .build();

        let lease = Lease::from_ack(&ack);
        assert_eq!(lease.address, Ipv4Addr::new(192, 168, 1, 50));
        assert_eq!(lease.lease_duration, Some(Duration::from_secs(7200)));
        assert_eq!(lease.server_identifier, Some(Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(lease.renewal_time, None);

        let text = lease.to_string();
        assert!(text.contains("Leased IP: 192.168.1.50"));
        assert!(text.contains("DNS Server: 192.168.1.1, 9.9.9.9"));
        assert!(text.contains("Lease: 7200 sec"));
    }

    #[test]
    fn test_nacked_outcome_into_result() {
        let nak = MessageBuilder::new(BOOTREPLY, 7, MAC)
            .message_type(MessageType::Nak)
            .option(code::SERVER_ID, vec![10, 0, 0, 1])
            .build();

        let err = Outcome::Nacked(nak).into_result().unwrap_err();
        assert!(matches!(
            err,
            ClientError::Nak { server: Some(ip) } if ip == Ipv4Addr::new(10, 0, 0, 1)
        ));
    }
}
