//! DHCPv4 state machine implementation
//!
//! Sequences one DISCOVER, OFFER, REQUEST, ACK/NAK exchange. The handler
//! never touches the network: it consumes [`Event`]s and returns the
//! [`Action`] the client driver should carry out.

use super::{
    message::{build_dhcp_discover, build_dhcp_request},
    options::ClientId,
    packet::{DhcpMessage, MessageType},
};
use crate::{
    client::{Action, DhcpStateMachine, Event, Lease, Outcome},
    config::ClientConfig,
    error::ClientError,
    mac::MacAddr,
};
use std::net::Ipv4Addr;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Phase {
    Idle,
    AwaitingOffer,
    RequestSent,
    AwaitingAck,
    Leased,
    Nacked,
    Failed,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::AwaitingOffer => "AwaitingOffer",
            Self::RequestSent => "RequestSent",
            Self::AwaitingAck => "AwaitingAck",
            Self::Leased => "Leased",
            Self::Nacked => "Nacked",
            Self::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Leased | Self::Nacked | Self::Failed)
    }
}

/// The address a server offered and the server that offered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offer {
    pub offered_ip: Ipv4Addr,
    pub server_ip: Ipv4Addr,
}

/// Everything one lease attempt knows about itself. Discarded with the
/// handler when the attempt ends.
#[derive(Debug, Clone)]
pub struct ExchangeState {
    pub mac: MacAddr,
    pub xid: u32,
    pub requested_ip: Option<Ipv4Addr>,
    pub client_id: Option<ClientId>,
    pub phase: Phase,
    pub offer: Option<Offer>,
    pub discover_attempts: u32,
    pub request_attempts: u32,
}

pub struct DhcpV4Handler {
    state: ExchangeState,
    max_attempts: Option<u32>,
}

impl DhcpV4Handler {
    pub fn new(config: &ClientConfig, xid: u32) -> Self {
        Self {
            state: ExchangeState {
                mac: config.mac_address,
                xid,
                requested_ip: config.requested_ip,
                client_id: config.client_id(),
                phase: Phase::Idle,
                offer: None,
                discover_attempts: 0,
                request_attempts: 0,
            },
            max_attempts: config.max_attempts,
        }
    }

    pub fn state(&self) -> &ExchangeState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    fn transition(&mut self, phase: Phase) {
        tracing::info!("{} -> {}", self.state.phase.name(), phase.name());
        self.state.phase = phase;
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }

    /// Replies to another client or another transaction never drive a
    /// transition.
    fn is_ours(&self, msg: &DhcpMessage) -> bool {
        if msg.client_mac() != self.state.mac {
            tracing::debug!("Hardware address {} is not ours, ignoring", msg.client_mac());
            return false;
        }
        if msg.xid() != self.state.xid {
            tracing::debug!(
                "XID mismatch ({:#010x}, ours {:#010x}), ignoring",
                msg.xid(),
                self.state.xid
            );
            return false;
        }
        true
    }

    fn send_discover(&mut self) -> Action {
        self.state.discover_attempts += 1;
        tracing::info!(
            "Sending DHCPDISCOVER (attempt {}){}",
            self.state.discover_attempts,
            self.state
                .requested_ip
                .map(|ip| format!(", requesting {ip}"))
                .unwrap_or_default()
        );
        Action::Send(build_dhcp_discover(
            &self.state.mac,
            self.state.xid,
            self.state.requested_ip,
            self.state.client_id.as_ref(),
        ))
    }

    fn send_request(&mut self) -> Result<Action, ClientError> {
        let offer = self.state.offer.ok_or_else(|| {
            ClientError::Critical("No offer available for request".to_string())
        })?;
        self.state.request_attempts += 1;
        tracing::info!(
            "Sending DHCPREQUEST for {} to server {} (attempt {})",
            offer.offered_ip,
            offer.server_ip,
            self.state.request_attempts
        );
        Ok(Action::Send(build_dhcp_request(
            &self.state.mac,
            self.state.xid,
            offer.offered_ip,
            offer.server_ip,
            self.state.client_id.as_ref(),
        )))
    }

    fn handle_awaiting_offer(&mut self, event: Event) -> Result<Action, ClientError> {
        match event {
            Event::PacketReceived(msg) => {
                if !self.is_ours(msg) {
                    return Ok(Action::Wait);
                }
                if msg.message_type() != MessageType::Offer {
                    tracing::debug!("Not a DHCP OFFER message: {}", msg.message_type());
                    return Ok(Action::Wait);
                }

                let offer = Offer {
                    offered_ip: msg.yiaddr(),
                    server_ip: msg.server_address(),
                };
                tracing::info!(
                    "Received DHCP OFFER from server {}, offered IP: {}",
                    offer.server_ip,
                    offer.offered_ip
                );
                if self.state.requested_ip == Some(offer.offered_ip) {
                    tracing::info!("Server offered the requested address");
                }

                self.state.offer = Some(offer);
                self.transition(Phase::RequestSent);
                let action = self.send_request()?;
                self.transition(Phase::AwaitingAck);
                Ok(action)
            }
            Event::Timeout => {
                if self.exhausted(self.state.discover_attempts) {
                    return Err(ClientError::RetriesExhausted {
                        phase: Phase::AwaitingOffer.name(),
                        attempts: self.state.discover_attempts,
                    });
                }
                tracing::warn!("DISCOVER timeout, resending DISCOVER");
                Ok(self.send_discover())
            }
            Event::TransportFailed(e) => Err(ClientError::Transport(e)),
        }
    }

    fn handle_awaiting_ack(&mut self, event: Event) -> Result<Action, ClientError> {
        match event {
            Event::PacketReceived(msg) => {
                if !self.is_ours(msg) {
                    return Ok(Action::Wait);
                }
                match msg.message_type() {
                    MessageType::Ack => {
                        let lease = Lease::from_ack(msg);
                        tracing::info!("DHCP Bind Successful! Leased IP: {}", lease.address);
                        self.transition(Phase::Leased);
                        Ok(Action::Finish(Outcome::Leased(lease)))
                    }
                    MessageType::Nak => {
                        tracing::warn!("Received DHCP NAK from {}", msg.server_address());
                        self.transition(Phase::Nacked);
                        Ok(Action::Finish(Outcome::Nacked(msg.clone())))
                    }
                    other => {
                        // Leftovers from the offer phase, e.g. a second OFFER.
                        tracing::debug!("Ignoring {} while awaiting ACK", other);
                        Ok(Action::Wait)
                    }
                }
            }
            Event::Timeout => {
                if self.exhausted(self.state.request_attempts) {
                    return Err(ClientError::RetriesExhausted {
                        phase: Phase::AwaitingAck.name(),
                        attempts: self.state.request_attempts,
                    });
                }
                tracing::warn!("Timeout waiting for DHCP ACK, retrying request");
                self.send_request()
            }
            Event::TransportFailed(e) => Err(ClientError::Transport(e)),
        }
    }
}

impl DhcpStateMachine for DhcpV4Handler {
    fn start(&mut self) -> Result<Action, ClientError> {
        if self.state.phase != Phase::Idle {
            return Err(ClientError::Critical(format!(
                "Exchange already started ({})",
                self.state.phase.name()
            )));
        }
        self.transition(Phase::AwaitingOffer);
        Ok(self.send_discover())
    }

    fn state_name(&self) -> &'static str {
        self.state.phase.name()
    }

    fn handle_event(&mut self, event: Event) -> Result<Action, ClientError> {
        tracing::trace!("Handling event {:?} in state {:?}", event, self.state.phase);
        let result = match self.state.phase {
            Phase::Idle => Err(ClientError::Critical("Exchange not started".to_string())),
            Phase::AwaitingOffer => self.handle_awaiting_offer(event),
            Phase::AwaitingAck => self.handle_awaiting_ack(event),
            Phase::RequestSent => Err(ClientError::Critical(
                "Event delivered while the request was being built".to_string(),
            )),
            phase => Err(ClientError::Critical(format!(
                "Exchange already finished ({})",
                phase.name()
            ))),
        };
        if result.is_err() && !self.state.phase.is_terminal() {
            self.transition(Phase::Failed);
        }
        result
    }
}
