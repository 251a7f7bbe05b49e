use crate::{error::ClientError, mac::MacAddr, v4::options::ClientId};
use clap::Parser;
use std::{net::Ipv4Addr, time::Duration};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Requested IPv4 address to hint in the DISCOVER (option 50)
    #[arg(long = "ip4", value_name = "IPV4")]
    pub requested_ip: Option<Ipv4Addr>,

    /// The network interface to bind to (e.g., 'eth0'); all interfaces if omitted
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Client hardware address (e.g., '02:1b:2c:3d:4e:5f'); random if omitted
    #[arg(long)]
    pub mac: Option<String>,

    /// Seconds to wait for a reply before resending (at least 1)
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Give up after this many sends in one phase (at least 1); retries forever if omitted
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: Option<u32>,

    /// Abort the whole exchange after this many seconds
    #[arg(long)]
    pub deadline: Option<u64>,

    /// Send a client identifier (option 61) of the form '<PREFIX>-<MAC>'
    #[arg(long, value_name = "PREFIX")]
    pub client_id_prefix: Option<String>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub interface: Option<String>,
    pub mac_address: MacAddr,
    pub requested_ip: Option<Ipv4Addr>,
    pub client_port: u16,
    pub server_port: u16,
    pub broadcast_address: Ipv4Addr,
    pub retry_timeout: Duration,
    pub max_attempts: Option<u32>,
    pub deadline: Option<Duration>,
    pub client_id_prefix: Option<String>,
}

impl ClientConfig {
    pub fn new(mac_address: MacAddr) -> Self {
        Self {
            interface: None,
            mac_address,
            requested_ip: None,
            client_port: 68,
            server_port: 67,
            broadcast_address: Ipv4Addr::BROADCAST,
            retry_timeout: Duration::from_secs(5),
            max_attempts: None,
            deadline: None,
            client_id_prefix: None,
        }
    }

    pub fn from_args(args: &Args) -> Result<Self, ClientError> {
        let mac_address = match &args.mac {
            Some(mac) => mac.parse::<MacAddr>()?,
            None => MacAddr::random(),
        };
        Ok(Self {
            interface: args.interface.clone(),
            requested_ip: args.requested_ip,
            retry_timeout: Duration::from_secs(args.timeout),
            max_attempts: args.max_attempts,
            deadline: args.deadline.map(Duration::from_secs),
            client_id_prefix: args.client_id_prefix.clone(),
            ..Self::new(mac_address)
        })
    }

    /// The option 61 value for this client, if one is configured.
    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id_prefix
            .as_deref()
            .map(|prefix| ClientId::new(prefix, &self.mac_address))
    }
}
