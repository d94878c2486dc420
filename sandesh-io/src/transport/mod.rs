//! Broker transport abstraction
//!
//! The pipeline talks to the broker only through [`BrokerTransport`]:
//!
//! - [`MqttTransport`]: MQTT client (plain TCP or TLS) with its network I/O on
//!   a dedicated thread
//! - [`MockBroker`]: in-process double for tests

use crate::error::Result;
use std::path::PathBuf;
use std::time::Duration;

mod mock;
mod mqtt;

pub use mock::{MockBroker, PublishedMessage};
pub use mqtt::MqttTransport;

/// Delivery guarantee requested for a publish or subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
}

/// Everything a transport needs for the broker handshake
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    /// PEM CA certificate; TLS when set
    pub tls_ca_file: Option<PathBuf>,
    /// Largest packet sent or accepted, in bytes
    pub max_packet_size: usize,
    /// Topics to subscribe to once the handshake succeeds
    pub subscriptions: Vec<String>,
}

/// Message delivered by the broker on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Full broker topic (namespace included)
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Link status reported by [`BrokerTransport::poll`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Connected,
    NotConnected,
}

/// Transport trait for broker communication
pub trait BrokerTransport: Send {
    /// Perform the broker handshake and subscribe. Blocks for at most
    /// `params.connect_timeout`.
    fn connect(&mut self, params: &ConnectParams) -> Result<()>;

    /// Close the session
    fn disconnect(&mut self) -> Result<()>;

    /// Queue a publish on the local transport buffer. Never blocks.
    fn publish(&mut self, topic: &str, payload: &[u8], qos: Qos, retained: bool) -> Result<()>;

    /// Service the link without blocking: move inbound messages into
    /// `inbound` and report whether the session is still up.
    fn poll(&mut self, inbound: &mut Vec<InboundMessage>) -> LinkStatus;

    /// Discard the current client object and prepare a fresh one for the
    /// given identity (after an eviction). Does not connect.
    fn reinitialise(&mut self, client_id: &str);
}
