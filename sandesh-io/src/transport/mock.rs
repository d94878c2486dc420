//! Mock broker for testing

use super::{BrokerTransport, ConnectParams, InboundMessage, LinkStatus, Qos};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// One publish recorded by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: Qos,
    pub retained: bool,
}

/// In-process broker double
///
/// Clones share state, so a test keeps one handle while the pipeline owns
/// another.
#[derive(Clone, Default)]
pub struct MockBroker {
    inner: Arc<Mutex<MockBrokerInner>>,
}

#[derive(Default)]
struct MockBrokerInner {
    link_up: bool,
    refuse_connect: bool,
    refuse_publish: bool,
    client_id: Option<String>,
    username: Option<String>,
    subscriptions: Vec<String>,
    last_connect: Option<ConnectParams>,
    published: Vec<PublishedMessage>,
    inbound: VecDeque<InboundMessage>,
    connects: u32,
    reinitialisations: Vec<String>,
}

impl MockBroker {
    /// Create a new mock broker
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `connect` calls fail
    pub fn refuse_connections(&self, refuse: bool) {
        self.inner.lock().refuse_connect = refuse;
    }

    /// Make subsequent `publish` calls fail (full local buffer)
    pub fn refuse_publishes(&self, refuse: bool) {
        self.inner.lock().refuse_publish = refuse;
    }

    /// Drop the link as if another client took our identity
    pub fn evict(&self) {
        self.inner.lock().link_up = false;
    }

    /// Queue a message to be delivered on the next poll
    pub fn inject(&self, topic: &str, payload: &[u8]) {
        let mut inner = self.inner.lock();
        inner.inbound.push_back(InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }

    /// All publishes so far
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.inner.lock().published.clone()
    }

    /// Publishes on one broker topic
    pub fn published_on(&self, topic: &str) -> Vec<PublishedMessage> {
        self.inner
            .lock()
            .published
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Clear recorded publishes
    pub fn clear_published(&self) {
        self.inner.lock().published.clear();
    }

    pub fn is_link_up(&self) -> bool {
        self.inner.lock().link_up
    }

    pub fn client_id(&self) -> Option<String> {
        self.inner.lock().client_id.clone()
    }

    pub fn username(&self) -> Option<String> {
        self.inner.lock().username.clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.lock().subscriptions.clone()
    }

    /// Parameters of the last successful handshake
    pub fn last_connect(&self) -> Option<ConnectParams> {
        self.inner.lock().last_connect.clone()
    }

    /// Successful handshakes so far
    pub fn connect_count(&self) -> u32 {
        self.inner.lock().connects
    }

    /// Client ids passed to `reinitialise`
    pub fn reinitialisations(&self) -> Vec<String> {
        self.inner.lock().reinitialisations.clone()
    }
}

impl BrokerTransport for MockBroker {
    fn connect(&mut self, params: &ConnectParams) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.refuse_connect {
            return Err(Error::Connect(format!(
                "{}:{} refused connection",
                params.host, params.port
            )));
        }
        inner.link_up = true;
        inner.connects += 1;
        inner.client_id = Some(params.client_id.clone());
        inner.username = Some(params.username.clone());
        inner.subscriptions = params.subscriptions.clone();
        inner.last_connect = Some(params.clone());
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.link_up {
            return Err(Error::NotConnected);
        }
        inner.link_up = false;
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8], qos: Qos, retained: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.link_up {
            return Err(Error::NotConnected);
        }
        if inner.refuse_publish {
            return Err(Error::Transport("request queue full".to_string()));
        }
        inner.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            retained,
        });
        Ok(())
    }

    fn poll(&mut self, inbound: &mut Vec<InboundMessage>) -> LinkStatus {
        let mut inner = self.inner.lock();
        if !inner.link_up {
            return LinkStatus::NotConnected;
        }
        inbound.extend(inner.inbound.drain(..));
        LinkStatus::Connected
    }

    fn reinitialise(&mut self, client_id: &str) {
        let mut inner = self.inner.lock();
        inner.link_up = false;
        inner.client_id = None;
        inner.reinitialisations.push(client_id.to_string());
    }
}
