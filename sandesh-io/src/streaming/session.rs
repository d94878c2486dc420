//! Broker session identity and connection state
//!
//! # State machine
//!
//! ```text
//!                 connect()                 handshake ok
//! Disconnected ─────────────▶ Connecting ─────────────────▶ Connected
//!      ▲                          │                            │
//!      │        handshake failed  │                            │
//!      ├──────────────────────────┘                            │
//!      │          disconnect() / eviction detected by poll      │
//!      └────────────────────────────────────────────────────────┘
//! ```
//!
//! Eviction (the broker drops us because another process connected with the
//! same client identity) flips the state to `Disconnected` but never triggers
//! a reconnect: silently reconnecting would evict the other process, which
//! would then evict us again.

use std::fmt;

/// Fixed client identity prefix; the instance id is appended
const CLIENT_ID_PREFIX: &str = "Simulator_Channel";
/// Fixed username prefix; the instance id is appended
const USERNAME_PREFIX: &str = "simtor";

/// Connection state of the broker session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Everything derived from the instance id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceIdentity {
    instance_id: u32,
}

impl InstanceIdentity {
    pub fn new(instance_id: u32) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    /// Broker client identity, e.g. `Simulator_Channel3`
    pub fn client_id(&self) -> String {
        format!("{}{}", CLIENT_ID_PREFIX, self.instance_id)
    }

    /// Credential username, e.g. `simtor3`
    pub fn username(&self) -> String {
        format!("{}{}", USERNAME_PREFIX, self.instance_id)
    }

    /// Topic namespace prefix, e.g. `sim/3/`
    pub fn topic_prefix(&self) -> String {
        format!("sim/{}/", self.instance_id)
    }

    /// Full broker topic for a local topic name
    pub fn namespaced(&self, topic: &str) -> String {
        format!("{}{}", self.topic_prefix(), topic)
    }

    /// Local topic name for a broker topic, if it is inside our namespace
    pub fn strip_namespace<'a>(&self, topic: &'a str) -> Option<&'a str> {
        let prefix = self.topic_prefix();
        topic.strip_prefix(prefix.as_str())
    }
}

/// Session state plus identity
///
/// Created once per pipeline and survives reconnects.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    identity: InstanceIdentity,
    /// Identity in use by the live session (may lag `identity` until reconnect)
    active: Option<InstanceIdentity>,
    evictions: u64,
}

impl Session {
    pub fn new(instance_id: u32) -> Self {
        Self {
            state: SessionState::Disconnected,
            identity: InstanceIdentity::new(instance_id),
            active: None,
            evictions: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Identity the next `connect` will use
    pub fn identity(&self) -> &InstanceIdentity {
        &self.identity
    }

    /// Identity used for topic namespacing: the live one while connected
    pub fn routing_identity(&self) -> &InstanceIdentity {
        self.active.as_ref().unwrap_or(&self.identity)
    }

    /// Change the instance id. Takes effect on the next `connect`.
    ///
    /// Returns true if a live session still uses the old identity.
    pub fn set_instance_id(&mut self, instance_id: u32) -> bool {
        self.identity = InstanceIdentity::new(instance_id);
        self.is_connected() && self.active.as_ref() != Some(&self.identity)
    }

    /// Enter `Connecting`; returns the identity to connect with
    pub fn begin_connect(&mut self) -> InstanceIdentity {
        self.state = SessionState::Connecting;
        self.active = None;
        self.identity.clone()
    }

    /// Handshake succeeded
    pub fn connected(&mut self, identity: InstanceIdentity) {
        self.state = SessionState::Connected;
        self.active = Some(identity);
    }

    /// Handshake failed or explicit disconnect
    pub fn disconnected(&mut self) {
        self.state = SessionState::Disconnected;
        self.active = None;
    }

    /// Poll reported a dead link. Returns true only on the transition out
    /// of `Connected`, so an eviction is acted on exactly once.
    pub fn observe_link_lost(&mut self) -> bool {
        if self.state != SessionState::Connected {
            return false;
        }
        self.disconnected();
        self.evictions += 1;
        true
    }

    /// Number of evictions detected since start-up
    pub fn evictions(&self) -> u64 {
        self.evictions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_derivation() {
        let id = InstanceIdentity::new(3);
        assert_eq!(id.client_id(), "Simulator_Channel3");
        assert_eq!(id.username(), "simtor3");
        assert_eq!(id.topic_prefix(), "sim/3/");
        assert_eq!(id.namespaced("out/general"), "sim/3/out/general");
        assert_eq!(id.strip_namespace("sim/3/in/control"), Some("in/control"));
        assert_eq!(id.strip_namespace("sim/4/in/control"), None);
    }

    #[test]
    fn test_connect_cycle() {
        let mut session = Session::new(0);
        assert_eq!(session.state(), SessionState::Disconnected);
        let identity = session.begin_connect();
        assert_eq!(session.state(), SessionState::Connecting);
        session.connected(identity);
        assert!(session.is_connected());
        session.disconnected();
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_link_lost_acts_once() {
        let mut session = Session::new(0);
        let identity = session.begin_connect();
        session.connected(identity);
        assert!(session.observe_link_lost());
        assert!(!session.observe_link_lost());
        assert_eq!(session.evictions(), 1);
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_instance_change_applies_on_reconnect() {
        let mut session = Session::new(1);
        let identity = session.begin_connect();
        session.connected(identity);

        assert!(session.set_instance_id(2));
        assert_eq!(session.routing_identity().instance_id(), 1);
        assert_eq!(session.identity().instance_id(), 2);

        session.disconnected();
        let identity = session.begin_connect();
        assert_eq!(identity.client_id(), "Simulator_Channel2");
        session.connected(identity);
        assert_eq!(session.routing_identity().topic_prefix(), "sim/2/");
    }

    #[test]
    fn test_instance_change_while_disconnected_is_silent() {
        let mut session = Session::new(1);
        assert!(!session.set_instance_id(5));
        assert_eq!(session.routing_identity().instance_id(), 5);
    }
}
