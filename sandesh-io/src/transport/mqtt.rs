//! MQTT transport over `rumqttc`
//!
//! The synchronous `rumqttc` client needs its event loop driven continuously,
//! so each session gets an `mqtt-io` thread that iterates the connection and
//! forwards link events through a bounded queue:
//!
//! ```text
//!  mqtt-io thread                         tick thread
//! ┌────────────────────┐   LinkEvent    ┌──────────────────────┐
//! │ connection.iter()  │ ─────────────▶ │ poll(): try_recv     │
//! │  ConnAck  → Up     │  (bounded)     │  Up/Down → link flag │
//! │  Publish  → Message│                │  Message → inbound   │
//! │  error    → Down   │                └──────────────────────┘
//! └────────────────────┘
//! ```
//!
//! The I/O thread stops at the first connection error instead of letting
//! `rumqttc` reconnect on the next iteration, so the session never comes back
//! on its own. Inbound messages that find the queue full are dropped; link
//! events always get through. A packet over `max_packet_size` also ends the
//! session; it is logged as such rather than as a broker-side drop.

use super::{BrokerTransport, ConnectParams, InboundMessage, LinkStatus, Qos};
use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError, bounded};
use rumqttc::{
    Client, ConnectReturnCode, Connection, ConnectionError, Event, MqttOptions, Packet, QoS,
    StateError, TlsConfiguration, Transport,
};
use std::fs;
use std::thread;
use std::time::Duration;

/// Pending client requests (publishes, subscribes) before `try_publish` fails
const REQUEST_CAPACITY: usize = 64;

enum LinkEvent {
    Up,
    Message(InboundMessage),
    Down(String),
}

struct ActiveSession {
    client: Client,
    events: Receiver<LinkEvent>,
    link_up: bool,
}

/// MQTT broker transport
pub struct MqttTransport {
    inbound_capacity: usize,
    session: Option<ActiveSession>,
}

impl MqttTransport {
    /// `inbound_capacity` bounds the queue between the I/O thread and `poll`
    pub fn new(inbound_capacity: usize) -> Self {
        Self {
            inbound_capacity: inbound_capacity.max(1),
            session: None,
        }
    }

    fn options(params: &ConnectParams) -> Result<MqttOptions> {
        let mut options = MqttOptions::new(&params.client_id, &params.host, params.port);
        options.set_keep_alive(params.keep_alive.max(Duration::from_secs(1)));
        options.set_credentials(&params.username, &params.password);
        options.set_clean_session(true);
        // Raw images travel as single publishes
        options.set_max_packet_size(params.max_packet_size, params.max_packet_size);

        if let Some(ca_path) = &params.tls_ca_file {
            let ca = fs::read(ca_path).map_err(|e| {
                Error::Connect(format!("cannot read CA file {}: {}", ca_path.display(), e))
            })?;
            options.set_transport(Transport::tls_with_config(TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth: None,
            }));
        }

        Ok(options)
    }

    /// Drop the current session without waiting for the I/O thread
    fn release(&mut self) {
        if let Some(session) = self.session.take() {
            // The I/O thread exits once the event loop reports the close
            close(&session.client);
        }
    }
}

/// Request a disconnect; the session is abandoned either way
fn close(client: &Client) {
    if let Err(e) = client.try_disconnect() {
        log::debug!("MQTT disconnect request not queued: {}", e);
    }
}

/// Reason reported to `poll` when the event loop fails
fn describe_failure(error: &ConnectionError, max_packet_size: usize) -> String {
    match error {
        ConnectionError::MqttState(StateError::Deserialization(e)) => {
            log::error!(
                "Inbound packet rejected ({}); limit is {} bytes, see images.max_packet_bytes",
                e,
                max_packet_size
            );
            format!("packet rejected locally: {}", e)
        }
        _ => error.to_string(),
    }
}

fn to_rumqttc(qos: Qos) -> QoS {
    match qos {
        Qos::AtMostOnce => QoS::AtMostOnce,
        Qos::AtLeastOnce => QoS::AtLeastOnce,
    }
}

/// Body of the `mqtt-io` thread
fn run_event_loop(mut connection: Connection, events: Sender<LinkEvent>, max_packet_size: usize) {
    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    if events.send(LinkEvent::Up).is_err() {
                        break;
                    }
                } else {
                    let _ = events.send(LinkEvent::Down(format!("broker refused: {:?}", ack.code)));
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                };
                match events.try_send(LinkEvent::Message(message)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(LinkEvent::Message(dropped))) => {
                        log::warn!(
                            "Inbound queue full, dropped {} byte message on {}",
                            dropped.payload.len(),
                            dropped.topic
                        );
                    }
                    Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                let _ = events.send(LinkEvent::Down("broker sent disconnect".to_string()));
                break;
            }
            Ok(_) => {}
            Err(e) => {
                let reason = describe_failure(&e, max_packet_size);
                let _ = events.send(LinkEvent::Down(reason));
                break;
            }
        }
    }
    log::debug!("MQTT I/O thread exiting");
}

impl BrokerTransport for MqttTransport {
    fn connect(&mut self, params: &ConnectParams) -> Result<()> {
        self.release();

        let options = Self::options(params)?;
        let (client, connection) = Client::new(options, REQUEST_CAPACITY);
        let (tx, rx) = bounded(self.inbound_capacity);
        let max_packet_size = params.max_packet_size;

        thread::Builder::new()
            .name("mqtt-io".to_string())
            .spawn(move || run_event_loop(connection, tx, max_packet_size))
            .map_err(|e| Error::Other(format!("Failed to spawn MQTT I/O thread: {}", e)))?;

        match rx.recv_timeout(params.connect_timeout) {
            Ok(LinkEvent::Up) => {}
            Ok(LinkEvent::Down(reason)) => {
                close(&client);
                return Err(Error::Connect(reason));
            }
            Ok(LinkEvent::Message(_)) => {
                close(&client);
                return Err(Error::Connect("message before handshake".to_string()));
            }
            Err(RecvTimeoutError::Timeout) => {
                close(&client);
                return Err(Error::Connect(format!(
                    "no answer from {}:{} within {:?}",
                    params.host, params.port, params.connect_timeout
                )));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(Error::Connect("I/O thread stopped".to_string()));
            }
        }

        for topic in &params.subscriptions {
            if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                close(&client);
                return Err(Error::Connect(format!("subscribe to {} failed: {}", topic, e)));
            }
        }

        self.session = Some(ActiveSession {
            client,
            events: rx,
            link_up: true,
        });
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        let session = self.session.take().ok_or(Error::NotConnected)?;
        session
            .client
            .try_disconnect()
            .map_err(|e| Error::Transport(e.to_string()))
    }

    fn publish(&mut self, topic: &str, payload: &[u8], qos: Qos, retained: bool) -> Result<()> {
        let session = match self.session.as_ref() {
            Some(session) if session.link_up => session,
            _ => return Err(Error::NotConnected),
        };
        session
            .client
            .try_publish(topic, to_rumqttc(qos), retained, payload.to_vec())
            .map_err(|e| Error::Transport(e.to_string()))
    }

    fn poll(&mut self, inbound: &mut Vec<InboundMessage>) -> LinkStatus {
        let Some(session) = self.session.as_mut() else {
            return LinkStatus::NotConnected;
        };

        loop {
            match session.events.try_recv() {
                Ok(LinkEvent::Message(message)) => inbound.push(message),
                Ok(LinkEvent::Up) => session.link_up = true,
                Ok(LinkEvent::Down(reason)) => {
                    log::warn!("MQTT link down: {}", reason);
                    session.link_up = false;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    session.link_up = false;
                    break;
                }
            }
        }

        if session.link_up {
            LinkStatus::Connected
        } else {
            LinkStatus::NotConnected
        }
    }

    fn reinitialise(&mut self, client_id: &str) {
        self.release();
        log::debug!("MQTT client re-armed for {}", client_id);
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn params() -> ConnectParams {
        ConnectParams {
            host: "127.0.0.1".to_string(),
            port: 1,
            client_id: "Simulator_Channel0".to_string(),
            username: "simtor0".to_string(),
            password: String::new(),
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_millis(500),
            tls_ca_file: None,
            max_packet_size: 1024 * 1024,
            subscriptions: vec!["sim/0/in/control".to_string()],
        }
    }

    #[test]
    fn test_idle_transport_is_not_connected() {
        let mut transport = MqttTransport::new(16);
        let mut inbound = Vec::new();
        assert_eq!(transport.poll(&mut inbound), LinkStatus::NotConnected);
        assert!(matches!(
            transport.publish("t", b"x", Qos::AtMostOnce, false),
            Err(Error::NotConnected)
        ));
        assert!(matches!(transport.disconnect(), Err(Error::NotConnected)));
    }

    #[test]
    fn test_missing_ca_file_fails_connect() {
        let mut transport = MqttTransport::new(16);
        let mut p = params();
        p.tls_ca_file = Some(PathBuf::from("/nonexistent/cacert.pem"));
        assert!(matches!(transport.connect(&p), Err(Error::Connect(_))));
    }

    #[test]
    fn test_oversized_packet_reported_apart_from_link_loss() {
        let oversized = ConnectionError::MqttState(StateError::Deserialization(
            rumqttc::mqttbytes::Error::PayloadSizeLimitExceeded(32 * 1024 * 1024),
        ));
        assert!(describe_failure(&oversized, 1024).starts_with("packet rejected locally"));

        let reset = ConnectionError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(!describe_failure(&reset, 1024).starts_with("packet rejected locally"));
    }

    #[test]
    fn test_close_after_event_loop_gone() {
        let options = MqttTransport::options(&params()).unwrap();
        let (client, connection) = Client::new(options, 1);
        drop(connection);
        // Request queue is closed; the failure is logged, not raised
        assert!(client.try_disconnect().is_err());
        close(&client);
    }

    #[test]
    fn test_unreachable_broker_fails_connect() {
        let mut transport = MqttTransport::new(16);
        assert!(matches!(transport.connect(&params()), Err(Error::Connect(_))));
        let mut inbound = Vec::new();
        assert_eq!(transport.poll(&mut inbound), LinkStatus::NotConnected);
    }
}
