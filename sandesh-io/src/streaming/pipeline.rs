//! Telemetry pipeline: the one service object between producers, the broker
//! and the simulation.
//!
//! # Ownership
//!
//! The composition root ([`SandeshApp`](crate::app::SandeshApp)) builds
//! exactly one pipeline per process and hands `&mut` access to producers and
//! the tick loop. Everything runs on the tick thread.
//!
//! # Per-tick work
//!
//! ```text
//! tick(step)
//!   ├─ poll transport (never blocks)
//!   ├─ route inbound: meter → strip namespace → router → rover
//!   ├─ eviction check: Connected + link down → Disconnected, re-arm client
//!   ├─ publish raw requests queued by handlers
//!   ├─ flush cycle if step is due
//!   └─ metering window boundary
//! ```

use crate::config::{BrokerConfig, Config};
use crate::error::Result;
use crate::rover::RoverControl;
use crate::streaming::compression::Compression;
use crate::streaming::flush::{FlushReport, FlushScheduler, FlushTarget};
use crate::streaming::messages::Envelope;
use crate::streaming::metering::Meter;
use crate::streaming::outbox::{Admission, TopicOutbox, TopicPolicy};
use crate::streaming::router::{CommandContext, InboundRouter, RawPublish, RouteOutcome};
use crate::streaming::session::{InstanceIdentity, Session, SessionState};
use crate::streaming::wire::{PayloadCodec, WireFormat};
use crate::transport::{BrokerTransport, ConnectParams, InboundMessage, LinkStatus};
use serde_json::Value;
use std::time::Duration;

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Outcome per inbound message, in arrival order
    pub routed: Vec<RouteOutcome>,
    /// Eviction detected on this tick
    pub evicted: bool,
    /// Raw publishes sent
    pub raw_published: usize,
    /// Present when a flush cycle ran
    pub flush: Option<FlushReport>,
    /// Metering window closed on this tick
    pub window_rotated: bool,
}

/// Telemetry publish pipeline
pub struct TelemetryPipeline {
    transport: Box<dyn BrokerTransport>,
    router: InboundRouter,
    outbox: TopicOutbox,
    session: Session,
    scheduler: FlushScheduler,
    meter: Meter,

    send_codec: PayloadCodec,
    receive_codec: PayloadCodec,
    compression_level: u32,

    broker: BrokerConfig,
    max_packet_size: usize,
    log_outbound: bool,
    log_inbound: bool,

    inbound: Vec<InboundMessage>,
    raw: Vec<RawPublish>,
}

impl TelemetryPipeline {
    /// Build the pipeline. Starts `Disconnected`; nothing touches the
    /// network until [`connect`](Self::connect).
    pub fn new(config: &Config, transport: Box<dyn BrokerTransport>, router: InboundRouter) -> Self {
        let enc = &config.encoding;
        Self {
            transport,
            router,
            outbox: TopicOutbox::new(),
            session: Session::new(config.broker.instance_id),
            scheduler: FlushScheduler::new(config.pipeline.flush_interval_ticks),
            meter: Meter::new(config.pipeline.tick_rate_hz),
            send_codec: PayloadCodec::new(
                enc.send_format,
                enc.send_compression,
                enc.compression_level,
            ),
            receive_codec: PayloadCodec::new(
                enc.receive_format,
                enc.receive_compression,
                enc.compression_level,
            ),
            compression_level: enc.compression_level,
            broker: config.broker.clone(),
            max_packet_size: config.images.max_packet_bytes,
            log_outbound: config.pipeline.log_outbound,
            log_inbound: config.pipeline.log_inbound,
            inbound: Vec::new(),
            raw: Vec::new(),
        }
    }

    /// Queue `{type: kind, data}` for `topic`. Never blocks; drops are
    /// governed by the topic's policy.
    pub fn send(&mut self, topic: &str, kind: &str, data: Value) -> Admission {
        let connected = self.session.is_connected();
        let admission = self.outbox.push(topic, Envelope::new(kind, data), connected);
        match admission {
            Admission::Queued => {}
            Admission::DroppedDisconnected => {
                log::trace!("Dropped `{}` for {} (disconnected)", kind, topic)
            }
            Admission::DroppedFull => log::debug!("Dropped `{}` for {} (backlog full)", kind, topic),
        }
        admission
    }

    /// Set the delivery policy of a topic; the last call wins
    pub fn override_topic_settings(&mut self, topic: &str, policy: TopicPolicy) {
        log::debug!("Policy for {}: {:?}", topic, policy);
        self.outbox.set_policy(topic, policy);
    }

    /// Connect to the broker and subscribe to the inbound topics, using the
    /// identity derived from the current instance id.
    ///
    /// On failure the session stays `Disconnected` and the error is returned;
    /// no retry is scheduled.
    pub fn connect(&mut self, address: &str, port: u16) -> Result<()> {
        if self.session.is_connected() {
            self.disconnect();
        }

        let identity = self.session.begin_connect();
        let params = self.connect_params(address, port, &identity);
        log::info!(
            "Connecting to {}:{} as {} ({})",
            address,
            port,
            params.client_id,
            if params.tls_ca_file.is_some() { "tls" } else { "plain" }
        );

        match self.transport.connect(&params) {
            Ok(()) => {
                log::info!(
                    "Connected, subscribed to {}",
                    params.subscriptions.join(", ")
                );
                self.session.connected(identity);
                Ok(())
            }
            Err(e) => {
                log::error!("Connect to {}:{} failed: {}", address, port, e);
                self.session.disconnected();
                Err(e)
            }
        }
    }

    fn connect_params(&self, address: &str, port: u16, identity: &InstanceIdentity) -> ConnectParams {
        ConnectParams {
            host: address.to_string(),
            port,
            client_id: identity.client_id(),
            username: identity.username(),
            password: self.broker.password.clone(),
            keep_alive: Duration::from_secs(self.broker.keep_alive_secs),
            connect_timeout: Duration::from_millis(self.broker.connect_timeout_ms),
            tls_ca_file: self.broker.tls_ca_file(),
            max_packet_size: self.max_packet_size,
            subscriptions: InboundRouter::subscriptions()
                .iter()
                .map(|topic| identity.namespaced(topic))
                .collect(),
        }
    }

    /// Close the session. A failed close is logged; the local state is
    /// `Disconnected` afterwards regardless.
    pub fn disconnect(&mut self) {
        if let Err(e) = self.transport.disconnect() {
            log::warn!("Disconnect did not complete cleanly: {}", e);
        }
        if self.session.state() != SessionState::Disconnected {
            log::info!("Disconnected from broker");
        }
        self.session.disconnected();
    }

    /// Per-tick processing. Never fails; telemetry faults are logged.
    pub fn tick(&mut self, step: u64, rover: &mut dyn RoverControl) -> TickReport {
        let mut report = TickReport::default();

        let status = self.transport.poll(&mut self.inbound);
        report.routed = self.route_inbound(rover);

        if status == LinkStatus::NotConnected && self.session.observe_link_lost() {
            let client_id = self.session.identity().client_id();
            log::warn!("Lost broker session as {}; not reconnecting", client_id);
            self.transport.reinitialise(&client_id);
            report.evicted = true;
        }

        report.raw_published = self.publish_raw();

        if self.scheduler.is_due(step) {
            let codec = self.send_codec;
            let target = FlushTarget {
                transport: &mut *self.transport,
                identity: self.session.routing_identity(),
                connected: self.session.is_connected(),
                log_payloads: self.log_outbound,
            };
            report.flush = Some(self.scheduler.flush(&mut self.outbox, codec, target, &mut self.meter));
        }

        report.window_rotated = self.meter.end_tick(step);
        if report.window_rotated {
            log::debug!(
                "Throughput: sent {} B/s ({} msg/s), received {} B/s ({} msg/s)",
                self.meter.bytes_sent_last_second,
                self.meter.messages_sent_last_second,
                self.meter.bytes_received_last_second,
                self.meter.messages_received_last_second
            );
        }

        report
    }

    fn route_inbound(&mut self, rover: &mut dyn RoverControl) -> Vec<RouteOutcome> {
        let mut inbound = std::mem::take(&mut self.inbound);
        let mut outcomes = Vec::with_capacity(inbound.len());

        for message in inbound.drain(..) {
            self.meter.record_received(message.payload.len());
            if self.log_inbound {
                log::info!("Received {} ({} bytes)", message.topic, message.payload.len());
            } else {
                log::trace!("Received {} ({} bytes)", message.topic, message.payload.len());
            }

            let Some(local) = self.session.routing_identity().strip_namespace(&message.topic) else {
                log::debug!("Ignoring {} (outside namespace)", message.topic);
                outcomes.push(RouteOutcome::Discarded);
                continue;
            };

            let mut ctx = CommandContext {
                rover: &mut *rover,
                raw: &mut self.raw,
            };
            outcomes.push(self.router.route(local, &message.payload, self.receive_codec, &mut ctx));
        }

        self.inbound = inbound;
        outcomes
    }

    /// Send handler-requested raw payloads. Only possible while connected.
    pub fn publish_raw(&mut self) -> usize {
        let mut sent = 0;
        for request in std::mem::take(&mut self.raw) {
            if !self.session.is_connected() {
                log::warn!("Not connected, {} not published", request.topic);
                continue;
            }
            let topic = self.session.routing_identity().namespaced(&request.topic);
            match self
                .transport
                .publish(&topic, &request.payload, request.qos, request.retained)
            {
                Ok(()) => {
                    log::info!("Published {} bytes to {}", request.payload.len(), topic);
                    self.meter.record_sent(request.payload.len(), 0);
                    sent += 1;
                }
                Err(e) => log::warn!("Publish to {} failed: {}", topic, e),
            }
        }
        sent
    }

    /// Queue a raw publish (no batch, codec or compression); sent on the
    /// next tick
    pub fn queue_raw(&mut self, request: RawPublish) {
        self.raw.push(request);
    }

    /// Switch the send codec and compression; applies from the next flush
    /// cycle
    pub fn set_send_encoding(&mut self, format: WireFormat, compression: Compression) {
        log::info!("Send encoding: {:?} / {:?}", format, compression);
        self.send_codec = PayloadCodec::new(format, compression, self.compression_level);
    }

    /// Switch the receive codec and compression; applies to the next
    /// inbound message
    pub fn set_receive_encoding(&mut self, format: WireFormat, compression: Compression) {
        log::info!("Receive encoding: {:?} / {:?}", format, compression);
        self.receive_codec = PayloadCodec::new(format, compression, self.compression_level);
    }

    /// Change the instance id; identity, credentials and namespace switch on
    /// the next `connect`
    pub fn set_instance_id(&mut self, instance_id: u32) {
        if self.session.set_instance_id(instance_id) {
            log::warn!(
                "Instance id changed to {} while connected; reconnect to apply",
                instance_id
            );
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn meter(&self) -> &Meter {
        &self.meter
    }

    pub fn outbox(&self) -> &TopicOutbox {
        &self.outbox
    }

    pub fn send_codec(&self) -> PayloadCodec {
        self.send_codec
    }

    pub fn receive_codec(&self) -> PayloadCodec {
        self.receive_codec
    }

    /// Release the broker session. Consumes the pipeline, so nothing can be
    /// sent afterwards.
    pub fn cleanup(mut self) {
        if self.session.is_connected() {
            self.disconnect();
        }
        log::info!(
            "Pipeline closed: sent {} messages ({} bytes), received {} messages ({} bytes), {} pending dropped",
            self.meter.messages_sent_total,
            self.meter.bytes_sent_total,
            self.meter.messages_received_total,
            self.meter.bytes_received_total,
            self.outbox.total_pending()
        );
    }
}
