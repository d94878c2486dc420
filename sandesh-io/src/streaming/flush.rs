//! Flush cycle: drain every non-empty topic into one batch per topic.
//!
//! For each topic with pending envelopes:
//!
//! | Session     | Policy                  | Action                                |
//! |-------------|-------------------------|---------------------------------------|
//! | connected   | any                     | encode, compress, publish, clear      |
//! | down        | `wait_for_connection=0` | clear (best-effort telemetry dropped) |
//! | down        | `wait_for_connection=1` | hold for a later cycle                |
//!
//! Network traffic is at most one publish per topic per cycle regardless of
//! how many envelopes producers queued.

use crate::streaming::messages::Batch;
use crate::streaming::metering::Meter;
use crate::streaming::outbox::TopicOutbox;
use crate::streaming::session::InstanceIdentity;
use crate::streaming::wire::PayloadCodec;
use crate::transport::{BrokerTransport, Qos};
use std::time::{SystemTime, UNIX_EPOCH};

/// Batch timestamp source: nanoseconds since the UNIX epoch, never going
/// backwards within a process even if the wall clock does.
#[derive(Debug, Default)]
pub struct BatchClock {
    last: u64,
}

impl BatchClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&mut self) -> u64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        self.last = self.last.max(wall);
        self.last
    }
}

/// What one flush cycle did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Batches handed to the transport
    pub batches_published: usize,
    /// Envelopes inside those batches
    pub envelopes_published: usize,
    /// Envelopes discarded (disconnected best-effort topics, failed encodes
    /// or publishes)
    pub envelopes_dropped: usize,
    /// Envelopes left pending for a later cycle
    pub envelopes_held: usize,
}

/// Where a flush cycle sends its batches
pub struct FlushTarget<'a> {
    pub transport: &'a mut dyn BrokerTransport,
    pub identity: &'a InstanceIdentity,
    pub connected: bool,
    pub log_payloads: bool,
}

/// Decides which ticks flush and runs the cycle
#[derive(Debug)]
pub struct FlushScheduler {
    interval_ticks: u64,
    clock: BatchClock,
}

impl FlushScheduler {
    /// Flush every `interval_ticks` ticks (clamped to at least 1)
    pub fn new(interval_ticks: u32) -> Self {
        Self {
            interval_ticks: u64::from(interval_ticks.max(1)),
            clock: BatchClock::new(),
        }
    }

    pub fn interval_ticks(&self) -> u64 {
        self.interval_ticks
    }

    pub fn is_due(&self, step: u64) -> bool {
        step % self.interval_ticks == 0
    }

    /// Run one flush cycle with a codec captured by the caller for the
    /// whole cycle
    pub fn flush(
        &mut self,
        outbox: &mut TopicOutbox,
        codec: PayloadCodec,
        target: FlushTarget<'_>,
        meter: &mut Meter,
    ) -> FlushReport {
        let mut report = FlushReport::default();

        let mut topics = outbox.non_empty_topics();
        topics.sort();

        for topic in topics {
            let policy = outbox.policy(&topic);

            if !target.connected {
                if policy.wait_for_connection {
                    report.envelopes_held += outbox.pending(&topic).len();
                } else {
                    let dropped = outbox.clear(&topic);
                    log::trace!("Dropped {} envelopes for {} (disconnected)", dropped, topic);
                    report.envelopes_dropped += dropped;
                }
                continue;
            }

            let batch = Batch {
                time: self.clock.now(),
                msgs: outbox.take(&topic),
            };
            let count = batch.len();

            let payload = match codec.encode_batch(&batch) {
                Ok(payload) => payload,
                Err(e) => {
                    log::error!("Failed to encode batch for {}: {}", topic, e);
                    report.envelopes_dropped += count;
                    continue;
                }
            };

            let broker_topic = target.identity.namespaced(&topic);
            match target
                .transport
                .publish(&broker_topic, &payload, Qos::AtMostOnce, policy.retained)
            {
                Ok(()) => {
                    if target.log_payloads {
                        log::info!(
                            "Sent {} ({} envelopes, {} bytes)",
                            broker_topic,
                            count,
                            payload.len()
                        );
                    } else {
                        log::trace!(
                            "Sent {} ({} envelopes, {} bytes)",
                            broker_topic,
                            count,
                            payload.len()
                        );
                    }
                    meter.record_sent(payload.len(), count);
                    report.batches_published += 1;
                    report.envelopes_published += count;
                }
                Err(e) => {
                    log::warn!("Publish to {} failed: {}", broker_topic, e);
                    if policy.wait_for_connection {
                        outbox.restore(&topic, batch.msgs);
                        report.envelopes_held += count;
                    } else {
                        report.envelopes_dropped += count;
                    }
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::compression::Compression;
    use crate::streaming::messages::Envelope;
    use crate::streaming::outbox::TopicPolicy;
    use crate::streaming::wire::WireFormat;
    use crate::transport::{ConnectParams, MockBroker};
    use serde_json::json;
    use std::time::Duration;

    fn connected_broker() -> MockBroker {
        let mut broker = MockBroker::new();
        let params = ConnectParams {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "Simulator_Channel0".to_string(),
            username: "simtor0".to_string(),
            password: String::new(),
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(1),
            tls_ca_file: None,
            max_packet_size: 1024 * 1024,
            subscriptions: Vec::new(),
        };
        broker.connect(&params).unwrap();
        broker
    }

    fn json_codec() -> PayloadCodec {
        PayloadCodec::new(WireFormat::Json, Compression::None, 9)
    }

    #[test]
    fn test_clock_never_goes_backwards() {
        let mut clock = BatchClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000_000_000);
    }

    #[test]
    fn test_is_due() {
        let every = FlushScheduler::new(1);
        assert!(every.is_due(0) && every.is_due(7));
        let third = FlushScheduler::new(3);
        assert!(third.is_due(3));
        assert!(!third.is_due(4));
        assert_eq!(FlushScheduler::new(0).interval_ticks(), 1);
    }

    #[test]
    fn test_one_publish_per_topic() {
        let mut broker = connected_broker();
        let mut outbox = TopicOutbox::new();
        for i in 0..5 {
            outbox.push("out/general", Envelope::new("Robot", json!(i)), true);
        }
        outbox.push("out/arm", Envelope::new("arm", json!({})), true);

        let identity = InstanceIdentity::new(0);
        let mut meter = Meter::new(60);
        let mut scheduler = FlushScheduler::new(1);
        let report = scheduler.flush(
            &mut outbox,
            json_codec(),
            FlushTarget {
                transport: &mut broker,
                identity: &identity,
                connected: true,
                log_payloads: false,
            },
            &mut meter,
        );

        assert_eq!(report.batches_published, 2);
        assert_eq!(report.envelopes_published, 6);
        assert_eq!(outbox.total_pending(), 0);
        assert_eq!(broker.published_on("sim/0/out/general").len(), 1);
        assert_eq!(meter.messages_sent_total, 2);
        assert_eq!(meter.envelopes_sent_total, 6);

        let batch = json_codec()
            .decode_batch(&broker.published_on("sim/0/out/general")[0].payload)
            .unwrap();
        let order: Vec<i64> = batch.msgs.iter().map(|m| m.data().as_i64().unwrap()).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_disconnected_cycle_drops_or_holds() {
        let mut broker = MockBroker::new();
        let mut outbox = TopicOutbox::new();
        outbox.set_policy("out/restart", TopicPolicy::retained_announcement());
        outbox.push("out/restart", Envelope::new("restart", json!({})), false);

        let identity = InstanceIdentity::new(0);
        let mut meter = Meter::new(60);
        let report = FlushScheduler::new(1).flush(
            &mut outbox,
            json_codec(),
            FlushTarget {
                transport: &mut broker,
                identity: &identity,
                connected: false,
                log_payloads: false,
            },
            &mut meter,
        );

        assert_eq!(report.envelopes_held, 1);
        assert_eq!(outbox.pending("out/restart").len(), 1);
        assert!(broker.published().is_empty());
        assert_eq!(meter.bytes_sent_total, 0);
    }

    #[test]
    fn test_failed_publish_restores_only_waiting_topics() {
        let mut broker = connected_broker();
        broker.refuse_publishes(true);

        let mut outbox = TopicOutbox::new();
        outbox.set_policy("out/restart", TopicPolicy::retained_announcement());
        outbox.push("out/restart", Envelope::new("restart", json!({})), true);
        outbox.push("out/general", Envelope::new("Robot", json!({})), true);

        let identity = InstanceIdentity::new(0);
        let mut meter = Meter::new(60);
        let report = FlushScheduler::new(1).flush(
            &mut outbox,
            json_codec(),
            FlushTarget {
                transport: &mut broker,
                identity: &identity,
                connected: true,
                log_payloads: false,
            },
            &mut meter,
        );

        assert_eq!(report.batches_published, 0);
        assert_eq!(report.envelopes_held, 1);
        assert_eq!(report.envelopes_dropped, 1);
        assert_eq!(outbox.pending("out/restart").len(), 1);
        assert!(outbox.pending("out/general").is_empty());
        assert_eq!(meter.messages_sent_total, 0);
    }
}
