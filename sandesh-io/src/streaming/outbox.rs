//! Per-topic queues of pending envelopes plus per-topic delivery policy.
//!
//! Producers never touch the queues directly; they go through
//! [`TelemetryPipeline::send`](crate::streaming::TelemetryPipeline::send).

use crate::streaming::messages::Envelope;
use std::collections::HashMap;

/// Per-topic delivery rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TopicPolicy {
    /// Broker keeps the last publish for late subscribers
    pub retained: bool,
    /// Queue while disconnected instead of dropping
    pub wait_for_connection: bool,
    /// Backlog cap; `None` is unbounded. When full, new envelopes are
    /// dropped and the oldest are kept.
    pub max_messages: Option<usize>,
}

impl TopicPolicy {
    /// Policy for "latest announcement" topics: retained, held until
    /// connected, a single pending envelope.
    pub fn retained_announcement() -> Self {
        Self {
            retained: true,
            wait_for_connection: true,
            max_messages: Some(1),
        }
    }
}

/// Result of offering an envelope to the outbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Appended to the topic's pending sequence
    Queued,
    /// Session is down and the topic does not wait for a connection
    DroppedDisconnected,
    /// Topic backlog is at `max_messages`
    DroppedFull,
}

/// Topic name -> pending envelopes, plus the policy table
#[derive(Debug, Default)]
pub struct TopicOutbox {
    pending: HashMap<String, Vec<Envelope>>,
    policies: HashMap<String, TopicPolicy>,
}

impl TopicOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy for a topic; unset topics get the default policy
    pub fn policy(&self, topic: &str) -> TopicPolicy {
        self.policies.get(topic).copied().unwrap_or_default()
    }

    /// Set (or replace) a topic's policy
    pub fn set_policy(&mut self, topic: &str, policy: TopicPolicy) {
        self.policies.insert(topic.to_string(), policy);
    }

    /// Offer an envelope. Never blocks.
    pub fn push(&mut self, topic: &str, envelope: Envelope, connected: bool) -> Admission {
        let policy = self.policy(topic);

        if !connected && !policy.wait_for_connection {
            return Admission::DroppedDisconnected;
        }

        let queue = self.pending.entry(topic.to_string()).or_default();
        if policy.max_messages.is_some_and(|max| queue.len() >= max) {
            return Admission::DroppedFull;
        }

        queue.push(envelope);
        Admission::Queued
    }

    /// Pending envelopes for a topic
    pub fn pending(&self, topic: &str) -> &[Envelope] {
        self.pending.get(topic).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Topics with at least one pending envelope
    pub fn non_empty_topics(&self) -> Vec<String> {
        self.pending
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    /// Remove and return a topic's pending envelopes, leaving it empty
    pub fn take(&mut self, topic: &str) -> Vec<Envelope> {
        self.pending
            .get_mut(topic)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Put envelopes back at the front of a topic's queue (after a failed
    /// publish), respecting the topic's cap
    pub fn restore(&mut self, topic: &str, mut envelopes: Vec<Envelope>) {
        let policy = self.policy(topic);
        let queue = self.pending.entry(topic.to_string()).or_default();
        envelopes.append(queue);
        if let Some(max) = policy.max_messages {
            envelopes.truncate(max);
        }
        *queue = envelopes;
    }

    /// Drop a topic's pending envelopes, returning how many were dropped
    pub fn clear(&mut self, topic: &str) -> usize {
        self.pending
            .get_mut(topic)
            .map(|queue| {
                let n = queue.len();
                queue.clear();
                n
            })
            .unwrap_or(0)
    }

    /// Total pending envelopes across all topics
    pub fn total_pending(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(i: i32) -> Envelope {
        Envelope::new("t", json!(i))
    }

    #[test]
    fn test_unset_topic_uses_default_policy() {
        let outbox = TopicOutbox::new();
        assert_eq!(outbox.policy("out/anything"), TopicPolicy::default());
        assert_eq!(
            TopicPolicy::default(),
            TopicPolicy {
                retained: false,
                wait_for_connection: false,
                max_messages: None
            }
        );
    }

    #[test]
    fn test_default_policy_drops_while_disconnected() {
        let mut outbox = TopicOutbox::new();
        assert_eq!(
            outbox.push("out/general", env(1), false),
            Admission::DroppedDisconnected
        );
        assert!(outbox.pending("out/general").is_empty());
        assert_eq!(outbox.push("out/general", env(1), true), Admission::Queued);
        assert_eq!(outbox.pending("out/general").len(), 1);
    }

    #[test]
    fn test_cap_keeps_oldest() {
        let mut outbox = TopicOutbox::new();
        outbox.set_policy("out/restart", TopicPolicy::retained_announcement());
        assert_eq!(outbox.push("out/restart", env(1), false), Admission::Queued);
        assert_eq!(outbox.push("out/restart", env(2), false), Admission::DroppedFull);
        assert_eq!(outbox.push("out/restart", env(3), false), Admission::DroppedFull);
        assert_eq!(outbox.pending("out/restart"), &[env(1)]);
    }

    #[test]
    fn test_last_set_policy_wins() {
        let mut outbox = TopicOutbox::new();
        outbox.set_policy("a", TopicPolicy::retained_announcement());
        outbox.set_policy(
            "a",
            TopicPolicy {
                max_messages: Some(3),
                ..TopicPolicy::retained_announcement()
            },
        );
        for i in 0..5 {
            outbox.push("a", env(i), false);
        }
        assert_eq!(outbox.pending("a").len(), 3);
        assert_eq!(outbox.policy("a").max_messages, Some(3));
    }

    #[test]
    fn test_take_and_restore() {
        let mut outbox = TopicOutbox::new();
        outbox.set_policy(
            "a",
            TopicPolicy {
                wait_for_connection: true,
                max_messages: Some(3),
                ..Default::default()
            },
        );
        outbox.push("a", env(1), false);
        outbox.push("a", env(2), false);
        let taken = outbox.take("a");
        assert_eq!(taken.len(), 2);
        assert!(outbox.non_empty_topics().is_empty());

        outbox.push("a", env(3), false);
        outbox.push("a", env(4), false);
        outbox.restore("a", taken);
        assert_eq!(outbox.pending("a"), &[env(1), env(2), env(3)]);
    }

    #[test]
    fn test_clear_counts() {
        let mut outbox = TopicOutbox::new();
        outbox.push("a", env(1), true);
        outbox.push("a", env(2), true);
        outbox.push("b", env(3), true);
        assert_eq!(outbox.total_pending(), 3);
        assert_eq!(outbox.clear("a"), 2);
        assert_eq!(outbox.clear("missing"), 0);
        assert_eq!(outbox.non_empty_topics(), vec!["b".to_string()]);
    }
}
