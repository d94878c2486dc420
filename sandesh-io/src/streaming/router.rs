//! Inbound router: broker messages to simulation mutators.
//!
//! Two inbound topic classes:
//!
//! - `in/control`: receive compression, then receive codec, then a
//!   `{type, data}` envelope dispatched through the handler registry
//! - `in/image`: raw bytes written verbatim to the received-image path, no
//!   envelope, codec or compression
//!
//! Every failure is logged with the topic and the message discarded. Nothing
//! here returns an error to the tick loop.

use crate::error::Result;
use crate::rover::RoverControl;
use crate::streaming::messages::Envelope;
use crate::streaming::wire::PayloadCodec;
use crate::transport::Qos;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Control envelopes
pub const CONTROL_TOPIC: &str = "in/control";
/// Raw terrain image bytes
pub const IMAGE_TOPIC: &str = "in/image";

/// Publish a handler asks for, sent as-is (no batch, codec or compression)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPublish {
    /// Local topic name; namespaced by the pipeline
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: Qos,
    pub retained: bool,
}

/// What a handler may touch
pub struct CommandContext<'a> {
    pub rover: &'a mut dyn RoverControl,
    /// Raw publishes queued by handlers, sent after routing
    pub raw: &'a mut Vec<RawPublish>,
}

/// Handler for one control type
pub type Handler = Box<dyn Fn(&Value, &mut CommandContext<'_>) -> Result<()> + Send>;

/// Result of routing one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A handler accepted the envelope
    Dispatched(String),
    /// Well-formed envelope with no registered handler
    UnknownType(String),
    /// Raw image stored
    ImageStored,
    /// Handler rejected the envelope payload
    HandlerFailed(String),
    /// Undecodable, malformed, or on a topic nobody routes
    Discarded,
}

/// Type tag -> handler registry, built once at start-up
pub struct InboundRouter {
    handlers: HashMap<String, Handler>,
    image_path: PathBuf,
}

impl InboundRouter {
    /// Create a router that stores `in/image` payloads at `image_path`
    pub fn new(image_path: impl Into<PathBuf>) -> Self {
        Self {
            handlers: HashMap::new(),
            image_path: image_path.into(),
        }
    }

    /// Register (or replace) the handler for a type tag
    pub fn register<F>(&mut self, kind: &str, handler: F)
    where
        F: Fn(&Value, &mut CommandContext<'_>) -> Result<()> + Send + 'static,
    {
        if self.handlers.insert(kind.to_string(), Box::new(handler)).is_some() {
            log::debug!("Replaced handler for {}", kind);
        }
    }

    pub fn has_handler(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Registered type tags, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    /// Local topics to subscribe to
    pub fn subscriptions() -> [&'static str; 2] {
        [CONTROL_TOPIC, IMAGE_TOPIC]
    }

    /// Route one message. `topic` is the local (namespace-stripped) topic.
    pub fn route(
        &self,
        topic: &str,
        payload: &[u8],
        codec: PayloadCodec,
        ctx: &mut CommandContext<'_>,
    ) -> RouteOutcome {
        // Zero-length publishes clear retained messages; they carry nothing
        if payload.is_empty() {
            log::debug!("Ignoring empty message on {}", topic);
            return RouteOutcome::Discarded;
        }
        match topic {
            IMAGE_TOPIC => self.store_image(payload, ctx),
            CONTROL_TOPIC => self.dispatch(topic, payload, codec, ctx),
            _ => {
                log::debug!("No route for inbound topic {}", topic);
                RouteOutcome::Discarded
            }
        }
    }

    fn store_image(&self, payload: &[u8], ctx: &mut CommandContext<'_>) -> RouteOutcome {
        if let Err(e) = fs::write(&self.image_path, payload) {
            log::error!(
                "Failed to store image from {} at {}: {}",
                IMAGE_TOPIC,
                self.image_path.display(),
                e
            );
            return RouteOutcome::Discarded;
        }
        log::info!(
            "Stored {} byte image at {}",
            payload.len(),
            self.image_path.display()
        );
        ctx.rover.terrain_image_received(&self.image_path);
        RouteOutcome::ImageStored
    }

    fn dispatch(
        &self,
        topic: &str,
        payload: &[u8],
        codec: PayloadCodec,
        ctx: &mut CommandContext<'_>,
    ) -> RouteOutcome {
        let envelope = match codec
            .decode_document(payload)
            .and_then(Envelope::from_document)
        {
            Ok(envelope) => envelope,
            Err(e) => {
                log::warn!(
                    "Discarding {} byte message on {}: {}",
                    payload.len(),
                    topic,
                    e
                );
                return RouteOutcome::Discarded;
            }
        };

        let kind = envelope.kind().to_string();
        let Some(handler) = self.handlers.get(&kind) else {
            log::warn!("Unknown message type `{}` on {}", kind, topic);
            return RouteOutcome::UnknownType(kind);
        };

        match handler(envelope.data(), ctx) {
            Ok(()) => {
                log::debug!("Handled `{}` on {}", kind, topic);
                RouteOutcome::Dispatched(kind)
            }
            Err(e) => {
                log::warn!("Handler for `{}` on {} failed: {}", kind, topic, e);
                RouteOutcome::HandlerFailed(kind)
            }
        }
    }
}
