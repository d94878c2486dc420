//! Message types carried over the broker.
//!
//! - [`Envelope`]: one typed application message, `{type, data}`
//! - [`Batch`]: the timestamped group of envelopes flushed for one topic in
//!   one cycle, `{time, msgs}`
//!
//! Both codecs (structured text and compact binary) carry exactly this shape,
//! field names included.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One typed application message awaiting transmission
///
/// Immutable after creation; consumed when folded into a transmitted batch.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Message type tag, e.g. `"Robot"`, `"motors"`
    #[serde(rename = "type")]
    kind: String,
    /// Opaque structured payload
    data: Value,
}

impl Envelope {
    /// Create an envelope
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Type tag
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Payload
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Validate a decoded inbound document and split it into an envelope.
    ///
    /// The document must be a map holding a string `type` and a `data` field
    /// (which may be `null` for commands without payload).
    pub fn from_document(document: Value) -> Result<Self> {
        let Value::Object(mut map) = document else {
            return Err(Error::MalformedEnvelope(
                "document is not a map".to_string(),
            ));
        };

        let kind = match map.remove("type") {
            Some(Value::String(kind)) => kind,
            Some(other) => {
                return Err(Error::MalformedEnvelope(format!(
                    "`type` is not a string: {}",
                    other
                )));
            }
            None => {
                return Err(Error::MalformedEnvelope("missing `type` field".to_string()));
            }
        };

        let data = map
            .remove("data")
            .ok_or_else(|| Error::MalformedEnvelope(format!("`{}` has no `data` field", kind)))?;

        Ok(Self { kind, data })
    }
}

/// Timestamped group of envelopes for one topic
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Batch {
    /// Nanoseconds since the UNIX epoch, non-decreasing within a process
    pub time: u64,
    /// Envelopes in send order
    pub msgs: Vec<Envelope>,
}

impl Batch {
    /// Number of envelopes
    pub fn len(&self) -> usize {
        self.msgs.len()
    }

    /// True if the batch holds no envelopes (never transmitted)
    pub fn is_empty(&self) -> bool {
        self.msgs.is_empty()
    }
}
