//! Wire format serialization abstraction
//!
//! # Outbound payload
//!
//! Every telemetry publish carries one batch:
//!
//! ```text
//! {"time": <int>, "msgs": [{"type": <string>, "data": <value>}, ...]}
//! ```
//!
//! encoded with the send [`WireFormat`], then wrapped by the send
//! [`Compression`]:
//!
//! ```text
//! ┌────────────────────────────┐     ┌──────────────────────────┐
//! │ Batch (serde)              │ ──▶ │ JSON text | MessagePack  │ ──▶ none | gzip | zlib
//! └────────────────────────────┘     └──────────────────────────┘
//! ```
//!
//! # Inbound payload
//!
//! Control messages carry a bare `{type, data}` map (no batch wrapper) and
//! go through the receive compression and receive format in reverse.
//!
//! ## Wire Formats
//!
//! ### JSON (Default)
//! - Human-readable, easy to inspect with any MQTT client
//! - Larger messages
//!
//! ### MessagePack (Binary)
//! - Compact, used when bandwidth matters
//! - Structs are encoded as maps so field names survive and the shape stays
//!   identical to the JSON form
//!
//! ## Error Handling
//!
//! - **Decode failure** (wrong format or compression selected, truncated,
//!   malformed): returned as an error, logged and discarded by the router
//! - **Encode failure**: returned as an error, the batch is dropped
//!
//! Neither codec nor compression mode is negotiated or tagged in-band.

use crate::error::Result;
use crate::streaming::compression::Compression;
use crate::streaming::messages::Batch;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Supported wire formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WireFormat {
    /// JSON format - human-readable for debugging
    #[default]
    #[serde(rename = "json")]
    Json,
    /// Binary format using MessagePack - compact
    #[serde(rename = "msgpack", alias = "messagepack")]
    MessagePack,
}

/// Serializer that can handle both formats
#[derive(Debug, Clone, Copy)]
pub struct Serializer {
    format: WireFormat,
}

impl Serializer {
    /// Create a new serializer for the given format
    pub fn new(format: WireFormat) -> Self {
        Self { format }
    }

    /// Configured format
    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Serialize a value to bytes
    pub fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self.format {
            WireFormat::MessagePack => Ok(rmp_serde::to_vec_named(value)?),
            WireFormat::Json => Ok(serde_json::to_vec(value)?),
        }
    }

    /// Deserialize bytes to a typed value
    pub fn deserialize<T: for<'de> Deserialize<'de>>(&self, bytes: &[u8]) -> Result<T> {
        match self.format {
            WireFormat::MessagePack => Ok(rmp_serde::from_slice(bytes)?),
            WireFormat::Json => Ok(serde_json::from_slice(bytes)?),
        }
    }
}

/// Create a serializer for the given wire format
pub fn create_serializer(format: WireFormat) -> Serializer {
    Serializer::new(format)
}

/// Codec plus compression for one direction
///
/// `Copy` so a flush cycle can capture the current settings once and use
/// them for every batch it builds.
#[derive(Debug, Clone, Copy)]
pub struct PayloadCodec {
    serializer: Serializer,
    compression: Compression,
    level: u32,
}

impl PayloadCodec {
    pub fn new(format: WireFormat, compression: Compression, level: u32) -> Self {
        Self {
            serializer: create_serializer(format),
            compression,
            level,
        }
    }

    pub fn format(&self) -> WireFormat {
        self.serializer.format()
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Encode then compress a batch
    pub fn encode_batch(&self, batch: &Batch) -> Result<Vec<u8>> {
        let encoded = self.serializer.serialize(batch)?;
        self.compression.compress(&encoded, self.level)
    }

    /// Decompress then decode a batch
    pub fn decode_batch(&self, payload: &[u8]) -> Result<Batch> {
        let raw = self.compression.decompress(payload)?;
        self.serializer.deserialize(&raw)
    }

    /// Encode then compress a single value (used for control envelopes)
    pub fn encode_value<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let encoded = self.serializer.serialize(value)?;
        self.compression.compress(&encoded, self.level)
    }

    /// Decompress then decode to an untyped document
    pub fn decode_document(&self, payload: &[u8]) -> Result<Value> {
        let raw = self.compression.decompress(payload)?;
        self.serializer.deserialize(&raw)
    }
}
