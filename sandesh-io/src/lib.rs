//! SandeshIO - telemetry publish pipeline for a simulated rover
//!
//! Producers queue typed envelopes per topic; once per simulation tick the
//! pipeline batches each topic, encodes it (JSON or MessagePack), optionally
//! compresses it (gzip or zlib) and publishes it to an MQTT broker. Control
//! commands flow back through the same pipeline into the rover.
//!
//! ## Delivery policy
//!
//! Best-effort per topic. Topics can opt into being held until connected
//! (with a backlog cap) and into retained publishes.

pub mod app;
pub mod config;
pub mod error;
pub mod rover;
pub mod streaming;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
