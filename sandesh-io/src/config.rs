//! Configuration for SandeshIO
//!
//! Loads configuration from a TOML file. Every field has a default, so a
//! minimal file (or none at all) yields a runnable offline setup.
//!
//! ```toml
//! [broker]
//! address = "broker.example.net"
//! port = 8883
//! instance_id = 3
//! tls_ca_file = "data/cacert.pem"
//!
//! [encoding]
//! send_format = "msgpack"
//! send_compression = "zlib"
//!
//! [pipeline]
//! tick_rate_hz = 60
//! ```

use crate::error::{Error, Result};
use crate::streaming::compression::Compression;
use crate::streaming::wire::WireFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub encoding: EncodingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub images: ImageConfig,
    #[serde(default)]
    pub rover: RoverConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Broker connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerConfig {
    /// Broker host name or IP address
    #[serde(default = "default_address")]
    pub address: String,

    /// Broker port (8883 for TLS, 1883 plain)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Wrap the connection in TLS
    #[serde(default = "default_tls")]
    pub tls: bool,

    /// Instance id; derives client identity, username and topic namespace
    #[serde(default)]
    pub instance_id: u32,

    /// Credential password (username is derived from the instance id)
    #[serde(default = "default_password")]
    pub password: String,

    /// CA certificate (PEM) used when `tls` is on
    #[serde(default = "default_tls_ca_file")]
    pub tls_ca_file: PathBuf,

    /// MQTT keep-alive interval in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// How long `connect` waits for the broker handshake
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Connect once at daemon start-up
    #[serde(default)]
    pub auto_connect: bool,
}

fn default_address() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    8883
}
fn default_tls() -> bool {
    true
}
fn default_password() -> String {
    "simtor23".to_string()
}
fn default_tls_ca_file() -> PathBuf {
    PathBuf::from("data/cacert.pem")
}
fn default_keep_alive() -> u64 {
    60
}
fn default_connect_timeout() -> u64 {
    5000
}

impl BrokerConfig {
    /// CA file to hand the transport; `None` means plain TCP
    pub fn tls_ca_file(&self) -> Option<PathBuf> {
        self.tls.then(|| self.tls_ca_file.clone())
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            tls: default_tls(),
            instance_id: 0,
            password: default_password(),
            tls_ca_file: default_tls_ca_file(),
            keep_alive_secs: default_keep_alive(),
            connect_timeout_ms: default_connect_timeout(),
            auto_connect: false,
        }
    }
}

/// Codec and compression switches, one set per direction
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EncodingConfig {
    #[serde(default)]
    pub send_format: WireFormat,
    #[serde(default)]
    pub send_compression: Compression,
    #[serde(default)]
    pub receive_format: WireFormat,
    #[serde(default)]
    pub receive_compression: Compression,
    /// Compression level 0-9
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
}

fn default_compression_level() -> u32 {
    9
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            send_format: WireFormat::default(),
            send_compression: Compression::default(),
            receive_format: WireFormat::default(),
            receive_compression: Compression::default(),
            compression_level: default_compression_level(),
        }
    }
}

/// Tick loop and pipeline tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Simulation tick rate; also the metering window length in ticks
    #[serde(default = "default_tick_rate")]
    pub tick_rate_hz: u32,

    /// Run a flush cycle every N ticks
    #[serde(default = "default_flush_interval")]
    pub flush_interval_ticks: u32,

    /// Capacity of the I/O thread -> tick thread inbound queue
    #[serde(default = "default_inbound_capacity")]
    pub inbound_queue_capacity: usize,

    /// Log every outbound publish at info level
    #[serde(default)]
    pub log_outbound: bool,

    /// Log every inbound message at info level
    #[serde(default)]
    pub log_inbound: bool,
}

fn default_tick_rate() -> u32 {
    60
}
fn default_flush_interval() -> u32 {
    1
}
fn default_inbound_capacity() -> usize {
    1024
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: default_tick_rate(),
            flush_interval_ticks: default_flush_interval(),
            inbound_queue_capacity: default_inbound_capacity(),
            log_outbound: false,
            log_inbound: false,
        }
    }
}

/// Image file locations for the raw image topics
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageConfig {
    /// Published on `out/image` when requested
    #[serde(default = "default_satellite_image")]
    pub satellite_image: PathBuf,
    /// Published on `out/image_blurred` when requested
    #[serde(default = "default_blurred_image")]
    pub blurred_image: PathBuf,
    /// Destination of payloads received on `in/image`
    #[serde(default = "default_received_image")]
    pub received_image: PathBuf,
    /// Largest MQTT packet accepted or sent; bounds raw image size
    #[serde(default = "default_max_packet_bytes")]
    pub max_packet_bytes: usize,
}

fn default_satellite_image() -> PathBuf {
    PathBuf::from("data/lunar.png")
}
fn default_blurred_image() -> PathBuf {
    PathBuf::from("data/lunar_blurred.png")
}
fn default_received_image() -> PathBuf {
    PathBuf::from("data/lunar_received.png")
}
fn default_max_packet_bytes() -> usize {
    16 * 1024 * 1024
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            satellite_image: default_satellite_image(),
            blurred_image: default_blurred_image(),
            received_image: default_received_image(),
            max_packet_bytes: default_max_packet_bytes(),
        }
    }
}

/// Stand-in rover parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoverConfig {
    #[serde(default)]
    pub start_x: f32,
    #[serde(default)]
    pub start_y: f32,
    /// Start heading (radians)
    #[serde(default)]
    pub start_r: f32,
    /// Track separation (meters)
    #[serde(default = "default_track_width")]
    pub track_width: f32,
    /// Track speed at full acceleration (m/s)
    #[serde(default = "default_max_track_speed")]
    pub max_track_speed: f32,
    /// Maximum distance for `pickup` to reach an item (meters)
    #[serde(default = "default_pickup_radius")]
    pub pickup_radius: f32,
    /// Items scattered around the start pose
    #[serde(default = "default_item_count")]
    pub item_count: usize,
}

fn default_track_width() -> f32 {
    0.6
}
fn default_max_track_speed() -> f32 {
    1.0
}
fn default_pickup_radius() -> f32 {
    1.5
}
fn default_item_count() -> usize {
    8
}

impl Default for RoverConfig {
    fn default() -> Self {
        Self {
            start_x: 0.0,
            start_y: 0.0,
            start_r: 0.0,
            track_width: default_track_width(),
            max_track_speed: default_max_track_speed(),
            pickup_radius: default_pickup_radius(),
            item_count: default_item_count(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default log filter (trace, debug, info, warn, error); `RUST_LOG` wins
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.tick_rate_hz == 0 {
            return Err(Error::Config("tick_rate_hz must be > 0".to_string()));
        }
        if self.pipeline.flush_interval_ticks == 0 {
            return Err(Error::Config(
                "flush_interval_ticks must be > 0".to_string(),
            ));
        }
        if self.pipeline.inbound_queue_capacity == 0 {
            return Err(Error::Config(
                "inbound_queue_capacity must be > 0".to_string(),
            ));
        }
        if self.images.max_packet_bytes == 0 {
            return Err(Error::Config("max_packet_bytes must be > 0".to_string()));
        }
        if self.encoding.compression_level > 9 {
            return Err(Error::Config(format!(
                "compression_level {} out of range 0-9",
                self.encoding.compression_level
            )));
        }
        Ok(())
    }
}
