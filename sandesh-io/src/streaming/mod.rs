//! Telemetry streaming over a publish/subscribe broker
//!
//! ```text
//! producers ──send()──▶ TopicOutbox ──flush──▶ PayloadCodec ──▶ BrokerTransport
//!                                                                   │
//! rover ◀── handlers ◀── InboundRouter ◀── PayloadCodec ◀── poll ◀──┘
//! ```
//!
//! [`TelemetryPipeline`] owns every piece and is driven once per tick.

pub mod compression;
pub mod flush;
pub mod messages;
pub mod metering;
pub mod outbox;
pub mod pipeline;
pub mod router;
pub mod session;
pub mod wire;

pub use compression::Compression;
pub use flush::{BatchClock, FlushReport, FlushScheduler};
pub use messages::{Batch, Envelope};
pub use metering::Meter;
pub use outbox::{Admission, TopicOutbox, TopicPolicy};
pub use pipeline::{TelemetryPipeline, TickReport};
pub use router::{CommandContext, InboundRouter, RawPublish, RouteOutcome};
pub use session::{InstanceIdentity, Session, SessionState};
pub use wire::{PayloadCodec, WireFormat};
