//! Application orchestration for the SandeshIO daemon
//!
//! Composition root: builds the rover, the inbound router and the one
//! telemetry pipeline, then drives them from a fixed-rate tick loop.

use crate::config::Config;
use crate::error::Result;
use crate::rover::commands::register_rover_commands;
use crate::rover::{Rover, RoverControl, telemetry};
use crate::streaming::{InboundRouter, TelemetryPipeline, TickReport};
use crate::transport::BrokerTransport;
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Seconds between statistics log lines
const STATS_INTERVAL_SECS: u64 = 10;

/// Main application structure
pub struct SandeshApp {
    config: Config,
    rover: Rover,
    pipeline: TelemetryPipeline,
    shutdown: Arc<AtomicBool>,
}

impl SandeshApp {
    /// Build every component. Queues the restart announcement; does not
    /// connect.
    pub fn new(config: Config, transport: Box<dyn BrokerTransport>) -> Self {
        let mut router = InboundRouter::new(config.images.received_image.clone());
        register_rover_commands(&mut router, &config.images);
        debug!("Control types: {}", router.kinds().join(", "));

        let mut pipeline = TelemetryPipeline::new(&config, transport, router);
        let rover = Rover::new(config.rover.clone());
        telemetry::announce_restart(&mut pipeline, &rover);

        Self {
            config,
            rover,
            pipeline,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops [`run`](Self::run) when set
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Connect to the configured broker
    pub fn connect(&mut self) -> Result<()> {
        let broker = &self.config.broker;
        self.pipeline.connect(&broker.address, broker.port)
    }

    /// One simulation tick: step the rover, produce telemetry, run the
    /// pipeline
    pub fn step(&mut self) -> TickReport {
        let dt = 1.0 / self.config.pipeline.tick_rate_hz as f32;
        self.rover.step(dt);

        let step = self.rover.step_count();
        telemetry::produce(&mut self.pipeline, &self.rover, step);
        self.pipeline.tick(step, &mut self.rover)
    }

    /// Fixed-rate loop until the shutdown flag is set or `max_ticks` ticks
    /// have run
    pub fn run(&mut self, max_ticks: Option<u64>) {
        let interval = Duration::from_secs_f64(1.0 / f64::from(self.config.pipeline.tick_rate_hz));
        let stats_every = u64::from(self.config.pipeline.tick_rate_hz) * STATS_INTERVAL_SECS;
        let mut ticks: u64 = 0;

        info!(
            "Tick loop started: {} Hz, flush every {} ticks",
            self.config.pipeline.tick_rate_hz, self.config.pipeline.flush_interval_ticks
        );

        while !self.shutdown.load(Ordering::Relaxed) {
            if max_ticks.is_some_and(|max| ticks >= max) {
                info!("Reached {} ticks", ticks);
                break;
            }
            let loop_start = Instant::now();

            let report = self.step();
            ticks += 1;
            if report.evicted {
                warn!("Telemetry offline until the next explicit connect");
            }
            if ticks % stats_every == 0 {
                self.log_statistics();
            }

            let elapsed = loop_start.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }

        info!("Tick loop terminated after {} ticks", ticks);
    }

    fn log_statistics(&self) {
        let meter = self.pipeline.meter();
        let pose = self.rover.pose();
        info!(
            "[{}] pose=({:.2}, {:.2}, {:.2}) sent={} B/s recv={} B/s totals: {} msgs out, {} msgs in",
            self.pipeline.state(),
            pose.x,
            pose.y,
            pose.r,
            meter.emission_rate(),
            meter.bytes_received_last_second,
            meter.messages_sent_total,
            meter.messages_received_total
        );
    }

    pub fn rover(&self) -> &Rover {
        &self.rover
    }

    pub fn pipeline(&self) -> &TelemetryPipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut TelemetryPipeline {
        &mut self.pipeline
    }

    /// Release the broker session
    pub fn shutdown(self) {
        info!("Shutting down...");
        self.pipeline.cleanup();
    }
}
