//! Byte and message counters with a tick-driven throughput window.
//!
//! Totals only ever grow. The `*_second` accumulators collect since the last
//! window boundary; at each boundary they are copied into `*_last_second` and
//! reset. The window is counted in ticks (60 at the default 60 Hz), so no
//! wall-clock timer is involved.

/// Telemetry counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Meter {
    window_ticks: u64,

    pub bytes_sent_total: u64,
    pub messages_sent_total: u64,
    pub envelopes_sent_total: u64,
    pub bytes_sent_second: u64,
    pub bytes_sent_last_second: u64,
    pub messages_sent_second: u64,
    pub messages_sent_last_second: u64,

    pub bytes_received_total: u64,
    pub messages_received_total: u64,
    pub bytes_received_second: u64,
    pub bytes_received_last_second: u64,
    pub messages_received_second: u64,
    pub messages_received_last_second: u64,
}

impl Meter {
    /// Create a meter whose window spans `window_ticks` ticks
    pub fn new(window_ticks: u32) -> Self {
        Self {
            window_ticks: u64::from(window_ticks.max(1)),
            ..Default::default()
        }
    }

    pub fn window_ticks(&self) -> u64 {
        self.window_ticks
    }

    /// One successful publish of `bytes` carrying `envelopes` envelopes
    pub fn record_sent(&mut self, bytes: usize, envelopes: usize) {
        let bytes = bytes as u64;
        self.bytes_sent_total += bytes;
        self.bytes_sent_second += bytes;
        self.messages_sent_total += 1;
        self.messages_sent_second += 1;
        self.envelopes_sent_total += envelopes as u64;
    }

    /// One inbound message of `bytes`
    pub fn record_received(&mut self, bytes: usize) {
        let bytes = bytes as u64;
        self.bytes_received_total += bytes;
        self.bytes_received_second += bytes;
        self.messages_received_total += 1;
        self.messages_received_second += 1;
    }

    /// Close the window if `step` is a boundary. Call once per tick, after
    /// the tick's flush. Returns true when the window rotated.
    pub fn end_tick(&mut self, step: u64) -> bool {
        if step == 0 || step % self.window_ticks != 0 {
            return false;
        }
        self.bytes_sent_last_second = std::mem::take(&mut self.bytes_sent_second);
        self.messages_sent_last_second = std::mem::take(&mut self.messages_sent_second);
        self.bytes_received_last_second = std::mem::take(&mut self.bytes_received_second);
        self.messages_received_last_second = std::mem::take(&mut self.messages_received_second);
        true
    }

    /// Outbound throughput over the last complete window (bytes/s)
    pub fn emission_rate(&self) -> u64 {
        self.bytes_sent_last_second
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_rotation() {
        let mut meter = Meter::new(60);
        for step in 1..=60 {
            meter.record_sent(100, 2);
            let rotated = meter.end_tick(step);
            assert_eq!(rotated, step == 60);
        }
        assert_eq!(meter.bytes_sent_last_second, 6000);
        assert_eq!(meter.bytes_sent_second, 0);
        assert_eq!(meter.messages_sent_last_second, 60);
        assert_eq!(meter.bytes_sent_total, 6000);
        assert_eq!(meter.envelopes_sent_total, 120);
        assert_eq!(meter.emission_rate(), 6000);
    }

    #[test]
    fn test_step_zero_does_not_rotate() {
        let mut meter = Meter::new(60);
        meter.record_received(10);
        assert!(!meter.end_tick(0));
        assert_eq!(meter.bytes_received_second, 10);
    }

    #[test]
    fn test_received_window() {
        let mut meter = Meter::new(2);
        meter.record_received(5);
        meter.end_tick(1);
        meter.record_received(7);
        meter.end_tick(2);
        assert_eq!(meter.bytes_received_last_second, 12);
        assert_eq!(meter.messages_received_last_second, 2);
        meter.end_tick(4);
        assert_eq!(meter.bytes_received_last_second, 0);
        assert_eq!(meter.bytes_received_total, 12);
    }
}
