use std::time::Instant;

/// Monotonic stopwatch for request latency metrics: time to first byte and
/// total time, both as integer milliseconds.
#[derive(Debug, Default, Clone)]
pub struct Timer {
    start: Option<Instant>,
    first_byte: Option<Instant>,
    end: Option<Instant>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start() -> Self {
        Self {
            start: Some(Instant::now()),
            first_byte: None,
            end: None,
        }
    }

    /// Mark the first response byte. Idempotent: calls after the first are
    /// ignored.
    pub fn mark_first_byte(&mut self) {
        if self.first_byte.is_none() {
            self.first_byte = Some(Instant::now());
        }
    }

    /// Stop timing. If no first byte was marked, it is set to the stop time.
    pub fn stop(&mut self) {
        let now = Instant::now();
        self.end = Some(now);
        if self.first_byte.is_none() {
            self.first_byte = Some(now);
        }
    }

    pub fn first_byte_delay_ms(&self) -> Option<u64> {
        match (self.start, self.first_byte) {
            (Some(start), Some(first)) => Some(first.duration_since(start).as_millis() as u64),
            _ => None,
        }
    }

    pub fn total_time_ms(&self) -> Option<u64> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(end.duration_since(start).as_millis() as u64),
            _ => None,
        }
    }
}
