use serde::Serialize;
use std::time::{Duration, Instant};

/// Collects diagnostic statistics for a capture session.
pub struct DiagnosticStats {
    frame_count: u64,
    drop_count: u64,
    overwrite_count: u64,
    total_bytes: u64,
    start_time: Instant,
    last_frame_time: Option<Instant>,
    conversion_us: u64,
}

/// Snapshot of diagnostic stats for reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticSnapshot {
    pub fps: f64,
    pub frame_count: u64,
    pub drop_count: u64,
    pub overwrite_count: u64,
    pub drop_rate: f64,
    pub bandwidth_bps: u64,
    pub conversion_us: u64,
    /// Milliseconds since the last converted frame.
    pub since_last_frame_ms: Option<u64>,
}

impl DiagnosticStats {
    /// Create new stats with zeroed counters.
    pub fn new() -> Self {
        Self {
            frame_count: 0,
            drop_count: 0,
            overwrite_count: 0,
            total_bytes: 0,
            start_time: Instant::now(),
            last_frame_time: None,
            conversion_us: 0,
        }
    }

    /// Record a converted and published frame of `bytes` RGB bytes.
    pub fn record_frame(&mut self, bytes: usize, conversion: Duration) {
        self.frame_count += 1;
        self.total_bytes += bytes as u64;
        self.last_frame_time = Some(Instant::now());
        self.conversion_us = conversion.as_micros() as u64;
    }

    /// Record a frame that was not converted (no signal, size mismatch).
    pub fn record_drop(&mut self) {
        self.drop_count += 1;
    }

    /// Record a published frame replaced before any reader polled it.
    pub fn record_overwrite(&mut self) {
        self.overwrite_count += 1;
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Calculate current FPS based on elapsed time.
    pub fn fps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0.0;
        }
        self.frame_count as f64 / elapsed
    }

    /// Drop rate as a percentage (0.0 - 100.0).
    pub fn drop_rate(&self) -> f64 {
        let total = self.frame_count + self.drop_count;
        if total == 0 {
            return 0.0;
        }
        (self.drop_count as f64 / total as f64) * 100.0
    }

    /// Bandwidth in bytes per second.
    pub fn bandwidth_bps(&self) -> u64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0;
        }
        (self.total_bytes as f64 / elapsed) as u64
    }

    /// Reset all counters.
    pub fn reset(&mut self) {
        self.frame_count = 0;
        self.drop_count = 0;
        self.overwrite_count = 0;
        self.total_bytes = 0;
        self.start_time = Instant::now();
        self.last_frame_time = None;
        self.conversion_us = 0;
    }

    /// Take a serialisable snapshot.
    pub fn snapshot(&self) -> DiagnosticSnapshot {
        DiagnosticSnapshot {
            fps: self.fps(),
            frame_count: self.frame_count,
            drop_count: self.drop_count,
            overwrite_count: self.overwrite_count,
            drop_rate: self.drop_rate(),
            bandwidth_bps: self.bandwidth_bps(),
            conversion_us: self.conversion_us,
            since_last_frame_ms: self
                .last_frame_time
                .map(|t| t.elapsed().as_millis() as u64),
        }
    }
}

impl Default for DiagnosticStats {
    fn default() -> Self {
        Self::new()
    }
}
