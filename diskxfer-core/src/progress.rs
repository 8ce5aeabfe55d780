//! Progress/pacing ledger (spec.md §4.6), tracking throughput over the
//! course of a transfer without requiring a high-resolution clock.

use std::time::Instant;

/// How often, in sectors transferred, the ledger resamples the clock.
pub const SAMPLE_INTERVAL_SECTORS: u64 = 256;

/// Tracks elapsed time and throughput across a transfer.
pub struct ProgressLedger {
    started_at: Instant,
    last_sampled_at: Instant,
    total_bytes_read: u64,
    sectors_since_sample: u64,
    bytes_per_second: f64,
}

impl ProgressLedger {
    /// Start a new ledger, sampling the clock once immediately.
    #[must_use]
    pub fn start(baud: u32) -> Self {
        let now = Instant::now();
        Self {
            started_at: now,
            last_sampled_at: now,
            total_bytes_read: 0,
            sectors_since_sample: 0,
            bytes_per_second: effective_bps(baud),
        }
    }

    /// Record that one sector (512 bytes) has just been transferred,
    /// resampling throughput every `SAMPLE_INTERVAL_SECTORS` sectors.
    pub fn record_sector(&mut self) {
        self.total_bytes_read += 512;
        self.sectors_since_sample += 1;

        if self.sectors_since_sample >= SAMPLE_INTERVAL_SECTORS {
            let now = Instant::now();
            let elapsed = now.duration_since(self.last_sampled_at).as_secs_f64();
            if elapsed > 0.0 {
                let bytes_since_sample = self.sectors_since_sample * 512;
                #[allow(clippy::cast_precision_loss)]
                let rate = bytes_since_sample as f64 / elapsed;
                self.bytes_per_second = rate;
            }
            self.last_sampled_at = now;
            self.sectors_since_sample = 0;
        }
    }

    /// Total bytes transferred so far.
    #[must_use]
    pub fn total_bytes_read(&self) -> u64 {
        self.total_bytes_read
    }

    /// Most recently sampled (or estimated) throughput, in bytes/second.
    #[must_use]
    pub fn bytes_per_second(&self) -> f64 {
        self.bytes_per_second
    }

    /// Wall-clock time since the ledger started.
    #[must_use]
    pub fn elapsed_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    /// Estimated seconds remaining to transfer `remaining_bytes` at the
    /// current sampled rate, or `None` if the rate is not yet known.
    #[must_use]
    pub fn eta_secs(&self, remaining_bytes: u64) -> Option<f64> {
        if self.bytes_per_second <= 0.0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        Some(remaining_bytes as f64 / self.bytes_per_second)
    }
}

/// Initial throughput estimate before any real sample is taken: baud,
/// divided by 9 bits per wire byte (8 data + 1 stop, no parity), scaled to
/// the 512 payload bytes carried by each 521-byte frame (spec.md §4.6).
#[must_use]
pub fn effective_bps(baud: u32) -> f64 {
    f64::from(baud) / 9.0 / 521.0 * 512.0
}
