//! Retry-with-consensus sector reader (spec.md §4.3).
//!
//! Known-bad sectors on aging media tend to deliver a stable majority value
//! with per-read transient noise; this reader falls back to a per-bit
//! majority vote across many retries rather than giving up or returning
//! whatever the last attempt happened to deliver.

use crate::device::{BlockDevice, Chs, SECTOR_SIZE};
use crate::error::Error;
use crate::readlog::ReadLog;
use std::thread::sleep;
use std::time::Duration;

/// Upper bound on retry attempts after the first direct read fails.
pub const MAX_READ_RETRY_COUNT: u32 = 128;

/// Request a controller reset every this-many retry attempts.
pub const DISK_RESET_INTERVAL: u32 = 2;

/// Delay between retry attempts that do not trigger a controller reset.
pub const READ_RETRY_DELAY_MS: u64 = 100;

/// Number of bit positions tallied across a 512-byte sector.
const TALLY_SIZE: usize = SECTOR_SIZE * 8;

/// How a sector's payload was ultimately obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The direct read succeeded; no retry occurred.
    Clean,
    /// A retry attempt, the `k`-th, succeeded outright.
    Recovered(u32),
    /// All retries failed; the payload was reconstructed by bit-majority
    /// vote across `k` failed attempts.
    Reconstructed(u32),
}

/// Wraps a `BlockDevice` with the retry-and-reconstruct recovery algorithm.
pub struct RetryReader<'a, D: BlockDevice> {
    device: &'a mut D,
}

impl<'a, D: BlockDevice> RetryReader<'a, D> {
    /// Wrap `device` for recovery-aware reads.
    pub fn new(device: &'a mut D) -> Self {
        Self { device }
    }

    /// Read one sector, retrying and ultimately reconstructing on
    /// persistent failure. `chs` is the CHS position to pass to the device;
    /// `linear_sector` is the linear index recorded in the read log.
    pub fn read_with_recovery(
        &mut self,
        chs: Chs,
        linear_sector: u64,
        log: &mut ReadLog,
    ) -> (Box<[u8; SECTOR_SIZE]>, Outcome) {
        let mut buf = Box::new([0u8; SECTOR_SIZE]);
        let status_code = match self.device.read_sector(chs, &mut buf) {
            Ok(()) => return (buf, Outcome::Clean),
            Err(Error::Device { code, .. }) => code,
            Err(_) => 0xEE,
        };

        let mut tally = vec![0u32; TALLY_SIZE];
        let mut last_read = *buf;

        for attempt in 1..=MAX_READ_RETRY_COUNT {
            accumulate_tally(&mut tally, &last_read);

            if attempt % DISK_RESET_INTERVAL == 0 {
                let _ = self.device.reset_controller();
            } else {
                sleep(Duration::from_millis(READ_RETRY_DELAY_MS));
            }

            log.add(linear_sector, status_code, "sector read failed, retrying", attempt);

            match self.device.read_sector(chs, &mut buf) {
                Ok(()) => {
                    log.add(linear_sector, status_code, "sector recovered", attempt);
                    return (buf, Outcome::Recovered(attempt));
                },
                Err(_) => {
                    last_read = *buf;
                },
            }
        }

        let reconstructed = reconstruct(&tally);
        log.add(
            linear_sector,
            status_code,
            "sector reconstructed by bit-majority vote",
            MAX_READ_RETRY_COUNT,
        );
        (Box::new(reconstructed), Outcome::Reconstructed(MAX_READ_RETRY_COUNT))
    }
}

fn accumulate_tally(tally: &mut [u32], sample: &[u8; SECTOR_SIZE]) {
    for (b, slot) in tally.iter_mut().enumerate() {
        let byte = sample[b / 8];
        let bit = (byte >> (b % 8)) & 1;
        *slot += u32::from(bit);
    }
}

fn reconstruct(tally: &[u32]) -> [u8; SECTOR_SIZE] {
    let mut out = [0u8; SECTOR_SIZE];
    let threshold = MAX_READ_RETRY_COUNT / 2;
    for (b, &count) in tally.iter().enumerate() {
        if count >= threshold {
            out[b / 8] |= 1 << (b % 8);
        }
    }
    out
}
