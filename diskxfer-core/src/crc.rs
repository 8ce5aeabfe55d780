//! CRC-32 primitive shared by both packet shapes.
//!
//! One fixed polynomial/seed (the ISO-HDLC / "CRC-32" convention used by
//! zlib, PNG, and gzip) is used for both directions of the wire protocol.
//! `crc32(b"") == 0` under this convention, which the codec's round-trip
//! tests pin.

use crc::{Crc, CRC_32_ISO_HDLC};

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Compute the CRC-32 of `bytes` under the crate-wide convention.
#[must_use]
pub fn crc32(bytes: &[u8]) -> u32 {
    CRC32.checksum(bytes)
}
