//! MD5 accumulator exposing an init / absorb-block / finalize interface.
//!
//! The sender core only ever needs to absorb whole 512-byte sectors and
//! read out a final digest once, so this wraps the RustCrypto `md-5` crate
//! behind the narrow three-operation shape spec.md §1 specifies, rather
//! than exposing the crate's full `Digest` trait surface to callers.

use md5::{Digest, Md5};

/// Running MD5 state over a stream of absorbed blocks.
#[derive(Default)]
pub struct Md5Accumulator {
    hasher: Md5,
}

impl Md5Accumulator {
    /// Start a new, empty accumulator.
    #[must_use]
    pub fn init() -> Self {
        Self { hasher: Md5::new() }
    }

    /// Absorb one block of bytes into the running digest.
    pub fn absorb(&mut self, block: &[u8]) {
        self.hasher.update(block);
    }

    /// Consume the accumulator and return the final 16-byte digest.
    #[must_use]
    pub fn finalize(self) -> [u8; 16] {
        self.hasher.finalize().into()
    }
}
