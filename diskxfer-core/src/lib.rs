//! Core protocol library for a sliding-window, XMODEM-512-derived block
//! transfer over a serial link.
//!
//! Two collaborating state machines, [`sender::SenderFsm`] and
//! [`receiver::ReceiverFsm`], move whole 512-byte disk sectors across a
//! noisy serial link with CRC-32 framing, resync-on-garbage, a bounded
//! retransmission window, and an MD5 digest accumulated over every
//! transmitted byte. Neither FSM touches a filesystem path, a terminal, or
//! a concrete serial device directly — both are generic over the
//! [`device::BlockDevice`] and [`port::SerialPort`] traits, which the
//! `diskxfer-send`/`diskxfer-recv` binaries implement concretely.
//!
//! ### Quick start
//!
//! ```ignore
//! use diskxfer_core::{abort::AbortContext, device::FileBlockDevice, sender::SenderFsm};
//!
//! let mut device = FileBlockDevice::open_with_derived_geometry(path, 2, 18)?;
//! let geometry = device.geometry()?;
//! let mut fsm = SenderFsm::new(&mut device, &mut port, geometry, 0, 115200, AbortContext::global());
//! let summary = fsm.run()?;
//! ```

pub mod abort;
pub mod crc;
pub mod device;
pub mod error;
pub mod md5;
pub mod packet;
pub mod port;
pub mod progress;
pub mod readlog;
pub mod receiver;
pub mod retry;
pub mod sender;
pub mod status;

pub use error::{Error, Result};
