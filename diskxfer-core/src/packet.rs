//! Packet layout, CRC-protected framing, and stream resync (spec.md §4.1).
//!
//! Two shapes travel the wire, each a fixed number of bytes so the decoder
//! never needs to buffer an unbounded amount before it knows whether a
//! candidate frame is valid:
//!
//! ```text
//! SendPacket    (521 bytes): SOH | block_number:u32be | data[512] | crc32:u32be
//! ControlPacket (  9 bytes): response_code | block_number:u32be | crc32:u32be
//! ```

use crate::crc::crc32;
use crate::device::SECTOR_SIZE;
use byteorder::{BigEndian, ByteOrder};

/// Start-of-header byte leading every `SendPacket`.
pub const SOH: u8 = 0x01;

/// Single unframed byte the receiver emits to request CRC framing.
pub const START_TOKEN: u8 = b'C';

/// Wire size of a `SendPacket`.
pub const SEND_PACKET_SIZE: usize = 1 + 4 + SECTOR_SIZE + 4;

/// Wire size of a `ControlPacket`.
pub const CONTROL_PACKET_SIZE: usize = 1 + 4 + 4;

/// One sector framed for transmission from sender to receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendPacket {
    /// Zero-based block number, counting from `start_sector`.
    pub block_number: u32,
    /// The sector's 512-byte payload.
    pub data: [u8; SECTOR_SIZE],
}

/// One of `{ACK, NAK, SYN}`, sent from receiver to sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    /// Block `block_number` was accepted.
    Ack,
    /// Block `block_number` is the one currently demanded (expected next).
    Nak,
    /// The receiver resynced; `block_number` is the last block it
    /// successfully acknowledged.
    Syn,
}

impl ResponseCode {
    const fn to_byte(self) -> u8 {
        match self {
            Self::Ack => 0x06,
            Self::Nak => 0x15,
            Self::Syn => 0x16,
        }
    }

    const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x06 => Some(Self::Ack),
            0x15 => Some(Self::Nak),
            0x16 => Some(Self::Syn),
            _ => None,
        }
    }
}

/// A control packet carrying one of `{ACK, NAK, SYN}` plus a block number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPacket {
    /// Which response this is.
    pub code: ResponseCode,
    /// Meaning depends on `code`: the accepted block for ACK, the demanded
    /// block for NAK, the last-confirmed block for SYN.
    pub block_number: u32,
}

/// Encode a `SendPacket` to its 521-byte wire form.
#[must_use]
pub fn encode_send(packet: &SendPacket) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SEND_PACKET_SIZE);
    buf.push(SOH);
    let mut block_bytes = [0u8; 4];
    BigEndian::write_u32(&mut block_bytes, packet.block_number);
    buf.extend_from_slice(&block_bytes);
    buf.extend_from_slice(&packet.data);
    let crc = crc32(&buf);
    let mut crc_bytes = [0u8; 4];
    BigEndian::write_u32(&mut crc_bytes, crc);
    buf.extend_from_slice(&crc_bytes);
    buf
}

/// Encode a `ControlPacket` to its 9-byte wire form.
#[must_use]
pub fn encode_control(packet: &ControlPacket) -> [u8; CONTROL_PACKET_SIZE] {
    let mut buf = [0u8; CONTROL_PACKET_SIZE];
    buf[0] = packet.code.to_byte();
    BigEndian::write_u32(&mut buf[1..5], packet.block_number);
    let crc = crc32(&buf[0..5]);
    BigEndian::write_u32(&mut buf[5..9], crc);
    buf
}

/// Validate and parse a candidate 521-byte window as a `SendPacket`.
fn try_parse_send(window: &[u8]) -> Option<SendPacket> {
    if window.len() < SEND_PACKET_SIZE || window[0] != SOH {
        return None;
    }
    let body = &window[0..517];
    let expected_crc = BigEndian::read_u32(&window[517..521]);
    if crc32(body) != expected_crc {
        return None;
    }
    let block_number = BigEndian::read_u32(&window[1..5]);
    let mut data = [0u8; SECTOR_SIZE];
    data.copy_from_slice(&window[5..517]);
    Some(SendPacket { block_number, data })
}

/// Validate and parse an exact 9-byte window as a `ControlPacket`.
fn try_parse_control(window: &[u8]) -> Option<ControlPacket> {
    if window.len() != CONTROL_PACKET_SIZE {
        return None;
    }
    let code = ResponseCode::from_byte(window[0])?;
    let expected_crc = BigEndian::read_u32(&window[5..9]);
    if crc32(&window[0..5]) != expected_crc {
        return None;
    }
    let block_number = BigEndian::read_u32(&window[1..5]);
    Some(ControlPacket { code, block_number })
}

/// Stateful decoder the sender uses to read `ControlPacket`s out of a
/// possibly-noisy byte stream.
///
/// Bytes are pushed in as they arrive; `poll` attempts to find a
/// CRC-valid 9-byte frame by sliding a one-byte window forward whenever
/// validation fails, tolerating arbitrary leading garbage and midstream
/// noise (spec.md §4.1).
#[derive(Default)]
pub struct ControlDecoder {
    buffer: Vec<u8>,
}

impl ControlDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed newly-read bytes into the decoder.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Try to extract one valid `ControlPacket`. Returns `None` if not
    /// enough bytes have accumulated yet, or no valid frame has been
    /// found in the bytes seen so far (in which case all-but-the-last
    /// `CONTROL_PACKET_SIZE - 1` bytes have been discarded as garbage).
    pub fn poll(&mut self) -> Option<ControlPacket> {
        loop {
            if self.buffer.len() < CONTROL_PACKET_SIZE {
                return None;
            }
            if let Some(packet) = try_parse_control(&self.buffer[0..CONTROL_PACKET_SIZE]) {
                self.buffer.drain(0..CONTROL_PACKET_SIZE);
                return Some(packet);
            }
            self.buffer.remove(0);
        }
    }
}

/// Maximum number of `SendPacket`s the receiver's resync buffer holds
/// before frames are dropped to bound memory use (spec.md §4.1: "up to
/// 16 × 521 bytes").
pub const SEND_RESYNC_CAPACITY: usize = 16 * SEND_PACKET_SIZE;

/// One frame-shaped event surfaced while draining buffered bytes.
///
/// A `CrcFailed` event fires once per `SOH`-led candidate that fails CRC
/// validation, giving the receiver FSM the "first misalignment" signal
/// spec.md §4.5 asks CHECK to act on (it would otherwise only ever see
/// frames that already passed CRC).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A complete, CRC-valid packet.
    Valid(SendPacket),
    /// A candidate frame starting with `SOH` failed CRC validation.
    CrcFailed,
}

/// Stateful decoder the receiver uses to read `SendPacket`s out of a
/// possibly-noisy byte stream, scanning forward for `SOH` candidates.
#[derive(Default)]
pub struct SendDecoder {
    buffer: Vec<u8>,
}

impl SendDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed newly-read bytes into the decoder, capped at
    /// `SEND_RESYNC_CAPACITY` (oldest bytes are dropped first).
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        if self.buffer.len() > SEND_RESYNC_CAPACITY {
            let excess = self.buffer.len() - SEND_RESYNC_CAPACITY;
            self.buffer.drain(0..excess);
        }
    }

    /// Try to extract every frame-shaped event currently buffered, in
    /// order, consuming the bytes they occupied. Bytes that never form a
    /// candidate frame (garbage, or a candidate still missing bytes) are
    /// left in the buffer for the next `feed`/`drain_frames` call.
    pub fn drain_frames(&mut self) -> Vec<FrameEvent> {
        let mut frames = Vec::new();
        let mut offset = 0;
        while offset + SEND_PACKET_SIZE <= self.buffer.len() {
            if self.buffer[offset] != SOH {
                offset += 1;
                continue;
            }
            match try_parse_send(&self.buffer[offset..offset + SEND_PACKET_SIZE]) {
                Some(packet) => {
                    frames.push(FrameEvent::Valid(packet));
                    offset += SEND_PACKET_SIZE;
                },
                None => {
                    frames.push(FrameEvent::CrcFailed);
                    offset += 1;
                },
            }
        }
        self.buffer.drain(0..offset);
        frames
    }

    /// Number of bytes currently buffered, awaiting more data or a frame
    /// boundary.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}
