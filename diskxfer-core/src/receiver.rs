//! Receiver state machine (spec.md §4.5).
//!
//! Terminal only via external signal or inferred end-of-transfer (silence
//! following a prior ACK of the disk's last block); there is no explicit
//! `END` state here the way the sender has one, since the receiver cannot
//! know the disk size in advance.

use crate::error::Result;
use crate::packet::{encode_control, ControlPacket, FrameEvent, ResponseCode, SendDecoder, START_TOKEN};
use crate::port::SerialPort;
use log::{debug, info, warn};

/// States of the receiver FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Send,
    Check,
}

/// One action the receiver takes as a result of processing a block,
/// surfaced to the caller for progress display (spec.md §3 "original
/// source" per-block status characters).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Block `n` was accepted and persisted.
    Accepted(u32),
    /// Block `n` failed CRC or arrived out of order; a NAK was sent.
    Nacked(u32),
    /// The receiver resynced, telling the sender to rewind to block `n`.
    Resynced(u32),
    /// A duplicate, already-persisted block was ACK'd again without a
    /// rewrite.
    DuplicateAcked(u32),
}

/// A sink the receiver writes persisted sector payloads to, in strictly
/// increasing block order.
pub trait SectorSink {
    /// Persist one 512-byte payload for block `block_number`.
    fn write_block(&mut self, block_number: u32, data: &[u8]) -> Result<()>;
}

/// Drives a serial port and output sink through the receiver protocol.
pub struct ReceiverFsm<'a, P: SerialPort, S: SectorSink> {
    port: &'a mut P,
    sink: &'a mut S,
    decoder: SendDecoder,
    state: State,
    next_expected: u32,
    start_token_sent: bool,
}

impl<'a, P: SerialPort, S: SectorSink> ReceiverFsm<'a, P, S> {
    /// Build a receiver writing persisted sectors to `sink`.
    pub fn new(port: &'a mut P, sink: &'a mut S) -> Self {
        Self {
            port,
            sink,
            decoder: SendDecoder::new(),
            state: State::Start,
            next_expected: 0,
            start_token_sent: false,
        }
    }

    /// Highest block number ACK'd so far plus one (the next block the
    /// receiver is waiting for).
    #[must_use]
    pub fn next_expected(&self) -> u32 {
        self.next_expected
    }

    /// Run one iteration of the FSM, returning the block outcomes (if any)
    /// produced by this step. Callers loop this until an external abort
    /// signal fires or a silence timeout (caller-owned) fires after the
    /// last expected block has been ACK'd.
    pub fn tick(&mut self) -> Result<Vec<BlockOutcome>> {
        self.state = match self.state {
            State::Start => {
                self.emit_start_token()?;
                State::Send
            },
            State::Send => {
                self.drain_input()?;
                State::Check
            },
            State::Check => {
                let outcomes = self.check_buffered_frames()?;
                return Ok(outcomes);
            },
        };
        Ok(Vec::new())
    }

    fn emit_start_token(&mut self) -> Result<()> {
        if !self.start_token_sent {
            self.port.write_all_bytes(&[START_TOKEN])?;
            self.start_token_sent = true;
            debug!("emitted start token, waiting for first frame");
        }
        Ok(())
    }

    fn drain_input(&mut self) -> Result<()> {
        let mut buf = [0u8; 4096];
        let n = self.port.read_bytes(&mut buf)?;
        if n > 0 {
            self.decoder.feed(&buf[..n]);
        }
        Ok(())
    }

    fn check_buffered_frames(&mut self) -> Result<Vec<BlockOutcome>> {
        let events = self.decoder.drain_frames();
        let mut outcomes = Vec::with_capacity(events.len());

        for event in events {
            let frame = match event {
                FrameEvent::CrcFailed => {
                    let want = self.next_expected;
                    warn!("CRC failed on candidate frame, NAKing block {want}");
                    self.send_control(ResponseCode::Nak, want)?;
                    outcomes.push(BlockOutcome::Nacked(want));
                    continue;
                },
                FrameEvent::Valid(frame) => frame,
            };

            let n = frame.block_number;
            let want = self.next_expected;

            if n == want {
                self.sink.write_block(n, &frame.data)?;
                self.send_control(ResponseCode::Ack, want)?;
                self.next_expected = want + 1;
                outcomes.push(BlockOutcome::Accepted(want));
            } else if n > want {
                if want == 0 {
                    self.send_control(ResponseCode::Nak, want)?;
                    outcomes.push(BlockOutcome::Nacked(want));
                } else {
                    let rewind_to = want - 1;
                    warn!("receiver out of order: got {n}, wanted {want}, resyncing to {rewind_to}");
                    self.send_control(ResponseCode::Syn, rewind_to)?;
                    outcomes.push(BlockOutcome::Resynced(rewind_to));
                }
            } else {
                self.send_control(ResponseCode::Ack, want - 1)?;
                outcomes.push(BlockOutcome::DuplicateAcked(want - 1));
            }
        }

        Ok(outcomes)
    }

    fn send_control(&mut self, code: ResponseCode, block_number: u32) -> Result<()> {
        let packet = ControlPacket { code, block_number };
        let encoded = encode_control(&packet);
        self.port.write_all_bytes(&encoded)?;
        Ok(())
    }
}

impl<'a, P: SerialPort, S: SectorSink> Drop for ReceiverFsm<'a, P, S> {
    fn drop(&mut self) {
        info!("receiver finished at block {}", self.next_expected);
    }
}
