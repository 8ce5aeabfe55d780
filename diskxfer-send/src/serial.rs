//! Concrete [`diskxfer_core::port::SerialPort`] over the `serialport` crate.
//!
//! Grounded on `hisiflash::connection::serial::SerialPort`'s open/configure
//! shape: fixed 8N1, no flow control, a short read timeout so `read_bytes`
//! returns `0` instead of blocking when nothing is waiting.

use diskxfer_core::error::{Error, Result};
use diskxfer_core::port::SerialPort;
use serialport::{DataBits, FlowControl, Parity, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// A real OS serial device, opened 8N1 with no flow control.
pub struct NativeSerialPort {
    port: Box<dyn serialport::SerialPort>,
}

impl NativeSerialPort {
    /// Open `path` at `baud`, with a short read timeout so polling stays
    /// non-blocking from the FSMs' point of view.
    pub fn open(path: &str, baud: u32) -> Result<Self> {
        let port = serialport::new(path, baud)
            .timeout(Duration::from_millis(10))
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open()
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        Ok(Self { port })
    }
}

impl SerialPort for NativeSerialPort {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(self.port.write(buf)?)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}
