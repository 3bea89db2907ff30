// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use std::io::ErrorKind;
use std::time::Duration;
use serialport::{SerialPort as SerialPortTrait, DataBits, FlowControl, Parity, StopBits};

// ============================================================================
// SerialPort Trait
// ============================================================================

/// Raw byte channel under the link layer
pub trait SerialPort: Send {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()>;

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> std::io::Result<usize>;

    /// Waits at most `timeout` for one byte. `Ok(None)` means nothing arrived.
    fn read_byte(&mut self, timeout: Duration) -> std::io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.read_timeout(&mut buf, timeout) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// Real Serial Port Implementation
// ============================================================================

/// Serial port opened 8N1 without flow control through the serialport crate
pub struct RealSerialPort {
    port: Box<dyn SerialPortTrait>,
}

impl RealSerialPort {
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, serialport::Error> {
        let port = serialport::new(port_name, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()?;

        // Stale bytes from a previous session would only feed the recognizer noise
        port.clear(serialport::ClearBuffer::All)?;

        Ok(RealSerialPort { port })
    }
}

impl SerialPort for RealSerialPort {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.port.write_all(buf)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> std::io::Result<usize> {
        self.port.set_timeout(timeout)
            .map_err(std::io::Error::other)?;
        self.port.read(buf)
    }
}

// ============================================================================
// Mock Serial Port for Testing
// ============================================================================

#[cfg(test)]
pub struct MockSerialPort {
    // Data to return on reads (None = timeout)
    read_buffer: Vec<Option<u8>>,
    read_pos: usize,
    // Track what was written
    write_log: Vec<u8>,
    // Expected writes for verification
    expected_writes: Vec<u8>,
}

#[cfg(test)]
impl MockSerialPort {
    pub fn new(responses: Vec<Option<u8>>, expected_writes: Vec<u8>) -> Self {
        MockSerialPort {
            read_buffer: responses,
            read_pos: 0,
            write_log: Vec::new(),
            expected_writes,
        }
    }
}

#[cfg(test)]
impl SerialPort for MockSerialPort {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.write_log.extend_from_slice(buf);
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> std::io::Result<usize> {
        // Out of responses: fail loudly so a peer waiting without a deadline cannot spin forever
        if self.read_pos >= self.read_buffer.len() {
            return Err(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                "Mock script exhausted"
            ));
        }

        // If current response is None = timeout
        if self.read_buffer[self.read_pos].is_none() {
            self.read_pos += 1;
            return Err(std::io::Error::new(
                ErrorKind::TimedOut,
                "Mock timeout"
            ));
        }

        let mut bytes_read = 0;
        while bytes_read < buf.len() && self.read_pos < self.read_buffer.len() {
            match self.read_buffer[self.read_pos] {
                Some(byte) => {
                    buf[bytes_read] = byte;
                    bytes_read += 1;
                    self.read_pos += 1;
                }
                None => break,  // Stop at timeout marker
            }
        }

        Ok(bytes_read)
    }
}

#[cfg(test)]
impl Drop for MockSerialPort {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }

        assert_eq!(
            self.read_pos,
            self.read_buffer.len(),
            "MockSerialPort dropped with {} unconsumed responses (read {} of {} bytes)",
            self.read_buffer.len() - self.read_pos,
            self.read_pos,
            self.read_buffer.len()
        );

        assert_eq!(
            &self.write_log,
            &self.expected_writes,
            "MockSerialPort write log mismatch!\nExpected {} bytes:\n{:02X?}\nGot {} bytes:\n{:02X?}",
            self.expected_writes.len(),
            self.expected_writes,
            self.write_log.len(),
            self.write_log
        );
    }
}

/// Turns a byte string into a mock read script with no timeouts in it
#[cfg(test)]
pub fn script(bytes: &[u8]) -> Vec<Option<u8>> {
    bytes.iter().map(|&b| Some(b)).collect()
}

// ============================================================================
// Loopback Serial Ports for Two-Peer Testing
// ============================================================================

/// Rewrites each outgoing write before it reaches the peer (drop, corrupt, pass)
#[cfg(test)]
pub type FaultHook = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// One end of an in-memory null-modem cable
#[cfg(test)]
pub struct LoopbackPort {
    tx: std::sync::mpsc::Sender<u8>,
    rx: std::sync::mpsc::Receiver<u8>,
    fault: Option<FaultHook>,
}

#[cfg(test)]
impl LoopbackPort {
    pub fn pair() -> (LoopbackPort, LoopbackPort) {
        let (a_tx, b_rx) = std::sync::mpsc::channel();
        let (b_tx, a_rx) = std::sync::mpsc::channel();
        (
            LoopbackPort { tx: a_tx, rx: a_rx, fault: None },
            LoopbackPort { tx: b_tx, rx: b_rx, fault: None },
        )
    }

    pub fn with_fault(mut self, fault: FaultHook) -> Self {
        self.fault = Some(fault);
        self
    }
}

#[cfg(test)]
impl SerialPort for LoopbackPort {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        let bytes = match self.fault.as_mut() {
            Some(fault) => fault(buf),
            None => buf.to_vec(),
        };
        // A hung-up peer just means nobody is listening on the line
        for byte in bytes {
            let _ = self.tx.send(byte);
        }
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.rx.recv_timeout(timeout) {
            Ok(byte) => {
                buf[0] = byte;
                Ok(1)
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => Err(std::io::Error::new(
                ErrorKind::TimedOut,
                "Loopback timeout"
            )),
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => Err(std::io::Error::new(
                ErrorKind::BrokenPipe,
                "Loopback peer hung up"
            )),
        }
    }
}

// ============================================================================
// Slow Line for Transmission Time Testing
// ============================================================================

/// Port whose `write_all` blocks for `drain` like a real port flushing at a
/// low baud rate. Once a write finishes, `reply` is queued for reading.
#[cfg(test)]
pub struct DrainingPort {
    drain: Duration,
    reply: Vec<u8>,
    inbound: std::collections::VecDeque<u8>,
}

#[cfg(test)]
impl DrainingPort {
    pub fn new(drain: Duration, reply: &[u8]) -> Self {
        DrainingPort {
            drain,
            reply: reply.to_vec(),
            inbound: std::collections::VecDeque::new(),
        }
    }
}

#[cfg(test)]
impl SerialPort for DrainingPort {
    fn write_all(&mut self, _buf: &[u8]) -> std::io::Result<()> {
        std::thread::sleep(self.drain);
        self.inbound.extend(self.reply.iter().copied());
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> std::io::Result<usize> {
        match self.inbound.pop_front() {
            Some(byte) if !buf.is_empty() => {
                buf[0] = byte;
                Ok(1)
            }
            _ => Err(std::io::Error::new(ErrorKind::TimedOut, "Nothing on the line")),
        }
    }
}
