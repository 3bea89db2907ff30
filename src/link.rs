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

//! Link session: configuration, open/close and the receiving half of the
//! stop-and-wait protocol. The sending half lives in `arq`, the handshakes in
//! `handshake`.

use std::time::Duration;
use crate::error::{LinkError, Result};
use crate::frame::supervisory_frame;
use crate::protocol::*;
use crate::recognizer::{Expect, Recognized, Recognizer};
use crate::serial::{RealSerialPort, SerialPort};
use crate::timer::{Deadline, POLL_INTERVAL};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Active side: opens the connection, writes, and tears it down
    Transmitter,
    /// Passive side: waits for the transmitter and reads
    Receiver,
}

/// Fixed for the lifetime of a `Link`
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub port: String,
    pub role: Role,
    pub baud_rate: u32,
    /// Transmissions of one frame before giving up
    pub max_retries: u32,
    /// Wait for an answer to each transmission
    pub timeout: Duration,
}

/// Counters kept over the life of a link and reported on close
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    pub frames_sent: u64,
    pub frames_accepted: u64,
    pub retransmissions: u64,
    pub timeouts: u64,
    pub rejects_sent: u64,
    pub rejects_received: u64,
    pub duplicates: u64,
}

// ============================================================================
// Link
// ============================================================================

/// An open connection. Owns the transport exclusively; dropping or closing
/// the link releases it.
pub struct Link {
    pub(crate) port: Box<dyn SerialPort>,
    pub(crate) config: LinkConfig,
    /// Sequence bit of the next information frame this side sends
    pub(crate) send_seq: u8,
    /// Sequence bit of the next information frame this side accepts
    pub(crate) recv_seq: u8,
    pub(crate) stats: LinkStats,
}

impl Link {
    /// Opens the configured serial port and runs the connection handshake.
    pub fn open(config: LinkConfig) -> Result<Link> {
        log::info!("Opening {} at {} baud", config.port, config.baud_rate);
        let port = RealSerialPort::open(&config.port, config.baud_rate)?;
        Link::connect(Box::new(port), config)
    }

    /// Runs the connection handshake over an already open transport.
    pub fn connect(port: Box<dyn SerialPort>, config: LinkConfig) -> Result<Link> {
        let mut link = Link::new(port, config);
        match link.config.role {
            Role::Transmitter => link.establish()?,
            Role::Receiver => link.accept()?,
        }
        log::info!("Connection established ({:?})", link.config.role);
        Ok(link)
    }

    pub(crate) fn new(port: Box<dyn SerialPort>, config: LinkConfig) -> Link {
        Link {
            port,
            config,
            send_seq: 0,
            recv_seq: 0,
            stats: LinkStats::default(),
        }
    }

    /// Runs the teardown handshake and releases the transport.
    pub fn close(mut self) -> Result<LinkStats> {
        match self.config.role {
            Role::Transmitter => self.disconnect()?,
            Role::Receiver => self.await_disconnect()?,
        }

        let s = self.stats;
        log::info!(
            "Connection closed: {} frames sent, {} accepted, {} retransmissions, {} timeouts, \
             {} REJ sent, {} REJ received, {} duplicates",
            s.frames_sent, s.frames_accepted, s.retransmissions, s.timeouts,
            s.rejects_sent, s.rejects_received, s.duplicates
        );
        Ok(s)
    }

    /// Blocks until one information frame arrives and returns its payload.
    ///
    /// An empty result means a retransmission of the last delivered frame was
    /// absorbed: nothing new, read again. `ChecksumMismatch` means a new frame
    /// was rejected; the session is intact and the caller should read again.
    pub fn read(&mut self) -> Result<Vec<u8>> {
        let mut rec = Recognizer::new(A_TX, Expect::Information);
        loop {
            match self.await_frame_unbounded(&mut rec)? {
                Recognized::Information { seq, payload, intact } => {
                    return self.deliver(seq, payload, intact);
                }
                Recognized::Control(SET) => {
                    log::warn!("Transmitter repeated SET, our UA was lost; answering again");
                    self.send_control(A_TX, UA)?;
                }
                Recognized::Control(control) => {
                    log::debug!("Ignoring {} while reading", control_name(control));
                }
            }
        }
    }

    fn deliver(&mut self, seq: u8, payload: Vec<u8>, intact: bool) -> Result<Vec<u8>> {
        let expected = self.recv_seq;
        let duplicate = seq != expected;

        match (intact, duplicate) {
            (true, false) => {
                log::debug!("Received: I({}) with {} bytes", seq, payload.len());
                self.recv_seq ^= 1;
                self.stats.frames_accepted += 1;
                self.send_control(A_TX, rr(self.recv_seq))?;
                Ok(payload)
            }
            (false, false) => {
                log::warn!("Payload checksum mismatch on I({}), rejecting", seq);
                self.stats.rejects_sent += 1;
                self.send_control(A_TX, rej(expected))?;
                Err(LinkError::ChecksumMismatch)
            }
            (_, true) => {
                // A corrupt copy of a frame we already hold is just as useless
                // as a clean one; acknowledging again is enough
                log::debug!("Duplicate I({}) (intact: {}), acknowledging again", seq, intact);
                self.stats.duplicates += 1;
                self.send_control(A_TX, rr(expected))?;
                Ok(Vec::new())
            }
        }
    }

    // ------------------------------------------------------------------------
    // Shared plumbing
    // ------------------------------------------------------------------------

    pub(crate) fn send_control(&mut self, address: u8, control: u8) -> Result<()> {
        self.port.write_all(&supervisory_frame(address, control))?;
        self.stats.frames_sent += 1;
        log::debug!("Sent: {}", control_name(control));
        Ok(())
    }

    /// Feeds incoming bytes to `rec` until it yields a frame or `deadline` passes.
    ///
    /// A read that comes back empty was bounded by the remaining time, so it
    /// ends the wait.
    pub(crate) fn await_frame(&mut self, rec: &mut Recognizer, deadline: &Deadline) -> Result<Option<Recognized>> {
        while let Some(remaining) = deadline.remaining() {
            match self.port.read_byte(remaining)? {
                Some(byte) => {
                    if let Some(frame) = rec.feed(byte) {
                        return Ok(Some(frame));
                    }
                }
                None => break,
            }
        }
        Ok(None)
    }

    /// Like `await_frame` but never gives up.
    pub(crate) fn await_frame_unbounded(&mut self, rec: &mut Recognizer) -> Result<Recognized> {
        loop {
            if let Some(byte) = self.port.read_byte(POLL_INTERVAL)? {
                if let Some(frame) = rec.feed(byte) {
                    return Ok(frame);
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
