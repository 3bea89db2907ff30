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

//! Byte-driven frame recognizer
//!
//! One state machine serves every phase of the link. What differs between
//! phases is only which address and control bytes are welcome, captured by
//! [`Expect`]. Anything unexpected drops back to `Idle` without an error; a
//! delimiter seen mid-frame restarts at `DelimiterSeen` so a truncated frame
//! followed by a good one still yields the good one.

use std::mem;
use crate::frame::{bcc, Unescaper};
use crate::protocol::*;

// ============================================================================
// Acceptance
// ============================================================================

/// Which control bytes a recognizer waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    Set,
    Ua,
    Disc,
    /// RR or REJ, either sequence bit
    Response,
    /// I(0) or I(1). A repeated SET is let through too, so the receiver can
    /// answer a transmitter whose UA got lost.
    Information,
    /// DISC, or a retransmitted information frame whose RR got lost
    Teardown,
}

impl Expect {
    pub fn accepts(self, control: u8) -> bool {
        match self {
            Expect::Set => control == SET,
            Expect::Ua => control == UA,
            Expect::Disc => control == DISC,
            Expect::Response => is_rr(control) || is_rej(control),
            Expect::Information => is_info(control) || control == SET,
            Expect::Teardown => is_info(control) || control == DISC,
        }
    }
}

/// A complete frame that passed the header check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognized {
    Control(u8),
    Information {
        seq: u8,
        payload: Vec<u8>,
        /// BCC2 matched the destuffed payload
        intact: bool,
    },
}

// ============================================================================
// States
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    DelimiterSeen,
    AddressSeen,
    ControlSeen,
    /// Header check passed. Control frames wait for the closing flag here,
    /// information frames accumulate their payload.
    ChecksumVerified,
}

// ============================================================================
// Recognizer
// ============================================================================

pub struct Recognizer {
    address: u8,
    expect: Expect,
    state: State,
    control: u8,
    payload: Vec<u8>,
    unescape: Unescaper,
}

impl Recognizer {
    pub fn new(address: u8, expect: Expect) -> Self {
        let capacity = match expect {
            Expect::Information | Expect::Teardown => MAX_PAYLOAD_SIZE + 1,
            _ => 0,
        };
        Recognizer {
            address,
            expect,
            state: State::Idle,
            control: 0,
            payload: Vec::with_capacity(capacity),
            unescape: Unescaper::default(),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> State {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.payload.clear();
        self.unescape.reset();
    }

    fn restart(&mut self) {
        self.reset();
        self.state = State::DelimiterSeen;
    }

    /// Advances the machine by one wire byte.
    pub fn feed(&mut self, byte: u8) -> Option<Recognized> {
        match self.state {
            State::Idle => {
                if byte == FLAG {
                    self.state = State::DelimiterSeen;
                }
                None
            }
            State::DelimiterSeen => {
                if byte == self.address {
                    self.state = State::AddressSeen;
                } else if byte != FLAG {
                    self.state = State::Idle;
                }
                None
            }
            State::AddressSeen => {
                if byte == FLAG {
                    self.restart();
                } else if self.expect.accepts(byte) {
                    self.control = byte;
                    self.state = State::ControlSeen;
                } else {
                    log::debug!("Ignoring control {} while waiting for {:?}", control_name(byte), self.expect);
                    self.state = State::Idle;
                }
                None
            }
            State::ControlSeen => {
                if byte == FLAG {
                    self.restart();
                } else if byte == self.address ^ self.control {
                    self.payload.clear();
                    self.unescape.reset();
                    self.state = State::ChecksumVerified;
                } else {
                    log::warn!("Header checksum mismatch on {}, resynchronizing", control_name(self.control));
                    self.state = State::Idle;
                }
                None
            }
            State::ChecksumVerified if !is_info(self.control) => {
                self.state = State::Idle;
                if byte == FLAG {
                    Some(Recognized::Control(self.control))
                } else {
                    log::debug!("Missing closing flag after {}", control_name(self.control));
                    None
                }
            }
            State::ChecksumVerified => self.feed_payload(byte),
        }
    }

    fn feed_payload(&mut self, byte: u8) -> Option<Recognized> {
        if byte == FLAG {
            if self.unescape.is_pending() || self.payload.is_empty() {
                // Aborted or empty frame; this flag may open the next one
                log::warn!("Discarding truncated information frame");
                self.restart();
                return None;
            }

            let received_bcc = self.payload.pop().unwrap_or_default();
            let payload = mem::take(&mut self.payload);
            let intact = bcc(&payload) == received_bcc;
            self.reset();

            return Some(Recognized::Information {
                seq: info_seq(self.control),
                payload,
                intact,
            });
        }

        if let Some(decoded) = self.unescape.feed(byte) {
            // Room for the payload plus its trailing BCC2
            if self.payload.len() > MAX_PAYLOAD_SIZE {
                log::warn!("Information frame exceeds {} bytes, resynchronizing", MAX_PAYLOAD_SIZE);
                self.reset();
                return None;
            }
            self.payload.push(decoded);
        }
        None
    }
}

// ============================================================================
// Tests
// ============================================================================
