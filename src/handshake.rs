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

//! Connection setup and teardown
//!
//! ```text
//! open:   TX --SET--> RX      close:  TX --DISC--> RX
//!         TX <--UA--- RX              TX <--DISC-- RX
//!                                     TX ---UA---> RX (not awaited)
//! ```
//! The transmitter retries on timeout; the receiver waits as long as it takes.

use crate::error::{LinkError, Result};
use crate::link::Link;
use crate::protocol::*;
use crate::recognizer::{Expect, Recognized, Recognizer};
use crate::timer::Deadline;

impl Link {
    /// Transmitter side of open: SET until UA.
    pub(crate) fn establish(&mut self) -> Result<()> {
        self.exchange(SET, A_TX, Expect::Ua)
    }

    /// Receiver side of open: wait for SET, answer UA.
    pub(crate) fn accept(&mut self) -> Result<()> {
        let mut rec = Recognizer::new(A_TX, Expect::Set);
        self.await_frame_unbounded(&mut rec)?;
        log::debug!("Received: SET");
        self.send_control(A_TX, UA)
    }

    /// Transmitter side of close: DISC until DISC, then the final UA. The UA
    /// goes out under A_TX like every other frame the transmitter originates.
    pub(crate) fn disconnect(&mut self) -> Result<()> {
        self.exchange(DISC, A_RX, Expect::Disc)?;
        self.send_control(A_TX, UA)
    }

    /// Receiver side of close: wait for DISC, answer DISC.
    ///
    /// If our RR for the last information frame went missing, the transmitter
    /// is still retransmitting it instead of sending DISC, so duplicates are
    /// acknowledged here. The final UA is not waited for.
    pub(crate) fn await_disconnect(&mut self) -> Result<()> {
        let mut rec = Recognizer::new(A_TX, Expect::Teardown);
        loop {
            match self.await_frame_unbounded(&mut rec)? {
                Recognized::Control(DISC) => break,
                Recognized::Information { seq, .. } if seq != self.recv_seq => {
                    log::debug!("Duplicate I({}) during teardown, acknowledging again", seq);
                    self.stats.duplicates += 1;
                    self.send_control(A_TX, rr(self.recv_seq))?;
                }
                Recognized::Information { seq, payload, .. } => {
                    log::warn!("Discarding new I({}) with {} bytes received during teardown", seq, payload.len());
                }
                Recognized::Control(control) => {
                    log::debug!("Ignoring {} during teardown", control_name(control));
                }
            }
        }
        log::debug!("Received: DISC");
        self.send_control(A_RX, DISC)
    }

    /// Sends `command` and waits for the frame `expect` describes, retrying
    /// on timeout up to `max_retries` transmissions.
    fn exchange(&mut self, command: u8, reply_address: u8, expect: Expect) -> Result<()> {
        let attempts = self.config.max_retries;

        for attempt in 1..=attempts {
            if attempt > 1 {
                self.stats.retransmissions += 1;
            }

            self.send_control(A_TX, command)?;
            let deadline = Deadline::after(self.config.timeout);

            let mut rec = Recognizer::new(reply_address, expect);
            if let Some(frame) = self.await_frame(&mut rec, &deadline)? {
                log::debug!("Received: {:?}", frame);
                return Ok(());
            }

            self.stats.timeouts += 1;
            log::warn!("No answer to {} (attempt {}/{})", control_name(command), attempt, attempts);
        }

        Err(LinkError::HandshakeFailed { attempts })
    }
}
