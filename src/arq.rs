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

//! Stop-and-wait transmission of information frames
//!
//! One frame is outstanding at a time. Each transmission arms a deadline and
//! waits for RR or REJ:
//! - RR(ns ^ 1) accepts the frame and flips the sequence bit.
//! - REJ(ns) retransmits at once with the retry budget restored.
//! - Silence until the deadline costs one retry.

use crate::error::{LinkError, Result};
use crate::frame::information_frame;
use crate::link::Link;
use crate::protocol::*;
use crate::recognizer::{Expect, Recognized, Recognizer};
use crate::timer::Deadline;

/// How one transmission attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Accepted,
    Rejected,
    TimedOut,
}

impl Link {
    /// Sends `payload` as one information frame and blocks until the peer
    /// acknowledges it. Returns the number of bytes the frame took on the wire.
    pub fn write(&mut self, payload: &[u8]) -> Result<usize> {
        if payload.is_empty() {
            return Err(LinkError::EmptyPayload);
        }
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(LinkError::PayloadTooLarge(payload.len()));
        }

        let frame = information_frame(A_TX, self.send_seq, payload);
        let max_retries = self.config.max_retries;
        let mut budget = max_retries;
        let mut attempts = 0;

        while budget > 0 {
            if attempts > 0 {
                self.stats.retransmissions += 1;
            }
            attempts += 1;

            // The port drains the frame before returning; the answer window opens after that
            self.port.write_all(&frame)?;
            let deadline = Deadline::after(self.config.timeout);
            self.stats.frames_sent += 1;
            log::debug!("Sent: I({}) with {} bytes ({} on the wire)", self.send_seq, payload.len(), frame.len());

            match self.await_response(&deadline)? {
                Outcome::Accepted => {
                    self.send_seq ^= 1;
                    self.stats.frames_accepted += 1;
                    return Ok(frame.len());
                }
                Outcome::Rejected => {
                    log::warn!("I({}) rejected, retransmitting", self.send_seq);
                    self.stats.rejects_received += 1;
                    budget = max_retries;
                }
                Outcome::TimedOut => {
                    self.stats.timeouts += 1;
                    budget -= 1;
                    log::warn!("I({}) timed out, {} retries left", self.send_seq, budget);
                }
            }
        }

        Err(LinkError::MaxRetriesExceeded { attempts })
    }

    fn await_response(&mut self, deadline: &Deadline) -> Result<Outcome> {
        let mut rec = Recognizer::new(A_TX, Expect::Response);

        while let Some(frame) = self.await_frame(&mut rec, deadline)? {
            let Recognized::Control(control) = frame else {
                continue;
            };
            let nr = response_seq(control);

            if is_rr(control) && nr != self.send_seq {
                log::debug!("Received: {}", control_name(control));
                return Ok(Outcome::Accepted);
            }
            if is_rej(control) && nr == self.send_seq {
                log::debug!("Received: {}", control_name(control));
                return Ok(Outcome::Rejected);
            }
            log::debug!("Ignoring stale {}", control_name(control));
        }

        Ok(Outcome::TimedOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::supervisory_frame;
    use std::time::Duration;
    use crate::link::Role;
    use crate::link::tests::{config, mock_link};
    use crate::serial::{script, DrainingPort};

    fn answer(control: u8) -> Vec<Option<u8>> {
        script(&supervisory_frame(A_TX, control))
    }

    #[test]
    fn test_write_embedded_specials_on_the_wire() {
        let expected_writes = vec![
            0x7E, 0x03, 0x00, 0x03,
            0x7D, 0x5E, 0x01, 0x7D, 0x5D,
            0x02,
            0x7E,
        ];

        let mut link = mock_link(Role::Transmitter, answer(rr(1)), expected_writes);
        assert_eq!(link.write(&[0x7E, 0x01, 0x7D]).unwrap(), 11);
        assert_eq!(link.send_seq, 1);
    }

    #[test]
    fn test_write_sequence_alternates() {
        let payloads: [&[u8]; 4] = [b"a", b"b", b"c", b"d"];

        let mut responses = Vec::new();
        let mut expected_writes = Vec::new();
        for (i, payload) in payloads.iter().enumerate() {
            let ns = (i % 2) as u8;
            expected_writes.extend(information_frame(A_TX, ns, payload));
            responses.extend(answer(rr(ns ^ 1)));
        }

        let mut link = mock_link(Role::Transmitter, responses, expected_writes);
        let mut seen = Vec::new();
        for payload in payloads {
            seen.push(link.send_seq);
            link.write(payload).unwrap();
        }
        assert_eq!(seen, vec![0, 1, 0, 1]);
        assert_eq!(link.send_seq, 0);
        assert_eq!(link.stats.retransmissions, 0);
    }

    #[test]
    fn test_write_retries_after_lost_acknowledgment() {
        let frame = information_frame(A_TX, 0, b"hello");

        let mut responses = vec![None];
        responses.extend(answer(rr(1)));
        let expected_writes = [frame.clone(), frame.clone()].concat();

        let mut link = mock_link(Role::Transmitter, responses, expected_writes);
        assert_eq!(link.write(b"hello").unwrap(), frame.len());
        assert_eq!(link.send_seq, 1);
        assert_eq!(link.stats.retransmissions, 1);
        assert_eq!(link.stats.timeouts, 1);
    }

    #[test]
    fn test_write_retransmits_on_reject() {
        let frame = information_frame(A_TX, 0, b"hello");

        let mut responses = answer(rej(0));
        responses.extend(answer(rr(1)));
        let expected_writes = frame.repeat(2);

        let mut link = mock_link(Role::Transmitter, responses, expected_writes);
        link.write(b"hello").unwrap();
        assert_eq!(link.stats.rejects_received, 1);
        assert_eq!(link.stats.timeouts, 0);
        assert_eq!(link.send_seq, 1);
    }

    #[test]
    fn test_reject_restores_retry_budget() {
        // Two retries: timeout, REJ, timeout, RR. Without the reset the
        // second timeout would end the write.
        let frame = information_frame(A_TX, 0, b"x");

        let mut responses = vec![None];
        responses.extend(answer(rej(0)));
        responses.push(None);
        responses.extend(answer(rr(1)));
        let expected_writes = frame.repeat(4);

        let mut link = mock_link(Role::Transmitter, responses, expected_writes);
        link.config.max_retries = 2;
        link.write(b"x").unwrap();
        assert_eq!(link.stats.retransmissions, 3);
        assert_eq!(link.stats.timeouts, 2);
    }

    #[test]
    fn test_write_gives_up_after_max_retries() {
        let frame = information_frame(A_TX, 0, b"lost");

        // A garbled RR is no answer at all
        let mut responses = script(&[FLAG, A_TX, rr(1), 0x00, FLAG]);
        responses.extend([None, None, None]);
        let expected_writes = frame.repeat(3);

        let mut link = mock_link(Role::Transmitter, responses, expected_writes);
        match link.write(b"lost") {
            Err(LinkError::MaxRetriesExceeded { attempts: 3 }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(link.send_seq, 0);
    }

    #[test]
    fn test_write_ignores_stale_answers() {
        let frame = information_frame(A_TX, 0, b"fresh");

        let mut responses = answer(rr(0));
        responses.extend(answer(rej(1)));
        responses.extend(answer(rr(1)));

        let mut link = mock_link(Role::Transmitter, responses, frame);
        link.write(b"fresh").unwrap();
        assert_eq!(link.stats.retransmissions, 0);
        assert_eq!(link.stats.rejects_received, 0);
    }

    #[test]
    fn test_answer_window_opens_after_frame_is_sent() {
        // Sending the frame takes twice the answer timeout; the RR is there right after
        let port = DrainingPort::new(Duration::from_millis(200), &supervisory_frame(A_TX, rr(1)));
        let mut link = Link::new(Box::new(port), config(Role::Transmitter));
        link.config.timeout = Duration::from_millis(100);

        let payload = [0x55; MAX_PAYLOAD_SIZE];
        assert_eq!(link.write(&payload).unwrap(), information_frame(A_TX, 0, &payload).len());
        assert_eq!(link.stats.timeouts, 0);
        assert_eq!(link.stats.retransmissions, 0);
        assert_eq!(link.send_seq, 1);
    }

    #[test]
    fn test_write_validates_payload_size() {
        let mut link = mock_link(Role::Transmitter, vec![], vec![]);
        assert!(matches!(link.write(&[]), Err(LinkError::EmptyPayload)));
        assert!(matches!(
            link.write(&[0u8; MAX_PAYLOAD_SIZE + 1]),
            Err(LinkError::PayloadTooLarge(1001))
        ));
    }

    #[test]
    fn test_write_accepts_largest_payload() {
        let payload = vec![FLAG; MAX_PAYLOAD_SIZE];
        let frame = information_frame(A_TX, 0, &payload);
        assert_eq!(frame.len(), 4 + 2 * MAX_PAYLOAD_SIZE + 1 + 1);

        let mut link = mock_link(Role::Transmitter, answer(rr(1)), frame);
        assert!(link.write(&payload).is_ok());
    }
}
