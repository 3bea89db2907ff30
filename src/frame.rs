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

//! Frame construction, XOR checksums and byte stuffing
//!
//! ```text
//! FLAG | A | C | A^C | stuffed payload | stuffed BCC2 | FLAG
//! ```
//! Supervisory and unnumbered frames stop after `A^C`.

use crate::protocol::*;

/// Bytes of an information frame that are not payload, before stuffing
pub const INFO_OVERHEAD: usize = 6;

/// XOR-fold, used for both the header and the payload check byte
pub fn bcc(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

pub fn supervisory_frame(address: u8, control: u8) -> [u8; 5] {
    [FLAG, address, control, address ^ control, FLAG]
}

/// Appends `byte` to `out`, escaping it if it would be mistaken for framing
pub fn stuff_byte(out: &mut Vec<u8>, byte: u8) {
    match byte {
        FLAG | ESC => {
            out.push(ESC);
            out.push(byte ^ ESCAPE_MASK);
        }
        _ => out.push(byte),
    }
}

#[cfg(test)]
pub fn stuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 8);
    for &byte in data {
        stuff_byte(&mut out, byte);
    }
    out
}

/// Reverses `stuff`. A trailing lone escape is dropped. The recognizer does
/// the same one byte at a time through `Unescaper`.
#[cfg(test)]
pub fn destuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut unescape = Unescaper::default();
    for &byte in data {
        if let Some(b) = unescape.feed(byte) {
            out.push(b);
        }
    }
    out
}

/// Builds an information frame carrying `payload` with sequence bit `ns`.
///
/// BCC2 is computed over the raw payload and then stuffed along with it.
pub fn information_frame(address: u8, ns: u8, payload: &[u8]) -> Vec<u8> {
    let control = info(ns);

    // Worst case every byte doubles; reserving that once avoids regrowth mid-frame
    let mut frame = Vec::with_capacity(INFO_OVERHEAD + 2 * (payload.len() + 1));
    frame.extend_from_slice(&[FLAG, address, control, address ^ control]);
    for &byte in payload {
        stuff_byte(&mut frame, byte);
    }
    stuff_byte(&mut frame, bcc(payload));
    frame.push(FLAG);
    frame
}

/// Incremental escape removal, one wire byte at a time
#[derive(Debug, Default, Clone, Copy)]
pub struct Unescaper {
    pending: bool,
}

impl Unescaper {
    /// Returns the decoded byte, or `None` when `byte` was an escape prefix.
    pub fn feed(&mut self, byte: u8) -> Option<u8> {
        if self.pending {
            self.pending = false;
            Some(byte ^ ESCAPE_MASK)
        } else if byte == ESC {
            self.pending = true;
            None
        } else {
            Some(byte)
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn reset(&mut self) {
        self.pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supervisory_frame() {
        assert_eq!(supervisory_frame(A_TX, SET), [0x7E, 0x03, 0x03, 0x00, 0x7E]);
        assert_eq!(supervisory_frame(A_RX, DISC), [0x7E, 0x01, 0x0B, 0x0A, 0x7E]);
        assert_eq!(supervisory_frame(A_TX, rr(1)), [0x7E, 0x03, 0x85, 0x86, 0x7E]);
    }

    #[test]
    fn test_bcc() {
        assert_eq!(bcc(&[]), 0);
        assert_eq!(bcc(&[0x7E, 0x01, 0x7D]), 0x02);
        assert_eq!(bcc(&[0xAA, 0xAA]), 0);
        assert_eq!(bcc(&[0x01, 0x02, 0x04]), 0x07);
    }

    #[test]
    fn test_stuff_escapes_flag_and_escape() {
        assert_eq!(stuff(&[0x7E]), vec![0x7D, 0x5E]);
        assert_eq!(stuff(&[0x7D]), vec![0x7D, 0x5D]);
        assert_eq!(stuff(&[0x01, 0x02]), vec![0x01, 0x02]);
        assert_eq!(
            stuff(&[0x7E, 0x7E, 0x7D, 0x7D]),
            vec![0x7D, 0x5E, 0x7D, 0x5E, 0x7D, 0x5D, 0x7D, 0x5D]
        );
    }

    #[test]
    fn test_destuff_reverses_stuff() {
        let payloads: [&[u8]; 6] = [
            &[],
            &[0x7E],
            &[0x7D, 0x7E, 0x7D],
            &[0x7D, 0x5E],
            b"plain text with no specials",
            &[0x00, 0x7E, 0xFF, 0x7D, 0x20, 0x5D, 0x5E],
        ];
        for payload in payloads {
            assert_eq!(destuff(&stuff(payload)), payload, "payload {:02X?}", payload);
        }

        let every_byte: Vec<u8> = (0..=255u8).chain((0..=255u8).rev()).collect();
        assert_eq!(destuff(&stuff(&every_byte)), every_byte);
    }

    #[test]
    fn test_stuffed_data_has_no_raw_flag() {
        let every_byte: Vec<u8> = (0..=255u8).collect();
        assert!(!stuff(&every_byte).contains(&FLAG));
    }

    #[test]
    fn test_information_frame_with_embedded_specials() {
        let frame = information_frame(A_TX, 0, &[0x7E, 0x01, 0x7D]);
        assert_eq!(
            frame,
            vec![0x7E, 0x03, 0x00, 0x03, 0x7D, 0x5E, 0x01, 0x7D, 0x5D, 0x02, 0x7E]
        );
    }

    #[test]
    fn test_information_frame_stuffs_checksum() {
        // 0x7C ^ 0x02 == 0x7E, so BCC2 itself must be escaped
        let frame = information_frame(A_TX, 1, &[0x7C, 0x02]);
        assert_eq!(
            frame,
            vec![0x7E, 0x03, 0x40, 0x43, 0x7C, 0x02, 0x7D, 0x5E, 0x7E]
        );

        // 0x7C ^ 0x01 == 0x7D
        let frame = information_frame(A_TX, 0, &[0x7C, 0x01]);
        assert_eq!(&frame[6..], &[0x7D, 0x5D, 0x7E]);
    }

    #[test]
    fn test_unescaper_state() {
        let mut u = Unescaper::default();
        assert_eq!(u.feed(0x41), Some(0x41));
        assert_eq!(u.feed(ESC), None);
        assert!(u.is_pending());
        assert_eq!(u.feed(0x5E), Some(FLAG));
        assert!(!u.is_pending());
        u.feed(ESC);
        u.reset();
        assert_eq!(u.feed(0x5E), Some(0x5E));
    }
}
