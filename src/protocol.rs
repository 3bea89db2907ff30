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

//! Link layer protocol constants

/// Frame delimiter - opens and closes every frame
pub const FLAG: u8 = 0x7E;

/// Escape - the next byte on the wire is XORed with `ESCAPE_MASK`
pub const ESC: u8 = 0x7D;

pub const ESCAPE_MASK: u8 = 0x20;

/// Address of commands sent by the transmitter, of the receiver's replies to them,
/// and of the transmitter's closing UA
pub const A_TX: u8 = 0x03;

/// Address of the receiver's DISC on teardown
pub const A_RX: u8 = 0x01;

/// Set up - transmitter opens the connection
pub const SET: u8 = 0x03;

/// Unnumbered acknowledgment - answers SET, and the receiver's DISC on teardown
pub const UA: u8 = 0x07;

/// Disconnect - either side tears the connection down
pub const DISC: u8 = 0x0B;

/// Largest payload the application layer may hand to a single `write`
pub const MAX_PAYLOAD_SIZE: usize = 1000;

/// Information frame control byte carrying sequence bit `ns`
pub const fn info(ns: u8) -> u8 {
    (ns & 1) << 6
}

/// Receiver ready - positive acknowledgment, `nr` is the next expected sequence bit
pub const fn rr(nr: u8) -> u8 {
    ((nr & 1) << 7) | 0x05
}

/// Reject - negative acknowledgment, `nr` is the sequence bit to retransmit
pub const fn rej(nr: u8) -> u8 {
    ((nr & 1) << 7) | 0x01
}

/// Sequence bit of an information frame control byte
pub const fn info_seq(control: u8) -> u8 {
    (control >> 6) & 1
}

/// Sequence bit of an RR or REJ control byte
pub const fn response_seq(control: u8) -> u8 {
    control >> 7
}

pub fn is_info(control: u8) -> bool {
    control == info(0) || control == info(1)
}

pub fn is_rr(control: u8) -> bool {
    control == rr(0) || control == rr(1)
}

pub fn is_rej(control: u8) -> bool {
    control == rej(0) || control == rej(1)
}

/// Human readable control byte, for logging
pub fn control_name(control: u8) -> String {
    match control {
        SET => "SET".to_string(),
        UA => "UA".to_string(),
        DISC => "DISC".to_string(),
        c if is_info(c) => format!("I({})", info_seq(c)),
        c if is_rr(c) => format!("RR({})", response_seq(c)),
        c if is_rej(c) => format!("REJ({})", response_seq(c)),
        c => format!("0x{:02X}", c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_encodings() {
        assert_eq!(info(0), 0x00);
        assert_eq!(info(1), 0x40);
        assert_eq!(rr(0), 0x05);
        assert_eq!(rr(1), 0x85);
        assert_eq!(rej(0), 0x01);
        assert_eq!(rej(1), 0x81);

        assert_eq!(info_seq(info(1)), 1);
        assert_eq!(response_seq(rr(1)), 1);
        assert_eq!(response_seq(rej(0)), 0);
    }

    #[test]
    fn test_controls_are_distinct() {
        let all = [SET, UA, DISC, info(0), info(1), rr(0), rr(1), rej(0), rej(1)];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_header_never_needs_escaping() {
        let all = [SET, UA, DISC, info(0), info(1), rr(0), rr(1), rej(0), rej(1)];
        for address in [A_TX, A_RX] {
            for control in all {
                for byte in [address, control, address ^ control] {
                    assert_ne!(byte, FLAG);
                    assert_ne!(byte, ESC);
                }
            }
        }
    }

    #[test]
    fn test_control_name() {
        assert_eq!(control_name(SET), "SET");
        assert_eq!(control_name(rr(1)), "RR(1)");
        assert_eq!(control_name(rej(0)), "REJ(0)");
        assert_eq!(control_name(info(1)), "I(1)");
        assert_eq!(control_name(0x42), "0x42");
    }
}
