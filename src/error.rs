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

//! Error types for the link and transfer layers

use thiserror::Error;
use crate::packet::PacketError;

/// Failures surfaced by the link layer.
///
/// Malformed frames never show up here: the recognizer absorbs them by
/// resynchronizing on the next delimiter.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The serial port could not be opened or configured.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(#[from] serialport::Error),

    /// SET/UA or DISC/DISC exchange ran out of retries.
    #[error("handshake failed after {attempts} attempts")]
    HandshakeFailed { attempts: u32 },

    /// An information frame was never acknowledged.
    #[error("frame not acknowledged after {attempts} attempts")]
    MaxRetriesExceeded { attempts: u32 },

    /// A new information frame arrived with a bad payload checksum; REJ was sent.
    #[error("payload checksum mismatch")]
    ChecksumMismatch,

    #[error("payload of {0} bytes exceeds the frame limit")]
    PayloadTooLarge(usize),

    #[error("refusing to send an empty payload")]
    EmptyPayload,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// True when the session is still usable and the caller should simply read again.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LinkError::ChecksumMismatch)
    }
}

/// Failures of the file transfer state machines.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("link error: {0}")]
    Link(#[from] LinkError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad packet: {0}")]
    Packet(#[from] PacketError),

    #[error("data packet {actual} out of sequence, expected {expected}")]
    OutOfSequence { expected: u8, actual: u8 },

    #[error("received {actual} bytes, sender announced {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// Not a failure: ends the state machine loop.
    #[error("transfer complete")]
    TransferComplete,
}

pub type Result<T> = std::result::Result<T, LinkError>;
