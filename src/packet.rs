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

//! Application packets carried in information frames
//!
//! ```text
//! START/END: C | T=0 | L | file size (big endian, L bytes) | T=1 | L | file name
//! DATA:      1 | index mod 255 | length (u16 big endian) | data
//! ```

use thiserror::Error;
use crate::protocol::MAX_PAYLOAD_SIZE;

pub const DATA: u8 = 1;
pub const START: u8 = 2;
pub const END: u8 = 3;

const FIELD_SIZE: u8 = 0;
const FIELD_NAME: u8 = 1;

const DATA_HEADER: usize = 4;

/// Most file bytes one data packet carries
pub const MAX_CHUNK: usize = MAX_PAYLOAD_SIZE - DATA_HEADER;

/// Data packet indices wrap at this value
pub const INDEX_MODULUS: u16 = 255;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,

    #[error("unknown packet type 0x{0:02X}")]
    UnknownType(u8),

    #[error("packet truncated")]
    Truncated,

    #[error("expected field {expected}, found {found}")]
    UnexpectedField { expected: u8, found: u8 },

    #[error("file size field is {0} bytes long")]
    SizeFieldTooLong(u8),

    #[error("file name is not valid UTF-8")]
    InvalidName,

    #[error("file name of {0} bytes is too long")]
    NameTooLong(usize),

    #[error("data chunk of {0} bytes is too long")]
    ChunkTooLong(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Start { file_size: u64, file_name: String },
    Data { index: u8, data: Vec<u8> },
    End { file_size: u64, file_name: String },
}

impl Packet {
    pub fn next_index(index: u8) -> u8 {
        ((index as u16 + 1) % INDEX_MODULUS) as u8
    }

    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        match self {
            Packet::Start { file_size, file_name } => encode_control(START, *file_size, file_name),
            Packet::End { file_size, file_name } => encode_control(END, *file_size, file_name),
            Packet::Data { index, data } => {
                if data.len() > MAX_CHUNK {
                    return Err(PacketError::ChunkTooLong(data.len()));
                }
                let mut out = Vec::with_capacity(DATA_HEADER + data.len());
                out.push(DATA);
                out.push(*index);
                out.extend_from_slice(&(data.len() as u16).to_be_bytes());
                out.extend_from_slice(data);
                Ok(out)
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Packet, PacketError> {
        let (&kind, rest) = bytes.split_first().ok_or(PacketError::Empty)?;
        match kind {
            DATA => {
                if rest.len() < DATA_HEADER - 1 {
                    return Err(PacketError::Truncated);
                }
                let index = rest[0];
                let len = u16::from_be_bytes([rest[1], rest[2]]) as usize;
                let data = rest[3..].get(..len).ok_or(PacketError::Truncated)?;
                Ok(Packet::Data { index, data: data.to_vec() })
            }
            START | END => {
                let mut fields = Fields { bytes: rest };
                let size_bytes = fields.next(FIELD_SIZE)?;
                if size_bytes.len() > 8 {
                    return Err(PacketError::SizeFieldTooLong(size_bytes.len() as u8));
                }
                let file_size = size_bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
                let name_bytes = fields.next(FIELD_NAME)?;
                let file_name = std::str::from_utf8(name_bytes)
                    .map_err(|_| PacketError::InvalidName)?
                    .to_string();

                if kind == START {
                    Ok(Packet::Start { file_size, file_name })
                } else {
                    Ok(Packet::End { file_size, file_name })
                }
            }
            other => Err(PacketError::UnknownType(other)),
        }
    }
}

fn encode_control(kind: u8, file_size: u64, file_name: &str) -> Result<Vec<u8>, PacketError> {
    let name = file_name.as_bytes();
    if name.len() > u8::MAX as usize {
        return Err(PacketError::NameTooLong(name.len()));
    }

    let size = file_size.to_be_bytes();
    let leading = size.iter().take_while(|&&b| b == 0).count();
    let size = &size[leading..];

    let mut out = Vec::with_capacity(5 + size.len() + name.len());
    out.push(kind);
    out.extend_from_slice(&[FIELD_SIZE, size.len() as u8]);
    out.extend_from_slice(size);
    out.extend_from_slice(&[FIELD_NAME, name.len() as u8]);
    out.extend_from_slice(name);
    Ok(out)
}

/// Type-length-value reader over a control packet body
struct Fields<'a> {
    bytes: &'a [u8],
}

impl<'a> Fields<'a> {
    fn next(&mut self, expected: u8) -> Result<&'a [u8], PacketError> {
        let bytes: &'a [u8] = self.bytes;
        let [found, len, rest @ ..] = bytes else {
            return Err(PacketError::Truncated);
        };
        if *found != expected {
            return Err(PacketError::UnexpectedField { expected, found: *found });
        }
        let len = *len as usize;
        let value = rest.get(..len).ok_or(PacketError::Truncated)?;
        self.bytes = &rest[len..];
        Ok(value)
    }
}
