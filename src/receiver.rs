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

use std::marker::PhantomData;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use crate::error::TransferError;
use crate::link::Link;
use crate::packet::Packet;

// ============================================================================
// States
// ============================================================================

pub struct WaitStart;
pub struct ReceiveData;
pub struct Disconnect;

// ============================================================================
// FSM Structure
// ============================================================================

pub struct ReceiverFsm<State> {
    state: PhantomData<State>,
    link: Link,
    output_dir: PathBuf,
    current_file: Option<File>,
    file_path: PathBuf,
    file_size: u64,
    bytes_received: u64,
    next_index: u8,
}

// ============================================================================
// Trait
// ============================================================================

pub trait ReceiverState: Send {
    fn step(self: Box<Self>) -> Result<Box<dyn ReceiverState>, TransferError>;
}

// ============================================================================
// Helper to transition states
// ============================================================================

impl<S> ReceiverFsm<S> {
    fn transition<T>(self) -> Box<ReceiverFsm<T>> {
        Box::new(ReceiverFsm {
            state: PhantomData,
            link: self.link,
            output_dir: self.output_dir,
            current_file: self.current_file,
            file_path: self.file_path,
            file_size: self.file_size,
            bytes_received: self.bytes_received,
            next_index: self.next_index,
        })
    }

    fn io_error(&self, e: std::io::Error) -> TransferError {
        let type_name = std::any::type_name::<S>();
        let state_name = type_name.split("::").last().unwrap_or(type_name);
        TransferError::Io(std::io::Error::new(
            e.kind(),
            format!("{} (in state: {})", e, state_name)
        ))
    }

    /// One link read. `None` when nothing new arrived: a suppressed duplicate
    /// or a frame the link already asked to have resent.
    fn next_packet(&mut self) -> Result<Option<Packet>, TransferError> {
        match self.link.read() {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(Packet::decode(&bytes)?)),
            Err(e) if e.is_recoverable() => {
                log::debug!("Recoverable read failure: {}", e);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// State Implementations
// ============================================================================

impl ReceiverState for ReceiverFsm<WaitStart> {
    fn step(self: Box<Self>) -> Result<Box<dyn ReceiverState>, TransferError> {
        let mut fsm = *self;

        match fsm.next_packet()? {
            Some(Packet::Start { file_size, file_name }) => {
                let filepath = fsm.output_dir.join(local_name(&file_name));
                match File::create(&filepath) {
                    Ok(file) => {
                        log::info!("Receiving {} ({} bytes) into {}", file_name, file_size, filepath.display());
                        fsm.current_file = Some(file);
                        fsm.file_path = filepath;
                        fsm.file_size = file_size;
                        fsm.bytes_received = 0;
                        fsm.next_index = 0;
                        let next = fsm.transition::<ReceiveData>();
                        Ok(next as Box<dyn ReceiverState>)
                    }
                    Err(e) => Err(fsm.io_error(e)),
                }
            }
            Some(other) => {
                log::warn!("Expected START packet, ignoring {:?}", PacketKind(&other));
                Ok(Box::new(fsm) as Box<dyn ReceiverState>)
            }
            None => Ok(Box::new(fsm) as Box<dyn ReceiverState>),
        }
    }
}

impl ReceiverState for ReceiverFsm<ReceiveData> {
    fn step(self: Box<Self>) -> Result<Box<dyn ReceiverState>, TransferError> {
        let mut fsm = *self;

        match fsm.next_packet()? {
            Some(Packet::Data { index, data }) => {
                if index != fsm.next_index {
                    return Err(TransferError::OutOfSequence { expected: fsm.next_index, actual: index });
                }
                if let Some(ref mut file) = fsm.current_file {
                    if let Err(e) = file.write_all(&data) {
                        return Err(fsm.io_error(e));
                    }
                }
                fsm.bytes_received += data.len() as u64;
                fsm.next_index = Packet::next_index(index);
                log::debug!("Received data packet {} ({} of {} bytes)", index, fsm.bytes_received, fsm.file_size);
                Ok(Box::new(fsm) as Box<dyn ReceiverState>)
            }
            Some(Packet::End { file_size, .. }) => {
                if let Some(mut file) = fsm.current_file.take() {
                    if let Err(e) = file.flush() {
                        return Err(fsm.io_error(e));
                    }
                }
                if fsm.bytes_received != fsm.file_size {
                    return Err(TransferError::SizeMismatch { expected: fsm.file_size, actual: fsm.bytes_received });
                }
                if file_size != fsm.file_size {
                    return Err(TransferError::SizeMismatch { expected: fsm.file_size, actual: file_size });
                }
                log::info!("Received {} bytes into {}", fsm.bytes_received, fsm.file_path.display());
                let next = fsm.transition::<Disconnect>();
                Ok(next as Box<dyn ReceiverState>)
            }
            Some(other) => {
                log::warn!("Unexpected {:?} packet during data phase, ignoring", PacketKind(&other));
                Ok(Box::new(fsm) as Box<dyn ReceiverState>)
            }
            None => Ok(Box::new(fsm) as Box<dyn ReceiverState>),
        }
    }
}

impl ReceiverState for ReceiverFsm<Disconnect> {
    fn step(self: Box<Self>) -> Result<Box<dyn ReceiverState>, TransferError> {
        let fsm = *self;
        fsm.link.close()?;
        Err(TransferError::TransferComplete)
    }
}

// ============================================================================
// Constructor
// ============================================================================

impl ReceiverFsm<WaitStart> {
    pub fn new(link: Link, output_dir: PathBuf) -> Box<dyn ReceiverState> {
        Box::new(ReceiverFsm {
            state: PhantomData::<WaitStart>,
            link,
            output_dir,
            current_file: None,
            file_path: PathBuf::new(),
            file_size: 0,
            bytes_received: 0,
            next_index: 0,
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Where a transmitted file name lands inside the output directory. Any
/// directory part is dropped so the sender cannot write outside it.
fn local_name(file_name: &str) -> PathBuf {
    Path::new(file_name)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("received.bin"))
}

/// Logs a packet without dumping its payload
struct PacketKind<'a>(&'a Packet);

impl std::fmt::Debug for PacketKind<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Packet::Start { .. } => write!(f, "START"),
            Packet::Data { index, data } => write!(f, "DATA #{} ({} bytes)", index, data.len()),
            Packet::End { .. } => write!(f, "END"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
