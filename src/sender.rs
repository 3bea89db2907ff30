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
use std::io::Read;
use std::path::Path;
use crate::error::TransferError;
use crate::link::Link;
use crate::packet::{Packet, MAX_CHUNK};

// ============================================================================
// States
// ============================================================================

pub struct SendStart;
pub struct SendData;
pub struct SendEnd;
pub struct Disconnect;

// ============================================================================
// FSM Structure
// ============================================================================

pub struct SenderFsm<State> {
    state: PhantomData<State>,
    link: Link,
    file: File,
    file_name: String,
    file_size: u64,
    bytes_sent: u64,
    index: u8,
    buffer: Vec<u8>,
}

// ============================================================================
// Trait
// ============================================================================

pub trait SenderState: Send {
    fn step(self: Box<Self>) -> Result<Box<dyn SenderState>, TransferError>;
}

// ============================================================================
// Helper to transition states
// ============================================================================

impl<S> SenderFsm<S> {
    fn transition<T>(self) -> Box<SenderFsm<T>> {
        Box::new(SenderFsm {
            state: PhantomData,
            link: self.link,
            file: self.file,
            file_name: self.file_name,
            file_size: self.file_size,
            bytes_sent: self.bytes_sent,
            index: self.index,
            buffer: self.buffer,
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

    fn send(&mut self, packet: &Packet) -> Result<(), TransferError> {
        let bytes = packet.encode()?;
        self.link.write(&bytes)?;
        Ok(())
    }
}

// ============================================================================
// State Implementations
// ============================================================================

impl SenderState for SenderFsm<SendStart> {
    fn step(self: Box<Self>) -> Result<Box<dyn SenderState>, TransferError> {
        let mut fsm = *self;
        let packet = Packet::Start { file_size: fsm.file_size, file_name: fsm.file_name.clone() };
        fsm.send(&packet)?;
        log::info!("Announced {} ({} bytes)", fsm.file_name, fsm.file_size);
        let next = fsm.transition::<SendData>();
        Ok(next as Box<dyn SenderState>)
    }
}

impl SenderState for SenderFsm<SendData> {
    fn step(self: Box<Self>) -> Result<Box<dyn SenderState>, TransferError> {
        let mut fsm = *self;

        let n = match read_chunk(&mut fsm.file, &mut fsm.buffer) {
            Ok(n) => n,
            Err(e) => return Err(fsm.io_error(e)),
        };

        if n == 0 {
            log::debug!("End of file after {} bytes", fsm.bytes_sent);
            let next = fsm.transition::<SendEnd>();
            return Ok(next as Box<dyn SenderState>);
        }

        let packet = Packet::Data { index: fsm.index, data: fsm.buffer[..n].to_vec() };
        fsm.send(&packet)?;

        fsm.bytes_sent += n as u64;
        fsm.index = Packet::next_index(fsm.index);
        log::debug!("Sent data packet ({} of {} bytes)", fsm.bytes_sent, fsm.file_size);

        Ok(Box::new(fsm) as Box<dyn SenderState>)
    }
}

impl SenderState for SenderFsm<SendEnd> {
    fn step(self: Box<Self>) -> Result<Box<dyn SenderState>, TransferError> {
        let mut fsm = *self;
        // Announce what actually went out, in case the file changed underneath us
        let packet = Packet::End { file_size: fsm.bytes_sent, file_name: fsm.file_name.clone() };
        fsm.send(&packet)?;
        log::info!("Sent {} bytes of {}", fsm.bytes_sent, fsm.file_name);
        let next = fsm.transition::<Disconnect>();
        Ok(next as Box<dyn SenderState>)
    }
}

impl SenderState for SenderFsm<Disconnect> {
    fn step(self: Box<Self>) -> Result<Box<dyn SenderState>, TransferError> {
        let fsm = *self;
        fsm.link.close()?;
        Err(TransferError::TransferComplete)
    }
}

// ============================================================================
// Constructor
// ============================================================================

impl SenderFsm<SendStart> {
    pub fn new(link: Link, path: &Path) -> Result<Box<dyn SenderState>, TransferError> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        Ok(Box::new(SenderFsm {
            state: PhantomData::<SendStart>,
            link,
            file,
            file_name: transfer_name(path),
            file_size,
            bytes_sent: 0,
            index: 0,
            buffer: vec![0; MAX_CHUNK],
        }))
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Name announced to the receiver: the final path component only
fn transfer_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string())
}

/// Fills `buf` as far as the file allows, so every packet but the last is full
fn read_chunk(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use crate::frame::{information_frame, supervisory_frame};
    use crate::link::Role;
    use crate::link::tests::mock_link;
    use crate::protocol::*;
    use crate::serial::script;

    fn run_sender(mut fsm: Box<dyn SenderState>) -> Result<(), TransferError> {
        loop {
            match fsm.step() {
                Ok(next) => fsm = next,
                Err(TransferError::TransferComplete) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Wire traffic of a clean transfer of `packets` followed by teardown
    fn clean_exchange(packets: &[Packet]) -> (Vec<Option<u8>>, Vec<u8>) {
        let mut responses = Vec::new();
        let mut expected_writes = Vec::new();

        for (i, packet) in packets.iter().enumerate() {
            let ns = (i % 2) as u8;
            expected_writes.extend(information_frame(A_TX, ns, &packet.encode().unwrap()));
            responses.extend(script(&supervisory_frame(A_TX, rr(ns ^ 1))));
        }

        expected_writes.extend_from_slice(&supervisory_frame(A_TX, DISC));
        responses.extend(script(&supervisory_frame(A_RX, DISC)));
        expected_writes.extend_from_slice(&supervisory_frame(A_TX, UA));

        (responses, expected_writes)
    }

    #[test]
    fn test_transfer_name() {
        assert_eq!(transfer_name(&PathBuf::from("/path/to/penguin.gif")), "penguin.gif");
        assert_eq!(transfer_name(&PathBuf::from("notes")), "notes");
        assert_eq!(transfer_name(&PathBuf::from("/")), "unnamed");
    }

    #[test]
    fn test_sender_small_file() {
        let test_file = std::env::temp_dir().join("serlink_sender_small.txt");
        std::fs::write(&test_file, b"Test data").unwrap();

        let name = "serlink_sender_small.txt".to_string();
        let packets = [
            Packet::Start { file_size: 9, file_name: name.clone() },
            Packet::Data { index: 0, data: b"Test data".to_vec() },
            Packet::End { file_size: 9, file_name: name },
        ];
        let (responses, expected_writes) = clean_exchange(&packets);

        let link = mock_link(Role::Transmitter, responses, expected_writes);
        let fsm = SenderFsm::<SendStart>::new(link, &test_file).unwrap();

        if let Err(e) = run_sender(fsm) {
            panic!("Transfer failed: {:?}", e);
        }

        std::fs::remove_file(&test_file).ok();
    }

    #[test]
    fn test_sender_multiple_chunks() {
        let test_file = std::env::temp_dir().join("serlink_sender_chunks.bin");
        let content: Vec<u8> = (0..2000).map(|i| (i % 256) as u8).collect();
        std::fs::write(&test_file, &content).unwrap();

        let name = "serlink_sender_chunks.bin".to_string();
        let mut packets = vec![Packet::Start { file_size: 2000, file_name: name.clone() }];
        for (index, chunk) in content.chunks(MAX_CHUNK).enumerate() {
            packets.push(Packet::Data { index: index as u8, data: chunk.to_vec() });
        }
        packets.push(Packet::End { file_size: 2000, file_name: name });
        assert_eq!(packets.len(), 5);

        let (responses, expected_writes) = clean_exchange(&packets);

        let link = mock_link(Role::Transmitter, responses, expected_writes);
        let fsm = SenderFsm::<SendStart>::new(link, &test_file).unwrap();

        if let Err(e) = run_sender(fsm) {
            panic!("Transfer failed: {:?}", e);
        }

        std::fs::remove_file(&test_file).ok();
    }

    #[test]
    fn test_sender_empty_file() {
        let test_file = std::env::temp_dir().join("serlink_sender_empty");
        std::fs::write(&test_file, b"").unwrap();

        let name = "serlink_sender_empty".to_string();
        let packets = [
            Packet::Start { file_size: 0, file_name: name.clone() },
            Packet::End { file_size: 0, file_name: name },
        ];
        let (responses, expected_writes) = clean_exchange(&packets);

        let link = mock_link(Role::Transmitter, responses, expected_writes);
        let fsm = SenderFsm::<SendStart>::new(link, &test_file).unwrap();
        assert!(run_sender(fsm).is_ok());

        std::fs::remove_file(&test_file).ok();
    }

    #[test]
    fn test_sender_gives_up_when_receiver_silent() {
        let test_file = std::env::temp_dir().join("serlink_sender_silent.txt");
        std::fs::write(&test_file, b"nobody home").unwrap();

        let start = Packet::Start { file_size: 11, file_name: "serlink_sender_silent.txt".to_string() };
        let frame = information_frame(A_TX, 0, &start.encode().unwrap());

        let link = mock_link(Role::Transmitter, vec![None, None, None], frame.repeat(3));
        let fsm = SenderFsm::<SendStart>::new(link, &test_file).unwrap();

        match run_sender(fsm) {
            Err(TransferError::Link(crate::error::LinkError::MaxRetriesExceeded { attempts: 3 })) => {}
            other => panic!("unexpected result: {:?}", other),
        }

        std::fs::remove_file(&test_file).ok();
    }
}
