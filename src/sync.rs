//! CADU synchronization.
//!
//! Locates fixed-length Channel Access Data Units in a byte stream by
//! scanning for the attached sync marker.
use std::io::Read;

use tracing::{debug, trace};

use crate::bytes::Bytes;
use crate::{Error, Result};

/// CCSDS attached sync marker.
pub const ASM: [u8; 4] = [0x1a, 0xcf, 0xfc, 0x1d];

enum State {
    /// Scanning byte-by-byte for the next marker.
    Searching,
    /// Stream position is assumed to be at the start of a CADU.
    Locked,
}

/// Scans a byte stream for CADUs of `ASM.len() + block_len` bytes.
///
/// While searching, bytes are consumed one at a time until a marker is
/// found. Once locked, whole CADUs are read back-to-back; a CADU whose
/// leading bytes no longer match the marker is still emitted (the FEC
/// layer may recover it) but drops the lock, so scanning resumes after
/// that block. A partial CADU at end-of-stream is discarded.
///
/// The synchronizer performs unbuffered single-byte reads while
/// searching; hand it a `BufReader` for anything larger than a test
/// vector.
pub struct Synchronizer<R> {
    bytes: Bytes<R>,
    cadu_len: usize,
    state: State,
    done: bool,
}

impl<R> Synchronizer<R>
where
    R: Read,
{
    /// Create a synchronizer producing CADUs of `block_len` bytes plus
    /// the 4-byte marker.
    pub fn new(reader: R, block_len: usize) -> Self {
        Synchronizer {
            bytes: Bytes::new(reader),
            cadu_len: ASM.len() + block_len,
            state: State::Searching,
            done: false,
        }
    }

    /// Produce the next CADU, marker included, or `None` at end-of-stream.
    fn scan(&mut self) -> Result<Option<Vec<u8>>> {
        match self.state {
            State::Searching => {
                let mut window = [0u8; ASM.len()];
                if !self.bytes.fill(&mut window)? {
                    return Ok(None);
                }
                let mut dropped = 0usize;
                while window != ASM {
                    let Some(b) = self.bytes.next()? else {
                        return Ok(None);
                    };
                    window.rotate_left(1);
                    window[ASM.len() - 1] = b;
                    dropped += 1;
                }
                if dropped > 0 {
                    debug!(dropped, offset = self.bytes.offset(), "sync acquired");
                }

                let mut cadu = vec![0u8; self.cadu_len];
                cadu[..ASM.len()].copy_from_slice(&window);
                if !self.bytes.fill(&mut cadu[ASM.len()..])? {
                    return Ok(None);
                }
                self.state = State::Locked;
                Ok(Some(cadu))
            }
            State::Locked => {
                let mut cadu = vec![0u8; self.cadu_len];
                if !self.bytes.fill(&mut cadu)? {
                    return Ok(None);
                }
                if cadu[..ASM.len()] != ASM {
                    // Emit anyway; a corrupted marker does not make the
                    // buffered frame worthless. The lock is gone though.
                    trace!(offset = self.bytes.offset(), "sync lost");
                    self.state = State::Searching;
                }
                Ok(Some(cadu))
            }
        }
    }
}

impl<R> Iterator for Synchronizer<R>
where
    R: Read,
{
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.scan() {
            Ok(Some(cadu)) => Some(Ok(cadu)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Iterate over the CADUs in `reader`, each `block_len` bytes plus the
/// 4-byte marker.
///
/// # Errors
/// `block_len` of zero is rejected with [`Error::InvalidConfig`]. Read
/// failures end the iterator after yielding the error.
pub fn read_synchronized_cadus<R>(
    reader: R,
    block_len: usize,
) -> Result<impl Iterator<Item = Result<Vec<u8>>>>
where
    R: Read,
{
    if block_len == 0 {
        return Err(Error::InvalidConfig("block length must be non-zero".into()));
    }
    Ok(Synchronizer::new(reader, block_len))
}
