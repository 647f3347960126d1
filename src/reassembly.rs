//! Space packet reassembly from transfer frames.
//!
//! Packets are variable length and span frame boundaries; the M_PDU
//! first-header-pointer (FHP) says where the first packet header in a
//! frame starts. Reassembly runs a small state machine per virtual
//! channel: while searching, bytes are ignored until a frame carries an
//! FHP; while tracking, frame payloads accumulate into a buffer that is
//! drained one complete packet at a time. Counter gaps, uncorrectable
//! frames, and nonsense headers drop the partial buffer and fall back to
//! searching, so one bad frame never stalls the stream.
use std::collections::{HashMap, VecDeque};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::frame::{missing_frames, Frame, Scid, Vcid};
use crate::packet::{Packet, PrimaryHeader};
use crate::{read_frames, Result, RsState};

/// A reassembled packet annotated with its originating virtual channel.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DecodedPacket {
    pub scid: Scid,
    pub vcid: Vcid,
    pub packet: Packet,
}

#[derive(Debug, Default)]
struct VcState {
    /// Packet bytes accumulated across frames, always starting on what
    /// should be a packet primary header.
    buf: Vec<u8>,
    last_counter: Option<u32>,
    /// True once synchronized to a packet boundary.
    tracking: bool,
}

impl VcState {
    fn reset(&mut self) {
        self.buf.clear();
        self.tracking = false;
    }

    /// Bytes the in-flight packet still needs, if its header is
    /// complete.
    fn owed(&self) -> Option<usize> {
        if self.buf.len() < PrimaryHeader::LEN {
            return None;
        }
        let header = PrimaryHeader::decode(&self.buf).expect("buffer shorter than checked length");
        let total = PrimaryHeader::LEN + header.len_minus1 as usize + 1;
        Some(total.saturating_sub(self.buf.len()))
    }
}

/// Per-virtual-channel packet reassembly.
///
/// Feed [`Frame`]s to [`Reassembler::handle`] in downlink order; each
/// call returns the packets completed by that frame. State is kept per
/// `(scid, vcid)` so multiplexed spacecraft do not interfere.
#[derive(Debug, Default)]
pub struct Reassembler {
    izone_len: usize,
    trailer_len: usize,
    keep_uncorrected: bool,
    channels: HashMap<(Scid, Vcid), VcState>,
}

impl Reassembler {
    #[must_use]
    pub fn new(izone_len: usize, trailer_len: usize) -> Self {
        Reassembler {
            izone_len,
            trailer_len,
            keep_uncorrected: false,
            channels: HashMap::new(),
        }
    }

    /// Reassemble through frames whose Reed-Solomon decode failed
    /// instead of treating them like a gap.
    #[must_use]
    pub fn keep_uncorrected(mut self) -> Self {
        self.keep_uncorrected = true;
        self
    }

    /// Process one frame, returning any packets it completed.
    pub fn handle(&mut self, frame: &Frame) -> Vec<DecodedPacket> {
        if frame.is_fill() {
            return Vec::new();
        }
        let scid = frame.header.scid;
        let vcid = frame.header.vcid;
        let state = self.channels.entry((scid, vcid)).or_default();

        // Lost frames may have carried bytes of the in-flight packet.
        let gap = match state.last_counter {
            Some(last) => missing_frames(frame.header.counter, last),
            None => 0,
        };
        state.last_counter = Some(frame.header.counter);
        if gap > 0 && state.tracking {
            debug!(scid, vcid, gap, "counter gap, dropping partial packet");
            state.reset();
        }

        if frame.rsstate == RsState::Uncorrected && !self.keep_uncorrected {
            debug!(scid, vcid, "uncorrected frame, dropping partial packet");
            state.reset();
            return Vec::new();
        }

        let Some(mpdu) = frame.mpdu(self.izone_len, self.trailer_len) else {
            debug!(scid, vcid, "frame too short for mpdu, dropping");
            state.reset();
            return Vec::new();
        };
        if mpdu.is_idle() {
            // Fill data only; the in-flight packet resumes later.
            return Vec::new();
        }
        let payload = mpdu.payload();

        if state.tracking {
            if mpdu.has_header() {
                let fhp = mpdu.header_offset();
                if fhp > payload.len() {
                    debug!(scid, vcid, fhp, "header pointer outside frame, resyncing");
                    state.reset();
                    return Vec::new();
                }
                // The pointer must agree with what the in-flight packet
                // still needs; otherwise the buffer is off by some bytes
                // and the pointer is the only trustworthy reference.
                if let Some(owed) = state.owed() {
                    if owed != fhp {
                        debug!(scid, vcid, owed, fhp, "header pointer mismatch, resyncing");
                        state.buf.clear();
                        state.buf.extend_from_slice(&payload[fhp..]);
                        return self.drain(scid, vcid);
                    }
                }
                state.buf.extend_from_slice(payload);
            } else {
                state.buf.extend_from_slice(payload);
            }
        } else {
            if !mpdu.has_header() {
                return Vec::new();
            }
            let fhp = mpdu.header_offset();
            if fhp > payload.len() {
                debug!(scid, vcid, fhp, "header pointer outside frame, ignoring");
                return Vec::new();
            }
            // Bytes before the pointer belong to a packet whose start
            // was never seen.
            state.tracking = true;
            state.buf.extend_from_slice(&payload[fhp..]);
        }

        self.drain(scid, vcid)
    }

    /// Pull every complete packet off the front of the channel buffer.
    fn drain(&mut self, scid: Scid, vcid: Vcid) -> Vec<DecodedPacket> {
        let state = self
            .channels
            .get_mut(&(scid, vcid))
            .expect("drain on untracked channel");
        let mut ready = Vec::new();

        while state.buf.len() >= PrimaryHeader::LEN {
            let header = PrimaryHeader::decode(&state.buf)
                .expect("buffer shorter than checked length");
            if header.version != 0 {
                debug!(scid, vcid, version = header.version, "bad packet header, resyncing");
                state.reset();
                break;
            }
            let total = PrimaryHeader::LEN + header.len_minus1 as usize + 1;
            if state.buf.len() < total {
                break;
            }
            let rest = state.buf.split_off(total);
            let data = std::mem::replace(&mut state.buf, rest);
            trace!(scid, vcid, apid = header.apid, len = data.len(), "packet");
            ready.push(DecodedPacket {
                scid,
                vcid,
                packet: Packet { header, data },
            });
        }
        ready
    }
}

/// Reassemble packets from a frame sequence, annotating each with its
/// originating spacecraft and virtual channel.
///
/// Frame-level errors end the iteration after being yielded.
pub fn decode_framed_packets<I>(
    frames: I,
    izone_len: usize,
    trailer_len: usize,
) -> impl Iterator<Item = Result<DecodedPacket>>
where
    I: Iterator<Item = Result<Frame>>,
{
    FramedPacketIter {
        frames,
        reassembler: Reassembler::new(izone_len, trailer_len),
        ready: VecDeque::new(),
        done: false,
    }
}

struct FramedPacketIter<I> {
    frames: I,
    reassembler: Reassembler,
    ready: VecDeque<DecodedPacket>,
    done: bool,
}

impl<I> Iterator for FramedPacketIter<I>
where
    I: Iterator<Item = Result<Frame>>,
{
    type Item = Result<DecodedPacket>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(packet) = self.ready.pop_front() {
                return Some(Ok(packet));
            }
            if self.done {
                return None;
            }
            match self.frames.next() {
                Some(Ok(frame)) => self.ready.extend(self.reassembler.handle(&frame)),
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => self.done = true,
            }
        }
    }
}

/// Decode the file at `path` all the way to packets: synchronization,
/// derandomization, Reed-Solomon with `interleave`, and reassembly.
/// Frames not belonging to `scid` are dropped.
///
/// # Errors
/// [`crate::Error::InvalidConfig`] if `interleave` is zero, or an Io
/// error opening the file.
pub fn read_framed_packets<P>(
    path: P,
    scid: Scid,
    interleave: u8,
    izone_len: usize,
    trailer_len: usize,
) -> Result<impl Iterator<Item = Result<Packet>>>
where
    P: AsRef<Path>,
{
    let frames = read_frames(path, interleave)?;
    Ok(decode_framed_packets_for_scid(
        frames,
        scid,
        izone_len,
        trailer_len,
    ))
}

/// Reassemble packets for one spacecraft, dropping frames whose SCID
/// does not match before they reach the reassembler.
///
/// This is the frame-iterator form of [`read_framed_packets`]; frame
/// errors still pass through and end the iteration.
pub fn decode_framed_packets_for_scid<I>(
    frames: I,
    scid: Scid,
    izone_len: usize,
    trailer_len: usize,
) -> impl Iterator<Item = Result<Packet>>
where
    I: Iterator<Item = Result<Frame>>,
{
    let frames = frames.filter(move |zult| match zult {
        Ok(frame) => frame.header.scid == scid,
        Err(_) => true,
    });
    decode_framed_packets(frames, izone_len, trailer_len).map(|zult| zult.map(|dp| dp.packet))
}
