//! Transfer frame decoding.
//!
//! A CADU body, after derandomization and error correction, is an AOS
//! Transfer Frame (CCSDS 732.0-B): a 6-byte VCDU header followed by the
//! frame data field. The data field carries an M_PDU: an optional insert
//! zone, a 2-byte header holding the first-header-pointer, packet bytes,
//! and an optional trailer.
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::sync::{Synchronizer, ASM};
use crate::{pn, rs, Error, Result, RsState};

/// Spacecraft identifier.
pub type Scid = u16;
/// Virtual channel identifier.
pub type Vcid = u16;

/// Header of a Virtual Channel Data Unit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VcduHeader {
    pub version: u8,
    pub scid: Scid,
    pub vcid: Vcid,
    /// 24-bit frame counter for this virtual channel.
    pub counter: u32,
    pub replay: bool,
    /// VC frame count usage flag.
    pub cycle: bool,
    pub counter_cycle: u8,
}

impl VcduHeader {
    /// Header length in bytes.
    pub const LEN: usize = 6;
    /// Version number of an AOS (version 2) transfer frame on the wire.
    pub const VERSION: u8 = 1;
    /// VCID reserved for fill frames.
    pub const FILL: Vcid = 63;
    /// Modulus of the frame counter.
    pub const COUNTER_MOD: u32 = 1 << 24;

    /// Decode the first [`Self::LEN`] bytes of `dat`.
    ///
    /// # Errors
    /// [`Error::Truncated`] if fewer than [`Self::LEN`] bytes.
    pub fn decode(dat: &[u8]) -> Result<Self> {
        if dat.len() < Self::LEN {
            return Err(Error::Truncated {
                actual: dat.len(),
                minimum: Self::LEN,
            });
        }
        let x = u16::from_be_bytes([dat[0], dat[1]]);
        Ok(VcduHeader {
            version: (dat[0] >> 6) & 0x3,
            scid: (x >> 6) & 0xff,
            vcid: x & 0x3f,
            counter: u32::from_be_bytes([0, dat[2], dat[3], dat[4]]),
            replay: (dat[5] >> 7) & 0x1 == 1,
            cycle: (dat[5] >> 6) & 0x1 == 1,
            counter_cycle: dat[5] & 0xf,
        })
    }

    /// Wire representation of this header.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::LEN] {
        let x = (u16::from(self.version & 0x3) << 14) | ((self.scid & 0xff) << 6) | (self.vcid & 0x3f);
        let [b0, b1] = x.to_be_bytes();
        let [_, c1, c2, c3] = self.counter.to_be_bytes();
        let flags = (u8::from(self.replay) << 7) | (u8::from(self.cycle) << 6) | (self.counter_cycle & 0xf);
        [b0, b1, c1, c2, c3, flags]
    }
}

/// Multiplexing Protocol Data Unit contained in a frame data field.
#[derive(Debug, Clone)]
pub struct Mpdu {
    fhp: u16,
    data: Vec<u8>,
}

impl Mpdu {
    /// First-header-pointer value of an idle frame.
    pub const IDLE: u16 = 0x7fe;
    /// First-header-pointer value when no packet starts in this frame.
    pub const NO_HEADER: u16 = 0x7ff;

    /// Decode an M_PDU from `dat`, or `None` if fewer than 2 bytes.
    #[must_use]
    pub fn decode(dat: &[u8]) -> Option<Self> {
        if dat.len() < 2 {
            return None;
        }
        let x = u16::from_be_bytes([dat[0], dat[1]]);
        Some(Mpdu {
            fhp: x & 0x7ff,
            data: dat.to_vec(),
        })
    }

    /// True when this frame carries only fill data.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.fhp == Self::IDLE
    }

    /// True when a packet primary header starts somewhere in this frame.
    #[must_use]
    pub fn has_header(&self) -> bool {
        self.fhp != Self::NO_HEADER && !self.is_idle()
    }

    /// Byte offset of the first packet header within [`Self::payload`].
    #[must_use]
    pub fn header_offset(&self) -> usize {
        self.fhp as usize
    }

    /// The packet bytes in this frame.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.data[2..]
    }
}

/// A decoded transfer frame.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Frame {
    pub header: VcduHeader,
    /// Reed-Solomon disposition for the codeblock this frame came from.
    pub rsstate: RsState,
    /// Frame bytes, header included, parity excluded.
    pub data: Vec<u8>,
}

impl Frame {
    /// Construct from raw frame bytes without error correction.
    ///
    /// # Errors
    /// [`Error::Truncated`] if `dat` is shorter than a VCDU header.
    pub fn decode(dat: Vec<u8>) -> Result<Self> {
        let header = VcduHeader::decode(&dat)?;
        Ok(Frame {
            header,
            rsstate: RsState::NotPerformed,
            data: dat,
        })
    }

    #[must_use]
    pub fn is_fill(&self) -> bool {
        self.header.vcid == VcduHeader::FILL
    }

    /// Extract the M_PDU, skipping the header and `izone_len` bytes of
    /// insert zone and dropping `trailer_len` bytes of trailer. `None`
    /// if the frame is too short for that layout.
    #[must_use]
    pub fn mpdu(&self, izone_len: usize, trailer_len: usize) -> Option<Mpdu> {
        let start = VcduHeader::LEN + izone_len;
        let end = self.data.len().checked_sub(trailer_len)?;
        if start > end {
            return None;
        }
        Mpdu::decode(&self.data[start..end])
    }
}

/// Number of frames missing between consecutively received counters.
///
/// Both counters are 24-bit. Returns 0 when `cur` immediately follows
/// `last` (modulo wrap); a repeated counter yields the full modulus
/// minus one.
#[must_use]
pub fn missing_frames(cur: u32, last: u32) -> u32 {
    const MOD: u64 = VcduHeader::COUNTER_MOD as u64;
    let cur = u64::from(cur) % MOD;
    let last = u64::from(last) % MOD;
    ((cur + MOD - last - 1) % MOD) as u32
}

/// Configures frame decoding: synchronization, derandomization, and
/// Reed-Solomon.
///
/// ```no_run
/// use decom::FrameDecoder;
///
/// let file = std::fs::File::open("downlink.dat").unwrap();
/// let frames = FrameDecoder::new()
///     .interleave(4)
///     .decode(std::io::BufReader::new(file))
///     .unwrap();
/// for frame in frames {
///     let frame = frame.unwrap();
///     println!("vcid={} {:?}", frame.header.vcid, frame.rsstate);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    interleave: u8,
    frame_len: usize,
    derandomize: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        FrameDecoder {
            interleave: 0,
            frame_len: 0,
            derandomize: true,
        }
    }

    /// Enable Reed-Solomon with the given interleave depth. The CADU
    /// body length becomes `interleave * 255`.
    #[must_use]
    pub fn interleave(mut self, interleave: u8) -> Self {
        self.interleave = interleave;
        self
    }

    /// Set the frame length for streams without Reed-Solomon parity.
    #[must_use]
    pub fn frame_length(mut self, len: usize) -> Self {
        self.frame_len = len;
        self
    }

    /// Skip pseudo-noise derandomization for streams that are not
    /// randomized.
    #[must_use]
    pub fn without_derandomization(mut self) -> Self {
        self.derandomize = false;
        self
    }

    /// Start decoding frames from `reader`.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] unless exactly one of interleave or
    /// frame length is set.
    pub fn decode<R>(self, reader: R) -> Result<FrameIter<R>>
    where
        R: Read,
    {
        let block_len = match (self.interleave, self.frame_len) {
            (0, 0) => {
                return Err(Error::InvalidConfig(
                    "either an interleave or a frame length is required".into(),
                ))
            }
            (i, 0) => usize::from(i) * rs::CODEWORD_LEN,
            (0, n) => n,
            (_, _) => {
                return Err(Error::InvalidConfig(
                    "interleave and frame length are mutually exclusive".into(),
                ))
            }
        };
        Ok(FrameIter {
            cadus: Synchronizer::new(reader, block_len),
            interleave: self.interleave,
            derandomize: self.derandomize,
        })
    }
}

/// Pull-driven frame iterator created by [`FrameDecoder::decode`].
pub struct FrameIter<R> {
    cadus: Synchronizer<R>,
    interleave: u8,
    derandomize: bool,
}

impl<R> Iterator for FrameIter<R>
where
    R: Read,
{
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        let cadu = match self.cadus.next()? {
            Ok(cadu) => cadu,
            Err(err) => return Some(Err(err)),
        };

        let mut body = cadu[ASM.len()..].to_vec();
        if self.derandomize {
            body = pn::derandomize(&body);
        }

        let (data, rsstate) = if self.interleave > 0 {
            // Fill frames are not RS encoded; the header is readable
            // before correction since message symbols keep their
            // positions.
            let fill = VcduHeader::decode(&body)
                .map(|h| h.vcid == VcduHeader::FILL)
                .unwrap_or(false);
            if fill {
                let parity = usize::from(self.interleave) * rs::PARITY_LEN;
                body.truncate(body.len() - parity);
                (body, RsState::NotPerformed)
            } else {
                rs::correct_codeblock(&body, self.interleave)
            }
        } else {
            (body, RsState::NotPerformed)
        };

        let header = match VcduHeader::decode(&data) {
            Ok(header) => header,
            Err(err) => return Some(Err(err)),
        };
        let rsstate = if header.version == VcduHeader::VERSION {
            rsstate
        } else {
            warn!(version = header.version, "unsupported transfer frame version");
            RsState::Uncorrected
        };
        trace!(
            scid = header.scid,
            vcid = header.vcid,
            counter = header.counter,
            ?rsstate,
            "decoded frame"
        );

        Some(Ok(Frame { header, rsstate, data }))
    }
}

/// Decode frames from the file at `path` using Reed-Solomon with the
/// given interleave.
///
/// # Errors
/// [`Error::InvalidConfig`] if `interleave` is zero (use [`FrameDecoder`]
/// with an explicit frame length for streams without parity), or an Io
/// error opening the file.
pub fn read_frames<P>(path: P, interleave: u8) -> Result<FrameIter<BufReader<File>>>
where
    P: AsRef<Path>,
{
    let file = BufReader::new(File::open(path)?);
    FrameDecoder::new().interleave(interleave).decode(file)
}
