//! CCSDS space packets.
//!
//! Decoding of the 6-byte primary header, whole packets from byte
//! streams, sequence accounting, and grouping of segmented packets.
//!
//! Reference: Space Packet Protocol (CCSDS 133.0-B).
use std::fmt::Display;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Application process identifier.
pub type Apid = u16;

/// CCSDS space packet primary header.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct PrimaryHeader {
    pub version: u8,
    pub type_flag: u8,
    pub has_secondary_header: bool,
    pub apid: Apid,
    /// Grouping of this packet; see the `SEQ_*` constants.
    pub sequence_flags: u8,
    /// 14-bit sequence count for the APID.
    pub sequence_id: u16,
    /// Length of the packet data field minus one.
    pub len_minus1: u16,
}

impl PrimaryHeader {
    /// Header length in bytes.
    pub const LEN: usize = 6;
    /// Modulus of the sequence counter.
    pub const SEQ_MOD: u16 = 1 << 14;
    /// APID reserved for idle packets.
    pub const APID_IDLE: Apid = 0x7ff;

    /// First packet of a group.
    pub const SEQ_FIRST: u8 = 1;
    /// Packet within a group, neither first nor last.
    pub const SEQ_CONTINUATION: u8 = 0;
    /// Last packet of a group.
    pub const SEQ_LAST: u8 = 2;
    /// Packet not part of a group.
    pub const SEQ_UNSEGMENTED: u8 = 3;

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
        let d1 = u16::from_be_bytes([dat[0], dat[1]]);
        let d2 = u16::from_be_bytes([dat[2], dat[3]]);
        let d3 = u16::from_be_bytes([dat[4], dat[5]]);

        Ok(PrimaryHeader {
            version: ((d1 >> 13) & 0x7) as u8,
            type_flag: ((d1 >> 12) & 0x1) as u8,
            has_secondary_header: (d1 >> 11) & 0x1 == 1,
            apid: d1 & 0x7ff,
            sequence_flags: ((d2 >> 14) & 0x3) as u8,
            sequence_id: d2 & 0x3fff,
            len_minus1: d3,
        })
    }

    /// Wire representation of this header.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::LEN] {
        let d1 = (u16::from(self.version & 0x7) << 13)
            | (u16::from(self.type_flag & 0x1) << 12)
            | (u16::from(self.has_secondary_header) << 11)
            | (self.apid & 0x7ff);
        let d2 = (u16::from(self.sequence_flags & 0x3) << 14) | (self.sequence_id & 0x3fff);
        let [a, b] = d1.to_be_bytes();
        let [c, d] = d2.to_be_bytes();
        let [e, f] = self.len_minus1.to_be_bytes();
        [a, b, c, d, e, f]
    }
}

/// A single space packet: primary header plus all packet bytes.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Packet {
    pub header: PrimaryHeader,
    /// All packet bytes, header included; length is
    /// `6 + len_minus1 + 1`.
    pub data: Vec<u8>,
}

impl Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Packet{{apid: {}, seq: {}, len: {}}}",
            self.header.apid,
            self.header.sequence_id,
            self.data.len()
        )
    }
}

impl Packet {
    /// Decode a packet from the front of `dat`.
    ///
    /// # Errors
    /// [`Error::Truncated`] if `dat` holds less than a header or less
    /// than the total length the header declares.
    pub fn decode(dat: &[u8]) -> Result<Self> {
        let header = PrimaryHeader::decode(dat)?;
        let total = PrimaryHeader::LEN + header.len_minus1 as usize + 1;
        if dat.len() < total {
            return Err(Error::Truncated {
                actual: dat.len(),
                minimum: total,
            });
        }
        Ok(Packet {
            header,
            data: dat[..total].to_vec(),
        })
    }

    /// Read a single packet from `reader`.
    pub fn read<R>(reader: &mut R) -> Result<Self>
    where
        R: Read,
    {
        let mut head = [0u8; PrimaryHeader::LEN];
        reader.read_exact(&mut head)?;
        let header = PrimaryHeader::decode(&head)?;

        let mut data = vec![0u8; PrimaryHeader::LEN + header.len_minus1 as usize + 1];
        data[..PrimaryHeader::LEN].copy_from_slice(&head);
        reader.read_exact(&mut data[PrimaryHeader::LEN..])?;

        Ok(Packet { header, data })
    }

    #[must_use]
    pub fn is_first(&self) -> bool {
        self.header.sequence_flags == PrimaryHeader::SEQ_FIRST
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.header.sequence_flags == PrimaryHeader::SEQ_LAST
    }

    #[must_use]
    pub fn is_cont(&self) -> bool {
        self.header.sequence_flags == PrimaryHeader::SEQ_CONTINUATION
    }

    #[must_use]
    pub fn is_standalone(&self) -> bool {
        self.header.sequence_flags == PrimaryHeader::SEQ_UNSEGMENTED
    }

    /// True for fill packets on the idle APID.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.header.apid == PrimaryHeader::APID_IDLE
    }
}

/// Number of packets missing between consecutively received sequence
/// ids for one APID.
///
/// Both ids are 14-bit. Returns 0 when `cur` immediately follows `last`
/// (modulo wrap); a repeated id yields the full modulus minus one.
#[must_use]
pub fn missing_packets(cur: u16, last: u16) -> u16 {
    const MOD: u32 = PrimaryHeader::SEQ_MOD as u32;
    let cur = u32::from(cur) % MOD;
    let last = u32::from(last) % MOD;
    ((cur + MOD - last - 1) % MOD) as u16
}

/// Iterate over the packets in a byte-contiguous packet stream.
///
/// The stream must start on a packet boundary; there is no framing to
/// resynchronize against. Iteration ends at end-of-stream; a partial
/// trailing packet is dropped silently.
pub fn decode_packets<R>(reader: R) -> impl Iterator<Item = Result<Packet>>
where
    R: Read,
{
    PacketReaderIter { reader }
}

/// Iterate over the packets in the file at `path`.
///
/// # Errors
/// Io error opening the file.
pub fn read_packets<P>(path: P) -> Result<impl Iterator<Item = Result<Packet>>>
where
    P: AsRef<Path>,
{
    let file = BufReader::new(File::open(path)?);
    Ok(decode_packets(file))
}

struct PacketReaderIter<R> {
    reader: R,
}

impl<R> Iterator for PacketReaderIter<R>
where
    R: Read,
{
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        match Packet::read(&mut self.reader) {
            Ok(packet) => Some(Ok(packet)),
            Err(Error::Io(ref err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => None,
            Err(err) => Some(Err(err)),
        }
    }
}

/// Packets belonging to one packet group, i.e. one segmented
/// application data unit.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PacketGroup {
    pub apid: Apid,
    pub packets: Vec<Packet>,
}

impl PacketGroup {
    /// True if the group has every packet of a complete sequence: a
    /// single unsegmented packet, or first through last with no missing
    /// sequence ids.
    #[must_use]
    pub fn complete(&self) -> bool {
        if self.packets.is_empty() {
            false
        } else if self.packets.len() == 1 {
            self.packets[0].is_standalone()
        } else {
            self.packets[0].is_first()
                && self.packets[self.packets.len() - 1].is_last()
                && !self.have_missing()
        }
    }

    #[must_use]
    pub fn have_missing(&self) -> bool {
        self.packets.windows(2).any(|pair| {
            missing_packets(pair[1].header.sequence_id, pair[0].header.sequence_id) > 0
        })
    }
}

/// Group packets by their sequence flags.
///
/// Unsegmented packets form groups of one. Segmented packets accumulate
/// until the APID changes or a new first packet arrives; trailing
/// partial groups are still produced so callers can account for them.
pub fn collect_groups<I>(packets: I) -> impl Iterator<Item = PacketGroup>
where
    I: Iterator<Item = Packet>,
{
    PacketGroupIter {
        packets,
        cached: None,
        done: false,
    }
}

struct PacketGroupIter<I> {
    packets: I,
    cached: Option<Packet>,
    done: bool,
}

impl<I> Iterator for PacketGroupIter<I>
where
    I: Iterator<Item = Packet>,
{
    type Item = PacketGroup;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut group: Option<PacketGroup> = None;
        loop {
            let Some(packet) = self.cached.take().or_else(|| self.packets.next()) else {
                break;
            };

            group = match group.take() {
                None => {
                    if packet.is_standalone() {
                        return Some(PacketGroup {
                            apid: packet.header.apid,
                            packets: vec![packet],
                        });
                    }
                    Some(PacketGroup {
                        apid: packet.header.apid,
                        packets: vec![packet],
                    })
                }
                Some(mut group) => {
                    // A new first packet or an APID change closes the
                    // group; keep the packet for the next call.
                    if packet.is_first()
                        || packet.is_standalone()
                        || packet.header.apid != group.apid
                    {
                        self.cached = Some(packet);
                        return Some(group);
                    }
                    group.packets.push(packet);
                    Some(group)
                }
            };
        }

        self.done = true;
        group
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_header_fields() {
        // apid 802, unsegmented, seq 9859, len_minus1 999
        let dat = [0x03, 0x22, 0xe6, 0x83, 0x03, 0xe7];
        let header = PrimaryHeader::decode(&dat).unwrap();

        assert_eq!(header.version, 0);
        assert_eq!(header.type_flag, 0);
        assert!(!header.has_secondary_header);
        assert_eq!(header.apid, 802);
        assert_eq!(header.sequence_flags, PrimaryHeader::SEQ_UNSEGMENTED);
        assert_eq!(header.sequence_id, 9859);
        assert_eq!(header.len_minus1, 999);
    }

    #[test]
    fn header_round_trip() {
        let header = PrimaryHeader {
            version: 0,
            type_flag: 0,
            has_secondary_header: true,
            apid: 1369,
            sequence_flags: PrimaryHeader::SEQ_FIRST,
            sequence_id: 4779,
            len_minus1: 2703,
        };
        assert_eq!(PrimaryHeader::decode(&header.encode()).unwrap(), header);
    }

    #[test]
    fn short_header_is_truncated() {
        assert!(matches!(
            PrimaryHeader::decode(&[0u8; 5]),
            Err(Error::Truncated { actual: 5, minimum: 6 })
        ));
    }

    fn make_packet(apid: Apid, sequence_flags: u8, sequence_id: u16, total_len: usize) -> Vec<u8> {
        let header = PrimaryHeader {
            version: 0,
            type_flag: 0,
            has_secondary_header: false,
            apid,
            sequence_flags,
            sequence_id,
            len_minus1: (total_len - PrimaryHeader::LEN - 1) as u16,
        };
        let mut dat = header.encode().to_vec();
        dat.extend((0..total_len - PrimaryHeader::LEN).map(|i| (apid as usize + i) as u8));
        dat
    }

    #[test]
    fn decode_packet() {
        let dat = make_packet(100, PrimaryHeader::SEQ_UNSEGMENTED, 7, 16);
        let packet = Packet::decode(&dat).unwrap();

        assert_eq!(packet.header.apid, 100);
        assert_eq!(packet.data.len(), 16);
        assert_eq!(packet.data, dat);
        assert!(packet.is_standalone());
        assert!(!packet.is_idle());
    }

    #[test]
    fn decode_packet_short_body_is_truncated() {
        let dat = make_packet(100, PrimaryHeader::SEQ_UNSEGMENTED, 7, 16);
        assert!(matches!(
            Packet::decode(&dat[..10]),
            Err(Error::Truncated { actual: 10, minimum: 16 })
        ));
    }

    #[test]
    fn packet_stream_ends_at_eof() {
        let mut dat = make_packet(100, PrimaryHeader::SEQ_UNSEGMENTED, 1, 12);
        dat.extend(make_packet(100, PrimaryHeader::SEQ_UNSEGMENTED, 2, 20));
        dat.extend(&make_packet(100, PrimaryHeader::SEQ_UNSEGMENTED, 3, 20)[..9]);

        let packets: Vec<Packet> = decode_packets(&dat[..]).map(|z| z.unwrap()).collect();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].header.sequence_id, 1);
        assert_eq!(packets[1].header.sequence_id, 2);
    }

    #[test]
    fn test_missing_packets() {
        assert_eq!(missing_packets(5, 4), 0);
        assert_eq!(missing_packets(5, 3), 1);
        assert_eq!(missing_packets(3, 5), 16381);
        assert_eq!(missing_packets(0, 16383), 0);
        assert_eq!(missing_packets(0, 16382), 1);
        assert_eq!(missing_packets(9, 9), 16383);
    }

    #[test]
    fn groups_by_sequence_flags() {
        let packets = vec![
            Packet::decode(&make_packet(800, PrimaryHeader::SEQ_FIRST, 1, 12)).unwrap(),
            Packet::decode(&make_packet(800, PrimaryHeader::SEQ_CONTINUATION, 2, 12)).unwrap(),
            Packet::decode(&make_packet(800, PrimaryHeader::SEQ_LAST, 3, 12)).unwrap(),
            Packet::decode(&make_packet(801, PrimaryHeader::SEQ_UNSEGMENTED, 9, 12)).unwrap(),
            Packet::decode(&make_packet(800, PrimaryHeader::SEQ_FIRST, 4, 12)).unwrap(),
            Packet::decode(&make_packet(800, PrimaryHeader::SEQ_LAST, 5, 12)).unwrap(),
        ];

        let groups: Vec<PacketGroup> = collect_groups(packets.into_iter()).collect();

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].apid, 800);
        assert_eq!(groups[0].packets.len(), 3);
        assert!(groups[0].complete());
        assert_eq!(groups[1].apid, 801);
        assert!(groups[1].complete());
        assert_eq!(groups[2].packets.len(), 2);
        assert!(groups[2].complete());
    }

    #[test]
    fn group_with_gap_is_incomplete() {
        let packets = vec![
            Packet::decode(&make_packet(800, PrimaryHeader::SEQ_FIRST, 1, 12)).unwrap(),
            Packet::decode(&make_packet(800, PrimaryHeader::SEQ_LAST, 3, 12)).unwrap(),
        ];
        let groups: Vec<PacketGroup> = collect_groups(packets.into_iter()).collect();

        assert_eq!(groups.len(), 1);
        assert!(groups[0].have_missing());
        assert!(!groups[0].complete());
    }

    #[test]
    fn trailing_partial_group_is_produced() {
        let packets = vec![
            Packet::decode(&make_packet(800, PrimaryHeader::SEQ_FIRST, 1, 12)).unwrap(),
            Packet::decode(&make_packet(800, PrimaryHeader::SEQ_CONTINUATION, 2, 12)).unwrap(),
        ];
        let groups: Vec<PacketGroup> = collect_groups(packets.into_iter()).collect();

        assert_eq!(groups.len(), 1);
        assert!(!groups[0].complete());
    }
}
