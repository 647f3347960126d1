//! Decoding for CCSDS spacecraft telemetry downlinks.
//!
//! Takes a raw byte stream of Channel Access Data Units as captured
//! from a ground station demodulator and recovers the application-layer
//! space packets, layer by layer:
//!
//! 1. **CADU**: synchronize on the attached sync marker, derandomize,
//!    and correct with Reed-Solomon (223,255) — [`Synchronizer`],
//!    [`pn`], [`rs`].
//! 2. **Transfer frame**: parse VCDU headers and track virtual
//!    channels — [`FrameDecoder`], [`Frame`], [`missing_frames`].
//! 3. **Space packet**: reassemble variable-length packets spanning
//!    frames per virtual channel — [`decode_framed_packets`],
//!    [`Packet`], [`missing_packets`].
//!
//! Every stage is a pull-driven iterator: nothing is read until the
//! consumer asks for the next item, and a malformed frame never stops
//! the stream.
//!
//! # Example
//!
//! Decode the packets for spacecraft 157 from a Suomi-NPP style
//! downlink capture (Reed-Solomon interleave 4):
//!
//! ```no_run
//! let packets = decom::read_framed_packets("snpp.dat", 157, 4, 0, 0).unwrap();
//! for packet in packets {
//!     let packet = packet.unwrap();
//!     println!("apid={} len={}", packet.header.apid, packet.data.len());
//! }
//! ```
mod bytes;
mod error;
mod frame;
mod packet;
pub mod pn;
mod reassembly;
pub mod rs;
mod sync;
pub mod timecode;

pub use error::{Error, Result};
pub use frame::{
    missing_frames, read_frames, Frame, FrameDecoder, FrameIter, Mpdu, Scid, VcduHeader, Vcid,
};
pub use packet::{
    collect_groups, decode_packets, missing_packets, read_packets, Apid, Packet, PacketGroup,
    PrimaryHeader,
};
pub use reassembly::{
    decode_framed_packets, decode_framed_packets_for_scid, read_framed_packets, DecodedPacket,
    Reassembler,
};
pub use rs::RsState;
pub use sync::{read_synchronized_cadus, Synchronizer, ASM};
