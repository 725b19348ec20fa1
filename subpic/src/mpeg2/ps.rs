//! # MPEG-2 Program Streams (PS)
//!
//! This is the container format used at the top-level of a `*.sub` file.
//! Every pack in a `*.sub` file is exactly `PACK_SIZE` bytes long.

use nom::bits::bits;
use nom::bytes::complete::tag;
use nom::IResult;
use std::fmt;

use super::clock::{clock_and_ext, Clock};
use super::pes;
use super::{tag_u8, take_u32, take_u64, take_u8, Bits};

/// The size of a single pack.
pub const PACK_SIZE: usize = 0x800;

/// The pack header we emit on every pack: a zero SCR and the usual DVD
/// mux rate.
pub const PACK_HEADER: [u8; 14] = [
    0x00, 0x00, 0x01, 0xba, 0x44, 0x02, 0xc4, 0x82, 0x04, 0xa9, 0x01, 0x89, 0xc3, 0xf8,
];

/// A parsed [MPEG-2 Program Stream header][MPEG-PS] (MPEG-PS).
///
/// [MPEG-PS]: https://en.wikipedia.org/wiki/MPEG_program_stream
#[derive(Debug, PartialEq, Eq)]
pub struct Header {
    /// The System Clock Reference (SCR) and SCR extension field.
    pub scr: Clock,
    /// The bit rate, in units of 50 bytes per second.
    pub bit_rate: u32,
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[PS packet @ {}, {} kbps]",
            self.scr,
            (self.bit_rate * 50 * 8) / 1024
        )
    }
}

fn header_bits(i: Bits) -> IResult<Bits, Header> {
    // MPEG-2 version tag.
    let (i, _) = tag_u8(0b01, 2)(i)?;
    // System Clock Reference.
    let (i, scr) = clock_and_ext(i)?;
    // Bit rate.
    let (i, bit_rate) = take_u32(22)(i)?;
    // Marker bits.
    let (i, _) = tag_u8(0b11, 2)(i)?;
    // Reserved.
    let (i, _) = take_u8(5)(i)?;
    // Number of bytes of stuffing.
    let (i, stuffing_length) = take_u8(3)(i)?;
    // Stuffing bytes.  We just want to ignore these, but use a large
    // enough type to prevent overflow panics when fuzzing.
    let (i, _) = take_u64(usize::from(stuffing_length) * 8)(i)?;
    Ok((i, Header { scr, bit_rate }))
}

/// Parse a Program Stream header.
pub fn header(i: &[u8]) -> IResult<&[u8], Header> {
    let (i, _) = tag(&[0x00, 0x00, 0x01, 0xba][..])(i)?;
    bits(header_bits)(i)
}

#[test]
fn parse_our_pack_header() {
    let (rest, parsed) = header(&PACK_HEADER).unwrap();
    assert!(rest.is_empty());
    assert_eq!(parsed.bit_rate, 0x189c3 >> 2);
}

/// A [Packetized Elementary Stream][pes] packet with a Program Stream
/// header.
///
/// [pes]: http://dvd.sourceforge.net/dvdinfo/pes-hdr.html
#[derive(Debug, PartialEq, Eq)]
pub struct PesPacket<'a> {
    /// The byte offset of the enclosing pack.
    pub offset: usize,
    pub ps_header: Header,
    pub pes_packet: pes::Packet<'a>,
}

/// A pack we had to skip because it was damaged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPack {
    /// The byte offset of the damaged pack.
    pub offset: usize,
    /// What was wrong with it.
    pub reason: String,
}

impl fmt::Display for SkippedPack {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "skipped pack at 0x{:x}: {}", self.offset, self.reason)
    }
}

/// An iterator over all the subtitle PES packets in an MPEG-2 Program
/// Stream.  Packs without subtitle data are passed over silently, and
/// damaged packs are reported before we move on to the next pack boundary.
pub struct PesPackets<'a> {
    input: &'a [u8],
    /// Where the next pack should start.
    pos: usize,
}

impl<'a> PesPackets<'a> {
    /// Skip to the next pack boundary after `from`.
    fn realign(&mut self, from: usize) {
        self.pos = (from / PACK_SIZE + 1) * PACK_SIZE;
    }
}

impl<'a> Iterator for PesPackets<'a> {
    type Item = Result<PesPacket<'a>, SkippedPack>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.pos >= self.input.len() {
                trace!("Reached end of data");
                return None;
            }
            let offset = self.pos;
            let remaining = &self.input[offset..];

            let (after_header, ps_header) = match header(remaining) {
                Ok(parsed) => parsed,
                Err(err) => {
                    self.realign(offset);
                    return Some(Err(SkippedPack {
                        offset,
                        reason: format!("bad pack header: {:?}", err),
                    }));
                }
            };

            // Walk the PES packets in this pack until we find subtitles.
            let mut cursor = after_header;
            loop {
                if cursor.len() >= 4 && cursor[..4] == [0x00, 0x00, 0x01, pes::PRIVATE_STREAM_1]
                {
                    match pes::packet(cursor) {
                        Ok((_, pes_packet)) => {
                            // Trailing padding is ignored; the next pack
                            // starts at the next boundary.
                            self.realign(offset);
                            let packet = PesPacket {
                                offset,
                                ps_header,
                                pes_packet,
                            };
                            trace!("Decoded packet {:?}", &packet);
                            return Some(Ok(packet));
                        }
                        Err(err) => {
                            self.realign(offset);
                            return Some(Err(SkippedPack {
                                offset,
                                reason: format!("bad PES packet: {:?}", err),
                            }));
                        }
                    }
                }
                match pes::any_packet(cursor) {
                    Ok((rest, stream_id)) => {
                        trace!("Skipping PES stream 0x{:x} at 0x{:x}", stream_id, offset);
                        cursor = rest;
                    }
                    // Nothing else of interest in this pack.
                    Err(_) => break,
                }
            }
            self.realign(offset);
        }
    }
}

/// Iterate over all the PES packets in an MPEG-2 Program Stream (or at
/// least those which contain subtitles).
pub fn pes_packets(input: &[u8]) -> PesPackets {
    PesPackets { input, pos: 0 }
}

#[test]
fn skips_damaged_packs() {
    let mut stream = vec![];
    // One good pack.
    stream.extend_from_slice(&PACK_HEADER);
    pes::write_packet(&mut stream, Some(900), 0x20, 0, &[0, 4, 0, 0]);
    let used = stream.len();
    pes::write_padding(&mut stream, PACK_SIZE - used);
    // One pack of garbage.
    stream.extend(vec![0x55; PACK_SIZE]);
    // One pack with only padding.
    stream.extend_from_slice(&PACK_HEADER);
    pes::write_padding(&mut stream, PACK_SIZE - PACK_HEADER.len());

    let results = pes_packets(&stream).collect::<Vec<_>>();
    assert_eq!(results.len(), 2);
    let first = results[0].as_ref().unwrap();
    assert_eq!(first.offset, 0);
    assert_eq!(first.pes_packet.data, &[0, 4, 0, 0]);
    let skipped = results[1].as_ref().unwrap_err();
    assert_eq!(skipped.offset, PACK_SIZE);
}
