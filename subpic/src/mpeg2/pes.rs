//! # MPEG-2 Packetized Elementary Streams (PES)
//!
//! These packets are nested inside the MPEG-2 Program Stream packets found
//! in a `*.sub` file.

use nom::bits::bits;
use nom::branch::alt;
use nom::bytes::complete::{tag, take};
use nom::combinator::{rest, value};
use nom::multi::length_value;
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;
use std::fmt;

use super::clock::{clock, encode_timestamp, Clock};
use super::{bool_flag, tag_u8, take_u8, Bits};
use crate::util::{push_be_u16, BytesFormatter};

/// The stream ID used for DVD subtitles and other private data.
pub const PRIVATE_STREAM_1: u8 = 0xbd;

/// The stream ID used for padding packets.
pub const PADDING_STREAM: u8 = 0xbe;

/// Possible combinations of PTS and DTS data which might appear inside a
/// PES header.
///
/// See the [PES header documentation][PES] for details.
///
/// [PES]: http://dvd.sourceforge.net/dvdinfo/pes-hdr.html
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PtsDtsFlags {
    /// No time stamps.
    #[default]
    None,
    /// Presentation Time Stamp only.
    Pts,
    /// Presentation and Decode Time Stamps.
    PtsDts,
}

/// Parse PTS & DTS flags in a PES packet header.  Consumes two bits.
fn pts_dts_flags(i: Bits) -> IResult<Bits, PtsDtsFlags> {
    alt((
        value(PtsDtsFlags::None, tag_u8(0b00, 2)),
        value(PtsDtsFlags::Pts, tag_u8(0b10, 2)),
        value(PtsDtsFlags::PtsDts, tag_u8(0b11, 2)),
    ))(i)
}

#[test]
fn parse_pts_dts_flags() {
    assert_eq!(
        pts_dts_flags((&[0b00][..], 6)).unwrap(),
        ((&[][..], 0), PtsDtsFlags::None)
    );
    assert_eq!(
        pts_dts_flags((&[0b10][..], 6)).unwrap(),
        ((&[][..], 0), PtsDtsFlags::Pts)
    );
    assert_eq!(
        pts_dts_flags((&[0b11][..], 6)).unwrap(),
        ((&[][..], 0), PtsDtsFlags::PtsDts)
    );
}

/// Presentation and Decode Time Stamps, if available.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PtsDts {
    /// Presentation Time Stamp.
    pub pts: Clock,
    /// Decode Time Stamp.
    pub dts: Option<Clock>,
}

fn pts_only_bits(i: Bits) -> IResult<Bits, PtsDts> {
    let (i, _) = tag_u8(0b0010, 4)(i)?;
    let (i, pts) = clock(i)?;
    Ok((i, PtsDts { pts, dts: None }))
}

fn pts_and_dts_bits(i: Bits) -> IResult<Bits, PtsDts> {
    let (i, _) = tag_u8(0b0011, 4)(i)?;
    let (i, pts) = clock(i)?;
    let (i, _) = tag_u8(0b0001, 4)(i)?;
    let (i, dts) = clock(i)?;
    Ok((
        i,
        PtsDts {
            pts,
            dts: Some(dts),
        },
    ))
}

/// Parse a `PtsDts` value in the format specified by `flags`.
fn pts_dts(i: &[u8], flags: PtsDtsFlags) -> IResult<&[u8], Option<PtsDts>> {
    match flags {
        PtsDtsFlags::None => Ok((i, None)),
        PtsDtsFlags::Pts => {
            let (i, v) = bits(pts_only_bits)(i)?;
            Ok((i, Some(v)))
        }
        PtsDtsFlags::PtsDts => {
            let (i, v) = bits(pts_and_dts_bits)(i)?;
            Ok((i, Some(v)))
        }
    }
}

#[test]
fn parse_pts_dts() {
    assert_eq!(
        pts_dts(&[][..], PtsDtsFlags::None).unwrap(),
        (&[][..], None)
    );
    assert_eq!(
        pts_dts(&[0x21, 0x00, 0xab, 0xe9, 0xc1][..], PtsDtsFlags::Pts).unwrap(),
        (
            &[][..],
            Some(PtsDts {
                pts: Clock::base(2815200),
                dts: None,
            })
        )
    );
}

/// Flags specifying which header data fields are present.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeaderDataFlags {
    pub pts_dts_flags: PtsDtsFlags,
    pub escr_flag: bool,
    pub es_rate_flag: bool,
    pub dsm_trick_mode_flag: bool,
    pub additional_copy_info_flag: bool,
    pub crc_flag: bool,
    pub extension_flag: bool,
}

fn header_data_flags_bits(i: Bits) -> IResult<Bits, HeaderDataFlags> {
    let (i, pts_dts_flags) = pts_dts_flags(i)?;
    let (i, escr_flag) = bool_flag(i)?;
    let (i, es_rate_flag) = bool_flag(i)?;
    let (i, dsm_trick_mode_flag) = bool_flag(i)?;
    let (i, additional_copy_info_flag) = bool_flag(i)?;
    let (i, crc_flag) = bool_flag(i)?;
    let (i, extension_flag) = bool_flag(i)?;
    Ok((
        i,
        HeaderDataFlags {
            pts_dts_flags,
            escr_flag,
            es_rate_flag,
            dsm_trick_mode_flag,
            additional_copy_info_flag,
            crc_flag,
            extension_flag,
        },
    ))
}

fn header_data_flags(i: &[u8]) -> IResult<&[u8], HeaderDataFlags> {
    bits(header_data_flags_bits)(i)
}

#[test]
fn parse_header_data_flags() {
    assert_eq!(
        header_data_flags(&[0x80][..]).unwrap(),
        (
            &[][..],
            HeaderDataFlags {
                pts_dts_flags: PtsDtsFlags::Pts,
                ..HeaderDataFlags::default()
            }
        )
    );
}

/// Header data fields.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct HeaderData {
    pub flags: HeaderDataFlags,
    pub pts_dts: Option<PtsDts>,
    /// There's lots of other header data we could deserialize here, but
    /// we're not interested in any of it for subtitles.  Specify a private
    /// placeholder field so we can extend this without breaking the API.
    _placeholder: (),
}

/// Parse PES header data, including the preceding flags and length bytes.
/// Any header bytes we don't understand, including stuffing, are
/// discarded.
fn header_data(i: &[u8]) -> IResult<&[u8], HeaderData> {
    let (i, flags) = header_data_flags(i)?;
    let (i, pts_dts) = length_value(be_u8, |data| pts_dts(data, flags.pts_dts_flags))(i)?;
    Ok((
        i,
        HeaderData {
            flags,
            pts_dts,
            _placeholder: (),
        },
    ))
}

#[test]
fn parse_header_data() {
    assert_eq!(
        header_data(&[0x00, 0x00][..]).unwrap(),
        (&[][..], HeaderData::default())
    );
    assert_eq!(
        header_data(&[0x80, 0x05, 0x21, 0x00, 0xab, 0xe9, 0xc1][..]).unwrap(),
        (
            &[][..],
            HeaderData {
                flags: HeaderDataFlags {
                    pts_dts_flags: PtsDtsFlags::Pts,
                    ..HeaderDataFlags::default()
                },
                pts_dts: Some(PtsDts {
                    pts: Clock::base(2815200),
                    dts: None,
                }),
                ..HeaderData::default()
            }
        )
    );
}

/// A [Packetized Elementary Stream][pes] header, not including the
/// `HeaderData` information (which is parsed separately).
///
/// [pes]: http://dvd.sourceforge.net/dvdinfo/pes-hdr.html
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Header {
    pub scrambling_control: u8,
    pub priority: bool,
    pub data_alignment_indicator: bool,
    pub copyright: bool,
    pub original: bool,
}

fn header_bits(i: Bits) -> IResult<Bits, Header> {
    let (i, _) = tag_u8(0b10, 2)(i)?;
    let (i, scrambling_control) = take_u8(2)(i)?;
    let (i, priority) = bool_flag(i)?;
    let (i, data_alignment_indicator) = bool_flag(i)?;
    let (i, copyright) = bool_flag(i)?;
    let (i, original) = bool_flag(i)?;
    Ok((
        i,
        Header {
            scrambling_control,
            priority,
            data_alignment_indicator,
            copyright,
            original,
        },
    ))
}

/// Parse the first PES header byte after the length.
fn header(i: &[u8]) -> IResult<&[u8], Header> {
    bits(header_bits)(i)
}

/// A [Packetized Elementary Stream][pes] packet.
///
/// [pes]: http://dvd.sourceforge.net/dvdinfo/pes-hdr.html
#[derive(PartialEq, Eq)]
pub struct Packet<'a> {
    pub header: Header,
    pub header_data: HeaderData,
    pub substream_id: u8,
    pub data: &'a [u8],
}

impl<'a> fmt::Debug for Packet<'a> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Packet")
            .field("header", &self.header)
            .field("header_data", &self.header_data)
            .field("substream_id", &self.substream_id)
            .field("data", &BytesFormatter(self.data))
            .finish()
    }
}

fn packet_body(i: &[u8]) -> IResult<&[u8], Packet> {
    let (i, header) = header(i)?;
    let (i, header_data) = header_data(i)?;
    let (i, substream_id) = be_u8(i)?;
    let (i, data) = rest(i)?;
    Ok((
        i,
        Packet {
            header,
            header_data,
            substream_id,
            data,
        },
    ))
}

/// Parse a private stream 1 packet, which is where subtitles live.
pub fn packet(i: &[u8]) -> IResult<&[u8], Packet> {
    let (i, _) = tag(&[0x00, 0x00, 0x01, PRIVATE_STREAM_1][..])(i)?;
    length_value(be_u16, packet_body)(i)
}

/// Skip over any PES packet, returning its stream ID.
pub fn any_packet(i: &[u8]) -> IResult<&[u8], u8> {
    let (i, _) = tag(&[0x00, 0x00, 0x01][..])(i)?;
    let (i, stream_id) = be_u8(i)?;
    let (i, len) = be_u16(i)?;
    let (i, _) = take(len)(i)?;
    Ok((i, stream_id))
}

#[test]
fn parse_packet() {
    #[rustfmt::skip]
    let input = &[
        0x00, 0x00, 0x01, 0xbd,
        0x00, 0x10,
        0x81,
        0x80, 0x05, 0x21, 0x00, 0xab, 0xe9, 0xc1,
        0x20,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0xff,
    ][..];

    let expected = Packet {
        header: Header {
            original: true,
            ..Header::default()
        },
        header_data: HeaderData {
            flags: HeaderDataFlags {
                pts_dts_flags: PtsDtsFlags::Pts,
                ..HeaderDataFlags::default()
            },
            pts_dts: Some(PtsDts {
                pts: Clock::base(2815200),
                dts: None,
            }),
            ..HeaderData::default()
        },
        substream_id: 0x20,
        data: &[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
    };

    assert_eq!(packet(input).unwrap(), (&[0xff][..], expected));
}

/// Append a private stream 1 packet carrying `payload` for `substream_id`.
/// A `pts` is only written on the first packet of a subtitle.  `stuffing`
/// extra `0xff` bytes are placed in the header data.
pub fn write_packet(
    out: &mut Vec<u8>,
    pts: Option<i64>,
    substream_id: u8,
    stuffing: usize,
    payload: &[u8],
) {
    let ts_len = if pts.is_some() { 5 } else { 0 };
    let header_data_len = ts_len + stuffing;
    // Flags, header data length, header data, substream ID, payload.
    let len = 3 + header_data_len + 1 + payload.len();
    out.extend_from_slice(&[0x00, 0x00, 0x01, PRIVATE_STREAM_1]);
    push_be_u16(out, len as u16);
    out.push(0x81);
    out.push(if pts.is_some() { 0x80 } else { 0x00 });
    out.push(header_data_len as u8);
    if let Some(pts) = pts {
        out.extend_from_slice(&encode_timestamp(0b0010, pts));
    }
    out.extend(std::iter::repeat(0xff).take(stuffing));
    out.push(substream_id);
    out.extend_from_slice(payload);
}

/// Append a padding packet which is `total` bytes long, including its own
/// 6-byte header.
pub fn write_padding(out: &mut Vec<u8>, total: usize) {
    debug_assert!(total >= 6);
    out.extend_from_slice(&[0x00, 0x00, 0x01, PADDING_STREAM]);
    push_be_u16(out, (total - 6) as u16);
    out.extend(std::iter::repeat(0xff).take(total - 6));
}

#[test]
fn write_and_parse_packet() {
    let mut out = vec![];
    write_packet(&mut out, Some(2815200), 0x21, 3, &[1, 2, 3]);
    let (rest, parsed) = packet(&out).unwrap();
    assert!(rest.is_empty());
    assert_eq!(parsed.substream_id, 0x21);
    assert_eq!(parsed.data, &[1, 2, 3]);
    assert_eq!(parsed.header_data.pts_dts.unwrap().pts.ticks(), 2815200);

    let mut pad = vec![];
    write_padding(&mut pad, 10);
    assert_eq!(pad.len(), 10);
    assert_eq!(any_packet(&pad).unwrap(), (&[][..], PADDING_STREAM));
}
