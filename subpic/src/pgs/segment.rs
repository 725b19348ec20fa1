//! Blu-ray presentation graphics segments.

use nom::bytes::complete::{tag, take};
use nom::combinator::{map, rest};
use nom::multi::{count, length_data};
use nom::number::complete::{be_u16, be_u24, be_u32, be_u8};
use nom::IResult;

use crate::errors::{Error, Result};
use crate::util::push_be_u16;

/// Every segment starts with these bytes.
pub const PGS_MAGIC: &[u8; 2] = b"PG";

/// The size of a segment header, including the magic bytes.
pub const HEADER_LEN: usize = 13;

/// The largest segment body.
pub const MAX_BODY_LEN: usize = 0xffff;

const PDS: u8 = 0x14;
const ODS: u8 = 0x15;
const PCS: u8 = 0x16;
const WDS: u8 = 0x17;
const END: u8 = 0x80;

/// How a presentation composition relates to the ones before it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompositionState {
    /// An update to the current display.
    #[default]
    Normal,
    /// A full refresh, for decoders joining mid-stream.
    AcquisitionPoint,
    /// A new display, where nothing carries over.
    EpochStart,
}

impl CompositionState {
    fn from_byte(b: u8) -> CompositionState {
        match b & 0xc0 {
            0x80 | 0xc0 => CompositionState::EpochStart,
            0x40 => CompositionState::AcquisitionPoint,
            _ => CompositionState::Normal,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            CompositionState::Normal => 0x00,
            CompositionState::AcquisitionPoint => 0x40,
            CompositionState::EpochStart => 0x80,
        }
    }
}

/// Cropping applied to an object when it is shown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Crop {
    /// Left edge of the visible part, relative to the object.
    pub x: u16,
    /// Top edge of the visible part, relative to the object.
    pub y: u16,
    /// Width of the visible part.
    pub width: u16,
    /// Height of the visible part.
    pub height: u16,
}

/// One object placed on the screen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompositionObject {
    /// The `ObjectDefinition` to show.
    pub object_id: u16,
    /// The window the object is drawn into.
    pub window_id: u8,
    /// Should this object be shown even when subtitles are turned off?
    pub forced: bool,
    /// Left edge on screen.
    pub x: u16,
    /// Top edge on screen.
    pub y: u16,
    /// Only show part of the object.
    pub crop: Option<Crop>,
}

/// Says what should be on screen from this segment's PTS onwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PresentationComposition {
    /// Screen width.
    pub width: u16,
    /// Screen height.
    pub height: u16,
    /// The video frame rate code.
    pub frame_rate: u8,
    /// Counts up with each composition in the stream.
    pub composition_number: u16,
    /// Whether this starts a new display.
    pub composition_state: CompositionState,
    /// Only the palette changed since the last composition.
    pub palette_update: bool,
    /// The `PaletteDefinition` used by every object.
    pub palette_id: u8,
    /// What to show.  Empty when the screen should be cleared.
    pub objects: Vec<CompositionObject>,
}

/// A screen area which objects are drawn into.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WindowDefinition {
    /// Referred to by `CompositionObject::window_id`.
    pub id: u8,
    /// Left edge on screen.
    pub x: u16,
    /// Top edge on screen.
    pub y: u16,
    /// Window width.
    pub width: u16,
    /// Window height.
    pub height: u16,
}

/// One palette color, stored as BT.601 or BT.709 YCbCr plus alpha.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PaletteEntry {
    /// The pixel value this entry colors.
    pub id: u8,
    /// Luma.
    pub y: u8,
    /// Red-difference chroma.
    pub cr: u8,
    /// Blue-difference chroma.
    pub cb: u8,
    /// Opacity, where 0 is transparent.
    pub alpha: u8,
}

/// A set of palette entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PaletteDefinition {
    /// Referred to by `PresentationComposition::palette_id`.
    pub id: u8,
    /// Bumped when a palette with the same `id` changes.
    pub version: u8,
    /// The colors.  Missing pixel values are transparent.
    pub entries: Vec<PaletteEntry>,
}

/// A fragment of a run-length encoded image.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectDefinition {
    /// Referred to by `CompositionObject::object_id`.
    pub id: u16,
    /// Bumped when an object with the same `id` changes.
    pub version: u8,
    /// This is the first fragment of the object.
    pub first: bool,
    /// This is the last fragment of the object.
    pub last: bool,
    /// Present on the first fragment only: the total RLE length plus 4,
    /// and the image size.
    pub data_len: Option<u32>,
    /// Image width, or 0 on later fragments.
    pub width: u16,
    /// Image height, or 0 on later fragments.
    pub height: u16,
    /// This fragment's share of the RLE data.
    pub data: Vec<u8>,
}

/// The body of a segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SegmentBody {
    /// Says what to show, and starts a display set.
    PresentationComposition(PresentationComposition),
    /// The windows used by this display set.
    WindowDefinition(Vec<WindowDefinition>),
    /// Colors for the objects.
    PaletteDefinition(PaletteDefinition),
    /// All or part of an image.
    ObjectDefinition(ObjectDefinition),
    /// Ends a display set.
    End,
}

/// A complete segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    /// Presentation time stamp, in 90 kHz ticks.
    pub pts: u32,
    /// Decoding time stamp, usually 0.
    pub dts: u32,
    /// What this segment says.
    pub body: SegmentBody,
}

fn composition_object(i: &[u8]) -> IResult<&[u8], CompositionObject> {
    let (i, object_id) = be_u16(i)?;
    let (i, window_id) = be_u8(i)?;
    let (i, flags) = be_u8(i)?;
    let (i, x) = be_u16(i)?;
    let (i, y) = be_u16(i)?;
    let (i, crop) = if flags & 0x80 != 0 {
        let (i, cx) = be_u16(i)?;
        let (i, cy) = be_u16(i)?;
        let (i, width) = be_u16(i)?;
        let (i, height) = be_u16(i)?;
        (
            i,
            Some(Crop {
                x: cx,
                y: cy,
                width,
                height,
            }),
        )
    } else {
        (i, None)
    };
    Ok((
        i,
        CompositionObject {
            object_id,
            window_id,
            forced: flags & 0x40 != 0,
            x,
            y,
            crop,
        },
    ))
}

fn presentation_composition(i: &[u8]) -> IResult<&[u8], PresentationComposition> {
    let (i, width) = be_u16(i)?;
    let (i, height) = be_u16(i)?;
    let (i, frame_rate) = be_u8(i)?;
    let (i, composition_number) = be_u16(i)?;
    let (i, state) = be_u8(i)?;
    let (i, palette_update) = be_u8(i)?;
    let (i, palette_id) = be_u8(i)?;
    let (i, n) = be_u8(i)?;
    let (i, objects) = count(composition_object, usize::from(n))(i)?;
    Ok((
        i,
        PresentationComposition {
            width,
            height,
            frame_rate,
            composition_number,
            composition_state: CompositionState::from_byte(state),
            palette_update: palette_update & 0x80 != 0,
            palette_id,
            objects,
        },
    ))
}

fn window_definition(i: &[u8]) -> IResult<&[u8], WindowDefinition> {
    let (i, id) = be_u8(i)?;
    let (i, x) = be_u16(i)?;
    let (i, y) = be_u16(i)?;
    let (i, width) = be_u16(i)?;
    let (i, height) = be_u16(i)?;
    Ok((
        i,
        WindowDefinition {
            id,
            x,
            y,
            width,
            height,
        },
    ))
}

fn window_definitions(i: &[u8]) -> IResult<&[u8], Vec<WindowDefinition>> {
    let (i, n) = be_u8(i)?;
    count(window_definition, usize::from(n))(i)
}

fn palette_entry(i: &[u8]) -> IResult<&[u8], PaletteEntry> {
    let (i, e) = take(5usize)(i)?;
    Ok((
        i,
        PaletteEntry {
            id: e[0],
            y: e[1],
            cr: e[2],
            cb: e[3],
            alpha: e[4],
        },
    ))
}

fn palette_definition(i: &[u8]) -> IResult<&[u8], PaletteDefinition> {
    let (i, id) = be_u8(i)?;
    let (i, version) = be_u8(i)?;
    let n = i.len() / 5;
    let (i, entries) = count(palette_entry, n)(i)?;
    Ok((
        i,
        PaletteDefinition {
            id,
            version,
            entries,
        },
    ))
}

fn object_definition(i: &[u8]) -> IResult<&[u8], ObjectDefinition> {
    let (i, id) = be_u16(i)?;
    let (i, version) = be_u8(i)?;
    let (i, flags) = be_u8(i)?;
    let first = flags & 0x80 != 0;
    let (i, data_len, width, height) = if first {
        let (i, data_len) = be_u24(i)?;
        let (i, width) = be_u16(i)?;
        let (i, height) = be_u16(i)?;
        (i, Some(data_len), width, height)
    } else {
        (i, None, 0, 0)
    };
    let (i, data) = map(rest, |d: &[u8]| d.to_vec())(i)?;
    Ok((
        i,
        ObjectDefinition {
            id,
            version,
            first,
            last: flags & 0x40 != 0,
            data_len,
            width,
            height,
            data,
        },
    ))
}

/// Parse one segment.  Unknown segment types are an error.
pub fn segment(i: &[u8]) -> IResult<&[u8], Segment> {
    let (i, _) = tag(&PGS_MAGIC[..])(i)?;
    let (i, pts) = be_u32(i)?;
    let (i, dts) = be_u32(i)?;
    let (i, kind) = be_u8(i)?;
    let (i, body) = length_data(be_u16)(i)?;
    let (_, body) = match kind {
        PCS => map(presentation_composition, SegmentBody::PresentationComposition)(body)?,
        WDS => map(window_definitions, SegmentBody::WindowDefinition)(body)?,
        PDS => map(palette_definition, SegmentBody::PaletteDefinition)(body)?,
        ODS => map(object_definition, SegmentBody::ObjectDefinition)(body)?,
        END => (body, SegmentBody::End),
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                i,
                nom::error::ErrorKind::Switch,
            )))
        }
    };
    Ok((i, Segment { pts, dts, body }))
}

impl Segment {
    /// Append this segment to `out`.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut body = vec![];
        let kind = match &self.body {
            SegmentBody::PresentationComposition(pcs) => {
                push_be_u16(&mut body, pcs.width);
                push_be_u16(&mut body, pcs.height);
                body.push(pcs.frame_rate);
                push_be_u16(&mut body, pcs.composition_number);
                body.push(pcs.composition_state.to_byte());
                body.push(if pcs.palette_update { 0x80 } else { 0x00 });
                body.push(pcs.palette_id);
                body.push(cast::u8(pcs.objects.len())?);
                for obj in &pcs.objects {
                    push_be_u16(&mut body, obj.object_id);
                    body.push(obj.window_id);
                    let mut flags = 0;
                    if obj.crop.is_some() {
                        flags |= 0x80;
                    }
                    if obj.forced {
                        flags |= 0x40;
                    }
                    body.push(flags);
                    push_be_u16(&mut body, obj.x);
                    push_be_u16(&mut body, obj.y);
                    if let Some(crop) = obj.crop {
                        push_be_u16(&mut body, crop.x);
                        push_be_u16(&mut body, crop.y);
                        push_be_u16(&mut body, crop.width);
                        push_be_u16(&mut body, crop.height);
                    }
                }
                PCS
            }
            SegmentBody::WindowDefinition(windows) => {
                body.push(cast::u8(windows.len())?);
                for w in windows {
                    body.push(w.id);
                    push_be_u16(&mut body, w.x);
                    push_be_u16(&mut body, w.y);
                    push_be_u16(&mut body, w.width);
                    push_be_u16(&mut body, w.height);
                }
                WDS
            }
            SegmentBody::PaletteDefinition(pds) => {
                body.push(pds.id);
                body.push(pds.version);
                for e in &pds.entries {
                    body.extend_from_slice(&[e.id, e.y, e.cr, e.cb, e.alpha]);
                }
                PDS
            }
            SegmentBody::ObjectDefinition(ods) => {
                push_be_u16(&mut body, ods.id);
                body.push(ods.version);
                let mut flags = 0;
                if ods.first {
                    flags |= 0x80;
                }
                if ods.last {
                    flags |= 0x40;
                }
                body.push(flags);
                if ods.first {
                    let len = ods.data_len.unwrap_or(0);
                    if len > 0xff_ffff {
                        return Err(Error::too_large("object data exceeds 24 bits"));
                    }
                    body.extend_from_slice(&len.to_be_bytes()[1..]);
                    push_be_u16(&mut body, ods.width);
                    push_be_u16(&mut body, ods.height);
                }
                body.extend_from_slice(&ods.data);
                ODS
            }
            SegmentBody::End => END,
        };
        if body.len() > MAX_BODY_LEN {
            return Err(Error::too_large(format!(
                "segment body of 0x{:x} bytes",
                body.len()
            )));
        }
        out.extend_from_slice(PGS_MAGIC);
        out.extend_from_slice(&self.pts.to_be_bytes());
        out.extend_from_slice(&self.dts.to_be_bytes());
        out.push(kind);
        push_be_u16(out, body.len() as u16);
        out.extend_from_slice(&body);
        Ok(())
    }
}
