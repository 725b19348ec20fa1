//! # DVD sub-picture units
//!
//! A sub-picture unit (SPU) holds one compressed subtitle image and the
//! control sequences which say when and how to show it.  The same SPU
//! format is carried by VobSub `*.sub` files and DVD `*.sup` files.
//!
//! For background, see [this documentation on the DVD subtitle format][subs].
//!
//! [subs]: http://sam.zoy.org/writings/dvd/subtitles/

use nom::bits::bits;
use nom::branch::alt;
use nom::bytes::complete::{tag, take};
use nom::combinator::{map, value};
use nom::multi::many_till;
use nom::number::complete::be_u16;
use nom::sequence::preceded;
use nom::IResult;

use crate::bitmap::{IndexedBitmap, Size};
use crate::errors::{Error, Result, Warnings};
use crate::frame::{ColorUpdate, Coordinates, DvdColors, SubtitleFrame};
use crate::mpeg2::{take_u16, take_u8, Bits};
use crate::rle;
use crate::util::{patch_be_u16, push_be_u16, push_be_u16_checked, BytesFormatter};

/// Control sequence dates are measured in units of this many 90kHz ticks.
pub const DATE_UNIT: i64 = 1024;

/// The largest SPU we can describe with a 16-bit size field.
pub const MAX_SPU_SIZE: usize = 0xffff;

/// The default length of a subtitle if no end time is provided and no
/// subtitle follows immediately after.  Five seconds.
pub(crate) const DEFAULT_SUBTITLE_LENGTH: i64 = 5 * 90_000;

/// The gap left before the next subtitle when we have to guess an end time.
pub(crate) const DEFAULT_SUBTITLE_SPACING: i64 = 90;

fn nibbles_bits(i: Bits) -> IResult<Bits, [u8; 4]> {
    let (i, a) = take_u8(4)(i)?;
    let (i, b) = take_u8(4)(i)?;
    let (i, c) = take_u8(4)(i)?;
    let (i, d) = take_u8(4)(i)?;
    Ok((i, [a, b, c, d]))
}

/// Parse four 4-bit entries, which are stored on the wire starting with
/// the entry for pixel value 3.  We return them in pixel-value order.
fn palette_entries(i: &[u8]) -> IResult<&[u8], [u8; 4]> {
    map(bits(nibbles_bits), |[e2, e1, p, b]: [u8; 4]| [b, p, e1, e2])(i)
}

#[test]
fn parse_palette_entries() {
    assert_eq!(
        palette_entries(&[0x03, 0x10][..]).unwrap(),
        (&[][..], [0x00, 0x01, 0x03, 0x00])
    );
}

fn coordinates_bits(i: Bits) -> IResult<Bits, Coordinates> {
    let (i, x1) = take_u16(12)(i)?;
    let (i, x2) = take_u16(12)(i)?;
    let (i, y1) = take_u16(12)(i)?;
    let (i, y2) = take_u16(12)(i)?;
    Ok((i, Coordinates { x1, y1, x2, y2 }))
}

/// Parse four 12-bit coordinate values as a rectangle (with right and
/// bottom coordinates inclusive).
fn coordinates(i: &[u8]) -> IResult<&[u8], Coordinates> {
    bits(coordinates_bits)(i)
}

/// Parse a pair of 16-bit RLE offsets.
fn rle_offsets(i: &[u8]) -> IResult<&[u8], [u16; 2]> {
    let (i, even) = be_u16(i)?;
    let (i, odd) = be_u16(i)?;
    Ok((i, [even, odd]))
}

/// Skip a length-prefixed "change color and contrast" command.  The length
/// includes its own two bytes.
fn change_color_contrast(i: &[u8]) -> IResult<&[u8], ()> {
    let (i, len) = be_u16(i)?;
    let (i, _) = take(len.saturating_sub(2))(i)?;
    Ok((i, ()))
}

/// Individual commands which may appear in a control sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
enum ControlCommand<'a> {
    /// Start displaying the subtitle, even if subtitles are turned off.
    Force,
    /// We should start displaying the subtitle at the `date` for this
    /// `ControlSequence`.
    StartDate,
    /// We should stop displaying the subtitle at the `date` for this
    /// `ControlSequence`.
    StopDate,
    /// Map each of the 4 colors in this subtitle to a 4-bit palette.
    Palette([u8; 4]),
    /// Map each of the 4 colors in this subtitle to 4 bits of alpha
    /// channel data.
    Alpha([u8; 4]),
    /// Coordinates at which to display the subtitle.
    Coordinates(Coordinates),
    /// Offsets of first and second scan line in our data buffer.  Note
    /// that the data buffer stores alternating scan lines separately, so
    /// these are the first line in each of the two chunks.
    RleOffsets([u16; 2]),
    /// Per-line color changes, which we skip.
    ChangeColorContrast,
    /// An opcode we don't know how to parse.  Its operands, if any, are
    /// decoded as further commands.
    Unsupported(&'a [u8]),
}

/// Parse a single command in a control sequence.
fn control_command(i: &[u8]) -> IResult<&[u8], ControlCommand> {
    alt((
        value(ControlCommand::Force, tag(&[0x00][..])),
        value(ControlCommand::StartDate, tag(&[0x01][..])),
        value(ControlCommand::StopDate, tag(&[0x02][..])),
        map(
            preceded(tag(&[0x03][..]), palette_entries),
            ControlCommand::Palette,
        ),
        map(
            preceded(tag(&[0x04][..]), palette_entries),
            ControlCommand::Alpha,
        ),
        map(
            preceded(tag(&[0x05][..]), coordinates),
            ControlCommand::Coordinates,
        ),
        map(
            preceded(tag(&[0x06][..]), rle_offsets),
            ControlCommand::RleOffsets,
        ),
        value(
            ControlCommand::ChangeColorContrast,
            preceded(tag(&[0x07][..]), change_color_contrast),
        ),
        // Skip just the opcode so that the commands after it still count.
        map(take(1usize), ControlCommand::Unsupported),
    ))(i)
}

/// The control packet for a subtitle.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ControlSequence<'a> {
    /// The time associated with this control sequence, in units of
    /// `DATE_UNIT` after the Presentation Time Stamp for this subtitle.
    date: u16,
    /// The offset of the next control sequence.  If this equals the offset
    /// of the current control sequence, this is the last control sequence.
    next: u16,
    /// Individual commands in this sequence.
    commands: Vec<ControlCommand<'a>>,
}

/// Parse a single control sequence.
fn control_sequence(i: &[u8]) -> IResult<&[u8], ControlSequence> {
    let (i, date) = be_u16(i)?;
    let (i, next) = be_u16(i)?;
    let (i, (commands, _)) = many_till(control_command, tag(&[0xff][..]))(i)?;
    Ok((
        i,
        ControlSequence {
            date,
            next,
            commands,
        },
    ))
}

#[test]
fn parse_control_sequence() {
    #[rustfmt::skip]
    let input_1 = &[
        0x00, 0x00, 0x0f, 0x41,
        0x01,
        0x03, 0x03, 0x10,
        0x04, 0xff, 0xf0,
        0x05, 0x29, 0xb4, 0xe6, 0x3c, 0x54, 0x00,
        0x06, 0x00, 0x04, 0x07, 0x7b,
        0xff
    ][..];
    let expected_1 = ControlSequence {
        date: 0x0000,
        next: 0x0f41,
        commands: vec![
            ControlCommand::StartDate,
            ControlCommand::Palette([0x0, 0x1, 0x3, 0x0]),
            ControlCommand::Alpha([0x0, 0xf, 0xf, 0xf]),
            ControlCommand::Coordinates(Coordinates {
                x1: 0x29b,
                x2: 0x4e6,
                y1: 0x3c5,
                y2: 0x400,
            }),
            ControlCommand::RleOffsets([0x0004, 0x077b]),
        ],
    };
    assert_eq!(control_sequence(input_1).unwrap(), (&[][..], expected_1));

    let input_2 = &[0x00, 0x77, 0x0f, 0x41, 0x02, 0xff][..];
    let expected_2 = ControlSequence {
        date: 0x0077,
        next: 0x0f41,
        commands: vec![ControlCommand::StopDate],
    };
    assert_eq!(control_sequence(input_2).unwrap(), (&[][..], expected_2));

    // Unknown opcodes are skipped one byte at a time.
    let input_3 = &[0x00, 0x00, 0x0b, 0x30, 0x00, 0x09, 0x01, 0x02, 0xff][..];
    let (_, parsed) = control_sequence(input_3).unwrap();
    assert_eq!(
        parsed.commands,
        vec![
            ControlCommand::Force,
            ControlCommand::Unsupported(&[0x09]),
            ControlCommand::StartDate,
            ControlCommand::StopDate,
        ]
    );
}

/// A decoded sub-picture unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spu {
    /// Should this subtitle be shown even when subtitles are off?
    pub forced: bool,
    /// Where to display the image.
    pub coordinates: Coordinates,
    /// The initial colors.
    pub colors: DvdColors,
    /// Ticks between the packet's timestamp and the start of display.
    pub start_delay: i64,
    /// Ticks between the packet's timestamp and the end of display, if the
    /// SPU says.
    pub stop_delay: Option<i64>,
    /// Later color changes, relative to the packet's timestamp.
    pub color_updates: Vec<ColorUpdate>,
    /// The image, with one 2-bit pixel value per byte.
    pub bitmap: IndexedBitmap,
}

fn be_u16_at(raw: &[u8], offset: usize) -> Result<usize> {
    raw.get(offset..offset + 2)
        .map(|b| usize::from(b[0]) << 8 | usize::from(b[1]))
        .ok_or(Error::IncompleteInput)
}

/// Parse a complete SPU.
pub fn parse(raw: &[u8], warnings: &mut Warnings) -> Result<Spu> {
    let size = be_u16_at(raw, 0)?;
    if size > raw.len() {
        return Err(Error::invalid_frame(format!(
            "SPU claims 0x{:x} bytes but only 0x{:x} are present",
            size,
            raw.len()
        )));
    }
    let raw = &raw[..size];
    let initial_control_offset = be_u16_at(raw, 2)?;

    let mut started: Option<i64> = None;
    let mut stop_delay = None;
    let mut forced = false;
    let mut coordinates = None;
    let mut palette = None;
    let mut alpha = None;
    let mut offsets = None;
    let mut color_updates: Vec<ColorUpdate> = vec![];

    let mut control_offset = initial_control_offset;
    let mut first = true;
    loop {
        trace!("looking for control sequence at: 0x{:x}", control_offset);
        if control_offset >= raw.len() {
            let msg = format!(
                "control offset is 0x{:x}, but SPU is only 0x{:x} bytes",
                control_offset,
                raw.len()
            );
            if first {
                return Err(Error::invalid_frame(msg));
            }
            warnings.warn(msg);
            break;
        }
        let control = match control_sequence(&raw[control_offset..]) {
            Ok((_, control)) => control,
            Err(err) if first => {
                return Err(Error::invalid_frame(format!(
                    "bad control sequence: {:?}",
                    err
                )));
            }
            Err(err) => {
                warnings.warn(format!("bad control sequence: {:?}", err));
                break;
            }
        };
        trace!("parsed control sequence: {:?}", &control);

        let date = i64::from(control.date) * DATE_UNIT;
        let mut new_palette = None;
        let mut new_alpha = None;
        for command in &control.commands {
            match *command {
                ControlCommand::Force => {
                    forced = true;
                    started = started.or(Some(date));
                }
                ControlCommand::StartDate => {
                    started = started.or(Some(date));
                }
                ControlCommand::StopDate => {
                    stop_delay = stop_delay.or(Some(date));
                }
                ControlCommand::Palette(p) => new_palette = Some(p),
                ControlCommand::Alpha(a) => new_alpha = Some(a),
                ControlCommand::Coordinates(c) => {
                    if c.x2 < c.x1 || c.y2 < c.y1 {
                        return Err(Error::invalid_frame("invalid bounding box"));
                    }
                    coordinates = coordinates.or(Some(c));
                }
                ControlCommand::RleOffsets(r) => offsets = Some(r),
                ControlCommand::ChangeColorContrast => {
                    debug!("skipping change-color-contrast command");
                }
                ControlCommand::Unsupported(b) => {
                    warnings.warn(format!(
                        "unsupported control command: {:?}",
                        BytesFormatter(b)
                    ));
                }
            }
        }

        if first || palette.is_none() || alpha.is_none() {
            palette = new_palette.or(palette);
            alpha = new_alpha.or(alpha);
        } else if new_palette.is_some() || new_alpha.is_some() {
            let prev = color_updates.last().map(|u| u.colors).unwrap_or(DvdColors {
                palette: palette.unwrap_or_default(),
                alpha: alpha.unwrap_or_default(),
            });
            color_updates.push(ColorUpdate {
                delay: date,
                colors: DvdColors {
                    palette: new_palette.unwrap_or(prev.palette),
                    alpha: new_alpha.unwrap_or(prev.alpha),
                },
            });
        }
        first = false;

        let next_control_offset = usize::from(control.next);
        if next_control_offset == control_offset {
            // This points back at us, so we're the last sequence.
            break;
        } else if next_control_offset < control_offset {
            warnings.warn("control offset went backwards");
            break;
        }
        control_offset = next_control_offset;
    }

    let coordinates =
        coordinates.ok_or_else(|| Error::invalid_frame("no coordinates for subtitle"))?;
    let offsets = offsets.ok_or_else(|| Error::invalid_frame("no RLE offsets for subtitle"))?;
    let start_delay = started.unwrap_or_else(|| {
        warnings.warn("no start date for subtitle");
        0
    });
    let mut colors = match (palette, alpha) {
        (Some(palette), Some(alpha)) => DvdColors { palette, alpha },
        _ => {
            warnings.warn("no palette or alpha for subtitle, using defaults");
            let default = DvdColors::default();
            DvdColors {
                palette: palette.unwrap_or(default.palette),
                alpha: alpha.unwrap_or(default.alpha),
            }
        }
    };

    // An invisible caption which fades in later really starts with its
    // first visible colors.
    if colors.is_invisible() {
        if let Some(pos) = color_updates.iter().position(|u| !u.colors.is_invisible()) {
            debug!("using delayed colors for invisible subtitle");
            colors = color_updates[pos].colors;
            color_updates.drain(..=pos);
        }
    }

    // Updates after the stop date keep the subtitle on screen.
    let stop_delay = match (stop_delay, color_updates.iter().map(|u| u.delay).max()) {
        (Some(stop), Some(last)) if last > stop => Some(last),
        (stop, _) => stop,
    };

    // We know where each set of scan lines starts, but not where it ends,
    // because encoders like to share bytes between the two sets and the
    // control sequences.  The RLE decoder stops when it has enough pixels.
    let start_0 = usize::from(offsets[0]);
    let start_1 = usize::from(offsets[1]);
    if start_0 > raw.len() || start_1 > raw.len() {
        return Err(Error::invalid_frame("invalid scan line offsets"));
    }
    let bitmap = rle::decompress(
        coordinates.size(),
        [&raw[start_0..], &raw[start_1..]],
        warnings,
    );

    let result = Spu {
        forced,
        coordinates,
        colors,
        start_delay,
        stop_delay,
        color_updates,
        bitmap,
    };
    trace!("Parsed SPU: {:?}", &result);
    Ok(result)
}

/// Turn SPUs and the timestamps of the packets they came in into frames on
/// a screen of `size`.  SPUs without a usable stop date end just before the
/// next one starts, or after a default length.
pub(crate) fn into_pictures(
    screen: Size,
    spus: Vec<(i64, Spu)>,
    warnings: &mut Warnings,
) -> Vec<(SubtitleFrame, IndexedBitmap)> {
    let starts = spus
        .iter()
        .map(|(base, spu)| base + spu.start_delay)
        .collect::<Vec<_>>();
    let mut pictures = Vec::with_capacity(spus.len());
    for (i, (base, spu)) in spus.into_iter().enumerate() {
        let start = starts[i];
        let end = match spu.stop_delay {
            Some(stop) if stop > spu.start_delay => base + stop,
            _ => {
                let alt_end = start + DEFAULT_SUBTITLE_LENGTH;
                match starts.get(i + 1) {
                    Some(next_start) => (next_start - DEFAULT_SUBTITLE_SPACING).min(alt_end),
                    None => alt_end,
                }
            }
        };
        let frame = SubtitleFrame::new(screen, spu.coordinates, start, end.max(start + 1))
            .map(|f| f.with_forced(spu.forced).with_dvd_colors(spu.colors));
        match frame {
            Ok(mut frame) => {
                frame.set_color_updates(spu.color_updates);
                pictures.push((frame, spu.bitmap));
            }
            Err(err) => warnings.warn(format!("skipping subtitle at {}: {}", start, err)),
        }
    }
    pictures
}

/// Convert a tick delay to a control sequence date, rounding to the nearest
/// unit.
fn ticks_to_date(ticks: i64) -> u16 {
    let date = (ticks.max(0) + DATE_UNIT / 2) / DATE_UNIT;
    date.min(0xffff) as u16
}

/// Pack 4 pixel-value-ordered nibbles in wire order.
fn push_nibbles(out: &mut Vec<u8>, [b, p, e1, e2]: [u8; 4]) {
    out.push((e2 & 0x0f) << 4 | (e1 & 0x0f));
    out.push((p & 0x0f) << 4 | (b & 0x0f));
}

/// Build the SPU for `frame`, whose image is `bitmap`.  The bitmap may only
/// use pixel values 0 to 3.
pub fn build(frame: &SubtitleFrame, bitmap: &IndexedBitmap) -> Result<Vec<u8>> {
    let coords = frame.coordinates();
    if coords.size() != bitmap.size() {
        return Err(Error::invalid_frame(format!(
            "image is {:?} but its coordinates are {:?}",
            bitmap.size(),
            coords.size()
        )));
    }
    if coords.x2 > 0xfff || coords.y2 > 0xfff {
        return Err(Error::too_large("coordinates exceed 12 bits"));
    }
    let colors = frame.dvd_colors().copied().unwrap_or_default();
    let rle = rle::compress(bitmap)?;

    let mut out = Vec::with_capacity(4 + rle.even.len() + rle.odd.len() + 64);
    // Size and control offset are filled in below.
    out.extend_from_slice(&[0, 0, 0, 0]);
    let even_offset = out.len();
    out.extend_from_slice(&rle.even);
    let odd_offset = out.len();
    out.extend_from_slice(&rle.odd);
    let control_offset = out.len();

    let mut updates = frame.color_updates().to_vec();
    updates.sort_by_key(|u| u.delay);
    let duration = frame.end() - frame.start();
    let stop_date = updates
        .iter()
        .map(|u| ticks_to_date(u.delay))
        .chain(Some(ticks_to_date(duration)))
        .max()
        .unwrap_or(0);

    // The first sequence: start display with everything we know.
    let first_len = 24 + usize::from(frame.forced());
    push_be_u16(&mut out, 0);
    push_be_u16_checked(&mut out, control_offset + first_len, "control offset")?;
    if frame.forced() {
        out.push(0x00);
    }
    out.push(0x01);
    out.push(0x03);
    push_nibbles(&mut out, colors.palette);
    out.push(0x04);
    push_nibbles(&mut out, colors.alpha);
    out.push(0x05);
    let (x1, x2, y1, y2) = (coords.x1, coords.x2, coords.y1, coords.y2);
    out.extend_from_slice(&[
        (x1 >> 4) as u8,
        ((x1 & 0x0f) << 4 | x2 >> 8) as u8,
        x2 as u8,
        (y1 >> 4) as u8,
        ((y1 & 0x0f) << 4 | y2 >> 8) as u8,
        y2 as u8,
    ]);
    out.push(0x06);
    push_be_u16_checked(&mut out, even_offset, "even line offset")?;
    push_be_u16_checked(&mut out, odd_offset, "odd line offset")?;
    out.push(0xff);
    debug_assert_eq!(out.len(), control_offset + first_len);

    // Color updates.
    for update in &updates {
        let here = out.len();
        push_be_u16(&mut out, ticks_to_date(update.delay));
        push_be_u16_checked(&mut out, here + 11, "control offset")?;
        out.push(0x03);
        push_nibbles(&mut out, update.colors.palette);
        out.push(0x04);
        push_nibbles(&mut out, update.colors.alpha);
        out.push(0xff);
    }

    // The last sequence stops display and points at itself.
    let here = out.len();
    push_be_u16(&mut out, stop_date);
    push_be_u16_checked(&mut out, here, "control offset")?;
    out.push(0x02);
    out.push(0xff);

    if out.len() > MAX_SPU_SIZE {
        return Err(Error::too_large(format!(
            "SPU is 0x{:x} bytes, but the limit is 0x{:x}",
            out.len(),
            MAX_SPU_SIZE
        )));
    }
    let size = out.len() as u16;
    patch_be_u16(&mut out, 0, size);
    patch_be_u16(&mut out, 2, control_offset as u16);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame(forced: bool) -> (SubtitleFrame, IndexedBitmap) {
        let data = (0..40 * 6).map(|i| (i % 7 % 4) as u8).collect::<Vec<_>>();
        let bitmap = IndexedBitmap::from_raw(40, 6, data).unwrap();
        let coords = Coordinates::from_ltwh(100, 400, 40, 6).unwrap();
        let frame = SubtitleFrame::new(Size { w: 720, h: 480 }, coords, 0, 90_000)
            .unwrap()
            .with_forced(forced)
            .with_dvd_colors(DvdColors {
                palette: [0, 5, 9, 14],
                alpha: [0, 15, 8, 15],
            });
        (frame, bitmap)
    }

    #[test]
    fn build_then_parse() {
        let (frame, bitmap) = sample_frame(true);
        let raw = build(&frame, &bitmap).unwrap();
        assert_eq!(usize::from(raw[0]) << 8 | usize::from(raw[1]), raw.len());

        let mut warnings = Warnings::new();
        let spu = parse(&raw, &mut warnings).unwrap();
        assert!(warnings.is_empty());
        assert!(spu.forced);
        assert_eq!(spu.coordinates, *frame.coordinates());
        assert_eq!(spu.colors, *frame.dvd_colors().unwrap());
        assert_eq!(spu.start_delay, 0);
        // 90000 / 1024 rounds to 88 units.
        assert_eq!(spu.stop_delay, Some(88 * DATE_UNIT));
        assert_eq!(spu.bitmap, bitmap);
    }

    #[test]
    fn color_updates_round_trip() {
        let (frame, bitmap) = sample_frame(false);
        let mut frame = frame;
        let update = ColorUpdate {
            delay: 20 * DATE_UNIT,
            colors: DvdColors {
                palette: [1, 2, 3, 4],
                alpha: [0, 4, 4, 4],
            },
        };
        frame.set_color_updates(vec![update]);
        let raw = build(&frame, &bitmap).unwrap();
        let spu = parse(&raw, &mut Warnings::new()).unwrap();
        assert!(!spu.forced);
        assert_eq!(spu.color_updates, vec![update]);
    }

    #[test]
    fn invisible_frames_take_their_first_visible_colors() {
        let (frame, bitmap) = sample_frame(false);
        let hidden = DvdColors {
            palette: [0, 1, 2, 3],
            alpha: [0, 0, 0, 0],
        };
        let shown = DvdColors {
            palette: [0, 1, 2, 3],
            alpha: [0, 15, 15, 15],
        };
        let frame = frame.with_dvd_colors(hidden);
        let mut frame = frame;
        // This update comes after the stop date, so it extends the frame.
        frame.set_color_updates(vec![ColorUpdate {
            delay: 100 * DATE_UNIT,
            colors: shown,
        }]);
        let raw = build(&frame, &bitmap).unwrap();
        let spu = parse(&raw, &mut Warnings::new()).unwrap();
        assert_eq!(spu.colors, shown);
        assert!(spu.color_updates.is_empty());
        assert_eq!(spu.stop_delay, Some(100 * DATE_UNIT));
    }

    #[test]
    fn rejects_bitmaps_with_too_many_colors() {
        let (frame, _) = sample_frame(false);
        let bitmap = IndexedBitmap::new(40, 6, 7);
        assert!(build(&frame, &bitmap).is_err());
    }

    #[test]
    fn rejects_oversized_spus() {
        // A noisy 1920x1080 image can't be described in 64 KiB.
        let (w, h) = (1920, 1080);
        let data = (0..w * h).map(|i| ((i * 7 + i / 3) % 4) as u8).collect();
        let bitmap = IndexedBitmap::from_raw(w, h, data).unwrap();
        let coords = Coordinates::from_ltwh(0, 0, w as u16, h as u16).unwrap();
        let frame = SubtitleFrame::new(Size { w, h }, coords, 0, 1000).unwrap();
        match build(&frame, &bitmap) {
            Err(Error::ImageTooLarge { .. }) => {}
            other => panic!("unexpected result: {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn missing_stop_dates_are_filled_in() {
        let (frame, bitmap) = sample_frame(false);
        let raw = build(&frame, &bitmap).unwrap();
        let mut first = parse(&raw, &mut Warnings::new()).unwrap();
        first.stop_delay = None;
        let mut second = first.clone();
        second.stop_delay = None;
        let spus = vec![(1000, first), (1000 + 90_000, second)];
        let pictures = into_pictures(Size { w: 720, h: 480 }, spus, &mut Warnings::new());
        assert_eq!(pictures.len(), 2);
        assert_eq!(pictures[0].0.end(), 1000 + 90_000 - DEFAULT_SUBTITLE_SPACING);
        assert_eq!(pictures[1].0.end(), 1000 + 90_000 + DEFAULT_SUBTITLE_LENGTH);
    }

    #[test]
    fn unknown_opcode_before_coordinates_is_skipped() {
        let (frame, bitmap) = sample_frame(false);
        let mut raw = build(&frame, &bitmap).unwrap();
        let control = be_u16_at(&raw, 2).unwrap();
        // Put an unknown opcode in front of the first sequence's commands,
        // and move everything after it along by one byte.
        raw.insert(control + 4, 0x08);
        let size = raw.len() as u16;
        patch_be_u16(&mut raw, 0, size);
        let last = be_u16_at(&raw, control + 2).unwrap() + 1;
        patch_be_u16(&mut raw, control + 2, last as u16);
        patch_be_u16(&mut raw, last + 2, last as u16);

        let mut warnings = Warnings::new();
        let spu = parse(&raw, &mut warnings).unwrap();
        assert_eq!(warnings.count(), 1);
        assert_eq!(spu.coordinates, *frame.coordinates());
        assert_eq!(spu.colors, *frame.dvd_colors().unwrap());
        assert_eq!(spu.stop_delay, Some(88 * DATE_UNIT));
        assert_eq!(spu.bitmap, bitmap);
    }

    #[test]
    fn truncated_spu_is_an_error() {
        let (frame, bitmap) = sample_frame(false);
        let raw = build(&frame, &bitmap).unwrap();
        assert!(parse(&raw[..raw.len() - 10], &mut Warnings::new()).is_err());
    }
}
