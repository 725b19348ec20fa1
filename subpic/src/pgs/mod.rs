//! Blu-ray `*.sup` streams, made of presentation graphics segments.
//!
//! A subtitle is shown by a display set containing a composition segment
//! which places one or more objects on screen, and hidden by a later display
//! set whose composition is empty.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::bitmap::{IndexedBitmap, Size};
use crate::errors::{Error, Result, Warnings};
use crate::frame::{Coordinates, DecodedPicture, SubtitleFrame};
use crate::palette::{ColorSpace, Palette};
use crate::spu::DEFAULT_SUBTITLE_LENGTH;
use crate::time::{bd_frame_rate, bd_frame_rate_code};

pub mod rle;
pub mod segment;

use self::segment::{
    segment, CompositionObject, CompositionState, ObjectDefinition, PaletteDefinition,
    PaletteEntry, PresentationComposition, Segment, SegmentBody, WindowDefinition, HEADER_LEN,
    MAX_BODY_LEN, PGS_MAGIC,
};

/// Find the next segment header at or after `from`.
fn find_magic(data: &[u8], from: usize) -> Option<usize> {
    data.get(from..)?
        .windows(PGS_MAGIC.len())
        .position(|w| w == PGS_MAGIC)
        .map(|p| p + from)
}

/// An object whose fragments we are still collecting.
#[derive(Debug, Default)]
struct ObjectBuffer {
    width: usize,
    height: usize,
    data: Vec<u8>,
    complete: bool,
}

/// A subtitle which has been shown but not yet hidden.
#[derive(Debug)]
struct OpenPicture {
    start: i64,
    screen: Size,
    coordinates: Coordinates,
    forced: bool,
    bitmap: IndexedBitmap,
    palette: Palette,
}

impl OpenPicture {
    fn shows_same_image(&self, other: &OpenPicture) -> bool {
        self.coordinates == other.coordinates
            && self.forced == other.forced
            && self.bitmap == other.bitmap
            && self.palette == other.palette
    }

    fn close(self, end: i64, warnings: &mut Warnings) -> Option<DecodedPicture> {
        match SubtitleFrame::new(self.screen, self.coordinates, self.start, end) {
            Ok(frame) => Some(DecodedPicture {
                frame: frame.with_forced(self.forced),
                bitmap: self.bitmap,
                palette: self.palette,
            }),
            Err(err) => {
                warnings.warn(format!("skipping subtitle at {}: {}", self.start, err));
                None
            }
        }
    }
}

/// Decoder state carried between display sets.
#[derive(Debug)]
struct Decoder {
    space: ColorSpace,
    screen: Option<Size>,
    frame_rate: Option<u8>,
    composition: Option<(i64, PresentationComposition)>,
    palettes: HashMap<u8, BTreeMap<u8, PaletteEntry>>,
    objects: HashMap<u16, ObjectBuffer>,
    open: Option<OpenPicture>,
    pictures: Vec<DecodedPicture>,
}

impl Decoder {
    fn new(space: ColorSpace) -> Decoder {
        Decoder {
            space,
            screen: None,
            frame_rate: None,
            composition: None,
            palettes: HashMap::new(),
            objects: HashMap::new(),
            open: None,
            pictures: vec![],
        }
    }

    fn handle(&mut self, seg: Segment, warnings: &mut Warnings) {
        let pts = i64::from(seg.pts);
        match seg.body {
            SegmentBody::PresentationComposition(pcs) => {
                if pcs.composition_state == CompositionState::EpochStart {
                    self.palettes.clear();
                    self.objects.clear();
                }
                if self.screen.is_none() {
                    self.screen = Some(Size {
                        w: usize::from(pcs.width),
                        h: usize::from(pcs.height),
                    });
                    self.frame_rate = Some(pcs.frame_rate);
                }
                self.composition = Some((pts, pcs));
            }
            SegmentBody::WindowDefinition(_) => {}
            SegmentBody::PaletteDefinition(pds) => {
                let palette = self.palettes.entry(pds.id).or_default();
                for entry in pds.entries {
                    palette.insert(entry.id, entry);
                }
            }
            SegmentBody::ObjectDefinition(ods) => self.add_fragment(ods, warnings),
            SegmentBody::End => self.end_display_set(warnings),
        }
    }

    fn add_fragment(&mut self, ods: ObjectDefinition, warnings: &mut Warnings) {
        if ods.first {
            let buffer = ObjectBuffer {
                width: usize::from(ods.width),
                height: usize::from(ods.height),
                data: ods.data,
                complete: ods.last,
            };
            self.objects.insert(ods.id, buffer);
        } else {
            match self.objects.get_mut(&ods.id) {
                Some(buffer) if !buffer.complete => {
                    buffer.data.extend_from_slice(&ods.data);
                    buffer.complete = ods.last;
                }
                _ => warnings.warn(format!("object {} fragment has no start", ods.id)),
            }
        }
    }

    fn palette(&self, id: u8, warnings: &mut Warnings) -> Result<Palette> {
        let mut palette = Palette::new(256, self.space)?;
        match self.palettes.get(&id) {
            Some(entries) => {
                for entry in entries.values() {
                    let i = usize::from(entry.id);
                    palette.set_ycbcr(i, entry.y, entry.cb, entry.cr);
                    palette.set_alpha(i, entry.alpha);
                }
            }
            None => warnings.warn(format!("palette {} was never defined", id)),
        }
        Ok(palette)
    }

    /// Decode one object, applying its cropping.  Returns the position and
    /// image.
    fn object_image(
        &self,
        obj: &CompositionObject,
        warnings: &mut Warnings,
    ) -> Option<(usize, usize, IndexedBitmap)> {
        let buffer = match self.objects.get(&obj.object_id) {
            Some(buffer) if buffer.complete => buffer,
            Some(_) => {
                warnings.warn(format!("object {} is incomplete", obj.object_id));
                return None;
            }
            None => {
                warnings.warn(format!("object {} was never defined", obj.object_id));
                return None;
            }
        };
        if buffer.width == 0 || buffer.height == 0 {
            warnings.warn(format!("object {} is empty", obj.object_id));
            return None;
        }
        let mut bitmap = rle::decode(buffer.width, buffer.height, &buffer.data, warnings);
        if let Some(crop) = obj.crop {
            let x = usize::from(crop.x).min(buffer.width - 1);
            let y = usize::from(crop.y).min(buffer.height - 1);
            let w = usize::from(crop.width).clamp(1, buffer.width - x);
            let h = usize::from(crop.height).clamp(1, buffer.height - y);
            bitmap = bitmap.crop(x, y, w, h);
        }
        Some((usize::from(obj.x), usize::from(obj.y), bitmap))
    }

    /// Build the picture described by a composition, merging all of its
    /// objects into one bitmap.
    fn compose(
        &self,
        start: i64,
        pcs: &PresentationComposition,
        warnings: &mut Warnings,
    ) -> Result<Option<OpenPicture>> {
        let mut images = pcs
            .objects
            .iter()
            .filter_map(|obj| self.object_image(obj, warnings))
            .collect::<Vec<_>>();
        if images.is_empty() {
            return Ok(None);
        }
        let palette = self.palette(pcs.palette_id, warnings)?;

        let x1 = images.iter().map(|(x, _, _)| *x).min().unwrap_or(0);
        let y1 = images.iter().map(|(_, y, _)| *y).min().unwrap_or(0);
        let x2 = images.iter().map(|(x, _, b)| x + b.width()).max().unwrap_or(0);
        let y2 = images.iter().map(|(_, y, b)| y + b.height()).max().unwrap_or(0);
        let bitmap = if images.len() == 1 {
            images.swap_remove(0).2
        } else {
            let transparent = cast::u8(palette.transparent_index())?;
            let mut merged = IndexedBitmap::new(x2 - x1, y2 - y1, transparent);
            for (x, y, image) in &images {
                for row in 0..image.height() {
                    for (col, &px) in image.row(row).iter().enumerate() {
                        merged.set(x - x1 + col, y - y1 + row, px);
                    }
                }
            }
            merged
        };

        let coordinates = Coordinates::from_ltwh(
            cast::u16(x1)?,
            cast::u16(y1)?,
            cast::u16(x2 - x1)?,
            cast::u16(y2 - y1)?,
        )?;
        Ok(Some(OpenPicture {
            start,
            screen: Size {
                w: usize::from(pcs.width),
                h: usize::from(pcs.height),
            },
            coordinates,
            forced: pcs.objects.iter().any(|obj| obj.forced),
            bitmap,
            palette,
        }))
    }

    fn end_display_set(&mut self, warnings: &mut Warnings) {
        let (pts, pcs) = match self.composition.take() {
            Some(composition) => composition,
            None => {
                warnings.warn("display set has no composition segment");
                return;
            }
        };
        let next = match self.compose(pts, &pcs, warnings) {
            Ok(next) => next,
            Err(err) => {
                warnings.warn(format!("skipping subtitle at {}: {}", pts, err));
                None
            }
        };
        match (self.open.take(), next) {
            // Acquisition points repeat what is already on screen.
            (Some(open), Some(next)) if open.shows_same_image(&next) => {
                self.open = Some(open);
            }
            (open, next) => {
                if let Some(open) = open {
                    if let Some(picture) = open.close(pts, warnings) {
                        self.pictures.push(picture);
                    }
                }
                self.open = next;
            }
        }
    }

    fn finish(mut self, warnings: &mut Warnings) -> Vec<DecodedPicture> {
        if self.composition.is_some() {
            warnings.warn("stream ends inside a display set");
        }
        if let Some(open) = self.open.take() {
            let end = open.start + DEFAULT_SUBTITLE_LENGTH;
            if let Some(picture) = open.close(end, warnings) {
                self.pictures.push(picture);
            }
        }
        self.pictures
    }
}

/// A Blu-ray `*.sup` subtitle stream.
#[derive(Debug, Clone)]
pub struct SupBdStream {
    screen: Size,
    fps: Option<f64>,
    pictures: Vec<DecodedPicture>,
}

impl SupBdStream {
    /// Open a `*.sup` file, interpreting its colors using `space`.
    pub fn open<P: AsRef<Path>>(
        path: P,
        space: ColorSpace,
        warnings: &mut Warnings,
    ) -> Result<SupBdStream> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| Error::ReadFile {
            path: path.to_owned(),
            source,
        })?;
        SupBdStream::from_bytes(&data, space, warnings)
    }

    /// Parse a `*.sup` stream.
    pub fn from_bytes(data: &[u8], space: ColorSpace, warnings: &mut Warnings) -> Result<SupBdStream> {
        if !data.starts_with(PGS_MAGIC) {
            return Err(Error::BadMagic {
                what: "Blu-ray SUP segment",
            });
        }
        let mut decoder = Decoder::new(space);
        let mut pos = 0;
        while pos < data.len() {
            match segment(&data[pos..]) {
                Ok((rest, seg)) => {
                    trace!("segment at 0x{:x} with PTS {}", pos, seg.pts);
                    decoder.handle(seg, warnings);
                    pos = data.len() - rest.len();
                }
                Err(_) if data.len() - pos < HEADER_LEN => {
                    warnings.warn(format!("ignoring trailing data at 0x{:x}", pos));
                    break;
                }
                Err(_) => match find_magic(data, pos + 1) {
                    Some(next) => {
                        warnings.warn(format!(
                            "bad segment at 0x{:x}, resuming at 0x{:x}",
                            pos, next
                        ));
                        pos = next;
                    }
                    None => {
                        warnings.warn(format!("ignoring trailing data at 0x{:x}", pos));
                        break;
                    }
                },
            }
        }

        let screen = decoder.screen.unwrap_or(Size { w: 1920, h: 1080 });
        let fps = decoder.frame_rate.and_then(bd_frame_rate);
        let pictures = decoder.finish(warnings);
        debug!("decoded {} Blu-ray SUP subtitles", pictures.len());
        Ok(SupBdStream {
            screen,
            fps,
            pictures,
        })
    }

    /// The screen size of the first composition.
    pub fn screen(&self) -> Size {
        self.screen
    }

    /// The frame rate of the first composition, if we recognized it.
    pub fn fps(&self) -> Option<f64> {
        self.fps
    }

    /// The number of subtitles.
    pub fn len(&self) -> usize {
        self.pictures.len()
    }

    /// Are there no subtitles?
    pub fn is_empty(&self) -> bool {
        self.pictures.is_empty()
    }

    /// Metadata for subtitle `i`.
    pub fn frame(&self, i: usize) -> &SubtitleFrame {
        &self.pictures[i].frame
    }

    /// The image, palette and metadata for subtitle `i`.
    pub fn decode(&self, i: usize) -> DecodedPicture {
        self.pictures[i].clone()
    }
}

/// Split encoded image data into object definition segments.
fn object_segments(pts: u32, width: u16, height: u16, rle: &[u8]) -> Result<Vec<Segment>> {
    let data_len = cast::u32(rle.len() + 4)?;
    if data_len > 0xff_ffff {
        return Err(Error::too_large(format!(
            "0x{:x} bytes of object data",
            rle.len()
        )));
    }
    // Fragment headers: id, version, flags, and on the first one the length
    // and size.
    let first_capacity = MAX_BODY_LEN - 11;
    let next_capacity = MAX_BODY_LEN - 4;
    let mut chunks = vec![&rle[..first_capacity.min(rle.len())]];
    let mut rest = &rle[chunks[0].len()..];
    while !rest.is_empty() {
        let (chunk, tail) = rest.split_at(next_capacity.min(rest.len()));
        chunks.push(chunk);
        rest = tail;
    }
    let last = chunks.len() - 1;
    Ok(chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| Segment {
            pts,
            dts: 0,
            body: SegmentBody::ObjectDefinition(ObjectDefinition {
                id: 0,
                version: 0,
                first: i == 0,
                last: i == last,
                data_len: if i == 0 { Some(data_len) } else { None },
                width: if i == 0 { width } else { 0 },
                height: if i == 0 { height } else { 0 },
                data: chunk.to_vec(),
            }),
        })
        .collect())
}

/// Writes a Blu-ray `*.sup` stream.
pub struct SupBdWriter<W: Write> {
    out: W,
    frame_rate: u8,
    composition_number: u16,
}

impl<W: Write> SupBdWriter<W> {
    /// Write segments to `out`, labelled with frame rate `fps`.
    pub fn new(out: W, fps: f64) -> SupBdWriter<W> {
        SupBdWriter {
            out,
            frame_rate: bd_frame_rate_code(fps),
            composition_number: 0,
        }
    }

    fn next_composition_number(&mut self) -> u16 {
        let n = self.composition_number;
        self.composition_number = self.composition_number.wrapping_add(1);
        n
    }

    /// Append one subtitle: a display set which shows it at its start time
    /// and one which clears it at its end time.
    pub fn write_picture(
        &mut self,
        frame: &SubtitleFrame,
        bitmap: &IndexedBitmap,
        palette: &Palette,
    ) -> Result<()> {
        bitmap.check_palette(palette)?;
        let coords = frame.coordinates();
        if coords.size() != bitmap.size() {
            return Err(Error::invalid_frame(format!(
                "bitmap is {}x{}, but frame is {}x{}",
                bitmap.width(),
                bitmap.height(),
                coords.width(),
                coords.height()
            )));
        }
        let screen = frame.screen();
        let (screen_w, screen_h) = (cast::u16(screen.w)?, cast::u16(screen.h)?);
        let start = cast::u32(frame.start())?;
        let end = cast::u32(frame.end())?;
        let window = WindowDefinition {
            id: 0,
            x: coords.left(),
            y: coords.top(),
            width: coords.width(),
            height: coords.height(),
        };

        let show = PresentationComposition {
            width: screen_w,
            height: screen_h,
            frame_rate: self.frame_rate,
            composition_number: self.next_composition_number(),
            composition_state: CompositionState::EpochStart,
            palette_update: false,
            palette_id: 0,
            objects: vec![CompositionObject {
                object_id: 0,
                window_id: 0,
                forced: frame.forced(),
                x: coords.left(),
                y: coords.top(),
                crop: None,
            }],
        };
        let entries = (0..palette.len())
            .map(|i| {
                let (y, cb, cr) = palette.ycbcr(i);
                Ok(PaletteEntry {
                    id: cast::u8(i)?,
                    y,
                    cr,
                    cb,
                    alpha: palette.alpha(i),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let rle = rle::encode(bitmap);

        let mut segments = vec![
            Segment {
                pts: start,
                dts: 0,
                body: SegmentBody::PresentationComposition(show),
            },
            Segment {
                pts: start,
                dts: 0,
                body: SegmentBody::WindowDefinition(vec![window]),
            },
            Segment {
                pts: start,
                dts: 0,
                body: SegmentBody::PaletteDefinition(PaletteDefinition {
                    id: 0,
                    version: 0,
                    entries,
                }),
            },
        ];
        segments.extend(object_segments(
            start,
            coords.width(),
            coords.height(),
            &rle,
        )?);
        segments.push(Segment {
            pts: start,
            dts: 0,
            body: SegmentBody::End,
        });

        let clear = PresentationComposition {
            width: screen_w,
            height: screen_h,
            frame_rate: self.frame_rate,
            composition_number: self.next_composition_number(),
            composition_state: CompositionState::Normal,
            palette_update: false,
            palette_id: 0,
            objects: vec![],
        };
        for body in [
            SegmentBody::PresentationComposition(clear),
            SegmentBody::WindowDefinition(vec![window]),
            SegmentBody::End,
        ] {
            segments.push(Segment {
                pts: end,
                dts: 0,
                body,
            });
        }

        let mut out = vec![];
        for seg in &segments {
            seg.write(&mut out)?;
        }
        self.out.write_all(&out)?;
        Ok(())
    }

    /// Flush and return the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::FPS_24P;

    fn palette() -> Palette {
        let mut entries = vec![[0, 0, 0, 0]];
        for i in 1..8u8 {
            entries.push([i * 30, 255 - i * 30, 128, 255]);
        }
        Palette::from_rgba(&entries, ColorSpace::Bt601).unwrap()
    }

    fn picture(start: i64, w: usize, h: usize) -> (SubtitleFrame, IndexedBitmap) {
        let data = (0..w * h).map(|i| ((i * 7 + i / w) % 8) as u8).collect();
        let bitmap = IndexedBitmap::from_raw(w, h, data).unwrap();
        let coords = Coordinates::from_ltwh(0, 800, w as u16, h as u16).unwrap();
        let frame =
            SubtitleFrame::new(Size { w: 1920, h: 1080 }, coords, start, start + 90_000).unwrap();
        (frame, bitmap)
    }

    fn check_round_trip(pictures: &[(SubtitleFrame, IndexedBitmap)]) -> Vec<u8> {
        let palette = palette();
        let mut writer = SupBdWriter::new(vec![], FPS_24P);
        for (frame, bitmap) in pictures {
            writer.write_picture(frame, bitmap, &palette).unwrap();
        }
        let data = writer.finish().unwrap();

        let mut warnings = Warnings::new();
        let stream = SupBdStream::from_bytes(&data, ColorSpace::Bt601, &mut warnings).unwrap();
        assert!(warnings.is_empty(), "{:?}", warnings.messages());
        assert_eq!(stream.screen(), Size { w: 1920, h: 1080 });
        assert_eq!(stream.fps(), Some(FPS_24P));
        assert_eq!(stream.len(), pictures.len());
        for (i, (frame, bitmap)) in pictures.iter().enumerate() {
            let decoded = stream.decode(i);
            assert_eq!(&decoded.frame, frame);
            assert_eq!(&decoded.bitmap, bitmap);
            for c in 0..palette.len() {
                assert_eq!(decoded.palette.ycbcr(c), palette.ycbcr(c));
                assert_eq!(decoded.palette.alpha(c), palette.alpha(c));
            }
        }
        data
    }

    #[test]
    fn write_then_read() {
        let (frame, bitmap) = picture(90_000, 300, 40);
        let data = check_round_trip(&[(frame.with_forced(true), bitmap), picture(360_000, 20, 10)]);
        assert_eq!(&data[..2], PGS_MAGIC);
    }

    #[test]
    fn large_objects_are_fragmented() {
        let data = check_round_trip(&[picture(90_000, 1920, 200)]);
        let mut rest = &data[..];
        let mut objects = 0;
        while !rest.is_empty() {
            let (tail, seg) = segment(rest).unwrap();
            if let SegmentBody::ObjectDefinition(_) = seg.body {
                objects += 1;
            }
            rest = tail;
        }
        assert!(objects > 1);
    }

    #[test]
    fn bad_magic() {
        let mut warnings = Warnings::new();
        match SupBdStream::from_bytes(b"SP\0\0", ColorSpace::Bt601, &mut warnings) {
            Err(Error::BadMagic { .. }) => {}
            other => panic!("unexpected result: {:?}", other.map(|s| s.len())),
        }
    }

    #[test]
    fn resyncs_after_garbage() {
        let palette = palette();
        let mut writer = SupBdWriter::new(vec![], FPS_24P);
        let (frame, bitmap) = picture(90_000, 30, 10);
        writer.write_picture(&frame, &bitmap, &palette).unwrap();
        let mut data = writer.finish().unwrap();
        data.extend_from_slice(b"garbage");
        let mut writer = SupBdWriter::new(data, FPS_24P);
        let (frame, bitmap) = picture(360_000, 30, 10);
        writer.write_picture(&frame, &bitmap, &palette).unwrap();
        let data = writer.finish().unwrap();

        let mut warnings = Warnings::new();
        let stream = SupBdStream::from_bytes(&data, ColorSpace::Bt601, &mut warnings).unwrap();
        assert_eq!(warnings.count(), 1);
        assert_eq!(stream.len(), 2);
        assert_eq!(stream.frame(1).start(), 360_000);
    }

    #[test]
    fn unterminated_subtitles_get_default_length() {
        let palette = palette();
        let mut writer = SupBdWriter::new(vec![], FPS_24P);
        let (frame, bitmap) = picture(90_000, 30, 10);
        writer.write_picture(&frame, &bitmap, &palette).unwrap();
        let data = writer.finish().unwrap();

        // Drop the clearing display set: PCS, WDS and END.
        let clear_len = (HEADER_LEN + 11) + (HEADER_LEN + 10) + HEADER_LEN;
        let data = &data[..data.len() - clear_len];
        let mut warnings = Warnings::new();
        let stream = SupBdStream::from_bytes(data, ColorSpace::Bt601, &mut warnings).unwrap();
        assert_eq!(stream.len(), 1);
        assert_eq!(stream.frame(0).end(), 90_000 + DEFAULT_SUBTITLE_LENGTH);
    }
}
