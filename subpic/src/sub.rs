//! # VobSub `*.sub` streams
//!
//! A `*.sub` file is an MPEG-2 Program Stream made of 2048-byte packs, each
//! carrying a fragment of a sub-picture unit.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::bitmap::{IndexedBitmap, Size};
use crate::errors::{Error, Result, Warnings};
use crate::frame::{DecodedPicture, SubtitleFrame};
use crate::idx::{Index, IndexEntry};
use crate::mpeg2::{pes, ps};
use crate::palette::DvdPalette;
use crate::spu;

/// The first substream ID used for DVD subtitles.
const SUBSTREAM_BASE: u8 = 0x20;

/// SPU bytes which fit in the first pack of a subtitle.
const FIRST_PACK_CAPACITY: usize = ps::PACK_SIZE - ps::PACK_HEADER.len() - 15;

/// SPU bytes which fit in each later pack.
const NEXT_PACK_CAPACITY: usize = ps::PACK_SIZE - ps::PACK_HEADER.len() - 10;

/// One complete sub-picture unit pulled out of a `*.sub` stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSpu {
    /// The byte offset of the pack where this SPU starts.
    pub offset: usize,
    /// The presentation timestamp of the first pack.
    pub pts: i64,
    /// The PES substream this SPU was found in.
    pub substream_id: u8,
    /// The reassembled SPU.
    pub data: Vec<u8>,
}

/// An SPU we're still collecting fragments for.
struct PartialSpu {
    spu: RawSpu,
    wanted: usize,
}

/// Reassemble the SPUs in a `*.sub` stream.  If `substream_id` is given,
/// other substreams are ignored.  Damage is reported via `warnings`.
pub fn demux(input: &[u8], substream_id: Option<u8>, warnings: &mut Warnings) -> Vec<RawSpu> {
    let mut result = vec![];
    let mut current: Option<PartialSpu> = None;

    for packet in ps::pes_packets(input) {
        let packet = match packet {
            Ok(packet) => packet,
            Err(skipped) => {
                warnings.warn(skipped.to_string());
                continue;
            }
        };
        let pes = &packet.pes_packet;
        if substream_id.map_or(false, |id| id != pes.substream_id) {
            debug!(
                "skipping substream 0x{:x} at 0x{:x}",
                pes.substream_id, packet.offset
            );
            continue;
        }

        if let Some(pts_dts) = pes.header_data.pts_dts {
            if let Some(partial) = current.take() {
                warnings.warn(format!(
                    "discarding incomplete SPU at 0x{:x}: got 0x{:x} of 0x{:x} bytes",
                    partial.spu.offset,
                    partial.spu.data.len(),
                    partial.wanted
                ));
            }
            if pes.data.len() < 2 {
                warnings.warn(format!("SPU packet at 0x{:x} is too short", packet.offset));
                continue;
            }
            let wanted = usize::from(pes.data[0]) << 8 | usize::from(pes.data[1]);
            current = Some(PartialSpu {
                spu: RawSpu {
                    offset: packet.offset,
                    pts: pts_dts.pts.ticks(),
                    substream_id: pes.substream_id,
                    data: pes.data.to_owned(),
                },
                wanted,
            });
        } else {
            match current.as_mut() {
                Some(partial) if partial.spu.substream_id == pes.substream_id => {
                    partial.spu.data.extend_from_slice(pes.data);
                }
                Some(partial) => {
                    warnings.warn(format!(
                        "found data for substream 0x{:x} while looking for 0x{:x}",
                        pes.substream_id, partial.spu.substream_id
                    ));
                    continue;
                }
                None => {
                    warnings.warn(format!(
                        "continuation packet at 0x{:x} has no SPU to continue",
                        packet.offset
                    ));
                    continue;
                }
            }
        }

        if current.as_ref().map_or(false, |p| p.spu.data.len() >= p.wanted) {
            if let Some(mut partial) = current.take() {
                if partial.spu.data.len() > partial.wanted {
                    warnings.warn(format!(
                        "found 0x{:x} bytes of data in SPU at 0x{:x}, wanted 0x{:x}",
                        partial.spu.data.len(),
                        partial.spu.offset,
                        partial.wanted
                    ));
                    partial.spu.data.truncate(partial.wanted);
                }
                trace!("reassembled SPU at 0x{:x}", partial.spu.offset);
                result.push(partial.spu);
            }
        }
    }

    if let Some(partial) = current {
        warnings.warn(format!(
            "stream ended inside SPU at 0x{:x}",
            partial.spu.offset
        ));
    }
    result
}

/// A VobSub subtitle stream: an `*.idx` file and its `*.sub` data.
#[derive(Debug, Clone)]
pub struct VobSubStream {
    index: Index,
    pictures: Vec<(SubtitleFrame, IndexedBitmap)>,
}

impl VobSubStream {
    /// Open an `*.idx` file and the associated `*.sub` file.
    pub fn open<P: AsRef<Path>>(path: P, warnings: &mut Warnings) -> Result<VobSubStream> {
        let path = path.as_ref();
        let index = Index::open(path)?;
        let sub_path = path.with_extension("sub");
        let sub_data = fs::read(&sub_path).map_err(|source| Error::ReadFile {
            path: sub_path.clone(),
            source,
        })?;
        VobSubStream::from_parts(index, &sub_data, warnings)
    }

    /// Decode a `*.sub` stream described by `index`.
    pub fn from_parts(
        index: Index,
        sub_data: &[u8],
        warnings: &mut Warnings,
    ) -> Result<VobSubStream> {
        let substream_id = SUBSTREAM_BASE + index.stream_index();
        let timestamps = index
            .entries()
            .iter()
            .map(|e| (e.filepos, e.timestamp))
            .collect::<HashMap<_, _>>();

        // Timestamps in the index take priority over those in the stream.
        let mut parsed = vec![];
        for raw in demux(sub_data, Some(substream_id), warnings) {
            let spu = match spu::parse(&raw.data, warnings) {
                Ok(spu) => spu,
                Err(err) => {
                    warnings.warn(format!("skipping SPU at 0x{:x}: {}", raw.offset, err));
                    continue;
                }
            };
            let base = timestamps
                .get(&(raw.offset as u64))
                .copied()
                .unwrap_or(raw.pts);
            parsed.push((base, spu));
        }

        let pictures = spu::into_pictures(index.size(), parsed, warnings);
        debug!("decoded {} VobSub subtitles", pictures.len());

        Ok(VobSubStream { index, pictures })
    }

    /// The parsed `*.idx` file.
    pub fn index(&self) -> &Index {
        &self.index
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
        &self.pictures[i].0
    }

    /// The image, palette and metadata for subtitle `i`.
    pub fn decode(&self, i: usize) -> DecodedPicture {
        let (frame, bitmap) = &self.pictures[i];
        let colors = frame.dvd_colors().copied().unwrap_or_default();
        DecodedPicture {
            frame: frame.clone(),
            bitmap: bitmap.clone(),
            palette: colors.to_palette(self.index.palette()),
        }
    }
}

/// Writes a `*.sub` stream, building the matching `*.idx` as it goes.
pub struct VobSubWriter<W: Write> {
    out: W,
    index: Index,
    pos: u64,
    substream_id: u8,
}

impl<W: Write> VobSubWriter<W> {
    /// Write subtitles for a screen of `size`, using `palette`.
    pub fn new(out: W, size: Size, palette: DvdPalette) -> VobSubWriter<W> {
        VobSubWriter {
            out,
            index: Index::new(size, palette),
            pos: 0,
            substream_id: SUBSTREAM_BASE,
        }
    }

    /// Set the language written to the `*.idx` file.
    pub fn set_language<S: Into<String>>(&mut self, language: S) {
        self.index.set_language(language);
    }

    /// Append one subtitle.  The bitmap may only use pixel values 0 to 3.
    pub fn write_picture(&mut self, frame: &SubtitleFrame, bitmap: &IndexedBitmap) -> Result<()> {
        let data = spu::build(frame, bitmap)?;
        let packs = pack_spu(&data, frame.start(), self.substream_id);
        self.out.write_all(&packs)?;
        self.index.push_entry(IndexEntry {
            timestamp: frame.start(),
            filepos: self.pos,
        });
        self.pos += packs.len() as u64;
        Ok(())
    }

    /// Flush the stream, and return it along with the finished index.
    pub fn finish(mut self) -> Result<(W, Index)> {
        self.out.flush()?;
        Ok((self.out, self.index))
    }
}

/// Split an SPU across as many 2048-byte packs as it needs.
pub fn pack_spu(data: &[u8], pts: i64, substream_id: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(ps::PACK_SIZE * (data.len() / NEXT_PACK_CAPACITY + 1));
    let mut remaining = data;
    let mut first = true;
    while first || !remaining.is_empty() {
        let capacity = if first {
            FIRST_PACK_CAPACITY
        } else {
            NEXT_PACK_CAPACITY
        };
        let n = remaining.len().min(capacity);
        let (chunk, rest) = remaining.split_at(n);
        let slack = capacity - n;
        // Small gaps are filled with header stuffing, and larger ones with a
        // padding packet.
        let (stuffing, padding) = if slack >= 6 { (0, slack) } else { (slack, 0) };

        let pack_start = out.len();
        out.extend_from_slice(&ps::PACK_HEADER);
        let pts = if first { Some(pts) } else { None };
        pes::write_packet(&mut out, pts, substream_id, stuffing, chunk);
        if padding > 0 {
            pes::write_padding(&mut out, padding);
        }
        debug_assert_eq!(out.len() - pack_start, ps::PACK_SIZE);

        remaining = rest;
        first = false;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Coordinates, DvdColors};
    use crate::palette::default_dvd_palette;

    fn picture(w: usize, h: usize, start: i64, end: i64) -> (SubtitleFrame, IndexedBitmap) {
        let data = (0..w * h).map(|i| ((i / 3 + i / w) % 4) as u8).collect();
        let bitmap = IndexedBitmap::from_raw(w, h, data).unwrap();
        let coords = Coordinates::from_ltwh(20, 300, w as u16, h as u16).unwrap();
        let frame = SubtitleFrame::new(Size { w: 720, h: 480 }, coords, start, end)
            .unwrap()
            .with_dvd_colors(DvdColors::default());
        (frame, bitmap)
    }

    #[test]
    fn pack_sizes() {
        for &len in &[10, 2013, 2014, 2019, 2020, 2019 + 2024, 5000] {
            let data = vec![0x42; len];
            let packs = pack_spu(&data, 9000, 0x20);
            assert_eq!(packs.len() % ps::PACK_SIZE, 0, "len {}", len);
            let mut warnings = Warnings::new();
            // Fake up an SPU size so `demux` knows when to stop.
            let mut data = data;
            data[0] = (len >> 8) as u8;
            data[1] = len as u8;
            let packs = pack_spu(&data, 9000, 0x20);
            let spus = demux(&packs, None, &mut warnings);
            assert!(warnings.is_empty(), "len {}: {:?}", len, warnings);
            assert_eq!(spus.len(), 1);
            assert_eq!(spus[0].data, data);
            assert_eq!(spus[0].pts, 9000);
        }
    }

    #[test]
    fn write_then_read() {
        let mut writer = VobSubWriter::new(vec![], Size { w: 720, h: 480 }, default_dvd_palette());
        let pictures = vec![
            picture(64, 10, 90_000, 90_000 + 100 * 1024),
            // Big enough to need several packs.
            picture(400, 60, 540_000, 540_000 + 200 * 1024),
        ];
        for (frame, bitmap) in &pictures {
            writer.write_picture(frame, bitmap).unwrap();
        }
        let (sub, index) = writer.finish().unwrap();
        assert!(sub.len() >= 3 * ps::PACK_SIZE);

        let index = Index::parse(&index.to_idx_string()).unwrap();
        let mut warnings = Warnings::new();
        let stream = VobSubStream::from_parts(index, &sub, &mut warnings).unwrap();
        assert!(warnings.is_empty(), "{:?}", warnings);
        assert_eq!(stream.len(), 2);
        for (i, (frame, bitmap)) in pictures.iter().enumerate() {
            let decoded = stream.decode(i);
            assert_eq!(&decoded.frame, frame);
            assert_eq!(&decoded.bitmap, bitmap);
        }
    }

    #[test]
    fn damaged_packs_are_skipped() {
        let (frame, bitmap) = picture(32, 8, 45_000, 45_000 + 50 * 1024);
        let spu = spu::build(&frame, &bitmap).unwrap();
        let mut sub = vec![0xee; ps::PACK_SIZE];
        sub.extend(pack_spu(&spu, frame.start(), 0x20));
        let mut warnings = Warnings::new();
        let spus = demux(&sub, Some(0x20), &mut warnings);
        assert_eq!(warnings.count(), 1);
        assert_eq!(spus.len(), 1);
        assert_eq!(spus[0].offset, ps::PACK_SIZE);
        assert_eq!(spus[0].data, spu);
    }

    #[test]
    fn interrupted_spus_are_discarded() {
        let (frame, bitmap) = picture(400, 60, 45_000, 45_000 + 50 * 1024);
        let big = spu::build(&frame, &bitmap).unwrap();
        let (frame2, bitmap2) = picture(16, 4, 900_000, 900_000 + 50 * 1024);
        let small = spu::build(&frame2, &bitmap2).unwrap();
        // Keep only the first pack of the big SPU.
        let mut sub = pack_spu(&big, frame.start(), 0x20);
        sub.truncate(ps::PACK_SIZE);
        sub.extend(pack_spu(&small, frame2.start(), 0x20));
        let mut warnings = Warnings::new();
        let spus = demux(&sub, Some(0x20), &mut warnings);
        assert_eq!(warnings.count(), 1);
        assert_eq!(spus.len(), 1);
        assert_eq!(spus[0].data, small);
    }
}
