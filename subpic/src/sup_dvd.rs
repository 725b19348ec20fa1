//! DVD `*.sup` streams: sub-picture units with a small timestamp header,
//! usually accompanied by an IFO file holding the palette.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::bitmap::{IndexedBitmap, Size};
use crate::errors::{Error, Result, Warnings};
use crate::frame::{DecodedPicture, SubtitleFrame};
use crate::ifo;
use crate::palette::{default_dvd_palette, DvdPalette};
use crate::spu;

/// Each frame starts with these bytes.
pub const SUP_DVD_MAGIC: &[u8; 2] = b"SP";

/// Magic, a 32-bit PTS and 4 unused bytes.
const FRAME_HEADER_LEN: usize = 10;

/// Find the next frame header at or after `from`.
fn find_magic(data: &[u8], from: usize) -> Option<usize> {
    data.get(from..)?
        .windows(SUP_DVD_MAGIC.len())
        .position(|w| w == SUP_DVD_MAGIC)
        .map(|p| p + from)
}

/// A DVD `*.sup` subtitle stream.
#[derive(Debug, Clone)]
pub struct SupDvdStream {
    screen: Size,
    palette: DvdPalette,
    language: Option<String>,
    pictures: Vec<(SubtitleFrame, IndexedBitmap)>,
}

impl SupDvdStream {
    /// Open a `*.sup` file, taking the screen size and palette from the IFO
    /// file next to it if there is one.
    pub fn open<P: AsRef<Path>>(path: P, warnings: &mut Warnings) -> Result<SupDvdStream> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| Error::ReadFile {
            path: path.to_owned(),
            source,
        })?;
        let ifo_path = path.with_extension("ifo");
        let (screen, palette, language) = if ifo_path.exists() {
            let info = ifo::read(&ifo_path)?;
            (info.screen, info.palette, info.language)
        } else {
            warnings.warn(format!(
                "no IFO file for {}, using the default palette",
                path.display()
            ));
            (Size { w: 720, h: 576 }, default_dvd_palette(), None)
        };
        let mut stream = SupDvdStream::from_bytes(&data, screen, palette, warnings)?;
        stream.language = language;
        Ok(stream)
    }

    /// Parse a `*.sup` stream for a screen of `screen` pixels.
    pub fn from_bytes(
        data: &[u8],
        screen: Size,
        palette: DvdPalette,
        warnings: &mut Warnings,
    ) -> Result<SupDvdStream> {
        let mut spus = vec![];
        let mut pos = 0;
        while pos < data.len() {
            if !data[pos..].starts_with(SUP_DVD_MAGIC) {
                if pos == 0 {
                    return Err(Error::BadMagic {
                        what: "DVD SUP frame",
                    });
                }
                match find_magic(data, pos + 1) {
                    Some(next) => {
                        warnings.warn(format!(
                            "bad DVD SUP frame at 0x{:x}, resuming at 0x{:x}",
                            pos, next
                        ));
                        pos = next;
                        continue;
                    }
                    None => {
                        warnings.warn(format!("ignoring trailing data at 0x{:x}", pos));
                        break;
                    }
                }
            }
            if pos + FRAME_HEADER_LEN + 2 > data.len() {
                warnings.warn(format!("truncated DVD SUP frame at 0x{:x}", pos));
                break;
            }
            let pts = &data[pos + 2..pos + 6];
            let pts = i64::from(u32::from_le_bytes([pts[0], pts[1], pts[2], pts[3]]));
            let spu_start = pos + FRAME_HEADER_LEN;
            let size = usize::from(data[spu_start]) << 8 | usize::from(data[spu_start + 1]);
            if size < 4 || spu_start + size > data.len() {
                warnings.warn(format!("bad SPU size 0x{:x} at 0x{:x}", size, pos));
                pos += SUP_DVD_MAGIC.len();
                continue;
            }
            match spu::parse(&data[spu_start..spu_start + size], warnings) {
                Ok(spu) => spus.push((pts, spu)),
                Err(err) => warnings.warn(format!("skipping SPU at 0x{:x}: {}", pos, err)),
            }
            pos = spu_start + size;
        }

        let pictures = spu::into_pictures(screen, spus, warnings);
        debug!("decoded {} DVD SUP subtitles", pictures.len());
        Ok(SupDvdStream {
            screen,
            palette,
            language: None,
            pictures,
        })
    }

    /// The screen size.
    pub fn screen(&self) -> Size {
        self.screen
    }

    /// The 16-color palette.
    pub fn palette(&self) -> &DvdPalette {
        &self.palette
    }

    /// The language from the IFO file, if we had one.
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
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
            palette: colors.to_palette(&self.palette),
        }
    }
}

/// Writes a DVD `*.sup` stream.
pub struct SupDvdWriter<W: Write> {
    out: W,
}

impl<W: Write> SupDvdWriter<W> {
    /// Write frames to `out`.
    pub fn new(out: W) -> SupDvdWriter<W> {
        SupDvdWriter { out }
    }

    /// Append one subtitle.  The bitmap may only use pixel values 0 to 3.
    pub fn write_picture(&mut self, frame: &SubtitleFrame, bitmap: &IndexedBitmap) -> Result<()> {
        let data = spu::build(frame, bitmap)?;
        let pts = cast::u32(frame.start())?;
        let mut header = [0u8; FRAME_HEADER_LEN];
        header[..2].copy_from_slice(SUP_DVD_MAGIC);
        header[2..6].copy_from_slice(&pts.to_le_bytes());
        self.out.write_all(&header)?;
        self.out.write_all(&data)?;
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
    use crate::frame::{Coordinates, DvdColors};

    fn picture(start: i64) -> (SubtitleFrame, IndexedBitmap) {
        let data = (0..50 * 12).map(|i| (i % 5 % 4) as u8).collect();
        let bitmap = IndexedBitmap::from_raw(50, 12, data).unwrap();
        let coords = Coordinates::from_ltwh(200, 500, 50, 12).unwrap();
        let frame = SubtitleFrame::new(Size { w: 720, h: 576 }, coords, start, start + 30 * 1024)
            .unwrap()
            .with_dvd_colors(DvdColors {
                palette: [0, 1, 6, 3],
                alpha: [0, 15, 15, 9],
            });
        (frame, bitmap)
    }

    #[test]
    fn write_then_read() {
        let pictures = vec![picture(9000), picture(180_000)];
        let mut writer = SupDvdWriter::new(vec![]);
        for (frame, bitmap) in &pictures {
            writer.write_picture(frame, bitmap).unwrap();
        }
        let data = writer.finish().unwrap();

        let mut warnings = Warnings::new();
        let stream = SupDvdStream::from_bytes(
            &data,
            Size { w: 720, h: 576 },
            default_dvd_palette(),
            &mut warnings,
        )
        .unwrap();
        assert!(warnings.is_empty());
        assert_eq!(stream.len(), 2);
        for (i, (frame, bitmap)) in pictures.iter().enumerate() {
            let decoded = stream.decode(i);
            assert_eq!(&decoded.frame, frame);
            assert_eq!(&decoded.bitmap, bitmap);
            assert_eq!(decoded.palette.len(), 4);
            assert_eq!(decoded.palette.alpha(3), 0x99);
        }
    }

    #[test]
    fn bad_magic() {
        let mut warnings = Warnings::new();
        let result = SupDvdStream::from_bytes(
            b"PG\0\0\0\0\0\0\0\0",
            Size { w: 720, h: 576 },
            default_dvd_palette(),
            &mut warnings,
        );
        match result {
            Err(Error::BadMagic { .. }) => {}
            other => panic!("unexpected result: {:?}", other.map(|s| s.len())),
        }
    }

    #[test]
    fn resyncs_after_garbage() {
        let (frame, bitmap) = picture(9000);
        let mut writer = SupDvdWriter::new(vec![]);
        writer.write_picture(&frame, &bitmap).unwrap();
        let one = writer.finish().unwrap();
        let mut data = one.clone();
        data.extend_from_slice(&[1, 2, 3, 4, 5]);
        data.extend_from_slice(&one);

        let mut warnings = Warnings::new();
        let stream = SupDvdStream::from_bytes(
            &data,
            Size { w: 720, h: 576 },
            default_dvd_palette(),
            &mut warnings,
        )
        .unwrap();
        assert_eq!(warnings.count(), 1);
        assert_eq!(stream.len(), 2);
    }
}
