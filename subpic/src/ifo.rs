//! Read the bits of a DVD `VTS_xx_0.IFO` file that describe subtitles,
//! and write minimal IFO files to accompany DVD `*.sup` streams.

use image::Rgb;
use std::fs;
use std::path::Path;

use crate::bitmap::Size;
use crate::errors::{Error, Result};
use crate::palette::{rgb_to_ycbcr, ycbcr_to_rgb, ColorSpace, DvdPalette};

/// Every video title set IFO starts with this.
pub const IFO_MAGIC: &[u8; 12] = b"DVDVIDEO-VTS";

const SECTOR_SIZE: usize = 0x800;
const LAST_IFO_SECTOR: usize = 0x1c;
const PGCI_SECTOR: usize = 0xcc;
const VIDEO_ATTRIBUTES: usize = 0x200;
const SUBPICTURE_STREAM_COUNT: usize = 0x254;
const FIRST_SUBPICTURE_LANGUAGE: usize = 0x258;
const PGC_OFFSET_IN_PGCI: usize = 0x0c;
const PALETTE_OFFSET_IN_PGC: usize = 0xa4;

/// Subtitle information from an IFO file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfoInfo {
    /// 720x480 for NTSC, 720x576 for PAL.
    pub screen: Size,
    /// The subtitle palette of the first program chain.
    pub palette: DvdPalette,
    /// The number of subtitle streams.
    pub stream_count: u16,
    /// The language code of the first subtitle stream, if any.
    pub language: Option<String>,
}

fn be_u16_at(data: &[u8], offset: usize) -> Result<u16> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(Error::IncompleteInput)
}

fn be_u32_at(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(Error::IncompleteInput)
}

/// Parse an IFO file.
pub fn parse(data: &[u8]) -> Result<IfoInfo> {
    if !data.starts_with(IFO_MAGIC) {
        return Err(Error::BadMagic { what: "IFO file" });
    }

    let attributes = *data.get(VIDEO_ATTRIBUTES).ok_or(Error::IncompleteInput)?;
    let screen = match (attributes >> 4) & 0x03 {
        1 => Size { w: 720, h: 576 },
        _ => Size { w: 720, h: 480 },
    };

    let stream_count = be_u16_at(data, SUBPICTURE_STREAM_COUNT)?;
    let language = if stream_count > 0 {
        data.get(FIRST_SUBPICTURE_LANGUAGE..FIRST_SUBPICTURE_LANGUAGE + 2)
            .filter(|code| code.iter().all(|c| c.is_ascii_alphabetic()))
            .map(|code| String::from_utf8_lossy(code).into_owned())
    } else {
        None
    };

    let pgci = cast::usize(be_u32_at(data, PGCI_SECTOR)?) * SECTOR_SIZE;
    let pgc = pgci + cast::usize(be_u32_at(data, pgci + PGC_OFFSET_IN_PGCI)?);
    let palette_offset = pgc + PALETTE_OFFSET_IN_PGC;
    let raw = data
        .get(palette_offset..palette_offset + 64)
        .ok_or(Error::IncompleteInput)?;
    let mut palette = [Rgb([0, 0, 0]); 16];
    for (entry, chunk) in palette.iter_mut().zip(raw.chunks(4)) {
        let (y, cr, cb) = (chunk[1], chunk[2], chunk[3]);
        let (r, g, b) = ycbcr_to_rgb(y, cb, cr, ColorSpace::Bt601);
        *entry = Rgb([r, g, b]);
    }
    debug!(
        "IFO: {}x{}, {} subtitle streams, language {:?}",
        screen.w, screen.h, stream_count, language
    );

    Ok(IfoInfo {
        screen,
        palette,
        stream_count,
        language,
    })
}

/// Read and parse an IFO file.
pub fn read<P: AsRef<Path>>(path: P) -> Result<IfoInfo> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|source| Error::ReadFile {
        path: path.to_owned(),
        source,
    })?;
    parse(&data)
}

/// Build a minimal three-sector IFO holding a single subtitle stream.
pub fn build(screen: Size, palette: &DvdPalette, language: &str) -> Vec<u8> {
    let mut out = vec![0u8; 3 * SECTOR_SIZE];
    out[..IFO_MAGIC.len()].copy_from_slice(IFO_MAGIC);
    out[LAST_IFO_SECTOR..LAST_IFO_SECTOR + 4].copy_from_slice(&2u32.to_be_bytes());
    out[PGCI_SECTOR..PGCI_SECTOR + 4].copy_from_slice(&1u32.to_be_bytes());

    // MPEG-2, with NTSC or PAL in bits 4 and 5.
    let standard = if screen.h == 576 { 1 } else { 0 };
    out[VIDEO_ATTRIBUTES] = 0x40 | standard << 4;

    out[SUBPICTURE_STREAM_COUNT..SUBPICTURE_STREAM_COUNT + 2].copy_from_slice(&1u16.to_be_bytes());
    // Language type 1 means a language code follows.
    out[FIRST_SUBPICTURE_LANGUAGE - 2] = 0x01;
    for (dst, src) in out[FIRST_SUBPICTURE_LANGUAGE..FIRST_SUBPICTURE_LANGUAGE + 2]
        .iter_mut()
        .zip(language.bytes().chain(std::iter::repeat(b' ')))
    {
        *dst = src;
    }

    // One program chain, right after the PGCI header and search pointer.
    let pgci = SECTOR_SIZE;
    let pgc_offset = 0x10;
    out[pgci..pgci + 2].copy_from_slice(&1u16.to_be_bytes());
    let pgci_end = (2 * SECTOR_SIZE - pgci - 1) as u32;
    out[pgci + 4..pgci + 8].copy_from_slice(&pgci_end.to_be_bytes());
    out[pgci + PGC_OFFSET_IN_PGCI..pgci + PGC_OFFSET_IN_PGCI + 4]
        .copy_from_slice(&(pgc_offset as u32).to_be_bytes());

    let palette_offset = pgci + pgc_offset + PALETTE_OFFSET_IN_PGC;
    for (i, rgb) in palette.iter().enumerate() {
        let (y, cb, cr) = rgb_to_ycbcr(rgb[0], rgb[1], rgb[2], ColorSpace::Bt601);
        let at = palette_offset + 4 * i;
        out[at..at + 4].copy_from_slice(&[0, y, cr, cb]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::default_dvd_palette;

    #[test]
    fn build_then_parse() {
        let palette = default_dvd_palette();
        let data = build(Size { w: 720, h: 576 }, &palette, "de");
        assert_eq!(data.len(), 0x1800);
        let info = parse(&data).unwrap();
        assert_eq!(info.screen, Size { w: 720, h: 576 });
        assert_eq!(info.stream_count, 1);
        assert_eq!(info.language.as_deref(), Some("de"));
        for (got, want) in info.palette.iter().zip(palette.iter()) {
            for c in 0..3 {
                let diff = (i32::from(got[c]) - i32::from(want[c])).abs();
                assert!(diff <= 2, "{:?} vs {:?}", got, want);
            }
        }

        let ntsc = parse(&build(Size { w: 720, h: 480 }, &palette, "en")).unwrap();
        assert_eq!(ntsc.screen, Size { w: 720, h: 480 });
    }

    #[test]
    fn rejects_other_files() {
        match parse(b"DVDVIDEO-VMG\0\0\0\0") {
            Err(Error::BadMagic { .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        let mut truncated = build(Size { w: 720, h: 480 }, &default_dvd_palette(), "en");
        truncated.truncate(0x880);
        assert!(parse(&truncated).is_err());
    }
}
