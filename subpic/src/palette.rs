//! Palettes with parallel RGB, alpha and YCbCr channels.
//!
//! The RGB and YCbCr representations of each entry are kept consistent by
//! recomputing one from the other on every write.  Luma is kept in the
//! "studio" range 16..=235 and chroma in 16..=240.

use image::Rgb;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::errors::{Error, Result};

/// The color matrix used to convert between RGB and YCbCr.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    /// ITU-R BT.601, used for standard definition material.
    #[default]
    Bt601,
    /// ITU-R BT.709, used for high definition material.
    Bt709,
}

/// Round to the nearest integer, with halves rounding up.
fn round_half_up(value: f64) -> i32 {
    (value + 0.5).floor() as i32
}

fn clamp_u8(value: i32, min: i32, max: i32) -> u8 {
    // `clamp` keeps us in range, so the cast cannot truncate.
    value.clamp(min, max) as u8
}

/// Convert a full-range RGB color to studio-range YCbCr.
pub fn rgb_to_ycbcr(r: u8, g: u8, b: u8, space: ColorSpace) -> (u8, u8, u8) {
    let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
    let (y, cb, cr) = match space {
        ColorSpace::Bt601 => (
            r * 0.299 * 219.0 / 255.0 + g * 0.587 * 219.0 / 255.0 + b * 0.114 * 219.0 / 255.0,
            -r * 0.168736 * 224.0 / 255.0 - g * 0.331264 * 224.0 / 255.0
                + b * 0.5 * 224.0 / 255.0,
            r * 0.5 * 224.0 / 255.0
                - g * 0.418688 * 224.0 / 255.0
                - b * 0.081312 * 224.0 / 255.0,
        ),
        ColorSpace::Bt709 => (
            r * 0.2126 * 219.0 / 255.0
                + g * 0.7152 * 219.0 / 255.0
                + b * 0.0722 * 219.0 / 255.0,
            -r * 0.2126 / 1.8556 * 224.0 / 255.0 - g * 0.7152 / 1.8556 * 224.0 / 255.0
                + b * 0.5 * 224.0 / 255.0,
            r * 0.5 * 224.0 / 255.0
                - g * 0.7152 / 1.5748 * 224.0 / 255.0
                - b * 0.0722 / 1.5748 * 224.0 / 255.0,
        ),
    };
    (
        clamp_u8(16 + round_half_up(y), 16, 235),
        clamp_u8(128 + round_half_up(cb), 16, 240),
        clamp_u8(128 + round_half_up(cr), 16, 240),
    )
}

/// Convert a studio-range YCbCr color to full-range RGB.
pub fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8, space: ColorSpace) -> (u8, u8, u8) {
    let y = f64::from(y) - 16.0;
    let cb = f64::from(cb) - 128.0;
    let cr = f64::from(cr) - 128.0;
    let y1 = y * 1.164383562;
    let (r, g, b) = match space {
        ColorSpace::Bt601 => (
            y1 + cr * 1.596026317,
            y1 - cr * 0.8129674985 - cb * 0.3917615979,
            y1 + cb * 2.017232218,
        ),
        ColorSpace::Bt709 => (
            y1 + cr * 1.792741071,
            y1 - cr * 0.5329093286 - cb * 0.2132486143,
            y1 + cb * 2.112401786,
        ),
    };
    (
        clamp_u8(round_half_up(r), 0, 255),
        clamp_u8(round_half_up(g), 0, 255),
        clamp_u8(round_half_up(b), 0, 255),
    )
}

/// A palette of up to 256 colors, stored as parallel channels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    space: ColorSpace,
    r: Vec<u8>,
    g: Vec<u8>,
    b: Vec<u8>,
    a: Vec<u8>,
    y: Vec<u8>,
    cb: Vec<u8>,
    cr: Vec<u8>,
}

impl Palette {
    /// Create a palette of `size` fully transparent black entries.
    pub fn new(size: usize, space: ColorSpace) -> Result<Palette> {
        if size == 0 || size > 256 {
            return Err(Error::invalid_palette(format!(
                "palettes must have 1 to 256 entries, not {}",
                size
            )));
        }
        Ok(Palette::transparent(size, space))
    }

    /// Like `new`, for sizes known to be in range.
    pub(crate) fn transparent(size: usize, space: ColorSpace) -> Palette {
        let (y, cb, cr) = rgb_to_ycbcr(0, 0, 0, space);
        Palette {
            space,
            r: vec![0; size],
            g: vec![0; size],
            b: vec![0; size],
            a: vec![0; size],
            y: vec![y; size],
            cb: vec![cb; size],
            cr: vec![cr; size],
        }
    }

    /// Build a palette from `[r, g, b, a]` entries.
    pub fn from_rgba(entries: &[[u8; 4]], space: ColorSpace) -> Result<Palette> {
        let mut palette = Palette::new(entries.len(), space)?;
        for (i, &[r, g, b, a]) in entries.iter().enumerate() {
            palette.set_rgb(i, r, g, b);
            palette.set_alpha(i, a);
        }
        Ok(palette)
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.r.len()
    }

    /// Palettes are never empty, but clippy likes this to exist.
    pub fn is_empty(&self) -> bool {
        self.r.is_empty()
    }

    /// The color matrix fixed when this palette was created.
    pub fn color_space(&self) -> ColorSpace {
        self.space
    }

    /// Set the RGB value of entry `index`, recomputing its YCbCr value.
    pub fn set_rgb(&mut self, index: usize, r: u8, g: u8, b: u8) {
        self.r[index] = r;
        self.g[index] = g;
        self.b[index] = b;
        let (y, cb, cr) = rgb_to_ycbcr(r, g, b, self.space);
        self.y[index] = y;
        self.cb[index] = cb;
        self.cr[index] = cr;
    }

    /// Set the YCbCr value of entry `index`, recomputing its RGB value.
    ///
    /// Out-of-range values are clamped to the studio range first, so that
    /// the two representations stay consistent.
    pub fn set_ycbcr(&mut self, index: usize, y: u8, cb: u8, cr: u8) {
        let y = y.clamp(16, 235);
        let cb = cb.clamp(16, 240);
        let cr = cr.clamp(16, 240);
        self.y[index] = y;
        self.cb[index] = cb;
        self.cr[index] = cr;
        let (r, g, b) = ycbcr_to_rgb(y, cb, cr, self.space);
        self.r[index] = r;
        self.g[index] = g;
        self.b[index] = b;
    }

    /// Set the alpha value of entry `index`.
    pub fn set_alpha(&mut self, index: usize, a: u8) {
        self.a[index] = a;
    }

    /// Set entry `index` from a packed `0xAARRGGBB` value.
    pub fn set_argb(&mut self, index: usize, argb: u32) {
        let [a, r, g, b] = argb.to_be_bytes();
        self.set_rgb(index, r, g, b);
        self.set_alpha(index, a);
    }

    /// The RGB value of entry `index`.
    pub fn rgb(&self, index: usize) -> (u8, u8, u8) {
        (self.r[index], self.g[index], self.b[index])
    }

    /// The YCbCr value of entry `index`.
    pub fn ycbcr(&self, index: usize) -> (u8, u8, u8) {
        (self.y[index], self.cb[index], self.cr[index])
    }

    /// The alpha value of entry `index`.
    pub fn alpha(&self, index: usize) -> u8 {
        self.a[index]
    }

    /// The luma (Y) value of entry `index`.
    pub fn luma(&self, index: usize) -> u8 {
        self.y[index]
    }

    /// Entry `index` packed as `0xAARRGGBB`.
    pub fn argb(&self, index: usize) -> u32 {
        u32::from_be_bytes([self.a[index], self.r[index], self.g[index], self.b[index]])
    }

    /// Entry `index` as an `[r, g, b, a]` array.
    pub fn rgba(&self, index: usize) -> [u8; 4] {
        [self.r[index], self.g[index], self.b[index], self.a[index]]
    }

    /// All alpha values.
    pub fn alphas(&self) -> &[u8] {
        &self.a
    }

    /// The index of the most transparent entry.  Ties go to the lowest
    /// index.
    pub fn transparent_index(&self) -> usize {
        let mut best = 0;
        let mut min_alpha = u8::MAX;
        for (i, &a) in self.a.iter().enumerate() {
            if a < min_alpha {
                min_alpha = a;
                best = i;
                if a == 0 {
                    break;
                }
            }
        }
        best
    }
}

/// The 16-color RGB palette used by DVD subtitles.
pub type DvdPalette = [Rgb<u8>; 16];

/// The palette most VobSub tools use when nothing else is specified.
pub fn default_dvd_palette() -> DvdPalette {
    const DEFAULT: [u32; 16] = [
        0x000000, 0xf0f0f0, 0xcccccc, 0x999999, 0x3333fa, 0x1111bb, 0xfa3333, 0xbb1111,
        0x33fa33, 0x11bb11, 0xfafa33, 0xbbbb11, 0xfa33fa, 0xbb11bb, 0x33fafa, 0x11bbbb,
    ];
    let mut palette = [Rgb([0, 0, 0]); 16];
    for (entry, rgb) in palette.iter_mut().zip(DEFAULT.iter()) {
        let [_, r, g, b] = rgb.to_be_bytes();
        *entry = Rgb([r, g, b]);
    }
    palette
}

/// Write a palette in the `Color N=R, G, B` text format.
pub fn write_palette_text(palette: &Palette) -> String {
    let mut out = String::new();
    for i in 0..palette.len() {
        let (r, g, b) = palette.rgb(i);
        // Writing to a `String` cannot fail.
        let _ = writeln!(out, "Color {}={}, {}, {}", i, r, g, b);
    }
    out
}

/// Read a DVD palette in the `Color N=R, G, B` text format.  Entries which
/// aren't mentioned keep their default values.
pub fn parse_palette_text(text: &str) -> Result<DvdPalette> {
    lazy_static! {
        static ref COLOR_LINE: regex::Regex =
            regex::Regex::new(r"^Color\s*(\d+)\s*=\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*$").unwrap();
    }

    let mut palette = default_dvd_palette();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
            continue;
        }
        let cap = COLOR_LINE
            .captures(line)
            .ok_or_else(|| Error::invalid_palette(format!("cannot parse {:?}", line)))?;
        let mut values = [0u32; 4];
        for (value, group) in values.iter_mut().zip(1usize..5) {
            *value = cap[group]
                .parse()
                .map_err(|_| Error::invalid_palette(format!("bad number in {:?}", line)))?;
        }
        let index = cast::usize(values[0]);
        if index >= palette.len() {
            return Err(Error::invalid_palette(format!(
                "color index {} is out of range",
                index
            )));
        }
        palette[index] = Rgb([cast::u8(values[1])?, cast::u8(values[2])?, cast::u8(values[3])?]);
    }
    Ok(palette)
}

/// Expand a `DvdPalette` into an opaque `Palette`.
pub fn dvd_palette_to_palette(dvd: &DvdPalette) -> Palette {
    let mut palette = Palette {
        space: ColorSpace::Bt601,
        r: vec![0; 16],
        g: vec![0; 16],
        b: vec![0; 16],
        a: vec![0xff; 16],
        y: vec![16; 16],
        cb: vec![128; 16],
        cr: vec![128; 16],
    };
    for (i, rgb) in dvd.iter().enumerate() {
        palette.set_rgb(i, rgb[0], rgb[1], rgb[2]);
    }
    palette
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ycbcr_round_trip_is_close() {
        for &space in &[ColorSpace::Bt601, ColorSpace::Bt709] {
            for r in (0..=255u8).step_by(5) {
                for g in (0..=255u8).step_by(3) {
                    for b in (0..=255u8).step_by(7) {
                        let (y, cb, cr) = rgb_to_ycbcr(r, g, b, space);
                        assert!((16..=235).contains(&y));
                        assert!((16..=240).contains(&cb));
                        assert!((16..=240).contains(&cr));
                        let (r2, g2, b2) = ycbcr_to_rgb(y, cb, cr, space);
                        for &(want, got) in &[(r, r2), (g, g2), (b, b2)] {
                            assert!(
                                (i32::from(want) - i32::from(got)).abs() <= 2,
                                "{:?} {:?} -> {:?}",
                                space,
                                (r, g, b),
                                (r2, g2, b2)
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn known_conversions() {
        assert_eq!(rgb_to_ycbcr(0, 0, 0, ColorSpace::Bt601), (16, 128, 128));
        assert_eq!(rgb_to_ycbcr(255, 255, 255, ColorSpace::Bt601), (235, 128, 128));
        assert_eq!(rgb_to_ycbcr(255, 255, 255, ColorSpace::Bt709), (235, 128, 128));
        assert_eq!(ycbcr_to_rgb(16, 128, 128, ColorSpace::Bt709), (0, 0, 0));
        assert_eq!(ycbcr_to_rgb(235, 128, 128, ColorSpace::Bt601), (255, 255, 255));
    }

    #[test]
    fn writes_keep_representations_in_sync() {
        let mut palette = Palette::new(4, ColorSpace::Bt601).unwrap();
        palette.set_rgb(1, 255, 255, 255);
        assert_eq!(palette.ycbcr(1), (235, 128, 128));
        palette.set_ycbcr(2, 16, 128, 128);
        assert_eq!(palette.rgb(2), (0, 0, 0));
        // Out of range luma is clamped before conversion.
        palette.set_ycbcr(3, 255, 128, 128);
        assert_eq!(palette.ycbcr(3), (235, 128, 128));
        assert_eq!(palette.rgb(3), (255, 255, 255));
        palette.set_argb(0, 0x80ff0000);
        assert_eq!(palette.alpha(0), 0x80);
        assert_eq!(palette.argb(0), 0x80ff0000);
    }

    #[test]
    fn transparent_index_prefers_lowest_minimum() {
        let palette = Palette::from_rgba(
            &[[0, 0, 0, 200], [0, 0, 0, 10], [0, 0, 0, 10], [0, 0, 0, 255]],
            ColorSpace::Bt601,
        )
        .unwrap();
        assert_eq!(palette.transparent_index(), 1);

        let palette = Palette::from_rgba(
            &[[0, 0, 0, 5], [0, 0, 0, 0], [0, 0, 0, 0]],
            ColorSpace::Bt601,
        )
        .unwrap();
        assert_eq!(palette.transparent_index(), 1);
    }

    #[test]
    fn palette_size_is_checked() {
        assert!(Palette::new(0, ColorSpace::Bt601).is_err());
        assert!(Palette::new(257, ColorSpace::Bt601).is_err());
        assert_eq!(Palette::new(256, ColorSpace::Bt709).unwrap().len(), 256);
    }

    #[test]
    fn palette_text_round_trip() {
        let dvd = default_dvd_palette();
        let text = write_palette_text(&dvd_palette_to_palette(&dvd));
        assert!(text.starts_with("Color 0=0, 0, 0\nColor 1=240, 240, 240\n"));
        assert_eq!(parse_palette_text(&text).unwrap(), dvd);
    }

    #[test]
    fn palette_text_rejects_garbage() {
        assert!(parse_palette_text("Color 0=1, 2").is_err());
        assert!(parse_palette_text("Color 16=1, 2, 3").is_err());
        assert!(parse_palette_text("Color 1=1, 2, 300").is_err());
        let partial = parse_palette_text("Color 3=1, 2, 3\n").unwrap();
        assert_eq!(partial[3], Rgb([1, 2, 3]));
        assert_eq!(partial[0], Rgb([0, 0, 0]));
    }
}
