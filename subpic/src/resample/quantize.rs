//! Turning full-color rasters back into palette indices.

use std::collections::HashMap;

use super::{Channels, Raster};
use crate::bitmap::IndexedBitmap;
use crate::errors::{Result, Warnings};
use crate::palette::{rgb_to_ycbcr, ColorSpace, Palette};

/// The most visible colors a requantized palette may hold.  Index 0 is
/// always reserved for transparency.
pub const MAX_QUANTIZED_COLORS: usize = 255;

/// 4x4 ordered dither matrix.
const BAYER: [[u8; 4]; 4] = [[0, 8, 2, 10], [12, 4, 14, 6], [3, 11, 1, 9], [15, 7, 13, 5]];

fn distance(a: &[u8; 4], b: &[u8; 4]) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = i32::from(x) - i32::from(y);
            (d * d) as u32
        })
        .sum()
}

/// Nearest-color search over `[a, r, g, b]` entries, memoized because
/// neighboring pixels usually repeat.
pub(crate) struct NearestColor<'a> {
    entries: &'a [[u8; 4]],
    last: Option<([u8; 4], u8)>,
    cache: HashMap<[u8; 4], u8>,
}

impl<'a> NearestColor<'a> {
    pub(crate) fn new(entries: &'a [[u8; 4]]) -> NearestColor<'a> {
        NearestColor {
            entries,
            last: None,
            cache: HashMap::new(),
        }
    }

    pub(crate) fn find(&mut self, color: [u8; 4]) -> u8 {
        if let Some((last_color, index)) = self.last {
            if last_color == color {
                return index;
            }
        }
        let entries = self.entries;
        let index = *self.cache.entry(color).or_insert_with(|| {
            let mut best = 0;
            let mut best_dist = u32::MAX;
            for (i, entry) in entries.iter().enumerate() {
                let dist = distance(&color, entry);
                if dist < best_dist {
                    best_dist = dist;
                    best = i;
                    if dist == 0 {
                        break;
                    }
                }
            }
            // Callers never pass more than 256 entries.
            best as u8
        });
        self.last = Some((color, index));
        index
    }
}

/// Match every pixel of an ARGB raster to its nearest entry in `palette`.
pub fn map_to_palette(raster: &Raster, palette: &Palette) -> IndexedBitmap {
    debug_assert_eq!(raster.channels, Channels::Argb);
    let entries = Channels::Argb.lookup(palette);
    let mut nearest = NearestColor::new(&entries);
    let data = raster.pixels.iter().map(|&px| nearest.find(px)).collect();
    bitmap_from_raster(raster, data)
}

fn bitmap_from_raster(raster: &Raster, data: Vec<u8>) -> IndexedBitmap {
    IndexedBitmap::from_raw(raster.width, raster.height, data)
        .unwrap_or_else(|_| IndexedBitmap::new(raster.width, raster.height, 0))
}

/// Pick a gray level for a pixel: 0 when it's less opaque than
/// `alpha_threshold`, otherwise 1 for the first (lightest) threshold its
/// luma exceeds, 2 for the next, and so on, with `thresholds.len() + 1`
/// for anything darker.
pub fn luma_index(alpha: u8, luma: u8, alpha_threshold: u8, thresholds: &[u8]) -> u8 {
    if alpha < alpha_threshold {
        return 0;
    }
    let bucket = thresholds
        .iter()
        .position(|&t| luma > t)
        .unwrap_or(thresholds.len());
    (bucket + 1) as u8
}

/// The palette produced by luma reduction: transparent, then `n - 1` opaque
/// grays from white to black.
pub fn luma_palette(n: usize, space: ColorSpace) -> Result<Palette> {
    let mut palette = Palette::new(n, space)?;
    let steps = n.saturating_sub(2).max(1);
    for i in 1..n {
        let v = 255 - (255 * (i - 1) + steps / 2) / steps;
        let v = v as u8;
        palette.set_rgb(i, v, v, v);
        palette.set_alpha(i, 0xff);
    }
    Ok(palette)
}

/// Luma-reduce an indexed bitmap without scaling it.
pub fn reduce_luma(
    bitmap: &IndexedBitmap,
    palette: &Palette,
    alpha_threshold: u8,
    thresholds: &[u8],
) -> IndexedBitmap {
    let table = (0..palette.len())
        .map(|i| luma_index(palette.alpha(i), palette.luma(i), alpha_threshold, thresholds))
        .collect::<Vec<_>>();
    let data = bitmap
        .pixels()
        .iter()
        .map(|&px| table[usize::from(px)])
        .collect();
    IndexedBitmap::from_raw(bitmap.width(), bitmap.height(), data)
        .unwrap_or_else(|_| IndexedBitmap::new(bitmap.width(), bitmap.height(), 0))
}

/// Luma-reduce a scaled raster.
pub fn reduce_luma_raster(
    raster: &Raster,
    space: ColorSpace,
    alpha_threshold: u8,
    thresholds: &[u8],
) -> IndexedBitmap {
    let data = raster
        .pixels
        .iter()
        .map(|&[a, c1, c2, c3]| {
            let luma = match raster.channels {
                Channels::Ayuv => c1,
                Channels::Argb => rgb_to_ycbcr(c1, c2, c3, space).0,
            };
            luma_index(a, luma, alpha_threshold, thresholds)
        })
        .collect();
    bitmap_from_raster(raster, data)
}

/// A set of colors with their pixel counts.
struct ColorBox {
    colors: Vec<([u8; 4], usize)>,
}

impl ColorBox {
    fn channel_range(&self, c: usize) -> u8 {
        let min = self.colors.iter().map(|(color, _)| color[c]).min().unwrap_or(0);
        let max = self.colors.iter().map(|(color, _)| color[c]).max().unwrap_or(0);
        max - min
    }

    fn widest_channel(&self) -> (usize, u8) {
        (0..4)
            .map(|c| (c, self.channel_range(c)))
            .max_by_key(|&(c, range)| (range, std::cmp::Reverse(c)))
            .unwrap_or((0, 0))
    }

    fn pixel_count(&self) -> usize {
        self.colors.iter().map(|&(_, n)| n).sum()
    }

    /// Split at the weighted median of the widest channel.
    fn split(mut self) -> (ColorBox, ColorBox) {
        let (channel, _) = self.widest_channel();
        self.colors.sort_by_key(|(color, _)| color[channel]);
        let half = self.pixel_count() / 2;
        let mut seen = 0;
        let mut mid = 1;
        for (i, &(_, n)) in self.colors.iter().enumerate() {
            seen += n;
            if seen >= half {
                mid = i + 1;
                break;
            }
        }
        let mid = mid.clamp(1, self.colors.len() - 1);
        let upper = self.colors.split_off(mid);
        (ColorBox { colors: self.colors }, ColorBox { colors: upper })
    }

    fn average(&self) -> [u8; 4] {
        let total = self.pixel_count().max(1) as u64;
        let mut sum = [0u64; 4];
        for (color, n) in &self.colors {
            for c in 0..4 {
                sum[c] += u64::from(color[c]) * *n as u64;
            }
        }
        let mut avg = [0u8; 4];
        for (value, s) in avg.iter_mut().zip(sum.iter()) {
            *value = ((s + total / 2) / total) as u8;
        }
        avg
    }
}

/// Reduce a weighted set of colors to at most `max_colors` with a median
/// cut.
pub fn median_cut(colors: Vec<([u8; 4], usize)>, max_colors: usize) -> Vec<[u8; 4]> {
    if colors.is_empty() {
        return vec![];
    }
    let mut boxes = vec![ColorBox { colors }];
    while boxes.len() < max_colors {
        let best = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.colors.len() > 1)
            .max_by_key(|(_, b)| b.pixel_count() * usize::from(b.widest_channel().1))
            .map(|(i, _)| i);
        let best = match best {
            Some(best) => best,
            None => break,
        };
        let (a, b) = boxes.swap_remove(best).split();
        boxes.push(a);
        boxes.push(b);
    }
    boxes.iter().map(ColorBox::average).collect()
}

/// Build the palette for a set of visible colors, with index 0 transparent.
/// More than [`MAX_QUANTIZED_COLORS`] colors means the quantizer failed;
/// the extras are dropped with a warning.
pub fn palette_from_colors(
    mut colors: Vec<[u8; 4]>,
    space: ColorSpace,
    warnings: &mut Warnings,
) -> Result<Palette> {
    if colors.len() > MAX_QUANTIZED_COLORS {
        warnings.warn(format!(
            "quantizer produced {} colors, keeping the first {}",
            colors.len(),
            MAX_QUANTIZED_COLORS
        ));
        colors.truncate(MAX_QUANTIZED_COLORS);
    }
    let mut entries = vec![[0, 0, 0, 0]];
    entries.extend(colors.iter().map(|&[a, r, g, b]| [r, g, b, a]));
    Palette::from_rgba(&entries, space)
}

fn dither(color: [u8; 4], x: usize, y: usize) -> [u8; 4] {
    let offset = i32::from(BAYER[y & 3][x & 3]) * 2 - 15;
    let mut out = color;
    for value in out.iter_mut().skip(1) {
        *value = (i32::from(*value) + offset).clamp(0, 255) as u8;
    }
    out
}

/// Build a new palette for an ARGB raster and index it, optionally with
/// ordered dithering.
pub fn requantize(
    raster: &Raster,
    space: ColorSpace,
    dithered: bool,
    warnings: &mut Warnings,
) -> Result<(IndexedBitmap, Palette)> {
    debug_assert_eq!(raster.channels, Channels::Argb);
    let mut counts: HashMap<[u8; 4], usize> = HashMap::new();
    for px in raster.pixels.iter().filter(|px| px[0] > 0) {
        *counts.entry(*px).or_insert(0) += 1;
    }
    let mut counts = counts.into_iter().collect::<Vec<_>>();
    counts.sort_unstable();
    let exact = counts.len() <= MAX_QUANTIZED_COLORS;
    let colors = if exact {
        counts.into_iter().map(|(color, _)| color).collect()
    } else {
        median_cut(counts, MAX_QUANTIZED_COLORS)
    };
    debug!(
        "requantized {}x{} raster to {} colors",
        raster.width,
        raster.height,
        colors.len()
    );
    let palette = palette_from_colors(colors, space, warnings)?;

    let entries = Channels::Argb.lookup(&palette);
    let visible = &entries[1..];
    let mut nearest = NearestColor::new(visible);
    let mut data = Vec::with_capacity(raster.pixels.len());
    for (i, &px) in raster.pixels.iter().enumerate() {
        if px[0] == 0 || visible.is_empty() {
            data.push(0);
            continue;
        }
        let px = if dithered && !exact {
            dither(px, i % raster.width, i / raster.width)
        } else {
            px
        };
        data.push(nearest.find(px) + 1);
    }
    Ok((bitmap_from_raster(raster, data), palette))
}
