//! Palette-indexed bitmaps.

use image::{ImageBuffer, Rgba, RgbaImage};
use safemem::write_bytes;

use crate::errors::{Error, Result};
use crate::palette::Palette;

/// The dimensions of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Size {
    /// Width in pixels.
    pub w: usize,
    /// Height in pixels.
    pub h: usize,
}

/// The visible area of a bitmap, with all coordinates inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bounds {
    /// Leftmost visible column.
    pub x_min: usize,
    /// Rightmost visible column.
    pub x_max: usize,
    /// Topmost visible row.
    pub y_min: usize,
    /// Bottommost visible row.
    pub y_max: usize,
}

impl Bounds {
    /// The width of the bounded area.
    pub fn width(&self) -> usize {
        self.x_max + 1 - self.x_min
    }

    /// The height of the bounded area.
    pub fn height(&self) -> usize {
        self.y_max + 1 - self.y_min
    }
}

/// A bitmap storing one palette index per pixel, in row-major order.
///
/// Bitmaps are treated as values: pipeline stages which need to change one
/// clone it first, so edits never leak between frames.
#[derive(Clone, PartialEq, Eq)]
pub struct IndexedBitmap {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl IndexedBitmap {
    /// Create a new bitmap filled with `color`.
    pub fn new(width: usize, height: usize, color: u8) -> IndexedBitmap {
        IndexedBitmap {
            width,
            height,
            data: vec![color; width * height],
        }
    }

    /// Wrap an existing buffer of palette indices.
    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Result<IndexedBitmap> {
        if data.len() != width * height {
            return Err(Error::invalid_frame(format!(
                "bitmap buffer has {} bytes, expected {}x{}",
                data.len(),
                width,
                height
            )));
        }
        Ok(IndexedBitmap {
            width,
            height,
            data,
        })
    }

    /// The width of the bitmap.
    pub fn width(&self) -> usize {
        self.width
    }

    /// The height of the bitmap.
    pub fn height(&self) -> usize {
        self.height
    }

    /// The size of the bitmap.
    pub fn size(&self) -> Size {
        Size {
            w: self.width,
            h: self.height,
        }
    }

    /// The raw palette indices, in row-major order.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// One row of palette indices.
    pub fn row(&self, y: usize) -> &[u8] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    /// Get the pixel at `x` and `y`, or panic if out of bounds.
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.bounds_check(x, y);
        self.data[y * self.width + x]
    }

    /// Get the pixel at `x` and `y`, or `None` if out of bounds.
    pub fn get_checked(&self, x: isize, y: isize) -> Option<u8> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as usize, y as usize);
        if x >= self.width || y >= self.height {
            None
        } else {
            Some(self.data[y * self.width + x])
        }
    }

    /// Set the pixel at `x` and `y`, or panic if out of bounds.
    pub fn set(&mut self, x: usize, y: usize, color: u8) {
        self.bounds_check(x, y);
        self.data[y * self.width + x] = color;
    }

    /// If `x` and `y` do not fit within the bitmap, panic.
    fn bounds_check(&self, x: usize, y: usize) {
        if x >= self.width {
            panic!("out of bounds x: {} width: {}", x, self.width);
        }
        if y >= self.height {
            panic!("out of bounds y: {} height: {}", y, self.height);
        }
    }

    /// Make sure every pixel is a valid index into `palette`.
    pub fn check_palette(&self, palette: &Palette) -> Result<()> {
        match self.data.iter().copied().max() {
            Some(max) if usize::from(max) >= palette.len() => Err(Error::TooManyColors {
                index: max,
                limit: palette.len(),
            }),
            _ => Ok(()),
        }
    }

    /// Count how often each palette index is used.
    pub fn histogram(&self) -> [usize; 256] {
        let mut histogram = [0; 256];
        for &px in &self.data {
            histogram[usize::from(px)] += 1;
        }
        histogram
    }

    /// Find the "most visible, most common, lightest" color.  Each color
    /// is weighted by how often it appears, its alpha and its luma, and
    /// colors with an alpha below `alpha_threshold` count as invisible.
    pub fn primary_color_index(&self, palette: &Palette, alpha_threshold: u8) -> u8 {
        let histogram = self.histogram();
        let mut best = 0;
        let mut max = 0.0;
        for (i, &count) in histogram.iter().enumerate().take(palette.len()) {
            let mut alpha = palette.alpha(i);
            if alpha < alpha_threshold {
                alpha = 0;
            }
            let weight = (count as f64 * f64::from(alpha) / 256.0)
                * (f64::from(palette.luma(i)) / 256.0);
            if weight > max {
                max = weight;
                best = i;
            }
        }
        // `best` is always below `palette.len() <= 256`.
        best as u8
    }

    /// The highest palette index which is actually used and not fully
    /// transparent.
    pub fn highest_used_index(&self, palette: &Palette) -> u8 {
        let mut highest = 0;
        for &px in &self.data {
            if px > highest && palette.alpha(usize::from(px)) > 0 {
                highest = px;
                if highest == 255 {
                    break;
                }
            }
        }
        highest
    }

    /// Is the pixel at `x` and `y` at least as opaque as `threshold`?
    fn visible(&self, palette: &Palette, threshold: u8, x: usize, y: usize) -> bool {
        palette.alpha(usize::from(self.data[y * self.width + x])) >= threshold
    }

    /// Find the smallest rectangle containing every pixel with an alpha of
    /// at least `alpha_threshold`.
    ///
    /// The edges are searched bottom-up, then top-down, then right-to-left,
    /// then left-to-right, each search limited by the previous ones.  A
    /// bitmap with no visible pixels yields `(0, 0, 0, 0)`.
    pub fn bounds(&self, palette: &Palette, alpha_threshold: u8) -> Bounds {
        if self.width == 0 || self.height == 0 {
            return Bounds {
                x_min: 0,
                x_max: 0,
                y_min: 0,
                y_max: 0,
            };
        }
        let row_visible =
            |y: usize| (0..self.width).any(|x| self.visible(palette, alpha_threshold, x, y));

        let mut y_max = self.height - 1;
        while y_max > 0 && !row_visible(y_max) {
            y_max -= 1;
        }
        let mut y_min = 0;
        while y_min < y_max && !row_visible(y_min) {
            y_min += 1;
        }

        let column_visible = |x: usize| {
            (y_min..=y_max).any(|y| self.visible(palette, alpha_threshold, x, y))
        };
        let mut x_max = self.width - 1;
        while x_max > 0 && !column_visible(x_max) {
            x_max -= 1;
        }
        let mut x_min = 0;
        while x_min < x_max && !column_visible(x_min) {
            x_min += 1;
        }

        Bounds {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    /// Copy out a `w` by `h` rectangle starting at `x`, `y`.  Panics if the
    /// rectangle does not fit inside the bitmap.
    pub fn crop(&self, x: usize, y: usize, w: usize, h: usize) -> IndexedBitmap {
        assert!(
            x + w <= self.width && y + h <= self.height,
            "crop {}x{}+{}+{} outside {}x{} bitmap",
            w,
            h,
            x,
            y,
            self.width,
            self.height
        );
        let mut data = Vec::with_capacity(w * h);
        for row in y..y + h {
            let start = row * self.width + x;
            data.extend_from_slice(&self.data[start..start + w]);
        }
        IndexedBitmap {
            width: w,
            height: h,
            data,
        }
    }

    /// Fill a `w` by `h` rectangle starting at `x`, `y` with `color`.
    /// Panics if the rectangle does not fit inside the bitmap.
    pub fn fill_rect(&mut self, x: usize, y: usize, w: usize, h: usize, color: u8) {
        assert!(
            x + w <= self.width && y + h <= self.height,
            "fill {}x{}+{}+{} outside {}x{} bitmap",
            w,
            h,
            x,
            y,
            self.width,
            self.height
        );
        for row in y..y + h {
            let start = row * self.width + x;
            write_bytes(&mut self.data[start..start + w], color);
        }
    }

    /// Render this bitmap as an RGBA image using `palette`.
    pub fn to_rgba_image(&self, palette: &Palette) -> RgbaImage {
        ImageBuffer::from_fn(self.width as u32, self.height as u32, |x, y| {
            let px = self.data[y as usize * self.width + x as usize];
            Rgba(palette.rgba(usize::from(px)))
        })
    }
}

impl std::fmt::Debug for IndexedBitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("IndexedBitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::ColorSpace;

    fn test_palette() -> Palette {
        Palette::from_rgba(
            &[
                [0, 0, 0, 0],
                [255, 255, 255, 255],
                [40, 40, 40, 30],
                [128, 128, 128, 255],
            ],
            ColorSpace::Bt601,
        )
        .unwrap()
    }

    #[test]
    fn from_raw_checks_length() {
        assert!(IndexedBitmap::from_raw(2, 2, vec![0; 3]).is_err());
        assert!(IndexedBitmap::from_raw(2, 2, vec![0; 4]).is_ok());
    }

    #[test]
    fn bounds_of_single_pixel() {
        let palette = test_palette();
        let mut bitmap = IndexedBitmap::new(12, 10, 0);
        bitmap.set(5, 5, 1);
        assert_eq!(
            bitmap.bounds(&palette, 128),
            Bounds {
                x_min: 5,
                x_max: 5,
                y_min: 5,
                y_max: 5
            }
        );
    }

    #[test]
    fn bounds_ignore_pixels_below_threshold() {
        let palette = test_palette();
        let mut bitmap = IndexedBitmap::new(8, 8, 0);
        bitmap.fill_rect(0, 0, 8, 2, 2);
        bitmap.fill_rect(2, 3, 3, 2, 3);
        let bounds = bitmap.bounds(&palette, 128);
        assert_eq!(
            bounds,
            Bounds {
                x_min: 2,
                x_max: 4,
                y_min: 3,
                y_max: 4
            }
        );
        assert_eq!((bounds.width(), bounds.height()), (3, 2));
    }

    #[test]
    fn bounds_of_transparent_bitmap_are_degenerate() {
        let palette = test_palette();
        let bitmap = IndexedBitmap::new(7, 3, 0);
        assert_eq!(
            bitmap.bounds(&palette, 1),
            Bounds {
                x_min: 0,
                x_max: 0,
                y_min: 0,
                y_max: 0
            }
        );
    }

    #[test]
    fn primary_color_prefers_visible_common_light_colors() {
        let palette = test_palette();
        let mut data = vec![1; 90];
        data.extend(vec![2; 10]);
        let bitmap = IndexedBitmap::from_raw(10, 10, data).unwrap();
        assert_eq!(bitmap.primary_color_index(&palette, 64), 1);

        // Even when the faint color is far more common, it stays invisible.
        let mut data = vec![2; 95];
        data.extend(vec![3; 5]);
        let bitmap = IndexedBitmap::from_raw(10, 10, data).unwrap();
        assert_eq!(bitmap.primary_color_index(&palette, 64), 3);
    }

    #[test]
    fn highest_used_index_skips_transparent_entries() {
        let palette = Palette::from_rgba(
            &[[0, 0, 0, 0xff], [0, 0, 0, 0xff], [0, 0, 0, 0xff], [0, 0, 0, 0]],
            ColorSpace::Bt601,
        )
        .unwrap();
        let bitmap = IndexedBitmap::from_raw(2, 2, vec![0, 3, 1, 2]).unwrap();
        assert_eq!(bitmap.highest_used_index(&palette), 2);
    }

    #[test]
    fn crop_and_fill() {
        let data = (0..16).collect::<Vec<u8>>();
        let mut bitmap = IndexedBitmap::from_raw(4, 4, data).unwrap();
        let cropped = bitmap.crop(1, 2, 2, 2);
        assert_eq!(cropped.pixels(), &[9, 10, 13, 14]);
        bitmap.fill_rect(0, 0, 2, 1, 0xff);
        assert_eq!(bitmap.row(0), &[0xff, 0xff, 2, 3]);
        // The earlier copy is unaffected.
        assert_eq!(cropped.get(0, 0), 9);
    }

    #[test]
    #[should_panic]
    fn crop_outside_panics() {
        IndexedBitmap::new(4, 4, 0).crop(3, 0, 2, 1);
    }

    #[test]
    fn check_palette_rejects_large_indices() {
        let palette = test_palette();
        let bitmap = IndexedBitmap::from_raw(2, 1, vec![3, 4]).unwrap();
        match bitmap.check_palette(&palette) {
            Err(Error::TooManyColors { index: 4, limit: 4 }) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn renders_rgba() {
        let palette = test_palette();
        let bitmap = IndexedBitmap::from_raw(2, 1, vec![0, 1]).unwrap();
        let image = bitmap.to_rgba_image(&palette);
        assert_eq!(image.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
        assert_eq!(image.get_pixel(1, 0), &Rgba([255, 255, 255, 255]));
    }
}
