//! Scaling palette-indexed bitmaps, and choosing palettes for the result.
//!
//! Scaling always passes through a full-color [`Raster`], which is then
//! turned back into an indexed bitmap by one of the [`PaletteMode`]s.

use serde::{Deserialize, Serialize};

use crate::bitmap::IndexedBitmap;
use crate::errors::{Error, Result, Warnings};
use crate::palette::Palette;

mod bilinear;
mod kernel;
pub mod quantize;

/// The interpolation used when scaling.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScaleFilter {
    /// Blend the four nearest source pixels.
    #[default]
    Bilinear,
    /// Separable linear kernel.
    Triangle,
    /// Quadratic "Bell" kernel.
    Bell,
    /// Cubic B-spline, which smooths noticeably.
    BSpline,
    /// Hermite cubic.
    Hermite,
    /// Windowed sinc with three lobes.
    Lanczos3,
    /// Mitchell-Netravali cubic with B = C = 1/3.
    Mitchell,
    /// Keys cubic with a = -0.5.
    Bicubic,
}

/// How the colors of a scaled image are turned back into palette indices.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaletteMode {
    /// Match each pixel to the nearest entry of the existing palette.
    #[default]
    Keep,
    /// Map pixels onto a short scale of gray levels by their luma, with
    /// index 0 for transparent pixels.  Used for 4-color DVD targets.
    ReduceLuma,
    /// Build a new palette of at most 256 entries with a median cut.
    Requantize,
}

/// Settings for [`resample`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResampleOptions {
    /// The interpolation.
    pub filter: ScaleFilter,
    /// How to choose the output palette.
    pub mode: PaletteMode,
    /// Apply ordered dithering when requantizing.
    pub dither: bool,
    /// Pixels less opaque than this become transparent when reducing.
    pub alpha_threshold: u8,
    /// Luma cut-offs, lightest first, when reducing.
    pub luma_thresholds: Vec<u8>,
}

impl Default for ResampleOptions {
    fn default() -> ResampleOptions {
        ResampleOptions {
            filter: ScaleFilter::default(),
            mode: PaletteMode::default(),
            dither: false,
            alpha_threshold: 80,
            luma_thresholds: vec![210, 160],
        }
    }
}

/// Which color channels a raster holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channels {
    /// `[a, r, g, b]`
    Argb,
    /// `[a, y, cb, cr]`
    Ayuv,
}

impl Channels {
    fn color(self, palette: &Palette, index: usize) -> [u8; 4] {
        let a = palette.alpha(index);
        match self {
            Channels::Argb => {
                let (r, g, b) = palette.rgb(index);
                [a, r, g, b]
            }
            Channels::Ayuv => {
                let (y, cb, cr) = palette.ycbcr(index);
                [a, y, cb, cr]
            }
        }
    }

    /// Transparent black, used for samples outside the source image.
    fn outside(self) -> [u8; 4] {
        match self {
            Channels::Argb => [0, 0, 0, 0],
            Channels::Ayuv => [0, 16, 128, 128],
        }
    }

    /// Look up every palette entry once.
    fn lookup(self, palette: &Palette) -> Vec<[u8; 4]> {
        (0..palette.len()).map(|i| self.color(palette, i)).collect()
    }
}

/// A full-color image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Raster {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// The meaning of each pixel's four bytes.
    pub channels: Channels,
    /// Pixels in row-major order.
    pub pixels: Vec<[u8; 4]>,
}

impl Raster {
    /// Expand an indexed bitmap without scaling it.
    pub fn from_bitmap(bitmap: &IndexedBitmap, palette: &Palette, channels: Channels) -> Raster {
        let lookup = channels.lookup(palette);
        Raster {
            width: bitmap.width(),
            height: bitmap.height(),
            channels,
            pixels: bitmap
                .pixels()
                .iter()
                .map(|&px| lookup[usize::from(px)])
                .collect(),
        }
    }
}

/// Scale `bitmap` to `width` by `height` pixels of the given channels.
pub fn scale(
    bitmap: &IndexedBitmap,
    palette: &Palette,
    width: usize,
    height: usize,
    filter: ScaleFilter,
    channels: Channels,
) -> Raster {
    match filter {
        ScaleFilter::Bilinear => bilinear::scale(bitmap, palette, width, height, channels),
        other => kernel::scale(bitmap, palette, width, height, other, channels),
    }
}

/// Scale `bitmap` to `width` by `height` and index the result according to
/// `options.mode`.  Returns the new bitmap and its palette.
pub fn resample(
    bitmap: &IndexedBitmap,
    palette: &Palette,
    width: usize,
    height: usize,
    options: &ResampleOptions,
    warnings: &mut Warnings,
) -> Result<(IndexedBitmap, Palette)> {
    if width == 0 || height == 0 || bitmap.width() == 0 || bitmap.height() == 0 {
        return Err(Error::invalid_frame(format!(
            "cannot scale {}x{} bitmap to {}x{}",
            bitmap.width(),
            bitmap.height(),
            width,
            height
        )));
    }
    bitmap.check_palette(palette)?;
    let same_size = bitmap.width() == width && bitmap.height() == height;
    trace!(
        "resampling {}x{} to {}x{} with {:?}, palette mode {:?}",
        bitmap.width(),
        bitmap.height(),
        width,
        height,
        options.filter,
        options.mode
    );

    match options.mode {
        PaletteMode::Keep => {
            if same_size {
                return Ok((bitmap.clone(), palette.clone()));
            }
            let raster = scale(bitmap, palette, width, height, options.filter, Channels::Argb);
            Ok((quantize::map_to_palette(&raster, palette), palette.clone()))
        }
        PaletteMode::ReduceLuma => {
            let mut thresholds = options.luma_thresholds.clone();
            thresholds.sort_unstable_by(|a, b| b.cmp(a));
            let reduced_palette = quantize::luma_palette(thresholds.len() + 2, palette.color_space())?;
            let reduced = if same_size {
                quantize::reduce_luma(bitmap, palette, options.alpha_threshold, &thresholds)
            } else {
                // Bilinear blends luma directly; kernels work in RGB.
                let channels = match options.filter {
                    ScaleFilter::Bilinear => Channels::Ayuv,
                    _ => Channels::Argb,
                };
                let raster = scale(bitmap, palette, width, height, options.filter, channels);
                quantize::reduce_luma_raster(
                    &raster,
                    palette.color_space(),
                    options.alpha_threshold,
                    &thresholds,
                )
            };
            Ok((reduced, reduced_palette))
        }
        PaletteMode::Requantize => {
            let raster = if same_size {
                Raster::from_bitmap(bitmap, palette, Channels::Argb)
            } else {
                scale(bitmap, palette, width, height, options.filter, Channels::Argb)
            };
            quantize::requantize(&raster, palette.color_space(), options.dither, warnings)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::ColorSpace;

    fn palette() -> Palette {
        Palette::from_rgba(
            &[
                [0, 0, 0, 0],
                [255, 255, 255, 255],
                [128, 128, 128, 255],
                [0, 0, 0, 255],
                [255, 255, 255, 255],
            ],
            ColorSpace::Bt601,
        )
        .unwrap()
    }

    fn bitmap() -> IndexedBitmap {
        let data = (0..40 * 20).map(|i| ((i / 3 + i / 40) % 5) as u8).collect();
        IndexedBitmap::from_raw(40, 20, data).unwrap()
    }

    const ALL_FILTERS: [ScaleFilter; 8] = [
        ScaleFilter::Bilinear,
        ScaleFilter::Triangle,
        ScaleFilter::Bell,
        ScaleFilter::BSpline,
        ScaleFilter::Hermite,
        ScaleFilter::Lanczos3,
        ScaleFilter::Mitchell,
        ScaleFilter::Bicubic,
    ];

    #[test]
    fn same_size_keep_is_identity() {
        let mut warnings = Warnings::new();
        let (out, out_palette) = resample(
            &bitmap(),
            &palette(),
            40,
            20,
            &ResampleOptions::default(),
            &mut warnings,
        )
        .unwrap();
        assert_eq!(out, bitmap());
        assert_eq!(out_palette, palette());
    }

    #[test]
    fn every_filter_produces_valid_indices() {
        let mut warnings = Warnings::new();
        for &filter in &ALL_FILTERS {
            for &mode in &[PaletteMode::Keep, PaletteMode::ReduceLuma, PaletteMode::Requantize] {
                let options = ResampleOptions {
                    filter,
                    mode,
                    dither: mode == PaletteMode::Requantize,
                    ..ResampleOptions::default()
                };
                for &(w, h) in &[(60, 30), (17, 9), (1, 1)] {
                    let (out, out_palette) =
                        resample(&bitmap(), &palette(), w, h, &options, &mut warnings).unwrap();
                    assert_eq!((out.width(), out.height()), (w, h));
                    out.check_palette(&out_palette).unwrap();
                }
            }
        }
        assert!(warnings.is_empty());
    }

    #[test]
    fn reduce_luma_without_scaling() {
        let mut warnings = Warnings::new();
        let options = ResampleOptions {
            mode: PaletteMode::ReduceLuma,
            ..ResampleOptions::default()
        };
        let source = IndexedBitmap::from_raw(5, 1, vec![0, 1, 2, 3, 4]).unwrap();
        let (out, out_palette) =
            resample(&source, &palette(), 5, 1, &options, &mut warnings).unwrap();
        assert_eq!(out.pixels(), &[0, 1, 3, 3, 1]);
        assert_eq!(out_palette.len(), 4);
        assert_eq!(out_palette.alpha(0), 0);
    }

    #[test]
    fn doubling_a_solid_bitmap_keeps_its_color() {
        let mut warnings = Warnings::new();
        let source = IndexedBitmap::new(4, 4, 2);
        for &filter in &ALL_FILTERS {
            let options = ResampleOptions {
                filter,
                ..ResampleOptions::default()
            };
            let (out, _) = resample(&source, &palette(), 8, 8, &options, &mut warnings).unwrap();
            // Edges may blend with the transparent outside, but the middle
            // must keep its color.
            assert_eq!(out.get(4, 4), 2, "{:?}", filter);
        }
    }

    #[test]
    fn empty_targets_are_rejected() {
        let mut warnings = Warnings::new();
        let result = resample(
            &bitmap(),
            &palette(),
            0,
            10,
            &ResampleOptions::default(),
            &mut warnings,
        );
        assert!(result.is_err());
    }
}
