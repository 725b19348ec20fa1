//! Bilinear scaling.

use super::{Channels, Raster};
use crate::bitmap::IndexedBitmap;
use crate::palette::Palette;

/// Source pixels per target pixel, mapping the first and last pixels of
/// each axis onto each other.
fn ratio(src: usize, trg: usize) -> f64 {
    if trg <= 1 {
        0.0
    } else {
        (src - 1) as f64 / (trg - 1) as f64
    }
}

pub(crate) fn scale(
    bitmap: &IndexedBitmap,
    palette: &Palette,
    width: usize,
    height: usize,
    channels: Channels,
) -> Raster {
    let lookup = channels.lookup(palette);
    let outside = channels.outside();
    let (src_w, src_h) = (bitmap.width(), bitmap.height());
    let pixels = bitmap.pixels();
    let sample = |x: usize, y: usize| -> [u8; 4] {
        if x < src_w && y < src_h {
            lookup[usize::from(pixels[y * src_w + x])]
        } else {
            outside
        }
    };

    let (x_ratio, y_ratio) = (ratio(src_w, width), ratio(src_h, height));
    let mut out = Vec::with_capacity(width * height);
    for ty in 0..height {
        let sy = ty as f64 * y_ratio;
        let y0 = sy.floor() as usize;
        let fy = sy - y0 as f64;
        for tx in 0..width {
            let sx = tx as f64 * x_ratio;
            let x0 = sx.floor() as usize;
            let fx = sx - x0 as f64;

            let c00 = sample(x0, y0);
            let c10 = sample(x0 + 1, y0);
            let c01 = sample(x0, y0 + 1);
            let c11 = sample(x0 + 1, y0 + 1);
            let mut px = [0u8; 4];
            for (c, value) in px.iter_mut().enumerate() {
                let top = f64::from(c00[c]) * (1.0 - fx) + f64::from(c10[c]) * fx;
                let bottom = f64::from(c01[c]) * (1.0 - fx) + f64::from(c11[c]) * fx;
                let v = top * (1.0 - fy) + bottom * fy;
                *value = (v + 0.5).floor().clamp(0.0, 255.0) as u8;
            }
            out.push(px);
        }
    }
    Raster {
        width,
        height,
        channels,
        pixels: out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::ColorSpace;

    #[test]
    fn same_size_copies_colors() {
        let palette = Palette::from_rgba(
            &[[0, 0, 0, 0], [10, 20, 30, 255], [200, 100, 50, 128]],
            ColorSpace::Bt601,
        )
        .unwrap();
        let bitmap = IndexedBitmap::from_raw(3, 2, vec![0, 1, 2, 2, 1, 0]).unwrap();
        let raster = scale(&bitmap, &palette, 3, 2, Channels::Argb);
        assert_eq!(raster, Raster::from_bitmap(&bitmap, &palette, Channels::Argb));
    }

    #[test]
    fn midpoints_blend() {
        let palette =
            Palette::from_rgba(&[[0, 0, 0, 255], [200, 100, 50, 255]], ColorSpace::Bt601).unwrap();
        let bitmap = IndexedBitmap::from_raw(2, 1, vec![0, 1]).unwrap();
        let raster = scale(&bitmap, &palette, 3, 1, Channels::Argb);
        assert_eq!(raster.pixels[1], [255, 100, 50, 25]);
    }
}
