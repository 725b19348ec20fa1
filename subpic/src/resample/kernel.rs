//! Separable convolution scaling with a choice of 1-D kernels.

use std::f64::consts::PI;

use super::{Channels, Raster, ScaleFilter};
use crate::bitmap::IndexedBitmap;
use crate::palette::Palette;

fn triangle(t: f64) -> f64 {
    let t = t.abs();
    if t < 1.0 {
        1.0 - t
    } else {
        0.0
    }
}

fn bell(t: f64) -> f64 {
    let t = t.abs();
    if t < 0.5 {
        0.75 - t * t
    } else if t < 1.5 {
        let t = t - 1.5;
        0.5 * t * t
    } else {
        0.0
    }
}

fn b_spline(t: f64) -> f64 {
    let t = t.abs();
    if t < 1.0 {
        0.5 * t * t * t - t * t + 2.0 / 3.0
    } else if t < 2.0 {
        let t = 2.0 - t;
        t * t * t / 6.0
    } else {
        0.0
    }
}

fn hermite(t: f64) -> f64 {
    let t = t.abs();
    if t < 1.0 {
        (2.0 * t - 3.0) * t * t + 1.0
    } else {
        0.0
    }
}

fn sinc(t: f64) -> f64 {
    if t == 0.0 {
        1.0
    } else {
        let t = t * PI;
        t.sin() / t
    }
}

fn lanczos3(t: f64) -> f64 {
    let t = t.abs();
    if t < 3.0 {
        sinc(t) * sinc(t / 3.0)
    } else {
        0.0
    }
}

/// The Mitchell-Netravali family of cubics.
fn cubic_bc(t: f64, b: f64, c: f64) -> f64 {
    let t = t.abs();
    let t2 = t * t;
    let t3 = t2 * t;
    if t < 1.0 {
        ((12.0 - 9.0 * b - 6.0 * c) * t3 + (-18.0 + 12.0 * b + 6.0 * c) * t2 + (6.0 - 2.0 * b))
            / 6.0
    } else if t < 2.0 {
        ((-b - 6.0 * c) * t3
            + (6.0 * b + 30.0 * c) * t2
            + (-12.0 * b - 48.0 * c) * t
            + (8.0 * b + 24.0 * c))
            / 6.0
    } else {
        0.0
    }
}

fn mitchell(t: f64) -> f64 {
    cubic_bc(t, 1.0 / 3.0, 1.0 / 3.0)
}

fn bicubic(t: f64) -> f64 {
    // Keys' cubic with a = -0.5 is the B = 0, C = 0.5 member.
    cubic_bc(t, 0.0, 0.5)
}

/// How far from the center a filter's weights are non-zero.
fn support(filter: ScaleFilter) -> f64 {
    match filter {
        ScaleFilter::Bilinear | ScaleFilter::Triangle | ScaleFilter::Hermite => 1.0,
        ScaleFilter::Bell => 1.5,
        ScaleFilter::BSpline | ScaleFilter::Mitchell | ScaleFilter::Bicubic => 2.0,
        ScaleFilter::Lanczos3 => 3.0,
    }
}

fn weight(filter: ScaleFilter, t: f64) -> f64 {
    match filter {
        ScaleFilter::Bilinear | ScaleFilter::Triangle => triangle(t),
        ScaleFilter::Bell => bell(t),
        ScaleFilter::BSpline => b_spline(t),
        ScaleFilter::Hermite => hermite(t),
        ScaleFilter::Lanczos3 => lanczos3(t),
        ScaleFilter::Mitchell => mitchell(t),
        ScaleFilter::Bicubic => bicubic(t),
    }
}

/// Normalized weights of the source pixels feeding one target pixel.
fn contributions(src: usize, trg: usize, filter: ScaleFilter) -> Vec<Vec<(usize, f64)>> {
    let scale = trg as f64 / src as f64;
    // When shrinking, stretch the kernel so every source pixel counts.
    let stretch = if scale < 1.0 { 1.0 / scale } else { 1.0 };
    let radius = support(filter) * stretch;
    (0..trg)
        .map(|i| {
            let center = (i as f64 + 0.5) / scale - 0.5;
            let left = (center - radius).ceil() as i64;
            let right = (center + radius).floor() as i64;
            let mut weights = vec![];
            for j in left..=right {
                let w = weight(filter, (center - j as f64) / stretch);
                if w == 0.0 {
                    continue;
                }
                // Clamp to the edges.
                let j = j.clamp(0, src as i64 - 1) as usize;
                weights.push((j, w));
            }
            let total: f64 = weights.iter().map(|&(_, w)| w).sum();
            if total.abs() < f64::EPSILON {
                let nearest = (center.round().max(0.0) as usize).min(src - 1);
                return vec![(nearest, 1.0)];
            }
            for (_, w) in &mut weights {
                *w /= total;
            }
            weights
        })
        .collect()
}

pub(crate) fn scale(
    bitmap: &IndexedBitmap,
    palette: &Palette,
    width: usize,
    height: usize,
    filter: ScaleFilter,
    channels: Channels,
) -> Raster {
    let lookup = channels.lookup(palette);
    let (src_w, src_h) = (bitmap.width(), bitmap.height());
    let pixels = bitmap.pixels();

    // Horizontal pass, keeping full precision.
    let columns = contributions(src_w, width, filter);
    let mut wide = vec![[0.0f64; 4]; width * src_h];
    for y in 0..src_h {
        let row = &pixels[y * src_w..(y + 1) * src_w];
        for (x, weights) in columns.iter().enumerate() {
            let acc = &mut wide[y * width + x];
            for &(j, w) in weights {
                let color = lookup[usize::from(row[j])];
                for c in 0..4 {
                    acc[c] += f64::from(color[c]) * w;
                }
            }
        }
    }

    // Vertical pass.
    let rows = contributions(src_h, height, filter);
    let mut out = Vec::with_capacity(width * height);
    for weights in &rows {
        for x in 0..width {
            let mut acc = [0.0f64; 4];
            for &(j, w) in weights {
                let color = &wide[j * width + x];
                for c in 0..4 {
                    acc[c] += color[c] * w;
                }
            }
            let mut px = [0u8; 4];
            for (value, sum) in px.iter_mut().zip(acc.iter()) {
                *value = (sum + 0.5).floor().clamp(0.0, 255.0) as u8;
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

    #[test]
    fn kernels_are_one_at_zero() {
        let unit: [fn(f64) -> f64; 3] = [triangle, hermite, lanczos3];
        for f in unit {
            assert!((f(0.0) - 1.0).abs() < 1e-9);
        }
        assert!((bell(0.0) - 0.75).abs() < 1e-9);
        assert!((b_spline(0.0) - 2.0 / 3.0).abs() < 1e-9);
        assert!((bicubic(0.0) - 1.0).abs() < 1e-9);
        assert!(bicubic(1.0).abs() < 1e-9);
    }

    #[test]
    fn weights_are_normalized() {
        for &filter in &[ScaleFilter::Lanczos3, ScaleFilter::Bell, ScaleFilter::Mitchell] {
            for &(src, trg) in &[(10, 3), (3, 10), (7, 7)] {
                for weights in contributions(src, trg, filter) {
                    let total: f64 = weights.iter().map(|&(_, w)| w).sum();
                    assert!((total - 1.0).abs() < 1e-9);
                    assert!(weights.iter().all(|&(j, _)| j < src));
                }
            }
        }
    }
}
