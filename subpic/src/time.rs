//! Timestamps and frame rates.
//!
//! All times are presentation timestamps in 90 kHz ticks.

use std::fmt;

use crate::errors::{Error, Result};

/// Ticks per second of the presentation clock.
pub const TICKS_PER_SECOND: i64 = 90_000;

/// 24000/1001 frames per second ("23.976").
pub const FPS_24P: f64 = 24000.0 / 1001.0;
/// 24 frames per second.
pub const FPS_24: f64 = 24.0;
/// PAL, 25 frames per second.
pub const FPS_PAL: f64 = 25.0;
/// NTSC, 30000/1001 frames per second ("29.97").
pub const FPS_NTSC: f64 = 30000.0 / 1001.0;
/// PAL interlaced, 50 fields per second.
pub const FPS_PAL_I: f64 = 50.0;
/// NTSC interlaced, 60000/1001 fields per second ("59.94").
pub const FPS_NTSC_I: f64 = 60000.0 / 1001.0;

/// How close two frame rates must be to count as the same rate.
const FPS_EPSILON: f64 = 0.001;

/// How close ticks-per-frame must be to an integer to use integer math.
const TPF_EPSILON: f64 = 0.01;

/// Are these two frame rates the same?
pub fn same_fps(a: f64, b: f64) -> bool {
    (a - b).abs() < FPS_EPSILON
}

/// Round `t` to the start of the nearest frame at `fps`.
///
/// Rates with a (nearly) whole number of ticks per frame use integer math.
/// 23.976 fps has 3753.75 ticks per frame, so it's handled as the exact
/// fraction 15015/4 to avoid drift over long streams.  Anything else falls
/// back to floating point.  Applying this twice gives the same result as
/// applying it once.
pub fn sync_time_pts(t: i64, fps: f64) -> i64 {
    if same_fps(fps, FPS_24P) {
        let frames = (t * 4 + 15015 / 2).div_euclid(15015);
        return (frames * 15015 + 2).div_euclid(4);
    }
    let tpf = TICKS_PER_SECOND as f64 / fps;
    if (tpf - tpf.round()).abs() < TPF_EPSILON {
        let tpf = tpf.round() as i64;
        (t + tpf / 2).div_euclid(tpf) * tpf
    } else {
        ((t as f64 / tpf).round() * tpf).round() as i64
    }
}

/// The length of one frame at `fps`, in ticks (rounded).
pub fn frame_duration(fps: f64) -> i64 {
    (TICKS_PER_SECOND as f64 / fps).round() as i64
}

/// Rescale `t` as if the stream had been played at `fps_target` instead of
/// `fps_source`.
pub fn convert_fps(t: i64, fps_source: f64, fps_target: f64) -> i64 {
    if same_fps(fps_source, fps_target) {
        t
    } else {
        (t as f64 * fps_source / fps_target).round() as i64
    }
}

/// Convert milliseconds to ticks.
pub fn ms_to_pts(ms: i64) -> i64 {
    ms * 90
}

/// Convert ticks to milliseconds, rounding to the nearest millisecond.
pub fn pts_to_ms(pts: i64) -> i64 {
    (pts + 45).div_euclid(90)
}

/// The Blu-ray frame rate code for `fps`.
pub fn bd_frame_rate_code(fps: f64) -> u8 {
    let codes = [
        (FPS_24P, 0x10),
        (FPS_24, 0x20),
        (FPS_PAL, 0x30),
        (FPS_NTSC, 0x40),
        (FPS_PAL_I, 0x60),
        (FPS_NTSC_I, 0x70),
    ];
    codes
        .iter()
        .find(|(rate, _)| same_fps(*rate, fps))
        .map(|&(_, code)| code)
        .unwrap_or(0x10)
}

/// The frame rate for a Blu-ray frame rate code, if we know it.
pub fn bd_frame_rate(code: u8) -> Option<f64> {
    match code {
        0x10 => Some(FPS_24P),
        0x20 => Some(FPS_24),
        0x30 => Some(FPS_PAL),
        0x40 => Some(FPS_NTSC),
        0x60 => Some(FPS_PAL_I),
        0x70 => Some(FPS_NTSC_I),
        _ => None,
    }
}

/// Parse a frame rate written as a number ("25", "23.976") or a fraction
/// ("24000/1001").  The usual shorthand values map onto the exact rates.
pub fn parse_fps(text: &str) -> Result<f64> {
    let text = text.trim();
    let fps = match text.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().map_err(|_| Error::parse(text))?;
            let den: f64 = den.trim().parse().map_err(|_| Error::parse(text))?;
            num / den
        }
        None => match text {
            "23.976" | "23.98" => FPS_24P,
            "29.97" => FPS_NTSC,
            "59.94" => FPS_NTSC_I,
            _ => text.parse().map_err(|_| Error::parse(text))?,
        },
    };
    if !fps.is_finite() || fps <= 0.0 {
        return Err(Error::parse(format!("invalid frame rate {:?}", text)));
    }
    Ok(fps)
}

/// A timestamp formatted as `hh:mm:ss:mmm`, as used in `*.idx` files.
pub struct IdxTime(pub i64);

impl fmt::Display for IdxTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let ms = pts_to_ms(self.0);
        let sign = if ms < 0 { "-" } else { "" };
        let ms = ms.abs();
        write!(
            f,
            "{}{:02}:{:02}:{:02}:{:03}",
            sign,
            ms / 3_600_000,
            ms / 60_000 % 60,
            ms / 1000 % 60,
            ms % 1000
        )
    }
}
