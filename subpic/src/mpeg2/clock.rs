//! The MPEG-2 system clock, as found in pack and PES headers.

use nom::IResult;
use std::fmt;

use super::{tag_u8, take_u16, take_u64, Bits};

/// This represents the 90kHz, 33-bit [System Time Clock][STC] (STC) and
/// the 9-bit STC extension value, which represents 1/300th of a tick.
///
/// [STC]: http://www.bretl.com/mpeghtml/STC.HTM
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Clock {
    value: u64,
}

impl Clock {
    /// Given a 33-bit System Time Clock value, construct a new `Clock`
    /// value.
    pub fn base(stc: u64) -> Clock {
        Clock { value: stc << 9 }
    }

    /// Return a new `Clock` value, setting the 9-bit extension to the
    /// specified value.
    pub fn with_ext(&self, ext: u16) -> Clock {
        Clock {
            value: self.value & !0x1ff | u64::from(ext & 0x1ff),
        }
    }

    /// The 33-bit base value, in 90kHz ticks.
    pub fn ticks(&self) -> i64 {
        (self.value >> 9) as i64
    }

    /// Convert a `Clock` value to seconds.
    pub fn to_seconds(&self) -> f64 {
        let base = (self.value >> 9) as f64;
        let ext = (self.value & 0x1ff) as f64;
        (base + ext / 300.0) / 90000.0
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut s = self.to_seconds();
        let h = (s / 3600.0).trunc();
        s %= 3600.0;
        let m = (s / 60.0).trunc();
        s %= 60.0;
        write!(f, "{}:{:02}:{:1.3}", h, m, s)
    }
}

/// Parse a 33-bit `Clock` value with 3 marker bits, consuming 36 bits.
pub fn clock(i: Bits) -> IResult<Bits, Clock> {
    // Bits 32..30.
    let (i, hi) = take_u64(3)(i)?;
    let (i, _) = tag_u8(0b1, 1)(i)?;
    // Bits 29..15.
    let (i, mid) = take_u64(15)(i)?;
    let (i, _) = tag_u8(0b1, 1)(i)?;
    // Bits 14..0.
    let (i, lo) = take_u64(15)(i)?;
    let (i, _) = tag_u8(0b1, 1)(i)?;
    Ok((i, Clock::base(hi << 30 | mid << 15 | lo)))
}

/// Parse a 33-bit `Clock` value plus a 9-bit extension and 4 marker bits,
/// consuming 46 bits.
pub fn clock_and_ext(i: Bits) -> IResult<Bits, Clock> {
    let (i, clock) = clock(i)?;
    let (i, ext) = take_u16(9)(i)?;
    let (i, _) = tag_u8(0b1, 1)(i)?;
    Ok((i, clock.with_ext(ext)))
}

/// Pack a 33-bit timestamp into the 5-byte PES format, with `prefix` in
/// the top 4 bits (`0b0010` for a lone PTS).
pub fn encode_timestamp(prefix: u8, ticks: i64) -> [u8; 5] {
    let t = (ticks as u64) & 0x1_ffff_ffff;
    [
        prefix << 4 | ((t >> 29) & 0x0e) as u8 | 1,
        (t >> 22) as u8,
        ((t >> 14) & 0xfe) as u8 | 1,
        (t >> 7) as u8,
        ((t << 1) & 0xfe) as u8 | 1,
    ]
}

#[test]
fn parse_clock() {
    assert_eq!(
        clock((&[0x44, 0x02, 0xc4, 0x82, 0x04][..], 2)).unwrap(),
        (
            (&[0x04][..], 6),
            Clock::base(0b_000_000000001011000_001000001000000)
        )
    );
    assert_eq!(
        clock_and_ext((&[0x44, 0x02, 0xc4, 0x82, 0x04, 0xa9][..], 2)).unwrap(),
        (
            (&[][..], 0),
            Clock::base(0b_000_000000001011000_001000001000000).with_ext(0b001010100)
        )
    );
}

#[test]
fn encode_timestamps() {
    assert_eq!(
        encode_timestamp(0b0010, 2815200),
        [0x21, 0x00, 0xab, 0xe9, 0xc1]
    );
    let bytes = encode_timestamp(0b0010, 0x1_2345_6789);
    let (_, parsed) = clock((&bytes[..], 4)).unwrap();
    assert_eq!(parsed.ticks(), 0x1_2345_6789);
}
