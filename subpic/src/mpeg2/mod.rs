//! The `*.sub` portion of VobSub subtitles is packaged in MPEG-2 Program
//! Stream packets, which we can both parse and generate.

use nom::bits::complete::{tag, take};
use nom::combinator::map;
use nom::IResult;

pub mod clock;
pub mod pes;
pub mod ps;

/// Our position in a stream of bits.
pub(crate) type Bits<'a> = (&'a [u8], usize);

/// Take `count` bits as a `u8`.
pub(crate) fn take_u8<'a>(count: usize) -> impl Fn(Bits<'a>) -> IResult<Bits<'a>, u8> {
    take(count)
}

/// Take `count` bits as a `u16`.
pub(crate) fn take_u16<'a>(count: usize) -> impl Fn(Bits<'a>) -> IResult<Bits<'a>, u16> {
    take(count)
}

/// Take `count` bits as a `u32`.
pub(crate) fn take_u32<'a>(count: usize) -> impl Fn(Bits<'a>) -> IResult<Bits<'a>, u32> {
    take(count)
}

/// Take `count` bits as a `u64`.
pub(crate) fn take_u64<'a>(count: usize) -> impl Fn(Bits<'a>) -> IResult<Bits<'a>, u64> {
    take(count)
}

/// Match `count` bits against `pattern`.
pub(crate) fn tag_u8<'a>(
    pattern: u8,
    count: usize,
) -> impl Fn(Bits<'a>) -> IResult<Bits<'a>, u8> {
    tag(pattern, count)
}

/// Deserialize a single Boolean flag bit.
pub(crate) fn bool_flag(i: Bits) -> IResult<Bits, bool> {
    map(take_u8(1), |b| b == 1)(i)
}
