//! Run-length encoded image format for DVD subtitles.
//!
//! Each run is 1 to 4 nibbles long, and carries a length and a 2-bit color.
//! Even and odd scan lines are stored in two separate streams, and every
//! line starts on a byte boundary.

use nom::branch::alt;
use nom::bits::complete::{tag as tag_bits, take as take_bits};
use nom::combinator::{value, verify};
use nom::sequence::preceded;
use nom::IResult;
use safemem::write_bytes;

use crate::bitmap::{IndexedBitmap, Size};
use crate::errors::{Error, Result, Warnings};
use crate::util::BytesFormatter;

/// Our position in a stream of bits.
type Bits<'a> = (&'a [u8], usize);

/// A run-length encoded value.
#[derive(Debug)]
struct Rle {
    /// The number of times to repeat this value.  A value of 0 indicates that
    /// we should fill to the end of the line.
    cnt: u16,
    /// The value to repeat.  This is 2 bits wide.
    val: u8,
}

fn take_u16<'a>(count: usize) -> impl Fn(Bits<'a>) -> IResult<Bits<'a>, u16> {
    take_bits(count)
}

fn zeros<'a>(count: usize) -> impl Fn(Bits<'a>) -> IResult<Bits<'a>, u16> {
    tag_bits(0u16, count)
}

/// Parse the count for a `Rle`.
fn count(i: Bits) -> IResult<Bits, u16> {
    alt((
        // Fill to end of line.
        value(0, zeros(14)),
        // Count for 4-nibble RLE.
        preceded(zeros(6), take_u16(8)),
        // Count for 3-nibble RLE.
        preceded(zeros(4), take_u16(6)),
        // Count for 2-nibble RLE.
        preceded(zeros(2), take_u16(4)),
        // Count for 1-nibble RLE.
        verify(take_u16(2), |&n: &u16| n != 0),
    ))(i)
}

/// Parse an `Rle`.
fn rle(i: Bits) -> IResult<Bits, Rle> {
    let (i, cnt) = count(i)?;
    let (i, val) = take_bits(2usize)(i)?;
    Ok((i, Rle { cnt, val }))
}

/// Decompress one scan line from `pos` into `output`, returning the
/// byte-aligned position of the next line.  On malformed input, we return
/// an error message and leave the rest of the line alone.
fn scan_line<'a>(pos: Bits<'a>, output: &mut [u8]) -> Result<Bits<'a>, String> {
    trace!("scan line starting with {:?}", BytesFormatter(pos.0));
    let width = output.len();
    let mut x = 0;
    let mut pos = pos;
    while x < width {
        let (new_pos, run) =
            rle(pos).map_err(|err| format!("error parsing scan line: {:?}", err))?;
        pos = new_pos;
        let count = if run.cnt == 0 {
            width - x
        } else {
            usize::from(run.cnt)
        };
        if x + count > width {
            write_bytes(&mut output[x..], run.val);
            return Err(format!(
                "run of {} pixels overflows {} pixel scan line",
                count, width
            ));
        }
        write_bytes(&mut output[x..x + count], run.val);
        x += count;
    }
    // Round up to the next full byte.
    if pos.1 > 0 {
        pos = (&pos.0[1..], 0);
    }
    Ok(pos)
}

/// Decompress a run-length encoded image from its even-line and odd-line
/// streams.  Broken data never fails the whole image: the damaged line is
/// left partly transparent, the rest of that stream is skipped, and a
/// warning is recorded.
pub fn decompress(size: Size, data: [&[u8]; 2], warnings: &mut Warnings) -> IndexedBitmap {
    trace!(
        "decompressing image {:?}, max: [0x{:x}, 0x{:x}]",
        &size,
        data[0].len(),
        data[1].len()
    );
    let mut img = IndexedBitmap::new(size.w, size.h, 0);
    let mut positions: [Option<Bits>; 2] = [Some((data[0], 0)), Some((data[1], 0))];
    let mut line = vec![0; size.w];
    for y in 0..size.h {
        let odd = y % 2;
        if let Some(pos) = positions[odd] {
            write_bytes(&mut line, 0);
            match scan_line(pos, &mut line) {
                Ok(next) => positions[odd] = Some(next),
                Err(msg) => {
                    warnings.warn(format!("RLE line {}: {}", y, msg));
                    positions[odd] = None;
                }
            }
            for (x, &px) in line.iter().enumerate() {
                img.set(x, y, px);
            }
        }
    }
    img
}

/// Even and odd scan lines of a compressed image.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RleStream {
    /// Lines 0, 2, 4, ...
    pub even: Vec<u8>,
    /// Lines 1, 3, 5, ...
    pub odd: Vec<u8>,
}

/// Accumulates nibbles into bytes.
#[derive(Default)]
struct NibbleWriter {
    bytes: Vec<u8>,
    half: bool,
}

impl NibbleWriter {
    fn push(&mut self, nibble: u8) {
        if self.half {
            if let Some(last) = self.bytes.last_mut() {
                *last |= nibble & 0x0f;
            }
        } else {
            self.bytes.push(nibble << 4);
        }
        self.half = !self.half;
    }

    /// Write the low `nibbles * 4` bits of `code`, most significant first.
    fn push_code(&mut self, code: u16, nibbles: u32) {
        for n in (0..nibbles).rev() {
            self.push(((code >> (4 * n)) & 0x0f) as u8);
        }
    }

    /// Write one run using the shortest code that fits.  `len` must be
    /// between 1 and 255.
    fn push_run(&mut self, len: u16, color: u8) {
        debug_assert!((1..=255).contains(&len));
        let code = len << 2 | u16::from(color);
        let nibbles = match len {
            1..=3 => 1,
            4..=15 => 2,
            16..=63 => 3,
            _ => 4,
        };
        self.push_code(code, nibbles);
    }

    /// Fill the rest of the line with `color`.
    fn push_end_of_line(&mut self, color: u8) {
        self.push_code(u16::from(color), 4);
    }

    /// Pad to a byte boundary.
    fn align(&mut self) {
        self.half = false;
    }
}

/// Compress `bitmap`, which may only use colors 0 to 3.
pub fn compress(bitmap: &IndexedBitmap) -> Result<RleStream> {
    if let Some(&bad) = bitmap.pixels().iter().find(|&&px| px > 3) {
        return Err(Error::TooManyColors {
            index: bad,
            limit: 4,
        });
    }

    let mut fields = [NibbleWriter::default(), NibbleWriter::default()];
    let width = bitmap.width();
    for y in 0..bitmap.height() {
        let out = &mut fields[y % 2];
        let row = bitmap.row(y);
        let mut x = 0;
        while x < width {
            let color = row[x];
            let len = row[x..].iter().take_while(|&&px| px == color).count();
            if x + len == width {
                // Runs which reach the right edge always use the
                // end-of-line code.
                out.push_end_of_line(color);
                break;
            }
            x += len;
            let mut len = len;
            while len > 255 {
                out.push_run(255, color);
                len -= 255;
            }
            // The loop above leaves `len` between 1 and 255.
            out.push_run(len as u16, color);
        }
        out.align();
    }

    let [mut even, mut odd] = fields;
    for field in [&mut even, &mut odd] {
        field.push_end_of_line(0);
        field.align();
    }
    Ok(RleStream {
        even: even.bytes,
        odd: odd.bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bitmap: &IndexedBitmap, rle: &RleStream) -> (IndexedBitmap, Warnings) {
        let mut warnings = Warnings::new();
        let decoded = decompress(bitmap.size(), [&rle.even, &rle.odd], &mut warnings);
        (decoded, warnings)
    }

    #[test]
    fn parse_codes() {
        // 1 nibble: 3 pixels of color 2.
        let (_, run) = rle((&[0b1110_0000][..], 0)).unwrap();
        assert_eq!((run.cnt, run.val), (3, 2));
        // 2 nibbles: 4 pixels of color 1.
        let (_, run) = rle((&[0b0001_0001][..], 0)).unwrap();
        assert_eq!((run.cnt, run.val), (4, 1));
        // 3 nibbles: 16 pixels of color 3.
        let (_, run) = rle((&[0b0000_0100, 0b0011_0000][..], 0)).unwrap();
        assert_eq!((run.cnt, run.val), (16, 3));
        // 4 nibbles: 255 pixels of color 0.
        let (_, run) = rle((&[0b0000_0011, 0b1111_1100][..], 0)).unwrap();
        assert_eq!((run.cnt, run.val), (255, 0));
        // End of line in color 1.
        let (_, run) = rle((&[0x00, 0x01][..], 0)).unwrap();
        assert_eq!((run.cnt, run.val), (0, 1));
    }

    #[test]
    fn two_by_two_round_trip() {
        let bitmap = IndexedBitmap::new(2, 2, 1);
        let rle = compress(&bitmap).unwrap();
        // One end-of-line code per line, then the terminating code.
        assert_eq!(rle.even, vec![0x00, 0x01, 0x00, 0x00]);
        assert_eq!(rle.odd, vec![0x00, 0x01, 0x00, 0x00]);
        let (decoded, warnings) = decode(&bitmap, &rle);
        assert_eq!(decoded, bitmap);
        assert!(warnings.is_empty());
    }

    #[test]
    fn picks_shortest_codes() {
        let mut data = vec![];
        data.extend(vec![1; 3]);
        data.extend(vec![2; 10]);
        data.extend(vec![3; 40]);
        data.extend(vec![0; 200]);
        data.push(1);
        let bitmap = IndexedBitmap::from_raw(data.len(), 1, data).unwrap();
        let rle = compress(&bitmap).unwrap();
        assert_eq!(
            rle.even,
            vec![
                0b1101_0010, // 3 x 1, then the first nibble of 10 x 2
                0b1010_0000, // rest of 10 x 2, first nibble of 40 x 3
                0b1010_0011, // rest of 40 x 3
                0b0000_0011, // 200 x 0
                0b0010_0000,
                0x00, // end of line in color 1
                0x01,
                0x00, // terminating code
                0x00,
            ]
        );
        let (decoded, _) = decode(&bitmap, &rle);
        assert_eq!(decoded, bitmap);
    }

    #[test]
    fn long_runs_are_split() {
        let mut data = vec![2; 600];
        data.push(0);
        let bitmap = IndexedBitmap::from_raw(601, 1, data).unwrap();
        let rle = compress(&bitmap).unwrap();
        let (decoded, warnings) = decode(&bitmap, &rle);
        assert_eq!(decoded, bitmap);
        assert!(warnings.is_empty());
    }

    #[test]
    fn round_trip_with_interlacing() {
        let (w, h) = (37, 9);
        let data = (0..w * h)
            .map(|i| ((i / 5 + i / w) % 4) as u8)
            .collect::<Vec<_>>();
        let bitmap = IndexedBitmap::from_raw(w, h, data).unwrap();
        let rle = compress(&bitmap).unwrap();
        let (decoded, warnings) = decode(&bitmap, &rle);
        assert_eq!(decoded, bitmap);
        assert!(warnings.is_empty());
    }

    #[test]
    fn rejects_too_many_colors() {
        let bitmap = IndexedBitmap::from_raw(2, 1, vec![1, 4]).unwrap();
        assert!(compress(&bitmap).is_err());
    }

    #[test]
    fn truncated_data_warns_instead_of_failing() {
        let bitmap = IndexedBitmap::new(50, 4, 3);
        let rle = compress(&bitmap).unwrap();
        let mut warnings = Warnings::new();
        // Drop the odd field entirely.
        let decoded = decompress(bitmap.size(), [&rle.even, &[]], &mut warnings);
        assert_eq!(warnings.count(), 1);
        assert_eq!(decoded.row(0), bitmap.row(0));
        assert_eq!(decoded.row(2), bitmap.row(2));
        assert!(decoded.row(1).iter().all(|&px| px == 0));
        assert!(decoded.row(3).iter().all(|&px| px == 0));
    }

    #[test]
    fn overlong_runs_are_clamped() {
        // 16 pixels of color 3 on a 10 pixel line.
        let even = [0b0000_0100, 0b0011_0000];
        let mut warnings = Warnings::new();
        let decoded = decompress(Size { w: 10, h: 1 }, [&even, &[]], &mut warnings);
        assert_eq!(warnings.count(), 1);
        assert!(decoded.pixels().iter().all(|&px| px == 3));
    }
}
