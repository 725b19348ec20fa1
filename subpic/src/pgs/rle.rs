//! 8-bit run-length encoding used by Blu-ray subtitle objects.
//!
//! ```text
//! CC                  one pixel of color CC (CC != 0)
//! 00 00               end of line
//! 00 0L               L pixels of color 0, L < 64
//! 00 4L LL            L pixels of color 0, L < 16384
//! 00 8L CC            L pixels of color CC, L < 64
//! 00 CL LL CC         L pixels of color CC, L < 16384
//! ```

use crate::bitmap::IndexedBitmap;
use crate::errors::Warnings;

/// The longest run one code can hold.
const MAX_RUN: usize = 0x3fff;

/// Decode `data` into a `width` by `height` bitmap.  Damaged data is
/// reported through `warnings`, and whatever we could not decode is left as
/// color 0.
pub fn decode(width: usize, height: usize, data: &[u8], warnings: &mut Warnings) -> IndexedBitmap {
    let mut bitmap = IndexedBitmap::new(width, height, 0);
    let mut bytes = data.iter().copied();
    let (mut x, mut y) = (0, 0);
    let mut overflowed = false;
    while y < height {
        let b = match bytes.next() {
            Some(b) => b,
            None => {
                warnings.warn(format!("object data ended at line {} of {}", y, height));
                break;
            }
        };
        let (len, color) = if b != 0 {
            (1, b)
        } else {
            let code = match bytes.next() {
                Some(code) => code,
                None => {
                    warnings.warn("object data ended inside a run");
                    break;
                }
            };
            if code == 0 {
                x = 0;
                y += 1;
                continue;
            }
            let mut len = usize::from(code & 0x3f);
            if code & 0x40 != 0 {
                len = len << 8 | usize::from(bytes.next().unwrap_or(0));
            }
            let color = if code & 0x80 != 0 {
                bytes.next().unwrap_or(0)
            } else {
                0
            };
            (len, color)
        };
        let end = x + len;
        if end > width && !overflowed {
            warnings.warn(format!("run overflows line {} of object", y));
            overflowed = true;
        }
        for px in x..end.min(width) {
            bitmap.set(px, y, color);
        }
        x = end.min(width);
    }
    if bytes.next().is_some() {
        warnings.warn("ignoring extra data after the last line of object");
    }
    bitmap
}

fn push_run(out: &mut Vec<u8>, color: u8, len: usize) {
    debug_assert!(len > 0 && len <= MAX_RUN);
    match (color, len) {
        (0, len) if len < 64 => out.extend_from_slice(&[0, len as u8]),
        (0, len) => out.extend_from_slice(&[0, 0x40 | (len >> 8) as u8, len as u8]),
        (color, len) if len < 3 => {
            for _ in 0..len {
                out.push(color);
            }
        }
        (color, len) if len < 64 => out.extend_from_slice(&[0, 0x80 | len as u8, color]),
        (color, len) => out.extend_from_slice(&[0, 0xc0 | (len >> 8) as u8, len as u8, color]),
    }
}

/// Encode a bitmap, one line at a time.
pub fn encode(bitmap: &IndexedBitmap) -> Vec<u8> {
    let mut out = vec![];
    for y in 0..bitmap.height() {
        let row = bitmap.row(y);
        let mut x = 0;
        while x < row.len() {
            let color = row[x];
            let len = row[x..]
                .iter()
                .take(MAX_RUN)
                .take_while(|&&c| c == color)
                .count();
            push_run(&mut out, color, len);
            x += len;
        }
        out.extend_from_slice(&[0, 0]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortest_codes() {
        let data = vec![
            0, 5, 5, 7, //
            9, 9, 9, 9, //
        ];
        let bitmap = IndexedBitmap::from_raw(4, 2, data).unwrap();
        assert_eq!(
            encode(&bitmap),
            vec![0x00, 0x01, 5, 5, 7, 0, 0, 0x00, 0x84, 9, 0, 0]
        );
    }

    #[test]
    fn long_runs() {
        let mut bitmap = IndexedBitmap::new(20_000, 2, 0);
        for x in 0..300 {
            bitmap.set(x, 1, 4);
        }
        let encoded = encode(&bitmap);
        assert_eq!(
            &encoded[..6],
            &[0x00, 0x7f, 0xff, 0x00, 0x4e, 0x21][..],
            "color 0 runs are split at 16383"
        );
        let mut warnings = Warnings::new();
        let decoded = decode(20_000, 2, &encoded, &mut warnings);
        assert!(warnings.is_empty());
        assert_eq!(decoded, bitmap);
    }

    #[test]
    fn truncated_data() {
        let mut warnings = Warnings::new();
        let decoded = decode(2, 2, &[3, 3, 0, 0, 3], &mut warnings);
        assert_eq!(warnings.count(), 1);
        assert_eq!(decoded.pixels(), &[3, 3, 3, 0]);
    }

    #[test]
    fn overlong_runs_are_clamped() {
        let mut warnings = Warnings::new();
        let decoded = decode(2, 1, &[0, 0x85, 1, 0, 0], &mut warnings);
        assert_eq!(warnings.count(), 1);
        assert_eq!(decoded.pixels(), &[1, 1]);
    }
}
