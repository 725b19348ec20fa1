//! Miscellaneous utilities.

use std::fmt;

use crate::errors::{Error, Result};

/// Wrapper to force a `&[u8]` to display as nicely-formatted hexadecimal
/// bytes with only the the first line or so of bytes shown.
pub struct BytesFormatter<'a>(pub &'a [u8]);

impl<'a> fmt::Debug for BytesFormatter<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let BytesFormatter(bytes) = *self;
        for byte in bytes.iter().take(16) {
            write!(f, "{:02x} ", byte)?;
        }
        write!(f, "({} bytes)", bytes.len())?;
        Ok(())
    }
}

/// Append a big-endian `u16` to `out`.
pub fn push_be_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Append a big-endian `u16` to `out`, failing if `value` doesn't fit.
pub fn push_be_u16_checked(out: &mut Vec<u8>, value: usize, what: &str) -> Result<()> {
    let value = cast::u16(value)
        .map_err(|_| Error::too_large(format!("{} 0x{:x} exceeds 16 bits", what, value)))?;
    push_be_u16(out, value);
    Ok(())
}

/// Overwrite two bytes of `out` at `offset` with a big-endian `u16`.
pub fn patch_be_u16(out: &mut [u8], offset: usize, value: u16) {
    out[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

#[test]
fn be_helpers() {
    let mut out = vec![];
    push_be_u16(&mut out, 0x1234);
    push_be_u16_checked(&mut out, 0xabcd, "test").unwrap();
    assert!(push_be_u16_checked(&mut out, 0x10000, "test").is_err());
    patch_be_u16(&mut out, 0, 0x5678);
    assert_eq!(out, vec![0x56, 0x78, 0xab, 0xcd]);
}
