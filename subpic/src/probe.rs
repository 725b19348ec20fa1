//! Try to guess the types of files on disk.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use crate::errors::{Error, Result};
use crate::ifo::IFO_MAGIC;
use crate::pgs::segment::PGS_MAGIC;
use crate::sup_dvd::SUP_DVD_MAGIC;

/// Internal helper function which looks for "magic" bytes at the start of
/// a file.  Files shorter than `magic` never match.
fn has_magic(path: &Path, magic: &[u8]) -> Result<bool> {
    let mkerr = |source| Error::ReadFile {
        path: path.to_owned(),
        source,
    };
    let mut f = fs::File::open(path).map_err(mkerr)?;
    let mut bytes = vec![0; magic.len()];
    match f.read_exact(&mut bytes) {
        Ok(()) => Ok(magic == &bytes[..]),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(mkerr(err)),
    }
}

/// Does the specified path appear to point to an `*.idx` file?
pub fn is_idx_file<P: AsRef<Path>>(path: P) -> Result<bool> {
    has_magic(path.as_ref(), b"# VobSub index file")
}

/// Does the specified path appear to point to a `*.sub` file?
///
/// Note that this may (or may not) return false positives for certain
/// MPEG-2 related formats.
pub fn is_sub_file<P: AsRef<Path>>(path: P) -> Result<bool> {
    has_magic(path.as_ref(), &[0x00, 0x00, 0x01, 0xba])
}

/// Does the specified path appear to point to a Blu-ray `*.sup` file?
pub fn is_sup_bd_file<P: AsRef<Path>>(path: P) -> Result<bool> {
    has_magic(path.as_ref(), PGS_MAGIC)
}

/// Does the specified path appear to point to a DVD `*.sup` file?
pub fn is_sup_dvd_file<P: AsRef<Path>>(path: P) -> Result<bool> {
    has_magic(path.as_ref(), SUP_DVD_MAGIC)
}

/// Does the specified path appear to point to a DVD `*.ifo` file?
pub fn is_ifo_file<P: AsRef<Path>>(path: P) -> Result<bool> {
    has_magic(path.as_ref(), IFO_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_file(name: &str, contents: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("subpic-probe-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn probe_files() {
        let idx = scratch_file("tiny.idx", b"# VobSub index file, v7 (do not modify this line!)\n");
        let sub = scratch_file("tiny.sub", &[0x00, 0x00, 0x01, 0xba, 0x44]);
        let bd = scratch_file("bd.sup", b"PG\0\0");
        let dvd = scratch_file("dvd.sup", b"SP\0\0");
        let ifo = scratch_file("VTS_01_0.IFO", b"DVDVIDEO-VTS\0\0");
        let short = scratch_file("short", b"P");

        assert!(is_idx_file(&idx).unwrap());
        assert!(!is_idx_file(&sub).unwrap());
        assert!(is_sub_file(&sub).unwrap());
        assert!(!is_sub_file(&idx).unwrap());
        assert!(is_sup_bd_file(&bd).unwrap());
        assert!(!is_sup_bd_file(&dvd).unwrap());
        assert!(is_sup_dvd_file(&dvd).unwrap());
        assert!(is_ifo_file(&ifo).unwrap());
        assert!(!is_sup_bd_file(&short).unwrap());
        assert!(is_idx_file(idx.with_extension("missing")).is_err());
    }
}
