//! A single type covering every kind of subtitle stream we can read.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::bitmap::Size;
use crate::errors::{Error, Result, Warnings};
use crate::frame::{DecodedPicture, SubtitleFrame};
use crate::palette::{ColorSpace, DvdPalette};
use crate::pgs::SupBdStream;
use crate::probe::{is_idx_file, is_ifo_file, is_sub_file, is_sup_bd_file, is_sup_dvd_file};
use crate::sub::VobSubStream;
use crate::sup_dvd::SupDvdStream;
use crate::time::{FPS_24P, FPS_NTSC, FPS_PAL};

/// The container formats we support.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StreamKind {
    /// An `*.idx` file and a `*.sub` file.
    #[default]
    VobSub,
    /// A DVD `*.sup` file, usually with an `*.ifo` file.
    SupDvd,
    /// A Blu-ray `*.sup` file.
    SupBd,
}

impl StreamKind {
    /// Guess the kind of stream stored at `path`, returning the path of the
    /// file which should actually be opened.  `*.sub` files redirect to
    /// their `*.idx` file, and `*.ifo` files to their `*.sup` file.
    pub fn probe<P: AsRef<Path>>(path: P) -> Result<(StreamKind, PathBuf)> {
        let path = path.as_ref();
        if is_idx_file(path)? {
            Ok((StreamKind::VobSub, path.to_owned()))
        } else if is_sub_file(path)? {
            Ok((StreamKind::VobSub, path.with_extension("idx")))
        } else if is_sup_bd_file(path)? {
            Ok((StreamKind::SupBd, path.to_owned()))
        } else if is_sup_dvd_file(path)? {
            Ok((StreamKind::SupDvd, path.to_owned()))
        } else if is_ifo_file(path)? {
            Ok((StreamKind::SupDvd, path.with_extension("sup")))
        } else {
            Err(Error::BadMagic {
                what: "subtitle file",
            })
        }
    }

    /// Is this a 4-color DVD format?
    pub fn is_dvd(self) -> bool {
        matches!(self, StreamKind::VobSub | StreamKind::SupDvd)
    }
}

/// A decoded subtitle stream of any supported kind.
#[derive(Debug, Clone)]
pub enum SubtitleStream {
    /// VobSub subtitles.
    VobSub(VobSubStream),
    /// DVD SUP subtitles.
    SupDvd(SupDvdStream),
    /// Blu-ray SUP subtitles.
    SupBd(SupBdStream),
}

impl SubtitleStream {
    /// Open any supported stream.  Blu-ray palettes are interpreted using
    /// `space`.
    pub fn open<P: AsRef<Path>>(
        path: P,
        space: ColorSpace,
        warnings: &mut Warnings,
    ) -> Result<SubtitleStream> {
        let (kind, path) = StreamKind::probe(path)?;
        debug!("opening {} as {:?}", path.display(), kind);
        Ok(match kind {
            StreamKind::VobSub => SubtitleStream::VobSub(VobSubStream::open(&path, warnings)?),
            StreamKind::SupDvd => SubtitleStream::SupDvd(SupDvdStream::open(&path, warnings)?),
            StreamKind::SupBd => {
                SubtitleStream::SupBd(SupBdStream::open(&path, space, warnings)?)
            }
        })
    }

    /// What kind of stream is this?
    pub fn kind(&self) -> StreamKind {
        match self {
            SubtitleStream::VobSub(_) => StreamKind::VobSub,
            SubtitleStream::SupDvd(_) => StreamKind::SupDvd,
            SubtitleStream::SupBd(_) => StreamKind::SupBd,
        }
    }

    /// The number of subtitles.
    pub fn len(&self) -> usize {
        match self {
            SubtitleStream::VobSub(s) => s.len(),
            SubtitleStream::SupDvd(s) => s.len(),
            SubtitleStream::SupBd(s) => s.len(),
        }
    }

    /// Are there no subtitles?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Metadata for subtitle `i`.
    pub fn frame(&self, i: usize) -> &SubtitleFrame {
        match self {
            SubtitleStream::VobSub(s) => s.frame(i),
            SubtitleStream::SupDvd(s) => s.frame(i),
            SubtitleStream::SupBd(s) => s.frame(i),
        }
    }

    /// The image, palette and metadata for subtitle `i`.  The result is a
    /// fresh copy, which callers may modify freely.
    pub fn decode(&self, i: usize) -> DecodedPicture {
        match self {
            SubtitleStream::VobSub(s) => s.decode(i),
            SubtitleStream::SupDvd(s) => s.decode(i),
            SubtitleStream::SupBd(s) => s.decode(i),
        }
    }

    /// The screen size.
    pub fn screen(&self) -> Size {
        match self {
            SubtitleStream::VobSub(s) => s.index().size(),
            SubtitleStream::SupDvd(s) => s.screen(),
            SubtitleStream::SupBd(s) => s.screen(),
        }
    }

    /// The 16-color palette of DVD streams.
    pub fn dvd_palette(&self) -> Option<&DvdPalette> {
        match self {
            SubtitleStream::VobSub(s) => Some(s.index().palette()),
            SubtitleStream::SupDvd(s) => Some(s.palette()),
            SubtitleStream::SupBd(_) => None,
        }
    }

    /// The stream's language code, if it records one.
    pub fn language(&self) -> Option<&str> {
        match self {
            SubtitleStream::VobSub(s) => Some(s.index().language()),
            SubtitleStream::SupDvd(s) => s.language(),
            SubtitleStream::SupBd(_) => None,
        }
    }

    /// The frame rate of the stream.  Only Blu-ray streams record one, so
    /// DVD streams are assumed to match their screen height.
    pub fn fps(&self) -> f64 {
        match self {
            SubtitleStream::SupBd(s) => s.fps().unwrap_or(FPS_24P),
            _ if self.screen().h == 480 => FPS_NTSC,
            _ => FPS_PAL,
        }
    }
}
