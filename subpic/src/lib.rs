//! This crate reads, transforms and writes bitmap subtitles in three
//! container formats:
//!
//! - **VobSub**, an `*.idx` text file describing the subtitles, and a
//!   `*.sub` MPEG-2 Program Stream containing the actual subtitle packets.
//! - **DVD SUP**, a bare sequence of subtitle packets, usually with an
//!   `*.ifo` file holding the screen size and palette.
//! - **Blu-ray SUP**, a sequence of Presentation Graphic Stream segments.
//!
//! Subtitles are decoded into a `SubtitleFrame` (screen placement and
//! timing), an `IndexedBitmap` and a `Palette`.  These can be scaled,
//! requantized, retimed and written to any of the supported formats.
//!
//! ## Example code
//!
//! ```no_run
//! use subpic::{ColorSpace, SubtitleStream, Warnings};
//!
//! let mut warnings = Warnings::new();
//! let stream = SubtitleStream::open("movie.idx", ColorSpace::Bt601, &mut warnings).unwrap();
//! for i in 0..stream.len() {
//!     let picture = stream.decode(i);
//!     let frame = &picture.frame;
//!     println!("Time: {}-{}", frame.start(), frame.end());
//!     println!("Always show: {:?}", frame.forced());
//!     let coords = frame.coordinates();
//!     println!("At: {}, {}", coords.left(), coords.top());
//!     println!("Size: {}x{}", coords.width(), coords.height());
//!     let img = picture.bitmap.to_rgba_image(&picture.palette);
//!
//!     // You can save or manipulate `img` using the APIs provided by the Rust
//!     // `image` crate.
//! #   drop(img);
//! }
//! ```
//!
//! To convert a whole file, see `convert_files` and `ConvertOptions`.
//!
//! ## Performance
//!
//! Performance in debug mode is poor, especially when scaling or
//! requantizing; compile with `--release` before benchmarking.
//!
//! ## Background & References
//!
//! Useful references include:
//!
//! - [Program Stream](https://en.wikipedia.org/wiki/MPEG_program_stream) (PS)
//! - [Packetized Elementary Stream][PES] (PES)
//! - [DVD subtitles](http://sam.zoy.org/writings/dvd/subtitles/)
//! - [System Time Clock](http://www.bretl.com/mpeghtml/STC.HTM)
//! - [Presentation Graphic Stream](http://blog.thescorpius.com/index.php/2017/07/15/presentation-graphic-stream-sup-files-bluray-subtitle-format/)
//!
//! [PES]: http://dvd.sourceforge.net/dvdinfo/pes-hdr.html
//!
//! ## Contributing
//!
//! Your feedback and contributions are welcome!  Please see
//! [GitHub](https://github.com/emk/subtitles-rs) for details.

#![warn(missing_docs)]

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

mod bitmap;
mod convert;
mod errors;
mod frame;
mod idx;
pub mod ifo;
mod mpeg2;
mod palette;
pub mod pgs;
mod probe;
pub mod resample;
mod rle;
mod spu;
mod stream;
mod sub;
mod sup_dvd;
mod time;
mod util;

pub use self::bitmap::{Bounds, IndexedBitmap, Size};
pub use self::convert::{
    convert_files, save_companion_files, spawn_conversion, ConversionHandle, ConversionOutput,
    ConversionReport, ConvertOptions, ErasePatch, ForcedPolicy, Session,
};
pub use self::errors::{Error, Result, Warnings};
pub use self::frame::{
    ColorUpdate, Coordinates, DecodedPicture, DvdColors, Rect, SubtitleFrame,
};
pub use self::idx::{Index, IndexEntry};
pub use self::ifo::IfoInfo;
pub use self::palette::{
    default_dvd_palette, dvd_palette_to_palette, parse_palette_text, rgb_to_ycbcr,
    write_palette_text, ycbcr_to_rgb, ColorSpace, DvdPalette, Palette,
};
pub use self::pgs::{SupBdStream, SupBdWriter};
pub use self::probe::{
    is_idx_file, is_ifo_file, is_sub_file, is_sup_bd_file, is_sup_dvd_file,
};
pub use self::resample::{resample, PaletteMode, ResampleOptions, ScaleFilter};
pub use self::stream::{StreamKind, SubtitleStream};
pub use self::sub::{demux, RawSpu, VobSubStream, VobSubWriter};
pub use self::sup_dvd::{SupDvdStream, SupDvdWriter};
pub use self::time::{
    convert_fps, frame_duration, ms_to_pts, parse_fps, pts_to_ms, same_fps, sync_time_pts,
    FPS_24, FPS_24P, FPS_NTSC, FPS_NTSC_I, FPS_PAL, FPS_PAL_I, TICKS_PER_SECOND,
};

