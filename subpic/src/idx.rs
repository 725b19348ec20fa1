//! Read and write files in `*.idx` format.

use image::Rgb;
use nom::bytes::complete::tag;
use nom::character::complete::{one_of, space0};
use nom::combinator::map_opt;
use nom::multi::separated_list1;
use nom::sequence::pair;
use nom::IResult;
use regex::Regex;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::bitmap::Size;
use crate::errors::{Error, IResultExt, Result};
use crate::palette::{default_dvd_palette, DvdPalette};
use crate::time::{ms_to_pts, IdxTime};

/// Parse a single hexadecimal digit.
fn hex_digit(i: &[u8]) -> IResult<&[u8], u8> {
    map_opt(one_of("0123456789abcdefABCDEF"), |c: char| {
        c.to_digit(16).and_then(|d| cast::u8(d).ok())
    })(i)
}

/// Parse a single byte hexadecimal byte.
fn hex_u8(i: &[u8]) -> IResult<&[u8], u8> {
    let (i, h1) = hex_digit(i)?;
    let (i, h2) = hex_digit(i)?;
    Ok((i, h1 << 4 | h2))
}

/// Parse a 3-byte hexadecimal RGB color.
fn rgb(i: &[u8]) -> IResult<&[u8], Rgb<u8>> {
    let (i, r) = hex_u8(i)?;
    let (i, g) = hex_u8(i)?;
    let (i, b) = hex_u8(i)?;
    Ok((i, Rgb([r, g, b])))
}

#[test]
fn parse_rgb() {
    assert_eq!(
        rgb(&b"1234ab"[..]).unwrap(),
        (&b""[..], Rgb::<u8>([0x12, 0x34, 0xab]))
    );
}

/// Parse the 16 comma-separated colors of a palette.
fn palette(i: &[u8]) -> IResult<&[u8], DvdPalette> {
    map_opt(separated_list1(pair(tag(","), space0), rgb), |vec| {
        if vec.len() != 16 {
            return None;
        }
        let mut result = [Rgb([0, 0, 0]); 16];
        result.copy_from_slice(&vec);
        Some(result)
    })(i)
}

#[test]
fn parse_palette() {
    let input = b"\
000000, f0f0f0, cccccc, 999999, 3333fa, 1111bb, fa3333, bb1111, \
33fa33, 11bb11, fafa33, bbbb11, fa33fa, bb11bb, 33fafa, 11bbbb";
    assert_eq!(palette(input).unwrap(), (&[][..], default_dvd_palette()));
    assert!(palette(b"000000, f0f0f0").is_err());
}

/// Parse `hh:mm:ss:mmm`, possibly negative, as 90kHz ticks.
fn parse_time(text: &str) -> Result<i64> {
    lazy_static! {
        static ref TIME: Regex = Regex::new(r"^(-)?(\d+):(\d+):(\d+):(\d+)$").unwrap();
    }
    let text = text.trim();
    let cap = TIME
        .captures(text)
        .ok_or_else(|| Error::parse(format!("bad timestamp {:?}", text)))?;
    let mut parts = [0i64; 4];
    for (part, group) in parts.iter_mut().zip(2usize..6) {
        *part = cap[group]
            .parse()
            .map_err(|_| Error::parse(format!("bad timestamp {:?}", text)))?;
    }
    let [h, m, s, ms] = parts;
    let ms = ((h * 60 + m) * 60 + s) * 1000 + ms;
    let sign = if cap.get(1).is_some() { -1 } else { 1 };
    Ok(ms_to_pts(sign * ms))
}

/// Parse a millisecond count, or a timestamp.
fn parse_ms_or_time(text: &str) -> Result<i64> {
    match text.trim().parse::<i64>() {
        Ok(ms) => Ok(ms_to_pts(ms)),
        Err(_) => parse_time(text),
    }
}

/// One subtitle listed in an `*.idx` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Start time in 90kHz ticks, with all offsets and delays applied.
    pub timestamp: i64,
    /// Byte offset of the subtitle's first pack in the `*.sub` file.
    pub filepos: u64,
}

/// A `*.idx` file describing the subtitles in a `*.sub` file.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    size: Size,
    origin: (i32, i32),
    palette: DvdPalette,
    language: String,
    stream_index: u8,
    time_offset: i64,
    forced_only: bool,
    entries: Vec<IndexEntry>,
}

impl Index {
    /// Create an empty index for a screen of `size`.
    pub fn new(size: Size, palette: DvdPalette) -> Index {
        Index {
            size,
            origin: (0, 0),
            palette,
            language: "en".to_owned(),
            stream_index: 0,
            time_offset: 0,
            forced_only: false,
            entries: vec![],
        }
    }

    /// Parse the text of an `*.idx` file.
    pub fn parse(text: &str) -> Result<Index> {
        lazy_static! {
            static ref KEY_VALUE: Regex = Regex::new("^([A-Za-z/ ]+): (.*)").unwrap();
            static ref TIMESTAMP: Regex =
                Regex::new(r"^\s*(-?[0-9:]+)\s*,\s*filepos:\s*([0-9a-fA-F]+)\s*$").unwrap();
            static ref ID: Regex = Regex::new(r"^\s*([A-Za-z-]*)\s*(?:,\s*index:\s*(\d+))?").unwrap();
        }

        let mut size = None;
        let mut palette_val: Option<DvdPalette> = None;
        let mut index = Index::new(Size { w: 720, h: 480 }, default_dvd_palette());
        let mut delay = 0;
        let mut ids_seen = 0;

        for line in text.lines() {
            let Some(cap) = KEY_VALUE.captures(line.trim_end()) else {
                continue;
            };
            let key = cap.get(1).map_or("", |m| m.as_str());
            let val = cap.get(2).map_or("", |m| m.as_str()).trim();
            match key {
                "size" => {
                    let (w, h) = val
                        .split_once('x')
                        .ok_or_else(|| Error::parse(format!("bad size {:?}", val)))?;
                    let w = w.trim().parse().map_err(|_| Error::parse(val))?;
                    let h = h.trim().parse().map_err(|_| Error::parse(val))?;
                    size = Some(Size { w, h });
                }
                "org" => {
                    let (x, y) = val
                        .split_once(',')
                        .ok_or_else(|| Error::parse(format!("bad origin {:?}", val)))?;
                    index.origin = (
                        x.trim().parse().map_err(|_| Error::parse(val))?,
                        y.trim().parse().map_err(|_| Error::parse(val))?,
                    );
                }
                "palette" => {
                    palette_val = Some(palette(val.as_bytes()).to_subpic_result()?);
                }
                "time offset" => index.time_offset = parse_ms_or_time(val)?,
                "delay" => delay += parse_ms_or_time(val)?,
                "forced subs" => index.forced_only = val.eq_ignore_ascii_case("on"),
                "id" => {
                    ids_seen += 1;
                    if ids_seen == 1 {
                        if let Some(id) = ID.captures(val) {
                            if let Some(lang) = id.get(1).filter(|m| !m.as_str().is_empty()) {
                                index.language = lang.as_str().to_owned();
                            }
                            if let Some(n) = id.get(2) {
                                index.stream_index =
                                    n.as_str().parse().map_err(|_| Error::parse(val))?;
                            }
                        }
                    } else {
                        debug!("ignoring additional subtitle stream {:?}", val);
                    }
                }
                "timestamp" => {
                    if ids_seen > 1 {
                        continue;
                    }
                    let ts = TIMESTAMP
                        .captures(val)
                        .ok_or_else(|| Error::parse(format!("bad timestamp line {:?}", val)))?;
                    let timestamp = parse_time(&ts[1])?;
                    let filepos = u64::from_str_radix(&ts[2], 16)
                        .map_err(|_| Error::parse(format!("bad filepos {:?}", &ts[2])))?;
                    index.entries.push(IndexEntry {
                        timestamp: timestamp + index.time_offset + delay,
                        filepos,
                    });
                }
                _ => trace!("Unimplemented idx key: {}", key),
            }
        }

        index.size = size.ok_or(Error::MissingKey { key: "size" })?;
        index.palette = palette_val.ok_or(Error::MissingKey { key: "palette" })?;
        Ok(index)
    }

    /// Open and parse an `*.idx` file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Index> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| Error::ReadFile {
            path: path.to_owned(),
            source,
        })?;
        Index::parse(&text)
    }

    /// The screen size.
    pub fn size(&self) -> Size {
        self.size
    }

    /// The offset applied to every subtitle position.
    pub fn origin(&self) -> (i32, i32) {
        self.origin
    }

    /// Get the palette associated with this `*.idx` file.
    pub fn palette(&self) -> &DvdPalette {
        &self.palette
    }

    /// The two-letter language code of the subtitle stream.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Set the language code written by `to_idx_string`.
    pub fn set_language<S: Into<String>>(&mut self, language: S) {
        self.language = language.into();
    }

    /// The stream number, which selects the PES substream `0x20 + n`.
    pub fn stream_index(&self) -> u8 {
        self.stream_index
    }

    /// Are only forced subtitles meant to be shown?
    pub fn forced_only(&self) -> bool {
        self.forced_only
    }

    /// The subtitles listed in this file.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Record a subtitle.
    pub fn push_entry(&mut self, entry: IndexEntry) {
        self.entries.push(entry);
    }

    /// Format as a version 7 `*.idx` file.
    pub fn to_idx_string(&self) -> String {
        let mut out = String::new();
        // Writing to a `String` cannot fail, so we ignore the results.
        let _ = writeln!(out, "# VobSub index file, v7 (do not modify this line!)");
        let _ = writeln!(out, "#");
        let _ = writeln!(out, "# Generated by subpic {}", env!("CARGO_PKG_VERSION"));
        let _ = writeln!(out);
        let _ = writeln!(out, "size: {}x{}", self.size.w, self.size.h);
        let _ = writeln!(out, "org: {}, {}", self.origin.0, self.origin.1);
        let _ = writeln!(out, "scale: 100%, 100%");
        let _ = writeln!(out, "alpha: 100%");
        let _ = writeln!(out, "smooth: OFF");
        let _ = writeln!(out, "fadein/out: 50, 50");
        let _ = writeln!(out, "align: OFF at LEFT TOP");
        let _ = writeln!(out, "time offset: 0");
        let forced = if self.forced_only { "ON" } else { "OFF" };
        let _ = writeln!(out, "forced subs: {}", forced);
        let colors = self
            .palette
            .iter()
            .map(|c| format!("{:02x}{:02x}{:02x}", c[0], c[1], c[2]))
            .collect::<Vec<_>>();
        let _ = writeln!(out, "palette: {}", colors.join(", "));
        let _ = writeln!(
            out,
            "custom colors: OFF, tridx: 0000, colors: 000000, 000000, 000000, 000000"
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "langidx: 0");
        let _ = writeln!(out, "id: {}, index: {}", self.language, self.stream_index);
        for entry in &self.entries {
            let _ = writeln!(
                out,
                "timestamp: {}, filepos: {:09x}",
                IdxTime(entry.timestamp),
                entry.filepos
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# VobSub index file, v7 (do not modify this line!)
size: 1920x1080
org: 0, 0
time offset: 500
forced subs: OFF
palette: 000000, f0f0f0, cccccc, 999999, 3333fa, 1111bb, fa3333, bb1111, \
33fa33, 11bb11, fafa33, bbbb11, fa33fa, bb11bb, 33fafa, 11bbbb

# English
id: en, index: 0
timestamp: 00:00:49:400, filepos: 000000000
delay: 1000
timestamp: 00:01:00:000, filepos: 000001800
id: fr, index: 1
timestamp: 00:00:10:000, filepos: 000002000
";

    #[test]
    fn parse_index() {
        let idx = Index::parse(SAMPLE).unwrap();
        assert_eq!(idx.size(), Size { w: 1920, h: 1080 });
        assert_eq!(idx.palette()[0], Rgb([0x00, 0x00, 0x00]));
        assert_eq!(idx.palette()[15], Rgb([0x11, 0xbb, 0xbb]));
        assert_eq!(idx.language(), "en");
        assert_eq!(idx.stream_index(), 0);
        assert_eq!(
            idx.entries(),
            &[
                IndexEntry {
                    timestamp: (49_400 + 500) * 90,
                    filepos: 0,
                },
                IndexEntry {
                    timestamp: (60_000 + 500 + 1000) * 90,
                    filepos: 0x1800,
                },
            ]
        );
    }

    #[test]
    fn missing_keys_are_errors() {
        match Index::parse("size: 720x480\n") {
            Err(Error::MissingKey { key: "palette" }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        match Index::parse("palette: 000000\n") {
            Err(Error::Parse { .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn negative_timestamps() {
        assert_eq!(parse_time("-00:00:01:500").unwrap(), -135_000);
    }

    #[test]
    fn write_then_parse() {
        let mut idx = Index::new(Size { w: 720, h: 576 }, default_dvd_palette());
        idx.set_language("de");
        idx.push_entry(IndexEntry {
            timestamp: 90 * 3_723_456,
            filepos: 0x2800,
        });
        let text = idx.to_idx_string();
        assert!(text.starts_with("# VobSub index file, v7"));
        assert!(text.contains("timestamp: 01:02:03:456, filepos: 000002800"));
        assert_eq!(Index::parse(&text).unwrap(), idx);
    }
}
