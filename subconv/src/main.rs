//! Convert bitmap subtitles between VobSub, DVD SUP and Blu-ray SUP
//! formats, optionally dumping every converted subtitle as a PNG file.

use anyhow::{format_err, Context, Result};
use clap::Parser;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use subpic::{
    dvd_palette_to_palette, ifo, parse_fps, save_companion_files, write_palette_text,
    ColorSpace, ConversionOutput, ConvertOptions, DecodedPicture, ForcedPolicy, Palette,
    PaletteMode, ScaleFilter, Session, StreamKind, SubtitleStream, TICKS_PER_SECOND,
};

/// Parse a kebab-case name using the same spelling as our JSON config.
fn parse_name<T: DeserializeOwned>(s: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(s.to_owned())).map_err(|e| e.to_string())
}

fn parse_frame_rate(s: &str) -> Result<f64, String> {
    parse_fps(s).map_err(|e| e.to_string())
}

fn parse_resolution(s: &str) -> Result<[usize; 2], String> {
    let (w, h) = s
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, found {:?}", s))?;
    let w = w.trim().parse::<usize>().map_err(|e| e.to_string())?;
    let h = h.trim().parse::<usize>().map_err(|e| e.to_string())?;
    Ok([w, h])
}

#[derive(Debug, Parser)]
#[command(name = "subconv", version, about)]
struct Args {
    /// Input `*.idx`, `*.sub`, `*.sup` or `*.ifo` file.
    input: PathBuf,

    /// Output file.  `*.idx` or `*.sub` writes VobSub, and `*.sup` writes
    /// Blu-ray SUP unless `--dvd-sup` is given.
    output: PathBuf,

    /// Load base options from a JSON file.
    #[arg(long, value_name = "JSON")]
    config: Option<PathBuf>,

    /// Write a DVD `*.sup` file and its `*.ifo` file.
    #[arg(long)]
    dvd_sup: bool,

    /// Target screen size, such as `720x576`.
    #[arg(long, value_parser = parse_resolution, value_name = "WxH")]
    resolution: Option<[usize; 2]>,

    /// Scaling filter: bilinear, triangle, bell, b-spline, hermite,
    /// lanczos3, mitchell or bicubic.
    #[arg(long, value_parser = parse_name::<ScaleFilter>)]
    filter: Option<ScaleFilter>,

    /// Palette handling for Blu-ray output: keep, reduce-luma or
    /// requantize.
    #[arg(long, value_parser = parse_name::<PaletteMode>)]
    palette_mode: Option<PaletteMode>,

    /// Dither when requantizing.
    #[arg(long)]
    dither: bool,

    /// Pixels less opaque than this are treated as transparent.
    #[arg(long)]
    alpha_threshold: Option<u8>,

    /// Luma cut-offs for 4-color output, such as `210,160`.
    #[arg(long, value_delimiter = ',')]
    luma_thresholds: Option<Vec<u8>>,

    /// Source frame rate, such as `25`, `23.976` or `24000/1001`.
    #[arg(long, value_parser = parse_frame_rate)]
    fps_source: Option<f64>,

    /// Target frame rate.
    #[arg(long, value_parser = parse_frame_rate)]
    fps_target: Option<f64>,

    /// Shift all subtitles by this many milliseconds.
    #[arg(long, allow_hyphen_values = true)]
    delay_ms: Option<i64>,

    /// Minimum display time in milliseconds.
    #[arg(long)]
    min_display_ms: Option<i64>,

    /// Forced flag handling: keep, forced-only, clear or set-all.
    #[arg(long, value_parser = parse_name::<ForcedPolicy>)]
    forced: Option<ForcedPolicy>,

    /// Give invisible DVD subtitles the alpha values of the previous one.
    #[arg(long)]
    fix_invisible: bool,

    /// Load the 16-color DVD palette from a `Color N=R, G, B` file.
    #[arg(long, value_name = "FILE")]
    dvd_palette: Option<PathBuf>,

    /// DVD palette entries for 4-color output, such as `0,1,3,0`.
    #[arg(long, value_delimiter = ',')]
    dvd_color_indices: Option<Vec<u8>>,

    /// Color matrix for Blu-ray palettes: bt601 or bt709.
    #[arg(long, value_parser = parse_name::<ColorSpace>)]
    color_space: Option<ColorSpace>,

    /// Language code for DVD output.
    #[arg(long)]
    language: Option<String>,

    /// Also save each converted subtitle as a PNG, with an `index.json`.
    #[arg(long, value_name = "DIR")]
    png_dir: Option<PathBuf>,

    /// Write the target palette to this file.
    #[arg(long, value_name = "FILE")]
    export_palette: Option<PathBuf>,
}

impl Args {
    /// Overwrite anything in `options` which we specified explicitly.
    fn apply(&self, options: &mut ConvertOptions) -> Result<()> {
        if let Some(resolution) = self.resolution {
            options.resolution = Some(resolution);
        }
        if let Some(filter) = self.filter {
            options.filter = filter;
        }
        if let Some(mode) = self.palette_mode {
            options.palette_mode = mode;
        }
        if self.dither {
            options.dither = true;
        }
        if let Some(threshold) = self.alpha_threshold {
            options.alpha_threshold = threshold;
        }
        if let Some(thresholds) = &self.luma_thresholds {
            options.luma_thresholds = thresholds.clone();
        }
        if self.fps_source.is_some() {
            options.fps_source = self.fps_source;
        }
        if self.fps_target.is_some() {
            options.fps_target = self.fps_target;
        }
        if let Some(delay) = self.delay_ms {
            options.delay_ms = delay;
        }
        if let Some(min) = self.min_display_ms {
            options.min_display_ms = min;
        }
        if let Some(forced) = self.forced {
            options.forced = forced;
        }
        if self.fix_invisible {
            options.fix_invisible = true;
        }
        if self.dvd_palette.is_some() {
            options.dvd_palette = self.dvd_palette.clone();
        }
        if let Some(indices) = &self.dvd_color_indices {
            options.dvd_color_indices = indices[..]
                .try_into()
                .map_err(|_| format_err!("--dvd-color-indices needs exactly 4 values"))?;
        }
        if let Some(space) = self.color_space {
            options.color_space = space;
        }
        if self.language.is_some() {
            options.language = self.language.clone();
        }
        options.target = target_kind(&self.output, self.dvd_sup)?;
        Ok(())
    }
}

/// Decide what to write based on the output file's extension.
fn target_kind(output: &Path, dvd_sup: bool) -> Result<StreamKind> {
    let ext = output
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("idx") | Some("sub") => Ok(StreamKind::VobSub),
        Some("sup") if dvd_sup => Ok(StreamKind::SupDvd),
        Some("sup") => Ok(StreamKind::SupBd),
        _ => Err(format_err!(
            "don't know what format to write to {} (use *.idx or *.sup)",
            output.display()
        )),
    }
}

fn load_config(path: &Path) -> Result<ConvertOptions> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("could not read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("could not parse {}", path.display()))
}

#[derive(Serialize)]
struct IndexInfo {
    subtitles: Vec<SubInfo>,
}

#[derive(Serialize)]
struct SubInfo {
    start: f64,
    end: f64,
    forced: bool,
    position: (u16, u16),
    size: (u16, u16),
    path: String,
}

/// Saves converted subtitles as PNG files.
struct PngDump {
    dir: PathBuf,
    info: IndexInfo,
}

impl PngDump {
    fn new(dir: &Path) -> Result<PngDump> {
        fs::create_dir_all(dir).with_context(|| format!("could not create {}", dir.display()))?;
        Ok(PngDump {
            dir: dir.to_owned(),
            info: IndexInfo { subtitles: vec![] },
        })
    }

    fn add(&mut self, picture: &DecodedPicture) -> subpic::Result<()> {
        let image_name = format!("{:04}.png", self.info.subtitles.len());
        let image_path = self.dir.join(&image_name);
        let image = picture.bitmap.to_rgba_image(&picture.palette);
        image
            .save(&image_path)
            .map_err(|err| subpic::Error::WriteFile {
                path: image_path.clone(),
                source: io::Error::new(io::ErrorKind::Other, err),
            })?;

        let frame = &picture.frame;
        let coords = frame.coordinates();
        self.info.subtitles.push(SubInfo {
            start: frame.start() as f64 / TICKS_PER_SECOND as f64,
            end: frame.end() as f64 / TICKS_PER_SECOND as f64,
            forced: frame.forced(),
            position: (coords.left(), coords.top()),
            size: (coords.width(), coords.height()),
            path: image_name,
        });
        Ok(())
    }

    fn finish(self) -> Result<()> {
        let json_path = self.dir.join("index.json");
        let json = serde_json::to_string_pretty(&self.info)?;
        fs::write(&json_path, json)
            .with_context(|| format!("could not write {}", json_path.display()))?;
        Ok(())
    }
}

/// The palette to export: the 16-color DVD palette for DVD output, or the
/// palette of the first subtitle for Blu-ray output.
fn target_palette<W>(
    output: &ConversionOutput<W>,
    first: Option<Palette>,
) -> Result<Option<Palette>> {
    Ok(match output {
        ConversionOutput::VobSub { index, .. } => Some(dvd_palette_to_palette(index.palette())),
        ConversionOutput::SupDvd { ifo, .. } => {
            Some(dvd_palette_to_palette(&ifo::parse(ifo)?.palette))
        }
        ConversionOutput::SupBd { .. } => first,
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut options = match &args.config {
        Some(path) => load_config(path)?,
        None => ConvertOptions::default(),
    };
    args.apply(&mut options)?;
    debug!("options: {:?}", options);
    let target = options.target;
    let mut session = Session::new(options).context("invalid options")?;

    let space = session.options().color_space;
    let source = SubtitleStream::open(&args.input, space, session.warnings_mut())
        .with_context(|| format!("could not read {}", args.input.display()))?;

    let main_path = match target {
        StreamKind::VobSub => args.output.with_extension("sub"),
        StreamKind::SupDvd | StreamKind::SupBd => args.output.clone(),
    };
    let file = fs::File::create(&main_path)
        .with_context(|| format!("could not create {}", main_path.display()))?;

    let mut dump = args.png_dir.as_deref().map(PngDump::new).transpose()?;
    let mut first_palette = None;
    let (output, report) = session
        .convert_with(&source, BufWriter::new(file), |picture| {
            if first_palette.is_none() {
                first_palette = Some(picture.palette.clone());
            }
            match dump.as_mut() {
                Some(dump) => dump.add(picture),
                None => Ok(()),
            }
        })
        .with_context(|| format!("could not convert {}", args.input.display()))?;

    if let Some(path) = &args.export_palette {
        match target_palette(&output, first_palette)? {
            Some(palette) => fs::write(path, write_palette_text(&palette))
                .with_context(|| format!("could not write {}", path.display()))?,
            None => eprintln!("no subtitles written, so no palette to export"),
        }
    }
    save_companion_files(output, &args.output)
        .with_context(|| format!("could not write {}", args.output.display()))?;
    if let Some(dump) = dump {
        dump.finish()?;
    }

    for message in report.warnings.messages() {
        eprintln!("warning: {}", message);
    }
    println!(
        "{} subtitles written, {} skipped, {} warnings",
        report.frames_written,
        report.frames_skipped,
        report.warnings.count()
    );
    Ok(())
}
