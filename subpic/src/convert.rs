//! Conversion sessions: read every picture from one stream, adjust it, and
//! write it to another.
//!
//! Pictures are processed strictly in order, and cancellation is only
//! checked between pictures.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::bitmap::{IndexedBitmap, Size};
use crate::errors::{Error, Result, Warnings};
use crate::frame::{ColorUpdate, Coordinates, DecodedPicture, DvdColors, Rect, SubtitleFrame};
use crate::idx::Index;
use crate::ifo;
use crate::palette::{default_dvd_palette, parse_palette_text, ColorSpace, DvdPalette, Palette};
use crate::pgs::SupBdWriter;
use crate::resample::{resample, PaletteMode, ResampleOptions, ScaleFilter};
use crate::stream::{StreamKind, SubtitleStream};
use crate::sub::VobSubWriter;
use crate::sup_dvd::SupDvdWriter;
use crate::time::{
    convert_fps, frame_duration, ms_to_pts, same_fps, sync_time_pts, FPS_24, FPS_24P, FPS_NTSC,
    FPS_NTSC_I,
};

/// What to do with the forced flag of each subtitle.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForcedPolicy {
    /// Copy the flag unchanged.
    #[default]
    Keep,
    /// Only convert forced subtitles.
    ForcedOnly,
    /// Clear the flag on every subtitle.
    Clear,
    /// Set the flag on every subtitle.
    SetAll,
}

/// An area of one subtitle to make transparent before encoding.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ErasePatch {
    /// The number of the subtitle, counting from 0.
    pub frame: usize,
    /// Left edge, relative to the subtitle image.
    pub x: usize,
    /// Top edge, relative to the subtitle image.
    pub y: usize,
    /// Width in pixels.
    pub w: usize,
    /// Height in pixels.
    pub h: usize,
}

/// Everything that controls a conversion.  This can be loaded from JSON,
/// where missing fields take their default values.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvertOptions {
    /// The format to write.
    pub target: StreamKind,
    /// The target screen size.  Defaults to the source screen size, or to
    /// a DVD resolution matching the target frame rate when converting HD
    /// material to a DVD format.
    pub resolution: Option<[usize; 2]>,
    /// The interpolation used when scaling.
    pub filter: ScaleFilter,
    /// How to choose palettes for Blu-ray output.  DVD output keeps the
    /// existing colors only for 4-color sources in `Keep` mode, and is
    /// otherwise always reduced by luma.
    pub palette_mode: PaletteMode,
    /// Dither when requantizing.
    pub dither: bool,
    /// Pixels less opaque than this count as transparent, both when
    /// cropping and when reducing to 4 colors.
    pub alpha_threshold: u8,
    /// Luma cut-offs used when reducing to 4 colors, lightest first.
    pub luma_thresholds: Vec<u8>,
    /// The source frame rate, if the stream doesn't tell us.
    pub fps_source: Option<f64>,
    /// The target frame rate.  Defaults to the source rate.
    pub fps_target: Option<f64>,
    /// Shift all times by this many milliseconds.
    pub delay_ms: i64,
    /// Extend shorter subtitles to this many milliseconds.
    pub min_display_ms: i64,
    /// What to do with forced flags.
    pub forced: ForcedPolicy,
    /// Give invisible DVD subtitles the alpha values of the previous
    /// visible one.
    pub fix_invisible: bool,
    /// A `Color N=R, G, B` file to use as the DVD palette.
    pub dvd_palette: Option<PathBuf>,
    /// DVD palette entries for transparent, light, dark and black pixels
    /// after reducing to 4 colors.
    pub dvd_color_indices: [u8; 4],
    /// The color matrix for Blu-ray palettes.
    pub color_space: ColorSpace,
    /// The language to record in DVD output.  Defaults to the source's.
    pub language: Option<String>,
    /// Areas to erase from individual subtitles.
    pub erase: Vec<ErasePatch>,
}

impl Default for ConvertOptions {
    fn default() -> ConvertOptions {
        let resample = ResampleOptions::default();
        ConvertOptions {
            target: StreamKind::default(),
            resolution: None,
            filter: resample.filter,
            palette_mode: resample.mode,
            dither: resample.dither,
            alpha_threshold: resample.alpha_threshold,
            luma_thresholds: resample.luma_thresholds,
            fps_source: None,
            fps_target: None,
            delay_ms: 0,
            min_display_ms: 500,
            forced: ForcedPolicy::default(),
            fix_invisible: false,
            dvd_palette: None,
            dvd_color_indices: [0, 1, 3, 0],
            color_space: ColorSpace::default(),
            language: None,
            erase: vec![],
        }
    }
}

impl ConvertOptions {
    /// Check for settings which can never work.
    pub fn validate(&self) -> Result<()> {
        if self.target.is_dvd() && self.luma_thresholds.len() != 2 {
            return Err(Error::invalid_palette(
                "4-color targets need exactly 2 luma thresholds",
            ));
        }
        if self.luma_thresholds.len() > 254 {
            return Err(Error::invalid_palette("too many luma thresholds"));
        }
        if let Some(&bad) = self.dvd_color_indices.iter().find(|&&i| i > 15) {
            return Err(Error::invalid_palette(format!(
                "DVD palette index {} is out of range",
                bad
            )));
        }
        if let Some([w, h]) = self.resolution {
            if w == 0 || h == 0 || w > usize::from(u16::MAX) || h > usize::from(u16::MAX) {
                return Err(Error::invalid_frame(format!(
                    "invalid resolution {}x{}",
                    w, h
                )));
            }
        }
        for fps in self.fps_source.iter().chain(self.fps_target.iter()) {
            if !fps.is_finite() || *fps <= 0.0 {
                return Err(Error::parse(format!("invalid frame rate {}", fps)));
            }
        }
        Ok(())
    }

    fn resample_options(&self, mode: PaletteMode) -> ResampleOptions {
        ResampleOptions {
            filter: self.filter,
            mode,
            dither: self.dither,
            alpha_threshold: self.alpha_threshold,
            luma_thresholds: self.luma_thresholds.clone(),
        }
    }
}

/// Totals for a finished conversion.
#[derive(Clone, Debug, Default)]
pub struct ConversionReport {
    /// Subtitles read from the source.
    pub frames_read: usize,
    /// Subtitles written to the target.
    pub frames_written: usize,
    /// Subtitles dropped by the forced policy, or because nothing in them
    /// was visible.
    pub frames_skipped: usize,
    /// Everything that went wrong without stopping the conversion.
    pub warnings: Warnings,
}

/// The finished target stream, plus any companion data which belongs in a
/// separate file.
#[derive(Debug)]
pub enum ConversionOutput<W> {
    /// A `*.sub` stream and its index.
    VobSub {
        /// The `*.sub` data.
        sub: W,
        /// The contents of the `*.idx` file.
        index: Index,
    },
    /// A DVD `*.sup` stream and its IFO file.
    SupDvd {
        /// The `*.sup` data.
        sup: W,
        /// The contents of the `*.ifo` file.
        ifo: Vec<u8>,
    },
    /// A Blu-ray `*.sup` stream.
    SupBd {
        /// The `*.sup` data.
        sup: W,
    },
}

enum TargetWriter<W: Write> {
    VobSub(VobSubWriter<W>),
    SupDvd {
        writer: SupDvdWriter<W>,
        screen: Size,
        palette: DvdPalette,
        language: String,
    },
    SupBd(SupBdWriter<W>),
}

impl<W: Write> TargetWriter<W> {
    fn new(out: W, plan: &Plan) -> TargetWriter<W> {
        match plan.target {
            StreamKind::VobSub => {
                let mut writer = VobSubWriter::new(out, plan.screen, plan.dvd_palette);
                writer.set_language(plan.language.clone());
                TargetWriter::VobSub(writer)
            }
            StreamKind::SupDvd => TargetWriter::SupDvd {
                writer: SupDvdWriter::new(out),
                screen: plan.screen,
                palette: plan.dvd_palette,
                language: plan.language.clone(),
            },
            StreamKind::SupBd => TargetWriter::SupBd(SupBdWriter::new(out, plan.fps_target)),
        }
    }

    fn write(&mut self, picture: &DecodedPicture) -> Result<()> {
        match self {
            TargetWriter::VobSub(writer) => writer.write_picture(&picture.frame, &picture.bitmap),
            TargetWriter::SupDvd { writer, .. } => {
                writer.write_picture(&picture.frame, &picture.bitmap)
            }
            TargetWriter::SupBd(writer) => {
                writer.write_picture(&picture.frame, &picture.bitmap, &picture.palette)
            }
        }
    }

    fn finish(self) -> Result<ConversionOutput<W>> {
        Ok(match self {
            TargetWriter::VobSub(writer) => {
                let (sub, index) = writer.finish()?;
                ConversionOutput::VobSub { sub, index }
            }
            TargetWriter::SupDvd {
                writer,
                screen,
                palette,
                language,
            } => ConversionOutput::SupDvd {
                sup: writer.finish()?,
                ifo: ifo::build(screen, &palette, &language),
            },
            TargetWriter::SupBd(writer) => ConversionOutput::SupBd {
                sup: writer.finish()?,
            },
        })
    }
}

/// Settings worked out from the options and the source stream.
#[derive(Debug)]
struct Plan {
    target: StreamKind,
    screen: Size,
    fps_source: f64,
    fps_target: f64,
    delay: i64,
    min_display: i64,
    source_dvd_palette: Option<DvdPalette>,
    dvd_palette: DvdPalette,
    language: String,
}

impl Plan {
    fn new(options: &ConvertOptions, source: &SubtitleStream) -> Result<Plan> {
        let fps_source = options.fps_source.unwrap_or_else(|| source.fps());
        let fps_target = options.fps_target.unwrap_or(fps_source);
        let source_screen = source.screen();
        let screen = match options.resolution {
            Some([w, h]) => Size { w, h },
            None if options.target.is_dvd() && (source_screen.w > 720 || source_screen.h > 576) => {
                let ntsc = [FPS_24P, FPS_24, FPS_NTSC, FPS_NTSC_I]
                    .iter()
                    .any(|&fps| same_fps(fps, fps_target));
                Size {
                    w: 720,
                    h: if ntsc { 480 } else { 576 },
                }
            }
            None => source_screen,
        };
        let dvd_palette = match &options.dvd_palette {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|source| Error::ReadFile {
                    path: path.to_owned(),
                    source,
                })?;
                parse_palette_text(&text)?
            }
            None => source
                .dvd_palette()
                .copied()
                .unwrap_or_else(default_dvd_palette),
        };
        let language = options
            .language
            .clone()
            .or_else(|| source.language().map(str::to_owned))
            .unwrap_or_else(|| "en".to_owned());
        let plan = Plan {
            target: options.target,
            screen,
            fps_source,
            fps_target,
            delay: ms_to_pts(options.delay_ms),
            min_display: ms_to_pts(options.min_display_ms),
            source_dvd_palette: source.dvd_palette().copied(),
            dvd_palette,
            language,
        };
        debug!("conversion plan: {:?}", plan);
        Ok(plan)
    }

    /// Map a source time onto the target timeline.
    fn time(&self, t: i64) -> i64 {
        let t = convert_fps(t, self.fps_source, self.fps_target) + self.delay;
        sync_time_pts(t, self.fps_target)
    }

    /// Map a delay relative to a subtitle's start.
    fn duration(&self, d: i64) -> i64 {
        convert_fps(d, self.fps_source, self.fps_target)
    }
}

/// Clamp `value` and `len` so that `value + len <= limit`, with `len` at
/// least 1.
fn fit(value: usize, len: usize, limit: usize) -> (usize, usize) {
    let len = len.clamp(1, limit.max(1));
    (value.min(limit - len), len)
}

/// Scale a position or length by `to / from`, rounding to nearest.
fn rescale(value: usize, from: usize, to: usize) -> usize {
    (value * to + from / 2) / from.max(1)
}

/// Make the pixels inside each erase patch transparent.
fn apply_erase(
    frame: &mut SubtitleFrame,
    bitmap: &mut IndexedBitmap,
    palette: &Palette,
) -> Result<()> {
    if frame.erase().is_empty() {
        return Ok(());
    }
    let transparent = cast::u8(palette.transparent_index())?;
    for rect in frame.erase() {
        let x = rect.x.min(bitmap.width());
        let y = rect.y.min(bitmap.height());
        let w = rect.w.min(bitmap.width() - x);
        let h = rect.h.min(bitmap.height() - y);
        if w > 0 && h > 0 {
            bitmap.fill_rect(x, y, w, h, transparent);
        }
    }
    frame.clear_erase();
    Ok(())
}

/// A single conversion, with its options, accumulated warnings and
/// cancellation flag.
pub struct Session {
    options: ConvertOptions,
    warnings: Warnings,
    cancel: Arc<AtomicBool>,
}

impl Session {
    /// Create a new session.
    pub fn new(options: ConvertOptions) -> Result<Session> {
        Session::with_cancel_flag(options, Arc::new(AtomicBool::new(false)))
    }

    /// Create a new session which stops when `cancel` is set.
    pub fn with_cancel_flag(options: ConvertOptions, cancel: Arc<AtomicBool>) -> Result<Session> {
        options.validate()?;
        Ok(Session {
            options,
            warnings: Warnings::new(),
            cancel,
        })
    }

    /// Our options.
    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// A flag which another thread may set to stop this session after the
    /// current subtitle.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Warnings collected so far.  Warnings from opening the source stream
    /// may be added here so they end up in the report.
    pub fn warnings_mut(&mut self) -> &mut Warnings {
        &mut self.warnings
    }

    /// Convert every subtitle in `source`, writing the result to `out`.
    pub fn convert<W: Write>(
        &mut self,
        source: &SubtitleStream,
        out: W,
    ) -> Result<(ConversionOutput<W>, ConversionReport)> {
        self.convert_with(source, out, |_| Ok(()))
    }

    /// Like `convert`, but also pass each finished picture to
    /// `on_picture`.
    pub fn convert_with<W, F>(
        &mut self,
        source: &SubtitleStream,
        out: W,
        mut on_picture: F,
    ) -> Result<(ConversionOutput<W>, ConversionReport)>
    where
        W: Write,
        F: FnMut(&DecodedPicture) -> Result<()>,
    {
        let plan = Plan::new(&self.options, source)?;
        let mut writer = TargetWriter::new(out, &plan);
        let mut report = ConversionReport::default();
        let mut last_alpha = None;
        for i in 0..source.len() {
            if self.cancel.load(Ordering::SeqCst) {
                info!("conversion cancelled after {} subtitles", i);
                return Err(Error::Cancelled);
            }
            report.frames_read += 1;
            match self.convert_picture(source, i, &plan, &mut last_alpha)? {
                Some(picture) => {
                    writer.write(&picture)?;
                    on_picture(&picture)?;
                    report.frames_written += 1;
                }
                None => report.frames_skipped += 1,
            }
        }
        let output = writer.finish()?;
        report.warnings = mem::take(&mut self.warnings);
        info!(
            "converted {} of {} subtitles with {} warnings",
            report.frames_written,
            report.frames_read,
            report.warnings.count()
        );
        Ok((output, report))
    }

    /// Run one subtitle through the pipeline.  Returns `None` if it should
    /// be skipped.
    fn convert_picture(
        &mut self,
        source: &SubtitleStream,
        i: usize,
        plan: &Plan,
        last_alpha: &mut Option<[u8; 4]>,
    ) -> Result<Option<DecodedPicture>> {
        let options = &self.options;
        let warnings = &mut self.warnings;

        // `decode` hands us our own copies, so nothing below can leak into
        // other subtitles.
        let DecodedPicture {
            frame,
            mut bitmap,
            mut palette,
        } = source.decode(i);
        let patches = options
            .erase
            .iter()
            .filter(|p| p.frame == i)
            .map(|p| Rect {
                x: p.x,
                y: p.y,
                w: p.w,
                h: p.h,
            })
            .collect::<Vec<_>>();
        let mut frame = frame.with_erase(patches);
        apply_erase(&mut frame, &mut bitmap, &palette)?;

        if let Some(colors) = frame.dvd_colors().copied() {
            if !colors.is_invisible() {
                *last_alpha = Some(colors.alpha);
            } else if let (true, Some(alpha), Some(dvd_palette)) =
                (options.fix_invisible, *last_alpha, plan.source_dvd_palette)
            {
                warnings.warn(format!(
                    "subtitle {} is invisible, reusing the previous alpha values",
                    i
                ));
                let fixed = DvdColors {
                    palette: colors.palette,
                    alpha,
                };
                frame.set_dvd_colors(Some(fixed));
                palette = fixed.to_palette(&dvd_palette);
            } else {
                warnings.warn(format!("subtitle {} is invisible", i));
            }
        }

        match options.forced {
            ForcedPolicy::Keep => {}
            ForcedPolicy::ForcedOnly if !frame.forced() => {
                debug!("skipping unforced subtitle {}", i);
                return Ok(None);
            }
            ForcedPolicy::ForcedOnly => {}
            ForcedPolicy::Clear => frame.set_forced(false),
            ForcedPolicy::SetAll => frame.set_forced(true),
        }

        let start = plan.time(frame.start());
        if start < 0 {
            warnings.warn(format!("subtitle {} starts before 0, skipping", i));
            return Ok(None);
        }
        let mut end = plan.time(frame.end());
        if end - start < plan.min_display {
            end = sync_time_pts(start + plan.min_display, plan.fps_target);
        }
        if i + 1 < source.len() {
            let next_start = plan.time(source.frame(i + 1).start());
            if end > next_start && next_start > start {
                end = next_start;
            }
        }
        if end <= start {
            end = start + frame_duration(plan.fps_target);
        }

        let threshold = options.alpha_threshold;
        if bitmap
            .pixels()
            .iter()
            .all(|&px| palette.alpha(usize::from(px)) < threshold)
        {
            warnings.warn(format!("subtitle {} has no visible pixels, skipping", i));
            return Ok(None);
        }
        let bounds = bitmap.bounds(&palette, threshold);
        let mut x = usize::from(frame.coordinates().left());
        let mut y = usize::from(frame.coordinates().top());
        if bounds.width() != bitmap.width() || bounds.height() != bitmap.height() {
            bitmap = bitmap.crop(bounds.x_min, bounds.y_min, bounds.width(), bounds.height());
            x += bounds.x_min;
            y += bounds.y_min;
        }

        let from = frame.screen();
        let to = plan.screen;
        let (x, w) = fit(
            rescale(x, from.w, to.w),
            rescale(bitmap.width(), from.w, to.w),
            to.w,
        );
        let (y, h) = fit(
            rescale(y, from.h, to.h),
            rescale(bitmap.height(), from.h, to.h),
            to.h,
        );

        let keep_dvd_colors = plan.target.is_dvd()
            && frame.dvd_colors().is_some()
            && options.palette_mode == PaletteMode::Keep
            && palette.len() <= 4;
        let mode = if keep_dvd_colors {
            PaletteMode::Keep
        } else if plan.target.is_dvd() {
            PaletteMode::ReduceLuma
        } else {
            options.palette_mode
        };
        let (bitmap, palette) = resample(
            &bitmap,
            &palette,
            w,
            h,
            &options.resample_options(mode),
            warnings,
        )?;

        let coordinates =
            Coordinates::from_ltwh(cast::u16(x)?, cast::u16(y)?, cast::u16(w)?, cast::u16(h)?)?;
        let mut target = SubtitleFrame::new(to, coordinates, start, end)?.with_forced(frame.forced());
        let palette = if plan.target.is_dvd() {
            let colors = if keep_dvd_colors {
                let updates = frame
                    .color_updates()
                    .iter()
                    .map(|u| ColorUpdate {
                        delay: plan.duration(u.delay),
                        colors: u.colors,
                    })
                    .collect();
                target.set_color_updates(updates);
                frame.dvd_colors().copied().unwrap_or_default()
            } else {
                DvdColors {
                    palette: options.dvd_color_indices,
                    alpha: [0, 15, 15, 15],
                }
            };
            target.set_dvd_colors(Some(colors));
            colors.to_palette(&plan.dvd_palette)
        } else if palette.color_space() != options.color_space {
            let entries = (0..palette.len()).map(|i| palette.rgba(i)).collect::<Vec<_>>();
            Palette::from_rgba(&entries, options.color_space)?
        } else {
            palette
        };

        trace!(
            "subtitle {}: {}x{} at {},{} from {} to {}",
            i,
            w,
            h,
            x,
            y,
            start,
            end
        );
        Ok(Some(DecodedPicture {
            frame: target,
            bitmap,
            palette,
        }))
    }
}

fn create_file(path: &Path) -> Result<BufWriter<fs::File>> {
    let file = fs::File::create(path).map_err(|source| Error::WriteFile {
        path: path.to_owned(),
        source,
    })?;
    Ok(BufWriter::new(file))
}

fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    fs::write(path, data).map_err(|source| Error::WriteFile {
        path: path.to_owned(),
        source,
    })
}

/// Convert the stream at `input` and write it to `output`.  VobSub output
/// is written as an `*.idx` and `*.sub` pair, and DVD SUP output gets an
/// `*.ifo` file next to it.
pub fn convert_files(
    input: &Path,
    output: &Path,
    options: ConvertOptions,
    cancel: Arc<AtomicBool>,
) -> Result<ConversionReport> {
    let mut session = Session::with_cancel_flag(options, cancel)?;
    let source = SubtitleStream::open(input, session.options.color_space, session.warnings_mut())?;
    let main_path = match session.options.target {
        StreamKind::VobSub => output.with_extension("sub"),
        StreamKind::SupDvd | StreamKind::SupBd => output.to_owned(),
    };
    let out = create_file(&main_path)?;
    let (output_data, report) = session.convert(&source, out)?;
    save_companion_files(output_data, output)?;
    Ok(report)
}

/// Write the `*.idx` or `*.ifo` file which goes with `output`.
pub fn save_companion_files<W>(data: ConversionOutput<W>, output: &Path) -> Result<()> {
    match data {
        ConversionOutput::VobSub { index, .. } => {
            write_file(&output.with_extension("idx"), index.to_idx_string().as_bytes())
        }
        ConversionOutput::SupDvd { ifo, .. } => write_file(&output.with_extension("ifo"), &ifo),
        ConversionOutput::SupBd { .. } => Ok(()),
    }
}

/// A conversion running on its own thread.
pub struct ConversionHandle {
    cancel: Arc<AtomicBool>,
    thread: thread::JoinHandle<Result<ConversionReport>>,
}

impl ConversionHandle {
    /// Ask the conversion to stop after the current subtitle.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Has the worker thread finished?
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the conversion to finish.
    pub fn join(self) -> Result<ConversionReport> {
        match self.thread.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Run `convert_files` on a worker thread.
pub fn spawn_conversion(
    input: PathBuf,
    output: PathBuf,
    options: ConvertOptions,
) -> Result<ConversionHandle> {
    let cancel = Arc::new(AtomicBool::new(false));
    let worker_cancel = cancel.clone();
    let thread = thread::Builder::new()
        .name("subpic-convert".to_owned())
        .spawn(move || convert_files(&input, &output, options, worker_cancel))?;
    Ok(ConversionHandle { cancel, thread })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pgs::SupBdStream;
    use crate::sub::VobSubStream;
    use crate::time::FPS_PAL;

    const PAL: Size = Size { w: 720, h: 576 };

    /// A VobSub stream with one subtitle per entry of `forced`.
    fn vobsub_source(forced: &[bool]) -> SubtitleStream {
        let mut writer = VobSubWriter::new(vec![], PAL, default_dvd_palette());
        for (n, &forced) in forced.iter().enumerate() {
            let mut bitmap = IndexedBitmap::new(60, 20, 0);
            bitmap.fill_rect(10, 5, 40, 10, 1);
            bitmap.fill_rect(10, 14, 40, 1, 3);
            let coords = Coordinates::from_ltwh(100, 400, 60, 20).unwrap();
            let start = 90_000 * (2 * n as i64 + 1);
            let frame = SubtitleFrame::new(PAL, coords, start, start + 90_000)
                .unwrap()
                .with_forced(forced)
                .with_dvd_colors(DvdColors {
                    palette: [0, 1, 2, 3],
                    alpha: [0, 15, 15, 15],
                });
            writer.write_picture(&frame, &bitmap).unwrap();
        }
        let (sub, index) = writer.finish().unwrap();
        let mut warnings = Warnings::new();
        let stream = VobSubStream::from_parts(index, &sub, &mut warnings).unwrap();
        assert!(warnings.is_empty());
        SubtitleStream::VobSub(stream)
    }

    #[test]
    fn vobsub_to_blu_ray() {
        let source = vobsub_source(&[false, true]);
        let options = ConvertOptions {
            target: StreamKind::SupBd,
            resolution: Some([1920, 1080]),
            fps_target: Some(FPS_PAL),
            ..ConvertOptions::default()
        };
        let mut session = Session::new(options).unwrap();
        let (output, report) = session.convert(&source, vec![]).unwrap();
        assert_eq!((report.frames_read, report.frames_written), (2, 2));
        let sup = match output {
            ConversionOutput::SupBd { sup } => sup,
            other => panic!("unexpected output {:?}", other),
        };

        let mut warnings = Warnings::new();
        let result = SupBdStream::from_bytes(&sup, ColorSpace::Bt601, &mut warnings).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.screen(), Size { w: 1920, h: 1080 });
        assert_eq!(result.frame(0).start(), 90_000);
        assert_eq!(result.frame(0).end(), 180_000);
        assert!(!result.frame(0).forced());
        assert!(result.frame(1).forced());
        // The visible 40x10 area, scaled by 8/3 and 15/8.
        let coords = result.frame(0).coordinates();
        assert_eq!((coords.left(), coords.top()), (293, 759));
        assert_eq!((coords.width(), coords.height()), (107, 19));
    }

    #[test]
    fn forced_only_skips_other_subtitles() {
        let source = vobsub_source(&[false, true, false]);
        let options = ConvertOptions {
            forced: ForcedPolicy::ForcedOnly,
            ..ConvertOptions::default()
        };
        let mut session = Session::new(options).unwrap();
        let (output, report) = session.convert(&source, vec![]).unwrap();
        assert_eq!(report.frames_written, 1);
        assert_eq!(report.frames_skipped, 2);
        match output {
            ConversionOutput::VobSub { index, .. } => {
                assert_eq!(index.entries().len(), 1);
                assert_eq!(index.entries()[0].timestamp, 270_000);
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn blu_ray_to_dvd_reduces_colors() {
        let bd = {
            let mut writer = SupBdWriter::new(vec![], FPS_24P);
            let mut entries = vec![[0, 0, 0, 0]];
            for i in 1..=200u8 {
                entries.push([i, i, i, 255]);
            }
            let palette = Palette::from_rgba(&entries, ColorSpace::Bt709).unwrap();
            let data = (0..400 * 50).map(|i| (i % 201) as u8).collect();
            let bitmap = IndexedBitmap::from_raw(400, 50, data).unwrap();
            let coords = Coordinates::from_ltwh(760, 950, 400, 50).unwrap();
            let frame =
                SubtitleFrame::new(Size { w: 1920, h: 1080 }, coords, 90_090, 180_180).unwrap();
            writer.write_picture(&frame, &bitmap, &palette).unwrap();
            writer.finish().unwrap()
        };
        let mut warnings = Warnings::new();
        let source = SubtitleStream::SupBd(
            SupBdStream::from_bytes(&bd, ColorSpace::Bt709, &mut warnings).unwrap(),
        );
        let options = ConvertOptions {
            target: StreamKind::SupDvd,
            filter: ScaleFilter::Lanczos3,
            ..ConvertOptions::default()
        };
        let mut session = Session::new(options).unwrap();
        let mut pictures = vec![];
        let (output, report) = session
            .convert_with(&source, vec![], |p| {
                pictures.push(p.clone());
                Ok(())
            })
            .unwrap();
        assert_eq!(report.frames_written, 1);
        let picture = &pictures[0];
        assert_eq!(picture.frame.screen(), Size { w: 720, h: 480 });
        assert!(picture.bitmap.pixels().iter().all(|&px| px < 4));
        let coords = picture.frame.coordinates();
        assert!(usize::from(coords.left() + coords.width()) <= 720);
        assert!(usize::from(coords.top() + coords.height()) <= 480);
        match output {
            ConversionOutput::SupDvd { sup, ifo } => {
                assert_eq!(&sup[..2], b"SP");
                let info = ifo::parse(&ifo).unwrap();
                assert_eq!(info.screen, Size { w: 720, h: 480 });
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn erase_patches_and_invisible_frames() {
        let source = vobsub_source(&[false, false]);
        let options = ConvertOptions {
            // Erase everything visible in the second subtitle.
            erase: vec![ErasePatch {
                frame: 1,
                x: 0,
                y: 0,
                w: 60,
                h: 20,
            }],
            ..ConvertOptions::default()
        };
        let mut session = Session::new(options).unwrap();
        let (_, report) = session.convert(&source, vec![]).unwrap();
        assert_eq!(report.frames_written, 1);
        assert_eq!(report.frames_skipped, 1);
        assert_eq!(report.warnings.count(), 1);
    }

    #[test]
    fn time_transforms() {
        let source = vobsub_source(&[false]);
        let options = ConvertOptions {
            fps_source: Some(FPS_24P),
            fps_target: Some(FPS_PAL),
            delay_ms: 1000,
            ..ConvertOptions::default()
        };
        let plan = Plan::new(&options, &source).unwrap();
        assert_eq!(plan.time(0), 90_000);
        // One second at 23.976 fps is 0.959 seconds at 25 fps, rounded to
        // a whole frame.
        assert_eq!(plan.time(90_000), 90_000 + 86_400);
    }

    #[test]
    fn cancelled_sessions_stop() {
        let source = vobsub_source(&[false, false]);
        let mut session = Session::new(ConvertOptions::default()).unwrap();
        session.cancel_flag().store(true, Ordering::SeqCst);
        match session.convert(&source, vec![]) {
            Err(Error::Cancelled) => {}
            other => panic!("unexpected result {:?}", other.map(|(_, r)| r)),
        }
    }

    #[test]
    fn validation_rejects_impossible_settings() {
        let options = ConvertOptions {
            luma_thresholds: vec![200],
            ..ConvertOptions::default()
        };
        assert!(options.validate().is_err());
        let options = ConvertOptions {
            target: StreamKind::SupBd,
            luma_thresholds: vec![200],
            ..ConvertOptions::default()
        };
        assert!(options.validate().is_ok());
        let options = ConvertOptions {
            dvd_color_indices: [0, 1, 2, 16],
            ..ConvertOptions::default()
        };
        assert!(options.validate().is_err());
    }
}
