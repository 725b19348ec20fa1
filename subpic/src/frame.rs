//! Timing, placement and color metadata for one subtitle picture.

use crate::bitmap::{IndexedBitmap, Size};
use crate::errors::{Error, Result};
use crate::palette::{ColorSpace, DvdPalette, Palette};

/// Location at which to display the subtitle, with the right and bottom
/// edges inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coordinates {
    pub(crate) x1: u16,
    pub(crate) y1: u16,
    pub(crate) x2: u16,
    pub(crate) y2: u16,
}

impl Coordinates {
    /// Build coordinates from the top-left corner and a non-zero size.
    pub fn from_ltwh(left: u16, top: u16, width: u16, height: u16) -> Result<Coordinates> {
        if width == 0 || height == 0 {
            return Err(Error::invalid_frame("subtitle image has zero size"));
        }
        let x2 = left
            .checked_add(width - 1)
            .ok_or_else(|| Error::invalid_frame("subtitle image is too wide"))?;
        let y2 = top
            .checked_add(height - 1)
            .ok_or_else(|| Error::invalid_frame("subtitle image is too tall"))?;
        Ok(Coordinates {
            x1: left,
            y1: top,
            x2,
            y2,
        })
    }

    /// The leftmost edge of the subtitle.
    pub fn left(&self) -> u16 {
        self.x1
    }

    /// The topmost edge of the subtitle.
    pub fn top(&self) -> u16 {
        self.y1
    }

    /// The width of the subtitle.
    pub fn width(&self) -> u16 {
        self.x2 + 1 - self.x1
    }

    /// The height of the subtitle.
    pub fn height(&self) -> u16 {
        self.y2 + 1 - self.y1
    }

    /// The size of the subtitle.
    pub fn size(&self) -> Size {
        Size {
            w: usize::from(self.width()),
            h: usize::from(self.height()),
        }
    }
}

/// A rectangle, used for erase patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    /// Left edge, relative to the subtitle image.
    pub x: usize,
    /// Top edge, relative to the subtitle image.
    pub y: usize,
    /// Width in pixels.
    pub w: usize,
    /// Height in pixels.
    pub h: usize,
}

/// The 4-color mapping used by DVD subtitles, in pixel-value order: entry
/// `i` describes how pixels with the 2-bit value `i` are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DvdColors {
    /// Indices into the 16-color DVD palette.
    pub palette: [u8; 4],
    /// 4-bit alpha values, where 15 is opaque.
    pub alpha: [u8; 4],
}

impl Default for DvdColors {
    fn default() -> DvdColors {
        DvdColors {
            palette: [0, 1, 2, 3],
            alpha: [0, 15, 15, 15],
        }
    }
}

impl DvdColors {
    /// Is every color fully transparent?
    pub fn is_invisible(&self) -> bool {
        self.alpha.iter().all(|&a| a == 0)
    }

    /// Build the 4-entry palette seen by the decoded bitmap.
    pub fn to_palette(&self, dvd_palette: &DvdPalette) -> Palette {
        let mut palette = Palette::transparent(4, ColorSpace::Bt601);
        for i in 0..4 {
            let rgb = dvd_palette[usize::from(self.palette[i] & 0x0f)];
            let a = self.alpha[i] & 0x0f;
            palette.set_rgb(i, rgb[0], rgb[1], rgb[2]);
            palette.set_alpha(i, a << 4 | a);
        }
        palette
    }
}

/// An incremental color and alpha change, applied `delay` ticks after the
/// subtitle starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorUpdate {
    /// Delay after the start time, in 90 kHz ticks.
    pub delay: i64,
    /// The new colors.
    pub colors: DvdColors,
}

/// A single subtitle picture's metadata.
///
/// The image rectangle always lies within the screen, and the start time is
/// always before the end time.  Times are 90 kHz ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleFrame {
    screen: Size,
    coordinates: Coordinates,
    start: i64,
    end: i64,
    forced: bool,
    erase: Vec<Rect>,
    dvd_colors: Option<DvdColors>,
    color_updates: Vec<ColorUpdate>,
}

impl SubtitleFrame {
    /// Create a new frame, checking its invariants.
    pub fn new(
        screen: Size,
        coordinates: Coordinates,
        start: i64,
        end: i64,
    ) -> Result<SubtitleFrame> {
        let frame = SubtitleFrame {
            screen,
            coordinates,
            start,
            end,
            forced: false,
            erase: vec![],
            dvd_colors: None,
            color_updates: vec![],
        };
        frame.validate()?;
        Ok(frame)
    }

    fn validate(&self) -> Result<()> {
        if usize::from(self.coordinates.x2) >= self.screen.w
            || usize::from(self.coordinates.y2) >= self.screen.h
        {
            return Err(Error::invalid_frame(format!(
                "image {:?} lies outside {}x{} screen",
                self.coordinates, self.screen.w, self.screen.h
            )));
        }
        if self.start >= self.end {
            return Err(Error::invalid_frame(format!(
                "start time {} is not before end time {}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    /// The size of the screen this subtitle is placed on.
    pub fn screen(&self) -> Size {
        self.screen
    }

    /// Where the image is placed on the screen.
    pub fn coordinates(&self) -> &Coordinates {
        &self.coordinates
    }

    /// Start time, in 90 kHz ticks.
    pub fn start(&self) -> i64 {
        self.start
    }

    /// End time, in 90 kHz ticks.
    pub fn end(&self) -> i64 {
        self.end
    }

    /// Should this subtitle be shown even when subtitles are off?
    pub fn forced(&self) -> bool {
        self.forced
    }

    /// Rectangles of the image which should be erased before encoding.
    pub fn erase(&self) -> &[Rect] {
        &self.erase
    }

    /// The 4-color mapping, for DVD subtitles.
    pub fn dvd_colors(&self) -> Option<&DvdColors> {
        self.dvd_colors.as_ref()
    }

    /// Color changes which happen while this subtitle is displayed.
    pub fn color_updates(&self) -> &[ColorUpdate] {
        &self.color_updates
    }

    /// Change the start and end times.
    pub fn set_times(&mut self, start: i64, end: i64) -> Result<()> {
        if start >= end {
            return Err(Error::invalid_frame(format!(
                "start time {} is not before end time {}",
                start, end
            )));
        }
        self.start = start;
        self.end = end;
        Ok(())
    }

    /// Move the image to a new screen and position.
    pub fn set_placement(&mut self, screen: Size, coordinates: Coordinates) -> Result<()> {
        let old = (self.screen, self.coordinates);
        self.screen = screen;
        self.coordinates = coordinates;
        if let Err(err) = self.validate() {
            self.screen = old.0;
            self.coordinates = old.1;
            return Err(err);
        }
        Ok(())
    }

    /// Set the forced flag.
    pub fn set_forced(&mut self, forced: bool) {
        self.forced = forced;
    }

    /// Builder-style version of `set_forced`.
    pub fn with_forced(mut self, forced: bool) -> SubtitleFrame {
        self.forced = forced;
        self
    }

    /// Add erase patches.
    pub fn with_erase(mut self, erase: Vec<Rect>) -> SubtitleFrame {
        self.erase = erase;
        self
    }

    /// Remove all erase patches.
    pub fn clear_erase(&mut self) {
        self.erase.clear();
    }

    /// Set the DVD 4-color mapping.
    pub fn set_dvd_colors(&mut self, colors: Option<DvdColors>) {
        self.dvd_colors = colors;
    }

    /// Builder-style version of `set_dvd_colors`.
    pub fn with_dvd_colors(mut self, colors: DvdColors) -> SubtitleFrame {
        self.dvd_colors = Some(colors);
        self
    }

    /// Replace the incremental color updates.
    pub fn set_color_updates(&mut self, updates: Vec<ColorUpdate>) {
        self.color_updates = updates;
    }
}

/// Everything needed to draw one subtitle.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPicture {
    /// Timing and placement.
    pub frame: SubtitleFrame,
    /// The image.
    pub bitmap: IndexedBitmap,
    /// The colors used by `bitmap`.
    pub palette: Palette,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::default_dvd_palette;

    fn screen() -> Size {
        Size { w: 720, h: 576 }
    }

    #[test]
    fn coordinates_from_ltwh() {
        let c = Coordinates::from_ltwh(10, 20, 30, 40).unwrap();
        assert_eq!((c.left(), c.top(), c.width(), c.height()), (10, 20, 30, 40));
        assert_eq!((c.x2, c.y2), (39, 59));
        assert!(Coordinates::from_ltwh(0, 0, 0, 1).is_err());
        assert!(Coordinates::from_ltwh(u16::MAX, 0, 2, 1).is_err());
    }

    #[test]
    fn frame_invariants() {
        let inside = Coordinates::from_ltwh(700, 500, 20, 76).unwrap();
        assert!(SubtitleFrame::new(screen(), inside, 0, 1).is_ok());
        let outside = Coordinates::from_ltwh(701, 500, 20, 76).unwrap();
        assert!(SubtitleFrame::new(screen(), outside, 0, 1).is_err());
        assert!(SubtitleFrame::new(screen(), inside, 5, 5).is_err());

        let mut frame = SubtitleFrame::new(screen(), inside, 0, 1).unwrap();
        assert!(frame.set_times(10, 2).is_err());
        assert_eq!((frame.start(), frame.end()), (0, 1));
        assert!(frame.set_placement(screen(), outside).is_err());
        assert_eq!(frame.coordinates(), &inside);
    }

    #[test]
    fn dvd_colors_expand_to_palette() {
        let colors = DvdColors {
            palette: [0, 1, 3, 2],
            alpha: [0, 15, 8, 15],
        };
        let palette = colors.to_palette(&default_dvd_palette());
        assert_eq!(palette.len(), 4);
        assert_eq!(palette.rgba(0), [0, 0, 0, 0]);
        assert_eq!(palette.rgba(1), [0xf0, 0xf0, 0xf0, 0xff]);
        assert_eq!(palette.rgba(2), [0x99, 0x99, 0x99, 0x88]);
        assert!(!colors.is_invisible());
        assert!(DvdColors {
            palette: [0; 4],
            alpha: [0; 4]
        }
        .is_invisible());
    }
}
