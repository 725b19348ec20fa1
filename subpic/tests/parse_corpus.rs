use log::debug;
use std::path::Path;
use subpic::{
    demux, ColorSpace, Coordinates, IndexedBitmap, Palette, Size, SubtitleFrame, SubtitleStream,
    SupBdStream, SupBdWriter, SupDvdStream, Warnings, FPS_24P,
};

fn glob_options() -> glob::MatchOptions {
    glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    }
}

// To run this test, use `cargo test -- --ignored`.  This tests against a
// larger selection of subtitle files in our private corpus, which is
// unfortunately not open source.
#[test]
#[ignore]
fn private_corpus() {
    let _ = env_logger::try_init();

    for pattern in &["../private/**/*.idx", "../private/**/*.sup"] {
        for entry in glob::glob_with(pattern, glob_options()).unwrap() {
            let entry = entry.unwrap();
            process_file(&entry);
        }
    }
}

fn process_file(path: &Path) {
    debug!("Processing {}", path.display());
    let mut warnings = Warnings::new();
    let stream = SubtitleStream::open(path, ColorSpace::Bt601, &mut warnings).unwrap();
    for i in 0..stream.len() {
        let picture = stream.decode(i);
        picture.bitmap.check_palette(&picture.palette).unwrap();
    }
    debug!(
        "Found {} subtitles with {} warnings",
        stream.len(),
        warnings.count()
    );
}

/// A small Blu-ray stream with two subtitles.
fn sample_sup_bd() -> Vec<u8> {
    let screen = Size { w: 1280, h: 720 };
    let mut entries = vec![[0, 0, 0, 0]];
    entries.extend((1..16u8).map(|i| [i * 16, 255 - i * 16, i, 255]));
    let palette = Palette::from_rgba(&entries, ColorSpace::Bt709).unwrap();
    let mut writer = SupBdWriter::new(vec![], FPS_24P);
    for n in 0..2u16 {
        let data = (0..120 * 30).map(|i| (i % 16) as u8).collect();
        let bitmap = IndexedBitmap::from_raw(120, 30, data).unwrap();
        let coords = Coordinates::from_ltwh(100 + n, 600, 120, 30).unwrap();
        let start = 90_090 * (i64::from(n) + 1);
        let frame = SubtitleFrame::new(screen, coords, start, start + 45_045).unwrap();
        writer.write_picture(&frame, &bitmap, &palette).unwrap();
    }
    writer.finish().unwrap()
}

/// Damaged input may produce warnings or errors, but never a panic.
#[test]
fn damaged_streams_do_not_panic() {
    let _ = env_logger::try_init();

    let original = sample_sup_bd();
    let mut inputs = vec![];
    for len in (0..original.len()).step_by(7) {
        inputs.push(original[..len].to_vec());
    }
    for pos in (0..original.len()).step_by(11) {
        let mut damaged = original.clone();
        damaged[pos] ^= 0xa5;
        inputs.push(damaged);
    }

    for input in &inputs {
        let mut warnings = Warnings::new();
        if let Ok(stream) = SupBdStream::from_bytes(input, ColorSpace::Bt709, &mut warnings) {
            for i in 0..stream.len() {
                stream.decode(i);
            }
        }
        let screen = Size { w: 720, h: 576 };
        let palette = subpic::default_dvd_palette();
        if let Ok(stream) = SupDvdStream::from_bytes(input, screen, palette, &mut warnings) {
            for i in 0..stream.len() {
                stream.decode(i);
            }
        }
        demux(input, None, &mut warnings);
    }
}

