//! # Integration tests.
//!
//! These tests are run on our executable to make sure that all the
//! command-line options work correctly.
//!
//! This code is inspired by the `WorkDir` pattern that BurntSushi uses to
//! test CLI tools like `ripgrep` and `xsv`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};
use subpic::{
    default_dvd_palette, is_ifo_file, is_sup_bd_file, is_sup_dvd_file, ColorSpace, Coordinates,
    DvdColors, IndexedBitmap, Size, SubtitleFrame, SubtitleStream, VobSubWriter, Warnings,
};

static TEST_ID: AtomicUsize = AtomicUsize::new(0);

/// Create an empty scratch directory for one test.
fn scratch_dir() -> PathBuf {
    let id = TEST_ID.fetch_add(1, Ordering::SeqCst);
    let dir = Path::new(env!("CARGO_TARGET_TMPDIR"))
        .join("subconv-tests")
        .join(format!("{}-{}", process::id(), id));
    if dir.exists() {
        fs::remove_dir_all(&dir).unwrap();
    }
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Write `input.idx` and `input.sub` with two subtitles, the second one
/// forced.
fn write_input(dir: &Path) -> PathBuf {
    let screen = Size { w: 720, h: 576 };
    let mut writer = VobSubWriter::new(vec![], screen, default_dvd_palette());
    for n in 0..2 {
        let mut bitmap = IndexedBitmap::new(100, 30, 0);
        bitmap.fill_rect(10, 10, 80, 10, 1);
        let coords = Coordinates::from_ltwh(300, 500, 100, 30).unwrap();
        let start = 90_000 * (n + 1) * 2;
        let frame = SubtitleFrame::new(screen, coords, start, start + 90_000)
            .unwrap()
            .with_forced(n == 1)
            .with_dvd_colors(DvdColors::default());
        writer.write_picture(&frame, &bitmap).unwrap();
    }
    let (sub, index) = writer.finish().unwrap();
    fs::write(dir.join("input.sub"), sub).unwrap();
    fs::write(dir.join("input.idx"), index.to_idx_string()).unwrap();
    dir.join("input.idx")
}

fn subconv() -> process::Command {
    process::Command::new(env!("CARGO_BIN_EXE_subconv"))
}

#[test]
fn converts_to_blu_ray_with_png_and_json_files() {
    let dir = scratch_dir();
    let input = write_input(&dir);
    let output = dir.join("output.sup");
    let pngs = dir.join("pngs");
    let palette = dir.join("palette.txt");

    let status = subconv()
        .arg("--png-dir")
        .arg(&pngs)
        .arg("--export-palette")
        .arg(&palette)
        .arg("--resolution=1920x1080")
        .arg(&input)
        .arg(&output)
        .status()
        .expect("could not run command");
    assert!(status.success());
    assert!(is_sup_bd_file(&output).unwrap());
    assert!(pngs.join("index.json").exists());
    assert!(pngs.join("0000.png").exists());
    assert!(pngs.join("0001.png").exists());
    let json = fs::read_to_string(pngs.join("index.json")).unwrap();
    assert!(json.contains("\"forced\": true"));
    let palette = fs::read_to_string(&palette).unwrap();
    assert!(palette.starts_with("Color 0="));
}

#[test]
fn converts_to_dvd_sup_using_config_file() {
    let dir = scratch_dir();
    let input = write_input(&dir);
    let config = dir.join("config.json");
    fs::write(&config, r#"{ "forced": "forced-only", "delay_ms": 1000 }"#).unwrap();
    let output = dir.join("output.sup");

    let status = subconv()
        .arg("--config")
        .arg(&config)
        .arg("--dvd-sup")
        .arg(&input)
        .arg(&output)
        .status()
        .expect("could not run command");
    assert!(status.success());
    assert!(is_sup_dvd_file(&output).unwrap());
    assert!(is_ifo_file(dir.join("output.ifo")).unwrap());

    let mut warnings = Warnings::new();
    let stream = SubtitleStream::open(&output, ColorSpace::Bt601, &mut warnings).unwrap();
    assert_eq!(stream.len(), 1);
    assert!(stream.frame(0).forced());
    assert_eq!(stream.frame(0).start(), 360_000 + 90_000);
}

#[test]
fn command_line_overrides_config_file() {
    let dir = scratch_dir();
    let input = write_input(&dir);
    let config = dir.join("config.json");
    fs::write(&config, r#"{ "forced": "forced-only" }"#).unwrap();
    let output = dir.join("output.idx");

    let status = subconv()
        .arg("--config")
        .arg(&config)
        .arg("--forced=keep")
        .arg("--delay-ms=-1000")
        .arg(&input)
        .arg(&output)
        .status()
        .expect("could not run command");
    assert!(status.success());
    assert!(dir.join("output.sub").exists());

    let mut warnings = Warnings::new();
    let stream = SubtitleStream::open(&output, ColorSpace::Bt601, &mut warnings).unwrap();
    assert_eq!(stream.len(), 2);
    assert_eq!(stream.frame(0).start(), 180_000 - 90_000);
}

#[test]
fn fails_on_bad_input() {
    let dir = scratch_dir();
    let input = dir.join("garbage.sup");
    fs::write(&input, b"this is not a subtitle file").unwrap();

    let output = subconv()
        .arg(&input)
        .arg(dir.join("output.sup"))
        .output()
        .expect("could not run command");
    assert!(!output.status.success());
    assert!(!output.stderr.is_empty());
}

#[test]
fn rejects_unknown_config_fields() {
    let dir = scratch_dir();
    let input = write_input(&dir);
    let config = dir.join("config.json");
    fs::write(&config, r#"{ "no_such_option": 1 }"#).unwrap();

    let status = subconv()
        .arg("--config")
        .arg(&config)
        .arg(&input)
        .arg(dir.join("output.sup"))
        .status()
        .expect("could not run command");
    assert!(!status.success());
}
