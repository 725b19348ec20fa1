#![no_main]

extern crate libfuzzer_sys;
extern crate subpic;

use subpic::{default_dvd_palette, ColorSpace, Size, SupBdStream, SupDvdStream, Warnings};

#[export_name="rust_fuzzer_test_input"]
pub extern fn go(data: &[u8]) {
    // Just parse and ignore.
    let mut warnings = Warnings::new();
    let _ = subpic::demux(data, None, &mut warnings);
    if let Ok(stream) = SupBdStream::from_bytes(data, ColorSpace::Bt709, &mut warnings) {
        for i in 0..stream.len() {
            stream.decode(i);
        }
    }
    let screen = Size { w: 720, h: 576 };
    if let Ok(stream) = SupDvdStream::from_bytes(data, screen, default_dvd_palette(), &mut warnings) {
        for i in 0..stream.len() {
            stream.decode(i);
        }
    }
}
