//! Video peripheral: packed 2-bit-per-pixel framebuffer decode.
//!
//! Each framebuffer byte carries four horizontally adjacent palette
//! indices, most significant pair first. Decode always reads the live
//! palette bytes, so a cartridge rewriting the palette region between
//! frames gets palette-cycling for free.

use crate::core::{Bus16, map};

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;
const BYTES_PER_PIXEL: usize = 4; // RGBA

/// Palette seeded at peripheral setup; cartridges overwrite it at will.
const DEFAULT_PALETTE: [[u8; 3]; 4] = [
    [15, 15, 27],    // #0F0F1B chinese black
    [86, 90, 117],   // #565A75 black coral
    [198, 183, 190], // #C6B7BE pale silver
    [250, 251, 246], // #FAFBF6 milk
];

/// Consumes decoded frames; the presentation side of the console.
pub trait VideoSink {
    fn present(&mut self, frame: &[u8]);
}

/// Discards frames (headless sessions).
pub struct NullVideo;

impl VideoSink for NullVideo {
    fn present(&mut self, _frame: &[u8]) {}
}

/// Software representation of the video decoder.
pub struct Vdp {
    pixels: Vec<u8>,
}

impl Vdp {
    /// Build the peripheral against a fresh bus, seeding the default
    /// palette into the palette region.
    pub fn new(bus: &mut Bus16) -> Self {
        for (i, color) in DEFAULT_PALETTE.iter().enumerate() {
            for (j, channel) in color.iter().enumerate() {
                bus.set(map::PALETTE + (i * 3 + j) as u16, *channel);
            }
        }
        Self {
            pixels: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT * BYTES_PER_PIXEL],
        }
    }

    /// Decode the framebuffer region through the current palette into the
    /// RGBA pixel buffer.
    pub fn render(&mut self, bus: &Bus16) -> &[u8] {
        let mut idx = 0;
        for byte_idx in 0..map::VIDEO_LEN {
            let packed = bus.get(map::VIDEO + byte_idx as u16);
            for shift in [6u8, 4, 2, 0] {
                let color = (packed >> shift) & 0x03;
                let base = map::PALETTE + color as u16 * 3;
                self.pixels[idx] = bus.get(base); // red
                self.pixels[idx + 1] = bus.get(base + 1); // green
                self.pixels[idx + 2] = bus.get(base + 2); // blue
                self.pixels[idx + 3] = 255; // alpha
                idx += BYTES_PER_PIXEL;
            }
        }
        &self.pixels
    }

    /// Decode and hand the frame to the presentation collaborator.
    pub fn present(&mut self, bus: &Bus16, sink: &mut dyn VideoSink) {
        self.render(bus);
        sink.present(&self.pixels);
    }
}
