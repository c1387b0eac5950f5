//! Cheap scene-brightness estimation on a decimated pixel grid
//!
//! Cost is bounded by the grid, not by the frame: the step is picked so that
//! at most `(GRID_CELLS + 1)^2` pixels are visited at any resolution. Even
//! so, callers run it on a cadence (see [`EstimateCadence`]) rather than on
//! every frame.

use crate::capture::codec::decode_preview;
use crate::capture::{Frame, PixelFormat};

/// Target number of samples along the longer axis.
const GRID_CELLS: usize = 16;

/// Upper bound on the samples one estimate takes.
pub const MAX_SAMPLES: usize = (GRID_CELLS + 1) * (GRID_CELLS + 1);

/// JPEG frames are decoded at this fraction of their size.
const PREVIEW_DIVISOR: u16 = 4;

/// Mean luma of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimate {
    pub luma: u8,
    pub samples: usize,
}

/// Run brightness estimation on every `every`-th frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstimateCadence {
    every: u64,
}

impl EstimateCadence {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
        }
    }

    pub fn is_due(&self, frame_index: u64) -> bool {
        frame_index % self.every == 0
    }
}

/// Estimate a frame's brightness with the variant matching its format.
pub fn estimate(frame: &Frame) -> Option<Estimate> {
    match frame.format() {
        PixelFormat::Yuyv => estimate_yuv422(frame),
        PixelFormat::Mjpeg => estimate_jpeg(frame),
        _ => None,
    }
}

/// Average the Y bytes of a packed YUV 4:2:2 frame.
pub fn estimate_yuv422(frame: &Frame) -> Option<Estimate> {
    if frame.format() != PixelFormat::Yuyv || frame.is_empty() {
        return None;
    }
    let (width, height) = (frame.width() as usize, frame.height() as usize);
    if width == 0 || height == 0 || frame.len() < width * height * 2 {
        return None;
    }

    // Y sits on the even byte of every pixel
    average_grid(width, height, |x, y| frame.data[(y * width + x) * 2])
}

/// Decode a quarter-scale preview and average its luma.
pub fn estimate_jpeg(frame: &Frame) -> Option<Estimate> {
    if frame.format() != PixelFormat::Mjpeg || frame.is_empty() {
        return None;
    }

    let preview = decode_preview(&frame.data, PREVIEW_DIVISOR)?;
    let (width, channels) = (preview.width, preview.channels);
    let pixels = &preview.pixels;

    average_grid(preview.width, preview.height, |x, y| {
        let i = (y * width + x) * channels;
        if channels == 1 {
            pixels[i]
        } else {
            rgb_to_luma(pixels[i], pixels[i + 1], pixels[i + 2])
        }
    })
}

/// Y = 0.299 R + 0.587 G + 0.114 B
pub fn rgb_to_luma(r: u8, g: u8, b: u8) -> u8 {
    ((u32::from(r) * 299 + u32::from(g) * 587 + u32::from(b) * 114) / 1000) as u8
}

fn grid_step(width: usize, height: usize) -> usize {
    width.max(height).div_ceil(GRID_CELLS).max(1)
}

fn average_grid(width: usize, height: usize, sample: impl Fn(usize, usize) -> u8) -> Option<Estimate> {
    if width == 0 || height == 0 {
        return None;
    }
    let step = grid_step(width, height);

    let mut total = 0u64;
    let mut samples = 0usize;
    for y in (0..height).step_by(step) {
        for x in (0..width).step_by(step) {
            total += u64::from(sample(x, y));
            samples += 1;
        }
    }

    (samples > 0).then(|| Estimate {
        luma: (total / samples as u64) as u8,
        samples,
    })
}
