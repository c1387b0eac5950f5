//! Test-pattern camera that needs no hardware
//!
//! The pattern's brightness follows the exposure level written through
//! [`SyntheticSensor`], so the auto-exposure loop can be watched end to end.

use std::sync::atomic::{AtomicI8, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, instrument};

use super::codec::{encode_yuyv, JpegQuality};
use super::frame::{Frame, FrameMetadata, PixelFormat};
use super::pool::FramePool;
use super::source::FrameSource;
use crate::error::{Result, StreamError};
use crate::hardware::{Sensor, SensorControl};

/// Luma change per exposure step.
const AE_LUMA_STEP: i32 = 24;

/// Shared scene state between the synthetic source and its sensor.
#[derive(Debug)]
pub struct SyntheticScene {
    base_luma: AtomicU8,
    ae_level: AtomicI8,
}

impl SyntheticScene {
    pub fn new(base_luma: u8) -> Arc<Self> {
        Arc::new(Self {
            base_luma: AtomicU8::new(base_luma),
            ae_level: AtomicI8::new(0),
        })
    }

    pub fn ae_level(&self) -> i8 {
        self.ae_level.load(Ordering::Relaxed)
    }

    /// Mean luma the next frame will be rendered with.
    pub fn luma(&self) -> u8 {
        let base = i32::from(self.base_luma.load(Ordering::Relaxed));
        let shifted = base + i32::from(self.ae_level()) * AE_LUMA_STEP;
        shifted.clamp(0, 255) as u8
    }
}

pub struct SyntheticSource {
    scene: Arc<SyntheticScene>,
    pool: FramePool,
    width: u32,
    height: u32,
    format: PixelFormat,
    sequence: AtomicU64,
}

impl SyntheticSource {
    pub fn new(
        scene: Arc<SyntheticScene>,
        pool: FramePool,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Self {
        Self {
            scene,
            pool,
            width: width.max(2) & !1,
            height: height.max(1),
            format,
            sequence: AtomicU64::new(0),
        }
    }

    /// Horizontal ramp of +-16 around the scene luma, neutral chroma.
    fn render_yuyv(&self) -> Vec<u8> {
        let luma = i32::from(self.scene.luma());
        let width = self.width as usize;
        let mut data = Vec::with_capacity(width * self.height as usize * 2);
        for _ in 0..self.height {
            for x in (0..width).step_by(2) {
                let ramp = (x * 32 / width) as i32 - 16;
                let y = (luma + ramp).clamp(0, 255) as u8;
                data.extend_from_slice(&[y, 128, y, 128]);
            }
        }
        data
    }

    fn render(&self) -> Result<Bytes> {
        let pixels = self.width as usize * self.height as usize;
        let data = match self.format {
            PixelFormat::Yuyv => Bytes::from(self.render_yuyv()),
            PixelFormat::Mjpeg => {
                encode_yuyv(&self.render_yuyv(), self.width, self.height, JpegQuality::default())
                    .map_err(|e| StreamError::CaptureFailed(e.to_string()))?
            }
            PixelFormat::Gray8 => Bytes::from(vec![self.scene.luma(); pixels]),
            PixelFormat::Rgb24 => Bytes::from(vec![self.scene.luma(); pixels * 3]),
            PixelFormat::Rgb565 => Bytes::from(vec![0x84; pixels * 2]),
        };
        Ok(data)
    }
}

impl FrameSource for SyntheticSource {
    #[instrument(skip(self), level = "trace")]
    fn acquire(&self) -> Result<Frame> {
        let slot = self
            .pool
            .checkout()
            .ok_or_else(|| StreamError::CaptureFailed("frame pool exhausted".into()))?;

        let data = self.render()?;
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;

        Ok(Frame::new(
            data,
            FrameMetadata {
                sequence,
                width: self.width,
                height: self.height,
                format: self.format,
                device_timestamp: None,
            },
            slot,
        ))
    }

    fn pool(&self) -> &FramePool {
        &self.pool
    }
}

/// Sensor whose exposure register shifts the synthetic scene.
pub struct SyntheticSensor {
    scene: Arc<SyntheticScene>,
}

impl SyntheticSensor {
    pub fn new(scene: Arc<SyntheticScene>) -> Self {
        Self { scene }
    }
}

impl Sensor for SyntheticSensor {
    fn write(&mut self, control: SensorControl) -> Result<()> {
        match control {
            SensorControl::AeLevel(level) => {
                self.scene.ae_level.store(level.get(), Ordering::Relaxed);
            }
            other => debug!(?other, "synthetic sensor ignores control"),
        }
        Ok(())
    }
}
