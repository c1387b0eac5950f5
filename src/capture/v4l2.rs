//! V4L2 capture through memory-mapped buffers

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use color_eyre::{eyre::eyre, Result as EyreResult};
use tracing::{debug, info, instrument};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::control::{Control, Value};
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::frame::{Frame, FrameMetadata, PixelFormat};
use super::pool::FramePool;
use super::source::FrameSource;
use crate::error::{Result, StreamError};
use crate::hardware::{Sensor, SensorControl};
use crate::CaptureConfig;

// Control ids from linux/v4l2-controls.h
const CID_HFLIP: u32 = 0x0098_0914;
const CID_VFLIP: u32 = 0x0098_0915;
const CID_AUTO_EXPOSURE_BIAS: u32 = 0x009a_0913;
const CID_JPEG_COMPRESSION_QUALITY: u32 = 0x009d_0903;

fn fourcc(format: PixelFormat) -> Option<FourCC> {
    match format {
        PixelFormat::Mjpeg => Some(FourCC::new(b"MJPG")),
        PixelFormat::Yuyv => Some(FourCC::new(b"YUYV")),
        PixelFormat::Rgb565 => Some(FourCC::new(b"RGBP")),
        PixelFormat::Rgb24 => Some(FourCC::new(b"RGB3")),
        PixelFormat::Gray8 => Some(FourCC::new(b"GREY")),
    }
}

fn pixel_format(fourcc: FourCC) -> Option<PixelFormat> {
    match &fourcc.repr {
        b"MJPG" => Some(PixelFormat::Mjpeg),
        b"YUYV" => Some(PixelFormat::Yuyv),
        b"RGBP" => Some(PixelFormat::Rgb565),
        b"RGB3" => Some(PixelFormat::Rgb24),
        b"GREY" => Some(PixelFormat::Gray8),
        _ => None,
    }
}

/// Memory-mapped V4L2 capture
pub struct V4l2Source {
    stream: Mutex<MmapStream<'static>>,
    pool: FramePool,
    width: u32,
    height: u32,
    format: PixelFormat,
    sequence: AtomicU64,
}

impl V4l2Source {
    pub fn new(path: &str, config: &CaptureConfig, pool: FramePool) -> EyreResult<Self> {
        info!("Initializing V4L2 capture: {}", path);

        let device = Device::with_path(path)?;

        let caps = device.query_caps()?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(eyre!("Device doesn't support video capture"));
        }

        let mut fmt = device.format()?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = fourcc(config.format)
            .ok_or_else(|| eyre!("Unsupported pixel format {:?}", config.format))?;

        // The driver may pick something close to what we asked for
        let fmt = device.set_format(&fmt)?;
        let format = pixel_format(fmt.fourcc)
            .ok_or_else(|| eyre!("Driver negotiated unknown format {}", fmt.fourcc))?;
        info!(
            "Negotiated {}x{} {:?} ({} buffers)",
            fmt.width,
            fmt.height,
            format,
            pool.capacity()
        );

        let stream =
            MmapStream::with_buffers(&device, Type::VideoCapture, pool.capacity() as u32)?;

        Ok(Self {
            stream: Mutex::new(stream),
            pool,
            width: fmt.width,
            height: fmt.height,
            format,
            sequence: AtomicU64::new(0),
        })
    }
}

impl FrameSource for V4l2Source {
    #[instrument(skip(self), level = "trace")]
    fn acquire(&self) -> Result<Frame> {
        let slot = self
            .pool
            .checkout()
            .ok_or_else(|| StreamError::CaptureFailed("frame pool exhausted".into()))?;

        let mut stream = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        let (buf, meta) = stream
            .next()
            .map_err(|e| StreamError::CaptureFailed(e.to_string()))?;

        // The mmap'd buffer is requeued on the next dequeue, so copy out
        let used = (meta.bytesused as usize).min(buf.len());
        let data = Bytes::copy_from_slice(&buf[..used]);

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;

        Ok(Frame::new(
            data,
            FrameMetadata {
                sequence,
                width: self.width,
                height: self.height,
                format: self.format,
                device_timestamp: Some(
                    Duration::from_secs(meta.timestamp.sec as u64)
                        + Duration::from_micros(meta.timestamp.usec as u64),
                ),
            },
            slot,
        ))
    }

    fn pool(&self) -> &FramePool {
        &self.pool
    }
}

/// Sensor controls exposed through the V4L2 control interface
pub struct V4l2Sensor {
    device: Device,
}

impl V4l2Sensor {
    pub fn open(path: &str) -> EyreResult<Self> {
        Ok(Self {
            device: Device::with_path(path)?,
        })
    }

    fn set(&self, id: u32, value: Value) -> Result<()> {
        self.device
            .set_control(Control { id, value })
            .map_err(|e| StreamError::CaptureFailed(format!("control {id:#x}: {e}")))
    }
}

impl Sensor for V4l2Sensor {
    fn write(&mut self, control: SensorControl) -> Result<()> {
        match control {
            SensorControl::Quality(quality) => self.set(
                CID_JPEG_COMPRESSION_QUALITY,
                Value::Integer(i64::from(quality.to_encoder_quality())),
            ),
            SensorControl::HMirror(on) => self.set(CID_HFLIP, Value::Boolean(on)),
            SensorControl::VFlip(on) => self.set(CID_VFLIP, Value::Boolean(on)),
            SensorControl::AeLevel(level) => {
                self.set(CID_AUTO_EXPOSURE_BIAS, Value::Integer(i64::from(level.get())))
            }
            other => {
                debug!(?other, "no V4L2 mapping for control");
                Ok(())
            }
        }
    }
}
