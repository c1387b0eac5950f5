use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::pool::PoolSlot;

/// One captured image, checked out of the device's frame pool.
///
/// A frame is never cloned: whoever acquired it owns the pool slot until
/// [`Frame::release`] or drop hands it back.
pub struct Frame {
    /// Immutable frame data - cheap to hand to the writer without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: FrameMetadata,

    /// When the frame was acquired; drives exposure cool-downs and the
    /// conversion-time stat
    pub timestamp: Instant,

    slot: PoolSlot,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub device_timestamp: Option<Duration>, // Hardware timestamp if available
}

/// Pixel formats a camera can hand us
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Packed YUV 4:2:2 (Y0 U Y1 V)
    Yuyv,
    Mjpeg,
    Rgb565,
    Rgb24,
    Gray8,
}

impl Frame {
    pub fn new(data: Bytes, meta: FrameMetadata, slot: PoolSlot) -> Self {
        Self {
            data,
            meta,
            timestamp: Instant::now(),
            slot,
        }
    }

    pub fn format(&self) -> PixelFormat {
        self.meta.format
    }

    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Return the frame's slot to its pool. Equivalent to dropping it.
    pub fn release(self) {
        drop(self);
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("meta", &self.meta)
            .field("len", &self.data.len())
            .field("slot", &self.slot.index())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FramePool;

    fn meta(format: PixelFormat) -> FrameMetadata {
        FrameMetadata {
            sequence: 1,
            width: 4,
            height: 2,
            format,
            device_timestamp: None,
        }
    }

    #[test]
    fn releasing_a_frame_returns_its_slot() {
        let pool = FramePool::new(1);
        let slot = pool.checkout().unwrap();
        let frame = Frame::new(Bytes::from_static(&[0; 16]), meta(PixelFormat::Yuyv), slot);
        assert_eq!(pool.outstanding(), 1);
        assert!(pool.checkout().is_none());

        frame.release();
        assert_eq!(pool.outstanding(), 0);
    }
}
