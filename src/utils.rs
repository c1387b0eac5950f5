use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use tracing::info;
use v4l::{capability::Flags, video::Capture, Device};

use crate::capture::PixelFormat;

// Detected capture device info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoundDevice {
    pub path: String,
    pub format: PixelFormat,
}

/// Find the first capture device that streams JPEG or YUYV.
///
/// A device offering both is reported as JPEG so streaming needs no
/// re-encode.
pub fn auto_detect_device() -> Result<FoundDevice> {
    use std::path::Path;

    info!("Auto-detecting capture devices...");

    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            continue;
        }
        let Ok(formats) = dev.enum_formats() else {
            continue;
        };

        let offered: Vec<_> = formats.iter().map(|fmt| fmt.fourcc.repr).collect();
        let format = if offered.iter().any(|repr| repr == b"MJPG") {
            PixelFormat::Mjpeg
        } else if offered.iter().any(|repr| repr == b"YUYV") {
            PixelFormat::Yuyv
        } else {
            continue;
        };

        info!("Found {:?} device: {} - {}", format, path, caps.card);
        return Ok(FoundDevice { path, format });
    }

    Err(eyre!("No suitable capture device found"))
}
