//! camstream: MJPEG camera streaming with brightness-driven auto exposure

pub mod capture;
pub mod error;
pub mod exposure;
pub mod hardware;
pub mod server;
pub mod stream;
#[cfg(feature = "v4l2")]
pub mod utils;

use std::path::{Path, PathBuf};

use capture::{JpegQuality, PixelFormat};
use serde::{Deserialize, Serialize};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub sensor: SensorConfig,
    pub stream: StreamConfig,
    pub exposure: ExposureConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBackend {
    /// Built-in test pattern, no hardware needed
    Synthetic,
    /// Linux video device (requires the `v4l2` feature)
    V4l2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub backend: CaptureBackend,
    /// Device path, or "auto" to probe /dev/video*
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Frame-buffer pool size shared by all sessions
    pub buffer_count: usize,
    /// Back-off after a failed capture
    pub retry_delay_ms: u64,
    /// Base brightness of the synthetic scene
    pub scene_luma: u8,
}

/// Sensor profile applied once, on the first stream request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub quality: JpegQuality,
    pub contrast: i8,
    pub brightness: i8,
    pub saturation: i8,
    pub hmirror: bool,
    pub vflip: bool,
    pub ae_level: i8,
    /// Pause after writing the profile so AEC/AGC can settle
    pub settle_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub boundary: String,
    /// Quality for raw frames we encode ourselves (1 best .. 63 worst)
    pub jpeg_quality: JpegQuality,
    /// Pause between frames, caps the frame rate
    pub frame_interval_ms: u64,
    /// Pause after a skipped (unencodable or unsupported) frame
    pub skip_delay_ms: u64,
    pub stats_interval_ms: u64,
    /// Chunks buffered between a session and its HTTP response body
    pub channel_capacity: usize,
    /// End the session after this many unsupported frames in a row
    pub max_unsupported_frames: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureConfig {
    pub policy: ExposurePolicy,
    /// Estimate brightness on every Nth streamed frame
    pub estimate_every: u64,
    /// Background auto-exposure pass while no one streams
    pub maintenance_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExposurePolicy {
    /// Step by one when far from target, at most once per cool-down
    Hysteretic {
        #[serde(default = "default_target")]
        target: u8,
        #[serde(default = "default_tolerance")]
        tolerance: u8,
        #[serde(default = "default_cooldown_ms")]
        cooldown_ms: u64,
    },
    /// Stateless mapping of brightness onto [-2, 2]
    PiecewiseLinear {
        #[serde(default = "default_dark")]
        dark: u8,
        #[serde(default = "default_bright")]
        bright: u8,
    },
}

fn default_target() -> u8 {
    140
}

fn default_tolerance() -> u8 {
    40
}

fn default_cooldown_ms() -> u64 {
    3000
}

fn default_dark() -> u8 {
    80
}

fn default_bright() -> u8 {
    180
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory listed by `/files`; unset means no storage is mounted
    pub root: Option<PathBuf>,
    pub max_entries: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: CaptureBackend::Synthetic,
            device: "auto".into(),
            width: 640,
            height: 480,
            format: PixelFormat::Yuyv,
            buffer_count: 2,
            retry_delay_ms: 50,
            scene_luma: 100,
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            quality: JpegQuality::new(10),
            contrast: 0,
            brightness: 0,
            saturation: 0,
            hmirror: false,
            vflip: false,
            ae_level: 0,
            settle_ms: 500,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            boundary: "jpgboundary".into(),
            jpeg_quality: JpegQuality::default(),
            frame_interval_ms: 10,
            skip_delay_ms: 10,
            stats_interval_ms: 5000,
            channel_capacity: 4,
            max_unsupported_frames: None,
        }
    }
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            policy: ExposurePolicy::default(),
            estimate_every: 20,
            maintenance_interval_ms: None,
        }
    }
}

impl Default for ExposurePolicy {
    fn default() -> Self {
        ExposurePolicy::PiecewiseLinear {
            dark: default_dark(),
            bright: default_bright(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: None,
            max_entries: 50,
        }
    }
}

impl Config {
    /// Layer an optional TOML file under `CAMSTREAM__SECTION__KEY`
    /// environment variables; anything unset keeps its default.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder
            .add_source(
                config::Environment::with_prefix("CAMSTREAM")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
