pub mod codec;
pub mod frame;
pub mod pool;
pub mod source;
pub mod synthetic;
#[cfg(feature = "v4l2")]
pub mod v4l2;

use std::sync::Arc;

use color_eyre::Result;
use tracing::info;

pub use codec::{FrameEncoder, JpegFrameEncoder, JpegQuality};
pub use frame::{Frame, FrameMetadata, PixelFormat};
pub use pool::{FramePool, PoolSlot};
pub use source::FrameSource;
pub use synthetic::{SyntheticScene, SyntheticSensor, SyntheticSource};
#[cfg(feature = "v4l2")]
pub use v4l2::{V4l2Sensor, V4l2Source};

use crate::hardware::Sensor;
use crate::{CaptureBackend, CaptureConfig};

/// Open the configured camera: its frame source plus its sensor, if any.
pub fn open(config: &CaptureConfig) -> Result<(Arc<dyn FrameSource>, Option<Box<dyn Sensor>>)> {
    let pool = FramePool::new(config.buffer_count);

    match config.backend {
        CaptureBackend::Synthetic => {
            info!(
                "Using synthetic camera: {}x{} {:?}",
                config.width, config.height, config.format
            );
            let scene = SyntheticScene::new(config.scene_luma);
            let source = SyntheticSource::new(
                scene.clone(),
                pool,
                config.width,
                config.height,
                config.format,
            );
            let sensor: Box<dyn Sensor> = Box::new(SyntheticSensor::new(scene));
            Ok((Arc::new(source), Some(sensor)))
        }
        #[cfg(feature = "v4l2")]
        CaptureBackend::V4l2 => {
            let mut config = config.clone();
            let path = if config.device == "auto" {
                let found = crate::utils::auto_detect_device()?;
                config.format = found.format;
                found.path
            } else {
                config.device.clone()
            };
            info!("Using capture device: {}", path);

            let source = V4l2Source::new(&path, &config, pool)?;
            let sensor: Option<Box<dyn Sensor>> = match V4l2Sensor::open(&path) {
                Ok(sensor) => Some(Box::new(sensor)),
                Err(e) => {
                    tracing::warn!("No sensor controls for {}: {}", path, e);
                    None
                }
            };
            Ok((Arc::new(source), sensor))
        }
        #[cfg(not(feature = "v4l2"))]
        CaptureBackend::V4l2 => Err(color_eyre::eyre::eyre!(
            "V4L2 capture requested but camstream was built without the `v4l2` feature"
        )),
    }
}
