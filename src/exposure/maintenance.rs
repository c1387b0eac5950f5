//! Periodic auto-exposure pass that runs beside the stream sessions

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::AutoExposure;
use crate::capture::FrameSource;
use crate::hardware::CameraHardware;

/// Grab one frame every `interval` and run it through `auto_exposure`.
///
/// The sensor profile goes in first so the passes step from its AE level.
/// Frames come from the same pool as the sessions; when it is busy the pass
/// is simply skipped.
pub async fn run(
    source: Arc<dyn FrameSource>,
    hardware: Arc<CameraHardware>,
    mut auto_exposure: AutoExposure,
    interval: Duration,
) {
    if let Err(e) = hardware.ensure_configured().await {
        warn!("Maintenance running on unconfigured camera: {}", e);
    }
    info!(?interval, "Auto-exposure maintenance started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let frame = match source.acquire() {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Maintenance pass skipped: {}", e);
                continue;
            }
        };

        auto_exposure.observe(&frame);
        source.release(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{FramePool, PixelFormat, SyntheticScene, SyntheticSensor, SyntheticSource};
    use crate::exposure::HystereticController;
    use crate::SensorConfig;

    fn dark_camera(luma: u8, settings: SensorConfig) -> (Arc<dyn FrameSource>, Arc<SyntheticScene>, Arc<CameraHardware>) {
        let scene = SyntheticScene::new(luma);
        let source: Arc<dyn FrameSource> = Arc::new(SyntheticSource::new(
            scene.clone(),
            FramePool::new(1),
            64,
            48,
            PixelFormat::Yuyv,
        ));
        let hardware = Arc::new(CameraHardware::new(
            Some(Box::new(SyntheticSensor::new(scene.clone()))),
            settings,
        ));
        (source, scene, hardware)
    }

    #[tokio::test(start_paused = true)]
    async fn brightens_a_dark_scene() {
        let scene = SyntheticScene::new(60);
        let pool = FramePool::new(1);
        let source: Arc<dyn FrameSource> = Arc::new(SyntheticSource::new(
            scene.clone(),
            pool.clone(),
            64,
            48,
            PixelFormat::Yuyv,
        ));
        let hardware = Arc::new(CameraHardware::new(
            Some(Box::new(SyntheticSensor::new(scene.clone()))),
            SensorConfig::default(),
        ));
        let controller = HystereticController::new(140, 40, Duration::from_secs(3));
        let auto_exposure = AutoExposure::new(Box::new(controller), hardware.clone());

        let task = tokio::spawn(run(source, hardware.clone(), auto_exposure, Duration::from_secs(1)));
        tokio::time::sleep(Duration::from_secs(10)).await;
        task.abort();

        // 60 -> 84 -> 108, which is inside the tolerance band around 140
        assert_eq!(scene.ae_level(), 2);
        assert_eq!(hardware.exposure().get(), 2);
        assert_eq!(pool.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn skips_while_the_pool_is_busy() {
        let scene = SyntheticScene::new(10);
        let pool = FramePool::new(1);
        let source: Arc<dyn FrameSource> = Arc::new(SyntheticSource::new(
            scene.clone(),
            pool.clone(),
            16,
            16,
            PixelFormat::Yuyv,
        ));
        let hardware = Arc::new(CameraHardware::new(
            Some(Box::new(SyntheticSensor::new(scene.clone()))),
            SensorConfig::default(),
        ));
        let auto_exposure = AutoExposure::new(Box::new(HystereticController::default()), hardware.clone());

        let held = source.acquire().unwrap();
        let task = tokio::spawn(run(source.clone(), hardware, auto_exposure, Duration::from_millis(100)));
        tokio::time::sleep(Duration::from_secs(1)).await;
        task.abort();

        assert_eq!(scene.ae_level(), 0);
        drop(held);
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_the_profile_level_in_a_dark_scene() {
        let settings = SensorConfig {
            ae_level: 2,
            ..SensorConfig::default()
        };
        let (source, scene, hardware) = dark_camera(40, settings);
        let controller = HystereticController::new(140, 40, Duration::from_secs(3));
        let auto_exposure = AutoExposure::new(Box::new(controller), hardware.clone());

        let task = tokio::spawn(run(source, hardware.clone(), auto_exposure, Duration::from_millis(200)));
        tokio::time::sleep(Duration::from_secs(5)).await;
        task.abort();

        assert!(hardware.is_configured());
        assert_eq!(hardware.exposure().get(), 2);
        assert_eq!(scene.ae_level(), 2);
    }
}
