//! Process-wide camera sensor configuration
//!
//! One [`CameraHardware`] handle is shared by every session. It applies the
//! start-up profile once and serialises exposure writes coming from
//! concurrent sessions or the maintenance task.

use std::sync::atomic::{AtomicBool, AtomicI8, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::capture::JpegQuality;
use crate::error::{Result, StreamError};
use crate::exposure::ExposureLevel;
use crate::SensorConfig;

/// A single sensor register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorControl {
    Quality(JpegQuality),
    Contrast(i8),
    Brightness(i8),
    Saturation(i8),
    HMirror(bool),
    VFlip(bool),
    AeLevel(ExposureLevel),
}

/// Device-side register access.
pub trait Sensor: Send {
    fn write(&mut self, control: SensorControl) -> Result<()>;
}

pub struct CameraHardware {
    sensor: Option<Mutex<Box<dyn Sensor>>>,
    settings: SensorConfig,
    configured: AtomicBool,
    level: AtomicI8,
}

impl CameraHardware {
    pub fn new(sensor: Option<Box<dyn Sensor>>, settings: SensorConfig) -> Self {
        Self {
            sensor: sensor.map(Mutex::new),
            settings,
            configured: AtomicBool::new(false),
            level: AtomicI8::new(0),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::Acquire)
    }

    /// Level last written to the sensor.
    pub fn exposure(&self) -> ExposureLevel {
        ExposureLevel::new(i32::from(self.level.load(Ordering::Acquire)))
    }

    /// Apply the start-up profile if nobody has yet.
    ///
    /// Returns `Ok(true)` for the call that did the work. Individual
    /// register failures are logged and do not stop the profile.
    pub async fn ensure_configured(&self) -> Result<bool> {
        if self.configured.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }

        let Some(sensor) = &self.sensor else {
            warn!("No camera sensor, keeping driver defaults");
            return Err(StreamError::SensorUnavailable);
        };

        let s = &self.settings;
        let ae_level = ExposureLevel::new(i32::from(s.ae_level));
        let profile = [
            SensorControl::Quality(s.quality),
            SensorControl::Contrast(s.contrast),
            SensorControl::Brightness(s.brightness),
            SensorControl::Saturation(s.saturation),
            SensorControl::HMirror(s.hmirror),
            SensorControl::VFlip(s.vflip),
            SensorControl::AeLevel(ae_level),
        ];

        {
            let mut sensor = sensor.lock().unwrap_or_else(PoisonError::into_inner);
            for control in profile {
                if let Err(e) = sensor.write(control) {
                    warn!(?control, "Sensor write failed: {}", e);
                }
            }
        }
        self.level.store(ae_level.get(), Ordering::Release);

        // Give auto gain/exposure time to settle on the new profile
        tokio::time::sleep(Duration::from_millis(s.settle_ms)).await;

        info!("Camera sensor configured");
        Ok(true)
    }

    /// Write an exposure level. `SensorUnavailable` when there is no sensor.
    pub fn set_exposure(&self, level: ExposureLevel) -> Result<()> {
        let sensor = self.sensor.as_ref().ok_or(StreamError::SensorUnavailable)?;

        let mut sensor = sensor.lock().unwrap_or_else(PoisonError::into_inner);
        sensor.write(SensorControl::AeLevel(level))?;
        self.level.store(level.get(), Ordering::Release);

        debug!(level = level.get(), "Exposure level written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<SensorControl>>>);

    impl Sensor for Recorder {
        fn write(&mut self, control: SensorControl) -> Result<()> {
            self.0.lock().unwrap().push(control);
            Ok(())
        }
    }

    fn settings() -> SensorConfig {
        SensorConfig {
            settle_ms: 0,
            ..SensorConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn profile_is_applied_once() {
        let recorder = Recorder::default();
        let hardware = CameraHardware::new(Some(Box::new(recorder.clone())), settings());

        assert!(hardware.ensure_configured().await.unwrap());
        assert!(!hardware.ensure_configured().await.unwrap());

        let writes = recorder.0.lock().unwrap();
        assert_eq!(writes.len(), 7);
        assert!(writes.contains(&SensorControl::VFlip(false)));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_sensor_is_reported_once() {
        let hardware = CameraHardware::new(None, settings());
        assert!(matches!(
            hardware.ensure_configured().await,
            Err(StreamError::SensorUnavailable)
        ));
        assert!(hardware.is_configured());
        assert!(!hardware.ensure_configured().await.unwrap());
        assert!(matches!(
            hardware.set_exposure(ExposureLevel::new(1)),
            Err(StreamError::SensorUnavailable)
        ));
        assert_eq!(hardware.exposure().get(), 0);
    }

    #[test]
    fn exposure_writes_are_tracked() {
        let recorder = Recorder::default();
        let hardware = CameraHardware::new(Some(Box::new(recorder.clone())), settings());
        hardware.set_exposure(ExposureLevel::new(-2)).unwrap();
        assert_eq!(hardware.exposure().get(), -2);
        assert_eq!(
            recorder.0.lock().unwrap().as_slice(),
            &[SensorControl::AeLevel(ExposureLevel::new(-2))]
        );
    }
}
