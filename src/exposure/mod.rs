pub mod brightness;
pub mod controller;
pub mod maintenance;

use std::sync::Arc;

use tracing::{debug, info, warn};

pub use brightness::{Estimate, EstimateCadence};
pub use controller::{ExposureController, ExposureLevel, HystereticController, PiecewiseLinearController};

use crate::capture::Frame;
use crate::hardware::CameraHardware;
use crate::ExposureConfig;

/// One auto-exposure feedback path: estimate, decide, write the register.
pub struct AutoExposure {
    controller: Box<dyn ExposureController>,
    hardware: Arc<CameraHardware>,
    last_luma: Option<u8>,
}

impl AutoExposure {
    pub fn new(controller: Box<dyn ExposureController>, hardware: Arc<CameraHardware>) -> Self {
        Self {
            controller,
            hardware,
            last_luma: None,
        }
    }

    pub fn from_config(config: &ExposureConfig, hardware: Arc<CameraHardware>) -> Self {
        let controller = controller::from_policy(&config.policy);
        Self::new(controller, hardware)
    }

    /// Brightness of the last frame that could be estimated.
    pub fn last_luma(&self) -> Option<u8> {
        self.last_luma
    }

    /// Estimate `frame` and push the controller's answer to the sensor.
    ///
    /// The controller steps from the level the sensor holds, and the
    /// register is only written when that level changes.
    pub fn observe(&mut self, frame: &Frame) -> Option<Estimate> {
        let Some(estimate) = brightness::estimate(frame) else {
            debug!(format = ?frame.format(), "Brightness not computed for frame");
            return None;
        };
        self.last_luma = Some(estimate.luma);
        metrics::histogram!("brightness_luma").record(f64::from(estimate.luma));

        let current = self.hardware.exposure();
        let level = self.controller.adjust(estimate.luma, current, frame.timestamp);
        if level != current {
            match self.hardware.set_exposure(level) {
                Ok(()) => info!(luma = estimate.luma, level = level.get(), "Exposure adjusted"),
                Err(e) => warn!(level = level.get(), "Exposure not applied: {}", e),
            }
        }

        Some(estimate)
    }
}
