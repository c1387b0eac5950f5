use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::ExposurePolicy;

/// Exposure compensation in sensor AE steps, always within [-2, 2].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i8")]
pub struct ExposureLevel(i8);

impl ExposureLevel {
    pub const MIN: i8 = -2;
    pub const MAX: i8 = 2;

    pub fn new(level: i32) -> Self {
        Self(level.clamp(i32::from(Self::MIN), i32::from(Self::MAX)) as i8)
    }

    pub fn get(self) -> i8 {
        self.0
    }

    fn step(self, delta: i32) -> Self {
        Self::new(i32::from(self.0) + delta)
    }
}

impl From<i8> for ExposureLevel {
    fn from(level: i8) -> Self {
        Self::new(i32::from(level))
    }
}

/// Maps a brightness estimate to an exposure level.
///
/// `current` is the level the sensor holds right now. It is shared by every
/// session and the maintenance task, so controllers step from it rather
/// than from a copy of their own.
pub trait ExposureController: Send {
    fn adjust(&mut self, luma: u8, current: ExposureLevel, now: Instant) -> ExposureLevel;
}

/// Build the controller a policy describes.
pub fn from_policy(policy: &ExposurePolicy) -> Box<dyn ExposureController> {
    match *policy {
        ExposurePolicy::Hysteretic {
            target,
            tolerance,
            cooldown_ms,
        } => Box::new(HystereticController::new(
            target,
            tolerance,
            Duration::from_millis(cooldown_ms),
        )),
        ExposurePolicy::PiecewiseLinear { dark, bright } => {
            Box::new(PiecewiseLinearController::new(dark, bright))
        }
    }
}

/// Rate-limited bang-bang controller.
///
/// Steps one level toward `target` when the estimate is more than
/// `tolerance` away, and then not again until `cooldown` has passed.
#[derive(Debug, Clone)]
pub struct HystereticController {
    target: u8,
    tolerance: u8,
    cooldown: Duration,
    last_adjustment: Option<Instant>,
}

impl HystereticController {
    pub fn new(target: u8, tolerance: u8, cooldown: Duration) -> Self {
        Self {
            target,
            tolerance,
            cooldown,
            last_adjustment: None,
        }
    }

    fn cooling_down(&self, now: Instant) -> bool {
        self.last_adjustment
            .is_some_and(|at| now.saturating_duration_since(at) < self.cooldown)
    }
}

impl Default for HystereticController {
    fn default() -> Self {
        Self::new(140, 40, Duration::from_secs(3))
    }
}

impl ExposureController for HystereticController {
    fn adjust(&mut self, luma: u8, current: ExposureLevel, now: Instant) -> ExposureLevel {
        let error = i32::from(self.target) - i32::from(luma);
        if error.abs() <= i32::from(self.tolerance) || self.cooling_down(now) {
            return current;
        }

        let next = current.step(error.signum());
        if next != current {
            self.last_adjustment = Some(now);
        }
        next
    }
}

/// Stateless mapping: dark scenes ramp toward +2, bright ones toward -2,
/// and the band in between gets no compensation.
#[derive(Debug, Clone)]
pub struct PiecewiseLinearController {
    dark: u8,
    bright: u8,
}

impl PiecewiseLinearController {
    pub fn new(dark: u8, bright: u8) -> Self {
        Self {
            dark: dark.max(1),
            bright: bright.min(254),
        }
    }

    pub fn map(&self, luma: u8) -> ExposureLevel {
        let luma = i32::from(luma);
        let (dark, bright) = (i32::from(self.dark), i32::from(self.bright));
        let level = if luma < dark {
            luma * 2 / dark
        } else if luma > bright {
            -((luma - bright) * 2 / (255 - bright))
        } else {
            0
        };
        ExposureLevel::new(level)
    }
}

impl Default for PiecewiseLinearController {
    fn default() -> Self {
        Self::new(80, 180)
    }
}

impl ExposureController for PiecewiseLinearController {
    fn adjust(&mut self, luma: u8, _current: ExposureLevel, _now: Instant) -> ExposureLevel {
        self.map(luma)
    }
}
