//! Complementary filter turning accelerometer + gyroscope samples into pitch, roll and yaw

use std::time::SystemTime;

use tracing::warn;

use crate::math::tilt_angles;
use crate::types::{FilterSettings, FilterState, Orientation, PhysicalImuSample};

/// Complementary attitude filter
///
/// Pitch and roll blend the integrated gyroscope rate (weight `alpha`) with
/// the tilt implied by the accelerometer (weight `1 - alpha`), so the gyro
/// gives short-term response and gravity removes long-term drift. Yaw has no
/// absolute reference and is pure gyro integration.
///
/// The first update after construction or [`reset`](Self::reset) only seeds
/// the filter: it returns the zero orientation and establishes the time base.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use cansat_groundstation::{OrientationFilter, PhysicalImuSample};
///
/// let mut filter = OrientationFilter::new();
/// let level = PhysicalImuSample::new(Vector3::new(0.0, 0.0, 1.0), Vector3::new(0.0, 10.0, 0.0));
///
/// filter.update(level, 0.0);
/// let orientation = filter.update(level, 0.1);
/// assert!((orientation.pitch - 0.98).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct OrientationFilter {
    settings: FilterSettings,
    state: FilterState,
}

impl OrientationFilter {
    /// Create a filter with default settings
    pub fn new() -> Self {
        Self::with_settings(FilterSettings::default())
    }

    pub fn with_settings(settings: FilterSettings) -> Self {
        Self::with_state(settings, FilterState::default())
    }

    /// Resume from a previously saved state
    pub fn with_state(settings: FilterSettings, state: FilterState) -> Self {
        Self { settings, state }
    }

    /// Operator reset: back to the zero orientation, next update re-seeds
    pub fn reset(&mut self) {
        self.state = FilterState::default();
    }

    pub fn settings(&self) -> FilterSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: FilterSettings) {
        self.settings = settings;
    }

    /// Snapshot of the full filter state
    pub fn state(&self) -> FilterState {
        self.state
    }

    pub fn orientation(&self) -> Orientation {
        self.state.orientation
    }

    /// Advance the filter by `delta_time` seconds
    ///
    /// A negative or non-finite `delta_time` is clamped to 0 so a clock
    /// regression can never integrate backwards.
    ///
    /// # Arguments
    /// * `sample` - Accelerometer in g and gyroscope in degrees per second
    /// * `delta_time` - Time step in seconds
    ///
    /// # Returns
    /// Pitch, roll and yaw in degrees; all zero on the first update
    pub fn update(&mut self, sample: PhysicalImuSample, delta_time: f64) -> Orientation {
        if self.state.updates == 0 {
            self.state.orientation = Orientation::default();
            self.state.updates = 1;
            return self.state.orientation;
        }

        let dt = if delta_time.is_finite() && delta_time >= 0.0 {
            delta_time
        } else {
            warn!(delta_time, "non-monotonic sample clock, clamping dt to 0");
            0.0
        };

        let alpha = self.settings.alpha;
        let (pitch_acc, roll_acc) = tilt_angles(&sample.accelerometer);
        let gyro = sample.gyroscope;
        let previous = self.state.orientation;

        self.state.orientation = Orientation {
            pitch: alpha * (previous.pitch + gyro.y * dt) + (1.0 - alpha) * pitch_acc,
            roll: alpha * (previous.roll + gyro.x * dt) + (1.0 - alpha) * roll_acc,
            yaw: previous.yaw + gyro.z * dt,
        };
        self.state.updates += 1;
        self.state.orientation
    }

    /// Advance the filter to the receipt time of a sample
    ///
    /// The step is the wall-clock delta from the newest timestamp seen so far.
    /// If `timestamp` is older than that, the step is 0 and the stored
    /// timestamp stays where it is.
    ///
    /// # Arguments
    /// * `sample` - Accelerometer in g and gyroscope in degrees per second
    /// * `timestamp` - Receipt time of the sample
    pub fn update_at(&mut self, sample: PhysicalImuSample, timestamp: SystemTime) -> Orientation {
        let delta_time = match self.state.last_update {
            None => 0.0,
            Some(last) => match timestamp.duration_since(last) {
                Ok(elapsed) => {
                    self.state.last_update = Some(timestamp);
                    elapsed.as_secs_f64()
                }
                Err(regression) => {
                    warn!(
                        regression = regression.duration().as_secs_f64(),
                        "sample clock went backwards, clamping dt to 0"
                    );
                    0.0
                }
            },
        };
        if self.state.last_update.is_none() {
            self.state.last_update = Some(timestamp);
        }

        self.update(sample, delta_time)
    }
}

impl Default for OrientationFilter {
    fn default() -> Self {
        Self::new()
    }
}
