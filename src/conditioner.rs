//! Per-axis signal conditioning: calibrate, deadzone, moving average, exponential smoothing

use std::collections::VecDeque;

use nalgebra::Vector3;

use crate::calibration::CalibrationProfile;
use crate::types::{ConditionerSettings, PhysicalImuSample, RawImuSample};

/// Fixed-length moving average over six axes, pre-filled with zeros
#[derive(Debug, Clone)]
struct MovingAverage {
    window: VecDeque<[f64; 6]>,
}

impl MovingAverage {
    fn new(len: usize) -> Self {
        let len = len.max(1);
        Self {
            window: VecDeque::from(vec![[0.0; 6]; len]),
        }
    }

    fn push(&mut self, values: [f64; 6]) -> [f64; 6] {
        self.window.pop_front();
        self.window.push_back(values);

        let mut average = [0.0; 6];
        for entry in &self.window {
            for (sum, value) in average.iter_mut().zip(entry) {
                *sum += value;
            }
        }
        let len = self.window.len() as f64;
        average.map(|sum| sum / len)
    }

    fn clear(&mut self) {
        self.window.iter_mut().for_each(|entry| *entry = [0.0; 6]);
    }
}

/// Turns raw samples into smoothed physical values
///
/// Each axis goes through four stages:
///
/// 1. calibration with the current [`CalibrationProfile`],
/// 2. a deadzone that forces values within `deadzone_factor` noise floors to 0,
/// 3. a moving average over the last `window` values,
/// 4. exponential smoothing `β·avg + (1-β)·previous`.
///
/// # Example
/// ```
/// use std::time::SystemTime;
/// use nalgebra::Vector3;
/// use cansat_groundstation::{RawImuSample, SignalConditioner};
///
/// let mut conditioner = SignalConditioner::new();
/// let level = RawImuSample::new(Vector3::new(0.0, 0.0, 16384.0), Vector3::zeros(), SystemTime::now());
///
/// let conditioned = conditioner.condition(&level);
/// // One sample into a 30-long window, then 5% of that into the EMA
/// assert!((conditioned.accelerometer.z - 0.05 / 30.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct SignalConditioner {
    settings: ConditionerSettings,
    profile: CalibrationProfile,
    average: MovingAverage,
    smoothed: [f64; 6],
}

impl SignalConditioner {
    /// Conditioner with default settings and the identity profile
    pub fn new() -> Self {
        Self::with_settings(ConditionerSettings::default(), CalibrationProfile::identity())
    }

    pub fn with_settings(settings: ConditionerSettings, profile: CalibrationProfile) -> Self {
        Self {
            settings,
            profile,
            average: MovingAverage::new(settings.window),
            smoothed: [0.0; 6],
        }
    }

    pub fn settings(&self) -> ConditionerSettings {
        self.settings
    }

    pub fn profile(&self) -> &CalibrationProfile {
        &self.profile
    }

    /// Swap in a new profile after recalibration; smoothing history is kept
    pub fn set_profile(&mut self, profile: CalibrationProfile) {
        self.profile = profile;
    }

    /// Clear the moving-average window and the smoothed state
    pub fn reset(&mut self) {
        self.average.clear();
        self.smoothed = [0.0; 6];
    }

    /// Calibrate and deadzone one sample, without touching the smoothing history
    ///
    /// Returns the six axes in `ax, ay, az, gx, gy, gz` order.
    pub fn deadzone(&self, sample: &RawImuSample) -> [f64; 6] {
        let calibrated = self.profile.apply(sample);
        let noise = self.profile.noise_floor();
        let mut values = [
            calibrated.accelerometer.x,
            calibrated.accelerometer.y,
            calibrated.accelerometer.z,
            calibrated.gyroscope.x,
            calibrated.gyroscope.y,
            calibrated.gyroscope.z,
        ];

        for (value, noise) in values.iter_mut().zip(noise) {
            if value.abs() <= self.settings.deadzone_factor * noise {
                *value = 0.0;
            }
        }
        values
    }

    /// Run one raw sample through every stage and return the smoothed values
    ///
    /// # Arguments
    /// * `sample` - Raw reading in sensor units
    ///
    /// # Returns
    /// Accelerometer in g and gyroscope in degrees per second, after the
    /// deadzone, the moving average and the exponential smoothing
    pub fn condition(&mut self, sample: &RawImuSample) -> PhysicalImuSample {
        let average = self.average.push(self.deadzone(sample));
        let beta = self.settings.smoothing;

        for (smoothed, average) in self.smoothed.iter_mut().zip(average) {
            *smoothed = beta * average + (1.0 - beta) * *smoothed;
        }

        let s = self.smoothed;
        PhysicalImuSample::new(Vector3::new(s[0], s[1], s[2]), Vector3::new(s[3], s[4], s[5]))
    }
}

impl Default for SignalConditioner {
    fn default() -> Self {
        Self::new()
    }
}
