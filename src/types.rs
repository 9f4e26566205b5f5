//! Core data types and settings for the ground-station core

use std::time::SystemTime;

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::math::{ACCEL_LSB_PER_G, GYRO_LSB_PER_DPS, QuaternionExt};

/// One accelerometer + gyroscope reading exactly as the sensor unit sent it
///
/// Values are in raw sensor units (LSB). The receipt timestamp is taken from
/// the wall clock when the telemetry line was decoded, so it may step
/// backwards if the host clock is adjusted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawImuSample {
    /// Accelerometer X, Y, Z in LSB
    pub accelerometer: Vector3<f64>,
    /// Gyroscope X, Y, Z in LSB
    pub gyroscope: Vector3<f64>,
    /// Wall-clock time the line was decoded
    pub received_at: SystemTime,
}

impl RawImuSample {
    pub fn new(accelerometer: Vector3<f64>, gyroscope: Vector3<f64>, received_at: SystemTime) -> Self {
        Self {
            accelerometer,
            gyroscope,
            received_at,
        }
    }

    /// Convert to g and °/s using the nominal sensor sensitivities
    ///
    /// # Example
    /// ```
    /// use std::time::SystemTime;
    /// use nalgebra::Vector3;
    /// use cansat_groundstation::RawImuSample;
    ///
    /// let raw = RawImuSample::new(
    ///     Vector3::new(0.0, 0.0, 16384.0),
    ///     Vector3::new(131.0, 0.0, 0.0),
    ///     SystemTime::now(),
    /// );
    /// let physical = raw.to_physical();
    /// assert_eq!(physical.accelerometer.z, 1.0);
    /// assert_eq!(physical.gyroscope.x, 1.0);
    /// ```
    pub fn to_physical(&self) -> PhysicalImuSample {
        PhysicalImuSample {
            accelerometer: self.accelerometer / ACCEL_LSB_PER_G,
            gyroscope: self.gyroscope / GYRO_LSB_PER_DPS,
        }
    }

    /// All six axes in `ax, ay, az, gx, gy, gz` order
    pub fn axes(&self) -> [f64; 6] {
        [
            self.accelerometer.x,
            self.accelerometer.y,
            self.accelerometer.z,
            self.gyroscope.x,
            self.gyroscope.y,
            self.gyroscope.z,
        ]
    }
}

/// Accelerometer in g and gyroscope in °/s
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PhysicalImuSample {
    pub accelerometer: Vector3<f64>,
    pub gyroscope: Vector3<f64>,
}

impl PhysicalImuSample {
    pub fn new(accelerometer: Vector3<f64>, gyroscope: Vector3<f64>) -> Self {
        Self {
            accelerometer,
            gyroscope,
        }
    }
}

/// Attitude estimate in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Orientation {
    pub pitch: f64,
    pub roll: f64,
    /// Gyro-only integration, drifts without bound
    pub yaw: f64,
}

impl Orientation {
    /// Orientation as a unit quaternion, for renderers that want one
    pub fn to_quaternion(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_euler_degrees(self.roll, self.pitch, self.yaw)
    }
}

impl From<Orientation> for (f64, f64, f64) {
    fn from(orientation: Orientation) -> Self {
        (orientation.pitch, orientation.roll, orientation.yaw)
    }
}

/// Complete state of an orientation filter
///
/// Saving a `FilterState` and restoring it with
/// [`OrientationFilter::with_state`](crate::OrientationFilter::with_state)
/// replays identically.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FilterState {
    pub orientation: Orientation,
    /// Timestamp of the newest sample seen, never moves backwards
    pub last_update: Option<SystemTime>,
    /// Number of updates applied since construction or reset
    pub updates: u64,
}

/// A complete image payload taken off the wire
///
/// The bytes are handed over exactly as received. Decoding happens on the
/// consumer side so a corrupt picture never stalls the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFrame {
    data: Vec<u8>,
}

impl ImageFrame {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Decode the payload as a color image, format guessed from its magic bytes
    pub fn decode(&self) -> Result<image::DynamicImage> {
        image::load_from_memory(&self.data).map_err(|source| {
            tracing::warn!(size = self.data.len(), %source, "corrupt image payload, discarding");
            Error::ImageDecodeFailure {
                size: self.data.len(),
                source,
            }
        })
    }
}

/// Complementary filter settings
///
/// # Example
/// ```
/// use cansat_groundstation::{FilterSettings, OrientationFilter};
///
/// let settings = FilterSettings { alpha: 0.95 };
/// let filter = OrientationFilter::with_settings(settings);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Weight of the integrated gyroscope angle (typically 0.98)
    ///
    /// The accelerometer angle gets `1 - alpha`. Higher values respond faster
    /// to rotation but correct drift more slowly.
    pub alpha: f64,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self { alpha: 0.98 }
    }
}

/// Signal conditioning settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionerSettings {
    /// Multiple of the per-axis noise floor below which a value is forced to 0
    pub deadzone_factor: f64,
    /// Moving-average window length in samples
    pub window: usize,
    /// Exponential smoothing weight of the newest average (typically 0.05)
    pub smoothing: f64,
}

impl Default for ConditionerSettings {
    fn default() -> Self {
        Self {
            deadzone_factor: 2.0,
            window: 30,
            smoothing: 0.05,
        }
    }
}

/// Which calibration procedure the engine runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMode {
    /// Unit held still, offsets and noise estimated automatically
    #[default]
    Stationary,
    /// Operator walks through six face-up orientations
    SixOrientation,
}

/// Stationary auto-calibration window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationarySettings {
    /// Collection stops once this many seconds have elapsed
    pub duration: f64,
    /// Collection stops once this many samples are gathered
    pub min_samples: usize,
}

impl Default for StationarySettings {
    fn default() -> Self {
        Self {
            duration: 2.0,
            min_samples: 30,
        }
    }
}

/// Sampling burst used for each six-orientation step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BurstSettings {
    /// Burst stops after this many fresh samples
    pub max_samples: usize,
    /// Burst stops after this many seconds
    pub timeout: f64,
    /// Seconds to sleep between polls of the latest-sample slot
    pub poll_interval: f64,
}

impl Default for BurstSettings {
    fn default() -> Self {
        Self {
            max_samples: 30,
            timeout: 5.0,
            poll_interval: 0.01,
        }
    }
}

/// Calibration settings
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    pub mode: CalibrationMode,
    pub stationary: StationarySettings,
    pub burst: BurstSettings,
    /// Run a stationary calibration on the reader thread before publishing telemetry
    pub calibrate_on_start: bool,
}

/// Frame reader settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderSettings {
    /// Bytes requested from the source per read call
    pub read_chunk: usize,
    /// Longest text line kept while looking for a newline; longer runs are dropped
    pub max_line_length: usize,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            read_chunk: 1024,
            max_line_length: 4096,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physical_conversion() {
        let raw = RawImuSample::new(
            Vector3::new(8192.0, -16384.0, 16384.0),
            Vector3::new(262.0, -131.0, 0.0),
            SystemTime::UNIX_EPOCH,
        );
        let physical = raw.to_physical();

        assert_eq!(physical.accelerometer, Vector3::new(0.5, -1.0, 1.0));
        assert_eq!(physical.gyroscope, Vector3::new(2.0, -1.0, 0.0));
    }

    #[test]
    fn test_axes_order() {
        let raw = RawImuSample::new(
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(4.0, 5.0, 6.0),
            SystemTime::UNIX_EPOCH,
        );
        assert_eq!(raw.axes(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_orientation_tuple() {
        let orientation = Orientation {
            pitch: 1.0,
            roll: 2.0,
            yaw: 3.0,
        };
        let (pitch, roll, yaw) = orientation.into();
        assert_eq!((pitch, roll, yaw), (1.0, 2.0, 3.0));
    }

    #[test]
    fn test_level_orientation_is_identity_quaternion() {
        let q = Orientation::default().to_quaternion();
        assert!(q.angle() < 1e-12);
    }

    #[test]
    fn test_corrupt_image_reports_failure() {
        let frame = ImageFrame::new(vec![0x01, 0x02, 0x03]);
        match frame.decode() {
            Err(Error::ImageDecodeFailure { size, .. }) => assert_eq!(size, 3),
            other => panic!("expected decode failure, got {other:?}"),
        }
    }

    #[test]
    fn test_default_settings() {
        assert_eq!(FilterSettings::default().alpha, 0.98);

        let conditioner = ConditionerSettings::default();
        assert_eq!(conditioner.deadzone_factor, 2.0);
        assert_eq!(conditioner.window, 30);
        assert_eq!(conditioner.smoothing, 0.05);

        let calibration = CalibrationSettings::default();
        assert_eq!(calibration.stationary.duration, 2.0);
        assert_eq!(calibration.stationary.min_samples, 30);
        assert_eq!(calibration.burst.max_samples, 30);
        assert_eq!(calibration.burst.timeout, 5.0);
    }
}
