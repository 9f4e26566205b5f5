//! Unit conversions and numeric helpers shared by the filter, calibration and conditioner

use std::time::Duration;

use nalgebra::{UnitQuaternion, Vector3};

/// Accelerometer sensitivity at the ±2 g range, in LSB per g
pub const ACCEL_LSB_PER_G: f64 = 16384.0;
/// Gyroscope sensitivity at the ±250 °/s range, in LSB per °/s
pub const GYRO_LSB_PER_DPS: f64 = 131.0;

/// Mathematical constants
pub const DEG_TO_RAD: f64 = core::f64::consts::PI / 180.0;
pub const RAD_TO_DEG: f64 = 180.0 / core::f64::consts::PI;

/// Seconds from a settings field as a `Duration`, negative or NaN becomes zero
pub(crate) fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// Pitch and roll in degrees implied by a gravity-dominated accelerometer reading
///
/// `atan2(0, 0)` is defined as 0, so a reading with `ay == az == 0` yields
/// zero roll rather than an error.
pub fn tilt_angles(accelerometer: &Vector3<f64>) -> (f64, f64) {
    let (ax, ay, az) = (accelerometer.x, accelerometer.y, accelerometer.z);
    let pitch = (-ax).atan2((ay * ay + az * az).sqrt()) * RAD_TO_DEG;
    let roll = ay.atan2(az) * RAD_TO_DEG;
    (pitch, roll)
}

/// Per-axis mean of a set of vectors, zero for an empty set
pub fn mean(samples: &[Vector3<f64>]) -> Vector3<f64> {
    if samples.is_empty() {
        return Vector3::zeros();
    }
    samples.iter().sum::<Vector3<f64>>() / samples.len() as f64
}

/// Per-axis population standard deviation, zero for fewer than two samples
pub fn std_dev(samples: &[Vector3<f64>]) -> Vector3<f64> {
    if samples.len() < 2 {
        return Vector3::zeros();
    }
    let mean = mean(samples);
    let variance = samples
        .iter()
        .map(|s| (s - mean).component_mul(&(s - mean)))
        .sum::<Vector3<f64>>()
        / samples.len() as f64;
    variance.map(f64::sqrt)
}

/// Extension trait for building quaternions from degree-valued Euler angles
pub trait QuaternionExt {
    /// Create quaternion from Euler angles in degrees
    fn from_euler_degrees(roll: f64, pitch: f64, yaw: f64) -> UnitQuaternion<f64>;
}

impl QuaternionExt for UnitQuaternion<f64> {
    fn from_euler_degrees(roll: f64, pitch: f64, yaw: f64) -> UnitQuaternion<f64> {
        UnitQuaternion::from_euler_angles(roll * DEG_TO_RAD, pitch * DEG_TO_RAD, yaw * DEG_TO_RAD)
    }
}
