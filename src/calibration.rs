//! IMU calibration procedures and the profile they produce
//!
//! Two procedures share the [`Calibration`] capability:
//!
//! - [`StationaryCalibration`] runs unattended while the unit rests level and
//!   estimates accelerometer/gyroscope offsets plus a per-axis noise floor.
//! - [`SixOrientationCalibration`] walks an operator through six face-up
//!   orientations and solves per-axis accelerometer offset and scale.
//!
//! [`CalibrationEngine`] selects one of them from [`CalibrationSettings`].

use std::thread;
use std::time::{Duration, Instant, SystemTime};

use nalgebra::Vector3;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::math::{ACCEL_LSB_PER_G, GYRO_LSB_PER_DPS, mean, seconds, std_dev};
use crate::types::{
    BurstSettings, CalibrationMode, CalibrationSettings, PhysicalImuSample, RawImuSample,
    StationarySettings,
};

/// Applies offset and scale calibration to a raw three-axis reading
///
/// Computes `(uncalibrated - offset) / scale` per axis.
///
/// # Arguments
/// * `uncalibrated` - Raw sensor reading
/// * `offset` - Bias offset to subtract from the raw reading
/// * `scale` - Raw units per physical unit for each axis
///
/// # Returns
/// Calibrated reading in physical units
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use cansat_groundstation::calibration::calibrate_inertial;
///
/// let raw = Vector3::new(100.0, -16384.0, 16484.0);
/// let offset = Vector3::new(100.0, 0.0, 100.0);
/// let scale = Vector3::new(16384.0, 16384.0, 16384.0);
///
/// let calibrated = calibrate_inertial(raw, offset, scale);
/// assert_eq!(calibrated, Vector3::new(0.0, -1.0, 1.0));
/// ```
pub fn calibrate_inertial(
    uncalibrated: Vector3<f64>,
    offset: Vector3<f64>,
    scale: Vector3<f64>,
) -> Vector3<f64> {
    (uncalibrated - offset).component_div(&scale)
}

/// Offsets, scales and noise floor of one sensor unit, in raw sensor units
///
/// The default profile is the identity: no offsets, nominal accelerometer
/// sensitivity as scale, zero noise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationProfile {
    pub accel_offset: Vector3<f64>,
    /// LSB per g for each accelerometer axis
    pub accel_scale: Vector3<f64>,
    pub gyro_offset: Vector3<f64>,
    /// Standard deviation at rest in `ax, ay, az, gx, gy, gz` order
    pub noise: [f64; 6],
}

impl Default for CalibrationProfile {
    fn default() -> Self {
        Self::identity()
    }
}

impl CalibrationProfile {
    pub fn identity() -> Self {
        Self {
            accel_offset: Vector3::zeros(),
            accel_scale: Vector3::repeat(ACCEL_LSB_PER_G),
            gyro_offset: Vector3::zeros(),
            noise: [0.0; 6],
        }
    }

    /// All six offsets in `ax, ay, az, gx, gy, gz` order
    pub fn offsets(&self) -> [f64; 6] {
        [
            self.accel_offset.x,
            self.accel_offset.y,
            self.accel_offset.z,
            self.gyro_offset.x,
            self.gyro_offset.y,
            self.gyro_offset.z,
        ]
    }

    /// Corrected physical values: accelerometer offset and scaled, gyroscope offset only
    pub fn apply(&self, sample: &RawImuSample) -> PhysicalImuSample {
        PhysicalImuSample {
            accelerometer: calibrate_inertial(
                sample.accelerometer,
                self.accel_offset,
                self.accel_scale,
            ),
            gyroscope: (sample.gyroscope - self.gyro_offset) / GYRO_LSB_PER_DPS,
        }
    }

    /// Noise floor expressed in the units [`apply`](Self::apply) produces (g and °/s)
    pub fn noise_floor(&self) -> [f64; 6] {
        let mut floor = self.noise;
        for axis in 0..3 {
            floor[axis] /= self.accel_scale[axis].abs();
            floor[axis + 3] /= GYRO_LSB_PER_DPS;
        }
        floor
    }

    /// Merge a six-orientation result with a stationary one
    ///
    /// Accelerometer offsets and scales come from `six_orientation`, gyroscope
    /// offsets and the noise floor from `stationary`.
    pub fn combine(six_orientation: &Self, stationary: &Self) -> Self {
        Self {
            accel_offset: six_orientation.accel_offset,
            accel_scale: six_orientation.accel_scale,
            gyro_offset: stationary.gyro_offset,
            noise: stationary.noise,
        }
    }
}

/// Capability shared by both calibration procedures
pub trait Calibration {
    /// Discard everything collected and start over
    fn begin(&mut self);

    /// Offer one raw sample to the procedure
    fn feed(&mut self, sample: &RawImuSample);

    fn is_complete(&self) -> bool;

    /// The profile, available once the procedure has completed
    fn result(&self) -> Result<CalibrationProfile>;
}

/// Unattended calibration while the unit rests still
///
/// Collection ends after `duration` seconds of sample timestamps or
/// `min_samples` samples, whichever comes first. Offsets are the per-axis
/// means and noise is the per-axis population standard deviation.
///
/// The accelerometer means include gravity. Use
/// [`CalibrationProfile::combine`] to pair the gyroscope offsets and noise
/// with accelerometer terms from a six-orientation run or the identity
/// profile.
#[derive(Debug, Clone)]
pub struct StationaryCalibration {
    settings: StationarySettings,
    accelerometer: Vec<Vector3<f64>>,
    gyroscope: Vec<Vector3<f64>>,
    started_at: Option<SystemTime>,
    complete: bool,
}

impl StationaryCalibration {
    pub fn new(settings: StationarySettings) -> Self {
        Self {
            settings,
            accelerometer: Vec::with_capacity(settings.min_samples),
            gyroscope: Vec::with_capacity(settings.min_samples),
            started_at: None,
            complete: false,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.accelerometer.len()
    }

    /// Raw per-axis means in `ax, ay, az, gx, gy, gz` order
    pub fn mean(&self) -> [f64; 6] {
        let a = mean(&self.accelerometer);
        let g = mean(&self.gyroscope);
        [a.x, a.y, a.z, g.x, g.y, g.z]
    }

    fn window_elapsed(&self, now: SystemTime) -> bool {
        let Some(started_at) = self.started_at else {
            return false;
        };
        now.duration_since(started_at).unwrap_or(Duration::ZERO) >= seconds(self.settings.duration)
    }
}

impl Default for StationaryCalibration {
    fn default() -> Self {
        Self::new(StationarySettings::default())
    }
}

impl Calibration for StationaryCalibration {
    fn begin(&mut self) {
        self.accelerometer.clear();
        self.gyroscope.clear();
        self.started_at = None;
        self.complete = false;
    }

    fn feed(&mut self, sample: &RawImuSample) {
        if self.complete {
            return;
        }
        self.started_at.get_or_insert(sample.received_at);
        self.accelerometer.push(sample.accelerometer);
        self.gyroscope.push(sample.gyroscope);

        if self.accelerometer.len() >= self.settings.min_samples
            || self.window_elapsed(sample.received_at)
        {
            self.complete = true;
            info!(
                samples = self.accelerometer.len(),
                mean = ?self.mean(),
                "stationary calibration complete"
            );
        }
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn result(&self) -> Result<CalibrationProfile> {
        if !self.complete {
            return Err(Error::IncompleteCalibration {
                completed: self.accelerometer.len(),
                required: self.settings.min_samples,
            });
        }

        let accel_noise = std_dev(&self.accelerometer);
        let gyro_noise = std_dev(&self.gyroscope);

        Ok(CalibrationProfile {
            accel_offset: mean(&self.accelerometer),
            accel_scale: Vector3::repeat(ACCEL_LSB_PER_G),
            gyro_offset: mean(&self.gyroscope),
            noise: [
                accel_noise.x,
                accel_noise.y,
                accel_noise.z,
                gyro_noise.x,
                gyro_noise.y,
                gyro_noise.z,
            ],
        })
    }
}

/// One pose of the six-orientation procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStep {
    ZPositive,
    ZNegative,
    XPositive,
    XNegative,
    YPositive,
    YNegative,
}

impl CalibrationStep {
    /// The poses in the order the operator performs them
    pub const ALL: [CalibrationStep; 6] = [
        CalibrationStep::ZPositive,
        CalibrationStep::ZNegative,
        CalibrationStep::XPositive,
        CalibrationStep::XNegative,
        CalibrationStep::YPositive,
        CalibrationStep::YNegative,
    ];

    pub fn label(self) -> &'static str {
        match self {
            CalibrationStep::ZPositive => "Z+",
            CalibrationStep::ZNegative => "Z-",
            CalibrationStep::XPositive => "X+",
            CalibrationStep::XNegative => "X-",
            CalibrationStep::YPositive => "Y+",
            CalibrationStep::YNegative => "Y-",
        }
    }

    /// Prompt to show the operator before sampling this pose
    pub fn instruction(self) -> &'static str {
        match self {
            CalibrationStep::ZPositive => "Place the unit with its Z+ face up, then take a sample",
            CalibrationStep::ZNegative => "Place the unit with its Z- face up, then take a sample",
            CalibrationStep::XPositive => "Place the unit with its X+ face up, then take a sample",
            CalibrationStep::XNegative => "Place the unit with its X- face up, then take a sample",
            CalibrationStep::YPositive => "Place the unit with its Y+ face up, then take a sample",
            CalibrationStep::YNegative => "Place the unit with its Y- face up, then take a sample",
        }
    }
}

/// Source of the newest telemetry sample, tagged with a sequence number
///
/// The sequence number changes whenever a new sample arrives, which lets a
/// poller tell a fresh sample from one it has already seen.
pub trait SampleFeed {
    fn latest_sample(&self) -> Option<(u64, RawImuSample)>;
}

/// Poll `feed` for fresh samples until the burst cap or the timeout is reached
///
/// The first sample present in the feed counts as fresh. Sleeps
/// `poll_interval` between polls that return nothing new.
///
/// # Arguments
/// * `feed` - Source of the newest telemetry sample
/// * `settings` - Burst cap, timeout and poll interval
///
/// # Returns
/// The fresh samples in arrival order, empty if none arrived before the timeout
pub fn collect_burst<F: SampleFeed + ?Sized>(feed: &F, settings: &BurstSettings) -> Vec<RawImuSample> {
    let deadline = Instant::now() + seconds(settings.timeout);
    let poll_interval = seconds(settings.poll_interval);
    let mut samples = Vec::with_capacity(settings.max_samples);
    let mut last_sequence = None;

    while samples.len() < settings.max_samples && Instant::now() < deadline {
        match feed.latest_sample() {
            Some((sequence, sample)) if last_sequence != Some(sequence) => {
                last_sequence = Some(sequence);
                samples.push(sample);
            }
            _ => thread::sleep(poll_interval),
        }
    }

    debug!(collected = samples.len(), "sampling burst finished");
    samples
}

/// Operator-driven calibration over six face-up poses
///
/// Each pose is sampled in a burst whose average accelerometer vector is
/// recorded. Once all six are in, each axis is solved from its own pair:
/// `offset = (pos + neg) / 2` and `scale = (pos - neg) / 2`.
///
/// # Example
/// ```
/// use std::time::SystemTime;
/// use nalgebra::Vector3;
/// use cansat_groundstation::calibration::{Calibration, CalibrationStep, SixOrientationCalibration};
/// use cansat_groundstation::RawImuSample;
///
/// let mut calibration = SixOrientationCalibration::new(1);
/// for (axis, sign) in [(2, 1.0), (2, -1.0), (0, 1.0), (0, -1.0), (1, 1.0), (1, -1.0)] {
///     let mut accel = Vector3::zeros();
///     accel[axis] = sign * 16384.0;
///     calibration.feed(&RawImuSample::new(accel, Vector3::zeros(), SystemTime::now()));
/// }
///
/// let profile = calibration.result().unwrap();
/// assert_eq!(profile.accel_offset.z, 0.0);
/// assert_eq!(profile.accel_scale.z, 16384.0);
/// ```
#[derive(Debug, Clone)]
pub struct SixOrientationCalibration {
    burst_samples: usize,
    readings: Vec<Vector3<f64>>,
    burst: Vec<Vector3<f64>>,
}

impl SixOrientationCalibration {
    /// Create a procedure whose bursts close automatically after `burst_samples` samples
    pub fn new(burst_samples: usize) -> Self {
        Self {
            burst_samples: burst_samples.max(1),
            readings: Vec::with_capacity(CalibrationStep::ALL.len()),
            burst: Vec::with_capacity(burst_samples),
        }
    }

    /// Pose the operator should hold next, `None` once all six are recorded
    pub fn current_step(&self) -> Option<CalibrationStep> {
        CalibrationStep::ALL.get(self.readings.len()).copied()
    }

    pub fn completed_steps(&self) -> usize {
        self.readings.len()
    }

    /// Close the current burst early, e.g. when its timeout expired
    ///
    /// Fails with [`Error::InsufficientSamples`] if the burst is empty. The
    /// step stays current so the operator can retry it.
    pub fn finish_step(&mut self) -> Result<()> {
        let Some(step) = self.current_step() else {
            return Ok(());
        };
        if self.burst.is_empty() {
            return Err(Error::InsufficientSamples { step: step.label() });
        }
        self.record(step);
        Ok(())
    }

    /// Sample the current pose from a live feed and record it
    ///
    /// Collects one burst with [`collect_burst`] and records its average as
    /// the current step. Exactly one step is recorded per call, whatever the
    /// burst cap, and samples already fed by hand for this step are replaced.
    ///
    /// # Arguments
    /// * `feed` - Source of the newest telemetry sample
    /// * `settings` - Burst cap, timeout and poll interval
    ///
    /// # Returns
    /// [`Error::InsufficientSamples`] if no fresh sample arrived before the
    /// timeout; the step then stays current.
    pub fn sample_step<F: SampleFeed + ?Sized>(
        &mut self,
        feed: &F,
        settings: &BurstSettings,
    ) -> Result<()> {
        let Some(step) = self.current_step() else {
            return Ok(());
        };
        let samples = collect_burst(feed, settings);
        if samples.is_empty() {
            return Err(Error::InsufficientSamples { step: step.label() });
        }

        self.burst.clear();
        self.burst.extend(samples.iter().map(|sample| sample.accelerometer));
        self.record(step);
        Ok(())
    }

    /// Store the average of the non-empty current burst as `step`
    fn record(&mut self, step: CalibrationStep) {
        let average = mean(&self.burst);
        info!(
            step = step.label(),
            samples = self.burst.len(),
            x = average.x,
            y = average.y,
            z = average.z,
            "calibration step recorded"
        );
        self.readings.push(average);
        self.burst.clear();
    }

    /// Solve one axis from its positive and negative pose readings
    fn solve_axis(&self, axis: usize, positive: usize, negative: usize) -> Result<(f64, f64)> {
        let pos = self.readings[positive][axis];
        let neg = self.readings[negative][axis];
        let scale = (pos - neg) / 2.0;
        if scale == 0.0 {
            return Err(Error::DegenerateAxis {
                axis: ['x', 'y', 'z'][axis],
            });
        }
        Ok(((pos + neg) / 2.0, scale))
    }
}

impl Default for SixOrientationCalibration {
    fn default() -> Self {
        Self::new(BurstSettings::default().max_samples)
    }
}

impl Calibration for SixOrientationCalibration {
    fn begin(&mut self) {
        self.readings.clear();
        self.burst.clear();
    }

    fn feed(&mut self, sample: &RawImuSample) {
        let Some(step) = self.current_step() else {
            return;
        };
        self.burst.push(sample.accelerometer);
        if self.burst.len() >= self.burst_samples {
            self.record(step);
        }
    }

    fn is_complete(&self) -> bool {
        self.current_step().is_none()
    }

    fn result(&self) -> Result<CalibrationProfile> {
        if !self.is_complete() {
            return Err(Error::IncompleteCalibration {
                completed: self.readings.len(),
                required: CalibrationStep::ALL.len(),
            });
        }

        // Readings follow CalibrationStep::ALL: Z+, Z-, X+, X-, Y+, Y-
        let (x_offset, x_scale) = self.solve_axis(0, 2, 3)?;
        let (y_offset, y_scale) = self.solve_axis(1, 4, 5)?;
        let (z_offset, z_scale) = self.solve_axis(2, 0, 1)?;

        Ok(CalibrationProfile {
            accel_offset: Vector3::new(x_offset, y_offset, z_offset),
            accel_scale: Vector3::new(x_scale, y_scale, z_scale),
            ..CalibrationProfile::identity()
        })
    }
}

/// Calibration procedure chosen at configuration time
#[derive(Debug, Clone)]
pub enum CalibrationEngine {
    Stationary(StationaryCalibration),
    SixOrientation(SixOrientationCalibration),
}

impl CalibrationEngine {
    pub fn new(settings: &CalibrationSettings) -> Self {
        match settings.mode {
            CalibrationMode::Stationary => {
                CalibrationEngine::Stationary(StationaryCalibration::new(settings.stationary))
            }
            CalibrationMode::SixOrientation => CalibrationEngine::SixOrientation(
                SixOrientationCalibration::new(settings.burst.max_samples),
            ),
        }
    }

    pub fn mode(&self) -> CalibrationMode {
        match self {
            CalibrationEngine::Stationary(_) => CalibrationMode::Stationary,
            CalibrationEngine::SixOrientation(_) => CalibrationMode::SixOrientation,
        }
    }

    fn procedure(&self) -> &dyn Calibration {
        match self {
            CalibrationEngine::Stationary(c) => c,
            CalibrationEngine::SixOrientation(c) => c,
        }
    }

    fn procedure_mut(&mut self) -> &mut dyn Calibration {
        match self {
            CalibrationEngine::Stationary(c) => c,
            CalibrationEngine::SixOrientation(c) => c,
        }
    }
}

impl Calibration for CalibrationEngine {
    fn begin(&mut self) {
        self.procedure_mut().begin();
    }

    fn feed(&mut self, sample: &RawImuSample) {
        self.procedure_mut().feed(sample);
    }

    fn is_complete(&self) -> bool {
        self.procedure().is_complete()
    }

    fn result(&self) -> Result<CalibrationProfile> {
        self.procedure().result()
    }
}
