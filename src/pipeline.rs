//! Raw telemetry to attitude, the way the ground station display consumes it

use tracing::info;

use crate::calibration::CalibrationProfile;
use crate::conditioner::SignalConditioner;
use crate::filter::OrientationFilter;
use crate::types::{ConditionerSettings, FilterSettings, FilterState, Orientation, PhysicalImuSample, RawImuSample};

/// Signal conditioner feeding an orientation filter, with operator pause and reset
///
/// The filter step is derived from the samples' receipt timestamps.
///
/// # Example
/// ```
/// use std::time::{Duration, SystemTime};
/// use nalgebra::Vector3;
/// use cansat_groundstation::{AttitudePipeline, RawImuSample};
///
/// let mut pipeline = AttitudePipeline::new();
/// let t0 = SystemTime::now();
/// for i in 0..10 {
///     let sample = RawImuSample::new(
///         Vector3::new(0.0, 0.0, 16384.0),
///         Vector3::zeros(),
///         t0 + Duration::from_millis(20 * i),
///     );
///     pipeline.process(&sample);
/// }
/// assert!(pipeline.orientation().roll.abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Default)]
pub struct AttitudePipeline {
    conditioner: SignalConditioner,
    filter: OrientationFilter,
    latest: Option<PhysicalImuSample>,
    paused: bool,
}

impl AttitudePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(
        conditioner: ConditionerSettings,
        filter: FilterSettings,
        profile: CalibrationProfile,
    ) -> Self {
        Self {
            conditioner: SignalConditioner::with_settings(conditioner, profile),
            filter: OrientationFilter::with_settings(filter),
            latest: None,
            paused: false,
        }
    }

    /// Condition one sample and advance the filter
    ///
    /// Returns `None` without touching any state while paused.
    pub fn process(&mut self, sample: &RawImuSample) -> Option<Orientation> {
        if self.paused {
            return None;
        }
        let conditioned = self.conditioner.condition(sample);
        self.latest = Some(conditioned);
        Some(self.filter.update_at(conditioned, sample.received_at))
    }

    pub fn orientation(&self) -> Orientation {
        self.filter.orientation()
    }

    /// Last conditioned sample, for display next to the attitude
    pub fn latest(&self) -> Option<PhysicalImuSample> {
        self.latest
    }

    pub fn set_profile(&mut self, profile: CalibrationProfile) {
        info!(offsets = ?profile.offsets(), scales = ?profile.accel_scale, "calibration profile applied");
        self.conditioner.set_profile(profile);
    }

    pub fn profile(&self) -> &CalibrationProfile {
        self.conditioner.profile()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume processing
    ///
    /// The time base restarts with the next sample, so the pause gap is not
    /// integrated.
    pub fn resume(&mut self) {
        if !self.paused {
            return;
        }
        self.paused = false;
        let state = FilterState {
            last_update: None,
            ..self.filter.state()
        };
        self.filter = OrientationFilter::with_state(self.filter.settings(), state);
    }

    /// Toggle between paused and running, returning the new paused flag
    pub fn toggle_pause(&mut self) -> bool {
        if self.paused {
            self.resume();
        } else {
            self.pause();
        }
        self.paused
    }

    /// Operator reset: zero attitude and clear smoothing history
    pub fn reset(&mut self) {
        self.conditioner.reset();
        self.filter.reset();
        self.latest = None;
        info!("attitude reset");
    }

    pub fn filter(&self) -> &OrientationFilter {
        &self.filter
    }

    pub fn conditioner(&self) -> &SignalConditioner {
        &self.conditioner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use std::time::{Duration, SystemTime};

    fn at(millis: u64, gyro_z: f64) -> RawImuSample {
        RawImuSample::new(
            Vector3::new(0.0, 0.0, 16384.0),
            Vector3::new(0.0, 0.0, gyro_z),
            SystemTime::UNIX_EPOCH + Duration::from_millis(millis),
        )
    }

    #[test]
    fn test_first_sample_is_zero() {
        let mut pipeline = AttitudePipeline::new();
        assert_eq!(pipeline.process(&at(0, 1310.0)), Some(Orientation::default()));
        assert!(pipeline.latest().is_some());
    }

    #[test]
    fn test_yaw_follows_conditioned_gyro() {
        let mut pipeline = AttitudePipeline::new();
        for i in 0..500 {
            pipeline.process(&at(i * 10, 1310.0));
        }
        // Smoothed rate climbs towards 10 °/s, so yaw stays below the raw integral
        let yaw = pipeline.orientation().yaw;
        assert!(yaw > 0.0 && yaw < 10.0 * 4.99, "yaw = {yaw}");
    }

    #[test]
    fn test_pause_freezes_state() {
        let mut pipeline = AttitudePipeline::new();
        pipeline.process(&at(0, 1310.0));
        pipeline.process(&at(10, 1310.0));
        let frozen = pipeline.orientation();

        pipeline.pause();
        assert_eq!(pipeline.process(&at(20, 1310.0)), None);
        assert_eq!(pipeline.orientation(), frozen);
    }

    #[test]
    fn test_resume_skips_pause_gap() {
        let mut pipeline = AttitudePipeline::new();
        pipeline.process(&at(0, 1310.0));
        pipeline.process(&at(10, 1310.0));
        let yaw = pipeline.orientation().yaw;

        assert!(pipeline.toggle_pause());
        assert!(!pipeline.toggle_pause());

        // An hour later: first sample only re-establishes the time base
        pipeline.process(&at(3_600_000, 1310.0));
        assert_eq!(pipeline.orientation().yaw, yaw);
    }

    #[test]
    fn test_reset_zeroes_attitude() {
        let mut pipeline = AttitudePipeline::new();
        for i in 0..50 {
            pipeline.process(&at(i * 10, 1310.0));
        }
        assert!(pipeline.orientation().yaw > 0.0);

        pipeline.reset();
        assert_eq!(pipeline.orientation(), Orientation::default());
        assert!(pipeline.latest().is_none());
        assert_eq!(pipeline.process(&at(1_000, 1310.0)), Some(Orientation::default()));
    }

    #[test]
    fn test_profile_swap() {
        let mut pipeline = AttitudePipeline::new();
        let profile = CalibrationProfile {
            gyro_offset: Vector3::new(0.0, 0.0, 1310.0),
            ..CalibrationProfile::identity()
        };
        pipeline.set_profile(profile);
        assert_eq!(pipeline.profile(), &profile);

        for i in 0..100 {
            pipeline.process(&at(i * 10, 1310.0));
        }
        assert_eq!(pipeline.orientation().yaw, 0.0);
    }
}
