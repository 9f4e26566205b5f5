//! Background reader thread and the latest-value slots it publishes into
//!
//! [`Receiver::spawn`] moves a byte source onto a dedicated thread that runs a
//! [`FrameReader`] until the stream closes or the receiver is stopped. Nothing
//! else ever touches the byte stream. Consumers poll at their own pace:
//!
//! - telemetry is read without consuming it, tagged with a sequence number,
//! - each image is handed out at most once.
//!
//! With `calibrate_on_start` set, the thread first runs a stationary
//! calibration. Telemetry is fed to it instead of being published and images
//! are discarded until it completes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::calibration::{Calibration, CalibrationProfile, SampleFeed, StationaryCalibration};
use crate::error::Result;
use crate::mailbox::Mailbox;
use crate::reader::{Event, FrameError, FrameReader, ReaderStats};
use crate::source::ByteSource;
use crate::types::{CalibrationSettings, ImageFrame, RawImuSample, ReaderSettings, StationarySettings};

/// Back-off after a byte source error other than a timeout
const IO_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Progress of the reader thread's stationary calibration
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationStatus {
    /// No calibration requested
    Idle,
    /// Requested, starts with the next telemetry sample
    Pending,
    Collecting { samples: usize },
    Complete(CalibrationProfile),
}

impl CalibrationStatus {
    /// The profile, once the calibration has completed
    pub fn profile(&self) -> Option<CalibrationProfile> {
        match self {
            CalibrationStatus::Complete(profile) => Some(*profile),
            _ => None,
        }
    }

    /// Whether telemetry is being withheld for calibration
    pub fn is_calibrating(&self) -> bool {
        matches!(
            self,
            CalibrationStatus::Pending | CalibrationStatus::Collecting { .. }
        )
    }
}

#[derive(Debug)]
struct Shared {
    telemetry: Mailbox<RawImuSample>,
    images: Mailbox<ImageFrame>,
    running: AtomicBool,
    calibration: Mutex<CalibrationStatus>,
    stats: Mutex<ReaderStats>,
}

/// Handle to the reader thread
///
/// Dropping the handle stops the thread and joins it. A blocked read returns
/// within the source's timeout, so the join waits at most that long.
#[derive(Debug)]
pub struct Receiver {
    shared: Arc<Shared>,
    stationary: StationarySettings,
    handle: Option<JoinHandle<()>>,
}

impl Receiver {
    /// Start the reader thread on `source`
    ///
    /// # Arguments
    /// * `source` - Byte stream from the sensor unit, usually an open serial port
    /// * `reader` - Frame reader settings
    /// * `calibration` - Whether to run a stationary calibration first, and its window
    ///
    /// # Returns
    /// The running receiver, or [`crate::Error::Io`] if the thread could not be spawned
    pub fn spawn<S>(source: S, reader: ReaderSettings, calibration: &CalibrationSettings) -> Result<Self>
    where
        S: ByteSource + Send + 'static,
    {
        let initial = if calibration.calibrate_on_start {
            CalibrationStatus::Pending
        } else {
            CalibrationStatus::Idle
        };

        let shared = Arc::new(Shared {
            telemetry: Mailbox::new(),
            images: Mailbox::new(),
            running: AtomicBool::new(true),
            calibration: Mutex::new(initial),
            stats: Mutex::new(ReaderStats::default()),
        });

        let worker = Worker {
            reader: FrameReader::with_settings(source, reader),
            shared: Arc::clone(&shared),
            stationary: calibration.stationary,
            calibration: None,
        };
        let handle = thread::Builder::new()
            .name("frame-reader".into())
            .spawn(move || worker.run())?;

        Ok(Self {
            shared,
            stationary: calibration.stationary,
            handle: Some(handle),
        })
    }

    /// Newest telemetry sample (kept) and newest undelivered image (taken)
    pub fn poll(&self) -> (Option<RawImuSample>, Option<ImageFrame>) {
        (self.latest_telemetry(), self.take_image())
    }

    pub fn latest_telemetry(&self) -> Option<RawImuSample> {
        self.shared.telemetry.peek().map(|(_, sample)| sample)
    }

    pub fn take_image(&self) -> Option<ImageFrame> {
        self.shared.images.take()
    }

    pub fn calibration_status(&self) -> CalibrationStatus {
        *self.shared.calibration.lock()
    }

    /// Restart the stationary calibration on the reader thread
    ///
    /// Telemetry publishing pauses until the new calibration completes, and
    /// the sample and image still waiting from before the request are dropped.
    pub fn recalibrate(&self) {
        info!(
            duration = self.stationary.duration,
            min_samples = self.stationary.min_samples,
            "stationary recalibration requested"
        );
        let mut status = self.shared.calibration.lock();
        *status = CalibrationStatus::Pending;
        self.shared.telemetry.clear();
        self.shared.images.clear();
    }

    /// Decoder counters as of the last processed event
    pub fn stats(&self) -> ReaderStats {
        *self.shared.stats.lock()
    }

    /// Whether the reader thread is still consuming the stream
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Ask the reader thread to exit and wait for it
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("frame reader thread panicked");
            }
        }
    }
}

impl SampleFeed for Receiver {
    fn latest_sample(&self) -> Option<(u64, RawImuSample)> {
        self.shared.telemetry.peek()
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker<S> {
    reader: FrameReader<S>,
    shared: Arc<Shared>,
    stationary: StationarySettings,
    calibration: Option<StationaryCalibration>,
}

impl<S: ByteSource> Worker<S> {
    fn run(mut self) {
        info!("frame reader started");

        while self.shared.running.load(Ordering::Acquire) {
            let event = self.reader.next_event();
            *self.shared.stats.lock() = self.reader.stats();

            match event {
                Event::Telemetry(sample) => self.on_telemetry(sample),
                Event::Image(frame) => {
                    let status = self.shared.calibration.lock();
                    if status.is_calibrating() {
                        debug!(size = frame.len(), "discarding image during calibration");
                    } else {
                        self.shared.images.post(frame);
                    }
                }
                Event::ParseError(FrameError::Closed) => {
                    info!("byte stream closed");
                    break;
                }
                Event::ParseError(FrameError::Io { .. }) => thread::sleep(IO_ERROR_BACKOFF),
                // Logged by the reader; the stream carries on
                Event::ParseError(_) => {}
            }
        }

        self.shared.running.store(false, Ordering::Release);
        let stats = self.reader.stats();
        info!(
            telemetry = stats.telemetry,
            images = stats.images,
            malformed = stats.malformed_lines,
            timeouts = stats.timeouts,
            "frame reader stopped"
        );
    }

    fn on_telemetry(&mut self, sample: RawImuSample) {
        let mut status = self.shared.calibration.lock();

        if *status == CalibrationStatus::Pending {
            self.calibration = Some(StationaryCalibration::new(self.stationary));
        }

        // Posted under the status lock so a concurrent recalibrate cannot be overtaken
        let Some(calibration) = self.calibration.as_mut() else {
            self.shared.telemetry.post(sample);
            return;
        };

        calibration.feed(&sample);
        if !calibration.is_complete() {
            *status = CalibrationStatus::Collecting {
                samples: calibration.sample_count(),
            };
            return;
        }

        match calibration.result() {
            Ok(profile) => *status = CalibrationStatus::Complete(profile),
            Err(error) => {
                warn!(%error, "stationary calibration failed");
                *status = CalibrationStatus::Idle;
            }
        }
        self.calibration = None;
    }
}
