//! CanSat ground station core - telemetry and image downlink decoding, IMU
//! calibration and attitude estimation
//!
//! The sensor unit streams raw accelerometer/gyroscope telemetry lines
//! interleaved with length-prefixed JPEG frames over one serial link. This
//! crate turns that byte stream into calibrated, smoothed pitch/roll/yaw and
//! complete image payloads.
//!
//! # Features
//!
//! - Streaming [`FrameReader`] tolerant of short reads, timeouts and out-of-band text
//! - Complementary [`OrientationFilter`] (gyro integration blended with accelerometer tilt)
//! - Stationary and six-orientation calibration behind one [`Calibration`] capability
//! - [`SignalConditioner`] with deadzone, moving average and exponential smoothing
//! - Background [`Receiver`] thread publishing into single-slot [`Mailbox`]es
//! - CSV telemetry logs, JPEG snapshots and TOML settings
//!
//! # Quick Start
//!
//! ```rust
//! use std::io::Cursor;
//! use cansat_groundstation::{AttitudePipeline, Event, FrameReader};
//!
//! let stream = b"ACC:0,0,16384;GYRO:0,0,0;\n\xAA\x00\x01\xFF".to_vec();
//! let mut reader = FrameReader::new(Cursor::new(stream));
//! let mut pipeline = AttitudePipeline::new();
//!
//! for event in &mut reader {
//!     match event {
//!         Event::Telemetry(sample) => {
//!             pipeline.process(&sample);
//!         }
//!         Event::Image(frame) => assert_eq!(frame.len(), 1),
//!         Event::ParseError(error) => eprintln!("{error}"),
//!     }
//! }
//!
//! let (pitch, roll, yaw) = pipeline.orientation().into();
//! assert_eq!((pitch, roll, yaw), (0.0, 0.0, 0.0));
//! ```
//!
//! The crate logs through [`tracing`] and never installs a subscriber.

pub mod calibration;
mod conditioner;
mod config;
mod error;
pub mod export;
mod filter;
mod mailbox;
pub mod math;
mod pipeline;
pub mod protocol;
mod reader;
mod receiver;
pub mod source;
mod types;

// Re-export all public types and functions
pub use calibration::{
    Calibration, CalibrationEngine, CalibrationProfile, CalibrationStep, SampleFeed,
    SixOrientationCalibration, StationaryCalibration, calibrate_inertial, collect_burst,
};
pub use conditioner::SignalConditioner;
pub use config::StationSettings;
pub use error::{Error, Result};
pub use export::{TelemetryLog, TelemetryRecord, save_image};
pub use filter::OrientationFilter;
pub use mailbox::Mailbox;
pub use math::{DEG_TO_RAD, QuaternionExt, RAD_TO_DEG};
pub use pipeline::AttitudePipeline;
pub use reader::{Event, FrameError, FrameReader, ReaderState, ReaderStats};
pub use receiver::{CalibrationStatus, Receiver};
pub use source::{ByteSource, SerialSettings, available_ports, open_serial};
pub use types::*;
