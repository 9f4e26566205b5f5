//! Live ground station on a serial link
//!
//! Opens the port from `groundstation.toml` (or the defaults), runs the
//! reader thread with a startup stationary calibration, and prints the
//! attitude at 20 Hz. Images are saved as JPEG snapshots, and the telemetry log
//! is written to `telemetry.csv` on exit.
//!
//! Run with: `RUST_LOG=info cargo run --example groundstation [PORT]`

use std::error::Error;
use std::time::{Duration, Instant};

use cansat_groundstation::export::snapshot_name;
use cansat_groundstation::{
    AttitudePipeline, CalibrationProfile, Receiver, SampleFeed, StationSettings, TelemetryLog,
    available_ports, open_serial, save_image,
};
use tracing_subscriber::EnvFilter;

const DISPLAY_PERIOD: Duration = Duration::from_millis(50);
const RUN_TIME: Duration = Duration::from_secs(60);

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut settings = StationSettings::load("groundstation.toml")?;
    if let Some(port) = std::env::args().nth(1) {
        settings.serial.port = port;
    }
    settings.calibration.calibrate_on_start = true;

    println!("Available ports: {:?}", available_ports()?);
    let port = open_serial(&settings.serial)?;
    let receiver = Receiver::spawn(port, settings.reader, &settings.calibration)?;

    let mut pipeline = AttitudePipeline::with_settings(
        settings.conditioner,
        settings.filter,
        CalibrationProfile::identity(),
    );
    let mut log = TelemetryLog::new();
    let mut last_sequence = 0;
    let mut calibrated = false;
    let started = Instant::now();

    while started.elapsed() < RUN_TIME && receiver.is_running() {
        if !calibrated {
            if let Some(stationary) = receiver.calibration_status().profile() {
                // Accelerometer keeps nominal scaling; gyro offsets and noise come from the rest period
                pipeline.set_profile(CalibrationProfile::combine(&CalibrationProfile::identity(), &stationary));
                calibrated = true;
            }
        }

        if let Some(frame) = receiver.take_image() {
            let name = snapshot_name(std::time::SystemTime::now());
            if let Err(error) = save_image(&frame, &name) {
                eprintln!("Image dropped: {error}");
            }
        }

        if let Some((sequence, sample)) = receiver.latest_sample() {
            if sequence != last_sequence {
                last_sequence = sequence;
                log.push(&sample);
                if let Some(orientation) = pipeline.process(&sample) {
                    println!(
                        "Pitch: {:7.2}, Roll: {:7.2}, Yaw: {:7.2}",
                        orientation.pitch, orientation.roll, orientation.yaw
                    );
                }
            }
        }

        std::thread::sleep(DISPLAY_PERIOD);
    }

    log.save("telemetry.csv")?;
    println!("Reader stats: {:?}", receiver.stats());
    Ok(())
}
