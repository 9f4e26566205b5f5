//! Telemetry log export and image snapshots

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::types::{ImageFrame, RawImuSample};

/// One row of the exported telemetry log, raw sensor units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Receipt time, seconds since the Unix epoch
    #[serde(rename = "Time (s)")]
    pub time: f64,
    #[serde(rename = "Accelerometer X (raw)")]
    pub ax: f64,
    #[serde(rename = "Accelerometer Y (raw)")]
    pub ay: f64,
    #[serde(rename = "Accelerometer Z (raw)")]
    pub az: f64,
    #[serde(rename = "Gyroscope X (raw)")]
    pub gx: f64,
    #[serde(rename = "Gyroscope Y (raw)")]
    pub gy: f64,
    #[serde(rename = "Gyroscope Z (raw)")]
    pub gz: f64,
}

impl From<&RawImuSample> for TelemetryRecord {
    fn from(sample: &RawImuSample) -> Self {
        let time = sample
            .received_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let [ax, ay, az, gx, gy, gz] = sample.axes();
        Self {
            time,
            ax,
            ay,
            az,
            gx,
            gy,
            gz,
        }
    }
}

impl TelemetryRecord {
    pub fn to_sample(&self) -> RawImuSample {
        let received_at = UNIX_EPOCH + crate::math::seconds(self.time);
        RawImuSample::new(
            [self.ax, self.ay, self.az].into(),
            [self.gx, self.gy, self.gz].into(),
            received_at,
        )
    }
}

/// In-memory session log of received telemetry
#[derive(Debug, Clone, Default)]
pub struct TelemetryLog {
    records: Vec<TelemetryRecord>,
}

impl TelemetryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: &RawImuSample) {
        self.records.push(sample.into());
    }

    pub fn records(&self) -> &[TelemetryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Write the log as CSV with a header row
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.write_csv(File::create(path)?)?;
        info!(path = %path.display(), records = self.records.len(), "telemetry log saved");
        Ok(())
    }

    pub fn read_csv<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let records = reader
            .deserialize()
            .collect::<std::result::Result<Vec<TelemetryRecord>, _>>()?;
        Ok(Self { records })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::read_csv(File::open(path)?)
    }
}

/// Decode an image frame and write it to `path` as JPEG
pub fn save_image(frame: &ImageFrame, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let image = frame.decode()?;
    image
        .to_rgb8()
        .save_with_format(path, ImageFormat::Jpeg)
        .map_err(Error::ImageSave)?;
    info!(path = %path.display(), width = image.width(), height = image.height(), "image saved");
    Ok(())
}

/// File name for a snapshot taken at `time`, e.g. `cansat_1700000000.jpg`
pub fn snapshot_name(time: SystemTime) -> String {
    let secs = time.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    format!("cansat_{secs}.jpg")
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use std::io::Cursor;
    use std::time::Duration;

    fn sample(seconds: u64, az: f64) -> RawImuSample {
        RawImuSample::new(
            Vector3::new(1.0, -2.0, az),
            Vector3::new(131.0, 0.0, -131.0),
            UNIX_EPOCH + Duration::from_secs(seconds),
        )
    }

    #[test]
    fn test_csv_header_and_rows() {
        let mut log = TelemetryLog::new();
        log.push(&sample(10, 16384.0));
        log.push(&sample(11, 16380.0));

        let mut out = Vec::new();
        log.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();

        assert_eq!(
            lines.next().unwrap(),
            "Time (s),Accelerometer X (raw),Accelerometer Y (raw),Accelerometer Z (raw),Gyroscope X (raw),Gyroscope Y (raw),Gyroscope Z (raw)"
        );
        assert_eq!(lines.next().unwrap(), "10.0,1.0,-2.0,16384.0,131.0,0.0,-131.0");
        assert_eq!(lines.count(), 1);
    }

    #[test]
    fn test_csv_reload_matches_samples() {
        let mut log = TelemetryLog::new();
        log.push(&sample(42, 16384.0));

        let mut out = Vec::new();
        log.write_csv(&mut out).unwrap();
        let reloaded = TelemetryLog::read_csv(Cursor::new(out)).unwrap();

        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.records()[0].to_sample(), sample(42, 16384.0));
    }

    #[test]
    fn test_clear() {
        let mut log = TelemetryLog::new();
        log.push(&sample(1, 0.0));
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_save_image_as_jpeg() {
        let mut png = Vec::new();
        image::RgbImage::from_pixel(4, 4, image::Rgb([200, 10, 10]))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let path = std::env::temp_dir().join(format!("cansat-export-{}.jpg", std::process::id()));
        save_image(&ImageFrame::new(png), &path).unwrap();

        let written = std::fs::read(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(&written[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_save_corrupt_image_fails() {
        let path = std::env::temp_dir().join("cansat-export-corrupt.jpg");
        let result = save_image(&ImageFrame::new(vec![0xFF, 0xD8, 0x00]), &path);
        assert!(matches!(result, Err(Error::ImageDecodeFailure { size: 3, .. })));
        assert!(!path.exists());
    }

    #[test]
    fn test_snapshot_name() {
        let time = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_eq!(snapshot_name(time), "cansat_1700000000.jpg");
    }
}
