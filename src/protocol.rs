//! Wire format of the sensor unit's downlink
//!
//! The unit sends one cycle after another, each made of
//!
//! 1. an ASCII telemetry line: `ACC:<ax>,<ay>,<az>;GYRO:<gx>,<gy>,<gz>;\n`
//!    with raw sensor values, and
//! 2. a binary image frame: marker byte `0xAA`, a big-endian `u16` payload
//!    length, then that many bytes of JPEG data.
//!
//! Any text line that does not start with `ACC:` is out-of-band chatter
//! (boot banners, debug prints) and is ignored. No newline separates an image
//! from the next line, so a line can also carry the tail of an image in front
//! of its `ACC:`; [`telemetry_record`] recovers the record from such a line.

use std::time::SystemTime;

use nalgebra::Vector3;

use crate::error::{Error, Result};
use crate::types::RawImuSample;

/// Marker byte that opens a binary image frame
pub const IMAGE_MARKER: u8 = 0xAA;
/// Size of the big-endian length prefix following the marker
pub const LENGTH_PREFIX_LEN: usize = 2;
/// Largest payload a frame can declare
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;
/// Prefix identifying a telemetry line
pub const TELEMETRY_PREFIX: &str = "ACC:";

const GYRO_TAG: &str = "GYRO:";

/// Turn raw line bytes into trimmed text
///
/// Bytes that are not valid UTF-8 are dropped rather than replaced, so stray
/// binary noise in front of `ACC:` does not hide the record.
pub fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|&c| c != char::REPLACEMENT_CHARACTER)
        .collect::<String>()
        .trim()
        .to_owned()
}

/// Whether a trimmed line is a telemetry record at all
pub fn is_telemetry_line(line: &str) -> bool {
    line.starts_with(TELEMETRY_PREFIX)
}

/// Locate the telemetry record inside a line that carries junk in front of it
///
/// Image bytes are followed on the wire by the next `ACC:` line with no
/// separator, so a reader that missed the frame boundary sees both glued
/// together. The last `ACC:` in the line is taken as the start of the record.
///
/// # Arguments
/// * `line` - Decoded line text
///
/// # Returns
/// The record starting at `ACC:`, or `None` if the line holds no prefix
///
/// # Example
/// ```
/// use cansat_groundstation::protocol::telemetry_record;
///
/// assert_eq!(telemetry_record("\u{4}lostACC:1,2,3;GYRO:4,5,6;"), Some("ACC:1,2,3;GYRO:4,5,6;"));
/// assert_eq!(telemetry_record("camera ok"), None);
/// ```
pub fn telemetry_record(line: &str) -> Option<&str> {
    line.rfind(TELEMETRY_PREFIX).map(|start| &line[start..])
}

/// Parse a telemetry line into a raw sample stamped with `received_at`
///
/// The three values after `ACC:` and the three after `GYRO:` are read up to
/// the next `;`. Trailing fields are ignored. Values must be finite.
///
/// # Arguments
/// * `line` - Trimmed line text starting with `ACC:`
/// * `received_at` - Receipt time stamped on the sample
///
/// # Returns
/// Raw sample in sensor units, or [`Error::MalformedLine`] with the reason
///
/// # Example
/// ```
/// use std::time::SystemTime;
/// use cansat_groundstation::protocol::parse_telemetry_line;
///
/// let sample = parse_telemetry_line("ACC:100,0,16384;GYRO:0,0,-131;", SystemTime::now()).unwrap();
/// assert_eq!(sample.accelerometer.z, 16384.0);
/// assert_eq!(sample.gyroscope.z, -131.0);
/// ```
pub fn parse_telemetry_line(line: &str, received_at: SystemTime) -> Result<RawImuSample> {
    if !is_telemetry_line(line) {
        return Err(malformed(format!("missing {TELEMETRY_PREFIX} prefix")));
    }

    let accelerometer = parse_triple(field(line, TELEMETRY_PREFIX)?, TELEMETRY_PREFIX)?;
    let gyroscope = parse_triple(field(line, GYRO_TAG)?, GYRO_TAG)?;

    Ok(RawImuSample::new(accelerometer, gyroscope, received_at))
}

/// Render a sample the way the sensor unit sends it, newline included
pub fn encode_telemetry_line(sample: &RawImuSample) -> String {
    let a = sample.accelerometer;
    let g = sample.gyroscope;
    format!(
        "ACC:{},{},{};GYRO:{},{},{};\n",
        a.x, a.y, a.z, g.x, g.y, g.z
    )
}

/// Wrap a payload in marker + length framing
///
/// # Arguments
/// * `payload` - Image bytes, at most [`MAX_PAYLOAD_LEN`] of them
///
/// # Returns
/// Marker, big-endian length and payload, or [`Error::PayloadTooLarge`]
pub fn encode_image_frame(payload: &[u8]) -> Result<Vec<u8>> {
    let len = u16::try_from(payload.len()).map_err(|_| Error::PayloadTooLarge {
        size: payload.len(),
    })?;

    let mut frame = Vec::with_capacity(1 + LENGTH_PREFIX_LEN + payload.len());
    frame.push(IMAGE_MARKER);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Text between `tag` and the following `;`
fn field<'a>(line: &'a str, tag: &str) -> Result<&'a str> {
    let (_, rest) = line
        .split_once(tag)
        .ok_or_else(|| malformed(format!("missing {tag} field")))?;
    Ok(rest.split_once(';').map_or(rest, |(value, _)| value))
}

fn parse_triple(text: &str, tag: &str) -> Result<Vector3<f64>> {
    let mut values = [0.0; 3];
    let mut parts = text.split(',');

    for value in values.iter_mut() {
        let part = parts
            .next()
            .ok_or_else(|| malformed(format!("{tag} needs three values, got {text:?}")))?;
        *value = part
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| malformed(format!("{tag} value {part:?} is not a finite number")))?;
    }

    if parts.next().is_some() {
        return Err(malformed(format!("{tag} needs three values, got {text:?}")));
    }

    Ok(Vector3::new(values[0], values[1], values[2]))
}

fn malformed(reason: String) -> Error {
    Error::MalformedLine { reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<RawImuSample> {
        parse_telemetry_line(line, SystemTime::UNIX_EPOCH)
    }

    #[test]
    fn test_parse_basic_line() {
        let sample = parse("ACC:100,-200,16384;GYRO:1.5,-2,3;").unwrap();
        assert_eq!(sample.accelerometer, Vector3::new(100.0, -200.0, 16384.0));
        assert_eq!(sample.gyroscope, Vector3::new(1.5, -2.0, 3.0));
        assert_eq!(sample.received_at, SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn test_parse_ignores_trailing_fields() {
        let sample = parse("ACC:1,2,3;GYRO:4,5,6;TEMP:25.1;").unwrap();
        assert_eq!(sample.gyroscope, Vector3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_parse_without_final_semicolon() {
        let sample = parse("ACC:1,2,3;GYRO:4,5,6").unwrap();
        assert_eq!(sample.gyroscope, Vector3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_parse_tolerates_spaces() {
        let sample = parse("ACC: 1, 2 ,3;GYRO:4 ,5, 6;").unwrap();
        assert_eq!(sample.accelerometer, Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_parse_rejects_missing_gyro() {
        assert!(matches!(
            parse("ACC:1,2,3;"),
            Err(Error::MalformedLine { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_wrong_arity() {
        assert!(parse("ACC:1,2;GYRO:4,5,6;").is_err());
        assert!(parse("ACC:1,2,3,4;GYRO:4,5,6;").is_err());
        assert!(parse("ACC:1,2,3;GYRO:4,5;").is_err());
    }

    #[test]
    fn test_parse_rejects_garbage_and_non_finite() {
        assert!(parse("ACC:1,x,3;GYRO:4,5,6;").is_err());
        assert!(parse("ACC:1,NaN,3;GYRO:4,5,6;").is_err());
        assert!(parse("ACC:1,2,3;GYRO:inf,5,6;").is_err());
    }

    #[test]
    fn test_parse_rejects_other_prefix() {
        assert!(parse("BOOT OK").is_err());
    }

    #[test]
    fn test_decode_line_trims_and_drops_invalid_utf8() {
        assert_eq!(decode_line(b"\xffACC:1,2,3;GYRO:4,5,6;\r"), "ACC:1,2,3;GYRO:4,5,6;");
        assert!(is_telemetry_line(&decode_line(b"  ACC:0,0,0;GYRO:0,0,0;  ")));
        assert!(!is_telemetry_line(&decode_line(b"camera init ok")));
    }

    #[test]
    fn test_telemetry_record_behind_image_bytes() {
        let mut glued = encode_image_frame(b"\xff\xd9").unwrap();
        glued.extend_from_slice(b"ACC:7,8,9;GYRO:0,0,0;");
        let line = decode_line(&glued);

        assert!(!is_telemetry_line(&line));
        assert_eq!(telemetry_record(&line), Some("ACC:7,8,9;GYRO:0,0,0;"));
        assert_eq!(telemetry_record("ACC:1,2,3;GYRO:4,5,6;"), Some("ACC:1,2,3;GYRO:4,5,6;"));
        assert_eq!(telemetry_record("GYRO:1,2,3;"), None);
    }

    #[test]
    fn test_encode_line_parses_back() {
        let sample = RawImuSample::new(
            Vector3::new(-12.0, 34.0, 16000.0),
            Vector3::new(0.5, -7.0, 131.0),
            SystemTime::UNIX_EPOCH,
        );
        let line = encode_telemetry_line(&sample);
        assert!(line.ends_with('\n'));
        assert_eq!(parse(line.trim()).unwrap(), sample);
    }

    #[test]
    fn test_encode_image_frame_layout() {
        let frame = encode_image_frame(&[1, 2, 3]).unwrap();
        assert_eq!(frame, vec![0xAA, 0x00, 0x03, 1, 2, 3]);

        let frame = encode_image_frame(&vec![0u8; 0x0102]).unwrap();
        assert_eq!(&frame[..3], &[0xAA, 0x01, 0x02]);
    }

    #[test]
    fn test_encode_image_frame_rejects_oversized_payload() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        assert!(matches!(
            encode_image_frame(&payload),
            Err(Error::PayloadTooLarge { size }) if size == MAX_PAYLOAD_LEN + 1
        ));
    }
}
