use std::collections::VecDeque;
use std::io::{self, Cursor, Read};
use std::time::SystemTime;

use cansat_groundstation::protocol::{encode_image_frame, encode_telemetry_line};
use cansat_groundstation::{Event, FrameError, FrameReader, ImageFrame, RawImuSample, ReaderState};
use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

/// Delivers a byte stream in randomly sized reads, then reports end of stream
struct ChunkedSource {
    data: VecDeque<u8>,
    rng: Pcg64,
    max_chunk: usize,
}

impl ChunkedSource {
    fn new(data: Vec<u8>, seed: u64, max_chunk: usize) -> Self {
        Self {
            data: data.into(),
            rng: Pcg64::seed_from_u64(seed),
            max_chunk,
        }
    }
}

impl Read for ChunkedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let want = self.rng.random_range(1..=self.max_chunk).min(buf.len());
        let n = want.min(self.data.len());
        for (slot, byte) in buf.iter_mut().zip(self.data.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

/// Replays scripted chunks, where `None` stands for a read timeout
struct StutteringSource {
    script: VecDeque<Option<Vec<u8>>>,
}

impl Read for StutteringSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.script.pop_front() {
            Some(Some(chunk)) => {
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            Some(None) => Err(io::Error::from(io::ErrorKind::TimedOut)),
            None => Ok(0),
        }
    }
}

fn sample(ax: f64, az: f64) -> RawImuSample {
    RawImuSample::new(
        Vector3::new(ax, 0.0, az),
        Vector3::new(0.0, 0.0, 0.0),
        SystemTime::UNIX_EPOCH,
    )
}

fn cycle(ax: f64, payload: &[u8]) -> Vec<u8> {
    let mut bytes = encode_telemetry_line(&sample(ax, 16384.0)).into_bytes();
    bytes.extend_from_slice(&encode_image_frame(payload).unwrap());
    bytes
}

#[test]
fn test_end_to_end_example_stream() {
    let mut stream = b"ACC:100,0,16384;GYRO:0,0,0;\n".to_vec();
    stream.extend_from_slice(b"\xAA\x00\x03");
    stream.extend_from_slice(b"\x01\x02\x03");

    let events: Vec<Event> = FrameReader::new(Cursor::new(stream)).collect();
    assert_eq!(events.len(), 2);

    let Event::Telemetry(raw) = &events[0] else {
        panic!("expected telemetry, got {:?}", events[0]);
    };
    let physical = raw.to_physical();
    assert!((physical.accelerometer.x - 100.0 / 16384.0).abs() < 1e-12);
    assert_eq!(physical.accelerometer.z, 1.0);
    assert_eq!(physical.gyroscope, Vector3::zeros());

    let Event::Image(frame) = &events[1] else {
        panic!("expected image, got {:?}", events[1]);
    };
    assert_eq!(frame.as_bytes(), b"\x01\x02\x03");
}

#[test]
fn test_image_survives_arbitrary_chunking() {
    // Payload contains the marker byte and newlines on purpose
    let payload: Vec<u8> = (0..2_000u32).map(|i| (i * 37 % 256) as u8).collect();
    let stream = cycle(1.0, &payload);

    for seed in 0..64 {
        let max_chunk = 1 + (seed as usize % 17);
        let source = ChunkedSource::new(stream.clone(), seed, max_chunk);
        let events: Vec<Event> = FrameReader::new(source).collect();

        let images: Vec<&[u8]> = events
            .iter()
            .filter_map(|e| match e {
                Event::Image(frame) => Some(frame.as_bytes()),
                _ => None,
            })
            .collect();
        assert_eq!(images, vec![payload.as_slice()], "seed {seed}, max chunk {max_chunk}");
        assert!(matches!(events[0], Event::Telemetry(_)), "seed {seed}");
    }
}

#[test]
fn test_many_cycles_with_chatter() {
    let mut stream = b"boot: camera ready\r\n".to_vec();
    for i in 0..20u8 {
        stream.extend_from_slice(&cycle(f64::from(i), &[i; 50]));
        if i % 5 == 0 {
            stream.extend_from_slice(b"debug: frame sent\n");
        }
    }

    let mut reader = FrameReader::new(ChunkedSource::new(stream, 99, 64));
    let mut telemetry = 0u8;
    let mut images = 0u8;
    for event in &mut reader {
        match event {
            Event::Telemetry(raw) => {
                assert_eq!(raw.accelerometer.x, f64::from(telemetry));
                telemetry += 1;
            }
            Event::Image(frame) => {
                assert_eq!(frame.as_bytes(), [images; 50].as_slice());
                images += 1;
            }
            Event::ParseError(error) => panic!("unexpected {error}"),
        }
    }

    assert_eq!((telemetry, images), (20, 20));
    assert_eq!(reader.stats().ignored_lines, 5);
}

#[test]
fn test_malformed_line_skips_its_image() {
    // Exact wire bytes: no separator between an image and the next record
    let mut stream = b"ACC:1,2;GYRO:0,0,0;\n".to_vec();
    stream.extend_from_slice(&encode_image_frame(b"lost").unwrap());
    stream.extend_from_slice(&cycle(5.0, b"kept"));
    stream.extend_from_slice(&cycle(6.0, b"also"));

    let mut reader = FrameReader::new(Cursor::new(stream));
    let events: Vec<Event> = (&mut reader).collect();

    assert_eq!(events.len(), 5);
    assert!(matches!(
        events[0],
        Event::ParseError(FrameError::MalformedLine { .. })
    ));
    let Event::Telemetry(raw) = &events[1] else {
        panic!("expected telemetry, got {:?}", events[1]);
    };
    assert_eq!(raw.accelerometer.x, 5.0);
    assert_eq!(events[2], Event::Image(ImageFrame::new(b"kept".to_vec())));
    let Event::Telemetry(raw) = &events[3] else {
        panic!("expected telemetry, got {:?}", events[3]);
    };
    assert_eq!(raw.accelerometer.x, 6.0);
    assert_eq!(events[4], Event::Image(ImageFrame::new(b"also".to_vec())));
    assert_eq!(reader.stats().resynced_lines, 1);
}

#[test]
fn test_stream_opened_inside_jpeg() {
    // Port opened partway through an image: JPEG tail with a stray newline, no marker
    let mut stream = vec![0x8C, 0x4B, 0x0A, 0xE2, 0x00, 0x3F, 0x11, 0xFF, 0xD9];
    for i in 0..5u8 {
        stream.extend_from_slice(&cycle(f64::from(i), &[0xFF, 0xD8, i, 0xFF, 0xD9]));
    }

    for seed in 0..10 {
        let mut reader = FrameReader::new(ChunkedSource::new(stream.clone(), seed, 16));
        let mut telemetry = 0u8;
        let mut images = 0u8;
        for event in &mut reader {
            match event {
                Event::Telemetry(raw) => {
                    assert_eq!(raw.accelerometer.x, f64::from(telemetry));
                    telemetry += 1;
                }
                Event::Image(frame) => {
                    assert_eq!(frame.as_bytes(), [0xFF, 0xD8, images, 0xFF, 0xD9].as_slice());
                    images += 1;
                }
                Event::ParseError(error) => panic!("seed {seed}: unexpected {error}"),
            }
        }
        assert_eq!((telemetry, images), (5, 5), "seed {seed}");
    }
}

#[test]
fn test_timeout_mid_payload_resumes_at_next_line() {
    let first = cycle(1.0, &[0x42; 10]);
    let (truncated, late) = first.split_at(first.len() - 4);

    // The rest of the abandoned payload turns up after the timeout, glued to the next cycle
    let mut resumed = late.to_vec();
    resumed.extend_from_slice(&cycle(2.0, &[7; 3]));
    let source = StutteringSource {
        script: VecDeque::from(vec![Some(truncated.to_vec()), None, Some(resumed)]),
    };
    let mut reader = FrameReader::new(source);

    assert!(matches!(reader.next_event(), Event::Telemetry(_)));
    assert_eq!(
        reader.next_event(),
        Event::ParseError(FrameError::Timeout {
            stage: "reading the image payload"
        })
    );
    assert_eq!(reader.state(), ReaderState::SeekingLine);

    let Event::Telemetry(raw) = reader.next_event() else {
        panic!("reader did not resume");
    };
    assert_eq!(raw.accelerometer.x, 2.0);
    assert_eq!(reader.next_event(), Event::Image(ImageFrame::new(vec![7; 3])));
    assert_eq!(reader.next_event(), Event::ParseError(FrameError::Closed));
}

#[test]
fn test_end_of_stream_before_image() {
    let stream = encode_telemetry_line(&sample(0.0, 16384.0)).into_bytes();
    let events: Vec<Event> = FrameReader::new(Cursor::new(stream)).collect();

    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], Event::Telemetry(_)));
    assert!(matches!(
        events[1],
        Event::ParseError(FrameError::Timeout { .. })
    ));
}
