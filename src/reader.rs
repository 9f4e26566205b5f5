//! Streaming decoder for the interleaved telemetry/image downlink
//!
//! [`FrameReader`] owns a [`ByteSource`] and turns its bytes into [`Event`]s.
//! It keeps the telemetry/image pairing of the wire: after a telemetry line is
//! yielded the reader looks for exactly one image frame before it accepts the
//! next line. A line that fails to parse ends that cycle early. The image that
//! follows it has no newline before the next `ACC:` record, so the reader
//! strips everything in front of the last `ACC:` of a line and parses the rest.
//! The same rule recovers sync after a timeout or when the port is opened in
//! the middle of an image.
//!
//! # Example
//! ```
//! use std::io::Cursor;
//! use cansat_groundstation::{Event, FrameReader};
//!
//! let mut stream = b"ACC:100,0,16384;GYRO:0,0,0;\n".to_vec();
//! stream.extend_from_slice(&[0xAA, 0x00, 0x03, 0x01, 0x02, 0x03]);
//!
//! let mut reader = FrameReader::new(Cursor::new(stream));
//! assert!(matches!(reader.next_event(), Event::Telemetry(_)));
//! match reader.next_event() {
//!     Event::Image(frame) => assert_eq!(frame.as_bytes(), &[1, 2, 3]),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

use std::collections::VecDeque;
use std::io;
use std::time::SystemTime;

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::protocol::{self, IMAGE_MARKER, LENGTH_PREFIX_LEN, TELEMETRY_PREFIX};
use crate::source::{ByteSource, is_timeout};
use crate::types::{ImageFrame, RawImuSample, ReaderSettings};

/// What the reader produced from the stream
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Telemetry(RawImuSample),
    Image(ImageFrame),
    ParseError(FrameError),
}

/// Stream-level problems, all recoverable except [`FrameError::Closed`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Line started with `ACC:` but did not parse; no state change
    #[error("malformed telemetry line: {reason}")]
    MalformedLine { reason: String },
    /// Timeout or end of stream in the middle of a cycle; the frame is abandoned
    #[error("timed out while {stage}")]
    Timeout { stage: &'static str },
    /// Source reported an I/O error other than a timeout
    #[error("byte source failed: {kind}")]
    Io { kind: io::ErrorKind },
    /// End of stream with nothing left to decode
    #[error("byte stream closed")]
    Closed,
}

/// Position of the reader within a telemetry/image cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    SeekingLine,
    SeekingImageMarker,
    ReadingLength,
    ReadingPayload { len: usize },
}

impl ReaderState {
    fn stage(self) -> &'static str {
        match self {
            ReaderState::SeekingLine => "reading a telemetry line",
            ReaderState::SeekingImageMarker => "waiting for the image marker",
            ReaderState::ReadingLength => "reading the image length",
            ReaderState::ReadingPayload { .. } => "reading the image payload",
        }
    }
}

/// Counters describing what the reader has seen so far
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReaderStats {
    pub telemetry: u64,
    pub images: u64,
    pub malformed_lines: u64,
    pub ignored_lines: u64,
    /// Telemetry records recovered from behind the tail of a missed image
    pub resynced_lines: u64,
    pub timeouts: u64,
    /// Bytes skipped while hunting for an image marker
    pub skipped_bytes: u64,
}

enum Fill {
    Data,
    Timeout,
    Eof,
    Failed(io::Error),
}

/// Decoder for the telemetry/image downlink
pub struct FrameReader<S> {
    source: S,
    settings: ReaderSettings,
    state: ReaderState,
    pending: VecDeque<u8>,
    scratch: Vec<u8>,
    stats: ReaderStats,
    closed: bool,
}

impl<S: ByteSource> FrameReader<S> {
    /// Create a reader with default settings
    pub fn new(source: S) -> Self {
        Self::with_settings(source, ReaderSettings::default())
    }

    pub fn with_settings(source: S, settings: ReaderSettings) -> Self {
        let chunk = settings.read_chunk.max(1);
        Self {
            source,
            settings,
            state: ReaderState::SeekingLine,
            pending: VecDeque::with_capacity(chunk * 2),
            scratch: vec![0; chunk],
            stats: ReaderStats::default(),
            closed: false,
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// Give the byte source back, dropping any buffered bytes
    pub fn into_inner(self) -> S {
        self.source
    }

    /// Block until the next event
    ///
    /// Out-of-band text lines are consumed silently. Every other outcome,
    /// including a timeout, is returned so the caller can decide whether to
    /// keep going.
    pub fn next_event(&mut self) -> Event {
        loop {
            match self.state {
                ReaderState::SeekingLine => {
                    if let Some(event) = self.take_line() {
                        return event;
                    }
                    if self.pending.len() > self.settings.max_line_length {
                        self.drop_unterminated();
                    }
                    match self.fill() {
                        Fill::Data => {}
                        Fill::Timeout => {
                            self.pending.clear();
                            return self.timeout();
                        }
                        Fill::Eof if self.pending.is_empty() => {
                            self.closed = true;
                            return Event::ParseError(FrameError::Closed);
                        }
                        // Last line of a finite stream may lack its newline
                        Fill::Eof => self.pending.push_back(b'\n'),
                        Fill::Failed(error) => return self.failed(error),
                    }
                }
                ReaderState::SeekingImageMarker => {
                    match self.pending.iter().position(|&b| b == IMAGE_MARKER) {
                        Some(pos) => {
                            self.stats.skipped_bytes += pos as u64;
                            self.pending.drain(..=pos);
                            self.state = ReaderState::ReadingLength;
                            continue;
                        }
                        None => {
                            self.stats.skipped_bytes += self.pending.len() as u64;
                            self.pending.clear();
                        }
                    }
                    if let Some(event) = self.fill_or_abort() {
                        return event;
                    }
                }
                ReaderState::ReadingLength => {
                    if self.pending.len() >= LENGTH_PREFIX_LEN {
                        let prefix: Vec<u8> = self.pending.drain(..LENGTH_PREFIX_LEN).collect();
                        let len = u16::from_be_bytes([prefix[0], prefix[1]]) as usize;
                        trace!(len, "image frame header");
                        self.state = ReaderState::ReadingPayload { len };
                        continue;
                    }
                    if let Some(event) = self.fill_or_abort() {
                        return event;
                    }
                }
                ReaderState::ReadingPayload { len } => {
                    if self.pending.len() >= len {
                        let data: Vec<u8> = self.pending.drain(..len).collect();
                        self.state = ReaderState::SeekingLine;
                        self.stats.images += 1;
                        return Event::Image(ImageFrame::new(data));
                    }
                    if let Some(event) = self.fill_or_abort() {
                        return event;
                    }
                }
            }
        }
    }

    /// Pop complete lines until one is a telemetry record or the buffer has none left
    fn take_line(&mut self) -> Option<Event> {
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let decoded = protocol::decode_line(&raw);

            let line = if protocol::is_telemetry_line(&decoded) {
                decoded.as_str()
            } else if let Some(record) = protocol::telemetry_record(&decoded) {
                // Tail of a missed image frame glued to the next record
                self.stats.resynced_lines += 1;
                debug!(junk = decoded.len() - record.len(), "resynchronised on telemetry prefix");
                record
            } else {
                if !decoded.is_empty() {
                    self.stats.ignored_lines += 1;
                    trace!(line = %decoded, "ignoring out-of-band line");
                }
                continue;
            };

            return Some(match protocol::parse_telemetry_line(line, SystemTime::now()) {
                Ok(sample) => {
                    self.stats.telemetry += 1;
                    self.state = ReaderState::SeekingImageMarker;
                    Event::Telemetry(sample)
                }
                Err(error) => {
                    self.stats.malformed_lines += 1;
                    debug!(%line, %error, "skipping malformed telemetry line");
                    let reason = match error {
                        crate::Error::MalformedLine { reason } => reason,
                        other => other.to_string(),
                    };
                    Event::ParseError(FrameError::MalformedLine { reason })
                }
            });
        }
        None
    }

    /// Discard buffered text that never reached a newline
    ///
    /// A telemetry prefix past the start of the buffer is kept, since it may be
    /// the head of a record whose newline has not arrived yet.
    fn drop_unterminated(&mut self) {
        let buffered = self.pending.make_contiguous();
        let keep_from = buffered
            .windows(TELEMETRY_PREFIX.len())
            .rposition(|window| window == TELEMETRY_PREFIX.as_bytes())
            .filter(|&start| start > 0)
            .unwrap_or(buffered.len());
        trace!(bytes = keep_from, "dropping over-long unterminated text");
        self.stats.ignored_lines += 1;
        self.pending.drain(..keep_from);
    }

    /// Pull more bytes while inside an image frame, abandoning the frame on timeout or EOF
    fn fill_or_abort(&mut self) -> Option<Event> {
        match self.fill() {
            Fill::Data => None,
            Fill::Timeout | Fill::Eof => {
                self.pending.clear();
                Some(self.timeout())
            }
            Fill::Failed(error) => Some(self.failed(error)),
        }
    }

    fn fill(&mut self) -> Fill {
        match self.source.read_bytes(&mut self.scratch) {
            Ok(0) => Fill::Eof,
            Ok(n) => {
                self.pending.extend(&self.scratch[..n]);
                Fill::Data
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => Fill::Data,
            Err(error) if is_timeout(&error) => Fill::Timeout,
            Err(error) => Fill::Failed(error),
        }
    }

    fn timeout(&mut self) -> Event {
        let stage = self.state.stage();
        self.stats.timeouts += 1;
        self.state = ReaderState::SeekingLine;
        warn!(stage, "byte stream timed out");
        Event::ParseError(FrameError::Timeout { stage })
    }

    fn failed(&mut self, error: io::Error) -> Event {
        warn!(%error, stage = self.state.stage(), "byte source error");
        self.pending.clear();
        self.state = ReaderState::SeekingLine;
        Event::ParseError(FrameError::Io { kind: error.kind() })
    }
}

impl<S: ByteSource> Iterator for FrameReader<S> {
    type Item = Event;

    /// Events until the stream closes; timeouts and malformed lines are still yielded
    fn next(&mut self) -> Option<Event> {
        if self.closed {
            return None;
        }
        match self.next_event() {
            Event::ParseError(FrameError::Closed) => None,
            event => Some(event),
        }
    }
}
