//! Byte stream abstraction and the serial-port implementation
//!
//! The frame reader only needs "give me up to `n` bytes, block at most the
//! configured timeout". That is exactly `std::io::Read` on a port opened with
//! a read timeout, so every `Read` is a [`ByteSource`]:
//!
//! - `Ok(0)` means end of stream,
//! - an error of kind `TimedOut` or `WouldBlock` means the timeout expired,
//! - a short read is normal and the reader loops.

use std::io::{self, Read};

use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use tracing::info;

use crate::error::{Error, Result};
use crate::math::seconds;

/// Blocking byte stream with a read timeout
pub trait ByteSource {
    /// Read up to `buf.len()` bytes
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<R: Read + ?Sized> ByteSource for R {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }
}

/// Whether an I/O error is the source's timeout expiring
pub fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

/// Serial link settings
///
/// # Example
/// ```
/// use cansat_groundstation::SerialSettings;
///
/// let settings = SerialSettings {
///     port: "/dev/ttyACM0".into(),
///     ..Default::default()
/// };
/// assert_eq!(settings.baud_rate, 115_200);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Port name, e.g. `/dev/ttyUSB0` or `COM11`
    pub port: String,
    pub baud_rate: u32,
    /// Read timeout in seconds
    pub timeout: f64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: String::from("/dev/ttyUSB0"),
            baud_rate: 115_200,
            timeout: 2.0,
        }
    }
}

/// Open the serial link to the sensor unit
///
/// This is the only unrecoverable failure of the core: without a byte
/// stream there is nothing to decode, so the caller gets [`Error::Open`].
///
/// # Arguments
/// * `settings` - Port name, baud rate and read timeout
///
/// # Returns
/// Port handle whose reads time out after `settings.timeout` seconds
pub fn open_serial(settings: &SerialSettings) -> Result<Box<dyn SerialPort>> {
    let port = serialport::new(&settings.port, settings.baud_rate)
        .timeout(seconds(settings.timeout))
        .open()
        .map_err(|source| Error::Open {
            port: settings.port.clone(),
            source,
        })?;

    info!(
        port = %settings.port,
        baud_rate = settings.baud_rate,
        timeout = settings.timeout,
        "serial link open"
    );
    Ok(port)
}

/// Names of the serial ports present on this machine
pub fn available_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports().map_err(Error::PortEnumeration)?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
