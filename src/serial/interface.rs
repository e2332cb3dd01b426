use std::io::{self, Read};
use std::time::Duration;

use serialport::{SerialPort, SerialPortType};

use super::{Result, SerialError, SerialPortInfo};

pub const BAUD_RATE: u32 = 115200;

/// Placeholder shown in the port list when the OS reports nothing
pub const NO_PORTS_FOUND: &str = "No Ports Found";

/// Lists serial endpoints as the OS currently sees them. Nothing is cached.
pub struct PortEnumerator;

impl PortEnumerator {
    /// Port names in OS order; enumeration failures are logged and yield an empty list
    pub fn list() -> Vec<String> {
        Self::list_detailed()
            .into_iter()
            .map(|info| info.port_name)
            .collect()
    }

    /// Port names, or the single "No Ports Found" entry when there are none
    pub fn list_or_sentinel() -> Vec<String> {
        with_sentinel(Self::list())
    }

    /// Ports with whatever USB metadata the OS exposes
    pub fn list_detailed() -> Vec<SerialPortInfo> {
        let ports = match serialport::available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                log::warn!("Serial port enumeration failed: {}", e);
                return Vec::new();
            }
        };

        ports
            .into_iter()
            .map(|port| match port.port_type {
                SerialPortType::UsbPort(usb_info) => SerialPortInfo {
                    port_name: port.port_name,
                    vid: Some(usb_info.vid),
                    pid: Some(usb_info.pid),
                    serial_number: usb_info.serial_number,
                    manufacturer: usb_info.manufacturer,
                    product: usb_info.product,
                },
                _ => SerialPortInfo {
                    port_name: port.port_name,
                    vid: None,
                    pid: None,
                    serial_number: None,
                    manufacturer: None,
                    product: None,
                },
            })
            .collect()
    }
}

/// Substitute the sentinel for an empty port list
pub fn with_sentinel(ports: Vec<String>) -> Vec<String> {
    if ports.is_empty() {
        vec![NO_PORTS_FOUND.to_string()]
    } else {
        ports
    }
}

/// True for names that cannot be opened: empty or the sentinel
pub fn is_placeholder(port_name: &str) -> bool {
    let trimmed = port_name.trim();
    trimmed.is_empty() || trimmed == NO_PORTS_FOUND
}

/// Byte source for the session reader. Dropping the link closes the port.
pub trait SerialLink: Send {
    /// Number of bytes that can be read without blocking
    fn bytes_available(&mut self) -> io::Result<u32>;

    /// Read up to `buf.len()` bytes, blocking at most the configured read timeout
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Opens links by port name. The session manager only talks to this seam, so
/// tests can substitute scripted ports.
pub trait PortOpener: Send + Sync {
    fn open(&self, port_name: &str, read_timeout: Duration) -> Result<Box<dyn SerialLink>>;
}

/// Opener backed by the `serialport` crate at 115200 baud
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortOpener;

impl PortOpener for SystemPortOpener {
    fn open(&self, port_name: &str, read_timeout: Duration) -> Result<Box<dyn SerialLink>> {
        let port = serialport::new(port_name, BAUD_RATE)
            .timeout(read_timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => SerialError::PortNotFound(port_name.to_string()),
                _ => SerialError::ConnectionFailed(format!("{}: {}", port_name, e)),
            })?;

        Ok(Box::new(SystemLink { port }))
    }
}

struct SystemLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink for SystemLink {
    fn bytes_available(&mut self) -> io::Result<u32> {
        self.port.bytes_to_read().map_err(io::Error::from)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut self.port, buf)
    }
}
