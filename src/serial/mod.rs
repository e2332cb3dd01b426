pub mod interface;
pub mod protocol;
pub mod session;

pub use interface::{PortEnumerator, PortOpener, SerialLink, SystemPortOpener, BAUD_RATE, NO_PORTS_FOUND};
pub use protocol::{decode_line, Action, LineAssembler, RawEvent};
pub use session::{ReaderStats, SessionError, SessionManager, SessionState, SessionTimings};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;
