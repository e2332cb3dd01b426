pub mod pad;
#[cfg(target_os = "windows")]
pub mod vigem;

pub use pad::{NullDevice, PadBackend, VirtualPad};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum GamepadError {
    #[error("Virtual gamepad unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to submit gamepad report: {0}")]
    Submit(String),

    #[error("Unknown gamepad button: {0}")]
    UnknownButton(String),
}

pub type Result<T> = std::result::Result<T, GamepadError>;

/// Buttons of the virtual Xbox 360 pad that a controller input can drive.
///
/// Names match the XUSB constants used in the mapping file; `mask` gives the
/// bit each button occupies in the XUSB report's `wButtons` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum XboxButton {
    #[serde(rename = "XUSB_GAMEPAD_A")]
    A,
    #[serde(rename = "XUSB_GAMEPAD_B")]
    B,
    #[serde(rename = "XUSB_GAMEPAD_X")]
    X,
    #[serde(rename = "XUSB_GAMEPAD_Y")]
    Y,
    #[serde(rename = "XUSB_GAMEPAD_LB")]
    LeftShoulder,
    #[serde(rename = "XUSB_GAMEPAD_RB")]
    RightShoulder,
    #[serde(rename = "XUSB_GAMEPAD_BACK")]
    Back,
    #[serde(rename = "XUSB_GAMEPAD_START")]
    Start,
    #[serde(rename = "XUSB_GAMEPAD_DPAD_UP")]
    DpadUp,
    #[serde(rename = "XUSB_GAMEPAD_DPAD_DOWN")]
    DpadDown,
    #[serde(rename = "XUSB_GAMEPAD_DPAD_LEFT")]
    DpadLeft,
    #[serde(rename = "XUSB_GAMEPAD_DPAD_RIGHT")]
    DpadRight,
}

impl XboxButton {
    /// Every assignable button, in the order offered to the user
    pub const ALL: [XboxButton; 12] = [
        XboxButton::A,
        XboxButton::B,
        XboxButton::X,
        XboxButton::Y,
        XboxButton::LeftShoulder,
        XboxButton::RightShoulder,
        XboxButton::Back,
        XboxButton::Start,
        XboxButton::DpadUp,
        XboxButton::DpadDown,
        XboxButton::DpadLeft,
        XboxButton::DpadRight,
    ];

    pub fn name(self) -> &'static str {
        match self {
            XboxButton::A => "XUSB_GAMEPAD_A",
            XboxButton::B => "XUSB_GAMEPAD_B",
            XboxButton::X => "XUSB_GAMEPAD_X",
            XboxButton::Y => "XUSB_GAMEPAD_Y",
            XboxButton::LeftShoulder => "XUSB_GAMEPAD_LB",
            XboxButton::RightShoulder => "XUSB_GAMEPAD_RB",
            XboxButton::Back => "XUSB_GAMEPAD_BACK",
            XboxButton::Start => "XUSB_GAMEPAD_START",
            XboxButton::DpadUp => "XUSB_GAMEPAD_DPAD_UP",
            XboxButton::DpadDown => "XUSB_GAMEPAD_DPAD_DOWN",
            XboxButton::DpadLeft => "XUSB_GAMEPAD_DPAD_LEFT",
            XboxButton::DpadRight => "XUSB_GAMEPAD_DPAD_RIGHT",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|button| button.name() == name)
    }

    /// XUSB_BUTTON bit for this button
    pub fn mask(self) -> u16 {
        match self {
            XboxButton::DpadUp => 0x0001,
            XboxButton::DpadDown => 0x0002,
            XboxButton::DpadLeft => 0x0004,
            XboxButton::DpadRight => 0x0008,
            XboxButton::Start => 0x0010,
            XboxButton::Back => 0x0020,
            XboxButton::LeftShoulder => 0x0100,
            XboxButton::RightShoulder => 0x0200,
            XboxButton::A => 0x1000,
            XboxButton::B => 0x2000,
            XboxButton::X => 0x4000,
            XboxButton::Y => 0x8000,
        }
    }
}

impl fmt::Display for XboxButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for XboxButton {
    type Err = GamepadError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s.trim()).ok_or_else(|| GamepadError::UnknownButton(s.to_string()))
    }
}

/// Staged press/release with an explicit flush.
///
/// `press` and `release` only change the staged button set; nothing reaches the
/// driver until `commit`. An adapter whose driver could not be reached reports
/// `is_available() == false` and the router stops driving it.
pub trait OutputDevice: Send {
    fn press(&mut self, button: XboxButton);

    fn release(&mut self, button: XboxButton);

    fn commit(&mut self) -> Result<()>;

    fn is_available(&self) -> bool {
        true
    }

    /// Whether this adapter can drive `button` at all
    fn supports(&self, _button: XboxButton) -> bool {
        true
    }
}

/// Connect to the platform's virtual gamepad driver.
///
/// Never fails: when the driver is missing the returned adapter is a no-op
/// sink, and the reason is logged once here.
pub fn connect() -> Box<dyn OutputDevice> {
    #[cfg(target_os = "windows")]
    {
        let device: Box<dyn OutputDevice> = match vigem::VigemBackend::connect() {
            Ok(backend) => {
                log::info!("Virtual Xbox 360 gamepad initialized");
                Box::new(VirtualPad::new(backend))
            }
            Err(e) => {
                log::error!("Virtual gamepad init failed (is ViGEmBus installed?): {}", e);
                Box::new(NullDevice::new())
            }
        };
        device
    }

    #[cfg(not(target_os = "windows"))]
    {
        log::warn!("Virtual gamepad driver not supported on this platform, running display-only");
        Box::new(NullDevice::new())
    }
}
