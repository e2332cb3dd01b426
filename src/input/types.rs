use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

/// One physical button on the controller, as named by the wire protocol.
///
/// The controller firmware reports four buttons. Their display order (buttons
/// 1 to 4 on the panel) is A, S, K, L.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogicalInput {
    A,
    S,
    K,
    L,
}

impl LogicalInput {
    /// All inputs in panel order
    pub const ALL: [LogicalInput; 4] = [LogicalInput::A, LogicalInput::S, LogicalInput::K, LogicalInput::L];

    /// Token used on the wire and as the key in the mapping file
    pub fn token(self) -> &'static str {
        match self {
            LogicalInput::A => "A",
            LogicalInput::S => "S",
            LogicalInput::K => "K",
            LogicalInput::L => "L",
        }
    }

    /// Exact token match; anything else is not an input
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "A" => Some(LogicalInput::A),
            "S" => Some(LogicalInput::S),
            "K" => Some(LogicalInput::K),
            "L" => Some(LogicalInput::L),
            _ => None,
        }
    }

    /// Zero-based slot in panel order
    pub fn index(self) -> usize {
        match self {
            LogicalInput::A => 0,
            LogicalInput::S => 1,
            LogicalInput::K => 2,
            LogicalInput::L => 3,
        }
    }

    /// Number printed on the panel button (1-based)
    pub fn display_number(self) -> u8 {
        self.index() as u8 + 1
    }
}

impl fmt::Display for LogicalInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown controller input: {0}")]
pub struct UnknownInput(pub String);

impl FromStr for LogicalInput {
    type Err = UnknownInput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s.trim()).ok_or_else(|| UnknownInput(s.to_string()))
    }
}

/// Last-known pressed/released flag per input.
///
/// Written only by the serial reader (through the router), read from anywhere.
/// Each flag is an independent atomic so readers never block the writer.
#[derive(Debug, Default)]
pub struct ButtonState {
    pressed: [AtomicBool; 4],
}

impl ButtonState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pressed(&self, input: LogicalInput) -> bool {
        self.pressed[input.index()].load(Ordering::Acquire)
    }

    /// Store the new flag and return the previous one
    pub(crate) fn replace(&self, input: LogicalInput, pressed: bool) -> bool {
        self.pressed[input.index()].swap(pressed, Ordering::AcqRel)
    }

    /// Inputs currently held down, in panel order
    pub fn pressed_inputs(&self) -> Vec<LogicalInput> {
        LogicalInput::ALL
            .into_iter()
            .filter(|input| self.is_pressed(*input))
            .collect()
    }

    /// Copy of every flag in panel order
    pub fn snapshot(&self) -> Vec<(LogicalInput, bool)> {
        LogicalInput::ALL
            .into_iter()
            .map(|input| (input, self.is_pressed(input)))
            .collect()
    }
}

/// Notification for the display layer: recolor the button for `input`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VisualChange {
    pub input: LogicalInput,
    pub pressed: bool,
}
