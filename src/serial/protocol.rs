//! Controller wire protocol: one `PRESS_<INPUT>` or `RELEASE_<INPUT>` per line.
use std::io::BufRead;

use crate::input::LogicalInput;

/// Separator between action and input token
pub const SEPARATOR: char = '_';

/// Longest unterminated line kept before trimming
const MAX_PARTIAL_LEN: usize = 8192;
/// Tail kept after a trim
const TRIMMED_PARTIAL_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Press,
    Release,
}

impl Action {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "PRESS" => Some(Action::Press),
            "RELEASE" => Some(Action::Release),
            _ => None,
        }
    }

    pub fn is_press(self) -> bool {
        matches!(self, Action::Press)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub action: Action,
    pub input: LogicalInput,
}

impl RawEvent {
    pub fn press(input: LogicalInput) -> Self {
        Self { action: Action::Press, input }
    }

    pub fn release(input: LogicalInput) -> Self {
        Self { action: Action::Release, input }
    }
}

/// Decode one stripped line.
///
/// Format: ACTION_INPUT, split on the first separator only. Anything that does
/// not name a known action and a known input yields `None`.
pub fn decode_line(line: &str) -> Option<RawEvent> {
    let (keyword, token) = line.split_once(SEPARATOR)?;
    let action = Action::from_keyword(keyword)?;
    let input = LogicalInput::from_token(token)?;
    Some(RawEvent { action, input })
}

/// Lazily decode every line of a byte stream, skipping malformed frames.
///
/// Invalid UTF-8 is replaced rather than treated as an error. The iterator ends
/// at EOF or at the first read error.
pub fn decode_stream<R: BufRead>(reader: R) -> impl Iterator<Item = RawEvent> {
    reader
        .split(b'\n')
        .map_while(|chunk| chunk.ok())
        .filter_map(|bytes| decode_line(String::from_utf8_lossy(&bytes).trim()))
}

/// Splits arbitrary read chunks into stripped text lines.
///
/// Works on bytes so a multi-byte character split across two reads survives.
/// `\n`, `\r\n` and bare `\r` all end a line; blank lines are dropped.
#[derive(Debug, Default)]
pub struct LineAssembler {
    partial: Vec<u8>,
    trims: u64,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect the lines it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                if !self.partial.is_empty() {
                    let line = String::from_utf8_lossy(&self.partial).trim().to_string();
                    if !line.is_empty() {
                        lines.push(line);
                    }
                    self.partial.clear();
                }
            } else {
                self.partial.push(byte);
            }
        }

        if self.partial.len() > MAX_PARTIAL_LEN {
            let cut = self.partial.len() - TRIMMED_PARTIAL_LEN;
            self.partial.drain(..cut);
            self.trims += 1;
        }
        lines
    }

    /// Bytes waiting for a line terminator
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    /// How many times an overlong partial line was cut back
    pub fn trims(&self) -> u64 {
        self.trims
    }
}
