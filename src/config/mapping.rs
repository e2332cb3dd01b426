use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use super::{ConfigError, Result};
use crate::gamepad::XboxButton;
use crate::input::LogicalInput;

/// Total assignment of controller inputs to virtual pad buttons.
///
/// Indexed by `LogicalInput::index`, so every input always has exactly one
/// target; there is no way to construct a mapping with a hole in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    targets: [XboxButton; 4],
}

impl Default for Mapping {
    fn default() -> Self {
        let mut targets = [XboxButton::A; 4];
        targets[LogicalInput::A.index()] = XboxButton::A;
        targets[LogicalInput::S.index()] = XboxButton::B;
        targets[LogicalInput::L.index()] = XboxButton::X;
        targets[LogicalInput::K.index()] = XboxButton::Y;
        Self { targets }
    }
}

impl Mapping {
    pub fn get(&self, input: LogicalInput) -> XboxButton {
        self.targets[input.index()]
    }

    pub fn assign(&mut self, input: LogicalInput, output: XboxButton) {
        self.targets[input.index()] = output;
    }

    pub fn iter(&self) -> impl Iterator<Item = (LogicalInput, XboxButton)> + '_ {
        LogicalInput::ALL.into_iter().map(move |input| (input, self.get(input)))
    }

    /// Overlay persisted entries on the defaults.
    ///
    /// Only the top-level object shape is checked. Entries whose key is not a
    /// known input, or whose value is not a known button name, are skipped and
    /// the default for that input stays in place.
    pub fn from_json_value(value: &Value) -> Result<Self> {
        let entries = value
            .as_object()
            .ok_or_else(|| ConfigError::Malformed("mapping must be a JSON object".to_string()))?;

        let mut mapping = Self::default();
        for (key, target) in entries {
            let Some(input) = LogicalInput::from_token(key) else {
                log::debug!("Ignoring mapping entry for unknown input {:?}", key);
                continue;
            };
            match target.as_str().and_then(XboxButton::from_name) {
                Some(output) => mapping.assign(input, output),
                None => log::debug!("Ignoring invalid mapping target {} for input {}", target, input),
            }
        }
        Ok(mapping)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_json_value(&value)
    }

    /// Human-readable form written to disk (four-space indent)
    pub fn to_json_pretty(&self) -> Result<String> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut serializer)?;
        String::from_utf8(out).map_err(|e| ConfigError::Malformed(e.to_string()))
    }
}

impl Serialize for Mapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(LogicalInput::ALL.len()))?;
        for (input, output) in self.iter() {
            map.serialize_entry(input.token(), output.name())?;
        }
        map.end()
    }
}

/// On-disk location of the mapping
#[derive(Debug, Clone)]
pub struct MappingFile {
    path: PathBuf,
}

impl MappingFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted mapping; a missing or unreadable file yields defaults.
    pub fn load(&self) -> Mapping {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::info!("No mapping file at {}, using defaults", self.path.display());
                return Mapping::default();
            }
            Err(e) => {
                log::error!("Failed to read mapping file {}: {}", self.path.display(), e);
                return Mapping::default();
            }
        };

        match Mapping::from_json_str(&text) {
            Ok(mapping) => {
                log::info!("Loaded mapping from {}", self.path.display());
                mapping
            }
            Err(e) => {
                log::error!("Failed to parse mapping file {}: {}", self.path.display(), e);
                Mapping::default()
            }
        }
    }

    /// Write the full mapping, replacing the file in one rename
    pub fn save(&self, mapping: &Mapping) -> Result<()> {
        let text = mapping.to_json_pretty()?;
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let written = fs::File::create(&tmp_path).and_then(|mut file| {
            file.write_all(text.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|()| fs::rename(&tmp_path, &self.path)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Live mapping shared between the reader (lookups) and the front end (edits).
///
/// Each edit replaces one entry under the write lock and is then persisted;
/// lookups taken after `set` returns always observe the new target.
#[derive(Debug, Clone)]
pub struct MappingTable {
    current: Arc<RwLock<Mapping>>,
    store: Option<MappingFile>,
}

impl MappingTable {
    /// In-memory table that never touches disk
    pub fn new(mapping: Mapping) -> Self {
        Self {
            current: Arc::new(RwLock::new(mapping)),
            store: None,
        }
    }

    /// Load from `file` and persist every later edit back to it
    pub fn load(file: MappingFile) -> Self {
        let mapping = file.load();
        Self {
            current: Arc::new(RwLock::new(mapping)),
            store: Some(file),
        }
    }

    pub fn get(&self, input: LogicalInput) -> XboxButton {
        self.snapshot().get(input)
    }

    /// Copy of the whole table
    pub fn snapshot(&self) -> Mapping {
        *self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reassign `input` to the button named `output`.
    ///
    /// Unknown names are rejected and the previous target kept. Persistence
    /// failures are logged only; the in-memory table stays authoritative.
    pub fn set(&self, input: LogicalInput, output: &str) -> Result<XboxButton> {
        let button = XboxButton::from_name(output)
            .ok_or_else(|| ConfigError::InvalidOutput(output.to_string()))?;

        let updated = {
            let mut guard = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.assign(input, button);
            *guard
        };
        log::info!("Mapped input {} to {}", input, button);

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&updated) {
                log::error!("Failed to save mapping to {}: {}", store.path().display(), e);
            }
        }
        Ok(button)
    }
}
