#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kaiser_pad_lib::gamepad::{self, OutputDevice, XboxButton};
use kaiser_pad_lib::serial::{PortOpener, SerialError, SerialLink, SessionTimings};

/// Ordered record of port opens and closes
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Default)]
struct FeedInner {
    bytes: VecDeque<u8>,
    error: Option<io::ErrorKind>,
}

/// Bytes a fake port will hand to the reader, pushed by the test at any time
#[derive(Clone, Default)]
pub struct Feed(Arc<Mutex<FeedInner>>);

impl Feed {
    pub fn push(&self, bytes: &[u8]) {
        self.0.lock().unwrap().bytes.extend(bytes.iter().copied());
    }

    /// Make the next poll fail as if the device was unplugged
    pub fn fail(&self) {
        self.0.lock().unwrap().error = Some(io::ErrorKind::BrokenPipe);
    }
}

pub struct FakeLink {
    name: String,
    feed: Feed,
    journal: Journal,
}

impl SerialLink for FakeLink {
    fn bytes_available(&mut self) -> io::Result<u32> {
        let inner = self.feed.0.lock().unwrap();
        match inner.error {
            Some(kind) => Err(io::Error::new(kind, "device removed")),
            None => Ok(inner.bytes.len() as u32),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.feed.0.lock().unwrap();
        let n = buf.len().min(inner.bytes.len());
        for (slot, byte) in buf.iter_mut().zip(inner.bytes.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Drop for FakeLink {
    fn drop(&mut self) {
        self.journal.push(format!("close {}", self.name));
    }
}

/// Opener handing out scripted links; every open and close lands in the journal
#[derive(Default)]
pub struct FakeOpener {
    pub journal: Journal,
    feeds: Mutex<HashMap<String, Feed>>,
    refused: Mutex<HashSet<String>>,
}

impl FakeOpener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn feed(&self, port: &str) -> Feed {
        self.feeds
            .lock()
            .unwrap()
            .entry(port.to_string())
            .or_default()
            .clone()
    }

    pub fn refuse(&self, port: &str) {
        self.refused.lock().unwrap().insert(port.to_string());
    }
}

impl PortOpener for FakeOpener {
    fn open(&self, port_name: &str, _read_timeout: Duration) -> Result<Box<dyn SerialLink>, SerialError> {
        if self.refused.lock().unwrap().contains(port_name) {
            return Err(SerialError::PortNotFound(port_name.to_string()));
        }
        self.journal.push(format!("open {}", port_name));
        Ok(Box::new(FakeLink {
            name: port_name.to_string(),
            feed: self.feed(port_name),
            journal: self.journal.clone(),
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    Press(XboxButton),
    Release(XboxButton),
    Commit,
}

/// Output device that records every call
#[derive(Clone, Default)]
pub struct RecordingDevice {
    pub calls: Arc<Mutex<Vec<DeviceCall>>>,
}

impl RecordingDevice {
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl OutputDevice for RecordingDevice {
    fn press(&mut self, button: XboxButton) {
        self.calls.lock().unwrap().push(DeviceCall::Press(button));
    }

    fn release(&mut self, button: XboxButton) {
        self.calls.lock().unwrap().push(DeviceCall::Release(button));
    }

    fn commit(&mut self) -> gamepad::Result<()> {
        self.calls.lock().unwrap().push(DeviceCall::Commit);
        Ok(())
    }
}

pub fn fast_timings() -> SessionTimings {
    SessionTimings {
        poll_interval: Duration::from_millis(2),
        read_timeout: Duration::from_millis(10),
        settle_delay: Duration::from_millis(20),
        join_timeout: Duration::from_millis(500),
    }
}

/// Poll `check` until it holds or two seconds pass
pub async fn wait_until(check: impl Fn() -> bool) -> bool {
    for _ in 0..400 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

/// Unique path in the temp dir for a mapping file
pub fn temp_mapping_path() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("kaiser-pad-{}.json", uuid::Uuid::new_v4()))
}
