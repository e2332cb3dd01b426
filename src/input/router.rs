use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use super::types::{ButtonState, LogicalInput, VisualChange};
use crate::config::MappingTable;
use crate::gamepad::{OutputDevice, XboxButton};
use crate::serial::protocol::RawEvent;

/// Buffered visual changes per subscriber before the oldest are dropped
const VISUAL_CHANNEL_CAPACITY: usize = 256;

/// What `route` did with the output device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// State changed and the device was pressed/released and committed
    Forwarded(XboxButton),
    /// Repeat of the current state; the device was left alone
    Duplicate,
    /// State changed but another held input drives the same output
    Shared(XboxButton),
    /// State changed but the device is unavailable or cannot drive the target
    DeviceSkipped(XboxButton),
}

/// Output device plus the output each held input drove when it was pressed
struct Pad {
    device: Box<dyn OutputDevice>,
    driven: [Option<XboxButton>; 4],
}

impl Pad {
    fn is_driven(&self, output: XboxButton) -> bool {
        self.driven.contains(&Some(output))
    }

    fn drive(&mut self, pressed: bool, output: XboxButton) -> RouteOutcome {
        if !self.device.is_available() || !self.device.supports(output) {
            return RouteOutcome::DeviceSkipped(output);
        }

        if pressed {
            self.device.press(output);
        } else {
            self.device.release(output);
        }
        if let Err(e) = self.device.commit() {
            log::warn!("Gamepad commit failed for {}: {}", output, e);
        }
        RouteOutcome::Forwarded(output)
    }
}

/// Applies decoded events to button state, the virtual pad and the display.
///
/// Only the session reader calls `route`, so the device lock is never contended
/// and button state has a single writer. A release drives the output its press
/// drove, even if the mapping changed in between.
pub struct EventRouter {
    mapping: MappingTable,
    state: Arc<ButtonState>,
    pad: Mutex<Pad>,
    visual_tx: broadcast::Sender<VisualChange>,
}

impl EventRouter {
    pub fn new(mapping: MappingTable, state: Arc<ButtonState>, device: Box<dyn OutputDevice>) -> Self {
        let (visual_tx, _visual_rx) = broadcast::channel(VISUAL_CHANNEL_CAPACITY);
        Self {
            mapping,
            state,
            pad: Mutex::new(Pad {
                device,
                driven: [None; 4],
            }),
            visual_tx,
        }
    }

    pub fn route(&self, event: RawEvent) -> RouteOutcome {
        let pressed = event.action.is_press();
        let was_pressed = self.state.replace(event.input, pressed);

        let outcome = if was_pressed == pressed {
            RouteOutcome::Duplicate
        } else {
            self.transition(event.input, pressed)
        };

        // Display resyncs even on duplicates; no receivers is not an error
        let _ = self.visual_tx.send(VisualChange { input: event.input, pressed });
        outcome
    }

    /// Release every input still held, e.g. when the session that pressed them ends
    pub fn release_held(&self) -> usize {
        let held = self.state.pressed_inputs();
        for input in &held {
            log::debug!("Releasing held input {} on session end", input);
            self.route(RawEvent::release(*input));
        }
        held.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VisualChange> {
        self.visual_tx.subscribe()
    }

    pub fn button_state(&self) -> &Arc<ButtonState> {
        &self.state
    }

    pub fn mapping(&self) -> &MappingTable {
        &self.mapping
    }

    pub fn is_pressed(&self, input: LogicalInput) -> bool {
        self.state.is_pressed(input)
    }

    pub fn device_available(&self) -> bool {
        self.lock_pad().device.is_available()
    }

    fn transition(&self, input: LogicalInput, pressed: bool) -> RouteOutcome {
        let mut pad = self.lock_pad();
        let slot = input.index();

        if pressed {
            let output = self.mapping.get(input);
            let shared = pad.is_driven(output);
            pad.driven[slot] = Some(output);
            if shared {
                return RouteOutcome::Shared(output);
            }
            pad.drive(true, output)
        } else {
            let output = pad.driven[slot].take().unwrap_or_else(|| self.mapping.get(input));
            if pad.is_driven(output) {
                return RouteOutcome::Shared(output);
            }
            pad.drive(false, output)
        }
    }

    fn lock_pad(&self) -> std::sync::MutexGuard<'_, Pad> {
        self.pad.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
