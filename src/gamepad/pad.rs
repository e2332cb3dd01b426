use super::{OutputDevice, Result, XboxButton};

/// Transport for a finished button report
pub trait PadBackend: Send {
    fn submit(&mut self, buttons: u16) -> Result<()>;
}

/// Virtual pad holding the staged `wButtons` bitmask.
pub struct VirtualPad<B: PadBackend> {
    backend: B,
    buttons: u16,
}

impl<B: PadBackend> VirtualPad<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, buttons: 0 }
    }

    /// Staged bitmask (not necessarily committed yet)
    pub fn buttons(&self) -> u16 {
        self.buttons
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: PadBackend> OutputDevice for VirtualPad<B> {
    fn press(&mut self, button: XboxButton) {
        self.buttons |= button.mask();
    }

    fn release(&mut self, button: XboxButton) {
        self.buttons &= !button.mask();
    }

    fn commit(&mut self) -> Result<()> {
        self.backend.submit(self.buttons)
    }
}

/// Stand-in used when the gamepad driver is absent.
#[derive(Debug, Default)]
pub struct NullDevice;

impl NullDevice {
    pub fn new() -> Self {
        Self
    }
}

impl OutputDevice for NullDevice {
    fn press(&mut self, _button: XboxButton) {}

    fn release(&mut self, _button: XboxButton) {}

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_available(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CapturingBackend {
        reports: Vec<u16>,
    }

    impl PadBackend for CapturingBackend {
        fn submit(&mut self, buttons: u16) -> Result<()> {
            self.reports.push(buttons);
            Ok(())
        }
    }

    #[test]
    fn test_nothing_sent_before_commit() {
        let mut pad = VirtualPad::new(CapturingBackend::default());
        pad.press(XboxButton::A);
        pad.press(XboxButton::DpadUp);
        assert!(pad.backend().reports.is_empty());
        assert_eq!(pad.buttons(), 0x1001);

        pad.commit().unwrap();
        pad.release(XboxButton::A);
        pad.commit().unwrap();
        assert_eq!(pad.backend().reports, vec![0x1001, 0x0001]);
    }

    #[test]
    fn test_release_of_unpressed_button_keeps_others() {
        let mut pad = VirtualPad::new(CapturingBackend::default());
        pad.press(XboxButton::Y);
        pad.release(XboxButton::B);
        assert_eq!(pad.buttons(), XboxButton::Y.mask());
    }

    #[test]
    fn test_null_device_reports_unavailable() {
        let mut device = NullDevice::new();
        assert!(!device.is_available());
        device.press(XboxButton::Start);
        assert!(device.commit().is_ok());
    }
}
