//! ViGEmBus backend: a wired Xbox 360 target fed one XUSB report per commit.
use vigem_client::{Client, TargetId, XButtons, XGamepad, Xbox360Wired};

use super::{GamepadError, PadBackend, Result};

pub struct VigemBackend {
    target: Xbox360Wired<Client>,
}

impl VigemBackend {
    /// Plug a virtual Xbox 360 controller into the bus and wait for it to come up
    pub fn connect() -> Result<Self> {
        let client = Client::connect()
            .map_err(|e| GamepadError::Unavailable(format!("{:?}", e)))?;

        let mut target = Xbox360Wired::new(client, TargetId::XBOX360_WIRED);
        target
            .plugin()
            .map_err(|e| GamepadError::Unavailable(format!("plugin failed: {:?}", e)))?;
        target
            .wait_ready()
            .map_err(|e| GamepadError::Unavailable(format!("target not ready: {:?}", e)))?;

        Ok(Self { target })
    }
}

impl PadBackend for VigemBackend {
    fn submit(&mut self, buttons: u16) -> Result<()> {
        let report = XGamepad {
            buttons: XButtons { raw: buttons },
            ..Default::default()
        };
        self.target
            .update(&report)
            .map_err(|e| GamepadError::Submit(format!("{:?}", e)))
    }
}
