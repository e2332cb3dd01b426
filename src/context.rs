use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::config::{self, Mapping, MappingFile, MappingTable, Settings};
use crate::gamepad::{OutputDevice, XboxButton};
use crate::input::{ButtonState, EventRouter, LogicalInput, VisualChange};
use crate::serial::{PortEnumerator, PortOpener, ReaderStats, SessionError, SessionManager, SessionState, SessionTimings};

/// Application state owned by the front end.
///
/// Holds the mapping table, button state and session; the serial reader only
/// reaches them through the shared router.
pub struct AppContext {
    settings: Settings,
    mapping: MappingTable,
    router: Arc<EventRouter>,
    session: SessionManager,
}

impl AppContext {
    /// Build the context, loading the mapping from `settings.mapping_file`
    pub fn new(settings: Settings, device: Box<dyn OutputDevice>, opener: Arc<dyn PortOpener>) -> Self {
        let mapping = MappingTable::load(MappingFile::new(settings.mapping_file.clone()));
        Self::with_mapping(settings, mapping, device, opener)
    }

    pub fn with_mapping(
        settings: Settings,
        mapping: MappingTable,
        device: Box<dyn OutputDevice>,
        opener: Arc<dyn PortOpener>,
    ) -> Self {
        let state = Arc::new(ButtonState::new());
        let router = Arc::new(EventRouter::new(mapping.clone(), state, device));
        let session = SessionManager::new(opener, router.clone(), SessionTimings::from(&settings));
        Self {
            settings,
            mapping,
            router,
            session,
        }
    }

    /// Serial ports for the port picker ("No Ports Found" when empty)
    pub fn available_ports(&self) -> Vec<String> {
        PortEnumerator::list_or_sentinel()
    }

    pub async fn select_port(&mut self, port_name: &str) -> Result<(), SessionError> {
        self.session.select_port(port_name).await
    }

    pub fn current_mapping(&self) -> Mapping {
        self.mapping.snapshot()
    }

    /// Reassign an input; rejected names leave the old target in place
    pub fn set_mapping(&self, input: LogicalInput, output: &str) -> config::Result<XboxButton> {
        self.mapping.set(input, output)
    }

    /// Button recolor notifications. Receivers that fall behind lose the oldest changes.
    pub fn on_button_visual_change(&self) -> broadcast::Receiver<VisualChange> {
        self.router.subscribe()
    }

    pub fn button_state(&self) -> &ButtonState {
        self.router.button_state()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn subscribe_session_state(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe_state()
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn reader_stats(&self) -> ReaderStats {
        self.session.stats()
    }

    pub fn gamepad_available(&self) -> bool {
        self.router.device_available()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Close any open session; the context can be dropped afterwards
    pub async fn shutdown(&mut self) {
        self.session.teardown().await;
        log::info!("Shut down");
    }
}
