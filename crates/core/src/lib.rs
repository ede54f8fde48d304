pub mod analyzer;
pub mod bus;
pub mod clock;
pub mod errors;
pub mod models;
pub mod services;
pub mod storage;

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

use analyzer::traits::Analyzer;
use bus::MessageBus;
use clock::{Clock, SystemClock};
use errors::CoreError;
use models::{message::Context, panel::PanelState, settings::Settings};
use services::{
    coordinator::CoordinatorState,
    coordinator_runtime::RequestCoordinator,
    ledger_service::PortfolioLedger,
    panel_service::PanelViewModel,
    snapshot_source::{PageEvent, PageReader, SnapshotSource},
};
use storage::{
    preferences::{Preferences, SessionSource},
    repository::StorePortfolioRepository,
    store::{KeyValueStore, MemoryStore},
};

/// Main entry point for the StonkGaze core library.
///
/// Wires the three contexts (page, coordinator, panel) to one message bus and
/// hands out the ledger. Local storage keeps the troll level and the
/// portfolio; session storage only lives as long as this value.
#[must_use]
pub struct StonkGaze {
    settings: Settings,
    bus: MessageBus,
    clock: Arc<dyn Clock>,
    local: Arc<dyn KeyValueStore>,
    session: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for StonkGaze {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StonkGaze")
            .field("settings", &self.settings)
            .field(
                "coordinator_listening",
                &self.bus.receiver_count(Context::Coordinator),
            )
            .field("panel_listening", &self.bus.receiver_count(Context::Panel))
            .finish()
    }
}

impl StonkGaze {
    /// Validate `settings` and build on top of `local` storage.
    pub fn new(settings: Settings, local: Arc<dyn KeyValueStore>) -> Result<Self, CoreError> {
        settings.validate()?;
        Ok(Self {
            bus: MessageBus::new(settings.bus_capacity),
            settings,
            clock: Arc::new(SystemClock),
            local,
            session: Arc::new(MemoryStore::new()),
        })
    }

    /// Everything in memory: nothing survives the process.
    pub fn in_memory(settings: Settings) -> Result<Self, CoreError> {
        Self::new(settings, Arc::new(MemoryStore::new()))
    }

    /// Replace the time source (tests, replays).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    // ── Preferences ─────────────────────────────────────────────────

    pub fn preferences(&self) -> Preferences {
        Preferences::new(Arc::clone(&self.local), self.settings.default_troll_level)
    }

    pub fn session(&self) -> SessionSource {
        SessionSource::new(Arc::clone(&self.session))
    }

    pub fn troll_level(&self) -> u8 {
        self.preferences().troll_level()
    }

    // ── Contexts ────────────────────────────────────────────────────

    /// Start the coordinator context. It picks up the persisted troll level.
    pub fn start_coordinator(&self, analyzer: Arc<dyn Analyzer>) -> JoinHandle<()> {
        let preferences = self.preferences();
        let state = CoordinatorState::new(preferences.troll_level(), self.settings.debounce());
        info!(troll_level = state.troll_level(), "starting coordinator");
        RequestCoordinator::new(state, analyzer, self.bus.clone(), preferences, self.session())
            .spawn()
    }

    /// Start a page context reading from `reader`. Lifecycle events are fed
    /// through the returned sender.
    pub fn start_page(
        &self,
        reader: Arc<dyn PageReader>,
    ) -> (mpsc::Sender<PageEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(self.settings.bus_capacity);
        let source = SnapshotSource::from_settings(reader, self.clock(), &self.settings);
        let handle = source.spawn(self.bus.clone(), rx);
        (tx, handle)
    }

    /// Open a panel. It starts out showing the source recorded in the session.
    pub fn open_panel(&self) -> (watch::Receiver<PanelState>, JoinHandle<()>) {
        PanelViewModel::restore(self.session().read()).spawn(&self.bus)
    }

    /// Manual refresh from the panel. False when no coordinator is running.
    pub fn refresh(&self, troll_level: Option<u8>) -> bool {
        PanelViewModel::request_refresh(&self.bus, troll_level)
    }

    // ── Ledger ──────────────────────────────────────────────────────

    pub fn open_ledger(&self) -> PortfolioLedger {
        let repository =
            StorePortfolioRepository::new(Arc::clone(&self.local), self.settings.starting_cash);
        PortfolioLedger::open(Box::new(repository), self.clock())
    }
}
