use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bus::MessageBus;
use crate::models::message::{Context, Message};
use crate::models::panel::{PanelState, PanelStatus};
use crate::models::snapshot::SourceContext;

/// Pure reducer: next panel state for a coordinator event.
///
/// Messages not addressed to the panel leave the state unchanged.
pub fn reduce(state: &PanelState, event: &Message) -> PanelState {
    let mut next = state.clone();
    match event {
        Message::Loading { title, url } => {
            next.status = PanelStatus::Loading;
            next.source_title = title.clone();
            next.source_url = url.clone();
            next.error = None;
        }
        Message::Result(payload) => {
            next.status = PanelStatus::Success;
            next.result = Some(payload.analysis.clone());
            next.market = payload.market.clone();
            next.source_title = payload.source_title.clone();
            next.source_url = payload.source_url.clone();
            next.error = None;
        }
        Message::Error { message } => {
            // The last good result stays visible next to the error.
            next.status = PanelStatus::Error;
            next.error = Some(message.clone());
        }
        Message::PageSnapshot(_) | Message::ManualRefresh { .. } | Message::RefreshRequest => {}
    }
    next
}

/// Fold an event log into a panel state.
pub fn replay<'a>(events: impl IntoIterator<Item = &'a Message>) -> PanelState {
    events
        .into_iter()
        .fold(PanelState::default(), |state, event| reduce(&state, event))
}

/// The panel context: holds the current state and issues manual refreshes.
#[derive(Debug, Clone, Default)]
pub struct PanelViewModel {
    state: PanelState,
}

impl PanelViewModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A freshly opened panel showing the source recorded in the session.
    pub fn restore(source: Option<SourceContext>) -> Self {
        let mut state = PanelState::default();
        if let Some(source) = source {
            state.source_title = source.title;
            state.source_url = source.url;
        }
        Self { state }
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    pub fn apply(&mut self, event: &Message) {
        self.state = reduce(&self.state, event);
    }

    /// Ask the coordinator for a fresh analysis, optionally at a new troll level.
    /// Returns false when no coordinator was listening.
    pub fn request_refresh(bus: &MessageBus, troll_level: Option<u8>) -> bool {
        bus.publish(Message::ManualRefresh { troll_level }) > 0
    }

    /// Run the panel context: subscribe to the bus and publish every new
    /// state on the returned watch channel.
    pub fn spawn(self, bus: &MessageBus) -> (watch::Receiver<PanelState>, JoinHandle<()>) {
        let mut inbox = bus.subscribe(Context::Panel);
        let (tx, rx) = watch::channel(self.state.clone());
        let mut vm = self;

        let handle = tokio::spawn(async move {
            loop {
                match inbox.recv().await {
                    Ok(event) => {
                        vm.apply(&event);
                        debug!(status = ?vm.state.status, "panel state updated");
                        if tx.send(vm.state.clone()).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "panel fell behind, events skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        (rx, handle)
    }
}
