use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::bus::MessageBus;
use crate::clock::Clock;
use crate::models::message::{Context, Message};
use crate::models::settings::Settings;
use crate::models::snapshot::Snapshot;

/// What the page currently shows. Read only after the settle window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContent {
    pub title: String,
    pub url: String,
    pub text: String,
}

/// Access to the observed page (the DOM, a file, a fixture...).
pub trait PageReader: Send + Sync {
    fn read(&self) -> PageContent;
}

/// A page lifecycle transition that may produce a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    /// Initial page load finished.
    Load,
    /// Hash or history navigation inside the page.
    Navigation,
    /// Explicit refresh command from the coordinator. Clears suppression.
    Refresh,
}

/// The page context: turns lifecycle events into bounded snapshots.
///
/// Emission waits for the settle window, and repeated events for the same URL
/// inside the suppression window collapse into the first snapshot.
pub struct SnapshotSource {
    reader: Arc<dyn PageReader>,
    clock: Arc<dyn Clock>,
    settle_window: Duration,
    suppression_window: Duration,
    max_chars: usize,
    last_emitted: Option<(String, Instant)>,
}

impl SnapshotSource {
    pub fn new(
        reader: Arc<dyn PageReader>,
        clock: Arc<dyn Clock>,
        settle_window: Duration,
        suppression_window: Duration,
        max_chars: usize,
    ) -> Self {
        Self {
            reader,
            clock,
            settle_window,
            suppression_window,
            max_chars,
            last_emitted: None,
        }
    }

    pub fn from_settings(
        reader: Arc<dyn PageReader>,
        clock: Arc<dyn Clock>,
        settings: &Settings,
    ) -> Self {
        Self::new(
            reader,
            clock,
            settings.settle_window(),
            settings.suppression_window(),
            settings.max_snapshot_chars,
        )
    }

    /// Handle one qualifying event. `None` when suppressed.
    pub async fn on_qualifying_event(&mut self, event: PageEvent) -> Option<Snapshot> {
        if event == PageEvent::Refresh {
            self.last_emitted = None;
        }

        sleep(self.settle_window).await;

        let page = self.reader.read();
        let now = self.clock.now();
        if let Some((url, at)) = &self.last_emitted {
            if *url == page.url && now.duration_since(*at) < self.suppression_window {
                debug!(url = %page.url, ?event, "duplicate snapshot suppressed");
                return None;
            }
        }

        self.last_emitted = Some((page.url.clone(), now));
        Some(Snapshot::capture(
            page.title,
            page.url,
            &page.text,
            self.max_chars,
            self.clock.utc_now(),
        ))
    }

    /// Run the page context. Lifecycle events come from `events`; refresh
    /// requests come from the bus. Snapshots are published fire-and-forget.
    pub fn spawn(
        self,
        bus: MessageBus,
        events: mpsc::Receiver<PageEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let inbox = bus.subscribe(Context::Page);
        tokio::spawn(self.run_with(bus, inbox, events))
    }

    async fn run_with(
        mut self,
        bus: MessageBus,
        mut inbox: broadcast::Receiver<Message>,
        mut events: mpsc::Receiver<PageEvent>,
    ) {
        loop {
            let event = tokio::select! {
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                received = inbox.recv() => match received {
                    Ok(Message::RefreshRequest) => PageEvent::Refresh,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "page context fell behind");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };

            if let Some(snapshot) = self.on_qualifying_event(event).await {
                bus.publish(Message::PageSnapshot(snapshot));
            }
        }
        debug!("page context stopped");
    }
}

/// Reader over fixed content.
#[derive(Debug, Clone)]
pub struct StaticPage(pub PageContent);

impl PageReader for StaticPage {
    fn read(&self) -> PageContent {
        self.0.clone()
    }
}
