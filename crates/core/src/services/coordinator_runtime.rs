use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, Sleep};
use tracing::{debug, info, warn};

use crate::analyzer::traits::Analyzer;
use crate::bus::MessageBus;
use crate::errors::CoreError;
use crate::models::analysis::AnalysisOutcome;
use crate::models::message::{Context, Message};
use crate::storage::preferences::{Preferences, SessionSource};

use super::coordinator::{CoordinatorState, Effect, RequestId};

type Response = (RequestId, Result<AnalysisOutcome, CoreError>);

struct ArmedTimer {
    generation: u64,
    sleep: Pin<Box<Sleep>>,
}

/// The background coordinator context.
///
/// Runs [`CoordinatorState`] on a single task: bus messages, debounce timers
/// and analyzer responses are handled one at a time, in arrival order.
/// Analyzer calls run on their own tasks and are never aborted; a superseded
/// call's response is simply discarded when it arrives.
pub struct RequestCoordinator {
    state: CoordinatorState,
    analyzer: Arc<dyn Analyzer>,
    bus: MessageBus,
    preferences: Preferences,
    session: SessionSource,
}

impl RequestCoordinator {
    pub fn new(
        state: CoordinatorState,
        analyzer: Arc<dyn Analyzer>,
        bus: MessageBus,
        preferences: Preferences,
        session: SessionSource,
    ) -> Self {
        Self {
            state,
            analyzer,
            bus,
            preferences,
            session,
        }
    }

    /// Subscribe now and run on a new task. The task lives until it is
    /// aborted or the bus closes.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        let inbox = self.bus.subscribe(Context::Coordinator);
        tokio::spawn(self.run_with(inbox))
    }

    async fn run_with(mut self, mut inbox: broadcast::Receiver<Message>) {
        let (responses_tx, mut responses) = mpsc::unbounded_channel::<Response>();
        let mut timer: Option<ArmedTimer> = None;

        info!(analyzer = self.analyzer.name(), "request coordinator started");

        loop {
            let effects = tokio::select! {
                received = inbox.recv() => match received {
                    Ok(message) => self.handle_message(message),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "coordinator fell behind, messages skipped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                Some((id, outcome)) = responses.recv() => self.state.on_response(id, outcome),
                generation = debounce_elapsed(&mut timer) => {
                    timer = None;
                    self.state.on_debounce_elapsed(generation)
                }
            };

            self.perform(effects, &mut timer, &responses_tx);
        }

        info!("request coordinator stopped");
    }

    fn handle_message(&mut self, message: Message) -> Vec<Effect> {
        match message {
            Message::PageSnapshot(snapshot) => self.state.on_snapshot(snapshot),
            Message::ManualRefresh { troll_level } => self.state.on_manual_refresh(troll_level),
            other => {
                debug!(kind = ?other.kind(), "coordinator ignoring message");
                Vec::new()
            }
        }
    }

    fn perform(
        &mut self,
        effects: Vec<Effect>,
        timer: &mut Option<ArmedTimer>,
        responses: &mpsc::UnboundedSender<Response>,
    ) {
        let mut queue: VecDeque<Effect> = effects.into();

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::ArmDebounce { generation, after } => {
                    *timer = Some(ArmedTimer {
                        generation,
                        sleep: Box::pin(sleep(after)),
                    });
                }
                Effect::CancelDebounce => *timer = None,
                Effect::Publish(message) => {
                    let is_refresh = matches!(message, Message::RefreshRequest);
                    let delivered = self.bus.publish(message);
                    if is_refresh && delivered == 0 {
                        queue.extend(self.state.on_refresh_undelivered());
                    }
                }
                Effect::Dispatch(request) => {
                    let analyzer = Arc::clone(&self.analyzer);
                    let tx = responses.clone();
                    tokio::spawn(async move {
                        let outcome = analyzer
                            .analyze(&request.snapshot.text, request.troll_level)
                            .await;
                        // The coordinator may have stopped; nothing left to tell.
                        let _ = tx.send((request.id, outcome));
                    });
                }
                Effect::RememberSource(source) => {
                    if let Err(e) = self.session.write(&source) {
                        warn!(error = %e, "could not record current source");
                    }
                }
                Effect::PersistTrollLevel(level) => {
                    if let Err(e) = self.preferences.set_troll_level(level) {
                        warn!(error = %e, "could not persist troll level");
                    }
                }
            }
        }
    }
}

async fn debounce_elapsed(timer: &mut Option<ArmedTimer>) -> u64 {
    match timer {
        Some(armed) => {
            armed.sleep.as_mut().await;
            armed.generation
        }
        None => std::future::pending().await,
    }
}
