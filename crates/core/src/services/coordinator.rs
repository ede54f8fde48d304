use std::time::Duration;
use tracing::{debug, info};

use crate::analyzer::traits::clamp_troll_level;
use crate::errors::CoreError;
use crate::models::analysis::AnalysisOutcome;
use crate::models::message::{Message, ResultPayload};
use crate::models::snapshot::{Snapshot, SourceContext};

/// Identifier of an admitted analysis request. Strictly increasing.
pub type RequestId = u64;

/// One outbound analysis attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub id: RequestId,
    pub snapshot: Snapshot,
    pub troll_level: u8,
}

/// Coarse state, for observation and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Pending,
    InFlight,
}

/// Side effects requested by the state machine. The runtime performs them in
/// order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// (Re)start the debounce timer. Fires `on_debounce_elapsed(generation)`.
    ArmDebounce { generation: u64, after: Duration },
    CancelDebounce,
    Publish(Message),
    /// Call the analyzer; feed the outcome back through `on_response`.
    Dispatch(AnalysisRequest),
    RememberSource(SourceContext),
    PersistTrollLevel(u8),
}

#[derive(Debug, Clone)]
struct PendingSnapshot {
    snapshot: Snapshot,
    generation: u64,
}

#[derive(Debug, Clone)]
struct InFlight {
    id: RequestId,
    source: SourceContext,
}

/// Dedup + debounce + single-flight policy for analysis requests.
///
/// Sans-IO: every event returns the effects to perform. At most one request
/// is outstanding; only the response whose id matches it is published.
#[derive(Debug)]
pub struct CoordinatorState {
    troll_level: u8,
    debounce: Duration,
    pending: Option<PendingSnapshot>,
    in_flight: Option<InFlight>,
    /// Dedup key: URL of the most recently dispatched request.
    last_url: Option<String>,
    /// Set by a manual refresh: the next snapshot bypasses debounce and dedup.
    force_next: bool,
    last_snapshot: Option<Snapshot>,
    next_request_id: RequestId,
    timer_generation: u64,
}

impl CoordinatorState {
    pub fn new(troll_level: u8, debounce: Duration) -> Self {
        Self {
            troll_level: clamp_troll_level(troll_level.into()),
            debounce,
            pending: None,
            in_flight: None,
            last_url: None,
            force_next: false,
            last_snapshot: None,
            next_request_id: 1,
            timer_generation: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.in_flight.is_some() {
            Phase::InFlight
        } else if self.pending.is_some() {
            Phase::Pending
        } else {
            Phase::Idle
        }
    }

    pub fn troll_level(&self) -> u8 {
        self.troll_level
    }

    pub fn is_analyzing(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn in_flight_id(&self) -> Option<RequestId> {
        self.in_flight.as_ref().map(|f| f.id)
    }

    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        self.last_snapshot.as_ref()
    }

    /// A page snapshot arrived.
    pub fn on_snapshot(&mut self, snapshot: Snapshot) -> Vec<Effect> {
        let mut effects = vec![Effect::RememberSource(snapshot.source())];
        self.last_snapshot = Some(snapshot.clone());

        if self.force_next {
            self.force_next = false;
            if self.pending.take().is_some() {
                effects.push(Effect::CancelDebounce);
            }
            if let Some(superseded) = &self.in_flight {
                info!(superseded = superseded.id, "manual refresh supersedes in-flight request");
            }
            effects.extend(self.dispatch(snapshot));
            return effects;
        }

        let duplicate = self.in_flight.is_some()
            && self.last_url.as_deref() == Some(snapshot.url.as_str());
        if duplicate {
            debug!(url = %snapshot.url, "already analyzing this URL, snapshot dropped");
            return effects;
        }

        self.timer_generation += 1;
        self.pending = Some(PendingSnapshot {
            snapshot,
            generation: self.timer_generation,
        });
        effects.push(Effect::ArmDebounce {
            generation: self.timer_generation,
            after: self.debounce,
        });
        effects
    }

    /// The debounce timer armed with `generation` fired.
    pub fn on_debounce_elapsed(&mut self, generation: u64) -> Vec<Effect> {
        let current = matches!(&self.pending, Some(p) if p.generation == generation);
        if !current {
            debug!(generation, "stale debounce timer ignored");
            return Vec::new();
        }
        let Some(pending) = self.pending.take() else {
            return Vec::new();
        };

        if let Some(busy) = &self.in_flight {
            debug!(
                url = %pending.snapshot.url,
                in_flight = busy.id,
                "request in flight, snapshot dropped"
            );
            return Vec::new();
        }

        self.dispatch(pending.snapshot)
    }

    /// The panel asked for a fresh analysis.
    ///
    /// Resets the dedup key, cancels any pending debounce, adopts the troll
    /// level override and asks the page for a new snapshot, which will be
    /// dispatched immediately.
    pub fn on_manual_refresh(&mut self, troll_level: Option<u8>) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.last_url = None;
        self.force_next = true;

        if let Some(level) = troll_level {
            self.troll_level = clamp_troll_level(level.into());
            effects.push(Effect::PersistTrollLevel(self.troll_level));
        }
        if self.pending.take().is_some() {
            self.timer_generation += 1;
            effects.push(Effect::CancelDebounce);
        }

        effects.push(Effect::Publish(Message::RefreshRequest));
        effects
    }

    /// The refresh request reached no page. Re-analyze the last snapshot we
    /// saw, if any.
    pub fn on_refresh_undelivered(&mut self) -> Vec<Effect> {
        if !self.force_next {
            return Vec::new();
        }
        match self.last_snapshot.clone() {
            Some(snapshot) => {
                debug!(url = %snapshot.url, "page not loaded, re-analyzing last snapshot");
                self.on_snapshot(snapshot)
            }
            None => {
                debug!("page not loaded and no snapshot seen yet");
                self.force_next = false;
                Vec::new()
            }
        }
    }

    /// The analyzer answered request `id`.
    ///
    /// Only the outstanding request's response is published; anything else
    /// belongs to a superseded request and is discarded.
    pub fn on_response(
        &mut self,
        id: RequestId,
        outcome: Result<AnalysisOutcome, CoreError>,
    ) -> Vec<Effect> {
        let accepted = matches!(&self.in_flight, Some(f) if f.id == id);
        if !accepted {
            debug!(id, current = ?self.in_flight_id(), "stale response discarded");
            return Vec::new();
        }
        let Some(request) = self.in_flight.take() else {
            return Vec::new();
        };

        let message = match outcome {
            Ok(outcome) => {
                info!(id, ticker = %outcome.analysis.ticker, "analysis delivered");
                Message::Result(Box::new(ResultPayload {
                    analysis: outcome.analysis,
                    market: outcome.market,
                    source_title: request.source.title,
                    source_url: request.source.url,
                }))
            }
            Err(e) => {
                info!(id, error = %e, "analysis failed");
                Message::Error {
                    message: e.to_string(),
                }
            }
        };
        vec![Effect::Publish(message)]
    }

    fn dispatch(&mut self, snapshot: Snapshot) -> Vec<Effect> {
        let id = self.next_request_id;
        self.next_request_id += 1;

        let source = snapshot.source();
        self.last_url = Some(snapshot.url.clone());
        self.in_flight = Some(InFlight {
            id,
            source: source.clone(),
        });

        info!(id, url = %source.url, troll_level = self.troll_level, "dispatching analysis");
        vec![
            Effect::Publish(Message::Loading {
                title: source.title,
                url: source.url,
            }),
            Effect::Dispatch(AnalysisRequest {
                id,
                snapshot,
                troll_level: self.troll_level,
            }),
        ]
    }
}
