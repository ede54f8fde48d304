// ═══════════════════════════════════════════════════════════════════
// Pipeline Tests — page context, coordinator runtime and panel wired
// through the message bus. Time is paused: sleeps auto-advance.
// ═══════════════════════════════════════════════════════════════════

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

use stonkgaze_core::analyzer::remote::HttpAnalyzer;
use stonkgaze_core::analyzer::traits::{ensure_sufficient_content, Analyzer};
use stonkgaze_core::clock::{Clock, ManualClock, SystemClock};
use stonkgaze_core::errors::CoreError;
use stonkgaze_core::models::analysis::{Action, AnalysisOutcome, AnalysisResult, AssetType, Vibe};
use stonkgaze_core::models::message::{Context, Message};
use stonkgaze_core::models::panel::{PanelState, PanelStatus};
use stonkgaze_core::models::portfolio::TradeCommand;
use stonkgaze_core::models::settings::Settings;
use stonkgaze_core::models::snapshot::Snapshot;
use stonkgaze_core::services::snapshot_source::{
    PageContent, PageEvent, PageReader, SnapshotSource, StaticPage,
};
use stonkgaze_core::StonkGaze;

// ═══════════════════════════════════════════════════════════════════
// Mock Analyzer
// ═══════════════════════════════════════════════════════════════════

/// One scripted reply: how long the call takes and which ticker it returns
/// (`None` fails with a 503).
#[derive(Clone, Copy)]
struct Step {
    delay: Duration,
    ticker: Option<&'static str>,
}

fn ok_after(ms: u64, ticker: &'static str) -> Step {
    Step {
        delay: Duration::from_millis(ms),
        ticker: Some(ticker),
    }
}

fn fail_after(ms: u64) -> Step {
    Step {
        delay: Duration::from_millis(ms),
        ticker: None,
    }
}

struct ScriptedAnalyzer {
    script: Vec<Step>,
    calls: AtomicUsize,
    seen: Mutex<Vec<(String, u8)>>,
    min_content_chars: usize,
}

impl ScriptedAnalyzer {
    fn new(script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            min_content_chars: 50,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn troll_levels(&self) -> Vec<u8> {
        self.seen.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

fn outcome(ticker: &str) -> AnalysisOutcome {
    AnalysisOutcome {
        analysis: AnalysisResult {
            ticker: ticker.into(),
            asset_type: AssetType::Stock,
            action: Action::Buy,
            confidence: 87.0,
            key_insight: "Rain means surge pricing".into(),
            reasoning: "Wet people take rides.".into(),
            vibe: Vibe::Mooning,
            meme_caption: "umbrella gang".into(),
            forecast: None,
        },
        market: None,
        warning: None,
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn analyze(&self, text: &str, troll_level: u8) -> Result<AnalysisOutcome, CoreError> {
        ensure_sufficient_content(text, self.min_content_chars)?;
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push((text.to_string(), troll_level));
        let step = self
            .script
            .get(n)
            .or(self.script.last())
            .copied()
            .unwrap_or_else(|| ok_after(0, "SPY"));

        sleep(step.delay).await;
        match step.ticker {
            Some(ticker) => Ok(outcome(ticker)),
            None => Err(CoreError::Service {
                status: 503,
                detail: "overloaded".into(),
            }),
        }
    }

    async fn analyze_demo(&self, troll_level: u8) -> Result<AnalysisOutcome, CoreError> {
        self.analyze(&"demo ".repeat(20), troll_level).await
    }
}

// ═══════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════

const ARTICLE: &str = "It has been raining in San Francisco for nine days straight and \
                       ride-share apps report record demand across the city.";

fn app() -> StonkGaze {
    StonkGaze::in_memory(Settings::default()).unwrap()
}

fn page(url: &str, text: &str) -> Arc<dyn PageReader> {
    Arc::new(StaticPage(PageContent {
        title: format!("Title of {url}"),
        url: url.into(),
        text: text.into(),
    }))
}

fn snapshot(url: &str) -> Snapshot {
    Snapshot::capture(format!("Title of {url}"), url, ARTICLE, 2_000, Utc::now())
}

async fn wait_for(
    panel: &mut watch::Receiver<PanelState>,
    pred: impl Fn(&PanelState) -> bool,
) -> PanelState {
    timeout(Duration::from_secs(120), async {
        loop {
            {
                let state = panel.borrow_and_update();
                if pred(&state) {
                    return state.clone();
                }
            }
            panel.changed().await.unwrap();
        }
    })
    .await
    .expect("panel never reached the expected state")
}

fn settled(state: &PanelState) -> bool {
    matches!(state.status, PanelStatus::Success | PanelStatus::Error)
}

// ═══════════════════════════════════════════════════════════════════
// Page context
// ═══════════════════════════════════════════════════════════════════

mod page_context {
    use super::*;

    fn source(clock: Arc<ManualClock>, settle_ms: u64) -> SnapshotSource {
        SnapshotSource::new(
            page("https://x", &"y".repeat(3_000)),
            clock,
            Duration::from_millis(settle_ms),
            Duration::from_millis(2_000),
            2_000,
        )
    }

    fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()))
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_is_truncated_and_timestamped() {
        let clock = manual_clock();
        let mut src = source(clock.clone(), 500);

        let snap = src.on_qualifying_event(PageEvent::Load).await.unwrap();
        assert_eq!(snap.url, "https://x");
        assert_eq!(snap.text.chars().count(), 2_000);
        assert_eq!(snap.captured_at, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn same_url_inside_window_is_suppressed() {
        let clock = manual_clock();
        let mut src = source(clock.clone(), 0);

        assert!(src.on_qualifying_event(PageEvent::Load).await.is_some());
        clock.advance(Duration::from_millis(100));
        assert!(src.on_qualifying_event(PageEvent::Navigation).await.is_none());
        clock.advance(Duration::from_millis(1_899));
        assert!(src.on_qualifying_event(PageEvent::Navigation).await.is_none());
        clock.advance(Duration::from_millis(1));
        assert!(src.on_qualifying_event(PageEvent::Navigation).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_bypasses_suppression() {
        let clock = manual_clock();
        let mut src = source(clock.clone(), 0);

        assert!(src.on_qualifying_event(PageEvent::Load).await.is_some());
        assert!(src.on_qualifying_event(PageEvent::Refresh).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn settle_window_delays_the_read() {
        let mut src = SnapshotSource::new(
            page("https://x", ARTICLE),
            Arc::new(SystemClock),
            Duration::from_millis(500),
            Duration::from_millis(2_000),
            2_000,
        );
        let start = tokio::time::Instant::now();
        let _ = src.on_qualifying_event(PageEvent::Load).await;
        assert!(start.elapsed() >= Duration::from_millis(500));
    }
}

// ═══════════════════════════════════════════════════════════════════
// End-to-end
// ═══════════════════════════════════════════════════════════════════

mod end_to_end {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn page_load_reaches_panel_as_success() {
        let app = app();
        let analyzer = ScriptedAnalyzer::new(vec![ok_after(1_000, "UBER")]);
        let (mut panel, _panel_task) = app.open_panel();
        let _coordinator = app.start_coordinator(analyzer.clone());
        let (events, _page_task) = app.start_page(page("https://news.example/rain", ARTICLE));

        events.send(PageEvent::Load).await.unwrap();

        let loading = wait_for(&mut panel, |s| s.status == PanelStatus::Loading).await;
        assert_eq!(loading.source_url, "https://news.example/rain");

        let done = wait_for(&mut panel, settled).await;
        assert_eq!(done.status, PanelStatus::Success);
        assert_eq!(done.result.unwrap().ticker, "UBER");
        assert_eq!(done.source_title, "Title of https://news.example/rain");
        assert_eq!(analyzer.troll_levels(), vec![50]);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_navigation_makes_one_request() {
        let app = app();
        let analyzer = ScriptedAnalyzer::new(vec![ok_after(500, "UBER")]);
        let (mut panel, _panel_task) = app.open_panel();
        let _coordinator = app.start_coordinator(analyzer.clone());
        let (events, _page_task) = app.start_page(page("https://x", ARTICLE));

        events.send(PageEvent::Load).await.unwrap();
        sleep(Duration::from_millis(100)).await;
        events.send(PageEvent::Navigation).await.unwrap();

        wait_for(&mut panel, settled).await;
        sleep(Duration::from_secs(10)).await;
        assert_eq!(analyzer.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_keeps_only_the_latest_snapshot() {
        let app = app();
        let analyzer = ScriptedAnalyzer::new(vec![ok_after(100, "LATEST")]);
        let (mut panel, _panel_task) = app.open_panel();
        let _coordinator = app.start_coordinator(analyzer.clone());

        app.bus().publish(Message::PageSnapshot(snapshot("https://a")));
        sleep(Duration::from_millis(100)).await;
        app.bus().publish(Message::PageSnapshot(snapshot("https://b")));

        let done = wait_for(&mut panel, settled).await;
        assert_eq!(done.source_url, "https://b");
        sleep(Duration::from_secs(5)).await;
        assert_eq!(analyzer.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_response_never_reaches_panel() {
        let app = app();
        let analyzer = ScriptedAnalyzer::new(vec![ok_after(10_000, "OLD"), ok_after(1_000, "NEW")]);
        let mut panel_inbox = app.bus().subscribe(Context::Panel);
        let (mut panel, _panel_task) = app.open_panel();
        let _coordinator = app.start_coordinator(analyzer.clone());

        app.bus().publish(Message::PageSnapshot(snapshot("https://a")));
        wait_for(&mut panel, |s| s.status == PanelStatus::Loading).await;
        // No page context is running: the coordinator re-analyzes its last snapshot.
        assert!(app.refresh(None));

        let done = wait_for(&mut panel, settled).await;
        assert_eq!(done.result.as_ref().unwrap().ticker, "NEW");

        // Let the first call finish long after it was superseded.
        sleep(Duration::from_secs(30)).await;
        assert_eq!(analyzer.calls(), 2);
        assert_eq!(panel.borrow().result.as_ref().unwrap().ticker, "NEW");

        let mut results = Vec::new();
        while let Ok(msg) = panel_inbox.try_recv() {
            if let Message::Result(payload) = msg {
                results.push(payload.analysis.ticker);
            }
        }
        assert_eq!(results, vec!["NEW".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_refresh_with_level_goes_through_page() {
        let app = app();
        let analyzer = ScriptedAnalyzer::new(vec![ok_after(100, "FIRST"), ok_after(100, "SECOND")]);
        let (mut panel, _panel_task) = app.open_panel();
        let _coordinator = app.start_coordinator(analyzer.clone());
        let (events, _page_task) = app.start_page(page("https://x", ARTICLE));

        events.send(PageEvent::Load).await.unwrap();
        wait_for(&mut panel, |s| s.result.is_some()).await;

        // Same URL, well inside the suppression window: only a refresh gets through.
        assert!(app.refresh(Some(90)));
        let done = wait_for(&mut panel, |s| {
            s.result.as_ref().map(|r| r.ticker.as_str()) == Some("SECOND")
        })
        .await;
        assert_eq!(done.status, PanelStatus::Success);
        assert_eq!(analyzer.troll_levels(), vec![50, 90]);
        assert_eq!(app.troll_level(), 90);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_shows_error_and_keeps_last_result() {
        let app = app();
        let analyzer = ScriptedAnalyzer::new(vec![ok_after(100, "UBER"), fail_after(100)]);
        let (mut panel, _panel_task) = app.open_panel();
        let _coordinator = app.start_coordinator(analyzer.clone());

        app.bus().publish(Message::PageSnapshot(snapshot("https://a")));
        wait_for(&mut panel, |s| s.status == PanelStatus::Success).await;

        app.bus().publish(Message::PageSnapshot(snapshot("https://b")));
        let done = wait_for(&mut panel, |s| s.status == PanelStatus::Error).await;
        assert_eq!(done.error.as_deref(), Some("Analysis service error (503): overloaded"));
        assert_eq!(done.result.unwrap().ticker, "UBER");
    }

    #[tokio::test(start_paused = true)]
    async fn short_page_text_is_reported_on_panel() {
        let app = app();
        // The real client: the length check runs before any connection attempt.
        let analyzer = Arc::new(HttpAnalyzer::new(
            "http://127.0.0.1:9",
            Duration::from_secs(1),
            app.settings().min_content_chars,
        ));
        let (mut panel, _panel_task) = app.open_panel();
        let _coordinator = app.start_coordinator(analyzer);
        let (events, _page_task) = app.start_page(page("https://x", "short"));

        events.send(PageEvent::Load).await.unwrap();
        let done = wait_for(&mut panel, settled).await;
        assert_eq!(done.status, PanelStatus::Error);
        assert!(done.error.unwrap().starts_with("Webpage text too short"));
    }
}

// ═══════════════════════════════════════════════════════════════════
// Facade
// ═══════════════════════════════════════════════════════════════════

mod facade {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn late_panel_shows_current_source() {
        let app = app();
        let analyzer = ScriptedAnalyzer::new(vec![ok_after(60_000, "SLOW")]);
        let _coordinator = app.start_coordinator(analyzer);

        app.bus().publish(Message::PageSnapshot(snapshot("https://late")));
        sleep(Duration::from_millis(10)).await;

        let (panel, _panel_task) = app.open_panel();
        let state = panel.borrow().clone();
        assert_eq!(state.status, PanelStatus::Idle);
        assert_eq!(state.source_url, "https://late");
    }

    #[tokio::test]
    async fn refresh_without_coordinator_is_not_delivered() {
        let app = app();
        assert!(!app.refresh(Some(10)));
        assert_eq!(app.troll_level(), 50);
    }

    #[test]
    fn injected_clock_stamps_ledger_trades() {
        let start = Utc.with_ymd_and_hms(2025, 4, 20, 16, 20, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let app = app().with_clock(clock.clone());

        let mut ledger = app.open_ledger();
        let first = ledger.execute(TradeCommand::buy("TSLA", 1.0, 200.0)).unwrap();
        clock.advance(Duration::from_secs(90));
        let second = ledger.execute(TradeCommand::sell("TSLA", 1.0, 210.0)).unwrap();

        assert_eq!(first.trade.timestamp, start);
        assert_eq!(second.trade.timestamp, start + chrono::Duration::seconds(90));
        assert_eq!(app.clock().utc_now(), start + chrono::Duration::seconds(90));
        assert_eq!(app.open_ledger().portfolio().trades.len(), 2);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let settings = Settings {
            bus_capacity: 0,
            ..Settings::default()
        };
        assert!(matches!(
            StonkGaze::in_memory(settings),
            Err(CoreError::Config(_))
        ));
    }
}
