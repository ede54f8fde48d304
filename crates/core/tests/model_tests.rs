// ═══════════════════════════════════════════════════════════════════
// Model Tests — messages, snapshots, analysis payloads, settings, errors
// ═══════════════════════════════════════════════════════════════════

use chrono::Utc;
use serde_json::json;

use stonkgaze_core::errors::CoreError;
use stonkgaze_core::models::analysis::{Action, AnalysisResult, AssetType, MarketData, Trend, Vibe};
use stonkgaze_core::models::message::{Context, Message, MessageKind};
use stonkgaze_core::models::settings::Settings;
use stonkgaze_core::models::snapshot::{truncate_chars, Snapshot};

// ═══════════════════════════════════════════════════════════════════
// Snapshot
// ═══════════════════════════════════════════════════════════════════

mod snapshot {
    use super::*;

    #[test]
    fn capture_truncates_to_char_limit() {
        let text = "x".repeat(5_000);
        let snap = Snapshot::capture("T", "https://x", &text, 2_000, Utc::now());
        assert_eq!(snap.text.chars().count(), 2_000);
    }

    #[test]
    fn truncation_never_splits_a_character() {
        let text = "📈🚀💎🙌";
        assert_eq!(truncate_chars(text, 2), "📈🚀");
        assert_eq!(truncate_chars(text, 10), text);
        assert_eq!(truncate_chars("", 3), "");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn source_is_title_and_url() {
        let snap = Snapshot::capture("Title", "https://u", "body", 10, Utc::now());
        let src = snap.source();
        assert_eq!(src.title, "Title");
        assert_eq!(src.url, "https://u");
    }
}

// ═══════════════════════════════════════════════════════════════════
// Messages
// ═══════════════════════════════════════════════════════════════════

mod messages {
    use super::*;

    #[test]
    fn wire_shape_is_type_and_payload() {
        let msg = Message::Loading {
            title: "T".into(),
            url: "https://x".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "LOADING");
        assert_eq!(value["payload"]["url"], "https://x");

        let refresh = serde_json::to_value(Message::RefreshRequest).unwrap();
        assert_eq!(refresh["type"], "REFRESH_REQUEST");
    }

    #[test]
    fn manual_refresh_without_level_parses() {
        let msg: Message =
            serde_json::from_value(json!({"type": "MANUAL_REFRESH", "payload": {}})).unwrap();
        assert_eq!(msg, Message::ManualRefresh { troll_level: None });
    }

    #[test]
    fn unknown_type_is_rejected() {
        let parsed = serde_json::from_value::<Message>(json!({"type": "SELF_DESTRUCT"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn routing_matches_context_tables() {
        let samples = [
            Message::PageSnapshot(Snapshot::capture("t", "u", "x", 10, Utc::now())),
            Message::ManualRefresh { troll_level: Some(1) },
            Message::Loading {
                title: "t".into(),
                url: "u".into(),
            },
            Message::Error {
                message: "e".into(),
            },
            Message::RefreshRequest,
        ];
        for msg in &samples {
            assert!(msg.origin().publishes().contains(&msg.kind()), "{msg:?}");
            assert!(msg.destination().consumes().contains(&msg.kind()), "{msg:?}");
            assert_ne!(msg.origin(), msg.destination());
        }
        assert_eq!(Context::Panel.to_string(), "panel");
        assert!(Context::Coordinator.consumes().contains(&MessageKind::ManualRefresh));
    }
}

// ═══════════════════════════════════════════════════════════════════
// Analysis payloads
// ═══════════════════════════════════════════════════════════════════

mod analysis {
    use super::*;

    #[test]
    fn analysis_result_from_service_json() {
        let raw = json!({
            "ticker": "UBER",
            "asset_type": "stock",
            "action": "BUY",
            "confidence": 87,
            "key_insight": "Rain means surge pricing",
            "reasoning": "Wet people take rides.",
            "vibe": "MOONING",
            "meme_caption": "umbrella gang",
            "forecast": {"trend": "UP", "volatility": 42}
        });
        let result: AnalysisResult = serde_json::from_value(raw).unwrap();
        assert_eq!(result.action, Action::Buy);
        assert_eq!(result.vibe, Vibe::Mooning);
        assert_eq!(result.forecast.unwrap().trend, Trend::Up);
        assert_eq!(result.confidence, 87.0);
    }

    #[test]
    fn older_payloads_still_parse() {
        let raw = json!({
            "ticker": "DOGE",
            "action": "SELL",
            "confidence": 12.5,
            "insight": "the dog is tired",
            "reasoning": "bark",
            "vibe": "COOKED",
            "meme_caption": "much sad"
        });
        let result: AnalysisResult = serde_json::from_value(raw).unwrap();
        assert_eq!(result.asset_type, AssetType::Stock);
        assert_eq!(result.key_insight, "the dog is tired");
        assert!(result.forecast.is_none());
    }

    #[test]
    fn market_data_defaults() {
        let market: MarketData =
            serde_json::from_value(json!({"ticker": "BTC-USD", "current_price": 64000.5})).unwrap();
        assert_eq!(market.currency, "USD");
        assert!(market.price_history.is_empty());
        assert!(market.market_cap.is_none());
    }
}

// ═══════════════════════════════════════════════════════════════════
// Settings
// ═══════════════════════════════════════════════════════════════════

mod settings {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let s = Settings::default();
        s.validate().unwrap();
        assert_eq!(s.api_base_url, "http://localhost:8000");
        assert_eq!(s.default_troll_level, 50);
        assert_eq!(s.settle_window().as_millis(), 500);
        assert_eq!(s.suppression_window().as_millis(), 2000);
        assert_eq!(s.max_snapshot_chars, 2000);
        assert_eq!(s.min_content_chars, 50);
        assert_eq!(s.starting_cash, 10_000.0);
    }

    #[test]
    fn invalid_combinations_are_config_errors() {
        let cases = [
            Settings {
                api_base_url: " ".into(),
                ..Settings::default()
            },
            Settings {
                default_troll_level: 101,
                ..Settings::default()
            },
            Settings {
                min_content_chars: 3_000,
                ..Settings::default()
            },
            Settings {
                starting_cash: f64::NAN,
                ..Settings::default()
            },
            Settings {
                bus_capacity: 0,
                ..Settings::default()
            },
        ];
        for s in cases {
            assert!(matches!(s.validate(), Err(CoreError::Config(_))), "{s:?}");
        }
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: Settings = serde_json::from_value(json!({"debounce_ms": 10})).unwrap();
        assert_eq!(s.debounce().as_millis(), 10);
        assert_eq!(s.bus_capacity, 64);
    }

    // The only test in this binary touching the process environment.
    #[test]
    fn env_overlay() {
        std::env::set_var("STONKGAZE_API_URL", "http://analysis.internal:9000");
        std::env::set_var("STONKGAZE_TROLL_LEVEL", "90");
        let s = Settings::from_env().unwrap();
        assert_eq!(s.api_base_url, "http://analysis.internal:9000");
        assert_eq!(s.default_troll_level, 90);

        std::env::set_var("STONKGAZE_DEBOUNCE_MS", "soon");
        assert!(matches!(Settings::from_env(), Err(CoreError::Config(_))));

        for var in ["STONKGAZE_API_URL", "STONKGAZE_TROLL_LEVEL", "STONKGAZE_DEBOUNCE_MS"] {
            std::env::remove_var(var);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════

mod errors {
    use super::*;

    #[test]
    fn messages_are_panel_ready() {
        let e = CoreError::InsufficientContent {
            length: 5,
            minimum: 50,
        };
        assert_eq!(
            e.to_string(),
            "Webpage text too short: need at least 50 characters of content, got 5"
        );

        let e = CoreError::Service {
            status: 503,
            detail: "model overloaded".into(),
        };
        assert_eq!(e.to_string(), "Analysis service error (503): model overloaded");

        let e = CoreError::InsufficientCash {
            required: 15_000.0,
            available: 10_000.0,
        };
        assert_eq!(
            e.to_string(),
            "Insufficient cash: trade needs $15000.00, only $10000.00 available"
        );
    }

    #[test]
    fn only_ledger_validation_is_a_rejection() {
        assert!(CoreError::InvalidInput("x".into()).is_rejection());
        assert!(!CoreError::Network("x".into()).is_rejection());
        assert!(!CoreError::Storage("x".into()).is_rejection());
    }

    #[test]
    fn io_and_json_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(CoreError::from(io), CoreError::FileIO(_)));

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(CoreError::from(json_err), CoreError::Deserialization(_)));
    }
}
