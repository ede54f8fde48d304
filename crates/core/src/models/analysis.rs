use serde::{Deserialize, Serialize};

/// Kind of instrument the analysis points at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    #[default]
    Stock,
    Crypto,
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetType::Stock => write!(f, "stock"),
            AssetType::Crypto => write!(f, "crypto"),
        }
    }
}

/// The recommendation side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Buy => write!(f, "BUY"),
            Action::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Vibe {
    Mooning,
    Cooked,
    Sideways,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Up,
    Down,
    Sideways,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub trend: Trend,
    /// 0–100
    pub volatility: f64,
}

/// Output of the remote analyzer. Immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub ticker: String,
    #[serde(default)]
    pub asset_type: AssetType,
    pub action: Action,
    /// 0–100
    pub confidence: f64,
    #[serde(alias = "insight")]
    pub key_insight: String,
    pub reasoning: String,
    pub vibe: Vibe,
    pub meme_caption: String,
    #[serde(default)]
    pub forecast: Option<Forecast>,
}

/// A single point of the market series attached to a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// ISO-8601 timestamp as sent by the service.
    pub timestamp: String,
    pub price: f64,
}

/// Market snapshot for the recommended ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    pub ticker: String,
    #[serde(default)]
    pub name: String,
    pub current_price: f64,
    #[serde(default)]
    pub previous_close: f64,
    #[serde(default)]
    pub change_24h_percent: f64,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub price_history: Vec<PricePoint>,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// A successful analysis as delivered by an [`Analyzer`](crate::analyzer::traits::Analyzer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub analysis: AnalysisResult,
    pub market: Option<MarketData>,
    /// Non-fatal note from the service, e.g. market data being unavailable.
    pub warning: Option<String>,
}

/// Wire shape of `POST /analyze` and `GET /analyze/demo`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    #[serde(default)]
    pub analysis: Option<serde_json::Value>,
    #[serde(default)]
    pub market_data: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Wire shape of `POST /analyze`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeRequest<'a> {
    pub webpage_text: &'a str,
    pub troll_level: u8,
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub detail: serde_json::Value,
}
