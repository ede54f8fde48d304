use serde::{Deserialize, Serialize};

/// Derived, read-only view of the ledger. Computed on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub cash: f64,

    /// Sum of holding market values
    pub holdings_value: f64,

    /// cash + holdings_value
    pub total_value: f64,

    /// Sum of shares × average cost over open positions
    pub total_cost_basis: f64,

    /// holdings_value - total_cost_basis
    pub unrealized_gain_loss: f64,

    /// (unrealized_gain_loss / total_cost_basis) * 100, 0 when nothing is held
    pub unrealized_return_pct: f64,

    pub trade_count: usize,

    /// Per-holding breakdown, ordered by ticker
    pub holdings: Vec<HoldingSummary>,
}

/// Summary of a single open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingSummary {
    pub ticker: String,

    pub shares: f64,

    pub avg_price: f64,

    /// Last known price, or the average cost when none has been observed
    pub mark_price: f64,

    /// Whether `mark_price` came from an observed price
    pub has_live_price: bool,

    pub market_value: f64,

    pub cost_basis: f64,

    pub gain_loss: f64,

    pub return_pct: f64,

    /// This holding's market value / total portfolio value × 100
    pub allocation_pct: f64,
}

/// A ticker/price suggestion derived from the current analysis, used to
/// pre-fill the trade form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSuggestion {
    pub ticker: String,
    pub side: crate::models::portfolio::TradeType,
    pub price: Option<f64>,
    /// Shares currently held in the suggested ticker
    pub held_shares: f64,
}
