use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::errors::CoreError;

/// Quantities closer than this are treated as equal.
pub const SHARE_EPSILON: f64 = 1e-9;

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeType {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeType::Buy => write!(f, "BUY"),
            TradeType::Sell => write!(f, "SELL"),
        }
    }
}

/// A command issued from the UI against the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "side", rename_all = "UPPERCASE")]
pub enum TradeCommand {
    Buy { ticker: String, shares: f64, price: f64 },
    Sell { ticker: String, shares: f64, price: f64 },
}

impl TradeCommand {
    pub fn buy(ticker: impl Into<String>, shares: f64, price: f64) -> Self {
        TradeCommand::Buy {
            ticker: ticker.into(),
            shares,
            price,
        }
    }

    pub fn sell(ticker: impl Into<String>, shares: f64, price: f64) -> Self {
        TradeCommand::Sell {
            ticker: ticker.into(),
            shares,
            price,
        }
    }

    pub fn trade_type(&self) -> TradeType {
        match self {
            TradeCommand::Buy { .. } => TradeType::Buy,
            TradeCommand::Sell { .. } => TradeType::Sell,
        }
    }

    /// (ticker, shares, price)
    pub fn parts(&self) -> (&str, f64, f64) {
        match self {
            TradeCommand::Buy {
                ticker,
                shares,
                price,
            }
            | TradeCommand::Sell {
                ticker,
                shares,
                price,
            } => (ticker.as_str(), *shares, *price),
        }
    }
}

/// A position in one ticker. `shares` is always positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub ticker: String,
    pub shares: f64,
    /// Quantity-weighted mean purchase price.
    pub avg_price: f64,
}

impl Holding {
    pub fn cost_basis(&self) -> f64 {
        self.shares * self.avg_price
    }
}

/// An executed buy/sell. Never modified after it is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub trade_type: TradeType,
    pub ticker: String,
    pub shares: f64,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    pub fn total(&self) -> f64 {
        self.shares * self.price
    }
}

/// The ledger aggregate: cash, one holding per ticker, and trade history
/// (most recent first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: f64,
    pub holdings: BTreeMap<String, Holding>,
    pub trades: Vec<Trade>,
}

impl Portfolio {
    pub fn with_cash(cash: f64) -> Self {
        Self {
            cash,
            holdings: BTreeMap::new(),
            trades: Vec::new(),
        }
    }

    pub fn holding(&self, ticker: &str) -> Option<&Holding> {
        self.holdings.get(&normalize_ticker(ticker))
    }

    pub fn shares_of(&self, ticker: &str) -> f64 {
        self.holding(ticker).map(|h| h.shares).unwrap_or(0.0)
    }

    /// Check the structural invariants. Used when loading persisted data.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.cash.is_finite() || self.cash < 0.0 {
            return Err(CoreError::Deserialization(format!(
                "portfolio cash is invalid: {}",
                self.cash
            )));
        }
        for (key, holding) in &self.holdings {
            if *key != holding.ticker {
                return Err(CoreError::Deserialization(format!(
                    "holding stored under {key} belongs to {}",
                    holding.ticker
                )));
            }
            if !holding.shares.is_finite() || holding.shares <= 0.0 {
                return Err(CoreError::Deserialization(format!(
                    "holding {key} has invalid share count {}",
                    holding.shares
                )));
            }
            if !holding.avg_price.is_finite() || holding.avg_price <= 0.0 {
                return Err(CoreError::Deserialization(format!(
                    "holding {key} has invalid average price {}",
                    holding.avg_price
                )));
            }
        }
        if self
            .trades
            .windows(2)
            .any(|pair| pair[0].timestamp < pair[1].timestamp)
        {
            return Err(CoreError::Deserialization(
                "trade history is not ordered most-recent-first".into(),
            ));
        }
        Ok(())
    }
}

impl Default for Portfolio {
    fn default() -> Self {
        Self::with_cash(10_000.0)
    }
}

/// Trim, drop a leading `$`, uppercase.
pub fn normalize_ticker(ticker: &str) -> String {
    let trimmed = ticker.trim();
    trimmed
        .strip_prefix('$')
        .unwrap_or(trimmed)
        .trim()
        .to_uppercase()
}
