use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::errors::CoreError;
use crate::models::analysis::{Action, AnalysisResult, MarketData};
use crate::models::analytics::{PortfolioSummary, TradeSuggestion};
use crate::models::portfolio::{
    normalize_ticker, Holding, Portfolio, Trade, TradeCommand, TradeType, SHARE_EPSILON,
};
use crate::services::analytics_service;
use crate::storage::repository::PortfolioRepository;

/// Result of an accepted command.
///
/// A failed save does not undo the trade: the in-memory ledger stays ahead of
/// storage and the next successful save catches up.
#[derive(Debug)]
#[must_use]
pub struct Execution {
    pub trade: Trade,
    pub persist_error: Option<CoreError>,
}

impl Execution {
    pub fn persisted(&self) -> bool {
        self.persist_error.is_none()
    }
}

/// Paper-trading ledger: cash, positions and trade history behind a single
/// validated `execute` entry point.
///
/// Only the UI context drives it, so there is no internal locking. Atomicity
/// here means a rejected command changes nothing and an accepted one is
/// applied as one step before it is persisted.
pub struct PortfolioLedger {
    portfolio: Portfolio,
    repository: Box<dyn PortfolioRepository>,
    clock: Arc<dyn Clock>,
    /// Last observed market price per ticker. Not persisted.
    last_prices: HashMap<String, f64>,
}

impl PortfolioLedger {
    /// Load the persisted portfolio (or the starting one).
    pub fn open(repository: Box<dyn PortfolioRepository>, clock: Arc<dyn Clock>) -> Self {
        let portfolio = repository.load();
        Self {
            portfolio,
            repository,
            clock,
            last_prices: HashMap::new(),
        }
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn cash(&self) -> f64 {
        self.portfolio.cash
    }

    /// Validate and apply a buy/sell, then persist.
    ///
    /// Rejections (`InvalidInput`, `InsufficientCash`, `InsufficientShares`)
    /// leave the portfolio untouched.
    pub fn execute(&mut self, command: TradeCommand) -> Result<Execution, CoreError> {
        let trade_type = command.trade_type();
        let (ticker, shares, price) = validate_command(&command)?;

        match trade_type {
            TradeType::Buy => {
                let required = shares * price;
                if required > self.portfolio.cash {
                    return Err(CoreError::InsufficientCash {
                        required,
                        available: self.portfolio.cash,
                    });
                }
            }
            TradeType::Sell => {
                // The tolerance only absorbs rounding on an existing position.
                let Some(holding) = self.portfolio.holding(&ticker) else {
                    return Err(CoreError::InsufficientShares {
                        ticker,
                        requested: shares,
                        held: 0.0,
                    });
                };
                let held = holding.shares;
                if shares > held + SHARE_EPSILON {
                    return Err(CoreError::InsufficientShares {
                        ticker,
                        requested: shares,
                        held,
                    });
                }
            }
        }

        // Validation passed: nothing below can fail.
        let trade = Trade {
            id: Uuid::new_v4(),
            trade_type,
            ticker: ticker.clone(),
            shares,
            price,
            timestamp: self.next_timestamp(),
        };
        apply_trade(&mut self.portfolio, &trade);

        info!(
            side = %trade.trade_type,
            ticker = %trade.ticker,
            shares = trade.shares,
            price = trade.price,
            cash = self.portfolio.cash,
            "trade executed"
        );

        let persist_error = self.persist();
        Ok(Execution {
            trade,
            persist_error,
        })
    }

    /// Back to the starting portfolio, persisted immediately.
    pub fn reset(&mut self) -> Result<(), CoreError> {
        self.portfolio = self.repository.starting_portfolio();
        info!(cash = self.portfolio.cash, "portfolio reset");
        self.repository.save(&self.portfolio)
    }

    // ── Prices & derived values ─────────────────────────────────────

    /// Record the latest known price for a ticker. Non-positive or
    /// non-finite prices are ignored.
    pub fn observe_price(&mut self, ticker: &str, price: f64) {
        if price.is_finite() && price > 0.0 {
            self.last_prices.insert(normalize_ticker(ticker), price);
        }
    }

    /// Record the current price carried by an analysis result.
    pub fn observe_market(&mut self, analysis: &AnalysisResult, market: &MarketData) {
        // The service appends "-USD" to crypto tickers; positions use the bare symbol.
        self.observe_price(&analysis.ticker, market.current_price);
        self.observe_price(&market.ticker, market.current_price);
    }

    pub fn last_price(&self, ticker: &str) -> Option<f64> {
        self.last_prices.get(&normalize_ticker(ticker)).copied()
    }

    /// Pre-fill values for the trade form from the current analysis.
    pub fn suggestion(
        &self,
        analysis: &AnalysisResult,
        market: Option<&MarketData>,
    ) -> TradeSuggestion {
        let ticker = normalize_ticker(&analysis.ticker);
        let side = match analysis.action {
            Action::Buy => TradeType::Buy,
            Action::Sell => TradeType::Sell,
        };
        let price = market
            .map(|m| m.current_price)
            .filter(|p| p.is_finite() && *p > 0.0)
            .or_else(|| self.last_price(&ticker));
        TradeSuggestion {
            held_shares: self.portfolio.shares_of(&ticker),
            ticker,
            side,
            price,
        }
    }

    pub fn holdings_value(&self) -> f64 {
        analytics_service::holdings_value(&self.portfolio, &self.last_prices)
    }

    pub fn total_value(&self) -> f64 {
        self.portfolio.cash + self.holdings_value()
    }

    pub fn summary(&self) -> PortfolioSummary {
        analytics_service::summarize(&self.portfolio, &self.last_prices)
    }

    // ── Internals ───────────────────────────────────────────────────

    fn persist(&self) -> Option<CoreError> {
        match self.repository.save(&self.portfolio) {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "portfolio save failed, keeping in-memory state");
                Some(e)
            }
        }
    }

    /// History is most-recent-first; a clock that steps backwards must not
    /// break that order.
    fn next_timestamp(&self) -> chrono::DateTime<chrono::Utc> {
        let now = self.clock.utc_now();
        match self.portfolio.trades.first() {
            Some(latest) if latest.timestamp > now => latest.timestamp,
            _ => now,
        }
    }
}

/// Step 1 of validation: well-formed ticker, positive finite shares and price.
/// Returns the normalized ticker.
fn validate_command(command: &TradeCommand) -> Result<(String, f64, f64), CoreError> {
    let (raw_ticker, shares, price) = command.parts();
    let ticker = normalize_ticker(raw_ticker);
    if ticker.is_empty() {
        return Err(CoreError::InvalidInput("ticker must not be empty".into()));
    }
    if !price.is_finite() || price <= 0.0 {
        return Err(CoreError::InvalidInput(format!(
            "price must be positive, got {price}"
        )));
    }
    if !shares.is_finite() || shares <= 0.0 {
        return Err(CoreError::InvalidInput(format!(
            "shares must be positive, got {shares}"
        )));
    }
    Ok((ticker, shares, price))
}

/// Apply an already-validated trade.
fn apply_trade(portfolio: &mut Portfolio, trade: &Trade) {
    let total = trade.total();
    match trade.trade_type {
        TradeType::Buy => {
            portfolio.cash -= total;
            portfolio
                .holdings
                .entry(trade.ticker.clone())
                .and_modify(|h| {
                    let shares = h.shares + trade.shares;
                    h.avg_price = (h.avg_price * h.shares + total) / shares;
                    h.shares = shares;
                })
                .or_insert_with(|| Holding {
                    ticker: trade.ticker.clone(),
                    shares: trade.shares,
                    avg_price: trade.price,
                });
        }
        TradeType::Sell => {
            portfolio.cash += total;
            let remaining = portfolio.shares_of(&trade.ticker) - trade.shares;
            if remaining <= SHARE_EPSILON {
                portfolio.holdings.remove(&trade.ticker);
            } else if let Some(h) = portfolio.holdings.get_mut(&trade.ticker) {
                // Average cost is unchanged by a sell.
                h.shares = remaining;
            }
        }
    }
    portfolio.trades.insert(0, trade.clone());
}
