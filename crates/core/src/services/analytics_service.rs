use std::collections::HashMap;

use crate::models::analytics::{HoldingSummary, PortfolioSummary};
use crate::models::portfolio::{Holding, Portfolio};

/// Price used to value a holding: the last observed market price, falling
/// back to the average cost when nothing has been observed.
pub fn mark_price(holding: &Holding, last_prices: &HashMap<String, f64>) -> (f64, bool) {
    match last_prices.get(&holding.ticker) {
        Some(price) => (*price, true),
        None => (holding.avg_price, false),
    }
}

pub fn holdings_value(portfolio: &Portfolio, last_prices: &HashMap<String, f64>) -> f64 {
    portfolio
        .holdings
        .values()
        .map(|h| h.shares * mark_price(h, last_prices).0)
        .sum()
}

/// Full read-only summary of the ledger.
///
/// Computes:
/// - Market value per holding and in total
/// - Unrealized gain/loss against average cost (overall and per holding)
/// - Allocation percentages against total value (cash included)
pub fn summarize(portfolio: &Portfolio, last_prices: &HashMap<String, f64>) -> PortfolioSummary {
    // 1. Value each holding (BTreeMap iteration gives ticker order)
    let mut holdings: Vec<HoldingSummary> = portfolio
        .holdings
        .values()
        .map(|h| {
            let (mark, has_live_price) = mark_price(h, last_prices);
            let market_value = h.shares * mark;
            let cost_basis = h.cost_basis();
            let gain_loss = market_value - cost_basis;
            HoldingSummary {
                ticker: h.ticker.clone(),
                shares: h.shares,
                avg_price: h.avg_price,
                mark_price: mark,
                has_live_price,
                market_value,
                cost_basis,
                gain_loss,
                return_pct: pct(gain_loss, cost_basis),
                allocation_pct: 0.0, // filled below
            }
        })
        .collect();

    // 2. Totals
    let holdings_value: f64 = holdings.iter().map(|h| h.market_value).sum();
    let total_cost_basis: f64 = holdings.iter().map(|h| h.cost_basis).sum();
    let total_value = portfolio.cash + holdings_value;

    // 3. Allocation
    for h in &mut holdings {
        h.allocation_pct = pct(h.market_value, total_value);
    }

    let unrealized_gain_loss = holdings_value - total_cost_basis;
    PortfolioSummary {
        cash: portfolio.cash,
        holdings_value,
        total_value,
        total_cost_basis,
        unrealized_gain_loss,
        unrealized_return_pct: pct(unrealized_gain_loss, total_cost_basis),
        trade_count: portfolio.trades.len(),
        holdings,
    }
}

fn pct(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}
