use std::sync::Arc;
use tracing::warn;

use crate::errors::CoreError;
use crate::models::portfolio::Portfolio;

use super::store::KeyValueStore;

/// Key the portfolio record lives under.
pub const PORTFOLIO_KEY: &str = "portfolio";

/// Persistence seam of the ledger.
pub trait PortfolioRepository: Send + Sync {
    /// Never fails: a missing or unreadable record yields the starting portfolio.
    fn load(&self) -> Portfolio;

    fn save(&self, portfolio: &Portfolio) -> Result<(), CoreError>;

    /// The portfolio a new user starts with.
    fn starting_portfolio(&self) -> Portfolio;
}

/// Stores the whole portfolio as one JSON record in a [`KeyValueStore`].
pub struct StorePortfolioRepository {
    store: Arc<dyn KeyValueStore>,
    starting_cash: f64,
}

impl StorePortfolioRepository {
    pub fn new(store: Arc<dyn KeyValueStore>, starting_cash: f64) -> Self {
        Self {
            store,
            starting_cash,
        }
    }

    /// Strict read: distinguishes "absent" from "corrupt".
    pub fn try_load(&self) -> Result<Option<Portfolio>, CoreError> {
        let Some(raw) = self.store.get(PORTFOLIO_KEY)? else {
            return Ok(None);
        };
        let portfolio: Portfolio = serde_json::from_str(&raw)?;
        portfolio.validate()?;
        Ok(Some(portfolio))
    }
}

impl PortfolioRepository for StorePortfolioRepository {
    fn load(&self) -> Portfolio {
        match self.try_load() {
            Ok(Some(portfolio)) => portfolio,
            Ok(None) => self.starting_portfolio(),
            Err(e) => {
                warn!(error = %e, "stored portfolio unreadable, starting fresh");
                self.starting_portfolio()
            }
        }
    }

    fn save(&self, portfolio: &Portfolio) -> Result<(), CoreError> {
        let json = serde_json::to_string(portfolio)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize portfolio: {e}")))?;
        self.store.set(PORTFOLIO_KEY, &json)
    }

    fn starting_portfolio(&self) -> Portfolio {
        Portfolio::with_cash(self.starting_cash)
    }
}
