use std::sync::Arc;
use tracing::warn;

use crate::analyzer::traits::clamp_troll_level;
use crate::errors::CoreError;
use crate::models::snapshot::SourceContext;

use super::store::KeyValueStore;

pub const TROLL_LEVEL_KEY: &str = "trollLevel";
pub const SOURCE_KEY: &str = "stonkSource";

/// Persisted troll-level preference (single numeric key).
#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn KeyValueStore>,
    default_troll_level: u8,
}

impl Preferences {
    pub fn new(store: Arc<dyn KeyValueStore>, default_troll_level: u8) -> Self {
        Self {
            store,
            default_troll_level: clamp_troll_level(default_troll_level.into()),
        }
    }

    /// Stored level, or the default when absent or unreadable.
    pub fn troll_level(&self) -> u8 {
        match self.store.get(TROLL_LEVEL_KEY) {
            Ok(Some(raw)) => match raw.trim().parse::<i64>() {
                Ok(level) => clamp_troll_level(level),
                Err(_) => {
                    warn!(value = %raw, "stored troll level unreadable, using default");
                    self.default_troll_level
                }
            },
            Ok(None) => self.default_troll_level,
            Err(e) => {
                warn!(error = %e, "troll level read failed, using default");
                self.default_troll_level
            }
        }
    }

    pub fn set_troll_level(&self, level: u8) -> Result<u8, CoreError> {
        let level = clamp_troll_level(level.into());
        self.store.set(TROLL_LEVEL_KEY, &level.to_string())?;
        Ok(level)
    }
}

/// Short-lived session area holding the source of the latest snapshot, so a
/// panel opened after the fact can show what is being analyzed.
#[derive(Clone)]
pub struct SessionSource {
    store: Arc<dyn KeyValueStore>,
}

impl SessionSource {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn write(&self, source: &SourceContext) -> Result<(), CoreError> {
        let json = serde_json::to_string(source)
            .map_err(|e| CoreError::Serialization(e.to_string()))?;
        self.store.set(SOURCE_KEY, &json)
    }

    /// `None` when nothing was recorded or the record is unreadable.
    pub fn read(&self) -> Option<SourceContext> {
        let raw = self.store.get(SOURCE_KEY).ok().flatten()?;
        serde_json::from_str(&raw).ok()
    }
}
