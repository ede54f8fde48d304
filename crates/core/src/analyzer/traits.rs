use async_trait::async_trait;

use crate::errors::CoreError;
use crate::models::analysis::AnalysisOutcome;

/// The remote analysis service, seen as one stateless async call.
///
/// Implementations never retry: a failure is reported once and the next
/// qualifying snapshot is what tries again.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Human-readable name (e.g., "StonkGaze API")
    fn name(&self) -> &str;

    /// Analyze a page's text at the given troll level (0–100).
    ///
    /// Texts shorter than the configured minimum fail with
    /// `CoreError::InsufficientContent` before any I/O.
    async fn analyze(&self, text: &str, troll_level: u8) -> Result<AnalysisOutcome, CoreError>;

    /// Analyze the service's built-in sample text.
    async fn analyze_demo(&self, troll_level: u8) -> Result<AnalysisOutcome, CoreError>;
}

/// Fail fast when `text` is too short to be worth analyzing.
/// Leading and trailing whitespace does not count.
pub fn ensure_sufficient_content(text: &str, minimum: usize) -> Result<(), CoreError> {
    let length = text.trim().chars().count();
    if length < minimum {
        return Err(CoreError::InsufficientContent { length, minimum });
    }
    Ok(())
}

/// Troll levels outside 0..=100 are clamped, not rejected.
pub fn clamp_troll_level(level: i64) -> u8 {
    level.clamp(0, 100) as u8
}
