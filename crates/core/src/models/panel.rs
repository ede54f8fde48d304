use serde::{Deserialize, Serialize};

use super::analysis::{AnalysisResult, MarketData};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// Display-ready projection of coordinator events.
///
/// `result`/`market` survive an `Error` so stale-but-valid data can be shown
/// next to the error message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PanelState {
    pub status: PanelStatus,
    pub result: Option<AnalysisResult>,
    pub market: Option<MarketData>,
    pub error: Option<String>,
    pub source_title: String,
    pub source_url: String,
}
