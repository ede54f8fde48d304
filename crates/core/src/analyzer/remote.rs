use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

use crate::errors::CoreError;
use crate::models::analysis::{
    AnalysisOutcome, AnalysisResult, AnalyzeRequest, AnalyzeResponse, ErrorBody, MarketData,
};
use crate::models::settings::Settings;
use super::traits::{clamp_troll_level, ensure_sufficient_content, Analyzer};

/// HTTP client for the StonkGaze analysis API.
///
/// - `POST /analyze {webpage_text, troll_level}`
/// - `GET /analyze/demo?troll_level=N`
/// - `GET /health`
///
/// Single request/response per call, no retries.
pub struct HttpAnalyzer {
    client: Client,
    base_url: String,
    min_content_chars: usize,
}

impl HttpAnalyzer {
    pub fn new(base_url: impl Into<String>, timeout: Duration, min_content_chars: usize) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            min_content_chars,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.api_base_url.clone(),
            settings.request_timeout(),
            settings.min_content_chars,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// True when `GET /health` answers with a 2xx status.
    pub async fn health(&self) -> Result<bool, CoreError> {
        let resp = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    async fn read_outcome(resp: Response) -> Result<AnalysisOutcome, CoreError> {
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(CoreError::Service {
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }

        let parsed: AnalyzeResponse = serde_json::from_str(&body)
            .map_err(|e| CoreError::MalformedResponse(format!("invalid JSON body: {e}")))?;
        parse_outcome(parsed)
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    fn name(&self) -> &str {
        "StonkGaze API"
    }

    async fn analyze(&self, text: &str, troll_level: u8) -> Result<AnalysisOutcome, CoreError> {
        ensure_sufficient_content(text, self.min_content_chars)?;

        let troll_level = clamp_troll_level(troll_level.into());
        debug!(chars = text.chars().count(), troll_level, "POST /analyze");

        let resp = self
            .client
            .post(format!("{}/analyze", self.base_url))
            .json(&AnalyzeRequest {
                webpage_text: text,
                troll_level,
            })
            .send()
            .await?;

        Self::read_outcome(resp).await
    }

    async fn analyze_demo(&self, troll_level: u8) -> Result<AnalysisOutcome, CoreError> {
        let troll_level = clamp_troll_level(troll_level.into());
        debug!(troll_level, "GET /analyze/demo");

        let resp = self
            .client
            .get(format!("{}/analyze/demo", self.base_url))
            .query(&[("troll_level", troll_level)])
            .send()
            .await?;

        Self::read_outcome(resp).await
    }
}

/// Turn the service envelope into an outcome.
///
/// `success == false` or an unusable `analysis` is a malformed response.
/// Unusable market data only produces a warning, the analysis still counts.
pub fn parse_outcome(resp: AnalyzeResponse) -> Result<AnalysisOutcome, CoreError> {
    if !resp.success {
        return Err(CoreError::MalformedResponse(
            resp.error
                .unwrap_or_else(|| "service reported failure without a reason".into()),
        ));
    }

    let raw = resp
        .analysis
        .ok_or_else(|| CoreError::MalformedResponse("response has no analysis".into()))?;
    let analysis: AnalysisResult = serde_json::from_value(raw)
        .map_err(|e| CoreError::MalformedResponse(format!("analysis payload: {e}")))?;

    let mut warning = resp.error;
    let market = match resp.market_data {
        None | Some(serde_json::Value::Null) => None,
        Some(raw) => match serde_json::from_value::<MarketData>(raw) {
            Ok(market) => Some(market),
            Err(e) => {
                warning.get_or_insert_with(|| format!("Ignoring unreadable market data: {e}"));
                None
            }
        },
    };

    Ok(AnalysisOutcome {
        analysis,
        market,
        warning,
    })
}

/// Human-readable message from an error body: `{detail}` when present,
/// otherwise the raw body.
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(s),
        }) => s,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.trim().to_string(),
    }
}
