// External recommendation scorer: ranks events for a user profile. Treated
// as an opaque collaborator behind a trait so tests and degraded mode can
// substitute for the network.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::ScorerConfig;
use crate::embedding::retry_backoff;
use crate::error::{AppError, AppResult};

/// Profile payload sent to the scorer.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub interests: Vec<String>,
    pub engagement_score: f64,
}

/// Per-event feature row sent to the scorer.
#[derive(Debug, Clone, Serialize)]
pub struct EventFeatures {
    pub event_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub category: Vec<String>,
    pub start_time: Option<String>,
    pub host_score: f64,
    pub trust_score: f64,
}

/// Ordered result row from the scorer. Order is authoritative; the caller
/// must never re-derive it locally.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoredEvent {
    pub event_id: String,
    pub score: f64,
    #[serde(default)]
    pub explanation: Vec<String>,
    #[serde(default)]
    pub debug: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ScorerResponse {
    results: Vec<ScoredEvent>,
}

#[async_trait]
pub trait RecommendationScorer: Send + Sync {
    async fn score(
        &self,
        user: &UserProfile,
        events: &[EventFeatures],
    ) -> AppResult<Vec<ScoredEvent>>;
}

/// HTTP client for the separately hosted scoring service.
pub struct HttpRecommendationScorer {
    client: reqwest::Client,
    url: String,
    max_retries: u32,
}

impl HttpRecommendationScorer {
    pub fn new(config: &ScorerConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn request(
        &self,
        user: &UserProfile,
        events: &[EventFeatures],
    ) -> AppResult<Vec<ScoredEvent>> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "user": user,
                "events": events,
            }))
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Scorer request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "Scorer returned {}",
                response.status()
            )));
        }

        let body: ScorerResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Malformed scorer response: {}", e)))?;
        Ok(body.results)
    }
}

#[async_trait]
impl RecommendationScorer for HttpRecommendationScorer {
    async fn score(
        &self,
        user: &UserProfile,
        events: &[EventFeatures],
    ) -> AppResult<Vec<ScoredEvent>> {
        let mut attempt = 0;
        loop {
            match self.request(user, events).await {
                Ok(results) => return Ok(results),
                Err(err) if attempt < self.max_retries => {
                    tracing::warn!("Scorer attempt {} failed, retrying: {}", attempt + 1, err);
                    tokio::time::sleep(retry_backoff(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
