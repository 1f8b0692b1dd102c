//! Remote reviewer service judge.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;

use examscore_core::traits::{JudgeRequest, JudgeResponse, RubricJudge};

use crate::error::JudgeError;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// A judge backed by an HTTP reviewer service.
///
/// Sends the rubric checklist and response text to
/// `POST {base_url}/v1/judgements` and expects per-category satisfaction back.
pub struct RemoteJudge {
    api_key: String,
    base_url: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl RemoteJudge {
    pub fn new(api_key: &str, base_url: &str, timeout_secs: Option<u64>) -> Result<Self, JudgeError> {
        let timeout_secs = timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| JudgeError::NetworkError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_secs,
            client,
        })
    }
}

#[derive(Deserialize)]
struct JudgementResponse {
    satisfaction: std::collections::BTreeMap<String, f64>,
    #[serde(default)]
    reviewer: String,
}

#[derive(Deserialize)]
struct ServiceError {
    error: ServiceErrorBody,
}

#[derive(Deserialize)]
struct ServiceErrorBody {
    message: String,
}

#[async_trait]
impl RubricJudge for RemoteJudge {
    fn name(&self) -> &str {
        "remote"
    }

    #[instrument(skip(self, request), fields(item = %request.item_id))]
    async fn judge(&self, request: &JudgeRequest) -> anyhow::Result<JudgeResponse> {
        let start = Instant::now();

        let response = self
            .client
            .post(format!("{}/v1/judgements", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    JudgeError::Timeout(self.timeout_secs)
                } else {
                    JudgeError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5)
                .saturating_mul(1000);
            return Err(JudgeError::RateLimited {
                retry_after_ms: retry_after,
            }
            .into());
        }
        if status == 401 || status == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(JudgeError::AuthenticationFailed(body).into());
        }
        if status == 404 {
            return Err(JudgeError::UnknownItem(request.item_id.clone()).into());
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ServiceError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(JudgeError::ApiError { status, message }.into());
        }

        let judgement: JudgementResponse =
            response.json().await.map_err(|e| JudgeError::ApiError {
                status: 0,
                message: format!("failed to parse response: {e}"),
            })?;

        Ok(JudgeResponse {
            satisfaction: judgement.satisfaction,
            reviewer: judgement.reviewer,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn is_permanent(&self, error: &anyhow::Error) -> bool {
        JudgeError::permanent(error)
    }

    fn retry_after(&self, error: &anyhow::Error) -> Option<Duration> {
        JudgeError::retry_after(error)
    }
}
