//! Pluggable rubric judgment.
//!
//! Free-text essays are not graded by this crate. A [`RubricJudge`] (a human
//! review queue, a model-assisted reviewer) turns a response into
//! per-category satisfaction, and the rubric grader only does the math.
//! Implementations live in `examscore-judges`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::RubricItem;

/// Produces per-category satisfaction for a written response.
#[async_trait]
pub trait RubricJudge: Send + Sync {
    /// Human-readable judge name (e.g. "manual", "remote").
    fn name(&self) -> &str;

    /// Judge one response. May be slow; callers bound it with a deadline.
    async fn judge(&self, request: &JudgeRequest) -> anyhow::Result<JudgeResponse>;

    /// Whether a failed judgment should not be retried.
    fn is_permanent(&self, _error: &anyhow::Error) -> bool {
        false
    }

    /// Backoff requested by the judge for this failure, if any.
    fn retry_after(&self, _error: &anyhow::Error) -> Option<Duration> {
        None
    }
}

/// What a judge needs to see: the checklist and the response text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeRequest {
    pub item_id: String,
    pub categories: Vec<CategoryCriteria>,
    pub response: String,
}

/// One rubric category's checklist. Weights are not sent to judges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCriteria {
    pub name: String,
    pub criteria: Vec<String>,
}

impl JudgeRequest {
    pub fn new(item: &RubricItem, response: impl Into<String>) -> Self {
        Self {
            item_id: item.id.clone(),
            categories: item
                .categories
                .iter()
                .map(|c| CategoryCriteria {
                    name: c.name.clone(),
                    criteria: c.criteria.clone(),
                })
                .collect(),
            response: response.into(),
        }
    }
}

/// A judge's verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeResponse {
    /// Category name → satisfaction in `0.0..=1.0`.
    pub satisfaction: BTreeMap<String, f64>,
    /// Who or what produced the verdict, for the audit trail.
    #[serde(default)]
    pub reviewer: String,
    #[serde(default)]
    pub latency_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemMeta, RubricCategory};

    #[test]
    fn request_carries_criteria_not_weights() {
        let item = RubricItem {
            id: "wc_001".into(),
            categories: vec![RubricCategory {
                name: "expression".into(),
                weight: 100,
                criteria: vec![
                    "Professional business tone".into(),
                    "Correct grammar and punctuation".into(),
                ],
            }],
            meta: ItemMeta::default(),
        };
        let request = JudgeRequest::new(&item, "Dear Ms. Chen,");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["item_id"], "wc_001");
        assert_eq!(json["categories"][0]["criteria"][1], "Correct grammar and punctuation");
        assert!(json["categories"][0].get("weight").is_none());
    }

    #[test]
    fn response_defaults() {
        let response: JudgeResponse =
            serde_json::from_str(r#"{"satisfaction": {"expression": 0.5}}"#).unwrap();
        assert_eq!(response.satisfaction["expression"], 0.5);
        assert!(response.reviewer.is_empty());
        assert_eq!(response.latency_ms, 0);
    }
}
