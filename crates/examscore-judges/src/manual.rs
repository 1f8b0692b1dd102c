//! Pre-recorded human score sheets.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

use examscore_core::traits::{JudgeRequest, JudgeResponse, RubricJudge};

use crate::error::JudgeError;

/// Score sheet file layout.
#[derive(Debug, Deserialize)]
struct ScoreSheetFile {
    #[serde(default)]
    reviewer: String,
    /// Item id → category → satisfaction.
    scores: HashMap<String, BTreeMap<String, f64>>,
}

/// A judge that replays satisfaction scores recorded by a human reviewer.
///
/// Essays without a recorded score fail with [`JudgeError::UnknownItem`],
/// which is permanent, so the engine leaves them pending.
#[derive(Debug)]
pub struct ManualJudge {
    /// Item id → category → satisfaction.
    scores: HashMap<String, BTreeMap<String, f64>>,
    reviewer: String,
    /// Number of calls made.
    call_count: AtomicU32,
    /// Last request received.
    last_request: Mutex<Option<JudgeRequest>>,
}

impl ManualJudge {
    /// Create a judge from in-memory score sheets.
    pub fn new(scores: HashMap<String, BTreeMap<String, f64>>) -> Self {
        Self {
            scores,
            reviewer: "manual".to_string(),
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Load score sheets from a JSON file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read score sheets: {}", path.display()))?;
        let sheet: ScoreSheetFile = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse score sheets: {}", path.display()))?;

        let mut judge = Self::new(sheet.scores);
        if !sheet.reviewer.is_empty() {
            judge.reviewer = sheet.reviewer;
        }
        tracing::debug!(
            items = judge.scores.len(),
            reviewer = %judge.reviewer,
            "loaded score sheets"
        );
        Ok(judge)
    }

    /// Name recorded as the reviewer on every verdict.
    pub fn with_reviewer(mut self, reviewer: impl Into<String>) -> Self {
        self.reviewer = reviewer.into();
        self
    }

    /// Get the number of calls made to this judge.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last request made to this judge.
    pub fn last_request(&self) -> Option<JudgeRequest> {
        self.last_request
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl RubricJudge for ManualJudge {
    fn name(&self) -> &str {
        "manual"
    }

    async fn judge(&self, request: &JudgeRequest) -> anyhow::Result<JudgeResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        let satisfaction = self
            .scores
            .get(&request.item_id)
            .cloned()
            .ok_or_else(|| JudgeError::UnknownItem(request.item_id.clone()))?;

        Ok(JudgeResponse {
            satisfaction,
            reviewer: self.reviewer.clone(),
            latency_ms: 0,
        })
    }

    fn is_permanent(&self, error: &anyhow::Error) -> bool {
        JudgeError::permanent(error)
    }
}
