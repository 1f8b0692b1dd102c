//! Grading session orchestrator.
//!
//! Grades every submission in a session independently with bounded
//! parallelism. Free-text essays are sent to a [`RubricJudge`]; everything
//! else is graded synchronously.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::aggregate::aggregate_tree;
use crate::catalog::ContentCatalog;
use crate::error::{GradeError, SubmissionError};
use crate::grade::{grade, ScoreResult};
use crate::model::{GradableItem, RubricItem};
use crate::normalize::{normalize, resolve, rubric_satisfaction, Submission, TypedAnswer};
use crate::report::{compose, ComposeContext, ExamReport, PendingItem, RejectedSubmission, REPORT_LEVELS};
use crate::traits::{JudgeRequest, RubricJudge};

/// Configuration for the grading engine.
#[derive(Debug, Clone)]
pub struct GradingEngineConfig {
    /// Maximum submissions graded concurrently.
    pub parallelism: usize,
    /// Deadline for one essay judgment, retries included.
    pub judge_timeout: Duration,
    /// Retries on transient judge errors.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each attempt.
    pub retry_delay: Duration,
    /// Overrides the blueprint's passing percentage.
    pub passing_percentage: Option<f64>,
}

impl Default for GradingEngineConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            judge_timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_delay: Duration::from_millis(500),
            passing_percentage: None,
        }
    }
}

/// One test-taker's answers to an exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamSession {
    pub id: String,
    #[serde(default)]
    pub exam: String,
    /// Items the session must cover. Expected items without a score are
    /// reported as pending; an empty list expects only what was submitted.
    #[serde(default)]
    pub expected_items: Vec<String>,
    #[serde(default)]
    pub submissions: Vec<Submission>,
}

impl ExamSession {
    /// Load a session from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read session from {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse session JSON: {}", path.display()))
    }
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_item_graded(&self, result: &ScoreResult);
    fn on_item_rejected(&self, item_id: &str, error: &SubmissionError);
    fn on_item_pending(&self, item_id: &str, reason: &str);
    fn on_session_complete(&self, graded: usize, pending: usize, rejected: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_item_graded(&self, _: &ScoreResult) {}
    fn on_item_rejected(&self, _: &str, _: &SubmissionError) {}
    fn on_item_pending(&self, _: &str, _: &str) {}
    fn on_session_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
}

/// What happened to one submission.
#[derive(Debug)]
enum Outcome {
    Graded(ScoreResult),
    Rejected(RejectedSubmission),
    Pending(PendingItem),
}

/// Grade a single submission synchronously.
///
/// Free-text essays cannot be graded this way; they yield a
/// `TypeMismatch` like any other malformed answer.
pub fn grade_submission(
    catalog: &ContentCatalog,
    submission: &Submission,
) -> Result<ScoreResult, GradeError> {
    let item = resolve(catalog, submission)?;
    let answer = normalize(item, &submission.answer)?;
    grade(item, &answer)
}

/// The grading engine.
pub struct GradingEngine {
    catalog: Arc<ContentCatalog>,
    judge: Option<Arc<dyn RubricJudge>>,
    config: GradingEngineConfig,
}

impl GradingEngine {
    pub fn new(
        catalog: Arc<ContentCatalog>,
        judge: Option<Arc<dyn RubricJudge>>,
        config: GradingEngineConfig,
    ) -> Self {
        Self {
            catalog,
            judge,
            config,
        }
    }

    pub fn catalog(&self) -> &ContentCatalog {
        &self.catalog
    }

    /// Grade a session and compose its report.
    ///
    /// Returns an error only when a submission pairs an item with an answer
    /// no grader supports; every other problem is recorded in the report.
    pub async fn grade_session(
        &self,
        session: &ExamSession,
        progress: &dyn ProgressReporter,
    ) -> Result<ExamReport> {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));

        let mut results = Vec::new();
        let mut pending = Vec::new();
        let mut rejected = Vec::new();
        let mut submitted = HashSet::new();
        let mut futures = FuturesUnordered::new();

        for submission in &session.submissions {
            if !submitted.insert(submission.item_id.as_str()) {
                let error = SubmissionError::DuplicateSubmission {
                    item_id: submission.item_id.clone(),
                };
                progress.on_item_rejected(&submission.item_id, &error);
                rejected.push(RejectedSubmission {
                    item_id: submission.item_id.clone(),
                    error,
                });
                continue;
            }

            let catalog = Arc::clone(&self.catalog);
            let judge = self.judge.clone();
            let semaphore = Arc::clone(&semaphore);
            let config = self.config.clone();
            let submission = submission.clone();

            futures.push(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| anyhow::anyhow!("semaphore closed"))?;
                grade_one(&catalog, judge.as_deref(), &config, &submission).await
            });
        }

        while let Some(outcome) = futures.next().await {
            match outcome? {
                Outcome::Graded(result) => {
                    progress.on_item_graded(&result);
                    results.push(result);
                }
                Outcome::Rejected(r) => {
                    progress.on_item_rejected(&r.item_id, &r.error);
                    rejected.push(r);
                }
                Outcome::Pending(p) => {
                    progress.on_item_pending(&p.item_id, &p.reason);
                    pending.push(p);
                }
            }
        }

        for item_id in &session.expected_items {
            if submitted.contains(item_id.as_str()) {
                continue;
            }
            let reason = if self.catalog.get(item_id).is_some() {
                "not answered"
            } else {
                "not in loaded content"
            };
            progress.on_item_pending(item_id, reason);
            pending.push(PendingItem {
                item_id: item_id.clone(),
                reason: reason.to_string(),
            });
        }

        pending.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        rejected.sort_by(|a, b| a.item_id.cmp(&b.item_id));

        let elapsed = start.elapsed();
        progress.on_session_complete(results.len(), pending.len(), rejected.len(), elapsed);
        tracing::info!(
            session = %session.id,
            graded = results.len(),
            pending = pending.len(),
            rejected = rejected.len(),
            "session graded"
        );

        let tree = aggregate_tree(&results, &REPORT_LEVELS);
        let expected_items = if session.expected_items.is_empty() {
            submitted.len()
        } else {
            session.expected_items.len()
        };
        let exam_name = if session.exam.is_empty() {
            self.catalog.name().to_string()
        } else {
            session.exam.clone()
        };

        Ok(compose(
            &tree,
            ComposeContext {
                session_id: session.id.clone(),
                exam_name,
                expected_items,
                blueprint: self.catalog.blueprint(),
                passing_percentage: self.config.passing_percentage,
                pending,
                rejected,
                duration_ms: elapsed.as_millis() as u64,
            },
        ))
    }
}

async fn grade_one(
    catalog: &ContentCatalog,
    judge: Option<&dyn RubricJudge>,
    config: &GradingEngineConfig,
    submission: &Submission,
) -> Result<Outcome> {
    let item = match resolve(catalog, submission) {
        Ok(item) => item,
        Err(error) => return Ok(rejected(error)),
    };

    let answer = match (item, &submission.answer, judge) {
        (GradableItem::Rubric(rubric), Value::String(text), Some(judge)) => {
            match judge_essay(judge, config, rubric, text).await {
                Ok(answer) => answer,
                Err(reason) => {
                    return Ok(Outcome::Pending(PendingItem {
                        item_id: rubric.id.clone(),
                        reason,
                    }))
                }
            }
        }
        (_, raw, _) => match normalize(item, raw) {
            Ok(answer) => answer,
            Err(error) => return Ok(rejected(error)),
        },
    };

    match grade(item, &answer) {
        Ok(result) => Ok(Outcome::Graded(result)),
        Err(GradeError::Submission(error)) => Ok(rejected(error)),
        Err(fatal) => {
            tracing::error!("aborting session: {fatal}");
            Err(fatal.into())
        }
    }
}

fn rejected(error: SubmissionError) -> Outcome {
    Outcome::Rejected(RejectedSubmission {
        item_id: error.item_id().to_string(),
        error,
    })
}

/// Ask the judge for satisfaction scores, under the configured deadline.
///
/// The verdict is checked against the rubric like any client map. Any
/// failure, including an off-rubric verdict, is returned as the reason the
/// item stays pending.
async fn judge_essay(
    judge: &dyn RubricJudge,
    config: &GradingEngineConfig,
    item: &RubricItem,
    response: &str,
) -> std::result::Result<TypedAnswer, String> {
    let request = JudgeRequest::new(item, response);
    let attempt = judge_with_retries(judge, config, &request);

    match tokio::time::timeout(config.judge_timeout, attempt).await {
        Ok(Ok(satisfaction)) => rubric_satisfaction(item, satisfaction).map_err(|error| {
            tracing::warn!(item = %item.id, judge = judge.name(), "unusable verdict: {error}");
            format!("judge returned an unusable verdict: {error}")
        }),
        Ok(Err(e)) => {
            tracing::warn!(item = %item.id, judge = judge.name(), "judgment failed: {e:#}");
            Err(format!("judgment failed: {e}"))
        }
        Err(_) => {
            tracing::warn!(item = %item.id, judge = judge.name(), "judgment timed out");
            Err(format!(
                "judgment timed out after {}s",
                config.judge_timeout.as_secs_f64()
            ))
        }
    }
}

async fn judge_with_retries(
    judge: &dyn RubricJudge,
    config: &GradingEngineConfig,
    request: &JudgeRequest,
) -> Result<std::collections::BTreeMap<String, f64>> {
    let mut last_error = None;
    let mut retry_delay = config.retry_delay;

    for retry in 0..=config.max_retries {
        if retry > 0 {
            tokio::time::sleep(retry_delay).await;
            retry_delay = retry_delay.saturating_mul(2).min(Duration::from_secs(60));
        }
        match judge.judge(request).await {
            Ok(response) => {
                tracing::debug!(
                    item = %request.item_id,
                    reviewer = %response.reviewer,
                    latency_ms = response.latency_ms,
                    "essay judged"
                );
                return Ok(response.satisfaction);
            }
            Err(e) => {
                if judge.is_permanent(&e) {
                    return Err(e);
                }
                if let Some(delay) = judge.retry_after(&e) {
                    retry_delay = delay;
                }
                tracing::debug!(item = %request.item_id, retry, "judge error: {e:#}");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("judge made no attempt")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        CalculationItem, ContentSet, ExamBlueprint, ItemMeta, MultipleChoiceItem, RubricCategory,
    };
    use crate::report::ScoreBand;
    use crate::traits::JudgeResponse;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn meta(area: &str) -> ItemMeta {
        ItemMeta {
            section: Some("FAR".into()),
            blueprint_area: Some(area.into()),
            ..Default::default()
        }
    }

    fn catalog() -> Arc<ContentCatalog> {
        let set = ContentSet {
            id: "far".into(),
            name: "FAR sample".into(),
            description: String::new(),
            items: vec![
                GradableItem::MultipleChoice(MultipleChoiceItem {
                    id: "q1".into(),
                    options: vec!["Income Statement".into(), "Balance Sheet".into()],
                    correct_index: 1,
                    meta: meta("FAR-I"),
                }),
                GradableItem::Calculation(CalculationItem {
                    id: "tbs-1.r1".into(),
                    correct_value: 45.6,
                    tolerance: 1.0,
                    meta: ItemMeta {
                        task_id: Some("tbs-1".into()),
                        ..meta("FAR-II")
                    },
                }),
                GradableItem::Rubric(RubricItem {
                    id: "wc_001".into(),
                    categories: vec![
                        RubricCategory {
                            name: "organization".into(),
                            weight: 30,
                            criteria: vec!["Clear opening".into()],
                        },
                        RubricCategory {
                            name: "development".into(),
                            weight: 40,
                            criteria: vec!["Addresses the task".into()],
                        },
                        RubricCategory {
                            name: "expression".into(),
                            weight: 30,
                            criteria: vec!["Professional tone".into()],
                        },
                    ],
                    meta: meta("FAR-III"),
                }),
            ],
            blueprint: Some(ExamBlueprint::default()),
        };
        let (catalog, defects) = ContentCatalog::load(&[set]);
        assert!(defects.is_empty());
        Arc::new(catalog)
    }

    fn submission(item_id: &str, answer: Value) -> Submission {
        Submission {
            item_id: item_id.into(),
            answer,
        }
    }

    fn session(submissions: Vec<Submission>) -> ExamSession {
        ExamSession {
            id: "s-1".into(),
            exam: String::new(),
            expected_items: vec![],
            submissions,
        }
    }

    fn fast_config() -> GradingEngineConfig {
        GradingEngineConfig {
            parallelism: 2,
            judge_timeout: Duration::from_secs(5),
            max_retries: 2,
            retry_delay: Duration::from_millis(10),
            passing_percentage: None,
        }
    }

    /// Judge with canned behaviour for engine tests.
    struct ScriptedJudge {
        failures_before_success: u32,
        delay: Duration,
        calls: AtomicU32,
        last_response: Mutex<Option<String>>,
    }

    impl ScriptedJudge {
        fn new(failures_before_success: u32, delay: Duration) -> Self {
            Self {
                failures_before_success,
                delay,
                calls: AtomicU32::new(0),
                last_response: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl RubricJudge for ScriptedJudge {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn judge(&self, request: &JudgeRequest) -> Result<JudgeResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_response.lock().unwrap() = Some(request.response.clone());
            tokio::time::sleep(self.delay).await;
            if call < self.failures_before_success {
                anyhow::bail!("reviewer queue unavailable");
            }
            Ok(JudgeResponse {
                satisfaction: BTreeMap::from([
                    ("organization".into(), 1.0),
                    ("development".into(), 0.5),
                    ("expression".into(), 1.0),
                ]),
                reviewer: "scripted".into(),
                latency_ms: 0,
            })
        }

        fn is_permanent(&self, error: &anyhow::Error) -> bool {
            error.to_string().contains("forbidden")
        }
    }

    #[tokio::test]
    async fn grades_mixed_session() {
        let engine = GradingEngine::new(catalog(), None, fast_config());
        let report = engine
            .grade_session(
                &session(vec![
                    submission("q1", json!("B")),
                    submission("tbs-1.r1", json!("$45.00")),
                    submission(
                        "wc_001",
                        json!({"organization": 0.8, "development": 0.7, "expression": 0.9}),
                    ),
                ]),
                &NoopReporter,
            )
            .await
            .unwrap();

        assert_eq!(report.exam.graded_items, 3);
        assert_eq!(report.exam.name, "FAR sample");
        assert!((report.earned_points - 2.79).abs() < 1e-9);
        assert_eq!(report.possible_points, 3.0);
        assert_eq!(report.band, Some(ScoreBand::Strong));
        assert!(report.pending.is_empty());
        assert!(report.rejected.is_empty());
    }

    #[tokio::test]
    async fn defects_are_rejected_not_scored() {
        let engine = GradingEngine::new(catalog(), None, fast_config());
        let report = engine
            .grade_session(
                &session(vec![
                    submission("q1", json!(7)),
                    submission("q1", json!(1)),
                    submission("missing", json!(0)),
                    submission("wc_001", json!({"organization": 0.8})),
                    submission("tbs-1.r1", json!(44.6)),
                ]),
                &NoopReporter,
            )
            .await
            .unwrap();

        assert_eq!(report.exam.graded_items, 1);
        assert_eq!(report.possible_points, 1.0);
        let kinds: Vec<&str> = report.rejected.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(kinds, ["missing", "q1", "q1", "wc_001"]);
        assert!(report
            .rejected
            .iter()
            .any(|r| matches!(r.error, SubmissionError::DuplicateSubmission { .. })));
    }

    #[tokio::test]
    async fn free_text_without_judge_is_rejected() {
        let engine = GradingEngine::new(catalog(), None, fast_config());
        let report = engine
            .grade_session(
                &session(vec![submission("wc_001", json!("Dear CFO, ..."))]),
                &NoopReporter,
            )
            .await
            .unwrap();
        assert!(matches!(
            report.rejected[0].error,
            SubmissionError::TypeMismatch { .. }
        ));
    }

    #[tokio::test]
    async fn free_text_goes_to_judge_with_retries() {
        let judge = Arc::new(ScriptedJudge::new(2, Duration::ZERO));
        let engine = GradingEngine::new(catalog(), Some(judge.clone()), fast_config());
        let report = engine
            .grade_session(
                &session(vec![submission("wc_001", json!("Dear CFO, ..."))]),
                &NoopReporter,
            )
            .await
            .unwrap();

        assert_eq!(judge.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            judge.last_response.lock().unwrap().as_deref(),
            Some("Dear CFO, ...")
        );
        assert!((report.earned_points - 0.8).abs() < 1e-12);
    }

    #[tokio::test]
    async fn exhausted_retries_leave_item_pending() {
        let judge = Arc::new(ScriptedJudge::new(10, Duration::ZERO));
        let engine = GradingEngine::new(catalog(), Some(judge.clone()), fast_config());
        let report = engine
            .grade_session(
                &session(vec![
                    submission("wc_001", json!("memo")),
                    submission("q1", json!(1)),
                ]),
                &NoopReporter,
            )
            .await
            .unwrap();

        assert_eq!(judge.calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.pending.len(), 1);
        assert_eq!(report.pending[0].item_id, "wc_001");
        assert!(report.pending[0].reason.contains("judgment failed"));
        assert_eq!(report.possible_points, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_judge_times_out_to_pending() {
        let judge = Arc::new(ScriptedJudge::new(0, Duration::from_secs(120)));
        let engine = GradingEngine::new(catalog(), Some(judge), fast_config());
        let report = engine
            .grade_session(&session(vec![submission("wc_001", json!("memo"))]), &NoopReporter)
            .await
            .unwrap();

        assert_eq!(report.pending.len(), 1);
        assert!(report.pending[0].reason.contains("timed out"));
        assert_eq!(report.percentage, None);
    }

    /// Judge that scores a category the rubric does not have.
    struct OffRubricJudge;

    #[async_trait]
    impl RubricJudge for OffRubricJudge {
        fn name(&self) -> &str {
            "off-rubric"
        }

        async fn judge(&self, _request: &JudgeRequest) -> Result<JudgeResponse> {
            Ok(JudgeResponse {
                satisfaction: BTreeMap::from([
                    ("organization".into(), 1.0),
                    ("development".into(), 0.5),
                    ("expression".into(), 1.0),
                    ("grammar".into(), 0.2),
                ]),
                reviewer: "off-rubric".into(),
                latency_ms: 0,
            })
        }
    }

    #[tokio::test]
    async fn off_rubric_verdict_leaves_item_pending() {
        let engine = GradingEngine::new(catalog(), Some(Arc::new(OffRubricJudge)), fast_config());
        let report = engine
            .grade_session(&session(vec![submission("wc_001", json!("memo"))]), &NoopReporter)
            .await
            .unwrap();

        assert_eq!(report.exam.graded_items, 0);
        assert!(report.rejected.is_empty());
        assert_eq!(report.pending.len(), 1);
        assert_eq!(report.pending[0].item_id, "wc_001");
        assert!(report.pending[0]
            .reason
            .starts_with("judge returned an unusable verdict"));
        assert!(report.pending[0].reason.contains("grammar"));
    }

    #[tokio::test]
    async fn unanswered_expected_items_are_pending() {
        let engine = GradingEngine::new(catalog(), None, fast_config());
        let mut s = session(vec![submission("q1", json!(1))]);
        s.expected_items = vec!["q1".into(), "tbs-1.r1".into(), "retired-q".into()];

        let report = engine.grade_session(&s, &NoopReporter).await.unwrap();
        assert_eq!(report.exam.expected_items, 3);
        assert_eq!(
            report.pending,
            vec![
                PendingItem {
                    item_id: "retired-q".into(),
                    reason: "not in loaded content".into(),
                },
                PendingItem {
                    item_id: "tbs-1.r1".into(),
                    reason: "not answered".into(),
                },
            ]
        );
        assert_eq!(report.percentage, Some(1.0));
    }

    #[tokio::test]
    async fn submission_order_does_not_change_report() {
        let engine = GradingEngine::new(catalog(), None, fast_config());
        let mut submissions = vec![
            submission("q1", json!(0)),
            submission("tbs-1.r1", json!(46.6)),
            submission(
                "wc_001",
                json!({"organization": 0.1, "development": 0.3, "expression": 0.7}),
            ),
        ];
        let a = engine
            .grade_session(&session(submissions.clone()), &NoopReporter)
            .await
            .unwrap();
        submissions.reverse();
        let b = engine
            .grade_session(&session(submissions), &NoopReporter)
            .await
            .unwrap();

        assert_eq!(a.earned_points.to_bits(), b.earned_points.to_bits());
        assert_eq!(
            serde_json::to_value(&a.sections).unwrap(),
            serde_json::to_value(&b.sections).unwrap()
        );
    }

    #[test]
    fn grade_submission_sync() {
        let catalog = catalog();
        let result = grade_submission(&catalog, &submission("tbs-1.r1", json!("46.6"))).unwrap();
        assert!(result.is_full_credit());

        let err = grade_submission(&catalog, &submission("nope", json!(1))).unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn session_loads_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(
            &path,
            r#"{"id": "s-9", "submissions": [{"item_id": "q1", "answer": "B"}]}"#,
        )
        .unwrap();
        let s = ExamSession::load_json(&path).unwrap();
        assert_eq!(s.id, "s-9");
        assert!(s.expected_items.is_empty());
        assert_eq!(s.submissions[0].answer, json!("B"));
    }
}
