//! Exam reports: composition, JSON persistence, and progress comparison.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{AggregateScore, GroupBy, UNASSIGNED};
use crate::error::SubmissionError;
use crate::grade::{ScoreDetail, ScoreResult};
use crate::model::{ExamBlueprint, ItemKind, DEFAULT_PASSING_PERCENTAGE};

/// Grouping levels the composer expects its aggregate tree to use.
pub const REPORT_LEVELS: [GroupBy; 2] = [GroupBy::Section, GroupBy::BlueprintArea];

/// Areas scoring below this percentage are flagged as weak.
pub const WEAK_AREA_PERCENTAGE: f64 = 60.0;

/// A complete, immutable exam report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// The grading session this report belongs to.
    pub session_id: String,
    pub exam: ExamSummary,
    pub earned_points: f64,
    pub possible_points: f64,
    /// Fraction of possible points earned; `None` if nothing was graded.
    pub percentage: Option<f64>,
    pub passing_percentage: f64,
    pub passed: Option<bool>,
    pub band: Option<ScoreBand>,
    pub sections: Vec<SectionReport>,
    /// Expected items with no score yet (not counted as zero).
    #[serde(default)]
    pub pending: Vec<PendingItem>,
    /// Submissions rejected before grading.
    #[serde(default)]
    pub rejected: Vec<RejectedSubmission>,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Summary of the content graded against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamSummary {
    pub name: String,
    /// Items the session was expected to cover.
    pub expected_items: usize,
    pub graded_items: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionReport {
    pub section: String,
    pub earned_points: f64,
    pub possible_points: f64,
    pub percentage: Option<f64>,
    pub areas: Vec<AreaReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaReport {
    pub code: String,
    #[serde(default)]
    pub name: String,
    pub earned_points: f64,
    pub possible_points: f64,
    pub percentage: Option<f64>,
    pub weak: bool,
    /// This area's share of the exam's possible points, in percent.
    pub share_of_exam: Option<f64>,
    /// Published `[min, max]` weighting, in percent.
    pub published_range: Option<[f64; 2]>,
    pub within_published_range: Option<bool>,
    pub items: Vec<ItemReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemReport {
    pub item_id: String,
    pub kind: ItemKind,
    pub earned: f64,
    pub max_possible: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub detail: ScoreDetail,
}

impl From<&ScoreResult> for ItemReport {
    fn from(result: &ScoreResult) -> Self {
        Self {
            item_id: result.item_id.clone(),
            kind: result.kind,
            earned: result.earned,
            max_possible: result.max_possible,
            task_id: result.meta.task_id.clone(),
            detail: result.detail.clone(),
        }
    }
}

/// An item expected in the session but not graded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingItem {
    pub item_id: String,
    pub reason: String,
}

/// A submission rejected by the normalizer or rubric grader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedSubmission {
    pub item_id: String,
    pub error: SubmissionError,
}

/// Score interpretation bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    NeedsMorePreparation,
    Passing,
    Strong,
    Excellent,
}

impl ScoreBand {
    /// Band for a percentage expressed on a 0–100 scale.
    pub fn from_percent(percent: f64) -> Self {
        if percent >= 95.0 {
            ScoreBand::Excellent
        } else if percent >= 85.0 {
            ScoreBand::Strong
        } else if percent >= DEFAULT_PASSING_PERCENTAGE {
            ScoreBand::Passing
        } else {
            ScoreBand::NeedsMorePreparation
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScoreBand::NeedsMorePreparation => "Needs More Preparation",
            ScoreBand::Passing => "Passing",
            ScoreBand::Strong => "Strong Performance",
            ScoreBand::Excellent => "Excellent",
        }
    }
}

/// Everything the composer needs besides the aggregate tree.
#[derive(Debug, Clone, Default)]
pub struct ComposeContext<'a> {
    pub session_id: String,
    pub exam_name: String,
    pub expected_items: usize,
    pub blueprint: Option<&'a ExamBlueprint>,
    /// Overrides the blueprint's passing percentage.
    pub passing_percentage: Option<f64>,
    pub pending: Vec<PendingItem>,
    pub rejected: Vec<RejectedSubmission>,
    pub duration_ms: u64,
}

/// Reshape an aggregate tree (grouped by [`REPORT_LEVELS`]) into a report.
///
/// No grading happens here: every number comes from `tree`.
pub fn compose(tree: &AggregateScore, ctx: ComposeContext<'_>) -> ExamReport {
    let passing_percentage = ctx
        .passing_percentage
        .or_else(|| ctx.blueprint.map(|b| b.passing_percentage))
        .unwrap_or(DEFAULT_PASSING_PERCENTAGE);

    let sections = tree
        .breakdown_by_group
        .iter()
        .map(|(section, node)| compose_section(section, node, tree.possible_points, ctx.blueprint))
        .collect();

    let percent = tree.percentage.map(|p| p * 100.0);

    ExamReport {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        session_id: ctx.session_id,
        exam: ExamSummary {
            name: ctx.exam_name,
            expected_items: ctx.expected_items,
            graded_items: tree.item_count,
        },
        earned_points: tree.earned_points,
        possible_points: tree.possible_points,
        percentage: tree.percentage,
        passing_percentage,
        passed: percent.map(|p| p >= passing_percentage),
        band: percent.map(ScoreBand::from_percent),
        sections,
        pending: ctx.pending,
        rejected: ctx.rejected,
        duration_ms: ctx.duration_ms,
    }
}

fn compose_section(
    section: &str,
    node: &AggregateScore,
    exam_possible: f64,
    blueprint: Option<&ExamBlueprint>,
) -> SectionReport {
    let areas = if node.breakdown_by_group.is_empty() {
        vec![compose_area(UNASSIGNED, node, exam_possible, blueprint)]
    } else {
        node.breakdown_by_group
            .iter()
            .map(|(code, area)| compose_area(code, area, exam_possible, blueprint))
            .collect()
    };

    SectionReport {
        section: section.to_string(),
        earned_points: node.earned_points,
        possible_points: node.possible_points,
        percentage: node.percentage,
        areas,
    }
}

fn compose_area(
    code: &str,
    node: &AggregateScore,
    exam_possible: f64,
    blueprint: Option<&ExamBlueprint>,
) -> AreaReport {
    let published = blueprint.and_then(|b| b.area(code));
    let share_of_exam = (exam_possible > 0.0).then(|| node.possible_points / exam_possible * 100.0);
    let published_range = published.map(|a| a.weight_range);
    let within_published_range = match (share_of_exam, published_range) {
        (Some(share), Some([min, max])) => Some(share >= min && share <= max),
        _ => None,
    };

    AreaReport {
        code: code.to_string(),
        name: published.map(|a| a.name.clone()).unwrap_or_default(),
        earned_points: node.earned_points,
        possible_points: node.possible_points,
        percentage: node.percentage,
        weak: node
            .percentage
            .is_some_and(|p| p * 100.0 < WEAK_AREA_PERCENTAGE),
        share_of_exam,
        published_range,
        within_published_range,
        items: node.all_results().into_iter().map(ItemReport::from).collect(),
    }
}

impl ExamReport {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: ExamReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Areas flagged as weak, as `(section, area)` pairs.
    pub fn weak_areas(&self) -> Vec<(&str, &AreaReport)> {
        self.sections
            .iter()
            .flat_map(|s| s.areas.iter().map(move |a| (s.section.as_str(), a)))
            .filter(|(_, a)| a.weak)
            .collect()
    }

    fn area_percentages(&self) -> HashMap<String, f64> {
        self.sections
            .iter()
            .flat_map(|s| {
                s.areas.iter().filter_map(move |a| {
                    a.percentage
                        .map(|p| (format!("{}/{}", s.section, a.code), p))
                })
            })
            .collect()
    }

    /// Compare this report against an earlier attempt, per blueprint area.
    pub fn compare(&self, baseline: &ExamReport, threshold: f64) -> ProgressReport {
        let baseline_scores = baseline.area_percentages();
        let current_scores = self.area_percentages();

        let mut declines = Vec::new();
        let mut improvements = Vec::new();
        let mut unchanged = 0usize;
        let mut new_areas = 0usize;

        for (area, &current) in &current_scores {
            if let Some(&baseline_val) = baseline_scores.get(area) {
                let change = AreaChange {
                    area: area.clone(),
                    baseline: baseline_val,
                    current,
                    delta: current - baseline_val,
                };
                if change.delta < -threshold {
                    declines.push(change);
                } else if change.delta > threshold {
                    improvements.push(change);
                } else {
                    unchanged += 1;
                }
            } else {
                new_areas += 1;
            }
        }

        declines.sort_by(|a, b| a.area.cmp(&b.area));
        improvements.sort_by(|a, b| a.area.cmp(&b.area));

        let removed_areas = baseline_scores
            .keys()
            .filter(|k| !current_scores.contains_key(*k))
            .count();

        let overall_delta = match (self.percentage, baseline.percentage) {
            (Some(current), Some(base)) => Some(current - base),
            _ => None,
        };

        ProgressReport {
            declines,
            improvements,
            unchanged,
            new_areas,
            removed_areas,
            overall_delta,
        }
    }
}

/// Result of comparing two exam reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReport {
    /// Areas where the percentage went down.
    pub declines: Vec<AreaChange>,
    /// Areas where the percentage went up.
    pub improvements: Vec<AreaChange>,
    /// Areas with no significant change.
    pub unchanged: usize,
    /// Areas in current but not baseline.
    pub new_areas: usize,
    /// Areas in baseline but not current.
    pub removed_areas: usize,
    pub overall_delta: Option<f64>,
}

/// A change in one `section/area` percentage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaChange {
    pub area: String,
    pub baseline: f64,
    pub current: f64,
    pub delta: f64,
}

impl ProgressReport {
    /// Format the progress report as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**Summary:** {} declines, {} improvements, {} unchanged\n\n",
            self.declines.len(),
            self.improvements.len(),
            self.unchanged
        ));

        if let Some(delta) = self.overall_delta {
            md.push_str(&format!("**Overall:** {:+.1}%\n\n", delta * 100.0));
        }

        for (title, changes) in [("Declines", &self.declines), ("Improvements", &self.improvements)] {
            if changes.is_empty() {
                continue;
            }
            md.push_str(&format!("### {title}\n\n"));
            md.push_str("| Area | Baseline | Current | Delta |\n");
            md.push_str("|------|----------|---------|-------|\n");
            for c in changes {
                md.push_str(&format!(
                    "| {} | {:.1}% | {:.1}% | {:+.1}% |\n",
                    c.area,
                    c.baseline * 100.0,
                    c.current * 100.0,
                    c.delta * 100.0
                ));
            }
            md.push('\n');
        }

        md
    }

    /// Returns true if any area declined.
    pub fn has_declines(&self) -> bool {
        !self.declines.is_empty()
    }
}
