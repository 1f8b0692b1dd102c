//! Core data model types for examscore.
//!
//! Gradable items are loaded once from content fixtures and never mutated.
//! Every grader, aggregator and report builds on these types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where an item sits in the exam hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMeta {
    /// Exam section (e.g. "FAR", "AUD").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Blueprint area code (e.g. "FAR-I", "EST-2").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blueprint_area: Option<String>,
    /// Owning task-based simulation, for TBS requirements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Free-form topic label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

/// A multiple-choice question with exactly one correct option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultipleChoiceItem {
    pub id: String,
    /// Option texts, in display order.
    pub options: Vec<String>,
    /// 0-based index of the correct option.
    pub correct_index: usize,
    #[serde(default)]
    pub meta: ItemMeta,
}

/// A numeric answer accepted within an inclusive tolerance band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationItem {
    pub id: String,
    pub correct_value: f64,
    /// Author-specified half-width of the accepted band.
    pub tolerance: f64,
    #[serde(default)]
    pub meta: ItemMeta,
}

/// A written response graded against a weighted rubric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricItem {
    pub id: String,
    /// Categories in display order. Weights must sum to 100.
    pub categories: Vec<RubricCategory>,
    #[serde(default)]
    pub meta: ItemMeta,
}

/// One weighted rubric category (e.g. organization, development, expression).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricCategory {
    pub name: String,
    /// Weight in percentage points, `0 < weight <= 100`.
    pub weight: u32,
    /// Qualitative checklist judged by an external reviewer.
    pub criteria: Vec<String>,
}

impl RubricItem {
    /// Look up a category by name.
    pub fn category(&self, name: &str) -> Option<&RubricCategory> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Sum of category weights in percentage points.
    pub fn total_weight(&self) -> u32 {
        self.categories.iter().map(|c| c.weight).sum()
    }
}

/// Any item the engine knows how to grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GradableItem {
    MultipleChoice(MultipleChoiceItem),
    Calculation(CalculationItem),
    Rubric(RubricItem),
}

impl GradableItem {
    pub fn id(&self) -> &str {
        match self {
            GradableItem::MultipleChoice(item) => &item.id,
            GradableItem::Calculation(item) => &item.id,
            GradableItem::Rubric(item) => &item.id,
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            GradableItem::MultipleChoice(_) => ItemKind::MultipleChoice,
            GradableItem::Calculation(_) => ItemKind::Calculation,
            GradableItem::Rubric(_) => ItemKind::RubricCriterion,
        }
    }

    pub fn meta(&self) -> &ItemMeta {
        match self {
            GradableItem::MultipleChoice(item) => &item.meta,
            GradableItem::Calculation(item) => &item.meta,
            GradableItem::Rubric(item) => &item.meta,
        }
    }
}

/// The closed set of answer modalities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    MultipleChoice,
    Calculation,
    RubricCriterion,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::MultipleChoice => write!(f, "multiple_choice"),
            ItemKind::Calculation => write!(f, "calculation"),
            ItemKind::RubricCriterion => write!(f, "rubric_criterion"),
        }
    }
}

impl FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "multiple_choice" | "mcq" => Ok(ItemKind::MultipleChoice),
            "calculation" | "numeric" => Ok(ItemKind::Calculation),
            "rubric" | "rubric_criterion" | "written_communication" | "essay" => {
                Ok(ItemKind::RubricCriterion)
            }
            other => Err(format!("unsupported item type: {other}")),
        }
    }
}

/// Published weighting for one blueprint area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlueprintArea {
    /// Area code matching `ItemMeta::blueprint_area`.
    pub code: String,
    #[serde(default)]
    pub name: String,
    /// Published share of the exam in percent, as `[min, max]`.
    pub weight_range: [f64; 2],
}

/// Exam-body metadata used when composing reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamBlueprint {
    /// Exam or section name (e.g. "CPA FAR").
    #[serde(default)]
    pub exam: String,
    /// Minimum overall percentage to pass.
    #[serde(default = "default_passing_percentage")]
    pub passing_percentage: f64,
    #[serde(default)]
    pub areas: Vec<BlueprintArea>,
}

impl Default for ExamBlueprint {
    fn default() -> Self {
        Self {
            exam: String::new(),
            passing_percentage: default_passing_percentage(),
            areas: Vec::new(),
        }
    }
}

impl ExamBlueprint {
    pub fn area(&self, code: &str) -> Option<&BlueprintArea> {
        self.areas.iter().find(|a| a.code == code)
    }
}

/// Passing score shared by the certification bodies in the corpus.
pub const DEFAULT_PASSING_PERCENTAGE: f64 = 75.0;

fn default_passing_percentage() -> f64 {
    DEFAULT_PASSING_PERCENTAGE
}

/// A collection of gradable items loaded from one fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSet {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub items: Vec<GradableItem>,
    #[serde(default)]
    pub blueprint: Option<ExamBlueprint>,
}
