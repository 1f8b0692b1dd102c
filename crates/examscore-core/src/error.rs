//! Grading pipeline error types.
//!
//! Errors are grouped by who has to act on them: content defects go to
//! content maintainers, submission defects go back to the calling layer,
//! and aggregation edge cases are reported as "not applicable".

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ItemKind;

/// A content defect found while validating a gradable item.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    /// The correct option index does not point at an option.
    #[error("{item_id}: correct index {correct_index} is out of bounds for {option_count} options")]
    IndexOutOfBounds {
        item_id: String,
        correct_index: usize,
        option_count: usize,
    },

    /// A multiple-choice item offers fewer than two options.
    #[error("{item_id}: needs at least 2 options, found {option_count}")]
    DegenerateOptions { item_id: String, option_count: usize },

    /// A calculation item has a negative tolerance band.
    #[error("{item_id}: tolerance {tolerance} is negative")]
    NegativeTolerance { item_id: String, tolerance: f64 },

    /// A calculation item carries NaN or an infinite value.
    #[error("{item_id}: {field} is not a finite number")]
    NonFiniteValue { item_id: String, field: String },

    /// Rubric category weights do not add up to 100 percentage points.
    #[error("{item_id}: rubric weights sum to {total}, expected 100")]
    WeightSumMismatch { item_id: String, total: u32 },

    /// A rubric category weight is zero or above 100.
    #[error("{item_id}: category '{category}' has invalid weight {weight}")]
    InvalidCategoryWeight {
        item_id: String,
        category: String,
        weight: u32,
    },

    /// A rubric category lists no criteria.
    #[error("{item_id}: category '{category}' has no criteria")]
    EmptyCriteria { item_id: String, category: String },

    /// A rubric names the same category twice.
    #[error("{item_id}: category '{category}' is defined more than once")]
    DuplicateCategory { item_id: String, category: String },

    /// Two items in one content set share an id.
    #[error("duplicate item id: {item_id}")]
    DuplicateItemId { item_id: String },
}

impl ValidationError {
    /// The item the defect was found on.
    pub fn item_id(&self) -> &str {
        match self {
            ValidationError::IndexOutOfBounds { item_id, .. }
            | ValidationError::DegenerateOptions { item_id, .. }
            | ValidationError::NegativeTolerance { item_id, .. }
            | ValidationError::NonFiniteValue { item_id, .. }
            | ValidationError::WeightSumMismatch { item_id, .. }
            | ValidationError::InvalidCategoryWeight { item_id, .. }
            | ValidationError::EmptyCriteria { item_id, .. }
            | ValidationError::DuplicateCategory { item_id, .. }
            | ValidationError::DuplicateItemId { item_id } => item_id,
        }
    }

    /// Stable rule identifier, used by CI annotations.
    pub fn rule_id(&self) -> &'static str {
        match self {
            ValidationError::IndexOutOfBounds { .. } => "index-out-of-bounds",
            ValidationError::DegenerateOptions { .. } => "degenerate-options",
            ValidationError::NegativeTolerance { .. } => "negative-tolerance",
            ValidationError::NonFiniteValue { .. } => "non-finite-value",
            ValidationError::WeightSumMismatch { .. } => "weight-sum-mismatch",
            ValidationError::InvalidCategoryWeight { .. } => "invalid-category-weight",
            ValidationError::EmptyCriteria { .. } => "empty-criteria",
            ValidationError::DuplicateCategory { .. } => "duplicate-category",
            ValidationError::DuplicateItemId { .. } => "duplicate-item-id",
        }
    }
}

/// A submission that cannot be graded as sent.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmissionError {
    /// No item with this id exists in the loaded content.
    #[error("unknown item: {item_id}")]
    UnknownItem { item_id: String },

    /// The answer's shape does not match what the item expects.
    #[error("{item_id}: expected {expected}, got {found}")]
    TypeMismatch {
        item_id: String,
        expected: String,
        found: String,
    },

    /// A selected option index that the item does not offer.
    #[error("{item_id}: selected option {selected} but only {option_count} options exist")]
    SelectionOutOfRange {
        item_id: String,
        selected: i64,
        option_count: usize,
    },

    /// A rubric category has no satisfaction score.
    #[error("{item_id}: no satisfaction score for category '{category}'")]
    MissingCategorySatisfaction { item_id: String, category: String },

    /// A satisfaction score refers to a category the rubric does not define.
    #[error("{item_id}: rubric has no category '{category}'")]
    UnknownCategory { item_id: String, category: String },

    /// A satisfaction score outside `[0, 1]`.
    #[error("{item_id}: satisfaction {value} for '{category}' is outside 0..=1")]
    SatisfactionOutOfRange {
        item_id: String,
        category: String,
        value: f64,
    },

    /// The session already contains an answer for this item.
    #[error("{item_id}: answered more than once in this session")]
    DuplicateSubmission { item_id: String },
}

impl SubmissionError {
    pub fn item_id(&self) -> &str {
        match self {
            SubmissionError::UnknownItem { item_id }
            | SubmissionError::TypeMismatch { item_id, .. }
            | SubmissionError::SelectionOutOfRange { item_id, .. }
            | SubmissionError::MissingCategorySatisfaction { item_id, .. }
            | SubmissionError::UnknownCategory { item_id, .. }
            | SubmissionError::SatisfactionOutOfRange { item_id, .. }
            | SubmissionError::DuplicateSubmission { item_id } => item_id,
        }
    }
}

/// Errors raised by the grading dispatcher.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GradeError {
    /// The answer was rejected before a score could be produced.
    #[error(transparent)]
    Submission(#[from] SubmissionError),

    /// No grader exists for this item/answer pairing.
    ///
    /// This is a programming error, not a test-taker error: callers must
    /// abort the grading request instead of scoring the item as zero.
    #[error("{item_id}: no grader for {item_kind} item with {answer_kind} answer")]
    UnsupportedItemVariant {
        item_id: String,
        item_kind: ItemKind,
        answer_kind: String,
    },
}

impl GradeError {
    /// Returns `true` if this error must abort the whole grading request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GradeError::UnsupportedItemVariant { .. })
    }
}

/// Aggregation edge cases.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    /// A group has no possible points, so a percentage is meaningless.
    #[error("group '{group}' has zero possible points")]
    DivisionByZeroGroup { group: String },
}
