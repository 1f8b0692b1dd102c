//! Load-time validation of gradable items.
//!
//! Grading code assumes every item it sees has passed [`validate`]; the
//! content corpus is hand-authored, so malformed entries are expected and
//! must be caught here rather than in front of a test-taker.

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::model::{CalculationItem, GradableItem, MultipleChoiceItem, RubricItem};

/// Rubric weights are expressed in percentage points.
pub const RUBRIC_WEIGHT_TOTAL: u32 = 100;

/// Check one item against the schema invariants.
pub fn validate(item: &GradableItem) -> Result<(), ValidationError> {
    match item {
        GradableItem::MultipleChoice(mcq) => validate_multiple_choice(mcq),
        GradableItem::Calculation(calc) => validate_calculation(calc),
        GradableItem::Rubric(rubric) => validate_rubric(rubric),
    }
}

fn validate_multiple_choice(item: &MultipleChoiceItem) -> Result<(), ValidationError> {
    if item.options.len() < 2 {
        return Err(ValidationError::DegenerateOptions {
            item_id: item.id.clone(),
            option_count: item.options.len(),
        });
    }
    if item.correct_index >= item.options.len() {
        return Err(ValidationError::IndexOutOfBounds {
            item_id: item.id.clone(),
            correct_index: item.correct_index,
            option_count: item.options.len(),
        });
    }
    Ok(())
}

fn validate_calculation(item: &CalculationItem) -> Result<(), ValidationError> {
    for (field, value) in [
        ("correct_value", item.correct_value),
        ("tolerance", item.tolerance),
    ] {
        if !value.is_finite() {
            return Err(ValidationError::NonFiniteValue {
                item_id: item.id.clone(),
                field: field.to_string(),
            });
        }
    }
    if item.tolerance < 0.0 {
        return Err(ValidationError::NegativeTolerance {
            item_id: item.id.clone(),
            tolerance: item.tolerance,
        });
    }
    Ok(())
}

fn validate_rubric(item: &RubricItem) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for category in &item.categories {
        if !seen.insert(category.name.as_str()) {
            return Err(ValidationError::DuplicateCategory {
                item_id: item.id.clone(),
                category: category.name.clone(),
            });
        }
        if category.weight == 0 || category.weight > RUBRIC_WEIGHT_TOTAL {
            return Err(ValidationError::InvalidCategoryWeight {
                item_id: item.id.clone(),
                category: category.name.clone(),
                weight: category.weight,
            });
        }
        if category.criteria.is_empty() {
            return Err(ValidationError::EmptyCriteria {
                item_id: item.id.clone(),
                category: category.name.clone(),
            });
        }
    }

    let total = item.total_weight();
    if total != RUBRIC_WEIGHT_TOTAL {
        return Err(ValidationError::WeightSumMismatch {
            item_id: item.id.clone(),
            total,
        });
    }
    Ok(())
}

/// Validate a whole set of items, including cross-item checks.
///
/// Returns every defect found; an empty vector means the set is clean.
pub fn validate_set(items: &[GradableItem]) -> Vec<ValidationError> {
    let mut defects = Vec::new();
    let mut seen_ids = HashSet::new();

    for item in items {
        if !seen_ids.insert(item.id()) {
            defects.push(ValidationError::DuplicateItemId {
                item_id: item.id().to_string(),
            });
            continue;
        }
        if let Err(e) = validate(item) {
            defects.push(e);
        }
    }

    defects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemMeta, RubricCategory};

    fn mcq(options: usize, correct_index: usize) -> GradableItem {
        GradableItem::MultipleChoice(MultipleChoiceItem {
            id: "q1".into(),
            options: (0..options).map(|i| format!("Option {i}")).collect(),
            correct_index,
            meta: ItemMeta::default(),
        })
    }

    fn calc(correct_value: f64, tolerance: f64) -> GradableItem {
        GradableItem::Calculation(CalculationItem {
            id: "c1".into(),
            correct_value,
            tolerance,
            meta: ItemMeta::default(),
        })
    }

    fn rubric(weights: &[(&str, u32, usize)]) -> GradableItem {
        GradableItem::Rubric(RubricItem {
            id: "wc1".into(),
            categories: weights
                .iter()
                .map(|(name, weight, criteria)| RubricCategory {
                    name: name.to_string(),
                    weight: *weight,
                    criteria: (0..*criteria).map(|i| format!("criterion {i}")).collect(),
                })
                .collect(),
            meta: ItemMeta::default(),
        })
    }

    #[test]
    fn valid_items_pass() {
        assert!(validate(&mcq(4, 1)).is_ok());
        assert!(validate(&calc(45.6, 1.0)).is_ok());
        assert!(validate(&calc(10.0, 0.0)).is_ok());
        assert!(validate(&rubric(&[
            ("organization", 30, 4),
            ("development", 40, 4),
            ("expression", 30, 4),
        ]))
        .is_ok());
    }

    #[test]
    fn mcq_index_out_of_bounds() {
        let err = validate(&mcq(4, 4)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::IndexOutOfBounds {
                item_id: "q1".into(),
                correct_index: 4,
                option_count: 4,
            }
        );
    }

    #[test]
    fn mcq_needs_two_options() {
        let err = validate(&mcq(1, 0)).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::DegenerateOptions { option_count: 1, .. }
        ));
    }

    #[test]
    fn negative_tolerance_rejected() {
        let err = validate(&calc(100.0, -0.5)).unwrap_err();
        assert!(matches!(err, ValidationError::NegativeTolerance { .. }));
    }

    #[test]
    fn non_finite_values_rejected() {
        let err = validate(&calc(f64::NAN, 1.0)).unwrap_err();
        assert!(matches!(err, ValidationError::NonFiniteValue { ref field, .. } if field == "correct_value"));
        let err = validate(&calc(1.0, f64::INFINITY)).unwrap_err();
        assert!(matches!(err, ValidationError::NonFiniteValue { ref field, .. } if field == "tolerance"));
    }

    #[test]
    fn rubric_weight_sum_mismatch() {
        let err = validate(&rubric(&[("organization", 25, 1), ("development", 40, 1)])).unwrap_err();
        assert_eq!(
            err,
            ValidationError::WeightSumMismatch {
                item_id: "wc1".into(),
                total: 65,
            }
        );
    }

    #[test]
    fn rubric_empty_criteria() {
        let err = validate(&rubric(&[("organization", 50, 2), ("development", 50, 0)])).unwrap_err();
        assert!(matches!(err, ValidationError::EmptyCriteria { ref category, .. } if category == "development"));
    }

    #[test]
    fn rubric_zero_weight_and_duplicates() {
        let err = validate(&rubric(&[("organization", 0, 1), ("development", 100, 1)])).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidCategoryWeight { weight: 0, .. }));

        let err = validate(&rubric(&[("organization", 50, 1), ("organization", 50, 1)])).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateCategory { .. }));
    }

    #[test]
    fn validate_set_reports_duplicates_and_defects() {
        let items = vec![mcq(4, 1), mcq(4, 2), calc(1.0, -1.0)];
        let defects = validate_set(&items);
        assert_eq!(defects.len(), 2);
        assert!(defects
            .iter()
            .any(|d| matches!(d, ValidationError::DuplicateItemId { .. })));
        assert!(defects
            .iter()
            .any(|d| matches!(d, ValidationError::NegativeTolerance { .. })));
    }
}
