//! Grading dispatcher and the three graders.
//!
//! Every function here is a pure function of `(item, answer)`: the same
//! pair always yields a bit-identical [`ScoreResult`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{GradeError, SubmissionError};
use crate::model::{CalculationItem, GradableItem, ItemKind, ItemMeta, MultipleChoiceItem, RubricItem};
use crate::normalize::TypedAnswer;
use crate::validate::RUBRIC_WEIGHT_TOTAL;

/// Calculation deltas are rounded to this many decimal places before the
/// tolerance comparison.
pub const DELTA_DECIMALS: i32 = 9;

/// The score for one graded item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub item_id: String,
    pub kind: ItemKind,
    /// Normalized score in `0.0..=max_possible`.
    pub earned: f64,
    pub max_possible: f64,
    #[serde(default)]
    pub meta: ItemMeta,
    /// Why this score was assigned.
    pub detail: ScoreDetail,
}

impl ScoreResult {
    /// Whether the item earned full credit.
    pub fn is_full_credit(&self) -> bool {
        self.earned >= self.max_possible
    }
}

/// Grader-specific explanation of a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "grader", rename_all = "snake_case")]
pub enum ScoreDetail {
    Choice {
        selected_index: usize,
        correct_index: usize,
    },
    Tolerance {
        submitted: f64,
        correct_value: f64,
        tolerance: f64,
        /// `submitted - correct_value`, rounded to [`DELTA_DECIMALS`].
        delta: f64,
        within_tolerance: bool,
    },
    Rubric {
        categories: Vec<CategoryContribution>,
    },
}

/// One rubric category's share of an essay score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryContribution {
    pub name: String,
    /// Weight in percentage points.
    pub weight: u32,
    /// Externally judged satisfaction, `0.0..=1.0`.
    pub satisfaction: f64,
    /// `satisfaction * weight`, in percentage points.
    pub points: f64,
}

/// Grade a normalized answer against its item.
///
/// A pairing with no grader is reported as
/// [`GradeError::UnsupportedItemVariant`], never scored as zero.
pub fn grade(item: &GradableItem, answer: &TypedAnswer) -> Result<ScoreResult, GradeError> {
    match (item, answer) {
        (GradableItem::MultipleChoice(mcq), TypedAnswer::Choice { selected_index }) => {
            Ok(grade_multiple_choice(mcq, *selected_index))
        }
        (GradableItem::Calculation(calc), TypedAnswer::Numeric { value }) => {
            Ok(grade_calculation(calc, *value))
        }
        (GradableItem::Rubric(rubric), TypedAnswer::RubricSatisfaction { satisfaction }) => {
            Ok(grade_rubric(rubric, satisfaction)?)
        }
        (item, answer) => Err(GradeError::UnsupportedItemVariant {
            item_id: item.id().to_string(),
            item_kind: item.kind(),
            answer_kind: answer.kind_name().to_string(),
        }),
    }
}

/// Exact-index grading; no partial credit.
pub fn grade_multiple_choice(item: &MultipleChoiceItem, selected_index: usize) -> ScoreResult {
    let earned = if selected_index == item.correct_index {
        1.0
    } else {
        0.0
    };
    ScoreResult {
        item_id: item.id.clone(),
        kind: ItemKind::MultipleChoice,
        earned,
        max_possible: 1.0,
        meta: item.meta.clone(),
        detail: ScoreDetail::Choice {
            selected_index,
            correct_index: item.correct_index,
        },
    }
}

/// Inclusive tolerance-band grading.
pub fn grade_calculation(item: &CalculationItem, submitted: f64) -> ScoreResult {
    let delta = round_to(submitted - item.correct_value, DELTA_DECIMALS);
    let within_tolerance = delta.abs() <= item.tolerance;
    ScoreResult {
        item_id: item.id.clone(),
        kind: ItemKind::Calculation,
        earned: if within_tolerance { 1.0 } else { 0.0 },
        max_possible: 1.0,
        meta: item.meta.clone(),
        detail: ScoreDetail::Tolerance {
            submitted,
            correct_value: item.correct_value,
            tolerance: item.tolerance,
            delta,
            within_tolerance,
        },
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Weighted rubric grading from per-category satisfaction.
///
/// Every category on the item must have a satisfaction entry; a missing
/// one is a process error and is rejected rather than scored as zero.
pub fn grade_rubric(
    item: &RubricItem,
    satisfaction: &BTreeMap<String, f64>,
) -> Result<ScoreResult, SubmissionError> {
    let mut categories = Vec::with_capacity(item.categories.len());
    for category in &item.categories {
        let fraction = *satisfaction.get(&category.name).ok_or_else(|| {
            SubmissionError::MissingCategorySatisfaction {
                item_id: item.id.clone(),
                category: category.name.clone(),
            }
        })?;
        if !(0.0..=1.0).contains(&fraction) {
            return Err(SubmissionError::SatisfactionOutOfRange {
                item_id: item.id.clone(),
                category: category.name.clone(),
                value: fraction,
            });
        }
        categories.push(CategoryContribution {
            name: category.name.clone(),
            weight: category.weight,
            satisfaction: fraction,
            points: fraction * f64::from(category.weight),
        });
    }

    let total_points: f64 = categories.iter().map(|c| c.points).sum();
    Ok(ScoreResult {
        item_id: item.id.clone(),
        kind: ItemKind::RubricCriterion,
        earned: total_points / f64::from(RUBRIC_WEIGHT_TOTAL),
        max_possible: 1.0,
        meta: item.meta.clone(),
        detail: ScoreDetail::Rubric { categories },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RubricCategory;

    fn mcq(correct_index: usize) -> MultipleChoiceItem {
        MultipleChoiceItem {
            id: "q1".into(),
            options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            correct_index,
            meta: ItemMeta::default(),
        }
    }

    fn calc(correct_value: f64, tolerance: f64) -> CalculationItem {
        CalculationItem {
            id: "c1".into(),
            correct_value,
            tolerance,
            meta: ItemMeta::default(),
        }
    }

    fn essay() -> RubricItem {
        RubricItem {
            id: "wc_001".into(),
            categories: vec![
                RubricCategory {
                    name: "organization".into(),
                    weight: 30,
                    criteria: vec!["Clear opening that addresses the task".into()],
                },
                RubricCategory {
                    name: "development".into(),
                    weight: 40,
                    criteria: vec!["Addresses all aspects of the task".into()],
                },
                RubricCategory {
                    name: "expression".into(),
                    weight: 30,
                    criteria: vec!["Professional business tone".into()],
                },
            ],
            meta: ItemMeta::default(),
        }
    }

    fn satisfaction(values: &[(&str, f64)]) -> BTreeMap<String, f64> {
        values.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn mcq_correct_and_incorrect() {
        let item = mcq(1);
        let hit = grade_multiple_choice(&item, 1);
        assert_eq!(hit.earned, 1.0);
        assert_eq!(hit.max_possible, 1.0);
        assert_eq!(
            hit.detail,
            ScoreDetail::Choice {
                selected_index: 1,
                correct_index: 1
            }
        );

        let miss = grade_multiple_choice(&item, 0);
        assert_eq!(miss.earned, 0.0);
        assert_eq!(miss.max_possible, 1.0);
    }

    #[test]
    fn mcq_every_other_index_scores_zero() {
        for k in 0..4 {
            let item = mcq(k);
            for selected in 0..4 {
                let expected = if selected == k { 1.0 } else { 0.0 };
                assert_eq!(grade_multiple_choice(&item, selected).earned, expected);
            }
        }
    }

    #[test]
    fn tolerance_boundaries_are_inclusive() {
        let item = calc(100.0, 2.5);
        assert_eq!(grade_calculation(&item, 102.5).earned, 1.0);
        assert_eq!(grade_calculation(&item, 97.5).earned, 1.0);
        assert_eq!(grade_calculation(&item, 102.5001).earned, 0.0);
        assert_eq!(grade_calculation(&item, 97.4999).earned, 0.0);
    }

    #[test]
    fn tolerance_boundary_survives_representation_noise() {
        let item = calc(45.6, 1.0);
        assert_eq!(grade_calculation(&item, 46.6).earned, 1.0);
        assert_eq!(grade_calculation(&item, 44.6).earned, 1.0);
        assert_eq!(grade_calculation(&item, 46.600001).earned, 0.0);
    }

    #[test]
    fn tolerance_scenario_reports_delta() {
        let item = calc(45.6, 1.0);
        let pass = grade_calculation(&item, 45.0);
        assert_eq!(pass.earned, 1.0);

        let fail = grade_calculation(&item, 50.0);
        assert_eq!(fail.earned, 0.0);
        let ScoreDetail::Tolerance {
            delta,
            within_tolerance,
            ..
        } = fail.detail
        else {
            panic!("expected tolerance detail");
        };
        assert!((delta - 4.4).abs() < 1e-12, "delta was {delta}");
        assert!(!within_tolerance);
    }

    #[test]
    fn zero_tolerance_requires_exact_match() {
        let item = calc(1250.0, 0.0);
        assert_eq!(grade_calculation(&item, 1250.0).earned, 1.0);
        assert_eq!(grade_calculation(&item, 1250.01).earned, 0.0);
    }

    #[test]
    fn rubric_weighted_score() {
        let result = grade_rubric(
            &essay(),
            &satisfaction(&[("organization", 0.8), ("development", 0.7), ("expression", 0.9)]),
        )
        .unwrap();
        assert!((result.earned - 0.79).abs() < 1e-9, "earned {}", result.earned);
        assert_eq!(result.max_possible, 1.0);

        let ScoreDetail::Rubric { categories } = &result.detail else {
            panic!("expected rubric detail");
        };
        let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["organization", "development", "expression"]);
        assert!((categories[1].points - 28.0).abs() < 1e-9);
    }

    #[test]
    fn rubric_missing_category_rejected() {
        let err = grade_rubric(
            &essay(),
            &satisfaction(&[("organization", 1.0), ("development", 1.0)]),
        )
        .unwrap_err();
        assert_eq!(
            err,
            SubmissionError::MissingCategorySatisfaction {
                item_id: "wc_001".into(),
                category: "expression".into(),
            }
        );
    }

    #[test]
    fn dispatcher_routes_and_rejects_mismatches() {
        let item = GradableItem::MultipleChoice(mcq(1));
        let ok = grade(&item, &TypedAnswer::Choice { selected_index: 1 }).unwrap();
        assert_eq!(ok.kind, ItemKind::MultipleChoice);

        let err = grade(&item, &TypedAnswer::Numeric { value: 1.0 }).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            GradeError::UnsupportedItemVariant {
                item_kind: ItemKind::MultipleChoice,
                ..
            }
        ));
    }

    #[test]
    fn dispatcher_passes_submission_errors_through() {
        let item = GradableItem::Rubric(essay());
        let err = grade(
            &item,
            &TypedAnswer::RubricSatisfaction {
                satisfaction: satisfaction(&[("organization", 0.5)]),
            },
        )
        .unwrap_err();
        assert!(!err.is_fatal());
        assert!(matches!(err, GradeError::Submission(_)));
    }

    #[test]
    fn grading_is_deterministic() {
        let item = GradableItem::Rubric(essay());
        let answer = TypedAnswer::RubricSatisfaction {
            satisfaction: satisfaction(&[
                ("organization", 0.33),
                ("development", 0.71),
                ("expression", 0.18),
            ]),
        };
        let first = grade(&item, &answer).unwrap();
        let second = grade(&item, &answer).unwrap();
        assert_eq!(first.earned.to_bits(), second.earned.to_bits());
        assert_eq!(first, second);
    }
}
