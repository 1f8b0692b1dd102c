//! Response normalization.
//!
//! Client answers arrive as arbitrary JSON. This module maps them to the
//! exact shape each grader expects and rejects anything it cannot map, so
//! the graders themselves never deal with untrusted input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::ContentCatalog;
use crate::error::SubmissionError;
use crate::model::{CalculationItem, GradableItem, MultipleChoiceItem, RubricItem};

/// A test-taker's answer to one item, as received from the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub item_id: String,
    pub answer: Value,
}

/// An answer in the shape its grader expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypedAnswer {
    Choice { selected_index: usize },
    Numeric { value: f64 },
    RubricSatisfaction { satisfaction: BTreeMap<String, f64> },
}

impl TypedAnswer {
    /// Short name for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            TypedAnswer::Choice { .. } => "choice",
            TypedAnswer::Numeric { .. } => "numeric",
            TypedAnswer::RubricSatisfaction { .. } => "rubric_satisfaction",
        }
    }
}

/// Find the item a submission refers to.
pub fn resolve<'a>(
    catalog: &'a ContentCatalog,
    submission: &Submission,
) -> Result<&'a GradableItem, SubmissionError> {
    catalog
        .get(&submission.item_id)
        .ok_or_else(|| SubmissionError::UnknownItem {
            item_id: submission.item_id.clone(),
        })
}

/// Map a raw answer onto the typed answer for `item`.
pub fn normalize(item: &GradableItem, raw: &Value) -> Result<TypedAnswer, SubmissionError> {
    match item {
        GradableItem::MultipleChoice(mcq) => normalize_choice(mcq, raw),
        GradableItem::Calculation(calc) => normalize_numeric(calc, raw),
        GradableItem::Rubric(rubric) => normalize_satisfaction(rubric, raw),
    }
}

fn describe(raw: &Value) -> String {
    match raw {
        Value::Null => "null".into(),
        Value::Bool(_) => "boolean".into(),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => format!("string {s:?}"),
        Value::Array(_) => "array".into(),
        Value::Object(_) => "object".into(),
    }
}

fn normalize_choice(item: &MultipleChoiceItem, raw: &Value) -> Result<TypedAnswer, SubmissionError> {
    let mismatch = || SubmissionError::TypeMismatch {
        item_id: item.id.clone(),
        expected: "option index, letter, or option text".into(),
        found: describe(raw),
    };

    let selected: i64 = match raw {
        Value::Number(n) => n.as_i64().ok_or_else(mismatch)?,
        Value::String(s) => choice_index(&item.options, s).ok_or_else(mismatch)?,
        _ => return Err(mismatch()),
    };

    if selected < 0 || selected as usize >= item.options.len() {
        return Err(SubmissionError::SelectionOutOfRange {
            item_id: item.id.clone(),
            selected,
            option_count: item.options.len(),
        });
    }

    Ok(TypedAnswer::Choice {
        selected_index: selected as usize,
    })
}

/// Interpret a textual choice: option text, an option letter, or an index.
///
/// Option text is tried first, so options that are themselves numerals
/// (`["1", "2", "3", "4"]`) match on their text. Numeral strings are read as
/// an index only when no option carries that text. Letters are the labels a
/// test-taker sees, so a letter that spells one option but labels another is
/// ambiguous and yields `None`, as does text shared by two options.
pub(crate) fn choice_index(options: &[String], text: &str) -> Option<i64> {
    let trimmed = text.trim();
    let wanted = strip_letter_prefix(trimmed).to_lowercase();
    let mut by_text = options
        .iter()
        .enumerate()
        .filter(|(_, opt)| strip_letter_prefix(opt).to_lowercase() == wanted)
        .map(|(i, _)| i as i64);
    let text_match = by_text.next();
    if text_match.is_some() && by_text.next().is_some() {
        return None;
    }

    match (text_match, bare_letter(trimmed)) {
        (Some(index), Some(letter)) if index != letter => None,
        (Some(index), _) => Some(index),
        (None, Some(letter)) => Some(letter),
        (None, None) => trimmed.parse::<i64>().ok(),
    }
}

/// `"B"`, `"b)"`, `"(B)"`, `"B."` → 1.
pub(crate) fn bare_letter(text: &str) -> Option<i64> {
    let inner = text
        .trim_start_matches('(')
        .trim_end_matches([')', '.', ':']);
    let mut chars = inner.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => {
            Some((c.to_ascii_uppercase() as u8 - b'A') as i64)
        }
        _ => None,
    }
}

/// Remove an inline presentation prefix such as `"A) "` or `"(c) "`.
pub fn strip_letter_prefix(option: &str) -> &str {
    let trimmed = option.trim();
    let rest = trimmed.strip_prefix('(').unwrap_or(trimmed);
    let mut chars = rest.char_indices();
    if let (Some((_, letter)), Some((i, sep))) = (chars.next(), chars.next()) {
        if letter.is_ascii_alphabetic() && matches!(sep, ')' | '.' | ':') {
            let after = &rest[i + sep.len_utf8()..];
            if after.is_empty() || after.starts_with(char::is_whitespace) {
                return after.trim_start();
            }
        }
    }
    trimmed
}

fn normalize_numeric(item: &CalculationItem, raw: &Value) -> Result<TypedAnswer, SubmissionError> {
    let mismatch = || SubmissionError::TypeMismatch {
        item_id: item.id.clone(),
        expected: "number".into(),
        found: describe(raw),
    };

    let value = match raw {
        Value::Number(n) => n.as_f64().ok_or_else(mismatch)?,
        Value::String(s) => parse_amount(s).ok_or_else(mismatch)?,
        _ => return Err(mismatch()),
    };

    if !value.is_finite() {
        return Err(mismatch());
    }
    Ok(TypedAnswer::Numeric { value })
}

/// Parse an amount as typed into a spreadsheet-style cell.
///
/// Accepts `"$1,200.50"`, `" 45.6 "`, `"12%"`, and `"(1,200)"` for -1200.
pub fn parse_amount(text: &str) -> Option<f64> {
    let mut s = text.trim();
    let mut negative = false;

    if let Some(inner) = s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        negative = true;
        s = inner.trim();
    }
    if let Some(rest) = s.strip_prefix('-') {
        negative = !negative;
        s = rest.trim_start();
    }

    let cleaned: String = s
        .trim_start_matches('$')
        .trim_end_matches('%')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let value: f64 = cleaned.parse().ok()?;
    Some(if negative { -value } else { value })
}

fn normalize_satisfaction(item: &RubricItem, raw: &Value) -> Result<TypedAnswer, SubmissionError> {
    let Value::Object(map) = raw else {
        return Err(SubmissionError::TypeMismatch {
            item_id: item.id.clone(),
            expected: "object of category satisfaction scores".into(),
            found: describe(raw),
        });
    };

    let mut satisfaction = BTreeMap::new();
    for (category, value) in map {
        if item.category(category).is_none() {
            return Err(SubmissionError::UnknownCategory {
                item_id: item.id.clone(),
                category: category.clone(),
            });
        }
        let fraction = value.as_f64().ok_or_else(|| SubmissionError::TypeMismatch {
            item_id: item.id.clone(),
            expected: format!("number for category '{category}'"),
            found: describe(value),
        })?;
        satisfaction.insert(category.clone(), fraction);
    }

    rubric_satisfaction(item, satisfaction)
}

/// Check a satisfaction map against the rubric it claims to score.
///
/// Used for client maps and for judge verdicts alike: every key must name a
/// rubric category, every category must be present, and every fraction must
/// lie in `[0, 1]`.
pub fn rubric_satisfaction(
    item: &RubricItem,
    satisfaction: BTreeMap<String, f64>,
) -> Result<TypedAnswer, SubmissionError> {
    for (category, &fraction) in &satisfaction {
        if item.category(category).is_none() {
            return Err(SubmissionError::UnknownCategory {
                item_id: item.id.clone(),
                category: category.clone(),
            });
        }
        if !(0.0..=1.0).contains(&fraction) {
            return Err(SubmissionError::SatisfactionOutOfRange {
                item_id: item.id.clone(),
                category: category.clone(),
                value: fraction,
            });
        }
    }

    if let Some(missing) = item
        .categories
        .iter()
        .find(|c| !satisfaction.contains_key(&c.name))
    {
        return Err(SubmissionError::MissingCategorySatisfaction {
            item_id: item.id.clone(),
            category: missing.name.clone(),
        });
    }

    Ok(TypedAnswer::RubricSatisfaction { satisfaction })
}
