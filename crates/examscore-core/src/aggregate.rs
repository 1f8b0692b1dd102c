//! Score rollup by grouping key.
//!
//! Aggregation is exactly order-independent: results are summed in a
//! canonical order (item id, then earned) and groups in key order, so
//! essay judgments completing out of order cannot change a report.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AggregationError;
use crate::grade::ScoreResult;

/// Group key used when an item carries no value for the grouping level.
pub const UNASSIGNED: &str = "unassigned";

/// Rolled-up score for a group of items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateScore {
    pub earned_points: f64,
    pub possible_points: f64,
    /// `earned_points / possible_points`, or `None` when nothing was possible.
    pub percentage: Option<f64>,
    /// Number of graded items in this group.
    pub item_count: usize,
    /// Sub-aggregates keyed by group; empty at leaves.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub breakdown_by_group: BTreeMap<String, AggregateScore>,
    /// Item results, present only at leaves.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<ScoreResult>,
}

impl AggregateScore {
    /// An empty group.
    pub fn empty() -> Self {
        Self {
            earned_points: 0.0,
            possible_points: 0.0,
            percentage: None,
            item_count: 0,
            breakdown_by_group: BTreeMap::new(),
            results: Vec::new(),
        }
    }

    /// The percentage, or an error naming the group if it has no possible points.
    pub fn percentage_checked(&self, group: &str) -> Result<f64, AggregationError> {
        self.percentage
            .ok_or_else(|| AggregationError::DivisionByZeroGroup {
                group: group.to_string(),
            })
    }

    /// Build a leaf from a set of results.
    fn leaf(mut results: Vec<ScoreResult>) -> Self {
        results.sort_by(canonical_order);
        let (earned_points, possible_points) = totals(results.iter());
        Self {
            earned_points,
            possible_points,
            percentage: percentage(earned_points, possible_points),
            item_count: results.len(),
            breakdown_by_group: BTreeMap::new(),
            results,
        }
    }

    /// Build an inner node from its children.
    ///
    /// Totals are summed over every result beneath the node in canonical
    /// order, never over child totals, so a node's figures do not depend on
    /// how the results below it are grouped.
    fn node(children: BTreeMap<String, AggregateScore>) -> Self {
        let mut results: Vec<&ScoreResult> = children
            .values()
            .flat_map(|child| child.all_results())
            .collect();
        results.sort_by(|a, b| canonical_order(a, b));
        let (earned_points, possible_points) = totals(results.into_iter());
        Self {
            earned_points,
            possible_points,
            percentage: percentage(earned_points, possible_points),
            item_count: children.values().map(|c| c.item_count).sum(),
            breakdown_by_group: children,
            results: Vec::new(),
        }
    }

    /// All leaf results beneath this node, in canonical order per leaf.
    pub fn all_results(&self) -> Vec<&ScoreResult> {
        if self.breakdown_by_group.is_empty() {
            return self.results.iter().collect();
        }
        self.breakdown_by_group
            .values()
            .flat_map(|child| child.all_results())
            .collect()
    }
}

/// Earned and possible points, summed in iteration order.
fn totals<'a>(results: impl Iterator<Item = &'a ScoreResult>) -> (f64, f64) {
    results.fold((0.0, 0.0), |(earned, possible), r| {
        (earned + r.earned, possible + r.max_possible)
    })
}

fn percentage(earned: f64, possible: f64) -> Option<f64> {
    if possible > 0.0 {
        Some(earned / possible)
    } else {
        None
    }
}

fn canonical_order(a: &ScoreResult, b: &ScoreResult) -> Ordering {
    a.item_id
        .cmp(&b.item_id)
        .then_with(|| a.earned.total_cmp(&b.earned))
        .then_with(|| a.max_possible.total_cmp(&b.max_possible))
}

/// Hierarchy levels for [`aggregate_tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    Section,
    BlueprintArea,
    Task,
    Kind,
}

impl GroupBy {
    /// The group key of a result at this level.
    pub fn key(&self, result: &ScoreResult) -> String {
        let value = match self {
            GroupBy::Section => result.meta.section.clone(),
            GroupBy::BlueprintArea => result.meta.blueprint_area.clone(),
            GroupBy::Task => result.meta.task_id.clone(),
            GroupBy::Kind => Some(result.kind.to_string()),
        };
        value.unwrap_or_else(|| UNASSIGNED.to_string())
    }
}

/// Group results by a caller-supplied key and roll each group up.
///
/// The returned aggregate covers all results; its `breakdown_by_group`
/// holds one leaf per key.
pub fn aggregate<F>(results: &[ScoreResult], key_fn: F) -> AggregateScore
where
    F: Fn(&ScoreResult) -> String,
{
    let mut groups: BTreeMap<String, Vec<ScoreResult>> = BTreeMap::new();
    for result in results {
        groups.entry(key_fn(result)).or_default().push(result.clone());
    }
    AggregateScore::node(
        groups
            .into_iter()
            .map(|(key, group)| (key, AggregateScore::leaf(group)))
            .collect(),
    )
}

/// Roll results up through several levels (e.g. section → blueprint area).
///
/// With no levels the result is a single leaf holding every result.
pub fn aggregate_tree(results: &[ScoreResult], levels: &[GroupBy]) -> AggregateScore {
    let Some((level, rest)) = levels.split_first() else {
        return AggregateScore::leaf(results.to_vec());
    };

    let mut groups: BTreeMap<String, Vec<ScoreResult>> = BTreeMap::new();
    for result in results {
        groups.entry(level.key(result)).or_default().push(result.clone());
    }
    AggregateScore::node(
        groups
            .into_iter()
            .map(|(key, group)| (key, aggregate_tree(&group, rest)))
            .collect(),
    )
}
