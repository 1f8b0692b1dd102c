//! Read-only index of validated items.
//!
//! A catalog is built once per content load and shared between grading
//! tasks without synchronization; nothing in it is ever mutated.

use std::collections::{HashMap, HashSet};

use crate::error::ValidationError;
use crate::model::{ContentSet, ExamBlueprint, GradableItem};
use crate::validate::validate_set;

/// Validated items keyed by id, plus the blueprint they were published with.
#[derive(Debug, Clone, Default)]
pub struct ContentCatalog {
    items: HashMap<String, GradableItem>,
    order: Vec<String>,
    blueprint: Option<ExamBlueprint>,
    name: String,
}

impl ContentCatalog {
    /// Build a catalog from one or more content sets.
    ///
    /// Items with defects are left out and returned alongside the catalog.
    pub fn load(sets: &[ContentSet]) -> (Self, Vec<ValidationError>) {
        let all_items: Vec<GradableItem> = sets
            .iter()
            .flat_map(|set| set.items.iter().cloned())
            .collect();
        let defects = validate_set(&all_items);

        let mut catalog = ContentCatalog {
            name: sets
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(" + "),
            blueprint: sets.iter().find_map(|s| s.blueprint.clone()),
            ..Default::default()
        };

        let defective: HashSet<&str> = defects.iter().map(|d| d.item_id()).collect();
        for item in all_items {
            let id = item.id().to_string();
            if catalog.items.contains_key(&id) || defective.contains(id.as_str()) {
                continue;
            }
            catalog.order.push(id.clone());
            catalog.items.insert(id, item);
        }

        for defect in &defects {
            tracing::warn!(rule = defect.rule_id(), "content defect: {defect}");
        }
        tracing::debug!(
            items = catalog.order.len(),
            defects = defects.len(),
            "content catalog loaded"
        );

        (catalog, defects)
    }

    pub fn get(&self, item_id: &str) -> Option<&GradableItem> {
        self.items.get(item_id)
    }

    /// Items in fixture order.
    pub fn items(&self) -> impl Iterator<Item = &GradableItem> {
        self.order.iter().filter_map(|id| self.items.get(id))
    }

    pub fn item_ids(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn blueprint(&self) -> Option<&ExamBlueprint> {
        self.blueprint.as_ref()
    }

    /// Display name derived from the loaded content sets.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CalculationItem, ItemMeta, MultipleChoiceItem};

    fn set(items: Vec<GradableItem>) -> ContentSet {
        ContentSet {
            id: "far".into(),
            name: "FAR sample".into(),
            description: String::new(),
            items,
            blueprint: None,
        }
    }

    fn mcq(id: &str, correct_index: usize) -> GradableItem {
        GradableItem::MultipleChoice(MultipleChoiceItem {
            id: id.into(),
            options: vec!["A".into(), "B".into(), "C".into()],
            correct_index,
            meta: ItemMeta::default(),
        })
    }

    #[test]
    fn load_excludes_defective_items() {
        let (catalog, defects) = ContentCatalog::load(&[set(vec![
            mcq("q1", 0),
            mcq("q2", 7),
            GradableItem::Calculation(CalculationItem {
                id: "c1".into(),
                correct_value: 10.0,
                tolerance: 0.5,
                meta: ItemMeta::default(),
            }),
        ])]);

        assert_eq!(defects.len(), 1);
        assert_eq!(defects[0].item_id(), "q2");
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("q1").is_some());
        assert!(catalog.get("q2").is_none());
        assert_eq!(catalog.item_ids(), &["q1".to_string(), "c1".to_string()]);
    }

    #[test]
    fn duplicate_ids_exclude_every_copy() {
        let (catalog, defects) = ContentCatalog::load(&[set(vec![mcq("q1", 0), mcq("q1", 2)])]);
        assert_eq!(defects.len(), 1);
        assert!(catalog.get("q1").is_none());
    }

    #[test]
    fn catalog_name_joins_sets() {
        let mut second = set(vec![]);
        second.name = "AUD sample".into();
        let (catalog, _) = ContentCatalog::load(&[set(vec![]), second]);
        assert_eq!(catalog.name(), "FAR sample + AUD sample");
        assert!(catalog.is_empty());
    }
}
