//! SARIF (Static Analysis Results Interchange Format) output.
//!
//! Generates SARIF 2.1.0 documents from content defects so CI can annotate
//! malformed fixtures.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use examscore_core::error::ValidationError;

/// Rule id, name, and description for every content-defect kind.
const RULES: &[(&str, &str, &str)] = &[
    (
        "index-out-of-bounds",
        "Index Out Of Bounds",
        "The correct option index does not point at an option",
    ),
    (
        "degenerate-options",
        "Degenerate Options",
        "A multiple-choice item offers fewer than two options",
    ),
    (
        "negative-tolerance",
        "Negative Tolerance",
        "A calculation item has a negative tolerance band",
    ),
    (
        "non-finite-value",
        "Non-Finite Value",
        "A calculation item carries NaN or an infinite value",
    ),
    (
        "weight-sum-mismatch",
        "Weight Sum Mismatch",
        "Rubric category weights do not sum to 100",
    ),
    (
        "invalid-category-weight",
        "Invalid Category Weight",
        "A rubric category weight is zero or above 100",
    ),
    (
        "empty-criteria",
        "Empty Criteria",
        "A rubric category lists no criteria",
    ),
    (
        "duplicate-category",
        "Duplicate Category",
        "A rubric defines the same category twice",
    ),
    (
        "duplicate-item-id",
        "Duplicate Item Id",
        "Two items share an id",
    ),
];

/// Generate a SARIF 2.1.0 JSON document from content defects.
///
/// `content_uri` is the fixture file or directory the defects were found in.
pub fn generate_sarif(defects: &[ValidationError], content_uri: &str) -> serde_json::Value {
    let rules: Vec<serde_json::Value> = RULES
        .iter()
        .map(|(id, name, desc)| {
            json!({
                "id": id,
                "name": name,
                "shortDescription": { "text": desc },
            })
        })
        .collect();

    let results: Vec<serde_json::Value> = defects
        .iter()
        .map(|defect| {
            json!({
                "ruleId": defect.rule_id(),
                "level": "error",
                "message": { "text": defect.to_string() },
                "locations": [{
                    "physicalLocation": {
                        "artifactLocation": { "uri": content_uri }
                    },
                    "logicalLocations": [{
                        "name": defect.item_id(),
                        "kind": "object"
                    }]
                }],
                "properties": { "defect": defect }
            })
        })
        .collect();

    json!({
        "$schema": "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/main/sarif-2.1/schema/sarif-schema-2.1.0.json",
        "version": "2.1.0",
        "runs": [{
            "tool": {
                "driver": {
                    "name": "examscore",
                    "version": env!("CARGO_PKG_VERSION"),
                    "informationUri": "https://github.com/voraprep/examscore",
                    "rules": rules
                }
            },
            "results": results
        }]
    })
}

/// Write a SARIF report to a file.
pub fn write_sarif_report(defects: &[ValidationError], content_uri: &str, path: &Path) -> Result<()> {
    let sarif = generate_sarif(defects, content_uri);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&sarif)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write SARIF report to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sarif_structure_valid() {
        let defects = vec![
            ValidationError::WeightSumMismatch {
                item_id: "wc_001".into(),
                total: 95,
            },
            ValidationError::IndexOutOfBounds {
                item_id: "q1".into(),
                correct_index: 4,
                option_count: 4,
            },
        ];

        let sarif = generate_sarif(&defects, "content/broken.toml");

        assert_eq!(sarif["version"], "2.1.0");
        assert!(sarif["runs"][0]["tool"]["driver"]["name"] == "examscore");

        let results = sarif["runs"][0]["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["ruleId"], "weight-sum-mismatch");
        assert_eq!(results[0]["level"], "error");
        assert_eq!(
            results[0]["locations"][0]["logicalLocations"][0]["name"],
            "wc_001"
        );
        assert_eq!(results[1]["properties"]["defect"]["kind"], "index_out_of_bounds");
    }

    #[test]
    fn every_defect_kind_has_a_rule() {
        let sarif = generate_sarif(&[], "content");
        let rules = sarif["runs"][0]["tool"]["driver"]["rules"]
            .as_array()
            .unwrap();
        let ids: Vec<&str> = rules.iter().filter_map(|r| r["id"].as_str()).collect();

        let samples = [
            ValidationError::DegenerateOptions {
                item_id: "x".into(),
                option_count: 1,
            },
            ValidationError::NegativeTolerance {
                item_id: "x".into(),
                tolerance: -1.0,
            },
            ValidationError::NonFiniteValue {
                item_id: "x".into(),
                field: "tolerance".into(),
            },
            ValidationError::InvalidCategoryWeight {
                item_id: "x".into(),
                category: "c".into(),
                weight: 0,
            },
            ValidationError::EmptyCriteria {
                item_id: "x".into(),
                category: "c".into(),
            },
            ValidationError::DuplicateCategory {
                item_id: "x".into(),
                category: "c".into(),
            },
            ValidationError::DuplicateItemId { item_id: "x".into() },
        ];
        for defect in &samples {
            assert!(ids.contains(&defect.rule_id()), "{}", defect.rule_id());
        }
        assert!(sarif["runs"][0]["results"].as_array().unwrap().is_empty());
    }

    #[test]
    fn sarif_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("defects.sarif");
        write_sarif_report(&[], "content", &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("2.1.0"));
    }
}
