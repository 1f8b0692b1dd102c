//! The `examscore init` command.

use std::path::Path;

use anyhow::{Context, Result};

/// Files written by `init`, relative to the current directory.
const STARTER_FILES: &[(&str, &str)] = &[
    ("examscore.toml", SAMPLE_CONFIG),
    ("content/sample.toml", SAMPLE_CONTENT),
    ("submissions/sample-session.json", SAMPLE_SESSION),
    ("submissions/score-sheets.json", SAMPLE_SCORE_SHEETS),
];

pub fn execute() -> Result<()> {
    for (path, contents) in STARTER_FILES {
        let path = Path::new(path);
        if path.exists() {
            println!("{} already exists, skipping.", path.display());
            continue;
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Created {}", path.display());
    }

    println!("\nNext steps:");
    println!("  1. Edit examscore.toml to pick a judge for written communications");
    println!("  2. Run: examscore validate --content content/sample.toml");
    println!(
        "  3. Run: examscore grade --content content/sample.toml --submissions submissions/sample-session.json"
    );

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# examscore configuration

# Judge used for free-text written communications.
default_judge = "panel"

parallelism = 4
judge_timeout_secs = 30
max_retries = 2
retry_delay_ms = 500
output_dir = "./examscore-results"

# Recorded human score sheets.
[judges.panel]
type = "manual"
scores_path = "submissions/score-sheets.json"

# HTTP reviewer service. EXAMSCORE_REVIEWER_KEY overrides api_key.
[judges.service]
type = "remote"
api_key = "${EXAMSCORE_REVIEWER_KEY}"
base_url = "https://review.example.com"
timeout_secs = 60
"#;

const SAMPLE_CONTENT: &str = r#"[content_set]
id = "sample"
name = "Sample FAR Set"
description = "A small set to get started"
section = "FAR"
default_tolerance = 1.0

[blueprint]
exam = "CPA FAR"
passing_percentage = 75

[[blueprint.areas]]
code = "FAR-I"
name = "Financial Reporting"
weight_range = [30, 40]

[[blueprint.areas]]
code = "FAR-II"
name = "Select Balance Sheet Accounts"
weight_range = [30, 40]

[[blueprint.areas]]
code = "FAR-III"
name = "Select Transactions"
weight_range = [25, 35]

[[questions]]
id = "far-q1"
options = ["A) Income statement", "B) Statement of cash flows", "C) Balance sheet", "D) Statement of equity"]
correct_answer = "C"
blueprint_area = "FAR-I"

[[questions]]
id = "far-q2"
options = ["A) FIFO", "B) LIFO", "C) Weighted average", "D) Specific identification"]
correct_answer = "B"
blueprint_area = "FAR-II"

[[tbs]]
id = "tbs-depreciation"
blueprint_area = "FAR-II"

[[tbs.requirements]]
id = "r1"
type = "calculation"
correct_answer = 18000

[[tbs.requirements]]
id = "r2"
type = "multiple_choice"
options = ["Debit", "Credit"]
correct_answer = "A"

[[written_communications]]
id = "wc-leases"
blueprint_area = "FAR-III"

[[written_communications.categories]]
name = "organization"
weight = 30
criteria = ["Clear introduction", "Logical flow"]

[[written_communications.categories]]
name = "development"
weight = 40
criteria = ["Explains the lease classification"]

[[written_communications.categories]]
name = "expression"
weight = 30
criteria = ["Professional tone", "Correct grammar"]
"#;

const SAMPLE_SESSION: &str = r#"{
  "id": "sample-session",
  "exam": "CPA FAR",
  "expected_items": ["far-q1", "far-q2", "tbs-depreciation.r1", "tbs-depreciation.r2", "wc-leases"],
  "submissions": [
    { "item_id": "far-q1", "answer": "C" },
    { "item_id": "far-q2", "answer": 0 },
    { "item_id": "tbs-depreciation.r1", "answer": "$18,000.50" },
    { "item_id": "tbs-depreciation.r2", "answer": "Debit" },
    { "item_id": "wc-leases", "answer": "To: CFO\nRe: Classification of the equipment lease\n\nThe lease transfers ownership at the end of the term, so it is a finance lease." }
  ]
}
"#;

const SAMPLE_SCORE_SHEETS: &str = r#"{
  "reviewer": "sample panel",
  "scores": {
    "wc-leases": { "organization": 0.8, "development": 0.75, "expression": 1.0 }
  }
}
"#;
