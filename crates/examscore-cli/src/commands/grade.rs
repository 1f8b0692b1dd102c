//! The `examscore grade` command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use examscore_core::catalog::ContentCatalog;
use examscore_core::engine::{ExamSession, GradingEngine, ProgressReporter};
use examscore_core::error::SubmissionError;
use examscore_core::grade::{ScoreDetail, ScoreResult};
use examscore_core::parser;
use examscore_core::report::ExamReport;
use examscore_core::traits::RubricJudge;
use examscore_judges::config::load_config_from;
use examscore_judges::create_judge;
use examscore_report::html::write_html_report;

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_item_graded(&self, result: &ScoreResult) {
        let note = match &result.detail {
            ScoreDetail::Choice {
                selected_index,
                correct_index,
            } if selected_index != correct_index => {
                format!(" selected {selected_index}, correct {correct_index}")
            }
            ScoreDetail::Tolerance {
                delta,
                within_tolerance: false,
                ..
            } => format!(" off by {delta}"),
            _ => String::new(),
        };
        eprintln!(
            "  Graded: {} {:.2}/{:.2}{note}",
            result.item_id, result.earned, result.max_possible
        );
    }

    fn on_item_rejected(&self, item_id: &str, error: &SubmissionError) {
        eprintln!("  REJECTED: {item_id}: {error}");
    }

    fn on_item_pending(&self, item_id: &str, reason: &str) {
        eprintln!("  Pending: {item_id} ({reason})");
    }

    fn on_session_complete(&self, graded: usize, pending: usize, rejected: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {graded} graded, {pending} pending, {rejected} rejected ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

pub async fn execute(
    content_path: PathBuf,
    submissions_path: PathBuf,
    output: Option<PathBuf>,
    format: String,
    judge_name: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    let loaded = parser::load_content(&content_path)?;
    if !loaded.failures.is_empty() {
        eprintln!(
            "Warning: {} content file(s) could not be loaded. Run `examscore validate` for details.",
            loaded.failures.len()
        );
    }
    let (catalog, defects) = ContentCatalog::load(&loaded.sets);
    anyhow::ensure!(
        !catalog.is_empty(),
        "no gradable items in {}",
        content_path.display()
    );
    if !defects.is_empty() {
        eprintln!(
            "Warning: {} item(s) left out because of content defects. Run `examscore validate` for details.",
            defects.len()
        );
    }

    let session = ExamSession::load_json(&submissions_path)?;

    let judge: Option<Arc<dyn RubricJudge>> = match judge_name.or(config.default_judge.clone()) {
        Some(name) => {
            let judge_config = config.judges.get(&name).with_context(|| {
                format!(
                    "judge '{name}' not found in config. Available: {:?}",
                    config.judges.keys().collect::<Vec<_>>()
                )
            })?;
            Some(Arc::from(create_judge(&name, judge_config)?))
        }
        None => None,
    };

    eprintln!(
        "examscore v{}: grading {} submissions against {} items{}",
        env!("CARGO_PKG_VERSION"),
        session.submissions.len(),
        catalog.len(),
        judge
            .as_ref()
            .map(|j| format!(" (judge: {})", j.name()))
            .unwrap_or_default()
    );
    eprintln!();

    let engine = GradingEngine::new(Arc::new(catalog), judge, config.engine_config());
    let report = engine.grade_session(&session, &ConsoleReporter).await?;

    print_summary(&report);

    let output = output.unwrap_or_else(|| config.output_dir.clone());
    std::fs::create_dir_all(&output)
        .with_context(|| format!("failed to create output directory {}", output.display()))?;
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");

    let formats: Vec<&str> = if format == "all" {
        vec!["json", "html"]
    } else {
        format.split(',').map(str::trim).collect()
    };

    for fmt in &formats {
        match *fmt {
            "json" => {
                let path = output.join(format!("report-{timestamp}.json"));
                report.save_json(&path)?;
                eprintln!("Results saved to: {}", path.display());
            }
            "html" => {
                let path = output.join(format!("report-{timestamp}.html"));
                write_html_report(&report, &path)?;
                eprintln!("HTML report: {}", path.display());
            }
            _ => {
                eprintln!("Unknown format: {fmt}");
            }
        }
    }

    Ok(())
}

fn percent(fraction: Option<f64>) -> String {
    match fraction {
        Some(f) => format!("{:.1}%", f * 100.0),
        None => "n/a".to_string(),
    }
}

fn print_summary(report: &ExamReport) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["Section", "Area", "Score", "Points", "Exam Share", "Weak"]);

    for section in &report.sections {
        for area in &section.areas {
            let share = match (area.share_of_exam, area.published_range) {
                (Some(share), Some([min, max])) => format!("{share:.1}% ({min:.0}-{max:.0}%)"),
                (Some(share), None) => format!("{share:.1}%"),
                _ => "n/a".to_string(),
            };
            table.add_row(vec![
                Cell::new(&section.section),
                Cell::new(if area.name.is_empty() {
                    area.code.clone()
                } else {
                    format!("{} {}", area.code, area.name)
                }),
                Cell::new(percent(area.percentage)),
                Cell::new(format!("{:.2}/{:.2}", area.earned_points, area.possible_points)),
                Cell::new(share),
                Cell::new(if area.weak { "yes" } else { "" }),
            ]);
        }
    }

    eprintln!("\n{table}");

    let verdict = match report.passed {
        Some(true) => "PASS",
        Some(false) => "FAIL",
        None => "not scored",
    };
    eprintln!(
        "Overall: {} ({:.2}/{:.2} points), passing {:.0}%: {verdict}",
        percent(report.percentage),
        report.earned_points,
        report.possible_points,
        report.passing_percentage
    );
    if let Some(band) = report.band {
        eprintln!("Band: {}", band.label());
    }
    if !report.pending.is_empty() {
        eprintln!("{} item(s) pending and not counted", report.pending.len());
    }
}
