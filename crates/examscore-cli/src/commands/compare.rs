//! The `examscore compare` command.

use std::path::PathBuf;

use anyhow::Result;

use examscore_core::report::ExamReport;

fn percent(fraction: Option<f64>) -> String {
    match fraction {
        Some(f) => format!("{:.1}%", f * 100.0),
        None => "n/a".to_string(),
    }
}

pub fn execute(
    baseline_path: PathBuf,
    current_path: PathBuf,
    threshold: f64,
    fail_on_decline: bool,
    format: String,
) -> Result<()> {
    anyhow::ensure!(
        (0.0..=1.0).contains(&threshold),
        "threshold must be between 0.0 and 1.0"
    );

    let baseline = ExamReport::load_json(&baseline_path)?;
    let current = ExamReport::load_json(&current_path)?;

    let report = current.compare(&baseline, threshold);

    match format.as_str() {
        "markdown" | "md" => {
            println!("{}", report.to_markdown());
        }
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            println!(
                "Comparison: {} declines, {} improvements, {} unchanged",
                report.declines.len(),
                report.improvements.len(),
                report.unchanged
            );
            println!(
                "Overall: {} -> {}",
                percent(baseline.percentage),
                percent(current.percentage)
            );

            if !report.declines.is_empty() {
                println!("\nDeclines:");
                for d in &report.declines {
                    println!(
                        "  {} {:.1}% -> {:.1}% ({:+.1}%)",
                        d.area,
                        d.baseline * 100.0,
                        d.current * 100.0,
                        d.delta * 100.0
                    );
                }
            }

            if !report.improvements.is_empty() {
                println!("\nImprovements:");
                for i in &report.improvements {
                    println!(
                        "  {} {:.1}% -> {:.1}% (+{:.1}%)",
                        i.area,
                        i.baseline * 100.0,
                        i.current * 100.0,
                        i.delta * 100.0
                    );
                }
            }

            if report.new_areas > 0 {
                println!("\n{} new area(s)", report.new_areas);
            }
            if report.removed_areas > 0 {
                println!("{} removed area(s)", report.removed_areas);
            }
        }
    }

    if fail_on_decline && report.has_declines() {
        std::process::exit(1);
    }

    Ok(())
}
