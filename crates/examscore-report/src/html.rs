//! HTML report generator.
//!
//! One self-contained page per graded session: overall verdict, blueprint
//! area breakdown with a bar chart, and every item's score detail.

use anyhow::{Context, Result};
use std::path::Path;

use examscore_core::grade::ScoreDetail;
use examscore_core::report::{AreaReport, ExamReport};

/// Escape a string for safe HTML insertion.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn percent(value: Option<f64>) -> String {
    value
        .map(|p| format!("{:.1}%", p * 100.0))
        .unwrap_or_else(|| "n/a".to_string())
}

/// Generate an HTML report from an exam report.
pub fn generate_html(report: &ExamReport) -> String {
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!(
        "<title>examscore report: {}</title>\n",
        html_escape(&report.exam.name)
    ));
    html.push_str("<style>\n");
    html.push_str(CSS);
    html.push_str("</style>\n");
    html.push_str("</head>\n<body>\n");

    // Header
    html.push_str("<header>\n");
    html.push_str("<h1>examscore report</h1>\n");
    html.push_str(&format!(
        "<p class=\"meta\">Exam: <strong>{}</strong> | session {} | {} of {} items graded | {}</p>\n",
        html_escape(&report.exam.name),
        html_escape(&report.session_id),
        report.exam.graded_items,
        report.exam.expected_items,
        report.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    html.push_str("</header>\n");

    // Overall score
    let verdict_class = match report.passed {
        Some(true) => "pass",
        Some(false) => "fail",
        None => "",
    };
    html.push_str("<section class=\"dashboard\">\n");
    html.push_str("<h2>Summary</h2>\n");
    html.push_str(&format!(
        "<p class=\"score {verdict_class}\">{} <span>({:.2} / {:.2} points, passing {:.0}%)</span></p>\n",
        percent(report.percentage),
        report.earned_points,
        report.possible_points,
        report.passing_percentage
    ));
    if let Some(band) = report.band {
        html.push_str(&format!("<p class=\"band\">{}</p>\n", band.label()));
    }

    let areas: Vec<(&str, &AreaReport)> = report
        .sections
        .iter()
        .flat_map(|s| s.areas.iter().map(move |a| (s.section.as_str(), a)))
        .collect();

    html.push_str("<table class=\"summary\">\n");
    html.push_str("<thead><tr><th>Section</th><th>Area</th><th>Score</th><th>Points</th><th>Share of exam</th><th>Published</th></tr></thead>\n");
    html.push_str("<tbody>\n");
    for (section, area) in &areas {
        let row_class = if area.weak { "weak" } else { "" };
        let published = match area.published_range {
            Some([min, max]) => format!("{min:.0}–{max:.0}%"),
            None => "-".to_string(),
        };
        let share = area
            .share_of_exam
            .map(|s| format!("{s:.1}%"))
            .unwrap_or_else(|| "-".to_string());
        let share_class = match area.within_published_range {
            Some(false) => " class=\"off-blueprint\"",
            _ => "",
        };
        html.push_str(&format!(
            "<tr class=\"{}\"><td>{}</td><td>{} {}</td><td>{}</td><td>{:.2} / {:.2}</td><td{}>{}</td><td>{}</td></tr>\n",
            row_class,
            html_escape(section),
            html_escape(&area.code),
            html_escape(&area.name),
            percent(area.percentage),
            area.earned_points,
            area.possible_points,
            share_class,
            share,
            published,
        ));
    }
    html.push_str("</tbody></table>\n");

    // SVG bar chart per blueprint area
    if !areas.is_empty() {
        html.push_str(&generate_bar_chart(&areas, report.passing_percentage));
    }

    html.push_str("</section>\n");

    // Per-item results
    html.push_str("<section class=\"results\">\n");
    html.push_str("<h2>Items</h2>\n");
    html.push_str("<label><input type=\"checkbox\" id=\"missed-only\"> Only items without full credit</label>\n");
    html.push_str("<table class=\"items\">\n");
    html.push_str("<thead><tr><th>Item</th><th>Area</th><th>Kind</th><th>Score</th><th>Detail</th></tr></thead>\n");
    html.push_str("<tbody>\n");

    for (_, area) in &areas {
        for item in &area.items {
            let class = if item.earned >= item.max_possible {
                "full"
            } else if item.earned > 0.0 {
                "partial"
            } else {
                "missed"
            };
            html.push_str(&format!(
                "<tr class=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{:.2} / {:.2}</td><td>{}</td></tr>\n",
                class,
                html_escape(&item.item_id),
                html_escape(&area.code),
                item.kind,
                item.earned,
                item.max_possible,
                html_escape(&describe_detail(&item.detail)),
            ));
        }
    }

    html.push_str("</tbody></table>\n");
    html.push_str("</section>\n");

    // Not counted
    if !report.pending.is_empty() || !report.rejected.is_empty() {
        html.push_str("<section class=\"not-counted\">\n");
        html.push_str("<h2>Not counted</h2>\n<ul>\n");
        for p in &report.pending {
            html.push_str(&format!(
                "<li><strong>{}</strong> pending: {}</li>\n",
                html_escape(&p.item_id),
                html_escape(&p.reason)
            ));
        }
        for r in &report.rejected {
            html.push_str(&format!(
                "<li><strong>{}</strong> rejected: {}</li>\n",
                html_escape(&r.item_id),
                html_escape(&r.error.to_string())
            ));
        }
        html.push_str("</ul>\n</section>\n");
    }

    html.push_str("<section class=\"raw-data\">\n");
    html.push_str("<details>\n<summary>Report JSON</summary>\n");
    html.push_str("<pre><code>");
    html.push_str(
        &serde_json::to_string_pretty(report)
            .unwrap_or_default()
            .replace('<', "&lt;")
            .replace('>', "&gt;"),
    );
    html.push_str("</code></pre>\n");
    html.push_str("</details>\n</section>\n");

    html.push_str("<script>\n");
    html.push_str(JS);
    html.push_str("</script>\n");

    html.push_str("</body>\n</html>");
    html
}

/// Write an HTML report to a file.
pub fn write_html_report(report: &ExamReport, path: &Path) -> Result<()> {
    let html = generate_html(report);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html)
        .with_context(|| format!("failed to write HTML report to {}", path.display()))?;
    Ok(())
}

fn describe_detail(detail: &ScoreDetail) -> String {
    match detail {
        ScoreDetail::Choice {
            selected_index,
            correct_index,
        } => format!(
            "selected {}, correct {}",
            option_letter(*selected_index),
            option_letter(*correct_index)
        ),
        ScoreDetail::Tolerance {
            submitted,
            correct_value,
            tolerance,
            delta,
            ..
        } => format!("{submitted} vs {correct_value} ±{tolerance} (off by {delta})"),
        ScoreDetail::Rubric { categories } => categories
            .iter()
            .map(|c| format!("{} {:.0}/{}", c.name, c.points, c.weight))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn option_letter(index: usize) -> String {
    u8::try_from(index)
        .ok()
        .filter(|i| *i < 26)
        .map(|i| char::from(b'A' + i).to_string())
        .unwrap_or_else(|| index.to_string())
}

/// One horizontal bar per area, scaled 0-100%, with a dashed marker at the
/// passing percentage.
fn generate_bar_chart(areas: &[(&str, &AreaReport)], passing_percentage: f64) -> String {
    const ROW: usize = 26;
    const GAP: usize = 8;
    const LABEL: usize = 180;
    const TRACK: f64 = 420.0;

    let height = areas.len() * (ROW + GAP) + GAP + 16;
    let pass_x = LABEL as f64 + TRACK * (passing_percentage / 100.0).clamp(0.0, 1.0);

    let mut svg = format!(
        "<svg class=\"areas\" viewBox=\"0 0 {} {height}\" width=\"{}\" height=\"{height}\" xmlns=\"http://www.w3.org/2000/svg\">\n",
        LABEL + TRACK as usize + 70,
        LABEL + TRACK as usize + 70,
    );

    for (row, (section, area)) in areas.iter().enumerate() {
        let top = GAP + row * (ROW + GAP);
        let middle = top + ROW / 2;
        let fraction = area.percentage.unwrap_or(0.0);
        let fill = if area.weak {
            "var(--miss)"
        } else if fraction * 100.0 < passing_percentage {
            "var(--near)"
        } else {
            "var(--hit)"
        };

        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{middle}\" text-anchor=\"end\" dominant-baseline=\"middle\">{}/{}</text>\n",
            LABEL - 8,
            html_escape(section),
            html_escape(&area.code)
        ));
        svg.push_str(&format!(
            "  <rect class=\"track\" x=\"{LABEL}\" y=\"{top}\" width=\"{TRACK}\" height=\"{ROW}\"/>\n"
        ));
        svg.push_str(&format!(
            "  <rect x=\"{LABEL}\" y=\"{top}\" width=\"{:.1}\" height=\"{ROW}\" style=\"fill:{fill}\"/>\n",
            TRACK * fraction.clamp(0.0, 1.0)
        ));
        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{middle}\" dominant-baseline=\"middle\">{}</text>\n",
            LABEL + TRACK as usize + 6,
            percent(area.percentage)
        ));
    }

    svg.push_str(&format!(
        "  <line class=\"passing\" x1=\"{pass_x:.1}\" y1=\"0\" x2=\"{pass_x:.1}\" y2=\"{}\"/>\n",
        height - 14
    ));
    svg.push_str(&format!(
        "  <text x=\"{pass_x:.1}\" y=\"{}\" text-anchor=\"middle\">pass {passing_percentage:.0}%</text>\n",
        height - 2
    ));
    svg.push_str("</svg>\n");
    svg
}

const CSS: &str = r#"
:root { --paper: #fbfaf7; --ink: #222; --muted: #6a6a6a; --rule: #d8d4cc; --hit: #3f8f5a; --near: #c8962e; --miss: #b6443a; }
@media (prefers-color-scheme: dark) {
  :root { --paper: #1c1b19; --ink: #ece9e2; --muted: #a29d93; --rule: #3b3935; }
}
body { font-family: Georgia, 'Times New Roman', serif; max-width: 960px; margin: 0 auto; padding: 1.5rem 2rem; background: var(--paper); color: var(--ink); }
header { border-bottom: 2px solid var(--ink); }
.meta { color: var(--muted); font-size: 0.9rem; }
.score { font-size: 2.2rem; margin: 0.5rem 0; }
.score span { font-size: 0.95rem; color: var(--muted); }
.score.pass { color: var(--hit); }
.score.fail { color: var(--miss); }
.band { font-variant: small-caps; letter-spacing: 0.05em; }
table { border-collapse: collapse; width: 100%; margin: 1rem 0; font-size: 0.92rem; }
th, td { border-bottom: 1px solid var(--rule); padding: 0.4rem 0.6rem; text-align: left; }
th { font-weight: normal; color: var(--muted); text-transform: uppercase; font-size: 0.75rem; }
tr.weak td:first-child, tr.missed td:first-child { border-left: 4px solid var(--miss); }
tr.partial td:first-child { border-left: 4px solid var(--near); }
tr.full td:first-child { border-left: 4px solid var(--hit); }
.off-blueprint { color: var(--miss); font-weight: bold; }
.areas text { font: 12px sans-serif; fill: currentColor; }
.areas .track { fill: var(--rule); }
.areas .passing { stroke: var(--ink); stroke-dasharray: 4 3; }
body.missed-only tr.full { display: none; }
pre { overflow-x: auto; padding: 1rem; border: 1px solid var(--rule); }
"#;

const JS: &str = r#"
document.getElementById('missed-only').addEventListener('change', function (e) {
  document.body.classList.toggle('missed-only', e.target.checked);
});
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use examscore_core::error::SubmissionError;
    use examscore_core::model::ItemKind;
    use examscore_core::report::*;

    fn make_test_report() -> ExamReport {
        ExamReport {
            id: uuid::Uuid::nil(),
            created_at: chrono::Utc::now(),
            session_id: "session-1".into(),
            exam: ExamSummary {
                name: "CPA FAR <sample>".into(),
                expected_items: 3,
                graded_items: 1,
            },
            earned_points: 0.79,
            possible_points: 1.0,
            percentage: Some(0.79),
            passing_percentage: 75.0,
            passed: Some(true),
            band: Some(ScoreBand::Passing),
            sections: vec![SectionReport {
                section: "FAR".into(),
                earned_points: 0.79,
                possible_points: 1.0,
                percentage: Some(0.79),
                areas: vec![AreaReport {
                    code: "FAR-III".into(),
                    name: "Select Transactions".into(),
                    earned_points: 0.79,
                    possible_points: 1.0,
                    percentage: Some(0.79),
                    weak: false,
                    share_of_exam: Some(100.0),
                    published_range: Some([20.0, 30.0]),
                    within_published_range: Some(false),
                    items: vec![ItemReport {
                        item_id: "wc_001".into(),
                        kind: ItemKind::RubricCriterion,
                        earned: 0.79,
                        max_possible: 1.0,
                        task_id: None,
                        detail: ScoreDetail::Rubric { categories: vec![] },
                    }],
                }],
            }],
            pending: vec![PendingItem {
                item_id: "wc_002".into(),
                reason: "judgment timed out after 30s".into(),
            }],
            rejected: vec![RejectedSubmission {
                item_id: "q9".into(),
                error: SubmissionError::UnknownItem {
                    item_id: "q9".into(),
                },
            }],
            duration_ms: 12,
        }
    }

    #[test]
    fn html_report_contains_required_elements() {
        let report = make_test_report();
        let html = generate_html(&report);

        assert!(html.contains("<html"));
        assert!(html.contains("</html>"));
        assert!(html.contains("CPA FAR &lt;sample&gt;"));
        assert!(html.contains("79.0%"));
        assert!(html.contains("FAR-III"));
        assert!(html.contains("wc_001"));
        assert!(html.contains("<svg"));
        assert!(html.contains("judgment timed out"));
        assert!(html.contains("unknown item: q9"));
        assert!(html.contains("Passing"));
    }

    #[test]
    fn chart_marks_passing_line_and_off_blueprint_share() {
        let report = make_test_report();
        let html = generate_html(&report);

        assert!(html.contains("pass 75%"));
        assert!(html.contains("x1=\"495.0\""));
        assert!(html.contains("class=\"off-blueprint\">100.0%"));
        assert!(html.contains("<tr class=\"partial\"><td>wc_001"));
    }

    #[test]
    fn detail_descriptions() {
        assert_eq!(
            describe_detail(&ScoreDetail::Choice {
                selected_index: 1,
                correct_index: 2
            }),
            "selected B, correct C"
        );
        assert_eq!(option_letter(30), "30");
    }

    #[test]
    fn html_report_write_to_file() {
        let report = make_test_report();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("report.html");

        write_html_report(&report, &path).unwrap();
        assert!(path.exists());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("<html"));
    }
}
