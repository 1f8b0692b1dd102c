//! The `examscore validate` command.

use std::path::PathBuf;

use anyhow::Result;

use examscore_core::catalog::ContentCatalog;
use examscore_core::model::GradableItem;
use examscore_core::parser;
use examscore_report::sarif::write_sarif_report;

pub fn execute(content_path: PathBuf, sarif: Option<PathBuf>) -> Result<()> {
    let loaded = parser::load_content(&content_path)?;
    let sets = loaded.sets;

    for failure in &loaded.failures {
        println!("  [{}] unparseable: {}", failure.path.display(), failure.error);
    }

    for set in &sets {
        let (questions, calculations, essays) =
            set.items
                .iter()
                .fold((0, 0, 0), |(q, c, e), item| match item {
                    GradableItem::MultipleChoice(_) => (q + 1, c, e),
                    GradableItem::Calculation(_) => (q, c + 1, e),
                    GradableItem::Rubric(_) => (q, c, e + 1),
                });
        println!(
            "Content set: {} ({} items: {questions} choice, {calculations} calculation, {essays} rubric)",
            set.name,
            set.items.len()
        );
    }

    let (catalog, defects) = ContentCatalog::load(&sets);
    for defect in &defects {
        println!("  [{}] {}: {defect}", defect.item_id(), defect.rule_id());
    }

    if let Some(path) = &sarif {
        write_sarif_report(&defects, &content_path.to_string_lossy(), path)?;
        println!("SARIF report: {}", path.display());
    }

    if defects.is_empty() && loaded.failures.is_empty() {
        println!("All content valid ({} gradable items).", catalog.len());
        return Ok(());
    }

    println!(
        "\n{} item(s) loaded, {} defect(s) found, {} file(s) failed to load.",
        catalog.len(),
        defects.len(),
        loaded.failures.len()
    );
    if loaded.failures.is_empty() {
        anyhow::bail!("content has {} defect(s)", defects.len())
    }
    anyhow::bail!(
        "content has {} defect(s) and {} unparseable file(s)",
        defects.len(),
        loaded.failures.len()
    )
}
