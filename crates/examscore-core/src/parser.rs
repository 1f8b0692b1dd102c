//! Content fixture parser.
//!
//! Loads content sets from TOML or JSON fixture files and directories. Items
//! are not validated here; that happens when a [`ContentCatalog`] is built.
//!
//! [`ContentCatalog`]: crate::catalog::ContentCatalog

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{
    CalculationItem, ContentSet, ExamBlueprint, GradableItem, ItemMeta, MultipleChoiceItem,
    RubricCategory, RubricItem,
};
use crate::normalize::{choice_index, parse_amount};

/// Tolerance applied to calculation requirements that do not set their own.
pub const DEFAULT_TOLERANCE: f64 = 1.0;

/// Intermediate structure for parsing content fixture files.
#[derive(Debug, Deserialize)]
struct FixtureFile {
    content_set: FixtureHeader,
    #[serde(default)]
    blueprint: Option<ExamBlueprint>,
    #[serde(default)]
    questions: Vec<FixtureQuestion>,
    #[serde(default)]
    tbs: Vec<FixtureTbs>,
    #[serde(default)]
    written_communications: Vec<FixtureEssay>,
}

#[derive(Debug, Deserialize)]
struct FixtureHeader {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    /// Section applied to items that do not name one.
    #[serde(default)]
    section: Option<String>,
    #[serde(default = "default_tolerance")]
    default_tolerance: f64,
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

/// Location fields shared by every fixture entry.
#[derive(Debug, Default, Deserialize)]
struct FixturePlacement {
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    blueprint_area: Option<String>,
    #[serde(default)]
    topic: Option<String>,
}

impl FixturePlacement {
    fn meta(&self, default_section: Option<&String>) -> ItemMeta {
        ItemMeta {
            section: self.section.clone().or_else(|| default_section.cloned()),
            blueprint_area: self.blueprint_area.clone(),
            task_id: None,
            topic: self.topic.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FixtureQuestion {
    id: String,
    options: Vec<String>,
    correct_answer: FixtureAnswer,
    #[serde(flatten)]
    placement: FixturePlacement,
}

#[derive(Debug, Deserialize)]
struct FixtureTbs {
    id: String,
    #[serde(flatten)]
    placement: FixturePlacement,
    #[serde(default)]
    requirements: Vec<FixtureRequirement>,
}

#[derive(Debug, Deserialize)]
struct FixtureRequirement {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    correct_answer: FixtureAnswer,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    tolerance: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FixtureEssay {
    id: String,
    #[serde(flatten)]
    placement: FixturePlacement,
    categories: Vec<RubricCategory>,
}

/// `correct_answer` as written by authors: an index, a value, a letter, or
/// the text of the correct option.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FixtureAnswer {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FixtureAnswer {
    fn as_index(&self, item_id: &str, options: &[String]) -> Result<usize> {
        let index = match self {
            FixtureAnswer::Integer(i) => Some(*i),
            FixtureAnswer::Text(s) => choice_index(options, s),
            FixtureAnswer::Float(_) => None,
        };
        index.and_then(|i| usize::try_from(i).ok()).with_context(|| {
            format!("item {item_id}: correct_answer must be an option index, letter, or option text")
        })
    }

    fn as_value(&self, item_id: &str) -> Result<f64> {
        let value = match self {
            FixtureAnswer::Integer(i) => Some(*i as f64),
            FixtureAnswer::Float(f) => Some(*f),
            FixtureAnswer::Text(s) => parse_amount(s),
        };
        value
            .filter(|v| v.is_finite())
            .with_context(|| format!("item {item_id}: correct_answer must be a number"))
    }
}

/// Parse a single fixture file (`.toml` or `.json`) into a `ContentSet`.
pub fn parse_content_set(path: &Path) -> Result<ContentSet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read content file: {}", path.display()))?;

    if path.extension().is_some_and(|ext| ext == "json") {
        let parsed: FixtureFile = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse JSON: {}", path.display()))?;
        build_content_set(parsed)
    } else {
        parse_content_set_str(&content, path)
    }
}

/// Parse a TOML string into a `ContentSet` (useful for testing).
pub fn parse_content_set_str(content: &str, source_path: &Path) -> Result<ContentSet> {
    let parsed: FixtureFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;
    build_content_set(parsed)
        .with_context(|| format!("invalid content fixture: {}", source_path.display()))
}

fn build_content_set(parsed: FixtureFile) -> Result<ContentSet> {
    let header = parsed.content_set;
    let default_section = header.section.as_ref();
    let mut items = Vec::new();

    for q in parsed.questions {
        let correct_index = q.correct_answer.as_index(&q.id, &q.options)?;
        items.push(GradableItem::MultipleChoice(MultipleChoiceItem {
            meta: q.placement.meta(default_section),
            id: q.id,
            options: q.options,
            correct_index,
        }));
    }

    for task in parsed.tbs {
        for req in task.requirements {
            let id = format!("{}.{}", task.id, req.id);
            let mut meta = task.placement.meta(default_section);
            meta.task_id = Some(task.id.clone());

            let item = match req.kind.as_str() {
                "multiple_choice" => GradableItem::MultipleChoice(MultipleChoiceItem {
                    correct_index: req.correct_answer.as_index(&id, &req.options)?,
                    id,
                    options: req.options,
                    meta,
                }),
                "calculation" => GradableItem::Calculation(CalculationItem {
                    correct_value: req.correct_answer.as_value(&id)?,
                    tolerance: req.tolerance.unwrap_or(header.default_tolerance),
                    id,
                    meta,
                }),
                other => anyhow::bail!("item {id}: unsupported requirement type '{other}'"),
            };
            items.push(item);
        }
    }

    for essay in parsed.written_communications {
        items.push(GradableItem::Rubric(RubricItem {
            meta: essay.placement.meta(default_section),
            id: essay.id,
            categories: essay.categories,
        }));
    }

    Ok(ContentSet {
        id: header.id,
        name: header.name,
        description: header.description,
        items,
        blueprint: parsed.blueprint,
    })
}

fn is_fixture(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "toml" || ext == "json")
}

/// A fixture file that could not be turned into a content set.
#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Content sets loaded from a file or directory, plus the fixtures that
/// failed to load.
#[derive(Debug, Default)]
pub struct LoadedContent {
    pub sets: Vec<ContentSet>,
    pub failures: Vec<LoadFailure>,
}

/// Recursively load all `.toml` and `.json` content files from a directory.
///
/// A fixture that fails to parse does not abort the walk; it is recorded in
/// [`LoadedContent::failures`] so callers can report it.
pub fn load_content_directory(dir: &Path) -> Result<LoadedContent> {
    let mut loaded = LoadedContent::default();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();

        if path.is_dir() {
            let nested = load_content_directory(&path)?;
            loaded.sets.extend(nested.sets);
            loaded.failures.extend(nested.failures);
        } else if is_fixture(&path) {
            match parse_content_set(&path) {
                Ok(set) => loaded.sets.push(set),
                Err(e) => {
                    tracing::warn!("failed to load {}: {:#}", path.display(), e);
                    loaded.failures.push(LoadFailure {
                        path,
                        error: format!("{e:#}"),
                    });
                }
            }
        }
    }

    Ok(loaded)
}

/// Load content from a single fixture file or a directory of fixtures.
///
/// A single file that fails to parse is an error; inside a directory the
/// failure is collected instead.
pub fn load_content(path: &Path) -> Result<LoadedContent> {
    if path.is_dir() {
        load_content_directory(path)
    } else {
        Ok(LoadedContent {
            sets: vec![parse_content_set(path)?],
            failures: Vec::new(),
        })
    }
}
